//! Queue actor for managing jobs in a single queue.
//!
//! The actor is the only writer of its job map, waiting set and active
//! counter. Producers, timers and workers reach it exclusively through
//! [`QueueMessage`]s, so every mutation is serialized by the mailbox.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use queue_core::{
    Job, JobError, JobEvent, JobId, JobOptions, JobStatus, QueueConfig, QueueInfo, QueueState,
    QueueStats,
};
use ractor::{Actor, ActorId, ActorProcessingErr, ActorRef, RpcReplyPort, SupervisionEvent};
use tokio::sync::broadcast;

use crate::error::QueueError;
use crate::handler::{HandlerResult, JobHandler};
use crate::messages::{QueueMessage, WorkerMessage};
use crate::timer::Timer;
use crate::worker_actor::{WorkerActor, WorkerArgs};

/// Entry in the waiting set: higher priority first, then earliest arrival.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct WaitingEntry {
    priority: i32,
    seq: u64,
    job_id: JobId,
}

impl PartialOrd for WaitingEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for WaitingEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher priority first
        match self.priority.cmp(&other.priority) {
            // Lower arrival sequence first
            Ordering::Equal => other.seq.cmp(&self.seq),
            other => other,
        }
    }
}

/// Arguments for spawning a queue actor.
pub struct QueueArgs {
    pub name: String,
    pub config: QueueConfig,
    pub timer: Arc<dyn Timer>,
    pub event_tx: broadcast::Sender<JobEvent>,
}

/// State for the queue actor.
pub struct QueueActorState {
    name: String,
    config: QueueConfig,
    state: QueueState,
    created_at: DateTime<Utc>,
    /// All jobs by ID; the system of record.
    jobs: HashMap<JobId, Job>,
    /// Waiting jobs (priority queue).
    waiting: BinaryHeap<WaitingEntry>,
    /// Arrival counter for the waiting set.
    next_seq: u64,
    /// Jobs currently handed to workers.
    active: usize,
    handler: Option<Arc<dyn JobHandler>>,
    workers: HashMap<ActorId, ActorRef<WorkerMessage>>,
    idle: VecDeque<ActorId>,
    in_flight: HashMap<ActorId, JobId>,
    timer: Arc<dyn Timer>,
    event_tx: broadcast::Sender<JobEvent>,
    drain_waiters: Vec<RpcReplyPort<QueueStats>>,
    /// State restored once a drain completes.
    resume_state: QueueState,
    stopping: bool,
}

impl QueueActorState {
    /// Create a new queue actor state.
    pub fn new(args: QueueArgs) -> Self {
        Self {
            name: args.name,
            config: args.config,
            state: QueueState::Running,
            created_at: Utc::now(),
            jobs: HashMap::new(),
            waiting: BinaryHeap::new(),
            next_seq: 0,
            active: 0,
            handler: None,
            workers: HashMap::new(),
            idle: VecDeque::new(),
            in_flight: HashMap::new(),
            timer: args.timer,
            event_tx: args.event_tx,
            drain_waiters: Vec::new(),
            resume_state: QueueState::Running,
            stopping: false,
        }
    }

    /// Broadcast an event. Having no subscribers is fine.
    fn broadcast(&self, event: JobEvent) {
        let _ = self.event_tx.send(event);
    }

    fn stats(&self) -> QueueStats {
        let mut stats = QueueStats::default();
        for job in self.jobs.values() {
            match job.status {
                JobStatus::Waiting => stats.waiting += 1,
                JobStatus::Active => stats.active += 1,
                JobStatus::Delayed => stats.delayed += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }

    fn info(&self) -> QueueInfo {
        QueueInfo {
            name: self.name.clone(),
            state: self.state,
            config: self.config.clone(),
            stats: self.stats(),
            has_handler: self.handler.is_some(),
            created_at: self.created_at,
        }
    }

    async fn spawn_worker(&mut self, myself: &ActorRef<QueueMessage>) -> Result<(), ActorProcessingErr> {
        let args = WorkerArgs {
            queue_name: self.name.clone(),
            queue: myself.clone(),
        };
        let (worker, _handle) = Actor::spawn_linked(None, WorkerActor, args, myself.get_cell())
            .await
            .map_err(|e| ActorProcessingErr::from(format!("Failed to spawn worker: {}", e)))?;
        let id = worker.get_id();
        self.workers.insert(id, worker);
        self.idle.push_back(id);
        Ok(())
    }

    fn add(
        &mut self,
        myself: &ActorRef<QueueMessage>,
        payload: serde_json::Value,
        options: JobOptions,
    ) -> Result<Job, QueueError> {
        options.validate()?;

        let now = Utc::now();
        let mut job = Job::new(&self.name, payload)
            .with_priority(options.priority)
            .with_max_attempts(
                options
                    .max_attempts
                    .unwrap_or(self.config.default_max_attempts),
            )
            .with_backoff(
                options
                    .backoff
                    .clone()
                    .unwrap_or_else(|| self.config.backoff.clone()),
            );
        if !options.delay.is_zero() {
            let run_at = now
                .checked_add_signed(to_chrono(options.delay)?)
                .ok_or_else(|| out_of_range(options.delay))?;
            job = job.delayed_until(run_at);
        }

        let job_id = job.id;
        self.jobs.insert(job_id, job.clone());
        if job.status == JobStatus::Delayed {
            self.schedule_promotion(myself, job_id, options.delay);
        } else {
            self.push_waiting(job_id, job.priority);
        }
        self.broadcast(JobEvent::JobAdded {
            job: job.clone(),
            timestamp: now,
        });

        Ok(job)
    }

    fn push_waiting(&mut self, job_id: JobId, priority: i32) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.waiting.push(WaitingEntry {
            priority,
            seq,
            job_id,
        });
    }

    fn schedule_promotion(&self, myself: &ActorRef<QueueMessage>, job_id: JobId, delay: Duration) {
        let queue = myself.clone();
        self.timer.after(
            delay,
            Box::new(move || {
                // The queue may already be gone at shutdown.
                let _ = queue.send_message(QueueMessage::Promote { job_id });
            }),
        );
    }

    /// `Delayed -> Waiting`.
    fn promote(&mut self, job_id: JobId) {
        let Some(job) = self.jobs.get_mut(&job_id) else {
            tracing::debug!("Ignoring timer for unknown job {}", job_id);
            return;
        };
        if let Err(e) = job.promote() {
            tracing::warn!("Queue {}: {}", self.name, e);
            return;
        }
        let priority = job.priority;
        self.push_waiting(job_id, priority);
        self.broadcast(JobEvent::JobWaiting {
            job_id,
            queue: self.name.clone(),
            timestamp: Utc::now(),
        });
    }

    fn can_dispatch(&self) -> bool {
        self.handler.is_some()
            && self.state.is_dispatching()
            && !self.stopping
            && self.active < self.config.concurrency as usize
            && !self.waiting.is_empty()
    }

    /// Move waiting jobs to idle workers until a limit is hit.
    fn dispatch(&mut self, myself: &ActorRef<QueueMessage>) {
        while self.can_dispatch() {
            let Some(handler) = self.handler.clone() else {
                break;
            };
            let Some(worker_id) = self.idle.pop_front() else {
                break;
            };
            let Some(entry) = self.waiting.pop() else {
                self.idle.push_front(worker_id);
                break;
            };
            let Some(worker) = self.workers.get(&worker_id).cloned() else {
                // Stale idle entry for a worker that has since died.
                self.waiting.push(entry);
                continue;
            };

            let now = Utc::now();
            let Some(job) = self.jobs.get_mut(&entry.job_id) else {
                self.idle.push_front(worker_id);
                continue;
            };
            if let Err(e) = job.start(now) {
                tracing::warn!("Queue {}: {}", self.name, e);
                self.idle.push_front(worker_id);
                continue;
            }
            let snapshot = job.clone();
            let job_id = snapshot.id;
            let attempt = snapshot.attempts;

            self.active += 1;
            self.in_flight.insert(worker_id, job_id);
            self.broadcast(JobEvent::JobStarted {
                job_id,
                queue: self.name.clone(),
                attempt,
                timestamp: now,
            });
            tracing::debug!("Queue {} dispatched job {} (attempt {})", self.name, job_id, attempt);

            if let Err(e) = worker.send_message(WorkerMessage::ProcessJob {
                job: Box::new(snapshot),
                handler,
            }) {
                tracing::warn!("Queue {}: worker {} unavailable: {}", self.name, worker_id, e);
                self.workers.remove(&worker_id);
                self.in_flight.remove(&worker_id);
                self.active = self.active.saturating_sub(1);
                self.record_failure(myself, job_id, "worker unavailable".to_string());
            }
        }
    }

    /// Apply a worker's outcome and free its slot.
    fn settle(
        &mut self,
        myself: &ActorRef<QueueMessage>,
        worker_id: ActorId,
        job_id: JobId,
        outcome: HandlerResult,
    ) {
        if self.in_flight.remove(&worker_id).is_none() {
            tracing::warn!(
                "Queue {}: unexpected settlement of job {} from worker {}",
                self.name,
                job_id,
                worker_id
            );
            return;
        }
        self.active = self.active.saturating_sub(1);
        if self.workers.contains_key(&worker_id) {
            self.idle.push_back(worker_id);
        }

        match outcome {
            Ok(result) => self.record_success(job_id, result),
            Err(error) => self.record_failure(myself, job_id, error),
        }
    }

    /// `Active -> Completed`.
    fn record_success(&mut self, job_id: JobId, result: serde_json::Value) {
        let now = Utc::now();
        let Some(job) = self.jobs.get_mut(&job_id) else {
            return;
        };
        if let Err(e) = job.complete(result, now) {
            tracing::warn!("Queue {}: {}", self.name, e);
            return;
        }
        let attempts = job.attempts;
        let duration_ms = job
            .dispatched_at
            .map(|started| (now - started).num_milliseconds().max(0) as u64)
            .unwrap_or(0);

        self.broadcast(JobEvent::JobCompleted {
            job_id,
            queue: self.name.clone(),
            attempts,
            duration_ms,
            timestamp: now,
        });
    }

    /// `Active -> Delayed` while attempts remain, otherwise `Active -> Failed`.
    fn record_failure(&mut self, myself: &ActorRef<QueueMessage>, job_id: JobId, error: String) {
        let now = Utc::now();
        let Some(job) = self.jobs.get_mut(&job_id) else {
            return;
        };
        let attempt = job.attempts;

        if job.can_retry() {
            let delay = job.backoff.delay_for(attempt);
            let run_at = to_chrono(delay)
                .ok()
                .and_then(|d| now.checked_add_signed(d))
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
            if let Err(e) = job.retry(error.clone(), run_at) {
                tracing::warn!("Queue {}: {}", self.name, e);
                return;
            }
            tracing::warn!(
                "Queue {}: job {} failed attempt {}/{}: {} (retrying in {:?})",
                self.name,
                job_id,
                attempt,
                job.max_attempts,
                error,
                delay
            );
            if !delay.is_zero() {
                self.schedule_promotion(myself, job_id, delay);
            }
            self.broadcast(JobEvent::JobRetrying {
                job_id,
                queue: self.name.clone(),
                attempt,
                delay_ms: delay.as_millis() as u64,
                error,
                timestamp: now,
            });
            if delay.is_zero() {
                self.promote(job_id);
            }
        } else {
            if let Err(e) = job.fail(error.clone(), now) {
                tracing::warn!("Queue {}: {}", self.name, e);
                return;
            }
            tracing::error!(
                "Queue {}: job {} failed after {} attempts: {}",
                self.name,
                job_id,
                attempt,
                error
            );
            self.broadcast(JobEvent::JobFailed {
                job_id,
                queue: self.name.clone(),
                attempts: attempt,
                error,
                timestamp: now,
            });
        }
    }

    /// Remove terminal jobs of `status` finished at or before `now - older_than`.
    fn clean(&mut self, status: JobStatus, older_than: Duration) -> Result<usize, QueueError> {
        if !status.is_terminal() {
            return Err(QueueError::Job(JobError::InvalidOptions(format!(
                "clean only accepts terminal statuses, got {}",
                status
            ))));
        }
        let now = Utc::now();
        let cutoff = now
            .checked_sub_signed(to_chrono(older_than)?)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let before = self.jobs.len();
        self.jobs.retain(|_, job| {
            !(job.status == status && job.finished_at().is_some_and(|at| at <= cutoff))
        });
        let removed = before - self.jobs.len();

        if removed > 0 {
            tracing::info!("Queue {}: cleaned {} {} jobs", self.name, removed, status);
        }
        self.broadcast(JobEvent::JobsCleaned {
            queue: self.name.clone(),
            status,
            removed,
            timestamp: now,
        });
        Ok(removed)
    }

    fn list_jobs(&self, status_filter: Option<JobStatus>, limit: usize) -> Vec<Job> {
        let mut jobs: Vec<Job> = self
            .jobs
            .values()
            .filter(|j| status_filter.is_none_or(|s| j.status == s))
            .cloned()
            .collect();
        jobs.sort_by_key(|j| (j.created_at, j.id));
        jobs.truncate(limit);
        jobs
    }

    fn is_drained(&self) -> bool {
        self.active == 0 && self.waiting.is_empty()
    }

    fn notify_drained(&mut self) {
        if self.drain_waiters.is_empty() || !self.is_drained() {
            return;
        }
        let stats = self.stats();
        for reply in self.drain_waiters.drain(..) {
            let _ = reply.send(stats);
        }
        if self.state == QueueState::Draining {
            self.state = self.resume_state;
        }
        tracing::info!("Queue {} drained ({})", self.name, self.state);
    }

    fn stop_workers(&mut self) {
        for worker in self.workers.values() {
            let _ = worker.send_message(WorkerMessage::Shutdown);
        }
        self.workers.clear();
        self.idle.clear();
    }
}

fn to_chrono(duration: Duration) -> Result<chrono::Duration, QueueError> {
    chrono::Duration::from_std(duration).map_err(|_| out_of_range(duration))
}

fn out_of_range(duration: Duration) -> QueueError {
    QueueError::Job(JobError::InvalidOptions(format!(
        "duration {:?} is out of range",
        duration
    )))
}

/// Queue actor that manages a single queue.
pub struct QueueActor;

impl Actor for QueueActor {
    type Msg = QueueMessage;
    type State = QueueActorState;
    type Arguments = QueueArgs;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!(
            "Starting queue actor: {} (concurrency {})",
            args.name,
            args.config.concurrency
        );
        Ok(QueueActorState::new(args))
    }

    async fn post_start(
        &self,
        myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        for _ in 0..state.config.concurrency {
            state.spawn_worker(&myself).await?;
        }
        state.dispatch(&myself);
        Ok(())
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            QueueMessage::Add {
                payload,
                options,
                reply,
            } => {
                let result = state.add(&myself, payload, options);
                let _ = reply.send(result);
                state.dispatch(&myself);
            }

            QueueMessage::SetHandler { handler, reply } => {
                let replaced = state.handler.replace(handler).is_some();
                if replaced {
                    tracing::warn!("Queue {}: handler replaced", state.name);
                } else {
                    tracing::info!("Queue {}: handler registered", state.name);
                }
                state.broadcast(JobEvent::HandlerRegistered {
                    queue: state.name.clone(),
                    replaced,
                    timestamp: Utc::now(),
                });
                let _ = reply.send(replaced);
                state.dispatch(&myself);
            }

            QueueMessage::Promote { job_id } => {
                state.promote(job_id);
                state.dispatch(&myself);
            }

            QueueMessage::JobSettled {
                job_id,
                worker,
                outcome,
            } => {
                state.settle(&myself, worker, job_id, outcome);
                state.dispatch(&myself);
                state.notify_drained();
            }

            QueueMessage::GetJob { job_id, reply } => {
                let _ = reply.send(state.jobs.get(&job_id).cloned());
            }

            QueueMessage::ListJobs {
                status_filter,
                limit,
                reply,
            } => {
                let _ = reply.send(state.list_jobs(status_filter, limit));
            }

            QueueMessage::Clean {
                status,
                older_than,
                reply,
            } => {
                let _ = reply.send(state.clean(status, older_than));
            }

            QueueMessage::Pause => {
                if state.state != QueueState::Paused {
                    state.state = QueueState::Paused;
                    tracing::info!("Queue {} paused", state.name);
                    state.broadcast(JobEvent::QueuePaused {
                        queue: state.name.clone(),
                        timestamp: Utc::now(),
                    });
                }
            }

            QueueMessage::Resume => {
                if state.state == QueueState::Paused {
                    state.state = QueueState::Running;
                    tracing::info!("Queue {} resumed", state.name);
                    state.broadcast(JobEvent::QueueResumed {
                        queue: state.name.clone(),
                        timestamp: Utc::now(),
                    });
                    state.dispatch(&myself);
                }
            }

            QueueMessage::GetInfo { reply } => {
                let _ = reply.send(state.info());
            }

            QueueMessage::GetStats { reply } => {
                let _ = reply.send(state.stats());
            }

            QueueMessage::Drain { reply } => {
                if state.state != QueueState::Draining {
                    state.resume_state = state.state;
                    state.state = QueueState::Draining;
                }
                state.drain_waiters.push(reply);
                state.dispatch(&myself);
                state.notify_drained();
            }

            QueueMessage::Shutdown => {
                tracing::info!("Shutting down queue: {}", state.name);
                state.stopping = true;
                state.stop_workers();
                myself.stop(None);
            }
        }

        Ok(())
    }

    async fn handle_supervisor_evt(
        &self,
        myself: ActorRef<Self::Msg>,
        message: SupervisionEvent,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        let (worker_id, reason) = match message {
            SupervisionEvent::ActorTerminated(cell, _, reason) => {
                (cell.get_id(), reason.unwrap_or_else(|| "stopped".to_string()))
            }
            SupervisionEvent::ActorFailed(cell, err) => (cell.get_id(), err.to_string()),
            _ => return Ok(()),
        };
        if state.stopping || state.workers.remove(&worker_id).is_none() {
            return Ok(());
        }

        tracing::warn!("Queue {}: worker {} exited: {}", state.name, worker_id, reason);
        state.idle.retain(|id| *id != worker_id);
        if let Some(job_id) = state.in_flight.remove(&worker_id) {
            state.active = state.active.saturating_sub(1);
            state.record_failure(&myself, job_id, format!("worker exited: {}", reason));
        }

        state.spawn_worker(&myself).await?;
        state.dispatch(&myself);
        state.notify_drained();
        Ok(())
    }
}
