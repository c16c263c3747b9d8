//! Public async facade over the supervisor and queue actors.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use queue_core::{Job, JobEvent, JobId, JobOptions, JobStatus, QueueConfig, QueueInfo, QueueStats};
use ractor::rpc::CallResult;
use ractor::{ActorRef, RpcReplyPort};
use tokio::sync::broadcast;

use crate::config::ServiceConfig;
use crate::error::{QueueError, QueueResult};
use crate::handler::JobHandler;
use crate::messages::{QueueMessage, SupervisorMessage};
use crate::supervisor::{SupervisorArgs, start_supervisor};
use crate::timer::{Timer, TokioTimer};

async fn call<M, T>(
    actor: &ActorRef<M>,
    msg: impl FnOnce(RpcReplyPort<T>) -> M,
    timeout: Option<Duration>,
) -> QueueResult<T>
where
    M: ractor::Message,
    T: Send + 'static,
{
    match ractor::rpc::call(actor, msg, timeout).await {
        Ok(CallResult::Success(value)) => Ok(value),
        Ok(CallResult::Timeout) => Err(QueueError::Timeout),
        Ok(CallResult::SenderError) => Err(QueueError::Actor("reply channel dropped".into())),
        Err(e) => Err(QueueError::Actor(e.to_string())),
    }
}

/// Handle to a single named queue.
#[derive(Debug, Clone)]
pub struct QueueHandle {
    name: String,
    actor: ActorRef<QueueMessage>,
}

impl QueueHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Submit a job. Resolves once the queue has recorded it, never on
    /// its outcome.
    pub async fn add(&self, payload: serde_json::Value, options: JobOptions) -> QueueResult<Job> {
        options.validate()?;
        call(
            &self.actor,
            |reply| QueueMessage::Add {
                payload,
                options,
                reply,
            },
            None,
        )
        .await?
    }

    /// Bind the queue's handler. Returns `true` if an earlier handler was
    /// replaced.
    pub async fn register_handler<H: JobHandler>(&self, handler: H) -> QueueResult<bool> {
        self.register_shared(Arc::new(handler)).await
    }

    pub(crate) async fn register_shared(&self, handler: Arc<dyn JobHandler>) -> QueueResult<bool> {
        call(
            &self.actor,
            |reply| QueueMessage::SetHandler { handler, reply },
            None,
        )
        .await
    }

    pub async fn stats(&self) -> QueueResult<QueueStats> {
        call(&self.actor, |reply| QueueMessage::GetStats { reply }, None).await
    }

    pub async fn info(&self) -> QueueResult<QueueInfo> {
        call(&self.actor, |reply| QueueMessage::GetInfo { reply }, None).await
    }

    pub async fn get_job(&self, job_id: JobId) -> QueueResult<Option<Job>> {
        call(
            &self.actor,
            |reply| QueueMessage::GetJob { job_id, reply },
            None,
        )
        .await
    }

    /// Jobs in creation order, optionally filtered by status.
    pub async fn list_jobs(
        &self,
        status_filter: Option<JobStatus>,
        limit: usize,
    ) -> QueueResult<Vec<Job>> {
        call(
            &self.actor,
            |reply| QueueMessage::ListJobs {
                status_filter,
                limit,
                reply,
            },
            None,
        )
        .await
    }

    /// Remove `Completed` or `Failed` jobs that finished more than
    /// `older_than` ago (all of them when `None`). Returns the number removed.
    pub async fn clean(&self, status: JobStatus, older_than: Option<Duration>) -> QueueResult<usize> {
        let older_than = older_than.unwrap_or_default();
        call(
            &self.actor,
            |reply| QueueMessage::Clean {
                status,
                older_than,
                reply,
            },
            None,
        )
        .await?
    }

    pub fn pause(&self) -> QueueResult<()> {
        self.actor
            .send_message(QueueMessage::Pause)
            .map_err(|e| QueueError::Actor(e.to_string()))
    }

    pub fn resume(&self) -> QueueResult<()> {
        self.actor
            .send_message(QueueMessage::Resume)
            .map_err(|e| QueueError::Actor(e.to_string()))
    }

    /// Wait until no job is waiting or active. Delayed jobs are not waited for.
    pub async fn drain(&self, timeout: Duration) -> QueueResult<QueueStats> {
        call(
            &self.actor,
            |reply| QueueMessage::Drain { reply },
            Some(timeout),
        )
        .await
    }
}

/// Process-wide entry point: creates queues on demand and routes jobs and
/// handlers to them.
#[derive(Debug, Clone)]
pub struct QueueService {
    supervisor: ActorRef<SupervisorMessage>,
    event_tx: broadcast::Sender<JobEvent>,
    config: Arc<ServiceConfig>,
}

impl QueueService {
    /// Start a service backed by the tokio clock.
    pub async fn start(config: ServiceConfig) -> QueueResult<Self> {
        Self::start_with_timer(config, Arc::new(TokioTimer)).await
    }

    /// Start a service with a custom timer, e.g. a [`crate::ManualTimer`].
    pub async fn start_with_timer(config: ServiceConfig, timer: Arc<dyn Timer>) -> QueueResult<Self> {
        config.default_queue.validate()?;
        let (event_tx, _) = broadcast::channel(config.event_capacity.max(1));
        let args = SupervisorArgs {
            config: config.clone(),
            timer,
            event_tx: event_tx.clone(),
        };
        let (supervisor, _handle) = start_supervisor(args)
            .await
            .map_err(|e| QueueError::Actor(format!("Failed to start supervisor: {}", e)))?;

        Ok(Self {
            supervisor,
            event_tx,
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Subscribe to lifecycle events of every queue.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.event_tx.subscribe()
    }

    /// Fetch a queue, creating it on first use. `config` only applies to
    /// creation; without it the service config decides.
    pub async fn get_or_create(
        &self,
        name: &str,
        config: Option<QueueConfig>,
    ) -> QueueResult<QueueHandle> {
        let name = name.to_string();
        let actor = call(
            &self.supervisor,
            |reply| SupervisorMessage::GetOrCreate {
                name: name.clone(),
                config,
                reply,
            },
            None,
        )
        .await??;
        Ok(QueueHandle { name, actor })
    }

    /// Look up an existing queue without creating it.
    pub async fn queue(&self, name: &str) -> QueueResult<QueueHandle> {
        let name = name.to_string();
        let actor = call(
            &self.supervisor,
            |reply| SupervisorMessage::GetQueue {
                name: name.clone(),
                reply,
            },
            None,
        )
        .await?;
        actor
            .map(|actor| QueueHandle {
                name: name.clone(),
                actor,
            })
            .ok_or(QueueError::QueueNotFound(name))
    }

    /// All queues, by name.
    pub async fn queues(&self) -> QueueResult<Vec<QueueHandle>> {
        let queues = call(
            &self.supervisor,
            |reply| SupervisorMessage::ListQueues { reply },
            None,
        )
        .await?;
        Ok(queues
            .into_iter()
            .map(|(name, actor)| QueueHandle { name, actor })
            .collect())
    }

    /// Submit a job to the named queue, creating the queue if needed.
    ///
    /// A queue without a handler keeps the job waiting until one is
    /// registered.
    pub async fn add_job(
        &self,
        queue: &str,
        payload: serde_json::Value,
        options: JobOptions,
    ) -> QueueResult<Job> {
        options.validate()?;
        self.get_or_create(queue, None).await?.add(payload, options).await
    }

    /// Bind the handler of the named queue, creating the queue if needed.
    /// A second registration replaces the first and returns `true`.
    pub async fn register_processor<H: JobHandler>(&self, queue: &str, handler: H) -> QueueResult<bool> {
        self.register_shared(queue, Arc::new(handler)).await
    }

    pub async fn register_shared(
        &self,
        queue: &str,
        handler: Arc<dyn JobHandler>,
    ) -> QueueResult<bool> {
        self.get_or_create(queue, None)
            .await?
            .register_shared(handler)
            .await
    }

    /// Per-queue job counts.
    pub async fn stats(&self) -> QueueResult<BTreeMap<String, QueueStats>> {
        let mut stats = BTreeMap::new();
        for queue in self.queues().await? {
            let queue_stats = queue.stats().await?;
            stats.insert(queue.name, queue_stats);
        }
        Ok(stats)
    }

    /// Remove terminal jobs from an existing queue. See [`QueueHandle::clean`].
    pub async fn clean(
        &self,
        queue: &str,
        status: JobStatus,
        older_than: Option<Duration>,
    ) -> QueueResult<usize> {
        self.queue(queue).await?.clean(status, older_than).await
    }

    /// Drain every queue within `grace`, then stop all actors.
    ///
    /// Returns the names of queues that still had waiting or active jobs
    /// when the grace period ran out.
    pub async fn shutdown(&self, grace: Duration) -> QueueResult<Vec<String>> {
        let queues = self.queues().await?;
        tracing::info!("Draining {} queues (grace {:?})", queues.len(), grace);

        let results = join_all(queues.iter().map(|queue| queue.drain(grace))).await;
        let mut undrained = Vec::new();
        for (queue, result) in queues.iter().zip(results) {
            match result {
                Ok(_) => {}
                Err(QueueError::Timeout) => {
                    tracing::warn!("Queue {} did not drain within {:?}", queue.name, grace);
                    undrained.push(queue.name.clone());
                }
                Err(e) => {
                    tracing::warn!("Queue {} failed to drain: {}", queue.name, e);
                    undrained.push(queue.name.clone());
                }
            }
        }

        self.supervisor
            .send_message(SupervisorMessage::Shutdown)
            .map_err(|e| QueueError::Actor(e.to_string()))?;
        Ok(undrained)
    }
}
