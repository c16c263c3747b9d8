//! Lifecycle events published by queues.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Job, JobId, JobStatus, QueueConfig};

/// Events emitted by the job queue system after each state change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    // Queue events
    /// A new queue was created.
    QueueCreated {
        queue: String,
        config: QueueConfig,
        timestamp: DateTime<Utc>,
    },
    /// Dispatching was suspended.
    QueuePaused {
        queue: String,
        timestamp: DateTime<Utc>,
    },
    /// Dispatching was resumed.
    QueueResumed {
        queue: String,
        timestamp: DateTime<Utc>,
    },
    /// A handler was bound to a queue. `replaced` is set when it displaced
    /// an earlier one.
    HandlerRegistered {
        queue: String,
        replaced: bool,
        timestamp: DateTime<Utc>,
    },
    /// Terminal jobs were removed from a queue.
    JobsCleaned {
        queue: String,
        status: JobStatus,
        removed: usize,
        timestamp: DateTime<Utc>,
    },

    // Job events
    /// A new job was submitted, either waiting or delayed.
    JobAdded { job: Job, timestamp: DateTime<Utc> },
    /// A delayed job entered the waiting set.
    JobWaiting {
        job_id: JobId,
        queue: String,
        timestamp: DateTime<Utc>,
    },
    /// A job was handed to a worker.
    JobStarted {
        job_id: JobId,
        queue: String,
        attempt: u32,
        timestamp: DateTime<Utc>,
    },
    /// A job completed successfully.
    JobCompleted {
        job_id: JobId,
        queue: String,
        attempts: u32,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    /// An attempt failed and the job will run again after `delay_ms`.
    JobRetrying {
        job_id: JobId,
        queue: String,
        attempt: u32,
        delay_ms: u64,
        error: String,
        timestamp: DateTime<Utc>,
    },
    /// The last permitted attempt failed.
    JobFailed {
        job_id: JobId,
        queue: String,
        attempts: u32,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

impl JobEvent {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            JobEvent::QueueCreated { timestamp, .. }
            | JobEvent::QueuePaused { timestamp, .. }
            | JobEvent::QueueResumed { timestamp, .. }
            | JobEvent::HandlerRegistered { timestamp, .. }
            | JobEvent::JobsCleaned { timestamp, .. }
            | JobEvent::JobAdded { timestamp, .. }
            | JobEvent::JobWaiting { timestamp, .. }
            | JobEvent::JobStarted { timestamp, .. }
            | JobEvent::JobCompleted { timestamp, .. }
            | JobEvent::JobRetrying { timestamp, .. }
            | JobEvent::JobFailed { timestamp, .. } => *timestamp,
        }
    }

    /// Get the name of the queue that emitted this event.
    pub fn queue(&self) -> &str {
        match self {
            JobEvent::JobAdded { job, .. } => &job.queue,
            JobEvent::QueueCreated { queue, .. }
            | JobEvent::QueuePaused { queue, .. }
            | JobEvent::QueueResumed { queue, .. }
            | JobEvent::HandlerRegistered { queue, .. }
            | JobEvent::JobsCleaned { queue, .. }
            | JobEvent::JobWaiting { queue, .. }
            | JobEvent::JobStarted { queue, .. }
            | JobEvent::JobCompleted { queue, .. }
            | JobEvent::JobRetrying { queue, .. }
            | JobEvent::JobFailed { queue, .. } => queue,
        }
    }

    /// Get the job ID associated with this event, if any.
    pub fn job_id(&self) -> Option<JobId> {
        match self {
            JobEvent::JobAdded { job, .. } => Some(job.id),
            JobEvent::JobWaiting { job_id, .. }
            | JobEvent::JobStarted { job_id, .. }
            | JobEvent::JobCompleted { job_id, .. }
            | JobEvent::JobRetrying { job_id, .. }
            | JobEvent::JobFailed { job_id, .. } => Some(*job_id),
            _ => None,
        }
    }

    /// The status this event moved its job into.
    pub fn job_status(&self) -> Option<JobStatus> {
        match self {
            JobEvent::JobAdded { job, .. } => Some(job.status),
            JobEvent::JobWaiting { .. } => Some(JobStatus::Waiting),
            JobEvent::JobStarted { .. } => Some(JobStatus::Active),
            JobEvent::JobCompleted { .. } => Some(JobStatus::Completed),
            JobEvent::JobRetrying { .. } => Some(JobStatus::Delayed),
            JobEvent::JobFailed { .. } => Some(JobStatus::Failed),
            _ => None,
        }
    }

    /// Get a short description of this event for logging.
    pub fn description(&self) -> String {
        match self {
            JobEvent::QueueCreated { queue, config, .. } => format!(
                "Queue '{}' created (concurrency {})",
                queue, config.concurrency
            ),
            JobEvent::QueuePaused { queue, .. } => format!("Queue '{}' paused", queue),
            JobEvent::QueueResumed { queue, .. } => format!("Queue '{}' resumed", queue),
            JobEvent::HandlerRegistered {
                queue, replaced, ..
            } => {
                if *replaced {
                    format!("Queue '{}' handler replaced", queue)
                } else {
                    format!("Queue '{}' handler registered", queue)
                }
            }
            JobEvent::JobsCleaned {
                queue,
                status,
                removed,
                ..
            } => format!("Queue '{}' cleaned {} {} jobs", queue, removed, status),
            JobEvent::JobAdded { job, .. } => {
                format!("Job {} added to '{}' ({})", job.id, job.queue, job.status)
            }
            JobEvent::JobWaiting { job_id, .. } => format!("Job {} waiting", job_id),
            JobEvent::JobStarted {
                job_id, attempt, ..
            } => format!("Job {} started (attempt {})", job_id, attempt),
            JobEvent::JobCompleted {
                job_id,
                duration_ms,
                ..
            } => format!("Job {} completed in {}ms", job_id, duration_ms),
            JobEvent::JobRetrying {
                job_id,
                attempt,
                delay_ms,
                error,
                ..
            } => format!(
                "Job {} failed attempt {}: {} (retrying in {}ms)",
                job_id, attempt, error, delay_ms
            ),
            JobEvent::JobFailed {
                job_id,
                attempts,
                error,
                ..
            } => format!("Job {} failed after {} attempts: {}", job_id, attempts, error),
        }
    }
}
