//! Message types for actor communication.

use std::sync::Arc;
use std::time::Duration;

use queue_core::{Job, JobId, JobOptions, JobStatus, QueueConfig, QueueInfo, QueueStats};
use ractor::{ActorId, ActorRef, RpcReplyPort};

use crate::error::QueueError;
use crate::handler::{HandlerResult, JobHandler};

/// Messages for the QueueActor.
#[derive(Debug)]
pub enum QueueMessage {
    /// Submit a new job.
    Add {
        payload: serde_json::Value,
        options: JobOptions,
        reply: RpcReplyPort<Result<Job, QueueError>>,
    },

    /// Bind the queue's handler. Replies `true` if one was replaced.
    SetHandler {
        handler: Arc<dyn JobHandler>,
        reply: RpcReplyPort<bool>,
    },

    /// A delay or backoff timer fired for this job.
    Promote { job_id: JobId },

    /// A worker finished running a job.
    JobSettled {
        job_id: JobId,
        worker: ActorId,
        outcome: HandlerResult,
    },

    /// Get a job by ID.
    GetJob {
        job_id: JobId,
        reply: RpcReplyPort<Option<Job>>,
    },

    /// List jobs in this queue, oldest first.
    ListJobs {
        status_filter: Option<JobStatus>,
        limit: usize,
        reply: RpcReplyPort<Vec<Job>>,
    },

    /// Remove terminal jobs of `status` that finished at least `older_than` ago.
    Clean {
        status: JobStatus,
        older_than: Duration,
        reply: RpcReplyPort<Result<usize, QueueError>>,
    },

    /// Pause the queue.
    Pause,

    /// Resume the queue.
    Resume,

    /// Get queue info.
    GetInfo { reply: RpcReplyPort<QueueInfo> },

    /// Get queue stats.
    GetStats { reply: RpcReplyPort<QueueStats> },

    /// Reply once no job is waiting or active.
    Drain { reply: RpcReplyPort<QueueStats> },

    /// Stop the queue and its workers.
    Shutdown,
}

/// Messages for the WorkerActor.
#[derive(Debug)]
pub enum WorkerMessage {
    /// Run a job with the given handler.
    ProcessJob {
        job: Box<Job>,
        handler: Arc<dyn JobHandler>,
    },

    /// Shutdown the worker.
    Shutdown,
}

/// Messages for the Supervisor.
#[derive(Debug)]
pub enum SupervisorMessage {
    /// Fetch a queue, creating it on first use. `config` only applies to
    /// creation.
    GetOrCreate {
        name: String,
        config: Option<QueueConfig>,
        reply: RpcReplyPort<Result<ActorRef<QueueMessage>, QueueError>>,
    },

    /// Get a queue by name.
    GetQueue {
        name: String,
        reply: RpcReplyPort<Option<ActorRef<QueueMessage>>>,
    },

    /// List all queues, by name.
    ListQueues {
        reply: RpcReplyPort<Vec<(String, ActorRef<QueueMessage>)>>,
    },

    /// Shutdown all queues.
    Shutdown,
}
