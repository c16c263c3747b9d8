//! Core domain types for the in-process job queue.
//!
//! This crate contains the types shared by the runtime and its callers:
//! - Job, JobStatus and JobOptions for units of work
//! - BackoffPolicy for retry timing
//! - QueueConfig, QueueStats and QueueInfo for named queues
//! - Events for lifecycle observers

mod backoff;
mod error;
mod events;
mod job;
mod queue;

pub use backoff::BackoffPolicy;
pub use error::JobError;
pub use events::JobEvent;
pub use job::{Job, JobId, JobOptions, JobStatus};
pub use queue::{QueueConfig, QueueInfo, QueueState, QueueStats};
