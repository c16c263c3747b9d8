//! Error type for queue runtime operations.

use queue_core::JobError;

use crate::config::ConfigError;

/// Result type for queue runtime operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Errors surfaced synchronously by the queue runtime.
///
/// Handler failures are never reported here; they are observed through
/// [`queue_core::JobEvent`]s and job snapshots.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error(transparent)]
    Job(#[from] JobError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Queue not found: {0}")]
    QueueNotFound(String),

    #[error("Actor error: {0}")]
    Actor(String),

    #[error("Timeout")]
    Timeout,
}
