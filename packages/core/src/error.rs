//! Errors raised by the job domain model.

use thiserror::Error;

use crate::{JobId, JobStatus};

/// Errors produced when validating options or moving a job between states.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    /// The requested transition is not part of the job state machine.
    #[error("job {job_id}: invalid transition {from} -> {to}")]
    InvalidTransition {
        job_id: JobId,
        from: JobStatus,
        to: JobStatus,
    },

    /// The job has already used every attempt it was allowed.
    #[error("job {job_id}: attempts exhausted ({attempts}/{max_attempts})")]
    AttemptsExhausted {
        job_id: JobId,
        attempts: u32,
        max_attempts: u32,
    },

    /// Submission or queue options were rejected.
    #[error("invalid options: {0}")]
    InvalidOptions(String),
}
