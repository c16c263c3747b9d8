//! Job domain types and the job state machine.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::{BackoffPolicy, JobError};

/// Unique identifier for a job, using ULID for chronological sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Ulid);

impl JobId {
    /// Create a new unique job ID.
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Parse a job ID from a string.
    pub fn parse(s: &str) -> Result<Self, ulid::DecodeError> {
        Ok(Self(Ulid::from_string(s)?))
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a job.
///
/// ```text
/// Delayed -> Waiting -> Active -> Completed
///               ^         |  \
///               |         |   -> Failed
///               +- Delayed <-+   (retry with backoff)
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Ready to run, held in the queue's waiting set.
    #[default]
    Waiting,
    /// Handed to a worker; the handler is running.
    Active,
    /// Parked on a timer, either an initial delay or a retry backoff.
    Delayed,
    /// The handler succeeded.
    Completed,
    /// The handler failed on the last permitted attempt.
    Failed,
}

impl JobStatus {
    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Get a simple status string for display.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Waiting => "waiting",
            JobStatus::Active => "active",
            JobStatus::Delayed => "delayed",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-submission options. Unset fields fall back to the queue's configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobOptions {
    /// Time to wait before the job first becomes eligible for dispatch.
    pub delay: Duration,
    /// Higher values are dispatched first.
    pub priority: i32,
    /// Ceiling on handler invocations.
    pub max_attempts: Option<u32>,
    /// Retry timing.
    pub backoff: Option<BackoffPolicy>,
}

impl JobOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = Some(backoff);
        self
    }

    /// Fail fast on values that can never produce a runnable job.
    pub fn validate(&self) -> Result<(), JobError> {
        if self.max_attempts == Some(0) {
            return Err(JobError::InvalidOptions(
                "max_attempts must be at least 1".into(),
            ));
        }
        if let Some(backoff) = &self.backoff {
            backoff.validate()?;
        }
        if chrono::Duration::from_std(self.delay).is_err() {
            return Err(JobError::InvalidOptions(format!(
                "delay {:?} is out of range",
                self.delay
            )));
        }
        Ok(())
    }
}

/// A job represents a unit of work owned by a single queue.
///
/// Only the owning queue moves a job between states; everyone else receives
/// snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier for this job.
    pub id: JobId,
    /// Name of the queue this job belongs to.
    pub queue: String,
    /// Application data handed to the handler.
    pub payload: serde_json::Value,
    /// Current status.
    pub status: JobStatus,
    /// Handler invocations so far.
    #[serde(default)]
    pub attempts: u32,
    /// Maximum number of handler invocations.
    pub max_attempts: u32,
    /// Execution priority, higher first.
    #[serde(default)]
    pub priority: i32,
    /// Retry timing for this job.
    #[serde(default)]
    pub backoff: BackoffPolicy,
    /// When the job was created.
    pub created_at: DateTime<Utc>,
    /// When a delayed job becomes eligible again.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_at: Option<DateTime<Utc>>,
    /// When the job last entered `Active`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispatched_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,
    /// Message of the most recent failed attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Value returned by the successful attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

impl Job {
    /// Create a new waiting job.
    pub fn new(queue: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: JobId::new(),
            queue: queue.into(),
            payload,
            status: JobStatus::Waiting,
            attempts: 0,
            max_attempts: 3,
            priority: 0,
            backoff: BackoffPolicy::default(),
            created_at: Utc::now(),
            run_at: None,
            dispatched_at: None,
            completed_at: None,
            failed_at: None,
            last_error: None,
            result: None,
        }
    }

    /// Set the priority for this job.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Set the maximum number of attempts for this job.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set the retry policy for this job.
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Start the job in `Delayed`, eligible at `run_at`.
    pub fn delayed_until(mut self, run_at: DateTime<Utc>) -> Self {
        self.status = JobStatus::Delayed;
        self.run_at = Some(run_at);
        self
    }

    /// Whether a failure now would still leave an attempt to retry with.
    pub fn can_retry(&self) -> bool {
        self.attempts < self.max_attempts
    }

    /// Timestamp of the terminal transition, if any.
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        match self.status {
            JobStatus::Completed => self.completed_at,
            JobStatus::Failed => self.failed_at,
            _ => None,
        }
    }

    /// `Delayed -> Waiting`.
    pub fn promote(&mut self) -> Result<(), JobError> {
        self.expect(JobStatus::Delayed, JobStatus::Waiting)?;
        self.status = JobStatus::Waiting;
        self.run_at = None;
        Ok(())
    }

    /// `Waiting -> Active`, consuming one attempt.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), JobError> {
        self.expect(JobStatus::Waiting, JobStatus::Active)?;
        if !self.can_retry() {
            return Err(JobError::AttemptsExhausted {
                job_id: self.id,
                attempts: self.attempts,
                max_attempts: self.max_attempts,
            });
        }
        self.attempts += 1;
        self.status = JobStatus::Active;
        self.dispatched_at = Some(now);
        Ok(())
    }

    /// `Active -> Completed`.
    pub fn complete(&mut self, result: serde_json::Value, now: DateTime<Utc>) -> Result<(), JobError> {
        self.expect(JobStatus::Active, JobStatus::Completed)?;
        self.status = JobStatus::Completed;
        self.result = Some(result);
        self.completed_at = Some(now);
        Ok(())
    }

    /// `Active -> Delayed` after a failed attempt that still has retries left.
    pub fn retry(&mut self, error: impl Into<String>, run_at: DateTime<Utc>) -> Result<(), JobError> {
        self.expect(JobStatus::Active, JobStatus::Delayed)?;
        if !self.can_retry() {
            return Err(JobError::AttemptsExhausted {
                job_id: self.id,
                attempts: self.attempts,
                max_attempts: self.max_attempts,
            });
        }
        self.status = JobStatus::Delayed;
        self.last_error = Some(error.into());
        self.run_at = Some(run_at);
        Ok(())
    }

    /// `Active -> Failed`. No further transitions are possible.
    pub fn fail(&mut self, error: impl Into<String>, now: DateTime<Utc>) -> Result<(), JobError> {
        self.expect(JobStatus::Active, JobStatus::Failed)?;
        self.status = JobStatus::Failed;
        self.last_error = Some(error.into());
        self.failed_at = Some(now);
        Ok(())
    }

    fn expect(&self, from: JobStatus, to: JobStatus) -> Result<(), JobError> {
        if self.status == from {
            Ok(())
        } else {
            Err(JobError::InvalidTransition {
                job_id: self.id,
                from: self.status,
                to,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn job() -> Job {
        Job::new("email", json!({"to": "a@example.com"}))
    }

    #[test]
    fn happy_path_records_timestamps_and_result() {
        let mut job = job();
        let now = Utc::now();

        job.start(now).unwrap();
        assert_eq!(job.status, JobStatus::Active);
        assert_eq!(job.attempts, 1);
        assert_eq!(job.dispatched_at, Some(now));

        job.complete(json!({"sent": true}), now).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.result, Some(json!({"sent": true})));
        assert_eq!(job.finished_at(), Some(now));
    }

    #[test]
    fn waiting_job_cannot_complete_directly() {
        let mut job = job();

        let err = job.complete(json!(null), Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            JobError::InvalidTransition {
                from: JobStatus::Waiting,
                to: JobStatus::Completed,
                ..
            }
        ));
        assert_eq!(job.status, JobStatus::Waiting);
    }

    #[test]
    fn delayed_job_must_be_promoted_before_start() {
        let now = Utc::now();
        let mut job = job().delayed_until(now);

        assert!(job.start(now).is_err());
        job.promote().unwrap();
        assert_eq!(job.run_at, None);
        job.start(now).unwrap();
        assert!(job.promote().is_err());
    }

    #[test]
    fn retry_path_then_exhaustion() {
        let now = Utc::now();
        let mut job = job().with_max_attempts(2);

        job.start(now).unwrap();
        assert!(job.can_retry());
        job.retry("smtp timeout", now).unwrap();
        assert_eq!(job.status, JobStatus::Delayed);
        assert_eq!(job.last_error.as_deref(), Some("smtp timeout"));

        job.promote().unwrap();
        job.start(now).unwrap();
        assert_eq!(job.attempts, 2);
        assert!(!job.can_retry());
        assert!(matches!(
            job.retry("again", now),
            Err(JobError::AttemptsExhausted { .. })
        ));

        job.fail("again", now).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.last_error.as_deref(), Some("again"));
        assert!(job.status.is_terminal());
        assert!(job.start(now).is_err());
    }

    #[test]
    fn options_validation() {
        assert!(JobOptions::new().validate().is_ok());
        assert!(JobOptions::new().with_max_attempts(0).validate().is_err());
        assert!(JobOptions::new()
            .with_backoff(BackoffPolicy::exponential().with_jitter(2.0))
            .validate()
            .is_err());
    }

    #[test]
    fn status_serializes_as_snake_case() {
        let value = serde_json::to_value(JobStatus::Completed).unwrap();
        assert_eq!(value, json!("completed"));
    }
}
