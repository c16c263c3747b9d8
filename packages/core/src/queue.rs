//! Queue configuration, state and statistics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{BackoffPolicy, JobError};

/// Current operational state of a queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueState {
    /// Queue is dispatching jobs.
    #[default]
    Running,
    /// Jobs are accepted but not dispatched.
    Paused,
    /// Queue is finishing outstanding work ahead of shutdown.
    Draining,
}

impl QueueState {
    /// Check if the queue may hand jobs to workers.
    pub fn is_dispatching(&self) -> bool {
        matches!(self, QueueState::Running | QueueState::Draining)
    }
}

impl std::fmt::Display for QueueState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueState::Running => write!(f, "running"),
            QueueState::Paused => write!(f, "paused"),
            QueueState::Draining => write!(f, "draining"),
        }
    }
}

/// Configuration for queue behavior, fixed when the queue is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum number of jobs running at once.
    pub concurrency: u32,
    /// Attempt ceiling for jobs that don't set their own.
    pub default_max_attempts: u32,
    /// Retry policy for jobs that don't set their own.
    pub backoff: BackoffPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            default_max_attempts: 3,
            backoff: BackoffPolicy::default(),
        }
    }
}

impl QueueConfig {
    pub fn with_concurrency(mut self, concurrency: u32) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.default_max_attempts = max_attempts;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn validate(&self) -> Result<(), JobError> {
        if self.concurrency == 0 {
            return Err(JobError::InvalidOptions(
                "concurrency must be at least 1".into(),
            ));
        }
        if self.default_max_attempts == 0 {
            return Err(JobError::InvalidOptions(
                "default_max_attempts must be at least 1".into(),
            ));
        }
        self.backoff.validate()
    }
}

/// Per-status job counts for one queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueStats {
    pub waiting: u64,
    pub active: u64,
    pub delayed: u64,
    pub completed: u64,
    pub failed: u64,
}

impl QueueStats {
    /// Jobs that have not reached a terminal state.
    pub fn pending(&self) -> u64 {
        self.waiting + self.active + self.delayed
    }

    /// Jobs in a terminal state.
    pub fn processed(&self) -> u64 {
        self.completed + self.failed
    }

    /// Every job still held by the queue.
    pub fn total(&self) -> u64 {
        self.pending() + self.processed()
    }

    /// Success rate as a percentage.
    pub fn success_rate(&self) -> Option<f64> {
        let total = self.processed();
        if total == 0 {
            None
        } else {
            Some((self.completed as f64 / total as f64) * 100.0)
        }
    }
}

/// Snapshot of a queue's metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueInfo {
    pub name: String,
    pub state: QueueState,
    pub config: QueueConfig,
    pub stats: QueueStats,
    /// Whether a handler has been registered; without one jobs stay waiting.
    pub has_handler: bool,
    pub created_at: DateTime<Utc>,
}
