//! Service configuration.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use queue_core::QueueConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {name}")]
    InvalidVar { name: String, value: String },
}

/// Runtime configuration for a [`crate::QueueService`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Capacity of the broadcast channel carrying job events.
    pub event_capacity: usize,
    /// Configuration for queues without an explicit override.
    pub default_queue: QueueConfig,
    /// Per-queue overrides, applied when the queue is first created.
    pub queues: BTreeMap<String, QueueConfig>,
    /// How long shutdown waits for queues to drain.
    pub shutdown_grace: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            event_capacity: 1024,
            default_queue: QueueConfig::default(),
            queues: BTreeMap::new(),
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

impl ServiceConfig {
    /// Build a config from `QUEUE_*` environment variables, falling back to
    /// defaults for anything unset.
    ///
    /// - `QUEUE_EVENT_CAPACITY`
    /// - `QUEUE_DEFAULT_CONCURRENCY`
    /// - `QUEUE_DEFAULT_MAX_ATTEMPTS`
    /// - `QUEUE_SHUTDOWN_GRACE_SECS`
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(capacity) = env_var("QUEUE_EVENT_CAPACITY")? {
            config.event_capacity = capacity;
        }
        if let Some(concurrency) = env_var("QUEUE_DEFAULT_CONCURRENCY")? {
            config.default_queue.concurrency = concurrency;
        }
        if let Some(max_attempts) = env_var("QUEUE_DEFAULT_MAX_ATTEMPTS")? {
            config.default_queue.default_max_attempts = max_attempts;
        }
        if let Some(secs) = env_var("QUEUE_SHUTDOWN_GRACE_SECS")? {
            config.shutdown_grace = Duration::from_secs(secs);
        }
        Ok(config)
    }

    /// Set the event channel capacity.
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Set the configuration used by queues without an override.
    pub fn with_default_queue(mut self, config: QueueConfig) -> Self {
        self.default_queue = config;
        self
    }

    /// Override the configuration of one named queue.
    pub fn with_queue(mut self, name: impl Into<String>, config: QueueConfig) -> Self {
        self.queues.insert(name.into(), config);
        self
    }

    /// Set the shutdown grace period.
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Configuration a queue gets when created without explicit options.
    pub fn queue_config(&self, name: &str) -> QueueConfig {
        self.queues
            .get(name)
            .cloned()
            .unwrap_or_else(|| self.default_queue.clone())
    }
}

/// Read and parse an environment variable. Unset variables yield `None`.
pub fn env_var<T: FromStr>(name: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidVar {
                name: name.to_string(),
                value,
            }),
        Err(_) => Ok(None),
    }
}
