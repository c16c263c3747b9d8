//! Bootstrap configuration.

use std::time::Duration;

use actors::{ConfigError, ServiceConfig, env_var};
use queue_core::QueueConfig;
use serde::{Deserialize, Serialize};

/// Queues wired at startup, with their default concurrency.
pub const DEFAULT_QUEUES: [(&str, u32); 4] = [
    ("email", 5),
    ("orders", 3),
    ("analytics", 10),
    ("cleanup", 1),
];

/// Configuration for [`crate::init_job_queue`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    pub service: ServiceConfig,
    /// How long finished jobs are kept before the cleanup queue removes them.
    pub retention: Duration,
    /// Interval between scheduled cleanup jobs. Zero disables the trigger.
    pub cleanup_interval: Duration,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        let service = DEFAULT_QUEUES
            .iter()
            .fold(ServiceConfig::default(), |config, (name, concurrency)| {
                let queue = config.default_queue.clone().with_concurrency(*concurrency);
                config.with_queue(*name, queue)
            });

        Self {
            service,
            retention: Duration::from_secs(24 * 60 * 60),
            cleanup_interval: Duration::from_secs(60 * 60),
        }
    }
}

impl BootstrapConfig {
    /// Build from the environment.
    ///
    /// Reads everything [`ServiceConfig::from_env`] does, plus
    /// `QUEUE_<NAME>_CONCURRENCY` for each default queue,
    /// `QUEUE_RETENTION_SECS` and `QUEUE_CLEANUP_INTERVAL_SECS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let mut service = ServiceConfig::from_env()?;

        for (name, fallback) in DEFAULT_QUEUES {
            let var = format!("QUEUE_{}_CONCURRENCY", name.to_uppercase());
            let concurrency = env_var(&var)?.unwrap_or(fallback);
            let queue: QueueConfig = service.default_queue.clone().with_concurrency(concurrency);
            service = service.with_queue(name, queue);
        }

        let retention = env_var("QUEUE_RETENTION_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.retention);
        let cleanup_interval = env_var("QUEUE_CLEANUP_INTERVAL_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.cleanup_interval);

        Ok(Self {
            service,
            retention,
            cleanup_interval,
        })
    }

    pub fn with_service(mut self, service: ServiceConfig) -> Self {
        self.service = service;
        self
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }
}
