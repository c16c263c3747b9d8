//! Server initialization for the job queue system.

use std::time::Duration;

use actors::{JobHandlerRegistry, QueueResult, QueueService, handler_fn};
use queue_core::{JobEvent, JobOptions};
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::config::BootstrapConfig;
use crate::handlers::{CleanupHandler, process_order, record_analytics, send_email};

/// Initialize the job queue system.
///
/// Starts the service, binds the default queues to their handlers and
/// spawns the event logger and the periodic cleanup trigger. Call once at
/// startup, before producers enqueue work.
pub async fn init_job_queue(config: BootstrapConfig) -> QueueResult<QueueService> {
    tracing::info!("Initializing job queue system...");

    let service = QueueService::start(config.service.clone()).await?;
    spawn_event_logger(&service);

    let mut handlers = JobHandlerRegistry::new();
    handlers.register("email", handler_fn(send_email));
    handlers.register("orders", handler_fn(process_order));
    handlers.register("analytics", handler_fn(record_analytics));
    handlers.register("cleanup", CleanupHandler::new(service.clone(), config.retention));

    for (queue, handler) in handlers.iter() {
        service.register_shared(queue, handler.clone()).await?;
    }
    tracing::info!("Registered handlers for {}", handlers.queues().join(", "));

    if !config.cleanup_interval.is_zero() {
        spawn_maintenance(service.clone(), config.cleanup_interval);
    }

    tracing::info!("Job queue system initialized");
    Ok(service)
}

/// Log every lifecycle event until the service shuts down.
pub fn spawn_event_logger(service: &QueueService) -> JoinHandle<()> {
    let mut rx = service.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => match &event {
                    JobEvent::JobFailed { .. } | JobEvent::JobRetrying { .. } => {
                        tracing::warn!("{}", event.description())
                    }
                    JobEvent::JobStarted { .. } | JobEvent::JobWaiting { .. } => {
                        tracing::trace!("{}", event.description())
                    }
                    _ => tracing::debug!("{}", event.description()),
                },
                Err(RecvError::Lagged(n)) => tracing::warn!("Event logger skipped {} events", n),
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// Enqueue a `cleanup` job every `interval`, starting one interval from now.
pub fn spawn_maintenance(service: QueueService, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + interval;
        let mut ticker = tokio::time::interval_at(start, interval);
        loop {
            ticker.tick().await;
            match service
                .add_job("cleanup", json!({}), JobOptions::default())
                .await
            {
                Ok(job) => tracing::debug!("Scheduled cleanup job {}", job.id),
                Err(e) => {
                    tracing::warn!("Stopping maintenance trigger: {}", e);
                    break;
                }
            }
        }
    })
}
