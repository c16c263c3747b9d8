//! Demo handlers for the default queues.
//!
//! Real deployments replace these with the email transport, order
//! processing and analytics sinks; the queues only see the
//! [`JobHandler`] contract.

use std::time::Duration;

use actors::{HandlerFuture, HandlerResult, JobHandler, QueueService};
use queue_core::{Job, JobStatus};
use serde_json::json;

/// `email`: payload must carry a string `to`.
pub async fn send_email(job: Job) -> HandlerResult {
    let to = job
        .payload
        .get("to")
        .and_then(|v| v.as_str())
        .ok_or("email job is missing a recipient 'to'")?;
    let subject = job
        .payload
        .get("subject")
        .and_then(|v| v.as_str())
        .unwrap_or("(no subject)");

    tracing::info!("Sending email to {}: {}", to, subject);
    Ok(json!({ "sent_to": to }))
}

/// `orders`: payload must carry an `order_id`.
pub async fn process_order(job: Job) -> HandlerResult {
    let order_id = job
        .payload
        .get("order_id")
        .filter(|v| !v.is_null())
        .cloned()
        .ok_or("order job is missing 'order_id'")?;

    tracing::info!("Processing order {}", order_id);
    Ok(json!({ "order_id": order_id, "processed": true }))
}

/// `analytics`: records any payload.
pub async fn record_analytics(job: Job) -> HandlerResult {
    tracing::debug!("Analytics event {}: {}", job.id, job.payload);
    Ok(json!({ "recorded": true }))
}

/// `cleanup`: removes finished jobs from every queue.
///
/// Jobs older than the retention are removed unless the payload sets
/// `older_than_secs`.
pub struct CleanupHandler {
    service: QueueService,
    retention: Duration,
}

impl CleanupHandler {
    pub fn new(service: QueueService, retention: Duration) -> Self {
        Self { service, retention }
    }
}

impl JobHandler for CleanupHandler {
    fn handle(&self, job: Job) -> HandlerFuture {
        let service = self.service.clone();
        let older_than = job
            .payload
            .get("older_than_secs")
            .and_then(|v| v.as_u64())
            .map(Duration::from_secs)
            .unwrap_or(self.retention);

        Box::pin(async move {
            let queues = service.queues().await.map_err(|e| e.to_string())?;
            let mut removed = 0;
            for queue in queues {
                for status in [JobStatus::Completed, JobStatus::Failed] {
                    removed += queue
                        .clean(status, Some(older_than))
                        .await
                        .map_err(|e| e.to_string())?;
                }
            }

            tracing::info!("Cleanup removed {} jobs older than {:?}", removed, older_than);
            Ok(json!({ "removed": removed }))
        })
    }
}
