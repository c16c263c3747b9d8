#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use actors::{ManualTimer, QueueError, QueueService, ServiceConfig};
use queue_core::{JobEvent, JobId, JobStatus};
use tokio::sync::broadcast::{Receiver, error::RecvError};

/// Upper bound for any single wait in these tests.
const EVENT_TIMEOUT: Duration = Duration::from_secs(60);

pub async fn start_service() -> Result<QueueService, QueueError> {
    QueueService::start(ServiceConfig::default()).await
}

pub async fn start_manual() -> Result<(QueueService, Arc<ManualTimer>), QueueError> {
    let timer = Arc::new(ManualTimer::new());
    let service = QueueService::start_with_timer(ServiceConfig::default(), timer.clone()).await?;
    Ok((service, timer))
}

/// Receive events until one matches, returning every event seen.
pub async fn collect_until<F>(rx: &mut Receiver<JobEvent>, mut done: F) -> Vec<JobEvent>
where
    F: FnMut(&JobEvent) -> bool,
{
    let mut seen = Vec::new();
    let result = tokio::time::timeout(EVENT_TIMEOUT, async {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let finished = done(&event);
                    seen.push(event);
                    if finished {
                        return;
                    }
                }
                Err(RecvError::Lagged(n)) => panic!("event receiver lagged by {}", n),
                Err(RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await;
    assert!(result.is_ok(), "timed out waiting for event; saw {:#?}", seen);
    seen
}

/// Receive events until one matches and return it.
pub async fn wait_for<F>(rx: &mut Receiver<JobEvent>, done: F) -> JobEvent
where
    F: FnMut(&JobEvent) -> bool,
{
    let mut seen = collect_until(rx, done).await;
    seen.pop().expect("collect_until returns the matching event")
}

/// Receive events until `count` events satisfy `pred`.
pub async fn collect_n<F>(rx: &mut Receiver<JobEvent>, count: usize, mut pred: F) -> Vec<JobEvent>
where
    F: FnMut(&JobEvent) -> bool,
{
    let mut matched = 0;
    collect_until(rx, |event| {
        if pred(event) {
            matched += 1;
        }
        matched >= count
    })
    .await
}

pub fn is_terminal(event: &JobEvent) -> bool {
    matches!(event, JobEvent::JobCompleted { .. } | JobEvent::JobFailed { .. })
}

pub fn started_ids(events: &[JobEvent]) -> Vec<JobId> {
    events
        .iter()
        .filter_map(|e| match e {
            JobEvent::JobStarted { job_id, .. } => Some(*job_id),
            _ => None,
        })
        .collect()
}

/// Status sequence a job went through, as seen by an event subscriber.
pub fn status_trail(events: &[JobEvent], job_id: JobId) -> Vec<JobStatus> {
    events
        .iter()
        .filter(|e| e.job_id() == Some(job_id))
        .filter_map(|e| e.job_status())
        .collect()
}
