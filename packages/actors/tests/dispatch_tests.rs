#![allow(clippy::disallowed_methods)]

mod common;

use std::error::Error;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use actors::{HandlerFuture, JobHandler, QueueError, handler_fn};
use queue_core::{
    BackoffPolicy, Job, JobError, JobEvent, JobOptions, JobStatus, QueueConfig, QueueState,
};
use serde_json::json;

use common::{collect_n, is_terminal, start_service, started_ids, wait_for};

#[tokio::test]
async fn test_fifo_within_equal_priority() -> Result<(), Box<dyn Error>> {
    let service = start_service().await?;
    let mut rx = service.subscribe();

    service
        .get_or_create("email", Some(QueueConfig::default().with_concurrency(1)))
        .await?;
    let job1 = service.add_job("email", json!({"n": 1}), JobOptions::default()).await?;
    let job2 = service.add_job("email", json!({"n": 2}), JobOptions::default()).await?;
    assert_eq!(job1.status, JobStatus::Waiting);

    service
        .register_processor("email", handler_fn(|_job| async { Ok(json!("sent")) }))
        .await?;

    let events = collect_n(&mut rx, 2, |e| matches!(e, JobEvent::JobCompleted { .. })).await;
    let job1_done = events
        .iter()
        .position(|e| matches!(e, JobEvent::JobCompleted { job_id, .. } if *job_id == job1.id))
        .expect("job1 completed");
    let job2_started = events
        .iter()
        .position(|e| matches!(e, JobEvent::JobStarted { job_id, .. } if *job_id == job2.id))
        .expect("job2 started");
    assert!(job1_done < job2_started, "job1 must complete before job2 starts");

    let stats = service.stats().await?;
    let email = stats["email"];
    assert_eq!(email.completed, 2);
    assert_eq!(email.waiting, 0);
    assert_eq!(email.active, 0);

    let done = service.queue("email").await?.get_job(job1.id).await?.expect("job kept");
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.result, Some(json!("sent")));
    assert_eq!(done.attempts, 1);
    assert!(done.dispatched_at.is_some() && done.completed_at.is_some());
    Ok(())
}

#[tokio::test]
async fn test_priority_beats_arrival_order() -> Result<(), Box<dyn Error>> {
    let service = start_service().await?;
    let mut rx = service.subscribe();

    let low = service
        .add_job("orders", json!("b"), JobOptions::new().with_priority(5))
        .await?;
    let high = service
        .add_job("orders", json!("a"), JobOptions::new().with_priority(10))
        .await?;
    let mid_first = service
        .add_job("orders", json!("c"), JobOptions::new().with_priority(7))
        .await?;
    let mid_second = service
        .add_job("orders", json!("d"), JobOptions::new().with_priority(7))
        .await?;

    service
        .register_processor("orders", handler_fn(|_job| async { Ok(json!(null)) }))
        .await?;

    let events = collect_n(&mut rx, 4, |e| matches!(e, JobEvent::JobCompleted { .. })).await;
    assert_eq!(
        started_ids(&events),
        vec![high.id, mid_first.id, mid_second.id, low.id]
    );
    Ok(())
}

#[tokio::test]
async fn test_concurrency_bound_is_never_exceeded() -> Result<(), Box<dyn Error>> {
    let service = start_service().await?;
    let mut rx = service.subscribe();

    service
        .get_or_create("analytics", Some(QueueConfig::default().with_concurrency(2)))
        .await?;

    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    {
        let running = running.clone();
        let peak = peak.clone();
        service
            .register_processor(
                "analytics",
                handler_fn(move |_job| {
                    let running = running.clone();
                    let peak = peak.clone();
                    async move {
                        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(30)).await;
                        running.fetch_sub(1, Ordering::SeqCst);
                        Ok(json!(null))
                    }
                }),
            )
            .await?;
    }

    for n in 0..6 {
        service
            .add_job("analytics", json!({ "n": n }), JobOptions::default())
            .await?;
    }

    let events = collect_n(&mut rx, 6, |e| matches!(e, JobEvent::JobCompleted { .. })).await;

    let mut active: i64 = 0;
    let mut max_active: i64 = 0;
    for event in &events {
        match event {
            JobEvent::JobStarted { .. } => active += 1,
            JobEvent::JobCompleted { .. } => active -= 1,
            _ => {}
        }
        max_active = max_active.max(active);
    }
    assert_eq!(max_active, 2);
    assert!(peak.load(Ordering::SeqCst) <= 2);

    let stats = service.queue("analytics").await?.stats().await?;
    assert_eq!(stats.completed, 6);
    assert_eq!(stats.active, 0);
    Ok(())
}

#[tokio::test]
async fn test_jobs_wait_until_a_handler_is_registered() -> Result<(), Box<dyn Error>> {
    let service = start_service().await?;
    let mut rx = service.subscribe();

    for n in 0..3 {
        service.add_job("cleanup", json!(n), JobOptions::default()).await?;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    let queue = service.queue("cleanup").await?;
    let info = queue.info().await?;
    assert!(!info.has_handler);
    assert_eq!(info.stats.waiting, 3);
    assert_eq!(info.stats.active, 0);

    queue
        .register_handler(handler_fn(|job| async move { Ok(job.payload) }))
        .await?;
    collect_n(&mut rx, 3, is_terminal).await;

    assert_eq!(queue.stats().await?.completed, 3);
    Ok(())
}

#[tokio::test]
async fn test_second_registration_replaces_handler() -> Result<(), Box<dyn Error>> {
    let service = start_service().await?;
    let mut rx = service.subscribe();

    let replaced = service
        .register_processor("email", handler_fn(|_job| async { Ok(json!("first")) }))
        .await?;
    assert!(!replaced);

    let replaced = service
        .register_processor("email", handler_fn(|_job| async { Ok(json!("second")) }))
        .await?;
    assert!(replaced);

    let event = wait_for(&mut rx, |e| {
        matches!(e, JobEvent::HandlerRegistered { replaced: true, .. })
    })
    .await;
    assert_eq!(event.queue(), "email");

    let job = service.add_job("email", json!({}), JobOptions::default()).await?;
    wait_for(&mut rx, |e| {
        matches!(e, JobEvent::JobCompleted { job_id, .. } if *job_id == job.id)
    })
    .await;

    let job = service.queue("email").await?.get_job(job.id).await?.expect("job kept");
    assert_eq!(job.result, Some(json!("second")));
    Ok(())
}

#[tokio::test]
async fn test_paused_queue_holds_jobs_until_resumed() -> Result<(), Box<dyn Error>> {
    let service = start_service().await?;
    let mut rx = service.subscribe();

    let queue = service.get_or_create("orders", None).await?;
    queue
        .register_handler(handler_fn(|_job| async { Ok(json!(null)) }))
        .await?;
    queue.pause()?;
    let job = queue.add(json!({"order_id": 1}), JobOptions::default()).await?;

    tokio::time::sleep(Duration::from_millis(50)).await;
    let info = queue.info().await?;
    assert_eq!(info.state, QueueState::Paused);
    assert_eq!(info.stats.waiting, 1);

    queue.resume()?;
    wait_for(&mut rx, |e| {
        matches!(e, JobEvent::JobCompleted { job_id, .. } if *job_id == job.id)
    })
    .await;
    assert_eq!(queue.info().await?.state, QueueState::Running);
    Ok(())
}

#[tokio::test]
async fn test_invalid_options_fail_fast() -> Result<(), Box<dyn Error>> {
    let service = start_service().await?;

    let err = service
        .add_job("email", json!({}), JobOptions::new().with_max_attempts(0))
        .await
        .unwrap_err();
    assert!(matches!(err, QueueError::Job(JobError::InvalidOptions(_))));
    assert!(service.stats().await?.is_empty());

    let err = service
        .get_or_create("bad", Some(QueueConfig::default().with_concurrency(0)))
        .await
        .unwrap_err();
    assert!(matches!(err, QueueError::Job(JobError::InvalidOptions(_))));
    assert!(matches!(
        service.queue("bad").await,
        Err(QueueError::QueueNotFound(_))
    ));
    Ok(())
}

#[tokio::test]
async fn test_get_or_create_is_idempotent() -> Result<(), Box<dyn Error>> {
    let service = start_service().await?;

    let first = service
        .get_or_create("email", Some(QueueConfig::default().with_concurrency(3)))
        .await?;
    let second = service
        .get_or_create("email", Some(QueueConfig::default().with_concurrency(9)))
        .await?;
    service.get_or_create("orders", None).await?;

    assert_eq!(first.name(), second.name());
    assert_eq!(second.info().await?.config.concurrency, 3);

    let names: Vec<String> = service
        .queues()
        .await?
        .iter()
        .map(|q| q.name().to_string())
        .collect();
    assert_eq!(names, vec!["email".to_string(), "orders".to_string()]);
    Ok(())
}

#[tokio::test]
async fn test_panicking_handler_counts_as_failed_attempt() -> Result<(), Box<dyn Error>> {
    let service = start_service().await?;
    let mut rx = service.subscribe();

    service
        .register_processor(
            "email",
            handler_fn(|job| async move {
                if job.attempts == 1 {
                    panic!("template missing");
                }
                Ok(json!("recovered"))
            }),
        )
        .await?;

    let job = service
        .add_job(
            "email",
            json!({}),
            JobOptions::new()
                .with_max_attempts(2)
                .with_backoff(BackoffPolicy::fixed(Duration::ZERO)),
        )
        .await?;

    let retrying = wait_for(&mut rx, |e| matches!(e, JobEvent::JobRetrying { .. })).await;
    match retrying {
        JobEvent::JobRetrying { error, .. } => {
            assert_eq!(error, "handler panicked: template missing")
        }
        other => panic!("unexpected event {:?}", other),
    }

    wait_for(&mut rx, |e| {
        matches!(e, JobEvent::JobCompleted { job_id, .. } if *job_id == job.id)
    })
    .await;
    let job = service.queue("email").await?.get_job(job.id).await?.expect("job kept");
    assert_eq!(job.attempts, 2);
    assert_eq!(job.result, Some(json!("recovered")));
    Ok(())
}

/// Panics while building the future, taking the worker actor down with it.
struct PanicsOnFirstAttempt;

impl JobHandler for PanicsOnFirstAttempt {
    fn handle(&self, job: Job) -> HandlerFuture {
        if job.attempts == 1 {
            panic!("sync boom");
        }
        Box::pin(async move { Ok(job.payload) })
    }
}

#[tokio::test]
async fn test_dead_worker_is_replaced_and_job_retried() -> Result<(), Box<dyn Error>> {
    let service = start_service().await?;
    let mut rx = service.subscribe();

    let queue = service
        .get_or_create("orders", Some(QueueConfig::default().with_concurrency(1)))
        .await?;
    queue.register_handler(PanicsOnFirstAttempt).await?;

    let job = queue
        .add(
            json!({"order_id": 1}),
            JobOptions::new()
                .with_max_attempts(3)
                .with_backoff(BackoffPolicy::fixed(Duration::ZERO)),
        )
        .await?;
    wait_for(&mut rx, |e| {
        matches!(e, JobEvent::JobCompleted { job_id, .. } if *job_id == job.id)
    })
    .await;

    let job = queue.get_job(job.id).await?.expect("job kept");
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.attempts, 2);
    let last_error = job.last_error.unwrap_or_default();
    assert!(last_error.starts_with("worker exited: "), "{}", last_error);
    assert!(last_error.contains("sync boom"), "{}", last_error);

    // The only slot now belongs to the replacement worker.
    let next = queue
        .add(json!({"order_id": 2}), JobOptions::new().with_max_attempts(1))
        .await?;
    wait_for(&mut rx, |e| {
        matches!(e, JobEvent::JobCompleted { job_id, .. } if *job_id == next.id)
    })
    .await;
    let stats = queue.stats().await?;
    assert_eq!(stats.completed, 2);
    assert_eq!(stats.active, 0);
    Ok(())
}

#[tokio::test]
async fn test_drain_restores_the_previous_state() -> Result<(), Box<dyn Error>> {
    let service = start_service().await?;

    let queue = service.get_or_create("email", None).await?;
    queue
        .register_handler(handler_fn(|_job| async { Ok(json!(null)) }))
        .await?;
    queue.add(json!({"to": "a@example.com"}), JobOptions::default()).await?;

    let stats = queue.drain(Duration::from_secs(10)).await?;
    assert_eq!(stats.completed, 1);
    assert_eq!(queue.info().await?.state, QueueState::Running);

    queue.pause()?;
    queue.add(json!({"to": "b@example.com"}), JobOptions::default()).await?;
    let stats = queue.drain(Duration::from_secs(10)).await?;
    assert_eq!(stats.completed, 2);
    assert_eq!(queue.info().await?.state, QueueState::Paused);

    let job = queue.add(json!({"to": "c@example.com"}), JobOptions::default()).await?;
    tokio::time::sleep(Duration::from_millis(50)).await;
    let held = queue.get_job(job.id).await?.expect("job kept");
    assert_eq!(held.status, JobStatus::Waiting);
    Ok(())
}
