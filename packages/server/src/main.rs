use queue_core::JobOptions;
use serde_json::json;
use server::{BootstrapConfig, init_job_queue};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let config = BootstrapConfig::from_env()?;
    let grace = config.service.shutdown_grace;
    let service = init_job_queue(config).await?;
    if actors::install_global(service.clone()).is_err() {
        tracing::warn!("A global queue service was already installed");
    }

    // Demo traffic so a fresh process shows the queues working.
    service
        .add_job(
            "email",
            json!({ "to": "welcome@example.com", "subject": "Welcome" }),
            JobOptions::default(),
        )
        .await?;
    service
        .add_job("orders", json!({ "order_id": 1001 }), JobOptions::new().with_priority(10))
        .await?;
    service
        .add_job("analytics", json!({ "event": "startup" }), JobOptions::default())
        .await?;

    tracing::info!("Job queue running; press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down (grace {:?})", grace);
    let undrained = service.shutdown(grace).await?;
    if undrained.is_empty() {
        tracing::info!("All queues drained");
    } else {
        tracing::warn!("Queues not drained before exit: {}", undrained.join(", "));
    }
    Ok(())
}
