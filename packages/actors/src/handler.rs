//! Job handler trait and registry.

use queue_core::Job;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Result type for job handlers. The error string becomes the job's
/// `last_error`.
pub type HandlerResult = Result<serde_json::Value, String>;

/// Future type for async job handlers.
pub type HandlerFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send>>;

/// Trait for job handlers.
///
/// A queue has at most one handler; it receives a snapshot of each job as
/// it becomes active.
pub trait JobHandler: Send + Sync + 'static {
    /// Process a job and return the result.
    fn handle(&self, job: Job) -> HandlerFuture;
}

impl std::fmt::Debug for dyn JobHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("JobHandler")
    }
}

/// Handlers keyed by queue name, bound in one pass at startup.
#[derive(Default)]
pub struct JobHandlerRegistry {
    handlers: BTreeMap<String, Arc<dyn JobHandler>>,
}

impl JobHandlerRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            handlers: BTreeMap::new(),
        }
    }

    /// Register a handler for a queue, replacing any earlier one.
    pub fn register<H: JobHandler>(&mut self, queue: impl Into<String>, handler: H) {
        self.handlers.insert(queue.into(), Arc::new(handler));
    }

    /// List all queues with a handler.
    pub fn queues(&self) -> Vec<&str> {
        self.handlers.keys().map(|s| s.as_str()).collect()
    }

    /// Iterate over `(queue, handler)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn JobHandler>)> {
        self.handlers.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// A simple function-based job handler.
pub struct FnHandler<F> {
    handler: F,
}

impl<F, Fut> FnHandler<F>
where
    F: Fn(Job) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    /// Create a new function-based handler.
    pub fn new(handler: F) -> Self {
        Self { handler }
    }
}

impl<F, Fut> JobHandler for FnHandler<F>
where
    F: Fn(Job) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn handle(&self, job: Job) -> HandlerFuture {
        Box::pin((self.handler)(job))
    }
}

/// Wrap an async closure as a [`JobHandler`].
pub fn handler_fn<F, Fut>(handler: F) -> FnHandler<F>
where
    F: Fn(Job) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    FnHandler::new(handler)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_keeps_one_handler_per_queue() {
        let mut registry = JobHandlerRegistry::new();
        registry.register("orders", handler_fn(|_job| async { Ok(serde_json::json!(1)) }));
        registry.register("email", handler_fn(|_job| async { Ok(serde_json::json!(2)) }));
        registry.register("orders", handler_fn(|_job| async { Ok(serde_json::json!(3)) }));

        assert_eq!(registry.queues(), vec!["email", "orders"]);
        assert_eq!(registry.iter().count(), 2);
    }
}
