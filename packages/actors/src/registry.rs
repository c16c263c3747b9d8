//! Process-wide queue service.

use std::sync::OnceLock;

use crate::service::QueueService;

/// Global service instance.
static SERVICE: OnceLock<QueueService> = OnceLock::new();

/// Install the process-wide service. Fails with the rejected service if one
/// is already installed.
pub fn install_global(service: QueueService) -> Result<(), QueueService> {
    SERVICE.set(service)
}

/// Get the process-wide service, if one has been installed.
///
/// This provides a way to reach the queues without passing the service
/// through the entire call stack.
pub fn global_service() -> Option<&'static QueueService> {
    SERVICE.get()
}
