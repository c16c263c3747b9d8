//! Bootstrapper for the in-process job queue.
//!
//! Wires the default queues (`email`, `orders`, `analytics`, `cleanup`) to
//! their handlers and runs the periodic maintenance that keeps finished
//! jobs from piling up.

mod config;
pub mod handlers;
mod init;

pub use config::{BootstrapConfig, DEFAULT_QUEUES};
pub use init::{init_job_queue, spawn_event_logger, spawn_maintenance};
