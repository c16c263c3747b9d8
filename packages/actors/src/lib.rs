//! Actor runtime for the in-process job queue.
//!
//! This crate provides the Ractor-based actors that own queues and run
//! jobs, plus the async facade producers and consumers call.
//!
//! # Architecture
//!
//! - `Supervisor` - Registry actor mapping queue names to queue actors
//! - `QueueActor` - Owns one queue's jobs, waiting set and concurrency slots
//! - `WorkerActor` - Runs one job at a time for its queue
//! - `QueueService` - Clonable handle used by the rest of the process
//!
//! # Usage
//!
//! ```ignore
//! use actors::{QueueService, ServiceConfig, handler_fn};
//! use queue_core::JobOptions;
//!
//! let service = QueueService::start(ServiceConfig::default()).await?;
//! service
//!     .register_processor("email", handler_fn(|job| async move { Ok(job.payload) }))
//!     .await?;
//! service.add_job("email", payload, JobOptions::default()).await?;
//! ```

mod config;
mod error;
mod handler;
mod messages;
mod queue_actor;
pub mod registry;
mod service;
mod supervisor;
mod timer;
mod worker_actor;

pub use config::{ConfigError, ServiceConfig, env_var};
pub use error::{QueueError, QueueResult};
pub use handler::{FnHandler, HandlerFuture, HandlerResult, JobHandler, JobHandlerRegistry, handler_fn};
pub use messages::{QueueMessage, SupervisorMessage, WorkerMessage};
pub use queue_actor::{QueueActor, QueueArgs};
pub use registry::{global_service, install_global};
pub use service::{QueueHandle, QueueService};
pub use supervisor::{Supervisor, SupervisorArgs, start_supervisor};
pub use timer::{ManualTimer, Timer, TimerCallback, TokioTimer};
pub use worker_actor::WorkerActor;

/// Re-export ractor types for convenience.
pub use ractor::{Actor, ActorRef, RpcReplyPort, concurrency};
