//! Worker actor for executing jobs.

use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use queue_core::JobId;
use ractor::{Actor, ActorProcessingErr, ActorRef};

use crate::messages::{QueueMessage, WorkerMessage};

/// State for the worker actor.
pub struct WorkerActorState {
    /// Name of the queue this worker serves.
    pub queue_name: String,
    /// Queue actor reference.
    pub queue: ActorRef<QueueMessage>,
    /// Job currently being processed.
    pub current_job: Option<JobId>,
}

/// Worker actor arguments.
pub struct WorkerArgs {
    pub queue_name: String,
    pub queue: ActorRef<QueueMessage>,
}

/// Worker actor that executes jobs on behalf of one queue.
///
/// Handlers run here, off the queue actor's mailbox, so a slow handler never
/// blocks dispatch. The outcome goes back to the queue as `JobSettled`.
pub struct WorkerActor;

impl Actor for WorkerActor {
    type Msg = WorkerMessage;
    type State = WorkerActorState;
    type Arguments = WorkerArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::debug!("Starting worker {} for queue {}", myself.get_id(), args.queue_name);
        Ok(WorkerActorState {
            queue_name: args.queue_name,
            queue: args.queue,
            current_job: None,
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            WorkerMessage::ProcessJob { job, handler } => {
                let job_id = job.id;
                state.current_job = Some(job_id);
                tracing::debug!(
                    "Worker {} running job {} (attempt {})",
                    myself.get_id(),
                    job_id,
                    job.attempts
                );

                let outcome = AssertUnwindSafe(handler.handle(*job))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| Err(panic_message(panic.as_ref())));

                state.current_job = None;
                state.queue.send_message(QueueMessage::JobSettled {
                    job_id,
                    worker: myself.get_id(),
                    outcome,
                })?;
            }

            WorkerMessage::Shutdown => {
                tracing::debug!("Shutting down worker {} for queue {}", myself.get_id(), state.queue_name);
                myself.stop(None);
            }
        }

        Ok(())
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("handler panicked: {}", detail)
}
