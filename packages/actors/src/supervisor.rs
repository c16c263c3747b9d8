//! Supervisor actor: the registry of named queues.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use queue_core::{JobEvent, QueueConfig};
use ractor::{Actor, ActorProcessingErr, ActorRef, SupervisionEvent};
use tokio::sync::broadcast;

use crate::config::ServiceConfig;
use crate::error::QueueError;
use crate::messages::{QueueMessage, SupervisorMessage};
use crate::queue_actor::{QueueActor, QueueArgs};
use crate::timer::Timer;

/// Arguments for the supervisor actor.
pub struct SupervisorArgs {
    pub config: ServiceConfig,
    pub timer: Arc<dyn Timer>,
    pub event_tx: broadcast::Sender<JobEvent>,
}

/// State for the supervisor actor.
pub struct SupervisorState {
    /// All queue actors by name.
    pub queues: HashMap<String, ActorRef<QueueMessage>>,
    /// Configuration for queues created on demand.
    pub config: ServiceConfig,
    /// Timer shared by every queue.
    pub timer: Arc<dyn Timer>,
    /// Event broadcaster.
    pub event_tx: broadcast::Sender<JobEvent>,
}

impl SupervisorState {
    /// Create a new supervisor state.
    pub fn new(args: SupervisorArgs) -> Self {
        Self {
            queues: HashMap::new(),
            config: args.config,
            timer: args.timer,
            event_tx: args.event_tx,
        }
    }
}

async fn spawn_queue_actor(
    myself: &ActorRef<SupervisorMessage>,
    state: &mut SupervisorState,
    name: String,
    config: QueueConfig,
) -> Result<ActorRef<QueueMessage>, QueueError> {
    config.validate()?;

    let args = QueueArgs {
        name: name.clone(),
        config: config.clone(),
        timer: state.timer.clone(),
        event_tx: state.event_tx.clone(),
    };

    // Unnamed: ractor names are process-global and several services may
    // share a process.
    let (actor, _handle) = Actor::spawn_linked(None, QueueActor, args, myself.get_cell())
        .await
        .map_err(|e| QueueError::Actor(format!("Failed to spawn queue: {}", e)))?;

    state.queues.insert(name.clone(), actor.clone());
    let _ = state.event_tx.send(JobEvent::QueueCreated {
        queue: name,
        config,
        timestamp: Utc::now(),
    });

    Ok(actor)
}

/// Supervisor actor that owns the name -> queue map.
///
/// It only ever adds or looks up whole queues; job state stays inside each
/// queue actor.
pub struct Supervisor;

impl Actor for Supervisor {
    type Msg = SupervisorMessage;
    type State = SupervisorState;
    type Arguments = SupervisorArgs;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting job queue supervisor");
        Ok(SupervisorState::new(args))
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SupervisorMessage::GetOrCreate {
                name,
                config,
                reply,
            } => {
                if let Some(queue) = state.queues.get(&name) {
                    if config.is_some() {
                        tracing::debug!("Queue '{}' already exists; ignoring new config", name);
                    }
                    let _ = reply.send(Ok(queue.clone()));
                    return Ok(());
                }

                let config = config.unwrap_or_else(|| state.config.queue_config(&name));
                let result = spawn_queue_actor(&myself, state, name, config).await;
                let _ = reply.send(result);
            }

            SupervisorMessage::GetQueue { name, reply } => {
                let _ = reply.send(state.queues.get(&name).cloned());
            }

            SupervisorMessage::ListQueues { reply } => {
                let mut queues: Vec<_> = state
                    .queues
                    .iter()
                    .map(|(name, queue)| (name.clone(), queue.clone()))
                    .collect();
                queues.sort_by(|a, b| a.0.cmp(&b.0));
                let _ = reply.send(queues);
            }

            SupervisorMessage::Shutdown => {
                tracing::info!("Shutting down supervisor");
                for queue_ref in state.queues.values() {
                    let _ = queue_ref.send_message(QueueMessage::Shutdown);
                }
                state.queues.clear();
                myself.stop(None);
                return Ok(());
            }
        }

        Ok(())
    }

    async fn handle_supervisor_evt(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: SupervisionEvent,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        let cell = match message {
            SupervisionEvent::ActorTerminated(cell, _, _) => cell,
            SupervisionEvent::ActorFailed(cell, err) => {
                tracing::warn!("Queue actor {} failed: {}", cell.get_id(), err);
                cell
            }
            _ => return Ok(()),
        };

        // Forget the queue so the next lookup builds a fresh one.
        let id = cell.get_id();
        state.queues.retain(|name, queue| {
            let gone = queue.get_id() == id;
            if gone {
                tracing::warn!("Queue '{}' terminated", name);
            }
            !gone
        });
        Ok(())
    }
}

/// Start the supervisor.
pub async fn start_supervisor(
    args: SupervisorArgs,
) -> Result<(ActorRef<SupervisorMessage>, tokio::task::JoinHandle<()>), ractor::SpawnErr> {
    Actor::spawn(None, Supervisor, args).await
}
