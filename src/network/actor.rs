//! Coordinator Actor
//!
//! A single task owns the [`LobbyCoordinator`] and the room registry.
//! Connection tasks talk to it through a bounded command queue, so every
//! operation runs to completion (mutation plus fan-out) before the next
//! one starts. Arrival order at the queue is the order of effect.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::lobby::coordinator::{LobbyCoordinator, LobbyResult};
use crate::lobby::policy::CoordinatorPolicy;
use crate::lobby::state::{ConnectionId, Lobby, LobbyKey};
use crate::network::protocol::{ClientMessage, ServerMessage};
use crate::network::rooms::RoomRegistry;

/// Commands accepted by the coordinator task.
#[derive(Debug)]
pub enum Command {
    /// A connection opened; register its outbound queue.
    Connect {
        /// New connection.
        connection: ConnectionId,
        /// Its outbound queue.
        sender: mpsc::Sender<ServerMessage>,
    },
    /// A decoded client message.
    Message {
        /// Sending connection.
        connection: ConnectionId,
        /// The request.
        message: ClientMessage,
    },
    /// A connection closed.
    Disconnect {
        /// Closed connection.
        connection: ConnectionId,
    },
    /// Report the number of live lobbies.
    LobbyCount {
        /// Reply channel.
        reply: oneshot::Sender<usize>,
    },
    /// Copy of one lobby's state.
    Snapshot {
        /// Lobby to copy.
        key: LobbyKey,
        /// Reply channel.
        reply: oneshot::Sender<Option<Lobby>>,
    },
}

/// Coordinator task is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("coordinator task has stopped")]
pub struct CoordinatorStopped;

/// Cloneable handle to the coordinator task.
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    commands: mpsc::Sender<Command>,
}

impl CoordinatorHandle {
    /// Spawn the coordinator task. It stops once every handle is dropped.
    pub fn spawn(policy: CoordinatorPolicy, buffer: usize) -> (Self, JoinHandle<()>) {
        let (commands, rx) = mpsc::channel(buffer);
        let task = tokio::spawn(run_coordinator(LobbyCoordinator::new(policy), rx));
        (Self { commands }, task)
    }

    /// Register a new connection.
    pub async fn connect(
        &self,
        connection: ConnectionId,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Result<(), CoordinatorStopped> {
        self.submit(Command::Connect { connection, sender }).await
    }

    /// Forward a client message.
    pub async fn send(
        &self,
        connection: ConnectionId,
        message: ClientMessage,
    ) -> Result<(), CoordinatorStopped> {
        self.submit(Command::Message { connection, message }).await
    }

    /// Report a closed connection.
    pub async fn disconnect(&self, connection: ConnectionId) -> Result<(), CoordinatorStopped> {
        self.submit(Command::Disconnect { connection }).await
    }

    /// Get live lobby count. Completes after every earlier command.
    pub async fn lobby_count(&self) -> Result<usize, CoordinatorStopped> {
        let (reply, rx) = oneshot::channel();
        self.submit(Command::LobbyCount { reply }).await?;
        rx.await.map_err(|_| CoordinatorStopped)
    }

    /// Get a copy of a lobby. Completes after every earlier command.
    pub async fn snapshot(&self, key: &str) -> Result<Option<Lobby>, CoordinatorStopped> {
        let (reply, rx) = oneshot::channel();
        self.submit(Command::Snapshot { key: key.to_string(), reply }).await?;
        rx.await.map_err(|_| CoordinatorStopped)
    }

    async fn submit(&self, command: Command) -> Result<(), CoordinatorStopped> {
        self.commands.send(command).await.map_err(|_| CoordinatorStopped)
    }
}

/// Route a client message to its coordinator operation.
pub fn dispatch(
    coordinator: &mut LobbyCoordinator,
    connection: ConnectionId,
    message: ClientMessage,
) -> LobbyResult {
    match message {
        ClientMessage::JoinLobby { lobby_id, player_name } => {
            coordinator.join_lobby(connection, &lobby_id, &player_name)
        }
        ClientMessage::StartGame { lobby_id } => coordinator.start_game(connection, &lobby_id),
        ClientMessage::Buzz { player_name } => coordinator.buzz(connection, &player_name),
        ClientMessage::QuestionSelected { category, value } => {
            coordinator.select_question(connection, &category, value)
        }
        ClientMessage::UpdateScore { player_name, score } => {
            coordinator.update_score(connection, &player_name, score)
        }
    }
}

async fn run_coordinator(mut coordinator: LobbyCoordinator, mut commands: mpsc::Receiver<Command>) {
    let mut rooms = RoomRegistry::new();

    while let Some(command) = commands.recv().await {
        match command {
            Command::Connect { connection, sender } => {
                rooms.register(connection, sender);
            }
            Command::Message { connection, message } => {
                match dispatch(&mut coordinator, connection, message) {
                    Ok(deliveries) => {
                        for delivery in &deliveries {
                            rooms.deliver(delivery);
                        }
                    }
                    Err(e) => debug!("Ignored request from {}: {}", connection, e),
                }
            }
            Command::Disconnect { connection } => {
                rooms.unregister(&connection);
                match coordinator.disconnect(connection) {
                    Ok(deliveries) => {
                        for delivery in &deliveries {
                            rooms.deliver(delivery);
                        }
                    }
                    Err(e) => debug!("Disconnect of {} ignored: {}", connection, e),
                }
            }
            Command::LobbyCount { reply } => {
                let _ = reply.send(coordinator.lobby_count());
            }
            Command::Snapshot { key, reply } => {
                let _ = reply.send(coordinator.lobby(&key).cloned());
            }
        }
    }

    debug!("Coordinator task stopped ({} lobbies dropped)", coordinator.lobby_count());
}
