//! Room Fan-out
//!
//! Outbound side of the rooms: maps each live connection to its message
//! queue and pushes deliveries to the recipients they name.

use std::collections::BTreeMap;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::lobby::events::Delivery;
use crate::lobby::state::ConnectionId;
use crate::network::protocol::ServerMessage;

/// Outbound queues of every live connection.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    outbound: BTreeMap<ConnectionId, mpsc::Sender<ServerMessage>>,
}

impl RoomRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection's outbound queue.
    pub fn register(&mut self, connection: ConnectionId, sender: mpsc::Sender<ServerMessage>) {
        self.outbound.insert(connection, sender);
    }

    /// Drop a connection's outbound queue.
    pub fn unregister(&mut self, connection: &ConnectionId) -> bool {
        self.outbound.remove(connection).is_some()
    }

    /// Get registered connection count.
    pub fn len(&self) -> usize {
        self.outbound.len()
    }

    /// Check if no connections are registered.
    pub fn is_empty(&self) -> bool {
        self.outbound.is_empty()
    }

    /// Push a delivery to its recipients. Returns how many accepted it.
    ///
    /// Never waits: a full queue drops the message for that connection only.
    pub fn deliver(&self, delivery: &Delivery) -> usize {
        let message = ServerMessage::from(&delivery.event);
        let mut delivered = 0;

        for connection in &delivery.recipients {
            let Some(sender) = self.outbound.get(connection) else {
                continue;
            };
            match sender.try_send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(
                        "Outbound queue full for {} in lobby {}, dropping message",
                        connection, delivery.lobby
                    );
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("Connection {} already closed", connection);
                }
            }
        }

        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lobby::events::LobbyEvent;

    fn conn(n: u8) -> ConnectionId {
        ConnectionId::new([n; 16])
    }

    #[tokio::test]
    async fn test_deliver_to_recipients_only() {
        let mut rooms = RoomRegistry::new();
        let (tx1, mut rx1) = mpsc::channel(4);
        let (tx2, mut rx2) = mpsc::channel(4);
        rooms.register(conn(1), tx1);
        rooms.register(conn(2), tx2);

        let delivery = Delivery::new("L1", vec![conn(1), conn(7)], LobbyEvent::GameStarted);
        assert_eq!(rooms.deliver(&delivery), 1);

        assert_eq!(rx1.recv().await, Some(ServerMessage::GameStarted));
        assert!(rx2.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_blocking() {
        let mut rooms = RoomRegistry::new();
        let (tx, mut rx) = mpsc::channel(1);
        rooms.register(conn(1), tx);

        let delivery = Delivery::new(
            "L1",
            vec![conn(1)],
            LobbyEvent::BuzzerPressed { player: "Amy".into() },
        );
        assert_eq!(rooms.deliver(&delivery), 1);
        assert_eq!(rooms.deliver(&delivery), 0);

        assert!(rx.recv().await.is_some());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_register_unregister() {
        let mut rooms = RoomRegistry::new();
        let (tx, rx) = mpsc::channel(1);
        rooms.register(conn(1), tx);
        assert_eq!(rooms.len(), 1);

        // Closed receiver is tolerated
        drop(rx);
        let delivery = Delivery::new("L1", vec![conn(1)], LobbyEvent::GameStarted);
        assert_eq!(rooms.deliver(&delivery), 0);

        assert!(rooms.unregister(&conn(1)));
        assert!(!rooms.unregister(&conn(1)));
        assert!(rooms.is_empty());
    }
}
