//! # Daily Jeopardy Lobby Server
//!
//! Server-side coordinator for multiplayer trivia lobbies: shared buzzer
//! arbitration, leader assignment and per-player scores.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  JEOPARDY LOBBY SERVER                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  lobby/            - Lobby state (no I/O)                    │
//! │  ├── state.rs      - Lobby, scoreboard, connection ids       │
//! │  ├── events.rs     - Outbound notifications                  │
//! │  ├── policy.rs     - Leader / rejoin / authorization rules   │
//! │  └── coordinator.rs- Protocol operations                     │
//! │                                                              │
//! │  network/          - Transport                               │
//! │  ├── protocol.rs   - JSON message types                      │
//! │  ├── rooms.rs      - Per-room fan-out                        │
//! │  ├── actor.rs      - Single-writer coordinator task          │
//! │  └── server.rs     - WebSocket server                        │
//! │                                                              │
//! │  config.rs         - Server configuration                    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Ordering Guarantee
//!
//! Every request passes through one coordinator task and is applied to
//! completion before the next. For a single lobby this means:
//! - The first player to join is the leader
//! - Exactly one buzz is accepted per question, the first one processed
//! - Score updates accumulate and are never lost

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod lobby;
pub mod network;

// Re-export commonly used types
pub use config::{ConfigError, ServerConfig, DEFAULT_PORT};
pub use lobby::{
    ConnectionId, CoordinatorPolicy, Delivery, Lobby, LobbyCoordinator, LobbyError, LobbyEvent,
};
pub use network::{ClientMessage, LobbyServer, LobbyServerError, ServerMessage};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
