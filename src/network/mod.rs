//! Network Layer
//!
//! WebSocket server for browser clients.
//! All lobby mutation is funnelled through the coordinator actor.

pub mod actor;
pub mod protocol;
pub mod rooms;
pub mod server;

pub use actor::{CoordinatorHandle, CoordinatorStopped, Command};
pub use protocol::{ClientMessage, ServerMessage};
pub use rooms::RoomRegistry;
pub use server::{LobbyServer, LobbyServerError};
