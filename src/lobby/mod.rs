//! Lobby Layer
//!
//! In-memory lobby state and the coordinator that mutates it.
//! Nothing here does I/O; the network layer feeds operations in one at a time
//! and fans out the resulting deliveries.

pub mod coordinator;
pub mod events;
pub mod policy;
pub mod state;

pub use coordinator::{LobbyCoordinator, LobbyError, LobbyResult};
pub use events::{Delivery, LobbyEvent};
pub use policy::{
    AuthorizationPolicy, CoordinatorPolicy, LeaderPolicy, ParsePolicyError, RejoinPolicy,
};
pub use state::{ConnectionId, Lobby, LobbyKey, PlayerName, Question, Score, Scoreboard};
