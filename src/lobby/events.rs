//! Lobby Events
//!
//! Notifications produced by coordinator operations, paired with the room
//! members that must receive them.

use crate::lobby::state::{ConnectionId, LobbyKey, PlayerName, Question, Scoreboard};

/// State change pushed to every connection in a lobby.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LobbyEvent {
    /// Current leader of the lobby.
    LeaderAssigned {
        /// Leader name.
        leader: PlayerName,
    },

    /// Leader started the game.
    GameStarted,

    /// A question was opened.
    QuestionSelected(Question),

    /// A player won the buzzer.
    BuzzerPressed {
        /// Winning player.
        player: PlayerName,
    },

    /// Full scoreboard after a change.
    ScoresUpdated {
        /// Scores in join order.
        scores: Scoreboard,
    },
}

/// An event addressed to the members of one room.
///
/// Recipients are captured when the event is produced, so a delivery made
/// while a connection is leaving never reaches it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delivery {
    /// Lobby the event belongs to.
    pub lobby: LobbyKey,
    /// Connections to notify.
    pub recipients: Vec<ConnectionId>,
    /// The event.
    pub event: LobbyEvent,
}

impl Delivery {
    /// Create a delivery.
    pub fn new(
        lobby: impl Into<LobbyKey>,
        recipients: Vec<ConnectionId>,
        event: LobbyEvent,
    ) -> Self {
        Self {
            lobby: lobby.into(),
            recipients,
            event,
        }
    }
}
