//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! Messages are JSON text frames tagged by `"type"`; the tag values are the
//! event names the browser client already uses (`joinLobby`, `setLeader`, ...).

use serde::{Deserialize, Serialize};

use crate::lobby::events::LobbyEvent;
use crate::lobby::state::{Score, Scoreboard};

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Join (or create) a lobby.
    #[serde(rename_all = "camelCase")]
    JoinLobby {
        /// Lobby to join.
        lobby_id: String,
        /// Name to play under.
        player_name: String,
    },

    /// Tell everyone in the lobby the game has begun.
    #[serde(rename_all = "camelCase")]
    StartGame {
        /// Lobby to start.
        lobby_id: String,
    },

    /// Press the buzzer.
    #[serde(rename_all = "camelCase")]
    Buzz {
        /// Player buzzing in.
        player_name: String,
    },

    /// Open a question on the board.
    QuestionSelected {
        /// Category column.
        category: String,
        /// Point value.
        value: Score,
    },

    /// Add `score` (may be negative) to a player's total.
    #[serde(rename = "updateScores", rename_all = "camelCase")]
    UpdateScore {
        /// Player whose score changes.
        player_name: String,
        /// Delta to apply.
        score: Score,
    },
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages broadcast from server to every client in a lobby.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Current lobby leader.
    #[serde(rename = "setLeader")]
    LeaderAssigned {
        /// Leader's player name.
        leader: String,
    },

    /// Game started.
    #[serde(rename = "startGame")]
    GameStarted,

    /// Buzzer winner for the current question.
    #[serde(rename = "buzzerPressed", rename_all = "camelCase")]
    BuzzerPressed {
        /// Winning player.
        player_name: String,
    },

    /// Question opened by the leader.
    #[serde(rename = "questionSelected")]
    QuestionSelected {
        /// Category column.
        category: String,
        /// Point value.
        value: Score,
    },

    /// Complete scoreboard, keys in join order.
    #[serde(rename = "updateScores")]
    ScoresUpdated {
        /// Player name to total score.
        scores: Scoreboard,
    },
}

impl From<&LobbyEvent> for ServerMessage {
    fn from(event: &LobbyEvent) -> Self {
        match event {
            LobbyEvent::LeaderAssigned { leader } => ServerMessage::LeaderAssigned {
                leader: leader.clone(),
            },
            LobbyEvent::GameStarted => ServerMessage::GameStarted,
            LobbyEvent::QuestionSelected(question) => ServerMessage::QuestionSelected {
                category: question.category.clone(),
                value: question.value,
            },
            LobbyEvent::BuzzerPressed { player } => ServerMessage::BuzzerPressed {
                player_name: player.clone(),
            },
            LobbyEvent::ScoresUpdated { scores } => ServerMessage::ScoresUpdated {
                scores: scores.clone(),
            },
        }
    }
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
