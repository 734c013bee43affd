//! Lobby State Definitions
//!
//! All state owned by the coordinator for a single lobby.
//! Player order is join order (`IndexMap`), room membership is ordered by
//! connection id (`BTreeMap`) so fan-out order is stable.

use std::collections::BTreeMap;
use std::fmt;

use indexmap::IndexMap;

use crate::lobby::policy::RejoinPolicy;

/// Opaque lobby identifier chosen by the clients.
pub type LobbyKey = String;

/// Player display name, unique within a lobby.
pub type PlayerName = String;

/// Signed player score.
pub type Score = i64;

/// Player name to score, in join order.
pub type Scoreboard = IndexMap<PlayerName, Score>;

// =============================================================================
// CONNECTION ID
// =============================================================================

/// Identity of one transport connection (UUID as bytes).
///
/// Implements Ord for deterministic BTreeMap ordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(pub [u8; 16]);

impl ConnectionId {
    /// Create from raw bytes.
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Allocate a fresh random id.
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().into_bytes())
    }

    /// Convert to UUID string.
    pub fn to_uuid_string(&self) -> String {
        uuid::Uuid::from_bytes(self.0).to_string()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // First UUID group is enough to tell connections apart in logs.
        let full = self.to_uuid_string();
        f.write_str(&full[..8])
    }
}

// =============================================================================
// QUESTION
// =============================================================================

/// A board cell: category plus point value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Question {
    /// Category column.
    pub category: String,
    /// Point value of the clue.
    pub value: Score,
}

// =============================================================================
// LOBBY
// =============================================================================

/// A single lobby and its room.
#[derive(Clone, Debug)]
pub struct Lobby {
    /// Lobby key.
    pub key: LobbyKey,
    /// Leader name. Set to the first joiner.
    pub leader: PlayerName,
    /// Scores in join order.
    pub players: Scoreboard,
    /// Currently selected question.
    pub current_question: Option<Question>,
    /// First player to buzz on the current question.
    pub buzzer_winner: Option<PlayerName>,
    /// Room members and the player name each joined as.
    members: BTreeMap<ConnectionId, PlayerName>,
}

impl Lobby {
    /// Create an empty lobby led by `leader`.
    pub fn new(key: impl Into<LobbyKey>, leader: impl Into<PlayerName>) -> Self {
        Self {
            key: key.into(),
            leader: leader.into(),
            players: Scoreboard::new(),
            current_question: None,
            buzzer_winner: None,
            members: BTreeMap::new(),
        }
    }

    /// Insert a player, or apply the rejoin policy if already present.
    pub fn add_player(&mut self, name: &str, rejoin: RejoinPolicy) {
        match self.players.get_mut(name) {
            Some(score) => {
                if rejoin == RejoinPolicy::ResetScore {
                    *score = 0;
                }
            }
            None => {
                self.players.insert(name.to_string(), 0);
            }
        }
    }

    /// Remove a player. Clears the buzzer if they held it.
    pub fn remove_player(&mut self, name: &str) -> bool {
        if self.players.shift_remove(name).is_none() {
            return false;
        }
        if self.buzzer_winner.as_deref() == Some(name) {
            self.buzzer_winner = None;
        }
        true
    }

    /// Check if a player is in the lobby.
    pub fn has_player(&self, name: &str) -> bool {
        self.players.contains_key(name)
    }

    /// Get a player's score.
    pub fn score(&self, name: &str) -> Option<Score> {
        self.players.get(name).copied()
    }

    /// Get player count.
    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// True once the last player has left.
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Earliest-joined remaining player.
    pub fn earliest_player(&self) -> Option<&PlayerName> {
        self.players.keys().next()
    }

    /// Add a connection to the room.
    pub fn attach(&mut self, connection: ConnectionId, name: &str) {
        self.members.insert(connection, name.to_string());
    }

    /// Remove a connection from the room, returning the name it joined as.
    pub fn detach(&mut self, connection: &ConnectionId) -> Option<PlayerName> {
        self.members.remove(connection)
    }

    /// Name a connection joined as, if it is in the room.
    pub fn member_name(&self, connection: &ConnectionId) -> Option<&PlayerName> {
        self.members.get(connection)
    }

    /// Check if any connection in the room is joined as `name`.
    pub fn is_claimed(&self, name: &str) -> bool {
        self.members.values().any(|n| n == name)
    }

    /// All connections in the room.
    pub fn members(&self) -> Vec<ConnectionId> {
        self.members.keys().copied().collect()
    }

    /// Set the current question and reopen the buzzer.
    pub fn select_question(&mut self, question: Question) {
        self.current_question = Some(question);
        self.buzzer_winner = None;
    }

    /// Claim the buzzer. Returns false if someone already holds it.
    pub fn try_buzz(&mut self, name: &str) -> bool {
        if self.buzzer_winner.is_some() {
            return false;
        }
        self.buzzer_winner = Some(name.to_string());
        true
    }

    /// Add `delta` to a player's score and reopen the buzzer.
    /// Returns the new score, or None for an unknown player.
    pub fn apply_score(&mut self, name: &str, delta: Score) -> Option<Score> {
        let score = self.players.get_mut(name)?;
        *score = score.saturating_add(delta);
        let updated = *score;
        self.buzzer_winner = None;
        Some(updated)
    }
}
