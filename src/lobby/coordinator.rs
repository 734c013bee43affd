//! Lobby Coordinator
//!
//! Sole owner of lobby state. Every protocol operation is a synchronous
//! method that mutates the lobby table and returns the deliveries to fan out.
//! Callers must apply operations one at a time; the network actor does this,
//! which is what makes "first buzz wins" and "first joiner leads" hold.
//!
//! Each connection is bound to at most one `(lobby, player)` pair at join
//! time. Buzz, question selection, score updates and disconnect all resolve
//! their lobby through that binding.

use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info};

use crate::lobby::events::{Delivery, LobbyEvent};
use crate::lobby::policy::{AuthorizationPolicy, CoordinatorPolicy, LeaderPolicy};
use crate::lobby::state::{ConnectionId, Lobby, LobbyKey, PlayerName, Question, Score};

/// Result of a coordinator operation.
pub type LobbyResult = Result<Vec<Delivery>, LobbyError>;

/// Why a request was dropped. Never reported to clients.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LobbyError {
    /// No lobby under this key.
    #[error("lobby {0:?} does not exist")]
    LobbyNotFound(LobbyKey),

    /// Connection has not joined a lobby.
    #[error("connection has not joined a lobby")]
    NotInLobby,

    /// Named player is not in the caller's lobby.
    #[error("player {0:?} is not in the lobby")]
    UnknownPlayer(PlayerName),

    /// Someone already won the buzzer for this question.
    #[error("buzzer already held by {0:?}")]
    BuzzerLocked(PlayerName),

    /// Rejected by the authorization policy.
    #[error("{0} is not permitted for this connection")]
    NotAuthorized(&'static str),
}

/// The in-memory lobby table.
#[derive(Debug, Default)]
pub struct LobbyCoordinator {
    policy: CoordinatorPolicy,
    lobbies: BTreeMap<LobbyKey, Lobby>,
    bindings: BTreeMap<ConnectionId, LobbyKey>,
}

impl LobbyCoordinator {
    /// Create an empty coordinator.
    pub fn new(policy: CoordinatorPolicy) -> Self {
        Self {
            policy,
            lobbies: BTreeMap::new(),
            bindings: BTreeMap::new(),
        }
    }

    /// Active policies.
    pub fn policy(&self) -> &CoordinatorPolicy {
        &self.policy
    }

    /// Join (or create) a lobby.
    ///
    /// A connection already in another lobby leaves it first. Re-joining the
    /// same lobby under a different name drops the old name.
    pub fn join_lobby(&mut self, connection: ConnectionId, key: &str, name: &str) -> LobbyResult {
        let mut deliveries = Vec::new();

        if let Some(previous) = self.bindings.get(&connection).cloned() {
            let same_seat = previous == key
                && self
                    .lobbies
                    .get(&previous)
                    .and_then(|l| l.member_name(&connection))
                    .is_some_and(|n| n == name);
            if !same_seat {
                deliveries.extend(self.leave(connection, &previous));
            }
        }

        let rejoin = self.policy.rejoin;
        let lobby = self.lobbies.entry(key.to_string()).or_insert_with(|| {
            info!("Lobby {} created, leader {}", key, name);
            Lobby::new(key, name)
        });

        lobby.add_player(name, rejoin);
        lobby.attach(connection, name);
        self.bindings.insert(connection, key.to_string());

        info!(
            "{} joined lobby {} ({} players, connection {})",
            name,
            key,
            lobby.player_count(),
            connection
        );

        let members = lobby.members();
        deliveries.push(Delivery::new(
            key,
            members.clone(),
            LobbyEvent::LeaderAssigned { leader: lobby.leader.clone() },
        ));
        deliveries.push(Delivery::new(
            key,
            members,
            LobbyEvent::ScoresUpdated { scores: lobby.players.clone() },
        ));

        Ok(deliveries)
    }

    /// Announce game start to a lobby.
    pub fn start_game(&mut self, connection: ConnectionId, key: &str) -> LobbyResult {
        let lobby = self
            .lobbies
            .get(key)
            .ok_or_else(|| LobbyError::LobbyNotFound(key.to_string()))?;
        authorize_leader(self.policy, lobby, &connection, "starting the game")?;

        info!("Game started in lobby {}", key);
        Ok(vec![Delivery::new(key, lobby.members(), LobbyEvent::GameStarted)])
    }

    /// Open a question in the caller's lobby. Overwrites any prior selection.
    pub fn select_question(
        &mut self,
        connection: ConnectionId,
        category: &str,
        value: Score,
    ) -> LobbyResult {
        let policy = self.policy;
        let lobby = self.bound_lobby_mut(&connection)?;
        authorize_leader(policy, lobby, &connection, "question selection")?;

        let question = Question {
            category: category.to_string(),
            value,
        };
        lobby.select_question(question.clone());

        info!("Question selected in lobby {}: {} - {}", lobby.key, category, value);
        Ok(vec![Delivery::new(
            lobby.key.clone(),
            lobby.members(),
            LobbyEvent::QuestionSelected(question),
        )])
    }

    /// Claim the buzzer for `player`. Only the first buzz per question counts.
    pub fn buzz(&mut self, connection: ConnectionId, player: &str) -> LobbyResult {
        let policy = self.policy;
        let lobby = self.bound_lobby_mut(&connection)?;

        if policy.authorization == AuthorizationPolicy::BoundIdentity
            && lobby.member_name(&connection).map(String::as_str) != Some(player)
        {
            return Err(LobbyError::NotAuthorized("buzzing for another player"));
        }

        if !lobby.has_player(player) {
            return Err(LobbyError::UnknownPlayer(player.to_string()));
        }

        if !lobby.try_buzz(player) {
            let holder = lobby.buzzer_winner.clone().unwrap_or_default();
            return Err(LobbyError::BuzzerLocked(holder));
        }

        info!("{} buzzed in lobby: {}", player, lobby.key);
        Ok(vec![Delivery::new(
            lobby.key.clone(),
            lobby.members(),
            LobbyEvent::BuzzerPressed { player: player.to_string() },
        )])
    }

    /// Add `delta` to a player's score and reopen the buzzer.
    pub fn update_score(
        &mut self,
        connection: ConnectionId,
        player: &str,
        delta: Score,
    ) -> LobbyResult {
        let policy = self.policy;
        let lobby = self.bound_lobby_mut(&connection)?;

        if policy.authorization == AuthorizationPolicy::BoundIdentity {
            let allowed = lobby
                .member_name(&connection)
                .is_some_and(|caller| caller == player || *caller == lobby.leader);
            if !allowed {
                return Err(LobbyError::NotAuthorized("updating another player's score"));
            }
        }

        let score = lobby
            .apply_score(player, delta)
            .ok_or_else(|| LobbyError::UnknownPlayer(player.to_string()))?;

        debug!("{} score {:+} -> {} in lobby {}", player, delta, score, lobby.key);
        Ok(vec![Delivery::new(
            lobby.key.clone(),
            lobby.members(),
            LobbyEvent::ScoresUpdated { scores: lobby.players.clone() },
        )])
    }

    /// Remove a closed connection and the player it joined as.
    ///
    /// A connection that never joined is a no-op.
    pub fn disconnect(&mut self, connection: ConnectionId) -> LobbyResult {
        match self.bindings.get(&connection).cloned() {
            Some(key) => Ok(self.leave(connection, &key)),
            None => Ok(Vec::new()),
        }
    }

    /// Get a lobby by key.
    pub fn lobby(&self, key: &str) -> Option<&Lobby> {
        self.lobbies.get(key)
    }

    /// Get active lobby count.
    pub fn lobby_count(&self) -> usize {
        self.lobbies.len()
    }

    /// Lobby and player name a connection is bound to.
    pub fn binding(&self, connection: &ConnectionId) -> Option<(&LobbyKey, &PlayerName)> {
        let key = self.bindings.get(connection)?;
        let name = self.lobbies.get(key)?.member_name(connection)?;
        Some((key, name))
    }

    fn bound_lobby_mut(&mut self, connection: &ConnectionId) -> Result<&mut Lobby, LobbyError> {
        let key = self.bindings.get(connection).ok_or(LobbyError::NotInLobby)?;
        self.lobbies.get_mut(key).ok_or(LobbyError::NotInLobby)
    }

    /// Unbind a connection from `key`, removing its player unless another
    /// connection in the room still holds the same name.
    fn leave(&mut self, connection: ConnectionId, key: &str) -> Vec<Delivery> {
        self.bindings.remove(&connection);
        let leader_policy = self.policy.leader;

        let Some(lobby) = self.lobbies.get_mut(key) else {
            return Vec::new();
        };
        let Some(name) = lobby.detach(&connection) else {
            return Vec::new();
        };
        if lobby.is_claimed(&name) || !lobby.remove_player(&name) {
            return Vec::new();
        }

        info!("{} left lobby {}", name, key);

        if lobby.is_empty() {
            self.lobbies.remove(key);
            info!("Lobby {} deleted", key);
            return Vec::new();
        }

        let members = lobby.members();
        let mut deliveries = Vec::new();

        if leader_policy == LeaderPolicy::TransferToEarliest && lobby.leader == name {
            if let Some(next) = lobby.earliest_player().cloned() {
                info!("Leadership of lobby {} passed from {} to {}", key, name, next);
                lobby.leader = next.clone();
                deliveries.push(Delivery::new(
                    key,
                    members.clone(),
                    LobbyEvent::LeaderAssigned { leader: next },
                ));
            }
        }

        deliveries.push(Delivery::new(
            key,
            members,
            LobbyEvent::ScoresUpdated { scores: lobby.players.clone() },
        ));
        deliveries
    }
}

/// Under `BoundIdentity`, only the connection joined as the leader may act.
fn authorize_leader(
    policy: CoordinatorPolicy,
    lobby: &Lobby,
    connection: &ConnectionId,
    action: &'static str,
) -> Result<(), LobbyError> {
    if policy.authorization == AuthorizationPolicy::TrustClients {
        return Ok(());
    }
    match lobby.member_name(connection) {
        Some(name) if *name == lobby.leader => Ok(()),
        _ => Err(LobbyError::NotAuthorized(action)),
    }
}
