//! Room Registry
//!
//! Maps room codes to live rooms and connections to their seat. Each room
//! sits behind its own mutex, so every change to a room (and the broadcast of
//! the resulting snapshot) is serialized, while separate rooms never contend.
//!
//! Lock order: a room mutex may be held while taking the connection map,
//! never the other way round. The room map is only held for lookups and
//! inserts/removals, never across a room mutex.

use std::collections::BTreeMap;
use std::sync::Arc;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::core::hash::short_hex;
use crate::core::rng::{derive_round_seed, DeterministicRng};
use crate::game::deck::{DeckError, MIN_SEATS};
use crate::game::engine::{initialize_game, process_action, remove_player, ActionError, ErrorKind};
use crate::game::rules::RuleConfig;
use crate::game::state::{Player, PlayerId, PlayerIdentity, Room, RoomCode, RoomState};
use crate::network::protocol::{GameActionRequest, ServerError, ServerMessage};

/// Unique connection identifier.
pub type ConnectionId = uuid::Uuid;

/// Outbound message channel for one connection.
pub type MessageSender = mpsc::Sender<ServerMessage>;

// =============================================================================
// ERRORS
// =============================================================================

/// Registry errors. All are reported to the requesting connection only.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    /// No live room with this code.
    #[error("Room {0} not found")]
    RoomNotFound(String),

    /// All seats taken.
    #[error("Room is full")]
    RoomFull,

    /// Joining is only possible while waiting.
    #[error("Game already in progress")]
    GameInProgress,

    /// Display name already seated.
    #[error("Player name {0} already taken")]
    NameTaken(String),

    /// The connection (or player id) is already seated.
    #[error("Already in a room")]
    AlreadyInRoom,

    /// The connection is not seated where the request says.
    #[error("Not in this room")]
    NotInRoom,

    /// Only the host may start a round.
    #[error("Only the host can start the game")]
    NotHost,

    /// Rounds need at least two seats.
    #[error("Need at least 2 players to start")]
    NotEnoughPlayers,

    /// Empty or overlong name or id.
    #[error("Invalid player name or id")]
    InvalidIdentity,

    /// Turn engine rejected the action.
    #[error(transparent)]
    Action(#[from] ActionError),

    /// Dealing failed.
    #[error(transparent)]
    Deck(#[from] DeckError),
}

impl RoomError {
    /// Error class for this rejection.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RoomError::Action(err) => err.kind(),
            RoomError::Deck(err) => ActionError::Deck(err.clone()).kind(),
            RoomError::InvalidIdentity => ErrorKind::Validation,
            _ => ErrorKind::State,
        }
    }

    /// Wire form of the error.
    pub fn to_server_error(&self) -> ServerError {
        ServerError::new(self.kind().into(), self.to_string())
    }
}

// =============================================================================
// ROOM SESSION
// =============================================================================

/// A connection seated in a room.
#[derive(Debug)]
struct RoomMember {
    player_id: PlayerId,
    sender: MessageSender,
}

/// A live room plus the connections seated in it.
pub struct RoomSession {
    /// Authoritative room state.
    pub room: Room,
    members: BTreeMap<ConnectionId, RoomMember>,
    /// Fresh entropy for round seeds.
    entropy: [u8; 16],
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    /// Set once the room is emptied; joiners treat it as gone.
    closed: bool,
}

impl RoomSession {
    fn new(room: Room) -> Self {
        Self {
            room,
            members: BTreeMap::new(),
            entropy: uuid::Uuid::new_v4().into_bytes(),
            created_at: Utc::now(),
            started_at: None,
            closed: false,
        }
    }

    /// Send to every seated connection. Never waits; a full or closed
    /// channel drops the message.
    fn broadcast(&self, message: ServerMessage) {
        for (conn, member) in &self.members {
            if let Err(e) = member.sender.try_send(message.clone()) {
                warn!(room = %self.room.code, connection = %conn, kind = message.kind(), "Dropped broadcast: {}", e);
            }
        }
    }

    fn send_to(&self, conn: &ConnectionId, message: ServerMessage) {
        if let Some(member) = self.members.get(conn) {
            if let Err(e) = member.sender.try_send(message) {
                warn!(room = %self.room.code, connection = %conn, "Dropped message: {}", e);
            }
        }
    }

    fn duration_minutes(&self) -> i64 {
        self.started_at
            .map(|start| (Utc::now() - start).num_minutes())
            .unwrap_or(0)
    }

    fn log_snapshot(&self) {
        match self.room.compute_hash() {
            Ok(hash) => debug!(
                room = %self.room.code,
                state = %self.room.state,
                round = self.room.round,
                cards = self.room.card_count(),
                hash = %short_hex(&hash),
                "Room snapshot"
            ),
            Err(e) => warn!(room = %self.room.code, "Failed to hash room: {}", e),
        }
        #[cfg(feature = "debug-tracing")]
        if let Ok(json) = serde_json::to_string(&self.room) {
            tracing::trace!(room = %self.room.code, "{}", json);
        }
    }
}

/// Where a connection is seated.
#[derive(Debug, Clone)]
struct Membership {
    code: RoomCode,
    player_id: PlayerId,
}

// =============================================================================
// ROOM REGISTRY
// =============================================================================

/// All live rooms and seated connections.
pub struct RoomRegistry {
    rooms: RwLock<BTreeMap<RoomCode, Arc<Mutex<RoomSession>>>>,
    connections: RwLock<BTreeMap<ConnectionId, Membership>>,
    code_rng: Mutex<DeterministicRng>,
    rules: RuleConfig,
}

impl RoomRegistry {
    /// Create an empty registry; new rooms get `rules`.
    pub fn new(rules: RuleConfig) -> Self {
        Self {
            rooms: RwLock::new(BTreeMap::new()),
            connections: RwLock::new(BTreeMap::new()),
            code_rng: Mutex::new(DeterministicRng::from_entropy()),
            rules,
        }
    }

    async fn room_handle(&self, code: &RoomCode) -> Option<Arc<Mutex<RoomSession>>> {
        let rooms = self.rooms.read().await;
        rooms.get(code).cloned()
    }

    async fn membership(&self, conn: &ConnectionId) -> Option<Membership> {
        let connections = self.connections.read().await;
        connections.get(conn).cloned()
    }

    /// Open a room with the requester as host.
    ///
    /// Sends `room-created` to the requester.
    pub async fn create_room(
        &self,
        conn: ConnectionId,
        identity: PlayerIdentity,
        sender: MessageSender,
    ) -> Result<Room, RoomError> {
        let identity = identity.normalized().ok_or(RoomError::InvalidIdentity)?;
        if self.membership(&conn).await.is_some() {
            return Err(RoomError::AlreadyInRoom);
        }

        let player_id = identity.id.clone();
        let handle = {
            let mut rooms = self.rooms.write().await;
            let code = loop {
                let candidate = RoomCode::generate(&mut *self.code_rng.lock().await);
                if !rooms.contains_key(&candidate) {
                    break candidate;
                }
                debug!(code = %candidate, "Room code collision, retrying");
            };
            let room = Room::new(code.clone(), identity, self.rules);
            let handle = Arc::new(Mutex::new(RoomSession::new(room)));
            rooms.insert(code, handle.clone());
            handle
        };

        let mut session = handle.lock().await;
        let code = session.room.code.clone();
        session.members.insert(conn, RoomMember { player_id: player_id.clone(), sender });
        self.connections
            .write()
            .await
            .insert(conn, Membership { code: code.clone(), player_id: player_id.clone() });

        info!(room = %code, player = %player_id, "Room created");
        let snapshot = session.room.clone();
        session.send_to(&conn, ServerMessage::RoomCreated { code, room: snapshot.clone() });
        Ok(snapshot)
    }

    /// Take a seat in a waiting room.
    ///
    /// Broadcasts `player-joined` to the room, then sends `room-joined` to
    /// the joiner.
    pub async fn join_room(
        &self,
        conn: ConnectionId,
        code: &str,
        identity: PlayerIdentity,
        sender: MessageSender,
    ) -> Result<Room, RoomError> {
        let identity = identity.normalized().ok_or(RoomError::InvalidIdentity)?;
        if self.membership(&conn).await.is_some() {
            return Err(RoomError::AlreadyInRoom);
        }
        let code = RoomCode::parse(code).ok_or_else(|| RoomError::RoomNotFound(code.to_string()))?;
        let handle = self
            .room_handle(&code)
            .await
            .ok_or_else(|| RoomError::RoomNotFound(code.to_string()))?;

        let mut session = handle.lock().await;
        let room = &session.room;
        if session.closed {
            return Err(RoomError::RoomNotFound(code.to_string()));
        }
        if room.is_full() {
            return Err(RoomError::RoomFull);
        }
        if room.state != RoomState::Waiting {
            return Err(RoomError::GameInProgress);
        }
        if room.has_name(&identity.name) {
            return Err(RoomError::NameTaken(identity.name));
        }
        if room.seat_of(&identity.id).is_some() {
            return Err(RoomError::AlreadyInRoom);
        }

        let player_id = identity.id.clone();
        session.room.players.push(Player::new(identity, false));
        session.members.insert(conn, RoomMember { player_id: player_id.clone(), sender });
        self.connections
            .write()
            .await
            .insert(conn, Membership { code: code.clone(), player_id: player_id.clone() });

        info!(room = %code, player = %player_id, seats = session.room.players.len(), "Player joined");
        let snapshot = session.room.clone();
        session.broadcast(ServerMessage::PlayerJoined { room: snapshot.clone() });
        session.send_to(&conn, ServerMessage::RoomJoined { room: snapshot.clone() });
        Ok(snapshot)
    }

    /// Deal a round in the requester's room. Host only; works from a
    /// waiting room or, for a rematch, a finished one.
    ///
    /// Broadcasts `game-started`.
    pub async fn start_game(&self, conn: ConnectionId) -> Result<Room, RoomError> {
        let membership = self.membership(&conn).await.ok_or(RoomError::NotInRoom)?;
        let handle = self
            .room_handle(&membership.code)
            .await
            .ok_or_else(|| RoomError::RoomNotFound(membership.code.to_string()))?;

        let mut session = handle.lock().await;
        if session.closed {
            return Err(RoomError::RoomNotFound(membership.code.to_string()));
        }
        let player = session.room.player(&membership.player_id).ok_or(RoomError::NotInRoom)?;
        if !player.is_host {
            return Err(RoomError::NotHost);
        }
        if session.room.players.len() < MIN_SEATS {
            return Err(RoomError::NotEnoughPlayers);
        }
        if session.room.state == RoomState::Playing {
            return Err(RoomError::GameInProgress);
        }

        let seed = derive_round_seed(&session.entropy, membership.code.as_str(), session.room.round + 1);
        let mut rng = DeterministicRng::new(seed);
        let event = initialize_game(&mut session.room, &mut rng)?;
        session.started_at = Some(Utc::now());

        info!(room = %membership.code, round = session.room.round, seats = session.room.players.len(), "Game started");
        debug!(room = %membership.code, ?event);
        session.log_snapshot();

        let snapshot = session.room.clone();
        session.broadcast(ServerMessage::GameStarted { room: snapshot.clone() });
        Ok(snapshot)
    }

    /// Apply a turn action for the requester's seat.
    ///
    /// Broadcasts `game-state-updated`, followed by `game-over` when the
    /// action ends the round. On error nothing is broadcast and the room is
    /// unchanged.
    pub async fn dispatch_action(
        &self,
        conn: ConnectionId,
        request: &GameActionRequest,
    ) -> Result<Room, RoomError> {
        let membership = self.membership(&conn).await.ok_or(RoomError::NotInRoom)?;
        let code = RoomCode::parse(&request.code).ok_or(RoomError::NotInRoom)?;
        if membership.code != code || membership.player_id != request.player_id {
            return Err(RoomError::NotInRoom);
        }
        let action = request.to_action()?;

        let handle = self
            .room_handle(&code)
            .await
            .ok_or_else(|| RoomError::RoomNotFound(code.to_string()))?;
        let mut session = handle.lock().await;
        if session.closed {
            return Err(RoomError::RoomNotFound(code.to_string()));
        }

        let action_name = action.name();
        let outcome = process_action(&mut session.room, &request.player_id, action)?;
        for event in &outcome.events {
            debug!(room = %code, ?event);
        }
        info!(room = %code, player = %request.player_id, action = action_name, "Action processed");
        session.log_snapshot();

        let snapshot = session.room.clone();
        session.broadcast(ServerMessage::GameStateUpdated { room: snapshot.clone() });
        if outcome.round_finished {
            let results = session.room.results(session.duration_minutes());
            info!(room = %code, round = session.room.round, winner = ?results.first().map(|r| &r.player_id), "Round finished");
            session.broadcast(ServerMessage::GameOver { results });
        }
        Ok(snapshot)
    }

    /// Remove the connection's seat (leave or disconnect).
    ///
    /// Deletes the room when it empties; otherwise broadcasts `player-left`
    /// and, if the departure ended the round, `game-over`. Returns `false` if
    /// the connection was not seated.
    pub async fn disconnect(&self, conn: ConnectionId) -> bool {
        let Some(membership) = self.connections.write().await.remove(&conn) else {
            return false;
        };
        let Some(handle) = self.room_handle(&membership.code).await else {
            return true;
        };

        let mut session = handle.lock().await;
        session.members.remove(&conn);
        let departure = remove_player(&mut session.room, &membership.player_id);

        if session.room.players.is_empty() {
            session.closed = true;
            let age = Utc::now() - session.created_at;
            drop(session);
            let mut rooms = self.rooms.write().await;
            if rooms.get(&membership.code).map_or(false, |h| Arc::ptr_eq(h, &handle)) {
                rooms.remove(&membership.code);
            }
            info!(room = %membership.code, age_minutes = age.num_minutes(), "Room deleted");
            return true;
        }

        info!(
            room = %membership.code,
            player = %membership.player_id,
            host = ?session.room.host().map(|p| &p.id),
            "Player left"
        );
        session.log_snapshot();

        let snapshot = session.room.clone();
        session.broadcast(ServerMessage::PlayerLeft { room: snapshot });
        if departure.map_or(false, |d| d.round_finished) {
            let results = session.room.results(session.duration_minutes());
            session.broadcast(ServerMessage::GameOver { results });
        }
        true
    }

    /// Snapshot of a room, if it exists.
    pub async fn room_snapshot(&self, code: &RoomCode) -> Option<Room> {
        let handle = self.room_handle(code).await?;
        let session = handle.lock().await;
        (!session.closed).then(|| session.room.clone())
    }

    /// Number of live rooms.
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Number of seated connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new(RuleConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::card::CardId;
    use crate::network::protocol::{ActionData, ActionKind};

    fn channel() -> (MessageSender, mpsc::Receiver<ServerMessage>) {
        mpsc::channel(64)
    }

    fn drain(rx: &mut mpsc::Receiver<ServerMessage>) -> Vec<&'static str> {
        let mut kinds = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            kinds.push(msg.kind());
        }
        kinds
    }

    fn action(code: &RoomCode, player: &str, kind: ActionKind, card_id: Option<CardId>) -> GameActionRequest {
        GameActionRequest {
            code: code.to_string(),
            player_id: PlayerId::from(player),
            action: kind,
            data: card_id.map(|card_id| ActionData { card_id: Some(card_id) }),
        }
    }

    #[tokio::test]
    async fn test_create_and_join() {
        let registry = RoomRegistry::default();
        let (host_conn, guest_conn) = (ConnectionId::new_v4(), ConnectionId::new_v4());
        let (host_tx, mut host_rx) = channel();
        let (guest_tx, mut guest_rx) = channel();

        let room = registry
            .create_room(host_conn, PlayerIdentity::new("p1", "Asha"), host_tx)
            .await
            .unwrap();
        assert_eq!(room.code.as_str().len(), RoomCode::LEN);
        assert!(room.players[0].is_host);
        assert_eq!(drain(&mut host_rx), vec!["room-created"]);

        let room = registry
            .join_room(guest_conn, &room.code.as_str().to_lowercase(), PlayerIdentity::new("p2", "Ben"), guest_tx)
            .await
            .unwrap();
        assert_eq!(room.players.len(), 2);
        assert!(!room.players[1].is_host);
        assert_eq!(drain(&mut host_rx), vec!["player-joined"]);
        assert_eq!(drain(&mut guest_rx), vec!["player-joined", "room-joined"]);
        assert_eq!(registry.connection_count().await, 2);
    }

    #[tokio::test]
    async fn test_join_errors() {
        let registry = RoomRegistry::default();
        let host = ConnectionId::new_v4();
        let room = registry
            .create_room(host, PlayerIdentity::new("p1", "Asha"), channel().0)
            .await
            .unwrap();
        let code = room.code.as_str();

        let err = registry
            .join_room(ConnectionId::new_v4(), "ZZZZZZ", PlayerIdentity::new("p2", "Ben"), channel().0)
            .await
            .unwrap_err();
        assert!(matches!(err, RoomError::RoomNotFound(_)));

        let err = registry
            .join_room(ConnectionId::new_v4(), code, PlayerIdentity::new("p2", "Asha"), channel().0)
            .await
            .unwrap_err();
        assert_eq!(err, RoomError::NameTaken("Asha".to_string()));

        let err = registry
            .join_room(host, code, PlayerIdentity::new("p9", "Other"), channel().0)
            .await
            .unwrap_err();
        assert_eq!(err, RoomError::AlreadyInRoom);

        let err = registry
            .join_room(ConnectionId::new_v4(), code, PlayerIdentity::new("p2", "  "), channel().0)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        for i in 2..=4 {
            registry
                .join_room(ConnectionId::new_v4(), code, PlayerIdentity::new(format!("p{}", i), format!("n{}", i)), channel().0)
                .await
                .unwrap();
        }
        let err = registry
            .join_room(ConnectionId::new_v4(), code, PlayerIdentity::new("p5", "n5"), channel().0)
            .await
            .unwrap_err();
        assert_eq!(err, RoomError::RoomFull);
    }

    #[tokio::test]
    async fn test_start_game_rules() {
        let registry = RoomRegistry::default();
        let (host, guest) = (ConnectionId::new_v4(), ConnectionId::new_v4());
        let room = registry
            .create_room(host, PlayerIdentity::new("p1", "Asha"), channel().0)
            .await
            .unwrap();

        assert_eq!(registry.start_game(host).await.unwrap_err(), RoomError::NotEnoughPlayers);
        assert_eq!(registry.start_game(ConnectionId::new_v4()).await.unwrap_err(), RoomError::NotInRoom);

        registry
            .join_room(guest, room.code.as_str(), PlayerIdentity::new("p2", "Ben"), channel().0)
            .await
            .unwrap();
        assert_eq!(registry.start_game(guest).await.unwrap_err(), RoomError::NotHost);

        let started = registry.start_game(host).await.unwrap();
        assert_eq!(started.state, RoomState::Playing);
        assert_eq!(started.round, 1);
        assert!(started.is_conserved());
        assert_eq!(registry.start_game(host).await.unwrap_err(), RoomError::GameInProgress);

        let err = registry
            .join_room(ConnectionId::new_v4(), room.code.as_str(), PlayerIdentity::new("p3", "Cy"), channel().0)
            .await
            .unwrap_err();
        assert_eq!(err, RoomError::GameInProgress);
    }

    #[tokio::test]
    async fn test_dispatch_action_broadcasts() {
        let registry = RoomRegistry::default();
        let (host, guest) = (ConnectionId::new_v4(), ConnectionId::new_v4());
        let (host_tx, mut host_rx) = channel();
        let (guest_tx, mut guest_rx) = channel();
        let room = registry.create_room(host, PlayerIdentity::new("p1", "Asha"), host_tx).await.unwrap();
        registry.join_room(guest, room.code.as_str(), PlayerIdentity::new("p2", "Ben"), guest_tx).await.unwrap();
        registry.start_game(host).await.unwrap();
        drain(&mut host_rx);
        drain(&mut guest_rx);

        let code = room.code.clone();
        let room = registry
            .dispatch_action(host, &action(&code, "p1", ActionKind::DrawFromDeck, None))
            .await
            .unwrap();
        assert_eq!(room.players[0].hand.len(), 14);
        assert_eq!(drain(&mut host_rx), vec!["game-state-updated"]);
        assert_eq!(drain(&mut guest_rx), vec!["game-state-updated"]);

        // Out of turn: error only, nothing broadcast, room untouched
        let before = registry.room_snapshot(&code).await.unwrap();
        let err = registry
            .dispatch_action(guest, &action(&code, "p2", ActionKind::DrawFromDeck, None))
            .await
            .unwrap_err();
        assert_eq!(err, RoomError::Action(ActionError::NotYourTurn));
        assert_eq!(registry.room_snapshot(&code).await.unwrap(), before);
        assert!(drain(&mut host_rx).is_empty());

        // Acting for someone else's seat
        let err = registry
            .dispatch_action(guest, &action(&code, "p1", ActionKind::SortHand, None))
            .await
            .unwrap_err();
        assert_eq!(err, RoomError::NotInRoom);

        let err = registry
            .dispatch_action(host, &action(&code, "p1", ActionKind::Discard, None))
            .await
            .unwrap_err();
        assert_eq!(err, RoomError::Action(ActionError::MissingCardId));

        let card_id = room.players[0].hand[3].id.clone();
        let room = registry
            .dispatch_action(host, &action(&code, "p1", ActionKind::Discard, Some(card_id)))
            .await
            .unwrap();
        assert_eq!(room.current_player_index, 1);
    }

    #[tokio::test]
    async fn test_drop_ends_two_player_round() {
        let registry = RoomRegistry::default();
        let (host, guest) = (ConnectionId::new_v4(), ConnectionId::new_v4());
        let (guest_tx, mut guest_rx) = channel();
        let room = registry.create_room(host, PlayerIdentity::new("p1", "Asha"), channel().0).await.unwrap();
        registry.join_room(guest, room.code.as_str(), PlayerIdentity::new("p2", "Ben"), guest_tx).await.unwrap();
        registry.start_game(host).await.unwrap();
        drain(&mut guest_rx);

        let room = registry
            .dispatch_action(host, &action(&room.code, "p1", ActionKind::Drop, None))
            .await
            .unwrap();
        assert_eq!(room.state, RoomState::Finished);
        assert_eq!(drain(&mut guest_rx), vec!["game-state-updated", "game-over"]);

        // Rematch
        let room = registry.start_game(host).await.unwrap();
        assert_eq!(room.round, 2);
        assert_eq!(room.state, RoomState::Playing);
        assert!(room.players.iter().all(|p| p.points == 0 && !p.has_dropped));
    }

    #[tokio::test]
    async fn test_room_deleted_when_empty() {
        let registry = RoomRegistry::default();
        let (host, guest) = (ConnectionId::new_v4(), ConnectionId::new_v4());
        let (host_tx, mut host_rx) = channel();
        let room = registry.create_room(host, PlayerIdentity::new("p1", "Asha"), host_tx).await.unwrap();
        registry.join_room(guest, room.code.as_str(), PlayerIdentity::new("p2", "Ben"), channel().0).await.unwrap();
        drain(&mut host_rx);

        assert!(registry.disconnect(guest).await);
        assert_eq!(drain(&mut host_rx), vec!["player-left"]);
        assert!(!registry.disconnect(guest).await);

        assert!(registry.disconnect(host).await);
        assert_eq!(registry.room_count().await, 0);
        assert_eq!(registry.connection_count().await, 0);

        let err = registry
            .join_room(ConnectionId::new_v4(), room.code.as_str(), PlayerIdentity::new("p3", "Cy"), channel().0)
            .await
            .unwrap_err();
        assert!(matches!(err, RoomError::RoomNotFound(_)));
    }

    #[tokio::test]
    async fn test_host_leaves_mid_round() {
        let registry = RoomRegistry::default();
        let conns: Vec<ConnectionId> = (0..3).map(|_| ConnectionId::new_v4()).collect();
        let room = registry.create_room(conns[0], PlayerIdentity::new("p1", "Asha"), channel().0).await.unwrap();
        for (i, conn) in conns.iter().enumerate().skip(1) {
            registry
                .join_room(*conn, room.code.as_str(), PlayerIdentity::new(format!("p{}", i + 1), format!("n{}", i + 1)), channel().0)
                .await
                .unwrap();
        }
        registry.start_game(conns[0]).await.unwrap();

        registry.disconnect(conns[0]).await;
        let room = registry.room_snapshot(&room.code).await.unwrap();
        assert_eq!(room.players.len(), 2);
        assert!(room.players[0].is_host);
        assert_eq!(room.current_player_index, 0);
        assert!(room.players[0].is_current_turn);
        assert_eq!(room.state, RoomState::Playing);
        assert!(room.is_conserved());

        registry.disconnect(conns[1]).await;
        let room = registry.room_snapshot(&room.code).await.unwrap();
        assert_eq!(room.state, RoomState::Finished);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_requests_serialize_per_room() {
        for _ in 0..25 {
            let registry = Arc::new(RoomRegistry::default());
            let conns: Vec<ConnectionId> = (0..4).map(|_| ConnectionId::new_v4()).collect();
            let room = registry.create_room(conns[0], PlayerIdentity::new("p1", "Asha"), channel().0).await.unwrap();
            for (i, conn) in conns.iter().enumerate().skip(1) {
                registry
                    .join_room(*conn, room.code.as_str(), PlayerIdentity::new(format!("p{}", i + 1), format!("n{}", i + 1)), channel().0)
                    .await
                    .unwrap();
            }
            registry.start_game(conns[0]).await.unwrap();
            let code = room.code.clone();

            let spawn_action = |kind: ActionKind| {
                let registry = registry.clone();
                let request = action(&code, "p1", kind, None);
                let conn = conns[0];
                tokio::spawn(async move { registry.dispatch_action(conn, &request).await })
            };
            let first_drop = spawn_action(ActionKind::Drop);
            let draw = spawn_action(ActionKind::DrawFromDeck);
            let second_drop = spawn_action(ActionKind::Drop);
            let leaver = {
                let registry = registry.clone();
                let conn = conns[3];
                tokio::spawn(async move { registry.disconnect(conn).await })
            };

            let drops = [first_drop.await.unwrap(), second_drop.await.unwrap()];
            let draw = draw.await.unwrap();
            assert!(leaver.await.unwrap());

            assert_eq!(drops.iter().filter(|r| r.is_ok()).count(), 1);
            let rejected = drops.iter().find_map(|r| r.as_ref().err()).unwrap();
            assert_eq!(rejected, &RoomError::Action(ActionError::NotYourTurn));

            let room = registry.room_snapshot(&code).await.unwrap();
            assert_eq!(room.state, RoomState::Playing);
            assert_eq!(room.players.len(), 3);
            assert!(room.is_conserved());

            let mut ids: Vec<_> = room
                .deck
                .iter()
                .chain(room.discard_pile.iter())
                .chain(room.players.iter().flat_map(|p| p.hand.iter()))
                .map(|c| c.id.clone())
                .collect();
            let total = ids.len();
            ids.sort();
            ids.dedup();
            assert_eq!(ids.len(), total);

            let current: Vec<_> = room.players.iter().filter(|p| p.is_current_turn).collect();
            assert_eq!(current.len(), 1);
            assert_eq!(current[0].id.as_str(), "p2");
            assert_eq!(room.players[room.current_player_index].id.as_str(), "p2");

            // The draw only lands if it ran before the drop, and then the
            // drop is charged at the after-draw rate.
            let p1 = room.player(&PlayerId::from("p1")).unwrap();
            assert!(p1.has_dropped);
            match draw {
                Ok(_) => {
                    assert_eq!(p1.hand.len(), 14);
                    assert_eq!(p1.points, room.rules.drop_points_middle);
                }
                Err(e) => {
                    assert_eq!(e, RoomError::Action(ActionError::NotYourTurn));
                    assert_eq!(p1.hand.len(), 13);
                    assert_eq!(p1.points, room.rules.drop_points_first);
                }
            }
        }
    }
}
