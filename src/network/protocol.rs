//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! Every message is a JSON text frame tagged by `type` with a kebab-case
//! event name.

use serde::{Serialize, Deserialize};

use crate::game::card::CardId;
use crate::game::engine::{ActionError, ErrorKind, GameAction};
use crate::game::state::{PlayerId, PlayerIdentity, PlayerResult, Room, RoomCode};

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Open a new room and take its first seat.
    CreateRoom { player: PlayerIdentity },

    /// Take a seat in an existing room.
    JoinRoom { code: String, player: PlayerIdentity },

    /// Deal a round (host only).
    StartGame,

    /// Turn action.
    GameAction(GameActionRequest),

    /// Leave the current room.
    LeaveRoom,

    /// Ping for latency measurement.
    Ping { timestamp: u64 },
}

/// A turn action as sent by the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameActionRequest {
    /// Room the action is for.
    pub code: String,
    /// Acting player.
    pub player_id: PlayerId,
    /// What to do.
    pub action: ActionKind,
    /// Action arguments.
    #[serde(default)]
    pub data: Option<ActionData>,
}

/// Action names on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Draw from the deck.
    DrawFromDeck,
    /// Draw from the discard pile.
    DrawFromDiscard,
    /// Discard `data.card_id`.
    Discard,
    /// Declare.
    Declare,
    /// Drop out of the round.
    Drop,
    /// Sort the hand.
    SortHand,
}

/// Optional action payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionData {
    /// Card to discard.
    #[serde(default)]
    pub card_id: Option<CardId>,
}

impl GameActionRequest {
    /// Resolve into an engine action. Discard needs a card id.
    pub fn to_action(&self) -> Result<GameAction, ActionError> {
        Ok(match self.action {
            ActionKind::DrawFromDeck => GameAction::DrawFromDeck,
            ActionKind::DrawFromDiscard => GameAction::DrawFromDiscard,
            ActionKind::Discard => {
                let card_id = self
                    .data
                    .as_ref()
                    .and_then(|d| d.card_id.clone())
                    .ok_or(ActionError::MissingCardId)?;
                GameAction::Discard { card_id }
            }
            ActionKind::Declare => GameAction::Declare,
            ActionKind::Drop => GameAction::Drop,
            ActionKind::SortHand => GameAction::SortHand,
        })
    }
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Room opened (to the creator).
    RoomCreated { code: RoomCode, room: Room },

    /// Seat taken (to the joiner).
    RoomJoined { room: Room },

    /// Someone joined (to the room).
    PlayerJoined { room: Room },

    /// Someone left (to the room).
    PlayerLeft { room: Room },

    /// Round dealt (to the room).
    GameStarted { room: Room },

    /// Room changed after an action (to the room).
    GameStateUpdated { room: Room },

    /// Round over (to the room).
    GameOver { results: Vec<PlayerResult> },

    /// Join request rejected.
    JoinError { error: ServerError },

    /// Create request rejected.
    CreateError { error: ServerError },

    /// Any other request rejected.
    Error { error: ServerError },

    /// Pong response.
    Pong { timestamp: u64, server_time: u64 },

    /// Server is shutting down.
    Shutdown { reason: String },
}

/// Server error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

impl ServerError {
    /// Create an error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Request preconditions not met.
    Validation,
    /// Room or game in the wrong state.
    State,
    /// Deck or discard pile empty.
    ResourceExhausted,
    /// Message could not be parsed.
    InvalidInput,
    /// Too many connections.
    ServerOverloaded,
    /// Internal error.
    InternalError,
}

impl From<ErrorKind> for ErrorCode {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::Validation => ErrorCode::Validation,
            ErrorKind::State => ErrorCode::State,
            ErrorKind::ResourceExhausted => ErrorCode::ResourceExhausted,
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

    /// Wire name, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::RoomCreated { .. } => "room-created",
            ServerMessage::RoomJoined { .. } => "room-joined",
            ServerMessage::PlayerJoined { .. } => "player-joined",
            ServerMessage::PlayerLeft { .. } => "player-left",
            ServerMessage::GameStarted { .. } => "game-started",
            ServerMessage::GameStateUpdated { .. } => "game-state-updated",
            ServerMessage::GameOver { .. } => "game-over",
            ServerMessage::JoinError { .. } => "join-error",
            ServerMessage::CreateError { .. } => "create-error",
            ServerMessage::Error { .. } => "error",
            ServerMessage::Pong { .. } => "pong",
            ServerMessage::Shutdown { .. } => "shutdown",
        }
    }
}
