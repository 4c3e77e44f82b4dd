//! Network Layer
//!
//! WebSocket server, wire protocol and the room registry.
//! Game rules live in `game/`; this layer only routes, locks and broadcasts.

pub mod protocol;
pub mod registry;
pub mod server;

pub use protocol::{ClientMessage, ServerMessage, ServerError, ErrorCode, GameActionRequest};
pub use registry::{ConnectionId, RoomError, RoomRegistry};
pub use server::{GameServer, ServerConfig, GameServerError};
