//! # Rummy Server
//!
//! Authoritative room server for 13-card Indian Rummy played over a local
//! network.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       RUMMY SERVER                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Deterministic primitives                  │
//! │  ├── rng.rs      - Seeded Xorshift128+ PRNG                  │
//! │  └── hash.rs     - State hashing for snapshot logs           │
//! │                                                              │
//! │  game/           - Game logic (no I/O)                       │
//! │  ├── card.rs     - Suits, ranks, card identity               │
//! │  ├── deck.rs     - Pool, shuffle, deal, card values          │
//! │  ├── meld.rs     - Meld rules and declaration validation     │
//! │  ├── rules.rs    - Per-room rule configuration               │
//! │  ├── state.rs    - Players and rooms                         │
//! │  ├── engine.rs   - Turn state machine                        │
//! │  └── events.rs   - Engine events                             │
//! │                                                              │
//! │  network/        - Networking                                │
//! │  ├── server.rs   - WebSocket server                          │
//! │  ├── protocol.rs - Message types                             │
//! │  └── registry.rs - Rooms and seated connections              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism
//!
//! Given the same seed, `game::engine::initialize_game` deals the same
//! round, and the same sequence of actions yields the same room (and the
//! same state hash). Entropy only enters in `network/`.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use core::rng::DeterministicRng;
pub use game::state::{PlayerId, Room, RoomCode, RoomState};
pub use game::rules::RuleConfig;
pub use network::{GameServer, ServerConfig};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
