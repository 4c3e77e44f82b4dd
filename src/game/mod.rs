//! Game Logic Module
//!
//! Everything that decides the outcome of a round. No I/O and no clocks;
//! randomness only comes in through a seeded `DeterministicRng`.
//!
//! ## Module Structure
//!
//! - `card`: Suits, ranks and card identity
//! - `deck`: Pool construction, shuffle, deal, card values
//! - `meld`: Meld legality and declaration validation
//! - `rules`: Per-room rule configuration
//! - `state`: Players, rooms, results
//! - `engine`: Turn state machine
//! - `events`: Engine events for logging

pub mod card;
pub mod deck;
pub mod meld;
pub mod rules;
pub mod state;
pub mod engine;
pub mod events;

// Re-export key types
pub use card::{Card, CardId, Rank, Suit};
pub use deck::DeckError;
pub use meld::{Declaration, Meld, MeldKind};
pub use rules::RuleConfig;
pub use state::{Player, PlayerId, PlayerIdentity, PlayerResult, Room, RoomCode, RoomState};
pub use engine::{ActionError, ActionOutcome, ErrorKind, GameAction};
pub use events::GameEvent;
