//! Core deterministic primitives.
//!
//! Seeded randomness for shuffling and room codes, and state hashing for
//! snapshot verification.

pub mod rng;
pub mod hash;

// Re-export core types
pub use rng::{DeterministicRng, derive_round_seed};
pub use hash::{StateHash, compute_state_hash};
