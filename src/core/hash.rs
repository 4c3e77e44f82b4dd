//! State Hashing for Verification
//!
//! Deterministic SHA-256 digests of room state. Used to tag snapshots in the
//! logs and to check that a rejected action left a room untouched.

use serde::Serialize;
use sha2::{Sha256, Digest};

/// Hash output type (256 bits / 32 bytes)
pub type StateHash = [u8; 32];

/// Domain separator for room snapshots.
pub const ROOM_STATE_DOMAIN: &[u8] = b"RUMMY_ROOM_STATE_V1";

/// Compute hash with domain separator.
pub fn hash_with_domain(domain: &[u8], data: &[u8]) -> StateHash {
    let mut hasher = Sha256::new();
    hasher.update(domain);
    hasher.update(data);
    hasher.finalize().into()
}

/// Hash any serializable state through its bincode encoding.
///
/// bincode is field-order stable, so equal values always hash equal.
pub fn compute_state_hash<T: Serialize>(domain: &[u8], value: &T) -> Result<StateHash, bincode::Error> {
    let encoded = bincode::serialize(value)?;
    Ok(hash_with_domain(domain, &encoded))
}

/// Short hex prefix of a hash, for log lines.
pub fn short_hex(hash: &StateHash) -> String {
    hex::encode(&hash[..6])
}
