//! Deck Manager
//!
//! Builds the fixed 106-card pool (two 52-card decks plus two printed
//! jokers), shuffles and deals it, and defines card value semantics.

use crate::core::rng::DeterministicRng;
use crate::game::card::{Card, Rank, Suit};

/// Number of cards in a room's pool.
pub const POOL_SIZE: usize = 106;

/// Cards dealt to each seat.
pub const HAND_SIZE: usize = 13;

/// Fewest seats a round can be dealt for.
pub const MIN_SEATS: usize = 2;

/// Most seats a round can be dealt for.
pub const MAX_SEATS: usize = 4;

/// Deck errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeckError {
    /// Not enough cards left for the requested operation.
    #[error("Card pool is empty")]
    EmptyPool,

    /// Seat count outside 2..=4.
    #[error("Cannot deal for {0} players")]
    InvalidPlayerCount(usize),
}

/// Build the full pool in its fixed pre-shuffle order.
///
/// Deck 0 then deck 1, each suit in [`Suit::ALL`] order with ranks Ace to
/// King, then the two printed jokers.
pub fn build_pool() -> Vec<Card> {
    let mut pool = Vec::with_capacity(POOL_SIZE);
    for deck in 0..2 {
        for suit in Suit::ALL {
            for rank in Rank::ALL {
                pool.push(Card::standard(suit, rank, deck));
            }
        }
    }
    pool.push(Card::joker(1));
    pool.push(Card::joker(2));
    pool
}

/// Shuffle the pool in place (Fisher-Yates).
pub fn shuffle(pool: &mut [Card], rng: &mut DeterministicRng) {
    rng.shuffle(pool);
}

/// Deal 13 cards round-robin to `seats` players from the top of the pool.
///
/// The top of the pool is the end of the vector. Returns the hands in seat
/// order; the pool keeps the remaining cards.
pub fn deal(pool: &mut Vec<Card>, seats: usize) -> Result<Vec<Vec<Card>>, DeckError> {
    if !(MIN_SEATS..=MAX_SEATS).contains(&seats) {
        return Err(DeckError::InvalidPlayerCount(seats));
    }
    if pool.len() < HAND_SIZE * seats {
        return Err(DeckError::EmptyPool);
    }

    let mut hands: Vec<Vec<Card>> = (0..seats).map(|_| Vec::with_capacity(HAND_SIZE + 1)).collect();
    for _ in 0..HAND_SIZE {
        for hand in hands.iter_mut() {
            // Length checked above
            if let Some(card) = pool.pop() {
                hand.push(card);
            }
        }
    }
    Ok(hands)
}

/// Remove and return the top card of the pool as the round's wild joker.
pub fn pick_wild_joker(pool: &mut Vec<Card>) -> Result<Card, DeckError> {
    pool.pop().ok_or(DeckError::EmptyPool)
}

/// Ordering value: A=1, 2..10 face, J/Q/K=10, joker=0.
pub fn card_face_value(card: &Card) -> u32 {
    match card.rank() {
        None => 0,
        Some(Rank::Jack | Rank::Queen | Rank::King) => 10,
        Some(rank) => rank.position() as u32,
    }
}

/// Penalty value: A=10, 2..10 face, J/Q/K=10, joker=0.
pub fn card_points(card: &Card) -> u32 {
    match card.rank() {
        None => 0,
        Some(Rank::Ace | Rank::Jack | Rank::Queen | Rank::King) => 10,
        Some(rank) => rank.position() as u32,
    }
}

/// Sort a hand by suit, then rank (Ace low). Printed jokers go last.
///
/// Stable, so duplicate cards from the two decks keep their relative order.
pub fn sort_hand(hand: &mut [Card]) {
    hand.sort_by_key(|card| match (card.suit(), card.rank()) {
        (Some(suit), Some(rank)) => (0u8, suit as u8, rank.position()),
        _ => (1u8, 0, 0),
    });
}

/// The rank that is wild for a round.
///
/// A printed joker cut as the wild card makes Aces wild.
pub fn wild_rank(wild_joker: &Card) -> Rank {
    wild_joker.rank().unwrap_or(Rank::Ace)
}

/// Does this card act as a wildcard this round?
///
/// Printed jokers always do. With a wild joker set, every other card of the
/// wild rank does too, whatever its suit.
pub fn is_wildcard(card: &Card, wild_joker: Option<&Card>) -> bool {
    if card.is_printed_joker() {
        return true;
    }
    match wild_joker {
        Some(wild) => card.id != wild.id && card.rank() == Some(wild_rank(wild)),
        None => false,
    }
}
