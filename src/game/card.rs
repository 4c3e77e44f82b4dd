//! Card Definitions
//!
//! Suits, ranks and the immutable card value. A card never changes once
//! built; rounds only move it between deck, discard pile and hands.

use std::fmt;
use serde::{Serialize, Deserialize};

// =============================================================================
// CARD ID
// =============================================================================

/// Unique card identifier within a room's pool (`hearts-7-0`, `joker-1`).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CardId(pub String);

impl CardId {
    /// Borrow the raw id string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CardId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for CardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// SUIT
// =============================================================================

/// Card suit. Declaration order is the display/sort precedence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Suit {
    /// Hearts
    Hearts,
    /// Diamonds
    Diamonds,
    /// Clubs
    Clubs,
    /// Spades
    Spades,
}

impl Suit {
    /// All suits in sort order.
    pub const ALL: [Suit; 4] = [Suit::Hearts, Suit::Diamonds, Suit::Clubs, Suit::Spades];

    /// Lowercase name, as used in card ids.
    pub fn name(self) -> &'static str {
        match self {
            Suit::Hearts => "hearts",
            Suit::Diamonds => "diamonds",
            Suit::Clubs => "clubs",
            Suit::Spades => "spades",
        }
    }

    /// Single-letter code (`H`, `D`, `C`, `S`).
    pub fn letter(self) -> char {
        match self {
            Suit::Hearts => 'H',
            Suit::Diamonds => 'D',
            Suit::Clubs => 'C',
            Suit::Spades => 'S',
        }
    }

    /// Parse a single-letter code.
    pub fn from_letter(c: char) -> Option<Suit> {
        match c.to_ascii_uppercase() {
            'H' => Some(Suit::Hearts),
            'D' => Some(Suit::Diamonds),
            'C' => Some(Suit::Clubs),
            'S' => Some(Suit::Spades),
            _ => None,
        }
    }
}

// =============================================================================
// RANK
// =============================================================================

/// Card rank. The discriminant is the Ace-low position (A=1 .. K=13).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Rank {
    #[serde(rename = "A")]
    Ace = 1,
    #[serde(rename = "2")]
    Two = 2,
    #[serde(rename = "3")]
    Three = 3,
    #[serde(rename = "4")]
    Four = 4,
    #[serde(rename = "5")]
    Five = 5,
    #[serde(rename = "6")]
    Six = 6,
    #[serde(rename = "7")]
    Seven = 7,
    #[serde(rename = "8")]
    Eight = 8,
    #[serde(rename = "9")]
    Nine = 9,
    #[serde(rename = "10")]
    Ten = 10,
    #[serde(rename = "J")]
    Jack = 11,
    #[serde(rename = "Q")]
    Queen = 12,
    #[serde(rename = "K")]
    King = 13,
}

impl Rank {
    /// All ranks, Ace low.
    pub const ALL: [Rank; 13] = [
        Rank::Ace, Rank::Two, Rank::Three, Rank::Four, Rank::Five,
        Rank::Six, Rank::Seven, Rank::Eight, Rank::Nine, Rank::Ten,
        Rank::Jack, Rank::Queen, Rank::King,
    ];

    /// Position in the Ace-low run (1..=13).
    #[inline]
    pub fn position(self) -> u8 {
        self as u8
    }

    /// Rank from its Ace-low position.
    pub fn from_position(position: u8) -> Option<Rank> {
        Rank::ALL.get(position.checked_sub(1)? as usize).copied()
    }

    /// Printed label (`A`, `2` .. `10`, `J`, `Q`, `K`).
    pub fn label(self) -> &'static str {
        match self {
            Rank::Ace => "A",
            Rank::Two => "2",
            Rank::Three => "3",
            Rank::Four => "4",
            Rank::Five => "5",
            Rank::Six => "6",
            Rank::Seven => "7",
            Rank::Eight => "8",
            Rank::Nine => "9",
            Rank::Ten => "10",
            Rank::Jack => "J",
            Rank::Queen => "Q",
            Rank::King => "K",
        }
    }

    /// Parse a printed label.
    pub fn from_label(label: &str) -> Option<Rank> {
        Rank::ALL.iter().copied().find(|r| r.label().eq_ignore_ascii_case(label))
    }
}

// =============================================================================
// CARD
// =============================================================================

/// What is printed on a card.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Face {
    /// A regular suited card.
    Standard {
        /// Suit
        suit: Suit,
        /// Rank
        rank: Rank,
    },
    /// A printed joker. Has no suit or rank.
    Joker,
}

/// A physical card in a room's pool.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Card {
    /// Unique id within the pool.
    pub id: CardId,
    /// Printed face.
    pub face: Face,
}

impl Card {
    /// Build a suited card from one of the two decks in the pool.
    pub fn standard(suit: Suit, rank: Rank, deck: u8) -> Self {
        Self {
            id: CardId(format!("{}-{}-{}", suit.name(), rank.label(), deck)),
            face: Face::Standard { suit, rank },
        }
    }

    /// Build the `n`th printed joker (1-based).
    pub fn joker(n: u8) -> Self {
        Self {
            id: CardId(format!("joker-{}", n)),
            face: Face::Joker,
        }
    }

    /// Parse short notation: `7H`, `10S`, `QD`, `AC`, or `JK` for a joker.
    /// `copy` selects the deck (or joker number) so ids stay unique.
    pub fn parse(notation: &str, copy: u8) -> Option<Self> {
        if notation.eq_ignore_ascii_case("JK") {
            return Some(Card::joker(copy + 1));
        }
        let suit_char = notation.chars().last()?;
        let suit = Suit::from_letter(suit_char)?;
        let rank = Rank::from_label(&notation[..notation.len() - suit_char.len_utf8()])?;
        Some(Card::standard(suit, rank, copy))
    }

    /// Suit, if this is not a printed joker.
    pub fn suit(&self) -> Option<Suit> {
        match self.face {
            Face::Standard { suit, .. } => Some(suit),
            Face::Joker => None,
        }
    }

    /// Rank, if this is not a printed joker.
    pub fn rank(&self) -> Option<Rank> {
        match self.face {
            Face::Standard { rank, .. } => Some(rank),
            Face::Joker => None,
        }
    }

    /// Is this a printed joker?
    pub fn is_printed_joker(&self) -> bool {
        matches!(self.face, Face::Joker)
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.face {
            Face::Standard { suit, rank } => write!(f, "{}{}", rank.label(), suit.letter()),
            Face::Joker => f.write_str("JK"),
        }
    }
}
