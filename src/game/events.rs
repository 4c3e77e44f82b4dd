//! Game Events
//!
//! Events produced by the turn engine. The registry logs them; clients only
//! ever see the resulting room snapshot.

use serde::{Serialize, Deserialize};

use crate::game::card::CardId;
use crate::game::state::PlayerId;

/// Where a drawn card came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawSource {
    /// Top of the draw pile
    Deck,
    /// Top of the discard pile
    Discard,
}

/// Game event data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameEventData {
    /// A new round was dealt
    RoundStarted {
        wild_joker: Option<CardId>,
    },

    /// Player drew a card
    CardDrawn {
        player_id: PlayerId,
        source: DrawSource,
    },

    /// Player discarded a card
    CardDiscarded {
        player_id: PlayerId,
        card_id: CardId,
    },

    /// Player reordered their hand
    HandSorted {
        player_id: PlayerId,
    },

    /// Turn moved to another seat
    TurnPassed {
        from: PlayerId,
        to: PlayerId,
    },

    /// Player declared
    PlayerDeclared {
        player_id: PlayerId,
        valid: bool,
        points: u32,
    },

    /// Player dropped out of the round
    PlayerDropped {
        player_id: PlayerId,
        points: u32,
    },

    /// Round ended
    RoundFinished {
        winner_id: Option<PlayerId>,
    },
}

/// A game event tagged with its round.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameEvent {
    /// Round the event belongs to
    pub round: u32,

    /// Player involved
    pub player_id: Option<PlayerId>,

    /// Event data
    pub data: GameEventData,
}

impl GameEvent {
    /// Create a new event.
    pub fn new(round: u32, data: GameEventData) -> Self {
        let player_id = match &data {
            GameEventData::CardDrawn { player_id, .. } => Some(player_id.clone()),
            GameEventData::CardDiscarded { player_id, .. } => Some(player_id.clone()),
            GameEventData::HandSorted { player_id } => Some(player_id.clone()),
            GameEventData::TurnPassed { to, .. } => Some(to.clone()),
            GameEventData::PlayerDeclared { player_id, .. } => Some(player_id.clone()),
            GameEventData::PlayerDropped { player_id, .. } => Some(player_id.clone()),
            GameEventData::RoundFinished { winner_id } => winner_id.clone(),
            GameEventData::RoundStarted { .. } => None,
        };

        Self { round, player_id, data }
    }

    /// Create round started event.
    pub fn round_started(round: u32, wild_joker: Option<CardId>) -> Self {
        Self::new(round, GameEventData::RoundStarted { wild_joker })
    }

    /// Create card drawn event.
    pub fn card_drawn(round: u32, player_id: PlayerId, source: DrawSource) -> Self {
        Self::new(round, GameEventData::CardDrawn { player_id, source })
    }

    /// Create card discarded event.
    pub fn card_discarded(round: u32, player_id: PlayerId, card_id: CardId) -> Self {
        Self::new(round, GameEventData::CardDiscarded { player_id, card_id })
    }

    /// Create hand sorted event.
    pub fn hand_sorted(round: u32, player_id: PlayerId) -> Self {
        Self::new(round, GameEventData::HandSorted { player_id })
    }

    /// Create turn passed event.
    pub fn turn_passed(round: u32, from: PlayerId, to: PlayerId) -> Self {
        Self::new(round, GameEventData::TurnPassed { from, to })
    }

    /// Create player declared event.
    pub fn player_declared(round: u32, player_id: PlayerId, valid: bool, points: u32) -> Self {
        Self::new(round, GameEventData::PlayerDeclared { player_id, valid, points })
    }

    /// Create player dropped event.
    pub fn player_dropped(round: u32, player_id: PlayerId, points: u32) -> Self {
        Self::new(round, GameEventData::PlayerDropped { player_id, points })
    }

    /// Create round finished event.
    pub fn round_finished(round: u32, winner_id: Option<PlayerId>) -> Self {
        Self::new(round, GameEventData::RoundFinished { winner_id })
    }
}
