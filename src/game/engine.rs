//! Turn Engine
//!
//! The per-room state machine. Every action is checked in full before the
//! room is touched, so a rejected action leaves the room exactly as it was.

use serde::{Serialize, Deserialize};

use crate::core::rng::DeterministicRng;
use crate::game::card::CardId;
use crate::game::deck::{build_pool, deal, pick_wild_joker, shuffle, sort_hand, DeckError, HAND_SIZE};
use crate::game::events::{DrawSource, GameEvent};
use crate::game::meld::{calculate_player_points, validate_declaration, Declaration};
use crate::game::state::{Player, PlayerId, Room, RoomState};

// =============================================================================
// ACTIONS AND ERRORS
// =============================================================================

/// A move submitted by the player holding the turn.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum GameAction {
    /// Take the top card of the draw pile
    DrawFromDeck,
    /// Take the top card of the discard pile
    DrawFromDiscard,
    /// Put a card from hand on the discard pile
    Discard { card_id: CardId },
    /// Claim a winning hand
    Declare,
    /// Leave the round for a penalty
    Drop,
    /// Reorder the hand by suit and rank
    SortHand,
}

impl GameAction {
    /// Wire name of the action.
    pub fn name(&self) -> &'static str {
        match self {
            GameAction::DrawFromDeck => "draw_from_deck",
            GameAction::DrawFromDiscard => "draw_from_discard",
            GameAction::Discard { .. } => "discard",
            GameAction::Declare => "declare",
            GameAction::Drop => "drop",
            GameAction::SortHand => "sort_hand",
        }
    }
}

/// Broad error classes reported to clients.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The request was malformed or its preconditions were not met
    Validation,
    /// The room or game is in the wrong state for the request
    State,
    /// A card pile ran out
    ResourceExhausted,
}

/// Rejected action. The room is unchanged when one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    #[error("Game is not in progress")]
    NotPlaying,

    #[error("Player {0} is not seated in this room")]
    UnknownPlayer(PlayerId),

    #[error("It is not your turn")]
    NotYourTurn,

    #[error("Expected {expected} cards in hand, found {actual}")]
    WrongHandSize { expected: usize, actual: usize },

    #[error("Card {0} is not in your hand")]
    CardNotInHand(CardId),

    #[error("Discard requires a card id")]
    MissingCardId,

    #[error("Deck is empty")]
    DeckEmpty,

    #[error("Discard pile is empty")]
    DiscardEmpty,

    #[error(transparent)]
    Deck(#[from] DeckError),
}

impl ActionError {
    /// Error class for this rejection.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ActionError::NotPlaying => ErrorKind::State,
            ActionError::UnknownPlayer(_)
            | ActionError::NotYourTurn
            | ActionError::WrongHandSize { .. }
            | ActionError::CardNotInHand(_)
            | ActionError::MissingCardId => ErrorKind::Validation,
            ActionError::DeckEmpty
            | ActionError::DiscardEmpty
            | ActionError::Deck(DeckError::EmptyPool) => ErrorKind::ResourceExhausted,
            ActionError::Deck(DeckError::InvalidPlayerCount(_)) => ErrorKind::State,
        }
    }
}

/// Result of an accepted action.
#[derive(Debug, Default)]
pub struct ActionOutcome {
    /// Events generated by the action
    pub events: Vec<GameEvent>,
    /// The action ended the round
    pub round_finished: bool,
    /// Validator output, for declare
    pub declaration: Option<Declaration>,
}

/// A player taken out of a room.
#[derive(Debug)]
pub struct Departure {
    /// The removed seat (hand emptied if the round was running)
    pub player: Player,
    /// Events caused by the removal
    pub events: Vec<GameEvent>,
    /// The removal ended the round
    pub round_finished: bool,
}

// =============================================================================
// ROUND SETUP
// =============================================================================

/// Deal a new round.
///
/// Shuffles a fresh pool, deals 13 cards per seat, cuts the wild joker and
/// turns one card onto the discard pile. Seat 0 plays first. Nothing is
/// changed if the seat count cannot be dealt.
pub fn initialize_game(room: &mut Room, rng: &mut DeterministicRng) -> Result<GameEvent, DeckError> {
    let mut pool = build_pool();
    shuffle(&mut pool, rng);
    let hands = deal(&mut pool, room.players.len())?;
    let wild = pick_wild_joker(&mut pool)?;
    let first_discard = pool.pop().ok_or(DeckError::EmptyPool)?;

    for (player, hand) in room.players.iter_mut().zip(hands) {
        player.reset_for_round();
        player.hand = hand;
    }

    let wild_id = wild.id.clone();
    room.deck = pool;
    room.discard_pile = vec![first_discard];
    room.wild_joker = Some(wild);
    room.current_player_index = 0;
    room.round += 1;
    room.state = RoomState::Playing;
    room.sync_turn_flags();

    Ok(GameEvent::round_started(room.round, Some(wild_id)))
}

// =============================================================================
// ACTION PROCESSING
// =============================================================================

fn expect_hand_size(player: &Player, expected: usize) -> Result<(), ActionError> {
    if player.hand.len() != expected {
        return Err(ActionError::WrongHandSize { expected, actual: player.hand.len() });
    }
    Ok(())
}

/// Apply one action from `player_id`.
pub fn process_action(
    room: &mut Room,
    player_id: &PlayerId,
    action: GameAction,
) -> Result<ActionOutcome, ActionError> {
    if room.state != RoomState::Playing {
        return Err(ActionError::NotPlaying);
    }
    let seat = room
        .seat_of(player_id)
        .ok_or_else(|| ActionError::UnknownPlayer(player_id.clone()))?;
    if seat != room.current_player_index || !room.players[seat].is_active() {
        return Err(ActionError::NotYourTurn);
    }

    let mut outcome = ActionOutcome::default();
    let round = room.round;

    match action {
        GameAction::DrawFromDeck => {
            expect_hand_size(&room.players[seat], HAND_SIZE)?;
            let card = room.deck.pop().ok_or(ActionError::DeckEmpty)?;
            let player = &mut room.players[seat];
            player.hand.push(card);
            player.has_drawn = true;
            outcome.events.push(GameEvent::card_drawn(round, player_id.clone(), DrawSource::Deck));
        }

        GameAction::DrawFromDiscard => {
            expect_hand_size(&room.players[seat], HAND_SIZE)?;
            let card = room.discard_pile.pop().ok_or(ActionError::DiscardEmpty)?;
            let player = &mut room.players[seat];
            player.hand.push(card);
            player.has_drawn = true;
            outcome.events.push(GameEvent::card_drawn(round, player_id.clone(), DrawSource::Discard));
        }

        GameAction::Discard { card_id } => {
            expect_hand_size(&room.players[seat], HAND_SIZE + 1)?;
            let index = room.players[seat]
                .hand
                .iter()
                .position(|c| c.id == card_id)
                .ok_or_else(|| ActionError::CardNotInHand(card_id.clone()))?;

            let player = &mut room.players[seat];
            let card = player.hand.remove(index);
            player.has_drawn = false;
            room.discard_pile.push(card);
            outcome.events.push(GameEvent::card_discarded(round, player_id.clone(), card_id));
            advance_turn(room, seat, &mut outcome.events);
        }

        GameAction::Declare => {
            expect_hand_size(&room.players[seat], HAND_SIZE)?;
            let declaration = validate_declaration(
                &room.players[seat].hand,
                room.wild_joker.as_ref(),
                &room.rules,
            );

            let player = &mut room.players[seat];
            player.has_declared = true;
            player.declared_valid = declaration.is_valid;
            player.has_drawn = false;
            player.points = declaration.points;
            outcome.events.push(GameEvent::player_declared(
                round,
                player_id.clone(),
                declaration.is_valid,
                declaration.points,
            ));

            if declaration.is_valid {
                score_remaining_hands(room);
                finish_round(room, &mut outcome.events);
            } else {
                advance_turn(room, seat, &mut outcome.events);
                if room.active_count() <= 1 {
                    finish_round(room, &mut outcome.events);
                }
            }
            outcome.declaration = Some(declaration);
        }

        GameAction::Drop => {
            let rules = room.rules;
            let player = &mut room.players[seat];
            let points = if player.has_drawn { rules.drop_points_middle } else { rules.drop_points_first };
            player.points = points;
            player.has_dropped = true;
            player.has_drawn = false;
            player.is_current_turn = false;
            outcome.events.push(GameEvent::player_dropped(round, player_id.clone(), points));

            advance_turn(room, seat, &mut outcome.events);
            if room.active_count() <= 1 {
                finish_round(room, &mut outcome.events);
            }
        }

        GameAction::SortHand => {
            sort_hand(&mut room.players[seat].hand);
            outcome.events.push(GameEvent::hand_sorted(round, player_id.clone()));
        }
    }

    outcome.round_finished = room.state == RoomState::Finished;
    Ok(outcome)
}

/// Score every seat still in the round against its own hand.
fn score_remaining_hands(room: &mut Room) {
    let wild = room.wild_joker.clone();
    let rules = room.rules;
    for player in room.players.iter_mut().filter(|p| p.is_active()) {
        let declaration = validate_declaration(&player.hand, wild.as_ref(), &rules);
        player.points = calculate_player_points(&player.hand, &declaration, wild.as_ref(), &rules);
    }
}

/// Pass the turn from `seat` to the next active seat. Stays put if there is
/// none.
fn advance_turn(room: &mut Room, seat: usize, events: &mut Vec<GameEvent>) {
    if let Some(next) = room.next_active_seat(seat) {
        room.current_player_index = next;
        events.push(GameEvent::turn_passed(
            room.round,
            room.players[seat].id.clone(),
            room.players[next].id.clone(),
        ));
    }
    room.sync_turn_flags();
}

fn finish_round(room: &mut Room, events: &mut Vec<GameEvent>) {
    room.state = RoomState::Finished;
    room.sync_turn_flags();
    let winner = room.winner().map(|p| p.id.clone());
    events.push(GameEvent::round_finished(room.round, winner));
}

// =============================================================================
// DEPARTURES
// =============================================================================

/// Remove a player from the room.
///
/// During a round the departing hand goes to the bottom of the deck, and the
/// turn index is repaired: seats before the current one shift it down, and
/// if the departing seat held the turn it passes to the next active seat.
/// The round finishes if at most one active seat is left. A new host is
/// promoted when needed.
pub fn remove_player(room: &mut Room, player_id: &PlayerId) -> Option<Departure> {
    let seat = room.seat_of(player_id)?;
    let mut player = room.players.remove(seat);
    let mut events = Vec::new();
    let mut round_finished = false;

    if room.state == RoomState::Playing {
        // Departing hand goes under the deck
        let mut deck = std::mem::take(&mut player.hand);
        deck.append(&mut room.deck);
        room.deck = deck;

        let n = room.players.len();
        if n == 0 {
            room.current_player_index = 0;
        } else if seat < room.current_player_index {
            room.current_player_index -= 1;
        } else if seat == room.current_player_index {
            let start = seat % n;
            let next = (0..n)
                .map(|step| (start + step) % n)
                .find(|&i| room.players[i].is_active())
                .unwrap_or(start);
            room.current_player_index = next;
            if room.players[next].is_active() {
                events.push(GameEvent::turn_passed(room.round, player.id.clone(), room.players[next].id.clone()));
            }
        }

        if n > 0 && room.active_count() <= 1 {
            finish_round(room, &mut events);
            round_finished = true;
        }
    }

    player.is_current_turn = false;
    room.ensure_host();
    room.sync_turn_flags();

    Some(Departure { player, events, round_finished })
}
