//! Game State Definitions
//!
//! Players, rooms and post-game results. A `Room` is the full authoritative
//! snapshot: it is what gets broadcast to every member after each change.
//! Players are kept in a `Vec` because seat order is turn order.

use std::fmt;
use serde::{Serialize, Deserialize};

use crate::core::hash::{compute_state_hash, StateHash, ROOM_STATE_DOMAIN};
use crate::core::rng::DeterministicRng;
use crate::game::card::Card;
use crate::game::deck::POOL_SIZE;
use crate::game::rules::RuleConfig;

/// Longest accepted display name, in characters.
pub const MAX_NAME_LEN: usize = 32;

// =============================================================================
// PLAYER ID
// =============================================================================

/// Client-chosen player identifier, stable across the player's session.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub String);

impl PlayerId {
    /// Create from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PlayerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who a connection claims to be when creating or joining a room.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerIdentity {
    /// Player id
    pub id: PlayerId,
    /// Display name, unique within a room
    pub name: String,
}

impl PlayerIdentity {
    /// Create an identity.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self { id: PlayerId::new(id), name: name.into() }
    }

    /// Trim the name and id, rejecting empty values and overlong names.
    pub fn normalized(&self) -> Option<PlayerIdentity> {
        let id = self.id.as_str().trim();
        let name = self.name.trim();
        if id.is_empty() || name.is_empty() || name.chars().count() > MAX_NAME_LEN {
            return None;
        }
        Some(PlayerIdentity::new(id, name))
    }
}

// =============================================================================
// PLAYER
// =============================================================================

/// A seated player.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    /// Player id
    pub id: PlayerId,
    /// Display name
    pub name: String,
    /// Cards in hand, in display order
    pub hand: Vec<Card>,
    /// Room host (exactly one per non-empty room)
    pub is_host: bool,
    /// Holds the turn
    pub is_current_turn: bool,
    /// Penalty points for the current round
    pub points: u32,
    /// Left the round voluntarily
    pub has_dropped: bool,
    /// Declared this round (valid or not)
    pub has_declared: bool,
    /// The declaration was valid
    pub declared_valid: bool,
    /// Drew a card during the current turn
    pub has_drawn: bool,
}

impl Player {
    /// Seat a new player with an empty hand.
    pub fn new(identity: PlayerIdentity, is_host: bool) -> Self {
        Self {
            id: identity.id,
            name: identity.name,
            hand: Vec::new(),
            is_host,
            is_current_turn: false,
            points: 0,
            has_dropped: false,
            has_declared: false,
            declared_valid: false,
            has_drawn: false,
        }
    }

    /// Still takes turns this round.
    #[inline]
    pub fn is_active(&self) -> bool {
        !self.has_dropped && !self.has_declared
    }

    /// Clear per-round state before a deal.
    pub fn reset_for_round(&mut self) {
        self.hand.clear();
        self.is_current_turn = false;
        self.points = 0;
        self.has_dropped = false;
        self.has_declared = false;
        self.declared_valid = false;
        self.has_drawn = false;
    }
}

// =============================================================================
// ROOM CODE
// =============================================================================

/// Six-character room identifier from `[A-Z0-9]`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomCode(String);

impl RoomCode {
    /// Code length.
    pub const LEN: usize = 6;

    const ALPHABET: &'static [u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

    /// Parse a client-supplied code. Lowercase letters are accepted and
    /// folded to uppercase.
    pub fn parse(s: &str) -> Option<RoomCode> {
        let code = s.trim().to_ascii_uppercase();
        let well_formed = code.len() == Self::LEN
            && code.bytes().all(|b| Self::ALPHABET.contains(&b));
        well_formed.then_some(RoomCode(code))
    }

    /// Draw a random code.
    pub fn generate(rng: &mut DeterministicRng) -> RoomCode {
        let code = (0..Self::LEN)
            .map(|_| Self::ALPHABET[rng.next_int(Self::ALPHABET.len() as u32) as usize] as char)
            .collect();
        RoomCode(code)
    }

    /// Borrow the code string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// ROOM
// =============================================================================

/// Room lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomState {
    /// Gathering players
    Waiting,
    /// Round in progress
    Playing,
    /// Round over; the host may start another
    Finished,
}

impl fmt::Display for RoomState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RoomState::Waiting => "waiting",
            RoomState::Playing => "playing",
            RoomState::Finished => "finished",
        })
    }
}

/// Complete room snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    /// Room code
    pub code: RoomCode,
    /// Seats in join order (also turn order)
    pub players: Vec<Player>,
    /// Lifecycle state
    pub state: RoomState,
    /// Seat limit
    pub max_players: usize,
    /// Seat holding the turn
    pub current_player_index: usize,
    /// Draw pile; the top is the last element
    pub deck: Vec<Card>,
    /// Discard pile; the top is the last element
    pub discard_pile: Vec<Card>,
    /// Card cut at round start to fix the wild rank
    pub wild_joker: Option<Card>,
    /// Rounds dealt in this room
    pub round: u32,
    /// Table rules
    pub rules: RuleConfig,
}

impl Room {
    /// Open a room with its creator as host.
    pub fn new(code: RoomCode, host: PlayerIdentity, rules: RuleConfig) -> Self {
        Self {
            code,
            players: vec![Player::new(host, true)],
            state: RoomState::Waiting,
            max_players: rules.max_players,
            current_player_index: 0,
            deck: Vec::new(),
            discard_pile: Vec::new(),
            wild_joker: None,
            round: 0,
            rules,
        }
    }

    /// Seat index of a player.
    pub fn seat_of(&self, id: &PlayerId) -> Option<usize> {
        self.players.iter().position(|p| &p.id == id)
    }

    /// Get player by id.
    pub fn player(&self, id: &PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| &p.id == id)
    }

    /// Is this display name already seated?
    pub fn has_name(&self, name: &str) -> bool {
        self.players.iter().any(|p| p.name == name)
    }

    /// All seats taken?
    pub fn is_full(&self) -> bool {
        self.players.len() >= self.max_players
    }

    /// The current host, if any.
    pub fn host(&self) -> Option<&Player> {
        self.players.iter().find(|p| p.is_host)
    }

    /// Players who still take turns.
    pub fn active_count(&self) -> usize {
        self.players.iter().filter(|p| p.is_active()).count()
    }

    /// Total cards across deck, discard pile, hands and the wild joker.
    /// Equals the pool size for the whole of a dealt round.
    pub fn card_count(&self) -> usize {
        self.deck.len()
            + self.discard_pile.len()
            + self.players.iter().map(|p| p.hand.len()).sum::<usize>()
            + usize::from(self.wild_joker.is_some())
    }

    /// Does the card count match the pool?
    pub fn is_conserved(&self) -> bool {
        self.card_count() == POOL_SIZE
    }

    /// Next active seat after `from`, wrapping. `None` if no other seat is
    /// active.
    pub fn next_active_seat(&self, from: usize) -> Option<usize> {
        let n = self.players.len();
        (1..n)
            .map(|step| (from + step) % n)
            .find(|&i| self.players[i].is_active())
    }

    /// Recompute `is_current_turn` from `current_player_index`.
    pub fn sync_turn_flags(&mut self) {
        let playing = self.state == RoomState::Playing;
        let current = self.current_player_index;
        for (i, player) in self.players.iter_mut().enumerate() {
            player.is_current_turn = playing && i == current && player.is_active();
        }
    }

    /// Make sure exactly one seat is host. Promotes the first seat if the
    /// host has left.
    pub fn ensure_host(&mut self) -> Option<&Player> {
        if !self.players.iter().any(|p| p.is_host) {
            let first = self.players.first_mut()?;
            first.is_host = true;
        }
        self.host()
    }

    /// Finished, won by a valid declaration, or down to one active seat.
    pub fn is_game_over(&self) -> bool {
        self.state == RoomState::Finished
            || self.players.iter().any(|p| p.declared_valid)
            || self.active_count() <= 1
    }

    /// Winner of the round.
    ///
    /// A valid declarer wins outright. Otherwise the lowest-scoring player
    /// who has not dropped, earliest seat first on ties.
    pub fn winner(&self) -> Option<&Player> {
        if let Some(declarer) = self.players.iter().find(|p| p.declared_valid) {
            return Some(declarer);
        }
        self.players
            .iter()
            .filter(|p| !p.has_dropped)
            .min_by_key(|p| p.points)
    }

    /// Per-player results, winner first then by points.
    pub fn results(&self, duration_minutes: i64) -> Vec<PlayerResult> {
        let winner_id = self.winner().map(|p| p.id.clone());
        let mut order: Vec<&Player> = self.players.iter().collect();
        // Stable sort keeps seat order among equal points
        order.sort_by_key(|p| (Some(&p.id) != winner_id.as_ref(), p.points));

        let total = order.len();
        order
            .into_iter()
            .enumerate()
            .map(|(i, p)| PlayerResult {
                player_id: p.id.clone(),
                name: p.name.clone(),
                won: Some(&p.id) == winner_id.as_ref(),
                points: p.points,
                position: i + 1,
                total_players: total,
                was_dropped: p.has_dropped,
                was_declared: p.has_declared,
                duration_minutes,
            })
            .collect()
    }

    /// SHA-256 of the bincode-encoded snapshot.
    pub fn compute_hash(&self) -> Result<StateHash, bincode::Error> {
        compute_state_hash(ROOM_STATE_DOMAIN, self)
    }
}

/// One player's post-game result.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerResult {
    /// Player id
    pub player_id: PlayerId,
    /// Display name
    pub name: String,
    /// Won the round
    pub won: bool,
    /// Penalty points
    pub points: u32,
    /// Finishing position, 1-based
    pub position: usize,
    /// Players seated at the end
    pub total_players: usize,
    /// Dropped out
    pub was_dropped: bool,
    /// Declared
    pub was_declared: bool,
    /// Round length in whole minutes
    pub duration_minutes: i64,
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn room_with(names: &[&str]) -> Room {
        let code = RoomCode::parse("ABC123").unwrap();
        let mut room = Room::new(code, PlayerIdentity::new("p0", names[0]), RuleConfig::default());
        for (i, name) in names.iter().enumerate().skip(1) {
            room.players.push(Player::new(PlayerIdentity::new(format!("p{}", i), *name), false));
        }
        room
    }

    #[test]
    fn test_room_code_parse() {
        assert_eq!(RoomCode::parse("ab12cd").unwrap().as_str(), "AB12CD");
        assert!(RoomCode::parse("ABC12").is_none());
        assert!(RoomCode::parse("ABC1234").is_none());
        assert!(RoomCode::parse("ABC-12").is_none());
    }

    #[test]
    fn test_room_code_generate() {
        let mut rng = DeterministicRng::new(9);
        for _ in 0..100 {
            let code = RoomCode::generate(&mut rng);
            assert!(RoomCode::parse(code.as_str()).is_some());
        }
    }

    #[test]
    fn test_identity_normalized() {
        let id = PlayerIdentity::new(" p1 ", "  Asha ");
        let norm = id.normalized().unwrap();
        assert_eq!(norm.id.as_str(), "p1");
        assert_eq!(norm.name, "Asha");

        assert!(PlayerIdentity::new("p1", "   ").normalized().is_none());
        assert!(PlayerIdentity::new("", "Asha").normalized().is_none());
        assert!(PlayerIdentity::new("p1", "x".repeat(33)).normalized().is_none());
        assert!(PlayerIdentity::new("p1", "x".repeat(32)).normalized().is_some());
    }

    #[test]
    fn test_next_active_seat_skips_inactive() {
        let mut room = room_with(&["a", "b", "c", "d"]);
        room.players[1].has_dropped = true;
        assert_eq!(room.next_active_seat(0), Some(2));
        assert_eq!(room.next_active_seat(3), Some(0));

        room.players[2].has_declared = true;
        room.players[3].has_dropped = true;
        assert_eq!(room.next_active_seat(0), None);
    }

    #[test]
    fn test_ensure_host_promotes_first_seat() {
        let mut room = room_with(&["a", "b"]);
        room.players.remove(0);
        assert_eq!(room.ensure_host().map(|p| p.name.as_str()), Some("b"));
    }

    #[test]
    fn test_winner_and_results() {
        let mut room = room_with(&["a", "b", "c"]);
        room.state = RoomState::Finished;
        room.players[0].points = 30;
        room.players[1].has_declared = true;
        room.players[1].declared_valid = true;
        room.players[2].points = 12;

        assert_eq!(room.winner().map(|p| p.name.as_str()), Some("b"));

        let results = room.results(7);
        let names: Vec<&str> = results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["b", "c", "a"]);
        assert!(results[0].won);
        assert!(results[0].was_declared);
        assert_eq!(results[2].position, 3);
        assert_eq!(results[2].total_players, 3);
        assert!(results.iter().all(|r| r.duration_minutes == 7));
    }

    #[test]
    fn test_winner_without_declaration() {
        let mut room = room_with(&["a", "b", "c"]);
        room.players[0].has_dropped = true;
        room.players[1].points = 40;
        room.players[2].points = 40;
        assert_eq!(room.winner().map(|p| p.name.as_str()), Some("b"));
        assert!(!room.is_game_over());

        room.players[1].has_dropped = true;
        assert!(room.is_game_over());
    }

    #[test]
    fn test_failed_declaration_never_wins() {
        let mut room = room_with(&["a", "b", "c"]);
        room.state = RoomState::Playing;
        room.players[0].has_declared = true;
        room.players[1].points = 20;
        room.players[2].points = 30;

        // Zero points alone does not make a declaration valid
        assert!(!room.is_game_over());
        assert_eq!(room.winner().map(|p| p.name.as_str()), Some("a"));

        room.players[0].points = 80;
        assert_eq!(room.winner().map(|p| p.name.as_str()), Some("b"));

        room.players[2].has_declared = true;
        room.players[2].declared_valid = true;
        assert!(room.is_game_over());
        assert_eq!(room.winner().map(|p| p.name.as_str()), Some("c"));
    }

    #[test]
    fn test_hash_tracks_changes() {
        let mut room = room_with(&["a", "b"]);
        let before = room.compute_hash().unwrap();
        assert_eq!(before, room.clone().compute_hash().unwrap());
        room.players[1].points = 5;
        assert_ne!(before, room.compute_hash().unwrap());
    }
}
