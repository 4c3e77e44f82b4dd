//! Declaration Validator
//!
//! Meld legality (pure sequence, impure sequence, set) and the optimal
//! partition search that decides whether a 13-card hand is a winning
//! declaration, and how many penalty points a losing hand carries.
//!
//! The search is exhaustive: every subset of the hand that forms a legal
//! meld is precomputed as a bitmask, then a memoized depth-first search
//! assigns the lowest uncovered card to either "unmatched" or one of the
//! melds that contain it. The state space is bounded by 2^13 masks times
//! the handful of pure/sequence-count flags.

use serde::{Serialize, Deserialize};

use crate::game::card::Card;
use crate::game::deck::{card_points, is_wildcard, sort_hand, HAND_SIZE};
use crate::game::rules::RuleConfig;

/// Fewest cards in any meld.
pub const MIN_MELD_SIZE: usize = 3;

/// Most cards in a set (one per suit).
pub const MAX_SET_SIZE: usize = 4;

/// Longest possible sequence (Ace through King).
pub const MAX_SEQUENCE_SIZE: usize = 13;

// =============================================================================
// MELD TYPES
// =============================================================================

/// Kind of a legal meld.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeldKind {
    /// Same suit, consecutive ranks, no substitution.
    PureSequence,
    /// Same suit, gaps filled by wildcards.
    ImpureSequence,
    /// Same rank, distinct suits.
    Set,
}

impl MeldKind {
    /// Is this either kind of sequence?
    pub fn is_sequence(self) -> bool {
        matches!(self, MeldKind::PureSequence | MeldKind::ImpureSequence)
    }
}

/// A group of cards from a hand forming a legal meld.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meld {
    /// Meld kind
    pub kind: MeldKind,
    /// Cards, sorted by suit then rank
    pub cards: Vec<Card>,
}

/// Outcome of validating a hand.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Declaration {
    /// Sequences in the best partition (pure first).
    pub sequences: Vec<Meld>,
    /// Sets in the best partition.
    pub sets: Vec<Meld>,
    /// Cards not covered by any meld, in hand order.
    pub unmatched: Vec<Card>,
    /// Every card covered, with a pure sequence and at least two sequences.
    pub is_valid: bool,
    /// Penalty carried by the hand (0 when valid).
    pub points: u32,
}

impl Declaration {
    /// Does the partition contain at least one pure sequence?
    pub fn has_pure_sequence(&self) -> bool {
        self.sequences.iter().any(|m| m.kind == MeldKind::PureSequence)
    }

    fn no_melds(hand: &[Card], points: u32) -> Self {
        Self {
            sequences: Vec::new(),
            sets: Vec::new(),
            unmatched: hand.to_vec(),
            is_valid: false,
            points,
        }
    }
}

// =============================================================================
// MELD PREDICATES
// =============================================================================

/// Ace-low rank positions of the given cards, or `None` if any is a printed
/// joker. With `ace_high`, Aces map to 14 instead.
fn positions(cards: &[&Card], ace_high: bool) -> Option<Vec<u8>> {
    cards
        .iter()
        .map(|c| {
            c.rank().map(|r| match r.position() {
                1 if ace_high => 14,
                p => p,
            })
        })
        .collect()
}

fn same_suit(cards: &[&Card]) -> bool {
    let mut suits = cards.iter().map(|c| c.suit());
    match suits.next() {
        Some(Some(first)) => suits.all(|s| s == Some(first)),
        _ => false,
    }
}

fn has_ace(cards: &[&Card]) -> bool {
    cards.iter().any(|c| c.rank().map(|r| r.position()) == Some(1))
}

fn strictly_consecutive(cards: &[&Card], ace_high: bool) -> bool {
    let Some(mut ranks) = positions(cards, ace_high) else {
        return false;
    };
    ranks.sort_unstable();
    ranks.windows(2).all(|w| w[1] == w[0] + 1)
}

fn pure_sequence(cards: &[&Card], ace_high: bool) -> bool {
    if cards.len() < MIN_MELD_SIZE || !same_suit(cards) {
        return false;
    }
    strictly_consecutive(cards, false) || (ace_high && has_ace(cards) && strictly_consecutive(cards, true))
}

/// Can `wilds` fill every gap between the natural ranks?
fn gaps_fillable(naturals: &[&Card], wilds: usize, ace_high: bool) -> bool {
    let Some(mut ranks) = positions(naturals, ace_high) else {
        return false;
    };
    ranks.sort_unstable();
    let mut gaps = 0usize;
    for w in ranks.windows(2) {
        if w[1] == w[0] {
            return false;
        }
        gaps += (w[1] - w[0] - 1) as usize;
    }
    gaps <= wilds
}

fn impure_sequence(cards: &[&Card], wild_joker: Option<&Card>, ace_high: bool) -> bool {
    if cards.len() < MIN_MELD_SIZE || cards.len() > MAX_SEQUENCE_SIZE {
        return false;
    }
    let naturals: Vec<&Card> = cards.iter().copied().filter(|c| !is_wildcard(c, wild_joker)).collect();
    if naturals.is_empty() || !same_suit(&naturals) {
        return false;
    }
    let wilds = cards.len() - naturals.len();
    gaps_fillable(&naturals, wilds, false)
        || (ace_high && has_ace(&naturals) && gaps_fillable(&naturals, wilds, true))
}

fn distinct_suits(cards: &[&Card]) -> bool {
    let mut seen = [false; 4];
    for card in cards {
        match card.suit() {
            Some(suit) => {
                let slot = &mut seen[suit as usize];
                if *slot {
                    return false;
                }
                *slot = true;
            }
            None => return false,
        }
    }
    true
}

fn same_rank(cards: &[&Card]) -> bool {
    let mut ranks = cards.iter().map(|c| c.rank());
    match ranks.next() {
        Some(Some(first)) => ranks.all(|r| r == Some(first)),
        _ => false,
    }
}

fn valid_set(cards: &[&Card], wild_joker: Option<&Card>) -> bool {
    if cards.len() < MIN_MELD_SIZE || cards.len() > MAX_SET_SIZE {
        return false;
    }
    // Wild-rank cards can still form a natural set among themselves
    if same_rank(cards) && distinct_suits(cards) {
        return true;
    }
    let naturals: Vec<&Card> = cards.iter().copied().filter(|c| !is_wildcard(c, wild_joker)).collect();
    !naturals.is_empty() && same_rank(&naturals) && distinct_suits(&naturals)
}

fn classify_refs(cards: &[&Card], wild_joker: Option<&Card>, ace_high: bool) -> Option<MeldKind> {
    if cards.len() < MIN_MELD_SIZE {
        return None;
    }
    if pure_sequence(cards, ace_high) {
        Some(MeldKind::PureSequence)
    } else if impure_sequence(cards, wild_joker, ace_high) {
        Some(MeldKind::ImpureSequence)
    } else if valid_set(cards, wild_joker) {
        Some(MeldKind::Set)
    } else {
        None
    }
}

/// Is this a pure sequence (Ace low)?
///
/// Wild-rank cards count at face value here; printed jokers never fit.
pub fn is_pure_sequence(cards: &[Card]) -> bool {
    let refs: Vec<&Card> = cards.iter().collect();
    pure_sequence(&refs, false)
}

/// Is this a sequence once wildcards fill the rank gaps (Ace low)?
pub fn is_impure_sequence(cards: &[Card], wild_joker: Option<&Card>) -> bool {
    let refs: Vec<&Card> = cards.iter().collect();
    impure_sequence(&refs, wild_joker, false)
}

/// Is this a set of 3-4 cards of one rank with distinct suits?
pub fn is_valid_set(cards: &[Card], wild_joker: Option<&Card>) -> bool {
    let refs: Vec<&Card> = cards.iter().collect();
    valid_set(&refs, wild_joker)
}

/// Best meld kind for a group of cards, if it is a legal meld at all.
pub fn classify(cards: &[Card], wild_joker: Option<&Card>, rules: &RuleConfig) -> Option<MeldKind> {
    let refs: Vec<&Card> = cards.iter().collect();
    classify_refs(&refs, wild_joker, rules.ace_high)
}

// =============================================================================
// SCORING
// =============================================================================

/// Sum of card points over the non-wildcard cards.
pub fn calculate_hand_points(hand: &[Card], wild_joker: Option<&Card>) -> u32 {
    hand.iter()
        .filter(|c| !is_wildcard(c, wild_joker))
        .map(card_points)
        .sum()
}

/// Penalty for a hand given its validated partition.
///
/// 0 for a valid declaration. Without a pure sequence the whole hand counts.
/// Otherwise only cards outside every meld count. Always capped.
pub fn calculate_player_points(
    hand: &[Card],
    declaration: &Declaration,
    wild_joker: Option<&Card>,
    rules: &RuleConfig,
) -> u32 {
    if declaration.is_valid {
        return 0;
    }
    let raw = if declaration.has_pure_sequence() {
        let covered: Vec<&Card> = declaration
            .sequences
            .iter()
            .chain(declaration.sets.iter())
            .flat_map(|m| m.cards.iter())
            .collect();
        hand.iter()
            .filter(|c| !covered.iter().any(|m| m.id == c.id))
            .filter(|c| !is_wildcard(c, wild_joker))
            .map(card_points)
            .sum()
    } else {
        calculate_hand_points(hand, wild_joker)
    };
    raw.min(rules.max_penalty)
}

// =============================================================================
// PARTITION SEARCH
// =============================================================================

/// Lexicographic search cost: leftover points, then leftover card count.
type Cost = (u32, u32);

const UNREACHABLE: Cost = (u32::MAX, u32::MAX);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    /// Sets allowed; a complete partition needs a pure sequence and two
    /// sequences.
    Full,
    /// Sequences only; a complete partition needs a pure sequence.
    SequencesOnly,
}

#[derive(Clone, Copy, Debug)]
enum Step {
    Leave,
    Take(usize),
}

#[derive(Clone, Copy, Debug)]
struct Entry {
    cost: Cost,
    step: Step,
}

/// Precomputed meld tables for one hand.
struct Search {
    len: usize,
    full: u16,
    points: Vec<u32>,
    melds: Vec<(u16, MeldKind)>,
    /// Meld indices grouped by their lowest card index.
    by_low: Vec<Vec<usize>>,
}

impl Search {
    fn new(hand: &[Card], wild_joker: Option<&Card>, ace_high: bool) -> Self {
        let len = hand.len();
        let full: u16 = ((1u32 << len) - 1) as u16;
        let points = hand
            .iter()
            .map(|c| if is_wildcard(c, wild_joker) { 0 } else { card_points(c) })
            .collect();

        let mut melds = Vec::new();
        let mut by_low = vec![Vec::new(); len];
        let mut group: Vec<&Card> = Vec::with_capacity(len);
        for mask in 1..=full {
            let size = mask.count_ones() as usize;
            if size < MIN_MELD_SIZE {
                continue;
            }
            group.clear();
            group.extend((0..len).filter(|i| mask & (1 << i) != 0).map(|i| &hand[i]));
            if let Some(kind) = classify_refs(&group, wild_joker, ace_high) {
                by_low[mask.trailing_zeros() as usize].push(melds.len());
                melds.push((mask, kind));
            }
        }

        Self { len, full, points, melds, by_low }
    }

    fn slot(mask: u16, pure: bool, seqs: u8) -> usize {
        (mask as usize) * 6 + (pure as usize) * 3 + seqs as usize
    }

    fn solve(&self, mode: Mode, memo: &mut [Option<Entry>], mask: u16, pure: bool, seqs: u8) -> Cost {
        if mask == self.full {
            let complete = match mode {
                Mode::Full => pure && seqs >= 2,
                Mode::SequencesOnly => pure,
            };
            return if complete { (0, 0) } else { UNREACHABLE };
        }

        let key = Self::slot(mask, pure, seqs);
        if let Some(entry) = memo[key] {
            return entry.cost;
        }

        let low = (!mask & self.full).trailing_zeros() as usize;
        let mut best = Entry { cost: UNREACHABLE, step: Step::Leave };

        let rest = self.solve(mode, memo, mask | (1 << low), pure, seqs);
        if rest != UNREACHABLE {
            best.cost = (rest.0 + self.points[low], rest.1 + 1);
        }

        for &index in &self.by_low[low] {
            let (meld_mask, kind) = self.melds[index];
            if meld_mask & mask != 0 {
                continue;
            }
            if mode == Mode::SequencesOnly && !kind.is_sequence() {
                continue;
            }
            let next_pure = pure || kind == MeldKind::PureSequence;
            let next_seqs = (seqs + kind.is_sequence() as u8).min(2);
            let cost = self.solve(mode, memo, mask | meld_mask, next_pure, next_seqs);
            if cost < best.cost {
                best = Entry { cost, step: Step::Take(index) };
            }
        }

        memo[key] = Some(best);
        best.cost
    }

    /// Run one mode; returns the cost and the chosen melds.
    fn run(&self, mode: Mode) -> Option<(Cost, Vec<(u16, MeldKind)>)> {
        let mut memo = vec![None; (self.full as usize + 1) * 6];
        let cost = self.solve(mode, &mut memo, 0, false, 0);
        if cost == UNREACHABLE {
            return None;
        }

        let mut chosen = Vec::new();
        let (mut mask, mut pure, mut seqs) = (0u16, false, 0u8);
        while mask != self.full {
            let low = (!mask & self.full).trailing_zeros() as usize;
            match memo[Self::slot(mask, pure, seqs)].map(|e| e.step) {
                Some(Step::Take(index)) => {
                    let (meld_mask, kind) = self.melds[index];
                    chosen.push((meld_mask, kind));
                    mask |= meld_mask;
                    pure = pure || kind == MeldKind::PureSequence;
                    seqs = (seqs + kind.is_sequence() as u8).min(2);
                }
                _ => mask |= 1 << low,
            }
        }
        Some((cost, chosen))
    }

    fn into_declaration(
        &self,
        hand: &[Card],
        cost: Cost,
        chosen: Vec<(u16, MeldKind)>,
        max_penalty: u32,
    ) -> Declaration {
        let mut covered = 0u16;
        let mut sequences = Vec::new();
        let mut sets = Vec::new();
        for (mask, kind) in chosen {
            covered |= mask;
            let mut cards: Vec<Card> = (0..self.len)
                .filter(|i| mask & (1 << i) != 0)
                .map(|i| hand[i].clone())
                .collect();
            sort_hand(&mut cards);
            let meld = Meld { kind, cards };
            if kind.is_sequence() {
                sequences.push(meld);
            } else {
                sets.push(meld);
            }
        }
        sequences.sort_by_key(|m| m.kind != MeldKind::PureSequence);

        let unmatched: Vec<Card> = (0..self.len)
            .filter(|i| covered & (1 << i) == 0)
            .map(|i| hand[i].clone())
            .collect();
        let is_valid = unmatched.is_empty() && sequences.len() >= 2
            && sequences.iter().any(|m| m.kind == MeldKind::PureSequence);

        Declaration {
            sequences,
            sets,
            unmatched,
            is_valid,
            points: if is_valid { 0 } else { cost.0.min(max_penalty) },
        }
    }
}

/// Validate a hand as a declaration.
///
/// Finds the partition into melds that minimizes leftover points. A hand is
/// valid when that partition covers every card and includes a pure sequence
/// and at least two sequences. A losing hand's points follow the same rules
/// as [`calculate_player_points`].
pub fn validate_declaration(hand: &[Card], wild_joker: Option<&Card>, rules: &RuleConfig) -> Declaration {
    if hand.len() != HAND_SIZE {
        let points = calculate_hand_points(hand, wild_joker).min(rules.max_penalty);
        return Declaration::no_melds(hand, points);
    }

    let search = Search::new(hand, wild_joker, rules.ace_high);
    let full = search.run(Mode::Full);
    let seq_only = search.run(Mode::SequencesOnly);

    let best = match (full, seq_only) {
        (Some(a), Some(b)) => Some(if b.0 .0 < a.0 .0 { b } else { a }),
        (a, b) => a.or(b),
    };

    match best {
        Some((cost, chosen)) => search.into_declaration(hand, cost, chosen, rules.max_penalty),
        None => {
            let points = calculate_hand_points(hand, wild_joker).min(rules.max_penalty);
            Declaration::no_melds(hand, points)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cards(notation: &[&str]) -> Vec<Card> {
        let mut seen: Vec<String> = Vec::new();
        notation
            .iter()
            .map(|n| {
                let copy = seen.iter().filter(|s| s.as_str() == *n).count() as u8;
                seen.push(n.to_string());
                Card::parse(n, copy).unwrap()
            })
            .collect()
    }

    fn rules() -> RuleConfig {
        RuleConfig::default()
    }

    #[test]
    fn test_pure_sequence() {
        assert!(is_pure_sequence(&cards(&["8S", "9S", "10S"])));
        assert!(is_pure_sequence(&cards(&["10S", "8S", "9S"])));
        assert!(is_pure_sequence(&cards(&["AH", "2H", "3H", "4H"])));
        assert!(!is_pure_sequence(&cards(&["8S", "9H", "10S"])));
        assert!(!is_pure_sequence(&cards(&["8S", "JK", "10S"])));
        assert!(!is_pure_sequence(&cards(&["8S", "9S"])));
        assert!(!is_pure_sequence(&cards(&["8S", "8S", "9S"])));
    }

    #[test]
    fn test_ace_high_is_opt_in() {
        let qka = cards(&["QD", "KD", "AD"]);
        assert!(!is_pure_sequence(&qka));
        let ace_high = RuleConfig { ace_high: true, ..RuleConfig::default() };
        assert_eq!(classify(&qka, None, &ace_high), Some(MeldKind::PureSequence));

        // No wrap through the Ace
        let kaa2 = cards(&["KD", "AD", "2D"]);
        assert_eq!(classify(&kaa2, None, &ace_high), None);
    }

    #[test]
    fn test_impure_sequence() {
        let wild = Card::parse("5C", 1).unwrap();
        assert!(is_impure_sequence(&cards(&["8S", "JK", "10S"]), None));
        assert!(is_impure_sequence(&cards(&["8S", "5H", "10S"]), Some(&wild)));
        assert!(is_impure_sequence(&cards(&["8S", "JK", "JK", "JS"]), None));
        assert!(!is_impure_sequence(&cards(&["8S", "JK", "JS"]), None));
        assert!(!is_impure_sequence(&cards(&["8S", "JK", "8S"]), None));
        assert!(!is_impure_sequence(&cards(&["8S", "JK", "9H"]), None));
        assert!(is_impure_sequence(&cards(&["JK", "JK", "5H"]), None));
    }

    #[test]
    fn test_valid_set() {
        assert!(is_valid_set(&cards(&["7S", "7H", "7D"]), None));
        assert!(is_valid_set(&cards(&["7S", "7H", "7D", "7C"]), None));
        assert!(!is_valid_set(&cards(&["7S", "7S", "7H"]), None));
        assert!(!is_valid_set(&cards(&["7S", "7H", "8D"]), None));
        assert!(is_valid_set(&cards(&["7S", "7H", "JK"]), None));
        assert!(!is_valid_set(&cards(&["7S", "7H", "7D", "7C", "JK"]), None));
    }

    #[test]
    fn test_set_of_wild_rank_cards() {
        let wild = Card::parse("5C", 1).unwrap();
        assert!(is_valid_set(&cards(&["5S", "5H", "5D"]), Some(&wild)));
    }

    #[test]
    fn test_valid_declaration() {
        // Pure 3, impure 3, sets of 4 and 3
        let hand = cards(&[
            "2H", "3H", "4H",
            "9S", "JK", "JS",
            "7C", "7D", "7H", "7S",
            "KC", "KD", "KS",
        ]);
        let decl = validate_declaration(&hand, None, &rules());
        assert!(decl.is_valid);
        assert_eq!(decl.points, 0);
        assert!(decl.unmatched.is_empty());
        assert!(decl.has_pure_sequence());
        assert_eq!(decl.sequences.len(), 2);
        assert_eq!(decl.sets.len(), 2);
        assert_eq!(calculate_player_points(&hand, &decl, None, &rules()), 0);
    }

    #[test]
    fn test_declaration_finds_non_greedy_split() {
        // The 5H has to leave the hearts run to complete the fives
        let hand = cards(&[
            "AH", "2H", "3H", "4H", "5H",
            "6S", "7S", "8S",
            "5C", "5D",
            "QD", "QC", "QS",
        ]);
        let decl = validate_declaration(&hand, None, &rules());
        assert!(decl.is_valid);
        assert_eq!(decl.points, 0);

        let mut losing = hand.clone();
        losing[12] = Card::parse("KS", 0).unwrap();
        let decl = validate_declaration(&losing, None, &rules());
        assert!(!decl.is_valid);
        assert_eq!(decl.points, 30);
        assert_eq!(decl.unmatched.len(), 3);
    }

    #[test]
    fn test_two_sequences_required() {
        let hand = cards(&[
            "2H", "3H", "4H",
            "7C", "7D", "7H",
            "9C", "9D", "9H",
            "JC", "JD", "JH",
            "KS",
        ]);
        let decl = validate_declaration(&hand, None, &rules());
        assert!(!decl.is_valid);
        assert!(decl.has_pure_sequence());
        assert!(decl.sets.is_empty());
        assert_eq!(decl.points, 80);
    }

    #[test]
    fn test_no_pure_sequence_counts_whole_hand() {
        let hand = cards(&[
            "2H", "4H", "6H",
            "8C", "10D", "QS",
            "3C", "5D", "7S",
            "9C", "JD", "KS",
            "AC",
        ]);
        let decl = validate_declaration(&hand, None, &rules());
        assert!(!decl.is_valid);
        assert!(!decl.has_pure_sequence());
        assert_eq!(decl.points, 80);
        assert_eq!(calculate_player_points(&hand, &decl, None, &rules()), 80);
    }

    #[test]
    fn test_wrong_hand_size_is_invalid() {
        let hand = cards(&["2H", "3H", "4H"]);
        let decl = validate_declaration(&hand, None, &rules());
        assert!(!decl.is_valid);
        assert_eq!(decl.points, 9);
        assert_eq!(decl.unmatched.len(), 3);
    }

    #[test]
    fn test_hand_points_skip_wildcards() {
        let wild = Card::parse("5C", 1).unwrap();
        let hand = cards(&["5H", "JK", "KS", "AD", "3C"]);
        assert_eq!(calculate_hand_points(&hand, Some(&wild)), 23);
        assert_eq!(calculate_hand_points(&hand, None), 28);
    }

    #[test]
    fn test_points_match_player_points() {
        let hand = cards(&[
            "2H", "3H", "4H",
            "6S", "7S", "8S",
            "KC", "KD", "KS",
            "AC", "9D", "QH", "5D",
        ]);
        let decl = validate_declaration(&hand, None, &rules());
        assert!(!decl.is_valid);
        assert_eq!(decl.points, 34);
        assert_eq!(calculate_player_points(&hand, &decl, None, &rules()), decl.points);
    }
}
