//! Rule Configuration
//!
//! Table rules that vary between house games. Every room carries its own copy.

use serde::{Serialize, Deserialize};

/// Rules for one room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Seats per room.
    pub max_players: usize,
    /// Accept Q-K-A as a sequence (Ace high). Ace is always low as well;
    /// K-A-2 never wraps.
    pub ace_high: bool,
    /// Penalty ceiling for a losing or invalid hand.
    pub max_penalty: u32,
    /// Drop penalty before drawing in the current turn.
    pub drop_points_first: u32,
    /// Drop penalty after drawing in the current turn.
    pub drop_points_middle: u32,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            max_players: 4,
            ace_high: false,
            max_penalty: 80,
            drop_points_first: 20,
            drop_points_middle: 40,
        }
    }
}

impl RuleConfig {
    /// Override rule values from environment variables.
    ///
    /// `RUMMY_ACE_HIGH` (`true`/`1`) and `RUMMY_MAX_PENALTY`. Unset or
    /// unparsable values keep the current setting.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("RUMMY_ACE_HIGH") {
            self.ace_high = v == "true" || v == "1";
        }
        if let Some(v) = std::env::var("RUMMY_MAX_PENALTY").ok().and_then(|v| v.parse().ok()) {
            self.max_penalty = v;
        }
        self
    }
}
