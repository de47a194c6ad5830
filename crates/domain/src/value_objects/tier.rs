//! Outcome tiers and difficulty handling
//!
//! Tier selection is a pure function of the natural roll and the margin.
//! The tier table is normative; narration may color an outcome but never
//! contradict its tier.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Qualitative success level derived from margin (and natural 1s).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeTier {
    CriticalFailure,
    Failure,
    Marginal,
    Moderate,
    Good,
    Excellent,
    Exceptional,
}

impl OutcomeTier {
    /// Tier table: critical_failure (roll = 1 OR margin <= -20), failure
    /// (margin < 0), marginal 0-4, moderate 5-9, good 10-14, excellent
    /// 15-19, exceptional >= 20.
    pub fn from_roll_and_margin(roll: u8, margin: i32) -> Self {
        if roll == 1 || margin <= -20 {
            OutcomeTier::CriticalFailure
        } else if margin < 0 {
            OutcomeTier::Failure
        } else if margin <= 4 {
            OutcomeTier::Marginal
        } else if margin <= 9 {
            OutcomeTier::Moderate
        } else if margin <= 14 {
            OutcomeTier::Good
        } else if margin <= 19 {
            OutcomeTier::Excellent
        } else {
            OutcomeTier::Exceptional
        }
    }

    pub fn is_success(&self) -> bool {
        *self >= OutcomeTier::Marginal
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeTier::CriticalFailure => "critical_failure",
            OutcomeTier::Failure => "failure",
            OutcomeTier::Marginal => "marginal",
            OutcomeTier::Moderate => "moderate",
            OutcomeTier::Good => "good",
            OutcomeTier::Excellent => "excellent",
            OutcomeTier::Exceptional => "exceptional",
        }
    }
}

impl fmt::Display for OutcomeTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Default difficulty when an estimate is absent or nonsensical.
pub const DEFAULT_DIFFICULTY: i32 = 20;

/// Clamp a DM/player difficulty estimate into the working ladder.
/// Estimates at or below zero fall back to the default.
pub fn clamp_difficulty(estimate: i32) -> i32 {
    if estimate <= 0 {
        DEFAULT_DIFFICULTY
    } else {
        estimate.clamp(10, 40)
    }
}
