//! Void corruption ladder and ritual penalties

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Void score bounds.
pub const VOID_MIN: i32 = 0;
pub const VOID_MAX: i32 = 10;

/// Soulcredit bounds. Soulcredit is moral standing, not currency.
pub const SOULCREDIT_MIN: i32 = -10;
pub const SOULCREDIT_MAX: i32 = 10;

/// One audited change to a character's void score or soulcredit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoidChangeRecord {
    pub old: i32,
    pub new: i32,
    pub reason: String,
    pub at: DateTime<Utc>,
}

/// Corruption label for a void score. Callers clamp before asking.
pub fn corruption_tier(score: i32) -> &'static str {
    match score.clamp(VOID_MIN, VOID_MAX) {
        0 => "Pure",
        1 => "Tainted",
        2 => "Corrupted",
        3 => "Stained",
        4 => "Marked",
        5 => "Void-Touched",
        6 => "Void-Corrupted",
        7 => "Void-Bound",
        8 => "Void-Dominated",
        9 => "Void-Infused",
        _ => "Void-Null",
    }
}

/// Ritual modifier for a participant's void score.
///
/// Two effects compound: -1 per point over 5, and at 8+ an escalating
/// -2 per point over 7 as the void begins answering back.
pub fn ritual_void_penalty(score: i32) -> i32 {
    let over_five = (score - 5).max(0);
    let dominated = if score >= 8 { (score - 7) * 2 } else { 0 };
    -(over_five + dominated)
}

/// A score of 10 flags the character for terminal handling by the DM.
pub fn is_terminal(score: i32) -> bool {
    score >= VOID_MAX
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corruption_ladder_endpoints() {
        assert_eq!(corruption_tier(0), "Pure");
        assert_eq!(corruption_tier(5), "Void-Touched");
        assert_eq!(corruption_tier(10), "Void-Null");
        // Out-of-range input clamps
        assert_eq!(corruption_tier(-3), "Pure");
        assert_eq!(corruption_tier(14), "Void-Null");
    }

    #[test]
    fn test_ritual_penalty_below_threshold() {
        assert_eq!(ritual_void_penalty(0), 0);
        assert_eq!(ritual_void_penalty(5), 0);
    }

    #[test]
    fn test_ritual_penalty_over_five() {
        assert_eq!(ritual_void_penalty(6), -1);
        assert_eq!(ritual_void_penalty(7), -2);
    }

    #[test]
    fn test_ritual_penalty_escalates_at_eight() {
        assert_eq!(ritual_void_penalty(8), -(3 + 2));
        assert_eq!(ritual_void_penalty(9), -(4 + 4));
        assert_eq!(ritual_void_penalty(10), -(5 + 6));
    }

    #[test]
    fn test_terminal_flag() {
        assert!(!is_terminal(9));
        assert!(is_terminal(10));
    }
}
