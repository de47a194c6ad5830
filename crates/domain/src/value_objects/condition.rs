//! Conditions: named modifiers with round-scoped durations

use serde::{Deserialize, Serialize};

/// A condition on a character. Same-named conditions never stack additively;
/// reapplication keeps the worse modifier and the longer remaining duration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub name: String,
    /// Modifier applied to affected checks. Usually negative.
    pub modifier: i32,
    /// Rounds remaining. Ticks down during Cleanup; removed at zero.
    pub rounds_remaining: u32,
}

impl Condition {
    pub fn new(name: impl Into<String>, modifier: i32, duration: u32) -> Self {
        Self {
            name: name.into(),
            modifier,
            rounds_remaining: duration,
        }
    }

    /// Merge a reapplication: worse modifier wins, longer duration wins.
    pub fn merge(&mut self, other: &Condition) {
        self.modifier = self.modifier.min(other.modifier);
        self.rounds_remaining = self.rounds_remaining.max(other.rounds_remaining);
    }

    /// Tick one round. Returns true while the condition is still active.
    pub fn tick(&mut self) -> bool {
        self.rounds_remaining = self.rounds_remaining.saturating_sub(1);
        self.rounds_remaining > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_takes_worse_modifier() {
        let mut stunned = Condition::new("Stunned", -2, 2);
        stunned.merge(&Condition::new("Stunned", -3, 1));
        assert_eq!(stunned.modifier, -3);
        assert_eq!(stunned.rounds_remaining, 2);
    }

    #[test]
    fn test_merge_never_sums() {
        let mut dazed = Condition::new("Dazed", -2, 1);
        dazed.merge(&Condition::new("Dazed", -2, 1));
        assert_eq!(dazed.modifier, -2);
    }

    #[test]
    fn test_tick_expires() {
        let mut c = Condition::new("Winded", -1, 2);
        assert!(c.tick());
        assert!(!c.tick());
        assert_eq!(c.rounds_remaining, 0);
    }
}
