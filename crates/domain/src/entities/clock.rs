//! Scene clocks: segmented counters tracking dramatic questions
//!
//! A clock's `current` may exceed `maximum`. Overflow is not an error; it is
//! the signal that a filled consequence is going unanswered, and the urgency
//! ladder escalates with it.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::ids::ClockId;

/// Overflow at which a still-active filled clock is presumed handled by the
/// surrounding fiction and auto-archived.
pub const AUTO_ARCHIVE_OVERFLOW: i32 = 5;

/// Urgency bands for a filled clock's overflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    /// Overflow 1-2: consequence pressing.
    Elevated,
    /// Overflow 3-4: consequence boiling over.
    Severe,
    /// Overflow >= 5: past the point of narrative recovery.
    Critical,
}

/// Result of advancing a clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvanceOutcome {
    /// True exactly once per clock lifetime: the not-filled -> filled edge.
    pub newly_filled: bool,
    pub current: i32,
    pub overflow: i32,
}

/// A scene clock with full advance/regress semantics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneClock {
    pub id: ClockId,
    pub name: String,
    pub current: i32,
    pub maximum: i32,
    pub description: String,
    /// What advancing this clock means in the fiction.
    pub advance_means: String,
    /// What regressing this clock means in the fiction.
    pub regress_means: String,
    /// What happens when the clock fills.
    pub filled_consequence: String,
    /// Latched on the first fill; never resets.
    ever_filled: bool,
    /// Set when the filled consequence has been triggered in narration.
    triggered: bool,
}

impl SceneClock {
    pub fn new(
        name: impl Into<String>,
        maximum: i32,
        description: impl Into<String>,
        advance_means: impl Into<String>,
        regress_means: impl Into<String>,
        filled_consequence: impl Into<String>,
    ) -> Result<Self, DomainError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("Clock name cannot be empty"));
        }
        if maximum < 1 {
            return Err(DomainError::validation(format!(
                "Clock maximum must be >= 1, got {maximum}"
            )));
        }
        Ok(Self {
            id: ClockId::new(),
            name,
            current: 0,
            maximum,
            description: description.into(),
            advance_means: advance_means.into(),
            regress_means: regress_means.into(),
            filled_consequence: filled_consequence.into(),
            ever_filled: false,
            triggered: false,
        })
    }

    pub fn is_filled(&self) -> bool {
        self.current >= self.maximum
    }

    pub fn ever_filled(&self) -> bool {
        self.ever_filled
    }

    pub fn triggered(&self) -> bool {
        self.triggered
    }

    pub fn mark_triggered(&mut self) {
        self.triggered = true;
    }

    /// Segments past the maximum; 0 while unfilled.
    pub fn overflow(&self) -> i32 {
        (self.current - self.maximum).max(0)
    }

    pub fn urgency(&self) -> Option<Urgency> {
        match self.overflow() {
            0 => None,
            1..=2 => Some(Urgency::Elevated),
            3..=4 => Some(Urgency::Severe),
            _ => Some(Urgency::Critical),
        }
    }

    /// A filled clock deep into overflow is presumed addressed and archived.
    pub fn should_auto_archive(&self) -> bool {
        self.overflow() >= AUTO_ARCHIVE_OVERFLOW
    }

    /// Advance by `ticks` (>= 0). `current` may pass `maximum`; the
    /// newly_filled signal fires only on the first fill of the lifetime.
    pub fn advance(&mut self, ticks: i32) -> AdvanceOutcome {
        self.current += ticks.max(0);
        let newly_filled = self.is_filled() && !self.ever_filled;
        if newly_filled {
            self.ever_filled = true;
        }
        AdvanceOutcome {
            newly_filled,
            current: self.current,
            overflow: self.overflow(),
        }
    }

    /// Regress by `ticks` (>= 0), floored at zero. Regression never clears
    /// the ever_filled latch.
    pub fn regress(&mut self, ticks: i32) -> i32 {
        self.current = (self.current - ticks.max(0)).max(0);
        self.current
    }

    /// Display like "Grid Collapse [5/6]" or "Grid Collapse [8/6 +2]".
    pub fn display(&self) -> String {
        if self.overflow() > 0 {
            format!(
                "{} [{}/{} +{}]",
                self.name,
                self.current,
                self.maximum,
                self.overflow()
            )
        } else {
            format!("{} [{}/{}]", self.name, self.current, self.maximum)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clock(max: i32) -> SceneClock {
        SceneClock::new(
            "Grid Collapse",
            max,
            "The district power grid is failing",
            "sabotage, overload, neglect",
            "repairs, load shedding",
            "The grid fails; the district goes dark",
        )
        .expect("valid clock")
    }

    #[test]
    fn test_rejects_bad_maximum() {
        assert!(SceneClock::new("x", 0, "", "", "", "").is_err());
    }

    #[test]
    fn test_fill_signal_fires_once() {
        let mut c = clock(6);
        c.advance(5);
        assert!(!c.is_filled());

        // 5 -> 9: fills, overflows to 3
        let first = c.advance(4);
        assert!(first.newly_filled);
        assert_eq!(first.current, 9);
        assert_eq!(first.overflow, 3);

        // 9 -> 13: already filled, signal must not re-fire
        let second = c.advance(4);
        assert!(!second.newly_filled);
        assert_eq!(second.current, 13);
        assert_eq!(second.overflow, 7);
        assert!(c.ever_filled());
    }

    #[test]
    fn test_urgency_ladder() {
        let mut c = clock(4);
        assert_eq!(c.urgency(), None);
        c.advance(5);
        assert_eq!(c.urgency(), Some(Urgency::Elevated));
        c.advance(2);
        assert_eq!(c.urgency(), Some(Urgency::Severe));
        c.advance(2);
        assert_eq!(c.urgency(), Some(Urgency::Critical));
        assert!(c.should_auto_archive());
    }

    #[test]
    fn test_regress_floors_at_zero() {
        let mut c = clock(4);
        c.advance(2);
        assert_eq!(c.regress(5), 0);
    }

    #[test]
    fn test_regress_keeps_ever_filled_latch() {
        let mut c = clock(2);
        c.advance(2);
        assert!(c.ever_filled());
        c.regress(2);
        assert!(!c.is_filled());
        assert!(c.ever_filled());
        // Refilling must not re-fire the signal
        let again = c.advance(2);
        assert!(!again.newly_filled);
    }

    #[test]
    fn test_display_overflow() {
        let mut c = clock(6);
        c.advance(8);
        assert_eq!(c.display(), "Grid Collapse [8/6 +2]");
    }
}
