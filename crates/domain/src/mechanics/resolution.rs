//! Action resolution: the mechanical envelope narration must respect

use serde::{Deserialize, Serialize};

use crate::mechanics::MechanicalEffect;
use crate::value_objects::{Attribute, OutcomeTier};

/// One labelled modifier contributing to a check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modifier {
    pub label: String,
    pub value: i32,
}

impl Modifier {
    pub fn new(label: impl Into<String>, value: i32) -> Self {
        Self {
            label: label.into(),
            value,
        }
    }
}

/// The authoritative outcome of one adjudicated action.
///
/// Produced by the mechanics engine; the DM narrates *within* it afterwards.
/// `narration` and `structured_path` are filled in by the coordinator once
/// the DM call completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResolution {
    pub intent: String,
    pub attribute: Attribute,
    pub attribute_value: i32,
    /// Canonical skill name; empty for unskilled attempts.
    pub skill: String,
    pub skill_value: u8,
    /// Natural d20 result, 1-20.
    pub roll: u8,
    pub modifiers: Vec<Modifier>,
    pub modifier_sum: i32,
    pub total: i32,
    pub difficulty: i32,
    /// `total - difficulty`.
    pub margin: i32,
    pub outcome_tier: OutcomeTier,
    /// Display formula, e.g. "4 x 3 + d20 (+mods)" or "3 + d20 - 5 (unskilled)".
    pub formula: String,
    pub target: Option<String>,
    pub narration: String,
    pub mechanical_effects: Vec<MechanicalEffect>,
    /// True when the narration came through the structured path.
    pub structured_path: bool,
}

impl ActionResolution {
    pub fn is_unskilled(&self) -> bool {
        self.skill.is_empty()
    }

    /// One-line audit summary for logs and transcripts.
    pub fn summary(&self) -> String {
        format!(
            "{} [{}] roll {} total {} vs DC {} (margin {:+})",
            self.intent, self.outcome_tier, self.roll, self.total, self.difficulty, self.margin
        )
    }
}

/// Winner of a contested check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContestOutcome {
    Actor,
    Opposer,
    Tie,
}

/// Contested comparison. Higher total wins; a natural 20 wins outright when
/// that side's skill rank is strictly higher than the opposition's.
pub fn contested(
    actor_total: i32,
    actor_roll: u8,
    actor_rank: u8,
    opposer_total: i32,
    opposer_roll: u8,
    opposer_rank: u8,
) -> ContestOutcome {
    if actor_roll == 20 && opposer_roll != 20 && actor_rank > opposer_rank {
        return ContestOutcome::Actor;
    }
    if opposer_roll == 20 && actor_roll != 20 && opposer_rank > actor_rank {
        return ContestOutcome::Opposer;
    }
    match actor_total.cmp(&opposer_total) {
        std::cmp::Ordering::Greater => ContestOutcome::Actor,
        std::cmp::Ordering::Less => ContestOutcome::Opposer,
        std::cmp::Ordering::Equal => ContestOutcome::Tie,
    }
}
