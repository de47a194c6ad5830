//! Structured mechanical effects
//!
//! Every state change a resolution can carry is one of these variants.
//! Narrative markers in DM prose are cosmetic; these are the source of truth.

use serde::{Deserialize, Serialize};

use crate::value_objects::BondType;

/// A single structured effect attached to a resolution or synthesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum MechanicalEffect {
    VoidChange {
        target: String,
        amount: i32,
        reason: String,
    },
    SoulcreditChange {
        target: String,
        amount: i32,
        reason: String,
    },
    ClockUpdate {
        name: String,
        delta: i32,
        reason: String,
    },
    ConditionApplied {
        /// Declared target. `None` requires a narrative target on the
        /// resolution; the actor is never the silent fallback.
        target: Option<String>,
        name: String,
        modifier: i32,
        duration: u32,
    },
    DamageDealt {
        target: String,
        wounds: u8,
        stuns: u8,
    },
    OfferingConsumed {
        character: String,
        item: String,
    },
    BondChange {
        character: String,
        bond_type: BondType,
        target: String,
        delta: i32,
    },
    EntitySpawn {
        name: String,
        profile: String,
    },
    EntityRemove {
        name: String,
    },
}

impl MechanicalEffect {
    /// Short audit label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            MechanicalEffect::VoidChange { .. } => "void_change",
            MechanicalEffect::SoulcreditChange { .. } => "soulcredit_change",
            MechanicalEffect::ClockUpdate { .. } => "clock_update",
            MechanicalEffect::ConditionApplied { .. } => "condition_applied",
            MechanicalEffect::DamageDealt { .. } => "damage_dealt",
            MechanicalEffect::OfferingConsumed { .. } => "offering_consumed",
            MechanicalEffect::BondChange { .. } => "bond_change",
            MechanicalEffect::EntitySpawn { .. } => "entity_spawn",
            MechanicalEffect::EntityRemove { .. } => "entity_remove",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_tagging() {
        let effect = MechanicalEffect::VoidChange {
            target: "Riven".into(),
            amount: 1,
            reason: "No offering".into(),
        };
        let json = serde_json::to_value(&effect).expect("serialize");
        assert_eq!(json["effect"], "void_change");
        assert_eq!(json["amount"], 1);

        let back: MechanicalEffect = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, effect);
    }

    #[test]
    fn test_condition_applied_optional_target() {
        let json = serde_json::json!({
            "effect": "condition_applied",
            "target": null,
            "name": "Stunned",
            "modifier": -3,
            "duration": 1,
        });
        let effect: MechanicalEffect = serde_json::from_value(json).expect("deserialize");
        assert!(matches!(
            effect,
            MechanicalEffect::ConditionApplied { target: None, .. }
        ));
    }
}
