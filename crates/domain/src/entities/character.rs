//! Character entity: players and enemies share one shape
//!
//! Identity is immutable after creation; everything else is mutable state
//! owned by `GameState` and touched only through mechanics-engine methods.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::ids::CharacterId;
use crate::value_objects::{
    corruption_tier, Attribute, Bond, Condition, Range, VoidChangeRecord, MAX_BONDS,
    SOULCREDIT_MAX, SOULCREDIT_MIN, VOID_MAX, VOID_MIN,
};

/// Whether a character is run by a player agent or an enemy agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Player,
    Enemy,
}

/// Attribute block: the canonical eight, 1-10, default 3.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeBlock(BTreeMap<Attribute, i32>);

impl Default for AttributeBlock {
    fn default() -> Self {
        Self(Attribute::ALL.iter().map(|a| (*a, 3)).collect())
    }
}

impl AttributeBlock {
    /// Build from explicit values; missing attributes default to 3,
    /// values clamp to 1-10.
    pub fn from_values(values: impl IntoIterator<Item = (Attribute, i32)>) -> Self {
        let mut block = Self::default();
        for (attr, value) in values {
            block.0.insert(attr, value.clamp(1, 10));
        }
        block
    }

    pub fn get(&self, attr: Attribute) -> i32 {
        self.0.get(&attr).copied().unwrap_or(3)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Attribute, i32)> + '_ {
        self.0.iter().map(|(a, v)| (*a, *v))
    }
}

/// A character in the session: identity plus mutable game state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    // Identity (immutable after creation)
    pub id: CharacterId,
    pub name: String,
    pub faction: String,
    pub role: Role,

    // Core stats
    pub attributes: AttributeBlock,
    /// Eight talents, default 2. Keyed by talent name.
    pub talents: BTreeMap<String, i32>,
    /// Skill ranks 0-15, canonical names only.
    pub skills: BTreeMap<String, u8>,

    // Metaphysical state
    pub void_score: i32,
    pub soulcredit: i32,
    pub bonds: Vec<Bond>,
    pub void_history: Vec<VoidChangeRecord>,

    // Physical state
    pub conditions: Vec<Condition>,
    pub wounds: u8,
    pub stuns: u8,
    pub fatigue: u8,
    /// Pair-wise range to other entities, keyed by their id.
    pub positions: BTreeMap<CharacterId, Range>,

    // Inventory
    pub offerings: Vec<String>,
    pub ritual_tools: Vec<String>,

    // Enemy extras (zero / None for players)
    pub initiative_bonus: i32,
    pub tactical_profile: Option<String>,
}

impl Character {
    pub fn new(name: impl Into<String>, faction: impl Into<String>, role: Role) -> Self {
        Self {
            id: CharacterId::new(),
            name: name.into(),
            faction: faction.into(),
            role,
            attributes: AttributeBlock::default(),
            talents: BTreeMap::new(),
            skills: BTreeMap::new(),
            void_score: 0,
            soulcredit: 0,
            bonds: Vec::new(),
            void_history: Vec::new(),
            conditions: Vec::new(),
            wounds: 0,
            stuns: 0,
            fatigue: 0,
            positions: BTreeMap::new(),
            offerings: Vec::new(),
            ritual_tools: Vec::new(),
            initiative_bonus: 0,
            tactical_profile: None,
        }
    }

    pub fn with_attributes(mut self, attributes: AttributeBlock) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_skills(mut self, skills: impl IntoIterator<Item = (String, u8)>) -> Self {
        self.skills = skills
            .into_iter()
            .map(|(name, rank)| (name, rank.min(15)))
            .collect();
        self
    }

    pub fn with_talents(mut self, talents: impl IntoIterator<Item = (String, i32)>) -> Self {
        self.talents = talents.into_iter().collect();
        self
    }

    pub fn attribute(&self, attr: Attribute) -> i32 {
        self.attributes.get(attr)
    }

    /// Rank in a canonical skill; 0 when untrained.
    pub fn skill_rank(&self, skill: &str) -> u8 {
        if skill.is_empty() {
            return 0;
        }
        self.skills
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(skill))
            .map(|(_, rank)| *rank)
            .unwrap_or(0)
    }

    /// Record a void change, clamping to 0-10. Returns (old, new).
    pub fn apply_void_delta(&mut self, delta: i32, reason: &str, at: DateTime<Utc>) -> (i32, i32) {
        let old = self.void_score;
        let new = (old + delta).clamp(VOID_MIN, VOID_MAX);
        self.void_score = new;
        self.void_history.push(VoidChangeRecord {
            old,
            new,
            reason: reason.to_string(),
            at,
        });
        (old, new)
    }

    /// Record a soulcredit change, clamping to -10..+10. Returns (old, new).
    pub fn apply_soulcredit_delta(&mut self, delta: i32) -> (i32, i32) {
        let old = self.soulcredit;
        let new = (old + delta).clamp(SOULCREDIT_MIN, SOULCREDIT_MAX);
        self.soulcredit = new;
        (old, new)
    }

    pub fn corruption_label(&self) -> &'static str {
        corruption_tier(self.void_score)
    }

    /// Add a bond, enforcing the three-bond cap.
    pub fn add_bond(&mut self, bond: Bond) -> Result<(), DomainError> {
        if self.bonds.len() >= MAX_BONDS {
            return Err(DomainError::constraint(format!(
                "{} already holds {MAX_BONDS} bonds",
                self.name
            )));
        }
        self.bonds.push(bond);
        Ok(())
    }

    /// True when this character holds any bond naming `target`.
    pub fn bonded_to(&self, target: &str) -> bool {
        self.bonds
            .iter()
            .any(|b| b.target.eq_ignore_ascii_case(target))
    }

    /// Apply a condition. Same-named conditions merge (worse modifier,
    /// longer duration) instead of stacking.
    pub fn apply_condition(&mut self, condition: Condition) {
        if let Some(existing) = self
            .conditions
            .iter_mut()
            .find(|c| c.name.eq_ignore_ascii_case(&condition.name))
        {
            existing.merge(&condition);
        } else {
            self.conditions.push(condition);
        }
    }

    /// Tick all condition durations; expired conditions drop off.
    /// Returns the names of conditions that expired.
    pub fn tick_conditions(&mut self) -> Vec<String> {
        let mut expired = Vec::new();
        self.conditions.retain_mut(|c| {
            if c.tick() {
                true
            } else {
                expired.push(c.name.clone());
                false
            }
        });
        expired
    }

    /// Sum of active condition modifiers.
    pub fn condition_modifier(&self) -> i32 {
        self.conditions.iter().map(|c| c.modifier).sum()
    }

    /// Injury penalty from the wound/stun ladders: -1 per step of each.
    pub fn injury_penalty(&self) -> i32 {
        -((self.wounds as i32) + (self.stuns as i32))
    }

    pub fn take_damage(&mut self, wounds: u8, stuns: u8) {
        self.wounds = self.wounds.saturating_add(wounds);
        self.stuns = self.stuns.saturating_add(stuns);
    }

    /// Consume one offering by name (case-insensitive). Errors when absent.
    pub fn consume_offering(&mut self, item: &str) -> Result<(), DomainError> {
        match self
            .offerings
            .iter()
            .position(|o| o.eq_ignore_ascii_case(item))
        {
            Some(pos) => {
                self.offerings.remove(pos);
                Ok(())
            }
            None => Err(DomainError::not_found("Offering", item)),
        }
    }

    pub fn has_ritual_tool(&self) -> bool {
        !self.ritual_tools.is_empty()
    }

    pub fn range_to(&self, other: CharacterId) -> Range {
        self.positions.get(&other).copied().unwrap_or_default()
    }

    pub fn set_range_to(&mut self, other: CharacterId, range: Range) {
        self.positions.insert(other, range);
    }
}
