//! The canonical eight attributes
//!
//! Every check pairs one attribute with a skill (or none, for unskilled
//! attempts). Agent output is normalized into this closed set; anything else
//! is a validation error carrying a nearest-match suggestion.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::DomainError;

/// The eight canonical attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Attribute {
    Strength,
    Health,
    Agility,
    Dexterity,
    Perception,
    Intelligence,
    Empathy,
    Willpower,
}

impl Attribute {
    /// All eight, in display order.
    pub const ALL: [Attribute; 8] = [
        Attribute::Strength,
        Attribute::Health,
        Attribute::Agility,
        Attribute::Dexterity,
        Attribute::Perception,
        Attribute::Intelligence,
        Attribute::Empathy,
        Attribute::Willpower,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Attribute::Strength => "Strength",
            Attribute::Health => "Health",
            Attribute::Agility => "Agility",
            Attribute::Dexterity => "Dexterity",
            Attribute::Perception => "Perception",
            Attribute::Intelligence => "Intelligence",
            Attribute::Empathy => "Empathy",
            Attribute::Willpower => "Willpower",
        }
    }

    /// Parse a name case-insensitively. Common shorthands are accepted;
    /// unknown names produce an error with a nearest-match suggestion.
    pub fn parse(input: &str) -> Result<Self, DomainError> {
        let trimmed = input.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "strength" | "str" => Ok(Attribute::Strength),
            "health" | "hea" | "con" | "constitution" => Ok(Attribute::Health),
            "agility" | "agi" => Ok(Attribute::Agility),
            "dexterity" | "dex" => Ok(Attribute::Dexterity),
            "perception" | "per" => Ok(Attribute::Perception),
            "intelligence" | "int" => Ok(Attribute::Intelligence),
            "empathy" | "emp" | "charisma" | "cha" => Ok(Attribute::Empathy),
            "willpower" | "wil" | "will" => Ok(Attribute::Willpower),
            _ => Err(DomainError::UnknownAttribute {
                name: trimmed.to_string(),
                suggestion: Self::nearest(trimmed),
            }),
        }
    }

    /// Default attribute for a social approach when the agent names none.
    /// Social checks read people, so the default is Empathy, not Perception.
    pub fn social_default() -> Self {
        Attribute::Empathy
    }

    fn nearest(input: &str) -> Option<String> {
        let lower = input.to_ascii_lowercase();
        let first = lower.chars().next()?;
        Self::ALL
            .iter()
            .find(|a| a.as_str().to_ascii_lowercase().starts_with(first))
            .map(|a| a.as_str().to_string())
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
