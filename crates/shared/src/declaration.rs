//! Action declarations: what an agent intends before any dice are thrown
//!
//! Agents emit a loose [`DeclarationDraft`] (everything stringly, straight
//! out of the model). Validation turns a draft into a typed
//! [`ActionDeclaration`] or a [`DeclarationError`] carrying a concrete
//! suggestion for the reprompt.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use aeonisk_domain::{normalize_skill, Attribute};

/// The closed set of declared action types.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Investigate,
    Social,
    Combat,
    Ritual,
    Technical,
    Movement,
    Coordinate,
    #[default]
    Other,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Investigate => "investigate",
            ActionType::Social => "social",
            ActionType::Combat => "combat",
            ActionType::Ritual => "ritual",
            ActionType::Technical => "technical",
            ActionType::Movement => "movement",
            ActionType::Coordinate => "coordinate",
            ActionType::Other => "other",
        }
    }

    /// Lenient parse; anything unrecognized is `Other`.
    pub fn parse(input: &str) -> Self {
        match input.trim().to_ascii_lowercase().as_str() {
            "investigate" | "investigation" => ActionType::Investigate,
            "social" => ActionType::Social,
            "combat" | "attack" | "fight" => ActionType::Combat,
            "ritual" => ActionType::Ritual,
            "technical" | "tech" => ActionType::Technical,
            "movement" | "move" => ActionType::Movement,
            "coordinate" | "coordination" | "support" => ActionType::Coordinate,
            _ => ActionType::Other,
        }
    }
}

/// Ritual participation flags as declared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RitualFlags {
    #[serde(default)]
    pub has_primary_tool: bool,
    #[serde(default)]
    pub has_offering: bool,
    #[serde(default)]
    pub sanctified_altar: bool,
}

/// Reactions resolvable in the Fast phase. One slot per agent per round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReactionKind {
    Parry,
    Overwatch,
    TokenSpend,
    BondedDefence,
}

impl ReactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReactionKind::Parry => "parry",
            ReactionKind::Overwatch => "overwatch",
            ReactionKind::TokenSpend => "token_spend",
            ReactionKind::BondedDefence => "bonded_defence",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "parry" => Some(ReactionKind::Parry),
            "overwatch" => Some(ReactionKind::Overwatch),
            "token_spend" | "token" => Some(ReactionKind::TokenSpend),
            "bonded_defence" | "bonded_defense" | "bonded" => Some(ReactionKind::BondedDefence),
            _ => None,
        }
    }
}

/// Raw agent output, before validation. Every field tolerates absence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeclarationDraft {
    #[serde(default)]
    pub intent: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub attribute: String,
    #[serde(default)]
    pub skill: String,
    #[serde(default)]
    pub difficulty_estimate: i32,
    #[serde(default)]
    pub difficulty_justification: String,
    #[serde(default)]
    pub action_type: String,
    #[serde(default)]
    pub is_ritual: bool,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub ritual_flags: RitualFlags,
    /// Name of the foe receiving this character's Defence Token.
    #[serde(default)]
    pub defence_token: Option<String>,
    /// Optional reaction held for the Fast phase.
    #[serde(default)]
    pub reaction: Option<String>,
}

/// A validated declaration, ready for adjudication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDeclaration {
    pub agent_id: String,
    pub character_name: String,
    pub intent: String,
    pub description: String,
    pub attribute: Attribute,
    /// Canonical skill name; empty for unskilled.
    pub skill: String,
    pub difficulty_estimate: i32,
    pub difficulty_justification: String,
    pub action_type: ActionType,
    pub is_ritual: bool,
    pub target: Option<String>,
    pub ritual_flags: RitualFlags,
    pub defence_token: Option<String>,
    pub reaction: Option<ReactionKind>,
    /// Set when validation rewrote the skill (alias or stripped value).
    pub skill_corrected_from: Option<String>,
}

/// Structural rejection of a draft, with a concrete reprompt suggestion.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeclarationError {
    #[error("Missing intent: say what the character is trying to do")]
    MissingIntent,

    #[error("Invalid attribute '{name}': {suggestion}")]
    InvalidAttribute { name: String, suggestion: String },

    #[error("Impossible target '{target}': name a visible entity or a narrative label")]
    ImpossibleTarget { target: String },

    #[error("Repeats your recent action; vary the approach: {suggestion}")]
    Duplicate { suggestion: String },
}

impl DeclarationDraft {
    /// Validate into a typed declaration.
    ///
    /// Skill aliases normalize and parentheticals strip, but a valid catalog
    /// skill is never overridden - rank 0 attempts stay as declared and take
    /// the unskilled penalty. Social actions missing an attribute default to
    /// Empathy.
    pub fn validate(
        &self,
        agent_id: &str,
        character_name: &str,
    ) -> Result<ActionDeclaration, DeclarationError> {
        if self.intent.trim().is_empty() {
            return Err(DeclarationError::MissingIntent);
        }

        let action_type = ActionType::parse(&self.action_type);

        let attribute = if self.attribute.trim().is_empty() {
            match action_type {
                ActionType::Social => Attribute::social_default(),
                _ => Attribute::Perception,
            }
        } else {
            Attribute::parse(&self.attribute).map_err(|e| DeclarationError::InvalidAttribute {
                name: self.attribute.clone(),
                suggestion: e.to_string(),
            })?
        };

        let normalized = normalize_skill(&self.skill);
        if let Some(original) = &normalized.corrected_from {
            tracing::debug!(
                agent = agent_id,
                from = %original,
                to = %normalized.name,
                "normalized declared skill"
            );
        }

        let target = match &self.target {
            Some(t) if t.trim().is_empty() => None,
            Some(t) if t.trim().eq_ignore_ascii_case(character_name) => {
                return Err(DeclarationError::ImpossibleTarget { target: t.clone() })
            }
            other => other.clone(),
        };

        Ok(ActionDeclaration {
            agent_id: agent_id.to_string(),
            character_name: character_name.to_string(),
            intent: self.intent.trim().to_string(),
            description: self.description.trim().to_string(),
            attribute,
            skill: normalized.name,
            difficulty_estimate: self.difficulty_estimate,
            difficulty_justification: self.difficulty_justification.clone(),
            action_type,
            is_ritual: self.is_ritual || action_type == ActionType::Ritual,
            target,
            ritual_flags: self.ritual_flags,
            defence_token: self.defence_token.clone(),
            reaction: self.reaction.as_deref().and_then(ReactionKind::parse),
            skill_corrected_from: normalized.corrected_from,
        })
    }
}

impl ActionDeclaration {
    /// Stable dedup key: intent + attribute + skill.
    pub fn fingerprint_source(&self) -> String {
        format!(
            "{}|{}|{}",
            self.intent.to_ascii_lowercase(),
            self.attribute,
            self.skill
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(intent: &str, attribute: &str, skill: &str) -> DeclarationDraft {
        DeclarationDraft {
            intent: intent.to_string(),
            attribute: attribute.to_string(),
            skill: skill.to_string(),
            action_type: "investigate".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_validate_basic() {
        let decl = draft("search the shrine", "Perception", "Awareness")
            .validate("player:riven", "Riven")
            .expect("valid");
        assert_eq!(decl.attribute, Attribute::Perception);
        assert_eq!(decl.skill, "Awareness");
        assert!(decl.skill_corrected_from.is_none());
    }

    #[test]
    fn test_validate_rejects_empty_intent() {
        let err = draft("  ", "Perception", "Awareness")
            .validate("player:riven", "Riven")
            .expect_err("must fail");
        assert_eq!(err, DeclarationError::MissingIntent);
    }

    #[test]
    fn test_validate_bad_attribute_has_suggestion() {
        let err = draft("look around", "Wisdom", "Awareness")
            .validate("player:riven", "Riven")
            .expect_err("must fail");
        assert!(matches!(err, DeclarationError::InvalidAttribute { .. }));
        assert!(err.to_string().contains("Willpower"));
    }

    #[test]
    fn test_social_without_attribute_defaults_to_empathy() {
        let mut d = draft("sweet-talk the clerk", "", "social");
        d.action_type = "social".to_string();
        let decl = d.validate("player:riven", "Riven").expect("valid");
        assert_eq!(decl.attribute, Attribute::Empathy);
        assert_eq!(decl.skill, "Charm");
    }

    #[test]
    fn test_skill_alias_and_parenthetical() {
        let decl = draft("case the compound", "Perception", "investigation (2)")
            .validate("player:riven", "Riven")
            .expect("valid");
        assert_eq!(decl.skill, "Awareness");
        assert!(decl.skill_corrected_from.is_some());
    }

    #[test]
    fn test_self_target_rejected() {
        let mut d = draft("strike", "Dexterity", "Melee");
        d.target = Some("Riven".to_string());
        let err = d.validate("player:riven", "Riven").expect_err("must fail");
        assert!(matches!(err, DeclarationError::ImpossibleTarget { .. }));
    }

    #[test]
    fn test_ritual_action_type_implies_flag() {
        let mut d = draft("cleanse the altar", "Willpower", "Astral Arts");
        d.action_type = "ritual".to_string();
        let decl = d.validate("player:riven", "Riven").expect("valid");
        assert!(decl.is_ritual);
    }

    #[test]
    fn test_fingerprint_ignores_case() {
        let a = draft("Search The Shrine", "Perception", "Awareness")
            .validate("p", "Riven")
            .expect("valid");
        let b = draft("search the shrine", "Perception", "Awareness")
            .validate("p", "Riven")
            .expect("valid");
        assert_eq!(a.fingerprint_source(), b.fingerprint_source());
    }
}
