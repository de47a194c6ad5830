//! Session configuration
//!
//! Deserialized from the JSON file handed to `run`. Validation happens
//! before any session state is created; a bad config never starts a session.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use aeonisk_domain::Attribute;

/// Configuration rejection; surfaces as exit code 1.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

fn default_max_rounds() -> u32 {
    10
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("sessions")
}

fn default_temperature() -> f32 {
    0.8
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_mid() -> u8 {
    5
}

/// Top-level session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub session_name: String,
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    pub agents: AgentsConfig,
    #[serde(default)]
    pub scenario: ScenarioConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentsConfig {
    pub dm: DmConfig,
    pub players: Vec<PlayerProfile>,
    #[serde(default)]
    pub enemies: Vec<EnemyProfile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DmConfig {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub system_prompt_override: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for DmConfig {
    fn default() -> Self {
        Self {
            model: None,
            temperature: default_temperature(),
            system_prompt_override: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Personality sliders shaping a player agent's choices. Wire format is
/// camelCase to match the character-creation frontend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Personality {
    #[serde(default = "default_mid")]
    pub risk_tolerance: u8,
    #[serde(default)]
    pub bond_preference: BondPreference,
    #[serde(default = "default_mid")]
    pub void_curiosity: u8,
    #[serde(default = "default_mid")]
    pub faction_loyalty: u8,
    #[serde(default = "default_mid")]
    pub ritual_conservatism: u8,
    #[serde(default = "default_mid")]
    pub social_aggressiveness: u8,
}

impl Default for Personality {
    fn default() -> Self {
        Self {
            risk_tolerance: default_mid(),
            bond_preference: BondPreference::default(),
            void_curiosity: default_mid(),
            faction_loyalty: default_mid(),
            ritual_conservatism: default_mid(),
            social_aggressiveness: default_mid(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BondPreference {
    Seeks,
    Avoids,
    #[default]
    Neutral,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerProfile {
    pub name: String,
    #[serde(default)]
    pub faction: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, i32>,
    #[serde(default)]
    pub skills: BTreeMap<String, u8>,
    #[serde(default)]
    pub talents: BTreeMap<String, i32>,
    #[serde(default)]
    pub personality: Personality,
    #[serde(default)]
    pub goals: Vec<String>,
    #[serde(default)]
    pub offerings: Vec<String>,
    #[serde(default)]
    pub ritual_tools: Vec<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnemyProfile {
    pub name: String,
    #[serde(default)]
    pub faction: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, i32>,
    #[serde(default)]
    pub skills: BTreeMap<String, u8>,
    #[serde(default)]
    pub initiative_bonus: i32,
    #[serde(default)]
    pub tactical_profile: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScenarioConfig {
    #[serde(default)]
    pub seed: Option<String>,
    #[serde(default)]
    pub theme: Option<String>,
}

impl SessionConfig {
    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        let config: SessionConfig = serde_json::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Structural validation: at least one player, unique names, known
    /// attribute names, ranks in range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session_name.trim().is_empty() {
            return Err(ConfigError::Invalid("session_name cannot be empty".into()));
        }
        if self.agents.players.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one player is required".into(),
            ));
        }
        if self.max_rounds == 0 {
            return Err(ConfigError::Invalid("max_rounds must be >= 1".into()));
        }

        let mut seen = std::collections::BTreeSet::new();
        let names = self
            .agents
            .players
            .iter()
            .map(|p| p.name.as_str())
            .chain(self.agents.enemies.iter().map(|e| e.name.as_str()));
        for name in names {
            if name.trim().is_empty() {
                return Err(ConfigError::Invalid("character name cannot be empty".into()));
            }
            if !seen.insert(name.to_ascii_lowercase()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate character name '{name}'"
                )));
            }
        }

        for p in &self.agents.players {
            validate_stats(&p.name, &p.attributes, &p.skills)?;
            for field in [
                p.personality.risk_tolerance,
                p.personality.void_curiosity,
                p.personality.faction_loyalty,
                p.personality.ritual_conservatism,
                p.personality.social_aggressiveness,
            ] {
                if !(1..=10).contains(&field) {
                    return Err(ConfigError::Invalid(format!(
                        "personality sliders for '{}' must be 1-10",
                        p.name
                    )));
                }
            }
        }
        for e in &self.agents.enemies {
            validate_stats(&e.name, &e.attributes, &e.skills)?;
        }
        Ok(())
    }
}

fn validate_stats(
    name: &str,
    attributes: &BTreeMap<String, i32>,
    skills: &BTreeMap<String, u8>,
) -> Result<(), ConfigError> {
    for (attr, value) in attributes {
        Attribute::parse(attr).map_err(|e| {
            ConfigError::Invalid(format!("character '{name}': {e}"))
        })?;
        if !(1..=10).contains(value) {
            return Err(ConfigError::Invalid(format!(
                "character '{name}': attribute '{attr}' must be 1-10"
            )));
        }
    }
    for (skill, rank) in skills {
        if *rank > 15 {
            return Err(ConfigError::Invalid(format!(
                "character '{name}': skill '{skill}' rank must be 0-15"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_config() -> serde_json::Value {
        serde_json::json!({
            "session_name": "smoke",
            "agents": {
                "dm": {},
                "players": [{"name": "Riven", "faction": "Concord"}]
            }
        })
    }

    #[test]
    fn test_minimal_config_parses_with_defaults() {
        let config =
            SessionConfig::from_json_str(&minimal_config().to_string()).expect("valid");
        assert_eq!(config.max_rounds, 10);
        assert_eq!(config.agents.dm.timeout_secs, 60);
        assert_eq!(config.agents.players[0].personality.risk_tolerance, 5);
        assert!(config.agents.enemies.is_empty());
    }

    #[test]
    fn test_rejects_no_players() {
        let mut value = minimal_config();
        value["agents"]["players"] = serde_json::json!([]);
        assert!(SessionConfig::from_json_str(&value.to_string()).is_err());
    }

    #[test]
    fn test_rejects_duplicate_names() {
        let mut value = minimal_config();
        value["agents"]["enemies"] = serde_json::json!([{"name": "riven"}]);
        assert!(SessionConfig::from_json_str(&value.to_string()).is_err());
    }

    #[test]
    fn test_rejects_unknown_attribute() {
        let mut value = minimal_config();
        value["agents"]["players"][0]["attributes"] = serde_json::json!({"Luck": 5});
        assert!(SessionConfig::from_json_str(&value.to_string()).is_err());
    }

    #[test]
    fn test_rejects_out_of_range_attribute() {
        let mut value = minimal_config();
        value["agents"]["players"][0]["attributes"] = serde_json::json!({"Strength": 12});
        assert!(SessionConfig::from_json_str(&value.to_string()).is_err());
    }

    #[test]
    fn test_personality_camel_case_wire_format() {
        let mut value = minimal_config();
        value["agents"]["players"][0]["personality"] =
            serde_json::json!({"riskTolerance": 9, "bondPreference": "seeks"});
        let config = SessionConfig::from_json_str(&value.to_string()).expect("valid");
        assert_eq!(config.agents.players[0].personality.risk_tolerance, 9);
        assert_eq!(
            config.agents.players[0].personality.bond_preference,
            BondPreference::Seeks
        );
    }
}
