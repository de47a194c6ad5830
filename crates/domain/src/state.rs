//! Shared session state
//!
//! One process-local object owned by the coordinator's task. Agents never see
//! it directly; they get snapshots rendered into prompt context. All mutation
//! flows through mechanics-engine methods.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::entities::{Character, Role, SceneClock};
use crate::error::DomainError;
use crate::ids::{CharacterId, SessionId};
use crate::value_objects::{corruption_tier, Attribute};

/// Session phase. Scenario setup is its own phase, never "round 0".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Setup,
    RoundStart,
    Declaration,
    Fast,
    Slow,
    Synthesis,
    Cleanup,
    Ended,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Setup => "setup",
            Phase::RoundStart => "round_start",
            Phase::Declaration => "declaration",
            Phase::Fast => "fast",
            Phase::Slow => "slow",
            Phase::Synthesis => "synthesis",
            Phase::Cleanup => "cleanup",
            Phase::Ended => "ended",
        }
    }
}

/// The active scenario framing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    pub theme: String,
    pub text: String,
}

/// An archived clock plus why it left play.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivedClock {
    pub clock: SceneClock,
    pub reason: String,
}

/// Serializable character snapshot for `character_state` events and prompts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterSnapshot {
    pub id: CharacterId,
    pub name: String,
    pub faction: String,
    pub role: Role,
    pub attributes: BTreeMap<String, i32>,
    pub skills: BTreeMap<String, u8>,
    pub void_score: i32,
    pub corruption: String,
    pub soulcredit: i32,
    pub bonds: Vec<crate::value_objects::Bond>,
    pub conditions: Vec<crate::value_objects::Condition>,
    pub wounds: u8,
    pub stuns: u8,
    pub fatigue: u8,
    pub offerings: Vec<String>,
    pub ritual_tools: Vec<String>,
}

impl From<&Character> for CharacterSnapshot {
    fn from(c: &Character) -> Self {
        Self {
            id: c.id,
            name: c.name.clone(),
            faction: c.faction.clone(),
            role: c.role,
            attributes: c
                .attributes
                .iter()
                .map(|(a, v)| (a.as_str().to_string(), v))
                .collect(),
            skills: c.skills.clone(),
            void_score: c.void_score,
            corruption: corruption_tier(c.void_score).to_string(),
            soulcredit: c.soulcredit,
            bonds: c.bonds.clone(),
            conditions: c.conditions.clone(),
            wounds: c.wounds,
            stuns: c.stuns,
            fatigue: c.fatigue,
            offerings: c.offerings.clone(),
            ritual_tools: c.ritual_tools.clone(),
        }
    }
}

/// Process-local shared state for one session.
#[derive(Debug, Clone)]
pub struct GameState {
    pub session_id: SessionId,
    characters: BTreeMap<CharacterId, Character>,
    name_index: BTreeMap<String, CharacterId>,
    pub clocks: Vec<SceneClock>,
    pub archived_clocks: Vec<ArchivedClock>,
    pub scenario: Scenario,
    pub round: u32,
    pub phase: Phase,
    /// Descending initiative order for the current round.
    pub initiative: Vec<CharacterId>,
    /// Defence token allocation: holder -> foe.
    pub defence_tokens: BTreeMap<CharacterId, CharacterId>,
}

impl GameState {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            characters: BTreeMap::new(),
            name_index: BTreeMap::new(),
            clocks: Vec::new(),
            archived_clocks: Vec::new(),
            scenario: Scenario::default(),
            round: 0,
            phase: Phase::Setup,
            initiative: Vec::new(),
            defence_tokens: BTreeMap::new(),
        }
    }

    /// Register a character. Names must be unique (case-insensitive); the
    /// name index is how declared targets resolve to entities.
    pub fn add_character(&mut self, character: Character) -> Result<CharacterId, DomainError> {
        let key = character.name.to_ascii_lowercase();
        if self.name_index.contains_key(&key) {
            return Err(DomainError::constraint(format!(
                "Character name '{}' already registered",
                character.name
            )));
        }
        let id = character.id;
        self.name_index.insert(key, id);
        self.characters.insert(id, character);
        Ok(id)
    }

    pub fn remove_character(&mut self, id: CharacterId) -> Option<Character> {
        let removed = self.characters.remove(&id);
        if let Some(c) = &removed {
            self.name_index.remove(&c.name.to_ascii_lowercase());
        }
        self.defence_tokens.remove(&id);
        self.defence_tokens.retain(|_, foe| *foe != id);
        self.initiative.retain(|i| *i != id);
        removed
    }

    pub fn character(&self, id: CharacterId) -> Result<&Character, DomainError> {
        self.characters
            .get(&id)
            .ok_or_else(|| DomainError::not_found("Character", id.to_string()))
    }

    pub fn character_mut(&mut self, id: CharacterId) -> Result<&mut Character, DomainError> {
        self.characters
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found("Character", id.to_string()))
    }

    pub fn character_id_by_name(&self, name: &str) -> Option<CharacterId> {
        self.name_index.get(&name.trim().to_ascii_lowercase()).copied()
    }

    pub fn character_by_name(&self, name: &str) -> Option<&Character> {
        self.character_id_by_name(name)
            .and_then(|id| self.characters.get(&id))
    }

    pub fn characters(&self) -> impl Iterator<Item = &Character> {
        self.characters.values()
    }

    pub fn players(&self) -> impl Iterator<Item = &Character> {
        self.characters.values().filter(|c| c.role == Role::Player)
    }

    pub fn enemies(&self) -> impl Iterator<Item = &Character> {
        self.characters.values().filter(|c| c.role == Role::Enemy)
    }

    pub fn contains(&self, id: CharacterId) -> bool {
        self.characters.contains_key(&id)
    }

    pub fn clock_by_name(&self, name: &str) -> Option<&SceneClock> {
        self.clocks
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name.trim()))
    }

    pub fn clock_by_name_mut(&mut self, name: &str) -> Option<&mut SceneClock> {
        self.clocks
            .iter_mut()
            .find(|c| c.name.eq_ignore_ascii_case(name.trim()))
    }

    /// Move a clock out of play.
    pub fn archive_clock(&mut self, name: &str, reason: impl Into<String>) -> Option<&ArchivedClock> {
        let pos = self
            .clocks
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name.trim()))?;
        let clock = self.clocks.remove(pos);
        self.archived_clocks.push(ArchivedClock {
            clock,
            reason: reason.into(),
        });
        self.archived_clocks.last()
    }

    pub fn snapshot(&self, id: CharacterId) -> Result<CharacterSnapshot, DomainError> {
        Ok(CharacterSnapshot::from(self.character(id)?))
    }

    /// Highest single skill rank, used in initiative tie-breaking.
    pub fn best_skill_rank(&self, id: CharacterId) -> u8 {
        self.characters
            .get(&id)
            .map(|c| c.skills.values().copied().max().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Highest attribute value, the second initiative tie-breaker.
    pub fn best_attribute(&self, id: CharacterId) -> i32 {
        self.characters
            .get(&id)
            .map(|c| {
                Attribute::ALL
                    .iter()
                    .map(|a| c.attribute(*a))
                    .max()
                    .unwrap_or(3)
            })
            .unwrap_or(3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::SceneClock;

    fn state_with(names: &[(&str, Role)]) -> GameState {
        let mut state = GameState::new(SessionId::new());
        for (name, role) in names {
            state
                .add_character(Character::new(*name, "Test", *role))
                .expect("unique name");
        }
        state
    }

    #[test]
    fn test_name_uniqueness_case_insensitive() {
        let mut state = state_with(&[("Riven", Role::Player)]);
        let dup = state.add_character(Character::new("riven", "Other", Role::Enemy));
        assert!(dup.is_err());
    }

    #[test]
    fn test_lookup_by_name() {
        let state = state_with(&[("Riven", Role::Player), ("Raider", Role::Enemy)]);
        assert!(state.character_by_name("  riven ").is_some());
        assert!(state.character_by_name("nobody").is_none());
    }

    #[test]
    fn test_remove_clears_indexes() {
        let mut state = state_with(&[("Riven", Role::Player), ("Raider", Role::Enemy)]);
        let riven = state.character_id_by_name("Riven").expect("exists");
        let raider = state.character_id_by_name("Raider").expect("exists");
        state.defence_tokens.insert(riven, raider);
        state.defence_tokens.insert(raider, riven);
        state.initiative = vec![riven, raider];

        state.remove_character(raider);
        assert!(state.character_by_name("Raider").is_none());
        assert!(state.defence_tokens.is_empty());
        assert_eq!(state.initiative, vec![riven]);
    }

    #[test]
    fn test_archive_clock() {
        let mut state = state_with(&[]);
        state.clocks.push(
            SceneClock::new("Alarm", 4, "", "", "", "").expect("valid"),
        );
        assert!(state.archive_clock("alarm", "resolved").is_some());
        assert!(state.clocks.is_empty());
        assert_eq!(state.archived_clocks.len(), 1);
        assert!(state.archive_clock("alarm", "again").is_none());
    }

    #[test]
    fn test_snapshot_carries_corruption_label() {
        let mut state = state_with(&[("Riven", Role::Player)]);
        let id = state.character_id_by_name("Riven").expect("exists");
        state
            .character_mut(id)
            .expect("exists")
            .apply_void_delta(6, "test", chrono::Utc::now());
        let snap = state.snapshot(id).expect("snapshot");
        assert_eq!(snap.void_score, 6);
        assert_eq!(snap.corruption, "Void-Corrupted");
    }
}
