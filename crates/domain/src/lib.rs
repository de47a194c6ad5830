//! Aeonisk Domain - characters, scene clocks, and the mechanics engine
//!
//! Pure rules layer: no I/O, no async, no RNG of its own. Dice are injected
//! via [`DiceRoller`]; all state mutation funnels through
//! [`MechanicsEngine`] methods so sessions can be audited.

extern crate self as aeonisk_domain;

pub mod entities;
pub mod error;
pub mod ids;
pub mod mechanics;
pub mod state;
pub mod value_objects;

pub use entities::{AdvanceOutcome, AttributeBlock, Character, Role, SceneClock, Urgency};
pub use error::{DomainError, MechanicsError};
pub use ids::{CharacterId, ClockId, SessionId};
pub use mechanics::{
    contested, parse_triggers, ActionResolution, CheckRequest, CleanupReport, ContestOutcome,
    EffectApplication, EffectContext, InitiativeEntry, MechanicalEffect, MechanicsEngine,
    MechanicsFailure, Modifier, RitualContext, RitualResolution, TriggerSuggestion,
};
pub use state::{ArchivedClock, CharacterSnapshot, GameState, Phase, Scenario};
pub use value_objects::{
    catalog_entry, clamp_difficulty, corruption_tier, is_terminal, normalize_skill,
    ritual_void_penalty, Attribute, Bond, BondType, Condition, DiceRoller, FixedRolls,
    NormalizedSkill, OutcomeTier, Range, SkillInfo, VoidChangeRecord, CATALOG,
    DEFAULT_DIFFICULTY, MAX_BONDS, RITUAL_SKILL, SOULCREDIT_MAX, SOULCREDIT_MIN, VOID_MAX,
    VOID_MIN,
};
