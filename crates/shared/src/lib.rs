//! Aeonisk Shared - wire types for the session core
//!
//! Everything that crosses a boundary lives here: agent declarations and
//! their validation, the DM's synthesis output, event log records, and the
//! session configuration file format.
//!
//! # Design Principles
//!
//! 1. **No business logic** - validation and serialization only
//! 2. **Tolerant inputs, strict outputs** - drafts default every field;
//!    validated types are fully typed
//! 3. **Closed vocabularies** - event types and outcomes are versioned enums

pub mod config;
pub mod declaration;
pub mod events;
pub mod synthesis;

pub use config::{
    AgentsConfig, BondPreference, ConfigError, DmConfig, EnemyProfile, Personality,
    PlayerProfile, ScenarioConfig, SessionConfig,
};
pub use declaration::{
    ActionDeclaration, ActionType, DeclarationDraft, DeclarationError, ReactionKind, RitualFlags,
};
pub use events::{EventRecord, EventType, SCHEMA_VERSION};
pub use synthesis::{
    ClockDelta, NewClockDirective, RoundSynthesis, ScenarioDraft, ScenarioUpdate, SessionOutcome,
};
