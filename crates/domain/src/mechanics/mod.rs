pub mod effects;
pub mod engine;
pub mod resolution;
pub mod triggers;

pub use effects::MechanicalEffect;
pub use engine::{
    CheckRequest, CleanupReport, EffectApplication, EffectContext, InitiativeEntry,
    MechanicsEngine, MechanicsFailure, RitualContext, RitualResolution,
};
pub use resolution::{contested, ActionResolution, ContestOutcome, Modifier};
pub use triggers::{parse_triggers, TriggerSuggestion};
