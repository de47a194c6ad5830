//! Agent runtimes: one contract, three roles
//!
//! Roles are a tagged variant dispatched by the coordinator, not an
//! inheritance hierarchy. The DM is held separately (it narrates and
//! synthesizes); players and enemies share the declaration contract.

pub mod dm;
pub mod enemy;
pub mod legacy;
pub mod player;
pub mod prompts;
pub mod structured;

use tokio_util::sync::CancellationToken;

use aeonisk_domain::GameState;
use aeonisk_shared::ScenarioUpdate;

pub use dm::{DmAgent, NarrationDraft};
pub use enemy::EnemyAgent;
pub use player::{structural_declaration, DeclarationResult, PlayerAgent};
pub use structured::{LlmAttempt, StructuredCall, StructuredCallConfig};

/// A declaring combatant: player or enemy runtime.
pub enum ActorAgent {
    Player(PlayerAgent),
    Enemy(EnemyAgent),
}

impl ActorAgent {
    pub fn agent_id(&self) -> &str {
        match self {
            ActorAgent::Player(a) => &a.agent_id,
            ActorAgent::Enemy(a) => &a.agent_id,
        }
    }

    pub fn character_name(&self) -> &str {
        match self {
            ActorAgent::Player(a) => &a.character_name,
            ActorAgent::Enemy(a) => &a.character_name,
        }
    }

    pub async fn produce_declaration(
        &mut self,
        state: &GameState,
        cancel: &CancellationToken,
    ) -> DeclarationResult {
        match self {
            ActorAgent::Player(a) => a.produce_declaration(state, cancel).await,
            ActorAgent::Enemy(a) => a.produce_declaration(state, cancel).await,
        }
    }

    pub fn scenario_update(&mut self, update: &ScenarioUpdate) {
        match self {
            ActorAgent::Player(a) => a.scenario_update(update),
            ActorAgent::Enemy(a) => a.scenario_update(update),
        }
    }
}
