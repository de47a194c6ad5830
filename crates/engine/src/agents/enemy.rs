//! Enemy agent runtime
//!
//! Same declaration contract as a player, with a tactical profile biasing
//! the prompt instead of a personality block. Enemies see player characters
//! by name and current position bands.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use aeonisk_domain::GameState;
use aeonisk_shared::{EnemyProfile, ScenarioUpdate};

use crate::agents::player::{run_declaration_loop, DeclarationLoop, DeclarationResult};
use crate::agents::prompts;
use crate::agents::structured::StructuredCallConfig;
use crate::infrastructure::ports::LlmPort;

/// The enemy runtime.
pub struct EnemyAgent {
    pub agent_id: String,
    pub character_name: String,
    tactical_profile: String,
    llm: Arc<dyn LlmPort>,
    call_config: StructuredCallConfig,
    recent_fingerprints: VecDeque<String>,
    recent_intents: VecDeque<String>,
}

impl EnemyAgent {
    pub fn new(
        profile: &EnemyProfile,
        llm: Arc<dyn LlmPort>,
        call_config: StructuredCallConfig,
    ) -> Self {
        Self {
            agent_id: format!("enemy:{}", profile.name.to_ascii_lowercase()),
            character_name: profile.name.clone(),
            tactical_profile: profile.tactical_profile.clone(),
            llm,
            call_config: call_config.with_timeout(Duration::from_secs(profile.timeout_secs)),
            recent_fingerprints: VecDeque::new(),
            recent_intents: VecDeque::new(),
        }
    }

    pub fn scenario_update(&mut self, update: &ScenarioUpdate) {
        tracing::debug!(agent = %self.agent_id, theme = %update.theme, "scenario update");
        self.recent_intents.clear();
    }

    pub async fn produce_declaration(
        &mut self,
        state: &GameState,
        cancel: &CancellationToken,
    ) -> DeclarationResult {
        let system = match state.character_by_name(&self.character_name) {
            Some(character) => prompts::enemy_system_prompt(character, &self.tactical_profile),
            None => String::new(),
        };
        let recent: Vec<String> = self.recent_intents.iter().cloned().collect();

        run_declaration_loop(DeclarationLoop {
            llm: &*self.llm,
            call_config: &self.call_config,
            system_prompt: system,
            agent_id: &self.agent_id,
            character_name: &self.character_name,
            state,
            character_lookup: &self.character_name,
            recent_intents: &recent,
            fingerprints: &mut self.recent_fingerprints,
            intents: &mut self.recent_intents,
            cancel,
        })
        .await
    }
}
