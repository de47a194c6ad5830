//! DM agent runtime
//!
//! Three calls: setup scenario generation, per-action resolution narration
//! (bounded by the already-computed mechanical envelope), and end-of-round
//! synthesis. Each returns the parsed value alongside the full attempt
//! trace; the coordinator turns attempts into `llm_call` events.

use std::sync::Arc;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use aeonisk_domain::{ActionResolution, GameState, MechanicalEffect};
use aeonisk_shared::{DmConfig, RoundSynthesis, ScenarioDraft};

use crate::agents::structured::{call_structured, StructuredCall, StructuredCallConfig};
use crate::agents::{legacy, prompts};
use crate::infrastructure::ports::{LlmPort, LlmRequest, Message};

/// Structured narration payload from the DM.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NarrationDraft {
    #[serde(default)]
    pub narration: String,
    #[serde(default)]
    pub mechanical_effects: Vec<MechanicalEffect>,
    /// Where untargeted status effects land. Extracted from structure, never
    /// from prose.
    #[serde(default)]
    pub narrative_target: Option<String>,
}

/// The DM runtime.
pub struct DmAgent {
    pub agent_id: String,
    llm: Arc<dyn LlmPort>,
    temperature: f32,
    system_prompt: String,
    call_config: StructuredCallConfig,
}

impl DmAgent {
    pub fn new(
        config: &DmConfig,
        llm: Arc<dyn LlmPort>,
        call_config: StructuredCallConfig,
    ) -> Self {
        Self {
            agent_id: "dm".to_string(),
            llm,
            temperature: config.temperature,
            system_prompt: prompts::dm_system_prompt(config.system_prompt_override.as_deref()),
            call_config: call_config
                .with_timeout(std::time::Duration::from_secs(config.timeout_secs)),
        }
    }

    fn request(&self, user: String, schema: serde_json::Value) -> LlmRequest {
        LlmRequest::new(vec![Message::user(user)])
            .with_system(self.system_prompt.clone())
            .with_schema(schema)
            .with_temperature(self.temperature)
    }

    /// Setup-phase scenario generation: theme, opening, 2-4 clocks.
    pub async fn generate_scenario(
        &self,
        state: &GameState,
        theme_hint: Option<&str>,
        cancel: &CancellationToken,
    ) -> (ScenarioDraft, StructuredCall<ScenarioDraft>) {
        let request = self.request(
            prompts::scenario_request(state, theme_hint),
            prompts::scenario_schema(),
        );
        let call: StructuredCall<ScenarioDraft> =
            call_structured(&*self.llm, &request, &self.call_config, cancel).await;

        let draft = match &call.value {
            Some(draft) if !draft.clocks.is_empty() => draft.clone(),
            _ => legacy::scenario_fallback(&call.raw_last, theme_hint),
        };
        (draft, call)
    }

    /// Narrate a resolved action. The tier, margin, and effects envelope are
    /// fixed; on structured failure the raw prose becomes the narration and
    /// the trigger scanner becomes authoritative for effects.
    pub async fn narrate_resolution(
        &self,
        state: &GameState,
        resolution: &ActionResolution,
        actor_name: &str,
        recent_narration: &[String],
        cancel: &CancellationToken,
    ) -> (NarrationDraft, StructuredCall<NarrationDraft>) {
        let request = self.request(
            prompts::narration_request(state, resolution, recent_narration),
            prompts::narration_schema(),
        );
        let call: StructuredCall<NarrationDraft> =
            call_structured(&*self.llm, &request, &self.call_config, cancel).await;

        let draft = match &call.value {
            Some(draft) if !draft.narration.trim().is_empty() => draft.clone(),
            _ => {
                let active: Vec<String> =
                    state.clocks.iter().map(|c| c.name.clone()).collect();
                let (narration, effects) = legacy::narration_fallback(
                    &call.raw_last,
                    actor_name,
                    &resolution.intent,
                    resolution.outcome_tier,
                    &active,
                );
                NarrationDraft {
                    narration,
                    mechanical_effects: effects,
                    narrative_target: None,
                }
            }
        };
        (draft, call)
    }

    /// End-of-round synthesis with control markers.
    pub async fn synthesize_round(
        &self,
        state: &GameState,
        recent_narration: &[String],
        cancel: &CancellationToken,
    ) -> (RoundSynthesis, StructuredCall<RoundSynthesis>) {
        let request = self.request(
            prompts::synthesis_request(state, recent_narration),
            prompts::synthesis_schema(),
        );
        let call: StructuredCall<RoundSynthesis> =
            call_structured(&*self.llm, &request, &self.call_config, cancel).await;

        let synthesis = match &call.value {
            Some(synthesis) => synthesis.clone(),
            None => legacy::synthesis_fallback(&call.raw_last),
        };
        (synthesis, call)
    }
}
