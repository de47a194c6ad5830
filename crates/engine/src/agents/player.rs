//! Player agent runtime
//!
//! Produces one validated `ActionDeclaration` per round. Structural
//! rejections reprompt once with a concrete suggestion; repeats of the
//! agent's last two declarations (by fingerprint) are rejected the same way.
//! Anything unrecoverable becomes a structural failure action - the session
//! never stalls on one stubborn agent.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;

use aeonisk_domain::{Attribute, GameState};
use aeonisk_shared::{
    ActionDeclaration, ActionType, DeclarationDraft, Personality, PlayerProfile, RitualFlags,
    ScenarioUpdate,
};

use crate::agents::structured::{call_structured, LlmAttempt, StructuredCall, StructuredCallConfig};
use crate::agents::prompts;
use crate::infrastructure::ports::{LlmPort, LlmRequest, Message};

/// How many recent fingerprints are held against repeats.
const FINGERPRINT_WINDOW: usize = 2;

/// How many recent intents ride along in the prompt for self-deduplication.
const INTENT_HISTORY: usize = 5;

/// Outcome of asking an agent to declare.
#[derive(Debug, Clone)]
pub struct DeclarationResult {
    pub declaration: ActionDeclaration,
    pub attempts: Vec<LlmAttempt>,
    /// True when the declaration is a synthesized structural failure.
    pub structural_failure: bool,
    pub timed_out: bool,
    pub cancelled: bool,
    /// Validation rejections hit along the way (logged as warnings).
    pub rejections: Vec<String>,
}

/// The player runtime.
pub struct PlayerAgent {
    pub agent_id: String,
    pub character_name: String,
    personality: Personality,
    goals: Vec<String>,
    llm: Arc<dyn LlmPort>,
    call_config: StructuredCallConfig,
    recent_fingerprints: VecDeque<String>,
    recent_intents: VecDeque<String>,
}

impl PlayerAgent {
    pub fn new(
        profile: &PlayerProfile,
        llm: Arc<dyn LlmPort>,
        call_config: StructuredCallConfig,
    ) -> Self {
        Self {
            agent_id: format!("player:{}", profile.name.to_ascii_lowercase()),
            character_name: profile.name.clone(),
            personality: profile.personality.clone(),
            goals: profile.goals.clone(),
            llm,
            call_config: call_config.with_timeout(Duration::from_secs(profile.timeout_secs)),
            recent_fingerprints: VecDeque::new(),
            recent_intents: VecDeque::new(),
        }
    }

    /// Scenario pivots reset intent history - old objectives are stale.
    pub fn scenario_update(&mut self, update: &ScenarioUpdate) {
        tracing::debug!(agent = %self.agent_id, theme = %update.theme, "scenario update");
        self.recent_intents.clear();
    }

    pub async fn produce_declaration(
        &mut self,
        state: &GameState,
        cancel: &CancellationToken,
    ) -> DeclarationResult {
        let Some(character) = state.character_by_name(&self.character_name) else {
            return structural_result(
                &self.agent_id,
                &self.character_name,
                "(no response)",
                Vec::new(),
                false,
                false,
                vec!["character no longer in play".to_string()],
            );
        };
        let system = prompts::player_system_prompt(character, &self.personality, &self.goals);
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

/// Everything the shared declaration loop needs; player and enemy runtimes
/// differ only in the system prompt they build.
pub(crate) struct DeclarationLoop<'a> {
    pub llm: &'a dyn LlmPort,
    pub call_config: &'a StructuredCallConfig,
    pub system_prompt: String,
    pub agent_id: &'a str,
    pub character_name: &'a str,
    pub state: &'a GameState,
    pub character_lookup: &'a str,
    pub recent_intents: &'a [String],
    pub fingerprints: &'a mut VecDeque<String>,
    pub intents: &'a mut VecDeque<String>,
    pub cancel: &'a CancellationToken,
}

pub(crate) async fn run_declaration_loop(ctx: DeclarationLoop<'_>) -> DeclarationResult {
    let Some(character) = ctx.state.character_by_name(ctx.character_lookup) else {
        return structural_result(
            ctx.agent_id,
            ctx.character_name,
            "(no response)",
            Vec::new(),
            false,
            false,
            vec!["character no longer in play".to_string()],
        );
    };

    let mut all_attempts = Vec::new();
    let mut rejections = Vec::new();
    let mut rejection: Option<String> = None;

    // Initial ask plus one reprompt on validation rejection.
    for _ in 0..2 {
        let prompt = prompts::declaration_request(
            ctx.state,
            character,
            ctx.recent_intents,
            rejection.as_deref(),
        );
        let request = LlmRequest::new(vec![Message::user(prompt)])
            .with_system(ctx.system_prompt.clone())
            .with_schema(prompts::declaration_schema());

        let call: StructuredCall<DeclarationDraft> =
            call_structured(ctx.llm, &request, ctx.call_config, ctx.cancel).await;
        all_attempts.extend(call.attempts.clone());

        if call.cancelled || call.timed_out {
            return structural_result(
                ctx.agent_id,
                ctx.character_name,
                "(no response)",
                all_attempts,
                call.timed_out,
                call.cancelled,
                rejections,
            );
        }

        let Some(draft) = call.value else {
            // Structured retries exhausted; declarations have no text-parse
            // fallback worth trusting.
            return structural_result(
                ctx.agent_id,
                ctx.character_name,
                "(invalid declaration)",
                all_attempts,
                false,
                false,
                rejections,
            );
        };

        match draft.validate(ctx.agent_id, ctx.character_name) {
            Err(e) => {
                tracing::warn!(agent = ctx.agent_id, error = %e, "declaration rejected");
                rejections.push(e.to_string());
                rejection = Some(e.to_string());
                continue;
            }
            Ok(declaration) => {
                let fp = fingerprint(&declaration);
                if ctx.fingerprints.contains(&fp) {
                    let err = aeonisk_shared::DeclarationError::Duplicate {
                        suggestion: format!(
                            "duplicate of a recent action ({}); try a different angle or skill",
                            declaration.intent
                        ),
                    };
                    tracing::warn!(agent = ctx.agent_id, "duplicate declaration");
                    rejections.push(err.to_string());
                    rejection = Some(err.to_string());
                    continue;
                }
                ctx.fingerprints.push_back(fp);
                while ctx.fingerprints.len() > FINGERPRINT_WINDOW {
                    ctx.fingerprints.pop_front();
                }
                ctx.intents.push_back(prompts::declaration_summary(&declaration));
                while ctx.intents.len() > INTENT_HISTORY {
                    ctx.intents.pop_front();
                }
                return DeclarationResult {
                    declaration,
                    attempts: all_attempts,
                    structural_failure: false,
                    timed_out: false,
                    cancelled: false,
                    rejections,
                };
            }
        }
    }

    structural_result(
        ctx.agent_id,
        ctx.character_name,
        "(invalid declaration)",
        all_attempts,
        false,
        false,
        rejections,
    )
}

/// sha256 over the intent + attribute + skill dedup key.
pub(crate) fn fingerprint(declaration: &ActionDeclaration) -> String {
    let digest = Sha256::digest(declaration.fingerprint_source().as_bytes());
    hex::encode(digest)
}

fn structural_result(
    agent_id: &str,
    character_name: &str,
    intent: &str,
    attempts: Vec<LlmAttempt>,
    timed_out: bool,
    cancelled: bool,
    rejections: Vec<String>,
) -> DeclarationResult {
    DeclarationResult {
        declaration: structural_declaration(agent_id, character_name, intent),
        attempts,
        structural_failure: true,
        timed_out,
        cancelled,
        rejections,
    }
}

/// The no-response action: resolves as a failure with margin 0 and no
/// mechanical side effects.
pub fn structural_declaration(
    agent_id: &str,
    character_name: &str,
    intent: &str,
) -> ActionDeclaration {
    ActionDeclaration {
        agent_id: agent_id.to_string(),
        character_name: character_name.to_string(),
        intent: intent.to_string(),
        description: String::new(),
        attribute: Attribute::Perception,
        skill: String::new(),
        difficulty_estimate: 0,
        difficulty_justification: String::new(),
        action_type: ActionType::Other,
        is_ritual: false,
        target: None,
        ritual_flags: RitualFlags::default(),
        defence_token: None,
        reaction: None,
        skill_corrected_from: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::ports::{LlmError, LlmResponse};
    use async_trait::async_trait;
    use aeonisk_domain::{Character, Role, SessionId};
    use std::sync::Mutex;

    struct ScriptedLlm {
        responses: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LlmPort for ScriptedLlm {
        async fn generate(&self, _request: LlmRequest) -> Result<LlmResponse, LlmError> {
            let mut responses = self.responses.lock().expect("lock");
            if responses.is_empty() {
                return Err(LlmError::RequestFailed("script exhausted".into()));
            }
            Ok(LlmResponse {
                content: responses.remove(0),
                usage: None,
            })
        }
    }

    fn agent_with(responses: Vec<&str>) -> PlayerAgent {
        let profile = PlayerProfile {
            name: "Riven".to_string(),
            faction: "Concord".to_string(),
            attributes: Default::default(),
            skills: Default::default(),
            talents: Default::default(),
            personality: Personality::default(),
            goals: vec![],
            offerings: vec![],
            ritual_tools: vec![],
            model: None,
            timeout_secs: 5,
        };
        let llm = Arc::new(ScriptedLlm {
            responses: Mutex::new(responses.into_iter().map(str::to_string).collect()),
        });
        let config = StructuredCallConfig {
            max_retries: 1,
            base_backoff: Duration::from_millis(1),
            timeout: Duration::from_secs(5),
        };
        PlayerAgent::new(&profile, llm, config)
    }

    fn state() -> GameState {
        let mut state = GameState::new(SessionId::new());
        state
            .add_character(Character::new("Riven", "Concord", Role::Player))
            .expect("add");
        state
    }

    fn good_json(intent: &str) -> String {
        format!(
            r#"{{"intent": "{intent}", "attribute": "Perception", "skill": "Awareness",
                "difficulty_estimate": 20, "action_type": "investigate"}}"#
        )
    }

    #[tokio::test]
    async fn test_valid_declaration_accepted() {
        let mut agent = agent_with(vec![&good_json("scout the ridge")]);
        let state = state();
        let result = agent
            .produce_declaration(&state, &CancellationToken::new())
            .await;
        assert!(!result.structural_failure);
        assert_eq!(result.declaration.intent, "scout the ridge");
        assert_eq!(result.declaration.skill, "Awareness");
    }

    #[tokio::test]
    async fn test_invalid_attribute_reprompts_once() {
        let bad = r#"{"intent": "scout", "attribute": "Wisdom", "action_type": "investigate"}"#;
        let mut agent = agent_with(vec![bad, &good_json("scout the ridge")]);
        let state = state();
        let result = agent
            .produce_declaration(&state, &CancellationToken::new())
            .await;
        assert!(!result.structural_failure);
        assert_eq!(result.rejections.len(), 1);
        assert!(result.rejections[0].contains("Wisdom"));
    }

    #[tokio::test]
    async fn test_duplicate_fingerprint_rejected() {
        let mut agent = agent_with(vec![
            &good_json("scout the ridge"),
            &good_json("scout the ridge"),
            &good_json("circle around the depot"),
        ]);
        let state = state();
        let first = agent
            .produce_declaration(&state, &CancellationToken::new())
            .await;
        assert!(!first.structural_failure);

        let second = agent
            .produce_declaration(&state, &CancellationToken::new())
            .await;
        assert!(!second.structural_failure);
        assert_eq!(second.declaration.intent, "circle around the depot");
        assert!(second.rejections.iter().any(|r| r.contains("duplicate")));
    }

    #[tokio::test]
    async fn test_exhausted_validation_becomes_structural_failure() {
        let bad = r#"{"intent": "scout", "attribute": "Wisdom", "action_type": "investigate"}"#;
        let mut agent = agent_with(vec![bad, bad]);
        let state = state();
        let result = agent
            .produce_declaration(&state, &CancellationToken::new())
            .await;
        assert!(result.structural_failure);
        assert_eq!(result.declaration.intent, "(invalid declaration)");
    }

    #[tokio::test]
    async fn test_transport_failure_is_structural_no_response() {
        let mut agent = agent_with(vec![]); // script exhausted -> transport error
        let state = state();
        let result = agent
            .produce_declaration(&state, &CancellationToken::new())
            .await;
        assert!(result.structural_failure);
        assert!(result.timed_out);
        assert_eq!(result.declaration.intent, "(no response)");
    }
}
