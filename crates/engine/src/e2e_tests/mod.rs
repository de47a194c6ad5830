//! End-to-end session tests against a scripted mock LLM
//!
//! The mock routes each request by purpose markers in the prompt text and
//! pops scripted responses per purpose, falling back to serviceable
//! defaults so tests only script what they assert on.

mod session_flow_tests;
mod structured_output_tests;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use aeonisk_domain::FixedRolls;
use aeonisk_shared::{EventRecord, EventType, SessionConfig};

use crate::agents::StructuredCallConfig;
use crate::coordinator::SessionCoordinator;
use crate::infrastructure::ports::{LlmError, LlmPort, LlmRequest, LlmResponse};
use crate::log::read_log;

/// Which call a request is, judged by prompt markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    Scenario,
    Narration,
    Synthesis,
    Declaration,
}

/// Scripted mock: per-purpose response queues plus captured prompts.
pub struct MockLlm {
    scenario: Mutex<VecDeque<String>>,
    narration: Mutex<VecDeque<String>>,
    synthesis: Mutex<VecDeque<String>>,
    declaration: Mutex<VecDeque<String>>,
    declaration_counter: AtomicU32,
    pub captured: Mutex<Vec<(Purpose, String)>>,
    /// Delay injected before every declaration response (timeout tests).
    pub declaration_delay: Option<Duration>,
}

impl MockLlm {
    pub fn new() -> Self {
        Self {
            scenario: Mutex::new(VecDeque::new()),
            narration: Mutex::new(VecDeque::new()),
            synthesis: Mutex::new(VecDeque::new()),
            declaration: Mutex::new(VecDeque::new()),
            declaration_counter: AtomicU32::new(0),
            captured: Mutex::new(Vec::new()),
            declaration_delay: None,
        }
    }

    pub fn push_scenario(&self, response: impl Into<String>) {
        self.scenario.lock().expect("lock").push_back(response.into());
    }

    pub fn push_narration(&self, response: impl Into<String>) {
        self.narration.lock().expect("lock").push_back(response.into());
    }

    pub fn push_synthesis(&self, response: impl Into<String>) {
        self.synthesis.lock().expect("lock").push_back(response.into());
    }

    pub fn push_declaration(&self, response: impl Into<String>) {
        self.declaration
            .lock()
            .expect("lock")
            .push_back(response.into());
    }

    pub fn prompts_for(&self, purpose: Purpose) -> Vec<String> {
        self.captured
            .lock()
            .expect("lock")
            .iter()
            .filter(|(p, _)| *p == purpose)
            .map(|(_, text)| text.clone())
            .collect()
    }

    fn classify(text: &str) -> Purpose {
        if text.contains("Generate the opening scenario") {
            Purpose::Scenario
        } else if text.contains("Narrate this resolved action") {
            Purpose::Narration
        } else if text.contains("Synthesize the round") {
            Purpose::Synthesis
        } else {
            Purpose::Declaration
        }
    }

    fn default_response(&self, purpose: Purpose) -> String {
        match purpose {
            Purpose::Scenario => default_scenario_json(),
            Purpose::Narration => {
                r#"{"narration": "The dust settles over the yard.",
                    "mechanical_effects": [], "narrative_target": null}"#
                    .to_string()
            }
            Purpose::Synthesis => {
                r#"{"story_advancement": "The night deepens over the district."}"#.to_string()
            }
            Purpose::Declaration => {
                let n = self.declaration_counter.fetch_add(1, Ordering::SeqCst);
                format!(
                    r#"{{"intent": "survey approach {n}", "attribute": "Perception",
                        "skill": "Awareness", "difficulty_estimate": 20,
                        "action_type": "investigate"}}"#
                )
            }
        }
    }
}

#[async_trait]
impl LlmPort for MockLlm {
    async fn generate(&self, request: LlmRequest) -> Result<LlmResponse, LlmError> {
        let mut text = request.system_prompt.clone().unwrap_or_default();
        for message in &request.messages {
            text.push('\n');
            text.push_str(&message.content);
        }
        let purpose = Self::classify(&text);
        self.captured
            .lock()
            .expect("lock")
            .push((purpose, text.clone()));

        if purpose == Purpose::Declaration {
            if let Some(delay) = self.declaration_delay {
                tokio::time::sleep(delay).await;
            }
        }

        let queue = match purpose {
            Purpose::Scenario => &self.scenario,
            Purpose::Narration => &self.narration,
            Purpose::Synthesis => &self.synthesis,
            Purpose::Declaration => &self.declaration,
        };
        let scripted = queue.lock().expect("lock").pop_front();
        let content = scripted.unwrap_or_else(|| self.default_response(purpose));
        Ok(LlmResponse {
            content,
            usage: None,
        })
    }
}

pub fn default_scenario_json() -> String {
    r#"{"theme": "Ashfall Salvage", "opening": "Grey snow over the dead grid.",
        "clocks": [
          {"name": "Warden Patrols", "maximum": 6,
           "description": "The wardens tighten their sweep",
           "advance_means": "noise, sightings", "regress_means": "bribes, quiet",
           "filled_consequence": "The district is locked down"},
          {"name": "Salvage Window", "maximum": 8,
           "description": "Time before the grid vault floods",
           "advance_means": "hours passing", "regress_means": "pumping the lower levels",
           "filled_consequence": "The vault is lost"}
        ]}"#
        .to_string()
}

/// Minimal one-player config writing into `output_dir`.
pub fn test_config(output_dir: &std::path::Path, max_rounds: u32) -> SessionConfig {
    let value = serde_json::json!({
        "session_name": "e2e",
        "max_rounds": max_rounds,
        "output_dir": output_dir,
        "agents": {
            "dm": {"timeout_secs": 5},
            "players": [{
                "name": "Riven",
                "faction": "Ashen Concord",
                "attributes": {"Perception": 5, "Willpower": 4, "Empathy": 3},
                "skills": {"Awareness": 3, "Astral Arts": 2, "Ranged": 4},
                "timeout_secs": 5
            }]
        },
        "scenario": {"seed": "e2e-seed"}
    });
    SessionConfig::from_json_str(&value.to_string()).expect("valid test config")
}

pub fn fast_call_config() -> StructuredCallConfig {
    StructuredCallConfig {
        max_retries: 3,
        base_backoff: Duration::from_millis(1),
        timeout: Duration::from_secs(5),
    }
}

/// Build a coordinator over the mock with fixed dice.
pub fn coordinator_with(
    llm: Arc<MockLlm>,
    config: SessionConfig,
    rolls: Vec<u8>,
) -> SessionCoordinator {
    let factory = move |_: Option<&str>| -> Arc<dyn LlmPort> { llm.clone() };
    SessionCoordinator::new(
        config,
        &factory,
        Box::new(FixedRolls::new(rolls)),
        fast_call_config(),
        CancellationToken::new(),
    )
    .expect("coordinator")
}

/// Read the finished session log back.
pub fn finished_log(coordinator: &SessionCoordinator) -> Vec<EventRecord> {
    read_log(coordinator.log_path()).expect("read log")
}

pub fn events_of(records: &[EventRecord], event_type: EventType) -> Vec<&EventRecord> {
    records
        .iter()
        .filter(|r| r.event_type == event_type)
        .collect()
}
