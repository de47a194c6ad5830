//! Event log records
//!
//! One JSON object per line, append-only. The vocabulary is closed and
//! versioned; ordering is the coordinator-assigned `seq`, not timestamps
//! (concurrent agent calls may interleave wall-clock time).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use aeonisk_domain::SessionId;

/// Log schema version, carried on `session_start`.
pub const SCHEMA_VERSION: u32 = 2;

/// Closed vocabulary of event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    SessionStart,
    Scenario,
    ScenarioUpdate,
    RoundStart,
    DeclarationPhaseStart,
    ActionDeclaration,
    FastPhaseStart,
    Reaction,
    AdjudicationStart,
    ActionResolution,
    CharacterState,
    ClockSpawn,
    ClockFilled,
    ClockArchived,
    RoundSynthesis,
    RoundSummary,
    MissionDebrief,
    LlmCall,
    Warning,
    SessionEnd,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::SessionStart => "session_start",
            EventType::Scenario => "scenario",
            EventType::ScenarioUpdate => "scenario_update",
            EventType::RoundStart => "round_start",
            EventType::DeclarationPhaseStart => "declaration_phase_start",
            EventType::ActionDeclaration => "action_declaration",
            EventType::FastPhaseStart => "fast_phase_start",
            EventType::Reaction => "reaction",
            EventType::AdjudicationStart => "adjudication_start",
            EventType::ActionResolution => "action_resolution",
            EventType::CharacterState => "character_state",
            EventType::ClockSpawn => "clock_spawn",
            EventType::ClockFilled => "clock_filled",
            EventType::ClockArchived => "clock_archived",
            EventType::RoundSynthesis => "round_synthesis",
            EventType::RoundSummary => "round_summary",
            EventType::MissionDebrief => "mission_debrief",
            EventType::LlmCall => "llm_call",
            EventType::Warning => "warning",
            EventType::SessionEnd => "session_end",
        }
    }
}

/// One log line. `seq` is assigned by the sink at append time and
/// establishes the total order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub event_type: EventType,
    pub session_id: SessionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    /// Event-specific fields, inlined into the record on the wire.
    #[serde(flatten)]
    pub data: serde_json::Value,
}

impl EventRecord {
    /// Build a record; `seq` stays 0 until the sink assigns it.
    pub fn new(event_type: EventType, session_id: SessionId) -> Self {
        Self {
            seq: 0,
            timestamp: Utc::now(),
            event_type,
            session_id,
            round: None,
            phase: None,
            agent_id: None,
            data: serde_json::Value::Object(serde_json::Map::new()),
        }
    }

    pub fn with_round(mut self, round: u32) -> Self {
        self.round = Some(round);
        self
    }

    pub fn with_phase(mut self, phase: impl Into<String>) -> Self {
        self.phase = Some(phase.into());
        self
    }

    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }
}
