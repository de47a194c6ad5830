//! Narrative reconstruction from the event log
//!
//! Builds the human-readable companion document (`session_{uuid}.yaml`) and
//! the `replay` output. Construction is a pure function of the records, so
//! replaying a log is deterministic by design.

use std::path::Path;

use serde::{Deserialize, Serialize};

use aeonisk_shared::{EventRecord, EventType};

use crate::error::SessionError;

/// Human-readable session reconstruction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranscriptDoc {
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scenario: Option<ScenarioDoc>,
    pub rounds: Vec<RoundDoc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioDoc {
    pub theme: String,
    pub opening: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoundDoc {
    pub round: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub declarations: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resolutions: Vec<ResolutionDoc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synthesis: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub clock_changes: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolutionDoc {
    pub actor: String,
    pub intent: String,
    pub tier: String,
    pub margin: i32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub narration: String,
}

impl TranscriptDoc {
    /// Reconstruct a transcript from log records alone.
    pub fn from_records(records: &[EventRecord]) -> Self {
        let mut doc = TranscriptDoc::default();
        let mut current_round: Option<RoundDoc> = None;

        for record in records {
            match record.event_type {
                EventType::SessionStart => {
                    doc.session_id = record.session_id.to_string();
                    doc.session_name = record
                        .data
                        .get("session_name")
                        .and_then(|v| v.as_str())
                        .map(str::to_string);
                    doc.schema_version = record
                        .data
                        .get("schema_version")
                        .and_then(|v| v.as_u64())
                        .map(|v| v as u32);
                }
                EventType::Scenario => {
                    doc.scenario = Some(ScenarioDoc {
                        theme: str_field(record, "theme"),
                        opening: str_field(record, "opening"),
                    });
                }
                EventType::RoundStart => {
                    if let Some(round) = current_round.take() {
                        doc.rounds.push(round);
                    }
                    current_round = Some(RoundDoc {
                        round: record.round.unwrap_or(0),
                        ..Default::default()
                    });
                }
                EventType::ActionDeclaration => {
                    if let Some(round) = current_round.as_mut() {
                        let actor = str_field(record, "character");
                        let intent = str_field(record, "intent");
                        round.declarations.push(format!("{actor}: {intent}"));
                    }
                }
                EventType::ActionResolution => {
                    if let Some(round) = current_round.as_mut() {
                        round.resolutions.push(ResolutionDoc {
                            actor: str_field(record, "character"),
                            intent: str_field(record, "intent"),
                            tier: str_field(record, "outcome_tier"),
                            margin: record
                                .data
                                .get("margin")
                                .and_then(|v| v.as_i64())
                                .unwrap_or(0) as i32,
                            narration: str_field(record, "narration"),
                        });
                    }
                }
                EventType::RoundSynthesis => {
                    if let Some(round) = current_round.as_mut() {
                        round.synthesis = Some(str_field(record, "story_advancement"));
                    }
                }
                EventType::ClockSpawn | EventType::ClockFilled | EventType::ClockArchived => {
                    if let Some(round) = current_round.as_mut() {
                        let name = str_field(record, "name");
                        let verb = match record.event_type {
                            EventType::ClockSpawn => "spawned",
                            EventType::ClockFilled => "filled",
                            _ => "archived",
                        };
                        round.clock_changes.push(format!("{name} {verb}"));
                    }
                }
                EventType::SessionEnd => {
                    doc.outcome = record
                        .data
                        .get("outcome")
                        .and_then(|v| v.as_str())
                        .map(str::to_string);
                }
                _ => {}
            }
        }
        if let Some(round) = current_round.take() {
            doc.rounds.push(round);
        }
        doc
    }

    /// Write the YAML companion file.
    pub fn write_yaml(&self, path: &Path) -> Result<(), SessionError> {
        let yaml = serde_yaml::to_string(self)
            .map_err(|e| SessionError::LogWrite(format!("transcript yaml: {e}")))?;
        std::fs::write(path, yaml)
            .map_err(|e| SessionError::LogWrite(format!("write {}: {e}", path.display())))
    }

    /// Plain-text rendering for `replay` stdout.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        if let Some(name) = &self.session_name {
            out.push_str(&format!("Session: {name}\n"));
        }
        if let Some(scenario) = &self.scenario {
            out.push_str(&format!("Scenario: {}\n{}\n", scenario.theme, scenario.opening));
        }
        for round in &self.rounds {
            out.push_str(&format!("\n=== Round {} ===\n", round.round));
            for resolution in &round.resolutions {
                out.push_str(&format!(
                    "[{}] {} - {} (margin {:+})\n",
                    resolution.tier, resolution.actor, resolution.intent, resolution.margin
                ));
                if !resolution.narration.is_empty() {
                    out.push_str(&format!("    {}\n", resolution.narration));
                }
            }
            if let Some(synthesis) = &round.synthesis {
                out.push_str(&format!("  -- {synthesis}\n"));
            }
        }
        if let Some(outcome) = &self.outcome {
            out.push_str(&format!("\nOutcome: {outcome}\n"));
        }
        out
    }
}

fn str_field(record: &EventRecord, key: &str) -> String {
    record
        .data
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

/// Replay determinism: every `character_state` snapshot must parse into the
/// domain snapshot type and re-serialize to the identical value.
pub fn verify_snapshot_determinism(records: &[EventRecord]) -> Result<usize, String> {
    let mut verified = 0;
    for record in records {
        if record.event_type != EventType::CharacterState {
            continue;
        }
        let Some(raw) = record.data.get("character") else {
            return Err(format!("character_state seq {} missing character", record.seq));
        };
        let snapshot: aeonisk_domain::CharacterSnapshot = serde_json::from_value(raw.clone())
            .map_err(|e| format!("character_state seq {}: {e}", record.seq))?;
        let back = serde_json::to_value(&snapshot)
            .map_err(|e| format!("character_state seq {}: {e}", record.seq))?;
        if &back != raw {
            return Err(format!(
                "character_state seq {} does not round-trip",
                record.seq
            ));
        }
        verified += 1;
    }
    Ok(verified)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aeonisk_domain::SessionId;
    use serde_json::json;

    fn record(seq: u64, event_type: EventType, session: SessionId) -> EventRecord {
        let mut r = EventRecord::new(event_type, session);
        r.seq = seq;
        r
    }

    fn sample_records(session: SessionId) -> Vec<EventRecord> {
        vec![
            record(1, EventType::SessionStart, session)
                .with_data(json!({"session_name": "smoke", "schema_version": 2})),
            record(2, EventType::Scenario, session)
                .with_phase("setup")
                .with_data(json!({"theme": "Ashfall", "opening": "Dust on the wind."})),
            record(3, EventType::RoundStart, session).with_round(1),
            record(4, EventType::ActionDeclaration, session)
                .with_round(1)
                .with_data(json!({"character": "Riven", "intent": "scout the ridge"})),
            record(5, EventType::ActionResolution, session)
                .with_round(1)
                .with_data(json!({
                    "character": "Riven",
                    "intent": "scout the ridge",
                    "outcome_tier": "good",
                    "margin": 11,
                    "narration": "The ridge opens onto the broken grid."
                })),
            record(6, EventType::RoundSynthesis, session)
                .with_round(1)
                .with_data(json!({"story_advancement": "The Concord moves at dusk."})),
            record(7, EventType::SessionEnd, session).with_data(json!({"outcome": "DRAW"})),
        ]
    }

    #[test]
    fn test_reconstruction() {
        let session = SessionId::new();
        let doc = TranscriptDoc::from_records(&sample_records(session));
        assert_eq!(doc.session_name.as_deref(), Some("smoke"));
        assert_eq!(doc.schema_version, Some(2));
        assert_eq!(doc.rounds.len(), 1);
        assert_eq!(doc.rounds[0].resolutions.len(), 1);
        assert_eq!(doc.rounds[0].resolutions[0].tier, "good");
        assert_eq!(doc.outcome.as_deref(), Some("DRAW"));
    }

    #[test]
    fn test_reconstruction_is_deterministic() {
        let session = SessionId::new();
        let records = sample_records(session);
        assert_eq!(
            TranscriptDoc::from_records(&records),
            TranscriptDoc::from_records(&records)
        );
    }

    #[test]
    fn test_render_text_mentions_rounds_and_outcome() {
        let session = SessionId::new();
        let doc = TranscriptDoc::from_records(&sample_records(session));
        let text = doc.render_text();
        assert!(text.contains("=== Round 1 ==="));
        assert!(text.contains("scout the ridge"));
        assert!(text.contains("Outcome: DRAW"));
    }

    #[test]
    fn test_snapshot_determinism_accepts_real_snapshots() {
        use aeonisk_domain::{Character, CharacterSnapshot, Role};
        let session = SessionId::new();
        let snapshot = CharacterSnapshot::from(&Character::new("Riven", "Concord", Role::Player));
        let records = vec![record(1, EventType::CharacterState, session)
            .with_data(json!({"character": serde_json::to_value(&snapshot).expect("value")}))];
        assert_eq!(verify_snapshot_determinism(&records), Ok(1));
    }

    #[test]
    fn test_snapshot_determinism_rejects_malformed() {
        let session = SessionId::new();
        let records = vec![record(1, EventType::CharacterState, session)
            .with_data(json!({"character": {"id": "not-a-uuid"}}))];
        assert!(verify_snapshot_determinism(&records).is_err());
    }
}
