//! Log invariant validation
//!
//! A session transcript must be reconstructible from the log alone; these
//! checks are the contract. `validate` runs them all and reports pass/fail
//! with counts per check.

use std::collections::{BTreeMap, BTreeSet};

use aeonisk_shared::{EventRecord, EventType};

/// Result of one invariant check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: &'static str,
    pub passed: bool,
    /// Records examined by this check.
    pub examined: usize,
    pub violations: Vec<String>,
}

/// Full validation report.
#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub checks: Vec<CheckResult>,
}

impl ValidationReport {
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    pub fn total_violations(&self) -> usize {
        self.checks.iter().map(|c| c.violations.len()).sum()
    }
}

/// Run all invariants against a log.
pub fn validate(records: &[EventRecord]) -> ValidationReport {
    ValidationReport {
        checks: vec![
            check_seq_strictly_increasing(records),
            check_declarations_resolve(records),
            check_round_framing(records),
            check_character_state_references(records),
            check_clock_lifecycle(records),
        ],
    }
}

/// `seq` must be strictly increasing: it is the total order.
fn check_seq_strictly_increasing(records: &[EventRecord]) -> CheckResult {
    let mut violations = Vec::new();
    for pair in records.windows(2) {
        if pair[1].seq <= pair[0].seq {
            violations.push(format!(
                "seq {} follows seq {}",
                pair[1].seq, pair[0].seq
            ));
        }
    }
    CheckResult {
        name: "seq_strictly_increasing",
        passed: violations.is_empty(),
        examined: records.len(),
        violations,
    }
}

/// Every action_declaration with round >= 1 has exactly one subsequent
/// action_resolution with matching (round, agent_id).
fn check_declarations_resolve(records: &[EventRecord]) -> CheckResult {
    let mut violations = Vec::new();
    let mut examined = 0;

    for (idx, record) in records.iter().enumerate() {
        if record.event_type != EventType::ActionDeclaration {
            continue;
        }
        let Some(round) = record.round.filter(|r| *r >= 1) else {
            continue;
        };
        examined += 1;
        let matches = records[idx + 1..]
            .iter()
            .filter(|r| {
                r.event_type == EventType::ActionResolution
                    && r.round == Some(round)
                    && r.agent_id == record.agent_id
            })
            .count();
        if matches != 1 {
            violations.push(format!(
                "declaration seq {} (round {round}, agent {:?}) has {matches} resolutions",
                record.seq, record.agent_id
            ));
        }
    }

    CheckResult {
        name: "declarations_resolve_exactly_once",
        passed: violations.is_empty(),
        examined,
        violations,
    }
}

/// Every round >= 1 has a round_start and a round_synthesis.
fn check_round_framing(records: &[EventRecord]) -> CheckResult {
    let mut rounds: BTreeMap<u32, (bool, bool)> = BTreeMap::new();
    for record in records {
        let Some(round) = record.round.filter(|r| *r >= 1) else {
            continue;
        };
        let entry = rounds.entry(round).or_default();
        match record.event_type {
            EventType::RoundStart => entry.0 = true,
            EventType::RoundSynthesis => entry.1 = true,
            _ => {}
        }
    }

    let mut violations = Vec::new();
    for (round, (start, synthesis)) in &rounds {
        if !start {
            violations.push(format!("round {round} has no round_start"));
        }
        if !synthesis {
            violations.push(format!("round {round} has no round_synthesis"));
        }
    }

    CheckResult {
        name: "round_framing",
        passed: violations.is_empty(),
        examined: rounds.len(),
        violations,
    }
}

/// Every character_state snapshot references a character previously
/// introduced by a session_start roster, entity spawn, or earlier snapshot.
fn check_character_state_references(records: &[EventRecord]) -> CheckResult {
    let mut known: BTreeSet<String> = BTreeSet::new();
    let mut violations = Vec::new();
    let mut examined = 0;

    for record in records {
        match record.event_type {
            EventType::SessionStart => {
                if let Some(roster) = record.data.get("characters").and_then(|v| v.as_array()) {
                    for entry in roster {
                        if let Some(id) = entry.get("id").and_then(|v| v.as_str()) {
                            known.insert(id.to_string());
                        }
                    }
                }
            }
            EventType::ActionResolution => {
                // Narrative spawns introduce entities mid-session.
                if let Some(spawned) = record.data.get("spawned").and_then(|v| v.as_array()) {
                    for entry in spawned {
                        if let Some(id) = entry.as_str() {
                            known.insert(id.to_string());
                        }
                    }
                }
            }
            EventType::CharacterState => {
                examined += 1;
                let id = record
                    .data
                    .get("character")
                    .and_then(|c| c.get("id"))
                    .and_then(|v| v.as_str());
                match id {
                    Some(id) if known.contains(id) => {}
                    Some(id) => {
                        violations.push(format!(
                            "character_state seq {} references unknown character {id}",
                            record.seq
                        ));
                    }
                    None => {
                        violations
                            .push(format!("character_state seq {} has no character id", record.seq));
                    }
                }
            }
            _ => {}
        }
    }

    CheckResult {
        name: "character_state_references",
        passed: violations.is_empty(),
        examined,
        violations,
    }
}

/// Every clock_spawn is either archived later or the session ended with it
/// still active (i.e., a session_end exists after the spawn).
fn check_clock_lifecycle(records: &[EventRecord]) -> CheckResult {
    let session_ended = records
        .iter()
        .any(|r| r.event_type == EventType::SessionEnd);

    let mut spawned: BTreeMap<String, u64> = BTreeMap::new();
    let mut archived: BTreeSet<String> = BTreeSet::new();
    for record in records {
        let name = record.data.get("name").and_then(|v| v.as_str());
        match record.event_type {
            EventType::ClockSpawn => {
                if let Some(name) = name {
                    spawned.insert(name.to_string(), record.seq);
                }
            }
            EventType::ClockArchived => {
                if let Some(name) = name {
                    archived.insert(name.to_string());
                }
            }
            _ => {}
        }
    }

    let mut violations = Vec::new();
    for (name, seq) in &spawned {
        if !archived.contains(name) && !session_ended {
            violations.push(format!(
                "clock '{name}' (spawned at seq {seq}) neither archived nor carried to session_end"
            ));
        }
    }

    CheckResult {
        name: "clock_lifecycle",
        passed: violations.is_empty(),
        examined: spawned.len(),
        violations,
    }
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

    #[test]
    fn test_clean_log_passes() {
        let s = SessionId::new();
        let records = vec![
            record(1, EventType::SessionStart, s)
                .with_data(json!({"characters": [{"id": "c1", "name": "Riven"}]})),
            record(2, EventType::RoundStart, s).with_round(1),
            record(3, EventType::ActionDeclaration, s)
                .with_round(1)
                .with_agent("player:riven"),
            record(4, EventType::ActionResolution, s)
                .with_round(1)
                .with_agent("player:riven"),
            record(5, EventType::CharacterState, s)
                .with_round(1)
                .with_data(json!({"character": {"id": "c1"}})),
            record(6, EventType::RoundSynthesis, s).with_round(1),
            record(7, EventType::SessionEnd, s),
        ];
        let report = validate(&records);
        assert!(report.passed(), "violations: {:?}", report.checks);
    }

    #[test]
    fn test_unresolved_declaration_fails() {
        let s = SessionId::new();
        let records = vec![
            record(1, EventType::RoundStart, s).with_round(1),
            record(2, EventType::ActionDeclaration, s)
                .with_round(1)
                .with_agent("player:riven"),
            record(3, EventType::RoundSynthesis, s).with_round(1),
        ];
        let report = validate(&records);
        assert!(!report.passed());
        assert!(report
            .checks
            .iter()
            .any(|c| c.name == "declarations_resolve_exactly_once" && !c.passed));
    }

    #[test]
    fn test_non_monotonic_seq_fails() {
        let s = SessionId::new();
        let records = vec![
            record(2, EventType::SessionStart, s),
            record(1, EventType::SessionEnd, s),
        ];
        let report = validate(&records);
        assert!(!report.passed());
    }

    #[test]
    fn test_unknown_character_state_fails() {
        let s = SessionId::new();
        let records = vec![
            record(1, EventType::SessionStart, s).with_data(json!({"characters": []})),
            record(2, EventType::CharacterState, s)
                .with_data(json!({"character": {"id": "ghost"}})),
            record(3, EventType::SessionEnd, s),
        ];
        let report = validate(&records);
        assert!(!report.passed());
    }

    #[test]
    fn test_dangling_clock_without_session_end_fails() {
        let s = SessionId::new();
        let records = vec![
            record(1, EventType::ClockSpawn, s).with_data(json!({"name": "Alarm"})),
        ];
        let report = validate(&records);
        assert!(!report.passed());

        // With a session_end the active clock is legitimate.
        let records = vec![
            record(1, EventType::ClockSpawn, s).with_data(json!({"name": "Alarm"})),
            record(2, EventType::SessionEnd, s),
        ];
        assert!(validate(&records).passed());
    }
}
