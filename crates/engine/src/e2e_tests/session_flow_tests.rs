//! Full-session flow: phases, event framing, transcript, log validation

use std::sync::Arc;

use aeonisk_shared::{EventType, SessionOutcome};

use super::{coordinator_with, events_of, finished_log, test_config, MockLlm};
use crate::log::{validate, verify_snapshot_determinism, TranscriptDoc};

#[tokio::test]
async fn test_two_round_session_emits_full_frame() {
    let dir = tempfile::tempdir().expect("tempdir");
    let llm = Arc::new(MockLlm::new());
    let mut coordinator = coordinator_with(llm, test_config(dir.path(), 2), vec![10]);

    let outcome = coordinator.run().await.expect("session");
    assert_eq!(outcome, SessionOutcome::Draw);

    let records = finished_log(&coordinator);

    // Framing: one session_start, setup scenario, both rounds fully framed.
    assert_eq!(events_of(&records, EventType::SessionStart).len(), 1);
    assert_eq!(events_of(&records, EventType::Scenario).len(), 1);
    assert_eq!(events_of(&records, EventType::ClockSpawn).len(), 2);
    assert_eq!(events_of(&records, EventType::RoundStart).len(), 2);
    assert_eq!(
        events_of(&records, EventType::DeclarationPhaseStart).len(),
        2
    );
    assert_eq!(events_of(&records, EventType::ActionDeclaration).len(), 2);
    assert_eq!(events_of(&records, EventType::FastPhaseStart).len(), 2);
    assert_eq!(events_of(&records, EventType::AdjudicationStart).len(), 2);
    assert_eq!(events_of(&records, EventType::ActionResolution).len(), 2);
    assert_eq!(events_of(&records, EventType::RoundSynthesis).len(), 2);
    assert_eq!(events_of(&records, EventType::RoundSummary).len(), 2);
    assert_eq!(events_of(&records, EventType::MissionDebrief).len(), 1);
    assert_eq!(events_of(&records, EventType::SessionEnd).len(), 1);

    // Setup is phase="setup", never round 0.
    let scenario = &events_of(&records, EventType::Scenario)[0];
    assert_eq!(scenario.phase.as_deref(), Some("setup"));
    assert_eq!(scenario.round, None);
    assert!(records.iter().all(|r| r.round != Some(0)));

    // The log passes its own validator.
    let report = validate(&records);
    assert!(report.passed(), "checks: {:#?}", report.checks);
    assert!(verify_snapshot_determinism(&records).expect("determinism") >= 2);

    // YAML companion exists and reconstructs.
    let yaml_path = coordinator.log_path().with_extension("yaml");
    assert!(yaml_path.exists());
    let transcript = TranscriptDoc::from_records(&records);
    assert_eq!(transcript.rounds.len(), 2);
    assert_eq!(transcript.outcome.as_deref(), Some("DRAW"));
}

#[tokio::test]
async fn test_session_end_marker_terminates_early() {
    let dir = tempfile::tempdir().expect("tempdir");
    let llm = Arc::new(MockLlm::new());
    llm.push_synthesis(
        r#"{"story_advancement": "The vault is secured before the wardens close.",
            "session_end": "VICTORY"}"#,
    );
    let mut coordinator = coordinator_with(llm, test_config(dir.path(), 5), vec![10]);

    let outcome = coordinator.run().await.expect("session");
    assert_eq!(outcome, SessionOutcome::Victory);

    let records = finished_log(&coordinator);
    // Only round 1 ran.
    assert_eq!(events_of(&records, EventType::RoundStart).len(), 1);
    let end = &events_of(&records, EventType::SessionEnd)[0];
    assert_eq!(end.data["outcome"], "VICTORY");
}

#[tokio::test]
async fn test_declaration_resolution_pairing_per_agent() {
    let dir = tempfile::tempdir().expect("tempdir");
    let llm = Arc::new(MockLlm::new());
    let mut coordinator = coordinator_with(llm, test_config(dir.path(), 3), vec![10]);
    coordinator.run().await.expect("session");

    let records = finished_log(&coordinator);
    for declaration in events_of(&records, EventType::ActionDeclaration) {
        let round = declaration.round.expect("declared in a round");
        let matching = records
            .iter()
            .filter(|r| {
                r.event_type == EventType::ActionResolution
                    && r.round == Some(round)
                    && r.agent_id == declaration.agent_id
            })
            .count();
        assert_eq!(matching, 1, "round {round} agent {:?}", declaration.agent_id);
    }
}

#[tokio::test]
async fn test_timeout_produces_structural_failure_not_crash() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut mock = MockLlm::new();
    mock.declaration_delay = Some(std::time::Duration::from_secs(10));
    let llm = Arc::new(mock);

    // Player timeout of 1s, one round.
    let value = serde_json::json!({
        "session_name": "timeout",
        "max_rounds": 1,
        "output_dir": dir.path(),
        "agents": {
            "dm": {"timeout_secs": 5},
            "players": [{"name": "Riven", "timeout_secs": 1}]
        }
    });
    let config = aeonisk_shared::SessionConfig::from_json_str(&value.to_string()).expect("config");
    let mut coordinator = coordinator_with(llm, config, vec![10]);

    let outcome = coordinator.run().await.expect("session survives timeout");
    assert_eq!(outcome, SessionOutcome::Draw);

    let records = finished_log(&coordinator);
    let declaration = &events_of(&records, EventType::ActionDeclaration)[0];
    assert_eq!(declaration.data["intent"], "(no response)");
    assert_eq!(declaration.data["structural_failure"], true);
    assert_eq!(declaration.data["timed_out"], true);

    let resolution = &events_of(&records, EventType::ActionResolution)[0];
    assert_eq!(resolution.data["outcome_tier"], "failure");
    assert_eq!(resolution.data["margin"], 0);
    // No state changes flowed from the failure.
    assert_eq!(resolution.data["effects"].as_array().map(|a| a.len()), Some(0));
}
