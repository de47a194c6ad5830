//! Structured-output retry accounting and the legacy fallback path

use std::sync::Arc;

use aeonisk_shared::EventType;

use super::{coordinator_with, events_of, finished_log, test_config, MockLlm};

#[tokio::test]
async fn test_narration_retries_then_succeeds_without_fallback() {
    let dir = tempfile::tempdir().expect("tempdir");
    let llm = Arc::new(MockLlm::new());
    // Invalid JSON twice, then valid.
    llm.push_narration("not json at all");
    llm.push_narration("{\"narration\": unterminated");
    llm.push_narration(
        r#"{"narration": "Third attempt lands clean.",
            "mechanical_effects": [], "narrative_target": null}"#,
    );
    let mut coordinator = coordinator_with(llm, test_config(dir.path(), 1), vec![10]);
    coordinator.run().await.expect("session");

    let records = finished_log(&coordinator);
    let narration_calls: Vec<_> = events_of(&records, EventType::LlmCall)
        .into_iter()
        .filter(|r| r.data["purpose"] == "narration")
        .collect();

    // Two validation failures, one success, retry count 2, no fallback.
    assert_eq!(narration_calls.len(), 3);
    assert_eq!(narration_calls[0].data["validation_failed"], true);
    assert_eq!(narration_calls[1].data["validation_failed"], true);
    assert_eq!(narration_calls[2].data["ok"], true);
    assert!(narration_calls
        .iter()
        .all(|r| r.data["llm_fallback"].is_null() || r.data["llm_fallback"] == false));

    // Failed raw output is preserved in the log for training.
    assert_eq!(narration_calls[0].data["raw_text"], "not json at all");

    let resolution = &events_of(&records, EventType::ActionResolution)[0];
    assert_eq!(resolution.data["structured_path"], true);
    assert_eq!(resolution.data["llm_fallback"], false);
    assert_eq!(
        resolution.data["narration"],
        "Third attempt lands clean."
    );
}

#[tokio::test]
async fn test_narration_exhaustion_falls_back_to_legacy_markers() {
    let dir = tempfile::tempdir().expect("tempdir");
    let llm = Arc::new(MockLlm::new());
    // Every attempt is prose; the last one carries legacy markers. With
    // max_retries = 3 there are four attempts in total.
    for _ in 0..3 {
        llm.push_narration("The seal cracks wide open.");
    }
    llm.push_narration("The seal cracks wide open. ⚫ Void: +1");

    let mut coordinator = coordinator_with(llm, test_config(dir.path(), 1), vec![10]);
    coordinator.run().await.expect("session");

    let records = finished_log(&coordinator);
    let resolution = &events_of(&records, EventType::ActionResolution)[0];

    // Legacy path: prose became the narration, the trigger scanner became
    // authoritative, and the fallback is flagged.
    assert_eq!(resolution.data["structured_path"], false);
    assert_eq!(resolution.data["llm_fallback"], true);
    assert!(resolution.data["narration"]
        .as_str()
        .expect("narration")
        .contains("seal cracks"));
    let effects = resolution.data["effects"].as_array().expect("effects");
    assert_eq!(effects.len(), 1);
    assert_eq!(effects[0]["effect"]["effect"], "void_change");
    assert_eq!(effects[0]["applied"], true);

    let narration_calls: Vec<_> = events_of(&records, EventType::LlmCall)
        .into_iter()
        .filter(|r| r.data["purpose"] == "narration")
        .collect();
    assert_eq!(narration_calls.len(), 4);
    assert_eq!(
        narration_calls.last().expect("last").data["llm_fallback"],
        true
    );
}

#[tokio::test]
async fn test_synthesis_fallback_parses_bracket_markers() {
    let dir = tempfile::tempdir().expect("tempdir");
    let llm = Arc::new(MockLlm::new());
    // Synthesis never produces JSON; markers carry the directives. All four
    // attempts return the same prose.
    for _ in 0..4 {
        llm.push_synthesis(
            "The wardens fall back to the gatehouse.\n\
             [CLOCK: Warden Patrols +2 regrouping]\n\
             [SESSION_END: DEFEAT]",
        );
    }
    let mut coordinator = coordinator_with(llm, test_config(dir.path(), 3), vec![10]);
    let outcome = coordinator.run().await.expect("session");
    assert_eq!(outcome, aeonisk_shared::SessionOutcome::Defeat);

    let records = finished_log(&coordinator);
    let synthesis = &events_of(&records, EventType::RoundSynthesis)[0];
    assert_eq!(synthesis.data["llm_fallback"], true);
    assert!(synthesis.data["story_advancement"]
        .as_str()
        .expect("story")
        .contains("gatehouse"));
    assert_eq!(synthesis.data["session_end"], "DEFEAT");
}
