//! Round synthesis: the DM's end-of-round structured output
//!
//! Carries story advancement plus the three out-of-band control directives:
//! new clocks, scenario pivot, session end. The synthesis is serialized to a
//! plain JSON value before crossing the coordinator bus and deserialized on
//! receipt, so nothing but data survives the hop.

use serde::{Deserialize, Serialize};

/// Directive to spawn a clock with full semantics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewClockDirective {
    pub name: String,
    pub maximum: i32,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub advance_means: String,
    #[serde(default)]
    pub regress_means: String,
    #[serde(default)]
    pub filled_consequence: String,
}

/// Directive to advance (positive) or regress (negative) an active clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockDelta {
    pub name: String,
    pub delta: i32,
    #[serde(default)]
    pub reason: String,
}

/// How a session ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionOutcome {
    Victory,
    Defeat,
    Draw,
    Aborted,
}

impl SessionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionOutcome::Victory => "VICTORY",
            SessionOutcome::Defeat => "DEFEAT",
            SessionOutcome::Draw => "DRAW",
            SessionOutcome::Aborted => "ABORTED",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_uppercase().as_str() {
            "VICTORY" => Some(SessionOutcome::Victory),
            "DEFEAT" => Some(SessionOutcome::Defeat),
            "DRAW" => Some(SessionOutcome::Draw),
            "ABORTED" => Some(SessionOutcome::Aborted),
            _ => None,
        }
    }
}

/// The DM's structured end-of-round output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundSynthesis {
    #[serde(default)]
    pub story_advancement: String,
    #[serde(default)]
    pub clock_updates: Vec<ClockDelta>,
    #[serde(default)]
    pub new_clocks: Vec<NewClockDirective>,
    /// New scenario theme; presence means `[PIVOT_SCENARIO]`.
    #[serde(default)]
    pub pivot: Option<String>,
    /// Presence means `[SESSION_END]`.
    #[serde(default)]
    pub session_end: Option<SessionOutcome>,
    /// Clocks whose filled consequence this round's story resolved.
    #[serde(default)]
    pub resolved_clocks: Vec<String>,
}

/// DM scenario-generation output for the setup phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioDraft {
    #[serde(default)]
    pub theme: String,
    #[serde(default)]
    pub opening: String,
    /// Setup spawns 2-4 clocks with full semantics.
    #[serde(default)]
    pub clocks: Vec<NewClockDirective>,
}

/// Broadcast to every agent when the scenario pivots, so nobody pursues a
/// stale objective.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioUpdate {
    pub theme: String,
    pub text: String,
    pub round: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthesis_bus_roundtrip() {
        let synthesis = RoundSynthesis {
            story_advancement: "The grid flickers; raiders regroup.".into(),
            clock_updates: vec![ClockDelta {
                name: "Grid Collapse".into(),
                delta: 1,
                reason: "sabotage".into(),
            }],
            new_clocks: vec![],
            pivot: Some("Survival".into()),
            session_end: None,
            resolved_clocks: vec!["Alarm".into()],
        };
        // Plain-value hop, as across the coordinator bus.
        let value = serde_json::to_value(&synthesis).expect("to value");
        let back: RoundSynthesis = serde_json::from_value(value).expect("from value");
        assert_eq!(back, synthesis);
    }

    #[test]
    fn test_outcome_parse() {
        assert_eq!(SessionOutcome::parse("victory"), Some(SessionOutcome::Victory));
        assert_eq!(SessionOutcome::parse(" DRAW "), Some(SessionOutcome::Draw));
        assert_eq!(SessionOutcome::parse("stalemate"), None);
    }

    #[test]
    fn test_synthesis_defaults_tolerate_sparse_json() {
        let sparse: RoundSynthesis =
            serde_json::from_str(r#"{"story_advancement":"quiet round"}"#).expect("parse");
        assert!(sparse.clock_updates.is_empty());
        assert!(sparse.pivot.is_none());
        assert!(sparse.session_end.is_none());
    }
}
