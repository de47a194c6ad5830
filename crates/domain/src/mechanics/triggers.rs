//! Passive narration scanner for economy triggers
//!
//! Scans DM prose for the cosmetic markers and a handful of keyword cues,
//! producing *suggestions*. When the structured path succeeded these are
//! informational; in the legacy fallback they are the authoritative source
//! of effects. Parsed by hand - the domain layer carries no regex.

use crate::value_objects::OutcomeTier;

/// A soft suggestion extracted from narration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerSuggestion {
    VoidGain {
        amount: i32,
        reason: String,
    },
    ClockAdvance {
        /// Clock name when the marker carried one; otherwise the scanner
        /// leaves selection to the caller.
        name: Option<String>,
        ticks: i32,
        reason: String,
    },
}

/// Scan narration for trigger markers and keyword cues.
pub fn parse_triggers(narration: &str, intent: &str, tier: OutcomeTier) -> Vec<TriggerSuggestion> {
    let mut suggestions = Vec::new();

    for line in narration.lines() {
        if let Some(amount) = marker_amount(line, "Void:") {
            if amount != 0 {
                suggestions.push(TriggerSuggestion::VoidGain {
                    amount,
                    reason: "narration marker".to_string(),
                });
            }
        }
        if let Some(ticks) = marker_amount(line, "Clock:") {
            if ticks != 0 {
                suggestions.push(TriggerSuggestion::ClockAdvance {
                    name: marker_clock_name(line),
                    ticks,
                    reason: "narration marker".to_string(),
                });
            }
        }
    }

    // Keyword cues when no explicit markers were present.
    if suggestions.is_empty() {
        let intent_lower = intent.to_ascii_lowercase();
        let ritual_flavor =
            intent_lower.contains("ritual") || intent_lower.contains("void");
        if ritual_flavor && tier == OutcomeTier::CriticalFailure {
            suggestions.push(TriggerSuggestion::VoidGain {
                amount: 1,
                reason: "botched void working".to_string(),
            });
        }
    }

    suggestions
}

/// Parse a signed amount following `key` on a line, e.g. "⚫ Void: +2".
fn marker_amount(line: &str, key: &str) -> Option<i32> {
    let pos = line.find(key)?;
    let rest = line[pos + key.len()..].trim_start();
    // Amount may follow a quoted clock name: Clock: "Alarm" +1
    let rest = match rest.strip_prefix('"') {
        Some(after) => after.split_once('"').map(|(_, tail)| tail.trim_start())?,
        None => rest,
    };
    let token: String = rest
        .chars()
        .take_while(|c| *c == '+' || *c == '-' || c.is_ascii_digit())
        .collect();
    token.parse::<i32>().ok()
}

/// Extract the quoted clock name from a marker line, when present.
fn marker_clock_name(line: &str) -> Option<String> {
    let pos = line.find("Clock:")?;
    let rest = line[pos + "Clock:".len()..].trim_start();
    let after = rest.strip_prefix('"')?;
    after.split_once('"').map(|(name, _)| name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_void_marker() {
        let found = parse_triggers("⚫ Void: +2 as the seal cracks", "", OutcomeTier::Failure);
        assert_eq!(
            found,
            vec![TriggerSuggestion::VoidGain {
                amount: 2,
                reason: "narration marker".to_string()
            }]
        );
    }

    #[test]
    fn test_clock_marker_with_name() {
        let found = parse_triggers(
            "📊 Clock: \"Grid Collapse\" +1",
            "",
            OutcomeTier::Moderate,
        );
        assert_eq!(
            found,
            vec![TriggerSuggestion::ClockAdvance {
                name: Some("Grid Collapse".to_string()),
                ticks: 1,
                reason: "narration marker".to_string()
            }]
        );
    }

    #[test]
    fn test_clock_marker_without_name() {
        let found = parse_triggers("Clock: +2", "", OutcomeTier::Moderate);
        assert_eq!(
            found,
            vec![TriggerSuggestion::ClockAdvance {
                name: None,
                ticks: 2,
                reason: "narration marker".to_string()
            }]
        );
    }

    #[test]
    fn test_negative_marker() {
        let found = parse_triggers("Clock: -1 (load shed)", "", OutcomeTier::Good);
        assert_eq!(
            found,
            vec![TriggerSuggestion::ClockAdvance {
                name: None,
                ticks: -1,
                reason: "narration marker".to_string()
            }]
        );
    }

    #[test]
    fn test_keyword_cue_on_botched_ritual() {
        let found = parse_triggers(
            "The circle collapses inward.",
            "channel the void seal ritual",
            OutcomeTier::CriticalFailure,
        );
        assert_eq!(found.len(), 1);
        assert!(matches!(
            found[0],
            TriggerSuggestion::VoidGain { amount: 1, .. }
        ));
    }

    #[test]
    fn test_plain_prose_yields_nothing() {
        let found = parse_triggers(
            "You slip through the fence line unseen.",
            "sneak past the perimeter",
            OutcomeTier::Good,
        );
        assert!(found.is_empty());
    }
}
