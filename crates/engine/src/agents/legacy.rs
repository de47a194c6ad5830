//! Legacy text-parsing fallback
//!
//! The structured path is authoritative; this path is the resilience net for
//! models that cannot hold a JSON shape. Narration falls back to raw prose
//! with the trigger scanner promoted to authoritative, and synthesis falls
//! back to bracket markers parsed out of the text.

use regex_lite::Regex;

use aeonisk_domain::{parse_triggers, MechanicalEffect, OutcomeTier, TriggerSuggestion};
use aeonisk_shared::{NewClockDirective, RoundSynthesis, ScenarioDraft, SessionOutcome};

/// Narration parsed from free text: prose plus scanner-derived effects.
pub fn narration_fallback(
    raw: &str,
    actor_name: &str,
    intent: &str,
    tier: OutcomeTier,
    active_clocks: &[String],
) -> (String, Vec<MechanicalEffect>) {
    let narration = if raw.trim().is_empty() {
        "(no response)".to_string()
    } else {
        raw.trim().to_string()
    };

    let mut effects = Vec::new();
    for suggestion in parse_triggers(&narration, intent, tier) {
        match suggestion {
            TriggerSuggestion::VoidGain { amount, reason } => {
                effects.push(MechanicalEffect::VoidChange {
                    target: actor_name.to_string(),
                    amount,
                    reason,
                });
            }
            TriggerSuggestion::ClockAdvance {
                name,
                ticks,
                reason,
            } => {
                // An unnamed marker only lands when a single clock is active.
                let resolved = name.or_else(|| {
                    if active_clocks.len() == 1 {
                        active_clocks.first().cloned()
                    } else {
                        None
                    }
                });
                if let Some(name) = resolved {
                    effects.push(MechanicalEffect::ClockUpdate {
                        name,
                        delta: ticks,
                        reason,
                    });
                }
            }
        }
    }

    (narration, effects)
}

/// Parse bracket control markers out of synthesis prose:
/// `[PIVOT_SCENARIO: theme]`, `[SESSION_END: VICTORY]`,
/// `[NEW_CLOCK: name | max | description | advance | regress | consequence]`,
/// `[CLOCK: name +2 reason]`, `[RESOLVED: name]`.
pub fn synthesis_fallback(raw: &str) -> RoundSynthesis {
    let mut synthesis = RoundSynthesis::default();

    let pivot_re = Regex::new(r"\[PIVOT_SCENARIO:\s*([^\]]+)\]").expect("static regex");
    if let Some(cap) = pivot_re.captures(raw) {
        synthesis.pivot = Some(cap[1].trim().to_string());
    }

    let end_re = Regex::new(r"\[SESSION_END:\s*([A-Za-z]+)\s*\]").expect("static regex");
    if let Some(cap) = end_re.captures(raw) {
        synthesis.session_end = SessionOutcome::parse(&cap[1]);
    }

    let clock_re =
        Regex::new(r"\[CLOCK:\s*([^+\-\]]+?)\s*([+-]\d+)\s*([^\]]*)\]").expect("static regex");
    for cap in clock_re.captures_iter(raw) {
        if let Ok(delta) = cap[2].parse::<i32>() {
            synthesis.clock_updates.push(aeonisk_shared::ClockDelta {
                name: cap[1].trim().to_string(),
                delta,
                reason: cap[3].trim().to_string(),
            });
        }
    }

    let resolved_re = Regex::new(r"\[RESOLVED:\s*([^\]]+)\]").expect("static regex");
    for cap in resolved_re.captures_iter(raw) {
        synthesis.resolved_clocks.push(cap[1].trim().to_string());
    }

    synthesis.new_clocks = parse_new_clock_markers(raw);

    // Story advancement is the prose minus marker lines.
    synthesis.story_advancement = raw
        .lines()
        .filter(|line| !line.trim_start().starts_with('['))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string();

    synthesis
}

/// Scenario fallback: theme from the hint or the first line; if the text
/// offers fewer than two parseable clocks, pad with serviceable defaults so
/// setup always yields a playable board.
pub fn scenario_fallback(raw: &str, theme_hint: Option<&str>) -> ScenarioDraft {
    let theme = theme_hint
        .map(str::to_string)
        .or_else(|| raw.lines().next().map(|l| l.trim().to_string()))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "Uncharted Trouble".to_string());

    let mut clocks = parse_new_clock_markers(raw);
    if clocks.len() < 2 {
        if clocks.iter().all(|c| c.name != "Rising Threat") {
            clocks.push(NewClockDirective {
                name: "Rising Threat".to_string(),
                maximum: 6,
                description: "Opposition organizes against the party".to_string(),
                advance_means: "setbacks, noise, attention".to_string(),
                regress_means: "misdirection, decisive wins".to_string(),
                filled_consequence: "The opposition strikes in force".to_string(),
            });
        }
        if clocks.iter().all(|c| c.name != "Mission Progress") {
            clocks.push(NewClockDirective {
                name: "Mission Progress".to_string(),
                maximum: 8,
                description: "The party closes on its objective".to_string(),
                advance_means: "leads, access, leverage".to_string(),
                regress_means: "lost ground, burned contacts".to_string(),
                filled_consequence: "The objective is within reach".to_string(),
            });
        }
    }
    clocks.truncate(4);

    ScenarioDraft {
        theme,
        opening: raw.trim().to_string(),
        clocks,
    }
}

fn parse_new_clock_markers(raw: &str) -> Vec<NewClockDirective> {
    let re = Regex::new(r"\[NEW_CLOCK:\s*([^\]]+)\]").expect("static regex");
    let mut clocks = Vec::new();
    for cap in re.captures_iter(raw) {
        let parts: Vec<&str> = cap[1].split('|').map(str::trim).collect();
        if parts.len() < 2 {
            continue;
        }
        let Ok(maximum) = parts[1].parse::<i32>() else {
            continue;
        };
        clocks.push(NewClockDirective {
            name: parts[0].to_string(),
            maximum,
            description: parts.get(2).copied().unwrap_or_default().to_string(),
            advance_means: parts.get(3).copied().unwrap_or_default().to_string(),
            regress_means: parts.get(4).copied().unwrap_or_default().to_string(),
            filled_consequence: parts.get(5).copied().unwrap_or_default().to_string(),
        });
    }
    clocks
}
