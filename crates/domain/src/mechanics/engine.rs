//! The mechanics engine: sole authority for numeric game state
//!
//! Pure apart from the injected dice. Every mutation of `GameState` is a
//! named method here so sessions can be audited from the call sites alone.
//! Arithmetic is re-verified on every resolution; a mismatch is a program
//! bug and surfaces as `MechanicsError`, which callers treat as fatal.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::entities::{Character, Role, SceneClock};
use crate::error::{DomainError, MechanicsError};
use crate::ids::CharacterId;
use crate::mechanics::{ActionResolution, MechanicalEffect, Modifier};
use crate::state::GameState;
use crate::value_objects::{
    check_d20, ritual_void_penalty, Attribute, DiceRoller, OutcomeTier, RITUAL_SKILL,
};

/// Failure from a mechanics call. `Fatal` aborts the session; `Domain` is
/// recoverable at the coordinator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MechanicsFailure {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Fatal(#[from] MechanicsError),
}

impl MechanicsFailure {
    pub fn is_fatal(&self) -> bool {
        matches!(self, MechanicsFailure::Fatal(_))
    }
}

/// Input to a standard check.
#[derive(Debug, Clone)]
pub struct CheckRequest {
    pub intent: String,
    pub attribute: Attribute,
    /// Canonical skill name, or empty for unskilled.
    pub skill: String,
    pub difficulty: i32,
    /// Situational modifiers gathered by the coordinator (defence tokens,
    /// reactions, ritual bonuses). Condition and injury modifiers are added
    /// here automatically.
    pub extra_modifiers: Vec<Modifier>,
    pub target: Option<String>,
}

/// Ritual participation flags, validated against inventory.
#[derive(Debug, Clone, Default)]
pub struct RitualContext {
    pub has_primary_tool: bool,
    pub has_offering: bool,
    pub sanctified_altar: bool,
    pub assistants: Vec<CharacterId>,
}

/// Outcome of a ritual resolution: the check plus per-participant effects.
#[derive(Debug, Clone)]
pub struct RitualResolution {
    pub resolution: ActionResolution,
    /// Void changes for every participant (actor included), not just the primary.
    pub void_effects: Vec<MechanicalEffect>,
    pub consequence_tags: Vec<String>,
}

/// Audit entry for one applied (or skipped) structured effect.
#[derive(Debug, Clone)]
pub struct EffectApplication {
    pub effect: MechanicalEffect,
    pub applied: bool,
    pub outcome: String,
    /// Set when a clock update newly filled the clock.
    pub clock_filled: Option<String>,
    /// Set when a narrative group entity was spawned to receive the effect.
    pub spawned_entity: Option<String>,
}

/// Context for applying a resolution's effects.
#[derive(Debug, Clone)]
pub struct EffectContext {
    pub actor: CharacterId,
    /// DM-specified narrative target for effects whose own target is `None`.
    pub narrative_target: Option<String>,
    pub at: DateTime<Utc>,
}

/// One character's initiative for the round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitiativeEntry {
    pub id: CharacterId,
    pub roll: u8,
    pub score: i32,
}

/// Report from the cleanup phase.
#[derive(Debug, Clone, Default)]
pub struct CleanupReport {
    /// (character name, expired condition names)
    pub expired_conditions: Vec<(String, Vec<String>)>,
    /// (clock name, archive reason)
    pub archived_clocks: Vec<(String, String)>,
}

/// The engine itself. Stateless; all state lives in `GameState`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MechanicsEngine;

impl MechanicsEngine {
    pub fn new() -> Self {
        Self
    }

    /// Resolve a standard check for `actor`.
    ///
    /// Skilled: `total = attribute x skill + d20 + mods`.
    /// Unskilled: `total = attribute + d20 - 5 + mods`.
    pub fn resolve_check(
        &self,
        actor: &Character,
        req: &CheckRequest,
        dice: &mut dyn DiceRoller,
    ) -> Result<ActionResolution, MechanicsFailure> {
        let attribute_value = actor.attribute(req.attribute);
        let skill_value = actor.skill_rank(&req.skill);
        let roll = check_d20(dice.roll_d20()).map_err(MechanicsFailure::Fatal)?;

        let mut modifiers = req.extra_modifiers.clone();
        let condition_mod = actor.condition_modifier();
        if condition_mod != 0 {
            modifiers.push(Modifier::new("conditions", condition_mod));
        }
        let injury = actor.injury_penalty();
        if injury != 0 {
            modifiers.push(Modifier::new("injuries", injury));
        }
        let modifier_sum: i32 = modifiers.iter().map(|m| m.value).sum();

        let (ability, base_total, formula) = if skill_value > 0 {
            let ability = attribute_value * skill_value as i32;
            (
                ability,
                ability + roll as i32,
                format!("{} x {} + d20 (+mods)", req.attribute, req.skill),
            )
        } else {
            (
                attribute_value,
                attribute_value + roll as i32 - 5,
                format!("{} + d20 - 5 (unskilled)", req.attribute),
            )
        };

        let total = base_total + modifier_sum;

        // Re-derive every step; a mismatch is a bug, not a game event.
        let expected_base = if skill_value > 0 {
            ability + roll as i32
        } else {
            ability + roll as i32 - 5
        };
        if base_total != expected_base {
            return Err(MechanicsError::MathCheckFailed {
                check: "base_total == ability + roll",
                expected: expected_base,
                actual: base_total,
            }
            .into());
        }
        if total != base_total + modifier_sum {
            return Err(MechanicsError::MathCheckFailed {
                check: "total == base_total + modifier_sum",
                expected: base_total + modifier_sum,
                actual: total,
            }
            .into());
        }

        let margin = total - req.difficulty;
        if margin != total - req.difficulty {
            return Err(MechanicsError::MathCheckFailed {
                check: "margin == total - difficulty",
                expected: total - req.difficulty,
                actual: margin,
            }
            .into());
        }

        Ok(ActionResolution {
            intent: req.intent.clone(),
            attribute: req.attribute,
            attribute_value,
            skill: req.skill.clone(),
            skill_value,
            roll,
            modifiers,
            modifier_sum,
            total,
            difficulty: req.difficulty,
            margin,
            outcome_tier: OutcomeTier::from_roll_and_margin(roll, margin),
            formula,
            target: req.target.clone(),
            narration: String::new(),
            mechanical_effects: Vec::new(),
            structured_path: false,
        })
    }

    /// Resolve a ritual: Willpower x Astral Arts, with the full bonus table.
    ///
    /// Bonuses: primary tool +2 (missing tool -2); each Bonded assistant +2;
    /// each skilled non-Bonded assistant +1; sanctified altar +2. No offering
    /// adds +1 void to *every* participant and tags the consequence. Each
    /// participant's void over 5 drags the check down.
    pub fn resolve_ritual(
        &self,
        state: &GameState,
        actor_id: CharacterId,
        intent: &str,
        difficulty: i32,
        ctx: &RitualContext,
        dice: &mut dyn DiceRoller,
    ) -> Result<RitualResolution, MechanicsFailure> {
        let actor = state.character(actor_id).map_err(MechanicsFailure::Domain)?;
        let mut modifiers = Vec::new();
        let mut consequence_tags = Vec::new();

        let tool_present = ctx.has_primary_tool && actor.has_ritual_tool();
        if tool_present {
            modifiers.push(Modifier::new("primary ritual tool", 2));
        } else {
            modifiers.push(Modifier::new("missing ritual tool", -2));
            consequence_tags.push("No primary tool".to_string());
        }

        for assistant_id in &ctx.assistants {
            let assistant = state
                .character(*assistant_id)
                .map_err(MechanicsFailure::Domain)?;
            let bonded =
                assistant.bonded_to(&actor.name) || actor.bonded_to(&assistant.name);
            if bonded {
                modifiers.push(Modifier::new(
                    format!("bonded assistant: {}", assistant.name),
                    2,
                ));
            } else if assistant.skill_rank(RITUAL_SKILL) > 0 {
                modifiers.push(Modifier::new(
                    format!("skilled assistant: {}", assistant.name),
                    1,
                ));
            }
        }

        if ctx.sanctified_altar {
            modifiers.push(Modifier::new("sanctified altar", 2));
        }

        let mut participants = vec![actor_id];
        participants.extend(ctx.assistants.iter().copied());

        for pid in &participants {
            let p = state.character(*pid).map_err(MechanicsFailure::Domain)?;
            let penalty = ritual_void_penalty(p.void_score);
            if penalty != 0 {
                modifiers.push(Modifier::new(
                    format!("void resonance: {}", p.name),
                    penalty,
                ));
            }
        }

        let mut void_effects = Vec::new();
        if !ctx.has_offering {
            consequence_tags.push("No offering".to_string());
            for pid in &participants {
                let p = state.character(*pid).map_err(MechanicsFailure::Domain)?;
                void_effects.push(MechanicalEffect::VoidChange {
                    target: p.name.clone(),
                    amount: 1,
                    reason: "Ritual conducted without offering".to_string(),
                });
            }
        }

        let req = CheckRequest {
            intent: intent.to_string(),
            attribute: Attribute::Willpower,
            skill: RITUAL_SKILL.to_string(),
            difficulty,
            extra_modifiers: modifiers,
            target: None,
        };
        let resolution = self.resolve_check(actor, &req, dice)?;

        Ok(RitualResolution {
            resolution,
            void_effects,
            consequence_tags,
        })
    }

    /// Initiative: Agility x 4 + d20 (+ enemy bonus); a natural 1 zeroes the
    /// score. Returns entries sorted into descending acting order, ties
    /// broken by highest single skill rank, then highest attribute, then
    /// name for stability.
    pub fn roll_initiative(
        &self,
        state: &GameState,
        dice: &mut dyn DiceRoller,
    ) -> Result<Vec<InitiativeEntry>, MechanicsFailure> {
        let mut entries = Vec::new();
        for c in state.characters() {
            let roll = check_d20(dice.roll_d20()).map_err(MechanicsFailure::Fatal)?;
            let score = if roll == 1 {
                0
            } else {
                c.attribute(Attribute::Agility) * 4 + roll as i32 + c.initiative_bonus
            };
            entries.push(InitiativeEntry {
                id: c.id,
                roll,
                score,
            });
        }
        entries.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| {
                    state
                        .best_skill_rank(b.id)
                        .cmp(&state.best_skill_rank(a.id))
                })
                .then_with(|| state.best_attribute(b.id).cmp(&state.best_attribute(a.id)))
                .then_with(|| {
                    let name = |id| {
                        state
                            .character(id)
                            .map(|c| c.name.clone())
                            .unwrap_or_default()
                    };
                    name(a.id).cmp(&name(b.id))
                })
        });
        Ok(entries)
    }

    /// Spawn a clock into play.
    pub fn spawn_clock(
        &self,
        state: &mut GameState,
        clock: SceneClock,
    ) -> Result<(), DomainError> {
        if state.clock_by_name(&clock.name).is_some() {
            return Err(DomainError::constraint(format!(
                "Clock '{}' already active",
                clock.name
            )));
        }
        state.clocks.push(clock);
        Ok(())
    }

    /// Apply a synthesis clock directive. Positive deltas advance, negative
    /// regress. Returns the fill signal when the delta filled the clock.
    pub fn apply_clock_delta(
        &self,
        state: &mut GameState,
        name: &str,
        delta: i32,
    ) -> Result<Option<String>, DomainError> {
        let clock = state
            .clock_by_name_mut(name)
            .ok_or_else(|| DomainError::not_found("SceneClock", name))?;
        if delta >= 0 {
            let outcome = clock.advance(delta);
            Ok(outcome.newly_filled.then(|| clock.name.clone()))
        } else {
            clock.regress(-delta);
            Ok(None)
        }
    }

    /// Apply the structured effects of a resolution. Individual effects that
    /// cannot land are skipped with an audit line rather than failing the
    /// batch; state mutation happens only here.
    pub fn apply_effects(
        &self,
        state: &mut GameState,
        ctx: &EffectContext,
        effects: &[MechanicalEffect],
    ) -> Vec<EffectApplication> {
        effects
            .iter()
            .map(|effect| self.apply_one(state, ctx, effect.clone()))
            .collect()
    }

    fn apply_one(
        &self,
        state: &mut GameState,
        ctx: &EffectContext,
        effect: MechanicalEffect,
    ) -> EffectApplication {
        let mut clock_filled = None;
        let mut spawned_entity = None;

        let outcome = match &effect {
            MechanicalEffect::VoidChange {
                target,
                amount,
                reason,
            } => match state.character_id_by_name(target) {
                Some(id) => {
                    let c = match state.character_mut(id) {
                        Ok(c) => c,
                        Err(e) => return skipped(&effect, e.to_string()),
                    };
                    let (old, new) = c.apply_void_delta(*amount, reason, ctx.at);
                    format!("{target}: void {old} -> {new}")
                }
                None => return skipped(&effect, format!("unknown entity '{target}'")),
            },

            MechanicalEffect::SoulcreditChange { target, amount, .. } => {
                match state.character_id_by_name(target) {
                    Some(id) => {
                        let c = match state.character_mut(id) {
                            Ok(c) => c,
                            Err(e) => return skipped(&effect, e.to_string()),
                        };
                        let (old, new) = c.apply_soulcredit_delta(*amount);
                        format!("{target}: soulcredit {old} -> {new}")
                    }
                    None => return skipped(&effect, format!("unknown entity '{target}'")),
                }
            }

            MechanicalEffect::ClockUpdate { name, delta, .. } => {
                match self.apply_clock_delta(state, name, *delta) {
                    Ok(filled) => {
                        clock_filled = filled;
                        let display = state
                            .clock_by_name(name)
                            .map(|c| c.display())
                            .unwrap_or_else(|| name.clone());
                        format!("clock {display}")
                    }
                    Err(_) => return skipped(&effect, format!("unknown clock '{name}'")),
                }
            }

            MechanicalEffect::ConditionApplied {
                target,
                name,
                modifier,
                duration,
            } => {
                // Status effects land on the declared target, or on the
                // DM's narrative target. The actor is never a silent
                // fallback.
                let recipient = target
                    .clone()
                    .or_else(|| ctx.narrative_target.clone());
                let Some(recipient) = recipient else {
                    return skipped(
                        &effect,
                        "no declared or narrative target for status effect".to_string(),
                    );
                };
                let (id, spawn) = self.resolve_or_spawn(state, &recipient);
                spawned_entity = spawn;
                match state.character_mut(id) {
                    Ok(c) => {
                        c.apply_condition(crate::value_objects::Condition::new(
                            name.clone(),
                            *modifier,
                            *duration,
                        ));
                        format!("{recipient}: condition {name} ({modifier:+}) for {duration} rounds")
                    }
                    Err(e) => return skipped(&effect, e.to_string()),
                }
            }

            MechanicalEffect::DamageDealt {
                target,
                wounds,
                stuns,
            } => {
                let (id, spawn) = self.resolve_or_spawn(state, target);
                spawned_entity = spawn;
                match state.character_mut(id) {
                    Ok(c) => {
                        c.take_damage(*wounds, *stuns);
                        format!("{target}: {wounds} wounds, {stuns} stuns")
                    }
                    Err(e) => return skipped(&effect, e.to_string()),
                }
            }

            MechanicalEffect::OfferingConsumed { character, item } => {
                match state.character_id_by_name(character) {
                    Some(id) => {
                        let c = match state.character_mut(id) {
                            Ok(c) => c,
                            Err(e) => return skipped(&effect, e.to_string()),
                        };
                        match c.consume_offering(item) {
                            Ok(()) => format!("{character}: consumed {item}"),
                            Err(e) => return skipped(&effect, e.to_string()),
                        }
                    }
                    None => return skipped(&effect, format!("unknown entity '{character}'")),
                }
            }

            MechanicalEffect::BondChange {
                character,
                bond_type,
                target,
                delta,
            } => match state.character_id_by_name(character) {
                Some(id) => {
                    let c = match state.character_mut(id) {
                        Ok(c) => c,
                        Err(e) => return skipped(&effect, e.to_string()),
                    };
                    match apply_bond_change(c, *bond_type, target, *delta) {
                        Ok(desc) => desc,
                        Err(e) => return skipped(&effect, e.to_string()),
                    }
                }
                None => return skipped(&effect, format!("unknown entity '{character}'")),
            },

            MechanicalEffect::EntitySpawn { name, profile } => {
                if state.character_id_by_name(name).is_some() {
                    return skipped(&effect, format!("entity '{name}' already exists"));
                }
                let mut spawned = Character::new(name.clone(), "unaligned", Role::Enemy);
                spawned.tactical_profile = Some(profile.clone());
                match state.add_character(spawned) {
                    Ok(_) => format!("spawned '{name}'"),
                    Err(e) => return skipped(&effect, e.to_string()),
                }
            }

            MechanicalEffect::EntityRemove { name } => {
                match state.character_id_by_name(name) {
                    Some(id) => {
                        state.remove_character(id);
                        format!("removed '{name}'")
                    }
                    None => return skipped(&effect, format!("unknown entity '{name}'")),
                }
            }
        };

        // `skipped` early-returns carry applied=false; reaching here means success.
        EffectApplication {
            effect,
            applied: true,
            outcome,
            clock_filled,
            spawned_entity,
        }
    }

    /// Resolve a target name to an entity, spawning a generic group entity
    /// when the name matches nothing in the registry.
    fn resolve_or_spawn(
        &self,
        state: &mut GameState,
        name: &str,
    ) -> (CharacterId, Option<String>) {
        if let Some(id) = state.character_id_by_name(name) {
            return (id, None);
        }
        let mut group = Character::new(name, "unaligned", Role::Enemy);
        group.tactical_profile = Some("narrative group entity".to_string());
        match state.add_character(group) {
            Ok(id) => (id, Some(name.to_string())),
            // Registration can only fail on a name collision, which the
            // lookup above excludes; fall back to re-resolving.
            Err(_) => (
                state.character_id_by_name(name).unwrap_or_default(),
                None,
            ),
        }
    }

    /// Cleanup phase: tick condition durations and archive clocks whose
    /// consequence is resolved or whose overflow has run away.
    pub fn cleanup(&self, state: &mut GameState) -> CleanupReport {
        let mut report = CleanupReport::default();

        let ids: Vec<CharacterId> = state.characters().map(|c| c.id).collect();
        for id in ids {
            if let Ok(c) = state.character_mut(id) {
                let expired = c.tick_conditions();
                if !expired.is_empty() {
                    report.expired_conditions.push((c.name.clone(), expired));
                }
            }
        }

        let to_archive: Vec<(String, String)> = state
            .clocks
            .iter()
            .filter_map(|c| {
                if c.triggered() {
                    Some((c.name.clone(), "consequence resolved".to_string()))
                } else if c.should_auto_archive() {
                    Some((c.name.clone(), "overflow auto-archive".to_string()))
                } else {
                    None
                }
            })
            .collect();
        for (name, reason) in to_archive {
            state.archive_clock(&name, reason.clone());
            report.archived_clocks.push((name, reason));
        }

        report
    }

    /// Scenario pivot: every filled clock is archived; the pivot itself
    /// signals that their consequences have been addressed.
    pub fn pivot_archive(&self, state: &mut GameState) -> Vec<String> {
        let filled: Vec<String> = state
            .clocks
            .iter()
            .filter(|c| c.is_filled())
            .map(|c| c.name.clone())
            .collect();
        for name in &filled {
            state.archive_clock(name, "scenario pivot");
        }
        filled
    }
}

fn apply_bond_change(
    c: &mut Character,
    bond_type: crate::value_objects::BondType,
    target: &str,
    delta: i32,
) -> Result<String, DomainError> {
    use crate::value_objects::Bond;

    let existing = c
        .bonds
        .iter_mut()
        .position(|b| b.bond_type == bond_type && b.target.eq_ignore_ascii_case(target));
    match existing {
        Some(pos) => {
            let new_level = c.bonds[pos].level as i32 + delta;
            if new_level <= 0 {
                c.bonds.remove(pos);
                Ok(format!("bond {bond_type} -> {target} dissolved"))
            } else {
                c.bonds[pos].level = new_level.min(3) as u8;
                Ok(format!(
                    "bond {bond_type} -> {target} now level {}",
                    c.bonds[pos].level
                ))
            }
        }
        None => {
            if delta <= 0 {
                return Err(DomainError::validation(format!(
                    "no bond {bond_type} -> {target} to weaken"
                )));
            }
            let bond = Bond::new(bond_type, target, delta.min(3) as u8)?;
            c.add_bond(bond)?;
            Ok(format!("bond {bond_type} -> {target} formed"))
        }
    }
}

fn skipped(effect: &MechanicalEffect, why: String) -> EffectApplication {
    EffectApplication {
        effect: effect.clone(),
        applied: false,
        outcome: format!("skipped: {why}"),
        clock_filled: None,
        spawned_entity: None,
    }
}
