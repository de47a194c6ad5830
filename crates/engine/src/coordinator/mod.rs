//! The round coordinator: owner of the session state machine
//!
//! The only component that invokes agents, mutates shared state (through the
//! mechanics engine), or emits log events. One logical event loop; agent
//! calls are the only suspension points. The declaration fan-out is the only
//! true parallelism - everything else is strictly sequenced, which is what
//! makes the phase ordering auditable.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use futures_util::future::join_all;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use aeonisk_domain::{
    clamp_difficulty, contested, Attribute, AttributeBlock, Character, CharacterId, CheckRequest,
    ContestOutcome, DiceRoller, EffectContext, GameState, MechanicalEffect, MechanicsEngine,
    MechanicsFailure, Modifier, Phase, Role, Scenario, SceneClock, SessionId, RITUAL_SKILL,
};
use aeonisk_domain::RitualContext;
use aeonisk_shared::{
    ActionDeclaration, ActionType, EventRecord, EventType, NewClockDirective, ReactionKind,
    RoundSynthesis, ScenarioUpdate, SessionConfig, SessionOutcome, SCHEMA_VERSION,
};

use crate::agents::{
    ActorAgent, DeclarationResult, DmAgent, EnemyAgent, LlmAttempt, PlayerAgent,
    StructuredCallConfig,
};
use crate::error::SessionError;
use crate::infrastructure::ports::LlmPort;
use crate::log::{read_log, EventLog, TranscriptDoc};

/// How much recent narration rides along in DM prompts.
const NARRATION_BUFFER: usize = 6;

/// Builds a (possibly model-specific) LLM handle for an agent.
pub type LlmFactory = dyn Fn(Option<&str>) -> Arc<dyn LlmPort> + Send + Sync;

/// The session driver.
pub struct SessionCoordinator {
    config: SessionConfig,
    state: GameState,
    mechanics: MechanicsEngine,
    log: EventLog,
    dm: DmAgent,
    actors: Vec<ActorAgent>,
    dice: Box<dyn DiceRoller + Send>,
    cancel: CancellationToken,
    narration_buffer: VecDeque<String>,
}

impl SessionCoordinator {
    pub fn new(
        config: SessionConfig,
        llm_factory: &LlmFactory,
        dice: Box<dyn DiceRoller + Send>,
        call_config: StructuredCallConfig,
        cancel: CancellationToken,
    ) -> Result<Self, SessionError> {
        config.validate()?;

        let session_id = SessionId::new();
        let mut state = GameState::new(session_id);

        for profile in &config.agents.players {
            let character = build_character(
                &profile.name,
                &profile.faction,
                Role::Player,
                &profile.attributes,
                &profile.skills,
            )?
            .with_talents(profile.talents.clone());
            let mut character = character;
            character.offerings = profile.offerings.clone();
            character.ritual_tools = profile.ritual_tools.clone();
            state
                .add_character(character)
                .map_err(|e| SessionError::Config(e.to_string()))?;
        }
        for profile in &config.agents.enemies {
            let mut character = build_character(
                &profile.name,
                &profile.faction,
                Role::Enemy,
                &profile.attributes,
                &profile.skills,
            )?;
            character.initiative_bonus = profile.initiative_bonus;
            character.tactical_profile = Some(profile.tactical_profile.clone());
            state
                .add_character(character)
                .map_err(|e| SessionError::Config(e.to_string()))?;
        }

        let log = EventLog::create(&config.output_dir, session_id)?;

        let dm = DmAgent::new(
            &config.agents.dm,
            llm_factory(config.agents.dm.model.as_deref()),
            call_config.clone(),
        );
        let mut actors = Vec::new();
        for profile in &config.agents.players {
            actors.push(ActorAgent::Player(PlayerAgent::new(
                profile,
                llm_factory(profile.model.as_deref()),
                call_config.clone(),
            )));
        }
        for profile in &config.agents.enemies {
            actors.push(ActorAgent::Enemy(EnemyAgent::new(
                profile,
                llm_factory(profile.model.as_deref()),
                call_config.clone(),
            )));
        }

        Ok(Self {
            config,
            state,
            mechanics: MechanicsEngine::new(),
            log,
            dm,
            actors,
            dice,
            cancel,
            narration_buffer: VecDeque::new(),
        })
    }

    pub fn log_path(&self) -> &std::path::Path {
        self.log.path()
    }

    pub fn session_id(&self) -> SessionId {
        self.state.session_id
    }

    /// Run the session to completion.
    pub async fn run(&mut self) -> Result<SessionOutcome, SessionError> {
        match self.run_inner().await {
            Ok(outcome) => {
                self.finish(outcome, None)?;
                Ok(outcome)
            }
            Err(e) => {
                // Dump what we have; the original error wins over any
                // failure while finishing.
                let _ = self.finish(SessionOutcome::Aborted, Some(e.taxonomy()));
                Err(e)
            }
        }
    }

    async fn run_inner(&mut self) -> Result<SessionOutcome, SessionError> {
        let roster: Vec<serde_json::Value> = self
            .state
            .characters()
            .map(|c| {
                json!({
                    "id": c.id.to_string(),
                    "name": c.name,
                    "faction": c.faction,
                    "role": c.role,
                })
            })
            .collect();
        self.emit(
            EventRecord::new(EventType::SessionStart, self.state.session_id).with_data(json!({
                "schema_version": SCHEMA_VERSION,
                "session_name": self.config.session_name,
                "max_rounds": self.config.max_rounds,
                "characters": roster,
            })),
        )?;

        self.setup_phase().await?;

        for round in 1..=self.config.max_rounds {
            self.check_cancelled()?;
            if let Some(outcome) = self.run_round(round).await? {
                return Ok(outcome);
            }
        }

        tracing::info!(rounds = self.config.max_rounds, "max rounds reached");
        Ok(SessionOutcome::Draw)
    }

    // =========================================================================
    // Setup
    // =========================================================================

    async fn setup_phase(&mut self) -> Result<(), SessionError> {
        self.state.phase = Phase::Setup;
        let theme_hint = self.config.scenario.theme.clone();
        let (draft, call) = self
            .dm
            .generate_scenario(&self.state, theme_hint.as_deref(), &self.cancel)
            .await;
        self.emit_llm_calls("dm", "scenario", None, "setup", &call.attempts, call.used_fallback())?;
        if call.cancelled {
            return Err(SessionError::Cancelled("during scenario generation".into()));
        }

        self.state.scenario = Scenario {
            theme: draft.theme.clone(),
            text: draft.opening.clone(),
        };
        self.emit(
            EventRecord::new(EventType::Scenario, self.state.session_id)
                .with_phase("setup")
                .with_data(json!({
                    "theme": draft.theme,
                    "opening": draft.opening,
                    "fallback": call.used_fallback(),
                })),
        )?;

        for directive in draft.clocks.iter().take(4) {
            self.spawn_clock_from(directive, "setup")?;
        }
        Ok(())
    }

    fn spawn_clock_from(
        &mut self,
        directive: &NewClockDirective,
        phase: &str,
    ) -> Result<(), SessionError> {
        let clock = match SceneClock::new(
            &directive.name,
            directive.maximum.max(1),
            &directive.description,
            &directive.advance_means,
            &directive.regress_means,
            &directive.filled_consequence,
        ) {
            Ok(clock) => clock,
            Err(e) => {
                self.warn(None, format!("rejected clock directive: {e}"))?;
                return Ok(());
            }
        };
        let payload = json!({
            "name": clock.name,
            "maximum": clock.maximum,
            "description": clock.description,
            "advance_means": clock.advance_means,
            "regress_means": clock.regress_means,
            "filled_consequence": clock.filled_consequence,
        });
        if let Err(e) = self.mechanics.spawn_clock(&mut self.state, clock) {
            self.warn(None, format!("clock spawn failed: {e}"))?;
            return Ok(());
        }
        let mut record =
            EventRecord::new(EventType::ClockSpawn, self.state.session_id).with_phase(phase);
        if self.state.round >= 1 {
            record = record.with_round(self.state.round);
        }
        self.emit(record.with_data(payload))?;
        Ok(())
    }

    // =========================================================================
    // One round
    // =========================================================================

    async fn run_round(&mut self, round: u32) -> Result<Option<SessionOutcome>, SessionError> {
        // --- Round start: initiative ---
        self.state.round = round;
        self.state.phase = Phase::RoundStart;
        self.state.defence_tokens.clear();

        let entries = self
            .mechanics
            .roll_initiative(&self.state, &mut *self.dice)
            .map_err(map_mechanics)?;
        self.state.initiative = entries.iter().map(|e| e.id).collect();
        let order: Vec<serde_json::Value> = entries
            .iter()
            .map(|e| {
                let name = self
                    .state
                    .character(e.id)
                    .map(|c| c.name.clone())
                    .unwrap_or_default();
                json!({"character": name, "score": e.score, "roll": e.roll})
            })
            .collect();
        self.emit(
            EventRecord::new(EventType::RoundStart, self.state.session_id)
                .with_round(round)
                .with_data(json!({"initiative": order})),
        )?;

        // --- Declaration phase ---
        let declarations = self.declaration_phase(round).await?;

        // --- Fast phase: reactions ---
        let reactions = self.fast_phase(round, &declarations)?;

        // --- Slow phase: one adjudication at a time ---
        self.state.phase = Phase::Slow;
        for declaration in &declarations {
            self.check_cancelled()?;
            self.adjudicate(round, declaration, &declarations, &reactions)
                .await?;
        }

        // --- Synthesis ---
        let synthesis = self.synthesis_phase(round).await?;

        // --- Cleanup ---
        self.cleanup_phase(round, &synthesis)?;

        Ok(synthesis.session_end)
    }

    /// Request declarations in ascending initiative order, await them as a
    /// set, then hand back the list sorted into descending initiative for
    /// resolution.
    async fn declaration_phase(
        &mut self,
        round: u32,
    ) -> Result<Vec<ActionDeclaration>, SessionError> {
        self.state.phase = Phase::Declaration;
        self.emit(
            EventRecord::new(EventType::DeclarationPhaseStart, self.state.session_id)
                .with_round(round),
        )?;

        // Reorder the actor list itself into ascending initiative so the
        // fan-out dispatches in that order.
        let ascending: Vec<String> = self
            .state
            .initiative
            .iter()
            .rev()
            .filter_map(|id| self.state.character(*id).ok().map(|c| c.name.clone()))
            .collect();
        self.actors.sort_by_key(|a| {
            ascending
                .iter()
                .position(|name| name.eq_ignore_ascii_case(a.character_name()))
                .unwrap_or(usize::MAX)
        });

        let state = &self.state;
        let cancel = &self.cancel;
        let results: Vec<DeclarationResult> = join_all(
            self.actors
                .iter_mut()
                .map(|actor| actor.produce_declaration(state, cancel)),
        )
        .await;

        let mut declarations = Vec::new();
        for result in results {
            let agent_id = result.declaration.agent_id.clone();
            self.emit_llm_calls(
                &agent_id,
                "declaration",
                Some(round),
                "declaration",
                &result.attempts,
                false,
            )?;
            for rejection in &result.rejections {
                self.warn(Some(&agent_id), format!("declaration rejected: {rejection}"))?;
            }
            if result.cancelled {
                return Err(SessionError::Cancelled("during declaration phase".into()));
            }

            let declaration = result.declaration;
            self.emit(
                EventRecord::new(EventType::ActionDeclaration, self.state.session_id)
                    .with_round(round)
                    .with_phase("declaration")
                    .with_agent(&declaration.agent_id)
                    .with_data(json!({
                        "character": declaration.character_name,
                        "intent": declaration.intent,
                        "attribute": declaration.attribute,
                        "skill": declaration.skill,
                        "action_type": declaration.action_type,
                        "is_ritual": declaration.is_ritual,
                        "target": declaration.target,
                        "difficulty_estimate": declaration.difficulty_estimate,
                        "structural_failure": result.structural_failure,
                        "timed_out": result.timed_out,
                    })),
            )?;

            // Defence token allocation: one per character, to one visible foe.
            if let (Some(actor_id), Some(foe)) = (
                self.state.character_id_by_name(&declaration.character_name),
                declaration
                    .defence_token
                    .as_deref()
                    .and_then(|name| self.state.character_id_by_name(name)),
            ) {
                self.state.defence_tokens.insert(actor_id, foe);
            }

            declarations.push(declaration);
        }

        // Descending initiative for resolution order.
        let rank: BTreeMap<String, usize> = self
            .state
            .initiative
            .iter()
            .enumerate()
            .filter_map(|(i, id)| {
                self.state
                    .character(*id)
                    .ok()
                    .map(|c| (c.name.to_ascii_lowercase(), i))
            })
            .collect();
        declarations.sort_by_key(|d| {
            rank.get(&d.character_name.to_ascii_lowercase())
                .copied()
                .unwrap_or(usize::MAX)
        });
        Ok(declarations)
    }

    /// Fast phase: walk descending initiative and register declared
    /// reactions. One reaction slot per agent per round.
    fn fast_phase(
        &mut self,
        round: u32,
        declarations: &[ActionDeclaration],
    ) -> Result<BTreeMap<CharacterId, ReactionKind>, SessionError> {
        self.state.phase = Phase::Fast;
        self.emit(
            EventRecord::new(EventType::FastPhaseStart, self.state.session_id).with_round(round),
        )?;

        let mut reactions = BTreeMap::new();
        for declaration in declarations {
            let Some(kind) = declaration.reaction else {
                continue;
            };
            let Some(actor_id) = self.state.character_id_by_name(&declaration.character_name)
            else {
                continue;
            };
            // Slot already spent this round.
            if reactions.contains_key(&actor_id) {
                continue;
            }
            reactions.insert(actor_id, kind);
            self.emit(
                EventRecord::new(EventType::Reaction, self.state.session_id)
                    .with_round(round)
                    .with_phase("fast")
                    .with_agent(&declaration.agent_id)
                    .with_data(json!({
                        "character": declaration.character_name,
                        "kind": kind,
                    })),
            )?;
        }
        Ok(reactions)
    }

    // =========================================================================
    // Adjudication
    // =========================================================================

    async fn adjudicate(
        &mut self,
        round: u32,
        declaration: &ActionDeclaration,
        all_declarations: &[ActionDeclaration],
        reactions: &BTreeMap<CharacterId, ReactionKind>,
    ) -> Result<(), SessionError> {
        self.emit(
            EventRecord::new(EventType::AdjudicationStart, self.state.session_id)
                .with_round(round)
                .with_phase("slow")
                .with_agent(&declaration.agent_id)
                .with_data(json!({
                    "character": declaration.character_name,
                    "intent": declaration.intent,
                })),
        )?;

        let Some(actor_id) = self.state.character_id_by_name(&declaration.character_name) else {
            self.warn(
                Some(&declaration.agent_id),
                format!("actor '{}' no longer in play", declaration.character_name),
            )?;
            // Still emit a structural resolution so the declaration pairs up.
            return self.emit_structural_resolution(round, declaration);
        };

        // Structural failures skip dice and narration entirely.
        if declaration.intent == "(no response)" || declaration.intent == "(invalid declaration)" {
            return self.emit_structural_resolution(round, declaration);
        }

        // Re-validate: rituals are always Willpower x Astral Arts.
        let mut declaration = declaration.clone();
        if declaration.is_ritual
            && (declaration.attribute != Attribute::Willpower
                || !declaration.skill.eq_ignore_ascii_case(RITUAL_SKILL))
        {
            self.warn(
                Some(&declaration.agent_id),
                format!(
                    "ritual coerced to Willpower x {RITUAL_SKILL} (was {} x {})",
                    declaration.attribute,
                    if declaration.skill.is_empty() {
                        "unskilled"
                    } else {
                        &declaration.skill
                    }
                ),
            )?;
            declaration.attribute = Attribute::Willpower;
            declaration.skill = RITUAL_SKILL.to_string();
        }

        let difficulty = clamp_difficulty(declaration.difficulty_estimate);
        let modifiers = self.situational_modifiers(actor_id, &declaration, reactions);

        // Resolve through mechanics.
        let (mut resolution, ritual_effects, consequence_tags) = if declaration.is_ritual {
            let assistants = self.ritual_assistants(&declaration, all_declarations);
            let ctx = RitualContext {
                has_primary_tool: declaration.ritual_flags.has_primary_tool,
                has_offering: declaration.ritual_flags.has_offering,
                sanctified_altar: declaration.ritual_flags.sanctified_altar,
                assistants,
            };
            let ritual = self
                .mechanics
                .resolve_ritual(
                    &self.state,
                    actor_id,
                    &declaration.intent,
                    difficulty,
                    &ctx,
                    &mut *self.dice,
                )
                .map_err(map_mechanics)?;
            (
                ritual.resolution,
                ritual.void_effects,
                ritual.consequence_tags,
            )
        } else {
            let actor = self
                .state
                .character(actor_id)
                .map_err(|e| SessionError::State(e.to_string()))?;
            let req = CheckRequest {
                intent: declaration.intent.clone(),
                attribute: declaration.attribute,
                skill: declaration.skill.clone(),
                difficulty,
                extra_modifiers: modifiers,
                target: declaration.target.clone(),
            };
            let resolution = self
                .mechanics
                .resolve_check(actor, &req, &mut *self.dice)
                .map_err(map_mechanics)?;
            (resolution, Vec::new(), Vec::new())
        };
        resolution.target = declaration.target.clone();

        // A parried combat action contests the defender; a winning parry
        // negates the damage the narration would otherwise deal the parrier.
        let parry_negated = self.resolve_parry_contest(&declaration, &resolution, reactions)?;

        // DM narration bounded by the mechanical envelope.
        let recent: Vec<String> = self.narration_buffer.iter().cloned().collect();
        let (draft, call) = self
            .dm
            .narrate_resolution(
                &self.state,
                &resolution,
                &declaration.character_name,
                &recent,
                &self.cancel,
            )
            .await;
        self.emit_llm_calls(
            "dm",
            "narration",
            Some(round),
            "slow",
            &call.attempts,
            call.used_fallback(),
        )?;
        if call.cancelled {
            return Err(SessionError::Cancelled("during narration".into()));
        }

        resolution.narration = draft.narration.clone();
        resolution.structured_path = call.value.is_some();

        let mut effects = draft.mechanical_effects.clone();
        effects.extend(ritual_effects);
        if let Some(parrier) = &parry_negated {
            effects.retain(|e| {
                !matches!(
                    e,
                    MechanicalEffect::DamageDealt { target, .. }
                    if target.eq_ignore_ascii_case(parrier)
                )
            });
        }
        resolution.mechanical_effects = effects.clone();

        // Apply all structured effects through mechanics.
        let ctx = EffectContext {
            actor: actor_id,
            narrative_target: draft.narrative_target.clone(),
            at: Utc::now(),
        };
        let applications = self.mechanics.apply_effects(&mut self.state, &ctx, &effects);

        let mut spawned = Vec::new();
        for application in &applications {
            if !application.applied {
                self.warn(
                    Some(&declaration.agent_id),
                    format!("effect {}: {}", application.effect.kind(), application.outcome),
                )?;
            }
            if let Some(name) = &application.spawned_entity {
                if let Some(id) = self.state.character_id_by_name(name) {
                    spawned.push(id.to_string());
                }
            }
            if let Some(clock) = &application.clock_filled {
                self.emit_clock_filled(round, clock)?;
            }
        }

        let applied: Vec<serde_json::Value> = applications
            .iter()
            .map(|a| {
                json!({
                    "effect": a.effect,
                    "applied": a.applied,
                    "outcome": a.outcome,
                })
            })
            .collect();
        self.emit(
            EventRecord::new(EventType::ActionResolution, self.state.session_id)
                .with_round(round)
                .with_phase("slow")
                .with_agent(&declaration.agent_id)
                .with_data(json!({
                    "character": declaration.character_name,
                    "intent": resolution.intent,
                    "attribute": resolution.attribute,
                    "attribute_value": resolution.attribute_value,
                    "skill": resolution.skill,
                    "skill_value": resolution.skill_value,
                    "roll": resolution.roll,
                    "modifier_sum": resolution.modifier_sum,
                    "modifiers": resolution.modifiers,
                    "total": resolution.total,
                    "difficulty": resolution.difficulty,
                    "margin": resolution.margin,
                    "outcome_tier": resolution.outcome_tier.as_str(),
                    "formula": resolution.formula,
                    "target": resolution.target,
                    "narration": resolution.narration,
                    "effects": applied,
                    "consequence_tags": consequence_tags,
                    "structured_path": resolution.structured_path,
                    "llm_fallback": call.used_fallback(),
                    "parry_negated": parry_negated,
                    "spawned": spawned,
                })),
        )?;

        self.push_narration(format!(
            "{}: {}",
            declaration.character_name, resolution.narration
        ));

        self.emit_character_state(round, actor_id)?;

        if let Ok(actor) = self.state.character(actor_id) {
            if aeonisk_domain::is_terminal(actor.void_score) {
                self.warn(
                    Some(&declaration.agent_id),
                    format!("{} has reached Void-Null; terminal handling required", actor.name),
                )?;
            }
        }
        Ok(())
    }

    /// Situational modifiers the coordinator owns: defence tokens and
    /// fast-phase reactions. Condition and injury modifiers are added by the
    /// mechanics engine itself.
    fn situational_modifiers(
        &self,
        actor_id: CharacterId,
        declaration: &ActionDeclaration,
        reactions: &BTreeMap<CharacterId, ReactionKind>,
    ) -> Vec<Modifier> {
        let mut modifiers = Vec::new();

        if let Some(target_id) = declaration
            .target
            .as_deref()
            .and_then(|name| self.state.character_id_by_name(name))
        {
            // The target pointed its Defence Token at this attacker.
            if self.state.defence_tokens.get(&target_id) == Some(&actor_id) {
                modifiers.push(Modifier::new("defence token", -2));
                if reactions.get(&target_id) == Some(&ReactionKind::TokenSpend) {
                    modifiers.push(Modifier::new("token spend", -1));
                }
            }
            if reactions.get(&target_id) == Some(&ReactionKind::Parry) {
                modifiers.push(Modifier::new("parry", -2));
            }
            // A bonded defender extends their token's cover to the target.
            for (reactor_id, kind) in reactions {
                if *kind != ReactionKind::BondedDefence {
                    continue;
                }
                let Ok(reactor) = self.state.character(*reactor_id) else {
                    continue;
                };
                let Some(target_name) = declaration.target.as_deref() else {
                    continue;
                };
                if reactor.bonded_to(target_name)
                    && self.state.defence_tokens.get(reactor_id) == Some(&actor_id)
                {
                    modifiers.push(Modifier::new(
                        format!("bonded defence: {}", reactor.name),
                        -2,
                    ));
                }
            }
        }

        if reactions.get(&actor_id) == Some(&ReactionKind::Overwatch)
            && declaration.action_type == ActionType::Combat
        {
            modifiers.push(Modifier::new("overwatch", 2));
        }

        modifiers
    }

    /// Coordinate-type declarations aimed at the ritualist this round join
    /// the ritual as assistants.
    fn ritual_assistants(
        &self,
        ritualist: &ActionDeclaration,
        all_declarations: &[ActionDeclaration],
    ) -> Vec<CharacterId> {
        all_declarations
            .iter()
            .filter(|d| {
                d.action_type == ActionType::Coordinate
                    && d.target
                        .as_deref()
                        .is_some_and(|t| t.eq_ignore_ascii_case(&ritualist.character_name))
            })
            .filter_map(|d| self.state.character_id_by_name(&d.character_name))
            .collect()
    }

    /// Contested parry: when a combat action strikes a parrying defender,
    /// roll the defender's parry check and compare totals. Natural 20 wins
    /// outright for the higher-ranked side. Returns the parrier's name when
    /// the parry wins.
    fn resolve_parry_contest(
        &mut self,
        declaration: &ActionDeclaration,
        resolution: &aeonisk_domain::ActionResolution,
        reactions: &BTreeMap<CharacterId, ReactionKind>,
    ) -> Result<Option<String>, SessionError> {
        if declaration.action_type != ActionType::Combat {
            return Ok(None);
        }
        let Some(target_id) = declaration
            .target
            .as_deref()
            .and_then(|name| self.state.character_id_by_name(name))
        else {
            return Ok(None);
        };
        if reactions.get(&target_id) != Some(&ReactionKind::Parry) {
            return Ok(None);
        }

        let defender = self
            .state
            .character(target_id)
            .map_err(|e| SessionError::State(e.to_string()))?;
        let parry_req = CheckRequest {
            intent: format!("parry {}", declaration.character_name),
            attribute: Attribute::Dexterity,
            skill: "Melee".to_string(),
            difficulty: resolution.difficulty,
            extra_modifiers: Vec::new(),
            target: None,
        };
        let parry = self
            .mechanics
            .resolve_check(defender, &parry_req, &mut *self.dice)
            .map_err(map_mechanics)?;

        let outcome = contested(
            resolution.total,
            resolution.roll,
            resolution.skill_value,
            parry.total,
            parry.roll,
            parry.skill_value,
        );
        if outcome == ContestOutcome::Opposer {
            tracing::debug!(
                attacker = %declaration.character_name,
                defender = %defender.name,
                "parry wins the contest"
            );
            return Ok(Some(defender.name.clone()));
        }
        Ok(None)
    }

    fn emit_structural_resolution(
        &mut self,
        round: u32,
        declaration: &ActionDeclaration,
    ) -> Result<(), SessionError> {
        self.emit(
            EventRecord::new(EventType::ActionResolution, self.state.session_id)
                .with_round(round)
                .with_phase("slow")
                .with_agent(&declaration.agent_id)
                .with_data(json!({
                    "character": declaration.character_name,
                    "intent": declaration.intent,
                    "outcome_tier": "failure",
                    "margin": 0,
                    "roll": 0,
                    "total": 0,
                    "difficulty": 0,
                    "formula": "(structural failure)",
                    "narration": "",
                    "effects": [],
                    "structured_path": false,
                    "llm_fallback": false,
                })),
        )?;
        if let Some(actor_id) = self.state.character_id_by_name(&declaration.character_name) {
            self.emit_character_state(round, actor_id)?;
        }
        Ok(())
    }

    // =========================================================================
    // Synthesis & cleanup
    // =========================================================================

    async fn synthesis_phase(&mut self, round: u32) -> Result<RoundSynthesis, SessionError> {
        self.state.phase = Phase::Synthesis;
        let recent: Vec<String> = self.narration_buffer.iter().cloned().collect();
        let (synthesis, call) = self
            .dm
            .synthesize_round(&self.state, &recent, &self.cancel)
            .await;
        self.emit_llm_calls(
            "dm",
            "synthesis",
            Some(round),
            "synthesis",
            &call.attempts,
            call.used_fallback(),
        )?;
        if call.cancelled {
            return Err(SessionError::Cancelled("during synthesis".into()));
        }

        // Bus hop: plain JSON value out, typed struct back in.
        let value = serde_json::to_value(&synthesis)
            .map_err(|e| SessionError::State(format!("synthesis serialize: {e}")))?;
        let synthesis: RoundSynthesis = serde_json::from_value(value)
            .map_err(|e| SessionError::State(format!("synthesis deserialize: {e}")))?;

        for delta in &synthesis.clock_updates {
            match self
                .mechanics
                .apply_clock_delta(&mut self.state, &delta.name, delta.delta)
            {
                Ok(Some(filled)) => self.emit_clock_filled(round, &filled)?,
                Ok(None) => {}
                Err(e) => self.warn(None, format!("clock directive: {e}"))?,
            }
        }
        for directive in &synthesis.new_clocks {
            self.spawn_clock_from(directive, "synthesis")?;
        }
        for name in &synthesis.resolved_clocks {
            match self.state.clock_by_name_mut(name) {
                Some(clock) => clock.mark_triggered(),
                None => self.warn(None, format!("resolved unknown clock '{name}'"))?,
            }
        }

        self.emit(
            EventRecord::new(EventType::RoundSynthesis, self.state.session_id)
                .with_round(round)
                .with_phase("synthesis")
                .with_agent("dm")
                .with_data(json!({
                    "story_advancement": synthesis.story_advancement,
                    "clock_updates": synthesis.clock_updates,
                    "new_clocks": synthesis.new_clocks.len(),
                    "resolved_clocks": synthesis.resolved_clocks,
                    "pivot": synthesis.pivot,
                    "session_end": synthesis.session_end,
                    "llm_fallback": call.used_fallback(),
                })),
        )?;
        self.push_narration(synthesis.story_advancement.clone());

        let clocks: Vec<String> = self.state.clocks.iter().map(|c| c.display()).collect();
        self.emit(
            EventRecord::new(EventType::RoundSummary, self.state.session_id)
                .with_round(round)
                .with_data(json!({
                    "clocks": clocks,
                    "characters": self.state.characters().count(),
                })),
        )?;

        Ok(synthesis)
    }

    fn cleanup_phase(
        &mut self,
        round: u32,
        synthesis: &RoundSynthesis,
    ) -> Result<(), SessionError> {
        self.state.phase = Phase::Cleanup;

        // Pivot first: it archives every filled clock and re-frames the
        // scenario for all agents.
        if let Some(theme) = &synthesis.pivot {
            let archived = self.mechanics.pivot_archive(&mut self.state);
            for name in &archived {
                self.emit_clock_archived(round, name, "scenario pivot")?;
            }
            self.state.scenario = Scenario {
                theme: theme.clone(),
                text: synthesis.story_advancement.clone(),
            };
            let update = ScenarioUpdate {
                theme: theme.clone(),
                text: synthesis.story_advancement.clone(),
                round,
            };
            // Failing to broadcast leaves agents chasing stale objectives;
            // every agent gets the update and an event records the delivery.
            for i in 0..self.actors.len() {
                self.actors[i].scenario_update(&update);
                let agent_id = self.actors[i].agent_id().to_string();
                self.emit(
                    EventRecord::new(EventType::ScenarioUpdate, self.state.session_id)
                        .with_round(round)
                        .with_agent(agent_id)
                        .with_data(json!({"theme": theme})),
                )?;
            }
        }

        let report = self.mechanics.cleanup(&mut self.state);
        for (name, reason) in &report.archived_clocks {
            self.emit_clock_archived(round, name, reason)?;
        }
        for (character, conditions) in &report.expired_conditions {
            tracing::debug!(character = %character, ?conditions, "conditions expired");
        }
        Ok(())
    }

    // =========================================================================
    // Event helpers
    // =========================================================================

    fn emit(&mut self, record: EventRecord) -> Result<u64, SessionError> {
        self.log.emit(record)
    }

    fn warn(&mut self, agent_id: Option<&str>, message: String) -> Result<(), SessionError> {
        tracing::warn!(agent = agent_id.unwrap_or("-"), "{message}");
        let mut record = EventRecord::new(EventType::Warning, self.state.session_id)
            .with_data(json!({"message": message}));
        if self.state.round >= 1 {
            record = record.with_round(self.state.round);
        }
        if let Some(agent_id) = agent_id {
            record = record.with_agent(agent_id);
        }
        self.emit(record)?;
        Ok(())
    }

    fn emit_llm_calls(
        &mut self,
        agent_id: &str,
        purpose: &str,
        round: Option<u32>,
        phase: &str,
        attempts: &[LlmAttempt],
        fallback: bool,
    ) -> Result<(), SessionError> {
        for (i, attempt) in attempts.iter().enumerate() {
            let is_last = i + 1 == attempts.len();
            let mut data = json!({
                "purpose": purpose,
                "attempt": i + 1,
                "ok": attempt.ok,
                "validation_failed": attempt.validation_failed,
                "timed_out": attempt.timed_out,
                "cancelled": attempt.cancelled,
                "latency_ms": attempt.latency_ms,
            });
            if let Some(usage) = &attempt.usage {
                data["usage"] = json!(usage);
            }
            if let Some(error) = &attempt.transport_error {
                data["transport_error"] = json!(error);
            }
            if attempt.validation_failed {
                // Failed raw output is retained: it is training signal.
                data["raw_text"] = json!(attempt.raw_text);
            }
            if is_last && fallback {
                data["llm_fallback"] = json!(true);
            }
            let mut record = EventRecord::new(EventType::LlmCall, self.state.session_id)
                .with_phase(phase)
                .with_agent(agent_id)
                .with_data(data);
            if let Some(round) = round {
                record = record.with_round(round);
            }
            self.emit(record)?;
        }
        Ok(())
    }

    fn emit_character_state(
        &mut self,
        round: u32,
        character_id: CharacterId,
    ) -> Result<(), SessionError> {
        let snapshot = self
            .state
            .snapshot(character_id)
            .map_err(|e| SessionError::State(e.to_string()))?;
        self.emit(
            EventRecord::new(EventType::CharacterState, self.state.session_id)
                .with_round(round)
                .with_data(json!({"character": snapshot})),
        )?;
        Ok(())
    }

    fn emit_clock_filled(&mut self, round: u32, name: &str) -> Result<(), SessionError> {
        let display = self
            .state
            .clock_by_name(name)
            .map(|c| c.display())
            .unwrap_or_else(|| name.to_string());
        let consequence = self
            .state
            .clock_by_name(name)
            .map(|c| c.filled_consequence.clone())
            .unwrap_or_default();
        self.emit(
            EventRecord::new(EventType::ClockFilled, self.state.session_id)
                .with_round(round)
                .with_data(json!({
                    "name": name,
                    "display": display,
                    "filled_consequence": consequence,
                })),
        )?;
        Ok(())
    }

    fn emit_clock_archived(
        &mut self,
        round: u32,
        name: &str,
        reason: &str,
    ) -> Result<(), SessionError> {
        self.emit(
            EventRecord::new(EventType::ClockArchived, self.state.session_id)
                .with_round(round)
                .with_data(json!({"name": name, "reason": reason})),
        )?;
        Ok(())
    }

    fn push_narration(&mut self, line: String) {
        if line.trim().is_empty() {
            return;
        }
        self.narration_buffer.push_back(line);
        while self.narration_buffer.len() > NARRATION_BUFFER {
            self.narration_buffer.pop_front();
        }
    }

    fn check_cancelled(&self) -> Result<(), SessionError> {
        if self.cancel.is_cancelled() {
            Err(SessionError::Cancelled("external cancellation".into()))
        } else {
            Ok(())
        }
    }

    /// Final events and the YAML companion transcript.
    fn finish(
        &mut self,
        outcome: SessionOutcome,
        abort_reason: Option<&str>,
    ) -> Result<(), SessionError> {
        self.state.phase = Phase::Ended;
        if abort_reason.is_none() {
            let clocks: Vec<String> = self
                .state
                .clocks
                .iter()
                .map(|c| c.display())
                .chain(
                    self.state
                        .archived_clocks
                        .iter()
                        .map(|a| format!("{} (archived: {})", a.clock.display(), a.reason)),
                )
                .collect();
            self.emit(
                EventRecord::new(EventType::MissionDebrief, self.state.session_id).with_data(
                    json!({
                        "rounds_played": self.state.round,
                        "clocks": clocks,
                        "story": self.narration_buffer.iter().cloned().collect::<Vec<_>>(),
                    }),
                ),
            )?;
        }

        let mut data = json!({
            "outcome": outcome.as_str(),
            "rounds_played": self.state.round,
        });
        if let Some(reason) = abort_reason {
            data["reason"] = json!(reason);
        }
        self.emit(EventRecord::new(EventType::SessionEnd, self.state.session_id).with_data(data))?;

        let records = read_log(self.log.path())?;
        let transcript = TranscriptDoc::from_records(&records);
        let yaml_path = self.log.path().with_extension("yaml");
        transcript.write_yaml(&yaml_path)?;
        Ok(())
    }
}

fn build_character(
    name: &str,
    faction: &str,
    role: Role,
    attributes: &BTreeMap<String, i32>,
    skills: &BTreeMap<String, u8>,
) -> Result<Character, SessionError> {
    let mut values = Vec::new();
    for (attr, value) in attributes {
        let attribute =
            Attribute::parse(attr).map_err(|e| SessionError::Config(e.to_string()))?;
        values.push((attribute, *value));
    }
    let skills = skills.iter().map(|(name, rank)| {
        let normalized = aeonisk_domain::normalize_skill(name);
        let canonical = if normalized.name.is_empty() {
            name.clone()
        } else {
            normalized.name
        };
        (canonical, *rank)
    });
    Ok(Character::new(name, faction, role)
        .with_attributes(AttributeBlock::from_values(values))
        .with_skills(skills))
}

fn map_mechanics(failure: MechanicsFailure) -> SessionError {
    match failure {
        MechanicsFailure::Fatal(e) => SessionError::Mechanics(e),
        MechanicsFailure::Domain(e) => SessionError::State(e.to_string()),
    }
}
