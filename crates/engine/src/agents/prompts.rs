//! Prompt assembly for the three agent roles
//!
//! All prompt text is built here so the coordinator and agent runtimes stay
//! free of string plumbing. Agents only ever see rendered snapshots of game
//! state, never the state itself.

use aeonisk_domain::{Character, GameState, Role, CATALOG};
use aeonisk_shared::{ActionDeclaration, Personality};

use aeonisk_domain::ActionResolution;

/// System prompt for the DM agent.
pub fn dm_system_prompt(override_prompt: Option<&str>) -> String {
    if let Some(custom) = override_prompt {
        return custom.to_string();
    }
    "You are the Dungeon Master for an Aeonisk YAGS session. You narrate \
     outcomes the mechanics engine has already decided - never contradict \
     the given tier or margin. Keep narration to 2-4 sentences, grounded \
     and concrete. When asked for JSON, respond with a single JSON object \
     and nothing else."
        .to_string()
}

/// System prompt for a player agent.
pub fn player_system_prompt(character: &Character, personality: &Personality, goals: &[String]) -> String {
    let mut prompt = format!(
        "You are playing {name}, of the {faction} faction, in an Aeonisk \
         YAGS session. Declare one action per round as a single JSON \
         object and nothing else.\n\n{personality}",
        name = character.name,
        faction = character.faction,
        personality = personality_lines(personality),
    );
    if !goals.is_empty() {
        prompt.push_str("\nYour goals:\n");
        for goal in goals {
            prompt.push_str(&format!("- {goal}\n"));
        }
    }
    prompt
}

/// System prompt for an enemy agent.
pub fn enemy_system_prompt(character: &Character, tactical_profile: &str) -> String {
    format!(
        "You are running {name}, an enemy combatant in an Aeonisk YAGS \
         session. Tactical doctrine: {profile}. Fight to your doctrine, \
         not to the death of drama. Declare one action per round as a \
         single JSON object and nothing else.",
        name = character.name,
        profile = tactical_profile,
    )
}

fn personality_lines(p: &Personality) -> String {
    format!(
        "Temperament (1-10): risk {risk}, void curiosity {void}, faction \
         loyalty {loyalty}, ritual conservatism {ritual}, social \
         aggressiveness {social}; bonds: {bonds:?}.",
        risk = p.risk_tolerance,
        void = p.void_curiosity,
        loyalty = p.faction_loyalty,
        ritual = p.ritual_conservatism,
        social = p.social_aggressiveness,
        bonds = p.bond_preference,
    )
}

/// Render all clock states with full semantics. Both players and the DM see
/// this, so agents can reason about consequences before acting.
pub fn render_clocks(state: &GameState) -> String {
    if state.clocks.is_empty() {
        return "No active scene clocks.".to_string();
    }
    let mut out = String::from("Scene clocks:\n");
    for clock in &state.clocks {
        out.push_str(&format!(
            "- {display}: {description}\n  advances when: {advance}\n  \
             regresses when: {regress}\n  when filled: {consequence}\n",
            display = clock.display(),
            description = clock.description,
            advance = clock.advance_means,
            regress = clock.regress_means,
            consequence = clock.filled_consequence,
        ));
        if let Some(urgency) = clock.urgency() {
            out.push_str(&format!("  URGENCY: {urgency:?} (consequence unanswered)\n"));
        }
    }
    out
}

/// DM view of every character's state.
pub fn render_characters(state: &GameState) -> String {
    let mut out = String::new();
    for c in state.characters() {
        let role = match c.role {
            Role::Player => "PC",
            Role::Enemy => "Enemy",
        };
        out.push_str(&format!(
            "- {name} ({role}, {faction}) void {void} ({corruption}), \
             soulcredit {soulcredit}, wounds {wounds}, stuns {stuns}",
            name = c.name,
            faction = c.faction,
            void = c.void_score,
            corruption = c.corruption_label(),
            soulcredit = c.soulcredit,
            wounds = c.wounds,
            stuns = c.stuns,
        ));
        if !c.conditions.is_empty() {
            let names: Vec<&str> = c.conditions.iter().map(|x| x.name.as_str()).collect();
            out.push_str(&format!(", conditions: {}", names.join(", ")));
        }
        out.push('\n');
    }
    out
}

/// What an actor can see of the other combatants: names and range bands.
pub fn render_positions(state: &GameState, viewer: &Character) -> String {
    let mut out = String::new();
    for other in state.characters() {
        if other.id == viewer.id {
            continue;
        }
        out.push_str(&format!(
            "- {name} ({faction}): {range}\n",
            name = other.name,
            faction = other.faction,
            range = viewer.range_to(other.id),
        ));
    }
    if out.is_empty() {
        out.push_str("Nobody else in the scene.\n");
    }
    out
}

/// Tiered skill display: full detail for skills the character has, brief
/// one-liners for the rest of the catalog so the agent knows what exists.
pub fn tiered_skills(character: &Character) -> String {
    let mut owned = String::new();
    let mut rest = String::new();

    for info in CATALOG {
        let rank = character.skill_rank(info.name);
        if rank > 0 {
            owned.push_str(&format!(
                "- {name} {rank} ({attribute}): {description}\n  uses: {uses}\n  pairing: {pairing}\n",
                name = info.name,
                attribute = info.attribute,
                description = info.description,
                uses = info.use_cases.join("; "),
                pairing = info.pairing,
            ));
        } else {
            rest.push_str(&format!(
                "- {name} ({attribute}): {description}\n",
                name = info.name,
                attribute = info.attribute,
                description = info.description,
            ));
        }
    }

    let mut out = String::new();
    if owned.is_empty() {
        out.push_str("Your skills: none trained (unskilled attempts take a -5).\n");
    } else {
        out.push_str("Your skills:\n");
        out.push_str(&owned);
    }
    out.push_str("\nOther skills anyone may attempt (unskilled, -5):\n");
    out.push_str(&rest);
    out
}

/// Attribute block for the sheet section of a player prompt.
pub fn render_sheet(character: &Character) -> String {
    let attrs: Vec<String> = character
        .attributes
        .iter()
        .map(|(a, v)| format!("{a} {v}"))
        .collect();
    let mut out = format!("Attributes: {}\n", attrs.join(", "));
    if !character.talents.is_empty() {
        let talents: Vec<String> = character
            .talents
            .iter()
            .map(|(name, value)| format!("{name} {value}"))
            .collect();
        out.push_str(&format!("Talents: {}\n", talents.join(", ")));
    }
    out.push_str(&format!(
        "Void {void} ({corruption}), soulcredit {soulcredit}, wounds {wounds}, stuns {stuns}\n",
        void = character.void_score,
        corruption = character.corruption_label(),
        soulcredit = character.soulcredit,
        wounds = character.wounds,
        stuns = character.stuns,
    ));
    if !character.offerings.is_empty() {
        out.push_str(&format!("Offerings: {}\n", character.offerings.join(", ")));
    }
    if !character.ritual_tools.is_empty() {
        out.push_str(&format!(
            "Ritual tools: {}\n",
            character.ritual_tools.join(", ")
        ));
    }
    if !character.bonds.is_empty() {
        let bonds: Vec<String> = character
            .bonds
            .iter()
            .map(|b| format!("{} -> {} (level {})", b.bond_type, b.target, b.level))
            .collect();
        out.push_str(&format!("Bonds: {}\n", bonds.join("; ")));
    }
    out
}

/// Setup-phase scenario request for the DM.
pub fn scenario_request(state: &GameState, theme_hint: Option<&str>) -> String {
    let hint = theme_hint
        .map(|t| format!("Requested theme: {t}\n"))
        .unwrap_or_default();
    format!(
        "Generate the opening scenario.\n{hint}Cast:\n{cast}\n\
         Respond with JSON: {{\"theme\": string, \"opening\": string, \
         \"clocks\": [{{\"name\", \"maximum\", \"description\", \
         \"advance_means\", \"regress_means\", \"filled_consequence\"}}]}}.\n\
         Provide 2 to 4 clocks, each with every field filled.",
        cast = render_characters(state),
    )
}

/// Per-action narration request: the envelope is already decided.
pub fn narration_request(
    state: &GameState,
    resolution: &ActionResolution,
    recent_narration: &[String],
) -> String {
    let recent = if recent_narration.is_empty() {
        String::new()
    } else {
        format!("Recent narration:\n{}\n\n", recent_narration.join("\n"))
    };
    let target_line = resolution
        .target
        .as_deref()
        .map(|t| format!("Declared target: {t}\n"))
        .unwrap_or_default();
    format!(
        "{recent}Scene:\n{clocks}\n{characters}\n\
         Narrate this resolved action within its mechanical envelope.\n\
         Action: {intent}\nCheck: {formula} = {total} vs DC {difficulty} \
         (margin {margin:+}, tier {tier})\n{target_line}\
         Respond with JSON: {{\"narration\": string, \
         \"mechanical_effects\": [effect objects], \
         \"narrative_target\": string or null}}.\n\
         Effect objects use {{\"effect\": \"void_change\"|\"soulcredit_change\"|\
         \"clock_update\"|\"condition_applied\"|\"damage_dealt\"|\
         \"offering_consumed\"|\"bond_change\"|\"entity_spawn\"|\"entity_remove\", ...}}.\n\
         Status effects must name a target; never apply them to the actor \
         unless the actor is the declared target.",
        clocks = render_clocks(state),
        characters = render_characters(state),
        intent = resolution.intent,
        formula = resolution.formula,
        total = resolution.total,
        difficulty = resolution.difficulty,
        margin = resolution.margin,
        tier = resolution.outcome_tier,
    )
}

/// End-of-round synthesis request.
pub fn synthesis_request(state: &GameState, recent_narration: &[String]) -> String {
    format!(
        "Round {round} is resolved.\n{clocks}\n{characters}\n\
         Recent narration:\n{recent}\n\
         Synthesize the round. Respond with JSON: \
         {{\"story_advancement\": string, \
         \"clock_updates\": [{{\"name\", \"delta\", \"reason\"}}], \
         \"new_clocks\": [clock objects], \
         \"resolved_clocks\": [names whose filled consequence your story resolved], \
         \"pivot\": new theme string or null, \
         \"session_end\": \"VICTORY\"|\"DEFEAT\"|\"DRAW\" or null}}.",
        round = state.round,
        clocks = render_clocks(state),
        characters = render_characters(state),
        recent = recent_narration.join("\n"),
    )
}

/// Declaration request for a player or enemy agent.
pub fn declaration_request(
    state: &GameState,
    character: &Character,
    recent_intents: &[String],
    rejection: Option<&str>,
) -> String {
    let rejection_block = rejection
        .map(|r| format!("\nYour previous declaration was rejected: {r}\nFix it.\n"))
        .unwrap_or_default();
    let recent = if recent_intents.is_empty() {
        String::new()
    } else {
        format!(
            "Your recent actions (do not repeat them):\n- {}\n",
            recent_intents.join("\n- ")
        )
    };
    format!(
        "Round {round}. Scenario: {theme}\n{scenario}\n\n{clocks}\n\
         Visible entities:\n{positions}\n{sheet}\n{skills}\n{recent}{rejection_block}\
         Declare one action. Respond with JSON: {{\"intent\": string, \
         \"description\": string, \"attribute\": one of the eight, \
         \"skill\": skill name or \"\", \"difficulty_estimate\": number, \
         \"difficulty_justification\": string, \"action_type\": \
         \"investigate\"|\"social\"|\"combat\"|\"ritual\"|\"technical\"|\
         \"movement\"|\"coordinate\"|\"other\", \"is_ritual\": bool, \
         \"target\": entity name or null, \"ritual_flags\": \
         {{\"has_primary_tool\", \"has_offering\", \"sanctified_altar\"}}, \
         \"defence_token\": foe name or null, \"reaction\": \
         \"parry\"|\"overwatch\"|\"token_spend\"|\"bonded_defence\" or null}}.",
        round = state.round,
        theme = state.scenario.theme,
        scenario = state.scenario.text,
        clocks = render_clocks(state),
        positions = render_positions(state, character),
        sheet = render_sheet(character),
        skills = tiered_skills(character),
    )
}

/// Summarize a declaration for prompt history and events.
pub fn declaration_summary(declaration: &ActionDeclaration) -> String {
    let skill = if declaration.skill.is_empty() {
        "unskilled".to_string()
    } else {
        declaration.skill.clone()
    };
    format!(
        "{} ({} / {})",
        declaration.intent, declaration.attribute, skill
    )
}

/// JSON schema hint for declaration calls.
pub fn declaration_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "required": ["intent", "attribute", "action_type"],
        "properties": {
            "intent": {"type": "string"},
            "description": {"type": "string"},
            "attribute": {"type": "string"},
            "skill": {"type": "string"},
            "difficulty_estimate": {"type": "integer"},
            "difficulty_justification": {"type": "string"},
            "action_type": {"type": "string"},
            "is_ritual": {"type": "boolean"},
            "target": {"type": ["string", "null"]},
            "ritual_flags": {"type": "object"},
            "defence_token": {"type": ["string", "null"]},
            "reaction": {"type": ["string", "null"]}
        }
    })
}

/// JSON schema hint for narration calls.
pub fn narration_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "required": ["narration"],
        "properties": {
            "narration": {"type": "string"},
            "mechanical_effects": {"type": "array"},
            "narrative_target": {"type": ["string", "null"]}
        }
    })
}

/// JSON schema hint for synthesis calls.
pub fn synthesis_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "required": ["story_advancement"],
        "properties": {
            "story_advancement": {"type": "string"},
            "clock_updates": {"type": "array"},
            "new_clocks": {"type": "array"},
            "resolved_clocks": {"type": "array"},
            "pivot": {"type": ["string", "null"]},
            "session_end": {"type": ["string", "null"]}
        }
    })
}

/// JSON schema hint for scenario generation.
pub fn scenario_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "required": ["theme", "opening", "clocks"],
        "properties": {
            "theme": {"type": "string"},
            "opening": {"type": "string"},
            "clocks": {"type": "array", "minItems": 2, "maxItems": 4}
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use aeonisk_domain::{Character, GameState, Role, SceneClock, SessionId};

    fn sample_state() -> GameState {
        let mut state = GameState::new(SessionId::new());
        let riven = Character::new("Riven", "Concord", Role::Player)
            .with_skills([("Awareness".to_string(), 3u8)]);
        state.add_character(riven).expect("add");
        state
            .add_character(Character::new("Raider", "Scrap", Role::Enemy))
            .expect("add");
        state.clocks.push(
            SceneClock::new(
                "Grid Collapse",
                6,
                "district power failing",
                "sabotage",
                "repairs",
                "blackout",
            )
            .expect("clock"),
        );
        state
    }

    #[test]
    fn test_tiered_skills_splits_owned_and_rest() {
        let state = sample_state();
        let riven = state.character_by_name("Riven").expect("riven");
        let text = tiered_skills(riven);
        // Owned skill gets detail
        assert!(text.contains("Awareness 3"));
        assert!(text.contains("pairing:"));
        // Unowned skills get the brief tier
        assert!(text.contains("Astral Arts (Willpower)"));
        assert!(!text.contains("Astral Arts 0"));
    }

    #[test]
    fn test_clock_rendering_includes_semantics() {
        let state = sample_state();
        let text = render_clocks(&state);
        assert!(text.contains("Grid Collapse [0/6]"));
        assert!(text.contains("advances when: sabotage"));
        assert!(text.contains("when filled: blackout"));
    }

    #[test]
    fn test_declaration_request_carries_theme_and_rejection() {
        let mut state = sample_state();
        state.scenario.theme = "Survival".to_string();
        let riven = state.character_by_name("Riven").expect("riven");
        let prompt = declaration_request(&state, riven, &[], Some("unknown attribute 'Wits'"));
        assert!(prompt.contains("Scenario: Survival"));
        assert!(prompt.contains("rejected: unknown attribute 'Wits'"));
    }

    #[test]
    fn test_positions_exclude_viewer() {
        let state = sample_state();
        let riven = state.character_by_name("Riven").expect("riven");
        let text = render_positions(&state, riven);
        assert!(text.contains("Raider"));
        assert!(!text.contains("- Riven"));
    }
}
