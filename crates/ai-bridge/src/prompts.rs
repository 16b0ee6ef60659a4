//! Prompt kernel - per-kind templates rendered with minijinja
//!
//! Each schema kind has a system preamble and a user template that wraps
//! the assembled context with task instructions and the output schema. The
//! templates are compiled once at startup.

use crate::error::Result;
use crate::kind::{RequestKind, SchemaKind};
use crate::response::Atmosphere;
use minijinja::{context, Environment};

const ROOM_SYSTEM: &str = "You narrate a grim tile-based dungeon crawler. You write short, \
concrete, sensory prose. You respond with ONLY a JSON object, no markdown, no commentary.";

const ROOM_USER: &str = r#"{{ context }}

Write the room description a player sees on entering. Two to four sentences, second person, present tense. Do not invent exits or items beyond what is listed.

Respond with ONLY this JSON object:
{"description": "...", "atmosphere": "one of: {{ atmospheres }}", "points_of_interest": ["optional, up to 3"], "audio_hint": "optional short ambience cue"}"#;

const DIALOGUE_SYSTEM: &str = "You voice non-player characters in a grim dungeon crawler. You \
stay in character, honor the NPC's speech style and disposition, and never break the fourth \
wall. You respond with ONLY a JSON object.";

const DIALOGUE_USER: &str = r#"{{ context }}

Write the NPC's reply in their voice. Keep it under 80 words.

Respond with ONLY this JSON object:
{"dialogue": "...", "emotion": "one of: neutral, friendly, wary, hostile, afraid, amused, solemn", "offers": [{"item": "...", "price": 0}], "reveals": ["facts the NPC shares"], "quest_trigger": null, "memory_update": "one line the NPC will remember, or null"}
Omit optional fields you do not need. quest_trigger must be one of: {{ quest_templates }} or null."#;

const COMBAT_SYSTEM: &str = "You narrate combat beats in a grim dungeon crawler. One or two \
sentences, visceral but not gratuitous. You respond with ONLY a JSON object.";

const COMBAT_USER: &str = r#"{{ context }}

Narrate this exchange.

Respond with ONLY this JSON object:
{"narrative": "...", "crit_flavor": "extra flourish if the hit was critical, else null"}"#;

const QUEST_SYSTEM: &str = "You design small, concrete side quests for a tile-based dungeon \
crawler. Objectives must be achievable with: travel, kill, fetch, deliver, pray. You respond \
with ONLY a JSON object.";

const QUEST_USER: &str = r#"{{ context }}

Design one quest this character could offer.

Respond with ONLY this JSON object:
{"title": "...", "description": "...", "objectives": ["2 to 4 short imperative steps"], "rewards": {"gold": 0, "xp": 0, "items": []}}"#;

const SUMMARY_SYSTEM: &str = "You condense game event logs into terse narrative memory. You \
preserve names, places, and consequences. You respond with ONLY a JSON object.";

const SUMMARY_USER: &str = r#"{{ context }}

Condense these events into at most {{ token_budget }} tokens of summary. Keep proper nouns.

Respond with ONLY this JSON object:
{"summary": "..."}"#;

/// A rendered prompt pair, ready for the LLM client.
#[derive(Debug, Clone)]
pub struct RenderedPrompt {
    pub system: String,
    pub user: String,
}

pub struct PromptKernel {
    env: Environment<'static>,
}

impl PromptKernel {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("room_description.user", ROOM_USER)?;
        env.add_template("npc_dialogue.user", DIALOGUE_USER)?;
        env.add_template("combat_narration.user", COMBAT_USER)?;
        env.add_template("quest_generation.user", QUEST_USER)?;
        env.add_template("summarization.user", SUMMARY_USER)?;
        Ok(Self { env })
    }

    pub fn system_prompt(&self, kind: RequestKind) -> &'static str {
        match kind.schema_kind() {
            SchemaKind::RoomDescription => ROOM_SYSTEM,
            SchemaKind::NpcDialogue => DIALOGUE_SYSTEM,
            SchemaKind::CombatNarration => COMBAT_SYSTEM,
            SchemaKind::QuestGeneration => QUEST_SYSTEM,
            SchemaKind::Summarization => SUMMARY_SYSTEM,
        }
    }

    /// Render the user prompt for a kind around the assembled context.
    pub fn render(
        &self,
        kind: RequestKind,
        context_text: &str,
        summary_token_budget: usize,
    ) -> Result<RenderedPrompt> {
        let name = format!("{}.user", kind.schema_kind_label());
        let template = self.env.get_template(&name)?;
        let atmospheres = Atmosphere::ALL.map(|a| a.label()).join(", ");
        let quest_templates = crawler_core::quest::QUEST_TEMPLATES.join(", ");
        let user = template.render(context! {
            context => context_text,
            atmospheres => atmospheres,
            quest_templates => quest_templates,
            token_budget => summary_token_budget,
        })?;
        Ok(RenderedPrompt { system: self.system_prompt(kind).to_string(), user })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_kinds_render() {
        let kernel = PromptKernel::new().unwrap();
        for kind in RequestKind::ALL {
            let prompt = kernel.render(kind, "the context body", 256).unwrap();
            assert!(prompt.user.contains("the context body"), "{} lost its context", kind.label());
            assert!(prompt.user.contains("JSON object"));
            assert!(!prompt.system.is_empty());
        }
    }

    #[test]
    fn test_room_prompt_lists_atmospheres() {
        let kernel = PromptKernel::new().unwrap();
        let prompt = kernel.render(RequestKind::RoomDescription, "ctx", 256).unwrap();
        assert!(prompt.user.contains("gloomy"));
        assert!(prompt.user.contains("sacred"));
    }

    #[test]
    fn test_dialogue_prompt_lists_quest_templates() {
        let kernel = PromptKernel::new().unwrap();
        let prompt = kernel.render(RequestKind::NpcDialogue, "ctx", 256).unwrap();
        assert!(prompt.user.contains("lost_relic"));
    }
}
