//! Context assembly - what the model sees
//!
//! Gathers a bounded slice of state and memory into a prompt-ready payload
//! under a hard token budget, and produces the normalized canonical form
//! the fingerprint hashes. Sections are ranked; when the budget runs out,
//! lower-ranked sections are dropped whole.

use crate::error::{BridgeError, Result};
use crate::fingerprint::{canonical_json, Fingerprint};
use crate::kind::RequestKind;
use crawler_core::Coord;
use serde::Serialize;
use serde_json::json;
use tiktoken_rs::{p50k_base, CoreBPE};

/// Kind-specific tick state for one request.
#[derive(Debug, Clone, Serialize)]
pub enum RequestPayload {
    RoomDescription {
        coord: Coord,
        biome: String,
        features: Vec<String>,
        exits: Vec<String>,
        items: Vec<String>,
        enemies: Vec<String>,
        npcs: Vec<String>,
    },
    NpcDialogue {
        npc_id: String,
        npc_name: String,
        archetype: String,
        traits: Vec<String>,
        speech_style: String,
        goals: Vec<String>,
        relationship_bucket: i32,
        memories: Vec<String>,
        player_name: String,
        player_message: String,
    },
    CombatNarration {
        attacker: String,
        defender: String,
        action: String,
        damage: i32,
        crit: bool,
        killed: bool,
        biome: String,
    },
    QuestGeneration {
        biome: String,
        zone_level: u32,
        giver_archetype: String,
    },
    Summarization {
        events: Vec<String>,
        upto_event_id: u64,
    },
}

impl RequestPayload {
    /// The projection of this payload that participates in the request
    /// fingerprint. Volatile context (NPC verbatim memories, narrative
    /// window, turn index) stays out so logically equivalent requests
    /// collide; dialogue identity includes the relationship bucket and
    /// goals, which is exactly what invalidates stale cached lines.
    pub fn fingerprint_value(&self) -> serde_json::Value {
        match self {
            RequestPayload::RoomDescription { coord, biome, features, exits, items, enemies, npcs } => {
                json!({
                    "coord": coord,
                    "biome": biome,
                    "features": features,
                    "exits": exits,
                    "items": items,
                    "enemies": enemies,
                    "npcs": npcs,
                })
            }
            RequestPayload::NpcDialogue {
                npc_id,
                archetype,
                relationship_bucket,
                goals,
                player_name,
                player_message,
                ..
            } => json!({
                "npc_id": npc_id,
                "archetype": archetype,
                "relationship_bucket": relationship_bucket,
                "goals": goals,
                "player_name": player_name,
                "player_message": player_message,
            }),
            RequestPayload::CombatNarration { attacker, defender, action, damage, crit, killed, biome } => {
                json!({
                    "attacker": attacker,
                    "defender": defender,
                    "action": action,
                    "damage": damage,
                    "crit": crit,
                    "killed": killed,
                    "biome": biome,
                })
            }
            RequestPayload::QuestGeneration { biome, zone_level, giver_archetype } => json!({
                "biome": biome,
                "zone_level": zone_level,
                "giver_archetype": giver_archetype,
            }),
            RequestPayload::Summarization { events, upto_event_id } => json!({
                "events": events,
                "upto_event_id": upto_event_id,
            }),
        }
    }

    /// Human-readable rendering for the prompt body.
    fn render(&self) -> String {
        match self {
            RequestPayload::RoomDescription { coord, biome, features, exits, items, enemies, npcs } => {
                let mut lines = vec![
                    format!("Room at {coord} in the {biome}."),
                    format!("Exits: {}.", join_or_none(exits)),
                ];
                if !features.is_empty() {
                    lines.push(format!("Notable features: {}.", features.join(", ")));
                }
                if !items.is_empty() {
                    lines.push(format!("Items on the ground: {}.", items.join(", ")));
                }
                if !enemies.is_empty() {
                    lines.push(format!("Hostiles present: {}.", enemies.join(", ")));
                }
                if !npcs.is_empty() {
                    lines.push(format!("People here: {}.", npcs.join(", ")));
                }
                lines.join("\n")
            }
            RequestPayload::NpcDialogue {
                npc_name,
                archetype,
                traits,
                speech_style,
                goals,
                relationship_bucket,
                memories,
                player_name,
                player_message,
                ..
            } => {
                let mut lines = vec![
                    format!("NPC: {npc_name}, a {archetype}."),
                    format!("Traits: {}. Speech: {speech_style}.", traits.join(", ")),
                    format!("Goals: {}.", goals.join("; ")),
                    format!("Disposition toward {player_name}: {relationship_bucket} (-4 hostile .. +4 devoted)."),
                ];
                if !memories.is_empty() {
                    lines.push(format!("Remembers: {}", memories.join(" | ")));
                }
                lines.push(format!("{player_name} says: \"{player_message}\""));
                lines.join("\n")
            }
            RequestPayload::CombatNarration { attacker, defender, action, damage, crit, killed, biome } => {
                format!(
                    "In the {biome}: {attacker} used {action} against {defender} for {damage} damage.{}{}",
                    if *crit { " Critical hit." } else { "" },
                    if *killed { " The blow was fatal." } else { "" },
                )
            }
            RequestPayload::QuestGeneration { biome, zone_level, giver_archetype } => {
                format!(
                    "A {giver_archetype} in the {biome} (zone level {zone_level}) needs something done."
                )
            }
            RequestPayload::Summarization { events, .. } => {
                format!("Events to condense:\n{}", events.join("\n"))
            }
        }
    }
}

/// Everything the assembler may draw on for one request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub kind: RequestKind,
    pub payload: RequestPayload,
    pub recent_actions: Vec<String>,
    pub short_term: Vec<String>,
    pub summary: String,
    pub facts: Vec<String>,
    pub turn: u64,
}

impl RequestContext {
    /// Bare context with no narrative sections; background requests use
    /// this.
    pub fn bare(kind: RequestKind, payload: RequestPayload) -> Self {
        Self {
            kind,
            payload,
            recent_actions: Vec::new(),
            short_term: Vec::new(),
            summary: String::new(),
            facts: Vec::new(),
            turn: 0,
        }
    }
}

/// The assembler's output: prompt text plus the canonical form feeding the
/// fingerprint.
#[derive(Debug, Clone)]
pub struct AssembledContext {
    pub text: String,
    pub canonical: String,
}

pub struct ContextAssembler {
    bpe: CoreBPE,
    token_budget: usize,
}

impl ContextAssembler {
    pub fn new(token_budget: usize) -> Result<Self> {
        let bpe = p50k_base().map_err(|e| BridgeError::Tokenizer(e.to_string()))?;
        Ok(Self { bpe, token_budget })
    }

    pub fn count_tokens(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }

    /// Assemble the prompt body in priority order, dropping sections from
    /// the bottom of the ranking when the budget would overflow. The
    /// kind-specific tick state always survives.
    pub fn assemble(&self, ctx: &RequestContext) -> AssembledContext {
        let mut sections: Vec<String> = Vec::new();
        let mut spent = 0usize;

        let mut try_push = |section: String, spent: &mut usize, sections: &mut Vec<String>, forced: bool| {
            let cost = self.count_tokens(&section);
            if forced || *spent + cost <= self.token_budget {
                *spent += cost;
                sections.push(section);
            }
        };

        // tick state is the one section that must always be present
        try_push(ctx.payload.render(), &mut spent, &mut sections, true);

        if !ctx.recent_actions.is_empty() {
            try_push(
                format!("Recent actions: {}.", ctx.recent_actions.join("; ")),
                &mut spent,
                &mut sections,
                false,
            );
        }
        if !ctx.short_term.is_empty() {
            try_push(
                format!("Recent events:\n{}", ctx.short_term.join("\n")),
                &mut spent,
                &mut sections,
                false,
            );
        }
        if !ctx.summary.is_empty() {
            try_push(format!("The story so far: {}", ctx.summary), &mut spent, &mut sections, false);
        }
        if !ctx.facts.is_empty() {
            try_push(
                format!("Relevant facts:\n{}", ctx.facts.join("\n")),
                &mut spent,
                &mut sections,
                false,
            );
        }

        AssembledContext {
            text: sections.join("\n\n"),
            canonical: canonical_json(&ctx.payload.fingerprint_value()),
        }
    }

    /// Fingerprint for a context under a given model configuration.
    pub fn fingerprint(&self, ctx: &RequestContext, model_id: &str) -> Fingerprint {
        let canonical = canonical_json(&ctx.payload.fingerprint_value());
        Fingerprint::compute(
            ctx.kind.schema_kind_label(),
            &canonical,
            model_id,
            ctx.kind.temperature(),
        )
    }
}

impl RequestKind {
    /// Label of the schema this kind validates against; enrichment and
    /// room description share one.
    pub fn schema_kind_label(self) -> &'static str {
        match self.schema_kind() {
            crate::kind::SchemaKind::RoomDescription => "room_description",
            crate::kind::SchemaKind::NpcDialogue => "npc_dialogue",
            crate::kind::SchemaKind::CombatNarration => "combat_narration",
            crate::kind::SchemaKind::QuestGeneration => "quest_generation",
            crate::kind::SchemaKind::Summarization => "summarization",
        }
    }
}

fn join_or_none(items: &[String]) -> String {
    if items.is_empty() { "none".to_string() } else { items.join(", ") }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room_payload() -> RequestPayload {
        RequestPayload::RoomDescription {
            coord: Coord::new(0, 1, 0),
            biome: "forest".into(),
            features: vec!["campfire".into()],
            exits: vec!["north".into(), "east".into()],
            items: vec![],
            enemies: vec!["Wolf".into()],
            npcs: vec![],
        }
    }

    #[test]
    fn test_turn_index_does_not_change_fingerprint() {
        let assembler = ContextAssembler::new(2048).unwrap();
        let mut a = RequestContext::bare(RequestKind::RoomDescription, room_payload());
        let mut b = RequestContext::bare(RequestKind::RoomDescription, room_payload());
        a.turn = 3;
        b.turn = 999;
        assert_eq!(assembler.fingerprint(&a, "gpt-4o"), assembler.fingerprint(&b, "gpt-4o"));
    }

    #[test]
    fn test_narrative_window_does_not_change_fingerprint() {
        let assembler = ContextAssembler::new(2048).unwrap();
        let a = RequestContext::bare(RequestKind::RoomDescription, room_payload());
        let mut b = RequestContext::bare(RequestKind::RoomDescription, room_payload());
        b.short_term = vec!["[t1] room_entered: somewhere".into()];
        b.summary = "a long journey".into();
        assert_eq!(assembler.fingerprint(&a, "gpt-4o"), assembler.fingerprint(&b, "gpt-4o"));
    }

    #[test]
    fn test_enrichment_and_description_share_fingerprint() {
        let assembler = ContextAssembler::new(2048).unwrap();
        let a = RequestContext::bare(RequestKind::RoomDescription, room_payload());
        let b = RequestContext::bare(RequestKind::Enrichment, room_payload());
        assert_eq!(assembler.fingerprint(&a, "gpt-4o"), assembler.fingerprint(&b, "gpt-4o"));
    }

    #[test]
    fn test_budget_drops_low_priority_sections() {
        let assembler = ContextAssembler::new(60).unwrap();
        let mut ctx = RequestContext::bare(RequestKind::RoomDescription, room_payload());
        ctx.recent_actions = vec!["moved north".into()];
        ctx.summary = "word ".repeat(500);
        let assembled = assembler.assemble(&ctx);
        assert!(assembled.text.contains("Recent actions"));
        assert!(!assembled.text.contains("The story so far"));
    }

    #[test]
    fn test_tick_state_always_survives() {
        let assembler = ContextAssembler::new(1).unwrap();
        let ctx = RequestContext::bare(RequestKind::RoomDescription, room_payload());
        let assembled = assembler.assemble(&ctx);
        assert!(assembled.text.contains("forest"));
    }

    #[test]
    fn test_dialogue_fingerprint_ignores_memories() {
        let assembler = ContextAssembler::new(2048).unwrap();
        let base = RequestPayload::NpcDialogue {
            npc_id: "m1".into(),
            npc_name: "Maro".into(),
            archetype: "hermit".into(),
            traits: vec!["wary".into()],
            speech_style: "clipped".into(),
            goals: vec!["be left alone".into()],
            relationship_bucket: 0,
            memories: vec![],
            player_name: "Hero".into(),
            player_message: "hello".into(),
        };
        let with_memory = match base.clone() {
            RequestPayload::NpcDialogue { npc_id, npc_name, archetype, traits, speech_style, goals, relationship_bucket, player_name, player_message, .. } => {
                RequestPayload::NpcDialogue {
                    npc_id,
                    npc_name,
                    archetype,
                    traits,
                    speech_style,
                    goals,
                    relationship_bucket,
                    memories: vec!["the player said hello".into()],
                    player_name,
                    player_message,
                }
            }
            _ => unreachable!(),
        };
        let a = RequestContext::bare(RequestKind::NpcDialogue, base);
        let b = RequestContext::bare(RequestKind::NpcDialogue, with_memory);
        assert_eq!(assembler.fingerprint(&a, "gpt-4o"), assembler.fingerprint(&b, "gpt-4o"));
    }

    #[test]
    fn test_dialogue_fingerprint_tracks_relationship_bucket() {
        let assembler = ContextAssembler::new(2048).unwrap();
        let make = |bucket: i32| {
            RequestContext::bare(
                RequestKind::NpcDialogue,
                RequestPayload::NpcDialogue {
                    npc_id: "m1".into(),
                    npc_name: "Maro".into(),
                    archetype: "hermit".into(),
                    traits: vec![],
                    speech_style: "clipped".into(),
                    goals: vec![],
                    relationship_bucket: bucket,
                    memories: vec![],
                    player_name: "Hero".into(),
                    player_message: "hello".into(),
                },
            )
        };
        assert_ne!(
            assembler.fingerprint(&make(0), "gpt-4o"),
            assembler.fingerprint(&make(2), "gpt-4o")
        );
    }
}
