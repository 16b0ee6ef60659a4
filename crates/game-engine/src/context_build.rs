//! Builders that turn live session state into intelligence request contexts

use ai_bridge::{RequestContext, RequestPayload, RequestKind};
use crawler_core::{NpcInstance, Player, QuestLog};
use crawler_world::{Room, WorldStore};

/// Context for describing (or enriching) a room.
pub fn room_description(kind: RequestKind, room: &Room) -> RequestPayload {
    let mut features = Vec::new();
    if room.features.campfire {
        features.push("campfire".to_string());
    }
    if room.features.altar {
        features.push("altar".to_string());
    }
    if room.features.shop {
        features.push("shop".to_string());
    }
    debug_assert!(matches!(kind, RequestKind::RoomDescription | RequestKind::Enrichment));
    RequestPayload::RoomDescription {
        coord: room.coord,
        biome: room.biome.name().to_string(),
        features,
        exits: room.exits.iter().map(|d| d.short_name().to_string()).collect(),
        items: room.items.iter().map(|s| s.def_id.clone()).collect(),
        enemies: room.enemies.iter().map(|e| e.name.clone()).collect(),
        npcs: room.npcs.iter().map(|n| n.name.clone()).collect(),
    }
}

/// Context for one line of NPC dialogue.
pub fn npc_dialogue(npc: &NpcInstance, player: &Player, message: &str) -> RequestPayload {
    RequestPayload::NpcDialogue {
        npc_id: npc.id.clone(),
        npc_name: npc.name.clone(),
        archetype: npc.archetype.clone(),
        traits: npc.personality.traits.clone(),
        speech_style: npc.personality.speech_style.clone(),
        goals: npc.personality.goals.clone(),
        relationship_bucket: npc.personality.relationship_bucket(),
        memories: npc.recent_memories(5).iter().map(|m| m.note.clone()).collect(),
        player_name: player.name.clone(),
        player_message: message.to_string(),
    }
}

pub fn combat_narration(
    attacker: &str,
    defender: &str,
    action: &str,
    damage: i32,
    crit: bool,
    killed: bool,
    biome: &str,
) -> RequestPayload {
    RequestPayload::CombatNarration {
        attacker: attacker.to_string(),
        defender: defender.to_string(),
        action: action.to_string(),
        damage,
        crit,
        killed,
        biome: biome.to_string(),
    }
}

pub fn quest_generation(room: &Room, giver_archetype: &str) -> RequestPayload {
    RequestPayload::QuestGeneration {
        biome: room.biome.name().to_string(),
        zone_level: WorldStore::zone_level(room.coord),
        giver_archetype: giver_archetype.to_string(),
    }
}

/// Retrieved facts for a dialogue request: NPC knowledge plus open quests.
pub fn dialogue_facts(npc: &NpcInstance, quests: &QuestLog) -> Vec<String> {
    let mut facts: Vec<String> = npc.personality.knowledge.clone();
    for quest in quests.active() {
        facts.push(format!("active quest: {}", quest.title));
    }
    facts
}

/// Prefetch contexts after a move: procedural neighbors awaiting
/// enrichment, then nearby NPC-rich rooms. The caller caps the list.
pub fn prefetch_candidates(world: &WorldStore) -> Vec<RequestContext> {
    let here = world.player_coord();
    let mut contexts = Vec::new();

    if let Some(current) = world.room(here) {
        for dir in current.exits.iter() {
            if let Some(neighbor) = world.room(here.neighbor(dir)) {
                if !neighbor.enriched {
                    contexts.push(RequestContext::bare(
                        RequestKind::Enrichment,
                        room_description(RequestKind::Enrichment, neighbor),
                    ));
                }
            }
        }
    }

    for coord in world.npc_rich_rooms_within(here, 2) {
        if let Some(room) = world.room(coord) {
            if !room.enriched {
                contexts.push(RequestContext::bare(
                    RequestKind::Enrichment,
                    room_description(RequestKind::Enrichment, room),
                ));
            }
        }
    }

    contexts
}
