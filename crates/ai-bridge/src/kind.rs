//! Request kinds and their per-kind configuration
//!
//! Each kind carries its temperature, queue priority, deadline, token cap,
//! and cache policy. Enrichment is the background twin of a room
//! description: same schema, lower priority, so a prefetched room and a
//! foreground description of the same room share a fingerprint and a cache
//! entry.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestKind {
    RoomDescription,
    NpcDialogue,
    CombatNarration,
    QuestGeneration,
    Enrichment,
    Summarization,
}

/// The response schema a kind validates against. Distinct from the kind
/// because enrichment reuses the room-description schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaKind {
    RoomDescription,
    NpcDialogue,
    CombatNarration,
    QuestGeneration,
    Summarization,
}

impl RequestKind {
    pub const ALL: [RequestKind; 6] = [
        RequestKind::RoomDescription,
        RequestKind::NpcDialogue,
        RequestKind::CombatNarration,
        RequestKind::QuestGeneration,
        RequestKind::Enrichment,
        RequestKind::Summarization,
    ];

    pub fn label(self) -> &'static str {
        match self {
            RequestKind::RoomDescription => "room_description",
            RequestKind::NpcDialogue => "npc_dialogue",
            RequestKind::CombatNarration => "combat_narration",
            RequestKind::QuestGeneration => "quest_generation",
            RequestKind::Enrichment => "enrichment",
            RequestKind::Summarization => "summarization",
        }
    }

    pub fn schema_kind(self) -> SchemaKind {
        match self {
            RequestKind::RoomDescription | RequestKind::Enrichment => SchemaKind::RoomDescription,
            RequestKind::NpcDialogue => SchemaKind::NpcDialogue,
            RequestKind::CombatNarration => SchemaKind::CombatNarration,
            RequestKind::QuestGeneration => SchemaKind::QuestGeneration,
            RequestKind::Summarization => SchemaKind::Summarization,
        }
    }

    pub fn temperature(self) -> f32 {
        match self {
            RequestKind::RoomDescription | RequestKind::Enrichment => 0.8,
            RequestKind::NpcDialogue => 0.7,
            RequestKind::CombatNarration => 0.6,
            RequestKind::QuestGeneration => 0.7,
            RequestKind::Summarization => 0.3,
        }
    }

    /// Queue priority; lower runs sooner. Dialogue is the player staring at
    /// a talking head, summarization can wait all day.
    pub fn priority(self) -> u8 {
        match self {
            RequestKind::NpcDialogue => 1,
            RequestKind::RoomDescription => 2,
            RequestKind::CombatNarration => 3,
            RequestKind::QuestGeneration => 3,
            RequestKind::Enrichment => 4,
            RequestKind::Summarization => 5,
        }
    }

    /// Overall deadline for one backend call, including its wait in the
    /// retry loop.
    pub fn deadline_ms(self) -> u64 {
        match self {
            RequestKind::NpcDialogue => 4_000,
            RequestKind::RoomDescription => 6_000,
            RequestKind::CombatNarration => 3_000,
            RequestKind::QuestGeneration => 8_000,
            RequestKind::Enrichment => 15_000,
            RequestKind::Summarization => 20_000,
        }
    }

    pub fn max_tokens(self) -> u32 {
        match self {
            RequestKind::RoomDescription | RequestKind::Enrichment => 400,
            RequestKind::NpcDialogue => 300,
            RequestKind::CombatNarration => 200,
            RequestKind::QuestGeneration => 500,
            RequestKind::Summarization => 300,
        }
    }

    /// Soft TTL for cached responses. `None` means the entry never ages
    /// out (room content is immutable once generated). Summaries are
    /// one-shot and never cached.
    pub fn cache_ttl(self) -> Option<Duration> {
        match self {
            RequestKind::RoomDescription | RequestKind::Enrichment => None,
            RequestKind::NpcDialogue => Some(Duration::from_secs(180)),
            RequestKind::CombatNarration => Some(Duration::from_secs(300)),
            RequestKind::QuestGeneration => Some(Duration::from_secs(600)),
            RequestKind::Summarization => Some(Duration::ZERO),
        }
    }

    pub fn cacheable(self) -> bool {
        !matches!(self, RequestKind::Summarization)
    }
}
