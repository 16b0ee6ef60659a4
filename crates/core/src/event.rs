//! Append-only narrative events
//!
//! Events are the unit of narrative memory: everything meaningful that
//! happens gets one. Ids are minted monotonically by the narrative memory
//! and never reused; NPC memories and quests reference events by id.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    RoomEntered,
    CombatResolved,
    NpcInteraction,
    ItemAcquired,
    QuestUpdated,
    Death,
    Discovery,
    /// Condensed stand-in for a collapsed run of older events.
    Summary,
}

impl EventKind {
    pub fn label(self) -> &'static str {
        match self {
            EventKind::RoomEntered => "room_entered",
            EventKind::CombatResolved => "combat_resolved",
            EventKind::NpcInteraction => "npc_interaction",
            EventKind::ItemAcquired => "item_acquired",
            EventKind::QuestUpdated => "quest_updated",
            EventKind::Death => "death",
            EventKind::Discovery => "discovery",
            EventKind::Summary => "summary",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativeEvent {
    pub id: u64,
    pub turn: u64,
    pub kind: EventKind,
    pub summary: String,
    /// Structured details: coordinates, entity ids, amounts. Shape varies
    /// by kind; consumers treat it as opaque context.
    pub payload: Value,
}

impl NarrativeEvent {
    /// One-line rendering for prompt context and condensation fallback.
    pub fn one_line(&self) -> String {
        format!("[t{}] {}: {}", self.turn, self.kind.label(), self.summary)
    }
}
