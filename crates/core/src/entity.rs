//! Enemy and NPC instances
//!
//! Instance ids are deterministic strings minted at room generation so that
//! replaying a seed reproduces the same world byte for byte. NPC memories
//! reference narrative events by id only; the event registry holds the other
//! end of the link.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// How many past interactions an NPC keeps verbatim.
pub const NPC_MEMORY_CAP: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AiType {
    Aggressive,
    Skittish,
    Guardian,
    Ambusher,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Faction {
    Wild,
    Undead,
    Bandit,
    Villager,
    Cult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnemyInstance {
    pub id: String,
    pub name: String,
    pub hp: i32,
    pub max_hp: i32,
    pub attack: i32,
    pub defense: i32,
    pub xp_reward: u64,
    pub gold_reward: u64,
    pub ai: AiType,
    pub faction: Faction,
    /// Tile position inside the room grid.
    pub pos: (u8, u8),
}

impl EnemyInstance {
    pub fn is_dead(&self) -> bool {
        self.hp <= 0
    }

    pub fn take_damage(&mut self, amount: i32) {
        self.hp = (self.hp - amount.max(0)).max(0);
    }
}

/// Personality record the dialogue pipeline reads and writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NpcPersonality {
    pub traits: Vec<String>,
    pub speech_style: String,
    pub goals: Vec<String>,
    pub knowledge: Vec<String>,
    /// Signed disposition toward the player, -100..=100.
    pub relationship: i32,
}

impl NpcPersonality {
    /// Coarse bucket used for dialogue cache invalidation: a shift across a
    /// bucket boundary means cached lines no longer fit the relationship.
    pub fn relationship_bucket(&self) -> i32 {
        self.relationship.clamp(-100, 100) / 25
    }

    pub fn adjust_relationship(&mut self, delta: i32) {
        self.relationship = (self.relationship + delta).clamp(-100, 100);
    }
}

/// One remembered interaction, linked to the narrative event it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NpcMemoryEntry {
    pub turn: u64,
    pub event_id: u64,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NpcInstance {
    pub id: String,
    pub name: String,
    pub hp: i32,
    pub max_hp: i32,
    pub archetype: String,
    pub personality: NpcPersonality,
    pub faction: Faction,
    pub pos: (u8, u8),
    pub memory: VecDeque<NpcMemoryEntry>,
}

impl NpcInstance {
    /// Record an interaction, discarding the oldest past the cap.
    pub fn remember(&mut self, entry: NpcMemoryEntry) {
        self.memory.push_back(entry);
        while self.memory.len() > NPC_MEMORY_CAP {
            self.memory.pop_front();
        }
    }

    /// Most recent memories, newest last.
    pub fn recent_memories(&self, count: usize) -> Vec<&NpcMemoryEntry> {
        let skip = self.memory.len().saturating_sub(count);
        self.memory.iter().skip(skip).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_npc() -> NpcInstance {
        NpcInstance {
            id: "npc-0-0-0-0".into(),
            name: "Maro".into(),
            hp: 10,
            max_hp: 10,
            archetype: "hermit".into(),
            personality: NpcPersonality {
                traits: vec!["wary".into()],
                speech_style: "clipped".into(),
                goals: vec!["be left alone".into()],
                knowledge: vec![],
                relationship: 0,
            },
            faction: Faction::Villager,
            pos: (3, 3),
            memory: VecDeque::new(),
        }
    }

    #[test]
    fn test_relationship_buckets() {
        let mut npc = sample_npc();
        assert_eq!(npc.personality.relationship_bucket(), 0);
        npc.personality.adjust_relationship(60);
        assert_eq!(npc.personality.relationship_bucket(), 2);
        npc.personality.adjust_relationship(500);
        assert_eq!(npc.personality.relationship, 100);
    }

    #[test]
    fn test_npc_memory_is_bounded() {
        let mut npc = sample_npc();
        for turn in 0..(NPC_MEMORY_CAP as u64 + 5) {
            npc.remember(NpcMemoryEntry { turn, event_id: turn, note: format!("turn {turn}") });
        }
        assert_eq!(npc.memory.len(), NPC_MEMORY_CAP);
        assert_eq!(npc.memory.front().unwrap().turn, 5);
        let recent = npc.recent_memories(3);
        assert_eq!(recent.last().unwrap().turn, NPC_MEMORY_CAP as u64 + 4);
    }
}
