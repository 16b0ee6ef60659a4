//! The save record and its checksum
//!
//! A save is one self-describing JSON document: format version, world
//! snapshot, player, narrative, quest log, and a SHA-256 checksum over the
//! canonical (key-sorted) form of everything else. Canonicalizing through
//! `serde_json::Value` keeps the hash independent of struct field order.

use ai_bridge::MemoryRecord;
use chrono::{DateTime, Utc};
use crawler_core::{Player, QuestLog};
use crawler_world::WorldSnapshot;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const SAVE_FORMAT_VERSION: u32 = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveFile {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    /// Minimal-emergency marker: rooms may be missing; the loader serves a
    /// reduced-fidelity form regenerable from the seed.
    pub emergency: bool,
    pub world: WorldSnapshot,
    pub player: Player,
    pub narrative: MemoryRecord,
    pub player_choices: Vec<String>,
    pub quests: QuestLog,
    pub checksum: String,
}

impl SaveFile {
    pub fn new(
        world: WorldSnapshot,
        player: Player,
        narrative: MemoryRecord,
        player_choices: Vec<String>,
        quests: QuestLog,
    ) -> Self {
        let mut save = Self {
            version: SAVE_FORMAT_VERSION,
            created_at: Utc::now(),
            emergency: false,
            world,
            player,
            narrative,
            player_choices,
            quests,
            checksum: String::new(),
        };
        save.checksum = save.compute_checksum();
        save
    }

    /// Checksum over the canonical form with the checksum field blanked.
    pub fn compute_checksum(&self) -> String {
        let mut value = serde_json::to_value(self).expect("save record serializes");
        if let Some(object) = value.as_object_mut() {
            object.insert("checksum".to_string(), serde_json::Value::String(String::new()));
        }
        checksum_of_value(&value)
    }

    pub fn verify_checksum(&self) -> bool {
        self.compute_checksum() == self.checksum
    }

    /// The reduced-fidelity form an emergency save loads as: the world
    /// regenerates from its seed, the narrative keeps only its summary.
    pub fn reduce(mut self) -> Self {
        self.world.rooms.clear();
        self.narrative.events.clear();
        self.checksum = self.compute_checksum();
        self
    }
}

/// SHA-256 hex over a JSON value's canonical serialization. `serde_json`
/// maps are key-sorted, so this is stable across writers.
pub fn checksum_of_value(value: &serde_json::Value) -> String {
    let canonical = serde_json::to_string(value).expect("value serializes");
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hasher.finalize().iter().map(|b| format!("{b:02x}")).collect()
}
