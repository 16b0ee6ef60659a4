//! Rooms and their replayable mutation log
//!
//! A room is generated exactly once and then only ever mutated through
//! `RoomChange`s. Every applied change is appended to the room's log, so a
//! room's state is always its generation output plus its log replayed in
//! order.

use crate::biome::Biome;
use crate::layout::RoomGrid;
use crate::store::WorldError;
use crawler_core::{
    Coord, EnemyInstance, ExitSet, Glyph, ItemStack, Legend, NpcInstance, NpcMemoryEntry,
    NpcPersonality,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomFeatures {
    pub campfire: bool,
    pub altar: bool,
    pub shop: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub coord: Coord,
    pub biome: Biome,
    pub grid: RoomGrid,
    pub exits: ExitSet,
    pub description: String,
    /// True once an LLM enrichment replaced the procedural placeholder.
    pub enriched: bool,
    pub items: Vec<ItemStack>,
    pub enemies: Vec<EnemyInstance>,
    pub npcs: Vec<NpcInstance>,
    pub features: RoomFeatures,
    pub visited: bool,
    pub cleared: bool,
    pub changes: Vec<RoomChange>,
}

/// A mutation applied to a room after generation. Changes are the only way
/// room state moves; tiles and exits can never be rewritten wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RoomChange {
    ReplaceTile { x: u8, y: u8, glyph: Glyph },
    RemoveItem { def_id: String },
    DamageEnemy { enemy_id: String, amount: i32 },
    RemoveEnemy { enemy_id: String },
    MarkVisited,
    SetCleared,
    SetDescription { text: String },
    UpdateNpcPersonality { npc_id: String, personality: NpcPersonality },
    RecordNpcMemory { npc_id: String, entry: NpcMemoryEntry },
}

impl Room {
    /// Apply one change. `Ok(true)` means state moved and the change was
    /// logged; `Ok(false)` means the change was already in effect (no-op).
    pub fn apply(&mut self, change: RoomChange, legend: &Legend) -> Result<bool, WorldError> {
        let applied = match &change {
            RoomChange::ReplaceTile { x, y, glyph } => {
                if !legend.contains(*glyph) {
                    return Err(WorldError::UnknownGlyph(*glyph));
                }
                match self.grid.get(*x, *y) {
                    None => return Err(WorldError::OutOfBounds { x: *x, y: *y }),
                    Some(current) if current == *glyph => false,
                    Some(_) => {
                        self.grid.set(*x, *y, *glyph);
                        true
                    }
                }
            }
            RoomChange::RemoveItem { def_id } => {
                let Some(idx) = self.items.iter().position(|s| &s.def_id == def_id) else {
                    return Err(WorldError::ChangeConflict(format!(
                        "item {def_id} not present in {}",
                        self.coord
                    )));
                };
                self.items.remove(idx);
                true
            }
            RoomChange::DamageEnemy { enemy_id, amount } => {
                let Some(enemy) = self.enemies.iter_mut().find(|e| &e.id == enemy_id) else {
                    return Err(WorldError::ChangeConflict(format!(
                        "enemy {enemy_id} not present in {}",
                        self.coord
                    )));
                };
                if *amount <= 0 || enemy.hp == 0 {
                    false
                } else {
                    enemy.take_damage(*amount);
                    true
                }
            }
            RoomChange::RemoveEnemy { enemy_id } => {
                let Some(idx) = self.enemies.iter().position(|e| &e.id == enemy_id) else {
                    return Err(WorldError::ChangeConflict(format!(
                        "enemy {enemy_id} not present in {}",
                        self.coord
                    )));
                };
                self.enemies.remove(idx);
                true
            }
            RoomChange::MarkVisited => {
                if self.visited {
                    false
                } else {
                    self.visited = true;
                    true
                }
            }
            RoomChange::SetCleared => {
                if self.cleared {
                    false
                } else {
                    self.cleared = true;
                    true
                }
            }
            RoomChange::SetDescription { text } => {
                if &self.description == text {
                    false
                } else {
                    self.description = text.clone();
                    self.enriched = true;
                    true
                }
            }
            RoomChange::UpdateNpcPersonality { npc_id, personality } => {
                let Some(npc) = self.npcs.iter_mut().find(|n| &n.id == npc_id) else {
                    return Err(WorldError::ChangeConflict(format!(
                        "npc {npc_id} not present in {}",
                        self.coord
                    )));
                };
                if &npc.personality == personality {
                    false
                } else {
                    npc.personality = personality.clone();
                    true
                }
            }
            RoomChange::RecordNpcMemory { npc_id, entry } => {
                let Some(npc) = self.npcs.iter_mut().find(|n| &n.id == npc_id) else {
                    return Err(WorldError::ChangeConflict(format!(
                        "npc {npc_id} not present in {}",
                        self.coord
                    )));
                };
                if npc.memory.iter().any(|e| e.event_id == entry.event_id) {
                    false
                } else {
                    npc.remember(entry.clone());
                    true
                }
            }
        };
        if applied {
            self.changes.push(change);
        }
        Ok(applied)
    }

    pub fn npc(&self, npc_id: &str) -> Option<&NpcInstance> {
        self.npcs.iter().find(|n| n.id == npc_id)
    }

    pub fn enemy(&self, enemy_id: &str) -> Option<&EnemyInstance> {
        self.enemies.iter().find(|e| e.id == enemy_id)
    }

    /// Living hostiles remaining in the room.
    pub fn has_hostiles(&self) -> bool {
        self.enemies.iter().any(|e| !e.is_dead())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crawler_core::glyphs;

    fn sample_room() -> Room {
        Room {
            coord: Coord::ORIGIN,
            biome: Biome::Meadow,
            grid: RoomGrid::filled(10, 7, glyphs::GRASS),
            exits: ExitSet::EMPTY,
            description: "a plain field".into(),
            enriched: false,
            items: vec![ItemStack {
                def_id: "torch".into(),
                quantity: 1,
                durability: None,
                enchantment: None,
            }],
            enemies: Vec::new(),
            npcs: Vec::new(),
            features: RoomFeatures::default(),
            visited: false,
            cleared: false,
            changes: Vec::new(),
        }
    }

    #[test]
    fn test_replace_tile_is_idempotent() {
        let legend = Legend::standard();
        let mut room = sample_room();
        let change = RoomChange::ReplaceTile { x: 2, y: 2, glyph: glyphs::CAMPFIRE };
        assert!(room.apply(change.clone(), &legend).unwrap());
        assert!(!room.apply(change, &legend).unwrap());
        assert_eq!(room.changes.len(), 1);
    }

    #[test]
    fn test_unknown_glyph_is_rejected() {
        let legend = Legend::standard();
        let mut room = sample_room();
        let err = room
            .apply(RoomChange::ReplaceTile { x: 1, y: 1, glyph: Glyph(0x41) }, &legend)
            .unwrap_err();
        assert!(matches!(err, WorldError::UnknownGlyph(_)));
        assert!(room.changes.is_empty());
    }

    #[test]
    fn test_remove_item_twice_conflicts() {
        let legend = Legend::standard();
        let mut room = sample_room();
        let change = RoomChange::RemoveItem { def_id: "torch".into() };
        assert!(room.apply(change.clone(), &legend).unwrap());
        let err = room.apply(change, &legend).unwrap_err();
        assert!(matches!(err, WorldError::ChangeConflict(_)));
    }

    #[test]
    fn test_set_description_marks_enriched() {
        let legend = Legend::standard();
        let mut room = sample_room();
        room.apply(RoomChange::SetDescription { text: "mist clings low".into() }, &legend).unwrap();
        assert!(room.enriched);
        assert_eq!(room.description, "mist clings low");
    }

    #[test]
    fn test_mark_visited_noop_second_time() {
        let legend = Legend::standard();
        let mut room = sample_room();
        assert!(room.apply(RoomChange::MarkVisited, &legend).unwrap());
        assert!(!room.apply(RoomChange::MarkVisited, &legend).unwrap());
        assert_eq!(room.changes.len(), 1);
    }
}
