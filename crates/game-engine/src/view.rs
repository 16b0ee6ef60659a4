//! Read-only views of session state for response bundles and the outbound
//! event stream
//!
//! Views are plain serializable data: the rendering layer gets glyph ids
//! and numbers, never handles into live state.

use crawler_core::{Coord, Direction, NarrativeEvent, Player, StatusEffect};
use crawler_world::{Room, RoomChange};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemView {
    pub def_id: String,
    pub quantity: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerView {
    pub name: String,
    pub class: String,
    pub level: u32,
    pub xp: u64,
    pub hp: i32,
    pub max_hp: i32,
    pub mp: i32,
    pub max_mp: i32,
    pub gold: u64,
    pub coord: Coord,
    pub inventory: Vec<ItemView>,
    pub status_effects: Vec<StatusEffect>,
}

impl PlayerView {
    pub fn of(player: &Player) -> Self {
        Self {
            name: player.name.clone(),
            class: player.class.name().to_string(),
            level: player.level,
            xp: player.xp,
            hp: player.derived.hp,
            max_hp: player.derived.max_hp,
            mp: player.derived.mp,
            max_mp: player.derived.max_mp,
            gold: player.gold,
            coord: player.coord,
            inventory: player
                .inventory
                .iter()
                .map(|s| ItemView { def_id: s.def_id.clone(), quantity: s.quantity })
                .collect(),
            status_effects: player.status_effects.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnemyView {
    pub id: String,
    pub name: String,
    pub hp: i32,
    pub max_hp: i32,
    pub pos: (u8, u8),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NpcView {
    pub id: String,
    pub name: String,
    pub archetype: String,
    pub pos: (u8, u8),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomView {
    pub coord: Coord,
    pub biome: String,
    pub width: u8,
    pub height: u8,
    /// Row-major glyph identifiers.
    pub tiles: Vec<u32>,
    pub exits: Vec<Direction>,
    pub description: String,
    pub enriched: bool,
    pub items: Vec<ItemView>,
    pub enemies: Vec<EnemyView>,
    pub npcs: Vec<NpcView>,
    pub cleared: bool,
}

impl RoomView {
    pub fn of(room: &Room) -> Self {
        Self {
            coord: room.coord,
            biome: room.biome.name().to_string(),
            width: room.grid.width(),
            height: room.grid.height(),
            tiles: room.grid.tiles().iter().map(|g| g.0).collect(),
            exits: room.exits.iter().collect(),
            description: room.description.clone(),
            enriched: room.enriched,
            items: room
                .items
                .iter()
                .map(|s| ItemView { def_id: s.def_id.clone(), quantity: s.quantity })
                .collect(),
            enemies: room
                .enemies
                .iter()
                .map(|e| EnemyView {
                    id: e.id.clone(),
                    name: e.name.clone(),
                    hp: e.hp,
                    max_hp: e.max_hp,
                    pos: e.pos,
                })
                .collect(),
            npcs: room
                .npcs
                .iter()
                .map(|n| NpcView {
                    id: n.id.clone(),
                    name: n.name.clone(),
                    archetype: n.archetype.clone(),
                    pos: n.pos,
                })
                .collect(),
            cleared: room.cleared,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateView {
    pub turn: u64,
    pub player: PlayerView,
    pub room: RoomView,
}

/// Outbound delta after a resolved tick: what changed, not the whole world.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeltaBundle {
    pub state: StateView,
    pub room_changes: Vec<(Coord, RoomChange)>,
    pub narrative: Vec<NarrativeEvent>,
    pub audio_hint: Option<String>,
}
