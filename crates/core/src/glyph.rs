//! The glyph legend - the immutable symbolic substrate shared with rendering
//!
//! The world is a grid of opaque glyph identifiers drawn from a private-use
//! codepoint space. The legend maps each identifier to semantic attributes
//! (walkable, solid, interactable, kind). Rendering pixels is somebody
//! else's problem; the core only ever sees identifiers.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Opaque tile identifier. The numeric value is a codepoint in the shared
/// legend space and carries no meaning outside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Glyph(pub u32);

impl fmt::Display for Glyph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "U+{:04X}", self.0)
    }
}

/// Semantic family a glyph belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GlyphKind {
    Terrain,
    Wall,
    Door,
    Fluid,
    Prop,
    Item,
    Entity,
    Effect,
    Ui,
    Overlay,
    Animation,
}

/// Attributes the core needs to reason about a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlyphInfo {
    pub kind: GlyphKind,
    pub walkable: bool,
    pub solid: bool,
    pub interactable: bool,
}

/// Well-known glyphs. Each range base is spaced 0x40 apart inside the
/// private-use area so the families stay stable across the run.
pub mod glyphs {
    use super::Glyph;

    pub const TERRAIN_BASE: u32 = 0xE000;
    pub const WALL_BASE: u32 = 0xE040;
    pub const DOOR_BASE: u32 = 0xE080;
    pub const FLUID_BASE: u32 = 0xE0C0;
    pub const PROP_BASE: u32 = 0xE100;
    pub const ITEM_BASE: u32 = 0xE140;
    pub const ENTITY_BASE: u32 = 0xE180;
    pub const EFFECT_BASE: u32 = 0xE1C0;
    pub const UI_BASE: u32 = 0xE200;
    pub const OVERLAY_BASE: u32 = 0xE240;
    pub const ANIM_BASE: u32 = 0xE280;

    pub const FLOOR: Glyph = Glyph(TERRAIN_BASE);
    pub const GRASS: Glyph = Glyph(TERRAIN_BASE + 1);
    pub const SAND: Glyph = Glyph(TERRAIN_BASE + 2);
    pub const CAVE_FLOOR: Glyph = Glyph(TERRAIN_BASE + 3);
    pub const RUBBLE: Glyph = Glyph(TERRAIN_BASE + 4);
    pub const STAIRS_UP: Glyph = Glyph(TERRAIN_BASE + 5);
    pub const STAIRS_DOWN: Glyph = Glyph(TERRAIN_BASE + 6);

    pub const WALL: Glyph = Glyph(WALL_BASE);
    pub const CAVE_WALL: Glyph = Glyph(WALL_BASE + 1);
    pub const BRICK_WALL: Glyph = Glyph(WALL_BASE + 2);

    pub const DOOR_CLOSED: Glyph = Glyph(DOOR_BASE);
    pub const DOOR_OPEN: Glyph = Glyph(DOOR_BASE + 1);
    pub const DOOR_LOCKED: Glyph = Glyph(DOOR_BASE + 2);

    pub const WATER: Glyph = Glyph(FLUID_BASE);
    pub const LAVA: Glyph = Glyph(FLUID_BASE + 1);
    pub const SWAMP: Glyph = Glyph(FLUID_BASE + 2);

    pub const CAMPFIRE: Glyph = Glyph(PROP_BASE);
    pub const ALTAR: Glyph = Glyph(PROP_BASE + 1);
    pub const SHOP_COUNTER: Glyph = Glyph(PROP_BASE + 2);
    pub const CHEST: Glyph = Glyph(PROP_BASE + 3);
    pub const TREE: Glyph = Glyph(PROP_BASE + 4);
    pub const PILLAR: Glyph = Glyph(PROP_BASE + 5);

    pub const ITEM_DROP: Glyph = Glyph(ITEM_BASE);
    pub const TORCH: Glyph = Glyph(ITEM_BASE + 1);

    pub const PLAYER: Glyph = Glyph(ENTITY_BASE);
    pub const ENEMY: Glyph = Glyph(ENTITY_BASE + 1);
    pub const NPC: Glyph = Glyph(ENTITY_BASE + 2);

    pub const SPARK: Glyph = Glyph(EFFECT_BASE);
    pub const MIASMA: Glyph = Glyph(EFFECT_BASE + 1);

    pub const CURSOR: Glyph = Glyph(UI_BASE);
    pub const TARGET_RETICLE: Glyph = Glyph(UI_BASE + 1);

    pub const FOG: Glyph = Glyph(OVERLAY_BASE);
    pub const HIGHLIGHT: Glyph = Glyph(OVERLAY_BASE + 1);

    pub const ANIM_FLAME_0: Glyph = Glyph(ANIM_BASE);
    pub const ANIM_FLAME_1: Glyph = Glyph(ANIM_BASE + 1);
    pub const ANIM_WATER_0: Glyph = Glyph(ANIM_BASE + 2);
    pub const ANIM_WATER_1: Glyph = Glyph(ANIM_BASE + 3);
}

/// Immutable glyph -> attribute mapping, built once per run.
#[derive(Debug, Clone)]
pub struct Legend {
    entries: HashMap<Glyph, GlyphInfo>,
}

impl Legend {
    /// The standard legend every run shares.
    pub fn standard() -> Self {
        use glyphs::*;
        let mut entries = HashMap::new();

        let walkable = |kind| GlyphInfo { kind, walkable: true, solid: false, interactable: false };
        let solid = |kind| GlyphInfo { kind, walkable: false, solid: true, interactable: false };
        let interact = |kind, walkable| GlyphInfo { kind, walkable, solid: !walkable, interactable: true };

        for g in [FLOOR, GRASS, SAND, CAVE_FLOOR, RUBBLE] {
            entries.insert(g, walkable(GlyphKind::Terrain));
        }
        entries.insert(STAIRS_UP, interact(GlyphKind::Terrain, true));
        entries.insert(STAIRS_DOWN, interact(GlyphKind::Terrain, true));

        for g in [WALL, CAVE_WALL, BRICK_WALL] {
            entries.insert(g, solid(GlyphKind::Wall));
        }

        entries.insert(DOOR_CLOSED, interact(GlyphKind::Door, false));
        entries.insert(DOOR_OPEN, interact(GlyphKind::Door, true));
        entries.insert(DOOR_LOCKED, interact(GlyphKind::Door, false));

        entries.insert(WATER, solid(GlyphKind::Fluid));
        entries.insert(LAVA, solid(GlyphKind::Fluid));
        entries.insert(SWAMP, walkable(GlyphKind::Fluid));

        for g in [CAMPFIRE, ALTAR, SHOP_COUNTER, CHEST] {
            entries.insert(g, interact(GlyphKind::Prop, false));
        }
        entries.insert(TREE, solid(GlyphKind::Prop));
        entries.insert(PILLAR, solid(GlyphKind::Prop));

        entries.insert(ITEM_DROP, interact(GlyphKind::Item, true));
        entries.insert(TORCH, interact(GlyphKind::Item, true));

        entries.insert(PLAYER, walkable(GlyphKind::Entity));
        entries.insert(ENEMY, interact(GlyphKind::Entity, false));
        entries.insert(NPC, interact(GlyphKind::Entity, false));

        entries.insert(SPARK, walkable(GlyphKind::Effect));
        entries.insert(MIASMA, walkable(GlyphKind::Effect));

        entries.insert(CURSOR, walkable(GlyphKind::Ui));
        entries.insert(TARGET_RETICLE, walkable(GlyphKind::Ui));

        entries.insert(FOG, walkable(GlyphKind::Overlay));
        entries.insert(HIGHLIGHT, walkable(GlyphKind::Overlay));

        for g in [ANIM_FLAME_0, ANIM_FLAME_1, ANIM_WATER_0, ANIM_WATER_1] {
            entries.insert(g, walkable(GlyphKind::Animation));
        }

        Self { entries }
    }

    pub fn contains(&self, glyph: Glyph) -> bool {
        self.entries.contains_key(&glyph)
    }

    pub fn info(&self, glyph: Glyph) -> Option<&GlyphInfo> {
        self.entries.get(&glyph)
    }

    pub fn is_walkable(&self, glyph: Glyph) -> bool {
        self.info(glyph).map(|i| i.walkable).unwrap_or(false)
    }

    pub fn is_interactable(&self, glyph: Glyph) -> bool {
        self.info(glyph).map(|i| i.interactable).unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
