//! Biome partition of the macro map
//!
//! Surface biomes come from a seeded Perlin partition over (x, y); the z
//! layer shifts the whole palette to underground or spire families. The
//! partition is pure: the same seed and coordinate always land in the same
//! biome, whether or not the room was ever generated.

use crawler_core::{glyphs, Coord, Glyph};
use noise::{NoiseFn, Perlin};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Biome {
    // surface
    Meadow,
    Forest,
    Swamp,
    Ruins,
    // above ground
    Spire,
    // underground, shallow
    Dungeon,
    Cavern,
    // underground, deep
    Crypt,
    LavaDepths,
}

impl Biome {
    pub fn name(self) -> &'static str {
        match self {
            Biome::Meadow => "meadow",
            Biome::Forest => "forest",
            Biome::Swamp => "swamp",
            Biome::Ruins => "ruins",
            Biome::Spire => "spire",
            Biome::Dungeon => "dungeon",
            Biome::Cavern => "cavern",
            Biome::Crypt => "crypt",
            Biome::LavaDepths => "lava depths",
        }
    }

    /// Room grid dimensions for this biome. Fixed per biome for the whole
    /// run; caves are roomier than built spaces.
    pub fn grid_size(self) -> (u8, u8) {
        match self {
            Biome::Cavern | Biome::LavaDepths => (12, 8),
            _ => (10, 7),
        }
    }

    pub fn floor_glyph(self) -> Glyph {
        match self {
            Biome::Meadow => glyphs::GRASS,
            Biome::Forest => glyphs::GRASS,
            Biome::Swamp => glyphs::SWAMP,
            Biome::Ruins => glyphs::RUBBLE,
            Biome::Spire => glyphs::FLOOR,
            Biome::Dungeon => glyphs::FLOOR,
            Biome::Cavern => glyphs::CAVE_FLOOR,
            Biome::Crypt => glyphs::FLOOR,
            Biome::LavaDepths => glyphs::CAVE_FLOOR,
        }
    }

    pub fn wall_glyph(self) -> Glyph {
        match self {
            Biome::Meadow | Biome::Forest | Biome::Swamp => glyphs::WALL,
            Biome::Ruins | Biome::Crypt => glyphs::BRICK_WALL,
            Biome::Spire | Biome::Dungeon => glyphs::WALL,
            Biome::Cavern | Biome::LavaDepths => glyphs::CAVE_WALL,
        }
    }

    pub fn is_underground(self) -> bool {
        matches!(self, Biome::Dungeon | Biome::Cavern | Biome::Crypt | Biome::LavaDepths)
    }
}

/// Seeded, deterministic biome lookup for any coordinate.
#[derive(Debug, Clone)]
pub struct BiomeMap {
    surface: Perlin,
    depth: Perlin,
}

impl BiomeMap {
    pub fn new(world_seed: u64) -> Self {
        // two independent fields so underground variety does not mirror the surface
        Self {
            surface: Perlin::new(world_seed as u32),
            depth: Perlin::new((world_seed >> 32) as u32 ^ 0x9E37),
        }
    }

    pub fn biome_at(&self, coord: Coord) -> Biome {
        if coord.z > 0 {
            return Biome::Spire;
        }
        if coord.z < 0 {
            let sample = self.depth.get([coord.x as f64 * 0.17, coord.y as f64 * 0.17]);
            return if coord.z == -1 {
                if sample < 0.0 { Biome::Dungeon } else { Biome::Cavern }
            } else if sample < 0.0 {
                Biome::Crypt
            } else {
                Biome::LavaDepths
            };
        }
        let sample = self.surface.get([coord.x as f64 * 0.13, coord.y as f64 * 0.13]);
        if sample < -0.25 {
            Biome::Swamp
        } else if sample < 0.15 {
            Biome::Meadow
        } else if sample < 0.45 {
            Biome::Forest
        } else {
            Biome::Ruins
        }
    }
}
