//! Biome-weighted spawn tables for enemies, items, NPCs, and room features
//!
//! Enemy stats scale with the zone difficulty curve
//! `1 + 0.1 * (zone_level - player_level)`, clamped so a fresh character in
//! a deep zone is threatened, not deleted.

use crate::biome::Biome;
use crate::layout::RoomGrid;
use crawler_core::{
    AiType, Coord, EnemyInstance, Faction, ItemStack, Legend, NpcInstance, NpcPersonality,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::VecDeque;

/// Clamp range for the difficulty multiplier.
const SCALE_MIN: f32 = 0.5;
const SCALE_MAX: f32 = 2.0;

pub fn difficulty_scale(zone_level: u32, player_level: u32) -> f32 {
    let raw = 1.0 + 0.1 * (zone_level as f32 - player_level as f32);
    raw.clamp(SCALE_MIN, SCALE_MAX)
}

struct EnemySpec {
    name: &'static str,
    hp: i32,
    attack: i32,
    defense: i32,
    xp: u64,
    gold: u64,
    ai: AiType,
    faction: Faction,
    weight: u32,
}

fn enemy_table(biome: Biome) -> &'static [EnemySpec] {
    match biome {
        Biome::Meadow => &[
            EnemySpec { name: "Giant Rat", hp: 8, attack: 3, defense: 0, xp: 12, gold: 2, ai: AiType::Skittish, faction: Faction::Wild, weight: 5 },
            EnemySpec { name: "Wild Boar", hp: 14, attack: 5, defense: 1, xp: 20, gold: 0, ai: AiType::Aggressive, faction: Faction::Wild, weight: 3 },
        ],
        Biome::Forest => &[
            EnemySpec { name: "Wolf", hp: 12, attack: 5, defense: 1, xp: 18, gold: 0, ai: AiType::Aggressive, faction: Faction::Wild, weight: 5 },
            EnemySpec { name: "Bandit Scout", hp: 15, attack: 6, defense: 2, xp: 25, gold: 12, ai: AiType::Ambusher, faction: Faction::Bandit, weight: 3 },
        ],
        Biome::Swamp => &[
            EnemySpec { name: "Bog Leech", hp: 10, attack: 4, defense: 0, xp: 15, gold: 0, ai: AiType::Aggressive, faction: Faction::Wild, weight: 5 },
            EnemySpec { name: "Mire Shambler", hp: 22, attack: 7, defense: 3, xp: 40, gold: 5, ai: AiType::Guardian, faction: Faction::Undead, weight: 2 },
        ],
        Biome::Ruins => &[
            EnemySpec { name: "Restless Shade", hp: 14, attack: 6, defense: 1, xp: 28, gold: 8, ai: AiType::Ambusher, faction: Faction::Undead, weight: 4 },
            EnemySpec { name: "Bandit Looter", hp: 16, attack: 6, defense: 2, xp: 26, gold: 18, ai: AiType::Aggressive, faction: Faction::Bandit, weight: 3 },
        ],
        Biome::Spire => &[
            EnemySpec { name: "Sentinel Construct", hp: 25, attack: 8, defense: 4, xp: 50, gold: 10, ai: AiType::Guardian, faction: Faction::Cult, weight: 4 },
        ],
        Biome::Dungeon => &[
            EnemySpec { name: "Skeleton", hp: 16, attack: 6, defense: 2, xp: 30, gold: 6, ai: AiType::Aggressive, faction: Faction::Undead, weight: 5 },
            EnemySpec { name: "Dungeon Spider", hp: 12, attack: 7, defense: 1, xp: 28, gold: 0, ai: AiType::Ambusher, faction: Faction::Wild, weight: 3 },
        ],
        Biome::Cavern => &[
            EnemySpec { name: "Cave Bat", hp: 8, attack: 4, defense: 0, xp: 14, gold: 0, ai: AiType::Skittish, faction: Faction::Wild, weight: 5 },
            EnemySpec { name: "Rock Crawler", hp: 20, attack: 7, defense: 4, xp: 42, gold: 4, ai: AiType::Guardian, faction: Faction::Wild, weight: 3 },
        ],
        Biome::Crypt => &[
            EnemySpec { name: "Crypt Ghoul", hp: 22, attack: 8, defense: 3, xp: 55, gold: 10, ai: AiType::Aggressive, faction: Faction::Undead, weight: 5 },
            EnemySpec { name: "Bone Acolyte", hp: 18, attack: 9, defense: 2, xp: 60, gold: 20, ai: AiType::Ambusher, faction: Faction::Cult, weight: 3 },
        ],
        Biome::LavaDepths => &[
            EnemySpec { name: "Magma Hound", hp: 26, attack: 10, defense: 4, xp: 75, gold: 15, ai: AiType::Aggressive, faction: Faction::Wild, weight: 5 },
            EnemySpec { name: "Ash Revenant", hp: 30, attack: 11, defense: 5, xp: 90, gold: 30, ai: AiType::Guardian, faction: Faction::Undead, weight: 2 },
        ],
    }
}

fn item_table(biome: Biome) -> &'static [(&'static str, u32)] {
    match biome {
        Biome::Meadow | Biome::Forest => &[("healing_potion", 4), ("torch", 3), ("rusty_sword", 1)],
        Biome::Swamp => &[("healing_potion", 3), ("mana_draught", 2)],
        Biome::Ruins => &[("gold_nugget", 2), ("leather_armor", 2), ("bone_key", 1)],
        Biome::Spire => &[("mana_draught", 3), ("ancient_sigil", 1)],
        Biome::Dungeon => &[("torch", 3), ("iron_sword", 1), ("healing_potion", 3)],
        Biome::Cavern => &[("gold_nugget", 3), ("torch", 2)],
        Biome::Crypt => &[("bone_key", 2), ("chain_mail", 1), ("mana_draught", 2)],
        Biome::LavaDepths => &[("gold_nugget", 4), ("iron_sword", 1)],
    }
}

/// How dangerous a biome is: expected enemy count range.
fn enemy_count_range(biome: Biome) -> (u32, u32) {
    match biome {
        Biome::Meadow => (0, 1),
        Biome::Forest | Biome::Swamp => (0, 2),
        Biome::Ruins | Biome::Spire => (1, 2),
        Biome::Dungeon | Biome::Cavern => (1, 3),
        Biome::Crypt | Biome::LavaDepths => (2, 3),
    }
}

struct NpcArchetype {
    archetype: &'static str,
    names: &'static [&'static str],
    traits: &'static [&'static str],
    speech: &'static str,
    goal: &'static str,
}

const NPC_ARCHETYPES: &[NpcArchetype] = &[
    NpcArchetype {
        archetype: "hermit",
        names: &["Maro", "Edda", "Silun"],
        traits: &["wary", "observant"],
        speech: "clipped, reluctant",
        goal: "be left alone",
    },
    NpcArchetype {
        archetype: "trader",
        names: &["Bex", "Orin", "Vala"],
        traits: &["shrewd", "talkative"],
        speech: "fast, bargaining",
        goal: "turn a profit",
    },
    NpcArchetype {
        archetype: "pilgrim",
        names: &["Thessa", "Jun", "Armel"],
        traits: &["devout", "weary"],
        speech: "formal, quoting scripture",
        goal: "reach the deep shrine",
    },
    NpcArchetype {
        archetype: "scholar",
        names: &["Ilya", "Corvin", "Neth"],
        traits: &["curious", "absent-minded"],
        speech: "rambling, precise about details",
        goal: "map the old ruins",
    },
];

/// Chance a room in this biome holds an NPC at all.
fn npc_chance(biome: Biome) -> f64 {
    match biome {
        Biome::Meadow | Biome::Forest => 0.25,
        Biome::Ruins | Biome::Spire => 0.20,
        Biome::Swamp | Biome::Cavern => 0.10,
        Biome::Dungeon | Biome::Crypt => 0.08,
        Biome::LavaDepths => 0.04,
    }
}

/// Weighted pick over a table of (value, weight).
fn weighted_index(weights: &[u32], rng: &mut StdRng) -> usize {
    let total: u32 = weights.iter().sum();
    let mut roll = rng.random_range(0..total.max(1));
    for (idx, w) in weights.iter().enumerate() {
        if roll < *w {
            return idx;
        }
        roll -= w;
    }
    weights.len() - 1
}

pub fn roll_enemies(
    biome: Biome,
    coord: Coord,
    scale: f32,
    grid: &RoomGrid,
    legend: &Legend,
    rng: &mut StdRng,
) -> Vec<EnemyInstance> {
    let (lo, hi) = enemy_count_range(biome);
    let count = rng.random_range(lo..=hi);
    if count == 0 {
        return Vec::new();
    }

    let table = enemy_table(biome);
    let weights: Vec<u32> = table.iter().map(|s| s.weight).collect();
    let mut spots = grid.floor_positions(legend);
    spots.shuffle(rng);
    let mut spot_queue: VecDeque<(u8, u8)> = spots.into();

    let mut enemies = Vec::new();
    for idx in 0..count {
        let Some(pos) = spot_queue.pop_front() else { break };
        let spec = &table[weighted_index(&weights, rng)];
        enemies.push(EnemyInstance {
            id: format!("enemy-{}-{}-{}-{}", coord.x, coord.y, coord.z, idx),
            name: spec.name.to_string(),
            hp: (spec.hp as f32 * scale).round().max(1.0) as i32,
            max_hp: (spec.hp as f32 * scale).round().max(1.0) as i32,
            attack: (spec.attack as f32 * scale).round().max(1.0) as i32,
            defense: (spec.defense as f32 * scale).round() as i32,
            xp_reward: (spec.xp as f32 * scale).round() as u64,
            gold_reward: spec.gold,
            ai: spec.ai,
            faction: spec.faction,
            pos,
        });
    }
    enemies
}

pub fn roll_items(biome: Biome, rng: &mut StdRng) -> Vec<ItemStack> {
    let table = item_table(biome);
    let mut drops = Vec::new();
    // at most two drops per room
    for _ in 0..2 {
        if rng.random_bool(0.35) {
            let weights: Vec<u32> = table.iter().map(|(_, w)| *w).collect();
            let (def_id, _) = table[weighted_index(&weights, rng)];
            drops.push(ItemStack {
                def_id: def_id.to_string(),
                quantity: 1,
                durability: None,
                enchantment: None,
            });
        }
    }
    drops
}

pub fn roll_npcs(
    biome: Biome,
    coord: Coord,
    grid: &RoomGrid,
    legend: &Legend,
    rng: &mut StdRng,
) -> Vec<NpcInstance> {
    if !rng.random_bool(npc_chance(biome)) {
        return Vec::new();
    }
    let archetype = &NPC_ARCHETYPES[rng.random_range(0..NPC_ARCHETYPES.len())];
    let name = archetype.names[rng.random_range(0..archetype.names.len())];
    let spots = grid.floor_positions(legend);
    let pos = if spots.is_empty() {
        (grid.width() / 2, grid.height() / 2)
    } else {
        spots[rng.random_range(0..spots.len())]
    };

    vec![NpcInstance {
        id: format!("npc-{}-{}-{}-0", coord.x, coord.y, coord.z),
        name: name.to_string(),
        hp: 10,
        max_hp: 10,
        archetype: archetype.archetype.to_string(),
        personality: NpcPersonality {
            traits: archetype.traits.iter().map(|t| t.to_string()).collect(),
            speech_style: archetype.speech.to_string(),
            goals: vec![archetype.goal.to_string()],
            knowledge: vec![format!("knows the {} well", biome.name())],
            relationship: 0,
        },
        faction: Faction::Villager,
        pos,
        memory: VecDeque::new(),
    }]
}
