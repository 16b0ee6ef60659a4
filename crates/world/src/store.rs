//! The authoritative world store
//!
//! Single writer, owned by the session task loop. Rooms are generated
//! exactly once per coordinate from the world seed and mutated only through
//! `apply_room_change`. Exit reciprocity is enforced at generation time and
//! re-checked on every move.

use crate::biome::{Biome, BiomeMap};
use crate::layout::{carve_exits, generate_layout, place_stairs, RoomGrid};
use crate::room::{Room, RoomChange, RoomFeatures};
use crate::spawn::{difficulty_scale, roll_enemies, roll_items, roll_npcs};
use crate::{room_seed, world_seed_from_text};
use crawler_core::{glyphs, Coord, Direction, ExitSet, Glyph, Legend};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use thiserror::Error;
use tracing::{debug, error};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum WorldError {
    #[error("tile ({x},{y}) is out of bounds")]
    OutOfBounds { x: u8, y: u8 },
    #[error("glyph {0} is not in the legend")]
    UnknownGlyph(Glyph),
    #[error("change conflict: {0}")]
    ChangeConflict(String),
    #[error("room {0} has not been generated")]
    UngeneratedRoom(Coord),
    #[error("world invariant violated: {0}")]
    InvariantViolation(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    Moved { to: Coord, first_visit: bool },
    Blocked,
}

/// Consistent copy of the whole world, cheap enough to take at every save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub seed_text: String,
    pub player_coord: Coord,
    pub player_level: u32,
    pub discovered: Vec<Coord>,
    pub rooms: Vec<Room>,
}

#[derive(Debug)]
pub struct WorldStore {
    seed: u64,
    seed_text: String,
    biomes: BiomeMap,
    legend: Legend,
    rooms: HashMap<Coord, Room>,
    discovered: HashSet<Coord>,
    player_coord: Coord,
    /// Mirrored from the player sheet so spawn scaling sees current level.
    player_level: u32,
}

impl WorldStore {
    /// A fresh world. The origin room is generated immediately so the player
    /// coordinate always references a generated room.
    pub fn new(seed_text: &str) -> Self {
        let seed = world_seed_from_text(seed_text);
        let mut store = Self {
            seed,
            seed_text: seed_text.to_string(),
            biomes: BiomeMap::new(seed),
            legend: Legend::standard(),
            rooms: HashMap::new(),
            discovered: HashSet::new(),
            player_coord: Coord::ORIGIN,
            player_level: 1,
        };
        store.get_or_generate_room(Coord::ORIGIN);
        store.discovered.insert(Coord::ORIGIN);
        store
    }

    pub fn seed_text(&self) -> &str {
        &self.seed_text
    }

    pub fn legend(&self) -> &Legend {
        &self.legend
    }

    pub fn player_coord(&self) -> Coord {
        self.player_coord
    }

    pub fn set_player_level(&mut self, level: u32) {
        self.player_level = level;
    }

    pub fn discovered(&self) -> impl Iterator<Item = Coord> + '_ {
        self.discovered.iter().copied()
    }

    pub fn room(&self, coord: Coord) -> Option<&Room> {
        self.rooms.get(&coord)
    }

    pub fn current_room(&self) -> &Room {
        self.rooms.get(&self.player_coord).expect("player coordinate references a generated room")
    }

    pub fn generated_count(&self) -> usize {
        self.rooms.len()
    }

    /// Zone difficulty grows with distance from the surface origin.
    pub fn zone_level(coord: Coord) -> u32 {
        1 + coord.zone_distance(Coord::ORIGIN) / 3
    }

    pub fn get_or_generate_room(&mut self, coord: Coord) -> &Room {
        if !self.rooms.contains_key(&coord) {
            let room = self.generate_room(coord);
            self.verify_room(&room);
            self.rooms.insert(coord, room);
            debug!(%coord, "room generated");
        }
        self.rooms.get(&coord).expect("room just inserted")
    }

    /// Route every mutation through the room's change log.
    pub fn apply_room_change(
        &mut self,
        coord: Coord,
        change: RoomChange,
    ) -> Result<bool, WorldError> {
        let legend = self.legend.clone();
        let room = self.rooms.get_mut(&coord).ok_or(WorldError::UngeneratedRoom(coord))?;
        room.apply(change, &legend)
    }

    /// Move the player through an exit, lazily generating the target room.
    pub fn move_player(&mut self, dir: Direction) -> Result<MoveOutcome, WorldError> {
        let from = self.player_coord;
        if !self.current_room().exits.contains(dir) {
            return Ok(MoveOutcome::Blocked);
        }
        let to = from.neighbor(dir);
        let target = self.get_or_generate_room(to);
        if !target.exits.contains(dir.opposite()) {
            // a bug, not a player error: log and refuse
            error!(%from, %to, %dir, "exit reciprocity broken");
            return Err(WorldError::InvariantViolation(format!(
                "room {to} lacks the {} exit back to {from}",
                dir.opposite()
            )));
        }
        let first_visit = !target.visited;
        self.player_coord = to;
        self.discovered.insert(to);
        Ok(MoveOutcome::Moved { to, first_visit })
    }

    /// Neighbors reachable through exits that do not exist yet. Prefetch
    /// candidates.
    pub fn ungenerated_neighbors(&self, coord: Coord) -> Vec<Coord> {
        let Some(room) = self.rooms.get(&coord) else { return Vec::new() };
        room.exits
            .iter()
            .map(|dir| coord.neighbor(dir))
            .filter(|c| !self.rooms.contains_key(c))
            .collect()
    }

    /// Generated rooms holding NPCs within `steps` exit-hops of `coord`.
    pub fn npc_rich_rooms_within(&self, coord: Coord, steps: u32) -> Vec<Coord> {
        let mut seen = HashSet::from([coord]);
        let mut frontier = VecDeque::from([(coord, 0u32)]);
        let mut found = Vec::new();
        while let Some((at, depth)) = frontier.pop_front() {
            let Some(room) = self.rooms.get(&at) else { continue };
            if at != coord && !room.npcs.is_empty() {
                found.push(at);
            }
            if depth < steps {
                for dir in room.exits.iter() {
                    let next = at.neighbor(dir);
                    if seen.insert(next) {
                        frontier.push_back((next, depth + 1));
                    }
                }
            }
        }
        found
    }

    pub fn snapshot(&self) -> WorldSnapshot {
        let mut discovered: Vec<Coord> = self.discovered.iter().copied().collect();
        discovered.sort();
        let mut rooms: Vec<Room> = self.rooms.values().cloned().collect();
        rooms.sort_by_key(|r| r.coord);
        WorldSnapshot {
            seed_text: self.seed_text.clone(),
            player_coord: self.player_coord,
            player_level: self.player_level,
            discovered,
            rooms,
        }
    }

    pub fn restore(snapshot: WorldSnapshot) -> Self {
        let seed = world_seed_from_text(&snapshot.seed_text);
        Self {
            seed,
            seed_text: snapshot.seed_text,
            biomes: BiomeMap::new(seed),
            legend: Legend::standard(),
            rooms: snapshot.rooms.into_iter().map(|r| (r.coord, r)).collect(),
            discovered: snapshot.discovered.into_iter().collect(),
            player_coord: snapshot.player_coord,
            player_level: snapshot.player_level,
        }
    }

    fn generate_room(&self, coord: Coord) -> Room {
        let mut rng = StdRng::seed_from_u64(room_seed(self.seed, coord));
        let biome = self.biomes.biome_at(coord);
        let exits = self.decide_exits(coord, &mut rng);

        let mut grid = generate_layout(biome, &mut rng);
        carve_exits(&mut grid, exits, biome, &self.legend);
        for dir in [Direction::Up, Direction::Down] {
            if exits.contains(dir) {
                place_stairs(&mut grid, dir, &mut rng, &self.legend);
            }
        }

        let features = self.roll_features(biome, &mut grid, &mut rng);

        let scale = difficulty_scale(Self::zone_level(coord), self.player_level);
        let enemies = roll_enemies(biome, coord, scale, &grid, &self.legend, &mut rng);
        let items = roll_items(biome, &mut rng);
        let npcs = roll_npcs(biome, coord, &grid, &self.legend, &mut rng);

        let description = placeholder_description(biome, &features, exits, &mut rng);

        Room {
            coord,
            biome,
            grid,
            exits,
            description,
            enriched: false,
            items,
            enemies,
            npcs,
            features,
            visited: false,
            cleared: false,
            changes: Vec::new(),
        }
    }

    /// Exit topology: generated neighbors dictate reciprocal exits; the rest
    /// are rolled with a bias that keeps the explored graph connected. The
    /// origin room always opens with exactly one way out.
    fn decide_exits(&self, coord: Coord, rng: &mut StdRng) -> ExitSet {
        let mut exits = ExitSet::EMPTY;
        let mut open_dirs = Vec::new();

        for (dir, ncoord) in coord.neighbors() {
            match self.rooms.get(&ncoord) {
                Some(neighbor) => {
                    if neighbor.exits.contains(dir.opposite()) {
                        exits.insert(dir);
                    }
                }
                None => open_dirs.push(dir),
            }
        }

        if coord == Coord::ORIGIN && exits.is_empty() {
            let cardinals: Vec<Direction> = open_dirs
                .iter()
                .copied()
                .filter(|d| Direction::CARDINAL.contains(d))
                .collect();
            if let Some(&dir) = cardinals.get(rng.random_range(0..cardinals.len().max(1))) {
                exits.insert(dir);
            }
            return exits;
        }

        for &dir in &open_dirs {
            let roll = match dir {
                Direction::Up if coord.z < 0 => rng.random_bool(0.12),
                Direction::Down if coord.z > -3 => rng.random_bool(0.10),
                Direction::Up | Direction::Down => false,
                _ => rng.random_bool(0.45),
            };
            if roll {
                exits.insert(dir);
            }
        }

        // a room with no exits would trap the player: force one open
        if exits.is_empty() {
            let cardinals: Vec<Direction> = open_dirs
                .iter()
                .copied()
                .filter(|d| Direction::CARDINAL.contains(d))
                .collect();
            if !cardinals.is_empty() {
                exits.insert(cardinals[rng.random_range(0..cardinals.len())]);
            }
        }
        exits
    }

    fn roll_features(&self, biome: Biome, grid: &mut RoomGrid, rng: &mut StdRng) -> RoomFeatures {
        let altar_chance = match biome {
            Biome::Crypt | Biome::Spire => 0.15,
            _ => 0.04,
        };
        let shop_chance = match biome {
            Biome::Meadow | Biome::Forest | Biome::Ruins => 0.06,
            _ => 0.0,
        };
        let features = RoomFeatures {
            campfire: rng.random_bool(0.08),
            altar: rng.random_bool(altar_chance),
            shop: shop_chance > 0.0 && rng.random_bool(shop_chance),
        };

        let mut spots = grid.floor_positions(&self.legend);
        let mut place = |glyph: Glyph, spots: &mut Vec<(u8, u8)>, rng: &mut StdRng| {
            if spots.is_empty() {
                return;
            }
            let idx = rng.random_range(0..spots.len());
            let (x, y) = spots.swap_remove(idx);
            grid.set(x, y, glyph);
        };
        if features.campfire {
            place(glyphs::CAMPFIRE, &mut spots, rng);
        }
        if features.altar {
            place(glyphs::ALTAR, &mut spots, rng);
        }
        if features.shop {
            place(glyphs::SHOP_COUNTER, &mut spots, rng);
        }
        features
    }

    /// Post-generation sanity: every tile must be a legend glyph.
    fn verify_room(&self, room: &Room) {
        for (x, y, glyph) in room.grid.iter() {
            if !self.legend.contains(glyph) {
                error!(coord = %room.coord, %glyph, x, y, "generated tile outside legend");
            }
        }
    }
}

/// Procedural placeholder shown until enrichment lands.
fn placeholder_description(
    biome: Biome,
    features: &RoomFeatures,
    exits: ExitSet,
    rng: &mut StdRng,
) -> String {
    let openers: &[&str] = match biome {
        Biome::Meadow => &[
            "Tall grass sways in a slow wind.",
            "An open field, quiet except for insects.",
        ],
        Biome::Forest => &[
            "Trees crowd close, their canopy swallowing the light.",
            "The forest floor is soft with old needles.",
        ],
        Biome::Swamp => &[
            "Black water seeps between tussocks of reed.",
            "The air hangs heavy with the smell of rot.",
        ],
        Biome::Ruins => &[
            "Broken walls trace the outline of something that once mattered.",
            "Rubble and old stone, picked over long ago.",
        ],
        Biome::Spire => &[
            "A cold chamber of fitted stone, high above the ground.",
            "Wind whistles through arrow slits in the tower wall.",
        ],
        Biome::Dungeon => &[
            "Dressed stone corridors, built by patient hands.",
            "The torch brackets here are long empty.",
        ],
        Biome::Cavern => &[
            "The cave opens into a wide, dripping hollow.",
            "Stalactites hang over a floor of broken stone.",
        ],
        Biome::Crypt => &[
            "Niches line the walls, most of them occupied.",
            "Dust lies thick over the burial slabs.",
        ],
        Biome::LavaDepths => &[
            "Heat shimmers over cracks glowing dull red.",
            "The rock itself sweats warmth down here.",
        ],
    };
    let mut description = openers[rng.random_range(0..openers.len())].to_string();

    if features.campfire {
        description.push_str(" The remains of a campfire sit in a cleared circle.");
    }
    if features.altar {
        description.push_str(" A worn altar stands against one wall.");
    }
    if features.shop {
        description.push_str(" Someone has set up a trading counter here.");
    }

    let exit_names: Vec<&str> = exits.iter().map(|d| d.short_name()).collect();
    match exit_names.len() {
        0 => description.push_str(" There is no obvious way out."),
        1 => description.push_str(&format!(" A way out leads {}.", exit_names[0])),
        _ => description.push_str(&format!(" Ways out lead {}.", exit_names.join(", "))),
    }
    description
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_room_has_exactly_one_exit() {
        let store = WorldStore::new("S0");
        let room = store.room(Coord::ORIGIN).unwrap();
        assert_eq!(room.exits.len(), 1);
        assert_eq!((room.grid.width(), room.grid.height()), room.biome.grid_size());
    }

    #[test]
    fn test_rooms_generate_exactly_once() {
        let mut store = WorldStore::new("S0");
        let first = store.get_or_generate_room(Coord::ORIGIN).clone();
        // drive some more generation, then look again
        let dir = first.exits.iter().next().unwrap();
        store.move_player(dir).unwrap();
        store.move_player(dir.opposite()).unwrap();
        let second = store.room(Coord::ORIGIN).unwrap();
        assert_eq!(first.grid, second.grid);
        assert_eq!(first.exits, second.exits);
    }

    #[test]
    fn test_move_through_exit_generates_reciprocal_neighbor() {
        let mut store = WorldStore::new("S0");
        let dir = store.current_room().exits.iter().next().unwrap();
        let outcome = store.move_player(dir).unwrap();
        let MoveOutcome::Moved { to, first_visit } = outcome else {
            panic!("expected a move, got {outcome:?}");
        };
        assert!(first_visit);
        assert_eq!(to, Coord::ORIGIN.neighbor(dir));
        assert!(store.room(to).unwrap().exits.contains(dir.opposite()));
    }

    #[test]
    fn test_move_without_exit_is_blocked() {
        let mut store = WorldStore::new("S0");
        let exits = store.current_room().exits;
        let blocked_dir = Direction::CARDINAL.into_iter().find(|d| !exits.contains(*d)).unwrap();
        assert_eq!(store.move_player(blocked_dir).unwrap(), MoveOutcome::Blocked);
        assert_eq!(store.player_coord(), Coord::ORIGIN);
    }

    #[test]
    fn test_reciprocity_holds_over_a_walk() {
        let mut store = WorldStore::new("walk-seed");
        // random-ish walk: always take the first available exit
        for _ in 0..30 {
            let dir = store.current_room().exits.iter().next().unwrap();
            store.move_player(dir).unwrap();
        }
        let coords: Vec<Coord> = store.rooms.keys().copied().collect();
        for coord in coords {
            let room = &store.rooms[&coord];
            for dir in room.exits.iter() {
                if let Some(neighbor) = store.room(coord.neighbor(dir)) {
                    assert!(
                        neighbor.exits.contains(dir.opposite()),
                        "room {} exit {} not reciprocated",
                        coord,
                        dir
                    );
                }
            }
        }
    }

    #[test]
    fn test_snapshot_restore_round_trip() {
        let mut store = WorldStore::new("S0");
        let dir = store.current_room().exits.iter().next().unwrap();
        store.move_player(dir).unwrap();
        store
            .apply_room_change(store.player_coord(), RoomChange::MarkVisited)
            .unwrap();

        let snapshot = store.snapshot();
        let restored = WorldStore::restore(snapshot.clone());
        assert_eq!(restored.snapshot(), snapshot);
        assert_eq!(restored.player_coord(), store.player_coord());
    }

    #[test]
    fn test_restored_world_continues_generating_identically() {
        // generating a room after restore must match generating it before
        let mut store_a = WorldStore::new("S7");
        let snapshot = store_a.snapshot();
        let mut store_b = WorldStore::restore(snapshot);

        let dir = store_a.current_room().exits.iter().next().unwrap();
        store_a.move_player(dir).unwrap();
        store_b.move_player(dir).unwrap();
        assert_eq!(
            store_a.current_room().grid,
            store_b.current_room().grid
        );
    }

    #[test]
    fn test_apply_change_on_ungenerated_room_fails() {
        let mut store = WorldStore::new("S0");
        let err = store
            .apply_room_change(Coord::new(40, 40, 0), RoomChange::MarkVisited)
            .unwrap_err();
        assert!(matches!(err, WorldError::UngeneratedRoom(_)));
    }

    proptest::proptest! {
        #[test]
        fn prop_reciprocity_survives_random_walks(
            seed in 0u64..1000,
            steps in proptest::collection::vec(0usize..6, 1..40),
        ) {
            let mut store = WorldStore::new(&format!("prop-{seed}"));
            for step in steps {
                let dir = Direction::ALL[step];
                // blocked moves are fine; invariant violations are not
                store.move_player(dir).unwrap();
            }
            let coords: Vec<Coord> = store.rooms.keys().copied().collect();
            for coord in coords {
                let room = &store.rooms[&coord];
                for dir in room.exits.iter() {
                    if let Some(neighbor) = store.room(coord.neighbor(dir)) {
                        proptest::prop_assert!(neighbor.exits.contains(dir.opposite()));
                    }
                }
            }
        }
    }

    #[test]
    fn test_zone_level_grows_with_distance() {
        assert_eq!(WorldStore::zone_level(Coord::ORIGIN), 1);
        assert!(WorldStore::zone_level(Coord::new(9, 0, 0)) > 2);
        assert!(
            WorldStore::zone_level(Coord::new(0, 0, -2))
                > WorldStore::zone_level(Coord::new(0, 0, -1))
        );
    }
}
