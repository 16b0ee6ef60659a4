//! Room layout generation - each biome gets its own algorithm
//!
//! Built spaces get BSP chambers, caves get cellular automata, spires get
//! prefab templates, open ground gets a walled field with scatter. All
//! algorithms draw from the room's seeded RNG only, so a coordinate always
//! lays out the same way.

use crate::biome::Biome;
use crawler_core::{glyphs, Direction, ExitSet, Glyph, Legend};
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Rectangular glyph grid. Rectangularity is structural: the tile vector
/// always holds exactly `width * height` entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomGrid {
    width: u8,
    height: u8,
    tiles: Vec<Glyph>,
}

impl RoomGrid {
    pub fn filled(width: u8, height: u8, fill: Glyph) -> Self {
        Self { width, height, tiles: vec![fill; width as usize * height as usize] }
    }

    pub fn width(&self) -> u8 {
        self.width
    }

    pub fn height(&self) -> u8 {
        self.height
    }

    pub fn in_bounds(&self, x: u8, y: u8) -> bool {
        x < self.width && y < self.height
    }

    pub fn get(&self, x: u8, y: u8) -> Option<Glyph> {
        self.in_bounds(x, y).then(|| self.tiles[y as usize * self.width as usize + x as usize])
    }

    pub fn set(&mut self, x: u8, y: u8, glyph: Glyph) -> bool {
        if !self.in_bounds(x, y) {
            return false;
        }
        self.tiles[y as usize * self.width as usize + x as usize] = glyph;
        true
    }

    pub fn tiles(&self) -> &[Glyph] {
        &self.tiles
    }

    /// Every (x, y, glyph) triple in row order.
    pub fn iter(&self) -> impl Iterator<Item = (u8, u8, Glyph)> + '_ {
        (0..self.height).flat_map(move |y| {
            (0..self.width).map(move |x| {
                (x, y, self.tiles[y as usize * self.width as usize + x as usize])
            })
        })
    }

    /// Interior floor positions, for spawn placement.
    pub fn floor_positions(&self, legend: &Legend) -> Vec<(u8, u8)> {
        self.iter()
            .filter(|&(x, y, g)| {
                x > 0 && y > 0 && x < self.width - 1 && y < self.height - 1 && legend.is_walkable(g)
            })
            .map(|(x, y, _)| (x, y))
            .collect()
    }

    /// The edge tile an exit in `dir` occupies.
    pub fn exit_tile(&self, dir: Direction) -> Option<(u8, u8)> {
        match dir {
            Direction::North => Some((self.width / 2, 0)),
            Direction::South => Some((self.width / 2, self.height - 1)),
            Direction::East => Some((self.width - 1, self.height / 2)),
            Direction::West => Some((0, self.height / 2)),
            Direction::Up | Direction::Down => None,
        }
    }
}

/// Generate the base layout for a biome.
pub fn generate_layout(biome: Biome, rng: &mut StdRng) -> RoomGrid {
    let (w, h) = biome.grid_size();
    match biome {
        Biome::Meadow | Biome::Swamp => open_field(w, h, biome, rng),
        Biome::Forest => wooded_field(w, h, biome, rng),
        Biome::Ruins | Biome::Dungeon | Biome::Crypt => bsp_chambers(w, h, biome, rng),
        Biome::Cavern | Biome::LavaDepths => cellular_cave(w, h, biome, rng),
        Biome::Spire => spire_template(biome),
    }
}

/// Outer walls, open floor.
fn open_field(w: u8, h: u8, biome: Biome, rng: &mut StdRng) -> RoomGrid {
    let mut grid = walled_shell(w, h, biome);
    if biome == Biome::Swamp {
        scatter(&mut grid, glyphs::WATER, 0.10, rng);
    }
    grid
}

/// Open field with tree cover.
fn wooded_field(w: u8, h: u8, biome: Biome, rng: &mut StdRng) -> RoomGrid {
    let mut grid = walled_shell(w, h, biome);
    scatter(&mut grid, glyphs::TREE, 0.14, rng);
    grid
}

/// One or two internal partitions with connecting doorways.
fn bsp_chambers(w: u8, h: u8, biome: Biome, rng: &mut StdRng) -> RoomGrid {
    let mut grid = walled_shell(w, h, biome);
    let wall = biome.wall_glyph();

    // vertical split somewhere in the middle third
    let split_x = w / 3 + rng.random_range(0..=(w / 3).max(1));
    for y in 1..h - 1 {
        grid.set(split_x, y, wall);
    }
    let doorway_y = 1 + rng.random_range(0..h - 2);
    grid.set(split_x, doorway_y, glyphs::DOOR_OPEN);

    // sometimes split one side again, horizontally
    if rng.random_bool(0.5) && h >= 7 {
        let split_y = h / 2;
        let (from_x, to_x) = if rng.random_bool(0.5) { (1, split_x) } else { (split_x + 1, w - 1) };
        for x in from_x..to_x {
            grid.set(x, split_y, wall);
        }
        let doorway_x = from_x + rng.random_range(0..(to_x - from_x).max(1));
        grid.set(doorway_x, split_y, glyphs::DOOR_OPEN);
    }

    if biome == Biome::Ruins {
        scatter(&mut grid, glyphs::PILLAR, 0.05, rng);
    }
    grid
}

/// Classic cellular automata cave: random fill, smooth, keep what remains.
fn cellular_cave(w: u8, h: u8, biome: Biome, rng: &mut StdRng) -> RoomGrid {
    let wall = biome.wall_glyph();
    let floor = biome.floor_glyph();
    let mut grid = RoomGrid::filled(w, h, wall);

    for y in 1..h - 1 {
        for x in 1..w - 1 {
            if !rng.random_bool(0.42) {
                grid.set(x, y, floor);
            }
        }
    }

    for _ in 0..3 {
        let snapshot = grid.clone();
        for y in 1..h - 1 {
            for x in 1..w - 1 {
                let walls = neighbor_count(&snapshot, x, y, wall);
                if walls >= 5 {
                    grid.set(x, y, wall);
                } else if walls <= 2 {
                    grid.set(x, y, floor);
                }
            }
        }
    }

    if biome == Biome::LavaDepths {
        // lava pools only in wide-open pockets so corridors stay passable
        let snapshot = grid.clone();
        for y in 2..h - 2 {
            for x in 2..w - 2 {
                if snapshot.get(x, y) == Some(floor)
                    && neighbor_count(&snapshot, x, y, floor) >= 7
                    && rng.random_bool(0.3)
                {
                    grid.set(x, y, glyphs::LAVA);
                }
            }
        }
    }
    grid
}

/// Prefab tower interior.
fn spire_template(biome: Biome) -> RoomGrid {
    const TEMPLATE: &[&str] = &[
        "##########",
        "#........#",
        "#.P....P.#",
        "#........#",
        "#.P....P.#",
        "#........#",
        "##########",
    ];
    grid_from_template(TEMPLATE, biome)
}

/// Parse an ASCII template into a grid using the biome's palette.
fn grid_from_template(template: &[&str], biome: Biome) -> RoomGrid {
    let h = template.len() as u8;
    let w = template[0].len() as u8;
    let mut grid = RoomGrid::filled(w, h, biome.wall_glyph());
    for (y, row) in template.iter().enumerate() {
        for (x, ch) in row.chars().enumerate() {
            let glyph = match ch {
                '#' => biome.wall_glyph(),
                '.' => biome.floor_glyph(),
                'P' => glyphs::PILLAR,
                'A' => glyphs::ALTAR,
                'C' => glyphs::CAMPFIRE,
                'S' => glyphs::SHOP_COUNTER,
                '~' => glyphs::WATER,
                _ => biome.floor_glyph(),
            };
            grid.set(x as u8, y as u8, glyph);
        }
    }
    grid
}

fn walled_shell(w: u8, h: u8, biome: Biome) -> RoomGrid {
    let mut grid = RoomGrid::filled(w, h, biome.floor_glyph());
    let wall = biome.wall_glyph();
    for x in 0..w {
        grid.set(x, 0, wall);
        grid.set(x, h - 1, wall);
    }
    for y in 0..h {
        grid.set(0, y, wall);
        grid.set(w - 1, y, wall);
    }
    grid
}

/// Drop `glyph` on interior floor tiles with probability `chance`.
fn scatter(grid: &mut RoomGrid, glyph: Glyph, chance: f64, rng: &mut StdRng) {
    for y in 1..grid.height() - 1 {
        for x in 1..grid.width() - 1 {
            if rng.random_bool(chance) {
                grid.set(x, y, glyph);
            }
        }
    }
}

fn neighbor_count(grid: &RoomGrid, x: u8, y: u8, glyph: Glyph) -> usize {
    let mut count = 0;
    for dy in -1i16..=1 {
        for dx in -1i16..=1 {
            if dx == 0 && dy == 0 {
                continue;
            }
            let nx = x as i16 + dx;
            let ny = y as i16 + dy;
            if nx < 0 || ny < 0 {
                count += 1;
                continue;
            }
            match grid.get(nx as u8, ny as u8) {
                Some(g) if g == glyph => count += 1,
                None => count += 1,
                _ => {}
            }
        }
    }
    count
}

/// Carve doorway tiles for each cardinal exit and connect them to the grid
/// center so every exit is reachable from every other.
pub fn carve_exits(grid: &mut RoomGrid, exits: ExitSet, biome: Biome, legend: &Legend) {
    let floor = biome.floor_glyph();
    let center = (grid.width() / 2, grid.height() / 2);
    grid.set(center.0, center.1, floor);

    let door = if biome.is_underground() || biome == Biome::Ruins || biome == Biome::Spire {
        glyphs::DOOR_OPEN
    } else {
        floor
    };

    for dir in exits.iter() {
        let Some((ex, ey)) = grid.exit_tile(dir) else { continue };
        grid.set(ex, ey, door);

        // L-shaped corridor: horizontal leg first, then vertical
        let mut x = ex;
        let mut y = ey;
        while x != center.0 {
            x = if x < center.0 { x + 1 } else { x - 1 };
            carve_passable(grid, x, y, floor, legend);
        }
        while y != center.1 {
            y = if y < center.1 { y + 1 } else { y - 1 };
            carve_passable(grid, x, y, floor, legend);
        }
    }
}

/// Turn a blocking tile into floor; leaves doors and existing floor alone.
fn carve_passable(grid: &mut RoomGrid, x: u8, y: u8, floor: Glyph, legend: &Legend) {
    if let Some(g) = grid.get(x, y) {
        if g != glyphs::DOOR_OPEN && g != glyphs::STAIRS_UP && g != glyphs::STAIRS_DOWN
            && !legend.is_walkable(g)
        {
            grid.set(x, y, floor);
        }
    }
}

/// Place stairs on a free interior floor tile.
pub fn place_stairs(grid: &mut RoomGrid, dir: Direction, rng: &mut StdRng, legend: &Legend) {
    let glyph = match dir {
        Direction::Up => glyphs::STAIRS_UP,
        Direction::Down => glyphs::STAIRS_DOWN,
        _ => return,
    };
    let spots = grid.floor_positions(legend);
    if spots.is_empty() {
        // degenerate layout: claim the center
        let (cx, cy) = (grid.width() / 2, grid.height() / 2);
        grid.set(cx, cy, glyph);
        return;
    }
    let (x, y) = spots[rng.random_range(0..spots.len())];
    grid.set(x, y, glyph);
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn all_biomes() -> [Biome; 9] {
        [
            Biome::Meadow,
            Biome::Forest,
            Biome::Swamp,
            Biome::Ruins,
            Biome::Spire,
            Biome::Dungeon,
            Biome::Cavern,
            Biome::Crypt,
            Biome::LavaDepths,
        ]
    }

    #[test]
    fn test_layouts_use_only_legend_glyphs() {
        let legend = Legend::standard();
        for biome in all_biomes() {
            let mut rng = StdRng::seed_from_u64(99);
            let grid = generate_layout(biome, &mut rng);
            for (x, y, glyph) in grid.iter() {
                assert!(legend.contains(glyph), "{:?} produced unknown glyph at ({x},{y})", biome);
            }
        }
    }

    #[test]
    fn test_layouts_are_deterministic() {
        for biome in all_biomes() {
            let a = generate_layout(biome, &mut StdRng::seed_from_u64(5));
            let b = generate_layout(biome, &mut StdRng::seed_from_u64(5));
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_grid_dimensions_match_biome() {
        let mut rng = StdRng::seed_from_u64(1);
        let grid = generate_layout(Biome::Meadow, &mut rng);
        assert_eq!((grid.width(), grid.height()), (10, 7));
        let grid = generate_layout(Biome::Cavern, &mut rng);
        assert_eq!((grid.width(), grid.height()), (12, 8));
    }

    #[test]
    fn test_carved_exits_are_walkable_and_connected() {
        let legend = Legend::standard();
        for biome in all_biomes() {
            let mut rng = StdRng::seed_from_u64(31);
            let mut grid = generate_layout(biome, &mut rng);
            let exits: ExitSet =
                [Direction::North, Direction::South, Direction::East, Direction::West]
                    .into_iter()
                    .collect();
            carve_exits(&mut grid, exits, biome, &legend);

            for dir in exits.iter() {
                let (x, y) = grid.exit_tile(dir).unwrap();
                assert!(legend.is_walkable(grid.get(x, y).unwrap()), "{:?} exit {dir} blocked", biome);
            }

            // flood fill from the north exit must reach all other exits
            let start = grid.exit_tile(Direction::North).unwrap();
            let mut seen = vec![false; grid.width() as usize * grid.height() as usize];
            let mut stack = vec![start];
            while let Some((x, y)) = stack.pop() {
                let idx = y as usize * grid.width() as usize + x as usize;
                if seen[idx] {
                    continue;
                }
                seen[idx] = true;
                for (nx, ny) in [
                    (x.wrapping_sub(1), y),
                    (x + 1, y),
                    (x, y.wrapping_sub(1)),
                    (x, y + 1),
                ] {
                    if let Some(g) = grid.get(nx, ny) {
                        if legend.is_walkable(g) {
                            stack.push((nx, ny));
                        }
                    }
                }
            }
            for dir in [Direction::South, Direction::East, Direction::West] {
                let (x, y) = grid.exit_tile(dir).unwrap();
                let idx = y as usize * grid.width() as usize + x as usize;
                assert!(seen[idx], "{:?} exit {dir} unreachable", biome);
            }
        }
    }

    #[test]
    fn test_place_stairs_lands_on_grid() {
        let legend = Legend::standard();
        let mut rng = StdRng::seed_from_u64(77);
        let mut grid = generate_layout(Biome::Dungeon, &mut rng);
        place_stairs(&mut grid, Direction::Down, &mut rng, &legend);
        assert!(grid.iter().any(|(_, _, g)| g == glyphs::STAIRS_DOWN));
    }
}
