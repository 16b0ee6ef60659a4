//! World coordinates and the six movement directions

use serde::{Deserialize, Serialize};
use std::fmt;

/// Absolute room address. `z` is the vertical layer; negative is underground.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Coord {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Coord {
    pub const ORIGIN: Coord = Coord { x: 0, y: 0, z: 0 };

    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// The coordinate one step in `dir`.
    pub fn neighbor(self, dir: Direction) -> Coord {
        let (dx, dy, dz) = dir.offset();
        Coord::new(self.x + dx, self.y + dy, self.z + dz)
    }

    /// All six neighbors with the direction that leads to each.
    pub fn neighbors(self) -> [(Direction, Coord); 6] {
        Direction::ALL.map(|d| (d, self.neighbor(d)))
    }

    /// The four same-layer neighbors.
    pub fn cardinal_neighbors(self) -> [(Direction, Coord); 4] {
        Direction::CARDINAL.map(|d| (d, self.neighbor(d)))
    }

    /// Chebyshev distance on the (x, y) plane; depth counts double.
    pub fn zone_distance(self, other: Coord) -> u32 {
        let dx = (self.x - other.x).unsigned_abs();
        let dy = (self.y - other.y).unsigned_abs();
        let dz = (self.z - other.z).unsigned_abs();
        dx.max(dy) + dz * 2
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{},{})", self.x, self.y, self.z)
    }
}

/// Movement direction. North is -y, matching the grid's row order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction {
    North,
    South,
    East,
    West,
    Up,
    Down,
}

impl Direction {
    pub const ALL: [Direction; 6] = [
        Direction::North,
        Direction::South,
        Direction::East,
        Direction::West,
        Direction::Up,
        Direction::Down,
    ];

    pub const CARDINAL: [Direction; 4] = [
        Direction::North,
        Direction::South,
        Direction::East,
        Direction::West,
    ];

    pub fn opposite(self) -> Direction {
        match self {
            Direction::North => Direction::South,
            Direction::South => Direction::North,
            Direction::East => Direction::West,
            Direction::West => Direction::East,
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
        }
    }

    pub fn offset(self) -> (i32, i32, i32) {
        match self {
            Direction::North => (0, -1, 0),
            Direction::South => (0, 1, 0),
            Direction::East => (1, 0, 0),
            Direction::West => (-1, 0, 0),
            Direction::Up => (0, 0, 1),
            Direction::Down => (0, 0, -1),
        }
    }

    /// Short compass name used in descriptions and save summaries.
    pub fn short_name(self) -> &'static str {
        match self {
            Direction::North => "north",
            Direction::South => "south",
            Direction::East => "east",
            Direction::West => "west",
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// Exit topology of a room, one bit per direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitSet {
    bits: u8,
}

impl ExitSet {
    pub const EMPTY: ExitSet = ExitSet { bits: 0 };

    fn bit(dir: Direction) -> u8 {
        match dir {
            Direction::North => 1,
            Direction::South => 2,
            Direction::East => 4,
            Direction::West => 8,
            Direction::Up => 16,
            Direction::Down => 32,
        }
    }

    pub fn insert(&mut self, dir: Direction) {
        self.bits |= Self::bit(dir);
    }

    pub fn remove(&mut self, dir: Direction) {
        self.bits &= !Self::bit(dir);
    }

    pub fn contains(&self, dir: Direction) -> bool {
        self.bits & Self::bit(dir) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    pub fn len(&self) -> usize {
        self.bits.count_ones() as usize
    }

    pub fn iter(&self) -> impl Iterator<Item = Direction> + '_ {
        Direction::ALL.into_iter().filter(|d| self.contains(*d))
    }
}

impl FromIterator<Direction> for ExitSet {
    fn from_iter<T: IntoIterator<Item = Direction>>(iter: T) -> Self {
        let mut set = ExitSet::EMPTY;
        for d in iter {
            set.insert(d);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opposites_are_involutions() {
        for dir in Direction::ALL {
            assert_eq!(dir.opposite().opposite(), dir);
        }
    }

    #[test]
    fn test_neighbor_round_trip() {
        let origin = Coord::ORIGIN;
        for dir in Direction::ALL {
            assert_eq!(origin.neighbor(dir).neighbor(dir.opposite()), origin);
        }
    }

    #[test]
    fn test_north_decreases_y() {
        assert_eq!(Coord::ORIGIN.neighbor(Direction::North), Coord::new(0, -1, 0));
    }

    #[test]
    fn test_exit_set_round_trip() {
        let set: ExitSet = [Direction::North, Direction::Down].into_iter().collect();
        assert!(set.contains(Direction::North));
        assert!(set.contains(Direction::Down));
        assert!(!set.contains(Direction::East));
        assert_eq!(set.len(), 2);
        let back: Vec<Direction> = set.iter().collect();
        assert_eq!(back, vec![Direction::North, Direction::Down]);
    }

    #[test]
    fn test_zone_distance_counts_depth_double() {
        assert_eq!(Coord::new(3, -2, 0).zone_distance(Coord::ORIGIN), 3);
        assert_eq!(Coord::new(0, 0, -2).zone_distance(Coord::ORIGIN), 4);
    }
}
