use std::fmt;
use std::ops::BitOr;

use crate::geometry::{Direction, GridGeometry, TileIndex, Turn};

/// Bitset of traversable exits of a tile.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DirFlags(u8);

impl DirFlags {
    pub const NONE: Self = Self(0);
    pub const LEFT: Self = Self(1);
    pub const RIGHT: Self = Self(1 << 1);
    pub const UP: Self = Self(1 << 2);
    pub const DOWN: Self = Self(1 << 3);
    pub const ALL: Self = Self(0b1111);

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & Self::ALL.0)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn of(dir: Direction) -> Self {
        match dir {
            Direction::Left => Self::LEFT,
            Direction::Right => Self::RIGHT,
            Direction::Up => Self::UP,
            Direction::Down => Self::DOWN,
        }
    }

    pub const fn can_go(self, dir: Direction) -> bool {
        self.0 & Self::of(dir).0 != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn count(self) -> u32 {
        self.0.count_ones()
    }

    pub const fn with(self, dir: Direction) -> Self {
        Self(self.0 | Self::of(dir).0)
    }

    pub const fn without(self, dir: Direction) -> Self {
        Self(self.0 & !Self::of(dir).0)
    }

    pub fn insert(&mut self, dir: Direction) {
        *self = self.with(dir);
    }

    pub fn remove(&mut self, dir: Direction) {
        *self = self.without(dir);
    }

    /// A plain through-path: exactly left+right or exactly up+down.
    pub fn is_straight(self) -> bool {
        self == Self::LEFT | Self::RIGHT || self == Self::UP | Self::DOWN
    }

    /// First of `order` (relative to `facing`) whose absolute direction is open.
    pub fn way_to_go(self, facing: Direction, order: [Turn; 3]) -> Step {
        order
            .into_iter()
            .map(|turn| facing.turn(turn))
            .find(|dir| self.can_go(*dir))
            .map_or(Step::Backward, Step::Go)
    }

    pub fn iter(self) -> impl Iterator<Item = Direction> {
        Direction::ALL.into_iter().filter(move |dir| self.can_go(*dir))
    }
}

impl BitOr for DirFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl FromIterator<Direction> for DirFlags {
    fn from_iter<I: IntoIterator<Item = Direction>>(iter: I) -> Self {
        iter.into_iter().fold(Self::NONE, Self::with)
    }
}

impl fmt::Debug for DirFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set()
            .entries(self.iter().map(Direction::name))
            .finish()
    }
}

/// Result of asking a tile which way to continue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Go(Direction),
    /// No requested exit is open; only turning back would continue the walk.
    Backward,
}

/// Read access to level topology. Hosts implement this over their own tile
/// storage; [`TileGrid`](super::TileGrid) is the in-memory version.
pub trait TileSource {
    fn geometry(&self) -> GridGeometry;

    /// Exits of `tile`. Tiles outside the grid report no exits.
    fn flags(&self, tile: TileIndex) -> DirFlags;
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEFT_FIRST: [Turn; 3] = [Turn::Left, Turn::Forward, Turn::Right];

    #[test]
    fn straight_detection() {
        assert!((DirFlags::LEFT | DirFlags::RIGHT).is_straight());
        assert!((DirFlags::UP | DirFlags::DOWN).is_straight());
        assert!(!(DirFlags::UP | DirFlags::RIGHT).is_straight());
        assert!(!DirFlags::ALL.is_straight());
        assert!(!DirFlags::LEFT.is_straight());
    }

    #[test]
    fn way_to_go_prefers_requested_order() {
        let flags = DirFlags::ALL;
        assert_eq!(
            flags.way_to_go(Direction::Right, LEFT_FIRST),
            Step::Go(Direction::Up)
        );

        let flags = DirFlags::LEFT | DirFlags::RIGHT | DirFlags::DOWN;
        assert_eq!(
            flags.way_to_go(Direction::Right, LEFT_FIRST),
            Step::Go(Direction::Right)
        );
    }

    #[test]
    fn way_to_go_reports_backward_at_dead_end() {
        let flags = DirFlags::LEFT;
        assert_eq!(flags.way_to_go(Direction::Right, LEFT_FIRST), Step::Backward);
    }

    #[test]
    fn collects_from_directions() {
        let flags: DirFlags = [Direction::Up, Direction::Left].into_iter().collect();
        assert_eq!(flags, DirFlags::UP | DirFlags::LEFT);
        assert_eq!(flags.count(), 2);
        assert_eq!(flags.without(Direction::Up), DirFlags::LEFT);
    }
}
