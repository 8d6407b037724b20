/// Flat identity of a grid cell: `row * columns + column`.
pub type TileIndex = usize;

/// Absolute movement direction on the grid. `Up` decreases the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Direction {
    Left,
    Right,
    Up,
    Down,
}

impl Direction {
    /// Every direction in bake order.
    pub const ALL: [Direction; 4] = [
        Direction::Left,
        Direction::Right,
        Direction::Up,
        Direction::Down,
    ];

    pub const fn opposite(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
            Self::Up => Self::Down,
            Self::Down => Self::Up,
        }
    }

    /// Absolute direction reached by applying `turn` while facing `self`.
    pub const fn turn(self, turn: Turn) -> Self {
        match (self, turn) {
            (facing, Turn::Forward) => facing,
            (Self::Up, Turn::Left) | (Self::Down, Turn::Right) => Self::Left,
            (Self::Up, Turn::Right) | (Self::Down, Turn::Left) => Self::Right,
            (Self::Right, Turn::Left) | (Self::Left, Turn::Right) => Self::Up,
            (Self::Right, Turn::Right) | (Self::Left, Turn::Left) => Self::Down,
        }
    }

    /// Per-axis step `(dx, dy)`.
    pub const fn step(self) -> (isize, isize) {
        match self {
            Self::Left => (-1, 0),
            Self::Right => (1, 0),
            Self::Up => (0, -1),
            Self::Down => (0, 1),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
            Self::Up => "up",
            Self::Down => "down",
        }
    }
}

/// Relative turn used by the loop tracer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Turn {
    Left,
    Forward,
    Right,
}

impl Turn {
    /// The other side. `Forward` stays `Forward`.
    pub const fn mirrored(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Forward => Self::Forward,
            Self::Right => Self::Left,
        }
    }
}

/// Column/row dimensions of a level and the index arithmetic over them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridGeometry {
    pub columns: usize,
    pub rows: usize,
}

impl GridGeometry {
    pub const fn new(columns: usize, rows: usize) -> Self {
        Self { columns, rows }
    }

    pub const fn tile_count(&self) -> usize {
        self.columns * self.rows
    }

    pub const fn index(&self, column: usize, row: usize) -> TileIndex {
        row * self.columns + column
    }

    pub const fn column(&self, tile: TileIndex) -> usize {
        tile % self.columns
    }

    pub const fn row(&self, tile: TileIndex) -> usize {
        tile / self.columns
    }

    pub const fn position(&self, tile: TileIndex) -> (usize, usize) {
        (self.column(tile), self.row(tile))
    }

    pub const fn contains(&self, tile: TileIndex) -> bool {
        tile < self.tile_count()
    }

    pub fn contains_position(&self, column: isize, row: isize) -> bool {
        column >= 0 && row >= 0 && (column as usize) < self.columns && (row as usize) < self.rows
    }

    /// Signed index offset of one step in `dir`.
    pub const fn delta(&self, dir: Direction) -> isize {
        match dir {
            Direction::Left => -1,
            Direction::Right => 1,
            Direction::Up => -(self.columns as isize),
            Direction::Down => self.columns as isize,
        }
    }

    /// Tile one step away in `dir`, or `None` when the step leaves the grid.
    pub fn neighbor(&self, tile: TileIndex, dir: Direction) -> Option<TileIndex> {
        if !self.contains(tile) {
            return None;
        }
        let (dx, dy) = dir.step();
        let column = self.column(tile) as isize + dx;
        let row = self.row(tile) as isize + dy;
        if !self.contains_position(column, row) {
            return None;
        }
        tile.checked_add_signed(self.delta(dir))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turns_are_relative_to_facing() {
        assert_eq!(Direction::Up.turn(Turn::Left), Direction::Left);
        assert_eq!(Direction::Right.turn(Turn::Left), Direction::Up);
        assert_eq!(Direction::Right.turn(Turn::Right), Direction::Down);
        assert_eq!(Direction::Down.turn(Turn::Right), Direction::Left);
        assert_eq!(Direction::Left.turn(Turn::Left), Direction::Down);
        assert_eq!(Direction::Left.turn(Turn::Forward), Direction::Left);
    }

    #[test]
    fn neighbor_stops_at_edges() {
        let geometry = GridGeometry::new(3, 2);
        assert_eq!(geometry.neighbor(0, Direction::Left), None);
        assert_eq!(geometry.neighbor(0, Direction::Up), None);
        assert_eq!(geometry.neighbor(2, Direction::Right), None);
        assert_eq!(geometry.neighbor(2, Direction::Down), Some(5));
        assert_eq!(geometry.neighbor(3, Direction::Left), None);
        assert_eq!(geometry.neighbor(4, Direction::Up), Some(1));
    }

    #[test]
    fn index_round_trips_through_position() {
        let geometry = GridGeometry::new(5, 4);
        let tile = geometry.index(3, 2);
        assert_eq!(tile, 13);
        assert_eq!(geometry.position(tile), (3, 2));
    }
}
