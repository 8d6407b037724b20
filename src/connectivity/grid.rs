//! In-memory tile storage and the plain-text level format.
//!
//! Levels are drawn on a character map where tiles sit on even columns and
//! even lines, and the characters between them describe links:
//!
//! ```text
//! *-o-o
//! | | |
//! o-o o
//! |   |
//! o-o-o
//! ```
//!
//! - `o` or `+` is a tile, `*` is a tile carrying a dot, a space is an empty tile.
//! - `-` links two tiles horizontally and `|` links them vertically.
//! - Characters between four tiles are cells; spaces, `.` and `#` are accepted.

use std::str::FromStr;

use crate::error::{Result, ShapeError};
use crate::geometry::{Direction, GridGeometry, TileIndex};

use super::flags::{DirFlags, TileSource};

/// Per-tile exit flags for a rectangular level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileGrid {
    geometry: GridGeometry,
    flags: Vec<DirFlags>,
}

impl TileGrid {
    /// Grid with every tile closed.
    pub fn new(geometry: GridGeometry) -> Result<Self> {
        if geometry.columns == 0 || geometry.rows == 0 {
            return Err(ShapeError::EmptyGrid);
        }
        Ok(Self {
            geometry,
            flags: vec![DirFlags::NONE; geometry.tile_count()],
        })
    }

    pub fn from_flags(columns: usize, rows: usize, flags: Vec<DirFlags>) -> Result<Self> {
        let geometry = GridGeometry::new(columns, rows);
        if columns == 0 || rows == 0 {
            return Err(ShapeError::EmptyGrid);
        }
        if flags.len() != geometry.tile_count() {
            return Err(ShapeError::FlagCountMismatch {
                expected: geometry.tile_count(),
                actual: flags.len(),
            });
        }
        Ok(Self { geometry, flags })
    }

    /// Every tile linked to each neighbour inside the grid.
    pub fn fully_connected(columns: usize, rows: usize) -> Result<Self> {
        let mut grid = Self::new(GridGeometry::new(columns, rows))?;
        for tile in 0..grid.geometry.tile_count() {
            grid.flags[tile] = Direction::ALL
                .into_iter()
                .filter(|dir| grid.geometry.neighbor(tile, *dir).is_some())
                .collect();
        }
        Ok(grid)
    }

    /// Links `tile` to its neighbour in `dir` on both sides. Returns `false`
    /// when the link already existed.
    pub fn connect(&mut self, tile: TileIndex, dir: Direction) -> Result<bool> {
        let other = self.linked_neighbor(tile, dir)?;
        let changed = !self.flags[tile].can_go(dir);
        self.flags[tile].insert(dir);
        self.flags[other].insert(dir.opposite());
        Ok(changed)
    }

    /// Removes the link between `tile` and its neighbour in `dir` on both
    /// sides. Returns `false` when there was no link.
    pub fn disconnect(&mut self, tile: TileIndex, dir: Direction) -> Result<bool> {
        let other = self.linked_neighbor(tile, dir)?;
        let changed = self.flags[tile].can_go(dir);
        self.flags[tile].remove(dir);
        self.flags[other].remove(dir.opposite());
        Ok(changed)
    }

    /// Overwrites one tile's flags without touching its neighbours.
    pub fn set_flags(&mut self, tile: TileIndex, flags: DirFlags) -> Result<()> {
        let slot = self
            .flags
            .get_mut(tile)
            .ok_or(ShapeError::TileOutOfBounds(tile))?;
        *slot = flags;
        Ok(())
    }

    fn linked_neighbor(&self, tile: TileIndex, dir: Direction) -> Result<TileIndex> {
        self.geometry
            .neighbor(tile, dir)
            .ok_or(ShapeError::TileOutOfBounds(tile))
    }
}

impl TileSource for TileGrid {
    fn geometry(&self) -> GridGeometry {
        self.geometry
    }

    fn flags(&self, tile: TileIndex) -> DirFlags {
        self.flags.get(tile).copied().unwrap_or(DirFlags::NONE)
    }
}

/// A parsed level: topology plus the tiles that start with a dot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Level {
    pub grid: TileGrid,
    pub dots: Vec<TileIndex>,
}

impl Level {
    pub fn parse(text: &str) -> Result<Self> {
        let lines: Vec<Vec<char>> = text.lines().map(|line| line.chars().collect()).collect();
        let first = lines.iter().position(|line| !is_blank(line));
        let last = lines.iter().rposition(|line| !is_blank(line));
        let (first, last) = match (first, last) {
            (Some(first), Some(last)) => (first, last),
            _ => return Err(ShapeError::EmptyGrid),
        };
        let lines = &lines[first..=last];
        let origin = first + 1;

        let height = lines.len();
        let width = lines.iter().map(Vec::len).max().unwrap_or(0);
        let geometry = GridGeometry::new(width.div_ceil(2), height.div_ceil(2));
        let mut grid = TileGrid::new(geometry)?;
        let mut dots = Vec::new();

        let glyph = |x: usize, y: usize| lines[y].get(x).copied().unwrap_or(' ');
        let is_tile = |x: usize, y: usize| matches!(glyph(x, y), 'o' | '+' | '*');

        for (y, line) in lines.iter().enumerate() {
            for (x, &ch) in line.iter().enumerate() {
                let fail = |reason: &str| ShapeError::LevelParse {
                    line: origin + y,
                    column: x + 1,
                    reason: reason.to_string(),
                };
                match (x % 2, y % 2, ch) {
                    (_, _, ' ') => {}
                    (0, 0, 'o' | '+') => {}
                    (0, 0, '*') => dots.push(geometry.index(x / 2, y / 2)),
                    (1, 0, '-') => {
                        if !is_tile(x - 1, y) || !is_tile(x + 1, y) {
                            return Err(fail("horizontal link needs a tile on both sides"));
                        }
                        grid.connect(geometry.index(x / 2, y / 2), Direction::Right)?;
                    }
                    (0, 1, '|') => {
                        if !is_tile(x, y - 1) || y + 1 >= height || !is_tile(x, y + 1) {
                            return Err(fail("vertical link needs a tile above and below"));
                        }
                        grid.connect(geometry.index(x / 2, y / 2), Direction::Down)?;
                    }
                    (1, 1, '.' | '#') => {}
                    (0, 0, _) => return Err(fail("expected a tile glyph")),
                    (1, 0, _) => return Err(fail("expected '-' or a space")),
                    (0, 1, _) => return Err(fail("expected '|' or a space")),
                    _ => return Err(fail("unexpected glyph in cell")),
                }
            }
        }

        Ok(Self { grid, dots })
    }
}

impl FromStr for Level {
    type Err = ShapeError;

    fn from_str(text: &str) -> Result<Self> {
        Self::parse(text)
    }
}

fn is_blank(line: &[char]) -> bool {
    line.iter().all(|ch| ch.is_whitespace())
}
