use std::collections::BTreeMap;
use std::ops::Range;

use serde::Serialize;

use crate::connectivity::DirFlags;
use crate::geometry::{Direction, GridGeometry, TileIndex};

/// Axis-aligned fill rectangle between two tile centres.
///
/// Covers the cells whose top-left tile lies in columns
/// `top_left.col..bottom_right.col` and rows `top_left.row..bottom_right.row`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct FillRect {
    pub top_left: TileIndex,
    pub bottom_right: TileIndex,
}

impl FillRect {
    pub const fn new(top_left: TileIndex, bottom_right: TileIndex) -> Self {
        Self {
            top_left,
            bottom_right,
        }
    }

    pub fn columns(&self, geometry: GridGeometry) -> Range<usize> {
        geometry.column(self.top_left)..geometry.column(self.bottom_right)
    }

    pub fn rows(&self, geometry: GridGeometry) -> Range<usize> {
        geometry.row(self.top_left)..geometry.row(self.bottom_right)
    }

    pub fn cell_count(&self, geometry: GridGeometry) -> usize {
        self.columns(geometry).len() * self.rows(geometry).len()
    }

    /// Cells covered, named by their top-left tile, in row-major order.
    pub fn cells(&self, geometry: GridGeometry) -> impl Iterator<Item = TileIndex> {
        let columns = self.columns(geometry);
        self.rows(geometry).flat_map(move |row| {
            columns
                .clone()
                .map(move |column| geometry.index(column, row))
        })
    }
}

/// Horizontal run of enclosed cells in one row, between two downward loop edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    right: usize,
    /// An endpoint also runs along the row, so this is the top edge of a
    /// region rather than a continuation of the span above.
    broken: bool,
}

type SpanRows = BTreeMap<usize, BTreeMap<usize, Span>>;

/// Splits the area enclosed by a loop into rectangles.
///
/// `tiles` maps each loop tile to the loop edges meeting there. Rows are
/// scanned into spans, then each span is stretched downwards while the row
/// below holds a clean span with the same columns. Rectangles come out in
/// discovery order: top to bottom, left to right.
pub fn decompose(geometry: GridGeometry, tiles: &BTreeMap<TileIndex, DirFlags>) -> Vec<FillRect> {
    let rows = extract_spans(geometry, tiles);
    merge_spans(geometry, rows)
}

fn extract_spans(geometry: GridGeometry, tiles: &BTreeMap<TileIndex, DirFlags>) -> SpanRows {
    let mut rows = SpanRows::new();
    let mut open: Option<(usize, usize, DirFlags)> = None;

    for (&tile, &flags) in tiles {
        if !flags.can_go(Direction::Down) {
            continue;
        }
        let (column, row) = geometry.position(tile);
        match open.take() {
            Some((open_row, left, left_flags)) if open_row == row => {
                let broken = left_flags.can_go(Direction::Right) || flags.can_go(Direction::Left);
                rows.entry(row).or_default().insert(
                    left,
                    Span {
                        right: column,
                        broken,
                    },
                );
            }
            // Anything still open belongs to an earlier row and is dropped.
            _ => open = Some((row, column, flags)),
        }
    }

    rows
}

fn merge_spans(geometry: GridGeometry, mut rows: SpanRows) -> Vec<FillRect> {
    let mut rects = Vec::new();

    while let Some((row, spans)) = rows.pop_first() {
        for (left, span) in spans {
            let mut height = 1;
            while let Some(below) = rows.get_mut(&(row + height)) {
                match below.get(&left) {
                    Some(next) if next.right == span.right && !next.broken => {
                        below.remove(&left);
                        height += 1;
                    }
                    _ => break,
                }
            }
            rects.push(FillRect::new(
                geometry.index(left, row),
                geometry.index(span.right, row + height),
            ));
        }
    }

    rects
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    /// Loop flags for a closed polyline given by its corner positions.
    fn polygon(geometry: GridGeometry, corners: &[(usize, usize)]) -> BTreeMap<TileIndex, DirFlags> {
        let mut tiles: BTreeMap<TileIndex, DirFlags> = BTreeMap::new();
        for (i, &(x0, y0)) in corners.iter().enumerate() {
            let (x1, y1) = corners[(i + 1) % corners.len()];
            let dir = match (x1.cmp(&x0), y1.cmp(&y0)) {
                (std::cmp::Ordering::Greater, _) => Direction::Right,
                (std::cmp::Ordering::Less, _) => Direction::Left,
                (_, std::cmp::Ordering::Greater) => Direction::Down,
                _ => Direction::Up,
            };
            let (mut x, mut y) = (x0, y0);
            while (x, y) != (x1, y1) {
                tiles.entry(geometry.index(x, y)).or_default().insert(dir);
                let (dx, dy) = dir.step();
                x = (x as isize + dx) as usize;
                y = (y as isize + dy) as usize;
                tiles
                    .entry(geometry.index(x, y))
                    .or_default()
                    .insert(dir.opposite());
            }
        }
        tiles
    }

    /// Cells inside the polyline by ray casting over its vertical edges.
    fn enclosed_cells(geometry: GridGeometry, corners: &[(usize, usize)]) -> BTreeSet<TileIndex> {
        let mut vertical = Vec::new();
        for (i, &(x0, y0)) in corners.iter().enumerate() {
            let (x1, y1) = corners[(i + 1) % corners.len()];
            if x0 == x1 {
                vertical.push((x0, y0.min(y1), y0.max(y1)));
            }
        }

        let mut cells = BTreeSet::new();
        for row in 0..geometry.rows.saturating_sub(1) {
            for column in 0..geometry.columns.saturating_sub(1) {
                let crossings = vertical
                    .iter()
                    .filter(|(x, top, bottom)| *x > column && *top <= row && row < *bottom)
                    .count();
                if crossings % 2 == 1 {
                    cells.insert(geometry.index(column, row));
                }
            }
        }
        cells
    }

    fn assert_exact_cover(geometry: GridGeometry, corners: &[(usize, usize)]) -> Vec<FillRect> {
        let rects = decompose(geometry, &polygon(geometry, corners));
        let mut covered = BTreeSet::new();
        for rect in &rects {
            for cell in rect.cells(geometry) {
                assert!(covered.insert(cell), "cell {cell} covered twice by {rects:?}");
            }
        }
        assert_eq!(covered, enclosed_cells(geometry, corners), "cover mismatch for {rects:?}");
        rects
    }

    #[test]
    fn square_loop_is_one_rect() {
        let geometry = GridGeometry::new(4, 4);
        let rects = assert_exact_cover(geometry, &[(0, 0), (1, 0), (1, 1), (0, 1)]);
        assert_eq!(rects, vec![FillRect::new(0, 5)]);
    }

    #[test]
    fn tall_rectangle_merges_rows() {
        let geometry = GridGeometry::new(6, 6);
        let rects = assert_exact_cover(geometry, &[(1, 1), (4, 1), (4, 5), (1, 5)]);
        assert_eq!(
            rects,
            vec![FillRect::new(geometry.index(1, 1), geometry.index(4, 5))]
        );
        assert_eq!(rects[0].cell_count(geometry), 12);
    }

    #[test]
    fn notched_top_splits_into_three() {
        let geometry = GridGeometry::new(5, 3);
        let rects = assert_exact_cover(
            geometry,
            &[
                (0, 0),
                (1, 0),
                (1, 1),
                (3, 1),
                (3, 0),
                (4, 0),
                (4, 2),
                (0, 2),
            ],
        );
        assert_eq!(
            rects,
            vec![
                FillRect::new(geometry.index(0, 0), geometry.index(1, 1)),
                FillRect::new(geometry.index(3, 0), geometry.index(4, 1)),
                FillRect::new(geometry.index(0, 1), geometry.index(4, 2)),
            ]
        );
    }

    #[test]
    fn concave_shapes_are_covered_exactly() {
        let geometry = GridGeometry::new(8, 8);
        // L shape.
        assert_exact_cover(geometry, &[(0, 0), (2, 0), (2, 3), (5, 3), (5, 5), (0, 5)]);
        // U shape, two spans per row in the arms.
        assert_exact_cover(
            geometry,
            &[
                (1, 1),
                (3, 1),
                (3, 4),
                (4, 4),
                (4, 1),
                (6, 1),
                (6, 7),
                (1, 7),
            ],
        );
        // Staircase.
        assert_exact_cover(
            geometry,
            &[
                (0, 0),
                (1, 0),
                (1, 1),
                (2, 1),
                (2, 2),
                (3, 2),
                (3, 3),
                (0, 3),
            ],
        );
    }

    #[test]
    fn broken_lower_span_starts_new_rect() {
        let geometry = GridGeometry::new(3, 3);
        let tiles: BTreeMap<_, _> = [
            (0, DirFlags::RIGHT | DirFlags::DOWN),
            (2, DirFlags::LEFT | DirFlags::DOWN),
            (3, DirFlags::UP | DirFlags::DOWN | DirFlags::RIGHT),
            (5, DirFlags::UP | DirFlags::DOWN),
        ]
        .into_iter()
        .collect();
        assert_eq!(
            decompose(geometry, &tiles),
            vec![FillRect::new(0, 5), FillRect::new(3, 8)]
        );
    }

    #[test]
    fn dangling_edge_is_ignored() {
        let geometry = GridGeometry::new(3, 3);
        let tiles: BTreeMap<_, _> = [(0, DirFlags::DOWN), (3, DirFlags::UP)].into_iter().collect();
        assert!(decompose(geometry, &tiles).is_empty());
    }
}
