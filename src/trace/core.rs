use std::collections::BTreeMap;

use crate::connectivity::{DirFlags, Step, TileSource};
use crate::geometry::{Direction, GridGeometry, TileIndex, Turn};

/// Which way the tracer leans at every junction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TraceBias {
    /// Prefer left turns, fall back to right turns.
    LeftFirst,
    /// Prefer right turns, fall back to left turns.
    RightFirst,
}

impl TraceBias {
    /// Bake order: left-first, then right-first.
    pub const BOTH: [TraceBias; 2] = [TraceBias::LeftFirst, TraceBias::RightFirst];

    /// `(preferred, alternate)` turns.
    pub const fn turns(self) -> (Turn, Turn) {
        match self {
            Self::LeftFirst => (Turn::Left, Turn::Right),
            Self::RightFirst => (Turn::Right, Turn::Left),
        }
    }
}

/// One tracer invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceRequest {
    pub start: TileIndex,
    pub facing: Direction,
    pub preferred: Turn,
    pub alternate: Turn,
}

impl TraceRequest {
    pub fn new(start: TileIndex, facing: Direction, bias: TraceBias) -> Self {
        let (preferred, alternate) = bias.turns();
        Self {
            start,
            facing,
            preferred,
            alternate,
        }
    }
}

/// A closed walk that passed the minimality check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracedLoop {
    /// Every tile on the loop with the two loop edges meeting there.
    pub tiles: BTreeMap<TileIndex, DirFlags>,
    /// Non-straight tiles in walk order.
    pub corners: Vec<TileIndex>,
    /// Marker tiles in walk order, start included when it is a marker.
    pub markers: Vec<TileIndex>,
}

/// How a trace ended. Only `Closed` carries a loop; the rest are ordinary
/// outcomes of walking an open or branching topology.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceOutcome {
    Closed(TracedLoop),
    /// The walk hit a tile where it could only turn back.
    DeadEnd,
    /// The walk ran into its own tail instead of the start tile.
    Reentered,
    /// A shorter loop branched off this one.
    NonMinimal,
}

impl TraceOutcome {
    pub fn into_loop(self) -> Option<TracedLoop> {
        match self {
            Self::Closed(traced) => Some(traced),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Closed(_) => "closed",
            Self::DeadEnd => "dead_end",
            Self::Reentered => "reentered",
            Self::NonMinimal => "non_minimal",
        }
    }
}

/// Branch the walk could have taken with its alternate turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AltCandidate {
    tile: TileIndex,
    step: (isize, isize),
}

/// Walks the connectivity graph from `request.start` until it revisits a tile.
///
/// The first step always leaves in `request.facing`. Afterwards each tile is
/// left through the first open exit among preferred turn, forward and
/// alternate turn. The walk closes when it comes back to the start tile, and
/// the loop is kept only if no straight line from a skipped alternate branch
/// runs back into the loop.
pub fn trace_loop<T, F>(tiles: &T, request: TraceRequest, is_marker: F) -> TraceOutcome
where
    T: TileSource + ?Sized,
    F: Fn(TileIndex) -> bool,
{
    let geometry = tiles.geometry();
    let start = request.start;
    if !geometry.contains(start) || !tiles.flags(start).can_go(request.facing) {
        return TraceOutcome::DeadEnd;
    }

    let order = [request.preferred, Turn::Forward, request.alternate];
    let mut visited: BTreeMap<TileIndex, DirFlags> = BTreeMap::new();
    let mut corners = Vec::new();
    let mut markers = Vec::new();
    let mut alternates = Vec::new();

    let mut record =
        |tile: TileIndex, entry: DirFlags, visited: &mut BTreeMap<TileIndex, DirFlags>| {
            visited.insert(tile, entry);
            if !tiles.flags(tile).is_straight() {
                corners.push(tile);
            }
            if is_marker(tile) {
                markers.push(tile);
            }
        };

    record(start, DirFlags::NONE, &mut visited);
    let mut current = start;
    let mut heading = request.facing;

    loop {
        if let Some(flags) = visited.get_mut(&current) {
            flags.insert(heading);
        }
        let Some(next) = geometry.neighbor(current, heading) else {
            return TraceOutcome::DeadEnd;
        };

        if let Some(flags) = visited.get_mut(&next) {
            if next != start {
                return TraceOutcome::Reentered;
            }
            flags.insert(heading.opposite());
            break;
        }
        record(next, DirFlags::of(heading.opposite()), &mut visited);

        current = next;
        let facing = heading;
        let flags = tiles.flags(current);
        heading = match flags.way_to_go(facing, order) {
            Step::Go(dir) => dir,
            Step::Backward => return TraceOutcome::DeadEnd,
        };

        let alternate = facing.turn(request.alternate);
        if heading != alternate && flags.can_go(alternate) {
            alternates.push(AltCandidate {
                tile: current,
                step: alternate.step(),
            });
        }
    }

    if alternates
        .iter()
        .any(|candidate| better_alternate_exists(geometry, &visited, *candidate))
    {
        return TraceOutcome::NonMinimal;
    }

    TraceOutcome::Closed(TracedLoop {
        tiles: visited,
        corners,
        markers,
    })
}

/// Straight walk from the candidate to the grid edge, ignoring connectivity.
/// Hitting a tile of the current loop means a smaller loop was available.
fn better_alternate_exists(
    geometry: GridGeometry,
    visited: &BTreeMap<TileIndex, DirFlags>,
    candidate: AltCandidate,
) -> bool {
    let (dx, dy) = candidate.step;
    let (column, row) = geometry.position(candidate.tile);
    let (mut column, mut row) = (column as isize, row as isize);
    loop {
        column += dx;
        row += dy;
        if !geometry.contains_position(column, row) {
            return false;
        }
        if visited.contains_key(&geometry.index(column as usize, row as usize)) {
            return true;
        }
    }
}
