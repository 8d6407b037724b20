use std::collections::BTreeMap;

use crate::connectivity::{DirFlags, TileSource};
use crate::fill::FillRect;
use crate::geometry::{Direction, GridGeometry, TileIndex};
use crate::trace::{TraceBias, TraceOutcome, TraceRequest, TracedLoop, trace_loop};

use super::shape::{Dedup, Shape, ShapeId, Signature, SignatureSet};

/// Registry behaviour knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Keep each completed shape's rectangles on the shape itself.
    pub retain_fill_rects: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            retain_fill_rects: true,
        }
    }
}

/// Per-marker bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Marker {
    shapes: Vec<ShapeId>,
    explored: DirFlags,
    consumed: bool,
}

impl Marker {
    pub fn shapes(&self) -> &[ShapeId] {
        &self.shapes
    }

    /// Directions already traced from this marker in the current bake.
    pub fn explored(&self) -> DirFlags {
        self.explored
    }

    /// Set once the dot on this tile has been removed.
    pub fn is_consumed(&self) -> bool {
        self.consumed
    }

    fn clear_bake_state(&mut self) {
        self.shapes.clear();
        self.explored = DirFlags::NONE;
    }
}

/// Tally of one bake.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BakeStats {
    pub traces: u64,
    pub closed: u64,
    pub dead_ends: u64,
    pub reentered: u64,
    pub non_minimal: u64,
    pub duplicates: u64,
    pub shapes: u64,
}

impl BakeStats {
    fn record(&mut self, outcome: &TraceOutcome) {
        self.traces += 1;
        match outcome {
            TraceOutcome::Closed(_) => self.closed += 1,
            TraceOutcome::DeadEnd => self.dead_ends += 1,
            TraceOutcome::Reentered => self.reentered += 1,
            TraceOutcome::NonMinimal => self.non_minimal += 1,
        }
    }
}

/// A shape that reached zero remaining dots, with its rectangle cover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub shape: ShapeId,
    pub rects: Vec<FillRect>,
}

/// Effect of removing the dot on one tile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DotRemoval {
    pub tile: TileIndex,
    /// Shapes whose counter was decremented, in marker order.
    pub touched: Vec<ShapeId>,
    /// Shapes completed by this removal, in the same order.
    pub completed: Vec<Completion>,
}

impl DotRemoval {
    fn untouched(tile: TileIndex) -> Self {
        Self {
            tile,
            touched: Vec::new(),
            completed: Vec::new(),
        }
    }

    pub fn is_noop(&self) -> bool {
        self.touched.is_empty()
    }
}

/// Markers and shapes of one loaded level.
#[derive(Debug, Clone)]
pub struct ShapeRegistry {
    config: RegistryConfig,
    geometry: GridGeometry,
    markers: BTreeMap<TileIndex, Marker>,
    shapes: Vec<Shape>,
    signatures: SignatureSet,
}

impl ShapeRegistry {
    pub fn new(geometry: GridGeometry) -> Self {
        Self::with_config(geometry, RegistryConfig::default())
    }

    pub fn with_config(geometry: GridGeometry, config: RegistryConfig) -> Self {
        Self {
            config,
            geometry,
            markers: BTreeMap::new(),
            shapes: Vec::new(),
            signatures: SignatureSet::new(),
        }
    }

    pub fn config(&self) -> RegistryConfig {
        self.config
    }

    pub fn geometry(&self) -> GridGeometry {
        self.geometry
    }

    /// Registers a marker. Returns `false` if the tile already was one.
    /// New markers take part from the next bake on.
    pub fn add_point(&mut self, tile: TileIndex) -> bool {
        use std::collections::btree_map::Entry;

        match self.markers.entry(tile) {
            Entry::Occupied(_) => false,
            Entry::Vacant(vacant) => {
                vacant.insert(Marker::default());
                true
            }
        }
    }

    /// Traces every unexplored open direction of every live marker, once per
    /// turn bias, and registers each new minimal loop.
    pub fn bake<T>(&mut self, tiles: &T) -> BakeStats
    where
        T: TileSource + ?Sized,
    {
        self.geometry = tiles.geometry();
        let mut stats = BakeStats::default();
        let origins: Vec<TileIndex> = self
            .markers
            .iter()
            .filter(|(_, marker)| !marker.consumed)
            .map(|(tile, _)| *tile)
            .collect();

        for origin in origins {
            let exits = tiles.flags(origin);
            for dir in Direction::ALL {
                let explored = self
                    .markers
                    .get(&origin)
                    .is_none_or(|marker| marker.explored.can_go(dir));
                if explored || !exits.can_go(dir) {
                    continue;
                }

                for bias in TraceBias::BOTH {
                    let request = TraceRequest::new(origin, dir, bias);
                    let outcome = trace_loop(tiles, request, |tile| self.is_live_marker(tile));
                    stats.record(&outcome);
                    if let TraceOutcome::Closed(traced) = outcome {
                        match self.register(traced, dir) {
                            Dedup::New => stats.shapes += 1,
                            Dedup::Duplicate => stats.duplicates += 1,
                        }
                    }
                }

                if let Some(marker) = self.markers.get_mut(&origin) {
                    marker.explored.insert(dir);
                }
            }
        }

        stats
    }

    /// Discards every shape and explored flag, then bakes again. Consumed
    /// markers stay consumed.
    pub fn rebake<T>(&mut self, tiles: &T) -> BakeStats
    where
        T: TileSource + ?Sized,
    {
        self.discard_shapes();
        self.bake(tiles)
    }

    /// Like [`rebake`](Self::rebake), but also restores consumed markers.
    pub fn reset<T>(&mut self, tiles: &T) -> BakeStats
    where
        T: TileSource + ?Sized,
    {
        for marker in self.markers.values_mut() {
            marker.consumed = false;
        }
        self.rebake(tiles)
    }

    /// Consumes the dot on `tile`: every shape it belongs to loses one dot,
    /// and shapes reaching zero are decomposed. Tiles without a live marker or
    /// without shapes leave every shape untouched.
    pub fn remove_at(&mut self, tile: TileIndex) -> DotRemoval {
        let mut removal = DotRemoval::untouched(tile);
        let Some(marker) = self.markers.get_mut(&tile) else {
            return removal;
        };
        if marker.consumed {
            return removal;
        }
        marker.consumed = true;
        let shape_ids = std::mem::take(&mut marker.shapes);

        for id in shape_ids {
            let Some(shape) = self.shapes.get_mut(id.0) else {
                continue;
            };
            removal.touched.push(id);
            if let Some(rects) = shape.consume_dot(self.geometry, self.config.retain_fill_rects) {
                removal.completed.push(Completion { shape: id, rects });
            }
        }

        removal
    }

    pub fn shape(&self, id: ShapeId) -> Option<&Shape> {
        self.shapes.get(id.0)
    }

    pub fn shapes(&self) -> &[Shape] {
        &self.shapes
    }

    /// Shapes the marker on `tile` still references.
    pub fn shapes_at(&self, tile: TileIndex) -> impl Iterator<Item = &Shape> {
        self.markers
            .get(&tile)
            .map(|marker| marker.shapes.as_slice())
            .unwrap_or_default()
            .iter()
            .filter_map(|id| self.shape(*id))
    }

    pub fn marker(&self, tile: TileIndex) -> Option<&Marker> {
        self.markers.get(&tile)
    }

    pub fn markers(&self) -> impl Iterator<Item = (TileIndex, &Marker)> {
        self.markers.iter().map(|(tile, marker)| (*tile, marker))
    }

    pub fn is_live_marker(&self, tile: TileIndex) -> bool {
        self.markers
            .get(&tile)
            .is_some_and(|marker| !marker.consumed)
    }

    /// Shapes still waiting for dots.
    pub fn pending_shapes(&self) -> usize {
        self.shapes.iter().filter(|shape| !shape.is_complete()).count()
    }

    /// Hash over the sorted shape signatures. Equal digests mean the same set
    /// of loops was found.
    pub fn digest(&self) -> blake3::Hash {
        let mut signatures: Vec<&Signature> =
            self.shapes.iter().map(|shape| shape.signature()).collect();
        signatures.sort();

        let mut hasher = blake3::Hasher::new();
        for signature in signatures {
            hasher.update(&(signature.len() as u64).to_le_bytes());
            for tile in signature.as_slice() {
                hasher.update(&(*tile as u64).to_le_bytes());
            }
        }
        hasher.finalize()
    }

    fn register(&mut self, traced: TracedLoop, dir: Direction) -> Dedup {
        let signature = Signature::from_corners(&traced.corners);
        if self.signatures.insert(signature.clone()) == Dedup::Duplicate {
            return Dedup::Duplicate;
        }

        let id = ShapeId(self.shapes.len());
        for tile in &traced.markers {
            if let Some(marker) = self.markers.get_mut(tile) {
                marker.explored.insert(dir);
                marker.shapes.push(id);
            }
        }
        self.shapes
            .push(Shape::new(id, signature, traced.tiles, traced.markers));
        Dedup::New
    }

    fn discard_shapes(&mut self) {
        self.shapes.clear();
        self.signatures.clear();
        for marker in self.markers.values_mut() {
            marker.clear_bake_state();
        }
    }
}
