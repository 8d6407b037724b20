use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::ops::ControlFlow;

use serde::Serialize;

use crate::connectivity::DirFlags;
use crate::fill::{FillRect, decompose};
use crate::geometry::{GridGeometry, TileIndex};

/// Stable handle of a shape within one bake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ShapeId(pub usize);

impl fmt::Display for ShapeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "shape#{}", self.0)
    }
}

/// Canonical identity of a loop: its corner and junction tiles, ascending.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Signature(Vec<TileIndex>);

impl Signature {
    pub fn from_corners(corners: &[TileIndex]) -> Self {
        let mut sorted = corners.to_vec();
        sorted.sort_unstable();
        Self(sorted)
    }

    pub fn as_slice(&self) -> &[TileIndex] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Outcome of offering a signature to a [`SignatureSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dedup {
    New,
    Duplicate,
}

/// Signatures registered during the current bake.
#[derive(Debug, Default, Clone)]
pub struct SignatureSet {
    known: HashSet<Signature>,
}

impl SignatureSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `signature` unless an identical one is already known.
    pub fn insert(&mut self, signature: Signature) -> Dedup {
        if self.known.insert(signature) {
            Dedup::New
        } else {
            Dedup::Duplicate
        }
    }

    pub fn contains(&self, signature: &Signature) -> bool {
        self.known.contains(signature)
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }

    pub fn clear(&mut self) {
        self.known.clear();
    }
}

/// A registered minimal loop and its fill lifecycle.
#[derive(Debug, Clone)]
pub struct Shape {
    id: ShapeId,
    signature: Signature,
    tiles: BTreeMap<TileIndex, DirFlags>,
    dots: Vec<TileIndex>,
    remaining: usize,
    complete: bool,
    fill: Vec<FillRect>,
}

impl Shape {
    pub(crate) fn new(
        id: ShapeId,
        signature: Signature,
        tiles: BTreeMap<TileIndex, DirFlags>,
        dots: Vec<TileIndex>,
    ) -> Self {
        Self {
            id,
            signature,
            tiles,
            remaining: dots.len(),
            dots,
            complete: false,
            fill: Vec::new(),
        }
    }

    pub fn id(&self) -> ShapeId {
        self.id
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Marker tiles found on the loop when it was traced.
    pub fn dots(&self) -> &[TileIndex] {
        &self.dots
    }

    pub fn remaining_dots(&self) -> usize {
        self.remaining
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Whether the loop passes through `tile`.
    pub fn contains(&self, tile: TileIndex) -> bool {
        self.tiles.contains_key(&tile)
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    /// Loop edges meeting at `tile`, if the loop passes through it.
    pub fn loop_flags(&self, tile: TileIndex) -> Option<DirFlags> {
        self.tiles.get(&tile).copied()
    }

    /// Visits loop tiles in ascending order until `visit` breaks.
    pub fn visit_tiles<B, F>(&self, mut visit: F) -> ControlFlow<B>
    where
        F: FnMut(TileIndex) -> ControlFlow<B>,
    {
        for &tile in self.tiles.keys() {
            visit(tile)?;
        }
        ControlFlow::Continue(())
    }

    /// Rectangles kept from completion. Empty before completion or when
    /// retention is disabled.
    pub fn fill_rects(&self) -> &[FillRect] {
        &self.fill
    }

    /// Counts one dot as consumed. Returns the decomposition exactly once,
    /// on the call that brings the counter to zero.
    pub(crate) fn consume_dot(
        &mut self,
        geometry: GridGeometry,
        retain: bool,
    ) -> Option<Vec<FillRect>> {
        if self.complete || self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        if self.remaining > 0 {
            return None;
        }

        self.complete = true;
        let rects = decompose(geometry, &self.tiles);
        if retain {
            self.fill = rects.clone();
        }
        Some(rects)
    }
}
