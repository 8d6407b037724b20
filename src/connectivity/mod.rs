//! Topology collaborators: direction flags, the `TileSource` seam, and the
//! in-memory grid used by tests, demos and hosts without their own storage.

mod flags;
mod grid;

pub use flags::{DirFlags, Step, TileSource};
pub use grid::{Level, TileGrid};
