//! Shape registry: markers, baked shapes and the dot-count lifecycle.

mod core;
mod shape;

pub use self::core::{BakeStats, Completion, DotRemoval, Marker, RegistryConfig, ShapeRegistry};
pub use self::shape::{Dedup, Shape, ShapeId, Signature, SignatureSet};
