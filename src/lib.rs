//! Loop discovery and fill decomposition for dot-and-link grid levels.
//!
//! Markers ("dots") sit on tiles of a direction-linked grid. Baking finds the
//! minimal closed loops through them; once every dot on a loop is consumed the
//! enclosed cells are split into rectangles for the renderer.

pub mod connectivity;
pub mod error;
pub mod fill;
pub mod geometry;
pub mod logging;
pub mod metrics;
pub mod registry;
pub mod render;
pub mod runtime;
pub mod trace;

pub use connectivity::{DirFlags, Level, Step, TileGrid, TileSource};
pub use error::{Result, ShapeError};
pub use fill::{FillRect, decompose};
pub use geometry::{Direction, GridGeometry, TileIndex, Turn};
pub use logging::{LogEvent, LogFields, LogLevel, Logger, LoggingError, LoggingResult, MemorySink};
pub use metrics::{MetricSnapshot, ShapeMetrics};
pub use registry::{
    BakeStats, Completion, Dedup, DotRemoval, Marker, RegistryConfig, Shape, ShapeId,
    ShapeRegistry, Signature, SignatureSet,
};
pub use render::{AnsiRenderer, FillSink, RendererSettings};
pub use runtime::diagnostics::{LifecycleLoggerPlugin, MetricsSnapshotPlugin};
pub use runtime::{EventFlow, LevelContext, LevelEvent, LevelRuntime, RuntimeConfig, ShapePlugin};
pub use trace::{TraceBias, TraceOutcome, TraceRequest, TracedLoop, trace_loop};
