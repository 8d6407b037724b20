//! Loop tracing over the tile connectivity graph.

mod core;

pub use self::core::{TraceBias, TraceOutcome, TraceRequest, TracedLoop, trace_loop};
