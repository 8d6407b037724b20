//! Fill consumers: the `FillSink` seam and a text renderer.

mod core;

pub use self::core::{AnsiRenderer, FillSink, RendererSettings};
