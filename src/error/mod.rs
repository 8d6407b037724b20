mod types;

pub use types::{Result, ShapeError};
