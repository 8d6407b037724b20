//! Rectangle decomposition of completed shapes.

mod core;

pub use self::core::{FillRect, decompose};
