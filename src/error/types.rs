use thiserror::Error;

/// Unified result type for the dotloop crate.
pub type Result<T> = std::result::Result<T, ShapeError>;

/// Errors surfaced by level setup and runtime lifecycle calls.
///
/// Tracing never fails with an error: a walk that finds no loop is reported
/// through `TraceOutcome` instead.
#[derive(Debug, Error)]
pub enum ShapeError {
    #[error("no level is loaded")]
    NoLevelLoaded,
    #[error("grid must have at least one column and one row")]
    EmptyGrid,
    #[error("flag count mismatch: expected {expected}, got {actual}")]
    FlagCountMismatch { expected: usize, actual: usize },
    #[error("tile {0} is outside the grid")]
    TileOutOfBounds(usize),
    #[error("level parse error at {line}:{column}: {reason}")]
    LevelParse {
        line: usize,
        column: usize,
        reason: String,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
