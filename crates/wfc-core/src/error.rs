//! Construction-time failure modes of the core.
//!
//! Contradictions reached while stepping a model are a run *outcome*
//! (`StepResult::Failure`), not an `Err` here — see `model::StepResult`.

/// Errors that can occur while building a [`crate::overlapping::OverlappingModel`]
/// or a [`crate::tiled::SimpleTiledModel`].
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum WfcError {
    #[error("pattern size must be >= 2, got {0}")]
    InvalidPatternSize(usize),
    #[error("symmetry must be one of 1, 2, 8, got {0}")]
    InvalidSymmetry(u8),
    #[error("output dimensions must be positive, got {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },
    #[error("no patterns could be extracted from the sample")]
    EmptyPatternSet,
    #[error("all pattern weights are zero")]
    ZeroWeightSum,
    #[error("neighbor rule references unknown tile {0:?}")]
    UnknownTile(String),
}

pub type Result<T> = std::result::Result<T, WfcError>;
