//! Wave Function Collapse: a constraint-propagation engine for generating
//! grids that locally resemble a sample (the overlapping model) or obey an
//! explicit tile adjacency graph (the simple tiled model).
//!
//! Both model builders share the same [`wave::Wave`] possibility table and
//! [`propagator::Propagator`] arc-consistency engine, and drive to
//! completion (or a contradiction) one [`model::StepResult`] at a time.

pub mod direction;
pub mod error;
pub mod model;
pub mod overlapping;
pub mod propagator;
pub mod random;
pub mod tiled;
pub mod tileset;
pub mod wave;

pub use direction::Direction;
pub use error::{Result, WfcError};
pub use model::{EntropyCell, ModelState, StepResult};
pub use overlapping::{OverlappingModel, OverlappingOptions};
pub use random::Mulberry32;
pub use tiled::{SimpleTiledModel, TiledOptions};
pub use tileset::{NeighborRule, SymmetryClass, TileDef};
pub use wave::Heuristic;
