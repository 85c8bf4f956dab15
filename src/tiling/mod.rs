//! Tile planning and wraparound addressing

pub mod planner;
pub mod wrap;

pub use planner::{TileDescriptor, TilePlanner, DEFAULT_ALIGN_TILE_SIZE, DEFAULT_SHIFT_TILE_SIZE};
pub use wrap::{ColumnSpan, SourceWindow, WraparoundShifter};
