//! Tile execution, reassembly and verification

pub mod job;
pub mod mosaic;
pub mod resampler;
pub mod scheduler;
pub mod verify;

pub use job::{TileJob, TileMode, TileOutput, TileResult, TileTarget};
pub use mosaic::{MosaicAssembler, PlacedTile, VirtualMosaic};
pub use resampler::{normalize_tile, TileResampler};
pub use scheduler::TileScheduler;
pub use verify::{AlignmentVerifier, DEFAULT_TOLERANCE};
