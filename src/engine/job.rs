//! Tile job and result types

use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::grid::GeoGrid;
use crate::raster::RasterBuffer;
use crate::tiling::TileDescriptor;
use crate::warp::ResamplingPolicy;

/// What a job does with its tile
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TileMode {
    /// Resample the input into the tile's grid
    Reproject(ResamplingPolicy),
    /// Copy the input through a circular horizontal shift of this many columns
    Shift(i64),
}

/// Where a job puts its tile
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileTarget {
    File(PathBuf),
    Memory,
}

/// A self-contained unit of work for one destination tile
///
/// Jobs are immutable once planned; workers only read them.
#[derive(Debug, Clone)]
pub struct TileJob {
    pub input: PathBuf,
    /// Grid the tile belongs to
    pub target: Arc<GeoGrid>,
    pub tile: TileDescriptor,
    pub mode: TileMode,
    pub output: TileTarget,
}

impl TileJob {
    /// The tile as a standalone grid
    pub fn tile_grid(&self) -> GeoGrid {
        self.tile.grid(&self.target)
    }
}

/// Produced tile data
#[derive(Debug)]
pub enum TileOutput {
    File(PathBuf),
    Memory(RasterBuffer),
}

/// Outcome of one job
#[derive(Debug)]
pub struct TileResult {
    pub tile: TileDescriptor,
    pub outcome: Result<TileOutput>,
}

impl TileResult {
    pub fn succeeded(tile: TileDescriptor, output: TileOutput) -> Self {
        Self { tile, outcome: Ok(output) }
    }

    pub fn failed(tile: TileDescriptor, error: Error) -> Self {
        Self { tile, outcome: Err(error) }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn output(&self) -> Option<&TileOutput> {
        self.outcome.as_ref().ok()
    }

    /// Failure detail, present exactly when the job failed
    pub fn error(&self) -> Option<&Error> {
        self.outcome.as_ref().err()
    }
}
