//! End-to-end shift and alignment runs

pub mod align;
pub mod shift;

use std::fs;
use std::path::{Path, PathBuf};

use crate::engine::{TileResult, TileTarget};
use crate::error::Result;
use crate::raster::MemoryDriver;
use crate::tiling::TileDescriptor;

pub use align::{AlignReport, AlignmentPipeline, DatasetReport};
pub use shift::{ShiftOptions, ShiftPipeline, ShiftReport};

/// A tile that produced no output, and why
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileFailure {
    pub tile_x: usize,
    pub tile_y: usize,
    pub reason: String,
}

impl std::fmt::Display for TileFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tile ({}, {}): {}", self.tile_x, self.tile_y, self.reason)
    }
}

/// Failed tiles of a run, in submission order
pub(crate) fn collect_failures(results: &[TileResult]) -> Vec<TileFailure> {
    results
        .iter()
        .filter_map(|result| {
            result.error().map(|e| TileFailure {
                tile_x: result.tile.tile_x,
                tile_y: result.tile.tile_y,
                reason: e.to_string(),
            })
        })
        .collect()
}

/// Directory holding intermediate tiles, next to `output`
pub fn tile_dir(output: &Path) -> PathBuf {
    output
        .parent()
        .map(|parent| parent.join("tiles"))
        .unwrap_or_else(|| PathBuf::from("tiles"))
}

/// Intermediate file for one tile: `<output file name>_tile_<tx>_<ty>.tif`
pub fn tile_path(dir: &Path, output: &Path, tile: &TileDescriptor) -> PathBuf {
    let name = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    dir.join(format!("{}_tile_{}_{}.tif", name, tile.tile_x, tile.tile_y))
}

/// Where tiles for `output` are staged
///
/// In-memory outputs keep their tiles in memory; file outputs get a tile
/// directory, created on demand. Unless tiles are kept, leftover tile files
/// of this output and the emptied directory are removed when the staging is
/// dropped, whether or not the run succeeded.
pub(crate) struct TileStaging {
    dir: Option<PathBuf>,
    output: PathBuf,
    keep_tiles: bool,
}

impl TileStaging {
    pub(crate) fn prepare(output: &Path, keep_tiles: bool) -> Result<Self> {
        let dir = if MemoryDriver::is_memory_path(output) {
            None
        } else {
            let dir = tile_dir(output);
            fs::create_dir_all(&dir)?;
            Some(dir)
        };
        Ok(Self { dir, output: output.to_path_buf(), keep_tiles })
    }

    pub(crate) fn target(&self, tile: &TileDescriptor) -> TileTarget {
        match &self.dir {
            Some(dir) => TileTarget::File(tile_path(dir, &self.output, tile)),
            None => TileTarget::Memory,
        }
    }

    fn cleanup(&self, dir: &Path) {
        let prefix = format!(
            "{}_tile_",
            self.output.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| "output".to_string())
        );
        if let Ok(entries) = fs::read_dir(dir) {
            for entry in entries.flatten() {
                if entry.file_name().to_string_lossy().starts_with(&prefix) {
                    if let Err(e) = fs::remove_file(entry.path()) {
                        tracing::warn!(path = %entry.path().display(), error = %e, "Could not remove tile file");
                    }
                }
            }
        }
        if fs::remove_dir(dir).is_ok() {
            tracing::debug!(dir = %dir.display(), "Removed empty tile directory");
        }
    }
}

impl Drop for TileStaging {
    fn drop(&mut self) {
        if self.keep_tiles {
            return;
        }
        if let Some(dir) = &self.dir {
            self.cleanup(dir);
        }
    }
}
