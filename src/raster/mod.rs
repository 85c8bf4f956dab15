//! Raster access abstractions
//!
//! Drivers open [`RasterSource`]s for reading and create [`RasterSink`]s
//! for writing. A [`DriverRegistry`] picks the driver for a path. Bands
//! are indexed from zero and pixel values travel as `f64`.

pub mod buffer;
pub mod memory;
pub mod registry;
pub mod stats;

use std::collections::BTreeMap;
use std::path::Path;
use serde::{Deserialize, Serialize};

use crate::compression::Compression;
use crate::error::{Error, Result};
use crate::grid::{GeoGrid, GeoTransform, Projection};
use crate::types::DataType;

pub use buffer::RasterBuffer;
pub use memory::MemoryDriver;
pub use registry::DriverRegistry;
pub use stats::RasterStats;

/// A rectangular pixel window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelWindow {
    pub col: u64,
    pub row: u64,
    pub width: u64,
    pub height: u64,
}

impl PixelWindow {
    pub fn new(col: u64, row: u64, width: u64, height: u64) -> Self {
        Self { col, row, width, height }
    }

    /// The whole of a `width` x `height` raster
    pub fn full(width: u64, height: u64) -> Self {
        Self::new(0, 0, width, height)
    }

    pub fn pixel_count(&self) -> usize {
        (self.width * self.height) as usize
    }

    /// Fails unless the window is non-empty and lies inside a `width` x `height` raster
    pub fn check_within(&self, width: u64, height: u64) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::OutOfBounds(format!("Empty window {:?}", self)));
        }
        if self.col + self.width > width || self.row + self.height > height {
            return Err(Error::OutOfBounds(format!(
                "Window {}x{} at ({}, {}) exceeds raster {}x{}",
                self.width, self.height, self.col, self.row, width, height
            )));
        }
        Ok(())
    }
}

/// Everything known about an opened raster
#[derive(Debug, Clone, PartialEq)]
pub struct RasterInfo {
    /// Dimensions, georeferencing, nodata and band 0 scale/offset
    pub grid: GeoGrid,
    pub band_count: usize,
    pub data_type: DataType,
    /// Dataset-level metadata items
    pub metadata: BTreeMap<String, String>,
}

impl RasterInfo {
    pub fn width(&self) -> u64 {
        self.grid.width
    }

    pub fn height(&self) -> u64 {
        self.grid.height
    }

    pub fn check_band(&self, band: usize) -> Result<()> {
        if band >= self.band_count {
            return Err(Error::OutOfBounds(format!(
                "Band {} requested from a {}-band raster",
                band, self.band_count
            )));
        }
        Ok(())
    }
}

/// Internal block layout of a created raster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "layout", content = "block_size")]
pub enum Tiling {
    /// Square internal tiles of the given edge (a multiple of 16)
    Tiled(u32),
    /// Row strips
    Strips,
}

impl Default for Tiling {
    fn default() -> Self {
        Tiling::Tiled(256)
    }
}

/// When to write the 64-bit container variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BigTiffMode {
    Never,
    Always,
    /// Only when the classic container might overflow
    #[default]
    IfSafer,
}

/// Output encoding policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateOptions {
    pub compression: Compression,
    pub tiling: Tiling,
    pub big_tiff: BigTiffMode,
}

impl CreateOptions {
    pub fn validate(&self) -> Result<()> {
        if let Tiling::Tiled(block) = self.tiling {
            if block == 0 || block % 16 != 0 {
                return Err(Error::InvalidConfiguration(format!(
                    "Internal block size must be a positive multiple of 16, got {}",
                    block
                )));
            }
        }
        Ok(())
    }
}

/// Shape of a raster to create
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterSpec {
    pub width: u64,
    pub height: u64,
    pub band_count: usize,
    pub data_type: DataType,
    pub options: CreateOptions,
}

impl RasterSpec {
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 || self.band_count == 0 {
            return Err(Error::InvalidConfiguration(format!(
                "Cannot create a {}x{} raster with {} bands",
                self.width, self.height, self.band_count
            )));
        }
        self.options.validate()
    }
}

/// Read access to one raster
///
/// Sources hold per-handle state and are never shared between workers;
/// each worker opens its own from the same path.
pub trait RasterSource: Send {
    fn info(&self) -> &RasterInfo;

    /// Reads one band of `window` as row-major values
    fn read_window(&mut self, band: usize, window: PixelWindow) -> Result<Vec<f64>>;
}

/// Write access to one raster being created
pub trait RasterSink: Send {
    fn set_transform(&mut self, transform: GeoTransform) -> Result<()>;

    fn set_projection(&mut self, projection: &Projection) -> Result<()>;

    /// Sets a dataset-level metadata item
    fn set_metadata(&mut self, key: &str, value: &str) -> Result<()>;

    /// Sets the nodata value; unwritten pixels read back as nodata
    fn set_nodata(&mut self, nodata: Option<f64>) -> Result<()>;

    /// Sets scale and offset for every band
    fn set_scale_offset(&mut self, scale: Option<f64>, offset: Option<f64>) -> Result<()>;

    /// Writes one band of `window` from row-major values
    fn write_window(&mut self, band: usize, window: PixelWindow, values: &[f64]) -> Result<()>;

    /// Flushes everything to the destination
    fn close(self: Box<Self>) -> Result<()>;
}

/// A raster format implementation
pub trait RasterDriver: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this driver handles `path`
    fn accepts(&self, path: &Path) -> bool;

    fn open(&self, path: &Path) -> Result<Box<dyn RasterSource>>;

    fn create(&self, path: &Path, spec: &RasterSpec) -> Result<Box<dyn RasterSink>>;

    /// Deletes the raster at `path`
    fn remove(&self, path: &Path) -> Result<()>;
}

/// Applies a grid's georeferencing and value metadata to a sink
pub fn apply_grid(sink: &mut dyn RasterSink, grid: &GeoGrid) -> Result<()> {
    sink.set_transform(grid.transform)?;
    sink.set_projection(&grid.projection)?;
    sink.set_nodata(grid.nodata)?;
    sink.set_scale_offset(grid.scale, grid.offset)?;
    Ok(())
}
