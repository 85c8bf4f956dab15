//! TIFF and BigTIFF format support

pub mod tags;
pub mod ifd;
pub mod geotiff;
pub mod reader;
pub mod writer;

use std::path::Path;

use crate::error::Result;
use crate::raster::{RasterDriver, RasterSink, RasterSource, RasterSpec};

pub use ifd::{IFD, IFDEntry};
pub use geotiff::GeoInfo;
pub use reader::GeoTiffSource;
pub use writer::GeoTiffSink;

/// TIFF magic number (42)
pub const TIFF_MAGIC: u16 = 42;

/// BigTIFF magic number (43)
pub const BIGTIFF_MAGIC: u16 = 43;

/// File-backed GeoTIFF driver
#[derive(Debug, Clone, Copy, Default)]
pub struct GeoTiffDriver;

impl GeoTiffDriver {
    pub fn new() -> Self {
        Self
    }
}

impl RasterDriver for GeoTiffDriver {
    fn name(&self) -> &'static str {
        "GTiff"
    }

    fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("tif") || ext.eq_ignore_ascii_case("tiff"))
            .unwrap_or(false)
    }

    fn open(&self, path: &Path) -> Result<Box<dyn RasterSource>> {
        Ok(Box::new(GeoTiffSource::open(path)?))
    }

    fn create(&self, path: &Path, spec: &RasterSpec) -> Result<Box<dyn RasterSink>> {
        Ok(Box::new(GeoTiffSink::create(path, spec)?))
    }

    fn remove(&self, path: &Path) -> Result<()> {
        std::fs::remove_file(path)?;
        Ok(())
    }
}
