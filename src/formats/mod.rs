//! Raster container formats

pub mod tiff;

pub use tiff::GeoTiffDriver;
