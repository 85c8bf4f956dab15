//! Driver lookup by path

use std::path::Path;

use crate::error::{Error, Result};
use crate::formats::tiff::GeoTiffDriver;
use super::{MemoryDriver, RasterDriver, RasterSink, RasterSource, RasterSpec};

/// Ordered set of raster drivers; the first one accepting a path wins
///
/// Registries are cheap to build and are constructed once per worker.
pub struct DriverRegistry {
    drivers: Vec<Box<dyn RasterDriver>>,
}

impl DriverRegistry {
    /// Registry without any drivers
    pub fn empty() -> Self {
        Self { drivers: Vec::new() }
    }

    /// Registry with the in-memory and GeoTIFF drivers
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(MemoryDriver::new()));
        registry.register(Box::new(GeoTiffDriver::new()));
        registry
    }

    pub fn register(&mut self, driver: Box<dyn RasterDriver>) {
        tracing::trace!(driver = driver.name(), "Registered raster driver");
        self.drivers.push(driver);
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }

    /// Driver responsible for `path`
    pub fn driver_for(&self, path: &Path) -> Result<&dyn RasterDriver> {
        self.drivers
            .iter()
            .find(|driver| driver.accepts(path))
            .map(|driver| driver.as_ref())
            .ok_or_else(|| Error::Unsupported(format!("No raster driver for {}", path.display())))
    }

    pub fn open(&self, path: &Path) -> Result<Box<dyn RasterSource>> {
        self.driver_for(path)?.open(path)
    }

    pub fn create(&self, path: &Path, spec: &RasterSpec) -> Result<Box<dyn RasterSink>> {
        self.driver_for(path)?.create(path, spec)
    }

    pub fn remove(&self, path: &Path) -> Result<()> {
        self.driver_for(path)?.remove(path)
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_selection() {
        let registry = DriverRegistry::with_defaults();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.driver_for(Path::new("mem://x")).unwrap().name(), "MEM");
        assert_eq!(registry.driver_for(Path::new("/data/dem.tif")).unwrap().name(), "GTiff");
        assert_eq!(registry.driver_for(Path::new("/data/DEM.TIFF")).unwrap().name(), "GTiff");
        assert!(matches!(
            registry.driver_for(Path::new("/data/dem.vrt")),
            Err(Error::Unsupported(_))
        ));
    }

    #[test]
    fn test_empty_registry() {
        let registry = DriverRegistry::empty();
        assert!(registry.is_empty());
        assert!(registry.open(Path::new("mem://x")).is_err());
    }
}
