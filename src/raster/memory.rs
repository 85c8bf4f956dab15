//! In-memory raster driver for `mem://` paths
//!
//! Datasets live in a concurrent store shared by every driver instance
//! created with [`MemoryDriver::new`], so a raster written by one worker's
//! registry can be opened from another's.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use dashmap::DashMap;

use crate::error::{Error, Result};
use crate::grid::{GeoGrid, GeoTransform, Projection};
use super::{
    PixelWindow, RasterBuffer, RasterDriver, RasterInfo, RasterSink, RasterSource, RasterSpec,
};

/// Path prefix handled by this driver
pub const MEMORY_PREFIX: &str = "mem://";

#[derive(Debug)]
struct MemoryDataset {
    info: RasterInfo,
    bands: Vec<Vec<f64>>,
}

type Store = Arc<DashMap<String, Arc<MemoryDataset>>>;

fn shared_store() -> Store {
    static STORE: OnceLock<Store> = OnceLock::new();
    Arc::clone(STORE.get_or_init(|| Arc::new(DashMap::new())))
}

fn key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Driver storing rasters in process memory
#[derive(Clone)]
pub struct MemoryDriver {
    store: Store,
}

impl MemoryDriver {
    /// Driver backed by the process-wide store
    pub fn new() -> Self {
        Self { store: shared_store() }
    }

    /// Driver with a private store
    pub fn isolated() -> Self {
        Self { store: Arc::new(DashMap::new()) }
    }

    pub fn is_memory_path(path: &Path) -> bool {
        path.to_str().is_some_and(|p| p.starts_with(MEMORY_PREFIX))
    }

    /// Stores `buffer` at `path`, replacing any existing dataset
    pub fn insert(&self, path: &Path, buffer: &RasterBuffer, metadata: BTreeMap<String, String>) {
        let bands = (0..buffer.band_count()).map(|b| buffer.band(b).to_vec()).collect();
        let info = RasterInfo {
            grid: buffer.grid().clone(),
            band_count: buffer.band_count(),
            data_type: buffer.data_type(),
            metadata,
        };
        self.store.insert(key(path), Arc::new(MemoryDataset { info, bands }));
    }

    /// Copies the dataset at `path` out as a buffer
    pub fn get(&self, path: &Path) -> Option<RasterBuffer> {
        let dataset = self.store.get(&key(path))?;
        RasterBuffer::from_bands(
            dataset.info.grid.clone(),
            dataset.info.data_type,
            dataset.bands.clone(),
        )
        .ok()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.store.contains_key(&key(path))
    }
}

impl Default for MemoryDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl RasterDriver for MemoryDriver {
    fn name(&self) -> &'static str {
        "MEM"
    }

    fn accepts(&self, path: &Path) -> bool {
        Self::is_memory_path(path)
    }

    fn open(&self, path: &Path) -> Result<Box<dyn RasterSource>> {
        let dataset = self
            .store
            .get(&key(path))
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| {
                Error::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("No in-memory raster at {}", path.display()),
                ))
            })?;
        Ok(Box::new(MemorySource { dataset }))
    }

    fn create(&self, path: &Path, spec: &RasterSpec) -> Result<Box<dyn RasterSink>> {
        spec.validate()?;

        let grid = GeoGrid {
            width: spec.width,
            height: spec.height,
            transform: GeoTransform::new(0.0, 1.0, 0.0, 1.0),
            projection: Projection::default(),
            nodata: None,
            scale: None,
            offset: None,
        };
        let band_len = (spec.width * spec.height) as usize;

        Ok(Box::new(MemorySink {
            key: key(path),
            store: Arc::clone(&self.store),
            info: RasterInfo {
                grid,
                band_count: spec.band_count,
                data_type: spec.data_type,
                metadata: BTreeMap::new(),
            },
            bands: vec![vec![0.0; band_len]; spec.band_count],
            written: false,
        }))
    }

    fn remove(&self, path: &Path) -> Result<()> {
        self.store.remove(&key(path));
        Ok(())
    }
}

struct MemorySource {
    dataset: Arc<MemoryDataset>,
}

impl RasterSource for MemorySource {
    fn info(&self) -> &RasterInfo {
        &self.dataset.info
    }

    fn read_window(&mut self, band: usize, window: PixelWindow) -> Result<Vec<f64>> {
        let info = &self.dataset.info;
        info.check_band(band)?;
        window.check_within(info.width(), info.height())?;

        let data = &self.dataset.bands[band];
        let width = info.width() as usize;
        let mut values = Vec::with_capacity(window.pixel_count());
        for row in window.row..window.row + window.height {
            let start = row as usize * width + window.col as usize;
            values.extend_from_slice(&data[start..start + window.width as usize]);
        }
        Ok(values)
    }
}

struct MemorySink {
    key: String,
    store: Store,
    info: RasterInfo,
    bands: Vec<Vec<f64>>,
    written: bool,
}

impl RasterSink for MemorySink {
    fn set_transform(&mut self, transform: GeoTransform) -> Result<()> {
        self.info.grid.transform = transform;
        Ok(())
    }

    fn set_projection(&mut self, projection: &Projection) -> Result<()> {
        self.info.grid.projection = projection.clone();
        Ok(())
    }

    fn set_metadata(&mut self, key: &str, value: &str) -> Result<()> {
        self.info.metadata.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn set_nodata(&mut self, nodata: Option<f64>) -> Result<()> {
        self.info.grid.nodata = nodata;
        if let (Some(value), false) = (nodata, self.written) {
            let value = self.info.data_type.quantize(value);
            for band in &mut self.bands {
                band.fill(value);
            }
        }
        Ok(())
    }

    fn set_scale_offset(&mut self, scale: Option<f64>, offset: Option<f64>) -> Result<()> {
        self.info.grid.scale = scale;
        self.info.grid.offset = offset;
        Ok(())
    }

    fn write_window(&mut self, band: usize, window: PixelWindow, values: &[f64]) -> Result<()> {
        self.info.check_band(band)?;
        window.check_within(self.info.width(), self.info.height())?;
        if values.len() != window.pixel_count() {
            return Err(Error::OutOfBounds(format!(
                "{} values supplied for a {}x{} window",
                values.len(),
                window.width,
                window.height
            )));
        }

        let width = self.info.width() as usize;
        let data_type = self.info.data_type;
        let nodata = self.info.grid.nodata;
        let data = &mut self.bands[band];
        for (i, row_values) in values.chunks_exact(window.width as usize).enumerate() {
            let start = (window.row as usize + i) * width + window.col as usize;
            for (dst, &value) in data[start..start + row_values.len()].iter_mut().zip(row_values) {
                let value = match nodata {
                    Some(nd) if value.is_nan() => nd,
                    _ => value,
                };
                *dst = data_type.quantize(value);
            }
        }
        self.written = true;
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<()> {
        let MemorySink { key, store, info, bands, .. } = *self;
        store.insert(key, Arc::new(MemoryDataset { info, bands }));
        Ok(())
    }
}
