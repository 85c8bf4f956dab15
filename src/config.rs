//! Alignment run configuration
//!
//! Runs are described by a JSON file:
//!
//! ```json
//! {
//!   "target": { "body_radius": 1737400, "resolution": 200, "body_name": "Moon" },
//!   "tile_size": 4096,
//!   "datasets": [
//!     { "name": "elevation", "input": "elevation200m.tif", "output": "aligned_elevation.tif" },
//!     { "name": "slope", "input": "slope200m.tif", "output": "aligned_slope.tif", "resampling": "bilinear" }
//!   ]
//! }
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::grid::{GeoGrid, GeoTransform, Projection};
use crate::raster::CreateOptions;
use crate::tiling::DEFAULT_ALIGN_TILE_SIZE;
use crate::warp::ResamplingPolicy;

/// Mean lunar radius in metres
pub const MOON_RADIUS: f64 = 1_737_400.0;

/// Default target resolution in metres per pixel
pub const DEFAULT_RESOLUTION: f64 = 200.0;

/// Grid every dataset is aligned onto
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetGrid {
    /// Equirectangular grid spanning a whole sphere
    Global {
        body_radius: f64,
        resolution: f64,
        #[serde(default)]
        body_name: Option<String>,
        /// Overrides the generated projection
        #[serde(default)]
        projection: Option<String>,
    },
    /// Fully specified grid
    Explicit {
        width: u64,
        height: u64,
        transform: [f64; 6],
        projection: String,
    },
}

impl Default for TargetGrid {
    fn default() -> Self {
        TargetGrid::Global {
            body_radius: MOON_RADIUS,
            resolution: DEFAULT_RESOLUTION,
            body_name: Some("Moon".to_string()),
            projection: None,
        }
    }
}

impl TargetGrid {
    pub fn grid(&self) -> Result<GeoGrid> {
        match self {
            TargetGrid::Global { body_radius, resolution, body_name, projection } => {
                let projection = match projection {
                    Some(descriptor) => Projection::new(descriptor),
                    None => Projection::equirectangular_sphere(
                        body_name.as_deref().unwrap_or("Body"),
                        *body_radius,
                    ),
                };
                GeoGrid::global_equirectangular(*body_radius, *resolution, projection)
            }
            TargetGrid::Explicit { width, height, transform, projection } => GeoGrid::new(
                *width,
                *height,
                GeoTransform::from_array(*transform),
                Projection::new(projection),
            ),
        }
    }
}

/// One raster to align
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSpec {
    pub name: String,
    pub input: PathBuf,
    pub output: PathBuf,
    #[serde(default)]
    pub resampling: ResamplingPolicy,
}

fn default_tile_size() -> u64 {
    DEFAULT_ALIGN_TILE_SIZE
}

fn default_true() -> bool {
    true
}

/// Complete description of an alignment run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignConfig {
    #[serde(default)]
    pub target: TargetGrid,
    #[serde(default = "default_tile_size")]
    pub tile_size: u64,
    /// Worker threads; zero uses every available core
    #[serde(default)]
    pub workers: usize,
    pub datasets: Vec<DatasetSpec>,
    /// Encoding of the final outputs
    #[serde(default)]
    pub output: CreateOptions,
    #[serde(default)]
    pub keep_tiles: bool,
    /// Check that all outputs share one grid after the run
    #[serde(default = "default_true")]
    pub verify: bool,
}

impl AlignConfig {
    /// Reads and validates a configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let config = Self::from_json(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        tracing::debug!(path = %path.display(), datasets = config.datasets.len(), "Loaded configuration");
        Ok(config)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tile_size == 0 {
            return Err(Error::InvalidConfiguration("Tile size must be positive".to_string()));
        }
        if self.datasets.is_empty() {
            return Err(Error::InvalidConfiguration("No datasets configured".to_string()));
        }

        let mut outputs = HashSet::new();
        for dataset in &self.datasets {
            if !outputs.insert(&dataset.output) {
                return Err(Error::InvalidConfiguration(format!(
                    "Output {} is used by more than one dataset",
                    dataset.output.display()
                )));
            }
            if dataset.input == dataset.output {
                return Err(Error::InvalidConfiguration(format!(
                    "Dataset '{}' would overwrite its input",
                    dataset.name
                )));
            }
        }

        self.output.validate()?;
        self.target.grid().map(|_| ())
    }
}
