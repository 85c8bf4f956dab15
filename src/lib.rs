//! gridalign - tiled longitude shifting and grid alignment for planetary rasters
//!
//! gridalign re-centres global equirectangular rasters in longitude and
//! reprojects several datasets onto one shared target grid. Both jobs split
//! the output into tiles, run them on a worker pool, reassemble the results
//! into a single compressed GeoTIFF, and verify the outputs line up.
//!
//! # Examples
//!
//! ## Shifting a global raster by half its width
//!
//! ```no_run
//! use gridalign::pipeline::{ShiftOptions, ShiftPipeline};
//! use std::path::Path;
//!
//! let report = ShiftPipeline::new(ShiftOptions::default())
//!     .run(Path::new("dem_180.tif"), Path::new("dem_360.tif"))?;
//! println!("shifted by {} columns", report.shift);
//! # Ok::<(), gridalign::Error>(())
//! ```
//!
//! ## Aligning datasets onto a shared grid
//!
//! ```no_run
//! use gridalign::config::AlignConfig;
//! use gridalign::pipeline::AlignmentPipeline;
//!
//! let config = AlignConfig::load("align.json")?;
//! let report = AlignmentPipeline::new(config)?.run()?;
//! assert!(report.verified);
//! # Ok::<(), gridalign::Error>(())
//! ```

pub mod io;
pub mod error;
pub mod types;
pub mod formats;
pub mod compression;
pub mod cache;
pub mod grid;
pub mod raster;
pub mod tiling;
pub mod warp;
pub mod engine;
pub mod pipeline;
pub mod config;
pub mod logging;

pub use error::{Error, MismatchAttribute, Result, Stage};
pub use types::DataType;
pub use grid::{Bounds, GeoGrid, GeoTransform, Projection};
pub use formats::tiff::{GeoTiffDriver, GeoTiffSink, GeoTiffSource};
pub use raster::{DriverRegistry, MemoryDriver, RasterBuffer, RasterStats};
pub use tiling::{TileDescriptor, TilePlanner, WraparoundShifter};
pub use warp::{ProjWarper, ResamplingPolicy, WarpRequest, Warper};
pub use engine::{AlignmentVerifier, MosaicAssembler, TileResampler, TileScheduler};
pub use pipeline::{AlignmentPipeline, ShiftPipeline};
pub use config::AlignConfig;
