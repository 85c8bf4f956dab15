//! Reprojection of source rasters onto destination grids

pub mod kernels;
pub mod proj_warper;
pub mod transformer;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::grid::{Bounds, GeoGrid, GeoTransform, Projection};
use crate::raster::{RasterBuffer, RasterSource};
use kernels::Patch;

pub use proj_warper::ProjWarper;
pub use transformer::Transformer;

/// How destination pixels are interpolated from the source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResamplingPolicy {
    #[default]
    Nearest,
    Bilinear,
    Cubic,
}

impl ResamplingPolicy {
    pub fn name(&self) -> &'static str {
        match self {
            ResamplingPolicy::Nearest => "nearest",
            ResamplingPolicy::Bilinear => "bilinear",
            ResamplingPolicy::Cubic => "cubic",
        }
    }

    /// Source pixels the kernel reaches beyond the sample point
    pub fn kernel_radius(&self) -> u64 {
        match self {
            ResamplingPolicy::Nearest => 0,
            ResamplingPolicy::Bilinear => 1,
            ResamplingPolicy::Cubic => 2,
        }
    }

    /// Samples `patch` at corner-based pixel coordinates
    pub fn sample(&self, patch: &Patch<'_>, x: f64, y: f64) -> Option<f64> {
        match self {
            ResamplingPolicy::Nearest => kernels::nearest(patch, x, y),
            ResamplingPolicy::Bilinear => kernels::bilinear(patch, x, y),
            ResamplingPolicy::Cubic => kernels::cubic(patch, x, y),
        }
    }
}

impl std::str::FromStr for ResamplingPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "nearest" | "near" => Ok(ResamplingPolicy::Nearest),
            "bilinear" => Ok(ResamplingPolicy::Bilinear),
            "cubic" => Ok(ResamplingPolicy::Cubic),
            other => Err(Error::InvalidConfiguration(format!(
                "Unknown resampling policy '{}'",
                other
            ))),
        }
    }
}

/// Destination of one warp: the grid to fill and how to fill it
#[derive(Debug, Clone, PartialEq)]
pub struct WarpRequest {
    pub target: GeoGrid,
    pub resampling: ResamplingPolicy,
}

impl WarpRequest {
    pub fn new(target: GeoGrid, resampling: ResamplingPolicy) -> Self {
        Self { target, resampling }
    }

    /// North-up request covering `bounds` at `resolution` (x, y) in `projection`
    pub fn from_bounds(
        bounds: Bounds,
        resolution: (f64, f64),
        projection: Projection,
        resampling: ResamplingPolicy,
    ) -> Result<Self> {
        let (res_x, res_y) = resolution;
        if !(res_x > 0.0) || !(res_y > 0.0) {
            return Err(Error::InvalidConfiguration(format!(
                "Resolution must be positive, got {}x{}",
                res_x, res_y
            )));
        }
        let width = (bounds.width() / res_x).round().max(1.0) as u64;
        let height = (bounds.height() / res_y).round().max(1.0) as u64;
        let transform = GeoTransform::new(bounds.min_x, res_x, bounds.max_y, -res_y);
        Ok(Self::new(GeoGrid::new(width, height, transform, projection)?, resampling))
    }

    pub fn bounds(&self) -> Bounds {
        self.target.bounds()
    }

    pub fn resolution(&self) -> (f64, f64) {
        (self.target.transform.pixel_width, self.target.transform.pixel_height.abs())
    }

    pub fn projection(&self) -> &Projection {
        &self.target.projection
    }
}

/// Resamples a source raster into a destination grid
pub trait Warper {
    /// Returns `None` when the source does not overlap the request
    fn warp(&mut self, source: &mut dyn RasterSource, request: &WarpRequest) -> Result<Option<RasterBuffer>>;
}
