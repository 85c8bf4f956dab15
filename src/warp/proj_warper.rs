//! PROJ-backed warper

use std::collections::HashMap;

use crate::error::Result;
use crate::grid::{GeoGrid, GeoTransform, Projection};
use crate::raster::{PixelWindow, RasterBuffer, RasterSource};
use super::kernels::Patch;
use super::{Transformer, WarpRequest, Warper};

/// Sample points per edge of the destination lattice used to find the source window
const LATTICE_POINTS: usize = 21;

/// Source pixel rectangle, end-exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SourceRegion {
    col0: u64,
    row0: u64,
    col1: u64,
    row1: u64,
}

impl SourceRegion {
    fn window(&self) -> PixelWindow {
        PixelWindow::new(self.col0, self.row0, self.col1 - self.col0, self.row1 - self.row0)
    }
}

/// Warper built on the `proj` crate
///
/// Holds one transformer per projection pair seen so far; a warper belongs
/// to a single worker.
pub struct ProjWarper {
    transformers: HashMap<(Projection, Projection), Transformer>,
}

impl ProjWarper {
    pub fn new() -> Self {
        Self { transformers: HashMap::new() }
    }

    /// Transformer from destination to source coordinates
    fn transformer(&mut self, target: &Projection, source: &Projection) -> Result<&Transformer> {
        let key = (target.clone(), source.clone());
        if !self.transformers.contains_key(&key) {
            let transformer = Transformer::new(target, source)?;
            tracing::debug!(identity = transformer.is_identity(), "Created warp transformer");
            self.transformers.insert(key.clone(), transformer);
        }
        Ok(&self.transformers[&key])
    }
}

impl Default for ProjWarper {
    fn default() -> Self {
        Self::new()
    }
}

/// Maps destination pixel coordinates to source pixel coordinates in place
fn to_source_pixels(
    points: &mut [(f64, f64)],
    target: &GeoTransform,
    transformer: &Transformer,
    source_inverse: &GeoTransform,
) {
    for point in points.iter_mut() {
        *point = target.apply(point.0, point.1);
    }
    transformer.transform_many(points);
    for point in points.iter_mut() {
        *point = source_inverse.apply(point.0, point.1);
    }
}

/// Pixel-centre lattice over the destination grid, including its border
fn lattice(width: u64, height: u64) -> Vec<(f64, f64)> {
    let steps = |len: u64| -> Vec<f64> {
        let n = LATTICE_POINTS.min(len as usize).max(1);
        if n == 1 {
            return vec![len as f64 / 2.0];
        }
        let (first, last) = (0.5, len as f64 - 0.5);
        (0..n).map(|i| first + (last - first) * i as f64 / (n - 1) as f64).collect()
    };

    let cols = steps(width);
    let rows = steps(height);
    rows.iter()
        .flat_map(|&r| cols.iter().map(move |&c| (c, r)))
        .collect()
}

/// Source rectangle needed for the sampled points, padded by `radius`
fn source_region(points: &[(f64, f64)], radius: u64, source: &GeoGrid) -> Option<SourceRegion> {
    let mut min = (f64::INFINITY, f64::INFINITY);
    let mut max = (f64::NEG_INFINITY, f64::NEG_INFINITY);
    for &(x, y) in points.iter().filter(|(x, y)| x.is_finite() && y.is_finite()) {
        min = (min.0.min(x), min.1.min(y));
        max = (max.0.max(x), max.1.max(y));
    }
    if !min.0.is_finite() {
        return None;
    }

    // One extra pixel of halo absorbs curvature between lattice points.
    let halo = radius as f64 + 1.0;
    let col0 = (min.0 - halo).floor().max(0.0);
    let row0 = (min.1 - halo).floor().max(0.0);
    let col1 = (max.0 + halo).ceil().min(source.width as f64);
    let row1 = (max.1 + halo).ceil().min(source.height as f64);

    (col1 > col0 && row1 > row0).then(|| SourceRegion {
        col0: col0 as u64,
        row0: row0 as u64,
        col1: col1 as u64,
        row1: row1 as u64,
    })
}

impl Warper for ProjWarper {
    fn warp(&mut self, source: &mut dyn RasterSource, request: &WarpRequest) -> Result<Option<RasterBuffer>> {
        let info = source.info().clone();
        let target = &request.target;
        let source_inverse = info.grid.transform.inverse()?;
        let transformer = self.transformer(&target.projection, &info.grid.projection)?;

        let mut samples = lattice(target.width, target.height);
        to_source_pixels(&mut samples, &target.transform, transformer, &source_inverse);

        let radius = request.resampling.kernel_radius();
        let Some(region) = source_region(&samples, radius, &info.grid) else {
            tracing::debug!(
                width = target.width,
                height = target.height,
                "Destination does not overlap the source"
            );
            return Ok(None);
        };

        let window = region.window();
        let bands = (0..info.band_count)
            .map(|band| source.read_window(band, window))
            .collect::<Result<Vec<_>>>()?;

        let output_grid = GeoGrid {
            nodata: target.nodata.or(info.grid.nodata),
            scale: target.scale.or(info.grid.scale),
            offset: target.offset.or(info.grid.offset),
            ..target.clone()
        };
        let mut output = RasterBuffer::new(output_grid, info.band_count, info.data_type);

        let patches: Vec<Patch<'_>> = bands
            .iter()
            .map(|values| {
                Patch::new(values, window.width as usize, window.height as usize, info.grid.nodata)
            })
            .collect();

        let width = target.width as usize;
        let mut row_points = Vec::with_capacity(width);
        let mut sampled = 0u64;

        for row in 0..target.height {
            row_points.clear();
            row_points.extend((0..target.width).map(|col| (col as f64 + 0.5, row as f64 + 0.5)));
            to_source_pixels(&mut row_points, &target.transform, transformer, &source_inverse);

            for (col, &(sx, sy)) in row_points.iter().enumerate() {
                let x = sx - region.col0 as f64;
                let y = sy - region.row0 as f64;
                let index = row as usize * width + col;
                for (band, patch) in patches.iter().enumerate() {
                    if let Some(value) = request.resampling.sample(patch, x, y) {
                        output.band_mut(band)[index] = value;
                        sampled += 1;
                    }
                }
            }
        }

        tracing::trace!(
            source_window = ?window,
            sampled,
            resampling = request.resampling.name(),
            "Warped tile"
        );

        Ok(Some(output))
    }
}
