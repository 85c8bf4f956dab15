//! Resampling kernels
//!
//! Coordinates are corner based: pixel `(c, r)` covers `[c, c+1) x [r, r+1)`
//! and its centre sits at `(c + 0.5, r + 0.5)`. Interpolating kernels skip
//! neighbours that are outside the patch or invalid and renormalize the
//! remaining weights, so edge pixels and nodata holes shrink the footprint
//! instead of blanking the sample.

use crate::raster::stats::is_valid;

/// Source pixels available to a kernel, row-major
#[derive(Debug, Clone, Copy)]
pub struct Patch<'a> {
    pub values: &'a [f64],
    pub width: usize,
    pub height: usize,
    pub nodata: Option<f64>,
}

impl<'a> Patch<'a> {
    pub fn new(values: &'a [f64], width: usize, height: usize, nodata: Option<f64>) -> Self {
        debug_assert_eq!(values.len(), width * height);
        Self { values, width, height, nodata }
    }

    /// Valid value at an integer position, if any
    fn at(&self, col: isize, row: isize) -> Option<f64> {
        if col < 0 || row < 0 || col as usize >= self.width || row as usize >= self.height {
            return None;
        }
        let value = self.values[row as usize * self.width + col as usize];
        is_valid(value, self.nodata).then_some(value)
    }

    /// Weighted sum over valid neighbours, renormalized
    fn weighted<I>(&self, taps: I) -> Option<f64>
    where
        I: IntoIterator<Item = (isize, isize, f64)>,
    {
        let mut sum = 0.0;
        let mut total = 0.0;
        for (col, row, weight) in taps {
            if weight == 0.0 {
                continue;
            }
            if let Some(value) = self.at(col, row) {
                sum += value * weight;
                total += weight;
            }
        }
        (total > 1e-9).then(|| sum / total)
    }
}

/// Nearest neighbour
pub fn nearest(patch: &Patch<'_>, x: f64, y: f64) -> Option<f64> {
    if !x.is_finite() || !y.is_finite() {
        return None;
    }
    patch.at(x.floor() as isize, y.floor() as isize)
}

/// Bilinear interpolation over the 2x2 neighbourhood
pub fn bilinear(patch: &Patch<'_>, x: f64, y: f64) -> Option<f64> {
    if !x.is_finite() || !y.is_finite() {
        return None;
    }
    let cx = x - 0.5;
    let cy = y - 0.5;
    let x0 = cx.floor();
    let y0 = cy.floor();
    let dx = cx - x0;
    let dy = cy - y0;
    let (x0, y0) = (x0 as isize, y0 as isize);

    patch.weighted([
        (x0, y0, (1.0 - dx) * (1.0 - dy)),
        (x0 + 1, y0, dx * (1.0 - dy)),
        (x0, y0 + 1, (1.0 - dx) * dy),
        (x0 + 1, y0 + 1, dx * dy),
    ])
}

/// Keys cubic convolution weight, a = -0.5
fn cubic_weight(t: f64) -> f64 {
    const A: f64 = -0.5;
    let t = t.abs();
    if t <= 1.0 {
        (A + 2.0) * t * t * t - (A + 3.0) * t * t + 1.0
    } else if t < 2.0 {
        A * t * t * t - 5.0 * A * t * t + 8.0 * A * t - 4.0 * A
    } else {
        0.0
    }
}

/// Cubic convolution over the 4x4 neighbourhood
pub fn cubic(patch: &Patch<'_>, x: f64, y: f64) -> Option<f64> {
    if !x.is_finite() || !y.is_finite() {
        return None;
    }
    let cx = x - 0.5;
    let cy = y - 0.5;
    let ix = cx.floor();
    let iy = cy.floor();
    let dx = cx - ix;
    let dy = cy - iy;
    let (ix, iy) = (ix as isize, iy as isize);

    let taps = (-1..=2isize).flat_map(move |j| {
        let wy = cubic_weight(dy - j as f64);
        (-1..=2isize).map(move |i| (ix + i, iy + j, cubic_weight(dx - i as f64) * wy))
    });
    patch.weighted(taps)
}
