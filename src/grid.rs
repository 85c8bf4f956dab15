//! Georeferenced pixel grids
//!
//! A [`GeoGrid`] ties raster dimensions to an affine pixel-to-world
//! transform and a projection descriptor. Transform coefficients use GDAL
//! order: origin X, pixel width, row rotation, origin Y, column rotation,
//! pixel height.

use std::fmt;
use crate::error::{Error, Result};

/// Affine pixel-to-world transform
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub pixel_width: f64,
    pub row_rotation: f64,
    pub origin_y: f64,
    pub col_rotation: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// Creates a north-up transform without rotation
    pub fn new(origin_x: f64, pixel_width: f64, origin_y: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            pixel_width,
            row_rotation: 0.0,
            origin_y,
            col_rotation: 0.0,
            pixel_height,
        }
    }

    /// Creates a transform from six GDAL-ordered coefficients
    pub fn from_array(coefficients: [f64; 6]) -> Self {
        Self {
            origin_x: coefficients[0],
            pixel_width: coefficients[1],
            row_rotation: coefficients[2],
            origin_y: coefficients[3],
            col_rotation: coefficients[4],
            pixel_height: coefficients[5],
        }
    }

    /// Returns the six GDAL-ordered coefficients
    pub fn to_array(&self) -> [f64; 6] {
        [
            self.origin_x,
            self.pixel_width,
            self.row_rotation,
            self.origin_y,
            self.col_rotation,
            self.pixel_height,
        ]
    }

    /// Maps a fractional pixel position (corner convention) to world coordinates
    pub fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.origin_x + col * self.pixel_width + row * self.row_rotation,
            self.origin_y + col * self.col_rotation + row * self.pixel_height,
        )
    }

    /// Returns the inverse transform, mapping world coordinates to pixel positions
    pub fn inverse(&self) -> Result<GeoTransform> {
        let det = self.pixel_width * self.pixel_height - self.row_rotation * self.col_rotation;
        if det.abs() < f64::EPSILON * 1e-6 || !det.is_finite() {
            return Err(Error::InvalidConfiguration(
                "Transform is not invertible".to_string(),
            ));
        }

        let a = self.pixel_height / det;
        let b = -self.row_rotation / det;
        let c = -self.col_rotation / det;
        let d = self.pixel_width / det;

        Ok(GeoTransform {
            origin_x: -(a * self.origin_x + b * self.origin_y),
            pixel_width: a,
            row_rotation: b,
            origin_y: -(c * self.origin_x + d * self.origin_y),
            col_rotation: c,
            pixel_height: d,
        })
    }

    /// Returns the transform of a sub-grid whose top-left pixel is (`col`, `row`)
    pub fn offset_to(&self, col: u64, row: u64) -> GeoTransform {
        let (origin_x, origin_y) = self.apply(col as f64, row as f64);
        GeoTransform {
            origin_x,
            origin_y,
            ..*self
        }
    }

    /// Returns true if the transform has no rotation terms
    pub fn is_north_up(&self) -> bool {
        self.row_rotation == 0.0 && self.col_rotation == 0.0
    }

    /// Largest component-wise absolute difference to `other`
    pub fn max_abs_difference(&self, other: &GeoTransform) -> f64 {
        self.to_array()
            .iter()
            .zip(other.to_array().iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max)
    }

    /// Component-wise equality within `tolerance`
    pub fn approx_eq(&self, other: &GeoTransform, tolerance: f64) -> bool {
        self.to_array()
            .iter()
            .zip(other.to_array().iter())
            .all(|(a, b)| (a - b).abs() <= tolerance)
    }
}

/// Axis-aligned world bounds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self { min_x, min_y, max_x, max_y }
    }

    /// Smallest bounds enclosing all `points`
    pub fn from_points(points: &[(f64, f64)]) -> Self {
        points.iter().fold(
            Bounds::new(f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
            |acc, &(x, y)| Bounds {
                min_x: acc.min_x.min(x),
                min_y: acc.min_y.min(y),
                max_x: acc.max_x.max(x),
                max_y: acc.max_y.max(y),
            },
        )
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Returns true if the two bounds share a region of positive area
    pub fn intersects(&self, other: &Bounds) -> bool {
        self.min_x < other.max_x
            && other.min_x < self.max_x
            && self.min_y < other.max_y
            && other.min_y < self.max_y
    }
}

/// Opaque projection descriptor compared by canonical value
///
/// Canonicalization trims the descriptor and collapses whitespace runs
/// outside double-quoted names to one space. Whitespace touching a WKT
/// delimiter is dropped, so pretty-printed and compact WKT compare equal
/// while PROJ strings keep their separators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Projection(String);

fn is_wkt_delimiter(ch: char) -> bool {
    matches!(ch, '[' | ']' | '(' | ')' | ',')
}

impl Projection {
    pub fn new(descriptor: &str) -> Self {
        let mut canonical = String::with_capacity(descriptor.len());
        let mut quoted = false;
        let mut pending_space = false;
        for ch in descriptor.trim().chars() {
            if !quoted && ch.is_whitespace() {
                pending_space = true;
                continue;
            }
            if pending_space
                && !is_wkt_delimiter(ch)
                && !canonical.ends_with(is_wkt_delimiter)
            {
                canonical.push(' ');
            }
            pending_space = false;
            if ch == '"' {
                quoted = !quoted;
            }
            canonical.push(ch);
        }
        Self(canonical)
    }

    /// Equirectangular projection on a sphere of `radius` metres
    pub fn equirectangular_sphere(body: &str, radius: f64) -> Self {
        Self::new(&format!(
            "PROJCS[\"{body}_Equirectangular\",\
             GEOGCS[\"GCS_{body}\",DATUM[\"D_{body}\",SPHEROID[\"{body}\",{radius},0]],\
             PRIMEM[\"Reference_Meridian\",0],UNIT[\"degree\",0.0174532925199433]],\
             PROJECTION[\"Equirectangular\"],\
             PARAMETER[\"standard_parallel_1\",0],PARAMETER[\"central_meridian\",0],\
             PARAMETER[\"false_easting\",0],PARAMETER[\"false_northing\",0],\
             UNIT[\"metre\",1]]",
            body = body,
            radius = radius,
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pixel grid with georeferencing and value metadata
#[derive(Debug, Clone, PartialEq)]
pub struct GeoGrid {
    pub width: u64,
    pub height: u64,
    pub transform: GeoTransform,
    pub projection: Projection,
    pub nodata: Option<f64>,
    pub scale: Option<f64>,
    pub offset: Option<f64>,
}

impl GeoGrid {
    /// Creates a validated grid without value metadata
    pub fn new(width: u64, height: u64, transform: GeoTransform, projection: Projection) -> Result<Self> {
        let grid = Self {
            width,
            height,
            transform,
            projection,
            nodata: None,
            scale: None,
            offset: None,
        };
        grid.validate()?;
        Ok(grid)
    }

    /// Global equirectangular grid for a sphere of `body_radius` metres
    ///
    /// A square grid of `floor(C / resolution)` pixels per side, C being the
    /// circumference, with its north-west corner at (-C/2, C/2).
    pub fn global_equirectangular(
        body_radius: f64,
        resolution: f64,
        projection: Projection,
    ) -> Result<Self> {
        if !(body_radius > 0.0) || !(resolution > 0.0) {
            return Err(Error::InvalidConfiguration(format!(
                "Body radius and resolution must be positive (radius {}, resolution {})",
                body_radius, resolution
            )));
        }

        let circumference = 2.0 * std::f64::consts::PI * body_radius;
        let size = (circumference / resolution).floor() as u64;
        if size == 0 {
            return Err(Error::InvalidConfiguration(format!(
                "Resolution {} is coarser than the circumference",
                resolution
            )));
        }

        let transform = GeoTransform::new(
            -circumference / 2.0,
            resolution,
            circumference / 2.0,
            -resolution,
        );
        Self::new(size, size, transform, projection)
    }

    /// Checks the grid invariants
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::InvalidConfiguration(format!(
                "Grid dimensions must be positive, got {}x{}",
                self.width, self.height
            )));
        }
        if !self.transform.to_array().iter().all(|c| c.is_finite()) {
            return Err(Error::InvalidConfiguration(
                "Transform coefficients must be finite".to_string(),
            ));
        }
        if self.transform.pixel_width <= 0.0 {
            return Err(Error::InvalidConfiguration(format!(
                "Pixel width must be positive, got {}",
                self.transform.pixel_width
            )));
        }
        if self.transform.pixel_height == 0.0 {
            return Err(Error::InvalidConfiguration(
                "Pixel height must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_nodata(mut self, nodata: Option<f64>) -> Self {
        self.nodata = nodata;
        self
    }

    pub fn with_scale_offset(mut self, scale: Option<f64>, offset: Option<f64>) -> Self {
        self.scale = scale;
        self.offset = offset;
        self
    }

    /// World bounds of the pixel rectangle [col, col+width) x [row, row+height)
    pub fn window_bounds(&self, col: u64, row: u64, width: u64, height: u64) -> Bounds {
        let (c0, r0) = (col as f64, row as f64);
        let (c1, r1) = ((col + width) as f64, (row + height) as f64);
        Bounds::from_points(&[
            self.transform.apply(c0, r0),
            self.transform.apply(c1, r0),
            self.transform.apply(c0, r1),
            self.transform.apply(c1, r1),
        ])
    }

    /// World bounds of the whole grid
    pub fn bounds(&self) -> Bounds {
        self.window_bounds(0, 0, self.width, self.height)
    }

    pub fn pixel_count(&self) -> u64 {
        self.width * self.height
    }
}
