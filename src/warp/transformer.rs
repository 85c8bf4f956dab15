use proj::Proj;

use crate::error::{Error, Result};
use crate::grid::Projection;

/// Transforms coordinates between two coordinate reference systems
///
/// Identical (or unknown) projections transform as the identity and never
/// touch PROJ.
pub struct Transformer {
    proj: Option<Proj>,
    source: Projection,
    target: Projection,
}

impl Transformer {
    /// Creates a transformer from `source` to `target`
    ///
    /// Either side may be an `EPSG:n` code, a WKT string or a PROJ string.
    pub fn new(source: &Projection, target: &Projection) -> Result<Self> {
        let proj = if source == target || source.is_empty() || target.is_empty() {
            None
        } else {
            let proj = Proj::new_known_crs(source.as_str(), target.as_str(), None)
                .map_err(|e| Error::Projection(format!("Failed to create projection: {}", e)))?;
            Some(proj)
        };

        Ok(Self {
            proj,
            source: source.clone(),
            target: target.clone(),
        })
    }

    pub fn is_identity(&self) -> bool {
        self.proj.is_none()
    }

    pub fn source(&self) -> &Projection {
        &self.source
    }

    pub fn target(&self) -> &Projection {
        &self.target
    }

    /// Transforms one coordinate
    pub fn transform(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        match &self.proj {
            None => Ok((x, y)),
            Some(proj) => proj
                .convert((x, y))
                .map_err(|e| Error::Projection(format!("Transformation failed: {}", e))),
        }
    }

    /// Transforms coordinates in place; points PROJ cannot map become NaN
    pub fn transform_many(&self, points: &mut [(f64, f64)]) -> usize {
        let Some(proj) = &self.proj else { return points.len() };

        let mut mapped = 0;
        for point in points.iter_mut() {
            match proj.convert(*point) {
                Ok((x, y)) if x.is_finite() && y.is_finite() => {
                    *point = (x, y);
                    mapped += 1;
                }
                _ => *point = (f64::NAN, f64::NAN),
            }
        }
        mapped
    }
}
