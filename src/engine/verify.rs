//! Grid equality checks across aligned outputs

use std::path::Path;

use crate::error::{Error, MismatchAttribute, Result};
use crate::grid::GeoGrid;
use crate::raster::DriverRegistry;

/// Largest per-coefficient transform difference treated as equal
pub const DEFAULT_TOLERANCE: f64 = 1e-6;

/// Confirms that rasters share one pixel grid
///
/// Every grid is compared with the first: size exactly, then the transform
/// coefficient by coefficient within the tolerance, then the canonical
/// projection descriptor exactly.
#[derive(Debug, Clone, Copy)]
pub struct AlignmentVerifier {
    tolerance: f64,
}

impl AlignmentVerifier {
    pub fn new() -> Self {
        Self { tolerance: DEFAULT_TOLERANCE }
    }

    pub fn with_tolerance(tolerance: f64) -> Self {
        Self { tolerance }
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Checks named grids; the error names the first mismatched pair
    pub fn verify(&self, grids: &[(&str, &GeoGrid)]) -> Result<()> {
        if grids.len() < 2 {
            return Err(Error::InvalidConfiguration(format!(
                "Alignment check needs at least two rasters, got {}",
                grids.len()
            )));
        }

        let (first_name, first) = grids[0];
        for &(name, grid) in &grids[1..] {
            let mismatch = |attribute, detail: String| Error::GridMismatch {
                first: first_name.to_string(),
                second: name.to_string(),
                attribute,
                detail,
            };

            if (grid.width, grid.height) != (first.width, first.height) {
                return Err(mismatch(
                    MismatchAttribute::Size,
                    format!("{}x{} vs {}x{}", first.width, first.height, grid.width, grid.height),
                ));
            }

            if !grid.transform.approx_eq(&first.transform, self.tolerance) {
                return Err(mismatch(
                    MismatchAttribute::Transform,
                    format!(
                        "{:?} vs {:?} (max difference {:e})",
                        first.transform.to_array(),
                        grid.transform.to_array(),
                        first.transform.max_abs_difference(&grid.transform)
                    ),
                ));
            }

            if grid.projection != first.projection {
                return Err(mismatch(
                    MismatchAttribute::Projection,
                    format!("'{}' vs '{}'", first.projection, grid.projection),
                ));
            }
        }

        tracing::info!(rasters = grids.len(), "Alignment verified");
        Ok(())
    }

    /// Opens each path and checks the grids it reports
    pub fn verify_paths<P: AsRef<Path>>(&self, registry: &DriverRegistry, paths: &[P]) -> Result<()> {
        let grids = paths
            .iter()
            .map(|path| {
                let source = registry.open(path.as_ref())?;
                Ok((path.as_ref().display().to_string(), source.info().grid.clone()))
            })
            .collect::<Result<Vec<_>>>()?;

        let named: Vec<(&str, &GeoGrid)> = grids.iter().map(|(name, grid)| (name.as_str(), grid)).collect();
        self.verify(&named)
    }
}

impl Default for AlignmentVerifier {
    fn default() -> Self {
        Self::new()
    }
}
