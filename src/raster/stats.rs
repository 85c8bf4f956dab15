//! Value range summaries

use crate::error::Result;
use super::{PixelWindow, RasterSource};

/// Rows read per strip while scanning a band
const SCAN_ROWS: u64 = 1024;

/// Minimum and maximum over the valid values of a band
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterStats {
    pub min: f64,
    pub max: f64,
    pub valid_count: u64,
}

impl RasterStats {
    /// Summarizes `values`, skipping NaN and `nodata`; `None` if nothing is valid
    pub fn compute(values: &[f64], nodata: Option<f64>) -> Option<Self> {
        let mut stats: Option<RasterStats> = None;
        for &value in values {
            if !is_valid(value, nodata) {
                continue;
            }
            stats = Some(match stats {
                None => RasterStats { min: value, max: value, valid_count: 1 },
                Some(s) => s.include(value),
            });
        }
        stats
    }

    /// Scans one band of `source` strip by strip
    pub fn scan(source: &mut dyn RasterSource, band: usize) -> Result<Option<Self>> {
        let window = PixelWindow::full(source.info().width(), source.info().height());
        Self::scan_window(source, band, window)
    }

    /// Scans `window` of one band, strip by strip
    pub fn scan_window(
        source: &mut dyn RasterSource,
        band: usize,
        window: PixelWindow,
    ) -> Result<Option<Self>> {
        let nodata = source.info().grid.nodata;

        let mut total: Option<RasterStats> = None;
        let mut row = window.row;
        let end = window.row + window.height;
        while row < end {
            let rows = SCAN_ROWS.min(end - row);
            let values = source.read_window(band, PixelWindow::new(window.col, row, window.width, rows))?;
            if let Some(strip) = Self::compute(&values, nodata) {
                total = Some(match total {
                    None => strip,
                    Some(t) => t.merge(&strip),
                });
            }
            row += rows;
        }

        Ok(total)
    }

    fn include(self, value: f64) -> Self {
        RasterStats {
            min: self.min.min(value),
            max: self.max.max(value),
            valid_count: self.valid_count + 1,
        }
    }

    pub fn merge(&self, other: &RasterStats) -> Self {
        RasterStats {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
            valid_count: self.valid_count + other.valid_count,
        }
    }

    /// Range in physical units, `raw * scale + offset`
    pub fn physical(&self, scale: Option<f64>, offset: Option<f64>) -> (f64, f64) {
        let scale = scale.unwrap_or(1.0);
        let offset = offset.unwrap_or(0.0);
        let a = self.min * scale + offset;
        let b = self.max * scale + offset;
        (a.min(b), a.max(b))
    }
}

/// True for finite values that are not the nodata marker
pub fn is_valid(value: f64, nodata: Option<f64>) -> bool {
    !value.is_nan() && nodata.map_or(true, |nd| value != nd)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_skips_missing() {
        let values = [f64::NAN, -32768.0, 3.0, -2.0, 7.5];
        let stats = RasterStats::compute(&values, Some(-32768.0)).unwrap();

        assert_eq!(stats.min, -2.0);
        assert_eq!(stats.max, 7.5);
        assert_eq!(stats.valid_count, 3);
    }

    #[test]
    fn test_compute_all_missing() {
        assert!(RasterStats::compute(&[f64::NAN, 0.0], Some(0.0)).is_none());
        assert!(RasterStats::compute(&[], None).is_none());
    }

    #[test]
    fn test_physical_range() {
        let stats = RasterStats { min: -100.0, max: 200.0, valid_count: 2 };
        assert_eq!(stats.physical(Some(0.5), Some(1_737_400.0)), (1_737_350.0, 1_737_500.0));
        assert_eq!(stats.physical(Some(-1.0), None), (-200.0, 100.0));
        assert_eq!(stats.physical(None, None), (-100.0, 200.0));
    }

    #[test]
    fn test_merge() {
        let a = RasterStats { min: 1.0, max: 4.0, valid_count: 2 };
        let b = RasterStats { min: -1.0, max: 3.0, valid_count: 5 };
        assert_eq!(a.merge(&b), RasterStats { min: -1.0, max: 4.0, valid_count: 7 });
    }

    #[test]
    fn test_scan_window() {
        use std::path::Path;
        use crate::grid::{GeoGrid, GeoTransform, Projection};
        use crate::raster::{MemoryDriver, RasterBuffer, RasterDriver};
        use crate::types::DataType;

        let grid = GeoGrid::new(4, 3, GeoTransform::new(0.0, 1.0, 3.0, -1.0), Projection::default())
            .unwrap()
            .with_nodata(Some(5.0));
        let values: Vec<f64> = (0..12).map(|v| v as f64).collect();
        let buffer = RasterBuffer::from_bands(grid, DataType::U8, vec![values]).unwrap();
        let driver = MemoryDriver::isolated();
        driver.insert(Path::new("mem://stats"), &buffer, Default::default());
        let mut source = driver.open(Path::new("mem://stats")).unwrap();

        let full = RasterStats::scan(source.as_mut(), 0).unwrap().unwrap();
        assert_eq!(full, RasterStats { min: 0.0, max: 11.0, valid_count: 11 });

        let window = RasterStats::scan_window(source.as_mut(), 0, PixelWindow::new(1, 1, 2, 2)).unwrap().unwrap();
        assert_eq!(window, RasterStats { min: 6.0, max: 10.0, valid_count: 3 });
    }
}
