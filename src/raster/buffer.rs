//! In-memory banded rasters

use crate::error::{Error, Result};
use crate::grid::GeoGrid;
use crate::types::DataType;
use super::{PixelWindow, RasterSink, RasterSource};

/// Band-sequential `f64` pixels tied to a grid
///
/// A buffer is owned by the tile job that produced it until it is handed
/// to an output.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterBuffer {
    grid: GeoGrid,
    band_count: usize,
    data_type: DataType,
    data: Vec<f64>,
}

impl RasterBuffer {
    /// Creates a buffer filled with the grid's nodata value, or NaN without one
    pub fn new(grid: GeoGrid, band_count: usize, data_type: DataType) -> Self {
        let fill = grid.nodata.unwrap_or(f64::NAN);
        let len = grid.pixel_count() as usize * band_count;
        Self {
            grid,
            band_count,
            data_type,
            data: vec![fill; len],
        }
    }

    /// Creates a buffer from one row-major vector per band
    pub fn from_bands(grid: GeoGrid, data_type: DataType, bands: Vec<Vec<f64>>) -> Result<Self> {
        let band_len = grid.pixel_count() as usize;
        if bands.is_empty() {
            return Err(Error::InvalidConfiguration("Buffer needs at least one band".to_string()));
        }
        if let Some(bad) = bands.iter().position(|band| band.len() != band_len) {
            return Err(Error::InvalidConfiguration(format!(
                "Band {} holds {} values, expected {}",
                bad,
                bands[bad].len(),
                band_len
            )));
        }

        let band_count = bands.len();
        Ok(Self {
            grid,
            band_count,
            data_type,
            data: bands.concat(),
        })
    }

    /// Reads every band of `window` from `source`; `grid` describes the window
    pub fn read_from(source: &mut dyn RasterSource, window: PixelWindow, grid: GeoGrid) -> Result<Self> {
        let band_count = source.info().band_count;
        let data_type = source.info().data_type;
        let bands = (0..band_count)
            .map(|band| source.read_window(band, window))
            .collect::<Result<Vec<_>>>()?;
        Self::from_bands(grid, data_type, bands)
    }

    pub fn grid(&self) -> &GeoGrid {
        &self.grid
    }

    pub fn band_count(&self) -> usize {
        self.band_count
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn width(&self) -> u64 {
        self.grid.width
    }

    pub fn height(&self) -> u64 {
        self.grid.height
    }

    fn band_range(&self, band: usize) -> std::ops::Range<usize> {
        let len = self.grid.pixel_count() as usize;
        band * len..(band + 1) * len
    }

    pub fn band(&self, band: usize) -> &[f64] {
        &self.data[self.band_range(band)]
    }

    pub fn band_mut(&mut self, band: usize) -> &mut [f64] {
        let range = self.band_range(band);
        &mut self.data[range]
    }

    pub fn get(&self, band: usize, col: u64, row: u64) -> f64 {
        self.band(band)[(row * self.grid.width + col) as usize]
    }

    /// Writes every band to `sink` with the top-left corner at (`col`, `row`)
    pub fn write_to(&self, sink: &mut dyn RasterSink, col: u64, row: u64) -> Result<()> {
        let window = PixelWindow::new(col, row, self.grid.width, self.grid.height);
        for band in 0..self.band_count {
            sink.write_window(band, window, self.band(band))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{GeoTransform, Projection};

    fn grid(width: u64, height: u64) -> GeoGrid {
        GeoGrid::new(width, height, GeoTransform::new(0.0, 1.0, 0.0, -1.0), Projection::default()).unwrap()
    }

    #[test]
    fn test_new_fills_with_nodata() {
        let buffer = RasterBuffer::new(grid(2, 2).with_nodata(Some(-1.0)), 2, DataType::I16);
        assert!(buffer.band(1).iter().all(|&v| v == -1.0));

        let buffer = RasterBuffer::new(grid(2, 2), 1, DataType::F32);
        assert!(buffer.band(0).iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_from_bands_indexing() {
        let buffer = RasterBuffer::from_bands(
            grid(3, 2),
            DataType::F64,
            vec![vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0], vec![10.0; 6]],
        )
        .unwrap();

        assert_eq!(buffer.band_count(), 2);
        assert_eq!(buffer.get(0, 2, 1), 5.0);
        assert_eq!(buffer.get(1, 0, 0), 10.0);
    }

    #[test]
    fn test_from_bands_rejects_wrong_length() {
        let result = RasterBuffer::from_bands(grid(3, 2), DataType::F64, vec![vec![0.0; 5]]);
        assert!(matches!(result, Err(Error::InvalidConfiguration(_))));
        assert!(RasterBuffer::from_bands(grid(1, 1), DataType::F64, vec![]).is_err());
    }
}
