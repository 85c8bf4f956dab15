//! Per-tile resampling

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::raster::{
    apply_grid, CreateOptions, DriverRegistry, PixelWindow, RasterBuffer, RasterSource, RasterSpec,
};
use crate::tiling::WraparoundShifter;
use crate::warp::{ProjWarper, ResamplingPolicy, WarpRequest, Warper};
use super::job::{TileJob, TileMode, TileOutput, TileResult, TileTarget};

/// Replaces nodata with NaN and clamps finite values to the tile's own range
///
/// The clamp bounds are the observed minimum and maximum, so it never moves
/// a value; it is kept so shifted tiles match the established output
/// bit for bit.
pub fn normalize_tile(values: &mut [f64], nodata: Option<f64>) {
    if let Some(nd) = nodata {
        for value in values.iter_mut().filter(|v| **v == nd) {
            *value = f64::NAN;
        }
    }

    let range = values
        .iter()
        .filter(|v| v.is_finite())
        .fold(None, |acc: Option<(f64, f64)>, &v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        });

    if let Some((lo, hi)) = range {
        for value in values.iter_mut().filter(|v| v.is_finite()) {
            *value = value.clamp(lo, hi);
        }
    }
}

/// Worker-local executor for tile jobs
///
/// Owns the worker's driver registry, warper and open sources; sources are
/// opened on first use and reused for later tiles of the same input.
pub struct TileResampler<W: Warper = ProjWarper> {
    registry: DriverRegistry,
    warper: W,
    sources: HashMap<PathBuf, Box<dyn RasterSource>>,
    options: CreateOptions,
}

impl TileResampler<ProjWarper> {
    /// Resampler with the default drivers and the PROJ warper
    pub fn with_defaults(options: CreateOptions) -> Self {
        Self::new(DriverRegistry::with_defaults(), ProjWarper::new(), options)
    }
}

impl<W: Warper> TileResampler<W> {
    /// `options` apply to tiles written to files
    pub fn new(registry: DriverRegistry, warper: W, options: CreateOptions) -> Self {
        Self {
            registry,
            warper,
            sources: HashMap::new(),
            options,
        }
    }

    /// Runs one job; failures are captured in the result
    pub fn run(&mut self, job: &TileJob) -> TileResult {
        match self.execute(job) {
            Ok(output) => TileResult::succeeded(job.tile.clone(), output),
            Err(e) => TileResult::failed(job.tile.clone(), e),
        }
    }

    fn execute(&mut self, job: &TileJob) -> Result<TileOutput> {
        let buffer = match job.mode {
            TileMode::Reproject(policy) => self.reproject(job, policy)?,
            TileMode::Shift(shift) => self.shift(job, shift)?,
        };
        self.emit(job, buffer)
    }

    fn source<'a>(
        sources: &'a mut HashMap<PathBuf, Box<dyn RasterSource>>,
        registry: &DriverRegistry,
        path: &Path,
    ) -> Result<&'a mut Box<dyn RasterSource>> {
        if !sources.contains_key(path) {
            let source = registry.open(path)?;
            tracing::debug!(path = %path.display(), "Opened source for worker");
            sources.insert(path.to_path_buf(), source);
        }
        sources
            .get_mut(path)
            .ok_or_else(|| Error::InvalidConfiguration(format!("Source {} not open", path.display())))
    }

    /// Resamples the job's input into the tile grid
    pub fn reproject(&mut self, job: &TileJob, policy: ResamplingPolicy) -> Result<RasterBuffer> {
        let failure = |reason: String| Error::ResampleFailure {
            tile_x: job.tile.tile_x,
            tile_y: job.tile.tile_y,
            reason,
        };

        let source = Self::source(&mut self.sources, &self.registry, &job.input)?;
        let request = WarpRequest::new(job.tile_grid(), policy);

        match self.warper.warp(source.as_mut(), &request) {
            Ok(Some(buffer)) => Ok(buffer),
            Ok(None) => Err(failure("source does not overlap the tile".to_string())),
            Err(e) => Err(failure(e.to_string())),
        }
    }

    /// Copies the tile's wraparound source window and normalizes it
    pub fn shift(&mut self, job: &TileJob, shift: i64) -> Result<RasterBuffer> {
        let source = Self::source(&mut self.sources, &self.registry, &job.input)?;
        let info = source.info().clone();

        let tile = &job.tile;
        if tile.pixel_offset_y + tile.pixel_height > info.height() {
            return Err(Error::InvalidTileGeometry(format!(
                "Tile rows {}..{} outside source height {}",
                tile.pixel_offset_y,
                tile.pixel_offset_y + tile.pixel_height,
                info.height()
            )));
        }

        let shifter = WraparoundShifter::new(info.width())?;
        let window = shifter.window_for_tile(tile, shift)?;
        let nodata = info.grid.nodata;

        let bands = (0..info.band_count)
            .map(|band| {
                let mut values = shifter.read(&window, |span, row, height| {
                    source.read_window(band, PixelWindow::new(span.offset_x, row, span.width, height))
                })?;
                normalize_tile(&mut values, nodata);
                Ok(values)
            })
            .collect::<Result<Vec<_>>>()?;

        let grid = tile.grid(&info.grid);
        RasterBuffer::from_bands(grid, info.data_type, bands)
    }

    fn emit(&mut self, job: &TileJob, buffer: RasterBuffer) -> Result<TileOutput> {
        match &job.output {
            TileTarget::Memory => Ok(TileOutput::Memory(buffer)),
            TileTarget::File(path) => {
                let spec = RasterSpec {
                    width: buffer.width(),
                    height: buffer.height(),
                    band_count: buffer.band_count(),
                    data_type: buffer.data_type(),
                    options: self.options,
                };
                let mut sink = self.registry.create(path, &spec)?;
                apply_grid(sink.as_mut(), buffer.grid())?;
                buffer.write_to(sink.as_mut(), 0, 0)?;
                sink.close()?;
                Ok(TileOutput::File(path.clone()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use crate::grid::{GeoGrid, GeoTransform, Projection};
    use crate::raster::MemoryDriver;
    use crate::tiling::TilePlanner;
    use crate::types::DataType;

    fn ramp_source(driver: &MemoryDriver, path: &str, nodata: Option<f64>) -> GeoGrid {
        let grid = GeoGrid::new(8, 4, GeoTransform::new(0.0, 1.0, 4.0, -1.0), Projection::new("EPSG:4326"))
            .unwrap()
            .with_nodata(nodata);
        let values: Vec<f64> = (0..32).map(|v| v as f64).collect();
        let buffer = RasterBuffer::from_bands(grid.clone(), DataType::F32, vec![values]).unwrap();
        driver.insert(Path::new(path), &buffer, Default::default());
        grid
    }

    fn resampler(driver: &MemoryDriver) -> TileResampler {
        let mut registry = DriverRegistry::empty();
        registry.register(Box::new(driver.clone()));
        TileResampler::new(registry, ProjWarper::new(), CreateOptions::default())
    }

    fn jobs(grid: GeoGrid, tile_size: u64, input: &str, mode: TileMode) -> Vec<TileJob> {
        let target = Arc::new(grid);
        TilePlanner::new(tile_size)
            .unwrap()
            .plan(&target)
            .unwrap()
            .into_iter()
            .map(|tile| TileJob {
                input: PathBuf::from(input),
                target: Arc::clone(&target),
                tile,
                mode,
                output: TileTarget::Memory,
            })
            .collect()
    }

    fn memory_output(result: TileResult) -> RasterBuffer {
        match result.outcome {
            Ok(TileOutput::Memory(buffer)) => buffer,
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_normalize_tile() {
        let mut values = vec![1.0, -9999.0, 3.0, f64::NAN];
        normalize_tile(&mut values, Some(-9999.0));
        assert_eq!(values[0], 1.0);
        assert!(values[1].is_nan());
        assert_eq!(values[2], 3.0);
        assert!(values[3].is_nan());

        let mut empty = vec![-9999.0; 3];
        normalize_tile(&mut empty, Some(-9999.0));
        assert!(empty.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_shift_tiles_wrap() {
        let driver = MemoryDriver::isolated();
        let grid = ramp_source(&driver, "mem://shift-src", None);
        let mut resampler = resampler(&driver);

        for job in jobs(grid, 3, "mem://shift-src", TileMode::Shift(4)) {
            let tile = job.tile.clone();
            let buffer = memory_output(resampler.run(&job));
            assert_eq!(buffer.width(), tile.pixel_width);
            for row in 0..tile.pixel_height {
                for col in 0..tile.pixel_width {
                    let x = tile.pixel_offset_x + col;
                    let y = tile.pixel_offset_y + row;
                    let expected = (y * 8 + (x + 4) % 8) as f64;
                    assert_eq!(buffer.get(0, col, row), expected);
                }
            }
        }
    }

    #[test]
    fn test_shift_replaces_nodata_with_nan() {
        let driver = MemoryDriver::isolated();
        let grid = ramp_source(&driver, "mem://shift-nodata", Some(5.0));
        let mut resampler = resampler(&driver);

        let job = jobs(grid, 8, "mem://shift-nodata", TileMode::Shift(0)).remove(0);
        let buffer = memory_output(resampler.run(&job));
        assert!(buffer.get(0, 5, 0).is_nan());
        assert_eq!(buffer.get(0, 6, 0), 6.0);
        assert_eq!(buffer.grid().nodata, Some(5.0));
    }

    #[test]
    fn test_shift_tile_wider_than_source_fails() {
        let driver = MemoryDriver::isolated();
        ramp_source(&driver, "mem://narrow", None);
        let mut resampler = resampler(&driver);

        let wide = GeoGrid::new(16, 4, GeoTransform::new(0.0, 1.0, 4.0, -1.0), Projection::default()).unwrap();
        let job = jobs(wide, 16, "mem://narrow", TileMode::Shift(0)).remove(0);
        let result = resampler.run(&job);
        assert!(matches!(result.error(), Some(Error::InvalidTileGeometry(_))));
    }

    #[test]
    fn test_reproject_same_projection() {
        let driver = MemoryDriver::isolated();
        let grid = ramp_source(&driver, "mem://reproject", None);
        let mut resampler = resampler(&driver);

        let results: Vec<_> = jobs(grid, 4, "mem://reproject", TileMode::Reproject(ResamplingPolicy::Nearest))
            .iter()
            .map(|job| resampler.run(job))
            .collect();

        assert_eq!(results.len(), 2);
        let right = memory_output(results.into_iter().nth(1).unwrap());
        assert_eq!(right.get(0, 0, 0), 4.0);
        assert_eq!(right.get(0, 3, 3), 31.0);
    }

    #[test]
    fn test_reproject_without_overlap_is_tile_failure() {
        let driver = MemoryDriver::isolated();
        ramp_source(&driver, "mem://far", None);
        let mut resampler = resampler(&driver);

        let far = GeoGrid::new(4, 4, GeoTransform::new(500.0, 1.0, 4.0, -1.0), Projection::new("EPSG:4326")).unwrap();
        let job = jobs(far, 4, "mem://far", TileMode::Reproject(ResamplingPolicy::Bilinear)).remove(0);
        let result = resampler.run(&job);
        assert!(matches!(
            result.error(),
            Some(Error::ResampleFailure { tile_x: 0, tile_y: 0, .. })
        ));
    }

    #[test]
    fn test_missing_input_is_tile_failure() {
        let driver = MemoryDriver::isolated();
        let mut resampler = resampler(&driver);
        let grid = GeoGrid::new(4, 4, GeoTransform::new(0.0, 1.0, 4.0, -1.0), Projection::default()).unwrap();
        let job = jobs(grid, 4, "mem://missing", TileMode::Shift(0)).remove(0);
        assert!(!resampler.run(&job).is_success());
    }

    #[test]
    fn test_file_output() {
        let dir = tempfile::tempdir().unwrap();
        let driver = MemoryDriver::isolated();
        let grid = ramp_source(&driver, "mem://to-file", Some(-1.0));

        let mut registry = DriverRegistry::empty();
        registry.register(Box::new(driver.clone()));
        registry.register(Box::new(crate::formats::tiff::GeoTiffDriver::new()));
        let mut resampler = TileResampler::new(registry, ProjWarper::new(), CreateOptions::default());

        let mut job = jobs(grid.clone(), 8, "mem://to-file", TileMode::Shift(2)).remove(0);
        let path = dir.path().join("tile_0_0.tif");
        job.output = TileTarget::File(path.clone());

        let result = resampler.run(&job);
        assert!(matches!(result.output(), Some(TileOutput::File(p)) if *p == path));

        let mut written = crate::formats::tiff::GeoTiffSource::open(&path).unwrap();
        assert_eq!(written.info().grid.transform, grid.transform);
        assert_eq!(written.info().grid.nodata, Some(-1.0));
        let row = written.read_window(0, PixelWindow::new(0, 0, 8, 1)).unwrap();
        assert_eq!(row, vec![2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 0.0, 1.0]);
    }
}
