//! Longitude re-centring of a global raster

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::engine::{MosaicAssembler, TileJob, TileMode, TileResampler, TileScheduler};
use crate::error::{Result, Stage};
use crate::grid::{GeoGrid, GeoTransform};
use crate::raster::{CreateOptions, DriverRegistry};
use crate::tiling::{TilePlanner, WraparoundShifter, DEFAULT_SHIFT_TILE_SIZE};
use super::{collect_failures, TileFailure, TileStaging};

/// Settings for a shift run
#[derive(Debug, Clone, PartialEq)]
pub struct ShiftOptions {
    /// Columns to shift by; `None` shifts by half the width
    pub shift: Option<i64>,
    pub tile_size: u64,
    pub workers: usize,
    /// Band scale written to the output instead of the input's
    pub scale: Option<f64>,
    /// Band offset written to the output instead of the input's
    pub offset: Option<f64>,
    /// Metadata items stamped on the output after the input's own
    pub metadata: BTreeMap<String, String>,
    pub output: CreateOptions,
    pub keep_tiles: bool,
}

impl Default for ShiftOptions {
    fn default() -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert("MinimumLongitude".to_string(), "0".to_string());
        metadata.insert("MaximumLongitude".to_string(), "360".to_string());

        Self {
            shift: None,
            tile_size: DEFAULT_SHIFT_TILE_SIZE,
            workers: 0,
            scale: None,
            offset: None,
            metadata,
            output: CreateOptions::default(),
            keep_tiles: false,
        }
    }
}

/// Outcome of a shift run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShiftReport {
    pub shift: i64,
    pub tiles: usize,
    pub failed: usize,
    /// Which tiles failed and why
    pub failures: Vec<TileFailure>,
}

/// Circularly shifts a raster horizontally, tile by tile
pub struct ShiftPipeline {
    options: ShiftOptions,
}

impl ShiftPipeline {
    pub fn new(options: ShiftOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ShiftOptions {
        &self.options
    }

    pub fn run(&self, input: &Path, output: &Path) -> Result<ShiftReport> {
        let registry = DriverRegistry::with_defaults();
        let info = registry
            .open(input)
            .map(|source| source.info().clone())
            .map_err(|e| e.in_stage(Stage::Open))?;

        let shifter = WraparoundShifter::new(info.width()).map_err(|e| e.in_stage(Stage::Plan))?;
        let shift = self.options.shift.unwrap_or_else(|| shifter.half_width_shift());
        tracing::info!(
            input = %input.display(),
            width = info.width(),
            height = info.height(),
            bands = info.band_count,
            shift,
            "Shifting raster"
        );

        // Tiles are planned in pixel space; the source transform is copied to
        // the output untouched, whatever it is.
        let source_grid = Arc::new(GeoGrid {
            transform: GeoTransform::new(0.0, 1.0, 0.0, 1.0),
            ..info.grid.clone()
        });
        let tiles = TilePlanner::new(self.options.tile_size)
            .and_then(|planner| planner.plan(&source_grid))
            .map_err(|e| e.in_stage(Stage::Plan))?;
        let staging = TileStaging::prepare(output, self.options.keep_tiles).map_err(|e| e.in_stage(Stage::Plan))?;

        let jobs: Vec<TileJob> = tiles
            .into_iter()
            .map(|tile| TileJob {
                input: input.to_path_buf(),
                target: Arc::clone(&source_grid),
                output: staging.target(&tile),
                tile,
                mode: TileMode::Shift(shift),
            })
            .collect();
        let total = jobs.len();

        let results = TileScheduler::new(self.options.workers).run(
            jobs,
            |_| Ok(TileResampler::with_defaults(CreateOptions::default())),
            |resampler, job| resampler.run(job),
        );
        let failures = collect_failures(&results);
        let failed = failures.len();

        let output_grid = info.grid.clone().with_scale_offset(
            self.options.scale.or(info.grid.scale),
            self.options.offset.or(info.grid.offset),
        );
        let mut metadata = info.metadata.clone();
        metadata.extend(self.options.metadata.clone());

        let assembler = MosaicAssembler::new(registry, self.options.output).keep_tiles(self.options.keep_tiles);
        let mosaic = assembler
            .assemble(&output_grid, results)
            .map_err(|e| e.in_stage(Stage::Assemble))?;
        assembler
            .materialize(mosaic, output, &metadata)
            .map_err(|e| e.in_stage(Stage::Materialize))?;

        tracing::info!(output = %output.display(), tiles = total, failed, "Shift complete");
        Ok(ShiftReport { shift, tiles: total, failed, failures })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use crate::error::Error;
    use crate::grid::Projection;
    use crate::raster::{MemoryDriver, RasterBuffer, RasterDriver};
    use crate::types::DataType;

    fn insert_ramp(path: &str, width: u64, height: u64, nodata: Option<f64>) -> GeoGrid {
        let grid = GeoGrid::new(width, height, GeoTransform::new(0.0, 1.0, height as f64, -1.0), Projection::new("EPSG:4326"))
            .unwrap()
            .with_nodata(nodata);
        let values: Vec<f64> = (0..width * height).map(|v| v as f64).collect();
        let buffer = RasterBuffer::from_bands(grid.clone(), DataType::I32, vec![values]).unwrap();
        let mut metadata = BTreeMap::new();
        metadata.insert("SOURCE".to_string(), "ramp".to_string());
        MemoryDriver::new().insert(Path::new(path), &buffer, metadata);
        grid
    }

    #[test]
    fn test_half_width_shift_in_memory() {
        let grid = insert_ramp("mem://shift-test/in", 10, 3, None);
        let options = ShiftOptions { tile_size: 4, workers: 2, ..ShiftOptions::default() };
        let output = PathBuf::from("mem://shift-test/out");

        let report = ShiftPipeline::new(options).run(Path::new("mem://shift-test/in"), &output).unwrap();
        assert_eq!(report, ShiftReport { shift: 5, tiles: 3, failed: 0, failures: Vec::new() });

        let shifted = MemoryDriver::new().get(&output).unwrap();
        assert_eq!(shifted.grid().transform, grid.transform);
        for row in 0..3u64 {
            for col in 0..10u64 {
                assert_eq!(shifted.get(0, col, row), (row * 10 + (col + 5) % 10) as f64);
            }
        }

        let source = MemoryDriver::new().open(&output).unwrap();
        let metadata = &source.info().metadata;
        assert_eq!(metadata.get("SOURCE").map(String::as_str), Some("ramp"));
        assert_eq!(metadata.get("MaximumLongitude").map(String::as_str), Some("360"));
    }

    #[test]
    fn test_scale_offset_override_and_nodata() {
        insert_ramp("mem://shift-test/nodata-in", 6, 2, Some(0.0));
        let options = ShiftOptions {
            shift: Some(-1),
            tile_size: 3,
            scale: Some(0.5),
            offset: Some(1_737_400.0),
            ..ShiftOptions::default()
        };
        let output = PathBuf::from("mem://shift-test/nodata-out");
        ShiftPipeline::new(options).run(Path::new("mem://shift-test/nodata-in"), &output).unwrap();

        let shifted = MemoryDriver::new().get(&output).unwrap();
        assert_eq!(shifted.grid().scale, Some(0.5));
        assert_eq!(shifted.grid().offset, Some(1_737_400.0));
        assert_eq!(shifted.grid().nodata, Some(0.0));
        // Column 1 reads source column 0, which holds the nodata value
        assert_eq!(shifted.get(0, 1, 0), 0.0);
        assert_eq!(shifted.get(0, 0, 0), 5.0);
        assert_eq!(shifted.get(0, 2, 1), 7.0);
    }

    #[test]
    fn test_missing_input_fails_in_open_stage() {
        let err = ShiftPipeline::new(ShiftOptions::default())
            .run(Path::new("mem://shift-test/absent"), Path::new("mem://shift-test/absent-out"))
            .unwrap_err();
        assert!(matches!(err, Error::Stage { stage: Stage::Open, .. }));
    }

    #[test]
    fn test_degenerate_transform_is_carried_through() {
        let grid = GeoGrid {
            width: 4,
            height: 2,
            transform: GeoTransform::new(0.0, 0.0, 0.0, 0.0),
            projection: Projection::default(),
            nodata: None,
            scale: None,
            offset: None,
        };
        let values: Vec<f64> = (0..8).map(|v| v as f64).collect();
        let buffer = RasterBuffer::from_bands(grid.clone(), DataType::U8, vec![values]).unwrap();
        MemoryDriver::new().insert(Path::new("mem://shift-test/degenerate-in"), &buffer, BTreeMap::new());

        let output = PathBuf::from("mem://shift-test/degenerate-out");
        let report = ShiftPipeline::new(ShiftOptions { tile_size: 3, ..ShiftOptions::default() })
            .run(Path::new("mem://shift-test/degenerate-in"), &output)
            .unwrap();
        assert_eq!(report.failed, 0);

        let shifted = MemoryDriver::new().get(&output).unwrap();
        assert_eq!(shifted.grid().transform, grid.transform);
        assert_eq!(shifted.band(0), &[2.0, 3.0, 0.0, 1.0, 6.0, 7.0, 4.0, 5.0][..]);
    }
}
