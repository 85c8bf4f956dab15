//! Co-registration of several rasters onto one target grid

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{AlignConfig, DatasetSpec};
use crate::engine::{
    AlignmentVerifier, MosaicAssembler, TileJob, TileMode, TileResampler, TileScheduler,
};
use crate::error::{Result, Stage};
use crate::grid::GeoGrid;
use crate::raster::{CreateOptions, DriverRegistry};
use crate::tiling::TilePlanner;
use super::{collect_failures, TileFailure, TileStaging};

/// Outcome for one dataset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetReport {
    pub name: String,
    pub output: PathBuf,
    pub tiles: usize,
    pub failed: usize,
    /// Which tiles failed and why
    pub failures: Vec<TileFailure>,
}

/// Outcome of an alignment run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignReport {
    pub datasets: Vec<DatasetReport>,
    pub verified: bool,
}

/// Reprojects every configured dataset onto the target grid, then checks
/// that the outputs line up
pub struct AlignmentPipeline {
    config: AlignConfig,
}

impl AlignmentPipeline {
    pub fn new(config: AlignConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &AlignConfig {
        &self.config
    }

    pub fn run(&self) -> Result<AlignReport> {
        let target = Arc::new(self.config.target.grid().map_err(|e| e.in_stage(Stage::Plan))?);
        tracing::info!(
            width = target.width,
            height = target.height,
            datasets = self.config.datasets.len(),
            tile_size = self.config.tile_size,
            "Aligning datasets"
        );

        let mut reports = Vec::with_capacity(self.config.datasets.len());
        for dataset in &self.config.datasets {
            reports.push(self.process_dataset(&target, dataset)?);
        }

        let verified = self.config.verify && reports.len() >= 2;
        if verified {
            let outputs: Vec<&PathBuf> = reports.iter().map(|r| &r.output).collect();
            AlignmentVerifier::new()
                .verify_paths(&DriverRegistry::with_defaults(), &outputs)
                .map_err(|e| e.in_stage(Stage::Verify))?;
        } else if self.config.verify {
            tracing::info!("Fewer than two outputs, skipping alignment check");
        }

        Ok(AlignReport { datasets: reports, verified })
    }

    /// Runs the tile pipeline for one dataset
    pub fn process_dataset(&self, target: &Arc<GeoGrid>, dataset: &DatasetSpec) -> Result<DatasetReport> {
        tracing::info!(
            name = %dataset.name,
            input = %dataset.input.display(),
            resampling = dataset.resampling.name(),
            "Processing dataset"
        );

        let registry = DriverRegistry::with_defaults();
        registry.open(&dataset.input).map_err(|e| e.in_stage(Stage::Open))?;

        let tiles = TilePlanner::new(self.config.tile_size)
            .and_then(|planner| planner.plan(target))
            .map_err(|e| e.in_stage(Stage::Plan))?;
        let staging = TileStaging::prepare(&dataset.output, self.config.keep_tiles).map_err(|e| e.in_stage(Stage::Plan))?;

        let jobs: Vec<TileJob> = tiles
            .into_iter()
            .map(|tile| TileJob {
                input: dataset.input.clone(),
                target: Arc::clone(target),
                output: staging.target(&tile),
                tile,
                mode: TileMode::Reproject(dataset.resampling),
            })
            .collect();
        let total = jobs.len();

        let results = TileScheduler::new(self.config.workers).run(
            jobs,
            |_| Ok(TileResampler::with_defaults(CreateOptions::default())),
            |resampler, job| resampler.run(job),
        );
        let failures = collect_failures(&results);
        let failed = failures.len();

        let assembler = MosaicAssembler::new(registry, self.config.output).keep_tiles(self.config.keep_tiles);
        let mosaic = assembler
            .assemble(target, results)
            .map_err(|e| e.in_stage(Stage::Assemble))?;
        assembler
            .materialize(mosaic, &dataset.output, &BTreeMap::new())
            .map_err(|e| e.in_stage(Stage::Materialize))?;

        tracing::info!(name = %dataset.name, output = %dataset.output.display(), tiles = total, failed, "Dataset aligned");
        Ok(DatasetReport {
            name: dataset.name.clone(),
            output: dataset.output.clone(),
            tiles: total,
            failed,
            failures,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use crate::config::TargetGrid;
    use crate::error::Error;
    use crate::grid::{GeoTransform, Projection};
    use crate::raster::{MemoryDriver, RasterBuffer};
    use crate::types::DataType;
    use crate::warp::ResamplingPolicy;

    fn insert(path: &str, width: u64, height: u64, pixel: f64, data_type: DataType) {
        let grid = GeoGrid::new(
            width,
            height,
            GeoTransform::new(0.0, pixel, height as f64 * pixel, -pixel),
            Projection::new("EPSG:4326"),
        )
        .unwrap();
        let values: Vec<f64> = (0..width * height).map(|v| (v % 7) as f64).collect();
        let buffer = RasterBuffer::from_bands(grid, data_type, vec![values]).unwrap();
        MemoryDriver::new().insert(Path::new(path), &buffer, BTreeMap::new());
    }

    fn config(datasets: Vec<DatasetSpec>) -> AlignConfig {
        AlignConfig {
            target: TargetGrid::Explicit {
                width: 12,
                height: 6,
                transform: [0.0, 1.0, 0.0, 6.0, 0.0, -1.0],
                projection: "EPSG:4326".to_string(),
            },
            tile_size: 5,
            workers: 3,
            datasets,
            output: CreateOptions::default(),
            keep_tiles: false,
            verify: true,
        }
    }

    fn dataset(name: &str, input: &str, output: &str, resampling: ResamplingPolicy) -> DatasetSpec {
        DatasetSpec {
            name: name.to_string(),
            input: PathBuf::from(input),
            output: PathBuf::from(output),
            resampling,
        }
    }

    #[test]
    fn test_outputs_share_target_grid() {
        insert("mem://align-test/fine", 24, 12, 0.5, DataType::F32);
        insert("mem://align-test/coarse", 6, 3, 2.0, DataType::U8);

        let pipeline = AlignmentPipeline::new(config(vec![
            dataset("fine", "mem://align-test/fine", "mem://align-test/fine-out", ResamplingPolicy::Bilinear),
            dataset("coarse", "mem://align-test/coarse", "mem://align-test/coarse-out", ResamplingPolicy::Nearest),
        ]))
        .unwrap();

        let report = pipeline.run().unwrap();
        assert!(report.verified);
        assert_eq!(report.datasets.len(), 2);
        assert!(report.datasets.iter().all(|d| d.tiles == 6 && d.failed == 0));

        let coarse = MemoryDriver::new().get(Path::new("mem://align-test/coarse-out")).unwrap();
        assert_eq!((coarse.width(), coarse.height()), (12, 6));
        assert_eq!(coarse.data_type(), DataType::U8);
        // Target pixel (3, 1) lies in coarse pixel (1, 0)
        assert_eq!(coarse.get(0, 3, 1), 1.0);
    }

    #[test]
    fn test_partial_coverage_keeps_going() {
        // Covers only the left half of the target
        insert("mem://align-test/half", 6, 6, 1.0, DataType::I16);

        let report = AlignmentPipeline::new(config(vec![dataset(
            "half",
            "mem://align-test/half",
            "mem://align-test/half-out",
            ResamplingPolicy::Nearest,
        )]))
        .unwrap()
        .run()
        .unwrap();

        assert!(!report.verified);
        assert_eq!(report.datasets[0].tiles, 6);
        assert_eq!(report.datasets[0].failed, 2);
        let failed_tiles: Vec<(usize, usize)> =
            report.datasets[0].failures.iter().map(|f| (f.tile_x, f.tile_y)).collect();
        assert_eq!(failed_tiles, vec![(2, 0), (2, 1)]);
        assert!(report.datasets[0].failures[0].to_string().starts_with("tile (2, 0): "));
    }

    #[test]
    fn test_no_overlap_is_no_valid_tiles() {
        let grid = GeoGrid::new(4, 4, GeoTransform::new(1000.0, 1.0, 1004.0, -1.0), Projection::new("EPSG:4326")).unwrap();
        let buffer = RasterBuffer::new(grid, 1, DataType::F32);
        MemoryDriver::new().insert(Path::new("mem://align-test/far"), &buffer, BTreeMap::new());

        let err = AlignmentPipeline::new(config(vec![dataset(
            "far",
            "mem://align-test/far",
            "mem://align-test/far-out",
            ResamplingPolicy::Nearest,
        )]))
        .unwrap()
        .run()
        .unwrap_err();

        assert!(matches!(err, Error::Stage { stage: Stage::Assemble, .. }));
        assert!(matches!(err.root(), Error::NoValidTiles { total: 6, .. }));
        assert!(!MemoryDriver::new().contains(Path::new("mem://align-test/far-out")));
    }
}
