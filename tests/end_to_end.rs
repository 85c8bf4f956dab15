use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use gridalign::config::{AlignConfig, DatasetSpec, TargetGrid};
use gridalign::pipeline::{tile_dir, AlignmentPipeline, ShiftOptions, ShiftPipeline};
use gridalign::raster::{apply_grid, CreateOptions, RasterSpec};
use gridalign::{
    AlignmentVerifier, DataType, DriverRegistry, Error, GeoGrid, GeoTransform, MemoryDriver, MismatchAttribute,
    Projection, RasterBuffer, ResamplingPolicy, Stage,
};
use tempfile::TempDir;

/// 8 x 4 raster holding 0..31 in row-major order
fn ramp(origin_x: f64) -> RasterBuffer {
    let grid = GeoGrid::new(8, 4, GeoTransform::new(origin_x, 45.0, 90.0, -45.0), Projection::new("EPSG:4326")).unwrap();
    let values: Vec<f64> = (0..32).map(|v| v as f64).collect();
    RasterBuffer::from_bands(grid, DataType::I16, vec![values]).unwrap()
}

fn write_geotiff(path: &Path, buffer: &RasterBuffer) {
    let registry = DriverRegistry::with_defaults();
    let spec = RasterSpec {
        width: buffer.width(),
        height: buffer.height(),
        band_count: buffer.band_count(),
        data_type: buffer.data_type(),
        options: CreateOptions::default(),
    };
    let mut sink = registry.create(path, &spec).unwrap();
    apply_grid(sink.as_mut(), buffer.grid()).unwrap();
    buffer.write_to(sink.as_mut(), 0, 0).unwrap();
    sink.close().unwrap();
}

fn read_back(path: &Path) -> RasterBuffer {
    let mut source = DriverRegistry::with_defaults().open(path).unwrap();
    let grid = source.info().grid.clone();
    let window = gridalign::raster::PixelWindow::full(grid.width, grid.height);
    RasterBuffer::read_from(source.as_mut(), window, grid).unwrap()
}

fn assert_shifted_by_four(shifted: &RasterBuffer) {
    assert_eq!(
        (0..8).map(|col| shifted.get(0, col, 0)).collect::<Vec<_>>(),
        vec![4.0, 5.0, 6.0, 7.0, 0.0, 1.0, 2.0, 3.0]
    );
    for row in 1..4u64 {
        for col in 0..8u64 {
            assert_eq!(shifted.get(0, col, row), (row * 8 + (col + 4) % 8) as f64);
        }
    }
}

#[test]
fn test_shift_in_memory() {
    let input = PathBuf::from("mem://end-to-end/ramp");
    let output = PathBuf::from("mem://end-to-end/ramp-shifted");
    MemoryDriver::new().insert(&input, &ramp(0.0), BTreeMap::new());

    let options = ShiftOptions { tile_size: 3, workers: 2, ..ShiftOptions::default() };
    let report = ShiftPipeline::new(options).run(&input, &output).unwrap();
    assert_eq!(report.shift, 4);
    assert_eq!(report.failed, 0);

    let shifted = MemoryDriver::new().get(&output).unwrap();
    assert_shifted_by_four(&shifted);
}

#[test]
fn test_shift_geotiff() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("ramp.tif");
    let output = dir.path().join("out").join("ramp_360.tif");
    std::fs::create_dir_all(output.parent().unwrap()).unwrap();
    write_geotiff(&input, &ramp(-180.0));

    let options = ShiftOptions { shift: Some(4), tile_size: 2, workers: 3, ..ShiftOptions::default() };
    let report = ShiftPipeline::new(options).run(&input, &output).unwrap();
    assert_eq!(report.tiles, 8);

    let shifted = read_back(&output);
    assert_shifted_by_four(&shifted);
    assert_eq!(shifted.grid().transform, GeoTransform::new(-180.0, 45.0, 90.0, -45.0));
    assert_eq!(shifted.grid().projection, Projection::new("EPSG:4326"));

    let source = DriverRegistry::with_defaults().open(&output).unwrap();
    assert_eq!(source.info().metadata.get("MinimumLongitude").map(String::as_str), Some("0"));
    assert!(!output.parent().unwrap().join("tiles").exists());
}

#[test]
fn test_verify_tolerates_tiny_origin_drift() {
    let dir = TempDir::new().unwrap();
    let reference = dir.path().join("a.tif");
    let close = dir.path().join("b.tif");
    let far = dir.path().join("c.tif");
    write_geotiff(&reference, &ramp(0.0));
    write_geotiff(&close, &ramp(1e-7));
    write_geotiff(&far, &ramp(0.01));

    let registry = DriverRegistry::with_defaults();
    let verifier = AlignmentVerifier::new();
    verifier.verify_paths(&registry, &[&reference, &close]).unwrap();

    let err = verifier.verify_paths(&registry, &[&reference, &far]).unwrap_err();
    assert!(matches!(err, Error::GridMismatch { attribute: MismatchAttribute::Transform, .. }));
}

#[test]
fn test_align_geotiff_datasets() {
    let dir = TempDir::new().unwrap();
    let fine = dir.path().join("fine.tif");
    let coarse = dir.path().join("coarse.tif");

    let fine_grid =
        GeoGrid::new(16, 8, GeoTransform::new(0.0, 22.5, 90.0, -22.5), Projection::new("EPSG:4326")).unwrap();
    let values: Vec<f64> = (0..128).map(|v| (v % 5) as f64).collect();
    write_geotiff(&fine, &RasterBuffer::from_bands(fine_grid, DataType::F32, vec![values]).unwrap());
    write_geotiff(&coarse, &ramp(0.0));

    let datasets = vec![
        DatasetSpec {
            name: "fine".to_string(),
            input: fine,
            output: dir.path().join("fine_aligned.tif"),
            resampling: ResamplingPolicy::Bilinear,
        },
        DatasetSpec {
            name: "coarse".to_string(),
            input: coarse,
            output: dir.path().join("coarse_aligned.tif"),
            resampling: ResamplingPolicy::Nearest,
        },
    ];
    let config = AlignConfig {
        target: TargetGrid::Explicit {
            width: 8,
            height: 4,
            transform: [0.0, 45.0, 0.0, 90.0, 0.0, -45.0],
            projection: "EPSG:4326".to_string(),
        },
        tile_size: 3,
        workers: 2,
        datasets,
        output: CreateOptions::default(),
        keep_tiles: false,
        verify: true,
    };

    let report = AlignmentPipeline::new(config).unwrap().run().unwrap();
    assert!(report.verified);
    assert_eq!(report.datasets.len(), 2);
    assert!(report.datasets.iter().all(|d| d.failed == 0 && d.tiles == 6));

    let coarse_aligned = read_back(&dir.path().join("coarse_aligned.tif"));
    assert_eq!(coarse_aligned.band(0), ramp(0.0).band(0));

    let fine_aligned = read_back(&dir.path().join("fine_aligned.tif"));
    assert_eq!(fine_aligned.grid().transform, coarse_aligned.grid().transform);
    assert!(fine_aligned.band(0).iter().all(|v| (0.0..=4.0).contains(v)));
    assert!(!dir.path().join("tiles").exists());
}

#[test]
fn test_no_valid_tiles_leaves_no_output_file() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("far_away.tif");
    let output = dir.path().join("aligned.tif");
    write_geotiff(&input, &ramp(10_000.0));

    let config = AlignConfig {
        target: TargetGrid::Explicit {
            width: 8,
            height: 4,
            transform: [0.0, 45.0, 0.0, 90.0, 0.0, -45.0],
            projection: "EPSG:4326".to_string(),
        },
        tile_size: 4,
        workers: 2,
        datasets: vec![DatasetSpec {
            name: "far".to_string(),
            input,
            output: output.clone(),
            resampling: ResamplingPolicy::Nearest,
        }],
        output: CreateOptions::default(),
        keep_tiles: false,
        verify: true,
    };

    let err = AlignmentPipeline::new(config).unwrap().run().unwrap_err();
    assert!(matches!(err, Error::Stage { stage: Stage::Assemble, .. }));
    assert!(matches!(err.root(), Error::NoValidTiles { total: 2, .. }));
    assert!(!output.exists());
    assert!(!tile_dir(&output).exists());
}
