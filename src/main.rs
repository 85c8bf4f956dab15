//! gridalign CLI
//!
//! Re-centres global rasters in longitude and aligns datasets onto a shared grid.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use gridalign::compression::Compression;
use gridalign::config::AlignConfig;
use gridalign::engine::{AlignmentVerifier, DEFAULT_TOLERANCE};
use gridalign::logging::init_logging;
use gridalign::pipeline::{AlignmentPipeline, ShiftOptions, ShiftPipeline, TileFailure};
use gridalign::raster::{DriverRegistry, PixelWindow, RasterStats};
use gridalign::tiling::DEFAULT_SHIFT_TILE_SIZE;
use gridalign::Result;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CompressionArg {
    /// Uncompressed blocks
    None,
    /// Deflate (zlib)
    Deflate,
    /// LZW
    Lzw,
    /// PackBits run-length encoding
    Packbits,
}

impl From<CompressionArg> for Compression {
    fn from(arg: CompressionArg) -> Self {
        match arg {
            CompressionArg::None => Compression::None,
            CompressionArg::Deflate => Compression::Deflate,
            CompressionArg::Lzw => Compression::Lzw,
            CompressionArg::Packbits => Compression::PackBits,
        }
    }
}

#[derive(Parser)]
#[command(name = "gridalign")]
#[command(about = "Tiled longitude shifting and grid alignment for planetary rasters", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Circularly shift a global raster in longitude
    Shift {
        /// Input raster
        input: PathBuf,

        /// Output raster
        output: PathBuf,

        /// Columns to shift by (default: half the raster width)
        #[arg(long, allow_hyphen_values = true)]
        shift: Option<i64>,

        /// Edge length of processing tiles in pixels
        #[arg(long, default_value_t = DEFAULT_SHIFT_TILE_SIZE)]
        tile_size: u64,

        /// Worker threads (0: one per core)
        #[arg(long, default_value_t = 0)]
        workers: usize,

        /// Band scale to write on the output
        #[arg(long)]
        scale: Option<f64>,

        /// Band offset to write on the output
        #[arg(long, allow_hyphen_values = true)]
        offset: Option<f64>,

        /// Extra metadata item, repeatable
        #[arg(long = "meta", value_name = "KEY=VALUE", value_parser = parse_key_value)]
        metadata: Vec<(String, String)>,

        /// Do not stamp MinimumLongitude/MaximumLongitude on the output
        #[arg(long)]
        no_longitude_metadata: bool,

        /// Output block compression
        #[arg(long, value_enum, default_value = "lzw")]
        compression: CompressionArg,

        /// Keep the intermediate tile files
        #[arg(long)]
        keep_tiles: bool,

        /// Skip the before/after value summary
        #[arg(long)]
        no_stats: bool,

        /// Edge length of the window summarized before and after
        #[arg(long, default_value_t = 1000)]
        stats_window: u64,
    },

    /// Align every dataset of a configuration file onto its target grid
    Align {
        /// JSON configuration file
        config: PathBuf,
    },

    /// Check that rasters share size, geotransform and projection
    Verify {
        /// Rasters to compare against the first
        #[arg(num_args = 2.., required = true)]
        rasters: Vec<PathBuf>,

        /// Maximum geotransform coefficient difference
        #[arg(long, default_value_t = DEFAULT_TOLERANCE)]
        tolerance: f64,
    },
}

fn parse_key_value(s: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", s))?;
    if key.is_empty() {
        return Err(format!("empty key in '{}'", s));
    }
    Ok((key.to_string(), value.to_string()))
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    let outcome = match cli.command {
        Command::Shift {
            input,
            output,
            shift,
            tile_size,
            workers,
            scale,
            offset,
            metadata,
            no_longitude_metadata,
            compression,
            keep_tiles,
            no_stats,
            stats_window,
        } => {
            let mut options = ShiftOptions {
                shift,
                tile_size,
                workers,
                scale,
                offset,
                keep_tiles,
                ..ShiftOptions::default()
            };
            if no_longitude_metadata {
                options.metadata = BTreeMap::new();
            }
            options.metadata.extend(metadata);
            options.output.compression = compression.into();

            run_shift(&input, &output, options, (!no_stats).then_some(stats_window))
        }
        Command::Align { config } => run_align(&config),
        Command::Verify { rasters, tolerance } => run_verify(&rasters, tolerance),
    };

    if let Err(e) = outcome {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run_shift(input: &Path, output: &Path, options: ShiftOptions, stats_window: Option<u64>) -> Result<()> {
    let registry = DriverRegistry::with_defaults();

    if let Some(size) = stats_window {
        print_stats(&registry, input, "Input", size)?;
    }

    let report = ShiftPipeline::new(options).run(input, output)?;
    println!(
        "Shifted {} by {} columns: {} tiles, {} failed",
        input.display(),
        report.shift,
        report.tiles,
        report.failed
    );
    print_failures(&report.failures);

    if let Some(size) = stats_window {
        print_stats(&registry, output, "Output", size)?;
    }
    Ok(())
}

fn print_failures(failures: &[TileFailure]) {
    for failure in failures {
        println!("  Failed {}", failure);
    }
}

fn print_stats(registry: &DriverRegistry, path: &Path, label: &str, size: u64) -> Result<()> {
    let mut source = registry.open(path)?;
    let grid = source.info().grid.clone();
    let window = PixelWindow::new(0, 0, size.min(grid.width), size.min(grid.height));

    println!("{} {} ({} x {}):", label, path.display(), grid.width, grid.height);
    match RasterStats::scan_window(source.as_mut(), 0, window)? {
        Some(stats) => {
            let (min, max) = stats.physical(grid.scale, grid.offset);
            println!("  Raw range:      [{}, {}]", stats.min, stats.max);
            println!("  Physical range: [{}, {}]", min, max);
            println!("  Valid pixels:   {} of {}", stats.valid_count, window.pixel_count());
        }
        None => println!("  No valid pixels in the first {} x {} window", window.width, window.height),
    }
    if let Some(nodata) = grid.nodata {
        println!("  NoData: {}", nodata);
    }
    Ok(())
}

fn run_align(config: &Path) -> Result<()> {
    let config = AlignConfig::load(config)?;
    let report = AlignmentPipeline::new(config)?.run()?;

    for dataset in &report.datasets {
        println!(
            "{}: {} ({} tiles, {} failed)",
            dataset.name,
            dataset.output.display(),
            dataset.tiles,
            dataset.failed
        );
        print_failures(&dataset.failures);
    }
    if report.verified {
        println!("All outputs share the target grid");
    }
    Ok(())
}

fn run_verify(rasters: &[PathBuf], tolerance: f64) -> Result<()> {
    let registry = DriverRegistry::with_defaults();
    AlignmentVerifier::with_tolerance(tolerance).verify_paths(&registry, rasters)?;
    println!("{} rasters are aligned", rasters.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("BODY=Moon").unwrap(),
            ("BODY".to_string(), "Moon".to_string())
        );
        assert_eq!(parse_key_value("A=b=c").unwrap().1, "b=c");
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=x").is_err());
    }

    #[test]
    fn test_cli_parses_shift() {
        let cli = Cli::try_parse_from([
            "gridalign", "shift", "in.tif", "out.tif", "--shift", "-10", "--meta", "K=V", "--compression", "deflate",
        ])
        .unwrap();
        match cli.command {
            Command::Shift { shift, metadata, compression, tile_size, .. } => {
                assert_eq!(shift, Some(-10));
                assert_eq!(metadata, vec![("K".to_string(), "V".to_string())]);
                assert_eq!(Compression::from(compression), Compression::Deflate);
                assert_eq!(tile_size, DEFAULT_SHIFT_TILE_SIZE);
            }
            _ => panic!("expected shift"),
        }
    }

    #[test]
    fn test_cli_verify_needs_two() {
        assert!(Cli::try_parse_from(["gridalign", "verify", "a.tif"]).is_err());
        assert!(Cli::try_parse_from(["gridalign", "verify", "a.tif", "b.tif"]).is_ok());
    }
}
