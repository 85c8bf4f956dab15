//! Reassembly of tiles into one raster

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{Error, Result};
use crate::grid::GeoGrid;
use crate::raster::{
    apply_grid, CreateOptions, DriverRegistry, PixelWindow, RasterBuffer, RasterSink, RasterSpec,
};
use crate::tiling::TileDescriptor;
use crate::types::DataType;
use super::job::{TileOutput, TileResult};

/// A successful tile and where its pixels live
#[derive(Debug)]
pub struct PlacedTile {
    pub tile: TileDescriptor,
    pub data: TileOutput,
}

/// Successful tiles laid out over the target grid
///
/// Nothing is copied until the mosaic is materialized. Pixels no tile
/// covers come out as nodata.
#[derive(Debug)]
pub struct VirtualMosaic {
    grid: GeoGrid,
    band_count: usize,
    data_type: DataType,
    tiles: Vec<PlacedTile>,
}

impl VirtualMosaic {
    pub fn grid(&self) -> &GeoGrid {
        &self.grid
    }

    pub fn band_count(&self) -> usize {
        self.band_count
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn tiles(&self) -> &[PlacedTile] {
        &self.tiles
    }
}

/// Builds virtual mosaics from tile results and writes them out
pub struct MosaicAssembler {
    registry: DriverRegistry,
    options: CreateOptions,
    keep_tiles: bool,
}

impl MosaicAssembler {
    pub fn new(registry: DriverRegistry, options: CreateOptions) -> Self {
        Self {
            registry,
            options,
            keep_tiles: false,
        }
    }

    /// Keeps tile files on disk after materialization
    pub fn keep_tiles(mut self, keep: bool) -> Self {
        self.keep_tiles = keep;
        self
    }

    /// Places every successful tile; fails with `NoValidTiles` when there are none
    pub fn assemble(&self, target: &GeoGrid, results: Vec<TileResult>) -> Result<VirtualMosaic> {
        let total = results.len();
        let mut first_failure = None;
        let mut tiles = Vec::new();

        for result in results {
            match result.outcome {
                Ok(data) => tiles.push(PlacedTile { tile: result.tile, data }),
                Err(e) => {
                    if first_failure.is_none() {
                        first_failure = Some(format!(
                            "tile ({}, {}): {}",
                            result.tile.tile_x, result.tile.tile_y, e
                        ));
                    }
                }
            }
        }

        let Some(first) = tiles.first() else {
            return Err(Error::NoValidTiles { total, first_failure });
        };

        let (tile_grid, band_count, data_type) = self.describe(&first.data)?;
        let grid = GeoGrid {
            nodata: target.nodata.or(tile_grid.nodata),
            scale: target.scale.or(tile_grid.scale),
            offset: target.offset.or(tile_grid.offset),
            ..target.clone()
        };

        tracing::info!(
            placed = tiles.len(),
            failed = total - tiles.len(),
            width = grid.width,
            height = grid.height,
            "Assembled virtual mosaic"
        );

        Ok(VirtualMosaic { grid, band_count, data_type, tiles })
    }

    fn describe(&self, data: &TileOutput) -> Result<(GeoGrid, usize, DataType)> {
        match data {
            TileOutput::Memory(buffer) => {
                Ok((buffer.grid().clone(), buffer.band_count(), buffer.data_type()))
            }
            TileOutput::File(path) => {
                let source = self.registry.open(path)?;
                let info = source.info();
                Ok((info.grid.clone(), info.band_count, info.data_type))
            }
        }
    }

    fn load(&self, placed: &PlacedTile) -> Result<RasterBuffer> {
        match &placed.data {
            TileOutput::Memory(buffer) => Ok(buffer.clone()),
            TileOutput::File(path) => {
                let mut source = self.registry.open(path)?;
                let grid = source.info().grid.clone();
                let window = PixelWindow::full(grid.width, grid.height);
                RasterBuffer::read_from(source.as_mut(), window, grid)
            }
        }
    }

    fn copy_tiles(&self, mosaic: &VirtualMosaic, sink: &mut dyn RasterSink) -> Result<()> {
        for placed in &mosaic.tiles {
            let buffer = self.load(placed)?;
            let tile = &placed.tile;
            if buffer.width() != tile.pixel_width
                || buffer.height() != tile.pixel_height
                || buffer.band_count() != mosaic.band_count
            {
                return Err(Error::InvalidTileGeometry(format!(
                    "Tile ({}, {}) holds {}x{}x{}, expected {}x{}x{}",
                    tile.tile_x,
                    tile.tile_y,
                    buffer.width(),
                    buffer.height(),
                    buffer.band_count(),
                    tile.pixel_width,
                    tile.pixel_height,
                    mosaic.band_count
                )));
            }
            buffer.write_to(sink, tile.pixel_offset_x, tile.pixel_offset_y)?;
        }
        Ok(())
    }

    fn fill(
        &self,
        mosaic: &VirtualMosaic,
        sink: &mut dyn RasterSink,
        metadata: &BTreeMap<String, String>,
    ) -> Result<()> {
        apply_grid(sink, &mosaic.grid)?;
        for (key, value) in metadata {
            sink.set_metadata(key, value)?;
        }
        self.copy_tiles(mosaic, sink)
    }

    /// Writes the mosaic to `output` with the target grid's exact geometry
    ///
    /// A partially written output is removed on failure. Tile files are
    /// removed after success unless tiles are kept.
    pub fn materialize(
        &self,
        mosaic: VirtualMosaic,
        output: &Path,
        metadata: &BTreeMap<String, String>,
    ) -> Result<()> {
        let spec = RasterSpec {
            width: mosaic.grid.width,
            height: mosaic.grid.height,
            band_count: mosaic.band_count,
            data_type: mosaic.data_type,
            options: self.options,
        };

        let mut sink = self.registry.create(output, &spec)?;
        let result = self
            .fill(&mosaic, sink.as_mut(), metadata)
            .and_then(|_| sink.close());
        if let Err(e) = result {
            let _ = self.registry.remove(output);
            return Err(e);
        }

        tracing::info!(output = %output.display(), tiles = mosaic.tiles.len(), "Materialized mosaic");

        if !self.keep_tiles {
            for placed in &mosaic.tiles {
                if let TileOutput::File(path) = &placed.data {
                    if let Err(e) = self.registry.remove(path) {
                        tracing::warn!(path = %path.display(), error = %e, "Could not remove tile file");
                    }
                }
            }
        }

        Ok(())
    }
}
