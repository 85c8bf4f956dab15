//! Partitioning of a target grid into tiles

use crate::error::{Error, Result};
use crate::grid::{Bounds, GeoGrid, GeoTransform};

/// Tile edge used when shifting
pub const DEFAULT_SHIFT_TILE_SIZE: u64 = 1024;

/// Tile edge used when aligning
pub const DEFAULT_ALIGN_TILE_SIZE: u64 = 4096;

/// One rectangular piece of a target grid
#[derive(Debug, Clone, PartialEq)]
pub struct TileDescriptor {
    pub tile_x: usize,
    pub tile_y: usize,
    pub pixel_offset_x: u64,
    pub pixel_offset_y: u64,
    /// Width in pixels, clipped at the right edge
    pub pixel_width: u64,
    /// Height in pixels, clipped at the bottom edge
    pub pixel_height: u64,
    pub world_bounds: Bounds,
    pub local_transform: GeoTransform,
}

impl TileDescriptor {
    /// The tile as a standalone grid inheriting the parent's projection and value metadata
    pub fn grid(&self, parent: &GeoGrid) -> GeoGrid {
        GeoGrid {
            width: self.pixel_width,
            height: self.pixel_height,
            transform: self.local_transform,
            projection: parent.projection.clone(),
            nodata: parent.nodata,
            scale: parent.scale,
            offset: parent.offset,
        }
    }

    pub fn pixel_count(&self) -> u64 {
        self.pixel_width * self.pixel_height
    }
}

/// Splits a grid into non-overlapping tiles of at most `tile_size` pixels per edge
#[derive(Debug, Clone, Copy)]
pub struct TilePlanner {
    tile_size: u64,
}

impl TilePlanner {
    pub fn new(tile_size: u64) -> Result<Self> {
        if tile_size == 0 {
            return Err(Error::InvalidConfiguration(
                "Tile size must be positive".to_string(),
            ));
        }
        Ok(Self { tile_size })
    }

    pub fn tile_size(&self) -> u64 {
        self.tile_size
    }

    /// Number of tile columns and rows covering `grid`
    pub fn tile_count(&self, grid: &GeoGrid) -> (usize, usize) {
        (
            grid.width.div_ceil(self.tile_size) as usize,
            grid.height.div_ceil(self.tile_size) as usize,
        )
    }

    /// Produces tiles in row-major order (`tile_y` outer, `tile_x` inner)
    pub fn plan(&self, grid: &GeoGrid) -> Result<Vec<TileDescriptor>> {
        grid.validate()?;

        let (tiles_x, tiles_y) = self.tile_count(grid);
        let mut tiles = Vec::with_capacity(tiles_x * tiles_y);

        for tile_y in 0..tiles_y {
            let pixel_offset_y = tile_y as u64 * self.tile_size;
            let pixel_height = self.tile_size.min(grid.height - pixel_offset_y);

            for tile_x in 0..tiles_x {
                let pixel_offset_x = tile_x as u64 * self.tile_size;
                let pixel_width = self.tile_size.min(grid.width - pixel_offset_x);

                tiles.push(TileDescriptor {
                    tile_x,
                    tile_y,
                    pixel_offset_x,
                    pixel_offset_y,
                    pixel_width,
                    pixel_height,
                    world_bounds: grid.window_bounds(
                        pixel_offset_x,
                        pixel_offset_y,
                        pixel_width,
                        pixel_height,
                    ),
                    local_transform: grid.transform.offset_to(pixel_offset_x, pixel_offset_y),
                });
            }
        }

        tracing::debug!(
            width = grid.width,
            height = grid.height,
            tile_size = self.tile_size,
            tiles = tiles.len(),
            "Planned tiles"
        );

        Ok(tiles)
    }
}
