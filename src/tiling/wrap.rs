//! Circular horizontal shift addressing
//!
//! A destination column `x` reads source column `(x + shift) mod W`. A tile
//! whose source range runs past the right edge wraps to column 0 and is
//! read as two spans.

use crate::error::{Error, Result};
use super::planner::TileDescriptor;

/// A contiguous range of source columns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpan {
    pub offset_x: u64,
    pub width: u64,
}

/// Source pixels that map onto one destination tile
///
/// When `second` is present the first span ends exactly at the raster's
/// right edge and the two widths sum to the tile width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceWindow {
    pub first: ColumnSpan,
    pub second: Option<ColumnSpan>,
    pub offset_y: u64,
    pub height: u64,
}

impl SourceWindow {
    /// Total width across both spans
    pub fn width(&self) -> u64 {
        self.first.width + self.second.map_or(0, |span| span.width)
    }

    pub fn is_split(&self) -> bool {
        self.second.is_some()
    }

    /// Spans in read order
    pub fn spans(&self) -> impl Iterator<Item = ColumnSpan> {
        std::iter::once(self.first).chain(self.second)
    }
}

/// Computes wraparound source windows for a raster of fixed width
#[derive(Debug, Clone, Copy)]
pub struct WraparoundShifter {
    width: u64,
}

impl WraparoundShifter {
    pub fn new(width: u64) -> Result<Self> {
        if width == 0 {
            return Err(Error::InvalidConfiguration(
                "Raster width must be positive".to_string(),
            ));
        }
        Ok(Self { width })
    }

    pub fn width(&self) -> u64 {
        self.width
    }

    /// Shift that re-centres a 0..360 degree raster on -180..180
    pub fn half_width_shift(&self) -> i64 {
        (self.width / 2) as i64
    }

    /// Source column for destination column `x`
    pub fn source_column(&self, x: u64, shift: i64) -> u64 {
        (x as i128 + shift as i128).rem_euclid(self.width as i128) as u64
    }

    /// Source window for a destination window of `tile_width` x `tile_height` at (`x`, `y`)
    pub fn source_window(
        &self,
        x: u64,
        tile_width: u64,
        y: u64,
        tile_height: u64,
        shift: i64,
    ) -> Result<SourceWindow> {
        if tile_width == 0 || tile_width > self.width {
            return Err(Error::InvalidTileGeometry(format!(
                "Tile width {} outside 1..={}",
                tile_width, self.width
            )));
        }
        if x >= self.width {
            return Err(Error::InvalidTileGeometry(format!(
                "Tile offset {} outside raster width {}",
                x, self.width
            )));
        }

        let src_x = self.source_column(x, shift);

        let window = if src_x + tile_width <= self.width {
            SourceWindow {
                first: ColumnSpan { offset_x: src_x, width: tile_width },
                second: None,
                offset_y: y,
                height: tile_height,
            }
        } else {
            let first_width = self.width - src_x;
            SourceWindow {
                first: ColumnSpan { offset_x: src_x, width: first_width },
                second: Some(ColumnSpan { offset_x: 0, width: tile_width - first_width }),
                offset_y: y,
                height: tile_height,
            }
        };

        Ok(window)
    }

    /// Source window for a planned tile
    pub fn window_for_tile(&self, tile: &TileDescriptor, shift: i64) -> Result<SourceWindow> {
        self.source_window(
            tile.pixel_offset_x,
            tile.pixel_width,
            tile.pixel_offset_y,
            tile.pixel_height,
            shift,
        )
    }

    /// Reads a window through `read_span` and joins the spans row by row
    ///
    /// `read_span` returns `span.width * window.height` values in row-major
    /// order. The result holds, for each row, the first span's columns
    /// followed by the second span's.
    pub fn read<F>(&self, window: &SourceWindow, mut read_span: F) -> Result<Vec<f64>>
    where
        F: FnMut(ColumnSpan, u64, u64) -> Result<Vec<f64>>,
    {
        let first = read_span(window.first, window.offset_y, window.height)?;
        check_span_len(&first, window.first, window.height)?;

        let Some(second_span) = window.second else {
            return Ok(first);
        };

        let second = read_span(second_span, window.offset_y, window.height)?;
        check_span_len(&second, second_span, window.height)?;

        let first_width = window.first.width as usize;
        let second_width = second_span.width as usize;
        let mut joined = Vec::with_capacity(first.len() + second.len());
        for (left, right) in first
            .chunks_exact(first_width)
            .zip(second.chunks_exact(second_width))
        {
            joined.extend_from_slice(left);
            joined.extend_from_slice(right);
        }

        Ok(joined)
    }
}

fn check_span_len(values: &[f64], span: ColumnSpan, height: u64) -> Result<()> {
    let expected = (span.width * height) as usize;
    if values.len() != expected {
        return Err(Error::InvalidTileGeometry(format!(
            "Read returned {} values for a {}x{} span",
            values.len(),
            span.width,
            height
        )));
    }
    Ok(())
}
