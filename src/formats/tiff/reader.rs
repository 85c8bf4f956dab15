//! Memory-mapped GeoTIFF reader

use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use memmap2::Mmap;
use rayon::prelude::*;

use crate::cache::BlockCache;
use crate::compression::Compression;
use crate::error::{Error, Result};
use crate::grid::{GeoGrid, GeoTransform};
use crate::io::ByteOrder;
use crate::raster::{PixelWindow, RasterInfo, RasterSource};
use crate::types::DataType;
use super::geotiff::GeoInfo;
use super::ifd::IFD;
use super::{tags, BIGTIFF_MAGIC, TIFF_MAGIC};

/// Parsed file header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub byte_order: ByteOrder,
    pub is_big_tiff: bool,
    pub first_ifd: u64,
}

impl Header {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let byte_order = ByteOrder::detect(data)?;
        let magic = byte_order.read_u16(data, 2)?;

        match magic {
            TIFF_MAGIC => Ok(Self {
                byte_order,
                is_big_tiff: false,
                first_ifd: byte_order.read_u32(data, 4)? as u64,
            }),
            BIGTIFF_MAGIC => {
                let offset_size = byte_order.read_u16(data, 4)?;
                if offset_size != 8 {
                    return Err(Error::InvalidFormat(
                        format!("Invalid BigTIFF offset size: {}", offset_size)
                    ));
                }
                Ok(Self {
                    byte_order,
                    is_big_tiff: true,
                    first_ifd: byte_order.read_u64(data, 8)?,
                })
            }
            _ => Err(Error::InvalidMagic(magic)),
        }
    }
}

/// Block structure of the first image
#[derive(Debug, Clone)]
struct Layout {
    width: u64,
    height: u64,
    samples_per_pixel: usize,
    data_type: DataType,
    planar_separate: bool,
    compression: Compression,
    predictor: u64,
    block_width: u64,
    block_height: u64,
    blocks_across: u64,
    blocks_down: u64,
    offsets: Vec<u64>,
    byte_counts: Vec<u64>,
}

impl Layout {
    fn from_ifd(ifd: &IFD, data: &[u8], order: ByteOrder) -> Result<Self> {
        let width = ifd.require_u64(tags::IMAGE_WIDTH, data, order)?;
        let height = ifd.require_u64(tags::IMAGE_LENGTH, data, order)?;
        let samples_per_pixel = ifd.get_u64(tags::SAMPLES_PER_PIXEL, data, order)?.unwrap_or(1) as usize;
        let bits = ifd.get_u64(tags::BITS_PER_SAMPLE, data, order)?.unwrap_or(1);
        let sample_format = ifd.get_u64(tags::SAMPLE_FORMAT, data, order)?.unwrap_or(1);
        let data_type = DataType::from_tiff(sample_format, bits).ok_or_else(|| {
            Error::Unsupported(format!("Sample format {} with {} bits", sample_format, bits))
        })?;

        let planar_separate = ifd.get_u64(tags::PLANAR_CONFIGURATION, data, order)?.unwrap_or(1) == 2;
        let compression = Compression::from_tag(ifd.get_u64(tags::COMPRESSION, data, order)?.unwrap_or(1))?;
        let predictor = ifd.get_u64(tags::PREDICTOR, data, order)?.unwrap_or(1);
        if predictor > 2 || (predictor == 2 && !data_type.is_integer()) {
            return Err(Error::Unsupported(format!(
                "Predictor {} for {} samples",
                predictor,
                data_type.name()
            )));
        }

        let (block_width, block_height, offsets_tag, counts_tag) = if ifd.is_tiled() {
            (
                ifd.require_u64(tags::TILE_WIDTH, data, order)?,
                ifd.require_u64(tags::TILE_LENGTH, data, order)?,
                tags::TILE_OFFSETS,
                tags::TILE_BYTE_COUNTS,
            )
        } else {
            let rows = ifd.get_u64(tags::ROWS_PER_STRIP, data, order)?.unwrap_or(height);
            (width, rows.min(height), tags::STRIP_OFFSETS, tags::STRIP_BYTE_COUNTS)
        };

        if width == 0 || height == 0 || block_width == 0 || block_height == 0 {
            return Err(Error::InvalidFormat(format!(
                "Degenerate image {}x{} with {}x{} blocks",
                width, height, block_width, block_height
            )));
        }

        let offsets = ifd.get_entry(offsets_tag).ok_or(Error::MissingTag(offsets_tag))?.read_u64s(data, order)?;
        let byte_counts = ifd.get_entry(counts_tag).ok_or(Error::MissingTag(counts_tag))?.read_u64s(data, order)?;

        let layout = Self {
            width,
            height,
            samples_per_pixel,
            data_type,
            planar_separate,
            compression,
            predictor,
            block_width,
            block_height,
            blocks_across: width.div_ceil(block_width),
            blocks_down: height.div_ceil(block_height),
            offsets,
            byte_counts,
        };

        let planes = if planar_separate { samples_per_pixel } else { 1 };
        let expected = layout.blocks_per_plane() * planes;
        if layout.offsets.len() < expected || layout.byte_counts.len() < expected {
            return Err(Error::InvalidFormat(format!(
                "Expected {} blocks, found {} offsets and {} byte counts",
                expected,
                layout.offsets.len(),
                layout.byte_counts.len()
            )));
        }

        Ok(layout)
    }

    fn blocks_per_plane(&self) -> usize {
        (self.blocks_across * self.blocks_down) as usize
    }

    /// Samples interleaved in one block
    fn samples_in_block(&self) -> usize {
        if self.planar_separate { 1 } else { self.samples_per_pixel }
    }

    fn decoded_block_len(&self) -> usize {
        (self.block_width * self.block_height) as usize * self.samples_in_block() * self.data_type.size()
    }

    /// Decodes one block; an empty vector marks a sparse block
    fn decode_block(&self, data: &[u8], index: usize, order: ByteOrder) -> Result<Vec<u8>> {
        let offset = self.offsets[index];
        let count = self.byte_counts[index];
        if offset == 0 || count == 0 {
            return Ok(Vec::new());
        }

        let start = offset as usize;
        let end = start
            .checked_add(count as usize)
            .filter(|&end| end <= data.len())
            .ok_or_else(|| Error::OutOfBounds(format!(
                "Block {} data range {}+{} exceeds file size {}",
                index, offset, count, data.len()
            )))?;

        let mut decoded = self.compression.decompress(&data[start..end])?;
        // Final strips may hold fewer rows than a full block
        decoded.resize(self.decoded_block_len(), 0);

        if self.predictor == 2 {
            undo_horizontal_predictor(
                &mut decoded,
                self.block_width as usize * self.samples_in_block(),
                self.samples_in_block(),
                self.data_type.size(),
                order,
            );
        }

        Ok(decoded)
    }
}

/// Reverses TIFF horizontal differencing in place
///
/// `row_samples` samples of `sample_size` bytes make one row; each sample
/// is stored as the difference to the one `stride` samples earlier.
fn undo_horizontal_predictor(
    data: &mut [u8],
    row_samples: usize,
    stride: usize,
    sample_size: usize,
    order: ByteOrder,
) {
    let row_bytes = row_samples * sample_size;
    for row in data.chunks_exact_mut(row_bytes) {
        for i in stride..row_samples {
            let prev = read_sample(row, (i - stride) * sample_size, sample_size, order);
            let pos = i * sample_size;
            let current = read_sample(row, pos, sample_size, order);
            write_sample(row, pos, sample_size, order, current.wrapping_add(prev));
        }
    }
}

fn read_sample(row: &[u8], pos: usize, size: usize, order: ByteOrder) -> u64 {
    let bytes = &row[pos..pos + size];
    let mut value = 0u64;
    match order {
        ByteOrder::LittleEndian => {
            for &b in bytes.iter().rev() {
                value = (value << 8) | b as u64;
            }
        }
        ByteOrder::BigEndian => {
            for &b in bytes {
                value = (value << 8) | b as u64;
            }
        }
    }
    value
}

fn write_sample(row: &mut [u8], pos: usize, size: usize, order: ByteOrder, value: u64) {
    for i in 0..size {
        let byte = (value >> (8 * i)) as u8;
        match order {
            ByteOrder::LittleEndian => row[pos + i] = byte,
            ByteOrder::BigEndian => row[pos + size - 1 - i] = byte,
        }
    }
}

/// GeoTIFF opened for window reads
pub struct GeoTiffSource {
    data: Arc<Mmap>,
    byte_order: ByteOrder,
    layout: Arc<Layout>,
    info: RasterInfo,
    cache: BlockCache,
}

impl GeoTiffSource {
    /// Opens a GeoTIFF with the default block cache size
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_cache(path, BlockCache::default())
    }

    /// Opens a GeoTIFF sharing `cache` for decoded blocks
    pub fn open_with_cache<P: AsRef<Path>>(path: P, cache: BlockCache) -> Result<Self> {
        let file = File::open(&path)?;
        let mmap = unsafe { Mmap::map(&file)? };

        #[cfg(unix)]
        unsafe {
            libc::madvise(
                mmap.as_ptr() as *mut libc::c_void,
                mmap.len(),
                libc::MADV_WILLNEED,
            );
        }

        let header = Header::parse(&mmap)?;
        if header.first_ifd == 0 {
            return Err(Error::InvalidFormat("File contains no images".to_string()));
        }

        let (ifd, _) = IFD::parse(&mmap, header.first_ifd, header.byte_order, header.is_big_tiff)?;
        let layout = Layout::from_ifd(&ifd, &mmap, header.byte_order)?;
        let geo = GeoInfo::from_ifd(&ifd, &mmap, header.byte_order)?;

        let grid = GeoGrid {
            width: layout.width,
            height: layout.height,
            transform: geo.transform.unwrap_or(GeoTransform::new(0.0, 1.0, 0.0, 1.0)),
            projection: geo.projection,
            nodata: geo.nodata,
            scale: geo.scale,
            offset: geo.offset,
        };

        tracing::debug!(
            path = %path.as_ref().display(),
            width = layout.width,
            height = layout.height,
            bands = layout.samples_per_pixel,
            data_type = layout.data_type.name(),
            compression = layout.compression.name(),
            tiled = ifd.is_tiled(),
            big_tiff = header.is_big_tiff,
            "Opened GeoTIFF"
        );

        let info = RasterInfo {
            grid,
            band_count: layout.samples_per_pixel,
            data_type: layout.data_type,
            metadata: geo.metadata,
        };

        Ok(Self {
            data: Arc::new(mmap),
            byte_order: header.byte_order,
            layout: Arc::new(layout),
            info,
            cache,
        })
    }

    /// Decodes every block in `indices` that is not cached yet, in parallel
    fn load_blocks(&self, plane: usize, indices: &[usize]) -> Result<()> {
        let missing: Vec<usize> = indices
            .iter()
            .copied()
            .filter(|&idx| self.cache.get(plane, idx).is_none())
            .collect();

        if missing.is_empty() {
            return Ok(());
        }

        let data: &[u8] = &self.data;
        let layout = &self.layout;
        let order = self.byte_order;
        let base = plane * layout.blocks_per_plane();

        let decoded: Vec<(usize, Vec<u8>)> = missing
            .par_iter()
            .map(|&idx| Ok((idx, layout.decode_block(data, base + idx, order)?)))
            .collect::<Result<_>>()?;

        for (idx, block) in decoded {
            self.cache.put(plane, idx, Arc::new(block));
        }
        Ok(())
    }
}

impl RasterSource for GeoTiffSource {
    fn info(&self) -> &RasterInfo {
        &self.info
    }

    fn read_window(&mut self, band: usize, window: PixelWindow) -> Result<Vec<f64>> {
        self.info.check_band(band)?;
        window.check_within(self.info.width(), self.info.height())?;

        let layout = Arc::clone(&self.layout);
        let (plane, sample) = if layout.planar_separate { (band, 0) } else { (0, band) };
        let bw = layout.block_width;
        let bh = layout.block_height;

        let bx0 = window.col / bw;
        let bx1 = (window.col + window.width - 1) / bw;
        let by0 = window.row / bh;
        let by1 = (window.row + window.height - 1) / bh;

        let mut block_indices = Vec::with_capacity(((bx1 - bx0 + 1) * (by1 - by0 + 1)) as usize);
        for by in by0..=by1 {
            for bx in bx0..=bx1 {
                block_indices.push((by * layout.blocks_across + bx) as usize);
            }
        }
        self.load_blocks(plane, &block_indices)?;

        let fill = self.info.grid.nodata.unwrap_or(0.0);
        let sample_size = layout.data_type.size();
        let step = layout.samples_in_block();
        let mut values = vec![fill; window.pixel_count()];

        for by in by0..=by1 {
            for bx in bx0..=bx1 {
                let index = (by * layout.blocks_across + bx) as usize;
                let block = match self.cache.get(plane, index) {
                    Some(block) => block,
                    None => Arc::new(layout.decode_block(&self.data, plane * layout.blocks_per_plane() + index, self.byte_order)?),
                };
                if block.is_empty() {
                    continue;
                }

                let col_start = window.col.max(bx * bw);
                let col_end = (window.col + window.width).min((bx + 1) * bw);
                let row_start = window.row.max(by * bh);
                let row_end = (window.row + window.height).min((by + 1) * bh);

                for row in row_start..row_end {
                    let block_row = (row - by * bh) as usize;
                    let out_row = (row - window.row) as usize * window.width as usize;
                    for col in col_start..col_end {
                        let block_col = (col - bx * bw) as usize;
                        let pos = ((block_row * bw as usize + block_col) * step + sample) * sample_size;
                        values[out_row + (col - window.col) as usize] =
                            layout.data_type.decode(&block[pos..pos + sample_size], self.byte_order);
                    }
                }
            }
        }

        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_classic_and_big() {
        let classic = [b'I', b'I', 42, 0, 8, 0, 0, 0];
        let header = Header::parse(&classic).unwrap();
        assert!(!header.is_big_tiff);
        assert_eq!(header.first_ifd, 8);

        let big = [b'M', b'M', 0, 43, 0, 8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 16];
        let header = Header::parse(&big).unwrap();
        assert!(header.is_big_tiff);
        assert_eq!(header.byte_order, ByteOrder::BigEndian);
        assert_eq!(header.first_ifd, 16);
    }

    #[test]
    fn test_header_rejects_bad_magic() {
        assert!(matches!(Header::parse(&[b'I', b'I', 41, 0, 0, 0, 0, 0]), Err(Error::InvalidMagic(41))));
        assert!(Header::parse(b"XX").is_err());
    }

    #[test]
    fn test_horizontal_predictor_bytes() {
        let mut data = vec![1, 2, 3, 4, 5, 6];
        undo_horizontal_predictor(&mut data, 3, 1, 1, ByteOrder::LittleEndian);
        assert_eq!(data, vec![1, 3, 6, 4, 9, 15]);
    }

    #[test]
    fn test_horizontal_predictor_u16_big_endian() {
        // 300, +5, -2 (as wrapping difference)
        let mut data = Vec::new();
        for v in [300u16, 5, 0xFFFE] {
            data.extend_from_slice(&v.to_be_bytes());
        }
        undo_horizontal_predictor(&mut data, 3, 1, 2, ByteOrder::BigEndian);
        let values: Vec<u16> = data.chunks(2).map(|c| u16::from_be_bytes([c[0], c[1]])).collect();
        assert_eq!(values, vec![300, 305, 303]);
    }

    #[test]
    fn test_horizontal_predictor_chunky_stride() {
        // Two interleaved samples per pixel
        let mut data = vec![10, 100, 1, 1, 2, 2];
        undo_horizontal_predictor(&mut data, 6, 2, 1, ByteOrder::LittleEndian);
        assert_eq!(data, vec![10, 100, 11, 101, 13, 103]);
    }
}
