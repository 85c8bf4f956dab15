//! GeoTIFF writer
//!
//! Pixels are staged band-sequentially in a memory-mapped scratch file next
//! to the destination. On close the scratch is cut into blocks, blocks are
//! compressed in parallel batches and streamed out, and the IFD is written
//! after the pixel data. Files are little-endian with separate planes.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use memmap2::MmapMut;
use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::grid::{GeoTransform, Projection};
use crate::raster::{BigTiffMode, PixelWindow, RasterSink, RasterSpec, Tiling};
use super::geotiff::{format_nodata, gdal_metadata_xml, geo_key_directory, TransformTags};
use super::tags::{self, field_types};
use super::{BIGTIFF_MAGIC, TIFF_MAGIC};

/// Largest offset a classic TIFF can address
const CLASSIC_LIMIT: u64 = u32::MAX as u64;

/// Uncompressed bytes aimed for per strip
const STRIP_TARGET_BYTES: u64 = 64 * 1024;

/// Value of one IFD entry
#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    Short(Vec<u16>),
    Long(Vec<u32>),
    Long8(Vec<u64>),
    Double(Vec<f64>),
    Ascii(String),
}

impl TagValue {
    fn field_type(&self) -> u16 {
        match self {
            TagValue::Short(_) => field_types::SHORT,
            TagValue::Long(_) => field_types::LONG,
            TagValue::Long8(_) => field_types::LONG8,
            TagValue::Double(_) => field_types::DOUBLE,
            TagValue::Ascii(_) => field_types::ASCII,
        }
    }

    fn count(&self) -> u64 {
        match self {
            TagValue::Short(v) => v.len() as u64,
            TagValue::Long(v) => v.len() as u64,
            TagValue::Long8(v) => v.len() as u64,
            TagValue::Double(v) => v.len() as u64,
            TagValue::Ascii(s) => s.len() as u64 + 1,
        }
    }

    fn to_le_bytes(&self) -> Vec<u8> {
        match self {
            TagValue::Short(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            TagValue::Long(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            TagValue::Long8(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            TagValue::Double(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            TagValue::Ascii(s) => {
                let mut bytes = s.as_bytes().to_vec();
                bytes.push(0);
                bytes
            }
        }
    }

    /// Offsets or byte counts in the width the container allows
    fn offsets(values: Vec<u64>, is_big_tiff: bool) -> Result<Self> {
        if is_big_tiff {
            return Ok(TagValue::Long8(values));
        }
        values
            .into_iter()
            .map(|v| u32::try_from(v).map_err(|_| too_large()))
            .collect::<Result<Vec<_>>>()
            .map(TagValue::Long)
    }
}

fn too_large() -> Error {
    Error::Unsupported("Output exceeds 4 GiB and BigTIFF is disabled".to_string())
}

/// Serializes a little-endian IFD that will be placed at `ifd_offset`
///
/// Entries are sorted by tag. Values that do not fit the entry's value
/// field follow the entry table, word aligned.
pub fn encode_ifd(entries: &[(u16, TagValue)], ifd_offset: u64, is_big_tiff: bool) -> Result<Vec<u8>> {
    let mut sorted: Vec<&(u16, TagValue)> = entries.iter().collect();
    sorted.sort_by_key(|(tag, _)| *tag);

    let (count_size, entry_size, field_size) = if is_big_tiff { (8, 20, 8) } else { (2, 12, 4) };
    let table_len = count_size + sorted.len() * entry_size + field_size;

    let mut table = Vec::with_capacity(table_len);
    let mut extra: Vec<u8> = Vec::new();

    if is_big_tiff {
        table.extend_from_slice(&(sorted.len() as u64).to_le_bytes());
    } else {
        table.extend_from_slice(&(sorted.len() as u16).to_le_bytes());
    }

    for (tag, value) in sorted {
        let bytes = value.to_le_bytes();
        table.extend_from_slice(&tag.to_le_bytes());
        table.extend_from_slice(&value.field_type().to_le_bytes());

        if is_big_tiff {
            table.extend_from_slice(&value.count().to_le_bytes());
        } else {
            let count = u32::try_from(value.count()).map_err(|_| too_large())?;
            table.extend_from_slice(&count.to_le_bytes());
        }

        if bytes.len() <= field_size {
            let mut field = bytes;
            field.resize(field_size, 0);
            table.extend_from_slice(&field);
        } else {
            let pos = ifd_offset + (table_len + extra.len()) as u64;
            if is_big_tiff {
                table.extend_from_slice(&pos.to_le_bytes());
            } else {
                let pos = u32::try_from(pos).map_err(|_| too_large())?;
                table.extend_from_slice(&pos.to_le_bytes());
            }
            extra.extend_from_slice(&bytes);
            if extra.len() % 2 == 1 {
                extra.push(0);
            }
        }
    }

    table.extend_from_slice(&vec![0u8; field_size]);
    table.extend_from_slice(&extra);
    Ok(table)
}

/// File header pointing at the first IFD
fn encode_header(ifd_offset: u64, is_big_tiff: bool) -> Result<Vec<u8>> {
    let mut header = b"II".to_vec();
    if is_big_tiff {
        header.extend_from_slice(&BIGTIFF_MAGIC.to_le_bytes());
        header.extend_from_slice(&8u16.to_le_bytes());
        header.extend_from_slice(&0u16.to_le_bytes());
        header.extend_from_slice(&ifd_offset.to_le_bytes());
    } else {
        header.extend_from_slice(&TIFF_MAGIC.to_le_bytes());
        let offset = u32::try_from(ifd_offset).map_err(|_| too_large())?;
        header.extend_from_slice(&offset.to_le_bytes());
    }
    Ok(header)
}

/// How the image is cut into blocks
#[derive(Debug, Clone, Copy)]
struct BlockPlan {
    tiled: bool,
    block_width: u64,
    block_height: u64,
    blocks_across: u64,
    blocks_down: u64,
}

impl BlockPlan {
    fn new(spec: &RasterSpec) -> Self {
        let (tiled, block_width, block_height) = match spec.options.tiling {
            Tiling::Tiled(size) => (true, size as u64, size as u64),
            Tiling::Strips => {
                let row_bytes = spec.width * spec.data_type.size() as u64;
                let rows = (STRIP_TARGET_BYTES / row_bytes).clamp(1, spec.height);
                (false, spec.width, rows)
            }
        };
        Self {
            tiled,
            block_width,
            block_height,
            blocks_across: spec.width.div_ceil(block_width),
            blocks_down: spec.height.div_ceil(block_height),
        }
    }

    fn blocks_per_plane(&self) -> usize {
        (self.blocks_across * self.blocks_down) as usize
    }
}

/// GeoTIFF being created
pub struct GeoTiffSink {
    path: PathBuf,
    scratch_path: PathBuf,
    scratch: MmapMut,
    spec: RasterSpec,
    transform: GeoTransform,
    projection: Projection,
    metadata: BTreeMap<String, String>,
    nodata: Option<f64>,
    scale: Option<f64>,
    offset: Option<f64>,
    written: bool,
}

impl GeoTiffSink {
    pub fn create<P: AsRef<Path>>(path: P, spec: &RasterSpec) -> Result<Self> {
        spec.validate()?;

        let path = path.as_ref().to_path_buf();
        let mut scratch_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        scratch_name.push(".scratch");
        let scratch_path = path.with_file_name(scratch_name);

        let band_bytes = spec.width * spec.height * spec.data_type.size() as u64;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&scratch_path)?;
        file.set_len(band_bytes * spec.band_count as u64)?;
        let scratch = unsafe { MmapMut::map_mut(&file)? };

        tracing::debug!(
            path = %path.display(),
            width = spec.width,
            height = spec.height,
            bands = spec.band_count,
            data_type = spec.data_type.name(),
            "Created GeoTIFF sink"
        );

        Ok(Self {
            path,
            scratch_path,
            scratch,
            spec: *spec,
            transform: GeoTransform::new(0.0, 1.0, 0.0, 1.0),
            projection: Projection::default(),
            metadata: BTreeMap::new(),
            nodata: None,
            scale: None,
            offset: None,
            written: false,
        })
    }

    fn sample_size(&self) -> usize {
        self.spec.data_type.size()
    }

    fn band_len(&self) -> usize {
        (self.spec.width * self.spec.height) as usize * self.sample_size()
    }

    fn use_big_tiff(&self, block_count: usize) -> bool {
        match self.spec.options.big_tiff {
            BigTiffMode::Never => false,
            BigTiffMode::Always => true,
            BigTiffMode::IfSafer => {
                let estimate = self.scratch.len() as u64 + block_count as u64 * 16 + (1 << 20);
                estimate > CLASSIC_LIMIT
            }
        }
    }

    /// Copies block `index` (over all planes) out of the scratch, padding edge tiles
    fn extract_block(&self, plan: &BlockPlan, index: usize) -> Vec<u8> {
        let per_plane = plan.blocks_per_plane();
        let plane = index / per_plane;
        let within = (index % per_plane) as u64;
        let bx = within % plan.blocks_across;
        let by = within / plan.blocks_across;

        let size = self.sample_size();
        let width = self.spec.width;
        let col0 = bx * plan.block_width;
        let row0 = by * plan.block_height;
        let valid_cols = plan.block_width.min(width - col0) as usize;
        let valid_rows = plan.block_height.min(self.spec.height - row0);
        let rows = if plan.tiled { plan.block_height } else { valid_rows };

        let block_row_bytes = plan.block_width as usize * size;
        let mut block = vec![0u8; block_row_bytes * rows as usize];
        let plane_start = plane * self.band_len();

        for r in 0..valid_rows {
            let src = plane_start + (((row0 + r) * width + col0) as usize) * size;
            let dst = r as usize * block_row_bytes;
            block[dst..dst + valid_cols * size]
                .copy_from_slice(&self.scratch[src..src + valid_cols * size]);
        }

        block
    }

    fn ifd_entries(
        &self,
        plan: &BlockPlan,
        offsets: Vec<u64>,
        byte_counts: Vec<u64>,
        is_big_tiff: bool,
    ) -> Result<Vec<(u16, TagValue)>> {
        let bands = self.spec.band_count;
        let data_type = self.spec.data_type;
        let dimension = |v: u64| u32::try_from(v).map_err(|_| too_large());

        let mut entries = vec![
            (tags::IMAGE_WIDTH, TagValue::Long(vec![dimension(self.spec.width)?])),
            (tags::IMAGE_LENGTH, TagValue::Long(vec![dimension(self.spec.height)?])),
            (tags::BITS_PER_SAMPLE, TagValue::Short(vec![data_type.bits(); bands])),
            (tags::COMPRESSION, TagValue::Short(vec![self.spec.options.compression.tag()])),
            (tags::PHOTOMETRIC_INTERPRETATION, TagValue::Short(vec![1])),
            (tags::SAMPLES_PER_PIXEL, TagValue::Short(vec![bands as u16])),
            (tags::PLANAR_CONFIGURATION, TagValue::Short(vec![2])),
            (tags::SOFTWARE, TagValue::Ascii(format!("gridalign {}", env!("CARGO_PKG_VERSION")))),
            (tags::SAMPLE_FORMAT, TagValue::Short(vec![data_type.tiff_sample_format(); bands])),
        ];

        let offsets = TagValue::offsets(offsets, is_big_tiff)?;
        let byte_counts = TagValue::offsets(byte_counts, is_big_tiff)?;
        if plan.tiled {
            entries.push((tags::TILE_WIDTH, TagValue::Long(vec![dimension(plan.block_width)?])));
            entries.push((tags::TILE_LENGTH, TagValue::Long(vec![dimension(plan.block_height)?])));
            entries.push((tags::TILE_OFFSETS, offsets));
            entries.push((tags::TILE_BYTE_COUNTS, byte_counts));
        } else {
            entries.push((tags::ROWS_PER_STRIP, TagValue::Long(vec![dimension(plan.block_height)?])));
            entries.push((tags::STRIP_OFFSETS, offsets));
            entries.push((tags::STRIP_BYTE_COUNTS, byte_counts));
        }

        match TransformTags::from_transform(&self.transform) {
            TransformTags::ScaleTiepoint { scale, tiepoint } => {
                entries.push((tags::MODEL_PIXEL_SCALE, TagValue::Double(scale.to_vec())));
                entries.push((tags::MODEL_TIEPOINT, TagValue::Double(tiepoint.to_vec())));
            }
            TransformTags::Matrix(matrix) => {
                entries.push((tags::MODEL_TRANSFORMATION, TagValue::Double(matrix.to_vec())));
            }
        }

        if !self.projection.is_empty() {
            let (directory, ascii) = geo_key_directory(&self.projection);
            entries.push((tags::GEO_KEY_DIRECTORY, TagValue::Short(directory)));
            if !ascii.is_empty() {
                entries.push((tags::GEO_ASCII_PARAMS, TagValue::Ascii(ascii)));
            }
        }

        if let Some(xml) = gdal_metadata_xml(&self.metadata, self.scale, self.offset, bands) {
            entries.push((tags::GDAL_METADATA, TagValue::Ascii(xml)));
        }
        if let Some(nodata) = self.nodata {
            entries.push((tags::GDAL_NODATA, TagValue::Ascii(format_nodata(nodata))));
        }

        Ok(entries)
    }

    fn finish(&self) -> Result<()> {
        let plan = BlockPlan::new(&self.spec);
        let total_blocks = plan.blocks_per_plane() * self.spec.band_count;
        let is_big_tiff = self.use_big_tiff(total_blocks);
        let compression = self.spec.options.compression;
        let header_len = if is_big_tiff { 16 } else { 8 };

        let mut out = BufWriter::new(File::create(&self.path)?);
        out.write_all(&vec![0u8; header_len])?;
        let mut pos = header_len as u64;

        let mut offsets = Vec::with_capacity(total_blocks);
        let mut byte_counts = Vec::with_capacity(total_blocks);

        let batch = rayon::current_num_threads().max(1) * 4;
        let indices: Vec<usize> = (0..total_blocks).collect();
        for chunk in indices.chunks(batch) {
            let encoded: Vec<Vec<u8>> = chunk
                .par_iter()
                .map(|&index| compression.compress(&self.extract_block(&plan, index)))
                .collect::<Result<_>>()?;

            for block in encoded {
                offsets.push(pos);
                byte_counts.push(block.len() as u64);
                out.write_all(&block)?;
                pos += block.len() as u64;
            }
        }

        if pos % 2 == 1 {
            out.write_all(&[0])?;
            pos += 1;
        }

        let entries = self.ifd_entries(&plan, offsets, byte_counts, is_big_tiff)?;
        let ifd = encode_ifd(&entries, pos, is_big_tiff)?;
        if !is_big_tiff && pos + ifd.len() as u64 > CLASSIC_LIMIT {
            return Err(too_large());
        }
        out.write_all(&ifd)?;

        out.seek(SeekFrom::Start(0))?;
        out.write_all(&encode_header(pos, is_big_tiff)?)?;
        out.flush()?;

        tracing::debug!(
            path = %self.path.display(),
            blocks = total_blocks,
            bytes = pos + ifd.len() as u64,
            compression = compression.name(),
            big_tiff = is_big_tiff,
            "Wrote GeoTIFF"
        );

        Ok(())
    }
}

impl RasterSink for GeoTiffSink {
    fn set_transform(&mut self, transform: GeoTransform) -> Result<()> {
        self.transform = transform;
        Ok(())
    }

    fn set_projection(&mut self, projection: &Projection) -> Result<()> {
        self.projection = projection.clone();
        Ok(())
    }

    fn set_metadata(&mut self, key: &str, value: &str) -> Result<()> {
        self.metadata.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn set_nodata(&mut self, nodata: Option<f64>) -> Result<()> {
        self.nodata = nodata;

        let Some(value) = nodata else { return Ok(()) };
        if self.written {
            return Ok(());
        }

        let size = self.sample_size();
        let mut sample = [0u8; 8];
        self.spec.data_type.encode_le(value, &mut sample);
        if sample[..size].iter().all(|&b| b == 0) {
            return Ok(());
        }

        let pattern: Vec<u8> = sample[..size].iter().copied().cycle().take(64 * 1024).collect();
        self.scratch.par_chunks_mut(pattern.len()).for_each(|chunk| {
            chunk.copy_from_slice(&pattern[..chunk.len()]);
        });
        Ok(())
    }

    fn set_scale_offset(&mut self, scale: Option<f64>, offset: Option<f64>) -> Result<()> {
        self.scale = scale;
        self.offset = offset;
        Ok(())
    }

    fn write_window(&mut self, band: usize, window: PixelWindow, values: &[f64]) -> Result<()> {
        if band >= self.spec.band_count {
            return Err(Error::OutOfBounds(format!(
                "Band {} written to a {}-band raster",
                band, self.spec.band_count
            )));
        }
        window.check_within(self.spec.width, self.spec.height)?;
        if values.len() != window.pixel_count() {
            return Err(Error::OutOfBounds(format!(
                "{} values supplied for a {}x{} window",
                values.len(),
                window.width,
                window.height
            )));
        }

        let size = self.sample_size();
        let data_type = self.spec.data_type;
        let nodata = self.nodata;
        let plane_start = band * self.band_len();
        let width = self.spec.width;

        for (i, row_values) in values.chunks_exact(window.width as usize).enumerate() {
            let row = window.row + i as u64;
            let start = plane_start + ((row * width + window.col) as usize) * size;
            let row_bytes = &mut self.scratch[start..start + row_values.len() * size];
            for (dst, &value) in row_bytes.chunks_exact_mut(size).zip(row_values) {
                let value = match nodata {
                    Some(nd) if value.is_nan() => nd,
                    _ => value,
                };
                data_type.encode_le(value, dst);
            }
        }

        self.written = true;
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<()> {
        let result = self.finish();
        if result.is_err() {
            let _ = fs::remove_file(&self.path);
        }
        result
    }
}

impl Drop for GeoTiffSink {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.scratch_path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::Compression;
    use crate::formats::tiff::ifd::IFD;
    use crate::formats::tiff::reader::{GeoTiffSource, Header};
    use crate::io::ByteOrder;
    use crate::raster::{CreateOptions, RasterSource};
    use crate::types::DataType;

    fn spec(width: u64, height: u64, bands: usize, data_type: DataType, options: CreateOptions) -> RasterSpec {
        RasterSpec { width, height, band_count: bands, data_type, options }
    }

    fn ramp(width: u64, height: u64, scale: f64) -> Vec<f64> {
        (0..width * height).map(|i| i as f64 * scale).collect()
    }

    #[test]
    fn test_encode_ifd_roundtrip() {
        let entries = vec![
            (tags::IMAGE_LENGTH, TagValue::Long(vec![7])),
            (tags::IMAGE_WIDTH, TagValue::Long(vec![9])),
            (tags::MODEL_PIXEL_SCALE, TagValue::Double(vec![1.0, 2.0, 0.0])),
            (tags::SOFTWARE, TagValue::Ascii("abc".to_string())),
        ];

        for big in [false, true] {
            let header_len = if big { 16 } else { 8 };
            let mut file = encode_header(header_len, big).unwrap();
            file.extend(encode_ifd(&entries, header_len, big).unwrap());

            let header = Header::parse(&file).unwrap();
            assert_eq!(header.is_big_tiff, big);
            let (ifd, next) = IFD::parse(&file, header.first_ifd, ByteOrder::LittleEndian, big).unwrap();
            assert_eq!(next, 0);
            assert_eq!(ifd.entries[0].tag, tags::IMAGE_WIDTH);
            assert_eq!(ifd.require_u64(tags::IMAGE_LENGTH, &file, ByteOrder::LittleEndian).unwrap(), 7);
            let scale = ifd.get_entry(tags::MODEL_PIXEL_SCALE).unwrap();
            assert_eq!(scale.read_f64s(&file, ByteOrder::LittleEndian).unwrap(), vec![1.0, 2.0, 0.0]);
            assert_eq!(ifd.get_entry(tags::SOFTWARE).unwrap().read_ascii(&file).unwrap(), "abc");
        }
    }

    #[test]
    fn test_classic_offsets_must_fit() {
        assert!(TagValue::offsets(vec![u32::MAX as u64 + 1], false).is_err());
        assert!(TagValue::offsets(vec![u32::MAX as u64 + 1], true).is_ok());
    }

    #[test]
    fn test_every_layout_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let (width, height) = (37u64, 21u64);
        let values = ramp(width, height, 1.0);

        let layouts = [Tiling::Tiled(16), Tiling::Strips];
        let compressions = [Compression::None, Compression::Lzw, Compression::Deflate, Compression::PackBits];
        let modes = [BigTiffMode::Never, BigTiffMode::Always];

        for tiling in layouts {
            for compression in compressions {
                for big_tiff in modes {
                    let path = dir.path().join(format!("{:?}_{:?}_{:?}.tif", tiling, compression, big_tiff));
                    let options = CreateOptions { compression, tiling, big_tiff };
                    let mut sink = Box::new(GeoTiffSink::create(&path, &spec(width, height, 1, DataType::U16, options)).unwrap());
                    sink.write_window(0, PixelWindow::full(width, height), &values).unwrap();
                    sink.close().unwrap();

                    let mut source = GeoTiffSource::open(&path).unwrap();
                    let read = source.read_window(0, PixelWindow::full(width, height)).unwrap();
                    assert_eq!(read, values, "{:?} {:?} {:?}", tiling, compression, big_tiff);

                    let window = source.read_window(0, PixelWindow::new(15, 14, 5, 3)).unwrap();
                    assert_eq!(window[0], (14 * width + 15) as f64);
                    assert_eq!(window[14], (16 * width + 19) as f64);
                }
            }
        }
    }

    #[test]
    fn test_georeferencing_and_metadata_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("geo.tif");
        let projection = Projection::equirectangular_sphere("Moon", 1_737_400.0);
        let transform = GeoTransform::new(-5_458_203.0, 200.0, 2_729_101.5, -200.0);

        let mut sink = Box::new(GeoTiffSink::create(&path, &spec(4, 3, 2, DataType::I16, CreateOptions::default())).unwrap());
        sink.set_transform(transform).unwrap();
        sink.set_projection(&projection).unwrap();
        sink.set_nodata(Some(-32768.0)).unwrap();
        sink.set_scale_offset(Some(0.5), Some(1_737_400.0)).unwrap();
        sink.set_metadata("MinimumLongitude", "0").unwrap();
        sink.set_metadata("MaximumLongitude", "360").unwrap();
        sink.write_window(1, PixelWindow::new(1, 1, 2, 1), &[-7.0, f64::NAN]).unwrap();
        sink.close().unwrap();

        let mut source = GeoTiffSource::open(&path).unwrap();
        let info = source.info().clone();
        assert_eq!(info.band_count, 2);
        assert_eq!(info.data_type, DataType::I16);
        assert_eq!(info.grid.transform, transform);
        assert_eq!(info.grid.projection, projection);
        assert_eq!(info.grid.nodata, Some(-32768.0));
        assert_eq!(info.grid.scale, Some(0.5));
        assert_eq!(info.grid.offset, Some(1_737_400.0));
        assert_eq!(info.metadata.get("MaximumLongitude").map(String::as_str), Some("360"));

        assert!(source.read_window(0, PixelWindow::full(4, 3)).unwrap().iter().all(|&v| v == -32768.0));
        let band1 = source.read_window(1, PixelWindow::new(0, 1, 4, 1)).unwrap();
        assert_eq!(band1, vec![-32768.0, -7.0, -32768.0, -32768.0]);
    }

    #[test]
    fn test_rotated_transform_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rotated.tif");
        let transform = GeoTransform::from_array([100.0, 1.0, 0.25, 200.0, 0.5, -1.0]);

        let mut sink = Box::new(GeoTiffSink::create(&path, &spec(2, 2, 1, DataType::F32, CreateOptions::default())).unwrap());
        sink.set_transform(transform).unwrap();
        sink.set_projection(&Projection::new("EPSG:32633")).unwrap();
        sink.write_window(0, PixelWindow::full(2, 2), &[0.5, 1.5, f64::NAN, 3.5]).unwrap();
        sink.close().unwrap();

        let mut source = GeoTiffSource::open(&path).unwrap();
        assert_eq!(source.info().grid.transform, transform);
        assert_eq!(source.info().grid.projection, Projection::new("EPSG:32633"));
        let values = source.read_window(0, PixelWindow::full(2, 2)).unwrap();
        assert_eq!(values[1], 1.5);
        assert!(values[2].is_nan());
    }

    #[test]
    fn test_scratch_removed_and_failed_close_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.tif");

        let sink = Box::new(GeoTiffSink::create(&path, &spec(2, 2, 1, DataType::U8, CreateOptions::default())).unwrap());
        let scratch = sink.scratch_path.clone();
        assert!(scratch.exists());
        sink.close().unwrap();
        assert!(!scratch.exists());
        assert!(path.exists());

        let dropped = GeoTiffSink::create(dir.path().join("dropped.tif"), &spec(2, 2, 1, DataType::U8, CreateOptions::default())).unwrap();
        let scratch = dropped.scratch_path.clone();
        drop(dropped);
        assert!(!scratch.exists());
        assert!(!dir.path().join("dropped.tif").exists());
    }

    #[test]
    fn test_invalid_spec_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let options = CreateOptions { tiling: Tiling::Tiled(20), ..CreateOptions::default() };
        assert!(GeoTiffSink::create(dir.path().join("x.tif"), &spec(2, 2, 1, DataType::U8, options)).is_err());
        assert!(GeoTiffSink::create(dir.path().join("y.tif"), &spec(0, 2, 1, DataType::U8, CreateOptions::default())).is_err());
    }
}
