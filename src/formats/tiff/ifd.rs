//! Image File Directory (IFD) structures

use std::collections::HashMap;
use crate::error::{Error, Result};
use crate::io::ByteOrder;
use super::tags::{self, field_types};

/// Represents an Image File Directory entry
#[derive(Debug, Clone)]
pub struct IFDEntry {
    /// TIFF tag identifier
    pub tag: u16,
    /// Field type
    pub field_type: u16,
    /// Number of values
    pub count: u64,
    /// File position of the first value, inline or out-of-line
    pub data_pos: usize,
}

impl IFDEntry {
    /// Creates a new IFD entry
    pub fn new(tag: u16, field_type: u16, count: u64, data_pos: usize) -> Self {
        Self {
            tag,
            field_type,
            count,
            data_pos,
        }
    }

    /// Returns the size in bytes of this field type
    pub fn field_type_size(&self) -> usize {
        field_types::size(self.field_type)
    }

    /// Total size of the values in bytes
    pub fn byte_len(&self) -> usize {
        self.field_type_size().saturating_mul(self.count as usize)
    }

    /// Returns whether the value is stored inline (in the value/offset field)
    pub fn is_inline(&self, is_big_tiff: bool) -> bool {
        let inline_size = if is_big_tiff { 8 } else { 4 };
        self.byte_len() <= inline_size
    }

    fn check_range(&self, data: &[u8]) -> Result<()> {
        let end = self.data_pos.checked_add(self.byte_len());
        if end.map_or(true, |end| end > data.len()) {
            return Err(Error::OutOfBounds(format!(
                "Tag {} ({}) values exceed file size {}",
                self.tag,
                tags::tag_name(self.tag),
                data.len()
            )));
        }
        Ok(())
    }

    /// Reads integer values, widening to u64
    pub fn read_u64s(&self, data: &[u8], order: ByteOrder) -> Result<Vec<u64>> {
        self.check_range(data)?;
        let size = self.field_type_size();

        (0..self.count as usize)
            .map(|i| {
                let pos = self.data_pos + i * size;
                match self.field_type {
                    field_types::BYTE | field_types::UNDEFINED => Ok(data[pos] as u64),
                    field_types::SHORT => Ok(order.read_u16(data, pos)? as u64),
                    field_types::LONG => Ok(order.read_u32(data, pos)? as u64),
                    field_types::LONG8 | field_types::IFD8 => order.read_u64(data, pos),
                    other => Err(Error::InvalidFormat(format!(
                        "Tag {} has non-integer type {}",
                        self.tag, other
                    ))),
                }
            })
            .collect()
    }

    /// Reads numeric values as f64
    pub fn read_f64s(&self, data: &[u8], order: ByteOrder) -> Result<Vec<f64>> {
        self.check_range(data)?;
        let size = self.field_type_size();

        (0..self.count as usize)
            .map(|i| {
                let pos = self.data_pos + i * size;
                match self.field_type {
                    field_types::DOUBLE => order.read_f64(data, pos),
                    field_types::FLOAT => Ok(order.read_f32(data, pos)? as f64),
                    field_types::SBYTE => Ok(data[pos] as i8 as f64),
                    field_types::SSHORT => Ok(order.read_u16(data, pos)? as i16 as f64),
                    field_types::SLONG => Ok(order.read_u32(data, pos)? as i32 as f64),
                    field_types::SLONG8 => Ok(order.read_u64(data, pos)? as i64 as f64),
                    field_types::RATIONAL => {
                        let num = order.read_u32(data, pos)? as f64;
                        let den = order.read_u32(data, pos + 4)? as f64;
                        Ok(num / den)
                    }
                    field_types::SRATIONAL => {
                        let num = order.read_u32(data, pos)? as i32 as f64;
                        let den = order.read_u32(data, pos + 4)? as i32 as f64;
                        Ok(num / den)
                    }
                    field_types::SHORT => Ok(order.read_u16(data, pos)? as f64),
                    field_types::LONG => Ok(order.read_u32(data, pos)? as f64),
                    field_types::LONG8 | field_types::IFD8 => Ok(order.read_u64(data, pos)? as f64),
                    _ => Ok(data[pos] as f64),
                }
            })
            .collect()
    }

    /// Reads an ASCII value, dropping trailing NULs
    pub fn read_ascii(&self, data: &[u8]) -> Result<String> {
        self.check_range(data)?;
        let bytes = &data[self.data_pos..self.data_pos + self.byte_len()];
        let text = String::from_utf8_lossy(bytes);
        Ok(text.trim_end_matches('\0').to_string())
    }
}

/// Represents an Image File Directory
#[derive(Debug, Clone)]
pub struct IFD {
    /// Offset to this IFD in file
    pub offset: u64,
    /// Entries in this IFD
    pub entries: Vec<IFDEntry>,
    /// Tag map for quick lookup
    tag_map: HashMap<u16, usize>,
}

impl IFD {
    /// Creates a new IFD
    pub fn new(offset: u64) -> Self {
        Self {
            offset,
            entries: Vec::new(),
            tag_map: HashMap::new(),
        }
    }

    /// Parses the IFD at `offset`, returning it with the next IFD offset
    pub fn parse(data: &[u8], offset: u64, order: ByteOrder, is_big_tiff: bool) -> Result<(IFD, u64)> {
        let start = offset as usize;
        let (entry_count, header_size, entry_size) = if is_big_tiff {
            (order.read_u64(data, start)?, 8, 20)
        } else {
            (order.read_u16(data, start)? as u64, 2, 12)
        };

        let entries_start = start + header_size;
        let entries_end = (entry_count as usize)
            .checked_mul(entry_size)
            .and_then(|len| len.checked_add(entries_start))
            .filter(|&end| end <= data.len())
            .ok_or_else(|| Error::OutOfBounds(format!(
                "IFD at {} with {} entries exceeds file size",
                offset, entry_count
            )))?;

        let mut ifd = IFD::new(offset);

        for i in 0..entry_count as usize {
            let pos = entries_start + i * entry_size;
            let tag = order.read_u16(data, pos)?;
            let field_type = order.read_u16(data, pos + 2)?;

            let (count, value_field) = if is_big_tiff {
                (order.read_u64(data, pos + 4)?, pos + 12)
            } else {
                (order.read_u32(data, pos + 4)? as u64, pos + 8)
            };

            let mut entry = IFDEntry::new(tag, field_type, count, value_field);
            if !entry.is_inline(is_big_tiff) {
                entry.data_pos = if is_big_tiff {
                    order.read_u64(data, value_field)? as usize
                } else {
                    order.read_u32(data, value_field)? as usize
                };
            }
            ifd.add_entry(entry);
        }

        let next = if is_big_tiff {
            order.read_u64(data, entries_end)?
        } else {
            order.read_u32(data, entries_end)? as u64
        };

        Ok((ifd, next))
    }

    /// Adds an entry to this IFD
    pub fn add_entry(&mut self, entry: IFDEntry) {
        let index = self.entries.len();
        self.tag_map.insert(entry.tag, index);
        self.entries.push(entry);
    }

    /// Gets an entry by tag
    pub fn get_entry(&self, tag: u16) -> Option<&IFDEntry> {
        self.tag_map.get(&tag).and_then(|&idx| self.entries.get(idx))
    }

    /// First integer value of a tag, if present
    pub fn get_u64(&self, tag: u16, data: &[u8], order: ByteOrder) -> Result<Option<u64>> {
        match self.get_entry(tag) {
            Some(entry) => Ok(entry.read_u64s(data, order)?.first().copied()),
            None => Ok(None),
        }
    }

    /// First integer value of a required tag
    pub fn require_u64(&self, tag: u16, data: &[u8], order: ByteOrder) -> Result<u64> {
        self.get_u64(tag, data, order)?.ok_or(Error::MissingTag(tag))
    }

    /// Returns number of entries
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether this IFD represents a tiled image
    pub fn is_tiled(&self) -> bool {
        self.get_entry(tags::TILE_WIDTH).is_some()
    }
}
