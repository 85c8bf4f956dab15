//! Byte order (endianness) handling
//!
//! Reads multi-byte values out of byte slices (typically a memory-mapped
//! raster file) in either little-endian or big-endian order.

use crate::error::{Error, Result};

/// Represents the byte order (endianness) of binary data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// Little-endian byte order (least significant byte first)
    LittleEndian,
    /// Big-endian byte order (most significant byte first)
    BigEndian,
}

impl ByteOrder {
    /// Detects byte order from TIFF magic bytes
    ///
    /// TIFF files start with either "II" (0x4949) for little-endian
    /// or "MM" (0x4D4D) for big-endian.
    pub fn from_tiff_magic(magic: [u8; 2]) -> Option<Self> {
        match &magic {
            b"II" => Some(ByteOrder::LittleEndian),
            b"MM" => Some(ByteOrder::BigEndian),
            _ => None,
        }
    }

    /// Detects byte order from the first two bytes of `data`
    pub fn detect(data: &[u8]) -> Result<Self> {
        let magic = take::<2>(data, 0)?;
        Self::from_tiff_magic(magic).ok_or_else(|| {
            Error::InvalidFormat(format!(
                "Invalid byte order magic bytes: {:02X}{:02X}",
                magic[0], magic[1]
            ))
        })
    }

    /// Reads an unsigned 16-bit integer at `pos`
    pub fn read_u16(&self, data: &[u8], pos: usize) -> Result<u16> {
        let buf = take::<2>(data, pos)?;
        Ok(match self {
            ByteOrder::LittleEndian => u16::from_le_bytes(buf),
            ByteOrder::BigEndian => u16::from_be_bytes(buf),
        })
    }

    /// Reads an unsigned 32-bit integer at `pos`
    pub fn read_u32(&self, data: &[u8], pos: usize) -> Result<u32> {
        let buf = take::<4>(data, pos)?;
        Ok(match self {
            ByteOrder::LittleEndian => u32::from_le_bytes(buf),
            ByteOrder::BigEndian => u32::from_be_bytes(buf),
        })
    }

    /// Reads an unsigned 64-bit integer at `pos`
    pub fn read_u64(&self, data: &[u8], pos: usize) -> Result<u64> {
        let buf = take::<8>(data, pos)?;
        Ok(match self {
            ByteOrder::LittleEndian => u64::from_le_bytes(buf),
            ByteOrder::BigEndian => u64::from_be_bytes(buf),
        })
    }

    /// Reads a 32-bit floating point number at `pos`
    pub fn read_f32(&self, data: &[u8], pos: usize) -> Result<f32> {
        Ok(f32::from_bits(self.read_u32(data, pos)?))
    }

    /// Reads a 64-bit floating point number at `pos`
    pub fn read_f64(&self, data: &[u8], pos: usize) -> Result<f64> {
        Ok(f64::from_bits(self.read_u64(data, pos)?))
    }
}

fn take<const N: usize>(data: &[u8], pos: usize) -> Result<[u8; N]> {
    let end = pos.checked_add(N).filter(|&end| end <= data.len()).ok_or_else(|| {
        Error::OutOfBounds(format!(
            "read of {} bytes at offset {} exceeds data length {}",
            N,
            pos,
            data.len()
        ))
    })?;
    let mut buf = [0u8; N];
    buf.copy_from_slice(&data[pos..end]);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_tiff_magic() {
        assert_eq!(ByteOrder::from_tiff_magic(*b"II"), Some(ByteOrder::LittleEndian));
        assert_eq!(ByteOrder::from_tiff_magic(*b"MM"), Some(ByteOrder::BigEndian));
        assert_eq!(ByteOrder::from_tiff_magic(*b"XX"), None);
    }

    #[test]
    fn test_detect() {
        assert_eq!(ByteOrder::detect(b"II*\0").unwrap(), ByteOrder::LittleEndian);
        assert_eq!(ByteOrder::detect(b"MM\0*").unwrap(), ByteOrder::BigEndian);
        assert!(ByteOrder::detect(b"XX").is_err());
        assert!(ByteOrder::detect(b"I").is_err());
    }

    #[test]
    fn test_read_u16_both_orders() {
        let data = [0x12u8, 0x34];
        assert_eq!(ByteOrder::LittleEndian.read_u16(&data, 0).unwrap(), 0x3412);
        assert_eq!(ByteOrder::BigEndian.read_u16(&data, 0).unwrap(), 0x1234);
    }

    #[test]
    fn test_read_u32_at_offset() {
        let data = [0u8, 0x78, 0x56, 0x34, 0x12];
        assert_eq!(ByteOrder::LittleEndian.read_u32(&data, 1).unwrap(), 0x12345678);
    }

    #[test]
    fn test_read_u64() {
        let data = [0x88u8, 0x77, 0x66, 0x55, 0x44, 0x33, 0x22, 0x11];
        assert_eq!(ByteOrder::LittleEndian.read_u64(&data, 0).unwrap(), 0x1122334455667788);
    }

    #[test]
    fn test_read_floats() {
        let data = std::f64::consts::PI.to_be_bytes();
        let value = ByteOrder::BigEndian.read_f64(&data, 0).unwrap();
        assert_eq!(value, std::f64::consts::PI);

        let data = 1.5f32.to_le_bytes();
        assert_eq!(ByteOrder::LittleEndian.read_f32(&data, 0).unwrap(), 1.5);
    }

    #[test]
    fn test_read_past_end() {
        let data = [0u8; 3];
        assert!(matches!(
            ByteOrder::LittleEndian.read_u32(&data, 0),
            Err(Error::OutOfBounds(_))
        ));
        assert!(ByteOrder::LittleEndian.read_u16(&data, usize::MAX).is_err());
    }
}
