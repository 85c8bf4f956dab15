//! Core data types for gridalign

use crate::io::ByteOrder;

/// Represents pixel data types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    /// Unsigned 8-bit integer
    U8,
    /// Unsigned 16-bit integer
    U16,
    /// Unsigned 32-bit integer
    U32,
    /// Signed 8-bit integer
    I8,
    /// Signed 16-bit integer
    I16,
    /// Signed 32-bit integer
    I32,
    /// 32-bit floating point
    F32,
    /// 64-bit floating point
    F64,
}

impl DataType {
    /// Returns the size in bytes for this data type
    pub fn size(&self) -> usize {
        match self {
            DataType::U8 | DataType::I8 => 1,
            DataType::U16 | DataType::I16 => 2,
            DataType::U32 | DataType::I32 | DataType::F32 => 4,
            DataType::F64 => 8,
        }
    }

    /// Returns the name of this data type
    pub fn name(&self) -> &'static str {
        match self {
            DataType::U8 => "U8",
            DataType::U16 => "U16",
            DataType::U32 => "U32",
            DataType::I8 => "I8",
            DataType::I16 => "I16",
            DataType::I32 => "I32",
            DataType::F32 => "F32",
            DataType::F64 => "F64",
        }
    }

    /// Resolves a data type from TIFF SampleFormat and BitsPerSample values
    pub fn from_tiff(sample_format: u64, bits: u64) -> Option<Self> {
        match (sample_format, bits) {
            (1, 8) => Some(DataType::U8),
            (1, 16) => Some(DataType::U16),
            (1, 32) => Some(DataType::U32),
            (2, 8) => Some(DataType::I8),
            (2, 16) => Some(DataType::I16),
            (2, 32) => Some(DataType::I32),
            (3, 32) => Some(DataType::F32),
            (3, 64) => Some(DataType::F64),
            _ => None,
        }
    }

    /// TIFF SampleFormat value (1=unsigned, 2=signed, 3=float)
    pub fn tiff_sample_format(&self) -> u16 {
        match self {
            DataType::U8 | DataType::U16 | DataType::U32 => 1,
            DataType::I8 | DataType::I16 | DataType::I32 => 2,
            DataType::F32 | DataType::F64 => 3,
        }
    }

    /// Bits per sample
    pub fn bits(&self) -> u16 {
        (self.size() * 8) as u16
    }

    /// Whether values of this type are integers
    pub fn is_integer(&self) -> bool {
        !matches!(self, DataType::F32 | DataType::F64)
    }

    /// Decodes one sample from `bytes` (at least `size()` long)
    pub fn decode(&self, bytes: &[u8], order: ByteOrder) -> f64 {
        match order {
            ByteOrder::LittleEndian => match self {
                DataType::U8 => bytes[0] as f64,
                DataType::I8 => bytes[0] as i8 as f64,
                DataType::U16 => u16::from_le_bytes([bytes[0], bytes[1]]) as f64,
                DataType::I16 => i16::from_le_bytes([bytes[0], bytes[1]]) as f64,
                DataType::U32 => u32::from_le_bytes(array4(bytes)) as f64,
                DataType::I32 => i32::from_le_bytes(array4(bytes)) as f64,
                DataType::F32 => f32::from_le_bytes(array4(bytes)) as f64,
                DataType::F64 => f64::from_le_bytes(array8(bytes)),
            },
            ByteOrder::BigEndian => match self {
                DataType::U8 => bytes[0] as f64,
                DataType::I8 => bytes[0] as i8 as f64,
                DataType::U16 => u16::from_be_bytes([bytes[0], bytes[1]]) as f64,
                DataType::I16 => i16::from_be_bytes([bytes[0], bytes[1]]) as f64,
                DataType::U32 => u32::from_be_bytes(array4(bytes)) as f64,
                DataType::I32 => i32::from_be_bytes(array4(bytes)) as f64,
                DataType::F32 => f32::from_be_bytes(array4(bytes)) as f64,
                DataType::F64 => f64::from_be_bytes(array8(bytes)),
            },
        }
    }

    /// Encodes one sample as little-endian bytes into `out`
    ///
    /// Integer types round to nearest and saturate at the type range;
    /// NaN encodes as zero for integer types.
    pub fn encode_le(&self, value: f64, out: &mut [u8]) {
        let value = if self.is_integer() && value.is_nan() { 0.0 } else { value };
        match self {
            DataType::U8 => out[0] = value.round() as u8,
            DataType::I8 => out[0] = (value.round() as i8) as u8,
            DataType::U16 => out[..2].copy_from_slice(&(value.round() as u16).to_le_bytes()),
            DataType::I16 => out[..2].copy_from_slice(&(value.round() as i16).to_le_bytes()),
            DataType::U32 => out[..4].copy_from_slice(&(value.round() as u32).to_le_bytes()),
            DataType::I32 => out[..4].copy_from_slice(&(value.round() as i32).to_le_bytes()),
            DataType::F32 => out[..4].copy_from_slice(&(value as f32).to_le_bytes()),
            DataType::F64 => out[..8].copy_from_slice(&value.to_le_bytes()),
        }
    }
}

impl DataType {
    /// Rounds `value` to what this type can store, matching `encode_le`
    pub fn quantize(&self, value: f64) -> f64 {
        match self {
            DataType::F64 => value,
            DataType::F32 => value as f32 as f64,
            _ => {
                let mut buf = [0u8; 8];
                self.encode_le(value, &mut buf);
                self.decode(&buf, ByteOrder::LittleEndian)
            }
        }
    }
}

fn array4(bytes: &[u8]) -> [u8; 4] {
    [bytes[0], bytes[1], bytes[2], bytes[3]]
}

fn array8(bytes: &[u8]) -> [u8; 8] {
    [bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7]]
}
