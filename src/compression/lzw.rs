//! LZW compression
//!
//! TIFF flavour of LZW: codes are packed most-significant-bit first, the
//! table starts with a ClearCode, and the code width grows one entry
//! early (the "early change" convention libtiff writes).

use std::collections::HashMap;
use crate::error::{Error, Result};

const CLEAR_CODE: u16 = 256;
const EOI_CODE: u16 = 257;
const FIRST_CODE: u16 = 258;
const MIN_BITS: u8 = 9;
const MAX_BITS: u8 = 12;
/// The encoder resets the table once this many codes are assigned
const TABLE_LIMIT: u16 = (1 << MAX_BITS) - 2;

/// Decompresses LZW compressed data
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    LzwDecoder::new().decode(data)
}

/// Compresses data with LZW
pub fn compress(data: &[u8]) -> Vec<u8> {
    let mut writer = BitWriter::new();
    let mut table: HashMap<(u16, u8), u16> = HashMap::new();
    let mut next_code = FIRST_CODE;
    let mut width = MIN_BITS;

    writer.write(CLEAR_CODE, width);

    let mut bytes = data.iter();
    let mut current = match bytes.next() {
        Some(&byte) => byte as u16,
        None => {
            writer.write(EOI_CODE, width);
            return writer.finish();
        }
    };

    for &byte in bytes {
        if let Some(&code) = table.get(&(current, byte)) {
            current = code;
            continue;
        }

        writer.write(current, width);
        table.insert((current, byte), next_code);
        next_code += 1;

        if next_code == TABLE_LIMIT {
            writer.write(CLEAR_CODE, width);
            table.clear();
            next_code = FIRST_CODE;
            width = MIN_BITS;
        } else if next_code > max_code(width) {
            width += 1;
        }

        current = byte as u16;
    }

    writer.write(current, width);
    next_code += 1;
    if next_code == TABLE_LIMIT {
        writer.write(CLEAR_CODE, width);
        width = MIN_BITS;
    } else if next_code > max_code(width) {
        width += 1;
    }
    writer.write(EOI_CODE, width);

    writer.finish()
}

fn max_code(width: u8) -> u16 {
    (1u16 << width) - 1
}

#[derive(Clone, Copy)]
struct Entry {
    prefix: u16,
    byte: u8,
    first: u8,
    len: usize,
}

/// LZW decoder
struct LzwDecoder {
    entries: Vec<Entry>,
}

impl LzwDecoder {
    fn new() -> Self {
        let mut decoder = Self {
            entries: Vec::with_capacity(1 << MAX_BITS),
        };
        decoder.reset();
        decoder
    }

    fn reset(&mut self) {
        self.entries.clear();
        for i in 0..=255u8 {
            self.entries.push(Entry { prefix: 0, byte: i, first: i, len: 1 });
        }
        // ClearCode and EndOfInformation occupy 256 and 257
        self.entries.push(Entry { prefix: 0, byte: 0, first: 0, len: 0 });
        self.entries.push(Entry { prefix: 0, byte: 0, first: 0, len: 0 });
    }

    fn decode(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::with_capacity(data.len() * 2);
        let mut reader = BitReader::new(data);
        let mut width = MIN_BITS;
        let mut previous: Option<u16> = None;

        while let Some(code) = reader.read_bits(width) {
            if code == EOI_CODE {
                break;
            }

            if code == CLEAR_CODE {
                self.reset();
                width = MIN_BITS;
                previous = None;
                continue;
            }

            let Some(prev) = previous else {
                if code > 255 {
                    return Err(Error::InvalidFormat(format!(
                        "Invalid LZW code after clear: {}",
                        code
                    )));
                }
                output.push(code as u8);
                previous = Some(code);
                continue;
            };

            let next = self.entries.len();
            if (code as usize) < next {
                let first = self.emit(code, &mut output);
                self.add_entry(prev, first);
            } else if code as usize == next {
                let first = self.entries[prev as usize].first;
                self.add_entry(prev, first);
                self.emit(code, &mut output);
            } else {
                return Err(Error::InvalidFormat(format!("Invalid LZW code: {}", code)));
            }

            if self.entries.len() >= max_code(width) as usize && width < MAX_BITS {
                width += 1;
            }

            previous = Some(code);
        }

        Ok(output)
    }

    /// Appends the string for `code` to `output`, returning its first byte
    fn emit(&self, code: u16, output: &mut Vec<u8>) -> u8 {
        let entry = self.entries[code as usize];
        let start = output.len();
        output.resize(start + entry.len, 0);

        let mut cursor = code;
        for slot in (start..start + entry.len).rev() {
            let current = self.entries[cursor as usize];
            output[slot] = current.byte;
            cursor = current.prefix;
        }

        entry.first
    }

    fn add_entry(&mut self, prefix: u16, byte: u8) {
        if self.entries.len() < (1 << MAX_BITS) {
            let parent = self.entries[prefix as usize];
            self.entries.push(Entry {
                prefix,
                byte,
                first: parent.first,
                len: parent.len + 1,
            });
        }
    }
}

/// Reads variable-length codes, most significant bit first
struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
    acc: u32,
    bits: u8,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0, acc: 0, bits: 0 }
    }

    fn read_bits(&mut self, count: u8) -> Option<u16> {
        while self.bits < count {
            let byte = *self.data.get(self.pos)?;
            self.acc = (self.acc << 8) | byte as u32;
            self.pos += 1;
            self.bits += 8;
        }

        self.bits -= count;
        let code = (self.acc >> self.bits) & ((1u32 << count) - 1);
        self.acc &= (1u32 << self.bits) - 1;
        Some(code as u16)
    }
}

/// Writes variable-length codes, most significant bit first
struct BitWriter {
    out: Vec<u8>,
    acc: u32,
    bits: u8,
}

impl BitWriter {
    fn new() -> Self {
        Self { out: Vec::new(), acc: 0, bits: 0 }
    }

    fn write(&mut self, code: u16, width: u8) {
        self.acc = (self.acc << width) | code as u32;
        self.bits += width;
        while self.bits >= 8 {
            self.bits -= 8;
            self.out.push((self.acc >> self.bits) as u8);
        }
        self.acc &= (1u32 << self.bits) - 1;
    }

    fn finish(mut self) -> Vec<u8> {
        if self.bits > 0 {
            self.out.push((self.acc << (8 - self.bits)) as u8);
        }
        self.out
    }
}
