//! PackBits compression
//!
//! PackBits is a simple run-length encoding scheme used in TIFF files.

use crate::error::{Error, Result};

/// Decompresses PackBits compressed data
///
/// PackBits encoding:
/// - If header >= 0: copy next (header + 1) literal bytes
/// - If header < 0 and != -128: repeat next byte (1 - header) times
/// - If header == -128: no operation (skip)
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    let mut output = Vec::new();
    let mut pos = 0;

    while pos < data.len() {
        let header = data[pos] as i8;
        pos += 1;

        match header {
            -128 => continue,

            0..=127 => {
                let count = (header as usize) + 1;

                if pos + count > data.len() {
                    return Err(Error::InvalidFormat(
                        "PackBits: Insufficient literal bytes".to_string()
                    ));
                }

                output.extend_from_slice(&data[pos..pos + count]);
                pos += count;
            }

            -127..=-1 => {
                if pos >= data.len() {
                    return Err(Error::InvalidFormat(
                        "PackBits: Missing run byte".to_string()
                    ));
                }

                let count = (1 - header as isize) as usize;
                let byte = data[pos];
                pos += 1;

                output.resize(output.len() + count, byte);
            }
        }
    }

    Ok(output)
}

/// Compresses data with PackBits
///
/// Runs of two or more equal bytes become replicate packets; everything
/// else is grouped into literal packets of at most 128 bytes.
pub fn compress(data: &[u8]) -> Vec<u8> {
    let mut output = Vec::with_capacity(data.len() + data.len() / 128 + 1);
    let mut pos = 0;

    while pos < data.len() {
        let run = run_length(data, pos);

        if run >= 2 {
            output.push((1 - run as i16) as i8 as u8);
            output.push(data[pos]);
            pos += run;
            continue;
        }

        let start = pos;
        pos += 1;
        while pos < data.len() && pos - start < 128 && run_length(data, pos) < 2 {
            pos += 1;
        }

        output.push((pos - start - 1) as u8);
        output.extend_from_slice(&data[start..pos]);
    }

    output
}

fn run_length(data: &[u8], pos: usize) -> usize {
    let byte = data[pos];
    data[pos..].iter().take(128).take_while(|&&b| b == byte).count()
}
