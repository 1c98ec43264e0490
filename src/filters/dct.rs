//! Marker-level JPEG reader for DCTDecode streams.
//!
//! DCT content passes through opaquely, but the reader must not run past
//! the JPEG EOI marker (`FF D9`) even when the declared stream length is
//! larger, so a limited marker walker clamps the payload.

use crate::error::{PdfError, Result};

const SOI: u8 = 0xD8;
const EOI: u8 = 0xD9;
const SOS: u8 = 0xDA;

/// Return the JPEG payload clamped at EOI. Input that does not start with
/// SOI is not JPEG-framed and is returned unchanged.
pub fn clamp_to_eoi(data: &[u8]) -> Result<Vec<u8>> {
    if data.len() < 2 || data[0] != 0xFF || data[1] != SOI {
        return Ok(data.to_vec());
    }

    let mut pos = 2usize;
    loop {
        // Seek the next marker, tolerating fill bytes.
        while pos < data.len() && data[pos] != 0xFF {
            pos += 1;
        }
        while pos < data.len() && data[pos] == 0xFF {
            pos += 1;
        }
        let Some(&marker) = data.get(pos) else {
            // No EOI seen; the declared length was the real boundary.
            return Ok(data.to_vec());
        };
        pos += 1;

        match marker {
            EOI => return Ok(data[..pos].to_vec()),
            // Standalone markers carry no length word.
            0x01 | 0xD0..=0xD7 => {}
            SOS => {
                pos = skip_segment(data, pos)?;
                // Entropy-coded data: scan for a marker that is not a
                // restart and not a stuffed FF 00.
                loop {
                    while pos + 1 < data.len() && data[pos] != 0xFF {
                        pos += 1;
                    }
                    if pos + 1 >= data.len() {
                        return Ok(data.to_vec());
                    }
                    let next = data[pos + 1];
                    if next == 0x00 || next == 0xFF || (0xD0..=0xD7).contains(&next) {
                        pos += 2;
                        continue;
                    }
                    break;
                }
            }
            _ => pos = skip_segment(data, pos)?,
        }
    }
}

fn skip_segment(data: &[u8], pos: usize) -> Result<usize> {
    let length = data
        .get(pos..pos + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]) as usize)
        .ok_or_else(|| PdfError::StreamDecodeError("truncated JPEG segment".to_string()))?;
    if length < 2 {
        return Err(PdfError::StreamDecodeError(
            "JPEG segment length below 2".to_string(),
        ));
    }
    Ok(pos + length)
}
