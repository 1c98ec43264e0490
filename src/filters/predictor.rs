//! Predictor post-processing for LZW and Flate streams.
//!
//! Predictor 1 is none, 2 is TIFF horizontal differencing, 10-15 are the
//! PNG row filters (each row prefixed by a filter byte naming the actual
//! algorithm used for that row).

use crate::error::{PdfError, Result};
use crate::objects::Dictionary;

/// Parameters shared by LZW and Flate: Predictor, Colors,
/// BitsPerComponent, Columns, EarlyChange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PredictorParams {
    pub predictor: u8,
    pub colors: usize,
    pub bits_per_component: usize,
    pub columns: usize,
    pub early_change: bool,
}

impl Default for PredictorParams {
    fn default() -> Self {
        Self {
            predictor: 1,
            colors: 1,
            bits_per_component: 8,
            columns: 1,
            early_change: true,
        }
    }
}

impl PredictorParams {
    pub fn from_dict(dict: Option<&Dictionary>) -> Self {
        let defaults = Self::default();
        let Some(dict) = dict else {
            return defaults;
        };
        Self {
            predictor: dict.get_integer(b"Predictor").unwrap_or(1) as u8,
            colors: dict.get_integer(b"Colors").unwrap_or(1).max(1) as usize,
            bits_per_component: dict.get_integer(b"BitsPerComponent").unwrap_or(8).max(1) as usize,
            columns: dict.get_integer(b"Columns").unwrap_or(1).max(1) as usize,
            early_change: dict.get_integer(b"EarlyChange").unwrap_or(1) != 0,
        }
    }

    /// Bytes spanned by one pixel, rounded up to at least one.
    fn bytes_per_pixel(&self) -> usize {
        (self.colors * self.bits_per_component).div_ceil(8).max(1)
    }

    /// Bytes in one row of predicted data.
    fn row_length(&self) -> usize {
        (self.columns * self.colors * self.bits_per_component).div_ceil(8)
    }
}

pub fn decode(data: &[u8], params: &PredictorParams) -> Result<Vec<u8>> {
    match params.predictor {
        1 => Ok(data.to_vec()),
        2 => tiff_decode(data, params),
        10..=15 => png_decode(data, params),
        other => Err(PdfError::StreamDecodeError(format!(
            "unknown predictor {other}"
        ))),
    }
}

pub fn encode(data: &[u8], params: &PredictorParams) -> Result<Vec<u8>> {
    match params.predictor {
        1 => Ok(data.to_vec()),
        2 => tiff_encode(data, params),
        10..=15 => png_encode(data, params),
        other => Err(PdfError::StreamDecodeError(format!(
            "unknown predictor {other}"
        ))),
    }
}

fn require_8bit(params: &PredictorParams) -> Result<()> {
    if params.bits_per_component != 8 {
        return Err(PdfError::StreamDecodeError(format!(
            "predictor supports 8 bits per component, got {}",
            params.bits_per_component
        )));
    }
    Ok(())
}

fn tiff_decode(data: &[u8], params: &PredictorParams) -> Result<Vec<u8>> {
    require_8bit(params)?;
    let row_len = params.row_length();
    let stride = params.colors;
    let mut out = data.to_vec();
    for row in out.chunks_mut(row_len) {
        for i in stride..row.len() {
            row[i] = row[i].wrapping_add(row[i - stride]);
        }
    }
    Ok(out)
}

fn tiff_encode(data: &[u8], params: &PredictorParams) -> Result<Vec<u8>> {
    require_8bit(params)?;
    let row_len = params.row_length();
    let stride = params.colors;
    let mut out = data.to_vec();
    for row in out.chunks_mut(row_len) {
        for i in (stride..row.len()).rev() {
            row[i] = row[i].wrapping_sub(row[i - stride]);
        }
    }
    Ok(out)
}

fn png_decode(data: &[u8], params: &PredictorParams) -> Result<Vec<u8>> {
    let row_len = params.row_length();
    let bpp = params.bytes_per_pixel();
    if data.len() % (row_len + 1) != 0 {
        return Err(PdfError::StreamDecodeError(format!(
            "predicted data length {} is not a multiple of row length {}",
            data.len(),
            row_len + 1
        )));
    }

    let mut out = Vec::with_capacity(data.len());
    let mut prev_row = vec![0u8; row_len];

    for chunk in data.chunks(row_len + 1) {
        let filter = chunk[0];
        let mut row = chunk[1..].to_vec();
        for i in 0..row.len() {
            let left = if i >= bpp { row[i - bpp] } else { 0 };
            let up = prev_row[i];
            let up_left = if i >= bpp { prev_row[i - bpp] } else { 0 };
            row[i] = match filter {
                0 => row[i],
                1 => row[i].wrapping_add(left),
                2 => row[i].wrapping_add(up),
                3 => row[i].wrapping_add(((left as u16 + up as u16) / 2) as u8),
                4 => row[i].wrapping_add(paeth(left, up, up_left)),
                other => {
                    return Err(PdfError::StreamDecodeError(format!(
                        "invalid PNG row filter {other}"
                    )))
                }
            };
        }
        out.extend_from_slice(&row);
        prev_row = row;
    }
    Ok(out)
}

fn png_encode(data: &[u8], params: &PredictorParams) -> Result<Vec<u8>> {
    let row_len = params.row_length();
    let bpp = params.bytes_per_pixel();
    if row_len == 0 || data.len() % row_len != 0 {
        return Err(PdfError::StreamDecodeError(format!(
            "data length {} is not a multiple of row length {row_len}",
            data.len()
        )));
    }

    // Predictor value 10 forces None per row; 11 Sub, 12 Up, 13 Average,
    // 14 Paeth; 15 (optimum) picks Up, which is what xref streams use.
    let filter: u8 = match params.predictor {
        10 => 0,
        11 => 1,
        12 | 15 => 2,
        13 => 3,
        14 => 4,
        _ => unreachable!(),
    };

    let mut out = Vec::with_capacity(data.len() + data.len() / row_len);
    let mut prev_row = vec![0u8; row_len];

    for row in data.chunks(row_len) {
        out.push(filter);
        for i in 0..row.len() {
            let left = if i >= bpp { row[i - bpp] } else { 0 };
            let up = prev_row[i];
            let up_left = if i >= bpp { prev_row[i - bpp] } else { 0 };
            let encoded = match filter {
                0 => row[i],
                1 => row[i].wrapping_sub(left),
                2 => row[i].wrapping_sub(up),
                3 => row[i].wrapping_sub(((left as u16 + up as u16) / 2) as u8),
                4 => row[i].wrapping_sub(paeth(left, up, up_left)),
                _ => unreachable!(),
            };
            out.push(encoded);
        }
        prev_row = row.to_vec();
    }
    Ok(out)
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = a as i16 + b as i16 - c as i16;
    let pa = (p - a as i16).abs();
    let pb = (p - b as i16).abs();
    let pc = (p - c as i16).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}
