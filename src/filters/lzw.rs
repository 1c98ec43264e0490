//! LZWDecode: variable-width MSB-first LZW via `weezl`.
//!
//! `EarlyChange` (default 1) bumps the code width one entry early, which is
//! `weezl`'s TIFF size-switch mode.

use crate::error::{PdfError, Result};
use weezl::{decode::Decoder, encode::Encoder, BitOrder};

pub fn decode(data: &[u8], early_change: bool) -> Result<Vec<u8>> {
    let mut decoder = if early_change {
        Decoder::with_tiff_size_switch(BitOrder::Msb, 8)
    } else {
        Decoder::new(BitOrder::Msb, 8)
    };
    decoder
        .decode(data)
        .map_err(|e| PdfError::StreamDecodeError(format!("lzw decode: {e}")))
}

pub fn encode(data: &[u8], early_change: bool) -> Result<Vec<u8>> {
    let mut encoder = if early_change {
        Encoder::with_tiff_size_switch(BitOrder::Msb, 8)
    } else {
        Encoder::new(BitOrder::Msb, 8)
    };
    encoder
        .encode(data)
        .map_err(|e| PdfError::StreamDecodeError(format!("lzw encode: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_early_change() {
        let data = b"TOBEORNOTTOBEORTOBEORNOT".repeat(20);
        let encoded = encode(&data, true).unwrap();
        assert_eq!(decode(&encoded, true).unwrap(), data);
    }

    #[test]
    fn test_roundtrip_no_early_change() {
        let data = (0u8..=255).collect::<Vec<u8>>();
        let encoded = encode(&data, false).unwrap();
        assert_eq!(decode(&encoded, false).unwrap(), data);
    }

    #[test]
    fn test_known_vector() {
        // 0x80 0x0B 0x60 0x50 0x22 0x0C 0x0C 0x85 0x01
        // is "-----A---B" from the LZW example in ISO 32000-1 7.4.4.2.
        let encoded = [0x80, 0x0B, 0x60, 0x50, 0x22, 0x0C, 0x0C, 0x85, 0x01];
        assert_eq!(decode(&encoded, true).unwrap(), b"-----A---B");
    }
}
