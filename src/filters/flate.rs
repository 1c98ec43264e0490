//! FlateDecode: zlib streams (RFC 1950) via `flate2`.

use crate::error::{PdfError, Result};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};

pub fn decode(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| PdfError::StreamDecodeError(format!("flate decode: {e}")))?;
    Ok(out)
}

pub fn encode(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| PdfError::StreamDecodeError(format!("flate encode: {e}")))?;
    encoder
        .finish()
        .map_err(|e| PdfError::StreamDecodeError(format!("flate encode: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let data = b"hello world hello world hello world".to_vec();
        let encoded = encode(&data).unwrap();
        assert!(!encoded.is_empty());
        assert_ne!(encoded, data);
        assert_eq!(decode(&encoded).unwrap(), data);
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(decode(b"definitely not zlib").is_err());
    }

    #[test]
    fn test_empty_roundtrip() {
        let encoded = encode(b"").unwrap();
        assert!(!encoded.is_empty());
        assert_eq!(decode(&encoded).unwrap(), Vec::<u8>::new());
    }
}
