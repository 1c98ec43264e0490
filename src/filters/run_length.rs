//! RunLengthDecode: length byte 0..127 copies n+1 literal bytes, 129..255
//! repeats the next byte 257-n times, 128 is EOD.

use crate::error::{PdfError, Result};

pub fn decode(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len() * 2);
    let mut pos = 0usize;

    loop {
        let Some(&length) = data.get(pos) else {
            return Err(PdfError::StreamDecodeError(
                "run-length data ended without EOD".to_string(),
            ));
        };
        pos += 1;

        match length {
            128 => break,
            0..=127 => {
                let count = length as usize + 1;
                let literal = data.get(pos..pos + count).ok_or_else(|| {
                    PdfError::StreamDecodeError("truncated run-length literal".to_string())
                })?;
                out.extend_from_slice(literal);
                pos += count;
            }
            129..=255 => {
                let &byte = data.get(pos).ok_or_else(|| {
                    PdfError::StreamDecodeError("truncated run-length repeat".to_string())
                })?;
                pos += 1;
                out.extend(std::iter::repeat(byte).take(257 - length as usize));
            }
        }
    }
    Ok(out)
}

pub fn encode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / 128 + 2);
    let mut pos = 0usize;

    while pos < data.len() {
        // Measure the run starting here, capped at 128.
        let byte = data[pos];
        let mut run = 1usize;
        while run < 128 && data.get(pos + run) == Some(&byte) {
            run += 1;
        }

        if run >= 3 {
            out.push((257 - run) as u8);
            out.push(byte);
            pos += run;
            continue;
        }

        // Collect literals until the next run of 3 or the 128 cap.
        let start = pos;
        let mut len = 0usize;
        while len < 128 && pos < data.len() {
            let b = data[pos];
            let mut ahead = 1usize;
            while ahead < 3 && data.get(pos + ahead) == Some(&b) {
                ahead += 1;
            }
            if ahead >= 3 {
                break;
            }
            pos += 1;
            len += 1;
        }
        out.push((len - 1) as u8);
        out.extend_from_slice(&data[start..start + len]);
    }

    out.push(128);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_literal_and_run() {
        // 2 -> 3 literal bytes, 254 -> repeat next byte 3 times, EOD.
        let data = [2, b'a', b'b', b'c', 254, b'x', 128];
        assert_eq!(decode(&data).unwrap(), b"abcxxx");
    }

    #[test]
    fn test_decode_missing_eod() {
        assert!(decode(&[1, b'a', b'b']).is_err());
        assert!(decode(&[]).is_err());
    }

    #[test]
    fn test_decode_truncated_literal() {
        assert!(decode(&[5, b'a']).is_err());
    }

    #[test]
    fn test_roundtrip() {
        for data in [
            b"".to_vec(),
            b"abc".to_vec(),
            b"aaaaaaaaaa".to_vec(),
            b"abababab".to_vec(),
            vec![7u8; 500],
            (0u8..=255).collect::<Vec<u8>>(),
            b"mixed aaaa bbbb literal zzzzzzzzzzzzzzzz tail".to_vec(),
        ] {
            assert_eq!(decode(&encode(&data)).unwrap(), data, "data {data:?}");
        }
    }

    #[test]
    fn test_long_run_split() {
        let data = vec![b'q'; 300];
        let encoded = encode(&data);
        assert_eq!(decode(&encoded).unwrap(), data);
        // Runs are capped at 128 per packet.
        assert!(encoded.len() >= 7);
    }
}
