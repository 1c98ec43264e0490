//! Stream filter pipeline
//!
//! A stream carries an ordered list of filter specs (name plus optional
//! parameter dictionary). Encoding applies them in declared order; decoding
//! applies them in reverse. Each decode stage stops at its own EOD marker.

mod ascii;
mod dct;
mod flate;
mod lzw;
mod predictor;
mod run_length;

pub use predictor::PredictorParams;

use crate::error::{PdfError, Result};
use crate::objects::{Dictionary, Object, Stream};

/// Supported filters, by canonical name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    Identity,
    ASCIIHexDecode,
    ASCII85Decode,
    RunLengthDecode,
    LZWDecode,
    FlateDecode,
    DCTDecode,
    CCITTFaxDecode,
    JBIG2Decode,
    JPXDecode,
    Crypt,
}

impl Filter {
    pub fn from_name(name: &[u8]) -> Option<Self> {
        match name {
            b"Identity" => Some(Filter::Identity),
            b"ASCIIHexDecode" => Some(Filter::ASCIIHexDecode),
            b"ASCII85Decode" => Some(Filter::ASCII85Decode),
            b"RunLengthDecode" => Some(Filter::RunLengthDecode),
            b"LZWDecode" => Some(Filter::LZWDecode),
            b"FlateDecode" => Some(Filter::FlateDecode),
            b"DCTDecode" => Some(Filter::DCTDecode),
            b"CCITTFaxDecode" => Some(Filter::CCITTFaxDecode),
            b"JBIG2Decode" => Some(Filter::JBIG2Decode),
            b"JPXDecode" => Some(Filter::JPXDecode),
            b"Crypt" => Some(Filter::Crypt),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Filter::Identity => "Identity",
            Filter::ASCIIHexDecode => "ASCIIHexDecode",
            Filter::ASCII85Decode => "ASCII85Decode",
            Filter::RunLengthDecode => "RunLengthDecode",
            Filter::LZWDecode => "LZWDecode",
            Filter::FlateDecode => "FlateDecode",
            Filter::DCTDecode => "DCTDecode",
            Filter::CCITTFaxDecode => "CCITTFaxDecode",
            Filter::JBIG2Decode => "JBIG2Decode",
            Filter::JPXDecode => "JPXDecode",
            Filter::Crypt => "Crypt",
        }
    }

    /// Filters whose encoded bytes are handed through opaquely.
    pub fn is_passthrough(&self) -> bool {
        matches!(
            self,
            Filter::Identity
                | Filter::CCITTFaxDecode
                | Filter::JBIG2Decode
                | Filter::JPXDecode
                | Filter::Crypt
        )
    }
}

/// One stage of a stream's pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterSpec {
    pub filter: Filter,
    pub params: Option<Dictionary>,
}

/// Extract the declared pipeline from a stream dictionary
/// (`Filter` + `DecodeParms`, single values or parallel arrays).
pub fn pipeline_from_dict(dict: &Dictionary) -> Result<Vec<FilterSpec>> {
    let names: Vec<Vec<u8>> = match dict.get(b"Filter") {
        None => return Ok(Vec::new()),
        Some(Object::Name(n)) => vec![n.clone()],
        Some(Object::Array(items)) => {
            let mut names = Vec::with_capacity(items.len());
            for item in items {
                names.push(item.expect_name()?.to_vec());
            }
            names
        }
        Some(other) => {
            return Err(PdfError::TypeMismatch {
                expected: "Name or Array",
                got: other.type_name(),
            })
        }
    };

    let params: Vec<Option<Dictionary>> = match dict.get(b"DecodeParms") {
        None => vec![None; names.len()],
        Some(Object::Dictionary(d)) => vec![Some(d.clone())],
        Some(Object::Null) => vec![None; names.len()],
        Some(Object::Array(items)) => items
            .iter()
            .map(|item| match item {
                Object::Dictionary(d) => Some(d.clone()),
                _ => None,
            })
            .collect(),
        Some(other) => {
            return Err(PdfError::TypeMismatch {
                expected: "Dictionary or Array",
                got: other.type_name(),
            })
        }
    };

    names
        .into_iter()
        .enumerate()
        .map(|(i, name)| {
            let filter = Filter::from_name(&name).ok_or_else(|| {
                PdfError::UnsupportedFilter(String::from_utf8_lossy(&name).into_owned())
            })?;
            Ok(FilterSpec {
                filter,
                params: params.get(i).cloned().flatten(),
            })
        })
        .collect()
}

/// Decode encoded bytes through the pipeline, reversing declared order.
pub fn decode(data: &[u8], pipeline: &[FilterSpec]) -> Result<Vec<u8>> {
    let mut out = data.to_vec();
    for spec in pipeline.iter().rev() {
        out = decode_stage(&out, spec)?;
    }
    Ok(out)
}

/// Encode decoded bytes through the pipeline in declared order.
pub fn encode(data: &[u8], pipeline: &[FilterSpec]) -> Result<Vec<u8>> {
    let mut out = data.to_vec();
    for spec in pipeline {
        out = encode_stage(&out, spec)?;
    }
    Ok(out)
}

/// Decode a stream's already-materialized encoded bytes.
pub fn decode_stream(stream: &Stream) -> Result<Vec<u8>> {
    let data = stream
        .encoded_data()
        .ok_or_else(|| PdfError::StreamDecodeError("stream body not loaded".to_string()))?;
    let pipeline = pipeline_from_dict(&stream.dict)?;
    decode(data, &pipeline)
}

fn decode_stage(data: &[u8], spec: &FilterSpec) -> Result<Vec<u8>> {
    match spec.filter {
        Filter::ASCIIHexDecode => ascii::hex_decode(data),
        Filter::ASCII85Decode => ascii::a85_decode(data),
        Filter::RunLengthDecode => run_length::decode(data),
        Filter::LZWDecode => {
            let params = PredictorParams::from_dict(spec.params.as_ref());
            let out = lzw::decode(data, params.early_change)?;
            predictor::decode(&out, &params)
        }
        Filter::FlateDecode => {
            let params = PredictorParams::from_dict(spec.params.as_ref());
            let out = flate::decode(data)?;
            predictor::decode(&out, &params)
        }
        // Opaque image codecs: the encoded bytes are the payload, but a
        // DCT stream must never be read past the JPEG EOI marker.
        Filter::DCTDecode => dct::clamp_to_eoi(data),
        _ if spec.filter.is_passthrough() => Ok(data.to_vec()),
        _ => unreachable!(),
    }
}

fn encode_stage(data: &[u8], spec: &FilterSpec) -> Result<Vec<u8>> {
    match spec.filter {
        Filter::ASCIIHexDecode => Ok(ascii::hex_encode(data)),
        Filter::ASCII85Decode => Ok(ascii::a85_encode(data)),
        Filter::RunLengthDecode => Ok(run_length::encode(data)),
        Filter::LZWDecode => {
            let params = PredictorParams::from_dict(spec.params.as_ref());
            let pre = predictor::encode(data, &params)?;
            lzw::encode(&pre, params.early_change)
        }
        Filter::FlateDecode => {
            let params = PredictorParams::from_dict(spec.params.as_ref());
            let pre = predictor::encode(data, &params)?;
            flate::encode(&pre)
        }
        Filter::DCTDecode => Ok(data.to_vec()),
        _ if spec.filter.is_passthrough() => Ok(data.to_vec()),
        _ => unreachable!(),
    }
}
