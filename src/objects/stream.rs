use super::{Dictionary, Object};

/// A PDF stream: a dictionary plus its content bytes.
///
/// Content exists in up to three states. `data_offset` points into the
/// source when the body has not been read yet (the `Length` entry was an
/// indirect reference at parse time). `encoded` holds exactly `Length`
/// raw bytes once materialized; the raw form is retained so writes can
/// avoid re-encoding unchanged content. `decoded` is populated on demand
/// by the filter pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Stream {
    pub dict: Dictionary,
    encoded: Option<Vec<u8>>,
    decoded: Option<Vec<u8>>,
    data_offset: Option<usize>,
}

impl Stream {
    /// A stream whose encoded bytes are already in hand. `Length` is set
    /// to match.
    pub fn with_data(mut dict: Dictionary, data: Vec<u8>) -> Self {
        dict.set("Length", data.len() as i64);
        Self {
            dict,
            encoded: Some(data),
            decoded: None,
            data_offset: None,
        }
    }

    /// A stream whose body is still in the source at `data_offset`; used
    /// when `Length` needs resolution before the bytes can be read.
    pub fn deferred(dict: Dictionary, data_offset: usize) -> Self {
        Self {
            dict,
            encoded: None,
            decoded: None,
            data_offset: Some(data_offset),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.encoded.is_some()
    }

    pub fn data_offset(&self) -> Option<usize> {
        self.data_offset
    }

    /// Raw (encoded) bytes, if materialized.
    pub fn encoded_data(&self) -> Option<&[u8]> {
        self.encoded.as_deref()
    }

    /// Install the materialized encoded bytes (resolver use).
    pub fn set_encoded_data(&mut self, data: Vec<u8>) {
        self.dict.set("Length", data.len() as i64);
        self.encoded = Some(data);
        self.data_offset = None;
    }

    pub fn decoded_data(&self) -> Option<&[u8]> {
        self.decoded.as_deref()
    }

    pub fn set_decoded_data(&mut self, data: Vec<u8>) {
        self.decoded = Some(data);
    }

    /// Replace the content with new decoded bytes; the encoded form is
    /// dropped so the writer re-encodes through the declared pipeline.
    pub fn replace_content(&mut self, decoded: Vec<u8>) {
        self.encoded = None;
        self.data_offset = None;
        self.dict.set("Length", decoded.len() as i64);
        self.decoded = Some(decoded);
    }

    /// Declared length, when present and direct.
    pub fn declared_length(&self) -> Option<i64> {
        self.dict.get_integer(b"Length")
    }

    /// The `Length` entry before resolution (may be a reference).
    pub fn length_object(&self) -> Option<&Object> {
        self.dict.get(b"Length")
    }
}
