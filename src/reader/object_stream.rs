//! Object streams (type-2 xref entries)
//!
//! An object stream's decoded content starts with `N` pairs of
//! `obj_num byte_offset` followed by the concatenated objects; offsets are
//! relative to `First`. Streams inside object streams are forbidden.

use crate::error::{PdfError, Result};
use crate::objects::{Dictionary, Object};
use crate::parser::{Lexer, ObjectParser, Token};

/// A parsed object-stream header over its decoded content.
pub struct ObjectStream {
    /// `(object number, absolute offset in decoded data)` per slot.
    pairs: Vec<(u32, usize)>,
    data: Vec<u8>,
}

impl ObjectStream {
    pub fn parse(dict: &Dictionary, decoded: Vec<u8>) -> Result<Self> {
        let count = dict
            .get_integer(b"N")
            .ok_or_else(|| PdfError::ObjectStreamCorrupt("missing N".to_string()))?;
        let first = dict
            .get_integer(b"First")
            .ok_or_else(|| PdfError::ObjectStreamCorrupt("missing First".to_string()))?;
        if count < 0 || first < 0 || first as usize > decoded.len() {
            return Err(PdfError::ObjectStreamCorrupt(
                "invalid N or First".to_string(),
            ));
        }

        let mut lexer = Lexer::new(&decoded);
        let mut pairs = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let obj_num = match lexer.next_token()? {
                Token::Integer(n) if n >= 1 => n as u32,
                other => {
                    return Err(PdfError::ObjectStreamCorrupt(format!(
                        "bad object number in header: {other:?}"
                    )))
                }
            };
            let offset = match lexer.next_token()? {
                Token::Integer(o) if o >= 0 => first as usize + o as usize,
                other => {
                    return Err(PdfError::ObjectStreamCorrupt(format!(
                        "bad offset in header: {other:?}"
                    )))
                }
            };
            if offset > decoded.len() {
                return Err(PdfError::ObjectStreamCorrupt(format!(
                    "offset {offset} past end of stream"
                )));
            }
            pairs.push((obj_num, offset));
        }

        Ok(Self {
            pairs,
            data: decoded,
        })
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Parse the object at `index`, returning its number and value.
    pub fn get(&self, index: u32) -> Result<(u32, Object)> {
        let &(obj_num, offset) = self.pairs.get(index as usize).ok_or_else(|| {
            PdfError::ObjectStreamCorrupt(format!("index {index} out of range"))
        })?;

        let object = ObjectParser::at(&self.data, offset).parse_object()?;
        if matches!(object, Object::Stream(_)) {
            return Err(PdfError::ObjectStreamCorrupt(
                "stream inside object stream".to_string(),
            ));
        }
        Ok((obj_num, object))
    }
}
