use super::{Dictionary, ObjectId, Stream};
use crate::error::{PdfError, Result};

/// Source form of a PDF string, preserved so the writer can reproduce it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringFormat {
    /// `(...)` with backslash escapes.
    Literal,
    /// `<...>` hex digits.
    Hexadecimal,
}

/// A PDF value.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    /// Name atom; bytes are stored after `#hh` decoding.
    Name(Vec<u8>),
    String(Vec<u8>, StringFormat),
    Array(Vec<Object>),
    Dictionary(Dictionary),
    Stream(Stream),
    Reference(ObjectId),
}

impl Object {
    pub fn name(name: impl AsRef<[u8]>) -> Self {
        Object::Name(name.as_ref().to_vec())
    }

    pub fn string_literal(bytes: impl AsRef<[u8]>) -> Self {
        Object::String(bytes.as_ref().to_vec(), StringFormat::Literal)
    }

    pub fn reference(number: u32, generation: u16) -> Self {
        Object::Reference(ObjectId::new(number, generation))
    }

    /// Variant name used in `TypeMismatch` errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Object::Null => "Null",
            Object::Boolean(_) => "Boolean",
            Object::Integer(_) => "Integer",
            Object::Real(_) => "Real",
            Object::Name(_) => "Name",
            Object::String(..) => "String",
            Object::Array(_) => "Array",
            Object::Dictionary(_) => "Dictionary",
            Object::Stream(_) => "Stream",
            Object::Reference(_) => "Reference",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Object::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Object::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Object::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_real(&self) -> Option<f64> {
        match self {
            Object::Real(r) => Some(*r),
            Object::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_name(&self) -> Option<&[u8]> {
        match self {
            Object::Name(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&[u8]> {
        match self {
            Object::String(s, _) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<Object>> {
        match self {
            Object::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_array_mut(&mut self) -> Option<&mut Vec<Object>> {
        match self {
            Object::Array(a) => Some(a),
            _ => None,
        }
    }

    /// A stream's dictionary is exposed as a dictionary too.
    pub fn as_dict(&self) -> Option<&Dictionary> {
        match self {
            Object::Dictionary(d) => Some(d),
            Object::Stream(s) => Some(&s.dict),
            _ => None,
        }
    }

    pub fn as_dict_mut(&mut self) -> Option<&mut Dictionary> {
        match self {
            Object::Dictionary(d) => Some(d),
            Object::Stream(s) => Some(&mut s.dict),
            _ => None,
        }
    }

    pub fn as_stream(&self) -> Option<&Stream> {
        match self {
            Object::Stream(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_stream_mut(&mut self) -> Option<&mut Stream> {
        match self {
            Object::Stream(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<ObjectId> {
        match self {
            Object::Reference(id) => Some(*id),
            _ => None,
        }
    }

    pub fn expect_integer(&self) -> Result<i64> {
        self.as_integer().ok_or(PdfError::TypeMismatch {
            expected: "Integer",
            got: self.type_name(),
        })
    }

    pub fn expect_name(&self) -> Result<&[u8]> {
        self.as_name().ok_or(PdfError::TypeMismatch {
            expected: "Name",
            got: self.type_name(),
        })
    }

    pub fn expect_dict(&self) -> Result<&Dictionary> {
        self.as_dict().ok_or(PdfError::TypeMismatch {
            expected: "Dictionary",
            got: self.type_name(),
        })
    }

    pub fn expect_array(&self) -> Result<&Vec<Object>> {
        self.as_array().ok_or(PdfError::TypeMismatch {
            expected: "Array",
            got: self.type_name(),
        })
    }

    pub fn expect_stream(&self) -> Result<&Stream> {
        self.as_stream().ok_or(PdfError::TypeMismatch {
            expected: "Stream",
            got: self.type_name(),
        })
    }

    pub fn expect_string(&self) -> Result<&[u8]> {
        self.as_string().ok_or(PdfError::TypeMismatch {
            expected: "String",
            got: self.type_name(),
        })
    }

    /// Decode a text string: UTF-16BE when prefixed by `FE FF`, otherwise
    /// PDFDocEncoding (approximated by Latin-1 for the printable range).
    pub fn as_text(&self) -> Option<String> {
        let bytes = self.as_string()?;
        if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
            let units: Vec<u16> = bytes[2..]
                .chunks_exact(2)
                .map(|c| u16::from_be_bytes([c[0], c[1]]))
                .collect();
            Some(String::from_utf16_lossy(&units))
        } else {
            Some(bytes.iter().map(|&b| b as char).collect())
        }
    }
}

impl From<bool> for Object {
    fn from(value: bool) -> Self {
        Object::Boolean(value)
    }
}

impl From<i64> for Object {
    fn from(value: i64) -> Self {
        Object::Integer(value)
    }
}

impl From<i32> for Object {
    fn from(value: i32) -> Self {
        Object::Integer(value as i64)
    }
}

impl From<f64> for Object {
    fn from(value: f64) -> Self {
        Object::Real(value)
    }
}

impl From<ObjectId> for Object {
    fn from(value: ObjectId) -> Self {
        Object::Reference(value)
    }
}

impl From<Dictionary> for Object {
    fn from(value: Dictionary) -> Self {
        Object::Dictionary(value)
    }
}

impl From<Stream> for Object {
    fn from(value: Stream) -> Self {
        Object::Stream(value)
    }
}

impl From<Vec<Object>> for Object {
    fn from(value: Vec<Object>) -> Self {
        Object::Array(value)
    }
}
