//! PDF object grammar
//!
//! Builds model objects from tokens. Indirect objects are `N G obj …
//! endobj`; a dictionary followed by `stream` becomes a stream whose body
//! runs `Length` bytes from the byte after the EOL following the keyword.

use super::lexer::{Lexer, Token};
use crate::error::{PdfError, Result};
use crate::objects::{Dictionary, Object, ObjectId, Stream, StringFormat};
use tracing::warn;

/// An indirect object as parsed from the source.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedIndirect {
    pub id: ObjectId,
    pub object: Object,
}

/// Grammar layer over the lexer.
pub struct ObjectParser<'a> {
    lexer: Lexer<'a>,
    strict: bool,
}

impl<'a> ObjectParser<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            lexer: Lexer::new(data),
            strict: false,
        }
    }

    pub fn at(data: &'a [u8], pos: usize) -> Self {
        Self {
            lexer: Lexer::at(data, pos),
            strict: false,
        }
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn position(&self) -> usize {
        self.lexer.position()
    }

    fn corrupt(&self, reason: impl Into<String>) -> PdfError {
        PdfError::CorruptObject {
            offset: self.lexer.position(),
            reason: reason.into(),
        }
    }

    /// Parse one object of any direct form, or an indirect reference.
    pub fn parse_object(&mut self) -> Result<Object> {
        let token = self.lexer.next_token()?;
        self.parse_from_token(token)
    }

    fn parse_from_token(&mut self, token: Token) -> Result<Object> {
        match token {
            Token::Null => Ok(Object::Null),
            Token::Boolean(b) => Ok(Object::Boolean(b)),
            Token::Integer(i) => self.integer_or_reference(i),
            Token::Real(r) => Ok(Object::Real(r)),
            Token::LiteralString(s) => Ok(Object::String(s, StringFormat::Literal)),
            Token::HexString(s) => Ok(Object::String(s, StringFormat::Hexadecimal)),
            Token::Name(n) => Ok(Object::Name(n)),
            Token::ArrayStart => self.parse_array(),
            Token::DictStart => self.parse_dictionary_or_stream(),
            Token::Eof => Err(self.corrupt("unexpected end of input")),
            other => Err(self.corrupt(format!("unexpected token {other:?}"))),
        }
    }

    /// `N G R` needs three tokens of lookahead. When the lookahead does not
    /// complete a reference, the integer stands alone.
    fn integer_or_reference(&mut self, value: i64) -> Result<Object> {
        let saved = self.lexer.position();

        if value >= 1 && value <= u32::MAX as i64 {
            if let Ok(Token::Integer(gen)) = self.lexer.next_token() {
                if (0..=u16::MAX as i64).contains(&gen)
                    && matches!(self.lexer.next_token(), Ok(Token::RefMarker))
                {
                    return Ok(Object::Reference(ObjectId::new(value as u32, gen as u16)));
                }
            }
        }

        self.lexer.set_position(saved);
        Ok(Object::Integer(value))
    }

    fn parse_array(&mut self) -> Result<Object> {
        let mut elements = Vec::new();
        loop {
            let token = self.lexer.next_token()?;
            match token {
                Token::ArrayEnd => break,
                Token::Eof => return Err(self.corrupt("unterminated array")),
                other => elements.push(self.parse_from_token(other)?),
            }
        }
        Ok(Object::Array(elements))
    }

    fn parse_dictionary_or_stream(&mut self) -> Result<Object> {
        let dict = self.parse_dictionary_inner()?;

        let saved = self.lexer.position();
        match self.lexer.next_token() {
            Ok(Token::Stream) => self.parse_stream(dict),
            _ => {
                self.lexer.set_position(saved);
                Ok(Object::Dictionary(dict))
            }
        }
    }

    fn parse_dictionary_inner(&mut self) -> Result<Dictionary> {
        let mut dict = Dictionary::new();
        loop {
            let token = self.lexer.next_token()?;
            match token {
                Token::DictEnd => break,
                Token::Name(key) => {
                    let value = self.parse_object()?;
                    if dict.contains_key(&key) {
                        if self.strict {
                            return Err(self.corrupt(format!(
                                "duplicate dictionary key /{}",
                                String::from_utf8_lossy(&key)
                            )));
                        }
                        // First occurrence wins.
                        warn!(
                            key = %String::from_utf8_lossy(&key),
                            "duplicate dictionary key, keeping first occurrence"
                        );
                        continue;
                    }
                    dict.set(key, value);
                }
                Token::Eof => return Err(self.corrupt("unterminated dictionary")),
                other => {
                    return Err(self.corrupt(format!(
                        "expected name or >> in dictionary, found {other:?}"
                    )))
                }
            }
        }
        Ok(dict)
    }

    /// The `stream` keyword has been consumed; `dict` is its dictionary.
    ///
    /// When `Length` is a direct integer the body is read here. When it is
    /// an indirect reference the stream is left deferred, holding the body
    /// offset for the resolver to materialize after resolving `Length`.
    fn parse_stream(&mut self, dict: Dictionary) -> Result<Object> {
        let body_start = self.lexer.stream_body_start()?;

        match dict.get(b"Length") {
            Some(Object::Integer(len)) if *len >= 0 => {
                let data = self.lexer.read_bytes(*len as usize)?.to_vec();
                self.expect_endstream()?;
                Ok(Object::Stream(Stream::with_data(dict, data)))
            }
            Some(Object::Reference(_)) => Ok(Object::Stream(Stream::deferred(dict, body_start))),
            Some(other) => Err(self.corrupt(format!(
                "stream Length must be an integer, got {}",
                other.type_name()
            ))),
            None => Err(PdfError::MissingKey("Length".to_string())),
        }
    }

    fn expect_endstream(&mut self) -> Result<()> {
        self.lexer.skip_whitespace();
        match self.lexer.next_token()? {
            Token::EndStream => Ok(()),
            other => Err(self.corrupt(format!("expected endstream, found {other:?}"))),
        }
    }

    /// Parse `N G obj <object> endobj` at the current position.
    pub fn parse_indirect_object(&mut self) -> Result<ParsedIndirect> {
        let number = match self.lexer.next_token()? {
            Token::Integer(n) if n >= 1 && n <= u32::MAX as i64 => n as u32,
            other => return Err(self.corrupt(format!("expected object number, found {other:?}"))),
        };
        let generation = match self.lexer.next_token()? {
            Token::Integer(g) if (0..=u16::MAX as i64).contains(&g) => g as u16,
            other => return Err(self.corrupt(format!("expected generation, found {other:?}"))),
        };
        match self.lexer.next_token()? {
            Token::Obj => {}
            other => return Err(self.corrupt(format!("expected obj keyword, found {other:?}"))),
        }

        let object = self.parse_object()?;

        // A deferred stream leaves the cursor at an unknown place inside
        // the body; endobj can only be checked once it is materialized.
        let deferred = matches!(&object, Object::Stream(s) if !s.is_loaded());
        if !deferred {
            match self.lexer.next_token()? {
                Token::EndObj => {}
                other if self.strict => {
                    return Err(self.corrupt(format!("expected endobj, found {other:?}")))
                }
                other => {
                    warn!(object = number, "missing endobj, found {other:?}");
                }
            }
        }

        Ok(ParsedIndirect {
            id: ObjectId::new(number, generation),
            object,
        })
    }
}
