//! Tokenizer and object parser
//!
//! Turns raw bytes into objects of the model, covering both direct and
//! indirect forms (ISO 32000-1 Sections 7.2 and 7.3). The lexer and parser
//! operate over an in-memory byte slice so the resolver can parse at
//! arbitrary cross-reference offsets.

pub mod lexer;
pub mod objects;

pub use lexer::{Lexer, Token};
pub use objects::{ObjectParser, ParsedIndirect};
