//! # pdfcraft
//!
//! A pure Rust PDF processing core: read, validate, transform and write
//! documents conforming to ISO 32000-1 (PDF 1.7).
//!
//! The crate covers the full read-validate-transform-write cycle:
//!
//! - **Object model**: the typed sum of PDF values with ordered
//!   dictionaries and indirect-reference identity
//! - **Parsing**: tokenizer and object grammar over raw bytes
//! - **Cross-references**: classic sections, xref streams, hybrids, and
//!   the free-list invariants
//! - **Filters**: Flate, LZW, ASCII armor, run-length, predictors, and
//!   opaque image codecs
//! - **Encryption**: standard security handler with RC4 and AES-128
//! - **Writing**: deterministic full rewrites and append-only
//!   incremental updates
//!
//! ## Reading a document
//!
//! ```rust,no_run
//! use pdfcraft::{Configuration, Document};
//!
//! # fn main() -> pdfcraft::Result<()> {
//! let mut doc = Document::open("input.pdf", Configuration::default())?;
//! println!("pages: {}", doc.page_count()?);
//! # Ok(())
//! # }
//! ```
//!
//! ## Transforming and writing
//!
//! ```rust,no_run
//! use pdfcraft::{CancelFlag, Configuration, Document};
//!
//! # fn main() -> pdfcraft::Result<()> {
//! let mut doc = Document::open("input.pdf", Configuration::default())?;
//! pdfcraft::pages::insert_blank_page(&mut doc, 1)?;
//! pdfcraft::writer::save_full(&mut doc, "output.pdf", &CancelFlag::new())?;
//! # Ok(())
//! # }
//! ```

pub mod commands;
pub mod config;
pub mod document;
pub mod encryption;
pub mod error;
pub mod filters;
pub mod name_tree;
pub mod objects;
pub mod optimizer;
pub mod pages;
pub mod parser;
pub mod reader;
pub mod validator;
pub mod writer;
pub mod xref;

pub use config::{CancelFlag, Configuration, ValidationMode, XRefOutput};
pub use document::Document;
pub use error::{PdfError, Result};
pub use objects::{Dictionary, Object, ObjectId, Stream, StringFormat};
pub use reader::PdfReader;
