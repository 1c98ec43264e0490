//! Reader and on-demand resolver
//!
//! Bootstraps a context from the file tail: locates `startxref`, walks the
//! cross-reference chain (classic sections, xref streams and PDF 1.5
//! hybrids), initializes encryption, then dereferences objects lazily with
//! a write-through cache.

mod object_stream;

pub use object_stream::ObjectStream;

use crate::config::Configuration;
use crate::encryption::EncryptionState;
use crate::error::{PdfError, Result};
use crate::filters;
use crate::objects::{Dictionary, Object, ObjectId};
use crate::parser::{Lexer, ObjectParser, Token};
use crate::xref::{XrefEntry, XrefTable};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use tracing::{debug, warn};

/// How many trailing bytes are scanned for the last `startxref`.
const TAIL_WINDOW: usize = 1024;

/// A `%PDF-M.m` version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
}

impl Version {
    pub fn parse(text: &[u8]) -> Option<Self> {
        let text = std::str::from_utf8(text).ok()?;
        let (major, minor) = text.split_once('.')?;
        Some(Self {
            major: major.parse().ok()?,
            minor: minor.parse().ok()?,
        })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Read statistics gathered at bootstrap.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadStats {
    pub file_size: u64,
    pub in_use: u32,
    pub free: u32,
    pub compressed: u32,
}

/// The document context built from a byte source.
pub struct PdfReader {
    data: Vec<u8>,
    pub xref: XrefTable,
    pub trailer: Dictionary,
    header_version: Version,
    catalog_version: Option<Version>,
    encryption: Option<EncryptionState>,
    encrypt_ref: Option<ObjectId>,
    /// Linearization dictionary, when the file declares one.
    pub linearization: Option<Dictionary>,
    /// Offset named by the newest `startxref`; incremental updates chain
    /// their `Prev` to it.
    last_startxref: u64,
    cache: HashMap<u32, Object>,
    config: Configuration,
}

impl PdfReader {
    pub fn open(path: impl AsRef<Path>, config: Configuration) -> Result<Self> {
        let data = std::fs::read(path)?;
        Self::from_bytes(data, config)
    }

    pub fn from_bytes(data: Vec<u8>, config: Configuration) -> Result<Self> {
        let header_version = parse_header(&data)?;

        let mut reader = Self {
            data,
            xref: XrefTable::new(),
            trailer: Dictionary::new(),
            header_version,
            catalog_version: None,
            encryption: None,
            encrypt_ref: None,
            linearization: None,
            last_startxref: 0,
            cache: HashMap::new(),
            config,
        };

        reader.load_xref_chain()?;
        reader.xref.ensure_valid_free_list();
        reader.init_encryption()?;
        reader.detect_linearization();
        reader.read_catalog_version();
        Ok(reader)
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// The raw source bytes (incremental updates append to these).
    pub fn source_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Offset of the newest xref, as named by the tail `startxref`.
    pub fn last_startxref(&self) -> u64 {
        self.last_startxref
    }

    pub fn is_encrypted(&self) -> bool {
        self.encryption.is_some()
    }

    pub fn encryption(&self) -> Option<&EncryptionState> {
        self.encryption.as_ref()
    }

    pub fn encrypt_ref(&self) -> Option<ObjectId> {
        self.encrypt_ref
    }

    /// Attach crypt state for a document being (re)encrypted on write.
    pub fn install_encryption(&mut self, state: EncryptionState, encrypt_ref: Option<ObjectId>) {
        self.encryption = Some(state);
        self.encrypt_ref = encrypt_ref;
    }

    /// Drop crypt state so subsequent writes emit plaintext.
    pub fn clear_encryption(&mut self) {
        self.encryption = None;
        self.encrypt_ref = None;
    }

    pub fn header_version(&self) -> Version {
        self.header_version
    }

    /// The greater of the header version and the catalog `/Version`.
    pub fn effective_version(&self) -> Version {
        match self.catalog_version {
            Some(v) if v > self.header_version => v,
            _ => self.header_version,
        }
    }

    pub fn stats(&self) -> ReadStats {
        let mut stats = ReadStats {
            file_size: self.data.len() as u64,
            ..Default::default()
        };
        for (_, entry) in self.xref.iter() {
            match entry {
                XrefEntry::Free { .. } => stats.free += 1,
                XrefEntry::InUse { .. } => stats.in_use += 1,
                XrefEntry::Compressed { .. } => stats.compressed += 1,
            }
        }
        stats
    }

    /// The catalog reference from the trailer.
    pub fn root_ref(&self) -> Result<ObjectId> {
        self.trailer
            .get(b"Root")
            .and_then(Object::as_reference)
            .ok_or_else(|| PdfError::MissingKey("Root".to_string()))
    }

    /// Dereference one hop: direct objects pass through, references load.
    pub fn resolve(&mut self, object: &Object) -> Result<Object> {
        match object {
            Object::Reference(id) => self.get_object(*id),
            other => Ok(other.clone()),
        }
    }

    /// Dereference an indirect reference, materializing on first access.
    ///
    /// A reference whose target slot is free or absent yields Null.
    /// Resolution failures are not cached; a later call may retry.
    pub fn get_object(&mut self, id: ObjectId) -> Result<Object> {
        if self.is_stale_generation(id) {
            debug!(object = id.number(), "stale generation dereferences to null");
            return Ok(Object::Null);
        }
        if let Some(cached) = self.cache.get(&id.number()) {
            return Ok(cached.clone());
        }
        let object = self
            .load_object(id)
            .map_err(|e| e.while_resolving(id.number(), id.generation()))?;
        self.cache.insert(id.number(), object.clone());
        Ok(object)
    }

    fn is_stale_generation(&self, id: ObjectId) -> bool {
        match self.xref.get(id.number()) {
            Some(XrefEntry::InUse { generation, .. }) => *generation != id.generation(),
            Some(XrefEntry::Compressed { .. }) => id.generation() != 0,
            _ => false,
        }
    }

    fn load_object(&mut self, id: ObjectId) -> Result<Object> {
        let entry = match self.xref.get(id.number()) {
            Some(entry) => *entry,
            None => return Ok(Object::Null),
        };

        match entry {
            XrefEntry::Free { .. } => Ok(Object::Null),
            XrefEntry::InUse { offset, .. } => self.load_at_offset(id, offset as usize),
            XrefEntry::Compressed { container, index } => {
                self.load_compressed(id.number(), container, index)
            }
        }
    }

    fn load_at_offset(&mut self, id: ObjectId, offset: usize) -> Result<Object> {
        if offset >= self.data.len() {
            return Err(PdfError::CorruptXRef(format!(
                "offset {offset} past end of file"
            )));
        }
        let strict = self.config.validation == crate::config::ValidationMode::Strict;
        let parsed = ObjectParser::at(&self.data, offset)
            .strict(strict)
            .parse_indirect_object()?;
        if parsed.id.number() != id.number() {
            return Err(PdfError::CorruptXRef(format!(
                "offset {offset} holds object {} but xref names {}",
                parsed.id.number(),
                id.number()
            )));
        }

        let mut object = parsed.object;
        if let Object::Stream(_) = &object {
            self.materialize_stream(id, &mut object)?;
        } else {
            self.decrypt_if_needed(id, &mut object)?;
        }
        Ok(object)
    }

    /// Resolve `Length`/`Filter`/`DecodeParms` one hop, read the body,
    /// decrypt, then decode the filter pipeline. The raw encoded form is
    /// retained alongside the decoded bytes.
    fn materialize_stream(&mut self, id: ObjectId, object: &mut Object) -> Result<()> {
        // Resolve entries a stream dict must not keep indirect. A
        // self-reference would loop; the one-hop resolver returns Null for
        // in-flight objects only if the xref is corrupt, so guard by id.
        for key in [b"Length".as_ref(), b"Filter".as_ref(), b"DecodeParms".as_ref()] {
            let target = {
                let stream = object.as_stream().expect("checked stream");
                stream.dict.get(key).and_then(Object::as_reference)
            };
            if let Some(target_id) = target {
                if target_id.number() == id.number() {
                    return Err(PdfError::CorruptObject {
                        offset: 0,
                        reason: format!(
                            "stream dict key /{} references its own object",
                            String::from_utf8_lossy(key)
                        ),
                    });
                }
                let resolved = self.get_object(target_id)?;
                let stream = object.as_stream_mut().expect("checked stream");
                stream.dict.set(key, resolved);
            }
        }

        // Read the body if parsing deferred it.
        {
            let stream = object.as_stream().expect("checked stream");
            if !stream.is_loaded() {
                let offset = stream.data_offset().ok_or_else(|| {
                    PdfError::StreamDecodeError("deferred stream without offset".to_string())
                })?;
                let length = stream
                    .declared_length()
                    .ok_or_else(|| PdfError::MissingKey("Length".to_string()))?;
                if length < 0 || offset + length as usize > self.data.len() {
                    return Err(PdfError::StreamLengthMismatch {
                        declared: length.max(0) as usize,
                        available: self.data.len().saturating_sub(offset),
                    });
                }
                let body = self.data[offset..offset + length as usize].to_vec();

                let mut tail = Lexer::at(&self.data, offset + length as usize);
                tail.skip_whitespace();
                if !matches!(tail.next_token(), Ok(Token::EndStream)) {
                    warn!(object = id.number(), "endstream not found after declared length");
                }

                let stream = object.as_stream_mut().expect("checked stream");
                stream.set_encoded_data(body);
            }
        }

        // The xref stream and the encryption dictionary are never
        // encrypted; everything else decrypts before decoding.
        let is_xref_stream = object
            .as_dict()
            .map(|d| d.is_type(b"XRef"))
            .unwrap_or(false);
        if !is_xref_stream {
            self.decrypt_if_needed(id, object)?;
        }

        let stream = object.as_stream_mut().expect("checked stream");
        let decoded = filters::decode_stream(stream)?;
        stream.set_decoded_data(decoded);
        Ok(())
    }

    fn decrypt_if_needed(&self, id: ObjectId, object: &mut Object) -> Result<()> {
        if let Some(state) = &self.encryption {
            if Some(id) != self.encrypt_ref {
                state.decrypt_object(id, object)?;
            }
        }
        Ok(())
    }

    fn load_compressed(&mut self, obj_num: u32, container: u32, index: u32) -> Result<Object> {
        let container_obj = self.get_object(ObjectId::new(container, 0))?;
        let stream = container_obj
            .as_stream()
            .ok_or_else(|| PdfError::ObjectStreamCorrupt(format!(
                "container {container} is not a stream"
            )))?;
        let decoded = stream
            .decoded_data()
            .ok_or_else(|| PdfError::ObjectStreamCorrupt("container not decoded".to_string()))?
            .to_vec();

        let object_stream = ObjectStream::parse(&stream.dict, decoded)?;
        let (found_num, object) = object_stream.get(index)?;
        if found_num != obj_num {
            return Err(PdfError::ObjectStreamCorrupt(format!(
                "slot {index} of stream {container} holds object {found_num}, expected {obj_num}"
            )));
        }
        Ok(object)
    }

    /// Invalidate the cached copy of an object (mutation path).
    pub fn evict(&mut self, obj_num: u32) {
        self.cache.remove(&obj_num);
    }

    // ---- bootstrap ----------------------------------------------------

    fn load_xref_chain(&mut self) -> Result<()> {
        let start = find_startxref(&self.data)?;
        self.last_startxref = start;

        let mut next = Some(start);
        let mut visited = HashSet::new();
        let mut newest_trailer: Option<Dictionary> = None;

        while let Some(offset) = next {
            if !visited.insert(offset) {
                warn!(offset, "cycle in xref chain");
                break;
            }
            let trailer = self.load_xref_section(offset)?;
            next = trailer.get_integer(b"Prev").map(|p| p as u64);
            if newest_trailer.is_none() {
                newest_trailer = Some(trailer);
            }
        }

        let trailer = newest_trailer
            .ok_or_else(|| PdfError::CorruptTrailer("no trailer found".to_string()))?;
        if trailer.get(b"Root").is_none() {
            return Err(PdfError::MissingKey("Root".to_string()));
        }
        if trailer.get_integer(b"Size").is_none() {
            if self.config.validation == crate::config::ValidationMode::Strict {
                return Err(PdfError::CorruptTrailer("missing Size".to_string()));
            }
            warn!("trailer missing Size");
        }
        self.trailer = trailer;
        Ok(())
    }

    /// Parse the xref at `offset` (classic section or xref stream) and
    /// install its entries; returns the trailer dictionary.
    fn load_xref_section(&mut self, offset: u64) -> Result<Dictionary> {
        let offset = offset as usize;
        if offset >= self.data.len() {
            return Err(PdfError::CorruptXRef(format!(
                "xref offset {offset} past end of file"
            )));
        }

        let mut lexer = Lexer::at(&self.data, offset);
        lexer.skip_whitespace();
        if matches!(lexer.next_token(), Ok(Token::Xref)) {
            self.load_classic_section(lexer.position())
        } else {
            self.load_xref_stream(offset)
        }
    }

    fn load_classic_section(&mut self, after_keyword: usize) -> Result<Dictionary> {
        let mut lexer = Lexer::at(&self.data, after_keyword);
        let mut pending: Vec<(u32, XrefEntry)> = Vec::new();

        loop {
            match lexer.next_token()? {
                Token::Trailer => break,
                Token::Integer(first) if first >= 0 => {
                    let count = match lexer.next_token()? {
                        Token::Integer(c) if c >= 0 => c,
                        other => {
                            return Err(PdfError::CorruptXRef(format!(
                                "bad subsection count: {other:?}"
                            )))
                        }
                    };
                    for i in 0..count {
                        let field1 = match lexer.next_token()? {
                            Token::Integer(v) if v >= 0 => v as u64,
                            other => {
                                return Err(PdfError::CorruptXRef(format!(
                                    "bad entry offset: {other:?}"
                                )))
                            }
                        };
                        let field2 = match lexer.next_token()? {
                            Token::Integer(v) if (0..=65535).contains(&v) => v as u16,
                            other => {
                                return Err(PdfError::CorruptXRef(format!(
                                    "bad entry generation: {other:?}"
                                )))
                            }
                        };
                        let entry = match lexer.next_token()? {
                            Token::Keyword(ref k) if k == b"n" => XrefEntry::InUse {
                                offset: field1,
                                generation: field2,
                            },
                            Token::Keyword(ref k) if k == b"f" => XrefEntry::Free {
                                next_free: field1 as u32,
                                generation: field2,
                            },
                            other => {
                                return Err(PdfError::CorruptXRef(format!(
                                    "bad entry type: {other:?}"
                                )))
                            }
                        };
                        pending.push((first as u32 + i as u32, entry));
                    }
                }
                other => {
                    return Err(PdfError::CorruptXRef(format!(
                        "unexpected token in xref section: {other:?}"
                    )))
                }
            }
        }

        let strict = self.config.validation == crate::config::ValidationMode::Strict;
        let trailer = ObjectParser::at(&self.data, lexer.position())
            .strict(strict)
            .parse_object()
            .map_err(|e| PdfError::CorruptTrailer(e.to_string()))?;
        let trailer = match trailer {
            Object::Dictionary(d) => d,
            other => {
                return Err(PdfError::CorruptTrailer(format!(
                    "trailer is {}",
                    other.type_name()
                )))
            }
        };

        // PDF 1.5 hybrid: the xref stream named by XRefStm takes
        // precedence over this section's entries, so install it first.
        if let Some(xstm) = trailer.get_integer(b"XRefStm") {
            match self.load_xref_stream(xstm as usize) {
                Ok(_) => debug!(offset = xstm, "hybrid xref stream merged"),
                Err(e) => warn!("hybrid XRefStm failed: {e}"),
            }
        }
        for (num, entry) in pending {
            self.xref.insert_if_absent(num, entry);
        }

        Ok(trailer)
    }

    fn load_xref_stream(&mut self, offset: usize) -> Result<Dictionary> {
        let parsed = ObjectParser::at(&self.data, offset)
            .parse_indirect_object()
            .map_err(|e| PdfError::CorruptXRef(format!("xref stream: {e}")))?;
        let Object::Stream(mut stream) = parsed.object else {
            return Err(PdfError::CorruptXRef(
                "object at xref offset is not a stream".to_string(),
            ));
        };
        if !stream.dict.is_type(b"XRef") {
            return Err(PdfError::CorruptXRef(
                "stream at xref offset is not /Type /XRef".to_string(),
            ));
        }
        if !stream.is_loaded() {
            // Length of an xref stream must be direct: nothing can be
            // resolved before the table exists.
            return Err(PdfError::CorruptXRef(
                "xref stream Length is indirect".to_string(),
            ));
        }

        let decoded = filters::decode_stream(&stream)?;
        stream.set_decoded_data(decoded);
        let dict = &stream.dict;

        let size = dict
            .get_integer(b"Size")
            .ok_or_else(|| PdfError::CorruptXRef("xref stream missing Size".to_string()))?;

        let widths: Vec<usize> = dict
            .get_array(b"W")
            .ok_or_else(|| PdfError::CorruptXRef("xref stream missing W".to_string()))?
            .iter()
            .map(|w| w.expect_integer().map(|v| v as usize))
            .collect::<Result<_>>()?;
        if widths.len() < 3 {
            return Err(PdfError::CorruptXRef("W needs three columns".to_string()));
        }

        let index: Vec<(u32, u32)> = match dict.get_array(b"Index") {
            Some(items) => items
                .chunks(2)
                .map(|pair| {
                    let first = pair[0].expect_integer()? as u32;
                    let count = pair
                        .get(1)
                        .map(|c| c.expect_integer())
                        .transpose()?
                        .unwrap_or(0) as u32;
                    Ok((first, count))
                })
                .collect::<Result<_>>()?,
            None => vec![(0, size as u32)],
        };

        let row_len: usize = widths[..3].iter().sum();
        if row_len == 0 {
            return Err(PdfError::CorruptXRef("zero-width xref rows".to_string()));
        }
        let rows = stream.decoded_data().expect("just decoded");

        let mut pos = 0usize;
        for (first, count) in index {
            for i in 0..count {
                let Some(row) = rows.get(pos..pos + row_len) else {
                    return Err(PdfError::CorruptXRef(
                        "xref stream shorter than Index declares".to_string(),
                    ));
                };
                pos += row_len;

                let (type_field, rest) = row.split_at(widths[0]);
                let (field2, field3) = rest.split_at(widths[1]);
                // A zero-width type column defaults to type 1.
                let entry_type = if widths[0] == 0 {
                    1
                } else {
                    be_number(type_field)
                };
                let field2 = be_number(field2);
                let field3 = be_number(field3);

                let entry = match entry_type {
                    0 => XrefEntry::Free {
                        next_free: field2 as u32,
                        generation: field3 as u16,
                    },
                    1 => XrefEntry::InUse {
                        offset: field2,
                        generation: field3 as u16,
                    },
                    2 => XrefEntry::Compressed {
                        container: field2 as u32,
                        index: field3 as u32,
                    },
                    other => {
                        // Unknown types are reserved; skip the slot.
                        debug!(entry_type = other, "skipping reserved xref entry type");
                        continue;
                    }
                };
                self.xref.insert_if_absent(first + i, entry);
            }
        }

        // Make the xref stream object itself resolvable (it occupies an
        // object number like any other).
        self.xref.insert_if_absent(
            parsed.id.number(),
            XrefEntry::InUse {
                offset: offset as u64,
                generation: parsed.id.generation(),
            },
        );

        Ok(stream.dict)
    }

    fn init_encryption(&mut self) -> Result<()> {
        let encrypt_obj = match self.trailer.get(b"Encrypt") {
            None => return Ok(()),
            Some(obj) => obj.clone(),
        };

        let file_id = self
            .trailer
            .get_array(b"ID")
            .and_then(|id| id.first())
            .and_then(Object::as_string)
            .map(|s| s.to_vec())
            .unwrap_or_default();

        let encrypt_dict = match encrypt_obj {
            Object::Reference(id) => {
                self.encrypt_ref = Some(id);
                // Loaded before the crypt state exists, so nothing tries
                // to decrypt it.
                self.get_object(id)?
                    .expect_dict()
                    .map_err(|_| PdfError::CorruptTrailer("Encrypt is not a dictionary".to_string()))?
                    .clone()
            }
            Object::Dictionary(d) => d,
            other => {
                return Err(PdfError::CorruptTrailer(format!(
                    "Encrypt is {}",
                    other.type_name()
                )))
            }
        };

        let state = EncryptionState::from_dict(
            &encrypt_dict,
            &file_id,
            &self.config.user_password,
            &self.config.owner_password,
        )?;
        debug!(mode = ?state.auth_mode(), "encryption initialized");

        // The encryption dictionary was cached before the state existed;
        // evicting it is unnecessary (it is never decrypted), but strings
        // cached through it must not leak, so clear everything else.
        let keep = self.encrypt_ref.map(|id| id.number());
        self.cache.retain(|num, _| Some(*num) == keep);

        self.encryption = Some(state);
        Ok(())
    }

    /// A linearized file starts with its parameter dict as the first
    /// indirect object. Parsed but never required for correctness.
    fn detect_linearization(&mut self) {
        let window = &self.data[..self.data.len().min(2048)];
        if find_subslice(window, b"/Linearized").is_none() {
            return;
        }
        // Scan forward from the header for the first object.
        let mut lexer = Lexer::new(window);
        lexer.skip_whitespace();
        let start = lexer.position();
        if let Ok(parsed) = ObjectParser::at(&self.data, start).parse_indirect_object() {
            if let Some(dict) = parsed.object.as_dict() {
                if dict.get(b"Linearized").is_some() {
                    debug!("linearization dictionary found");
                    self.linearization = Some(dict.clone());
                }
            }
        }
    }

    fn read_catalog_version(&mut self) {
        let Ok(root) = self.root_ref() else {
            return;
        };
        if let Ok(catalog) = self.get_object(root) {
            if let Some(version) = catalog
                .as_dict()
                .and_then(|d| d.get_name(b"Version"))
                .and_then(Version::parse)
            {
                self.catalog_version = Some(version);
            }
        }
    }
}

fn parse_header(data: &[u8]) -> Result<Version> {
    let window = &data[..data.len().min(1024)];
    let start = find_subslice(window, b"%PDF-").ok_or_else(|| PdfError::CorruptObject {
        offset: 0,
        reason: "missing %PDF header".to_string(),
    })?;
    let version_bytes: Vec<u8> = window[start + 5..]
        .iter()
        .copied()
        .take_while(|b| b.is_ascii_digit() || *b == b'.')
        .collect();
    Version::parse(&version_bytes).ok_or_else(|| PdfError::CorruptObject {
        offset: start,
        reason: "malformed header version".to_string(),
    })
}

/// Locate the offset named by the last `startxref` in the tail window.
fn find_startxref(data: &[u8]) -> Result<u64> {
    let tail_start = data.len().saturating_sub(TAIL_WINDOW);
    let tail = &data[tail_start..];

    let keyword_pos = rfind_subslice(tail, b"startxref")
        .ok_or_else(|| PdfError::CorruptTail("startxref not found".to_string()))?;

    let mut lexer = Lexer::at(data, tail_start + keyword_pos + b"startxref".len());
    let offset = match lexer.next_token() {
        Ok(Token::Integer(v)) if v >= 0 => v as u64,
        _ => {
            return Err(PdfError::CorruptTail(
                "startxref not followed by an offset".to_string(),
            ))
        }
    };

    if rfind_subslice(tail, b"%%EOF").is_none() {
        return Err(PdfError::CorruptTail("%%EOF marker missing".to_string()));
    }
    Ok(offset)
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn rfind_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).rposition(|w| w == needle)
}

fn be_number(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| acc << 8 | b as u64)
}
