//! Write-back engine
//!
//! Full rewrites emit the header, every in-use object in ascending number
//! order, and a fresh xref (classic section or stream). Incremental
//! updates append only the dirty set and chain `Prev` to the previous
//! xref. Path-based saves go through a temp file and rename so the
//! destination is either fully valid or unmodified.

mod xref_writer;

pub use xref_writer::{write_classic_section, write_xref_stream};

use crate::config::{CancelFlag, XRefOutput};
use crate::document::Document;
use crate::encryption::EncryptionState;
use crate::error::{PdfError, Result};
use crate::filters;
use crate::objects::{Dictionary, Object, ObjectId, Stream, StringFormat};
use crate::xref::XrefEntry;
use chrono::{DateTime, Utc};
use std::path::Path;
use tracing::debug;

/// Binary-marker comment after the header: four bytes ≥ 0x80.
const BINARY_MARKER: [u8; 6] = [b'%', 0xE2, 0xE3, 0xCF, 0xD3, b'\n'];

/// Per-object crypt context threaded through serialization.
type Crypt<'a> = Option<(&'a EncryptionState, ObjectId)>;

/// Serialize a direct object. Strings encrypt under `crypt`; streams are
/// indirect-only and rejected here.
pub fn serialize_object(out: &mut Vec<u8>, object: &Object, crypt: Crypt) -> Result<()> {
    match object {
        Object::Null => out.extend_from_slice(b"null"),
        Object::Boolean(true) => out.extend_from_slice(b"true"),
        Object::Boolean(false) => out.extend_from_slice(b"false"),
        Object::Integer(i) => out.extend_from_slice(i.to_string().as_bytes()),
        Object::Real(r) => {
            if r.fract() == 0.0 && r.abs() < 1e15 {
                out.extend_from_slice(format!("{}", *r as i64).as_bytes());
            } else {
                out.extend_from_slice(r.to_string().as_bytes());
            }
        }
        Object::Name(name) => write_name(out, name),
        Object::String(bytes, format) => {
            let bytes = match crypt {
                Some((state, id)) => state.encrypt_string(id, bytes)?,
                None => bytes.clone(),
            };
            match format {
                StringFormat::Literal => write_literal_string(out, &bytes),
                StringFormat::Hexadecimal => write_hex_string(out, &bytes),
            }
        }
        Object::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b' ');
                }
                serialize_object(out, item, crypt)?;
            }
            out.push(b']');
        }
        Object::Dictionary(dict) => serialize_dict(out, dict, crypt)?,
        Object::Reference(id) => {
            out.extend_from_slice(format!("{} {} R", id.number(), id.generation()).as_bytes())
        }
        Object::Stream(_) => {
            return Err(PdfError::CorruptObject {
                offset: 0,
                reason: "stream must be a top-level indirect object".to_string(),
            })
        }
    }
    Ok(())
}

fn serialize_dict(out: &mut Vec<u8>, dict: &Dictionary, crypt: Crypt) -> Result<()> {
    out.extend_from_slice(b"<<");
    for (key, value) in dict.iter() {
        out.push(b' ');
        write_name(out, key);
        out.push(b' ');
        serialize_object(out, value, crypt)?;
    }
    out.extend_from_slice(b" >>");
    Ok(())
}

fn write_name(out: &mut Vec<u8>, name: &[u8]) {
    out.push(b'/');
    for &byte in name {
        let needs_escape = byte == b'#'
            || byte < b'!'
            || byte > b'~'
            || crate::parser::lexer::is_delimiter(byte);
        if needs_escape {
            out.extend_from_slice(format!("#{byte:02X}").as_bytes());
        } else {
            out.push(byte);
        }
    }
}

fn write_literal_string(out: &mut Vec<u8>, bytes: &[u8]) {
    out.push(b'(');
    for &byte in bytes {
        match byte {
            b'(' | b')' | b'\\' => {
                out.push(b'\\');
                out.push(byte);
            }
            // A raw CR would be normalized to LF on reparse.
            b'\r' => out.extend_from_slice(b"\\r"),
            _ => out.push(byte),
        }
    }
    out.push(b')');
}

fn write_hex_string(out: &mut Vec<u8>, bytes: &[u8]) {
    out.push(b'<');
    for byte in bytes {
        out.extend_from_slice(format!("{byte:02X}").as_bytes());
    }
    out.push(b'>');
}

/// Emit `N G obj … endobj` for one object, encrypting under `crypt`.
fn write_indirect(out: &mut Vec<u8>, id: ObjectId, object: &Object, crypt: Crypt, force_reencode: bool) -> Result<()> {
    out.extend_from_slice(format!("{} {} obj\n", id.number(), id.generation()).as_bytes());
    match object {
        Object::Stream(stream) => write_stream_body(out, stream, crypt, force_reencode)?,
        other => serialize_object(out, other, crypt)?,
    }
    out.extend_from_slice(b"\nendobj\n");
    Ok(())
}

/// Streams re-encrypt per object; content re-encodes only when the raw
/// form was dropped by a content replacement (or re-encoding is forced).
fn write_stream_body(out: &mut Vec<u8>, stream: &Stream, crypt: Crypt, force_reencode: bool) -> Result<()> {
    let pipeline = filters::pipeline_from_dict(&stream.dict)?;
    let mut body = match (stream.encoded_data(), stream.decoded_data()) {
        (Some(encoded), _) if !force_reencode => encoded.to_vec(),
        (_, Some(decoded)) => filters::encode(decoded, &pipeline)?,
        (Some(encoded), None) => encoded.to_vec(),
        (None, None) => {
            return Err(PdfError::StreamDecodeError(
                "stream has no content to write".to_string(),
            ))
        }
    };
    if let Some((state, id)) = crypt {
        body = state.encrypt_stream_data(id, &body)?;
    }

    let mut dict = stream.dict.clone();
    dict.set("Length", body.len() as i64);
    serialize_dict(out, &dict, crypt)?;
    out.extend_from_slice(b"\nstream\n");
    out.extend_from_slice(&body);
    out.extend_from_slice(b"\nendstream");
    Ok(())
}

fn timestamp(doc: &Document) -> DateTime<Utc> {
    match doc.config().pinned_timestamp {
        Some(secs) => DateTime::from_timestamp(secs, 0).unwrap_or_else(Utc::now),
        None => Utc::now(),
    }
}

fn pdf_date(ts: DateTime<Utc>) -> String {
    format!("D:{}Z", ts.format("%Y%m%d%H%M%S"))
}

/// The trailer `ID` pair: first element preserved from the source, second
/// regenerated as MD5 over timestamp, filename, size and Info.
fn regenerate_file_id(
    doc: &mut Document,
    file_name: &str,
    size_hint: usize,
    ts: DateTime<Utc>,
) -> Result<Object> {
    let first = doc
        .trailer()
        .get_array(b"ID")
        .and_then(|id| id.first())
        .and_then(Object::as_string)
        .map(<[u8]>::to_vec);

    let mut input = Vec::new();
    input.extend_from_slice(ts.timestamp_micros().to_string().as_bytes());
    input.extend_from_slice(file_name.as_bytes());
    input.extend_from_slice(size_hint.to_string().as_bytes());
    if let Some(info) = doc.trailer().get(b"Info").cloned() {
        let info = doc.resolve(&info)?;
        if let Some(dict) = info.as_dict() {
            serialize_dict(&mut input, dict, None)?;
        }
    }
    let second = md5::compute(&input).0.to_vec();

    // The first element feeds key derivation; an encrypted document that
    // never had an ID must keep deriving from the empty string.
    let first = match first {
        Some(first) => first,
        None if doc.is_encrypted() => Vec::new(),
        None => second.clone(),
    };
    Ok(Object::Array(vec![
        Object::String(first, StringFormat::Hexadecimal),
        Object::String(second, StringFormat::Hexadecimal),
    ]))
}

/// Serialize the whole document as a fresh file.
pub fn write_full(doc: &mut Document, file_name: &str, cancel: &CancelFlag) -> Result<Vec<u8>> {
    let ts = timestamp(doc);
    touch_info_mod_date(doc, ts)?;

    let mut out = Vec::new();
    out.extend_from_slice(format!("%PDF-{}\n", doc.effective_version()).as_bytes());
    out.extend_from_slice(&BINARY_MARKER);

    let numbers: Vec<u32> = doc.xref().occupied().collect();
    for num in numbers {
        cancel.check()?;
        let entry = *doc.xref().get(num).expect("occupied entry");
        let generation = entry.generation();
        let id = ObjectId::new(num, generation);
        let object = doc.get(id)?;

        // Old xref streams and object-stream containers are superseded by
        // the directory this writer emits; their slots go free.
        if let Some(dict) = object.as_dict() {
            if dict.is_type(b"XRef") || dict.is_type(b"ObjStm") {
                debug!(object = num, "dropping superseded directory object");
                doc.free_object(num);
                continue;
            }
        }

        doc.xref_mut().set(
            num,
            XrefEntry::InUse {
                offset: out.len() as u64,
                generation,
            },
        );
        write_indirect(
            &mut out,
            id,
            &object,
            crypt_for(doc, id),
            doc.config().force_reencode,
        )?;
    }

    doc.xref_mut().ensure_valid_free_list();

    let mut trailer = Dictionary::new();
    trailer.set("Size", doc.xref().size() as i64);
    trailer.set(
        "Root",
        doc.trailer()
            .get(b"Root")
            .cloned()
            .ok_or_else(|| PdfError::MissingKey("Root".to_string()))?,
    );
    if let Some(info) = doc.trailer().get(b"Info").cloned() {
        trailer.set("Info", info);
    }
    if let Some(encrypt) = doc.trailer().get(b"Encrypt").cloned() {
        trailer.set("Encrypt", encrypt);
    }
    let id = regenerate_file_id(doc, file_name, out.len(), ts)?;
    trailer.set("ID", id);

    let xref_offset = match doc.config().xref_output {
        XRefOutput::Section => {
            let all: Vec<u32> = doc.xref().iter().map(|(n, _)| *n).collect();
            let offset = write_classic_section(&mut out, doc.xref(), &all);
            out.extend_from_slice(b"trailer\n");
            serialize_dict(&mut out, &trailer, None)?;
            out.push(b'\n');
            offset
        }
        XRefOutput::Stream => {
            let stream_num = {
                let next = doc.xref().size();
                doc.xref_mut().set(
                    next,
                    XrefEntry::InUse {
                        offset: out.len() as u64,
                        generation: 0,
                    },
                );
                next
            };
            trailer.set("Size", doc.xref().size() as i64);
            let all: Vec<u32> = doc.xref().iter().map(|(n, _)| *n).collect();
            write_xref_stream(&mut out, doc.xref(), &all, stream_num, &trailer)?
        }
    };

    out.extend_from_slice(format!("startxref\n{xref_offset}\n%%EOF\n").as_bytes());
    Ok(out)
}

/// Append an incremental update carrying only the dirty objects; the
/// existing bytes are untouched and `Prev` chains to the old xref.
pub fn write_incremental(doc: &mut Document, cancel: &CancelFlag) -> Result<Vec<u8>> {
    let mut out = doc.source_bytes().to_vec();
    if out.last() != Some(&b'\n') {
        out.push(b'\n');
    }

    let dirty: Vec<u32> = doc.dirty_objects().iter().copied().collect();
    for &num in &dirty {
        cancel.check()?;
        let entry = match doc.xref().get(num) {
            Some(entry) => *entry,
            None => continue,
        };
        if entry.is_free() {
            continue;
        }
        let generation = entry.generation();
        let id = ObjectId::new(num, generation);
        let object = doc.get(id)?;

        doc.xref_mut().set(
            num,
            XrefEntry::InUse {
                offset: out.len() as u64,
                generation,
            },
        );
        write_indirect(
            &mut out,
            id,
            &object,
            crypt_for(doc, id),
            doc.config().force_reencode,
        )?;
    }

    // The new section lists the free-list head plus every dirty slot,
    // even when the update only frees objects.
    let mut numbers = vec![0u32];
    numbers.extend(dirty.iter().copied().filter(|n| *n != 0));

    let mut trailer = Dictionary::new();
    trailer.set("Size", doc.xref().size() as i64);
    trailer.set("Prev", doc.last_startxref() as i64);
    for key in [b"Root".as_ref(), b"Info".as_ref(), b"Encrypt".as_ref(), b"ID".as_ref()] {
        if let Some(value) = doc.trailer().get(key).cloned() {
            trailer.set(key, value);
        }
    }

    let xref_offset = match doc.config().xref_output {
        XRefOutput::Section => {
            let offset = write_classic_section(&mut out, doc.xref(), &numbers);
            out.extend_from_slice(b"trailer\n");
            serialize_dict(&mut out, &trailer, None)?;
            out.push(b'\n');
            offset
        }
        XRefOutput::Stream => {
            let stream_num = doc.xref().size();
            doc.xref_mut().set(
                stream_num,
                XrefEntry::InUse {
                    offset: out.len() as u64,
                    generation: 0,
                },
            );
            numbers.push(stream_num);
            trailer.set("Size", doc.xref().size() as i64);
            write_xref_stream(&mut out, doc.xref(), &numbers, stream_num, &trailer)?
        }
    };

    out.extend_from_slice(format!("startxref\n{xref_offset}\n%%EOF\n").as_bytes());
    doc.clear_dirty();
    Ok(out)
}

fn crypt_for(doc: &Document, id: ObjectId) -> Crypt<'_> {
    match doc.encryption() {
        Some(state) if Some(id) != doc.encrypt_ref() => Some((state, id)),
        _ => None,
    }
}

fn touch_info_mod_date(doc: &mut Document, ts: DateTime<Utc>) -> Result<()> {
    let Some(info_ref) = doc.trailer().get(b"Info").and_then(Object::as_reference) else {
        return Ok(());
    };
    let info = doc.get(info_ref)?;
    if let Some(dict) = info.as_dict() {
        let mut dict = dict.clone();
        dict.set("ModDate", Object::string_literal(pdf_date(ts)));
        doc.set_object(info_ref, Object::Dictionary(dict));
    }
    Ok(())
}

/// Write to `path` through a temp file and rename, so the destination is
/// never left half-written.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp~pdfcraft");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        e.into()
    })
}

/// Full rewrite to a path.
pub fn save_full(doc: &mut Document, path: impl AsRef<Path>, cancel: &CancelFlag) -> Result<()> {
    let path = path.as_ref();
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let bytes = write_full(doc, &file_name, cancel)?;
    write_atomic(path, &bytes)
}

/// Incremental update to a path.
pub fn save_incremental(doc: &mut Document, path: impl AsRef<Path>, cancel: &CancelFlag) -> Result<()> {
    let bytes = write_incremental(doc, cancel)?;
    write_atomic(path.as_ref(), &bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Configuration;
    use crate::reader::tests::minimal_pdf;

    fn doc() -> Document {
        let mut config = Configuration::default();
        config.pinned_timestamp = Some(1_600_000_000);
        Document::from_bytes(minimal_pdf(), config).unwrap()
    }

    fn serialize(object: &Object) -> String {
        let mut out = Vec::new();
        serialize_object(&mut out, object, None).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_serialize_primitives() {
        assert_eq!(serialize(&Object::Null), "null");
        assert_eq!(serialize(&Object::Boolean(true)), "true");
        assert_eq!(serialize(&Object::Integer(-17)), "-17");
        assert_eq!(serialize(&Object::Real(2.5)), "2.5");
        assert_eq!(serialize(&Object::Real(4.0)), "4");
        assert_eq!(serialize(&Object::name("Type")), "/Type");
        assert_eq!(serialize(&Object::reference(3, 1)), "3 1 R");
    }

    #[test]
    fn test_serialize_name_escapes() {
        assert_eq!(serialize(&Object::name("A B")), "/A#20B");
        assert_eq!(serialize(&Object::name("x#y")), "/x#23y");
        assert_eq!(serialize(&Object::name(b"hi(there)")), "/hi#28there#29");
    }

    #[test]
    fn test_serialize_strings() {
        assert_eq!(serialize(&Object::string_literal(b"plain")), "(plain)");
        assert_eq!(
            serialize(&Object::string_literal(b"a(b)c\\d")),
            "(a\\(b\\)c\\\\d)"
        );
        assert_eq!(
            serialize(&Object::String(b"AB".to_vec(), StringFormat::Hexadecimal)),
            "<4142>"
        );
    }

    #[test]
    fn test_literal_string_cr_escaped_roundtrip() {
        let original = Object::string_literal(b"line1\rline2");
        let text = serialize(&original);
        let reparsed = crate::parser::ObjectParser::new(text.as_bytes())
            .parse_object()
            .unwrap();
        assert_eq!(reparsed, original);
    }

    #[test]
    fn test_serialize_dict_preserves_order() {
        let mut dict = Dictionary::new();
        dict.set("Zebra", 1);
        dict.set("Apple", 2);
        assert_eq!(
            serialize(&Object::Dictionary(dict)),
            "<< /Zebra 1 /Apple 2 >>"
        );
    }

    #[test]
    fn test_full_rewrite_reads_back() {
        let mut doc = doc();
        let bytes = write_full(&mut doc, "out.pdf", &CancelFlag::new()).unwrap();
        assert!(bytes.starts_with(b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n"));

        let mut reread = Document::from_bytes(bytes, Configuration::default()).unwrap();
        assert_eq!(reread.page_count().unwrap(), 1);
        assert!(reread.trailer().get_array(b"ID").is_some());
    }

    #[test]
    fn test_full_rewrite_deterministic_with_pinned_timestamp() {
        let a = write_full(&mut doc(), "out.pdf", &CancelFlag::new()).unwrap();
        let b = write_full(&mut doc(), "out.pdf", &CancelFlag::new()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_xref_stream_output_reads_back() {
        let mut config = Configuration::default();
        config.xref_output = XRefOutput::Stream;
        config.pinned_timestamp = Some(1_600_000_000);
        let mut doc = Document::from_bytes(minimal_pdf(), config).unwrap();

        let bytes = write_full(&mut doc, "out.pdf", &CancelFlag::new()).unwrap();
        let mut reread = Document::from_bytes(bytes, Configuration::default()).unwrap();
        assert_eq!(reread.page_count().unwrap(), 1);
    }

    #[test]
    fn test_incremental_appends_only() {
        let mut doc = doc();
        let base_len = doc.base_size();

        let mut page = doc
            .get(ObjectId::new(3, 0))
            .unwrap()
            .as_dict()
            .unwrap()
            .clone();
        page.set("Rotate", 90);
        doc.set_object(ObjectId::new(3, 0), Object::Dictionary(page));

        let bytes = write_incremental(&mut doc, &CancelFlag::new()).unwrap();
        assert_eq!(&bytes[..base_len], doc.source_bytes());

        let mut reread = Document::from_bytes(bytes, Configuration::default()).unwrap();
        let page = reread.get(ObjectId::new(3, 0)).unwrap();
        assert_eq!(page.as_dict().unwrap().get_integer(b"Rotate"), Some(90));
        // Prev points at the original xref.
        assert!(reread.trailer().get_integer(b"Prev").is_some());
    }

    #[test]
    fn test_incremental_only_free_entries_still_has_prev() {
        let mut doc = doc();
        doc.free_object(3);
        let bytes = write_incremental(&mut doc, &CancelFlag::new()).unwrap();
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("/Prev"));

        let mut reread = Document::from_bytes(bytes, Configuration::default()).unwrap();
        assert!(reread.get(ObjectId::new(3, 0)).unwrap().is_null());
    }

    #[test]
    fn test_save_atomic_rename(){
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.pdf");
        let mut doc = doc();
        save_full(&mut doc, &path, &CancelFlag::new()).unwrap();
        assert!(path.exists());
        assert!(!dir.path().join("doc.tmp~pdfcraft").exists());

        let reread = std::fs::read(&path).unwrap();
        assert!(Document::from_bytes(reread, Configuration::default()).is_ok());
    }

    #[test]
    fn test_cancelled_write() {
        let mut doc = doc();
        let cancel = CancelFlag::new();
        cancel.cancel();
        assert!(matches!(
            write_full(&mut doc, "x.pdf", &cancel),
            Err(PdfError::OperationCancelled)
        ));
    }
}
