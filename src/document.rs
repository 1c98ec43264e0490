//! Document context
//!
//! A single `Document` owns the xref table, trailer data, encryption
//! state, and the staged mutations that a later write emits. Contexts are
//! single-writer; concurrent use requires separate contexts.

use crate::config::Configuration;
use crate::encryption::EncryptionState;
use crate::error::{PdfError, Result};
use crate::objects::{Dictionary, Object, ObjectId};
use crate::reader::{PdfReader, ReadStats, Version};
use crate::xref::{XrefEntry, XrefTable};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

/// Attributes a page inherits from its ancestors (ISO 32000-1 7.7.3.4).
const INHERITABLE_PAGE_KEYS: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

pub struct Document {
    reader: PdfReader,
    /// Staged objects, new or replacing source objects.
    modified: BTreeMap<u32, Object>,
    /// Object numbers an incremental update must emit (includes freed).
    dirty: BTreeSet<u32>,
}

impl Document {
    pub fn open(path: impl AsRef<Path>, config: Configuration) -> Result<Self> {
        Ok(Self::from_reader(PdfReader::open(path, config)?))
    }

    pub fn from_bytes(data: Vec<u8>, config: Configuration) -> Result<Self> {
        Ok(Self::from_reader(PdfReader::from_bytes(data, config)?))
    }

    pub fn from_reader(reader: PdfReader) -> Self {
        Self {
            reader,
            modified: BTreeMap::new(),
            dirty: BTreeSet::new(),
        }
    }

    pub fn config(&self) -> &Configuration {
        self.reader.config()
    }

    pub fn trailer(&self) -> &Dictionary {
        &self.reader.trailer
    }

    pub fn trailer_mut(&mut self) -> &mut Dictionary {
        &mut self.reader.trailer
    }

    pub fn xref(&self) -> &XrefTable {
        &self.reader.xref
    }

    pub fn xref_mut(&mut self) -> &mut XrefTable {
        &mut self.reader.xref
    }

    pub fn stats(&self) -> ReadStats {
        self.reader.stats()
    }

    pub fn effective_version(&self) -> Version {
        self.reader.effective_version()
    }

    pub fn is_encrypted(&self) -> bool {
        self.reader.is_encrypted()
    }

    pub fn encryption(&self) -> Option<&EncryptionState> {
        self.reader.encryption()
    }

    pub fn encrypt_ref(&self) -> Option<ObjectId> {
        self.reader.encrypt_ref()
    }

    pub fn linearization(&self) -> Option<&Dictionary> {
        self.reader.linearization.as_ref()
    }

    /// Size of the unmodified source; incremental updates append here.
    pub fn base_size(&self) -> usize {
        self.reader.source_bytes().len()
    }

    pub fn source_bytes(&self) -> &[u8] {
        self.reader.source_bytes()
    }

    /// Offset of the newest xref in the source (incremental `Prev` target).
    pub fn last_startxref(&self) -> u64 {
        self.reader.last_startxref()
    }

    /// Object numbers staged for the next incremental update.
    pub fn dirty_objects(&self) -> &BTreeSet<u32> {
        &self.dirty
    }

    pub fn clear_dirty(&mut self) {
        self.dirty.clear();
    }

    /// Dereference, preferring staged objects over the source.
    pub fn get(&mut self, id: ObjectId) -> Result<Object> {
        if let Some(staged) = self.modified.get(&id.number()) {
            return Ok(staged.clone());
        }
        self.reader.get_object(id)
    }

    /// One-hop resolution of a possibly-indirect object.
    pub fn resolve(&mut self, object: &Object) -> Result<Object> {
        match object {
            Object::Reference(id) => self.get(*id),
            other => Ok(other.clone()),
        }
    }

    /// Stage a replacement for an existing object.
    pub fn set_object(&mut self, id: ObjectId, object: Object) {
        self.reader.evict(id.number());
        self.modified.insert(id.number(), object);
        self.dirty.insert(id.number());
        if self.reader.xref.get(id.number()).is_none() {
            self.reader.xref.set(
                id.number(),
                XrefEntry::InUse {
                    offset: 0,
                    generation: id.generation(),
                },
            );
        }
    }

    /// Stage a new object under the next free object number.
    pub fn add_object(&mut self, object: Object) -> ObjectId {
        let id = self.reader.xref.insert_new(0);
        self.modified.insert(id.number(), object);
        self.dirty.insert(id.number());
        id
    }

    /// Stage a new object, reusing a freed slot when one exists.
    pub fn add_object_recycling(&mut self, object: Object) -> ObjectId {
        let id = self.reader.xref.insert_and_recycle(0);
        self.modified.insert(id.number(), object);
        self.dirty.insert(id.number());
        id
    }

    /// Mark an object free; it joins the head of the free list.
    pub fn free_object(&mut self, obj_num: u32) {
        self.reader.xref.free(obj_num);
        self.reader.evict(obj_num);
        self.modified.remove(&obj_num);
        self.dirty.insert(obj_num);
    }

    /// Turn on RC4-128 (V2/R3) encryption for the next write. The crypt
    /// state applies at serialization time; in-memory objects stay
    /// plaintext.
    pub fn enable_encryption(
        &mut self,
        user_password: &[u8],
        owner_password: &[u8],
        permissions: crate::encryption::Permissions,
    ) -> Result<()> {
        use crate::encryption::{CryptMethod, StandardSecurityHandler};
        use crate::objects::StringFormat;

        if self.is_encrypted() {
            return Err(PdfError::UnsupportedEncryption(
                "document is already encrypted".to_string(),
            ));
        }
        let user_password = &user_password[..user_password.len().min(32)];
        let owner_password = &owner_password[..owner_password.len().min(32)];

        let file_id = self
            .trailer()
            .get_array(b"ID")
            .and_then(|id| id.first())
            .and_then(Object::as_string)
            .map(<[u8]>::to_vec)
            .unwrap_or_default();

        let owner_hash =
            StandardSecurityHandler::compute_owner_hash(owner_password, user_password, 3, 16);
        let mut handler = StandardSecurityHandler {
            revision: 3,
            key_length: 16,
            owner_hash,
            user_hash: Vec::new(),
            permissions: permissions.to_p() as i64,
            file_id,
            encrypt_metadata: true,
        };
        let file_key = handler.compute_file_key(user_password);
        let mut user_hash = handler.compute_user_hash(&file_key);
        user_hash.resize(32, 0);
        handler.user_hash = user_hash;

        let mut dict = Dictionary::new();
        dict.set("Filter", Object::name("Standard"));
        dict.set("V", 2);
        dict.set("R", 3);
        dict.set("Length", 128);
        dict.set(
            "O",
            Object::String(handler.owner_hash.clone(), StringFormat::Hexadecimal),
        );
        dict.set(
            "U",
            Object::String(handler.user_hash.clone(), StringFormat::Hexadecimal),
        );
        dict.set("P", handler.permissions);
        let encrypt_id = self.add_object(Object::Dictionary(dict));
        self.trailer_mut().set("Encrypt", Object::Reference(encrypt_id));

        let state =
            EncryptionState::for_write(handler, file_key, CryptMethod::Rc4, CryptMethod::Rc4);
        self.reader.install_encryption(state, Some(encrypt_id));
        Ok(())
    }

    /// Strip encryption so the next write emits plaintext. Requires owner
    /// authentication or modify permission.
    pub fn disable_encryption(&mut self) -> Result<()> {
        let Some(state) = self.reader.encryption() else {
            return Ok(());
        };
        state.require_permissions(crate::encryption::Permissions::MODIFY)?;

        if let Some(encrypt_ref) = self
            .trailer()
            .get(b"Encrypt")
            .and_then(Object::as_reference)
        {
            self.free_object(encrypt_ref.number());
        }
        self.trailer_mut().remove(b"Encrypt");
        self.reader.clear_encryption();
        Ok(())
    }

    pub fn catalog(&mut self) -> Result<Dictionary> {
        let root = self.reader.root_ref()?;
        self.get(root)?
            .expect_dict()
            .cloned()
            .map_err(|_| PdfError::CorruptTrailer("Root is not a dictionary".to_string()))
    }

    fn catalog_cloned(&mut self) -> Result<(ObjectId, Dictionary)> {
        let root = self.reader.root_ref()?;
        let dict = self
            .get(root)?
            .expect_dict()
            .cloned()
            .map_err(|_| PdfError::CorruptTrailer("Root is not a dictionary".to_string()))?;
        Ok((root, dict))
    }

    /// Leaf pages in document order. A document with no pages is corrupt.
    pub fn pages(&mut self) -> Result<Vec<ObjectId>> {
        let (_, catalog) = self.catalog_cloned()?;
        let pages_ref = catalog
            .get(b"Pages")
            .and_then(Object::as_reference)
            .ok_or_else(|| PdfError::CorruptTrailer("catalog missing Pages".to_string()))?;

        let mut out = Vec::new();
        let mut visited = HashSet::new();
        self.collect_pages(pages_ref, &mut out, &mut visited)?;
        if out.is_empty() {
            return Err(PdfError::CorruptTrailer(
                "page tree contains no pages".to_string(),
            ));
        }
        Ok(out)
    }

    fn collect_pages(
        &mut self,
        node_ref: ObjectId,
        out: &mut Vec<ObjectId>,
        visited: &mut HashSet<u32>,
    ) -> Result<()> {
        if !visited.insert(node_ref.number()) {
            return Err(PdfError::CorruptObject {
                offset: 0,
                reason: format!("cycle in page tree at object {}", node_ref.number()),
            });
        }

        let node = self.get(node_ref)?;
        let dict = node.expect_dict()?;
        match dict.type_name() {
            Some(b"Pages") => {
                let kids = dict
                    .get_array(b"Kids")
                    .cloned()
                    .ok_or_else(|| PdfError::MissingKey("Kids".to_string()))?;
                for kid in kids {
                    let kid_ref = kid.as_reference().ok_or(PdfError::TypeMismatch {
                        expected: "Reference",
                        got: kid.type_name(),
                    })?;
                    self.collect_pages(kid_ref, out, visited)?;
                }
            }
            Some(b"Page") => out.push(node_ref),
            _ => {
                return Err(PdfError::ValidationFailure {
                    rule: "page tree node must be /Page or /Pages".to_string(),
                    obj_num: node_ref.number(),
                })
            }
        }
        Ok(())
    }

    pub fn page_count(&mut self) -> Result<usize> {
        Ok(self.pages()?.len())
    }

    /// A page attribute, honoring inheritance through `Parent` links.
    pub fn page_attr(&mut self, page: ObjectId, key: &[u8]) -> Result<Option<Object>> {
        debug_assert!(INHERITABLE_PAGE_KEYS.contains(&key) || key == b"Contents");
        let mut current = page;
        let mut visited = HashSet::new();
        loop {
            if !visited.insert(current.number()) {
                return Ok(None);
            }
            let node = self.get(current)?;
            let dict = node.expect_dict()?;
            if let Some(value) = dict.get(key) {
                return Ok(Some(value.clone()));
            }
            match dict.get(b"Parent").and_then(Object::as_reference) {
                Some(parent) => current = parent,
                None => return Ok(None),
            }
        }
    }

    /// Raw content-stream bytes of a page, decoded and concatenated.
    pub fn page_content(&mut self, page: ObjectId) -> Result<Vec<u8>> {
        let contents = match self.page_attr(page, b"Contents")? {
            Some(c) => c,
            None => return Ok(Vec::new()),
        };
        let mut out = Vec::new();
        match contents {
            Object::Reference(id) => self.append_stream_content(id, &mut out)?,
            Object::Array(items) => {
                for item in items {
                    if let Some(id) = item.as_reference() {
                        self.append_stream_content(id, &mut out)?;
                    }
                }
            }
            _ => {}
        }
        Ok(out)
    }

    fn append_stream_content(&mut self, id: ObjectId, out: &mut Vec<u8>) -> Result<()> {
        let object = self.get(id)?;
        let stream = object.expect_stream()?;
        match stream.decoded_data() {
            Some(data) => out.extend_from_slice(data),
            None => {
                out.extend_from_slice(&crate::filters::decode_stream(stream)?);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::tests::minimal_pdf;

    fn doc() -> Document {
        Document::from_bytes(minimal_pdf(), Configuration::default()).unwrap()
    }

    #[test]
    fn test_page_enumeration() {
        let mut doc = doc();
        let pages = doc.pages().unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0], ObjectId::new(3, 0));
        assert_eq!(doc.page_count().unwrap(), 1);
    }

    #[test]
    fn test_catalog_shape() {
        let mut doc = doc();
        let catalog = doc.catalog().unwrap();
        assert!(catalog.is_type(b"Catalog"));
    }

    #[test]
    fn test_staged_object_shadows_source() {
        let mut doc = doc();
        let id = ObjectId::new(3, 0);
        let mut replacement = Dictionary::new();
        replacement.set("Type", Object::name("Page"));
        replacement.set("Parent", Object::reference(2, 0));
        replacement.set("Rotate", 90);
        doc.set_object(id, Object::Dictionary(replacement));

        let got = doc.get(id).unwrap();
        assert_eq!(got.as_dict().unwrap().get_integer(b"Rotate"), Some(90));
        assert!(doc.dirty_objects().contains(&3));
    }

    #[test]
    fn test_add_object_allocates_fresh_number() {
        let mut doc = doc();
        let id = doc.add_object(Object::Integer(42));
        assert_eq!(id, ObjectId::new(4, 0));
        assert_eq!(doc.get(id).unwrap(), Object::Integer(42));
        assert_eq!(doc.xref().size(), 5);
    }

    #[test]
    fn test_free_then_recycle() {
        let mut doc = doc();
        doc.free_object(3);
        assert!(doc.dirty_objects().contains(&3));

        let id = doc.add_object_recycling(Object::Boolean(true));
        assert_eq!(id, ObjectId::new(3, 1));
    }

    #[test]
    fn test_page_attr_inheritance() {
        let mut doc = doc();
        // MediaBox lives on the page itself here.
        let mb = doc
            .page_attr(ObjectId::new(3, 0), b"MediaBox")
            .unwrap()
            .unwrap();
        assert_eq!(mb.as_array().unwrap().len(), 4);

        // Resources is absent everywhere.
        assert!(doc
            .page_attr(ObjectId::new(3, 0), b"Resources")
            .unwrap()
            .is_none());
    }
}
