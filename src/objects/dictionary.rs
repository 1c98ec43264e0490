use super::Object;
use crate::error::{PdfError, Result};
use indexmap::IndexMap;

/// A PDF dictionary.
///
/// Keys are name bytes compared by value, no normalization. Insertion order
/// is irrelevant for semantics but preserved for deterministic output.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dictionary {
    entries: IndexMap<Vec<u8>, Object>,
}

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: IndexMap::with_capacity(capacity),
        }
    }

    pub fn set(&mut self, key: impl AsRef<[u8]>, value: impl Into<Object>) {
        self.entries.insert(key.as_ref().to_vec(), value.into());
    }

    pub fn get(&self, key: &[u8]) -> Option<&Object> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &[u8]) -> Option<&mut Object> {
        self.entries.get_mut(key)
    }

    /// Lookup that fails with `MissingKey` when the key is absent.
    pub fn get_required(&self, key: &[u8]) -> Result<&Object> {
        self.get(key)
            .ok_or_else(|| PdfError::MissingKey(String::from_utf8_lossy(key).into_owned()))
    }

    /// Removal preserving the order of the remaining entries.
    pub fn remove(&mut self, key: &[u8]) -> Option<Object> {
        self.entries.shift_remove(key)
    }

    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Vec<u8>, &Object)> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&Vec<u8>, &mut Object)> {
        self.entries.iter_mut()
    }

    pub fn get_dict(&self, key: &[u8]) -> Option<&Dictionary> {
        self.get(key).and_then(Object::as_dict)
    }

    pub fn get_name(&self, key: &[u8]) -> Option<&[u8]> {
        self.get(key).and_then(Object::as_name)
    }

    pub fn get_integer(&self, key: &[u8]) -> Option<i64> {
        self.get(key).and_then(Object::as_integer)
    }

    pub fn get_array(&self, key: &[u8]) -> Option<&Vec<Object>> {
        self.get(key).and_then(Object::as_array)
    }

    /// Value of the `/Type` key, when present and a name.
    pub fn type_name(&self) -> Option<&[u8]> {
        self.get_name(b"Type")
    }

    pub fn is_type(&self, type_name: &[u8]) -> bool {
        self.type_name() == Some(type_name)
    }
}

impl FromIterator<(Vec<u8>, Object)> for Dictionary {
    fn from_iter<T: IntoIterator<Item = (Vec<u8>, Object)>>(iter: T) -> Self {
        let mut dict = Dictionary::new();
        for (key, value) in iter {
            dict.set(key, value);
        }
        dict
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get() {
        let mut dict = Dictionary::new();
        dict.set("Type", Object::name("Page"));
        dict.set("Count", 3);
        dict.set("Open", true);

        assert_eq!(dict.get(b"Type"), Some(&Object::name("Page")));
        assert_eq!(dict.get_integer(b"Count"), Some(3));
        assert_eq!(dict.get(b"Open").and_then(Object::as_bool), Some(true));
        assert_eq!(dict.get(b"Missing"), None);
    }

    #[test]
    fn test_insertion_order_preserved() {
        let mut dict = Dictionary::new();
        dict.set("Zebra", 1);
        dict.set("Apple", 2);
        dict.set("Mango", 3);

        let keys: Vec<_> = dict.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(keys, vec![b"Zebra".to_vec(), b"Apple".to_vec(), b"Mango".to_vec()]);
    }

    #[test]
    fn test_remove_preserves_order() {
        let mut dict = Dictionary::new();
        dict.set("A", 1);
        dict.set("B", 2);
        dict.set("C", 3);

        assert_eq!(dict.remove(b"B"), Some(Object::Integer(2)));
        let keys: Vec<_> = dict.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(keys, vec![b"A".to_vec(), b"C".to_vec()]);
    }

    #[test]
    fn test_get_required() {
        let mut dict = Dictionary::new();
        dict.set("Root", Object::reference(1, 0));

        assert!(dict.get_required(b"Root").is_ok());
        match dict.get_required(b"Size") {
            Err(PdfError::MissingKey(key)) => assert_eq!(key, "Size"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_overwrite_keeps_original_position() {
        let mut dict = Dictionary::new();
        dict.set("First", 1);
        dict.set("Second", 2);
        dict.set("First", 10);

        let entries: Vec<_> = dict.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        assert_eq!(entries[0], (b"First".to_vec(), Object::Integer(10)));
        assert_eq!(entries[1], (b"Second".to_vec(), Object::Integer(2)));
    }

    #[test]
    fn test_type_helpers() {
        let mut dict = Dictionary::new();
        dict.set("Type", Object::name("Pages"));
        assert!(dict.is_type(b"Pages"));
        assert!(!dict.is_type(b"Page"));
        assert_eq!(dict.type_name(), Some(b"Pages".as_ref()));
    }

    #[test]
    fn test_binary_name_keys() {
        // Keys are raw bytes; no normalization applies.
        let mut dict = Dictionary::new();
        dict.set([0x41u8, 0x20, 0x42].as_ref(), 1);
        assert!(dict.contains_key(b"A B"));
        assert!(!dict.contains_key(b"a b"));
    }
}
