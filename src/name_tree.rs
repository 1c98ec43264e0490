//! Document name trees (EmbeddedFiles, Dests, JavaScript, …)
//!
//! A balanced search tree with ordered key ranges: every node spans
//! `[kmin, kmax]`; leaves hold up to three entries and split at the
//! midpoint when they overflow; internals with a single child collapse on
//! deletion (ISO 32000-1 Section 7.9.6 in-memory form).

use crate::document::Document;
use crate::error::{PdfError, Result};
use crate::objects::Object;
use std::collections::HashSet;

/// Leaf fan-out limit.
pub const LEAF_CAPACITY: usize = 3;

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Leaf {
        /// Sorted `(key, value)` pairs, at most `LEAF_CAPACITY`.
        entries: Vec<(Vec<u8>, Object)>,
    },
    Internal {
        children: Vec<Node>,
    },
}

impl Node {
    fn kmin(&self) -> Option<&[u8]> {
        match self {
            Node::Leaf { entries } => entries.first().map(|(k, _)| k.as_slice()),
            Node::Internal { children } => children.first().and_then(Node::kmin),
        }
    }

    fn kmax(&self) -> Option<&[u8]> {
        match self {
            Node::Leaf { entries } => entries.last().map(|(k, _)| k.as_slice()),
            Node::Internal { children } => children.last().and_then(Node::kmax),
        }
    }

    fn lookup(&self, key: &[u8]) -> Option<&Object> {
        match self {
            Node::Leaf { entries } => entries
                .binary_search_by(|(k, _)| k.as_slice().cmp(key))
                .ok()
                .map(|i| &entries[i].1),
            Node::Internal { children } => {
                let child = children.iter().find(|c| {
                    c.kmax().map(|kmax| key <= kmax).unwrap_or(false)
                })?;
                child.lookup(key)
            }
        }
    }

    /// Insert, returning the right half when this node split.
    fn insert(&mut self, key: Vec<u8>, value: Object) -> Option<Node> {
        match self {
            Node::Leaf { entries } => {
                match entries.binary_search_by(|(k, _)| k.as_slice().cmp(&key)) {
                    Ok(i) => {
                        entries[i].1 = value;
                        None
                    }
                    Err(i) => {
                        entries.insert(i, (key, value));
                        if entries.len() <= LEAF_CAPACITY {
                            return None;
                        }
                        // Split at the midpoint.
                        let right = entries.split_off(LEAF_CAPACITY / 2 + 1);
                        Some(Node::Leaf { entries: right })
                    }
                }
            }
            Node::Internal { children } => {
                let index = children
                    .iter()
                    .position(|c| c.kmax().map(|kmax| key.as_slice() <= kmax).unwrap_or(false))
                    .unwrap_or(children.len() - 1);
                let split = children[index].insert(key, value)?;
                children.insert(index + 1, split);
                if children.len() <= LEAF_CAPACITY {
                    return None;
                }
                let right = children.split_off(LEAF_CAPACITY / 2 + 1);
                Some(Node::Internal { children: right })
            }
        }
    }

    fn remove(&mut self, key: &[u8]) -> Option<Object> {
        match self {
            Node::Leaf { entries } => entries
                .binary_search_by(|(k, _)| k.as_slice().cmp(key))
                .ok()
                .map(|i| entries.remove(i).1),
            Node::Internal { children } => {
                let index = children
                    .iter()
                    .position(|c| c.kmax().map(|kmax| key <= kmax).unwrap_or(false))?;
                let removed = children[index].remove(key)?;
                if children[index].is_empty() {
                    children.remove(index);
                }
                // Collapse a single-child internal into the child.
                if children.len() == 1 {
                    let child = children.pop().expect("one child");
                    *self = child;
                }
                Some(removed)
            }
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            Node::Leaf { entries } => entries.is_empty(),
            Node::Internal { children } => children.is_empty(),
        }
    }

    fn flatten_into(&self, out: &mut Vec<(Vec<u8>, Object)>) {
        match self {
            Node::Leaf { entries } => out.extend(entries.iter().cloned()),
            Node::Internal { children } => {
                for child in children {
                    child.flatten_into(out);
                }
            }
        }
    }

    fn max_leaf_len(&self) -> usize {
        match self {
            Node::Leaf { entries } => entries.len(),
            Node::Internal { children } => {
                children.iter().map(Node::max_leaf_len).max().unwrap_or(0)
            }
        }
    }
}

/// An in-memory name tree.
#[derive(Debug, Clone, PartialEq)]
pub struct NameTree {
    root: Node,
    len: usize,
}

impl Default for NameTree {
    fn default() -> Self {
        Self::new()
    }
}

impl NameTree {
    pub fn new() -> Self {
        Self {
            root: Node::Leaf {
                entries: Vec::new(),
            },
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn kmin(&self) -> Option<&[u8]> {
        self.root.kmin()
    }

    pub fn kmax(&self) -> Option<&[u8]> {
        self.root.kmax()
    }

    pub fn lookup(&self, key: &[u8]) -> Option<&Object> {
        self.root.lookup(key)
    }

    pub fn insert(&mut self, key: impl AsRef<[u8]>, value: Object) {
        let key = key.as_ref().to_vec();
        let existed = self.lookup(&key).is_some();
        if let Some(right) = self.root.insert(key, value) {
            let left = std::mem::replace(
                &mut self.root,
                Node::Internal {
                    children: Vec::new(),
                },
            );
            self.root = Node::Internal {
                children: vec![left, right],
            };
        }
        if !existed {
            self.len += 1;
        }
    }

    pub fn remove(&mut self, key: &[u8]) -> Option<Object> {
        let removed = self.root.remove(key)?;
        self.len -= 1;
        Some(removed)
    }

    /// All entries in key order.
    pub fn entries(&self) -> Vec<(Vec<u8>, Object)> {
        let mut out = Vec::with_capacity(self.len);
        self.root.flatten_into(&mut out);
        out
    }

    /// Largest leaf occupancy; never exceeds `LEAF_CAPACITY`.
    pub fn max_leaf_len(&self) -> usize {
        self.root.max_leaf_len()
    }

    /// Resolve a name tree from its PDF dictionary form, following `Kids`
    /// references with a cycle guard.
    pub fn from_document(doc: &mut Document, root: &Object) -> Result<Self> {
        let mut tree = Self::new();
        let mut visited = HashSet::new();
        let root = doc.resolve(root)?;
        collect_names(doc, &root, &mut tree, &mut visited)?;
        Ok(tree)
    }
}

fn collect_names(
    doc: &mut Document,
    node: &Object,
    tree: &mut NameTree,
    visited: &mut HashSet<u32>,
) -> Result<()> {
    let dict = node.expect_dict()?;

    if let Some(names) = dict.get_array(b"Names") {
        for pair in names.chunks(2) {
            let [key, value] = pair else {
                return Err(PdfError::CorruptObject {
                    offset: 0,
                    reason: "odd Names array in name tree".to_string(),
                });
            };
            let key = key.expect_string()?.to_vec();
            tree.insert(key, value.clone());
        }
    }

    if let Some(kids) = dict.get_array(b"Kids").cloned() {
        for kid in kids {
            if let Some(id) = kid.as_reference() {
                if !visited.insert(id.number()) {
                    return Err(PdfError::CorruptObject {
                        offset: 0,
                        reason: format!("cycle in name tree at object {}", id.number()),
                    });
                }
            }
            let kid = doc.resolve(&kid)?;
            collect_names(doc, &kid, tree, visited)?;
        }
    }
    Ok(())
}
