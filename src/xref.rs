//! Cross-reference table
//!
//! Object directory mapping object numbers to byte offsets, free-list
//! slots, or positions inside object streams (ISO 32000-1 Section 7.5.4).
//! Entry 0 heads a cyclic free list and always carries generation 65535.

use crate::error::{PdfError, Result};
use crate::objects::ObjectId;
use std::collections::BTreeMap;
use tracing::warn;

pub const FREE_HEAD_GENERATION: u16 = 65535;

/// One slot of the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XrefEntry {
    Free {
        next_free: u32,
        generation: u16,
    },
    InUse {
        offset: u64,
        generation: u16,
    },
    /// Object lives inside the object stream `container` at `index`.
    Compressed {
        container: u32,
        index: u32,
    },
}

impl XrefEntry {
    pub fn generation(&self) -> u16 {
        match self {
            XrefEntry::Free { generation, .. } | XrefEntry::InUse { generation, .. } => *generation,
            // Compressed objects always have generation 0.
            XrefEntry::Compressed { .. } => 0,
        }
    }

    pub fn is_free(&self) -> bool {
        matches!(self, XrefEntry::Free { .. })
    }
}

/// The document's object directory.
#[derive(Debug, Clone, Default)]
pub struct XrefTable {
    entries: BTreeMap<u32, XrefEntry>,
}

impl XrefTable {
    /// An empty table with only the free-list head.
    pub fn new() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(
            0,
            XrefEntry::Free {
                next_free: 0,
                generation: FREE_HEAD_GENERATION,
            },
        );
        Self { entries }
    }

    pub fn get(&self, obj_num: u32) -> Option<&XrefEntry> {
        self.entries.get(&obj_num)
    }

    /// Install an entry only when the slot is still empty (first-seen
    /// wins; trailers are processed newest-first).
    pub fn insert_if_absent(&mut self, obj_num: u32, entry: XrefEntry) {
        self.entries.entry(obj_num).or_insert(entry);
    }

    /// Install or replace an entry unconditionally (mutation path).
    pub fn set(&mut self, obj_num: u32, entry: XrefEntry) {
        self.entries.insert(obj_num, entry);
    }

    /// `Size`: 1 + the highest object number assigned.
    pub fn size(&self) -> u32 {
        self.entries.keys().next_back().map_or(1, |max| max + 1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&u32, &XrefEntry)> {
        self.entries.iter()
    }

    /// Object numbers of all in-use and compressed entries, ascending.
    pub fn occupied(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries
            .iter()
            .filter(|(_, e)| !e.is_free())
            .map(|(n, _)| *n)
    }

    /// Allocate the next object number; generation starts at 0.
    pub fn insert_new(&mut self, offset: u64) -> ObjectId {
        let number = self.size();
        self.entries.insert(
            number,
            XrefEntry::InUse {
                offset,
                generation: 0,
            },
        );
        ObjectId::new(number, 0)
    }

    /// Reuse a free slot when one is available, bumping its generation;
    /// fall back to `insert_new` otherwise. Slots whose generation has
    /// reached 65535 are never reused.
    pub fn insert_and_recycle(&mut self, offset: u64) -> ObjectId {
        let head_next = match self.entries.get(&0) {
            Some(XrefEntry::Free { next_free, .. }) => *next_free,
            _ => 0,
        };
        if head_next == 0 {
            return self.insert_new(offset);
        }

        let Some(XrefEntry::Free {
            next_free,
            generation,
        }) = self.entries.get(&head_next).copied()
        else {
            return self.insert_new(offset);
        };
        if generation >= FREE_HEAD_GENERATION {
            return self.insert_new(offset);
        }

        // Splice the recycled slot out of the list. The generation bump
        // happened when the slot was freed, so the stored value is the
        // next-use generation.
        self.entries.insert(
            0,
            XrefEntry::Free {
                next_free,
                generation: FREE_HEAD_GENERATION,
            },
        );
        self.entries.insert(
            head_next,
            XrefEntry::InUse {
                offset,
                generation,
            },
        );
        ObjectId::new(head_next, generation)
    }

    /// Mark an object free: splice it in right after the head and bump its
    /// generation. Freeing object 0 or an already-free slot is a no-op.
    pub fn free(&mut self, obj_num: u32) {
        if obj_num == 0 {
            return;
        }
        let generation = match self.entries.get(&obj_num) {
            Some(entry) if !entry.is_free() => entry.generation(),
            _ => return,
        };

        let head_next = match self.entries.get(&0) {
            Some(XrefEntry::Free { next_free, .. }) => *next_free,
            _ => 0,
        };
        self.entries.insert(
            0,
            XrefEntry::Free {
                next_free: obj_num,
                generation: FREE_HEAD_GENERATION,
            },
        );
        self.entries.insert(
            obj_num,
            XrefEntry::Free {
                next_free: head_next,
                generation: generation.saturating_add(1),
            },
        );
    }

    /// Splice a freed object out of the free list and mark it in use
    /// again, preserving its generation.
    pub fn undelete(&mut self, obj_num: u32, offset: u64) -> Result<()> {
        let Some(XrefEntry::Free {
            next_free,
            generation,
        }) = self.entries.get(&obj_num).copied()
        else {
            return Err(PdfError::CorruptXRef(format!(
                "undelete of non-free object {obj_num}"
            )));
        };

        // Find the predecessor in the chain.
        let mut current = 0u32;
        loop {
            let next = match self.entries.get(&current) {
                Some(XrefEntry::Free { next_free, .. }) => *next_free,
                _ => break,
            };
            if next == obj_num {
                let pred_gen = self.entries.get(&current).map_or(0, XrefEntry::generation);
                self.entries.insert(
                    current,
                    XrefEntry::Free {
                        next_free,
                        generation: pred_gen,
                    },
                );
                break;
            }
            if next == 0 {
                break;
            }
            current = next;
        }

        self.entries.insert(
            obj_num,
            XrefEntry::InUse {
                offset,
                generation,
            },
        );
        Ok(())
    }

    /// Repair the free list: the head must exist with generation 65535,
    /// the chain must terminate back at 0, and every free entry must be
    /// reachable exactly once. Unreachable free entries are spliced in.
    pub fn ensure_valid_free_list(&mut self) {
        // Repair the head.
        match self.entries.get(&0) {
            Some(XrefEntry::Free {
                generation: FREE_HEAD_GENERATION,
                ..
            }) => {}
            Some(XrefEntry::Free { next_free, .. }) => {
                warn!("free-list head generation repaired to 65535");
                let next_free = *next_free;
                self.entries.insert(
                    0,
                    XrefEntry::Free {
                        next_free,
                        generation: FREE_HEAD_GENERATION,
                    },
                );
            }
            _ => {
                warn!("free-list head missing, rebuilt");
                self.entries.insert(
                    0,
                    XrefEntry::Free {
                        next_free: 0,
                        generation: FREE_HEAD_GENERATION,
                    },
                );
            }
        }

        // Walk the chain, clipping cycles that skip the head.
        let mut reachable = std::collections::HashSet::new();
        reachable.insert(0u32);
        let mut current = 0u32;
        loop {
            let next = match self.entries.get(&current) {
                Some(XrefEntry::Free { next_free, .. }) => *next_free,
                _ => {
                    // Chain ran into a non-free slot; terminate it at the
                    // last good link.
                    let generation = self.entries.get(&current).map_or(0, XrefEntry::generation);
                    self.entries.insert(
                        current,
                        XrefEntry::Free {
                            next_free: 0,
                            generation,
                        },
                    );
                    break;
                }
            };
            if next == 0 {
                break;
            }
            if !reachable.insert(next) {
                warn!(object = next, "cycle in free list clipped");
                let generation = self.entries.get(&current).map_or(0, XrefEntry::generation);
                self.entries.insert(
                    current,
                    XrefEntry::Free {
                        next_free: 0,
                        generation,
                    },
                );
                break;
            }
            current = next;
        }

        // Splice in any free entry the walk missed.
        let orphans: Vec<u32> = self
            .entries
            .iter()
            .filter(|(n, e)| e.is_free() && !reachable.contains(n))
            .map(|(n, _)| *n)
            .collect();
        for obj_num in orphans {
            warn!(object = obj_num, "unreachable free entry spliced into list");
            let head_next = match self.entries.get(&0) {
                Some(XrefEntry::Free { next_free, .. }) => *next_free,
                _ => 0,
            };
            let generation = self.entries.get(&obj_num).map_or(0, XrefEntry::generation);
            self.entries.insert(
                0,
                XrefEntry::Free {
                    next_free: obj_num,
                    generation: FREE_HEAD_GENERATION,
                },
            );
            self.entries.insert(
                obj_num,
                XrefEntry::Free {
                    next_free: head_next,
                    generation,
                },
            );
        }
    }

    /// The free-list chain starting at the head, for tests and the writer.
    pub fn free_chain(&self) -> Vec<u32> {
        let mut chain = vec![0u32];
        let mut seen = std::collections::HashSet::from([0u32]);
        let mut current = 0u32;
        loop {
            let next = match self.entries.get(&current) {
                Some(XrefEntry::Free { next_free, .. }) => *next_free,
                _ => break,
            };
            if next == 0 || !seen.insert(next) {
                break;
            }
            chain.push(next);
            current = next;
        }
        chain
    }
}
