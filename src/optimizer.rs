//! Optimization passes
//!
//! Deduplicates page resources by content hash, rewrites resource
//! dictionaries to reference the canonical copies, then frees every
//! object unreachable from the trailer.

use crate::config::CancelFlag;
use crate::document::Document;
use crate::error::Result;
use crate::objects::{Dictionary, Object, ObjectId};
use crate::writer;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Resource categories considered for deduplication.
const DEDUP_CATEGORIES: [&[u8]; 6] = [
    b"Font",
    b"XObject",
    b"ExtGState",
    b"ColorSpace",
    b"Pattern",
    b"Shading",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptimizeStats {
    /// Resource references rewritten to a canonical copy.
    pub deduplicated: usize,
    /// Objects marked free as unreachable.
    pub freed: usize,
}

pub fn optimize(doc: &mut Document, cancel: &CancelFlag) -> Result<OptimizeStats> {
    let mut stats = OptimizeStats::default();
    stats.deduplicated = deduplicate_resources(doc, cancel)?;
    stats.freed = sweep_unreachable(doc, cancel)?;
    Ok(stats)
}

/// MD5 over a canonical serialization of the object (stream bodies
/// included), so identical fonts/images collapse regardless of object
/// number.
fn content_hash(doc: &mut Document, id: ObjectId) -> Result<[u8; 16]> {
    let object = doc.get(id)?;
    let mut bytes = Vec::new();
    match &object {
        Object::Stream(stream) => {
            writer::serialize_object(&mut bytes, &Object::Dictionary(stream.dict.clone()), None)?;
            if let Some(data) = stream.encoded_data() {
                bytes.extend_from_slice(data);
            } else if let Some(data) = stream.decoded_data() {
                bytes.extend_from_slice(data);
            }
        }
        other => writer::serialize_object(&mut bytes, other, None)?,
    }
    Ok(md5::compute(&bytes).0)
}

/// Find where a page's `Resources` actually lives: on the page itself or
/// on an ancestor. Returns the holder and its dictionary.
fn resources_holder(doc: &mut Document, page: ObjectId) -> Result<Option<(ObjectId, Dictionary)>> {
    let mut current = page;
    let mut visited = HashSet::new();
    loop {
        if !visited.insert(current.number()) {
            return Ok(None);
        }
        let node = doc.get(current)?;
        let dict = node.expect_dict()?;
        if dict.get(b"Resources").is_some() {
            return Ok(Some((current, dict.clone())));
        }
        match dict.get(b"Parent").and_then(Object::as_reference) {
            Some(parent) => current = parent,
            None => return Ok(None),
        }
    }
}

fn deduplicate_resources(doc: &mut Document, cancel: &CancelFlag) -> Result<usize> {
    let pages = doc.pages()?;
    let mut canonical: HashMap<[u8; 16], ObjectId> = HashMap::new();
    let mut rewritten = 0usize;
    let mut done_holders: HashSet<u32> = HashSet::new();

    for page in pages {
        cancel.check()?;
        let Some((holder, holder_dict)) = resources_holder(doc, page)? else {
            continue;
        };
        if !done_holders.insert(holder.number()) {
            continue;
        }

        // Resources may be a direct dict on the holder or an indirect one.
        let (target, mut resources) = match holder_dict.get(b"Resources") {
            Some(Object::Dictionary(d)) => (None, d.clone()),
            Some(Object::Reference(rid)) => {
                let rid = *rid;
                if !done_holders.insert(rid.number()) {
                    continue;
                }
                match doc.get(rid)?.as_dict() {
                    Some(d) => (Some(rid), d.clone()),
                    None => continue,
                }
            }
            _ => continue,
        };

        let mut changed = false;
        for category in DEDUP_CATEGORIES {
            let Some(Object::Dictionary(entries)) = resources.get(category).cloned() else {
                continue;
            };
            let mut updated = entries.clone();
            for (name, value) in entries.iter() {
                let Some(res_id) = value.as_reference() else {
                    continue;
                };
                let hash = match content_hash(doc, res_id) {
                    Ok(h) => h,
                    Err(_) => continue,
                };
                let winner = *canonical.entry(hash).or_insert(res_id);
                if winner != res_id {
                    debug!(
                        duplicate = res_id.number(),
                        canonical = winner.number(),
                        "resource deduplicated"
                    );
                    updated.set(name.clone(), Object::Reference(winner));
                    rewritten += 1;
                    changed = true;
                }
            }
            if changed {
                resources.set(category, Object::Dictionary(updated));
            }
        }

        if changed {
            match target {
                Some(rid) => doc.set_object(rid, Object::Dictionary(resources)),
                None => {
                    let mut new_holder = holder_dict.clone();
                    new_holder.set("Resources", Object::Dictionary(resources));
                    doc.set_object(holder, Object::Dictionary(new_holder));
                }
            }
        }
    }
    Ok(rewritten)
}

fn collect_refs(object: &Object, out: &mut Vec<ObjectId>) {
    match object {
        Object::Reference(id) => out.push(*id),
        Object::Array(items) => {
            for item in items {
                collect_refs(item, out);
            }
        }
        Object::Dictionary(dict) => {
            for (_, value) in dict.iter() {
                collect_refs(value, out);
            }
        }
        Object::Stream(stream) => {
            for (_, value) in stream.dict.iter() {
                collect_refs(value, out);
            }
        }
        _ => {}
    }
}

/// Mark-and-sweep from the trailer seeds; everything else goes free.
fn sweep_unreachable(doc: &mut Document, cancel: &CancelFlag) -> Result<usize> {
    let mut stack: Vec<ObjectId> = Vec::new();
    for key in [b"Root".as_ref(), b"Info".as_ref(), b"Encrypt".as_ref()] {
        if let Some(id) = doc.trailer().get(key).and_then(Object::as_reference) {
            stack.push(id);
        }
    }

    let mut reachable: HashSet<u32> = HashSet::new();
    while let Some(id) = stack.pop() {
        cancel.check()?;
        if !reachable.insert(id.number()) {
            continue;
        }
        let object = match doc.get(id) {
            Ok(obj) => obj,
            // Unresolvable targets are left alone; failures are not cached
            // and a later pass may retry.
            Err(_) => continue,
        };
        let mut refs = Vec::new();
        collect_refs(&object, &mut refs);
        stack.extend(refs);
    }

    let candidates: Vec<u32> = doc
        .xref()
        .occupied()
        .filter(|num| !reachable.contains(num))
        .collect();
    let freed = candidates.len();
    for num in candidates {
        debug!(object = num, "freeing unreachable object");
        doc.free_object(num);
    }
    doc.xref_mut().ensure_valid_free_list();
    Ok(freed)
}
