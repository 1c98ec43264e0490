//! Structural validation
//!
//! A typed recursive walk from `Root` enforcing per-dictionary rules. In
//! Strict mode any deviation fails; in Relaxed mode widely-seen violations
//! are logged and dropped. As a side effect the walk populates the
//! per-page annotation cache and resolves the document name trees.

use crate::config::{CancelFlag, ValidationMode};
use crate::document::Document;
use crate::error::{PdfError, Result};
use crate::name_tree::NameTree;
use crate::objects::{Dictionary, Object, ObjectId};
use std::collections::BTreeMap;
use tracing::warn;

/// Name trees resolved from the catalog `Names` dictionary.
const NAME_TREE_KINDS: [&[u8]; 4] = [
    b"Dests",
    b"EmbeddedFiles",
    b"JavaScript",
    b"AP",
];

/// Caches produced by a validation pass.
#[derive(Debug, Default)]
pub struct ValidationReport {
    /// 1-based page number → annotation subtype → annotation objects.
    pub page_annots: BTreeMap<u32, BTreeMap<Vec<u8>, Vec<ObjectId>>>,
    /// Tree kind (e.g. "EmbeddedFiles") → resolved tree.
    pub name_trees: BTreeMap<String, NameTree>,
    /// Violations accepted in Relaxed mode.
    pub warnings: Vec<String>,
}

pub fn validate(doc: &mut Document, cancel: &CancelFlag) -> Result<ValidationReport> {
    let mode = doc.config().validation;
    let mut report = ValidationReport::default();
    if mode == ValidationMode::None {
        return Ok(report);
    }

    let catalog = doc.catalog()?;
    check_catalog(&catalog, mode, &mut report)?;

    let pages = doc.pages()?;
    let declared_count = doc
        .resolve(catalog.get_required(b"Pages")?)?
        .as_dict()
        .and_then(|d| d.get_integer(b"Count"));
    if declared_count != Some(pages.len() as i64) {
        violation(
            mode,
            &mut report,
            "Pages Count disagrees with leaf count",
            0,
        )?;
    }

    for (index, page_ref) in pages.iter().enumerate() {
        cancel.check()?;
        let page_number = index as u32 + 1;
        check_page(doc, *page_ref, page_number, mode, &mut report)?;
    }

    resolve_name_trees(doc, &catalog, mode, &mut report)?;
    Ok(report)
}

fn violation(
    mode: ValidationMode,
    report: &mut ValidationReport,
    rule: &str,
    obj_num: u32,
) -> Result<()> {
    match mode {
        ValidationMode::Strict => Err(PdfError::ValidationFailure {
            rule: rule.to_string(),
            obj_num,
        }),
        _ => {
            warn!(object = obj_num, rule, "validation violation accepted");
            report.warnings.push(format!("object {obj_num}: {rule}"));
            Ok(())
        }
    }
}

fn check_catalog(
    catalog: &Dictionary,
    mode: ValidationMode,
    report: &mut ValidationReport,
) -> Result<()> {
    if !catalog.is_type(b"Catalog") {
        violation(mode, report, "catalog Type must be /Catalog", 0)?;
    }
    if catalog.get(b"Pages").and_then(Object::as_reference).is_none() {
        // Never acceptable: nothing downstream works without a page tree.
        return Err(PdfError::CorruptTrailer("catalog missing Pages".to_string()));
    }
    Ok(())
}

fn check_page(
    doc: &mut Document,
    page_ref: ObjectId,
    page_number: u32,
    mode: ValidationMode,
    report: &mut ValidationReport,
) -> Result<()> {
    let page = doc.get(page_ref)?;
    let dict = page.expect_dict()?.clone();

    if dict.get(b"Parent").and_then(Object::as_reference).is_none() {
        violation(mode, report, "page missing Parent", page_ref.number())?;
    }
    if doc.page_attr(page_ref, b"MediaBox")?.is_none() {
        violation(
            mode,
            report,
            "page has no MediaBox, inherited or direct",
            page_ref.number(),
        )?;
    } else if let Some(mb) = doc.page_attr(page_ref, b"MediaBox")? {
        let ok = mb
            .as_array()
            .map(|a| a.len() == 4 && a.iter().all(|v| v.as_real().is_some()))
            .unwrap_or(false);
        if !ok {
            violation(
                mode,
                report,
                "MediaBox must be four numbers",
                page_ref.number(),
            )?;
        }
    }

    // Contents: a stream or an array of stream references.
    if let Some(contents) = dict.get(b"Contents") {
        let resolved = doc.resolve(contents)?;
        let ok = match &resolved {
            Object::Stream(_) => true,
            Object::Array(items) => items
                .iter()
                .all(|i| matches!(i, Object::Reference(_) | Object::Stream(_))),
            Object::Null => true,
            _ => false,
        };
        if !ok {
            violation(
                mode,
                report,
                "Contents must be a stream or array of streams",
                page_ref.number(),
            )?;
        }
    }

    collect_annotations(doc, &dict, page_ref, page_number, mode, report)
}

fn collect_annotations(
    doc: &mut Document,
    page: &Dictionary,
    page_ref: ObjectId,
    page_number: u32,
    mode: ValidationMode,
    report: &mut ValidationReport,
) -> Result<()> {
    let Some(annots) = page.get(b"Annots") else {
        return Ok(());
    };
    let annots = doc.resolve(annots)?;
    let Some(items) = annots.as_array().cloned() else {
        violation(mode, report, "Annots must be an array", page_ref.number())?;
        return Ok(());
    };

    for item in items {
        let Some(annot_ref) = item.as_reference() else {
            // Direct annotation dicts are tolerated but uncacheable by id.
            violation(
                mode,
                report,
                "annotation should be an indirect reference",
                page_ref.number(),
            )?;
            continue;
        };
        let annot = doc.get(annot_ref)?;
        let Some(dict) = annot.as_dict() else {
            violation(mode, report, "annotation must be a dictionary", annot_ref.number())?;
            continue;
        };

        let Some(subtype) = dict.get_name(b"Subtype").map(<[u8]>::to_vec) else {
            violation(mode, report, "annotation missing Subtype", annot_ref.number())?;
            continue;
        };
        let rect_ok = dict
            .get_array(b"Rect")
            .map(|r| r.len() == 4 && r.iter().all(|v| v.as_real().is_some()))
            .unwrap_or(false);
        if !rect_ok {
            violation(
                mode,
                report,
                "annotation Rect must be four numbers",
                annot_ref.number(),
            )?;
        }

        report
            .page_annots
            .entry(page_number)
            .or_default()
            .entry(subtype)
            .or_default()
            .push(annot_ref);
    }
    Ok(())
}

fn resolve_name_trees(
    doc: &mut Document,
    catalog: &Dictionary,
    mode: ValidationMode,
    report: &mut ValidationReport,
) -> Result<()> {
    let Some(names) = catalog.get(b"Names") else {
        return Ok(());
    };
    let names = doc.resolve(names)?;
    let Some(names) = names.as_dict() else {
        violation(mode, report, "Names must be a dictionary", 0)?;
        return Ok(());
    };

    for kind in NAME_TREE_KINDS {
        let Some(root) = names.get(kind) else {
            continue;
        };
        let root = root.clone();
        match NameTree::from_document(doc, &root) {
            Ok(tree) => {
                report
                    .name_trees
                    .insert(String::from_utf8_lossy(kind).into_owned(), tree);
            }
            Err(e) => {
                violation(mode, report, &format!("malformed name tree: {e}"), 0)?;
            }
        }
    }
    Ok(())
}

/// One-line description of an annotation: subtype, object id, rect, and
/// contents. Subtypes without a specific form fall back to the generic
/// rendering.
pub fn annotation_summary(doc: &mut Document, id: ObjectId) -> Result<String> {
    let annot = doc.get(id)?;
    let dict = annot.expect_dict()?;

    let subtype = dict
        .get_name(b"Subtype")
        .map(|s| String::from_utf8_lossy(s).into_owned())
        .unwrap_or_else(|| "Unknown".to_string());
    let rect = dict
        .get_array(b"Rect")
        .map(|r| {
            let nums: Vec<String> = r
                .iter()
                .filter_map(|v| v.as_real().map(|f| format!("{f:.2}")))
                .collect();
            format!("[{}]", nums.join(" "))
        })
        .unwrap_or_else(|| "[]".to_string());

    let detail = match subtype.as_str() {
        "Link" => dict
            .get(b"A")
            .map(|_| "action".to_string())
            .or_else(|| dict.get(b"Dest").map(|_| "destination".to_string()))
            .unwrap_or_default(),
        "Text" | "FreeText" | "Popup" => dict
            .get(b"Contents")
            .and_then(Object::as_text)
            .unwrap_or_default(),
        "Widget" => dict
            .get_name(b"FT")
            .map(|ft| String::from_utf8_lossy(ft).into_owned())
            .unwrap_or_default(),
        _ => dict
            .get(b"Contents")
            .and_then(Object::as_text)
            .unwrap_or_default(),
    };

    Ok(format!("{subtype} {id} {rect} {detail}").trim_end().to_string())
}
