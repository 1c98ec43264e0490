//! Page selection and page-tree mutations
//!
//! Selections are ordered lists of expressions over 1-based page numbers
//! (`N`, `N-M`, `N-`, `-N`, `even`, `odd`, with `!`/`n` prefixes for
//! exclusion) evaluated left-to-right into a set. Out-of-range numbers
//! clamp in Relaxed mode and reject in Strict.

use crate::config::ValidationMode;
use crate::document::Document;
use crate::error::{PdfError, Result};
use crate::objects::{Dictionary, Object, ObjectId};
use std::collections::{BTreeSet, HashSet};

/// US Letter, the fallback when no sibling supplies a MediaBox.
const DEFAULT_MEDIA_BOX: [i64; 4] = [0, 0, 612, 792];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Range {
    Single(u32),
    Span(u32, u32),
    From(u32),
    UpTo(u32),
    Even,
    Odd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Expr {
    range: Range,
    exclude: bool,
}

/// A compiled page-selection expression list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSelection {
    exprs: Vec<Expr>,
}

impl PageSelection {
    /// Parse a comma-separated selection string.
    pub fn parse(input: &str) -> Result<Self> {
        let mut exprs = Vec::new();
        for raw in input.split(',') {
            let token = raw.trim();
            if token.is_empty() {
                continue;
            }
            exprs.push(parse_expr(token)?);
        }
        if exprs.is_empty() {
            return Err(PdfError::InvalidPageSelection(
                "empty selection".to_string(),
            ));
        }
        Ok(Self { exprs })
    }

    /// Evaluate against a document of `page_count` pages.
    pub fn resolve(&self, page_count: u32, mode: ValidationMode) -> Result<BTreeSet<u32>> {
        let clamp = mode != ValidationMode::Strict;
        // A selection that only excludes starts from the full set.
        let mut set: BTreeSet<u32> = if self.exprs.iter().all(|e| e.exclude) {
            (1..=page_count).collect()
        } else {
            BTreeSet::new()
        };

        for expr in &self.exprs {
            let members = materialize(expr.range, page_count, clamp)?;
            if expr.exclude {
                for page in members {
                    set.remove(&page);
                }
            } else {
                set.extend(members);
            }
        }
        Ok(set)
    }
}

fn parse_expr(token: &str) -> Result<Expr> {
    let (exclude, rest) = if let Some(rest) = token.strip_prefix('!') {
        (true, rest)
    } else if let Some(rest) = token
        .strip_prefix('n')
        .filter(|r| r.starts_with(|c: char| c.is_ascii_digit() || c == '-') || *r == "even" || *r == "odd")
    {
        (true, rest)
    } else {
        (false, token)
    };

    let range = match rest {
        "even" => Range::Even,
        "odd" => Range::Odd,
        _ => match rest.split_once('-') {
            Some(("", upper)) => Range::UpTo(parse_page_number(upper)?),
            Some((lower, "")) => Range::From(parse_page_number(lower)?),
            Some((lower, upper)) => {
                let lower = parse_page_number(lower)?;
                let upper = parse_page_number(upper)?;
                if lower > upper {
                    return Err(PdfError::InvalidPageSelection(format!(
                        "descending range {lower}-{upper}"
                    )));
                }
                Range::Span(lower, upper)
            }
            None => Range::Single(parse_page_number(rest)?),
        },
    };
    Ok(Expr { range, exclude })
}

fn parse_page_number(text: &str) -> Result<u32> {
    let value: u32 = text
        .parse()
        .map_err(|_| PdfError::InvalidPageSelection(format!("bad page number '{text}'")))?;
    if value == 0 {
        return Err(PdfError::InvalidPageSelection(
            "page numbers are 1-based".to_string(),
        ));
    }
    Ok(value)
}

fn materialize(range: Range, page_count: u32, clamp: bool) -> Result<Vec<u32>> {
    let clip = |n: u32| -> Result<u32> {
        if n <= page_count {
            Ok(n)
        } else if clamp {
            Ok(page_count)
        } else {
            Err(PdfError::InvalidPageNumber(n))
        }
    };

    Ok(match range {
        Range::Single(n) => {
            if n > page_count && clamp {
                Vec::new()
            } else {
                vec![clip(n)?]
            }
        }
        Range::Span(a, b) => (clip(a.min(page_count))?..=clip(b)?).collect(),
        Range::From(a) => {
            if a > page_count && !clamp {
                return Err(PdfError::InvalidPageNumber(a));
            }
            (a.min(page_count)..=page_count).collect()
        }
        Range::UpTo(b) => (1..=clip(b)?).collect(),
        Range::Even => (2..=page_count).step_by(2).collect(),
        Range::Odd => (1..=page_count).step_by(2).collect(),
    })
}

/// Remove the selected pages from the page tree, freeing their page
/// objects. Removing every page is rejected: a document must keep at
/// least one.
pub fn remove_pages(doc: &mut Document, remove: &BTreeSet<u32>) -> Result<()> {
    let pages = doc.pages()?;
    if remove.len() >= pages.len() && (1..=pages.len() as u32).all(|n| remove.contains(&n)) {
        return Err(PdfError::InvalidPageSelection(
            "selection removes every page".to_string(),
        ));
    }

    for (index, page_ref) in pages.iter().enumerate() {
        let page_number = index as u32 + 1;
        if !remove.contains(&page_number) {
            continue;
        }
        detach_page(doc, *page_ref)?;
        doc.free_object(page_ref.number());
    }
    Ok(())
}

/// Unlink a page from its parent `Kids` and decrement `Count` up the
/// ancestor chain.
fn detach_page(doc: &mut Document, page_ref: ObjectId) -> Result<()> {
    let page = doc.get(page_ref)?;
    let parent_ref = page
        .expect_dict()?
        .get(b"Parent")
        .and_then(Object::as_reference)
        .ok_or_else(|| PdfError::MissingKey("Parent".to_string()))?;

    let mut parent = doc.get(parent_ref)?.expect_dict()?.clone();
    let mut kids = parent
        .get_array(b"Kids")
        .cloned()
        .ok_or_else(|| PdfError::MissingKey("Kids".to_string()))?;
    kids.retain(|kid| kid.as_reference() != Some(page_ref));
    parent.set("Kids", Object::Array(kids));
    doc.set_object(parent_ref, Object::Dictionary(parent));

    adjust_counts(doc, parent_ref, -1)
}

/// Insert an empty page before 1-based position `before`
/// (`page_count + 1` appends). Returns the new page's id.
pub fn insert_blank_page(doc: &mut Document, before: u32) -> Result<ObjectId> {
    let pages = doc.pages()?;
    let count = pages.len() as u32;
    if before == 0 || before > count + 1 {
        return Err(PdfError::InvalidPageNumber(before));
    }
    let append = before == count + 1;
    let sibling = if append {
        pages[count as usize - 1]
    } else {
        pages[before as usize - 1]
    };

    let sibling_dict = doc.get(sibling)?.expect_dict()?.clone();
    let parent_ref = sibling_dict
        .get(b"Parent")
        .and_then(Object::as_reference)
        .ok_or_else(|| PdfError::MissingKey("Parent".to_string()))?;
    let media_box = doc
        .page_attr(sibling, b"MediaBox")?
        .unwrap_or_else(|| Object::Array(DEFAULT_MEDIA_BOX.iter().map(|&v| Object::Integer(v)).collect()));

    let mut page = Dictionary::new();
    page.set("Type", Object::name("Page"));
    page.set("Parent", Object::Reference(parent_ref));
    page.set("MediaBox", media_box);
    let new_page = doc.add_object(Object::Dictionary(page));

    let mut parent = doc.get(parent_ref)?.expect_dict()?.clone();
    let mut kids = parent
        .get_array(b"Kids")
        .cloned()
        .ok_or_else(|| PdfError::MissingKey("Kids".to_string()))?;
    let position = kids
        .iter()
        .position(|kid| kid.as_reference() == Some(sibling))
        .ok_or_else(|| PdfError::CorruptObject {
            offset: 0,
            reason: "page missing from parent Kids".to_string(),
        })?;
    let position = if append { position + 1 } else { position };
    kids.insert(position, Object::Reference(new_page));
    parent.set("Kids", Object::Array(kids));
    doc.set_object(parent_ref, Object::Dictionary(parent));

    adjust_counts(doc, parent_ref, 1)?;
    Ok(new_page)
}

/// Add `delta` to `Count` on a Pages node and every ancestor.
fn adjust_counts(doc: &mut Document, start: ObjectId, delta: i64) -> Result<()> {
    let mut current = Some(start);
    let mut visited = HashSet::new();
    while let Some(node_ref) = current {
        if !visited.insert(node_ref.number()) {
            break;
        }
        let mut node = doc.get(node_ref)?.expect_dict()?.clone();
        if let Some(count) = node.get_integer(b"Count") {
            node.set("Count", count + delta);
        }
        current = node.get(b"Parent").and_then(Object::as_reference);
        doc.set_object(node_ref, Object::Dictionary(node));
    }
    Ok(())
}
