//! Cross-reference emission: classic sections and xref streams.

use crate::error::Result;
use crate::filters;
use crate::objects::{Dictionary, Object};
use crate::xref::{XrefEntry, XrefTable};

/// Group ascending object numbers into contiguous subsection ranges.
fn subsections(numbers: &[u32]) -> Vec<(u32, Vec<u32>)> {
    let mut out: Vec<(u32, Vec<u32>)> = Vec::new();
    for &num in numbers {
        match out.last_mut() {
            Some((first, members)) if *first + members.len() as u32 == num => members.push(num),
            _ => out.push((num, vec![num])),
        }
    }
    out
}

/// Emit a classic `xref` section covering `numbers` (ascending), with
/// fixed 20-byte entries, and return its byte offset.
pub fn write_classic_section(out: &mut Vec<u8>, table: &XrefTable, numbers: &[u32]) -> u64 {
    let section_offset = out.len() as u64;
    out.extend_from_slice(b"xref\n");

    for (first, members) in subsections(numbers) {
        out.extend_from_slice(format!("{first} {}\n", members.len()).as_bytes());
        for num in members {
            let line = match table.get(num) {
                Some(XrefEntry::Free {
                    next_free,
                    generation,
                }) => format!("{next_free:010} {generation:05} f \n"),
                Some(XrefEntry::InUse { offset, generation }) => {
                    format!("{offset:010} {generation:05} n \n")
                }
                // Compressed entries cannot appear in a classic section;
                // the writer rewrites them in-use before emission.
                Some(XrefEntry::Compressed { .. }) | None => {
                    format!("{:010} {:05} f \n", 0, 65535)
                }
            };
            debug_assert_eq!(line.len(), 20);
            out.extend_from_slice(line.as_bytes());
        }
    }
    section_offset
}

/// Emit an xref stream object numbered `stream_obj_num` covering
/// `numbers`, carrying `trailer_keys` in its dictionary, and return its
/// byte offset.
pub fn write_xref_stream(
    out: &mut Vec<u8>,
    table: &XrefTable,
    numbers: &[u32],
    stream_obj_num: u32,
    trailer_keys: &Dictionary,
) -> Result<u64> {
    let offset_width = numbers
        .iter()
        .filter_map(|n| match table.get(*n) {
            Some(XrefEntry::InUse { offset, .. }) => Some(*offset),
            _ => None,
        })
        .max()
        .map(bytes_needed)
        .unwrap_or(1)
        .max(bytes_needed(out.len() as u64));
    let widths = [1usize, offset_width, 2];

    let groups = subsections(numbers);
    let mut index = Vec::new();
    let mut rows = Vec::new();
    for (first, members) in &groups {
        index.push(Object::Integer(*first as i64));
        index.push(Object::Integer(members.len() as i64));
        for &num in members {
            let (entry_type, f2, f3): (u8, u64, u64) = match table.get(num) {
                Some(XrefEntry::Free {
                    next_free,
                    generation,
                }) => (0, *next_free as u64, *generation as u64),
                Some(XrefEntry::InUse { offset, generation }) => {
                    (1, *offset, *generation as u64)
                }
                Some(XrefEntry::Compressed { container, index }) => {
                    (2, *container as u64, *index as u64)
                }
                None => (0, 0, 65535),
            };
            rows.push(entry_type);
            push_be(&mut rows, f2, widths[1]);
            push_be(&mut rows, f3, widths[2]);
        }
    }

    let encoded = filters::encode(
        &rows,
        &[filters::FilterSpec {
            filter: filters::Filter::FlateDecode,
            params: None,
        }],
    )?;

    let mut dict = Dictionary::new();
    dict.set("Type", Object::name("XRef"));
    for (key, value) in trailer_keys.iter() {
        dict.set(key.clone(), value.clone());
    }
    dict.set(
        "W",
        vec![
            Object::Integer(widths[0] as i64),
            Object::Integer(widths[1] as i64),
            Object::Integer(widths[2] as i64),
        ],
    );
    dict.set("Index", Object::Array(index));
    dict.set("Filter", Object::name("FlateDecode"));
    dict.set("Length", encoded.len() as i64);

    let stream_offset = out.len() as u64;
    out.extend_from_slice(format!("{stream_obj_num} 0 obj\n").as_bytes());
    super::serialize_object(out, &Object::Dictionary(dict), None)?;
    out.extend_from_slice(b"\nstream\n");
    out.extend_from_slice(&encoded);
    out.extend_from_slice(b"\nendstream\nendobj\n");
    Ok(stream_offset)
}

fn bytes_needed(value: u64) -> usize {
    let mut needed = 1;
    let mut rest = value >> 8;
    while rest > 0 {
        needed += 1;
        rest >>= 8;
    }
    needed
}

fn push_be(out: &mut Vec<u8>, value: u64, width: usize) {
    for shift in (0..width).rev() {
        out.push((value >> (shift * 8)) as u8);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subsections_grouping() {
        assert_eq!(
            subsections(&[0, 1, 2, 5, 6, 9]),
            vec![(0, vec![0, 1, 2]), (5, vec![5, 6]), (9, vec![9])]
        );
    }

    #[test]
    fn test_classic_entries_are_20_bytes() {
        let mut table = XrefTable::new();
        table.insert_new(17);
        table.insert_new(923);

        let mut out = Vec::new();
        let offset = write_classic_section(&mut out, &table, &[0, 1, 2]);
        assert_eq!(offset, 0);

        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("xref"));
        assert_eq!(lines.next(), Some("0 3"));
        assert_eq!(lines.next(), Some("0000000000 65535 f "));
        assert_eq!(lines.next(), Some("0000000017 00000 n "));
        assert_eq!(lines.next(), Some("0000000923 00000 n "));
    }

    #[test]
    fn test_bytes_needed() {
        assert_eq!(bytes_needed(0), 1);
        assert_eq!(bytes_needed(255), 1);
        assert_eq!(bytes_needed(256), 2);
        assert_eq!(bytes_needed(70000), 3);
    }

    #[test]
    fn test_push_be() {
        let mut out = Vec::new();
        push_be(&mut out, 0x0102, 3);
        assert_eq!(out, vec![0, 1, 2]);
    }
}
