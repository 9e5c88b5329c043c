//! Cross-reference tables.
//!
//! Three sources feed the same structure: the classic `xref` section, the
//! PDF 1.5 cross-reference stream, and a full-file scan used when both are
//! broken. Tables are kept newest-first; within and across tables the
//! first entry seen for an object number wins, which is how incremental
//! updates shadow older revisions.

use crate::error::{PdfError, Result};
use crate::model::{Dict, PDFStream};
use crate::parser::PDFParser;
use once_cell::sync::Lazy;
use regex::bytes::Regex;
use std::collections::HashMap;

/// Location of one object.
#[derive(Debug, Clone, Copy)]
pub(crate) struct XRefEntry {
    /// Byte offset in the file, or index within an object stream.
    pub offset: usize,
    /// Generation number (always 0 for compressed objects).
    pub genno: u32,
    /// Object stream holding this object, when compressed.
    pub stream_objid: Option<u32>,
}

/// One cross-reference table plus its trailer.
#[derive(Debug, Default)]
pub(crate) struct XRef {
    offsets: HashMap<u32, XRefEntry>,
    pub trailer: Dict,
    /// Set when this table came from scanning the file for `obj` headers.
    pub is_fallback: bool,
}

impl XRef {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_pos(&self, objid: u32) -> Option<&XRefEntry> {
        self.offsets.get(&objid)
    }

    pub fn get_objids(&self) -> impl Iterator<Item = u32> + '_ {
        self.offsets.keys().copied()
    }

    /// Record an entry unless the object number is already present.
    fn insert(&mut self, objid: u32, entry: XRefEntry) {
        self.offsets.entry(objid).or_insert(entry);
    }

    /// Parse a classic `xref` section starting at `pos` in the file.
    ///
    /// Entry lines are nominally 20 bytes but real files pad and mangle
    /// them, so numbers are read flexibly rather than at fixed offsets.
    pub fn parse_classic(file: &[u8], pos: usize) -> Result<Self> {
        let mut xref = Self::new();
        let data = &file[pos..];
        if !data.starts_with(b"xref") {
            return Err(PdfError::SyntaxError("expected 'xref' keyword".into()));
        }

        let mut cursor = 4;
        loop {
            skip_xref_whitespace(data, &mut cursor);
            if cursor >= data.len() {
                break;
            }
            if data[cursor..].starts_with(b"trailer") {
                cursor += 7;
                break;
            }

            // Subsection header: start count
            let (start_objid, consumed) = read_number(&data[cursor..])?;
            cursor += consumed;
            skip_xref_whitespace(data, &mut cursor);
            let (count, consumed) = read_number(&data[cursor..])?;
            cursor += consumed;
            skip_to_next_line(data, &mut cursor);

            let mut base_objid = start_objid;
            for i in 0..count {
                let (offset, consumed) = read_number(&data[cursor..])?;
                cursor += consumed;
                while cursor < data.len() && data[cursor] == b' ' {
                    cursor += 1;
                }
                let (genno, consumed) = read_number(&data[cursor..])?;
                cursor += consumed;
                while cursor < data.len() && data[cursor] == b' ' {
                    cursor += 1;
                }
                let marker = if cursor < data.len() { data[cursor] } else { b'f' };
                cursor += 1;

                // Some producers start the first subsection at 1 but still
                // emit the object-0 free entry; shift the base so the rest
                // of the subsection lines up.
                if i == 0 && base_objid > 0 && marker == b'f' && offset == 0 && genno == 65535 {
                    base_objid -= 1;
                }

                let objid = base_objid + i;
                skip_to_next_line(data, &mut cursor);

                if marker == b'n' {
                    xref.insert(
                        objid as u32,
                        XRefEntry {
                            offset: offset as usize,
                            genno: genno as u32,
                            stream_objid: None,
                        },
                    );
                }
            }
        }

        // Trailer dictionary follows the keyword.
        let data = &file[pos + cursor..];
        let mut skip = 0;
        skip_xref_whitespace(data, &mut skip);
        if data[skip..].starts_with(b"<<") {
            let mut parser = PDFParser::new(&data[skip..]);
            if let Ok(trailer_obj) = parser.parse_object()
                && let Ok(dict) = trailer_obj.as_dict()
            {
                xref.trailer = dict.clone();
            }
        }

        Ok(xref)
    }

    /// Build a table from a cross-reference stream whose payload has
    /// already been decoded.
    pub fn from_stream(stream: &PDFStream, decoded: &[u8]) -> Result<Self> {
        let w = stream
            .get("W")
            .ok_or_else(|| PdfError::SyntaxError("missing W in xref stream".into()))?;
        let w_arr = w.as_array()?;
        if w_arr.len() != 3 {
            return Err(PdfError::SyntaxError("W must have 3 elements".into()));
        }
        let w0 = w_arr[0].as_int()? as usize;
        let w1 = w_arr[1].as_int()? as usize;
        let w2 = w_arr[2].as_int()? as usize;
        let entry_size = w0 + w1 + w2;
        if entry_size == 0 {
            return Err(PdfError::SyntaxError("zero-width xref stream entries".into()));
        }

        let size = stream
            .get("Size")
            .ok_or_else(|| PdfError::SyntaxError("missing Size in xref stream".into()))?
            .as_int()? as usize;

        // Index defaults to a single run covering the whole table.
        let index = if let Some(idx) = stream.get("Index") {
            let arr = idx.as_array()?;
            let mut pairs = Vec::new();
            let mut i = 0;
            while i + 1 < arr.len() {
                pairs.push((arr[i].as_int()? as u32, arr[i + 1].as_int()? as usize));
                i += 2;
            }
            pairs
        } else {
            vec![(0, size)]
        };

        let mut xref = Self::new();
        let mut data_pos = 0;

        for (start_objid, count) in index {
            for i in 0..count {
                if data_pos + entry_size > decoded.len() {
                    break;
                }
                let objid = start_objid + i as u32;

                // A zero-width type field defaults to 1 (in-use); the other
                // fields default to 0.
                let obj_type = if w0 > 0 {
                    read_be(&decoded[data_pos..data_pos + w0])
                } else {
                    1
                };
                let field1 = read_be(&decoded[data_pos + w0..data_pos + w0 + w1]);
                let field2 = read_be(&decoded[data_pos + w0 + w1..data_pos + entry_size]);
                data_pos += entry_size;

                match obj_type {
                    0 => {} // free
                    1 => xref.insert(
                        objid,
                        XRefEntry {
                            offset: field1 as usize,
                            genno: field2 as u32,
                            stream_objid: None,
                        },
                    ),
                    2 => xref.insert(
                        objid,
                        XRefEntry {
                            offset: field2 as usize,
                            genno: 0,
                            stream_objid: Some(field1 as u32),
                        },
                    ),
                    _ => {}
                }
            }
        }

        // The stream's own dictionary doubles as the trailer; structural
        // keys that only describe the stream itself are not trailer data.
        for (key, value) in &stream.attrs {
            if !matches!(key.as_str(), "Length" | "Filter" | "DecodeParms" | "W" | "Index") {
                xref.trailer.insert(key.clone(), value.clone());
            }
        }

        Ok(xref)
    }

    /// Rebuild a table by scanning the whole file for `N G obj` headers.
    ///
    /// Later definitions of the same object number override earlier ones
    /// (the opposite of normal xref precedence) because a scan walks the
    /// file oldest-revision-first. Trailer dictionaries found along the
    /// way are merged the same direction.
    pub fn rebuild(file: &[u8]) -> Result<Self> {
        static OBJ_RE: Lazy<Regex> =
            Lazy::new(|| Regex::new(r"(\d+)\s+(\d+)\s+obj\b").unwrap());
        static TRAILER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"trailer[\r\n \t]*<<").unwrap());

        let mut xref = Self::new();
        xref.is_fallback = true;

        for cap in OBJ_RE.captures_iter(file) {
            let objid = match std::str::from_utf8(&cap[1])
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
            {
                Some(v) if v > 0 && v <= u64::from(u32::MAX) => v as u32,
                _ => continue,
            };
            let genno = match std::str::from_utf8(&cap[2])
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
            {
                Some(v) if v <= u64::from(u32::MAX) => v as u32,
                _ => continue,
            };
            let pos = cap.get(0).map(|m| m.start()).unwrap_or(0);

            xref.offsets.insert(
                objid,
                XRefEntry {
                    offset: pos,
                    genno,
                    stream_objid: None,
                },
            );
        }

        for m in TRAILER_RE.find_iter(file) {
            let dict_start = m.end() - 2; // back onto the "<<"
            let mut parser = PDFParser::new(&file[dict_start..]);
            if let Ok(trailer_obj) = parser.parse_object()
                && let Ok(dict) = trailer_obj.as_dict()
            {
                for (k, v) in dict {
                    xref.trailer.insert(k.clone(), v.clone());
                }
            }
        }

        if xref.offsets.is_empty() {
            return Err(PdfError::NoValidXRef);
        }

        Ok(xref)
    }
}

fn read_be(bytes: &[u8]) -> u64 {
    let mut val: u64 = 0;
    for &b in bytes {
        val = (val << 8) | u64::from(b);
    }
    val
}

fn skip_xref_whitespace(data: &[u8], cursor: &mut usize) {
    while *cursor < data.len()
        && (data[*cursor] == b' ' || data[*cursor] == b'\n' || data[*cursor] == b'\r')
    {
        *cursor += 1;
    }
}

fn skip_to_next_line(data: &[u8], cursor: &mut usize) {
    while *cursor < data.len() && data[*cursor] != b'\n' && data[*cursor] != b'\r' {
        *cursor += 1;
    }
    while *cursor < data.len() && (data[*cursor] == b'\n' || data[*cursor] == b'\r') {
        *cursor += 1;
    }
}

/// Read a decimal number, returning (value, bytes consumed).
pub(crate) fn read_number(data: &[u8]) -> Result<(i64, usize)> {
    let mut pos = 0;
    let negative = if pos < data.len() && data[pos] == b'-' {
        pos += 1;
        true
    } else {
        false
    };

    let start = pos;
    while pos < data.len() && data[pos].is_ascii_digit() {
        pos += 1;
    }
    if pos == start {
        return Err(PdfError::SyntaxError("expected number".into()));
    }

    let num_str = std::str::from_utf8(&data[start..pos])
        .map_err(|_| PdfError::SyntaxError("invalid number".into()))?;
    let mut num: i64 = num_str
        .parse()
        .map_err(|_| PdfError::SyntaxError("invalid number".into()))?;
    if negative {
        num = -num;
    }

    Ok((num, pos))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PDFObject;

    const CLASSIC: &[u8] = b"xref\n0 3\n0000000000 65535 f \n0000000017 00000 n \n0000000081 00000 n \ntrailer\n<< /Size 3 /Root 1 0 R >>\n";

    #[test]
    fn classic_section_with_free_head() {
        let xref = XRef::parse_classic(CLASSIC, 0).unwrap();
        assert!(xref.get_pos(0).is_none());
        assert_eq!(xref.get_pos(1).unwrap().offset, 17);
        assert_eq!(xref.get_pos(2).unwrap().offset, 81);
        assert_eq!(xref.trailer.get("Size").unwrap().as_int().unwrap(), 3);
    }

    #[test]
    fn misnumbered_subsection_rebases_to_zero() {
        let data = b"xref\n1 2\n0000000000 65535 f \n0000000042 00000 n \ntrailer\n<< /Size 2 >>\n";
        let xref = XRef::parse_classic(data, 0).unwrap();
        assert_eq!(xref.get_pos(1).unwrap().offset, 42);
        assert!(xref.get_pos(2).is_none());
    }

    #[test]
    fn stream_entries_decode_per_w_widths() {
        // W = [1 2 1], Index = [1 2]: one in-use object and one compressed.
        let mut attrs = Dict::new();
        attrs.insert(
            "W".into(),
            PDFObject::Array(vec![
                PDFObject::Int(1),
                PDFObject::Int(2),
                PDFObject::Int(1),
            ]),
        );
        attrs.insert(
            "Index".into(),
            PDFObject::Array(vec![PDFObject::Int(1), PDFObject::Int(2)]),
        );
        attrs.insert("Size".into(), PDFObject::Int(3));
        attrs.insert("Root".into(), PDFObject::Ref(crate::model::PDFObjRef::new(1, 0)));
        let stream = PDFStream::new(attrs, Vec::new());

        let decoded = [
            1u8, 0x01, 0x00, 0x00, // obj 1: offset 0x100, gen 0
            2u8, 0x00, 0x05, 0x02, // obj 2: in stream 5, index 2
        ];
        let xref = XRef::from_stream(&stream, &decoded).unwrap();
        assert_eq!(xref.get_pos(1).unwrap().offset, 0x100);
        let e2 = xref.get_pos(2).unwrap();
        assert_eq!(e2.stream_objid, Some(5));
        assert_eq!(e2.offset, 2);
        // Structural keys stay out of the trailer.
        assert!(!xref.trailer.contains_key("W"));
        assert!(xref.trailer.contains_key("Root"));
    }

    #[test]
    fn rebuild_scans_object_headers() {
        let data = b"%PDF-1.4\n1 0 obj\n<< >>\nendobj\n2 0 obj\n<< >>\nendobj\ntrailer\n<< /Size 3 /Root 1 0 R >>\n";
        let xref = XRef::rebuild(data).unwrap();
        assert!(xref.is_fallback);
        assert_eq!(xref.get_pos(1).unwrap().offset, 9);
        assert!(xref.trailer.contains_key("Root"));
        assert_eq!(xref.get_objids().count(), 2);
    }
}
