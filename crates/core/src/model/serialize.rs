//! Byte rendering of primitive objects.
//!
//! Every object kind has a self-describing file form; the writer emits it
//! and the parser reads it back. Names escape reserved bytes as `#XX`,
//! reals render in the shortest plain-decimal form (PDF has no exponent
//! syntax), text strings re-encode per their recorded encoding and byte
//! strings render as hex.

use crate::model::objects::{Dict, PDFObject, PDFString};

/// Serialize an object into `out`.
pub fn write_object(obj: &PDFObject, out: &mut Vec<u8>) {
    match obj {
        PDFObject::Null => out.extend_from_slice(b"null"),
        PDFObject::Bool(true) => out.extend_from_slice(b"true"),
        PDFObject::Bool(false) => out.extend_from_slice(b"false"),
        PDFObject::Int(n) => out.extend_from_slice(n.to_string().as_bytes()),
        PDFObject::Real(v) => write_real(*v, out),
        PDFObject::Name(name) => write_name(name, out),
        PDFObject::String(s) => write_string(s, out),
        PDFObject::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b' ');
                }
                write_object(item, out);
            }
            out.push(b']');
        }
        PDFObject::Dict(dict) => write_dict(dict, out),
        PDFObject::Stream(stream) => {
            write_dict(&stream.attrs, out);
            out.extend_from_slice(b"\nstream\n");
            out.extend_from_slice(stream.get_rawdata());
            out.extend_from_slice(b"\nendstream");
        }
        PDFObject::Ref(r) => {
            out.extend_from_slice(format!("{} {} R", r.objid, r.genno).as_bytes());
        }
    }
}

/// Serialize an object into a fresh buffer.
pub fn to_bytes(obj: &PDFObject) -> Vec<u8> {
    let mut out = Vec::new();
    write_object(obj, &mut out);
    out
}

fn write_dict(dict: &Dict, out: &mut Vec<u8>) {
    // Deterministic key order keeps output stable across runs, which the
    // writer's content-hash dedup relies on.
    let mut keys: Vec<&String> = dict.keys().collect();
    keys.sort();
    out.extend_from_slice(b"<<");
    for key in keys {
        out.push(b' ');
        write_name(key, out);
        out.push(b' ');
        write_object(&dict[key], out);
    }
    out.extend_from_slice(b" >>");
}

/// Bytes that must be `#XX`-escaped inside a name: the delimiter set, the
/// escape character itself, and anything outside printable ASCII.
fn name_byte_needs_escape(b: u8) -> bool {
    b < 0x21
        || b > 0x7E
        || matches!(
            b,
            b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%' | b'#'
        )
}

fn write_name(name: &str, out: &mut Vec<u8>) {
    out.push(b'/');
    for b in name.bytes() {
        if name_byte_needs_escape(b) {
            out.extend_from_slice(format!("#{b:02X}").as_bytes());
        } else {
            out.push(b);
        }
    }
}

fn write_real(v: f64, out: &mut Vec<u8>) {
    if !v.is_finite() {
        // PDF has no representation for NaN/inf; zero is the conventional
        // degraded value.
        out.push(b'0');
        return;
    }
    let mut s = format!("{v}");
    if s.contains(['e', 'E']) {
        s = format!("{v:.12}");
    }
    if s.contains('.') {
        while s.ends_with('0') {
            s.pop();
        }
        if s.ends_with('.') {
            s.pop();
        }
    }
    if s.is_empty() || s == "-" {
        s = "0".to_string();
    }
    out.extend_from_slice(s.as_bytes());
}

fn write_string(s: &PDFString, out: &mut Vec<u8>) {
    match s {
        PDFString::Text { .. } => write_literal_string(&s.to_raw(), out),
        PDFString::Bytes(raw) => write_hex_string(raw, out),
    }
}

fn write_literal_string(raw: &[u8], out: &mut Vec<u8>) {
    out.push(b'(');
    for &b in raw {
        match b {
            b'(' | b')' | b'\\' => {
                out.push(b'\\');
                out.push(b);
            }
            b'\n' => out.extend_from_slice(b"\\n"),
            b'\r' => out.extend_from_slice(b"\\r"),
            b'\t' => out.extend_from_slice(b"\\t"),
            0x08 => out.extend_from_slice(b"\\b"),
            0x0C => out.extend_from_slice(b"\\f"),
            _ => out.push(b),
        }
    }
    out.push(b')');
}

fn write_hex_string(raw: &[u8], out: &mut Vec<u8>) {
    out.push(b'<');
    for &b in raw {
        out.extend_from_slice(format!("{b:02X}").as_bytes());
    }
    out.push(b'>');
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_escape_reserved_bytes() {
        assert_eq!(to_bytes(&PDFObject::name("Type")), b"/Type");
        assert_eq!(to_bytes(&PDFObject::name("A B")), b"/A#20B");
        assert_eq!(to_bytes(&PDFObject::name("a#b")), b"/a#23b");
        assert_eq!(to_bytes(&PDFObject::name("paren(")), b"/paren#28");
    }

    #[test]
    fn reals_render_without_exponent() {
        assert_eq!(to_bytes(&PDFObject::Real(1.5)), b"1.5");
        assert_eq!(to_bytes(&PDFObject::Real(4.0)), b"4");
        assert_eq!(to_bytes(&PDFObject::Real(-0.25)), b"-0.25");
        let tiny = to_bytes(&PDFObject::Real(1e-7));
        assert!(!tiny.contains(&b'e'), "got {:?}", tiny);
    }

    #[test]
    fn byte_strings_render_as_hex() {
        let obj = PDFObject::string_bytes(vec![0x00, 0xFF, 0x41]);
        assert_eq!(to_bytes(&obj), b"<00FF41>");
    }
}
