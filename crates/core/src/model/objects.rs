//! PDF primitive object types.
//!
//! A PDF file is a graph of values drawn from a small closed set of kinds.
//! [`PDFObject`] is that set as a tagged union; everything the reader
//! resolves and everything the writer serializes is one of these.

use crate::error::{PdfError, Result};
use bytes::Bytes;
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Dictionary payload: PDF dict keys are always names, stored here without
/// the leading slash.
pub type Dict = HashMap<String, PDFObject>;

/// Process-unique identity of a document.
///
/// An indirect reference is only meaningful inside the document that produced
/// it. Readers and writers each take a fresh `DocId` at construction; the
/// writer's clone tables key on it so that objects cloned twice from the same
/// source document translate to the same destination object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocId(u64);

impl DocId {
    pub fn new() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for DocId {
    fn default() -> Self {
        Self::new()
    }
}

/// How a text string was encoded in the file, remembered so serialization
/// can reproduce the original form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    /// PDFDocEncoding (a latin-1 superset with punctuation in 0x18..0x20
    /// and 0x80..0xA0).
    PdfDoc,
    /// UTF-16BE with a leading byte-order mark.
    Utf16Be,
}

/// A PDF string value.
///
/// Strings come in two flavors: decoded text (we know what the bytes meant)
/// and opaque bytes (we do not, or must not guess, e.g. the O/U fields of an
/// encryption dictionary).
#[derive(Debug, Clone, PartialEq)]
pub enum PDFString {
    Text {
        value: String,
        encoding: TextEncoding,
    },
    Bytes(Vec<u8>),
}

impl PDFString {
    /// Classify raw string bytes from the parser: a UTF-16BE BOM selects
    /// text, otherwise PDFDocEncoding is attempted, otherwise the bytes are
    /// kept opaque.
    pub fn from_raw(raw: Vec<u8>) -> Self {
        if raw.len() >= 2 && raw[0] == 0xFE && raw[1] == 0xFF {
            if let Some(value) = decode_utf16be(&raw[2..]) {
                return Self::Text {
                    value,
                    encoding: TextEncoding::Utf16Be,
                };
            }
            return Self::Bytes(raw);
        }
        match decode_pdfdoc(&raw) {
            Some(value) => Self::Text {
                value,
                encoding: TextEncoding::PdfDoc,
            },
            None => Self::Bytes(raw),
        }
    }

    /// Build a text string from a Rust string, picking the narrowest
    /// encoding that can represent it.
    pub fn from_text(value: &str) -> Self {
        let encoding = if encode_pdfdoc(value).is_some() {
            TextEncoding::PdfDoc
        } else {
            TextEncoding::Utf16Be
        };
        Self::Text {
            value: value.to_string(),
            encoding,
        }
    }

    pub fn bytes(raw: impl Into<Vec<u8>>) -> Self {
        Self::Bytes(raw.into())
    }

    /// The file-form bytes of this string (without the enclosing
    /// delimiters): text re-encodes per its recorded encoding.
    pub fn to_raw(&self) -> Vec<u8> {
        match self {
            Self::Text { value, encoding } => match encoding {
                TextEncoding::PdfDoc => {
                    encode_pdfdoc(value).unwrap_or_else(|| encode_utf16be(value))
                }
                TextEncoding::Utf16Be => encode_utf16be(value),
            },
            Self::Bytes(raw) => raw.clone(),
        }
    }

    /// Best-effort text view, for display and dictionary probing.
    pub fn to_text_lossy(&self) -> String {
        match self {
            Self::Text { value, .. } => value.clone(),
            Self::Bytes(raw) => raw.iter().map(|&b| char::from(b)).collect(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { value, .. } => Some(value),
            Self::Bytes(_) => None,
        }
    }
}

/// PDF object - the fundamental value type.
#[derive(Debug, Clone, PartialEq)]
pub enum PDFObject {
    /// Null object
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value
    Int(i64),
    /// Real (floating point) value
    Real(f64),
    /// Name object (e.g., /Type, /Font), stored without the slash
    Name(String),
    /// String (text or opaque bytes)
    String(PDFString),
    /// Array of objects
    Array(Vec<Self>),
    /// Dictionary (name -> object mapping)
    Dict(Dict),
    /// Stream (dictionary + binary payload)
    Stream(Box<PDFStream>),
    /// Indirect object reference
    Ref(PDFObjRef),
}

impl PDFObject {
    pub fn name(s: impl Into<String>) -> Self {
        Self::Name(s.into())
    }

    pub fn string_bytes(raw: impl Into<Vec<u8>>) -> Self {
        Self::String(PDFString::Bytes(raw.into()))
    }

    pub fn text(s: &str) -> Self {
        Self::String(PDFString::from_text(s))
    }

    /// Check if this is a null object
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get as boolean
    pub const fn as_bool(&self) -> Result<bool> {
        match self {
            Self::Bool(b) => Ok(*b),
            _ => Err(PdfError::TypeError {
                expected: "bool",
                got: self.type_name(),
            }),
        }
    }

    /// Get as integer
    pub const fn as_int(&self) -> Result<i64> {
        match self {
            Self::Int(n) => Ok(*n),
            _ => Err(PdfError::TypeError {
                expected: "int",
                got: self.type_name(),
            }),
        }
    }

    /// Get numeric value (int or real coerced to f64)
    pub const fn as_num(&self) -> Result<f64> {
        match self {
            Self::Int(n) => Ok(*n as f64),
            Self::Real(n) => Ok(*n),
            _ => Err(PdfError::TypeError {
                expected: "number",
                got: self.type_name(),
            }),
        }
    }

    /// Get as name
    pub fn as_name(&self) -> Result<&str> {
        match self {
            Self::Name(s) => Ok(s),
            _ => Err(PdfError::TypeError {
                expected: "name",
                got: self.type_name(),
            }),
        }
    }

    /// Get as string value
    pub const fn as_string(&self) -> Result<&PDFString> {
        match self {
            Self::String(s) => Ok(s),
            _ => Err(PdfError::TypeError {
                expected: "string",
                got: self.type_name(),
            }),
        }
    }

    /// Get the file-form bytes of a string value.
    pub fn as_string_bytes(&self) -> Result<Vec<u8>> {
        Ok(self.as_string()?.to_raw())
    }

    /// Get as array
    pub const fn as_array(&self) -> Result<&Vec<Self>> {
        match self {
            Self::Array(arr) => Ok(arr),
            _ => Err(PdfError::TypeError {
                expected: "array",
                got: self.type_name(),
            }),
        }
    }

    /// Get as dictionary
    pub const fn as_dict(&self) -> Result<&Dict> {
        match self {
            Self::Dict(d) => Ok(d),
            _ => Err(PdfError::TypeError {
                expected: "dict",
                got: self.type_name(),
            }),
        }
    }

    /// Get as stream
    pub fn as_stream(&self) -> Result<&PDFStream> {
        match self {
            Self::Stream(s) => Ok(s),
            _ => Err(PdfError::TypeError {
                expected: "stream",
                got: self.type_name(),
            }),
        }
    }

    /// Get as object reference
    pub const fn as_ref(&self) -> Result<&PDFObjRef> {
        match self {
            Self::Ref(r) => Ok(r),
            _ => Err(PdfError::TypeError {
                expected: "ref",
                got: self.type_name(),
            }),
        }
    }

    /// Dictionary view that also accepts a stream's attributes.
    pub fn as_dict_like(&self) -> Result<&Dict> {
        match self {
            Self::Dict(d) => Ok(d),
            Self::Stream(s) => Ok(&s.attrs),
            _ => Err(PdfError::TypeError {
                expected: "dict",
                got: self.type_name(),
            }),
        }
    }

    /// Get type name for error messages
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Real(_) => "real",
            Self::Name(_) => "name",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Dict(_) => "dict",
            Self::Stream(_) => "stream",
            Self::Ref(_) => "ref",
        }
    }
}

/// PDF indirect object reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PDFObjRef {
    /// Object number
    pub objid: u32,
    /// Generation number
    pub genno: u32,
}

impl PDFObjRef {
    /// Create a new object reference.
    pub const fn new(objid: u32, genno: u32) -> Self {
        Self { objid, genno }
    }
}

/// PDF Stream - dictionary attributes + binary payload.
///
/// The payload is kept in its raw (filtered, possibly encrypted) form until
/// someone asks for the decoded bytes; the decoded form is cached.
#[derive(Debug, Clone, PartialEq)]
pub struct PDFStream {
    /// Stream dictionary attributes
    pub attrs: Dict,
    /// Raw (encoded) payload
    rawdata: Bytes,
    /// Whether rawdata has already been decrypted
    rawdata_decrypted: bool,
    /// Decoded payload (lazily populated by the owning document)
    data: OnceCell<Vec<u8>>,
    /// Object number (set when the stream is part of a document)
    pub objid: Option<u32>,
    /// Generation number
    pub genno: Option<u32>,
}

impl PDFStream {
    /// Create a new stream.
    pub fn new(attrs: Dict, rawdata: impl Into<Bytes>) -> Self {
        Self {
            attrs,
            rawdata: rawdata.into(),
            rawdata_decrypted: false,
            data: OnceCell::new(),
            objid: None,
            genno: None,
        }
    }

    /// Set object number and generation.
    pub const fn set_objid(&mut self, objid: u32, genno: u32) {
        self.objid = Some(objid);
        self.genno = Some(genno);
    }

    /// Get raw (undecoded) payload.
    pub fn get_rawdata(&self) -> &[u8] {
        self.rawdata.as_ref()
    }

    /// Get raw payload as shared bytes.
    pub fn rawdata_bytes(&self) -> Bytes {
        self.rawdata.clone()
    }

    /// Check if the raw payload has been decrypted already.
    pub const fn rawdata_is_decrypted(&self) -> bool {
        self.rawdata_decrypted
    }

    /// Replace the raw payload and mark it as decrypted.
    pub fn set_rawdata_decrypted(&mut self, data: Vec<u8>) {
        self.rawdata = Bytes::from(data);
        self.rawdata_decrypted = true;
        self.data = OnceCell::new();
    }

    /// Replace the raw payload, e.g. after re-encoding on the writer side.
    pub fn set_rawdata(&mut self, data: Vec<u8>) {
        self.rawdata = Bytes::from(data);
        self.data = OnceCell::new();
    }

    /// Cached decoded payload, if the owning document has populated it.
    pub fn decoded(&self) -> Option<&[u8]> {
        self.data.get().map(Vec::as_slice)
    }

    /// Populate the decoded-payload cache. The first decode wins; later
    /// calls with a (necessarily identical) payload are no-ops.
    pub fn set_decoded(&self, data: Vec<u8>) {
        let _ = self.data.set(data);
    }

    /// Check if the stream dictionary contains a key.
    pub fn contains(&self, name: &str) -> bool {
        self.attrs.contains_key(name)
    }

    /// Get attribute by name.
    pub fn get(&self, name: &str) -> Option<&PDFObject> {
        self.attrs.get(name)
    }

    /// Get attribute, trying multiple names.
    pub fn get_any(&self, names: &[&str]) -> Option<&PDFObject> {
        for name in names {
            if let Some(obj) = self.attrs.get(*name) {
                return Some(obj);
            }
        }
        None
    }
}

fn decode_utf16be(bytes: &[u8]) -> Option<String> {
    if bytes.len() % 2 != 0 {
        return None;
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| u16::from_be_bytes([c[0], c[1]]))
        .collect();
    String::from_utf16(&units).ok()
}

fn encode_utf16be(s: &str) -> Vec<u8> {
    let mut out = vec![0xFE, 0xFF];
    for unit in s.encode_utf16() {
        out.extend_from_slice(&unit.to_be_bytes());
    }
    out
}

/// PDFDocEncoding code points that differ from latin-1, per the PDF
/// specification's encoding appendix. Bytes 0x7F, 0x9F and 0xAD have no
/// assignment; their presence forces byte-string classification.
const PDFDOC_SPECIALS: [(u8, char); 40] = [
    (0x18, '\u{02D8}'),
    (0x19, '\u{02C7}'),
    (0x1A, '\u{02C6}'),
    (0x1B, '\u{02D9}'),
    (0x1C, '\u{02DD}'),
    (0x1D, '\u{02DB}'),
    (0x1E, '\u{02DA}'),
    (0x1F, '\u{02DC}'),
    (0x80, '\u{2022}'),
    (0x81, '\u{2020}'),
    (0x82, '\u{2021}'),
    (0x83, '\u{2026}'),
    (0x84, '\u{2014}'),
    (0x85, '\u{2013}'),
    (0x86, '\u{0192}'),
    (0x87, '\u{2044}'),
    (0x88, '\u{2039}'),
    (0x89, '\u{203A}'),
    (0x8A, '\u{2212}'),
    (0x8B, '\u{2030}'),
    (0x8C, '\u{201E}'),
    (0x8D, '\u{201C}'),
    (0x8E, '\u{201D}'),
    (0x8F, '\u{2018}'),
    (0x90, '\u{2019}'),
    (0x91, '\u{201A}'),
    (0x92, '\u{2122}'),
    (0x93, '\u{FB01}'),
    (0x94, '\u{FB02}'),
    (0x95, '\u{0141}'),
    (0x96, '\u{0152}'),
    (0x97, '\u{0160}'),
    (0x98, '\u{0178}'),
    (0x99, '\u{017D}'),
    (0x9A, '\u{0131}'),
    (0x9B, '\u{0142}'),
    (0x9C, '\u{0153}'),
    (0x9D, '\u{0161}'),
    (0x9E, '\u{017E}'),
    (0xA0, '\u{20AC}'),
];

fn pdfdoc_to_char(b: u8) -> Option<char> {
    match b {
        0x7F | 0x9F | 0xAD => None,
        0x18..=0x1F | 0x80..=0x9E | 0xA0 => PDFDOC_SPECIALS
            .iter()
            .find(|(byte, _)| *byte == b)
            .map(|(_, c)| *c),
        _ => Some(char::from(b)),
    }
}

fn char_to_pdfdoc(c: char) -> Option<u8> {
    if (c as u32) < 0x100 {
        let b = c as u8;
        // Bytes whose PDFDoc meaning differs from latin-1 cannot be used
        // to represent their latin-1 code point.
        return match b {
            0x18..=0x1F | 0x7F | 0x80..=0xA0 | 0xAD => None,
            _ => Some(b),
        };
    }
    PDFDOC_SPECIALS
        .iter()
        .find(|(_, ch)| *ch == c)
        .map(|(b, _)| *b)
}

fn decode_pdfdoc(bytes: &[u8]) -> Option<String> {
    let mut out = String::with_capacity(bytes.len());
    for &b in bytes {
        out.push(pdfdoc_to_char(b)?);
    }
    Some(out)
}

fn encode_pdfdoc(s: &str) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(s.len());
    for c in s.chars() {
        out.push(char_to_pdfdoc(c)?);
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_bom_string_as_utf16_text() {
        let raw = vec![0xFE, 0xFF, 0x00, b'H', 0x00, b'i'];
        match PDFString::from_raw(raw.clone()) {
            PDFString::Text { value, encoding } => {
                assert_eq!(value, "Hi");
                assert_eq!(encoding, TextEncoding::Utf16Be);
            }
            other => panic!("expected text, got {other:?}"),
        }
        assert_eq!(PDFString::from_raw(raw.clone()).to_raw(), raw);
    }

    #[test]
    fn classify_high_bytes_as_opaque() {
        // 0x9F has no PDFDocEncoding assignment.
        let raw = vec![b'a', 0x9F, b'b'];
        assert_eq!(PDFString::from_raw(raw.clone()), PDFString::Bytes(raw));
    }

    #[test]
    fn pdfdoc_round_trip() {
        let raw = b"simple (ascii) text".to_vec();
        let s = PDFString::from_raw(raw.clone());
        assert_eq!(s.to_raw(), raw);
        assert_eq!(s.as_text(), Some("simple (ascii) text"));
    }

    #[test]
    fn accessor_type_errors_name_the_kinds() {
        let err = PDFObject::Int(3).as_name().unwrap_err();
        match err {
            PdfError::TypeError { expected, got } => {
                assert_eq!(expected, "name");
                assert_eq!(got, "int");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
