//! PDF document reader.
//!
//! [`PDFDocument`] owns the raw bytes, resolves the cross-reference chain,
//! and hands out resolved objects on demand. Object payloads are decrypted
//! (when a security handler is active) and cached the first time they are
//! requested.

use super::security::{PDFSecurityHandler, create_security_handler};
use super::xref::{XRef, read_number};
use crate::codec::filters::apply_filters;
use crate::error::{PdfError, Result};
use crate::model::{Dict, DocId, PDFObject, PDFStream};
use crate::parser::PDFParser;
use bytes::Bytes;
use memmap2::Mmap;
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

/// Attribute keys a page inherits from its ancestors in the page tree.
const INHERITABLE_PAGE_ATTRS: [&str; 4] = ["Resources", "MediaBox", "CropBox", "Rotate"];

#[derive(Clone)]
pub enum PdfBytes {
    Owned(Bytes),
    Shared(Bytes),
}

impl PdfBytes {
    const fn as_bytes(&self) -> &Bytes {
        match self {
            Self::Owned(data) => data,
            Self::Shared(data) => data,
        }
    }

    fn as_slice(&self) -> &[u8] {
        self.as_bytes().as_ref()
    }

    fn len(&self) -> usize {
        self.as_slice().len()
    }
}

/// A page flattened out of the page tree, inherited attributes merged in.
#[derive(Debug, Clone)]
pub struct Page {
    /// Object number of the page dictionary.
    pub objid: u32,
    /// Page attributes including inherited Resources/MediaBox/CropBox/Rotate.
    pub attrs: Dict,
}

/// One outline (bookmark) entry.
#[derive(Debug, Clone)]
pub struct OutlineItem {
    /// Nesting depth, starting at 1 for top-level entries.
    pub level: usize,
    pub title: String,
    /// The /Dest value, or the /D of a GoTo action.
    pub dest: Option<PDFObject>,
}

/// PDF document reader. Owns its data via `Bytes` for thread-safe sharing.
pub struct PDFDocument {
    data: PdfBytes,
    id: DocId,
    strict: bool,
    xrefs: Vec<XRef>,
    catalog: Dict,
    info: Vec<Dict>,
    cache: Mutex<FxHashMap<(u32, u16), Arc<PDFObject>>>,
    objstm_index: RwLock<Option<HashMap<u32, (u32, usize)>>>,
    security_handler: Option<Box<dyn PDFSecurityHandler + Send + Sync>>,
    /// Object number of the /Encrypt dictionary; that object is written in
    /// the clear and must never be run through the handler.
    encrypt_objid: Option<u32>,
    /// The /Encrypt dictionary of a document whose password has not been
    /// verified yet (empty password was tried and rejected).
    locked_encrypt: Option<Dict>,
    /// /ID array from the trailer, as raw byte strings.
    file_ids: Vec<Vec<u8>>,
}

impl PDFDocument {
    fn new_inner(data: PdfBytes, password: &str, strict: bool) -> Result<Self> {
        let mut doc = Self {
            data,
            id: DocId::new(),
            strict,
            xrefs: Vec::new(),
            catalog: Dict::new(),
            info: Vec::new(),
            cache: Mutex::new(FxHashMap::default()),
            objstm_index: RwLock::new(None),
            security_handler: None,
            encrypt_objid: None,
            locked_encrypt: None,
            file_ids: Vec::new(),
        };
        doc.parse(password)?;
        Ok(doc)
    }

    /// Create a document from raw PDF data (lenient mode).
    pub fn new<D: AsRef<[u8]>>(data: D, password: &str) -> Result<Self> {
        Self::new_with_options(data, password, false)
    }

    /// Create a document from raw PDF data.
    ///
    /// In strict mode structural damage is an error; otherwise the reader
    /// repairs what it can (rebuilding the xref table from a full scan if
    /// necessary).
    pub fn new_with_options<D: AsRef<[u8]>>(data: D, password: &str, strict: bool) -> Result<Self> {
        Self::new_inner(
            PdfBytes::Owned(Bytes::copy_from_slice(data.as_ref())),
            password,
            strict,
        )
    }

    /// Create a document from a memory-mapped file.
    pub fn new_from_mmap(mmap: Mmap, password: &str) -> Result<Self> {
        Self::new_inner(PdfBytes::Shared(Bytes::from_owner(mmap)), password, false)
    }

    /// Create a document from shared bytes (zero-copy).
    pub fn new_from_bytes(data: Bytes, password: &str) -> Result<Self> {
        Self::new_inner(PdfBytes::Shared(data), password, false)
    }

    /// Returns the raw PDF bytes.
    pub fn bytes(&self) -> &[u8] {
        self.data.as_slice()
    }

    /// Process-unique identity of this document (used by writers to key
    /// their clone tables).
    pub const fn doc_id(&self) -> DocId {
        self.id
    }

    /// Parse the document structure: xref chain, encryption, catalog.
    fn parse(&mut self, password: &str) -> Result<()> {
        let startxref = self.find_startxref();

        let mut loaded = false;
        if let Ok(pos) = startxref
            && self.load_xrefs(pos).is_ok()
            && !self.xrefs.is_empty()
        {
            loaded = true;
        }

        if !loaded {
            if self.strict {
                return Err(PdfError::NoValidXRef);
            }
            let xref = XRef::rebuild(self.data.as_slice())?;
            self.xrefs.push(xref);
        }

        self.setup_encryption(password)?;

        if self.locked_encrypt.is_none() {
            self.load_catalog()?;
        }

        Ok(())
    }

    /// Find /Encrypt in the trailers and authenticate the password.
    ///
    /// A rejected empty password leaves the document locked rather than
    /// failing: callers can retry with [`decrypt`](Self::decrypt). A
    /// rejected explicit password is an error.
    fn setup_encryption(&mut self, password: &str) -> Result<()> {
        let mut encrypt_dict: Option<Dict> = None;
        for xref in &self.xrefs {
            if self.file_ids.is_empty()
                && let Some(id_obj) = xref.trailer.get("ID")
                && let Ok(id_res) = self.resolve(id_obj)
                && let Ok(id_arr) = id_res.as_array()
            {
                self.file_ids = id_arr
                    .iter()
                    .filter_map(|o| o.as_string().ok().map(|s| s.to_raw()))
                    .collect();
            }

            if encrypt_dict.is_none()
                && let Some(encrypt_ref) = xref.trailer.get("Encrypt")
            {
                if let PDFObject::Ref(r) = encrypt_ref {
                    self.encrypt_objid = Some(r.objid);
                }
                let encrypt_obj = self.resolve(encrypt_ref)?;
                encrypt_dict = Some(encrypt_obj.as_dict()?.clone());
            }
        }

        let Some(encrypt) = encrypt_dict else {
            return Ok(());
        };

        match create_security_handler(&encrypt, &self.file_ids, password) {
            Ok(handler) => {
                self.security_handler = handler;
                Ok(())
            }
            Err(PdfError::WrongPassword) if password.is_empty() => {
                self.locked_encrypt = Some(encrypt);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Unlock an encrypted document after the fact.
    pub fn decrypt(&mut self, password: &str) -> Result<()> {
        let Some(encrypt) = self.locked_encrypt.clone() else {
            return Ok(());
        };
        let handler = create_security_handler(&encrypt, &self.file_ids, password)?;
        self.security_handler = handler;
        self.locked_encrypt = None;
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
        self.load_catalog()
    }

    /// Extract /Root and /Info from the trailers.
    fn load_catalog(&mut self) -> Result<()> {
        let mut catalog = Dict::new();
        let mut info = Vec::new();
        for xref in &self.xrefs {
            if let Some(root_ref) = xref.trailer.get("Root")
                && catalog.is_empty()
                && let Ok(root_obj) = self.resolve(root_ref)
                && let Ok(dict) = root_obj.as_dict()
            {
                catalog = dict.clone();
            }
            if let Some(info_ref) = xref.trailer.get("Info")
                && let Ok(info_obj) = self.resolve(info_ref)
                && let Ok(dict) = info_obj.as_dict()
            {
                info.push(dict.clone());
            }
        }

        if catalog.is_empty() && self.strict {
            return Err(PdfError::SyntaxError("no /Root in any trailer".into()));
        }

        self.catalog = catalog;
        self.info = info;
        Ok(())
    }

    /// Find the startxref offset by scanning the file tail.
    fn find_startxref(&self) -> Result<usize> {
        let needle = b"startxref";
        let data = self.data.as_slice();
        if data.len() < needle.len() {
            return Err(PdfError::SyntaxError("PDF too small".into()));
        }

        let search_start = data.len().saturating_sub(1024);
        let hay = &data[search_start..];
        let mut found = None;
        for pos in 0..=hay.len() - needle.len() {
            if &hay[pos..pos + needle.len()] == needle {
                found = Some(search_start + pos);
            }
        }
        let Some(i) = found else {
            return Err(PdfError::NoValidXRef);
        };

        let rest = &data[i + needle.len()..];
        let mut pos = 0;
        while pos < rest.len() && matches!(rest[pos], b' ' | b'\n' | b'\r') {
            pos += 1;
        }
        let (value, consumed) = read_number(&rest[pos..]).map_err(|_| PdfError::NoValidXRef)?;
        if consumed == 0 || value < 0 {
            return Err(PdfError::NoValidXRef);
        }
        Ok(value as usize)
    }

    /// Walk the xref chain starting at the given offset.
    ///
    /// A hybrid-reference file's /XRefStm is loaded immediately after its
    /// owning classic section so its entries take precedence over /Prev.
    /// A visited set breaks /Prev cycles; /Prev 0 ends the chain.
    fn load_xrefs(&mut self, mut pos: usize) -> Result<()> {
        let mut visited = HashSet::new();

        while !visited.contains(&pos) {
            visited.insert(pos);

            let xref = self.load_xref_at(pos)?;

            let xref_stm = xref
                .trailer
                .get("XRefStm")
                .and_then(|p| p.as_int().ok())
                .map(|n| n as usize);
            let prev = xref
                .trailer
                .get("Prev")
                .and_then(|p| p.as_int().ok())
                .map(|n| n as usize);

            self.xrefs.push(xref);

            if let Some(xref_stm_pos) = xref_stm
                && !visited.contains(&xref_stm_pos)
                && let Ok(stm) = self.load_xref_stream(xref_stm_pos)
            {
                self.xrefs.push(stm);
                visited.insert(xref_stm_pos);
            }

            match prev {
                Some(0) | None => break,
                Some(prev_pos) => pos = prev_pos,
            }
        }

        Ok(())
    }

    fn load_xref_at(&self, pos: usize) -> Result<XRef> {
        if pos >= self.data.len() {
            return Err(PdfError::NoValidXRef);
        }
        let data = self.data.as_slice();
        if data[pos..].starts_with(b"xref") {
            return XRef::parse_classic(data, pos);
        }
        if let Ok(xref) = self.load_xref_stream(pos) {
            return Ok(xref);
        }

        // Known producer bug: startxref off by a few bytes. Probe the
        // surrounding window for the table keyword or an object header.
        let lo = pos.saturating_sub(32);
        let hi = (pos + 32).min(data.len());
        for probe in lo..hi {
            if data[probe..].starts_with(b"xref") {
                log::warn!("startxref points at {pos}, found xref table at {probe}");
                return XRef::parse_classic(data, probe);
            }
            if probe != pos
                && data[probe].is_ascii_digit()
                && (probe == 0 || matches!(data[probe - 1], b' ' | b'\n' | b'\r'))
                && let Ok(xref) = self.load_xref_stream(probe)
            {
                log::warn!("startxref points at {pos}, found xref stream at {probe}");
                return Ok(xref);
            }
        }
        Err(PdfError::NoValidXRef)
    }

    fn load_xref_stream(&self, pos: usize) -> Result<XRef> {
        let obj = self.parse_object_at(pos, false, None)?;
        let stream = obj.as_stream()?;
        // Cross-reference streams are never encrypted, so the handler (not
        // yet installed at this point anyway) is not involved.
        let decoded = self.decode_stream(stream)?;
        XRef::from_stream(stream, &decoded)
    }

    /// Get an object by number, cloning out of the cache.
    pub fn getobj(&self, objid: u32) -> Result<PDFObject> {
        Ok((*self.getobj_shared(objid)?).clone())
    }

    /// Get an object by number without cloning the cached value.
    pub fn getobj_shared(&self, objid: u32) -> Result<Arc<PDFObject>> {
        if objid == 0 {
            return Err(PdfError::ObjectNotFound(0));
        }
        if self.locked_encrypt.is_some() {
            return Err(PdfError::NotDecrypted);
        }

        // Thread-local cycle detection: a reference chain that loops back
        // onto an object still being resolved yields Null rather than
        // recursing forever.
        thread_local! {
            static RESOLVING: RefCell<HashSet<u32>> = RefCell::new(HashSet::new());
        }

        struct ResolvingGuard {
            objid: u32,
        }

        impl Drop for ResolvingGuard {
            fn drop(&mut self) {
                RESOLVING.with(|set| {
                    set.borrow_mut().remove(&self.objid);
                });
            }
        }

        let is_circular = RESOLVING.with(|set| {
            let mut borrowed = set.borrow_mut();
            if borrowed.contains(&objid) {
                true
            } else {
                borrowed.insert(objid);
                false
            }
        });

        if is_circular {
            log::warn!("circular reference through obj {objid}, substituting null");
            return Ok(Arc::new(PDFObject::Null));
        }

        let _guard = ResolvingGuard { objid };

        for xref in &self.xrefs {
            if let Some(entry) = xref.get_pos(objid) {
                let genno = entry.genno as u16;
                if let Ok(cache) = self.cache.lock()
                    && let Some(obj) = cache.get(&(objid, genno))
                {
                    return Ok(Arc::clone(obj));
                }

                let (obj, needs_decryption) = if let Some(stream_objid) = entry.stream_objid {
                    // Compressed objects were decrypted along with their
                    // container; never decrypt them twice.
                    match self.parse_object_from_stream(stream_objid, entry.offset) {
                        Ok(o) => (o, false),
                        Err(_) => continue, // try an older table
                    }
                } else {
                    // A header mismatch means the table entry is stale; scan
                    // for the real header unless we are being strict.
                    let parsed = self
                        .parse_object_at(entry.offset, xref.is_fallback, Some((objid, genno)))
                        .or_else(|err| {
                            if self.strict {
                                Err(err)
                            } else {
                                self.repair_object_at(objid, genno)
                            }
                        });
                    match parsed {
                        Ok(o) => (o, true),
                        Err(_) => continue,
                    }
                };

                let obj = self.finish_object(obj, objid, genno, needs_decryption);
                let obj = Arc::new(obj);
                if let Ok(mut cache) = self.cache.lock() {
                    cache.insert((objid, genno), Arc::clone(&obj));
                }
                return Ok(obj);
            }
        }

        // Last resort: scan object streams directly when the tables are
        // incomplete. Compressed objects always have generation 0.
        if !self.all_xrefs_are_fallback()
            && let Ok(Some(obj)) = self.find_obj_in_objstms(objid)
        {
            let obj = Arc::new(obj);
            if let Ok(mut cache) = self.cache.lock() {
                cache.insert((objid, 0), Arc::clone(&obj));
            }
            return Ok(obj);
        }

        Err(PdfError::ObjectNotFound(objid))
    }

    /// Stamp stream identity and run decryption before an object is cached.
    fn finish_object(
        &self,
        obj: PDFObject,
        objid: u32,
        genno: u16,
        needs_decryption: bool,
    ) -> PDFObject {
        let mut obj = obj;
        if let PDFObject::Stream(ref mut stream) = obj {
            stream.set_objid(objid, u32::from(genno));
        }
        if needs_decryption
            && self.security_handler.is_some()
            && Some(objid) != self.encrypt_objid
        {
            obj = self.decrypt_object(obj, objid, genno);
        }
        obj
    }

    /// Decrypt strings and stream payloads within an object recursively.
    fn decrypt_object(&self, obj: PDFObject, objid: u32, genno: u16) -> PDFObject {
        let handler = match &self.security_handler {
            Some(h) => h,
            None => return obj,
        };

        match obj {
            PDFObject::String(data) => {
                let decrypted = handler.decrypt_string(objid, genno, &data.to_raw());
                PDFObject::String(crate::model::PDFString::from_raw(decrypted))
            }
            PDFObject::Array(arr) => PDFObject::Array(
                arr.into_iter()
                    .map(|item| self.decrypt_object(item, objid, genno))
                    .collect(),
            ),
            PDFObject::Dict(dict) => PDFObject::Dict(
                dict.into_iter()
                    .map(|(k, v)| (k, self.decrypt_object(v, objid, genno)))
                    .collect(),
            ),
            PDFObject::Stream(mut stream) => {
                let decrypted_attrs: Dict = stream
                    .attrs
                    .clone()
                    .into_iter()
                    .map(|(k, v)| (k, self.decrypt_object(v, objid, genno)))
                    .collect();
                stream.attrs = decrypted_attrs;
                stream.set_objid(objid, u32::from(genno));
                let decrypted =
                    handler.decrypt_stream(objid, genno, stream.get_rawdata(), &stream.attrs);
                stream.set_rawdata_decrypted(decrypted);
                PDFObject::Stream(stream)
            }
            other => other,
        }
    }

    /// Parse an object out of an object stream (ObjStm).
    fn parse_object_from_stream(&self, stream_objid: u32, index: usize) -> Result<PDFObject> {
        let stream_obj = self.getobj_shared(stream_objid)?;
        let stream = stream_obj.as_ref().as_stream()?;

        let data = self.decode_stream(stream)?;

        let n = stream
            .get("N")
            .ok_or_else(|| PdfError::SyntaxError("missing N in ObjStm".into()))?
            .as_int()? as usize;
        let first = stream
            .get("First")
            .ok_or_else(|| PdfError::SyntaxError("missing First in ObjStm".into()))?
            .as_int()? as usize;

        if index >= n {
            return Err(PdfError::SyntaxError(format!("index {index} >= N {n}")));
        }
        if first > data.len() {
            return Err(PdfError::SyntaxError("ObjStm First exceeds data".into()));
        }

        // Header: objid1 offset1 objid2 offset2 ...
        let mut header_parser = PDFParser::new(&data[..first]);
        let mut offsets = Vec::with_capacity(n);
        for _ in 0..n {
            let _obj_id = header_parser.parse_object()?.as_int()?;
            let offset = header_parser.parse_object()?.as_int()? as usize;
            offsets.push(offset);
        }

        let obj_offset = first + offsets.get(index).copied().unwrap_or(0);
        if obj_offset > data.len() {
            return Err(PdfError::SyntaxError("ObjStm offset exceeds data".into()));
        }

        let mut obj_parser = PDFParser::new(&data[obj_offset..]);
        obj_parser.parse_object()
    }

    /// Fallback scan for an object inside any ObjStm in the file.
    fn find_obj_in_objstms(&self, objid: u32) -> Result<Option<PDFObject>> {
        use once_cell::sync::Lazy;
        use regex::bytes::Regex;

        if let Ok(index_guard) = self.objstm_index.read()
            && let Some(index) = index_guard.as_ref()
        {
            if let Some((stream_objid, idx)) = index.get(&objid).copied() {
                return Ok(Some(self.parse_object_from_stream(stream_objid, idx)?));
            }
            return Ok(None);
        }

        static OBJ_RE: Lazy<Regex> =
            Lazy::new(|| Regex::new(r"(\d+)\s+(\d+)\s+obj\b").unwrap());
        let re = &*OBJ_RE;
        let mut index: HashMap<u32, (u32, usize)> = HashMap::new();
        for cap in re.captures_iter(self.data.as_slice()) {
            let stream_objid: u32 = match std::str::from_utf8(&cap[1])
                .ok()
                .and_then(|s| s.parse().ok())
            {
                Some(v) => v,
                None => continue,
            };
            let pos = cap.get(0).map(|m| m.start()).unwrap_or(0);

            let obj = match self.parse_object_at(pos, true, None) {
                Ok(o) => o,
                Err(_) => continue,
            };
            let stream = match obj.as_stream() {
                Ok(s) => s,
                Err(_) => continue,
            };
            match stream.get("Type") {
                Some(PDFObject::Name(name)) if name == "ObjStm" => {}
                _ => continue,
            }

            let data = match self.decode_stream(stream) {
                Ok(d) => d,
                Err(_) => continue,
            };
            let n = match stream.get("N").and_then(|v| v.as_int().ok()) {
                Some(n) => n as usize,
                None => continue,
            };
            let first = match stream.get("First").and_then(|v| v.as_int().ok()) {
                Some(f) => f as usize,
                None => continue,
            };
            if first > data.len() {
                continue;
            }

            let mut header_parser = PDFParser::new(&data[..first]);
            for i in 0..n {
                let obj_id = match header_parser.parse_object().and_then(|o| o.as_int()) {
                    Ok(id) => id as u32,
                    Err(_) => break,
                };
                let _offset = match header_parser.parse_object().and_then(|o| o.as_int()) {
                    Ok(off) => off as usize,
                    Err(_) => break,
                };
                index.entry(obj_id).or_insert((stream_objid, i));
            }
        }

        if let Ok(mut index_guard) = self.objstm_index.write() {
            *index_guard = Some(index.clone());
        }

        if let Some((stream_objid, idx)) = index.get(&objid).copied() {
            return Ok(Some(self.parse_object_from_stream(stream_objid, idx)?));
        }
        Ok(None)
    }

    /// Locate `objid genno obj` by scanning the raw bytes when the xref
    /// entry's offset turned out to point at some other object's header.
    /// The last matching header wins, since incremental updates append.
    fn repair_object_at(&self, objid: u32, genno: u16) -> Result<PDFObject> {
        use once_cell::sync::Lazy;
        use regex::bytes::Regex;

        static HEADER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)\s+(\d+)\s+obj\b").unwrap());

        let mut found = None;
        for cap in HEADER_RE.captures_iter(self.data.as_slice()) {
            let id: Option<u32> = std::str::from_utf8(&cap[1]).ok().and_then(|s| s.parse().ok());
            let r#gen: Option<u16> = std::str::from_utf8(&cap[2]).ok().and_then(|s| s.parse().ok());
            if id == Some(objid)
                && r#gen == Some(genno)
                && let Some(m) = cap.get(0)
            {
                found = Some(m.start());
            }
        }

        let pos = found.ok_or(PdfError::ObjectNotFound(objid))?;
        log::warn!("xref offset for obj {objid} is stale, using header found at offset {pos}");
        self.parse_object_at(pos, false, Some((objid, genno)))
    }

    /// Parse an indirect object at a file offset (`objid genno obj ...`).
    ///
    /// When `expected` is given, the header's object number and generation
    /// must match it; a mismatch means the xref entry points at the wrong
    /// object.
    fn parse_object_at(
        &self,
        offset: usize,
        fallback: bool,
        expected: Option<(u32, u16)>,
    ) -> Result<PDFObject> {
        if offset >= self.data.len() {
            return Err(PdfError::SyntaxError(format!(
                "object offset {} exceeds file size {}",
                offset,
                self.data.len()
            )));
        }
        let mut cursor = offset;
        let mut data = &self.data.as_slice()[offset..];

        let (header_objid, consumed) = read_number(data)?;
        cursor += consumed;
        data = &data[consumed..];
        let skip = skip_simple_whitespace(data);
        cursor += skip;
        data = &data[skip..];

        let (header_genno, consumed) = read_number(data)?;
        cursor += consumed;
        data = &data[consumed..];
        let skip = skip_simple_whitespace(data);
        cursor += skip;
        data = &data[skip..];

        if let Some((want_objid, want_genno)) = expected
            && (header_objid != i64::from(want_objid) || header_genno != i64::from(want_genno))
        {
            return Err(PdfError::SyntaxError(format!(
                "object header at offset {offset} reads {header_objid} {header_genno}, \
                 expected {want_objid} {want_genno}"
            )));
        }

        if !data.starts_with(b"obj") {
            return Err(PdfError::SyntaxError(format!(
                "expected 'obj' at offset {}, got {:?}",
                offset,
                String::from_utf8_lossy(&data[..data.len().min(10)])
            )));
        }
        cursor += 3;
        data = &data[3..];
        let skip = skip_simple_whitespace(data);
        cursor += skip;
        data = &data[skip..];

        let mut parser = PDFParser::new(data);
        let obj = parser.parse_object()?;
        let base_pos = parser.tell();

        // A dict followed by the `stream` keyword is a stream object.
        if let PDFObject::Dict(ref dict) = obj {
            let remaining = parser.remaining();
            let mut pos = skip_simple_whitespace(remaining);
            if pos < remaining.len() && remaining[pos..].starts_with(b"stream") {
                pos += 6;
                if pos < remaining.len() && remaining[pos] == b'\r' {
                    pos += 1;
                }
                if pos < remaining.len() && remaining[pos] == b'\n' {
                    pos += 1;
                }

                // The tables themselves live in XRef/ObjStm streams; a bad
                // /Length there would corrupt everything downstream, so
                // scan for endstream regardless.
                let force_scan = matches!(
                    dict.get("Type"),
                    Some(PDFObject::Name(name)) if name == "XRef" || name == "ObjStm"
                );

                let length: usize = if fallback || force_scan {
                    0
                } else {
                    dict.get("Length")
                        .and_then(|len_obj| self.resolve(len_obj).ok())
                        .and_then(|resolved| resolved.as_int().ok())
                        .filter(|&len| len > 0)
                        .map_or(0, |len| len as usize)
                };

                let stream_start = pos;
                let stream_start_abs = cursor + base_pos + stream_start;

                // Trust /Length only when the endstream keyword actually
                // follows the claimed extent; producers get it wrong.
                let length_is_sane = length > 0
                    && stream_start + length <= remaining.len()
                    && {
                        let after = &remaining[stream_start + length..];
                        let skip = skip_simple_whitespace(after);
                        after[skip..].starts_with(b"endstream")
                    };

                let stream_data = if length_is_sane {
                    self.data
                        .as_bytes()
                        .slice(stream_start_abs..stream_start_abs + length)
                } else if let Some(end_pos) = find_endstream(&remaining[stream_start..]) {
                    let end = (stream_start_abs + end_pos).min(self.data.len());
                    self.data.as_bytes().slice(stream_start_abs..end)
                } else {
                    self.data.as_bytes().slice(stream_start_abs..)
                };

                return Ok(PDFObject::Stream(Box::new(PDFStream::new(
                    dict.clone(),
                    stream_data,
                ))));
            }
        }

        Ok(obj)
    }

    /// Resolve a reference chain to its terminal object.
    ///
    /// A cycle resolves to Null, matching how a reference to a missing
    /// object behaves.
    pub fn resolve(&self, obj: &PDFObject) -> Result<PDFObject> {
        Ok((*self.resolve_shared(obj)?).clone())
    }

    /// Resolve a reference chain without cloning.
    pub fn resolve_shared(&self, obj: &PDFObject) -> Result<Arc<PDFObject>> {
        let mut seen = HashSet::new();
        let mut current = match obj {
            PDFObject::Ref(r) => {
                seen.insert(r.objid);
                self.getobj_shared(r.objid)?
            }
            _ => return Ok(Arc::new(obj.clone())),
        };
        loop {
            match current.as_ref() {
                PDFObject::Ref(r) => {
                    if !seen.insert(r.objid) {
                        log::warn!("circular reference chain through obj {}", r.objid);
                        return Ok(Arc::new(PDFObject::Null));
                    }
                    current = self.getobj_shared(r.objid)?;
                }
                _ => return Ok(current),
            }
        }
    }

    /// Decode a stream: decrypt if needed, then run the filter pipeline.
    pub fn decode_stream(&self, stream: &PDFStream) -> Result<Vec<u8>> {
        let objid = stream.objid.unwrap_or(0);
        let genno = stream.genno.unwrap_or(0) as u16;
        self.decode_stream_with_objid(stream, objid, genno)
    }

    /// Decode a stream with explicit object identity (used for decryption
    /// key derivation when the stream has not been stamped).
    pub fn decode_stream_with_objid(
        &self,
        stream: &PDFStream,
        objid: u32,
        genno: u16,
    ) -> Result<Vec<u8>> {
        if let Some(cached) = stream.decoded() {
            return Ok(cached.to_vec());
        }

        let mut raw = stream.get_rawdata().to_vec();

        if !stream.rawdata_is_decrypted()
            && let Some(ref handler) = self.security_handler
        {
            raw = handler.decrypt_stream(objid, genno, &raw, &stream.attrs);
        }

        let filters = self.stream_filters(stream)?;
        let decoded = apply_filters(&raw, &filters)?;
        stream.set_decoded(decoded.clone());
        Ok(decoded)
    }

    /// Decrypt a stream payload without running its filters. Already
    /// plaintext payloads come back unchanged.
    pub fn decrypt_stream_payload(&self, stream: &PDFStream) -> Vec<u8> {
        if stream.rawdata_is_decrypted() {
            return stream.get_rawdata().to_vec();
        }
        match &self.security_handler {
            Some(handler) => handler.decrypt_stream(
                stream.objid.unwrap_or(0),
                stream.genno.unwrap_or(0) as u16,
                stream.get_rawdata(),
                &stream.attrs,
            ),
            None => stream.get_rawdata().to_vec(),
        }
    }

    /// Normalize a stream's /Filter and /DecodeParms into ordered pairs,
    /// resolving indirect references in both.
    fn stream_filters(&self, stream: &PDFStream) -> Result<Vec<(String, Dict)>> {
        let Some(filter_obj) = stream.get_any(&["Filter", "F"]) else {
            return Ok(Vec::new());
        };
        let filter_obj = self.resolve(filter_obj)?;

        let names: Vec<String> = match &filter_obj {
            PDFObject::Name(name) => vec![name.clone()],
            PDFObject::Array(arr) => {
                let mut names = Vec::with_capacity(arr.len());
                for item in arr {
                    names.push(self.resolve(item)?.as_name()?.to_string());
                }
                names
            }
            PDFObject::Null => return Ok(Vec::new()),
            other => {
                return Err(PdfError::TypeError {
                    expected: "name or array",
                    got: other.type_name(),
                });
            }
        };

        let parms_obj = match stream.get_any(&["DecodeParms", "DP"]) {
            Some(obj) => self.resolve(obj)?,
            None => PDFObject::Null,
        };
        let parms: Vec<Dict> = match parms_obj {
            PDFObject::Dict(d) => vec![d],
            PDFObject::Array(arr) => {
                let mut out = Vec::with_capacity(arr.len());
                for item in arr {
                    match self.resolve(&item)? {
                        PDFObject::Dict(d) => out.push(d),
                        _ => out.push(Dict::new()),
                    }
                }
                out
            }
            _ => Vec::new(),
        };

        Ok(names
            .into_iter()
            .enumerate()
            .map(|(i, name)| (name, parms.get(i).cloned().unwrap_or_default()))
            .collect())
    }

    /// Get the document catalog.
    pub const fn catalog(&self) -> &Dict {
        &self.catalog
    }

    /// Get the document info dictionaries (newest first).
    pub const fn info(&self) -> &Vec<Dict> {
        &self.info
    }

    /// Whether the document carries an /Encrypt dictionary.
    pub fn is_encrypted(&self) -> bool {
        self.security_handler.is_some() || self.locked_encrypt.is_some()
    }

    /// Whether an encrypted document still needs a password.
    pub fn is_locked(&self) -> bool {
        self.locked_encrypt.is_some()
    }

    /// The /ID array from the trailer, as raw byte strings.
    pub fn file_ids(&self) -> &[Vec<u8>] {
        &self.file_ids
    }

    /// Declared page count from the page tree root.
    pub fn page_count(&self) -> usize {
        if let Some(pages_ref) = self.catalog.get("Pages")
            && let Ok(pages) = self.resolve(pages_ref)
            && let Ok(dict) = pages.as_dict()
            && let Some(count) = dict.get("Count")
            && let Ok(n) = count.as_int()
        {
            return n as usize;
        }
        0
    }

    /// Flatten the page tree into document order, merging inherited
    /// attributes (Resources, MediaBox, CropBox, Rotate) into each page.
    pub fn pages(&self) -> Result<Vec<Page>> {
        let mut pages = Vec::new();
        let Some(root_ref) = self.catalog.get("Pages") else {
            return Ok(pages);
        };

        // Stack of (node, inherited attrs); visited set breaks cycles.
        let mut stack = vec![(root_ref.clone(), Dict::new())];
        let mut visited: HashSet<u32> = HashSet::new();

        while let Some((node_ref, inherited)) = stack.pop() {
            if let PDFObject::Ref(r) = &node_ref {
                if !visited.insert(r.objid) {
                    continue;
                }
            }
            let node = self.resolve(&node_ref)?;
            let Ok(dict) = node.as_dict() else { continue };

            let mut passed_down = inherited.clone();
            for key in INHERITABLE_PAGE_ATTRS {
                if let Some(value) = dict.get(key) {
                    passed_down.insert(key.to_string(), value.clone());
                }
            }

            let is_pages_node = matches!(
                dict.get("Type"),
                Some(PDFObject::Name(name)) if name == "Pages"
            ) || dict.contains_key("Kids");

            if is_pages_node {
                if let Some(kids) = dict.get("Kids")
                    && let Ok(kids_arr) = self.resolve(kids)?.as_array()
                {
                    for kid in kids_arr.iter().rev() {
                        stack.push((kid.clone(), passed_down.clone()));
                    }
                }
            } else {
                let objid = match &node_ref {
                    PDFObject::Ref(r) => r.objid,
                    _ => 0,
                };
                let mut attrs = dict.clone();
                for (key, value) in inherited {
                    attrs.entry(key).or_insert(value);
                }
                pages.push(Page { objid, attrs });
            }
        }

        Ok(pages)
    }

    /// Resolve a named destination from the /Names tree or the legacy
    /// catalog /Dests dictionary.
    pub fn get_dest(&self, name: &[u8]) -> Result<PDFObject> {
        if let Some(names_ref) = self.catalog.get("Names")
            && let Ok(names) = self.resolve(names_ref)
            && let Ok(names_dict) = names.as_dict()
            && let Some(dests_ref) = names_dict.get("Dests")
            && let Ok(dests) = self.resolve(dests_ref)
            && let Some(result) = self.lookup_name_tree(&dests, name)?
        {
            return Ok(result);
        }

        if let Some(dests_ref) = self.catalog.get("Dests")
            && let Ok(dests) = self.resolve(dests_ref)
            && let Ok(dests_dict) = dests.as_dict()
        {
            let name_str = String::from_utf8_lossy(name);
            if let Some(dest) = dests_dict.get(name_str.as_ref()) {
                return self.resolve(dest);
            }
        }

        Err(PdfError::DestinationNotFound(
            String::from_utf8_lossy(name).to_string(),
        ))
    }

    /// Collect every named destination: the /Names tree entries first,
    /// then the legacy catalog /Dests dictionary. Dict-valued entries are
    /// unwrapped to their /D array.
    pub fn named_destinations(&self) -> Result<Vec<(String, PDFObject)>> {
        let mut out = Vec::new();

        if let Some(names_ref) = self.catalog.get("Names")
            && let Ok(names) = self.resolve(names_ref)
            && let Ok(names_dict) = names.as_dict()
            && let Some(dests_ref) = names_dict.get("Dests")
            && let Ok(dests) = self.resolve(dests_ref)
        {
            let mut visited = HashSet::new();
            self.collect_name_tree(&dests, &mut visited, &mut out)?;
        }

        if let Some(dests_ref) = self.catalog.get("Dests")
            && let Ok(dests) = self.resolve(dests_ref)
            && let Ok(dests_dict) = dests.as_dict()
        {
            for (name, value) in dests_dict {
                if let Ok(dest) = self.resolve(value) {
                    out.push((name.clone(), dest));
                }
            }
        }

        for (_, dest) in &mut out {
            if let PDFObject::Dict(dict) = dest
                && let Some(inner) = dict.get("D")
            {
                let unwrapped = self.resolve(inner)?;
                *dest = unwrapped;
            }
        }
        Ok(out)
    }

    /// Embedded file attachments from the /Names -> /EmbeddedFiles tree,
    /// as (filename, decoded bytes).
    pub fn attachments(&self) -> Result<Vec<(String, Vec<u8>)>> {
        let mut specs = Vec::new();
        if let Some(names_ref) = self.catalog.get("Names")
            && let Ok(names) = self.resolve(names_ref)
            && let Ok(names_dict) = names.as_dict()
            && let Some(files_ref) = names_dict.get("EmbeddedFiles")
            && let Ok(files) = self.resolve(files_ref)
        {
            let mut visited = HashSet::new();
            self.collect_name_tree(&files, &mut visited, &mut specs)?;
        }

        let mut out = Vec::new();
        for (key, spec) in specs {
            let Ok(spec_dict) = spec.as_dict() else { continue };
            let name = spec_dict
                .get("UF")
                .or_else(|| spec_dict.get("F"))
                .and_then(|n| self.resolve(n).ok())
                .and_then(|n| n.as_string().ok().map(|s| s.to_text_lossy()))
                .unwrap_or(key);
            if let Some(ef) = spec_dict.get("EF")
                && let Ok(ef_obj) = self.resolve(ef)
                && let Ok(ef_dict) = ef_obj.as_dict()
                && let Some(f) = ef_dict.get("F").or_else(|| ef_dict.get("UF"))
                && let Ok(file_obj) = self.resolve(f)
                && let PDFObject::Stream(stream) = &file_obj
            {
                out.push((name, self.decode_stream(stream)?));
            }
        }
        Ok(out)
    }

    /// Depth-first collection of every (key, value) pair in a name tree.
    fn collect_name_tree(
        &self,
        tree: &PDFObject,
        visited: &mut HashSet<u32>,
        out: &mut Vec<(String, PDFObject)>,
    ) -> Result<()> {
        let Ok(dict) = tree.as_dict() else {
            return Ok(());
        };

        if let Some(names_arr) = dict.get("Names")
            && let Ok(arr) = self.resolve(names_arr)?.as_array()
        {
            let mut i = 0;
            while i + 1 < arr.len() {
                if let Ok(key) = arr[i].as_string() {
                    let name = String::from_utf8_lossy(&key.to_raw()).to_string();
                    out.push((name, self.resolve(&arr[i + 1])?));
                }
                i += 2;
            }
        }

        if let Some(kids) = dict.get("Kids")
            && let Ok(kids_arr) = self.resolve(kids)?.as_array()
        {
            for kid in kids_arr {
                if let PDFObject::Ref(r) = kid
                    && !visited.insert(r.objid)
                {
                    continue;
                }
                if let Ok(kid_obj) = self.resolve(kid) {
                    self.collect_name_tree(&kid_obj, visited, out)?;
                }
            }
        }
        Ok(())
    }

    fn lookup_name_tree(&self, tree: &PDFObject, name: &[u8]) -> Result<Option<PDFObject>> {
        let dict = match tree.as_dict() {
            Ok(d) => d,
            Err(_) => return Ok(None),
        };

        // Leaf node: [key1 value1 key2 value2 ...]
        if let Some(names_arr) = dict.get("Names")
            && let Ok(arr) = self.resolve(names_arr)?.as_array()
        {
            let mut i = 0;
            while i + 1 < arr.len() {
                if let Ok(key) = arr[i].as_string()
                    && key.to_raw() == name
                {
                    return Ok(Some(self.resolve(&arr[i + 1])?));
                }
                i += 2;
            }
        }

        // Intermediate node: prune by Limits before descending.
        if let Some(kids) = dict.get("Kids")
            && let Ok(kids_arr) = self.resolve(kids)?.as_array()
        {
            for kid in kids_arr {
                if let Ok(kid_obj) = self.resolve(kid) {
                    if let Ok(kid_dict) = kid_obj.as_dict()
                        && let Some(limits) = kid_dict.get("Limits")
                        && let Ok(limits_arr) = limits.as_array()
                        && limits_arr.len() >= 2
                    {
                        let min = limits_arr[0].as_string_bytes().unwrap_or_default();
                        let max = limits_arr[1].as_string_bytes().unwrap_or_default();
                        if name < min.as_slice() || name > max.as_slice() {
                            continue;
                        }
                    }
                    if let Some(result) = self.lookup_name_tree(&kid_obj, name)? {
                        return Ok(Some(result));
                    }
                }
            }
        }

        Ok(None)
    }

    /// Walk the /Outlines tree depth-first, in display order.
    pub fn get_outlines(&self) -> Result<Vec<OutlineItem>> {
        let mut items = Vec::new();
        if let Some(outlines_ref) = self.catalog.get("Outlines")
            && let Ok(outlines) = self.resolve(outlines_ref)
            && let Ok(dict) = outlines.as_dict()
            && let Some(first) = dict.get("First")
        {
            let mut visited = HashSet::new();
            self.walk_outlines(first, 1, &mut visited, &mut items)?;
        }
        Ok(items)
    }

    fn walk_outlines(
        &self,
        entry_ref: &PDFObject,
        level: usize,
        visited: &mut HashSet<u32>,
        items: &mut Vec<OutlineItem>,
    ) -> Result<()> {
        let mut current = entry_ref.clone();
        loop {
            if let PDFObject::Ref(r) = &current {
                if !visited.insert(r.objid) {
                    break;
                }
            }
            let node = self.resolve(&current)?;
            let Ok(dict) = node.as_dict() else { break };

            let title = dict
                .get("Title")
                .and_then(|t| self.resolve(t).ok())
                .and_then(|t| t.as_string().ok().map(|s| s.to_text_lossy()))
                .unwrap_or_default();

            // /Dest directly, or the /D of a GoTo action.
            let dest = if let Some(d) = dict.get("Dest") {
                self.resolve(d).ok()
            } else if let Some(a) = dict.get("A")
                && let Ok(action) = self.resolve(a)
                && let Ok(action_dict) = action.as_dict()
            {
                action_dict.get("D").and_then(|d| self.resolve(d).ok())
            } else {
                None
            };

            items.push(OutlineItem { level, title, dest });

            if let Some(first) = dict.get("First") {
                self.walk_outlines(first, level + 1, visited, items)?;
            }

            match dict.get("Next") {
                Some(next) => current = next.clone(),
                None => break,
            }
        }
        Ok(())
    }

    /// All object numbers known across the xref chain.
    pub fn get_objids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.xrefs.iter().flat_map(|x| x.get_objids()).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Iterate over all trailers, newest first.
    pub fn get_trailers(&self) -> impl Iterator<Item = (bool, &Dict)> {
        self.xrefs.iter().map(|x| (x.is_fallback, &x.trailer))
    }

    fn all_xrefs_are_fallback(&self) -> bool {
        self.xrefs.iter().all(|x| x.is_fallback)
    }
}

fn skip_simple_whitespace(data: &[u8]) -> usize {
    let mut skip = 0;
    while skip < data.len() && matches!(data[skip], b' ' | b'\n' | b'\r') {
        skip += 1;
    }
    skip
}

/// Find the offset of the data end before the next `endstream` keyword,
/// trimming trailing EOL bytes.
fn find_endstream(data: &[u8]) -> Option<usize> {
    let needle = b"endstream";
    if data.len() < needle.len() {
        return None;
    }
    for pos in 0..=data.len() - needle.len() {
        if &data[pos..pos + needle.len()] == needle {
            let mut end = pos;
            while end > 0 && matches!(data[end - 1], b' ' | b'\n' | b'\r') {
                end -= 1;
            }
            return Some(end);
        }
    }
    None
}
