//! PDF document writer.
//!
//! [`PDFWriter`] keeps an append-only object table (object numbers are
//! 1-based positions in the table) and serializes it as a fresh
//! single-revision file: header, body, classic xref, trailer. Objects
//! cloned out of a [`PDFDocument`](super::catalog::PDFDocument) are
//! tracked by their source identity so shared objects are copied once.

use super::catalog::{PDFDocument, Page};
use super::security::{EncryptionAlgorithm, PDFSecurityHandler, generate_encryption};
use crate::error::{PdfError, Result};
use crate::model::{Dict, DocId, PDFObjRef, PDFObject, PDFString, to_bytes, write_object};
use std::collections::HashMap;
use std::io::Write;
use std::time::{SystemTime, UNIX_EPOCH};

struct WriterEncryption {
    dict: Dict,
    handler: Box<dyn PDFSecurityHandler + Send + Sync>,
}

/// Builds a new PDF document object by object.
pub struct PDFWriter {
    id: DocId,
    /// Object table; object number = index + 1, generation always 0.
    objects: Vec<PDFObject>,
    /// (source document, source objid) -> destination objid, so an object
    /// referenced from several cloned pages lands in the table once.
    cloned: HashMap<(DocId, u32), u32>,
    /// Content hash -> objid, making add_object idempotent for
    /// byte-identical values.
    hashes: HashMap<[u8; 16], u32>,
    root: PDFObjRef,
    pages: PDFObjRef,
    info: PDFObjRef,
    encryption: Option<WriterEncryption>,
    file_ids: Option<(Vec<u8>, Vec<u8>)>,
}

impl PDFWriter {
    /// Create an empty document: a page tree with no pages, a catalog, and
    /// an info dictionary.
    pub fn new() -> Self {
        let mut writer = Self {
            id: DocId::new(),
            objects: Vec::new(),
            cloned: HashMap::new(),
            hashes: HashMap::new(),
            root: PDFObjRef::new(0, 0),
            pages: PDFObjRef::new(0, 0),
            info: PDFObjRef::new(0, 0),
            encryption: None,
            file_ids: None,
        };

        let mut pages = Dict::new();
        pages.insert("Type".into(), PDFObject::name("Pages"));
        pages.insert("Kids".into(), PDFObject::Array(Vec::new()));
        pages.insert("Count".into(), PDFObject::Int(0));
        writer.pages = writer.add_object(PDFObject::Dict(pages));

        let mut root = Dict::new();
        root.insert("Type".into(), PDFObject::name("Catalog"));
        root.insert("Pages".into(), PDFObject::Ref(writer.pages));
        writer.root = writer.add_object(PDFObject::Dict(root));

        let mut info = Dict::new();
        info.insert("Producer".into(), PDFObject::text("tinta"));
        writer.info = writer.add_object(PDFObject::Dict(info));

        writer
    }

    /// Identity of this writer's object table.
    pub const fn doc_id(&self) -> DocId {
        self.id
    }

    pub const fn root_ref(&self) -> PDFObjRef {
        self.root
    }

    pub const fn pages_ref(&self) -> PDFObjRef {
        self.pages
    }

    pub const fn info_ref(&self) -> PDFObjRef {
        self.info
    }

    pub fn page_count(&self) -> usize {
        self.get_object(self.pages)
            .and_then(|p| p.as_dict().ok())
            .and_then(|d| d.get("Count"))
            .and_then(|c| c.as_int().ok())
            .map_or(0, |n| n as usize)
    }

    /// Append an object to the table, returning its reference.
    ///
    /// Adding a value whose serialized form is already in the table returns
    /// the existing reference instead of duplicating it.
    pub fn add_object(&mut self, obj: PDFObject) -> PDFObjRef {
        let digest = md5::compute(to_bytes(&obj)).0;
        if let Some(&objid) = self.hashes.get(&digest) {
            return PDFObjRef::new(objid, 0);
        }
        self.objects.push(obj);
        let objid = self.objects.len() as u32;
        self.hashes.insert(digest, objid);
        PDFObjRef::new(objid, 0)
    }

    /// Replace an object in place, keeping its number.
    pub fn replace_object(&mut self, r: PDFObjRef, obj: PDFObject) -> Result<()> {
        let index = self.slot_index(r)?;
        self.objects[index] = obj;
        Ok(())
    }

    pub fn get_object(&self, r: PDFObjRef) -> Option<&PDFObject> {
        let index = r.objid.checked_sub(1)? as usize;
        self.objects.get(index)
    }

    fn slot_index(&self, r: PDFObjRef) -> Result<usize> {
        let index = r
            .objid
            .checked_sub(1)
            .map(|i| i as usize)
            .filter(|&i| i < self.objects.len());
        index.ok_or(PdfError::ObjectNotFound(r.objid))
    }

    /// Clone a page out of a reader document and append it to the tree.
    pub fn add_page(&mut self, doc: &PDFDocument, page: &Page) -> Result<PDFObjRef> {
        let count = self.page_count();
        self.insert_page(doc, page, count)
    }

    /// Clone a page out of a reader document, inserting it at `index`
    /// (clamped to the end of the current tree).
    pub fn insert_page(&mut self, doc: &PDFDocument, page: &Page, index: usize) -> Result<PDFObjRef> {
        // Register the page in the clone table before copying its
        // attributes, so annotations and destinations pointing at it land
        // on the cloned page rather than an orphan copy.
        let slot = (page.objid != 0)
            .then(|| self.reserve_clone_slot((doc.doc_id(), page.objid)));

        let mut attrs = Dict::new();
        attrs.insert("Type".into(), PDFObject::name("Page"));
        for (key, value) in &page.attrs {
            // The source /Parent points into the source tree, and
            // /StructParents indexes a structure tree that is not carried.
            if key == "Parent" || key == "Type" || key == "StructParents" {
                continue;
            }
            attrs.insert(key.clone(), self.clone_object(doc, value)?);
        }
        attrs.insert("Parent".into(), PDFObject::Ref(self.pages));

        // A page's /Contents must be indirect; hoist a direct value into
        // its own object.
        let direct_contents = matches!(
            attrs.get("Contents"),
            Some(c) if !matches!(c, PDFObject::Ref(_) | PDFObject::Null)
        );
        if direct_contents {
            let contents = attrs.remove("Contents").unwrap_or(PDFObject::Null);
            let contents_ref = self.add_object(contents);
            attrs.insert("Contents".into(), PDFObject::Ref(contents_ref));
        }

        let page_ref = match slot {
            Some(dst) if matches!(self.objects[(dst - 1) as usize], PDFObject::Null) => {
                self.objects[(dst - 1) as usize] = PDFObject::Dict(attrs);
                PDFObjRef::new(dst, 0)
            }
            // The source page was already materialized (inserted twice);
            // this insertion gets a fresh copy.
            _ => self.add_object(PDFObject::Dict(attrs)),
        };

        let pages_index = self.slot_index(self.pages)?;
        if let PDFObject::Dict(ref mut pages_dict) = self.objects[pages_index] {
            let kids = pages_dict
                .entry("Kids".to_string())
                .or_insert_with(|| PDFObject::Array(Vec::new()));
            if let PDFObject::Array(arr) = kids {
                let at = index.min(arr.len());
                arr.insert(at, PDFObject::Ref(page_ref));
            }
            let count = pages_dict
                .get("Count")
                .and_then(|c| c.as_int().ok())
                .unwrap_or(0);
            pages_dict.insert("Count".into(), PDFObject::Int(count + 1));
        }

        Ok(page_ref)
    }

    /// Merge a reader document into this one: every page in document
    /// order, then the furniture that points at pages. Named destinations
    /// are remapped through the clone table, outline entries are kept only
    /// when their target page survived, link annotations travel with
    /// their page, and AcroForm fields are unioned by translated
    /// reference.
    pub fn append(&mut self, doc: &PDFDocument) -> Result<()> {
        let pages = doc.pages()?;
        // Reserve every page's slot up front so links between pages
        // resolve to cloned pages no matter the cloning order.
        for page in &pages {
            if page.objid != 0 {
                self.reserve_clone_slot((doc.doc_id(), page.objid));
            }
        }
        for page in &pages {
            self.add_page(doc, page)?;
        }
        self.merge_named_destinations(doc)?;
        self.merge_outlines(doc)?;
        self.merge_acroform(doc)?;
        Ok(())
    }

    /// Map a source object to a destination number, creating a placeholder
    /// slot when the object has not been cloned yet.
    fn reserve_clone_slot(&mut self, key: (DocId, u32)) -> u32 {
        if let Some(&dst) = self.cloned.get(&key) {
            return dst;
        }
        self.objects.push(PDFObject::Null);
        let dst = self.objects.len() as u32;
        self.cloned.insert(key, dst);
        dst
    }

    /// Push an object that later merges will mutate in place. Bypasses the
    /// content-hash table so the slot is never shared with an equal value.
    fn push_mutable_object(&mut self, obj: PDFObject) -> PDFObjRef {
        self.objects.push(obj);
        PDFObjRef::new(self.objects.len() as u32, 0)
    }

    /// A destination array survives the merge when its target page was
    /// cloned into this document.
    fn dest_page_survives(&self, doc: &PDFDocument, dest: &PDFObject) -> bool {
        if let PDFObject::Array(arr) = dest
            && let Some(PDFObject::Ref(r)) = arr.first()
        {
            return self.cloned.contains_key(&(doc.doc_id(), r.objid));
        }
        false
    }

    fn merge_named_destinations(&mut self, doc: &PDFDocument) -> Result<()> {
        let mut merged = Dict::new();
        for (name, dest) in doc.named_destinations()? {
            if !self.dest_page_survives(doc, &dest) {
                continue;
            }
            let cloned = self.clone_object(doc, &dest)?;
            merged.entry(name).or_insert(cloned);
        }
        if merged.is_empty() {
            return Ok(());
        }

        // Flat /Dests dictionary on the catalog; earlier merges win on a
        // name collision.
        let root_index = self.slot_index(self.root)?;
        let existing = match &self.objects[root_index] {
            PDFObject::Dict(root) => match root.get("Dests") {
                Some(PDFObject::Ref(r)) => Some(*r),
                _ => None,
            },
            _ => None,
        };
        let dests_ref = match existing {
            Some(r) => r,
            None => {
                let r = self.push_mutable_object(PDFObject::Dict(Dict::new()));
                if let PDFObject::Dict(ref mut root) = self.objects[root_index] {
                    root.insert("Dests".into(), PDFObject::Ref(r));
                }
                r
            }
        };
        let index = self.slot_index(dests_ref)?;
        if let PDFObject::Dict(ref mut dests) = self.objects[index] {
            for (name, dest) in merged {
                dests.entry(name).or_insert(dest);
            }
        }
        Ok(())
    }

    fn merge_outlines(&mut self, doc: &PDFDocument) -> Result<()> {
        let items = doc.get_outlines()?;

        // Keep entries whose destination page made it into this document;
        // an entry that is dropped takes its descendants with it.
        let mut kept: Vec<(usize, String, PDFObject)> = Vec::new();
        let mut dropped_above: Option<usize> = None;
        for item in items {
            if let Some(cut) = dropped_above {
                if item.level > cut {
                    continue;
                }
                dropped_above = None;
            }
            match item.dest {
                Some(dest) if self.dest_page_survives(doc, &dest) => {
                    let cloned = self.clone_object(doc, &dest)?;
                    kept.push((item.level, item.title, cloned));
                }
                _ => dropped_above = Some(item.level),
            }
        }
        let Some(&(top_level, _, _)) = kept.first() else {
            return Ok(());
        };

        let outlines_ref = self.ensure_outlines_root()?;
        let (span, count) = self.build_outline_level(&kept, top_level, outlines_ref);
        let Some((first, last)) = span else {
            return Ok(());
        };

        let index = self.slot_index(outlines_ref)?;
        let old_last = match &self.objects[index] {
            PDFObject::Dict(root) => match root.get("Last") {
                Some(PDFObject::Ref(r)) => Some(*r),
                _ => None,
            },
            _ => None,
        };
        // Chain onto outlines carried over by an earlier append.
        if let Some(prev_last) = old_last {
            let pidx = self.slot_index(prev_last)?;
            if let PDFObject::Dict(ref mut pd) = self.objects[pidx] {
                pd.insert("Next".into(), PDFObject::Ref(first));
            }
            let fidx = self.slot_index(first)?;
            if let PDFObject::Dict(ref mut fd) = self.objects[fidx] {
                fd.insert("Prev".into(), PDFObject::Ref(prev_last));
            }
        }
        if let PDFObject::Dict(ref mut root) = self.objects[index] {
            if old_last.is_none() {
                root.insert("First".into(), PDFObject::Ref(first));
            }
            root.insert("Last".into(), PDFObject::Ref(last));
            let prev_count = root
                .get("Count")
                .and_then(|c| c.as_int().ok())
                .unwrap_or(0);
            root.insert("Count".into(), PDFObject::Int(prev_count + count));
        }
        Ok(())
    }

    fn ensure_outlines_root(&mut self) -> Result<PDFObjRef> {
        let root_index = self.slot_index(self.root)?;
        if let PDFObject::Dict(root) = &self.objects[root_index]
            && let Some(PDFObject::Ref(r)) = root.get("Outlines")
        {
            return Ok(*r);
        }
        let mut dict = Dict::new();
        dict.insert("Type".into(), PDFObject::name("Outlines"));
        let r = self.push_mutable_object(PDFObject::Dict(dict));
        if let PDFObject::Dict(ref mut root) = self.objects[root_index] {
            root.insert("Outlines".into(), PDFObject::Ref(r));
        }
        Ok(r)
    }

    /// Emit outline nodes for the run of `items` rooted at `level`,
    /// wiring /Parent, /Prev/Next, /First/Last and /Count. Returns the
    /// (first, last) siblings and the total node count.
    fn build_outline_level(
        &mut self,
        items: &[(usize, String, PDFObject)],
        level: usize,
        parent: PDFObjRef,
    ) -> (Option<(PDFObjRef, PDFObjRef)>, i64) {
        let mut first: Option<PDFObjRef> = None;
        let mut prev: Option<PDFObjRef> = None;
        let mut total = 0i64;

        let mut i = 0;
        while i < items.len() {
            let mut dict = Dict::new();
            dict.insert("Title".into(), PDFObject::text(&items[i].1));
            dict.insert("Dest".into(), items[i].2.clone());
            dict.insert("Parent".into(), PDFObject::Ref(parent));
            let node = self.push_mutable_object(PDFObject::Dict(dict));
            total += 1;

            // The run of deeper entries that follows is this node's
            // subtree.
            let start = i + 1;
            let mut end = start;
            while end < items.len() && items[end].0 > level {
                end += 1;
            }
            if end > start {
                let child_level = items[start].0;
                let (child_span, child_count) =
                    self.build_outline_level(&items[start..end], child_level, node);
                if let Some((cfirst, clast)) = child_span {
                    let idx = (node.objid - 1) as usize;
                    if let PDFObject::Dict(ref mut nd) = self.objects[idx] {
                        nd.insert("First".into(), PDFObject::Ref(cfirst));
                        nd.insert("Last".into(), PDFObject::Ref(clast));
                        nd.insert("Count".into(), PDFObject::Int(child_count));
                    }
                }
                total += child_count;
            }

            if let Some(p) = prev {
                let pidx = (p.objid - 1) as usize;
                if let PDFObject::Dict(ref mut pd) = self.objects[pidx] {
                    pd.insert("Next".into(), PDFObject::Ref(node));
                }
                let nidx = (node.objid - 1) as usize;
                if let PDFObject::Dict(ref mut nd) = self.objects[nidx] {
                    nd.insert("Prev".into(), PDFObject::Ref(p));
                }
            }
            first.get_or_insert(node);
            prev = Some(node);
            i = end;
        }

        (first.map(|f| (f, prev.unwrap_or(f))), total)
    }

    fn merge_acroform(&mut self, doc: &PDFDocument) -> Result<()> {
        let Some(acro_ref) = doc.catalog().get("AcroForm") else {
            return Ok(());
        };
        let Ok(acro) = doc.resolve(acro_ref) else {
            return Ok(());
        };
        let Ok(acro_dict) = acro.as_dict() else {
            return Ok(());
        };
        let Some(fields_obj) = acro_dict.get("Fields") else {
            return Ok(());
        };
        let Ok(fields_resolved) = doc.resolve(fields_obj) else {
            return Ok(());
        };
        let Ok(fields) = fields_resolved.as_array() else {
            return Ok(());
        };

        let mut cloned_fields = Vec::new();
        for field in fields {
            cloned_fields.push(self.clone_object(doc, field)?);
        }
        if cloned_fields.is_empty() {
            return Ok(());
        }

        let root_index = self.slot_index(self.root)?;
        let existing = match &self.objects[root_index] {
            PDFObject::Dict(root) => match root.get("AcroForm") {
                Some(PDFObject::Ref(r)) => Some(*r),
                _ => None,
            },
            _ => None,
        };
        let acroform_ref = match existing {
            Some(r) => r,
            None => {
                let mut dict = Dict::new();
                dict.insert("Fields".into(), PDFObject::Array(Vec::new()));
                let r = self.push_mutable_object(PDFObject::Dict(dict));
                if let PDFObject::Dict(ref mut root) = self.objects[root_index] {
                    root.insert("AcroForm".into(), PDFObject::Ref(r));
                }
                r
            }
        };
        let index = self.slot_index(acroform_ref)?;
        if let PDFObject::Dict(ref mut dict) = self.objects[index] {
            let fields = dict
                .entry("Fields".to_string())
                .or_insert_with(|| PDFObject::Array(Vec::new()));
            if let PDFObject::Array(arr) = fields {
                // Union: a field cloned by an earlier merge translated to
                // the same destination reference.
                for field in cloned_fields {
                    if !arr.contains(&field) {
                        arr.push(field);
                    }
                }
            }
        }
        Ok(())
    }

    /// Deep-clone a value from a reader document into this writer's table,
    /// translating indirect references through the clone table.
    fn clone_object(&mut self, doc: &PDFDocument, obj: &PDFObject) -> Result<PDFObject> {
        match obj {
            PDFObject::Ref(r) => {
                let key = (doc.doc_id(), r.objid);
                if let Some(&dst) = self.cloned.get(&key) {
                    return Ok(PDFObject::Ref(PDFObjRef::new(dst, 0)));
                }

                // Reserve the slot before recursing so reference cycles in
                // the source terminate.
                self.objects.push(PDFObject::Null);
                let dst = self.objects.len() as u32;
                self.cloned.insert(key, dst);

                let resolved = match doc.getobj(r.objid) {
                    Ok(o) => o,
                    Err(PdfError::ObjectNotFound(_)) => PDFObject::Null,
                    Err(e) => return Err(e),
                };
                let cloned = self.clone_object(doc, &resolved)?;
                self.objects[(dst - 1) as usize] = cloned;
                Ok(PDFObject::Ref(PDFObjRef::new(dst, 0)))
            }
            PDFObject::Array(arr) => {
                let mut out = Vec::with_capacity(arr.len());
                for item in arr {
                    out.push(self.clone_object(doc, item)?);
                }
                Ok(PDFObject::Array(out))
            }
            PDFObject::Dict(dict) => {
                let mut out = Dict::new();
                for (k, v) in dict {
                    out.insert(k.clone(), self.clone_object(doc, v)?);
                }
                Ok(PDFObject::Dict(out))
            }
            PDFObject::Stream(stream) => {
                let mut attrs = Dict::new();
                for (k, v) in &stream.attrs {
                    attrs.insert(k.clone(), self.clone_object(doc, v)?);
                }
                // Carry the payload in plaintext; the write pass re-encrypts
                // if this writer encrypts.
                let raw = doc.decrypt_stream_payload(stream);
                attrs.insert("Length".into(), PDFObject::Int(raw.len() as i64));
                let mut out = crate::model::PDFStream::new(attrs, Vec::new());
                out.set_rawdata_decrypted(raw);
                Ok(PDFObject::Stream(Box::new(out)))
            }
            other => Ok(other.clone()),
        }
    }

    /// Set document information entries (/Title, /Author, ...).
    pub fn set_info(&mut self, entries: &[(&str, &str)]) -> Result<()> {
        let index = self.slot_index(self.info)?;
        if let PDFObject::Dict(ref mut dict) = self.objects[index] {
            for (key, value) in entries {
                dict.insert((*key).to_string(), PDFObject::text(value));
            }
        }
        Ok(())
    }

    /// Turn on encryption for the written file.
    ///
    /// An empty owner password falls back to the user password. The /P flag
    /// word is taken verbatim.
    pub fn encrypt(
        &mut self,
        algorithm: EncryptionAlgorithm,
        user_password: &str,
        owner_password: &str,
        permissions: u32,
    ) -> Result<()> {
        let (first_id, _) = self.ensure_file_ids();
        let (dict, handler) =
            generate_encryption(algorithm, user_password, owner_password, permissions, &first_id)?;
        self.encryption = Some(WriterEncryption { dict, handler });
        Ok(())
    }

    /// File identifiers for the trailer /ID entry, generated once from the
    /// table contents and the clock.
    fn ensure_file_ids(&mut self) -> (Vec<u8>, Vec<u8>) {
        if let Some(ids) = &self.file_ids {
            return ids.clone();
        }
        let mut seed = Vec::new();
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        seed.extend_from_slice(&now.as_nanos().to_be_bytes());
        seed.extend_from_slice(&(self.objects.len() as u64).to_be_bytes());
        for obj in self.objects.iter().take(8) {
            seed.extend_from_slice(&to_bytes(obj));
        }
        let id = md5::compute(&seed).0.to_vec();
        let ids = (id.clone(), id);
        self.file_ids = Some(ids.clone());
        ids
    }

    /// Serialize the document to a byte buffer.
    pub fn write_to_bytes(&mut self) -> Result<Vec<u8>> {
        let (id_first, id_second) = self.ensure_file_ids();

        let mut out = Vec::new();
        out.extend_from_slice(b"%PDF-1.7\n");
        // Binary-content marker comment.
        out.extend_from_slice(b"%\xE2\xE3\xCF\xD3\n");

        let encrypt_objid = self
            .encryption
            .as_ref()
            .map(|_| self.objects.len() as u32 + 1);

        let mut offsets = Vec::with_capacity(self.objects.len() + 1);
        for (index, obj) in self.objects.iter().enumerate() {
            let objid = index as u32 + 1;
            offsets.push(out.len());
            out.extend_from_slice(format!("{objid} 0 obj\n").as_bytes());
            let prepared = match &self.encryption {
                Some(enc) => encrypt_for_write(enc.handler.as_ref(), obj.clone(), objid),
                None => fix_stream_length(obj.clone()),
            };
            write_object(&prepared, &mut out);
            out.extend_from_slice(b"\nendobj\n");
        }

        // The encryption dictionary itself is written in the clear.
        if let (Some(objid), Some(enc)) = (encrypt_objid, &self.encryption) {
            offsets.push(out.len());
            out.extend_from_slice(format!("{objid} 0 obj\n").as_bytes());
            write_object(&PDFObject::Dict(enc.dict.clone()), &mut out);
            out.extend_from_slice(b"\nendobj\n");
        }

        let xref_pos = out.len();
        let total = offsets.len();
        out.extend_from_slice(format!("xref\n0 {}\n", total + 1).as_bytes());
        out.extend_from_slice(b"0000000000 65535 f \r\n");
        for offset in &offsets {
            out.extend_from_slice(format!("{offset:010} 00000 n \r\n").as_bytes());
        }

        let mut trailer = Dict::new();
        trailer.insert("Size".into(), PDFObject::Int(total as i64 + 1));
        trailer.insert("Root".into(), PDFObject::Ref(self.root));
        trailer.insert("Info".into(), PDFObject::Ref(self.info));
        trailer.insert(
            "ID".into(),
            PDFObject::Array(vec![
                PDFObject::String(PDFString::Bytes(id_first)),
                PDFObject::String(PDFString::Bytes(id_second)),
            ]),
        );
        if let Some(objid) = encrypt_objid {
            trailer.insert("Encrypt".into(), PDFObject::Ref(PDFObjRef::new(objid, 0)));
        }

        out.extend_from_slice(b"trailer\n");
        write_object(&PDFObject::Dict(trailer), &mut out);
        out.extend_from_slice(format!("\nstartxref\n{xref_pos}\n%%EOF\n").as_bytes());

        Ok(out)
    }

    /// Serialize the document into a sink.
    pub fn write<W: Write>(&mut self, sink: &mut W) -> Result<()> {
        let bytes = self.write_to_bytes()?;
        sink.write_all(&bytes)?;
        Ok(())
    }
}

impl Default for PDFWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Recompute a stream's /Length to match the payload about to be emitted.
fn fix_stream_length(obj: PDFObject) -> PDFObject {
    match obj {
        PDFObject::Stream(mut stream) => {
            let len = stream.get_rawdata().len() as i64;
            stream.attrs.insert("Length".into(), PDFObject::Int(len));
            PDFObject::Stream(stream)
        }
        other => other,
    }
}

/// Recursively encrypt string and stream payloads for output. Names,
/// numbers and booleans pass through untouched.
fn encrypt_for_write(
    handler: &(dyn PDFSecurityHandler + Send + Sync),
    obj: PDFObject,
    objid: u32,
) -> PDFObject {
    match obj {
        PDFObject::String(s) => {
            let encrypted = handler.encrypt_string(objid, 0, &s.to_raw());
            PDFObject::String(PDFString::Bytes(encrypted))
        }
        PDFObject::Array(arr) => PDFObject::Array(
            arr.into_iter()
                .map(|item| encrypt_for_write(handler, item, objid))
                .collect(),
        ),
        PDFObject::Dict(dict) => PDFObject::Dict(
            dict.into_iter()
                .map(|(k, v)| (k, encrypt_for_write(handler, v, objid)))
                .collect(),
        ),
        PDFObject::Stream(mut stream) => {
            let attrs: Dict = stream
                .attrs
                .clone()
                .into_iter()
                .map(|(k, v)| (k, encrypt_for_write(handler, v, objid)))
                .collect();
            stream.attrs = attrs;
            let encrypted = handler.encrypt_stream(objid, 0, stream.get_rawdata(), &stream.attrs);
            stream
                .attrs
                .insert("Length".into(), PDFObject::Int(encrypted.len() as i64));
            stream.set_rawdata(encrypted);
            PDFObject::Stream(stream)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_table_has_catalog_pages_info() {
        let w = PDFWriter::new();
        let root = w.get_object(w.root_ref()).unwrap().as_dict().unwrap();
        assert_eq!(root.get("Type").unwrap().as_name().unwrap(), "Catalog");
        let pages_ref = root.get("Pages").unwrap().as_ref().unwrap();
        assert_eq!(*pages_ref, w.pages_ref());
        assert_eq!(w.page_count(), 0);
    }

    #[test]
    fn add_object_is_idempotent_for_equal_values() {
        let mut w = PDFWriter::new();
        let a = w.add_object(PDFObject::Int(42));
        let b = w.add_object(PDFObject::Int(42));
        assert_eq!(a, b);
        let c = w.add_object(PDFObject::Int(43));
        assert_ne!(a, c);
    }

    #[test]
    fn written_file_has_classic_xref_shape() {
        let mut w = PDFWriter::new();
        let bytes = w.write_to_bytes().unwrap();
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.starts_with("%PDF-1.7\n"));
        assert!(text.contains("\nxref\n0 4\n"));
        assert!(text.contains("0000000000 65535 f \r\n"));
        assert!(text.contains("startxref"));
        assert!(text.ends_with("%%EOF\n"));
    }
}
