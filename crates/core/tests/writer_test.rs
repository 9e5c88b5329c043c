//! PDFWriter tests: cloning, de-duplication, serialization round trips,
//! and encrypted output.

use tinta_core::document::EncryptionAlgorithm;
use tinta_core::error::PdfError;
use tinta_core::pdfdocument::PDFDocument;
use tinta_core::pdftypes::PDFObject;
use tinta_core::pdfwriter::PDFWriter;

/// Assemble a one-revision classic-xref PDF from numbered object bodies.
fn classic_pdf(objects: &[&str]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let mut offsets = Vec::new();
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
    }
    let xref_pos = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
    out.extend_from_slice(b"0000000000 65535 f \r\n");
    for off in &offsets {
        out.extend_from_slice(format!("{off:010} 00000 n \r\n").as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_pos
        )
        .as_bytes(),
    );
    out
}

/// Two pages sharing one font object (object 6).
fn two_page_source() -> Vec<u8> {
    classic_pdf(&[
        "<< /Type /Catalog /Pages 2 0 R >>",
        "<< /Type /Pages /Kids [3 0 R 4 0 R] /Count 2 >>",
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Resources 5 0 R >>",
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Resources 5 0 R >>",
        "<< /Font << /F1 6 0 R >> >>",
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>",
    ])
}

fn font_objid_of_page(doc: &PDFDocument, page_index: usize) -> u32 {
    let pages = doc.pages().unwrap();
    let resources = doc
        .resolve(pages[page_index].attrs.get("Resources").unwrap())
        .unwrap();
    let fonts = doc.resolve(resources.as_dict().unwrap().get("Font").unwrap()).unwrap();
    match fonts.as_dict().unwrap().get("F1").unwrap() {
        PDFObject::Ref(r) => r.objid,
        other => panic!("expected indirect font, got {other:?}"),
    }
}

#[test]
fn shared_objects_are_cloned_once() {
    let src_bytes = two_page_source();
    let src = PDFDocument::new(&src_bytes, "").unwrap();

    let mut writer = PDFWriter::new();
    writer.append(&src).unwrap();
    let out = writer.write_to_bytes().unwrap();

    let dst = PDFDocument::new(&out, "").unwrap();
    assert_eq!(dst.pages().unwrap().len(), 2);

    let f0 = font_objid_of_page(&dst, 0);
    let f1 = font_objid_of_page(&dst, 1);
    assert_eq!(f0, f1, "shared font must land in the output once");

    // And the shared resources dictionary too.
    let all = dst.get_objids();
    let font_defs = all
        .iter()
        .filter(|&&id| {
            dst.getobj(id)
                .ok()
                .and_then(|o| o.as_dict().ok().cloned())
                .and_then(|d| d.get("BaseFont").cloned())
                .is_some()
        })
        .count();
    assert_eq!(font_defs, 1);
}

#[test]
fn round_trip_preserves_page_count_and_mediabox() {
    let src_bytes = classic_pdf(&[
        "<< /Type /Catalog /Pages 2 0 R >>",
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>",
        "<< /Type /Page /Parent 2 0 R /Resources << >> /MediaBox [0 0 612 792] >>",
    ]);
    let src = PDFDocument::new(&src_bytes, "").unwrap();
    assert_eq!(src.pages().unwrap().len(), 1);

    let mut writer = PDFWriter::new();
    writer.append(&src).unwrap();
    let out = writer.write_to_bytes().unwrap();

    let dst = PDFDocument::new(&out, "").unwrap();
    let pages = dst.pages().unwrap();
    assert_eq!(pages.len(), 1);

    let mb: Vec<i64> = pages[0]
        .attrs
        .get("MediaBox")
        .unwrap()
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_int().unwrap())
        .collect();
    assert_eq!(mb, vec![0, 0, 612, 792]);
}

#[test]
fn direct_contents_are_hoisted_to_an_indirect_object() {
    let src_bytes = classic_pdf(&[
        "<< /Type /Catalog /Pages 2 0 R >>",
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>",
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 10 10] /Contents [] >>",
    ]);
    // A direct /Contents value is malformed but tolerated on input.
    let src = PDFDocument::new(&src_bytes, "").unwrap();

    let mut writer = PDFWriter::new();
    writer.append(&src).unwrap();
    let out = writer.write_to_bytes().unwrap();

    let dst = PDFDocument::new(&out, "").unwrap();
    let pages = dst.pages().unwrap();
    assert!(matches!(
        pages[0].attrs.get("Contents"),
        Some(PDFObject::Ref(_))
    ));
}

#[test]
fn stream_payloads_survive_the_round_trip() {
    use tinta_core::codec::flate::flateencode;

    let payload = b"0 0 10 10 re f";
    let compressed = flateencode(payload);

    // Build the source with a real compressed content stream.
    let mut pdf = Vec::new();
    pdf.extend_from_slice(b"%PDF-1.4\n");
    let mut offsets = Vec::new();
    let bodies: Vec<Vec<u8>> = vec![
        b"<< /Type /Catalog /Pages 2 0 R >>".to_vec(),
        b"<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_vec(),
        b"<< /Type /Page /Parent 2 0 R /MediaBox [0 0 10 10] /Contents 4 0 R >>".to_vec(),
        {
            let mut b = format!(
                "<< /Filter /FlateDecode /Length {} >>\nstream\n",
                compressed.len()
            )
            .into_bytes();
            b.extend_from_slice(&compressed);
            b.extend_from_slice(b"\nendstream");
            b
        },
    ];
    for (i, body) in bodies.iter().enumerate() {
        offsets.push(pdf.len());
        pdf.extend_from_slice(format!("{} 0 obj\n", i + 1).as_bytes());
        pdf.extend_from_slice(body);
        pdf.extend_from_slice(b"\nendobj\n");
    }
    let xref_pos = pdf.len();
    pdf.extend_from_slice(b"xref\n0 5\n0000000000 65535 f \r\n");
    for off in &offsets {
        pdf.extend_from_slice(format!("{off:010} 00000 n \r\n").as_bytes());
    }
    pdf.extend_from_slice(
        format!("trailer\n<< /Size 5 /Root 1 0 R >>\nstartxref\n{xref_pos}\n%%EOF\n").as_bytes(),
    );

    let src = PDFDocument::new(&pdf, "").unwrap();
    let mut writer = PDFWriter::new();
    writer.append(&src).unwrap();
    let out = writer.write_to_bytes().unwrap();

    let dst = PDFDocument::new(&out, "").unwrap();
    let pages = dst.pages().unwrap();
    let contents = dst.resolve(pages[0].attrs.get("Contents").unwrap()).unwrap();
    let stream = contents.as_stream().unwrap();
    assert_eq!(dst.decode_stream(stream).unwrap(), payload);
}

#[test]
fn encrypted_output_reads_back_with_password() {
    let src_bytes = classic_pdf(&[
        "<< /Type /Catalog /Pages 2 0 R >>",
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>",
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] >>",
    ]);
    let src = PDFDocument::new(&src_bytes, "").unwrap();

    for algorithm in [
        EncryptionAlgorithm::Rc4_40,
        EncryptionAlgorithm::Rc4_128,
        EncryptionAlgorithm::Aes128,
        EncryptionAlgorithm::Aes256R5,
        EncryptionAlgorithm::Aes256,
    ] {
        let mut writer = PDFWriter::new();
        writer.append(&src).unwrap();
        writer.set_info(&[("Title", "locked doc")]).unwrap();
        writer
            .encrypt(algorithm, "correct horse", "", 0xFFFF_F0C4)
            .unwrap();
        let out = writer.write_to_bytes().unwrap();

        let dst = PDFDocument::new(&out, "correct horse")
            .unwrap_or_else(|e| panic!("{algorithm:?}: open failed: {e}"));
        assert!(dst.is_encrypted());
        assert!(!dst.is_locked());
        assert_eq!(dst.pages().unwrap().len(), 1, "{algorithm:?}");

        let title = dst.info()[0].get("Title").unwrap().clone();
        let title = dst.resolve(&title).unwrap();
        assert_eq!(
            title.as_string().unwrap().to_text_lossy(),
            "locked doc",
            "{algorithm:?}"
        );
    }
}

#[test]
fn wrong_password_is_a_hard_error_and_empty_leaves_locked() {
    let src_bytes = classic_pdf(&[
        "<< /Type /Catalog /Pages 2 0 R >>",
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>",
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 10 10] >>",
    ]);
    let src = PDFDocument::new(&src_bytes, "").unwrap();

    let mut writer = PDFWriter::new();
    writer.append(&src).unwrap();
    writer
        .encrypt(EncryptionAlgorithm::Aes256, "sesame", "", 0xFFFF_F0C4)
        .unwrap();
    let out = writer.write_to_bytes().unwrap();

    // Explicit wrong password: hard failure.
    assert!(matches!(
        PDFDocument::new(&out, "not it"),
        Err(PdfError::WrongPassword)
    ));

    // No password: the document opens locked and unlocks later.
    let mut doc = PDFDocument::new(&out, "").unwrap();
    assert!(doc.is_locked());
    assert!(matches!(doc.getobj(1), Err(PdfError::NotDecrypted)));

    doc.decrypt("sesame").unwrap();
    assert!(!doc.is_locked());
    assert_eq!(doc.pages().unwrap().len(), 1);
}

#[test]
fn append_remaps_destinations_outlines_and_links() {
    let src_bytes = classic_pdf(&[
        "<< /Type /Catalog /Pages 2 0 R /Dests 7 0 R /Outlines 8 0 R >>",
        "<< /Type /Pages /Kids [3 0 R 4 0 R] /Count 2 >>",
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Annots [5 0 R] >>",
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] >>",
        "<< /Type /Annot /Subtype /Link /Rect [0 0 10 10] /Dest [4 0 R /Fit] >>",
        "<< /Title (Second page) /Parent 8 0 R /Dest [4 0 R /Fit] >>",
        "<< /first [3 0 R /Fit] /second [4 0 R /Fit] >>",
        "<< /Type /Outlines /First 6 0 R /Last 6 0 R /Count 1 >>",
    ]);
    let src = PDFDocument::new(&src_bytes, "").unwrap();

    let mut writer = PDFWriter::new();
    writer.append(&src).unwrap();
    let out = writer.write_to_bytes().unwrap();

    let dst = PDFDocument::new(&out, "").unwrap();
    let pages = dst.pages().unwrap();
    assert_eq!(pages.len(), 2);
    let second_page = pages[1].objid;

    // Named destination points at the cloned second page.
    let dest = dst.get_dest(b"second").unwrap();
    let arr = dest.as_array().unwrap();
    assert!(matches!(&arr[0], PDFObject::Ref(r) if r.objid == second_page));

    // The outline entry survived and was re-pointed.
    let outlines = dst.get_outlines().unwrap();
    assert_eq!(outlines.len(), 1);
    assert_eq!(outlines[0].title, "Second page");
    let odest = outlines[0].dest.as_ref().unwrap().as_array().unwrap();
    assert!(matches!(&odest[0], PDFObject::Ref(r) if r.objid == second_page));

    // The link annotation on page one targets the cloned page too, not an
    // orphan copy of the source page.
    let annots = dst.resolve(pages[0].attrs.get("Annots").unwrap()).unwrap();
    let annot = dst.resolve(&annots.as_array().unwrap()[0]).unwrap();
    let link = annot.as_dict().unwrap().get("Dest").unwrap().as_array().unwrap().clone();
    assert!(matches!(&link[0], PDFObject::Ref(r) if r.objid == second_page));
}

#[test]
fn written_file_parses_with_strict_mode() {
    let mut writer = PDFWriter::new();
    let out = writer.write_to_bytes().unwrap();
    let doc = PDFDocument::new_with_options(&out, "", true).unwrap();
    assert_eq!(doc.page_count(), 0);
    assert!(!doc.catalog().is_empty());
    assert_eq!(doc.file_ids().len(), 2);
}
