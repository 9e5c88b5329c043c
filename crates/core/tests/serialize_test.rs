//! Serialization round trips: every non-stream object kind survives
//! render-then-parse unchanged.

use tinta_core::model::{Dict, PDFObjRef, PDFObject, to_bytes};
use tinta_core::parser::PDFParser;

fn round_trip(obj: &PDFObject) -> PDFObject {
    let bytes = to_bytes(obj);
    let mut parser = PDFParser::new(&bytes);
    parser
        .parse_object()
        .unwrap_or_else(|e| panic!("reparse of {:?} failed: {e}", String::from_utf8_lossy(&bytes)))
}

#[test]
fn scalars_round_trip() {
    for obj in [
        PDFObject::Null,
        PDFObject::Bool(true),
        PDFObject::Bool(false),
        PDFObject::Int(0),
        PDFObject::Int(-987654321),
        PDFObject::Real(3.25),
        PDFObject::Real(-0.5),
        PDFObject::name("Type"),
        PDFObject::name("Name With Spaces"),
        PDFObject::name("weird#hash"),
        PDFObject::text("plain text"),
        PDFObject::text("escapes (parens) and \\ backslash"),
        PDFObject::string_bytes(vec![0x00, 0xFF, 0x9F, 0x41]),
        PDFObject::Ref(PDFObjRef::new(12, 3)),
    ] {
        assert_eq!(round_trip(&obj), obj);
    }
}

#[test]
fn containers_round_trip() {
    let mut inner = Dict::new();
    inner.insert("Kids".into(), PDFObject::Array(vec![
        PDFObject::Ref(PDFObjRef::new(3, 0)),
        PDFObject::Ref(PDFObjRef::new(4, 0)),
    ]));
    inner.insert("Count".into(), PDFObject::Int(2));

    let mut outer = Dict::new();
    outer.insert("Type".into(), PDFObject::name("Catalog"));
    outer.insert("Pages".into(), PDFObject::Dict(inner));
    outer.insert(
        "Order".into(),
        PDFObject::Array(vec![
            PDFObject::Int(1),
            PDFObject::Real(2.5),
            PDFObject::text("three"),
            PDFObject::Null,
            PDFObject::Array(vec![PDFObject::Bool(false)]),
        ]),
    );

    let obj = PDFObject::Dict(outer);
    assert_eq!(round_trip(&obj), obj);
}

#[test]
fn utf16_text_round_trips_with_bom() {
    let obj = PDFObject::text("naïve — ünïcode ✓");
    assert_eq!(round_trip(&obj), obj);
}

#[test]
fn deterministic_output_for_equal_dicts() {
    // Key order in the source map must not change the rendered bytes.
    let mut a = Dict::new();
    a.insert("B".into(), PDFObject::Int(2));
    a.insert("A".into(), PDFObject::Int(1));
    let mut b = Dict::new();
    b.insert("A".into(), PDFObject::Int(1));
    b.insert("B".into(), PDFObject::Int(2));
    assert_eq!(to_bytes(&PDFObject::Dict(a)), to_bytes(&PDFObject::Dict(b)));
}
