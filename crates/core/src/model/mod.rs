//! PDF data model - primitive objects and their byte rendering.
//!
//! - `objects` - the primitive object types (PDFObject, PDFStream, PDFObjRef)
//! - `serialize` - file-form rendering of every object kind

pub mod objects;
pub mod serialize;

// Re-export main types for convenience
pub use objects::{Dict, DocId, PDFObjRef, PDFObject, PDFStream, PDFString, TextEncoding};
pub use serialize::{to_bytes, write_object};
