//! tinta - PDF object model, parsing, filters, encryption, and assembly.

pub mod codec;
pub mod document;
pub mod error;
pub mod model;
pub mod parser;

// Re-export codec modules for convenience
pub use codec::aes;
pub use codec::arcfour;
pub use codec::ascii85;
pub use codec::ccitt;
pub use codec::lzw;
pub use codec::runlength;

// Re-export model modules
pub use model::objects as pdftypes;

// Re-export document modules
pub use document::catalog as pdfdocument;
pub use document::security;
pub use document::writer as pdfwriter;

pub use document::{PDFDocument, PDFWriter};
pub use error::{PdfError, Result};
pub use model::{Dict, PDFObjRef, PDFObject, PDFStream, PDFString};
pub use parser::PDFParser;
