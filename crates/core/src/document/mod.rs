//! PDF document module - reading and writing whole files.
//!
//! This module contains:
//! - `catalog` - document parsing, object resolution, page tree (PDFDocument)
//! - `xref` - cross-reference table parsing and rebuild
//! - `security` - encryption/decryption handlers (standard security handler)
//! - `writer` - document assembly and serialization (PDFWriter)

pub mod catalog;
pub mod security;
pub mod writer;
pub(crate) mod xref;

// Re-export main types for convenience
pub use catalog::{OutlineItem, PDFDocument, Page, PdfBytes};
pub use security::{
    EncryptionAlgorithm, PASSWORD_PADDING, PDFSecurityHandler, StandardSecurityHandlerV2,
    StandardSecurityHandlerV4, StandardSecurityHandlerV5, create_security_handler,
    generate_encryption,
};
pub use writer::PDFWriter;
