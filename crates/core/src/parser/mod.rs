//! PDF syntax parsing modules.
//!
//! - `lexer`: byte-level tokenizer
//! - `parser`: object parser (arrays, dicts, indirect references)
//! - `content`: content-stream operations and inline images

pub mod content;
pub mod lexer;
pub mod parser;

// Re-export main types for convenience
pub use content::{Operation, PDFContentParser};
pub use lexer::{Keyword, Lexer, Token};
pub use parser::PDFParser;
