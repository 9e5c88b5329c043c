//! Stream and string codecs.
//!
//! One module per filter family, plus the symmetric ciphers the security
//! handlers use. [`filters::apply_filters`] chains the decoders according
//! to a stream's `/Filter` entry.

pub mod aes;
pub mod arcfour;
pub mod ascii85;
pub mod ccitt;
pub mod filters;
pub mod flate;
pub mod lzw;
pub mod runlength;

pub use arcfour::Arcfour;
pub use ascii85::{ascii85decode, asciihexdecode};
pub use ccitt::ccittfaxdecode;
pub use filters::apply_filters;
pub use flate::{apply_predictor, flatedecode, flateencode};
pub use lzw::lzwdecode;
pub use runlength::rldecode;
