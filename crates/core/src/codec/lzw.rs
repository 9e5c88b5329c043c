//! LZW stream decoder.
//!
//! PDF's LZW variant: MSB-first variable-width codes starting at 9 bits,
//! code 256 clears the dictionary, 257 stops. `/EarlyChange 0` selects the
//! TIFF-style late code-width switch.

use crate::error::Result;
use weezl::{BitOrder, decode::Decoder};

/// Decode LZW-encoded data with the PDF-default EarlyChange of 1.
pub fn lzwdecode(data: &[u8]) -> Result<Vec<u8>> {
    lzwdecode_with_earlychange(data, 1)
}

/// Decode LZW-encoded data with an explicit EarlyChange setting.
pub fn lzwdecode_with_earlychange(data: &[u8], early_change: i64) -> Result<Vec<u8>> {
    let mut decoder = if early_change == 0 {
        Decoder::with_tiff_size_switch(BitOrder::Msb, 8)
    } else {
        Decoder::new(BitOrder::Msb, 8)
    };
    let mut output = Vec::new();
    // Corrupt tails are tolerated; whatever decoded is kept.
    if let Err(err) = decoder.into_vec(&mut output).decode(data).status {
        log::warn!("LZW stream ended abnormally: {err}");
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_classic_sample() {
        // Sample from the PDF spec's LZW example.
        let data = [0x80, 0x0B, 0x60, 0x50, 0x22, 0x0C, 0x0C, 0x85, 0x01];
        let out = lzwdecode(&data).unwrap();
        assert_eq!(out, [45, 45, 45, 45, 45, 65, 45, 45, 45, 66]);
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert!(lzwdecode(&[]).unwrap().is_empty());
    }
}
