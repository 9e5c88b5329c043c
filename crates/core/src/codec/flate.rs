//! Flate (zlib/deflate) codec and the row predictors shared with LZW.
//!
//! Decoding is deliberately forgiving about the compressed container:
//! some producers emit raw deflate without the zlib wrapper, and damaged
//! files often carry a truncated tail after otherwise-good data. The
//! predictor math, by contrast, is strict: an undefined predictor or a
//! non-rectangular payload has no safe interpretation.

use crate::error::{PdfError, Result};
use std::io::Read;

/// Inflate zlib data; on a zlib-format error retry as raw deflate, then
/// fall back to byte-at-a-time decompression keeping partial output.
pub fn flatedecode(data: &[u8]) -> Result<Vec<u8>> {
    let mut decompressed = Vec::new();
    let mut decoder = flate2::read::ZlibDecoder::new(data);
    if decoder.read_to_end(&mut decompressed).is_ok() {
        return Ok(decompressed);
    }

    decompressed.clear();
    let mut raw = flate2::read::DeflateDecoder::new(data);
    if raw.read_to_end(&mut decompressed).is_ok() && !decompressed.is_empty() {
        log::warn!("Flate stream lacked a zlib header, decoded as raw deflate");
        return Ok(decompressed);
    }

    let partial = decompress_corrupted(data);
    log::warn!(
        "corrupt Flate stream, kept {} partially decoded bytes",
        partial.len()
    );
    Ok(partial)
}

/// Compress data in zlib format (the writer's only encoder).
pub fn flateencode(data: &[u8]) -> Vec<u8> {
    use flate2::Compression;
    use std::io::Write;
    let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), Compression::default());
    // Writing to a Vec cannot fail.
    let _ = encoder.write_all(data);
    encoder.finish().unwrap_or_default()
}

/// Best-effort zlib decompression for corrupted streams: feed one byte at
/// a time and keep whatever came out before the decoder gave up (often a
/// CRC error right at the end).
fn decompress_corrupted(data: &[u8]) -> Vec<u8> {
    use flate2::{Decompress, FlushDecompress, Status};
    let mut decoder = Decompress::new(true);
    let mut out = Vec::with_capacity(data.len() * 2);
    let mut buf = [0u8; 4096];
    let mut i = 0usize;
    while i < data.len() {
        let before_out = decoder.total_out();
        let before_in = decoder.total_in();
        let res = decoder.decompress(&data[i..i + 1], &mut buf, FlushDecompress::None);
        let produced = (decoder.total_out() - before_out) as usize;
        if produced > 0 {
            out.extend_from_slice(&buf[..produced]);
        }
        let consumed = (decoder.total_in() - before_in) as usize;
        i += consumed.max(1);
        match res {
            Ok(Status::StreamEnd) | Err(_) => break,
            Ok(_) => {}
        }
    }
    out
}

/// Reverse the row predictor named by `/Predictor`.
///
/// 1 is the identity; 2 is the TIFF horizontal delta; 10-15 are the PNG
/// per-row filters. Anything else is undefined and fatal.
pub fn apply_predictor(
    data: Vec<u8>,
    predictor: i64,
    colors: i64,
    bits_per_component: i64,
    columns: i64,
) -> Result<Vec<u8>> {
    match predictor {
        1 => Ok(data),
        2 => apply_tiff_predictor(data, colors, bits_per_component, columns),
        10..=15 => apply_png_predictor(
            &data,
            columns.max(1) as usize,
            colors.max(1) as usize,
            bits_per_component.max(1) as usize,
        ),
        other => Err(PdfError::DecodeError(format!(
            "unsupported predictor {other}"
        ))),
    }
}

/// TIFF predictor 2: each byte is a delta against the byte one pixel to
/// the left, rows independent.
fn apply_tiff_predictor(
    mut data: Vec<u8>,
    colors: i64,
    bits_per_component: i64,
    columns: i64,
) -> Result<Vec<u8>> {
    if bits_per_component != 8 {
        return Err(PdfError::DecodeError(format!(
            "TIFF predictor with {bits_per_component} bits per component"
        )));
    }
    let bpp = ((colors.max(1) * bits_per_component) as u64).div_ceil(8) as usize;
    let row_length = (columns.max(1) as usize) * bpp;
    for i in 0..data.len() {
        if i % row_length >= bpp {
            data[i] = data[i].wrapping_add(data[i - bpp]);
        }
    }
    Ok(data)
}

/// Reverse PNG row prediction: each row starts with a 1-byte filter tag,
/// applied against the previous reconstructed row.
fn apply_png_predictor(
    data: &[u8],
    columns: usize,
    colors: usize,
    bits_per_component: usize,
) -> Result<Vec<u8>> {
    let row_bytes = (colors * columns * bits_per_component).div_ceil(8);
    let bpp = std::cmp::max(1, colors * bits_per_component / 8); // bytes per pixel
    let row_size = row_bytes + 1; // +1 for filter tag

    if data.len() % row_size != 0 {
        return Err(PdfError::DecodeError(
            "predicted image data is not rectangular".into(),
        ));
    }

    let mut result = Vec::with_capacity(data.len());
    let mut prev_row = vec![0u8; row_bytes];

    for row in data.chunks_exact(row_size) {
        let filter_type = row[0];
        let row_data = &row[1..];
        let mut current_row = vec![0u8; row_bytes];

        match filter_type {
            0 => {
                // None
                current_row.copy_from_slice(row_data);
            }
            1 => {
                // Sub: delta against the byte one pixel to the left
                for i in 0..row_bytes {
                    let left = if i >= bpp { current_row[i - bpp] } else { 0 };
                    current_row[i] = row_data[i].wrapping_add(left);
                }
            }
            2 => {
                // Up: delta against the byte above
                for i in 0..row_bytes {
                    current_row[i] = row_data[i].wrapping_add(prev_row[i]);
                }
            }
            3 => {
                // Average of left and above
                for i in 0..row_bytes {
                    let left = if i >= bpp {
                        u16::from(current_row[i - bpp])
                    } else {
                        0
                    };
                    let above = u16::from(prev_row[i]);
                    current_row[i] = row_data[i].wrapping_add(((left + above) / 2) as u8);
                }
            }
            4 => {
                // Paeth
                for i in 0..row_bytes {
                    let left = if i >= bpp { current_row[i - bpp] } else { 0 };
                    let above = prev_row[i];
                    let upper_left = if i >= bpp { prev_row[i - bpp] } else { 0 };
                    let paeth = paeth_predictor(left, above, upper_left);
                    current_row[i] = row_data[i].wrapping_add(paeth);
                }
            }
            other => {
                return Err(PdfError::DecodeError(format!(
                    "unsupported PNG row filter {other}"
                )));
            }
        }

        result.extend_from_slice(&current_row);
        prev_row = current_row;
    }

    Ok(result)
}

/// Paeth choice function: whichever of left/above/upper-left is closest
/// to `left + above - upper_left`.
const fn paeth_predictor(left: u8, above: u8, upper_left: u8) -> u8 {
    let a = left as i32;
    let b = above as i32;
    let c = upper_left as i32;
    let p = a + b - c;
    let pa = (p - a).abs();
    let pb = (p - b).abs();
    let pc = (p - c).abs();

    if pa <= pb && pa <= pc {
        left
    } else if pb <= pc {
        above
    } else {
        upper_left
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flate_round_trip() {
        let data = b"flate round trip payload";
        assert_eq!(flatedecode(&flateencode(data)).unwrap(), data);
    }

    #[test]
    fn tiff_predictor_reverses_horizontal_delta() {
        // Two rows of 4 one-byte pixels, delta-encoded.
        let encoded = vec![10, 1, 1, 1, 20, 2, 2, 2];
        let decoded = apply_predictor(encoded, 2, 1, 8, 4).unwrap();
        assert_eq!(decoded, vec![10, 11, 12, 13, 20, 22, 24, 26]);
    }

    #[test]
    fn png_sub_and_paeth_rows() {
        // row 1: Sub filter, row 2: Paeth
        let encoded = vec![1, 5, 5, 5, 4, 1, 1, 1];
        let decoded = apply_predictor(encoded, 10, 1, 8, 3).unwrap();
        assert_eq!(decoded, vec![5, 10, 15, 6, 11, 16]);
    }

    #[test]
    fn unknown_predictor_is_fatal() {
        assert!(apply_predictor(vec![0; 4], 3, 1, 8, 4).is_err());
        assert!(apply_predictor(vec![0; 4], 16, 1, 8, 4).is_err());
    }

    #[test]
    fn non_rectangular_png_data_is_fatal() {
        // 3 columns -> row size 4; 5 bytes is not a whole number of rows.
        assert!(apply_predictor(vec![0; 5], 10, 1, 8, 3).is_err());
    }
}
