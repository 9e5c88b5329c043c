//! CCITTFaxDecode handling.
//!
//! The fax payload is not decompressed here. Instead it is wrapped in a
//! minimal single-strip TIFF header so that any TIFF-capable consumer can
//! decode it directly, which preserves the image without needing a Group
//! 3/4 implementation.

use byteorder::{LittleEndian, WriteBytesExt};

const IFD_TAG_COUNT: u16 = 8;
// 2-byte order mark + version + IFD offset + tag count + 8 tags + next-IFD.
const HEADER_LEN: u32 = 2 + 2 + 4 + 2 + 12 * IFD_TAG_COUNT as u32 + 2;

const TYPE_SHORT: u16 = 3;
const TYPE_LONG: u16 = 4;

/// Wrap raw CCITT fax data in a little-endian single-strip TIFF container.
///
/// `k` is the `/K` encoding parameter: negative selects Group 4 (T.6),
/// zero or positive Group 3 (T.4).
pub fn ccittfaxdecode(data: &[u8], k: i64, columns: i64, rows: i64) -> Vec<u8> {
    let compression: u32 = if k < 0 { 4 } else { 3 };

    let mut out = Vec::with_capacity(HEADER_LEN as usize + data.len());
    out.extend_from_slice(b"II"); // little-endian byte order
    let _ = out.write_u16::<LittleEndian>(42);
    let _ = out.write_u32::<LittleEndian>(8); // offset of the first IFD
    let _ = out.write_u16::<LittleEndian>(IFD_TAG_COUNT);

    let tag = |out: &mut Vec<u8>, id: u16, typ: u16, value: u32| {
        let _ = out.write_u16::<LittleEndian>(id);
        let _ = out.write_u16::<LittleEndian>(typ);
        let _ = out.write_u32::<LittleEndian>(1); // count
        let _ = out.write_u32::<LittleEndian>(value);
    };

    tag(&mut out, 256, TYPE_LONG, columns as u32); // ImageWidth
    tag(&mut out, 257, TYPE_LONG, rows as u32); // ImageLength
    tag(&mut out, 258, TYPE_SHORT, 1); // BitsPerSample
    tag(&mut out, 259, TYPE_SHORT, compression); // Compression
    tag(&mut out, 262, TYPE_SHORT, 0); // PhotometricInterpretation
    tag(&mut out, 273, TYPE_LONG, HEADER_LEN); // StripOffsets
    tag(&mut out, 278, TYPE_LONG, rows as u32); // RowsPerStrip
    tag(&mut out, 279, TYPE_LONG, data.len() as u32); // StripByteCounts

    let _ = out.write_u16::<LittleEndian>(0); // no further IFDs
    out.extend_from_slice(data);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_shape_group4() {
        let payload = [0xAAu8, 0xBB, 0xCC];
        let out = ccittfaxdecode(&payload, -1, 1728, 100);
        assert_eq!(&out[..2], b"II");
        assert_eq!(out[2], 42);
        assert_eq!(out.len(), HEADER_LEN as usize + payload.len());
        assert_eq!(&out[HEADER_LEN as usize..], &payload);
        // Compression tag (259) carries 4 for Group 4.
        let tag4 = &out[10 + 3 * 12..10 + 4 * 12];
        assert_eq!(&tag4[..2], &259u16.to_le_bytes());
        assert_eq!(&tag4[8..12], &4u32.to_le_bytes());
    }

    #[test]
    fn group3_when_k_is_nonnegative() {
        let out = ccittfaxdecode(&[], 0, 8, 8);
        let tag4 = &out[10 + 3 * 12..10 + 4 * 12];
        assert_eq!(&tag4[8..12], &3u32.to_le_bytes());
    }
}
