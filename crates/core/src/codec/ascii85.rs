//! ASCII85 and ASCIIHex stream decoders.

use crate::error::{PdfError, Result};

/// Decode ASCII85-encoded data.
///
/// Groups of 5 base-85 digits map to 4 bytes; `z` is shorthand for a zero
/// group; `~>` terminates. A partial final group is padded with `u`
/// (value 84) and the output truncated accordingly.
pub fn ascii85decode(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len() * 4 / 5);
    let mut group = [0u8; 5];
    let mut n = 0;
    let mut i = 0;

    // optional <~ prefix
    if data.len() >= 2 && data[0] == b'<' && data[1] == b'~' {
        i = 2;
    }

    while i < data.len() {
        let c = data[i];
        i += 1;
        match c {
            b'~' => break,
            b'z' if n == 0 => out.extend_from_slice(&[0, 0, 0, 0]),
            b'!'..=b'u' => {
                group[n] = c - b'!';
                n += 1;
                if n == 5 {
                    push_group(&group, 4, &mut out);
                    n = 0;
                }
            }
            c if c.is_ascii_whitespace() => {}
            _ => {
                return Err(PdfError::DecodeError(format!(
                    "invalid ASCII85 byte {c:#04x}"
                )));
            }
        }
    }

    if n > 0 {
        if n == 1 {
            return Err(PdfError::DecodeError(
                "ASCII85 final group of one digit".into(),
            ));
        }
        let keep = n - 1;
        for slot in group.iter_mut().skip(n) {
            *slot = 84; // pad with 'u'
        }
        push_group(&group, keep, &mut out);
    }

    Ok(out)
}

fn push_group(group: &[u8; 5], keep: usize, out: &mut Vec<u8>) {
    let mut value: u32 = 0;
    for &digit in group {
        value = value.wrapping_mul(85).wrapping_add(u32::from(digit));
    }
    out.extend_from_slice(&value.to_be_bytes()[..keep]);
}

/// Decode ASCIIHex-encoded data.
///
/// Pairs of hex nibbles until `>`; whitespace is skipped; an odd final
/// nibble is padded with zero. A missing terminator degrades with a
/// warning rather than failing.
pub fn asciihexdecode(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len() / 2);
    let mut pending: Option<u8> = None;
    let mut terminated = false;

    for &c in data {
        if c == b'>' {
            terminated = true;
            break;
        }
        let nibble = match c {
            b'0'..=b'9' => c - b'0',
            b'a'..=b'f' => c - b'a' + 10,
            b'A'..=b'F' => c - b'A' + 10,
            c if c.is_ascii_whitespace() || c == 0 => continue,
            _ => {
                return Err(PdfError::DecodeError(format!(
                    "invalid ASCIIHex byte {c:#04x}"
                )));
            }
        };
        match pending.take() {
            Some(high) => out.push((high << 4) | nibble),
            None => pending = Some(nibble),
        }
    }

    if let Some(high) = pending {
        out.push(high << 4);
    }
    if !terminated {
        log::warn!("ASCIIHex stream missing '>' terminator");
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii85_standard_sample() {
        assert_eq!(ascii85decode(b"9jqo^~>").unwrap(), b"Man ");
        assert_eq!(ascii85decode(b"<~9jqo^~>").unwrap(), b"Man ");
    }

    #[test]
    fn ascii85_zero_group_shorthand() {
        assert_eq!(ascii85decode(b"z~>").unwrap(), vec![0, 0, 0, 0]);
    }

    #[test]
    fn ascii85_partial_group() {
        // "Man" encodes to a 4-digit partial group
        assert_eq!(ascii85decode(b"9jqo~>").unwrap(), b"Man");
    }

    #[test]
    fn ascii85_terminator_and_prefix_variants() {
        // Real streams show up with any combination of the <~ prefix, a
        // full ~> terminator, a bare ~, or nothing at all.
        let encodings: [&[u8]; 5] = [
            b"E,9)oF*2M7/c~>",
            b"E,9)oF*2M7/c~",
            b"E,9)oF*2M7/c",
            b"<~E,9)oF*2M7/c~",
            b"<~E,9)oF*2M7/c~\n>",
        ];
        for enc in encodings {
            assert_eq!(ascii85decode(enc).unwrap(), b"pleasure.");
        }
        assert_eq!(
            ascii85decode(b"zE,9)oF*2M7/c~>").unwrap(),
            b"\0\0\0\0pleasure."
        );
    }

    #[test]
    fn asciihex_odd_length_and_missing_eod() {
        assert_eq!(asciihexdecode(b"48 65 6C 6C 6F>").unwrap(), b"Hello");
        assert_eq!(asciihexdecode(b"414").unwrap(), vec![0x41, 0x40]);
    }

    #[test]
    fn asciihex_interior_whitespace() {
        assert_eq!(asciihexdecode(b"61 62 2e6364   65").unwrap(), b"ab.cde");
        assert_eq!(asciihexdecode(b"61 62 2e6364   657>").unwrap(), b"ab.cdep");
        assert_eq!(asciihexdecode(b"7>").unwrap(), b"p");
    }
}
