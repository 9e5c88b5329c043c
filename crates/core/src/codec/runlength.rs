//! RunLength stream decoder.

use crate::error::Result;

/// Decode RunLength-encoded data.
///
/// Format:
/// - Length byte 0-127: copy next (length + 1) bytes literally
/// - Length byte 128: end of data (EOD marker)
/// - Length byte 129-255: repeat next byte (257 - length) times
///
/// Truncated input is tolerated: if the stream ends mid-run, whatever
/// decoded so far is returned.
pub fn rldecode(data: &[u8]) -> Result<Vec<u8>> {
    let mut result = Vec::new();
    let mut i = 0;

    while i < data.len() {
        let length = data[i];
        i += 1;

        match length {
            128 => break, // EOD
            0..=127 => {
                let count = length as usize + 1;
                let end = (i + count).min(data.len());
                result.extend_from_slice(&data[i..end]);
                if end < i + count {
                    log::warn!("RunLength literal run truncated");
                    break;
                }
                i = end;
            }
            129..=255 => {
                let Some(&byte) = data.get(i) else {
                    log::warn!("RunLength repeat run missing byte");
                    break;
                };
                i += 1;
                result.extend(std::iter::repeat_n(byte, 257 - length as usize));
            }
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_and_repeat_runs() {
        // 2 -> copy 3 literal bytes; 254 -> repeat next byte 3 times; EOD
        let data = [2, b'a', b'b', b'c', 254, b'z', 128, b'X'];
        assert_eq!(rldecode(&data).unwrap(), b"abczzz");
    }

    #[test]
    fn truncated_literal_is_tolerated() {
        let data = [5, b'a', b'b'];
        assert_eq!(rldecode(&data).unwrap(), b"ab");
    }
}
