//! RC4 stream cipher ("Arcfour").
//!
//! Carries the object payloads for standard-security-handler revisions 2
//! and 3, and for the `/V2` crypt filter of revision 4. Key lengths from
//! 1 to 256 bytes are accepted.

/// RC4 cipher state. Construct per message; the keystream position is not
/// resettable.
pub struct Arcfour {
    s: [u8; 256],
    i: u8,
    j: u8,
}

impl Arcfour {
    /// Run the key schedule.
    ///
    /// # Panics
    /// Panics if `key` is empty or longer than 256 bytes.
    pub fn new(key: &[u8]) -> Self {
        assert!(
            !key.is_empty() && key.len() <= 256,
            "RC4 key must be 1-256 bytes"
        );

        let mut s: [u8; 256] = std::array::from_fn(|n| n as u8);
        let mut j = 0u8;
        for (n, &k) in key.iter().cycle().take(256).enumerate() {
            j = j.wrapping_add(s[n]).wrapping_add(k);
            s.swap(n, usize::from(j));
        }

        Self { s, i: 0, j: 0 }
    }

    /// XOR `data` against the keystream. Encryption and decryption are the
    /// same operation.
    pub fn process(&mut self, data: &[u8]) -> Vec<u8> {
        data.iter().map(|&b| b ^ self.next_key_byte()).collect()
    }

    fn next_key_byte(&mut self) -> u8 {
        self.i = self.i.wrapping_add(1);
        self.j = self.j.wrapping_add(self.s[usize::from(self.i)]);
        self.s.swap(usize::from(self.i), usize::from(self.j));

        let t = self.s[usize::from(self.i)].wrapping_add(self.s[usize::from(self.j)]);
        self.s[usize::from(t)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_answer_vectors() {
        let cases: [(&[u8], &[u8], &str); 3] = [
            (b"Key", b"Plaintext", "bbf316e8d940af0ad3"),
            (b"Wiki", b"pedia", "1021bf0420"),
            (b"Secret", b"Attack at dawn", "45a01f645fc35b383552544b9bf5"),
        ];
        for (key, plain, want) in cases {
            let out = Arcfour::new(key).process(plain);
            assert_eq!(hex::encode(&out), want, "key {:?}", key);
        }
    }

    #[test]
    fn keystream_xor_is_symmetric() {
        let data = b"some data to scramble";
        let enc = Arcfour::new(b"secret").process(data);
        assert_eq!(Arcfour::new(b"secret").process(&enc), data);
    }
}
