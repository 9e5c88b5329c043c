//! AES primitives for PDF encryption.
//!
//! CBC mode carries the per-object payloads (AESV2/AESV3 crypt filters and
//! the V5 key blobs); single-block ECB is only used for the `/Perms`
//! permission cross-check.

use aes::Aes256;
use aes::cipher::block_padding::NoPadding;
use aes::cipher::{BlockDecrypt, BlockDecryptMut, BlockEncrypt, BlockEncryptMut, KeyInit, KeyIvInit};
use cbc::{Decryptor, Encryptor};

type Aes128CbcDec = Decryptor<aes::Aes128>;
type Aes256CbcDec = Decryptor<aes::Aes256>;
type Aes128CbcEnc = Encryptor<aes::Aes128>;
type Aes256CbcEnc = Encryptor<aes::Aes256>;

/// Decrypt data using AES-CBC with a 128 or 256 bit key.
///
/// The IV must be exactly 16 bytes and the data a multiple of 16 bytes.
///
/// # Panics
/// Panics if key length is not 16 or 32 bytes, or if IV is not 16 bytes.
pub fn aes_cbc_decrypt(key: &[u8], iv: &[u8], data: &[u8]) -> Vec<u8> {
    assert!(iv.len() == 16, "AES IV must be 16 bytes");
    let mut buf = data.to_vec();
    match key.len() {
        16 => {
            let cipher = Aes128CbcDec::new(key.into(), iv.into());
            cipher.decrypt_padded_mut::<NoPadding>(&mut buf).unwrap();
        }
        32 => {
            let cipher = Aes256CbcDec::new(key.into(), iv.into());
            cipher.decrypt_padded_mut::<NoPadding>(&mut buf).unwrap();
        }
        _ => panic!("AES key must be 16 or 32 bytes"),
    }
    buf
}

/// Encrypt data using AES-CBC with a 128 or 256 bit key.
///
/// No padding is applied; the data length must already be a multiple of 16.
///
/// # Panics
/// Panics if key length is not 16 or 32 bytes, or if IV is not 16 bytes.
pub fn aes_cbc_encrypt(key: &[u8], iv: &[u8], data: &[u8]) -> Vec<u8> {
    assert!(iv.len() == 16, "AES IV must be 16 bytes");
    let mut buf = data.to_vec();
    match key.len() {
        16 => {
            let cipher = Aes128CbcEnc::new(key.into(), iv.into());
            cipher
                .encrypt_padded_mut::<NoPadding>(&mut buf, data.len())
                .unwrap();
        }
        32 => {
            let cipher = Aes256CbcEnc::new(key.into(), iv.into());
            cipher
                .encrypt_padded_mut::<NoPadding>(&mut buf, data.len())
                .unwrap();
        }
        _ => panic!("AES key must be 16 or 32 bytes"),
    }
    buf
}

/// Decrypt AES-256-ECB data (block-at-a-time, no padding).
///
/// # Panics
/// Panics if the key is not 32 bytes or the data is not a multiple of 16.
pub fn aes256_ecb_decrypt(key: &[u8], data: &[u8]) -> Vec<u8> {
    assert!(key.len() == 32, "AES-256 key must be 32 bytes");
    assert!(data.len() % 16 == 0, "AES data must be block aligned");
    let cipher = Aes256::new(key.into());
    let mut buf = data.to_vec();
    for block in buf.chunks_exact_mut(16) {
        cipher.decrypt_block(block.into());
    }
    buf
}

/// Encrypt AES-256-ECB data (block-at-a-time, no padding).
///
/// # Panics
/// Panics if the key is not 32 bytes or the data is not a multiple of 16.
pub fn aes256_ecb_encrypt(key: &[u8], data: &[u8]) -> Vec<u8> {
    assert!(key.len() == 32, "AES-256 key must be 32 bytes");
    assert!(data.len() % 16 == 0, "AES data must be block aligned");
    let cipher = Aes256::new(key.into());
    let mut buf = data.to_vec();
    for block in buf.chunks_exact_mut(16) {
        cipher.encrypt_block(block.into());
    }
    buf
}

/// Remove PKCS#7 padding from AES-decrypted data.
///
/// Returns data unchanged if padding is invalid:
/// - Padding byte value is 0 or > 16
/// - Not enough bytes for claimed padding
/// - Padding bytes are not all equal to the padding length
pub fn unpad_aes(data: &[u8]) -> &[u8] {
    if data.is_empty() {
        return data;
    }

    let pad_len = data[data.len() - 1] as usize;

    if pad_len == 0 || pad_len > 16 || pad_len > data.len() {
        return data;
    }

    let start = data.len() - pad_len;
    for &byte in &data[start..] {
        if byte as usize != pad_len {
            return data;
        }
    }

    &data[..start]
}

/// Apply PKCS#7 padding, always adding at least one byte.
pub fn pad_aes(data: &[u8]) -> Vec<u8> {
    let pad_len = 16 - data.len() % 16;
    let mut out = data.to_vec();
    out.extend(std::iter::repeat_n(pad_len as u8, pad_len));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cbc_round_trip_128_and_256() {
        let iv = [7u8; 16];
        let data = b"exactly sixteen.";
        for key in [vec![1u8; 16], vec![2u8; 32]] {
            let enc = aes_cbc_encrypt(&key, &iv, data);
            let dec = aes_cbc_decrypt(&key, &iv, &enc);
            assert_eq!(dec, data);
        }
    }

    #[test]
    fn ecb_round_trip() {
        let key = [9u8; 32];
        let data = [0x42u8; 32];
        let enc = aes256_ecb_encrypt(&key, &data);
        assert_ne!(enc, data);
        assert_eq!(aes256_ecb_decrypt(&key, &enc), data);
    }

    #[test]
    fn pad_unpad_round_trip() {
        for len in [0usize, 1, 15, 16, 17] {
            let data = vec![0xAAu8; len];
            let padded = pad_aes(&data);
            assert_eq!(padded.len() % 16, 0);
            assert_eq!(unpad_aes(&padded), data.as_slice());
        }
    }
}
