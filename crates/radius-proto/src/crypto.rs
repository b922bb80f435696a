//! Shared cryptographic helpers
//!
//! DES is only used for the legacy MSCHAP and LAN Manager constructions.

use des::Des;
use des::cipher::generic_array::GenericArray;
use des::cipher::{BlockEncrypt, KeyInit};
use subtle::ConstantTimeEq;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Invalid key length: {0} bytes")]
    InvalidKeyLength(usize),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Spread 56 key bits over 8 bytes and set odd parity in each low bit
pub fn expand_des_key(key: &[u8; 7]) -> [u8; 8] {
    let expanded = [
        key[0] >> 1,
        ((key[0] & 0x01) << 6) | (key[1] >> 2),
        ((key[1] & 0x03) << 5) | (key[2] >> 3),
        ((key[2] & 0x07) << 4) | (key[3] >> 4),
        ((key[3] & 0x0F) << 3) | (key[4] >> 5),
        ((key[4] & 0x1F) << 2) | (key[5] >> 6),
        ((key[5] & 0x3F) << 1) | (key[6] >> 7),
        key[6] & 0x7F,
    ];

    expanded.map(|b| {
        let b = b << 1;
        if b.count_ones() % 2 == 0 { b | 0x01 } else { b }
    })
}

/// Encrypt one block under a full 8-byte DES key
pub fn des_encrypt_block(key: &[u8; 8], block: &[u8; 8]) -> Result<[u8; 8], CryptoError> {
    let cipher = Des::new_from_slice(key).map_err(|_| CryptoError::InvalidKeyLength(key.len()))?;
    let mut buffer = GenericArray::clone_from_slice(block);
    cipher.encrypt_block(&mut buffer);

    let mut output = [0u8; 8];
    output.copy_from_slice(&buffer);
    Ok(output)
}

/// Encrypt one block under a 7-byte key fragment
pub fn des_encrypt(key: &[u8; 7], block: &[u8; 8]) -> Result<[u8; 8], CryptoError> {
    des_encrypt_block(&expand_des_key(key), block)
}

pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_des_known_answer() {
        let key = [0x13, 0x34, 0x57, 0x79, 0x9B, 0xBC, 0xDF, 0xF1];
        let plaintext = [0x01, 0x23, 0x45, 0x67, 0x89, 0xAB, 0xCD, 0xEF];
        let ciphertext = des_encrypt_block(&key, &plaintext).unwrap();
        assert_eq!(ciphertext, [0x85, 0xE8, 0x13, 0x54, 0x0F, 0x0A, 0xB4, 0x05]);
    }

    #[test]
    fn test_expand_des_key_parity() {
        assert_eq!(expand_des_key(&[0xFF; 7]), [0xFE; 8]);
        assert_eq!(expand_des_key(&[0x00; 7]), [0x01; 8]);

        for byte in expand_des_key(&[0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC, 0xDE]) {
            assert_eq!(byte.count_ones() % 2, 1);
        }
    }

    #[test]
    fn test_des_encrypt_uses_expanded_key() {
        let fragment = [0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC, 0xDE];
        let block = *b"KGS!@#$%";
        assert_eq!(
            des_encrypt(&fragment, &block).unwrap(),
            des_encrypt_block(&expand_des_key(&fragment), &block).unwrap()
        );
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"ab"));
    }
}
