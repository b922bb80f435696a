//! Authenticators and PAP password hiding (RFC 2865 Section 3 and 5.2, RFC 2866 Section 3)
//!
//! The authenticator functions work on encoded packet bytes so the digest
//! always covers exactly what goes on the wire.

use crate::crypto::constant_time_eq;
use rand::Rng;
use thiserror::Error;

/// Longest PAP password the hiding algorithm accepts
pub const MAX_PASSWORD_LENGTH: usize = 128;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PasswordError {
    #[error("Invalid encrypted password length: {0}")]
    InvalidLength(usize),
    #[error("Invalid UTF-8 in password")]
    InvalidUtf8,
}

/// Generate a random Request Authenticator (16 bytes) per RFC 2865 Section 3
pub fn generate_request_authenticator() -> [u8; 16] {
    let mut rng = rand::rng();
    let mut authenticator = [0u8; 16];
    rng.fill(&mut authenticator);
    authenticator
}

fn header_digest(packet_bytes: &[u8], authenticator: &[u8; 16], secret: &[u8]) -> [u8; 16] {
    let mut context = md5::Context::new();
    context.consume(&packet_bytes[..4]);
    context.consume(authenticator);
    context.consume(&packet_bytes[20..]);
    context.consume(secret);
    context.compute().0
}

/// Response Authenticator = MD5(Code + ID + Length + Request Authenticator + Attributes + Secret)
///
/// `packet_bytes` is the encoded response; its authenticator field is ignored.
pub fn calculate_response_authenticator(
    packet_bytes: &[u8],
    request_authenticator: &[u8; 16],
    secret: &[u8],
) -> [u8; 16] {
    header_digest(packet_bytes, request_authenticator, secret)
}

/// Accounting-Request authenticator: the response formula over 16 zero bytes
///
/// Also used by Disconnect-Request and CoA-Request (RFC 5176).
pub fn calculate_accounting_request_authenticator(packet_bytes: &[u8], secret: &[u8]) -> [u8; 16] {
    header_digest(packet_bytes, &[0u8; 16], secret)
}

pub fn verify_response_authenticator(
    packet_bytes: &[u8],
    request_authenticator: &[u8; 16],
    secret: &[u8],
) -> bool {
    if packet_bytes.len() < 20 {
        return false;
    }
    let calculated = calculate_response_authenticator(packet_bytes, request_authenticator, secret);
    constant_time_eq(&packet_bytes[4..20], &calculated)
}

pub fn verify_accounting_request_authenticator(packet_bytes: &[u8], secret: &[u8]) -> bool {
    if packet_bytes.len() < 20 {
        return false;
    }
    let calculated = calculate_accounting_request_authenticator(packet_bytes, secret);
    constant_time_eq(&packet_bytes[4..20], &calculated)
}

fn xor_chain(
    input: &[u8],
    secret: &[u8],
    authenticator: &[u8; 16],
    encrypting: bool,
) -> Vec<u8> {
    let mut output = Vec::with_capacity(input.len());
    let mut previous: [u8; 16] = *authenticator;

    for chunk in input.chunks(16) {
        let mut context = md5::Context::new();
        context.consume(secret);
        context.consume(previous);
        let keystream = context.compute().0;

        let mut block = [0u8; 16];
        for (i, byte) in block.iter_mut().enumerate() {
            *byte = chunk[i] ^ keystream[i];
        }

        // The chain always feeds forward the ciphertext block.
        if encrypting {
            previous = block;
        } else {
            previous.copy_from_slice(chunk);
        }
        output.extend_from_slice(&block);
    }

    output
}

/// Hide a User-Password per RFC 2865 Section 5.2
///
/// The password is truncated to 128 bytes and zero-padded to a multiple of
/// 16 (at least 16), then XORed block by block with MD5(secret + previous),
/// where the first previous block is the request authenticator.
pub fn encrypt_user_password(password: &str, secret: &[u8], authenticator: &[u8; 16]) -> Vec<u8> {
    let bytes = password.as_bytes();
    let bytes = &bytes[..bytes.len().min(MAX_PASSWORD_LENGTH)];

    let padded_len = bytes.len().div_ceil(16).max(1) * 16;
    let mut padded = bytes.to_vec();
    padded.resize(padded_len, 0);

    xor_chain(&padded, secret, authenticator, true)
}

/// Reveal a hidden User-Password; trailing zero padding is removed
pub fn decrypt_user_password(
    encrypted: &[u8],
    secret: &[u8],
    authenticator: &[u8; 16],
) -> Result<String, PasswordError> {
    if encrypted.is_empty() || encrypted.len() % 16 != 0 || encrypted.len() > MAX_PASSWORD_LENGTH {
        return Err(PasswordError::InvalidLength(encrypted.len()));
    }

    let mut result = xor_chain(encrypted, secret, authenticator, false);
    while result.last() == Some(&0) {
        result.pop();
    }

    String::from_utf8(result).map_err(|_| PasswordError::InvalidUtf8)
}

/// Server-side PAP check: hide the candidate and compare in constant time
pub fn verify_user_password(
    encrypted: &[u8],
    candidate: &str,
    secret: &[u8],
    authenticator: &[u8; 16],
) -> bool {
    let expected = encrypt_user_password(candidate, secret, authenticator);
    constant_time_eq(encrypted, &expected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_authenticator() {
        let auth1 = generate_request_authenticator();
        let auth2 = generate_request_authenticator();
        assert_ne!(auth1, auth2);
    }

    #[test]
    fn test_password_encryption_decryption() {
        let secret = b"sharedsecret";
        let authenticator = [1u8; 16];

        for password in ["", "a", "mysecretpassword", "a longer password spanning two blocks"] {
            let encrypted = encrypt_user_password(password, secret, &authenticator);
            assert_eq!(encrypted.len() % 16, 0);
            let decrypted = decrypt_user_password(&encrypted, secret, &authenticator).unwrap();
            assert_eq!(decrypted, password);
        }
    }

    #[test]
    fn test_password_padding() {
        let authenticator = [1u8; 16];
        assert_eq!(encrypt_user_password("", b"s", &authenticator).len(), 16);
        assert_eq!(encrypt_user_password(&"x".repeat(16), b"s", &authenticator).len(), 16);
        assert_eq!(encrypt_user_password(&"x".repeat(17), b"s", &authenticator).len(), 32);
    }

    #[test]
    fn test_password_capped_at_128_bytes() {
        let secret = b"sharedsecret";
        let authenticator = [7u8; 16];
        let long = "p".repeat(200);

        let encrypted = encrypt_user_password(&long, secret, &authenticator);
        assert_eq!(encrypted.len(), 128);
        let decrypted = decrypt_user_password(&encrypted, secret, &authenticator).unwrap();
        assert_eq!(decrypted, "p".repeat(128));
    }

    #[test]
    fn test_first_block_matches_rfc_construction() {
        let secret = b"xyzzy5461";
        let authenticator = [0x0fu8; 16];
        let encrypted = encrypt_user_password("arctangent", secret, &authenticator);

        let mut keyed = secret.to_vec();
        keyed.extend_from_slice(&authenticator);
        let b1 = md5::compute(&keyed).0;
        let mut padded = *b"arctangent\0\0\0\0\0\0";
        for (p, k) in padded.iter_mut().zip(b1.iter()) {
            *p ^= k;
        }
        assert_eq!(encrypted, padded.to_vec());
    }

    #[test]
    fn test_decrypt_rejects_bad_length() {
        let authenticator = [0u8; 16];
        assert_eq!(
            decrypt_user_password(&[0u8; 15], b"s", &authenticator),
            Err(PasswordError::InvalidLength(15))
        );
        assert!(decrypt_user_password(&[], b"s", &authenticator).is_err());
        assert!(decrypt_user_password(&[0u8; 144], b"s", &authenticator).is_err());
    }

    #[test]
    fn test_verify_user_password() {
        let secret = b"sharedsecret";
        let authenticator = [3u8; 16];
        let encrypted = encrypt_user_password("hunter2", secret, &authenticator);
        assert!(verify_user_password(&encrypted, "hunter2", secret, &authenticator));
        assert!(!verify_user_password(&encrypted, "hunter3", secret, &authenticator));
        assert!(!verify_user_password(&encrypted, "hunter2", b"other", &authenticator));
    }

    #[test]
    fn test_response_authenticator_reference() {
        // Access-Accept, id 42, no attributes
        let mut packet = vec![2u8, 42, 0, 20];
        packet.extend_from_slice(&[0u8; 16]);
        let request_auth = [1u8; 16];
        let secret = b"sharedsecret";

        let mut reference = vec![2u8, 42, 0, 20];
        reference.extend_from_slice(&request_auth);
        reference.extend_from_slice(secret);
        let expected = md5::compute(&reference).0;

        let calculated = calculate_response_authenticator(&packet, &request_auth, secret);
        assert_eq!(calculated, expected);

        packet[4..20].copy_from_slice(&calculated);
        assert!(verify_response_authenticator(&packet, &request_auth, secret));
        assert!(!verify_response_authenticator(&packet, &[2u8; 16], secret));
        assert!(!verify_response_authenticator(&packet, &request_auth, b"wrong"));
    }

    #[test]
    fn test_accounting_request_authenticator() {
        let mut packet = vec![4u8, 7, 0, 26];
        packet.extend_from_slice(&[0u8; 16]);
        packet.extend_from_slice(&[40, 6, 0, 0, 0, 1]);
        let secret = b"acctsecret";

        let authenticator = calculate_accounting_request_authenticator(&packet, secret);
        packet[4..20].copy_from_slice(&authenticator);
        assert!(verify_accounting_request_authenticator(&packet, secret));

        packet[25] = 2;
        assert!(!verify_accounting_request_authenticator(&packet, secret));
    }
}
