//! MPPE key derivation (RFC 3079) and salted attribute encryption (RFC 2548)
//!
//! After a successful MS-CHAPv2 exchange the server derives per-direction
//! session keys and returns them in MS-MPPE-Send-Key / MS-MPPE-Recv-Key,
//! each encrypted with the shared secret and the request authenticator.

use crate::attributes::{Attribute, microsoft};
use crate::crypto::CryptoError;
use crate::mschap::{hash_nt_password_hash, nt_password_hash};
use rand::Rng;
use sha1::{Digest, Sha1};
use std::sync::atomic::{AtomicU8, Ordering};

const MASTER_MAGIC: &[u8; 27] = b"This is the MPPE Master Key";
const CLIENT_SEND_MAGIC: &[u8; 84] =
    b"On the client side, this is the send key; on the server side, it is the receive key.";
const SERVER_SEND_MAGIC: &[u8; 84] =
    b"On the client side, this is the receive key; on the server side, it is the send key.";
const SHS_PAD1: [u8; 40] = [0x00; 40];
const SHS_PAD2: [u8; 40] = [0xF2; 40];

/// First 16 bytes of SHA1(password hash hash + NT response + magic)
pub fn master_key(password_hash_hash: &[u8; 16], nt_response: &[u8; 24]) -> [u8; 16] {
    let mut hasher = Sha1::new();
    hasher.update(password_hash_hash);
    hasher.update(nt_response);
    hasher.update(MASTER_MAGIC);
    let digest = hasher.finalize();

    let mut key = [0u8; 16];
    key.copy_from_slice(&digest[..16]);
    key
}

/// Session start key for one direction, seen from the client or the server
pub fn asymmetric_start_key(
    master_key: &[u8; 16],
    key_length: usize,
    is_send: bool,
    is_server: bool,
) -> Result<Vec<u8>, CryptoError> {
    if !(1..=20).contains(&key_length) {
        return Err(CryptoError::InvalidKeyLength(key_length));
    }

    // The server's send key is the client's receive key and vice versa.
    let magic = if is_send == is_server {
        SERVER_SEND_MAGIC
    } else {
        CLIENT_SEND_MAGIC
    };

    let mut hasher = Sha1::new();
    hasher.update(master_key);
    hasher.update(SHS_PAD1);
    hasher.update(magic);
    hasher.update(SHS_PAD2);
    Ok(hasher.finalize()[..key_length].to_vec())
}

/// Server-side MPPE session keys
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MppeKeys {
    pub send_key: Vec<u8>,
    pub recv_key: Vec<u8>,
}

impl MppeKeys {
    /// Derive the server's keys from the password and the peer's NT response
    pub fn derive(password: &str, nt_response: &[u8; 24], key_length: usize) -> Result<Self, CryptoError> {
        let password_hash_hash = hash_nt_password_hash(&nt_password_hash(password));
        let master = master_key(&password_hash_hash, nt_response);
        Ok(MppeKeys {
            send_key: asymmetric_start_key(&master, key_length, true, true)?,
            recv_key: asymmetric_start_key(&master, key_length, false, true)?,
        })
    }
}

fn keystream_block(secret: &[u8], first: &[u8], second: &[u8]) -> [u8; 16] {
    let mut context = md5::Context::new();
    context.consume(secret);
    context.consume(first);
    context.consume(second);
    context.compute().0
}

/// Salt-encrypt an attribute value: `[salt 2][ciphertext]`
///
/// The plaintext is prefixed with its length and zero-padded to a multiple
/// of 16. The first block is keyed by MD5(secret + authenticator + salt),
/// each later block by MD5(secret + previous ciphertext block).
pub fn encrypt_salted(
    plaintext: &[u8],
    secret: &[u8],
    request_authenticator: &[u8; 16],
    salt: [u8; 2],
) -> Result<Vec<u8>, CryptoError> {
    if salt[0] & 0x80 == 0 {
        return Err(CryptoError::InvalidInput("salt high bit must be set".to_string()));
    }
    if plaintext.len() > 239 {
        return Err(CryptoError::InvalidInput(format!(
            "salted plaintext too long: {} bytes",
            plaintext.len()
        )));
    }

    let mut padded = Vec::with_capacity(plaintext.len() + 16);
    padded.push(plaintext.len() as u8);
    padded.extend_from_slice(plaintext);
    padded.resize(padded.len().div_ceil(16) * 16, 0);

    let mut output = salt.to_vec();
    let mut key = keystream_block(secret, request_authenticator, &salt);
    for chunk in padded.chunks(16) {
        let mut block = [0u8; 16];
        for (i, byte) in block.iter_mut().enumerate() {
            *byte = chunk[i] ^ key[i];
        }
        output.extend_from_slice(&block);
        key = keystream_block(secret, &block, &[]);
    }
    Ok(output)
}

pub fn decrypt_salted(
    data: &[u8],
    secret: &[u8],
    request_authenticator: &[u8; 16],
) -> Result<Vec<u8>, CryptoError> {
    if data.len() < 18 || (data.len() - 2) % 16 != 0 {
        return Err(CryptoError::InvalidInput(format!(
            "salted value has invalid length {}",
            data.len()
        )));
    }

    let (salt, ciphertext) = data.split_at(2);
    let mut plain = Vec::with_capacity(ciphertext.len());
    let mut key = keystream_block(secret, request_authenticator, salt);
    for chunk in ciphertext.chunks(16) {
        for (i, byte) in chunk.iter().enumerate() {
            plain.push(byte ^ key[i]);
        }
        key = keystream_block(secret, chunk, &[]);
    }

    let length = plain[0] as usize;
    if length > plain.len() - 1 {
        return Err(CryptoError::InvalidInput(format!(
            "salted length byte {} exceeds payload",
            length
        )));
    }
    Ok(plain[1..=length].to_vec())
}

/// Unique salts for one sender: a counter plus a random byte, high bit set
#[derive(Debug)]
pub struct SaltGenerator {
    counter: AtomicU8,
}

impl SaltGenerator {
    pub fn new() -> Self {
        SaltGenerator {
            counter: AtomicU8::new(rand::rng().random()),
        }
    }

    pub fn next_salt(&self) -> [u8; 2] {
        let count = self.counter.fetch_add(1, Ordering::Relaxed);
        [0x80 | (count & 0x7F), rand::rng().random()]
    }
}

impl Default for SaltGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// MS-MPPE-Send-Key and MS-MPPE-Recv-Key vendor attributes
pub fn mppe_key_attributes(
    keys: &MppeKeys,
    secret: &[u8],
    request_authenticator: &[u8; 16],
    salts: &SaltGenerator,
) -> Result<Vec<Attribute>, CryptoError> {
    let mut attributes = Vec::with_capacity(2);
    for (code, key) in [
        (microsoft::MS_MPPE_SEND_KEY, &keys.send_key),
        (microsoft::MS_MPPE_RECV_KEY, &keys.recv_key),
    ] {
        let value = encrypt_salted(key, secret, request_authenticator, salts.next_salt())?;
        let attribute = Attribute::vendor(microsoft::VENDOR_ID, code, value)
            .map_err(|e| CryptoError::InvalidInput(e.to_string()))?;
        attributes.push(attribute);
    }
    Ok(attributes)
}
