//! CHAP (RFC 2865 Section 5.3 and 5.40)
//!
//! CHAP-Password carries `[ident][MD5(ident + password + challenge)]`. The
//! challenge is the CHAP-Challenge attribute when present, otherwise the
//! request authenticator.

use crate::attributes::AttributeCode;
use crate::crypto::constant_time_eq;
use crate::packet::Packet;
use rand::Rng;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapResponse {
    pub ident: u8,
    pub response: [u8; 16],
}

impl ChapResponse {
    /// Parse a CHAP-Password value (exactly 17 bytes)
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ChapError> {
        let [ident, rest @ ..] = bytes else {
            return Err(ChapError::InvalidLength(bytes.len()));
        };
        let response: [u8; 16] = rest
            .try_into()
            .map_err(|_| ChapError::InvalidLength(bytes.len()))?;
        Ok(ChapResponse {
            ident: *ident,
            response,
        })
    }

    /// Client side: answer `challenge` with `password`
    pub fn generate(ident: u8, password: &str, challenge: &[u8]) -> Self {
        ChapResponse {
            ident,
            response: compute_chap_response(ident, password, challenge),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(17);
        bytes.push(self.ident);
        bytes.extend_from_slice(&self.response);
        bytes
    }
}

/// Random 16-byte challenge for a CHAP-Challenge attribute
pub fn generate_chap_challenge() -> Vec<u8> {
    let mut challenge = vec![0u8; 16];
    rand::rng().fill(challenge.as_mut_slice());
    challenge
}

/// The challenge a CHAP-Password in `packet` answers
pub fn chap_challenge(packet: &Packet) -> Vec<u8> {
    match packet.find_attribute(AttributeCode::ChapChallenge.as_u8()) {
        Some(attr) => attr.value.clone(),
        None => packet.authenticator.to_vec(),
    }
}

/// MD5(CHAP_Identifier + Password + Challenge)
pub fn compute_chap_response(ident: u8, password: &str, challenge: &[u8]) -> [u8; 16] {
    let mut context = md5::Context::new();
    context.consume([ident]);
    context.consume(password.as_bytes());
    context.consume(challenge);
    context.compute().0
}

pub fn verify_chap_response(chap_response: &ChapResponse, password: &str, challenge: &[u8]) -> bool {
    let expected = compute_chap_response(chap_response.ident, password, challenge);
    constant_time_eq(&chap_response.response, &expected)
}

/// Verify the CHAP-Password of an Access-Request against a known password
pub fn verify_chap_packet(packet: &Packet, password: &str) -> Result<bool, ChapError> {
    let attr = packet
        .find_attribute(AttributeCode::ChapPassword.as_u8())
        .ok_or(ChapError::PasswordNotFound)?;
    let response = ChapResponse::from_bytes(&attr.value)?;
    Ok(verify_chap_response(&response, password, &chap_challenge(packet)))
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChapError {
    #[error("Invalid CHAP-Password length: expected 17 bytes, got {0}")]
    InvalidLength(usize),
    #[error("CHAP-Password not found")]
    PasswordNotFound,
}
