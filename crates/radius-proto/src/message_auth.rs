//! Message-Authenticator Support (RFC 2869 Section 5.14, RFC 3579 Section 3.2)
//!
//! HMAC-MD5 keyed with the shared secret over the whole packet, computed
//! with the Message-Authenticator value set to sixteen zero bytes. The
//! authenticator field holds the Request Authenticator for Access-Request and
//! for responses, and zeros for Accounting-Request.

use crate::attributes::AttributeCode;
use crate::crypto::{CryptoError, constant_time_eq};
use hmac::{Hmac, Mac};
use md5_digest::Md5;

type HmacMd5 = Hmac<Md5>;

pub fn calculate_message_authenticator(packet_bytes: &[u8], secret: &[u8]) -> Result<[u8; 16], CryptoError> {
    let mut mac =
        HmacMd5::new_from_slice(secret).map_err(|_| CryptoError::InvalidKeyLength(secret.len()))?;
    mac.update(packet_bytes);
    let bytes = mac.finalize().into_bytes();

    let mut output = [0u8; 16];
    output.copy_from_slice(&bytes);
    Ok(output)
}

/// Offset of the Message-Authenticator value (after type and length) in an
/// encoded packet, if the packet carries one
pub fn find_message_authenticator(packet_bytes: &[u8]) -> Option<usize> {
    if packet_bytes.len() < 20 {
        return None;
    }
    let declared = u16::from_be_bytes([packet_bytes[2], packet_bytes[3]]) as usize;
    let end = declared.min(packet_bytes.len());

    let mut offset = 20;
    while offset + 2 <= end {
        let attr_type = packet_bytes[offset];
        let length = packet_bytes[offset + 1] as usize;
        if length < 2 || offset + length > end {
            return None;
        }
        if attr_type == AttributeCode::MessageAuthenticator.as_u8() && length == 18 {
            return Some(offset + 2);
        }
        offset += length;
    }
    None
}

/// Verify the Message-Authenticator at `message_auth_offset`
///
/// `authenticator` replaces the packet's authenticator field for the
/// computation when given (a response is signed over the request's).
pub fn verify_message_authenticator(
    packet_bytes: &[u8],
    secret: &[u8],
    message_auth_offset: usize,
    authenticator: Option<&[u8; 16]>,
) -> Result<bool, CryptoError> {
    if packet_bytes.len() < 20 || message_auth_offset + 16 > packet_bytes.len() {
        return Ok(false);
    }

    let received = &packet_bytes[message_auth_offset..message_auth_offset + 16];

    let mut packet_copy = packet_bytes.to_vec();
    packet_copy[message_auth_offset..message_auth_offset + 16].fill(0);
    if let Some(authenticator) = authenticator {
        packet_copy[4..20].copy_from_slice(authenticator);
    }

    let expected = calculate_message_authenticator(&packet_copy, secret)?;
    Ok(constant_time_eq(received, &expected))
}
