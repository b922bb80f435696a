//! MS-CHAP version 1 (RFC 2433) and version 2 (RFC 2759)
//!
//! Responses travel in the Microsoft vendor attributes of RFC 2548:
//! MS-CHAP-Challenge, MS-CHAP-Response, MS-CHAP2-Response and
//! MS-CHAP2-Success.
//!
//! # Example
//!
//! ```rust
//! use radius_proto::mschap::{MsChapV2Response, verify_mschap_v2};
//!
//! let auth_challenge = [0x11u8; 16];
//! let response = MsChapV2Response::generate(1, "alice", "wonderland", &auth_challenge).unwrap();
//! let success = verify_mschap_v2(&response, "alice", "wonderland", &auth_challenge).unwrap();
//! assert!(success.unwrap().starts_with("S="));
//! ```

use crate::crypto::{CryptoError, constant_time_eq, des_encrypt};
use md4::Md4;
use rand::Rng;
use sha1::{Digest, Sha1};

const LM_MAGIC: &[u8; 8] = b"KGS!@#$%";
const MAGIC1: &[u8; 39] = b"Magic server to client signing constant";
const MAGIC2: &[u8; 41] = b"Pad to make it do more than one iteration";

/// MS-CHAPv1 response flag selecting the NT response
pub const FLAG_USE_NT: u8 = 0x01;

fn copy16(digest: &[u8]) -> [u8; 16] {
    let mut out = [0u8; 16];
    out.copy_from_slice(&digest[..16]);
    out
}

/// LAN Manager password hash
///
/// The password is uppercased and cut or zero-padded to 14 bytes; each
/// 7-byte half encrypts `KGS!@#$%`.
pub fn lm_password_hash(password: &str) -> Result<[u8; 16], CryptoError> {
    let upper = password.to_uppercase();
    let mut key = [0u8; 14];
    let bytes = upper.as_bytes();
    let len = bytes.len().min(14);
    key[..len].copy_from_slice(&bytes[..len]);

    let mut first = [0u8; 7];
    let mut second = [0u8; 7];
    first.copy_from_slice(&key[..7]);
    second.copy_from_slice(&key[7..]);

    let mut hash = [0u8; 16];
    hash[..8].copy_from_slice(&des_encrypt(&first, LM_MAGIC)?);
    hash[8..].copy_from_slice(&des_encrypt(&second, LM_MAGIC)?);
    Ok(hash)
}

/// MD4 of the UTF-16LE password
pub fn nt_password_hash(password: &str) -> [u8; 16] {
    let unicode: Vec<u8> = password.encode_utf16().flat_map(u16::to_le_bytes).collect();
    copy16(&Md4::digest(&unicode))
}

pub fn hash_nt_password_hash(password_hash: &[u8; 16]) -> [u8; 16] {
    copy16(&Md4::digest(password_hash))
}

/// 24-byte DES response: the hash is zero-padded to 21 bytes and split into
/// three 7-byte keys, each encrypting the 8-byte challenge
pub fn challenge_response(challenge: &[u8; 8], password_hash: &[u8; 16]) -> Result<[u8; 24], CryptoError> {
    let mut padded = [0u8; 21];
    padded[..16].copy_from_slice(password_hash);

    let mut response = [0u8; 24];
    for (i, chunk) in padded.chunks_exact(7).enumerate() {
        let mut key = [0u8; 7];
        key.copy_from_slice(chunk);
        response[i * 8..(i + 1) * 8].copy_from_slice(&des_encrypt(&key, challenge)?);
    }
    Ok(response)
}

/// First 8 bytes of SHA1(peer challenge + authenticator challenge + user name)
///
/// A `DOMAIN\user` name contributes only the part after the last backslash.
pub fn challenge_hash(peer_challenge: &[u8; 16], authenticator_challenge: &[u8; 16], username: &str) -> [u8; 8] {
    let username = username.rsplit('\\').next().unwrap_or(username);

    let mut hasher = Sha1::new();
    hasher.update(peer_challenge);
    hasher.update(authenticator_challenge);
    hasher.update(username.as_bytes());
    let digest = hasher.finalize();

    let mut out = [0u8; 8];
    out.copy_from_slice(&digest[..8]);
    out
}

pub fn generate_nt_response(
    authenticator_challenge: &[u8; 16],
    peer_challenge: &[u8; 16],
    username: &str,
    password: &str,
) -> Result<[u8; 24], CryptoError> {
    let challenge = challenge_hash(peer_challenge, authenticator_challenge, username);
    challenge_response(&challenge, &nt_password_hash(password))
}

/// Authenticator response from the password hash hash
///
/// Lets a server that stores only NT hashes prove knowledge of the password.
pub fn authenticator_response_from_hash(
    password_hash_hash: &[u8; 16],
    nt_response: &[u8; 24],
    peer_challenge: &[u8; 16],
    authenticator_challenge: &[u8; 16],
    username: &str,
) -> String {
    let mut hasher = Sha1::new();
    hasher.update(password_hash_hash);
    hasher.update(nt_response);
    hasher.update(MAGIC1);
    let digest = hasher.finalize();

    let challenge = challenge_hash(peer_challenge, authenticator_challenge, username);
    let mut hasher = Sha1::new();
    hasher.update(digest);
    hasher.update(challenge);
    hasher.update(MAGIC2);
    let digest = hasher.finalize();

    format!("S={}", hex::encode_upper(digest))
}

/// `"S=" + 40 uppercase hex digits` (RFC 2759 Section 8.7)
pub fn generate_authenticator_response(
    password: &str,
    nt_response: &[u8; 24],
    peer_challenge: &[u8; 16],
    authenticator_challenge: &[u8; 16],
    username: &str,
) -> String {
    let password_hash_hash = hash_nt_password_hash(&nt_password_hash(password));
    authenticator_response_from_hash(
        &password_hash_hash,
        nt_response,
        peer_challenge,
        authenticator_challenge,
        username,
    )
}

/// MS-CHAP-Response value: `[ident][flags][lm 24][nt 24]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MsChapV1Response {
    pub ident: u8,
    pub flags: u8,
    pub lm_response: [u8; 24],
    pub nt_response: [u8; 24],
}

impl MsChapV1Response {
    pub const LENGTH: usize = 50;

    pub fn generate(ident: u8, password: &str, challenge: &[u8; 8]) -> Result<Self, CryptoError> {
        Ok(MsChapV1Response {
            ident,
            flags: FLAG_USE_NT,
            lm_response: challenge_response(challenge, &lm_password_hash(password)?)?,
            nt_response: challenge_response(challenge, &nt_password_hash(password))?,
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != Self::LENGTH {
            return Err(CryptoError::InvalidInput(format!(
                "MS-CHAP-Response must be {} bytes, got {}",
                Self::LENGTH,
                bytes.len()
            )));
        }
        let mut lm_response = [0u8; 24];
        let mut nt_response = [0u8; 24];
        lm_response.copy_from_slice(&bytes[2..26]);
        nt_response.copy_from_slice(&bytes[26..50]);
        Ok(MsChapV1Response {
            ident: bytes[0],
            flags: bytes[1],
            lm_response,
            nt_response,
        })
    }

    pub fn to_bytes(&self) -> [u8; 50] {
        let mut bytes = [0u8; 50];
        bytes[0] = self.ident;
        bytes[1] = self.flags;
        bytes[2..26].copy_from_slice(&self.lm_response);
        bytes[26..50].copy_from_slice(&self.nt_response);
        bytes
    }
}

/// MS-CHAP2-Response value: `[ident][flags][peer challenge 16][reserved 8][nt 24]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MsChapV2Response {
    pub ident: u8,
    pub flags: u8,
    pub peer_challenge: [u8; 16],
    pub nt_response: [u8; 24],
}

impl MsChapV2Response {
    pub const LENGTH: usize = 50;

    /// Client side, with a fresh random peer challenge
    pub fn generate(
        ident: u8,
        username: &str,
        password: &str,
        authenticator_challenge: &[u8; 16],
    ) -> Result<Self, CryptoError> {
        let mut peer_challenge = [0u8; 16];
        rand::rng().fill(&mut peer_challenge);
        Self::with_peer_challenge(ident, username, password, authenticator_challenge, peer_challenge)
    }

    pub fn with_peer_challenge(
        ident: u8,
        username: &str,
        password: &str,
        authenticator_challenge: &[u8; 16],
        peer_challenge: [u8; 16],
    ) -> Result<Self, CryptoError> {
        let nt_response = generate_nt_response(authenticator_challenge, &peer_challenge, username, password)?;
        Ok(MsChapV2Response {
            ident,
            flags: 0,
            peer_challenge,
            nt_response,
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != Self::LENGTH {
            return Err(CryptoError::InvalidInput(format!(
                "MS-CHAP2-Response must be {} bytes, got {}",
                Self::LENGTH,
                bytes.len()
            )));
        }
        let mut peer_challenge = [0u8; 16];
        let mut nt_response = [0u8; 24];
        peer_challenge.copy_from_slice(&bytes[2..18]);
        nt_response.copy_from_slice(&bytes[26..50]);
        Ok(MsChapV2Response {
            ident: bytes[0],
            flags: bytes[1],
            peer_challenge,
            nt_response,
        })
    }

    pub fn to_bytes(&self) -> [u8; 50] {
        let mut bytes = [0u8; 50];
        bytes[0] = self.ident;
        bytes[1] = self.flags;
        bytes[2..18].copy_from_slice(&self.peer_challenge);
        bytes[26..50].copy_from_slice(&self.nt_response);
        bytes
    }
}

/// Server-side MS-CHAPv1 check against a plaintext password
pub fn verify_mschap_v1(
    response: &MsChapV1Response,
    password: &str,
    challenge: &[u8; 8],
) -> Result<bool, CryptoError> {
    if response.flags & FLAG_USE_NT != 0 {
        let expected = challenge_response(challenge, &nt_password_hash(password))?;
        Ok(constant_time_eq(&response.nt_response, &expected))
    } else {
        let expected = challenge_response(challenge, &lm_password_hash(password)?)?;
        Ok(constant_time_eq(&response.lm_response, &expected))
    }
}

/// Server-side MS-CHAPv2 check
///
/// Returns the authenticator response (`S=...`) when the NT response
/// matches, `None` otherwise.
pub fn verify_mschap_v2(
    response: &MsChapV2Response,
    username: &str,
    password: &str,
    authenticator_challenge: &[u8; 16],
) -> Result<Option<String>, CryptoError> {
    let expected = generate_nt_response(authenticator_challenge, &response.peer_challenge, username, password)?;
    if !constant_time_eq(&response.nt_response, &expected) {
        return Ok(None);
    }
    Ok(Some(generate_authenticator_response(
        password,
        &response.nt_response,
        &response.peer_challenge,
        authenticator_challenge,
        username,
    )))
}

/// MS-CHAP2-Success value: `[ident]` followed by the authenticator response
pub fn mschap_v2_success(ident: u8, authenticator_response: &str) -> Vec<u8> {
    let mut value = Vec::with_capacity(1 + authenticator_response.len());
    value.push(ident);
    value.extend_from_slice(authenticator_response.as_bytes());
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 2759 Section 9.2
    const USERNAME: &str = "User";
    const PASSWORD: &str = "clientPass";

    fn bytes<const N: usize>(hex_str: &str) -> [u8; N] {
        hex::decode(hex_str).unwrap().try_into().unwrap()
    }

    fn auth_challenge() -> [u8; 16] {
        bytes("5B5D7C7D7B3F2F3E3C2C602132262628")
    }

    fn peer_challenge() -> [u8; 16] {
        bytes("21402324255E262A28295F2B3A337C7E")
    }

    #[test]
    fn test_rfc2759_challenge_hash() {
        let hash = challenge_hash(&peer_challenge(), &auth_challenge(), USERNAME);
        assert_eq!(hash, bytes::<8>("D02E4386BCE91226"));
    }

    #[test]
    fn test_rfc2759_password_hashes() {
        let hash = nt_password_hash(PASSWORD);
        assert_eq!(hash, bytes::<16>("44EBBA8D5312B8D611474411F56989AE"));
        assert_eq!(
            hash_nt_password_hash(&hash),
            bytes::<16>("41C00C584BD2D91C4017A2A12FA59F3F")
        );
    }

    #[test]
    fn test_rfc2759_nt_response() {
        let response = generate_nt_response(&auth_challenge(), &peer_challenge(), USERNAME, PASSWORD).unwrap();
        assert_eq!(
            response,
            bytes::<24>("82309ECD8D708B5EA08FAA3981CD83544233114A3D85D6DF")
        );
    }

    #[test]
    fn test_rfc2759_authenticator_response() {
        let nt_response = bytes::<24>("82309ECD8D708B5EA08FAA3981CD83544233114A3D85D6DF");
        let response =
            generate_authenticator_response(PASSWORD, &nt_response, &peer_challenge(), &auth_challenge(), USERNAME);
        assert_eq!(response, "S=407A5589115FD0D6209F510FE9C04566932CDA56");
    }

    #[test]
    fn test_empty_password_hashes() {
        assert_eq!(
            nt_password_hash(""),
            bytes::<16>("31d6cfe0d16ae931b73c59d7e0c089c0")
        );
        assert_eq!(
            lm_password_hash("").unwrap(),
            bytes::<16>("aad3b435b51404eeaad3b435b51404ee")
        );
    }

    #[test]
    fn test_lm_hash_is_case_insensitive() {
        assert_eq!(lm_password_hash("Secret").unwrap(), lm_password_hash("SECRET").unwrap());
        assert_eq!(
            lm_password_hash("abcdefghijklmnop").unwrap(),
            lm_password_hash("ABCDEFGHIJKLMN").unwrap()
        );
    }

    #[test]
    fn test_challenge_hash_strips_domain() {
        assert_eq!(
            challenge_hash(&peer_challenge(), &auth_challenge(), "CORP\\User"),
            challenge_hash(&peer_challenge(), &auth_challenge(), USERNAME)
        );
    }

    #[test]
    fn test_mschap_v1_round_trip() {
        let challenge = [0x10, 0x2D, 0xB5, 0xDF, 0x08, 0x5D, 0x30, 0x41];
        let response = MsChapV1Response::generate(7, "MyPw", &challenge).unwrap();
        assert_eq!(response.flags, FLAG_USE_NT);

        let wire = response.to_bytes();
        assert_eq!(wire[0], 7);
        let parsed = MsChapV1Response::from_bytes(&wire).unwrap();
        assert_eq!(parsed, response);

        assert!(verify_mschap_v1(&parsed, "MyPw", &challenge).unwrap());
        assert!(!verify_mschap_v1(&parsed, "NotMyPw", &challenge).unwrap());

        let lm_only = MsChapV1Response { flags: 0, ..parsed };
        assert!(verify_mschap_v1(&lm_only, "mypw", &challenge).unwrap());
    }

    #[test]
    fn test_mschap_v2_wire_layout() {
        let response =
            MsChapV2Response::with_peer_challenge(9, USERNAME, PASSWORD, &auth_challenge(), peer_challenge()).unwrap();
        let wire = response.to_bytes();
        assert_eq!(wire[0], 9);
        assert_eq!(&wire[2..18], &peer_challenge());
        assert_eq!(&wire[18..26], &[0u8; 8]);
        assert_eq!(MsChapV2Response::from_bytes(&wire).unwrap(), response);
        assert!(MsChapV2Response::from_bytes(&wire[..49]).is_err());
    }

    #[test]
    fn test_verify_mschap_v2() {
        let response = MsChapV2Response::generate(1, USERNAME, PASSWORD, &auth_challenge()).unwrap();
        let success = verify_mschap_v2(&response, USERNAME, PASSWORD, &auth_challenge()).unwrap();
        let expected = generate_authenticator_response(
            PASSWORD,
            &response.nt_response,
            &response.peer_challenge,
            &auth_challenge(),
            USERNAME,
        );
        assert_eq!(success, Some(expected));

        assert_eq!(
            verify_mschap_v2(&response, USERNAME, "wrong", &auth_challenge()).unwrap(),
            None
        );
    }

    #[test]
    fn test_mschap_v2_success_value() {
        let value = mschap_v2_success(3, "S=407A5589115FD0D6209F510FE9C04566932CDA56");
        assert_eq!(value.len(), 43);
        assert_eq!(value[0], 3);
        assert_eq!(&value[1..3], b"S=");
    }
}
