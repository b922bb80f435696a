//! RADIUS Protocol Implementation
//!
//! Wire-level support for RFC 2865 (authentication), RFC 2866 (accounting),
//! RFC 2869 (Message-Authenticator), RFC 5176 codes and RFC 5997
//! Status-Server, plus the legacy password schemes carried over RADIUS:
//! PAP, CHAP, MS-CHAPv1/v2 (RFC 2433, RFC 2759) and MPPE keys (RFC 3079,
//! RFC 2548).
//!
//! # Features
//!
//! - Line-oriented attribute dictionary with vendor attributes and `$INCLUDE`
//! - Typed attribute codec (octets, string, integer, IPv4, IPv6, IPv6 prefix, VSA)
//! - Packet framing with request/response authenticators and PAP hiding
//! - MS-CHAP responses, mutual authentication and MPPE key derivation
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use radius_proto::{Code, Dictionary, Packet};
//!
//! let dictionary = Arc::new(Dictionary::standard().unwrap());
//! let secret = b"testing123";
//!
//! let mut request = Packet::new(&dictionary, Code::AccessRequest, 1);
//! request.add_text("User-Name", "alice").unwrap();
//! request.user_password = Some("password".to_string());
//! let bytes = request.encode_request(secret).unwrap();
//!
//! let received = Packet::decode_request(&bytes, secret, &dictionary).unwrap();
//! assert_eq!(received.user_password.as_deref(), Some("password"));
//! ```

pub mod accounting;
pub mod attributes;
pub mod auth;
pub mod chap;
pub mod crypto;
pub mod dictionary;
pub mod message_auth;
pub mod mppe;
pub mod mschap;
pub mod packet;

pub use accounting::{AccountingError, AcctAuthentic, AcctStatusType, AcctTerminateCause};
pub use attributes::{Attribute, AttributeCode, AttributeError, AttributeKind, AttributeValue, VendorSpecific};
pub use auth::{
    PasswordError, calculate_accounting_request_authenticator, calculate_response_authenticator,
    decrypt_user_password, encrypt_user_password, generate_request_authenticator,
    verify_response_authenticator, verify_user_password,
};
pub use chap::{ChapError, ChapResponse, compute_chap_response, verify_chap_response};
pub use crypto::CryptoError;
pub use dictionary::{AttributeType, Dictionary, DictionaryError, Enumeration};
pub use message_auth::{calculate_message_authenticator, verify_message_authenticator};
pub use mppe::{MppeKeys, SaltGenerator};
pub use mschap::{MsChapV1Response, MsChapV2Response};
pub use packet::{Code, Packet, PacketError};
