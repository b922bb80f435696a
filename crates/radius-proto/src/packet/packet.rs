use super::Code;
use crate::attributes::{Attribute, AttributeCode, AttributeError, AttributeValue, VendorSpecific};
use crate::auth::{
    PasswordError, calculate_accounting_request_authenticator, calculate_response_authenticator,
    decrypt_user_password, encrypt_user_password, generate_request_authenticator,
    verify_accounting_request_authenticator, verify_response_authenticator,
};
use crate::crypto::CryptoError;
use crate::dictionary::Dictionary;
use crate::message_auth::{
    calculate_message_authenticator, find_message_authenticator, verify_message_authenticator,
};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PacketError {
    #[error("Invalid packet length: {0}")]
    InvalidLength(usize),
    #[error("Invalid packet code: {0}")]
    InvalidCode(u8),
    #[error("{0} cannot be encoded as a request")]
    NotARequest(Code),
    #[error("Attribute error: {0}")]
    Attribute(#[from] AttributeError),
    #[error("Packet too large: {0} bytes")]
    PacketTooLarge(usize),
    #[error("Authenticator verification failed")]
    InvalidAuthenticator,
    #[error("Message-Authenticator verification failed")]
    InvalidMessageAuthenticator,
    #[error("User-Password error: {0}")]
    Password(#[from] PasswordError),
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

/// RADIUS Packet structure as defined in RFC 2865 Section 3
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |     Code      |  Identifier   |            Length             |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                                                               |
/// |                         Authenticator                         |
/// |                                                               |
/// |                                                               |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |  Attributes ...
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// `user_password` holds the plaintext PAP password between
/// [`Packet::decode_request`] and the next [`Packet::encode_request`], which
/// hides it again under whatever secret and authenticator apply then.
#[derive(Clone)]
pub struct Packet {
    pub code: Code,
    pub identifier: u8,
    pub authenticator: [u8; 16],
    pub attributes: Vec<Attribute>,
    pub user_password: Option<String>,
    dictionary: Arc<Dictionary>,
}

impl Packet {
    /// Minimum RADIUS packet size (20 bytes: 1 code + 1 id + 2 length + 16 authenticator)
    pub const MIN_PACKET_SIZE: usize = 20;
    /// Maximum RADIUS packet size (4096 bytes as per RFC 2865)
    pub const MAX_PACKET_SIZE: usize = 4096;

    pub fn new(dictionary: &Arc<Dictionary>, code: Code, identifier: u8) -> Self {
        Packet {
            code,
            identifier,
            authenticator: [0u8; 16],
            attributes: Vec::new(),
            user_password: None,
            dictionary: Arc::clone(dictionary),
        }
    }

    pub fn with_authenticator(mut self, authenticator: [u8; 16]) -> Self {
        self.authenticator = authenticator;
        self
    }

    /// Start a response to `request`: same identifier, Proxy-State copied in order
    pub fn response_to(request: &Packet, code: Code) -> Self {
        let mut response = Packet::new(&request.dictionary, code, request.identifier);
        response.attributes = request
            .find_all_attributes(AttributeCode::ProxyState.as_u8())
            .into_iter()
            .cloned()
            .collect();
        response
    }

    pub fn dictionary(&self) -> &Arc<Dictionary> {
        &self.dictionary
    }

    pub fn add_attribute(&mut self, attribute: Attribute) {
        self.attributes.push(attribute);
    }

    /// Add an attribute by dictionary name from its textual value
    pub fn add_text(&mut self, name: &str, text: &str) -> Result<(), PacketError> {
        let attribute_type = self
            .dictionary
            .attribute_type_by_name(name)
            .ok_or_else(|| AttributeError::UnknownAttribute(name.to_string()))?;
        let value = attribute_type
            .kind
            .parse_text(text, attribute_type.enumeration.as_ref())?;
        let attribute = Attribute::from_value(attribute_type.vendor_id, attribute_type.code, &value)?;
        self.attributes.push(attribute);
        Ok(())
    }

    /// Remove every base attribute of `attr_type`, returning how many were removed
    pub fn remove_attributes(&mut self, attr_type: u8) -> usize {
        let before = self.attributes.len();
        self.attributes
            .retain(|a| a.vendor_id.is_some() || a.attr_type != attr_type);
        before - self.attributes.len()
    }

    /// Encode packet to bytes with the current authenticator
    pub fn encode(&self) -> Result<Vec<u8>, PacketError> {
        let total_length = self.length();
        if total_length > Self::MAX_PACKET_SIZE {
            return Err(PacketError::PacketTooLarge(total_length));
        }

        let mut buffer = Vec::with_capacity(total_length);
        buffer.push(self.code.as_u8());
        buffer.push(self.identifier);
        buffer.extend_from_slice(&(total_length as u16).to_be_bytes());
        buffer.extend_from_slice(&self.authenticator);
        for attr in &self.attributes {
            buffer.extend_from_slice(&attr.encode()?);
        }

        Ok(buffer)
    }

    /// Decode packet from bytes without any secret-dependent checks
    ///
    /// Bytes past the declared length are ignored.
    pub fn decode(data: &[u8], dictionary: &Arc<Dictionary>) -> Result<Self, PacketError> {
        if data.len() < Self::MIN_PACKET_SIZE {
            return Err(PacketError::InvalidLength(data.len()));
        }

        let code = Code::from_u8(data[0]).ok_or(PacketError::InvalidCode(data[0]))?;
        let identifier = data[1];
        let length = declared_length(data)?;

        let mut authenticator = [0u8; 16];
        authenticator.copy_from_slice(&data[4..20]);

        let mut attributes = Vec::new();
        let mut attr_data = &data[Self::MIN_PACKET_SIZE..length];
        while !attr_data.is_empty() {
            let attr = Attribute::decode(attr_data)?;
            attr_data = &attr_data[attr.encoded_length()..];
            attributes.push(attr);
        }

        Ok(Packet {
            code,
            identifier,
            authenticator,
            attributes,
            user_password: None,
            dictionary: Arc::clone(dictionary),
        })
    }

    /// Sign and encode an outgoing request
    ///
    /// Access-Request and Status-Server get a fresh random authenticator and,
    /// when `user_password` is set, a User-Password hidden under it.
    /// Accounting, Disconnect and CoA requests get the MD5 request
    /// authenticator. A Message-Authenticator present in the packet is
    /// recomputed first.
    pub fn encode_request(&mut self, secret: &[u8]) -> Result<Vec<u8>, PacketError> {
        match self.code {
            Code::AccessRequest | Code::StatusServer => {
                self.authenticator = generate_request_authenticator();
                if let Some(password) = &self.user_password {
                    let hidden = encrypt_user_password(password, secret, &self.authenticator);
                    let code = AttributeCode::UserPassword.as_u8();
                    match self
                        .attributes
                        .iter_mut()
                        .find(|a| a.vendor_id.is_none() && a.attr_type == code)
                    {
                        Some(existing) => existing.value = hidden,
                        None => self.attributes.push(Attribute::new(code, hidden)?),
                    }
                }
                self.sign_message_authenticator(secret)?;
                self.encode()
            }
            code if code.has_digest_request_authenticator() => {
                self.authenticator = [0u8; 16];
                self.sign_message_authenticator(secret)?;
                let mut bytes = self.encode()?;
                let authenticator = calculate_accounting_request_authenticator(&bytes, secret);
                bytes[4..20].copy_from_slice(&authenticator);
                self.authenticator = authenticator;
                Ok(bytes)
            }
            code => Err(PacketError::NotARequest(code)),
        }
    }

    /// Sign and encode a response to a request carrying `request_authenticator`
    pub fn encode_response(
        &mut self,
        secret: &[u8],
        request_authenticator: &[u8; 16],
    ) -> Result<Vec<u8>, PacketError> {
        self.authenticator = *request_authenticator;
        self.sign_message_authenticator(secret)?;
        let mut bytes = self.encode()?;
        let authenticator = calculate_response_authenticator(&bytes, request_authenticator, secret);
        bytes[4..20].copy_from_slice(&authenticator);
        self.authenticator = authenticator;
        Ok(bytes)
    }

    /// Decode a received request and run the checks the shared secret allows
    ///
    /// Digest-authenticated requests must verify, an Access-Request's
    /// User-Password is revealed into `user_password` when it decodes (the
    /// hidden attribute is kept), and a Message-Authenticator, when present,
    /// must verify.
    pub fn decode_request(
        data: &[u8],
        secret: &[u8],
        dictionary: &Arc<Dictionary>,
    ) -> Result<Self, PacketError> {
        let mut packet = Self::decode(data, dictionary)?;
        let data = &data[..declared_length(data)?];

        if packet.code.has_digest_request_authenticator() {
            if !verify_accounting_request_authenticator(data, secret) {
                return Err(PacketError::InvalidAuthenticator);
            }
            check_message_authenticator(data, secret, Some(&[0u8; 16]))?;
        } else {
            check_message_authenticator(data, secret, None)?;
        }

        if packet.code == Code::AccessRequest
            && let Some(hidden) = packet.find_attribute(AttributeCode::UserPassword.as_u8())
        {
            // Undecodable plaintext (wrong secret, non-UTF-8) leaves the
            // hidden attribute for the PAP check to reject.
            packet.user_password = decrypt_user_password(&hidden.value, secret, &packet.authenticator).ok();
        }

        Ok(packet)
    }

    /// Decode a received response and verify it against the request authenticator
    pub fn decode_response(
        data: &[u8],
        secret: &[u8],
        request_authenticator: &[u8; 16],
        dictionary: &Arc<Dictionary>,
    ) -> Result<Self, PacketError> {
        let packet = Self::decode(data, dictionary)?;
        let data = &data[..declared_length(data)?];

        if !verify_response_authenticator(data, request_authenticator, secret) {
            return Err(PacketError::InvalidAuthenticator);
        }
        check_message_authenticator(data, secret, Some(request_authenticator))?;

        Ok(packet)
    }

    fn sign_message_authenticator(&mut self, secret: &[u8]) -> Result<(), PacketError> {
        let code = AttributeCode::MessageAuthenticator.as_u8();
        let Some(index) = self
            .attributes
            .iter()
            .position(|a| a.vendor_id.is_none() && a.attr_type == code)
        else {
            return Ok(());
        };

        self.attributes[index].value = vec![0u8; 16];
        let bytes = self.encode()?;
        let mac = calculate_message_authenticator(&bytes, secret)?;
        self.attributes[index].value = mac.to_vec();
        Ok(())
    }

    /// Get the length of the encoded packet
    pub fn length(&self) -> usize {
        Self::MIN_PACKET_SIZE
            + self
                .attributes
                .iter()
                .map(Attribute::encoded_length)
                .sum::<usize>()
    }

    /// Find first base attribute by type
    pub fn find_attribute(&self, attr_type: u8) -> Option<&Attribute> {
        self.attributes
            .iter()
            .find(|a| a.vendor_id.is_none() && a.attr_type == attr_type)
    }

    /// Find all base attributes by type
    pub fn find_all_attributes(&self, attr_type: u8) -> Vec<&Attribute> {
        self.attributes
            .iter()
            .filter(|a| a.vendor_id.is_none() && a.attr_type == attr_type)
            .collect()
    }

    /// Sub-attributes of every Vendor-Specific container for `vendor_id`
    ///
    /// Vendor attributes added directly to the packet are included;
    /// malformed containers are skipped.
    pub fn vendor_attributes(&self, vendor_id: u32) -> Vec<Attribute> {
        let mut found = Vec::new();
        for attr in &self.attributes {
            match attr.vendor_id {
                Some(id) if id == vendor_id => found.push(attr.clone()),
                Some(_) => {}
                None if attr.attr_type == AttributeCode::VendorSpecific.as_u8() => {
                    if let Ok(vsa) = VendorSpecific::decode(&attr.value)
                        && vsa.vendor_id == vendor_id
                    {
                        found.extend(vsa.attributes);
                    }
                }
                None => {}
            }
        }
        found
    }

    pub fn find_vendor_attribute(&self, vendor_id: u32, attr_type: u8) -> Option<Attribute> {
        self.vendor_attributes(vendor_id)
            .into_iter()
            .find(|a| a.attr_type == attr_type)
    }

    /// Add a vendor sub-attribute in its own Vendor-Specific container
    pub fn add_vendor_attribute(&mut self, attribute: Attribute) -> Result<(), PacketError> {
        let vendor_id = attribute.vendor_id.ok_or_else(|| {
            AttributeError::ProtocolViolation("vendor attribute without vendor id".to_string())
        })?;
        let mut vsa = VendorSpecific::new(vendor_id);
        vsa.push(attribute)?;
        self.attributes.push(vsa.into_attribute()?);
        Ok(())
    }

    /// First attribute with the given dictionary name, base or vendor
    pub fn attribute_by_name(&self, name: &str) -> Option<Attribute> {
        let attribute_type = self.dictionary.attribute_type_by_name(name)?;
        match attribute_type.vendor_id {
            Some(vendor_id) => self.find_vendor_attribute(vendor_id, attribute_type.code),
            None => self.find_attribute(attribute_type.code).cloned(),
        }
    }

    pub fn value_by_name(&self, name: &str) -> Option<AttributeValue> {
        self.attribute_by_name(name)?
            .typed_value(&self.dictionary)
            .ok()
    }

    pub fn user_name(&self) -> Option<String> {
        self.find_attribute(AttributeCode::UserName.as_u8())
            .and_then(|a| a.as_string().ok())
    }

    pub fn integer(&self, attr_type: AttributeCode) -> Option<u32> {
        self.find_attribute(attr_type.as_u8())
            .and_then(|a| a.as_integer().ok())
    }
}

fn declared_length(data: &[u8]) -> Result<usize, PacketError> {
    let length = u16::from_be_bytes([data[2], data[3]]) as usize;
    if !(Packet::MIN_PACKET_SIZE..=Packet::MAX_PACKET_SIZE).contains(&length) || data.len() < length {
        return Err(PacketError::InvalidLength(length));
    }
    Ok(length)
}

fn check_message_authenticator(
    data: &[u8],
    secret: &[u8],
    authenticator: Option<&[u8; 16]>,
) -> Result<(), PacketError> {
    match find_message_authenticator(data) {
        Some(offset) if !verify_message_authenticator(data, secret, offset, authenticator)? => {
            Err(PacketError::InvalidMessageAuthenticator)
        }
        _ => Ok(()),
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("code", &self.code)
            .field("identifier", &self.identifier)
            .field("authenticator", &hex::encode(self.authenticator))
            .field("attributes", &self.attributes)
            .field("user_password", &self.user_password.as_ref().map(|_| "<hidden>"))
            .finish()
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} id={} auth={}",
            self.code,
            self.identifier,
            hex::encode(self.authenticator)
        )?;
        for attr in &self.attributes {
            write!(f, "\n    {}", attr.display(&self.dictionary))?;
        }
        Ok(())
    }
}
