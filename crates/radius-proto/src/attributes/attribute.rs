use super::{AttributeCode, AttributeKind, AttributeValue, VendorSpecific};
use crate::dictionary::Dictionary;
use std::net::{Ipv4Addr, Ipv6Addr};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AttributeError {
    #[error("Attribute value too long: {0} bytes (max 253)")]
    ValueTooLong(usize),
    #[error("Invalid attribute length: {0}")]
    InvalidLength(usize),
    #[error("Insufficient data for attribute: expected {expected}, got {actual}")]
    Truncated { expected: usize, actual: usize },
    #[error("Invalid {kind} value: expected {expected} bytes, got {actual}")]
    InvalidValueLength {
        kind: AttributeKind,
        expected: usize,
        actual: usize,
    },
    #[error("Cannot parse {kind} value from {text:?}")]
    InvalidText { kind: AttributeKind, text: String },
    #[error("Invalid UTF-8 in string attribute")]
    InvalidUtf8,
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),
    #[error("Unknown attribute: {0}")]
    UnknownAttribute(String),
}

/// RADIUS Attribute structure as defined in RFC 2865 Section 5
///
/// ```text
///  0                   1                   2
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |     Type      |    Length     |  Value ...
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// `vendor_id` is `None` for base attributes and `Some(id)` for a vendor
/// sub-attribute. A vendor attribute added directly to a packet is wrapped in
/// its own Vendor-Specific container when encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub vendor_id: Option<u32>,
    /// Attribute type (1 byte)
    pub attr_type: u8,
    /// Attribute value (0-253 bytes)
    pub value: Vec<u8>,
}

impl Attribute {
    /// Minimum attribute length (type + length fields = 2 bytes)
    pub const MIN_LENGTH: usize = 2;
    /// Maximum attribute length (255 bytes including type and length)
    pub const MAX_LENGTH: usize = 255;
    /// Maximum value length (253 bytes)
    pub const MAX_VALUE_LENGTH: usize = 253;

    pub fn new(attr_type: u8, value: Vec<u8>) -> Result<Self, AttributeError> {
        if value.len() > Self::MAX_VALUE_LENGTH {
            return Err(AttributeError::ValueTooLong(value.len()));
        }
        Ok(Attribute {
            vendor_id: None,
            attr_type,
            value,
        })
    }

    /// Create a vendor sub-attribute
    pub fn vendor(vendor_id: u32, attr_type: u8, value: Vec<u8>) -> Result<Self, AttributeError> {
        // Sub-attribute plus the 6-byte container header must still fit.
        if value.len() > Self::MAX_VALUE_LENGTH - 6 {
            return Err(AttributeError::ValueTooLong(value.len()));
        }
        Ok(Attribute {
            vendor_id: Some(vendor_id),
            attr_type,
            value,
        })
    }

    pub fn string(attr_type: impl Into<u8>, value: impl Into<String>) -> Result<Self, AttributeError> {
        Self::new(attr_type.into(), value.into().into_bytes())
    }

    /// Create an integer attribute (32-bit big-endian)
    pub fn integer(attr_type: impl Into<u8>, value: u32) -> Result<Self, AttributeError> {
        Self::new(attr_type.into(), value.to_be_bytes().to_vec())
    }

    pub fn ipv4(attr_type: impl Into<u8>, value: Ipv4Addr) -> Result<Self, AttributeError> {
        Self::new(attr_type.into(), value.octets().to_vec())
    }

    pub fn ipv6(attr_type: impl Into<u8>, value: Ipv6Addr) -> Result<Self, AttributeError> {
        Self::new(attr_type.into(), value.octets().to_vec())
    }

    /// Build an attribute from a typed value
    pub fn from_value(
        vendor_id: Option<u32>,
        attr_type: u8,
        value: &AttributeValue,
    ) -> Result<Self, AttributeError> {
        let bytes = value.encode()?;
        match vendor_id {
            Some(vendor_id) => Self::vendor(vendor_id, attr_type, bytes),
            None => Self::new(attr_type, bytes),
        }
    }

    /// Encode to wire bytes
    pub fn encode(&self) -> Result<Vec<u8>, AttributeError> {
        let length = self.encoded_length();
        if length > Self::MAX_LENGTH {
            return Err(AttributeError::ValueTooLong(self.value.len()));
        }

        let mut buffer = Vec::with_capacity(length);
        if let Some(vendor_id) = self.vendor_id {
            buffer.push(AttributeCode::VendorSpecific.as_u8());
            buffer.push(length as u8);
            buffer.extend_from_slice(&vendor_id.to_be_bytes());
            buffer.push(self.attr_type);
            buffer.push((self.value.len() + Self::MIN_LENGTH) as u8);
        } else {
            buffer.push(self.attr_type);
            buffer.push(length as u8);
        }
        buffer.extend_from_slice(&self.value);

        Ok(buffer)
    }

    /// Decode one base attribute TLV from the front of `data`
    pub fn decode(data: &[u8]) -> Result<Self, AttributeError> {
        if data.len() < Self::MIN_LENGTH {
            return Err(AttributeError::Truncated {
                expected: Self::MIN_LENGTH,
                actual: data.len(),
            });
        }

        let attr_type = data[0];
        let length = data[1] as usize;

        if length < Self::MIN_LENGTH {
            return Err(AttributeError::InvalidLength(length));
        }
        if data.len() < length {
            return Err(AttributeError::Truncated {
                expected: length,
                actual: data.len(),
            });
        }

        Ok(Attribute {
            vendor_id: None,
            attr_type,
            value: data[Self::MIN_LENGTH..length].to_vec(),
        })
    }

    /// Get the encoded length of this attribute
    pub fn encoded_length(&self) -> usize {
        let header = match self.vendor_id {
            Some(_) => Self::MIN_LENGTH + 4 + Self::MIN_LENGTH,
            None => Self::MIN_LENGTH,
        };
        header + self.value.len()
    }

    /// Interpret the value with the kind the dictionary assigns to it
    ///
    /// Attributes the dictionary does not know decode as octets, except a
    /// base Vendor-Specific which always decodes as a container.
    pub fn typed_value(&self, dictionary: &Dictionary) -> Result<AttributeValue, AttributeError> {
        self.kind(dictionary).decode(&self.value)
    }

    pub fn kind(&self, dictionary: &Dictionary) -> AttributeKind {
        match dictionary.attribute_type(self.vendor_id, self.attr_type) {
            Some(attribute_type) => attribute_type.kind,
            None if self.vendor_id.is_none()
                && self.attr_type == AttributeCode::VendorSpecific.as_u8() =>
            {
                AttributeKind::VendorSpecific
            }
            None => AttributeKind::Octets,
        }
    }

    /// Dictionary name, or a synthetic `Attr-N` / `Vendor-V-Attr-N`
    pub fn name(&self, dictionary: &Dictionary) -> String {
        match dictionary.attribute_type(self.vendor_id, self.attr_type) {
            Some(attribute_type) => attribute_type.name.clone(),
            None => match self.vendor_id {
                Some(vendor_id) => format!("Vendor-{}-Attr-{}", vendor_id, self.attr_type),
                None => format!("Attr-{}", self.attr_type),
            },
        }
    }

    /// `Name = value` rendering; undecodable values fall back to hex
    pub fn display(&self, dictionary: &Dictionary) -> String {
        let name = self.name(dictionary);
        let enumeration = dictionary
            .attribute_type(self.vendor_id, self.attr_type)
            .and_then(|t| t.enumeration.as_ref());

        match self.typed_value(dictionary) {
            Ok(AttributeValue::VendorSpecific(vsa)) => {
                let children: Vec<String> = vsa
                    .attributes
                    .iter()
                    .map(|child| child.display(dictionary))
                    .collect();
                let vendor = dictionary
                    .vendor_name(vsa.vendor_id)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Vendor-{}", vsa.vendor_id));
                format!("{} = {} {{ {} }}", name, vendor, children.join(", "))
            }
            Ok(value) => format!("{} = {}", name, value.to_text(enumeration)),
            Err(_) => format!("{} = 0x{}", name, hex::encode(&self.value)),
        }
    }

    /// Try to interpret value as a string
    pub fn as_string(&self) -> Result<String, AttributeError> {
        String::from_utf8(self.value.clone()).map_err(|_| AttributeError::InvalidUtf8)
    }

    /// Try to interpret value as an integer (32-bit big-endian)
    pub fn as_integer(&self) -> Result<u32, AttributeError> {
        let bytes: [u8; 4] =
            self.value
                .as_slice()
                .try_into()
                .map_err(|_| AttributeError::InvalidValueLength {
                    kind: AttributeKind::Integer,
                    expected: 4,
                    actual: self.value.len(),
                })?;
        Ok(u32::from_be_bytes(bytes))
    }

    pub fn as_ipv4(&self) -> Result<Ipv4Addr, AttributeError> {
        let bytes: [u8; 4] =
            self.value
                .as_slice()
                .try_into()
                .map_err(|_| AttributeError::InvalidValueLength {
                    kind: AttributeKind::Ipv4,
                    expected: 4,
                    actual: self.value.len(),
                })?;
        Ok(Ipv4Addr::from(bytes))
    }

    /// Split a base Vendor-Specific attribute into its sub-attributes
    pub fn as_vendor_specific(&self) -> Result<VendorSpecific, AttributeError> {
        VendorSpecific::decode(&self.value)
    }
}
