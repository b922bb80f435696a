use super::{Attribute, AttributeError, VendorSpecific};
use crate::dictionary::Enumeration;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

/// Semantic kind of an attribute value, selected by the dictionary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeKind {
    Octets,
    String,
    /// Unsigned 32-bit big-endian
    Integer,
    Ipv4,
    Ipv6,
    /// `[reserved][prefix length][address]` (RFC 3162)
    Ipv6Prefix,
    /// `[vendor id:4][sub-TLV...]` (RFC 2865 Section 5.26)
    VendorSpecific,
}

impl AttributeKind {
    /// Map a dictionary file type name to a kind
    ///
    /// `date` and `text` are accepted as aliases of `integer` and `string`.
    pub fn from_dictionary_type(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "octets" => Some(AttributeKind::Octets),
            "string" | "text" => Some(AttributeKind::String),
            "integer" | "date" => Some(AttributeKind::Integer),
            "ipaddr" => Some(AttributeKind::Ipv4),
            "ipv6addr" => Some(AttributeKind::Ipv6),
            "ipv6prefix" => Some(AttributeKind::Ipv6Prefix),
            "vsa" => Some(AttributeKind::VendorSpecific),
            _ => None,
        }
    }

    pub fn dictionary_type(self) -> &'static str {
        match self {
            AttributeKind::Octets => "octets",
            AttributeKind::String => "string",
            AttributeKind::Integer => "integer",
            AttributeKind::Ipv4 => "ipaddr",
            AttributeKind::Ipv6 => "ipv6addr",
            AttributeKind::Ipv6Prefix => "ipv6prefix",
            AttributeKind::VendorSpecific => "vsa",
        }
    }

    /// Decode an attribute body into a typed value
    pub fn decode(self, data: &[u8]) -> Result<AttributeValue, AttributeError> {
        if data.len() > Attribute::MAX_VALUE_LENGTH {
            return Err(AttributeError::ValueTooLong(data.len()));
        }

        match self {
            AttributeKind::Octets => Ok(AttributeValue::Octets(data.to_vec())),
            AttributeKind::String => String::from_utf8(data.to_vec())
                .map(AttributeValue::String)
                .map_err(|_| AttributeError::InvalidUtf8),
            AttributeKind::Integer => {
                let bytes = self.fixed::<4>(data)?;
                Ok(AttributeValue::Integer(u32::from_be_bytes(bytes)))
            }
            AttributeKind::Ipv4 => {
                let bytes = self.fixed::<4>(data)?;
                Ok(AttributeValue::Ipv4(Ipv4Addr::from(bytes)))
            }
            AttributeKind::Ipv6 => {
                let bytes = self.fixed::<16>(data)?;
                Ok(AttributeValue::Ipv6(Ipv6Addr::from(bytes)))
            }
            AttributeKind::Ipv6Prefix => {
                // Senders may truncate the address to the significant bytes.
                if !(2..=18).contains(&data.len()) {
                    return Err(AttributeError::InvalidValueLength {
                        kind: self,
                        expected: 18,
                        actual: data.len(),
                    });
                }
                let prefix_len = data[1];
                if prefix_len > 128 {
                    return Err(AttributeError::ProtocolViolation(format!(
                        "IPv6 prefix length {} exceeds 128",
                        prefix_len
                    )));
                }
                let mut addr = [0u8; 16];
                addr[..data.len() - 2].copy_from_slice(&data[2..]);
                Ok(AttributeValue::Ipv6Prefix {
                    addr: Ipv6Addr::from(addr),
                    prefix_len,
                })
            }
            AttributeKind::VendorSpecific => {
                VendorSpecific::decode(data).map(AttributeValue::VendorSpecific)
            }
        }
    }

    /// Parse the textual form produced by [`AttributeValue::to_text`]
    pub fn parse_text(
        self,
        text: &str,
        enumeration: Option<&Enumeration>,
    ) -> Result<AttributeValue, AttributeError> {
        let invalid = || AttributeError::InvalidText {
            kind: self,
            text: text.to_string(),
        };

        let value = match self {
            AttributeKind::Octets => match text.strip_prefix("0x") {
                Some(hex_digits) => {
                    AttributeValue::Octets(hex::decode(hex_digits).map_err(|_| invalid())?)
                }
                None => AttributeValue::Octets(text.as_bytes().to_vec()),
            },
            AttributeKind::String => AttributeValue::String(text.to_string()),
            AttributeKind::Integer => {
                let named = enumeration.and_then(|e| e.value(text));
                match named {
                    Some(value) => AttributeValue::Integer(value),
                    None => AttributeValue::Integer(text.trim().parse().map_err(|_| invalid())?),
                }
            }
            AttributeKind::Ipv4 => AttributeValue::Ipv4(text.trim().parse().map_err(|_| invalid())?),
            AttributeKind::Ipv6 => AttributeValue::Ipv6(text.trim().parse().map_err(|_| invalid())?),
            AttributeKind::Ipv6Prefix => {
                let (addr, len) = text.trim().split_once('/').ok_or_else(invalid)?;
                let prefix_len: u8 = len.parse().map_err(|_| invalid())?;
                if prefix_len > 128 {
                    return Err(invalid());
                }
                AttributeValue::Ipv6Prefix {
                    addr: addr.parse().map_err(|_| invalid())?,
                    prefix_len,
                }
            }
            AttributeKind::VendorSpecific => return Err(invalid()),
        };

        if value.encoded_len() > Attribute::MAX_VALUE_LENGTH {
            return Err(AttributeError::ValueTooLong(value.encoded_len()));
        }
        Ok(value)
    }

    fn fixed<const N: usize>(self, data: &[u8]) -> Result<[u8; N], AttributeError> {
        data.try_into().map_err(|_| AttributeError::InvalidValueLength {
            kind: self,
            expected: N,
            actual: data.len(),
        })
    }
}

impl fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dictionary_type())
    }
}

/// A decoded attribute value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    Octets(Vec<u8>),
    String(String),
    Integer(u32),
    Ipv4(Ipv4Addr),
    Ipv6(Ipv6Addr),
    Ipv6Prefix { addr: Ipv6Addr, prefix_len: u8 },
    VendorSpecific(VendorSpecific),
}

impl AttributeValue {
    pub fn kind(&self) -> AttributeKind {
        match self {
            AttributeValue::Octets(_) => AttributeKind::Octets,
            AttributeValue::String(_) => AttributeKind::String,
            AttributeValue::Integer(_) => AttributeKind::Integer,
            AttributeValue::Ipv4(_) => AttributeKind::Ipv4,
            AttributeValue::Ipv6(_) => AttributeKind::Ipv6,
            AttributeValue::Ipv6Prefix { .. } => AttributeKind::Ipv6Prefix,
            AttributeValue::VendorSpecific(_) => AttributeKind::VendorSpecific,
        }
    }

    /// Encode to an attribute body
    pub fn encode(&self) -> Result<Vec<u8>, AttributeError> {
        let body = match self {
            AttributeValue::Octets(bytes) => bytes.clone(),
            AttributeValue::String(s) => s.as_bytes().to_vec(),
            AttributeValue::Integer(v) => v.to_be_bytes().to_vec(),
            AttributeValue::Ipv4(addr) => addr.octets().to_vec(),
            AttributeValue::Ipv6(addr) => addr.octets().to_vec(),
            AttributeValue::Ipv6Prefix { addr, prefix_len } => {
                if *prefix_len > 128 {
                    return Err(AttributeError::ProtocolViolation(format!(
                        "IPv6 prefix length {} exceeds 128",
                        prefix_len
                    )));
                }
                let mut body = Vec::with_capacity(18);
                body.push(0);
                body.push(*prefix_len);
                body.extend_from_slice(&addr.octets());
                body
            }
            AttributeValue::VendorSpecific(vsa) => vsa.encode()?,
        };

        if body.len() > Attribute::MAX_VALUE_LENGTH {
            return Err(AttributeError::ValueTooLong(body.len()));
        }
        Ok(body)
    }

    fn encoded_len(&self) -> usize {
        match self {
            AttributeValue::Octets(bytes) => bytes.len(),
            AttributeValue::String(s) => s.len(),
            AttributeValue::Integer(_) | AttributeValue::Ipv4(_) => 4,
            AttributeValue::Ipv6(_) => 16,
            AttributeValue::Ipv6Prefix { .. } => 18,
            AttributeValue::VendorSpecific(vsa) => vsa.encoded_len(),
        }
    }

    /// Human-readable form; integers use the enumeration name when one exists
    pub fn to_text(&self, enumeration: Option<&Enumeration>) -> String {
        match self {
            AttributeValue::Octets(bytes) => format!("0x{}", hex::encode(bytes)),
            AttributeValue::String(s) => s.clone(),
            AttributeValue::Integer(v) => enumeration
                .and_then(|e| e.name(*v))
                .map(str::to_string)
                .unwrap_or_else(|| v.to_string()),
            AttributeValue::Ipv4(addr) => addr.to_string(),
            AttributeValue::Ipv6(addr) => addr.to_string(),
            AttributeValue::Ipv6Prefix { addr, prefix_len } => format!("{}/{}", addr, prefix_len),
            AttributeValue::VendorSpecific(vsa) => format!(
                "Vendor-{} ({} sub-attributes)",
                vsa.vendor_id,
                vsa.attributes.len()
            ),
        }
    }
}
