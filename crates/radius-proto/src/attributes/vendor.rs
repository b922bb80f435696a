use super::{Attribute, AttributeCode, AttributeError};

/// Vendor-Specific attribute payload (RFC 2865 Section 5.26)
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                            Vendor-Id                          |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// | Vendor type   | Vendor length |    Value ...
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// Every sub-attribute carries `vendor_id == Some(self.vendor_id)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorSpecific {
    pub vendor_id: u32,
    pub attributes: Vec<Attribute>,
}

impl VendorSpecific {
    pub fn new(vendor_id: u32) -> Self {
        VendorSpecific {
            vendor_id,
            attributes: Vec::new(),
        }
    }

    /// Add a sub-attribute; its vendor id must match the container's
    pub fn push(&mut self, attribute: Attribute) -> Result<(), AttributeError> {
        if attribute.vendor_id != Some(self.vendor_id) {
            return Err(AttributeError::ProtocolViolation(format!(
                "sub-attribute vendor {:?} does not match container vendor {}",
                attribute.vendor_id, self.vendor_id
            )));
        }
        self.attributes.push(attribute);
        Ok(())
    }

    /// Decode a Vendor-Specific body
    ///
    /// The sub-TLV lengths must account for every byte after the vendor id.
    pub fn decode(data: &[u8]) -> Result<Self, AttributeError> {
        if data.len() < 4 {
            return Err(AttributeError::ProtocolViolation(format!(
                "Vendor-Specific body too short: {} bytes",
                data.len()
            )));
        }

        let vendor_id = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        let mut attributes = Vec::new();
        let mut rest = &data[4..];

        while !rest.is_empty() {
            if rest.len() < Attribute::MIN_LENGTH {
                return Err(AttributeError::ProtocolViolation(format!(
                    "vendor {} sub-attribute header truncated",
                    vendor_id
                )));
            }
            let length = rest[1] as usize;
            if length < Attribute::MIN_LENGTH || length > rest.len() {
                return Err(AttributeError::ProtocolViolation(format!(
                    "vendor {} sub-attribute length {} does not fit {} remaining bytes",
                    vendor_id,
                    length,
                    rest.len()
                )));
            }
            attributes.push(Attribute {
                vendor_id: Some(vendor_id),
                attr_type: rest[0],
                value: rest[2..length].to_vec(),
            });
            rest = &rest[length..];
        }

        Ok(VendorSpecific {
            vendor_id,
            attributes,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>, AttributeError> {
        let mut body = Vec::with_capacity(self.encoded_len());
        body.extend_from_slice(&self.vendor_id.to_be_bytes());
        for attribute in &self.attributes {
            if attribute.vendor_id != Some(self.vendor_id) {
                return Err(AttributeError::ProtocolViolation(format!(
                    "sub-attribute vendor {:?} does not match container vendor {}",
                    attribute.vendor_id, self.vendor_id
                )));
            }
            if attribute.value.len() > Attribute::MAX_VALUE_LENGTH {
                return Err(AttributeError::ValueTooLong(attribute.value.len()));
            }
            body.push(attribute.attr_type);
            body.push((attribute.value.len() + Attribute::MIN_LENGTH) as u8);
            body.extend_from_slice(&attribute.value);
        }

        if body.len() > Attribute::MAX_VALUE_LENGTH {
            return Err(AttributeError::ValueTooLong(body.len()));
        }
        Ok(body)
    }

    pub(crate) fn encoded_len(&self) -> usize {
        4 + self
            .attributes
            .iter()
            .map(|a| a.value.len() + Attribute::MIN_LENGTH)
            .sum::<usize>()
    }

    /// Wrap into a base-level Vendor-Specific (26) attribute
    pub fn into_attribute(self) -> Result<Attribute, AttributeError> {
        Attribute::new(AttributeCode::VendorSpecific.as_u8(), self.encode()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_microsoft_container() {
        // Vendor 311, MS-CHAP-Error (2) = "E=691"
        let body = [0, 0, 0x01, 0x37, 2, 7, b'E', b'=', b'6', b'9', b'1'];
        let vsa = VendorSpecific::decode(&body).unwrap();
        assert_eq!(vsa.vendor_id, 311);
        assert_eq!(vsa.attributes.len(), 1);
        assert_eq!(vsa.attributes[0].vendor_id, Some(311));
        assert_eq!(vsa.attributes[0].attr_type, 2);
        assert_eq!(vsa.attributes[0].value, b"E=691");
        assert_eq!(vsa.encode().unwrap(), body);
    }

    #[test]
    fn test_sub_lengths_must_sum() {
        // Sub-attribute claims 9 bytes but only 7 follow the vendor id
        let body = [0, 0, 0x01, 0x37, 2, 9, b'E', b'=', b'6', b'9', b'1'];
        assert!(matches!(
            VendorSpecific::decode(&body),
            Err(AttributeError::ProtocolViolation(_))
        ));

        // Trailing byte that cannot form a sub-attribute
        let body = [0, 0, 0x01, 0x37, 2, 3, b'E', 0xFF];
        assert!(matches!(
            VendorSpecific::decode(&body),
            Err(AttributeError::ProtocolViolation(_))
        ));

        // Sub-length below the header size
        let body = [0, 0, 0x01, 0x37, 2, 1];
        assert!(VendorSpecific::decode(&body).is_err());
    }

    #[test]
    fn test_short_vendor_id() {
        assert!(VendorSpecific::decode(&[0, 0, 1]).is_err());
    }

    #[test]
    fn test_push_enforces_vendor() {
        let mut vsa = VendorSpecific::new(311);
        assert!(vsa.push(Attribute::vendor(311, 26, vec![1, 2]).unwrap()).is_ok());
        assert!(vsa.push(Attribute::vendor(14122, 1, vec![1]).unwrap()).is_err());
        assert!(vsa.push(Attribute::new(1, b"alice".to_vec()).unwrap()).is_err());
    }

    #[test]
    fn test_into_attribute() {
        let mut vsa = VendorSpecific::new(14122);
        vsa.push(Attribute::vendor(14122, 1, b"loc".to_vec()).unwrap())
            .unwrap();
        let attr = vsa.into_attribute().unwrap();
        assert_eq!(attr.attr_type, 26);
        assert_eq!(attr.value, vec![0, 0, 0x37, 0x2A, 1, 5, b'l', b'o', b'c']);
    }
}
