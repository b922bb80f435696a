macro_rules! attribute_codes {
    ($($(#[$doc:meta])* $variant:ident = $code:literal,)+) => {
        /// Well-known base attribute codes (RFC 2865, 2866, 2869, 3162, 4818)
        ///
        /// The dictionary remains the authority for names and kinds; these
        /// constants exist so protocol code can address attributes without a
        /// name lookup.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum AttributeCode {
            $($(#[$doc])* $variant = $code,)+
        }

        impl AttributeCode {
            pub fn from_u8(value: u8) -> Option<Self> {
                match value {
                    $($code => Some(AttributeCode::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

attribute_codes! {
    UserName = 1,
    /// PAP hidden password (RFC 2865 Section 5.2)
    UserPassword = 2,
    /// `[chap ident][16-byte response]`
    ChapPassword = 3,
    NasIpAddress = 4,
    NasPort = 5,
    ServiceType = 6,
    FramedProtocol = 7,
    FramedIpAddress = 8,
    FramedIpNetmask = 9,
    FilterId = 11,
    FramedMtu = 12,
    ReplyMessage = 18,
    State = 24,
    Class = 25,
    /// Container for vendor sub-attributes
    VendorSpecific = 26,
    SessionTimeout = 27,
    IdleTimeout = 28,
    TerminationAction = 29,
    CalledStationId = 30,
    CallingStationId = 31,
    NasIdentifier = 32,
    /// Opaque correlation data appended by proxies, echoed by servers
    ProxyState = 33,
    AcctStatusType = 40,
    AcctDelayTime = 41,
    AcctInputOctets = 42,
    AcctOutputOctets = 43,
    AcctSessionId = 44,
    AcctAuthentic = 45,
    AcctSessionTime = 46,
    AcctInputPackets = 47,
    AcctOutputPackets = 48,
    AcctTerminateCause = 49,
    AcctMultiSessionId = 50,
    AcctLinkCount = 51,
    AcctInputGigawords = 52,
    AcctOutputGigawords = 53,
    EventTimestamp = 55,
    ChapChallenge = 60,
    NasPortType = 61,
    AcctInterimInterval = 85,
    EapMessage = 79,
    /// HMAC-MD5 over the whole packet (RFC 2869 Section 5.14)
    MessageAuthenticator = 80,
    NasPortId = 87,
    NasIpv6Address = 95,
    FramedIpv6Prefix = 97,
    DelegatedIpv6Prefix = 123,
}

impl AttributeCode {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl From<AttributeCode> for u8 {
    fn from(code: AttributeCode) -> u8 {
        code as u8
    }
}

/// Microsoft vendor attributes (RFC 2548)
pub mod microsoft {
    pub const VENDOR_ID: u32 = 311;

    pub const MS_CHAP_RESPONSE: u8 = 1;
    pub const MS_CHAP_ERROR: u8 = 2;
    pub const MS_MPPE_ENCRYPTION_POLICY: u8 = 7;
    pub const MS_MPPE_ENCRYPTION_TYPES: u8 = 8;
    pub const MS_CHAP_DOMAIN: u8 = 10;
    pub const MS_CHAP_CHALLENGE: u8 = 11;
    pub const MS_CHAP_MPPE_KEYS: u8 = 12;
    pub const MS_MPPE_SEND_KEY: u8 = 16;
    pub const MS_MPPE_RECV_KEY: u8 = 17;
    pub const MS_CHAP2_RESPONSE: u8 = 25;
    pub const MS_CHAP2_SUCCESS: u8 = 26;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_u8() {
        assert_eq!(AttributeCode::from_u8(1), Some(AttributeCode::UserName));
        assert_eq!(AttributeCode::from_u8(80), Some(AttributeCode::MessageAuthenticator));
        assert_eq!(AttributeCode::from_u8(17), None);
    }

    #[test]
    fn test_into_u8() {
        let code: u8 = AttributeCode::ProxyState.into();
        assert_eq!(code, 33);
        assert_eq!(AttributeCode::VendorSpecific.as_u8(), 26);
    }
}
