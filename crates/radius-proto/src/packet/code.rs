use std::fmt;

/// RADIUS packet codes (RFC 2865 Section 4, RFC 2866, RFC 5176, RFC 5997)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Code {
    AccessRequest = 1,
    AccessAccept = 2,
    AccessReject = 3,
    /// RFC 2866
    AccountingRequest = 4,
    /// RFC 2866
    AccountingResponse = 5,
    AccessChallenge = 11,
    /// RFC 5997
    StatusServer = 12,
    /// RFC 5997
    StatusClient = 13,
    /// RFC 5176
    DisconnectRequest = 40,
    DisconnectAck = 41,
    DisconnectNak = 42,
    /// RFC 5176
    CoaRequest = 43,
    CoaAck = 44,
    CoaNak = 45,
}

impl Code {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Code::AccessRequest),
            2 => Some(Code::AccessAccept),
            3 => Some(Code::AccessReject),
            4 => Some(Code::AccountingRequest),
            5 => Some(Code::AccountingResponse),
            11 => Some(Code::AccessChallenge),
            12 => Some(Code::StatusServer),
            13 => Some(Code::StatusClient),
            40 => Some(Code::DisconnectRequest),
            41 => Some(Code::DisconnectAck),
            42 => Some(Code::DisconnectNak),
            43 => Some(Code::CoaRequest),
            44 => Some(Code::CoaAck),
            45 => Some(Code::CoaNak),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Code::AccessRequest => "Access-Request",
            Code::AccessAccept => "Access-Accept",
            Code::AccessReject => "Access-Reject",
            Code::AccountingRequest => "Accounting-Request",
            Code::AccountingResponse => "Accounting-Response",
            Code::AccessChallenge => "Access-Challenge",
            Code::StatusServer => "Status-Server",
            Code::StatusClient => "Status-Client",
            Code::DisconnectRequest => "Disconnect-Request",
            Code::DisconnectAck => "Disconnect-ACK",
            Code::DisconnectNak => "Disconnect-NAK",
            Code::CoaRequest => "CoA-Request",
            Code::CoaAck => "CoA-ACK",
            Code::CoaNak => "CoA-NAK",
        }
    }

    pub fn is_request(self) -> bool {
        matches!(
            self,
            Code::AccessRequest
                | Code::AccountingRequest
                | Code::StatusServer
                | Code::DisconnectRequest
                | Code::CoaRequest
        )
    }

    /// Requests whose authenticator is an MD5 over the packet (RFC 2866, RFC 5176)
    /// rather than a random nonce
    pub fn has_digest_request_authenticator(self) -> bool {
        matches!(
            self,
            Code::AccountingRequest | Code::DisconnectRequest | Code::CoaRequest
        )
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
