//! RADIUS Accounting values (RFC 2866, RFC 2869)
//!
//! # Example
//!
//! ```rust
//! use radius_proto::accounting::{AcctStatusType, counter64};
//!
//! assert_eq!(AcctStatusType::from_u32(3), Some(AcctStatusType::InterimUpdate));
//! assert_eq!(counter64(5, 1), (1u64 << 32) + 5);
//! ```

use crate::attributes::AttributeCode;
use crate::packet::Packet;
use thiserror::Error;

macro_rules! value_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident = $value:literal => $text:literal,)+ }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u32)]
        pub enum $name {
            $($variant = $value,)+
        }

        impl $name {
            pub fn from_u32(value: u32) -> Option<Self> {
                match value {
                    $($value => Some($name::$variant),)+
                    _ => None,
                }
            }

            pub fn as_u32(self) -> u32 {
                self as u32
            }

            /// Dictionary `VALUE` name
            pub fn name(self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }
    };
}

value_enum! {
    /// Acct-Status-Type (RFC 2866 Section 5.1)
    AcctStatusType {
        Start = 1 => "Start",
        Stop = 2 => "Stop",
        InterimUpdate = 3 => "Interim-Update",
        AccountingOn = 7 => "Accounting-On",
        AccountingOff = 8 => "Accounting-Off",
    }
}

value_enum! {
    /// Acct-Terminate-Cause (RFC 2866 Section 5.10)
    AcctTerminateCause {
        UserRequest = 1 => "User-Request",
        LostCarrier = 2 => "Lost-Carrier",
        LostService = 3 => "Lost-Service",
        IdleTimeout = 4 => "Idle-Timeout",
        SessionTimeout = 5 => "Session-Timeout",
        AdminReset = 6 => "Admin-Reset",
        AdminReboot = 7 => "Admin-Reboot",
        PortError = 8 => "Port-Error",
        NasError = 9 => "NAS-Error",
        NasRequest = 10 => "NAS-Request",
        NasReboot = 11 => "NAS-Reboot",
        PortUnneeded = 12 => "Port-Unneeded",
        PortPreempted = 13 => "Port-Preempted",
        PortSuspended = 14 => "Port-Suspended",
        ServiceUnavailable = 15 => "Service-Unavailable",
        Callback = 16 => "Callback",
        UserError = 17 => "User-Error",
        HostRequest = 18 => "Host-Request",
    }
}

value_enum! {
    /// Acct-Authentic (RFC 2866 Section 5.6)
    AcctAuthentic {
        Radius = 1 => "RADIUS",
        Local = 2 => "Local",
        Remote = 3 => "Remote",
    }
}

impl AcctStatusType {
    /// Start, Stop and Interim-Update describe a user session
    pub fn is_session_status(self) -> bool {
        matches!(
            self,
            AcctStatusType::Start | AcctStatusType::Stop | AcctStatusType::InterimUpdate
        )
    }

    /// Accounting-On and Accounting-Off describe the NAS itself
    pub fn is_nas_status(self) -> bool {
        matches!(self, AcctStatusType::AccountingOn | AcctStatusType::AccountingOff)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AccountingError {
    #[error("Missing required attribute: {0}")]
    MissingAttribute(&'static str),
    #[error("Invalid Acct-Status-Type value: {0}")]
    InvalidStatusType(u32),
    #[error("Invalid Acct-Terminate-Cause value: {0}")]
    InvalidTerminateCause(u32),
}

/// 64-bit counter from a 32-bit low word and its gigawords (RFC 2869 Section 5.1)
pub fn counter64(low: u32, gigawords: u32) -> u64 {
    ((gigawords as u64) << 32) + low as u64
}

/// Acct-Status-Type of an Accounting-Request
pub fn status_type(packet: &Packet) -> Result<AcctStatusType, AccountingError> {
    let value = packet
        .integer(AttributeCode::AcctStatusType)
        .ok_or(AccountingError::MissingAttribute("Acct-Status-Type"))?;
    AcctStatusType::from_u32(value).ok_or(AccountingError::InvalidStatusType(value))
}

/// Acct-Terminate-Cause, if the packet carries one
pub fn terminate_cause(packet: &Packet) -> Result<Option<AcctTerminateCause>, AccountingError> {
    match packet.integer(AttributeCode::AcctTerminateCause) {
        Some(value) => AcctTerminateCause::from_u32(value)
            .map(Some)
            .ok_or(AccountingError::InvalidTerminateCause(value)),
        None => Ok(None),
    }
}

/// Input octets including Acct-Input-Gigawords
pub fn input_octets(packet: &Packet) -> u64 {
    counter64(
        packet.integer(AttributeCode::AcctInputOctets).unwrap_or(0),
        packet.integer(AttributeCode::AcctInputGigawords).unwrap_or(0),
    )
}

/// Output octets including Acct-Output-Gigawords
pub fn output_octets(packet: &Packet) -> u64 {
    counter64(
        packet.integer(AttributeCode::AcctOutputOctets).unwrap_or(0),
        packet.integer(AttributeCode::AcctOutputGigawords).unwrap_or(0),
    )
}
