//! RADIUS accounting records and sinks
//!
//! An Accounting-Request is flattened into an [`AccountingRecord`] and handed
//! to an [`AccountingSink`]. The server only acknowledges a request once the
//! sink has accepted it (RFC 2866 Section 2): a failed write means no
//! Accounting-Response and the NAS retransmits.

pub mod file;

pub use file::FileAccountingSink;

use async_trait::async_trait;
use radius_proto::accounting::{self, AcctStatusType};
use radius_proto::{AccountingError, AttributeCode, Packet};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;

/// Accounting event, one per Acct-Status-Type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccountingEvent {
    Start,
    Stop,
    InterimUpdate,
    AccountingOn,
    AccountingOff,
}

impl From<AcctStatusType> for AccountingEvent {
    fn from(status: AcctStatusType) -> Self {
        match status {
            AcctStatusType::Start => AccountingEvent::Start,
            AcctStatusType::Stop => AccountingEvent::Stop,
            AcctStatusType::InterimUpdate => AccountingEvent::InterimUpdate,
            AcctStatusType::AccountingOn => AccountingEvent::AccountingOn,
            AcctStatusType::AccountingOff => AccountingEvent::AccountingOff,
        }
    }
}

/// One Accounting-Request, as written by the sinks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountingRecord {
    /// Event-Timestamp if the NAS sent one, otherwise the receive time
    pub timestamp: u64,
    pub event: AccountingEvent,
    /// Address the request came from
    pub client: IpAddr,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nas_ip: Option<Ipv4Addr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nas_identifier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub framed_ip: Option<Ipv4Addr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_time: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay_time: Option<u32>,
    /// Acct-Input-Octets including Acct-Input-Gigawords
    pub input_octets: u64,
    /// Acct-Output-Octets including Acct-Output-Gigawords
    pub output_octets: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_packets: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_packets: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminate_cause: Option<String>,
}

impl AccountingRecord {
    /// Flatten an Accounting-Request received from `client`
    ///
    /// Fails when Acct-Status-Type or Acct-Terminate-Cause is missing or
    /// not a known value.
    pub fn from_packet(packet: &Packet, client: SocketAddr) -> Result<Self, AccountingError> {
        let status = accounting::status_type(packet)?;
        let terminate_cause = accounting::terminate_cause(packet)?;

        let text = |code: AttributeCode| {
            packet
                .find_attribute(code.as_u8())
                .and_then(|a| a.as_string().ok())
        };
        let address = |code: AttributeCode| {
            packet
                .find_attribute(code.as_u8())
                .and_then(|a| a.as_ipv4().ok())
        };

        let timestamp = match packet.integer(AttributeCode::EventTimestamp) {
            Some(timestamp) => timestamp as u64,
            None => SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        };

        Ok(AccountingRecord {
            timestamp,
            event: status.into(),
            client: client.ip(),
            nas_ip: address(AttributeCode::NasIpAddress),
            nas_identifier: text(AttributeCode::NasIdentifier),
            session_id: text(AttributeCode::AcctSessionId),
            username: text(AttributeCode::UserName),
            framed_ip: address(AttributeCode::FramedIpAddress),
            session_time: packet.integer(AttributeCode::AcctSessionTime),
            delay_time: packet.integer(AttributeCode::AcctDelayTime),
            input_octets: accounting::input_octets(packet),
            output_octets: accounting::output_octets(packet),
            input_packets: packet.integer(AttributeCode::AcctInputPackets),
            output_packets: packet.integer(AttributeCode::AcctOutputPackets),
            terminate_cause: terminate_cause.map(|cause| cause.name().to_string()),
        })
    }
}

/// Destination for accounting records
#[async_trait]
pub trait AccountingSink: Send + Sync {
    async fn record(&self, record: &AccountingRecord) -> Result<(), std::io::Error>;
}

/// Keeps records in memory, for tests and development
#[derive(Debug, Default)]
pub struct MemoryAccountingSink {
    records: Mutex<Vec<AccountingRecord>>,
}

impl MemoryAccountingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<AccountingRecord> {
        self.records.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }
}

#[async_trait]
impl AccountingSink for MemoryAccountingSink {
    async fn record(&self, record: &AccountingRecord) -> Result<(), std::io::Error> {
        self.records.lock().await.push(record.clone());
        Ok(())
    }
}
