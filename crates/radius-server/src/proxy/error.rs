//! Proxy error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Packet error: {0}")]
    Packet(#[from] radius_proto::PacketError),

    /// Too many Proxy-State attributes: the request has been through a loop
    #[error("Proxy loop detected: {0} Proxy-State attributes (limit: {1})")]
    ProxyLoop(usize, usize),

    #[error("Proxy table full: {0} outstanding requests")]
    TableFull(usize),

    /// No outstanding request for this token, usually a late duplicate reply
    #[error("No outstanding request for Proxy-State {0:?}")]
    UnknownProxyState(String),

    #[error("Response carries no Proxy-State attribute")]
    MissingProxyState,

    #[error("Invalid response authenticator from upstream server")]
    InvalidResponseAuthenticator,

    #[error("No listener socket for arrival port {0}")]
    UnknownArrivalPort(u16),
}

pub type ProxyResult<T> = Result<T, ProxyError>;
