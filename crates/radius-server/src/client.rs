//! RADIUS client engine
//!
//! One UDP socket per client. Each call encodes the request once and sends
//! it up to `retry_count` times, waiting `socket_timeout` for a matching
//! reply after every send. Retransmissions reuse the identifier and
//! authenticator of the first attempt and leave Acct-Delay-Time alone.
//!
//! Identifier 0 is reserved as the "unassigned" marker: a request reaching
//! [`RadiusClient::communicate`] with identifier 0 is given the next
//! identifier from the client's counter, and that counter never yields 0.
//! The client therefore never puts identifier 0 on the wire.

use crate::handler::Endpoint;
use radius_proto::{Code, Dictionary, Packet, PacketError};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("No reply after {attempts} attempts")]
    Timeout { attempts: u32 },
    #[error("Packet error: {0}")]
    Packet(#[from] PacketError),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("No accounting endpoint configured")]
    NoAccountingEndpoint,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub auth_endpoint: Endpoint,
    pub acct_endpoint: Option<Endpoint>,
    /// Local address the client socket binds to
    pub bind_address: SocketAddr,
    /// How long to wait for a reply after each send
    pub socket_timeout: Duration,
    /// Total number of sends per request
    pub retry_count: u32,
}

impl ClientConfig {
    pub fn new(auth_endpoint: Endpoint) -> Self {
        ClientConfig {
            auth_endpoint,
            acct_endpoint: None,
            bind_address: SocketAddr::from(([0, 0, 0, 0], 0)),
            socket_timeout: Duration::from_secs(3),
            retry_count: 3,
        }
    }

    pub fn with_accounting(mut self, acct_endpoint: Endpoint) -> Self {
        self.acct_endpoint = Some(acct_endpoint);
        self
    }
}

pub struct RadiusClient {
    config: ClientConfig,
    dictionary: Arc<Dictionary>,
    socket: Mutex<UdpSocket>,
    next_id: AtomicU8,
}

impl RadiusClient {
    pub async fn new(config: ClientConfig, dictionary: Arc<Dictionary>) -> Result<Self, ClientError> {
        let socket = UdpSocket::bind(config.bind_address).await?;
        debug!(local_addr = %socket.local_addr()?, "RADIUS client socket bound");

        Ok(RadiusClient {
            config,
            dictionary,
            socket: Mutex::new(socket),
            next_id: AtomicU8::new(1),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Next request identifier; never 0, so 0 can mean "unassigned"
    pub fn next_identifier(&self) -> u8 {
        loop {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            if id != 0 {
                return id;
            }
        }
    }

    /// Empty request bound to this client's dictionary, with a fresh identifier
    pub fn new_request(&self, code: Code) -> Packet {
        Packet::new(&self.dictionary, code, self.next_identifier())
    }

    pub async fn authenticate(&self, request: &mut Packet) -> Result<Packet, ClientError> {
        let endpoint = self.config.auth_endpoint.clone();
        self.communicate(request, &endpoint).await
    }

    pub async fn account(&self, request: &mut Packet) -> Result<Packet, ClientError> {
        let endpoint = self
            .config
            .acct_endpoint
            .clone()
            .ok_or(ClientError::NoAccountingEndpoint)?;
        self.communicate(request, &endpoint).await
    }

    /// Send `request` to `endpoint` and wait for the verified reply
    ///
    /// A request with identifier 0 is assigned [`next_identifier`](Self::next_identifier)
    /// first; any other identifier is sent unchanged. On return
    /// `request.identifier` and `request.authenticator` hold what was sent.
    pub async fn communicate(&self, request: &mut Packet, endpoint: &Endpoint) -> Result<Packet, ClientError> {
        if request.identifier == 0 {
            request.identifier = self.next_identifier();
        }
        let data = request.encode_request(&endpoint.secret)?;

        let socket = self.socket.lock().await;
        let mut buf = vec![0u8; Packet::MAX_PACKET_SIZE];
        let mut last_io_error = None;

        for attempt in 1..=self.config.retry_count {
            if let Err(e) = socket.send_to(&data, endpoint.address).await {
                warn!(server = %endpoint.address, attempt = attempt, error = %e, "Failed to send request");
                last_io_error = Some(e);
                continue;
            }

            let deadline = Instant::now() + self.config.socket_timeout;
            loop {
                let (len, from) = match timeout_at(deadline, socket.recv_from(&mut buf)).await {
                    Err(_) => {
                        debug!(
                            server = %endpoint.address,
                            request_id = request.identifier,
                            attempt = attempt,
                            "No reply before timeout"
                        );
                        break;
                    }
                    Ok(Err(e)) => {
                        warn!(server = %endpoint.address, attempt = attempt, error = %e, "Failed to receive reply");
                        last_io_error = Some(e);
                        break;
                    }
                    Ok(Ok(received)) => received,
                };

                let reply = &buf[..len];
                if from != endpoint.address || reply.len() < 2 || reply[1] != request.identifier {
                    debug!(from = %from, "Ignoring unrelated datagram");
                    continue;
                }

                return Packet::decode_response(reply, &endpoint.secret, &request.authenticator, &self.dictionary)
                    .map_err(|e| match e {
                        PacketError::InvalidAuthenticator => {
                            ClientError::InvalidResponse("response authenticator mismatch".to_string())
                        }
                        other => ClientError::Packet(other),
                    });
            }
        }

        Err(match last_io_error {
            Some(e) => ClientError::Io(e),
            None => ClientError::Timeout {
                attempts: self.config.retry_count,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"testing123";

    fn dictionary() -> Arc<Dictionary> {
        Arc::new(Dictionary::standard().unwrap())
    }

    async fn client_for(server: SocketAddr, retry_count: u32) -> RadiusClient {
        let mut config = ClientConfig::new(Endpoint::new(server, SECRET));
        config.bind_address = "127.0.0.1:0".parse().unwrap();
        config.socket_timeout = Duration::from_millis(100);
        config.retry_count = retry_count;
        RadiusClient::new(config, dictionary()).await.unwrap()
    }

    #[tokio::test]
    async fn test_identifier_skips_zero() {
        let client = client_for("127.0.0.1:1812".parse().unwrap(), 1).await;
        client.next_id.store(255, Ordering::Relaxed);
        assert_eq!(client.next_identifier(), 255);
        assert_eq!(client.next_identifier(), 1);
    }

    #[tokio::test]
    async fn test_zero_identifier_assigned_others_kept() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let client = client_for(server.local_addr().unwrap(), 1).await;
        let dict = dictionary();

        let responder = tokio::spawn(async move {
            let mut buf = [0u8; 4096];
            let mut seen = Vec::new();
            for _ in 0..2 {
                let (len, from) = server.recv_from(&mut buf).await.unwrap();
                let request = Packet::decode_request(&buf[..len], SECRET, &dict).unwrap();
                seen.push(request.identifier);
                let mut response = Packet::response_to(&request, Code::AccessAccept);
                let data = response.encode_response(SECRET, &request.authenticator).unwrap();
                server.send_to(&data, from).await.unwrap();
            }
            seen
        });

        client.next_id.store(42, Ordering::Relaxed);
        let mut unassigned = Packet::new(&dictionary(), Code::AccessRequest, 0);
        client.authenticate(&mut unassigned).await.unwrap();
        assert_eq!(unassigned.identifier, 42);

        let mut explicit = Packet::new(&dictionary(), Code::AccessRequest, 200);
        client.authenticate(&mut explicit).await.unwrap();
        assert_eq!(explicit.identifier, 200);

        assert_eq!(responder.await.unwrap(), vec![42, 200]);
    }

    #[tokio::test]
    async fn test_timeout_after_retries() {
        // Bound but never answers
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let client = client_for(silent.local_addr().unwrap(), 3).await;

        let mut request = client.new_request(Code::AccessRequest);
        request.add_text("User-Name", "alice").unwrap();
        match client.authenticate(&mut request).await {
            Err(ClientError::Timeout { attempts }) => assert_eq!(attempts, 3),
            other => panic!("Expected timeout, got {:?}", other.map(|p| p.code)),
        }

        // Every attempt carried the same bytes.
        let mut buf = [0u8; 4096];
        let (first, _) = silent.recv_from(&mut buf).await.unwrap();
        let first = buf[..first].to_vec();
        for _ in 0..2 {
            let (len, _) = silent.recv_from(&mut buf).await.unwrap();
            assert_eq!(&buf[..len], first.as_slice());
        }
    }

    #[tokio::test]
    async fn test_reply_after_retransmit() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let client = client_for(server.local_addr().unwrap(), 3).await;
        let dict = dictionary();

        let responder = tokio::spawn(async move {
            let mut buf = [0u8; 4096];
            // Ignore the first send so the client has to retransmit.
            server.recv_from(&mut buf).await.unwrap();
            let (len, from) = server.recv_from(&mut buf).await.unwrap();
            let request = Packet::decode_request(&buf[..len], SECRET, &dict).unwrap();

            // Unrelated identifier first; the client must skip it.
            let mut stray = Packet::new(&dict, Code::AccessReject, request.identifier.wrapping_add(1));
            let stray = stray.encode_response(SECRET, &request.authenticator).unwrap();
            server.send_to(&stray, from).await.unwrap();

            let mut response = Packet::response_to(&request, Code::AccessAccept);
            let data = response.encode_response(SECRET, &request.authenticator).unwrap();
            server.send_to(&data, from).await.unwrap();
        });

        let mut request = client.new_request(Code::AccessRequest);
        request.add_text("User-Name", "alice").unwrap();
        request.user_password = Some("password".to_string());
        let response = client.authenticate(&mut request).await.unwrap();
        assert_eq!(response.code, Code::AccessAccept);
        assert_eq!(response.identifier, request.identifier);
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn test_forged_reply_rejected() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let client = client_for(server.local_addr().unwrap(), 1).await;
        let dict = dictionary();

        let responder = tokio::spawn(async move {
            let mut buf = [0u8; 4096];
            let (len, from) = server.recv_from(&mut buf).await.unwrap();
            let request = Packet::decode(&buf[..len], &dict).unwrap();
            let mut response = Packet::response_to(&request, Code::AccessAccept);
            let data = response.encode_response(b"wrong-secret", &request.authenticator).unwrap();
            server.send_to(&data, from).await.unwrap();
        });

        let mut request = client.new_request(Code::AccessRequest);
        request.add_text("User-Name", "alice").unwrap();
        assert!(matches!(
            client.authenticate(&mut request).await,
            Err(ClientError::InvalidResponse(_))
        ));
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn test_account_without_endpoint() {
        let client = client_for("127.0.0.1:1812".parse().unwrap(), 1).await;
        let mut request = client.new_request(Code::AccountingRequest);
        assert!(matches!(
            client.account(&mut request).await,
            Err(ClientError::NoAccountingEndpoint)
        ));
    }
}
