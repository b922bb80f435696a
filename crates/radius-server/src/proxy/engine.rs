//! Request forwarding and reply correlation

use crate::handler::Endpoint;
use crate::proxy::cache::{ProxyCache, ProxyConnection};
use crate::proxy::error::{ProxyError, ProxyResult};
use radius_proto::{Attribute, AttributeCode, Dictionary, Packet, PacketError};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

/// Requests already carrying more Proxy-State attributes than this are refused
pub const MAX_PROXY_STATE_ATTRIBUTES: usize = 5;

/// Forwards requests upstream and routes the replies back to their clients
///
/// Each forwarded request gets a Proxy-State token from a counter owned by
/// the engine. Replies arrive on the engine's own socket and leave through
/// the listener socket the request originally arrived on.
pub struct ProxyEngine {
    dictionary: Arc<Dictionary>,
    socket: Arc<UdpSocket>,
    reply_sockets: HashMap<u16, Arc<UdpSocket>>,
    cache: ProxyCache,
    next_token: AtomicU64,
}

impl ProxyEngine {
    /// `reply_sockets` maps each local listener port to its socket
    pub fn new(
        dictionary: Arc<Dictionary>,
        socket: Arc<UdpSocket>,
        reply_sockets: HashMap<u16, Arc<UdpSocket>>,
        ttl: Duration,
        max_outstanding: usize,
    ) -> Self {
        ProxyEngine {
            dictionary,
            socket,
            reply_sockets,
            cache: ProxyCache::new(ttl, max_outstanding),
            next_token: AtomicU64::new(1),
        }
    }

    /// Send `request` to `upstream`, returning its Proxy-State token
    ///
    /// The request is re-signed under the upstream secret; a PAP password
    /// is hidden again from `request.user_password`, or forwarded as
    /// received when it could not be revealed. A CHAP request without
    /// CHAP-Challenge gets one holding the original authenticator, since
    /// the upstream copy travels with a new authenticator.
    pub async fn forward(
        &self,
        request: &Packet,
        client: Endpoint,
        upstream: Endpoint,
        arrival_port: u16,
    ) -> ProxyResult<String> {
        let proxy_states = request
            .find_all_attributes(AttributeCode::ProxyState.as_u8())
            .len();
        if proxy_states > MAX_PROXY_STATE_ATTRIBUTES {
            warn!(
                client_addr = %client.address,
                proxy_state_count = proxy_states,
                "Proxy loop detected - too many Proxy-State attributes"
            );
            return Err(ProxyError::ProxyLoop(proxy_states, MAX_PROXY_STATE_ATTRIBUTES));
        }

        let token = self.next_token.fetch_add(1, Ordering::Relaxed).to_string();
        let original_authenticator = request.authenticator;

        let mut outgoing = request.clone();
        outgoing.add_attribute(
            Attribute::new(AttributeCode::ProxyState.as_u8(), token.clone().into_bytes())
                .map_err(PacketError::from)?,
        );
        if outgoing.find_attribute(AttributeCode::ChapPassword.as_u8()).is_some()
            && outgoing.find_attribute(AttributeCode::ChapChallenge.as_u8()).is_none()
        {
            outgoing.add_attribute(
                Attribute::new(AttributeCode::ChapChallenge.as_u8(), original_authenticator.to_vec())
                    .map_err(PacketError::from)?,
            );
        }

        let data = outgoing.encode_request(&upstream.secret)?;
        let upstream_authenticator = outgoing.authenticator;

        let upstream_addr = upstream.address;
        self.cache.insert(
            token.clone(),
            ProxyConnection {
                upstream,
                client,
                request: request.clone(),
                arrival_port,
                upstream_authenticator,
                created_at: Instant::now(),
            },
        )?;

        if let Err(e) = self.socket.send_to(&data, upstream_addr).await {
            self.cache.remove(&token);
            return Err(e.into());
        }

        debug!(
            upstream = %upstream_addr,
            request_id = request.identifier,
            proxy_state = %token,
            "Request forwarded upstream"
        );
        Ok(token)
    }

    /// Route a reply received on the proxy socket back to its client
    pub async fn handle_response(&self, data: &[u8], from: SocketAddr) -> ProxyResult<()> {
        let raw = Packet::decode(data, &self.dictionary)?;
        let token = raw
            .find_all_attributes(AttributeCode::ProxyState.as_u8())
            .last()
            .map(|attr| String::from_utf8_lossy(&attr.value).into_owned())
            .ok_or(ProxyError::MissingProxyState)?;

        let Some(connection) = self.cache.get(&token) else {
            debug!(
                upstream = %from,
                proxy_state = %token,
                "Reply for unknown Proxy-State, likely a duplicate or expired request"
            );
            return Err(ProxyError::UnknownProxyState(token));
        };

        let mut response = Packet::decode_response(
            data,
            &connection.upstream.secret,
            &connection.upstream_authenticator,
            &self.dictionary,
        )
        .map_err(|e| match e {
            PacketError::InvalidAuthenticator => ProxyError::InvalidResponseAuthenticator,
            other => ProxyError::Packet(other),
        })?;

        // A concurrent copy of the same reply may have won the race.
        if self.cache.remove(&token).is_none() {
            return Err(ProxyError::UnknownProxyState(token));
        }

        let proxy_state = AttributeCode::ProxyState.as_u8();
        if let Some(index) = response
            .attributes
            .iter()
            .rposition(|a| a.vendor_id.is_none() && a.attr_type == proxy_state)
        {
            response.attributes.remove(index);
        }

        let socket = self
            .reply_sockets
            .get(&connection.arrival_port)
            .ok_or(ProxyError::UnknownArrivalPort(connection.arrival_port))?;
        let reply = response.encode_response(&connection.client.secret, &connection.request.authenticator)?;
        socket.send_to(&reply, connection.client.address).await?;

        info!(
            client_addr = %connection.client.address,
            upstream = %from,
            code = %response.code,
            request_id = response.identifier,
            "Proxied response returned to client"
        );
        Ok(())
    }

    pub fn socket(&self) -> Arc<UdpSocket> {
        Arc::clone(&self.socket)
    }

    pub fn local_addr(&self) -> ProxyResult<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Number of forwarded requests still waiting for a reply
    pub fn outstanding(&self) -> usize {
        self.cache.len()
    }

    pub fn is_outstanding(&self, token: &str) -> bool {
        self.cache.contains(token)
    }
}
