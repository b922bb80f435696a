//! Outstanding proxied requests, keyed by Proxy-State token
//!
//! Entries are removed when the matching reply arrives. Replies that never
//! come would leave entries behind forever, so entries older than the TTL
//! are evicted lazily whenever the table is touched.

use crate::handler::Endpoint;
use crate::proxy::error::{ProxyError, ProxyResult};
use dashmap::DashMap;
use radius_proto::Packet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

/// One forwarded request waiting for its upstream reply
#[derive(Clone)]
pub struct ProxyConnection {
    pub upstream: Endpoint,
    /// Where the request came from and the secret it was signed with
    pub client: Endpoint,
    /// Request as received, with its original authenticator
    pub request: Packet,
    /// Local port the request arrived on; the reply leaves from there
    pub arrival_port: u16,
    /// Authenticator the request was sent upstream with
    pub upstream_authenticator: [u8; 16],
    pub created_at: Instant,
}

pub struct ProxyCache {
    connections: DashMap<String, ProxyConnection>,
    /// Live entries plus inserts in flight; bounds the table against `max_outstanding`
    reserved: AtomicUsize,
    ttl: Duration,
    max_outstanding: usize,
}

impl ProxyCache {
    pub fn new(ttl: Duration, max_outstanding: usize) -> Self {
        ProxyCache {
            connections: DashMap::new(),
            reserved: AtomicUsize::new(0),
            ttl,
            max_outstanding,
        }
    }

    /// Store a connection under `token`
    ///
    /// Fails with [`ProxyError::TableFull`] once `max_outstanding` live
    /// entries exist.
    pub fn insert(&self, token: String, connection: ProxyConnection) -> ProxyResult<()> {
        self.evict_expired();

        let outstanding = self.reserved.fetch_add(1, Ordering::AcqRel);
        if outstanding >= self.max_outstanding {
            self.reserved.fetch_sub(1, Ordering::AcqRel);
            return Err(ProxyError::TableFull(outstanding));
        }

        if self.connections.insert(token, connection).is_some() {
            // Replaced an entry under the same token; its slot is reused.
            self.reserved.fetch_sub(1, Ordering::AcqRel);
        }
        Ok(())
    }

    /// Take the connection for `token`, if it is still live
    pub fn remove(&self, token: &str) -> Option<ProxyConnection> {
        self.evict_expired();
        let (_, connection) = self.connections.remove(token)?;
        self.reserved.fetch_sub(1, Ordering::AcqRel);
        Some(connection)
    }

    pub fn get(&self, token: &str) -> Option<ProxyConnection> {
        self.evict_expired();
        self.connections.get(token).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, token: &str) -> bool {
        self.connections.contains_key(token)
    }

    /// Drop entries older than the TTL, returning how many were dropped
    pub fn evict_expired(&self) -> usize {
        let mut removed = 0;
        self.connections.retain(|_, connection| {
            let live = connection.created_at.elapsed() <= self.ttl;
            if !live {
                removed += 1;
            }
            live
        });

        if removed > 0 {
            self.reserved.fetch_sub(removed, Ordering::AcqRel);
            debug!(
                removed = removed,
                remaining = self.connections.len(),
                "Evicted unanswered proxy requests"
            );
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
