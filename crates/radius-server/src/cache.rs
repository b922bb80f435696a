//! Request deduplication cache
//!
//! RFC 2865 Section 2: a retransmitted request carries the same source
//! address, Identifier and Request Authenticator. Retransmits seen within
//! the duplicate window are dropped without a reply; the client keeps
//! retrying until the original answer reaches it.

use dashmap::DashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tracing::debug;

/// Last request seen from a peer for one identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateRecord {
    pub authenticator: [u8; 16],
    pub received_at: Instant,
}

/// Sliding-window duplicate table keyed by `(peer, identifier)`
///
/// Expired records are purged on every check, so no background task is
/// needed. A record with a different authenticator is an identifier
/// collision, not a duplicate, and replaces the old record.
#[derive(Debug)]
pub struct RequestCache {
    entries: DashMap<(SocketAddr, u8), DuplicateRecord>,
    window: Duration,
}

impl RequestCache {
    pub fn new(window: Duration) -> Self {
        RequestCache {
            entries: DashMap::new(),
            window,
        }
    }

    /// Record a request and report whether it repeats one inside the window
    pub fn is_duplicate(&self, peer: SocketAddr, identifier: u8, authenticator: &[u8; 16]) -> bool {
        let now = Instant::now();
        self.purge(now);

        let key = (peer, identifier);
        if let Some(record) = self.entries.get(&key)
            && record.authenticator == *authenticator
        {
            return true;
        }

        self.entries.insert(
            key,
            DuplicateRecord {
                authenticator: *authenticator,
                received_at: now,
            },
        );
        false
    }

    fn purge(&self, now: Instant) {
        let before = self.entries.len();
        self.entries
            .retain(|_, record| now.duration_since(record.received_at) <= self.window);

        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!(
                removed = removed,
                remaining = self.entries.len(),
                "Purged expired duplicate records"
            );
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}
