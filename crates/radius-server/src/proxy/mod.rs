//! RADIUS proxy (RFC 2865 Section 2.3)
//!
//! - [`ProxyEngine`] forwards requests upstream and routes replies back
//! - [`ProxyCache`] tracks outstanding requests by Proxy-State token
//! - [`ProxyConfig`] holds the listener settings and realm routes
//!
//! The routing decision itself belongs to the request handler: the server
//! asks [`crate::RequestHandler::proxy_target`] for an upstream endpoint
//! before dispatching a request locally.

pub mod cache;
pub mod engine;
pub mod error;

pub use cache::{ProxyCache, ProxyConnection};
pub use engine::{MAX_PROXY_STATE_ATTRIBUTES, ProxyEngine};
pub use error::ProxyError;

use crate::config::ConfigError;
use crate::handler::Endpoint;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Route for one realm (`user@realm`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealmConfig {
    pub realm: String,
    /// Upstream server, `ip:port`
    pub address: String,
    pub secret: String,
}

impl RealmConfig {
    pub fn endpoint(&self) -> Result<Endpoint, ConfigError> {
        let address: SocketAddr = self.address.parse().map_err(|_| {
            ConfigError::Invalid(format!(
                "Realm '{}' has invalid upstream address: {}",
                self.realm, self.address
            ))
        })?;
        Ok(Endpoint::new(address, &self.secret))
    }
}

/// Proxy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Port upstream replies are received on
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Seconds an unanswered forwarded request is kept
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl: u64,

    /// Maximum outstanding proxied requests
    #[serde(default = "default_max_outstanding")]
    pub max_outstanding: usize,

    #[serde(default)]
    pub realms: Vec<RealmConfig>,
}

fn default_listen_port() -> u16 {
    1814
}

fn default_cache_ttl() -> u64 {
    30
}

fn default_max_outstanding() -> usize {
    1000
}

impl Default for ProxyConfig {
    fn default() -> Self {
        ProxyConfig {
            listen_port: default_listen_port(),
            cache_ttl: default_cache_ttl(),
            max_outstanding: default_max_outstanding(),
            realms: vec![],
        }
    }
}

impl ProxyConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen_port == 0 {
            return Err(ConfigError::Invalid("Proxy port cannot be 0".to_string()));
        }
        if self.max_outstanding == 0 {
            return Err(ConfigError::Invalid(
                "Proxy max_outstanding must be at least 1".to_string(),
            ));
        }

        for (index, realm) in self.realms.iter().enumerate() {
            if realm.realm.is_empty() {
                return Err(ConfigError::Invalid("Realm name cannot be empty".to_string()));
            }
            if realm.secret.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "Realm '{}' has empty secret",
                    realm.realm
                )));
            }
            realm.endpoint()?;
            if self.realms[..index]
                .iter()
                .any(|other| other.realm.eq_ignore_ascii_case(&realm.realm))
            {
                return Err(ConfigError::Invalid(format!(
                    "Realm '{}' is configured twice",
                    realm.realm
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn realm(name: &str, address: &str) -> RealmConfig {
        RealmConfig {
            realm: name.to_string(),
            address: address.to_string(),
            secret: "upstream".to_string(),
        }
    }

    #[test]
    fn test_proxy_config_default() {
        let config = ProxyConfig::default();
        assert_eq!(config.listen_port, 1814);
        assert_eq!(config.cache_ttl, 30);
        assert_eq!(config.max_outstanding, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_realm_endpoint() {
        let endpoint = realm("example.com", "10.0.0.5:1812").endpoint().unwrap();
        assert_eq!(endpoint.address, "10.0.0.5:1812".parse().unwrap());
        assert_eq!(endpoint.secret, b"upstream");

        assert!(realm("example.com", "10.0.0.5").endpoint().is_err());
    }

    #[test]
    fn test_duplicate_realm_rejected() {
        let config = ProxyConfig {
            realms: vec![realm("example.com", "10.0.0.5:1812"), realm("EXAMPLE.com", "10.0.0.6:1812")],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
