use crate::proxy::ProxyConfig;
use crate::server::ServerConfig;
use ipnetwork::IpNetwork;
use radius_proto::{Dictionary, DictionaryError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Dictionary error: {0}")]
    Dictionary(#[from] DictionaryError),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub password: String,
    /// Reply attributes for Access-Accept, dictionary name to textual value
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

/// Client (NAS) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    /// Client IP address or network (supports CIDR notation)
    pub address: String,
    /// Shared secret for this client
    pub secret: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Client {
    /// Parse the client address as an IP network
    pub fn parse_network(&self) -> Result<IpNetwork, ConfigError> {
        if let Ok(network) = self.address.parse::<IpNetwork>() {
            return Ok(network);
        }

        // A bare address is a /32 or /128 network
        if let Ok(ip) = self.address.parse::<IpAddr>() {
            return Ok(IpNetwork::from(ip));
        }

        Err(ConfigError::Invalid(format!(
            "Invalid client address: {}",
            self.address
        )))
    }

    pub fn matches(&self, source_ip: IpAddr) -> Result<bool, ConfigError> {
        let network = self.parse_network()?;
        Ok(network.contains(source_ip))
    }
}

/// Server configuration file (JSON)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Authentication port
    #[serde(default = "default_auth_port")]
    pub auth_port: u16,

    /// Accounting port; `null` disables the accounting listener
    #[serde(default = "default_acct_port")]
    pub acct_port: Option<u16>,

    /// Extra dictionary file loaded on top of the built-in one
    #[serde(default)]
    pub dictionary_path: Option<String>,

    /// Duplicate detection window in seconds
    #[serde(default = "default_duplicate_interval")]
    pub duplicate_interval: u64,

    /// Maximum number of requests processed concurrently
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Deadline for one request handler call, in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,

    /// Log level: "trace", "debug", "info", "warn", "error" (default: "info")
    #[serde(default)]
    pub log_level: Option<String>,

    /// Accounting log file (JSON Lines); accounting requests are not
    /// acknowledged when unset
    #[serde(default)]
    pub accounting_log_path: Option<String>,

    #[serde(default)]
    pub clients: Vec<Client>,

    #[serde(default)]
    pub users: Vec<User>,

    #[serde(default)]
    pub proxy: Option<ProxyConfig>,
}

fn default_listen_address() -> String {
    "0.0.0.0".to_string()
}

fn default_auth_port() -> u16 {
    1812
}

fn default_acct_port() -> Option<u16> {
    Some(1813)
}

fn default_duplicate_interval() -> u64 {
    10
}

fn default_max_workers() -> usize {
    64
}

fn default_request_timeout() -> u64 {
    5
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listen_address: default_listen_address(),
            auth_port: default_auth_port(),
            acct_port: default_acct_port(),
            dictionary_path: None,
            duplicate_interval: default_duplicate_interval(),
            max_workers: default_max_workers(),
            request_timeout: default_request_timeout(),
            log_level: None,
            accounting_log_path: None,
            clients: vec![],
            users: vec![],
            proxy: None,
        }
    }
}

impl Config {
    /// Load and validate configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    fn listen_ip(&self) -> Result<IpAddr, ConfigError> {
        self.listen_address
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("Invalid IP address: {}", self.listen_address)))
    }

    pub fn auth_addr(&self) -> Result<SocketAddr, ConfigError> {
        Ok(SocketAddr::new(self.listen_ip()?, self.auth_port))
    }

    pub fn acct_addr(&self) -> Result<Option<SocketAddr>, ConfigError> {
        let ip = self.listen_ip()?;
        Ok(self.acct_port.map(|port| SocketAddr::new(ip, port)))
    }

    /// Runtime settings for [`crate::RadiusServer::bind`]
    pub fn server_config(&self) -> Result<ServerConfig, ConfigError> {
        let mut server = ServerConfig::new(self.auth_addr()?);
        server.acct_addr = self.acct_addr()?;
        server.duplicate_window = Duration::from_secs(self.duplicate_interval);
        server.max_workers = self.max_workers;
        server.request_timeout = Duration::from_secs(self.request_timeout);
        if let Some(proxy) = &self.proxy {
            server.proxy_addr = Some(SocketAddr::new(self.listen_ip()?, proxy.listen_port));
            server.proxy_ttl = Duration::from_secs(proxy.cache_ttl);
            server.proxy_max_outstanding = proxy.max_outstanding;
        }
        Ok(server)
    }

    /// The built-in dictionary plus `dictionary_path`, if set
    pub fn load_dictionary(&self) -> Result<Dictionary, ConfigError> {
        let mut dictionary = Dictionary::standard()?;
        if let Some(path) = &self.dictionary_path {
            dictionary.load_file(path)?;
        }
        Ok(dictionary)
    }

    /// First enabled client whose network contains `source_ip`
    pub fn find_client(&self, source_ip: IpAddr) -> Option<&Client> {
        self.clients
            .iter()
            .filter(|client| client.enabled)
            .find(|client| matches!(client.matches(source_ip), Ok(true)))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.listen_ip()?;

        if self.auth_port == 0 {
            return Err(ConfigError::Invalid("Auth port cannot be 0".to_string()));
        }
        if self.acct_port == Some(0) {
            return Err(ConfigError::Invalid("Accounting port cannot be 0".to_string()));
        }
        if self.max_workers == 0 {
            return Err(ConfigError::Invalid("max_workers must be at least 1".to_string()));
        }
        if self.request_timeout == 0 {
            return Err(ConfigError::Invalid("request_timeout must be at least 1 second".to_string()));
        }

        for client in &self.clients {
            if client.secret.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "Client {} has empty secret",
                    client.address
                )));
            }
            client.parse_network()?;
        }

        for user in &self.users {
            if user.username.is_empty() {
                return Err(ConfigError::Invalid("User has empty username".to_string()));
            }
        }

        if let Some(proxy) = &self.proxy {
            proxy.validate()?;
            let ports = [Some(self.auth_port), self.acct_port];
            if ports.contains(&Some(proxy.listen_port)) {
                return Err(ConfigError::Invalid(format!(
                    "Proxy port {} collides with a listener port",
                    proxy.listen_port
                )));
            }
        }

        Ok(())
    }

    /// Configuration written when the server starts without one
    pub fn example() -> Self {
        Config {
            clients: vec![
                Client {
                    address: "192.168.1.0/24".to_string(),
                    secret: "client_secret_1".to_string(),
                    name: Some("Internal Network".to_string()),
                    enabled: true,
                },
                Client {
                    address: "127.0.0.1".to_string(),
                    secret: "testing123".to_string(),
                    name: Some("Localhost".to_string()),
                    enabled: true,
                },
            ],
            users: vec![
                User {
                    username: "admin".to_string(),
                    password: "admin123".to_string(),
                    attributes: HashMap::from([
                        ("Service-Type".to_string(), "Administrative-User".to_string()),
                        ("Session-Timeout".to_string(), "3600".to_string()),
                    ]),
                },
                User {
                    username: "user1".to_string(),
                    password: "password1".to_string(),
                    attributes: HashMap::new(),
                },
            ],
            log_level: Some("info".to_string()),
            accounting_log_path: Some("/var/log/radius/accounting.log".to_string()),
            ..Config::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::RealmConfig;

    fn client(address: &str, secret: &str, enabled: bool) -> Client {
        Client {
            address: address.to_string(),
            secret: secret.to_string(),
            name: Some("Test".to_string()),
            enabled,
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.auth_port, 1812);
        assert_eq!(config.acct_port, Some(1813));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.max_workers = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.listen_address = "not-an-ip".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.clients = vec![client("10.0.0.1", "", true)];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_minimal_json_uses_defaults() {
        let config: Config = serde_json::from_str(r#"{"clients": [{"address": "10.0.0.0/8", "secret": "s"}]}"#).unwrap();
        assert_eq!(config.auth_port, 1812);
        assert_eq!(config.duplicate_interval, 10);
        assert!(config.clients[0].enabled);
        assert!(config.proxy.is_none());

        let config: Config = serde_json::from_str(r#"{"acct_port": null}"#).unwrap();
        assert_eq!(config.acct_addr().unwrap(), None);
    }

    #[test]
    fn test_socket_addrs() {
        let config = Config::default();
        assert_eq!(config.auth_addr().unwrap().port(), 1812);
        assert_eq!(config.acct_addr().unwrap().unwrap().port(), 1813);
    }

    #[test]
    fn test_server_config() {
        let mut config = Config::default();
        config.duplicate_interval = 3;
        config.proxy = Some(ProxyConfig::default());

        let server = config.server_config().unwrap();
        assert_eq!(server.duplicate_window, Duration::from_secs(3));
        assert_eq!(server.proxy_addr.unwrap().port(), 1814);
        assert_eq!(server.proxy_ttl, Duration::from_secs(30));
    }

    #[test]
    fn test_proxy_port_collision() {
        let mut config = Config::default();
        config.proxy = Some(ProxyConfig {
            listen_port: 1813,
            ..ProxyConfig::default()
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_proxy_realm_validation() {
        let mut config = Config::default();
        config.proxy = Some(ProxyConfig {
            realms: vec![RealmConfig {
                realm: "example.com".to_string(),
                address: "bogus".to_string(),
                secret: "s".to_string(),
            }],
            ..ProxyConfig::default()
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_client_parse_network() {
        let network = client("192.168.1.1", "secret", true).parse_network().unwrap();
        assert!(network.contains("192.168.1.1".parse().unwrap()));
        assert!(!network.contains("192.168.1.2".parse().unwrap()));

        let network = client("192.168.1.0/24", "secret", true).parse_network().unwrap();
        assert!(network.contains("192.168.1.254".parse().unwrap()));
        assert!(!network.contains("192.168.2.1".parse().unwrap()));

        assert!(client("invalid", "secret", true).parse_network().is_err());
    }

    #[test]
    fn test_config_find_client() {
        let mut config = Config::default();
        config.clients = vec![
            client("192.168.1.0/24", "secret1", true),
            client("10.0.0.1", "secret2", true),
            client("172.16.0.0/12", "secret3", false),
        ];

        assert_eq!(config.find_client("192.168.1.50".parse().unwrap()).unwrap().secret, "secret1");
        assert_eq!(config.find_client("10.0.0.1".parse().unwrap()).unwrap().secret, "secret2");
        assert!(config.find_client("172.16.0.1".parse().unwrap()).is_none());
        assert!(config.find_client("8.8.8.8".parse().unwrap()).is_none());
    }

    #[test]
    fn test_example_round_trip() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");

        Config::example().to_file(&path).unwrap();
        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.clients.len(), 2);
        assert_eq!(loaded.users[0].attributes["Session-Timeout"], "3600");
    }

    #[test]
    fn test_load_dictionary_with_extra_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("dictionary.local");
        fs::write(&path, "VENDOR 9999 Example\nVENDORATTR 9999 Example-Role 1 string\n").unwrap();

        let mut config = Config::default();
        config.dictionary_path = Some(path.to_string_lossy().into_owned());
        let dictionary = config.load_dictionary().unwrap();
        assert!(dictionary.attribute_type_by_name("Example-Role").is_some());
        assert!(dictionary.attribute_type_by_name("User-Name").is_some());
    }
}
