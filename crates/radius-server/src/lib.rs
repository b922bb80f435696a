//! RADIUS server, client and proxy engines
//!
//! Built on the `radius-proto` codec. The server owns the sockets, decoding,
//! duplicate suppression and proxy correlation; what to answer is decided
//! by a [`RequestHandler`]. [`LocalHandler`] is the built-in policy driven by
//! the JSON [`Config`].
//!
//! # Example
//!
//! ```rust,no_run
//! use radius_server::{Config, LocalHandler, RadiusServer};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::example();
//!     let dictionary = Arc::new(config.load_dictionary()?);
//!     let handler = LocalHandler::from_config(&config, &dictionary)?;
//!
//!     let server = RadiusServer::bind(config.server_config()?, dictionary, Arc::new(handler)).await?;
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod accounting;
pub mod cache;
pub mod client;
pub mod config;
pub mod handler;
pub mod proxy;
pub mod server;

pub use accounting::{
    AccountingEvent, AccountingRecord, AccountingSink, FileAccountingSink, MemoryAccountingSink,
};
pub use cache::RequestCache;
pub use client::{ClientConfig, ClientError, RadiusClient};
pub use config::{Client, Config, ConfigError, User};
pub use handler::{CredentialStore, Endpoint, LocalHandler, RequestHandler};
pub use proxy::{ProxyConfig, ProxyEngine, ProxyError, RealmConfig};
pub use server::{RadiusServer, ServerConfig, ServerError, ShutdownHandle};
