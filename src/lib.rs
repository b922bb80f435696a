//! Umbrella package for the RADIUS AAA workspace.
//!
//! Hosts the end-to-end tests and benches; the functionality lives in
//! [`radius_proto`] (dictionary, codec, PAP/CHAP/MS-CHAP/MPPE) and
//! [`radius_server`] (server, client and proxy engines).

pub use radius_proto as proto;
pub use radius_server as server;
