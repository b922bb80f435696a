//! Request policy: the seam between the server engine and local decisions
//!
//! The server engine owns sockets, decoding and duplicate suppression; a
//! [`RequestHandler`] decides which peers are clients, what to answer and
//! which requests to proxy. [`LocalHandler`] is the built-in policy driven
//! by the JSON configuration.

use crate::accounting::{AccountingRecord, AccountingSink};
use crate::config::{Config, ConfigError};
use crate::server::ServerError;
use async_trait::async_trait;
use ipnetwork::IpNetwork;
use radius_proto::attributes::microsoft;
use radius_proto::chap::verify_chap_packet;
use radius_proto::mppe::mppe_key_attributes;
use radius_proto::mschap::{mschap_v2_success, verify_mschap_v1, verify_mschap_v2};
use radius_proto::{
    Attribute, AttributeCode, Code, Dictionary, MppeKeys, MsChapV1Response, MsChapV2Response,
    Packet, SaltGenerator, verify_user_password,
};
use std::collections::HashMap;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A RADIUS peer: where it lives and the secret shared with it
#[derive(Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub address: SocketAddr,
    pub secret: Vec<u8>,
}

impl Endpoint {
    pub fn new(address: SocketAddr, secret: impl AsRef<[u8]>) -> Self {
        Endpoint {
            address,
            secret: secret.as_ref().to_vec(),
        }
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("address", &self.address)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Policy callbacks invoked by [`crate::RadiusServer`]
///
/// Returning `Ok(None)` from a request callback drops the request without
/// a reply; the client will retransmit.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// Shared secret for `peer`, or `None` when it is not a known client
    async fn shared_secret(&self, peer: SocketAddr, raw: &[u8]) -> Option<Vec<u8>>;

    /// Answer an Access-Request received on the authentication port
    async fn access_request(&self, request: &Packet, peer: SocketAddr) -> Result<Option<Packet>, ServerError>;

    /// Answer an Accounting-Request received on the accounting port
    async fn accounting_request(&self, request: &Packet, peer: SocketAddr) -> Result<Option<Packet>, ServerError>;

    /// Upstream server to forward `request` to instead of answering it
    async fn proxy_target(&self, _request: &Packet, _peer: SocketAddr) -> Option<Endpoint> {
        None
    }
}

/// Source of plaintext credentials
///
/// CHAP and MS-CHAP verification need the cleartext password on the server
/// side, so stores hand it out rather than a verifier.
pub trait CredentialStore: Send + Sync {
    fn credential(&self, username: &str) -> Option<String>;
}

impl CredentialStore for HashMap<String, String> {
    fn credential(&self, username: &str) -> Option<String> {
        self.get(username).cloned()
    }
}

/// Built-in policy: configured clients, users, realms and accounting sink
///
/// Verifies PAP, CHAP, MS-CHAPv1 and MS-CHAPv2. A successful MS-CHAPv2
/// exchange is answered with MS-CHAP2-Success and salted MPPE keys.
pub struct LocalHandler {
    clients: Vec<(IpNetwork, Vec<u8>)>,
    credentials: Arc<dyn CredentialStore>,
    reply_attributes: HashMap<String, Vec<Attribute>>,
    realms: HashMap<String, Endpoint>,
    accounting: Option<Arc<dyn AccountingSink>>,
    salts: SaltGenerator,
}

enum AuthMethod {
    Pap,
    Chap,
    MsChapV1,
    MsChapV2,
}

impl AuthMethod {
    fn name(&self) -> &'static str {
        match self {
            AuthMethod::Pap => "PAP",
            AuthMethod::Chap => "CHAP",
            AuthMethod::MsChapV1 => "MS-CHAPv1",
            AuthMethod::MsChapV2 => "MS-CHAPv2",
        }
    }
}

/// Outcome of one credential check, with the attributes it contributes
enum Verdict {
    Accept(Vec<Attribute>),
    Reject(Vec<Attribute>),
}

/// Encryption-Allowed
const MPPE_POLICY_ALLOWED: u32 = 1;
/// RC4-40or128
const MPPE_TYPES_40_OR_128: u32 = 6;
const MPPE_KEY_LENGTH: usize = 16;
/// ERROR_AUTHENTICATION_FAILURE, no retry, MS-CHAP version 3
const MSCHAP_AUTH_FAILURE: &str = "E=691 R=0 V=3";

impl LocalHandler {
    pub fn new(credentials: Arc<dyn CredentialStore>) -> Self {
        LocalHandler {
            clients: Vec::new(),
            credentials,
            reply_attributes: HashMap::new(),
            realms: HashMap::new(),
            accounting: None,
            salts: SaltGenerator::new(),
        }
    }

    /// Clients, users, reply attributes and realms from `config`
    ///
    /// Reply attributes are parsed against `dictionary` up front so a bad
    /// name or value fails at startup instead of on the first Access-Accept.
    pub fn from_config(config: &Config, dictionary: &Dictionary) -> Result<Self, ConfigError> {
        let credentials: HashMap<String, String> = config
            .users
            .iter()
            .map(|user| (user.username.clone(), user.password.clone()))
            .collect();
        let mut handler = LocalHandler::new(Arc::new(credentials));

        for client in config.clients.iter().filter(|client| client.enabled) {
            handler.add_client(client.parse_network()?, &client.secret);
        }

        for user in &config.users {
            let mut names: Vec<&String> = user.attributes.keys().collect();
            names.sort();

            let mut attributes = Vec::with_capacity(names.len());
            for name in names {
                attributes.push(parse_reply_attribute(dictionary, name, &user.attributes[name])?);
            }
            if !attributes.is_empty() {
                handler.set_reply_attributes(&user.username, attributes);
            }
        }

        if let Some(proxy) = &config.proxy {
            for realm in &proxy.realms {
                handler.add_realm(&realm.realm, realm.endpoint()?);
            }
        }

        Ok(handler)
    }

    /// Accept requests from `network`, signed with `secret`
    ///
    /// Networks are matched in the order they were added.
    pub fn add_client(&mut self, network: IpNetwork, secret: impl AsRef<[u8]>) {
        self.clients.push((network, secret.as_ref().to_vec()));
    }

    /// Proxy `user@realm` requests to `upstream`; realms match case-insensitively
    pub fn add_realm(&mut self, realm: &str, upstream: Endpoint) {
        self.realms.insert(realm.to_ascii_lowercase(), upstream);
    }

    /// Attributes added to every Access-Accept for `username`
    pub fn set_reply_attributes(&mut self, username: &str, attributes: Vec<Attribute>) {
        self.reply_attributes.insert(username.to_string(), attributes);
    }

    pub fn set_accounting_sink(&mut self, sink: Arc<dyn AccountingSink>) {
        self.accounting = Some(sink);
    }

    fn client_secret(&self, ip: IpAddr) -> Option<&[u8]> {
        self.clients
            .iter()
            .find(|(network, _)| network.contains(ip))
            .map(|(_, secret)| secret.as_slice())
    }

    fn auth_method(request: &Packet) -> Option<AuthMethod> {
        let has_ms = |code| request.find_vendor_attribute(microsoft::VENDOR_ID, code).is_some();

        if has_ms(microsoft::MS_CHAP2_RESPONSE) {
            Some(AuthMethod::MsChapV2)
        } else if has_ms(microsoft::MS_CHAP_RESPONSE) {
            Some(AuthMethod::MsChapV1)
        } else if request.find_attribute(AttributeCode::ChapPassword.as_u8()).is_some() {
            Some(AuthMethod::Chap)
        } else if request.find_attribute(AttributeCode::UserPassword.as_u8()).is_some() {
            Some(AuthMethod::Pap)
        } else {
            None
        }
    }

    fn verify(
        &self,
        method: &AuthMethod,
        request: &Packet,
        username: &str,
        password: &str,
        secret: &[u8],
    ) -> Result<Verdict, ServerError> {
        match method {
            AuthMethod::Pap => {
                let Some(hidden) = request.find_attribute(AttributeCode::UserPassword.as_u8()) else {
                    return Ok(Verdict::Reject(Vec::new()));
                };
                if verify_user_password(&hidden.value, password, secret, &request.authenticator) {
                    Ok(Verdict::Accept(Vec::new()))
                } else {
                    Ok(Verdict::Reject(Vec::new()))
                }
            }
            AuthMethod::Chap => match verify_chap_packet(request, password) {
                Ok(true) => Ok(Verdict::Accept(Vec::new())),
                Ok(false) => Ok(Verdict::Reject(Vec::new())),
                Err(e) => {
                    warn!(username = %username, error = %e, "Invalid CHAP-Password attribute");
                    Ok(Verdict::Reject(Vec::new()))
                }
            },
            AuthMethod::MsChapV1 => self.verify_mschap_v1(request, username, password),
            AuthMethod::MsChapV2 => self.verify_mschap_v2(request, username, password, secret),
        }
    }

    fn ms_challenge(request: &Packet) -> Option<Vec<u8>> {
        request
            .find_vendor_attribute(microsoft::VENDOR_ID, microsoft::MS_CHAP_CHALLENGE)
            .map(|attr| attr.value)
    }

    fn mschap_error(ident: u8) -> Result<Attribute, ServerError> {
        let mut value = vec![ident];
        value.extend_from_slice(MSCHAP_AUTH_FAILURE.as_bytes());
        Ok(Attribute::vendor(microsoft::VENDOR_ID, microsoft::MS_CHAP_ERROR, value)?)
    }

    fn verify_mschap_v1(&self, request: &Packet, username: &str, password: &str) -> Result<Verdict, ServerError> {
        let challenge: Option<[u8; 8]> = Self::ms_challenge(request).and_then(|c| c.try_into().ok());
        let response = request
            .find_vendor_attribute(microsoft::VENDOR_ID, microsoft::MS_CHAP_RESPONSE)
            .and_then(|attr| MsChapV1Response::from_bytes(&attr.value).ok());
        let (Some(challenge), Some(response)) = (challenge, response) else {
            warn!(username = %username, "Malformed MS-CHAP-Challenge or MS-CHAP-Response");
            return Ok(Verdict::Reject(Vec::new()));
        };

        if verify_mschap_v1(&response, password, &challenge)? {
            Ok(Verdict::Accept(Vec::new()))
        } else {
            Ok(Verdict::Reject(vec![Self::mschap_error(response.ident)?]))
        }
    }

    fn verify_mschap_v2(
        &self,
        request: &Packet,
        username: &str,
        password: &str,
        secret: &[u8],
    ) -> Result<Verdict, ServerError> {
        let challenge: Option<[u8; 16]> = Self::ms_challenge(request).and_then(|c| c.try_into().ok());
        let response = request
            .find_vendor_attribute(microsoft::VENDOR_ID, microsoft::MS_CHAP2_RESPONSE)
            .and_then(|attr| MsChapV2Response::from_bytes(&attr.value).ok());
        let (Some(challenge), Some(response)) = (challenge, response) else {
            warn!(username = %username, "Malformed MS-CHAP-Challenge or MS-CHAP2-Response");
            return Ok(Verdict::Reject(Vec::new()));
        };

        let Some(authenticator_response) = verify_mschap_v2(&response, username, password, &challenge)? else {
            return Ok(Verdict::Reject(vec![Self::mschap_error(response.ident)?]));
        };

        let mut attributes = vec![Attribute::vendor(
            microsoft::VENDOR_ID,
            microsoft::MS_CHAP2_SUCCESS,
            mschap_v2_success(response.ident, &authenticator_response),
        )?];

        let keys = MppeKeys::derive(password, &response.nt_response, MPPE_KEY_LENGTH)?;
        attributes.extend(mppe_key_attributes(&keys, secret, &request.authenticator, &self.salts)?);
        attributes.push(Attribute::vendor(
            microsoft::VENDOR_ID,
            microsoft::MS_MPPE_ENCRYPTION_POLICY,
            MPPE_POLICY_ALLOWED.to_be_bytes().to_vec(),
        )?);
        attributes.push(Attribute::vendor(
            microsoft::VENDOR_ID,
            microsoft::MS_MPPE_ENCRYPTION_TYPES,
            MPPE_TYPES_40_OR_128.to_be_bytes().to_vec(),
        )?);

        Ok(Verdict::Accept(attributes))
    }
}

fn parse_reply_attribute(dictionary: &Dictionary, name: &str, text: &str) -> Result<Attribute, ConfigError> {
    let attribute_type = dictionary
        .attribute_type_by_name(name)
        .ok_or_else(|| ConfigError::Invalid(format!("Unknown reply attribute: {}", name)))?;
    attribute_type
        .kind
        .parse_text(text, attribute_type.enumeration.as_ref())
        .and_then(|value| Attribute::from_value(attribute_type.vendor_id, attribute_type.code, &value))
        .map_err(|e| ConfigError::Invalid(format!("Invalid value for {}: {}", name, e)))
}

#[async_trait]
impl RequestHandler for LocalHandler {
    async fn shared_secret(&self, peer: SocketAddr, _raw: &[u8]) -> Option<Vec<u8>> {
        self.client_secret(peer.ip()).map(<[u8]>::to_vec)
    }

    async fn access_request(&self, request: &Packet, peer: SocketAddr) -> Result<Option<Packet>, ServerError> {
        let Some(secret) = self.client_secret(peer.ip()) else {
            return Ok(None);
        };

        let Some(username) = request.user_name() else {
            warn!(client_addr = %peer, request_id = request.identifier, "Access-Request without User-Name");
            return Ok(Some(Packet::response_to(request, Code::AccessReject)));
        };

        let Some(method) = Self::auth_method(request) else {
            warn!(username = %username, client_addr = %peer, "No supported credentials in Access-Request");
            return Ok(Some(Packet::response_to(request, Code::AccessReject)));
        };

        let verdict = match self.credentials.credential(&username) {
            Some(password) => self.verify(&method, request, &username, &password, secret)?,
            None => {
                debug!(username = %username, "Unknown user");
                Verdict::Reject(Vec::new())
            }
        };

        match verdict {
            Verdict::Accept(attributes) => {
                info!(
                    username = %username,
                    method = method.name(),
                    client_addr = %peer,
                    request_id = request.identifier,
                    "Authentication successful"
                );
                let mut response = Packet::response_to(request, Code::AccessAccept);
                if let Some(reply) = self.reply_attributes.get(&username) {
                    response.attributes.extend(reply.iter().cloned());
                }
                for attribute in attributes {
                    response.add_vendor_attribute(attribute)?;
                }
                Ok(Some(response))
            }
            Verdict::Reject(attributes) => {
                warn!(
                    username = %username,
                    method = method.name(),
                    client_addr = %peer,
                    request_id = request.identifier,
                    "Authentication failed"
                );
                let mut response = Packet::response_to(request, Code::AccessReject);
                for attribute in attributes {
                    response.add_vendor_attribute(attribute)?;
                }
                Ok(Some(response))
            }
        }
    }

    async fn accounting_request(&self, request: &Packet, peer: SocketAddr) -> Result<Option<Packet>, ServerError> {
        let Some(sink) = &self.accounting else {
            debug!(client_addr = %peer, "No accounting sink configured, not acknowledging");
            return Ok(None);
        };

        let record = match AccountingRecord::from_packet(request, peer) {
            Ok(record) => record,
            Err(e) => {
                warn!(client_addr = %peer, request_id = request.identifier, error = %e, "Malformed Accounting-Request");
                return Ok(None);
            }
        };

        if let Err(e) = sink.record(&record).await {
            warn!(client_addr = %peer, error = %e, "Failed to store accounting record");
            return Ok(None);
        }

        debug!(
            client_addr = %peer,
            event = ?record.event,
            session_id = record.session_id.as_deref().unwrap_or("-"),
            "Accounting record stored"
        );
        Ok(Some(Packet::response_to(request, Code::AccountingResponse)))
    }

    async fn proxy_target(&self, request: &Packet, _peer: SocketAddr) -> Option<Endpoint> {
        let username = request.user_name()?;
        let (_, realm) = username.rsplit_once('@')?;
        self.realms.get(&realm.to_ascii_lowercase()).cloned()
    }
}
