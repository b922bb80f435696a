use crate::cache::RequestCache;
use crate::config::ConfigError;
use crate::handler::{Endpoint, RequestHandler};
use crate::proxy::{ProxyEngine, ProxyError};
use radius_proto::{
    AccountingError, AttributeCode, AttributeError, Code, CryptoError, Dictionary, DictionaryError,
    Packet, PacketError,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Packet error: {0}")]
    Packet(#[from] PacketError),
    #[error("Attribute error: {0}")]
    Attribute(#[from] AttributeError),
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),
    #[error("Proxy error: {0}")]
    Proxy(#[from] ProxyError),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Dictionary error: {0}")]
    Dictionary(#[from] DictionaryError),
    #[error("Accounting error: {0}")]
    Accounting(#[from] AccountingError),
    #[error("Handler error: {0}")]
    Handler(String),
}

/// Runtime settings for [`RadiusServer`]
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub auth_addr: SocketAddr,
    /// Accounting listener; `None` disables it
    pub acct_addr: Option<SocketAddr>,
    /// Socket for upstream replies; `None` disables proxying
    pub proxy_addr: Option<SocketAddr>,
    pub proxy_ttl: Duration,
    pub proxy_max_outstanding: usize,
    pub duplicate_window: Duration,
    pub max_workers: usize,
    /// Deadline for one handler callback
    pub request_timeout: Duration,
}

impl ServerConfig {
    pub fn new(auth_addr: SocketAddr) -> Self {
        ServerConfig {
            auth_addr,
            acct_addr: None,
            proxy_addr: None,
            proxy_ttl: Duration::from_secs(30),
            proxy_max_outstanding: 1000,
            duplicate_window: Duration::from_secs(10),
            max_workers: 64,
            request_timeout: Duration::from_secs(5),
        }
    }
}

/// Which listener a datagram arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PortRole {
    Auth,
    Acct,
}

impl PortRole {
    fn accepts(self, code: Code) -> bool {
        match self {
            PortRole::Auth => matches!(code, Code::AccessRequest | Code::StatusServer),
            PortRole::Acct => matches!(code, Code::AccountingRequest | Code::StatusServer),
        }
    }
}

/// Stops a running server; cheap to clone and hand to a signal task
#[derive(Clone)]
pub struct ShutdownHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.sender.borrow()
    }
}

/// State shared by every request task
struct Dispatcher {
    dictionary: Arc<Dictionary>,
    handler: Arc<dyn RequestHandler>,
    cache: RequestCache,
    proxy: Option<Arc<ProxyEngine>>,
    request_timeout: Duration,
}

/// Multi-port RADIUS server
///
/// Binds the authentication port, and optionally the accounting port and a
/// proxy socket for upstream replies. Each datagram is processed in its own
/// task, bounded by `max_workers`; policy decisions are delegated to the
/// [`RequestHandler`].
pub struct RadiusServer {
    dispatcher: Arc<Dispatcher>,
    auth_socket: Arc<UdpSocket>,
    acct_socket: Option<Arc<UdpSocket>>,
    workers: Arc<Semaphore>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl RadiusServer {
    /// Bind every configured socket
    ///
    /// Binding to port 0 is fine; the chosen ports are available through
    /// [`RadiusServer::auth_addr`] and friends.
    pub async fn bind(
        config: ServerConfig,
        dictionary: Arc<Dictionary>,
        handler: Arc<dyn RequestHandler>,
    ) -> Result<Self, ServerError> {
        let auth_socket = Arc::new(UdpSocket::bind(config.auth_addr).await?);
        let auth_addr = auth_socket.local_addr()?;
        info!(address = %auth_addr, "Authentication listener bound");

        let acct_socket = match config.acct_addr {
            Some(addr) => {
                let socket = Arc::new(UdpSocket::bind(addr).await?);
                info!(address = %socket.local_addr()?, "Accounting listener bound");
                Some(socket)
            }
            None => None,
        };

        let proxy = match config.proxy_addr {
            Some(addr) => {
                let socket = Arc::new(UdpSocket::bind(addr).await?);
                info!(address = %socket.local_addr()?, "Proxy listener bound");

                let mut reply_sockets = HashMap::new();
                reply_sockets.insert(auth_addr.port(), Arc::clone(&auth_socket));
                if let Some(acct) = &acct_socket {
                    reply_sockets.insert(acct.local_addr()?.port(), Arc::clone(acct));
                }

                Some(Arc::new(ProxyEngine::new(
                    Arc::clone(&dictionary),
                    socket,
                    reply_sockets,
                    config.proxy_ttl,
                    config.proxy_max_outstanding,
                )))
            }
            None => None,
        };

        let (shutdown, _) = watch::channel(false);

        Ok(RadiusServer {
            dispatcher: Arc::new(Dispatcher {
                dictionary,
                handler,
                cache: RequestCache::new(config.duplicate_window),
                proxy,
                request_timeout: config.request_timeout,
            }),
            auth_socket,
            acct_socket,
            workers: Arc::new(Semaphore::new(config.max_workers.max(1))),
            shutdown: Arc::new(shutdown),
        })
    }

    pub fn auth_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.auth_socket.local_addr()?)
    }

    pub fn acct_addr(&self) -> Result<Option<SocketAddr>, ServerError> {
        self.acct_socket
            .as_ref()
            .map(|socket| socket.local_addr())
            .transpose()
            .map_err(ServerError::from)
    }

    pub fn proxy_addr(&self) -> Result<Option<SocketAddr>, ServerError> {
        match &self.dispatcher.proxy {
            Some(engine) => Ok(Some(engine.local_addr()?)),
            None => Ok(None),
        }
    }

    pub fn proxy(&self) -> Option<&Arc<ProxyEngine>> {
        self.dispatcher.proxy.as_ref()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            sender: Arc::clone(&self.shutdown),
        }
    }

    /// Serve until shutdown is requested
    ///
    /// Requests already being processed when shutdown is signalled run to
    /// completion in their own tasks.
    pub async fn run(&self) -> Result<(), ServerError> {
        let mut listeners = JoinSet::new();

        listeners.spawn(listen(
            Arc::clone(&self.auth_socket),
            PortRole::Auth,
            Arc::clone(&self.dispatcher),
            Arc::clone(&self.workers),
            self.shutdown.subscribe(),
        ));
        if let Some(socket) = &self.acct_socket {
            listeners.spawn(listen(
                Arc::clone(socket),
                PortRole::Acct,
                Arc::clone(&self.dispatcher),
                Arc::clone(&self.workers),
                self.shutdown.subscribe(),
            ));
        }
        if let Some(engine) = &self.dispatcher.proxy {
            listeners.spawn(listen_proxy(
                Arc::clone(engine),
                Arc::clone(&self.workers),
                self.shutdown.subscribe(),
            ));
        }

        while let Some(result) = listeners.join_next().await {
            if let Err(e) = result {
                warn!(error = %e, "Listener task failed");
            }
        }

        info!("RADIUS server stopped");
        Ok(())
    }
}

async fn listen(
    socket: Arc<UdpSocket>,
    role: PortRole,
    dispatcher: Arc<Dispatcher>,
    workers: Arc<Semaphore>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut buf = vec![0u8; Packet::MAX_PACKET_SIZE];

    loop {
        if *shutdown.borrow() {
            break;
        }

        let (len, peer) = tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            received = socket.recv_from(&mut buf) => match received {
                Ok(received) => received,
                Err(e) => {
                    warn!(role = ?role, error = %e, "Failed to receive datagram");
                    continue;
                }
            },
        };

        // Waiting for a free worker must not hold off shutdown.
        let permit = tokio::select! {
            _ = shutdown.changed() => break,
            permit = Arc::clone(&workers).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };
        let data = buf[..len].to_vec();
        let dispatcher = Arc::clone(&dispatcher);
        let socket = Arc::clone(&socket);

        tokio::spawn(async move {
            let _permit = permit;
            if let Err(e) = dispatcher.process(&data, peer, role, &socket).await {
                warn!(client_addr = %peer, error = %e, "Error handling request");
            }
        });
    }

    debug!(role = ?role, "Listener stopped");
}

async fn listen_proxy(engine: Arc<ProxyEngine>, workers: Arc<Semaphore>, mut shutdown: watch::Receiver<bool>) {
    let socket = engine.socket();
    let mut buf = vec![0u8; Packet::MAX_PACKET_SIZE];

    loop {
        if *shutdown.borrow() {
            break;
        }

        let (len, from) = tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            received = socket.recv_from(&mut buf) => match received {
                Ok(received) => received,
                Err(e) => {
                    warn!(error = %e, "Failed to receive upstream reply");
                    continue;
                }
            },
        };

        // Waiting for a free worker must not hold off shutdown.
        let permit = tokio::select! {
            _ = shutdown.changed() => break,
            permit = Arc::clone(&workers).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };
        let data = buf[..len].to_vec();
        let engine = Arc::clone(&engine);

        tokio::spawn(async move {
            let _permit = permit;
            match engine.handle_response(&data, from).await {
                Ok(()) => {}
                // Late duplicates are routine and already logged by the engine.
                Err(ProxyError::UnknownProxyState(_)) => {}
                Err(e) => warn!(upstream = %from, error = %e, "Failed to route upstream reply"),
            }
        });
    }

    debug!("Proxy listener stopped");
}

impl Dispatcher {
    async fn process(
        &self,
        data: &[u8],
        peer: SocketAddr,
        role: PortRole,
        socket: &UdpSocket,
    ) -> Result<(), ServerError> {
        let Some(secret) = self.handler.shared_secret(peer, data).await else {
            debug!(client_addr = %peer, "Dropped request from unknown client");
            return Ok(());
        };

        let request = match Packet::decode_request(data, &secret, &self.dictionary) {
            Ok(request) => request,
            Err(e) => {
                warn!(client_addr = %peer, error = %e, "Dropped malformed request");
                return Ok(());
            }
        };

        if !role.accepts(request.code) {
            warn!(
                packet_type = %request.code,
                client_addr = %peer,
                role = ?role,
                "Dropped request not valid on this port"
            );
            return Ok(());
        }

        if self.cache.is_duplicate(peer, request.identifier, &request.authenticator) {
            debug!(
                client_addr = %peer,
                request_id = request.identifier,
                "Dropped duplicate request"
            );
            return Ok(());
        }

        debug!(
            packet_type = %request.code,
            client_addr = %peer,
            request_id = request.identifier,
            "Received RADIUS packet"
        );

        // RFC 5997: answer Status-Server directly
        if request.code == Code::StatusServer {
            let code = match role {
                PortRole::Auth => Code::AccessAccept,
                PortRole::Acct => Code::AccountingResponse,
            };
            return self
                .respond(Packet::response_to(&request, code), &request, &secret, peer, socket)
                .await;
        }

        if let Some(engine) = &self.proxy
            && let Some(upstream) = self.handler.proxy_target(&request, peer).await
        {
            let arrival_port = socket.local_addr()?.port();
            engine
                .forward(&request, Endpoint::new(peer, &secret), upstream, arrival_port)
                .await?;
            return Ok(());
        }

        let handled = async {
            match role {
                PortRole::Auth => self.handler.access_request(&request, peer).await,
                PortRole::Acct => self.handler.accounting_request(&request, peer).await,
            }
        };
        let response = match tokio::time::timeout(self.request_timeout, handled).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(
                    client_addr = %peer,
                    request_id = request.identifier,
                    timeout_ms = self.request_timeout.as_millis() as u64,
                    "Request handler timed out"
                );
                return Ok(());
            }
        };

        match response {
            Some(response) => self.respond(response, &request, &secret, peer, socket).await,
            None => {
                debug!(
                    client_addr = %peer,
                    request_id = request.identifier,
                    "Handler produced no response"
                );
                Ok(())
            }
        }
    }

    async fn respond(
        &self,
        mut response: Packet,
        request: &Packet,
        secret: &[u8],
        peer: SocketAddr,
        socket: &UdpSocket,
    ) -> Result<(), ServerError> {
        response.identifier = request.identifier;

        // RFC 2865 Section 5.33
        let proxy_state = AttributeCode::ProxyState.as_u8();
        if response.find_attribute(proxy_state).is_none() {
            response
                .attributes
                .extend(request.find_all_attributes(proxy_state).into_iter().cloned());
        }

        let data = response.encode_response(secret, &request.authenticator)?;
        socket.send_to(&data, peer).await?;

        debug!(
            response_type = %response.code,
            client_addr = %peer,
            request_id = response.identifier,
            "Sent RADIUS response"
        );
        Ok(())
    }
}
