//! Server facade and built-in TCP transport.
//!
//! The server filters inbound upgrades, constructs connections, and exposes
//! targeted send and broadcast over the registry. Two intake paths exist:
//! the built-in listener (bind, accept, read the request head) and
//! [`Server::handle_upgrade`] for a host HTTP layer that already parsed the
//! request and hands over the socket together with any upgrade-head bytes.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use hixie_core::{head_terminator, UpgradeError, UpgradeRequest};

use crate::config::ServerConfig;
use crate::connection::Connection;
use crate::error::ServerError;
use crate::event::{EventReceiver, EventSender, ServerEvent};
use crate::registry::{ConnectionId, Registry};
use crate::shutdown::ShutdownSignal;

/// The WebSocket server engine.
///
/// # Example
///
/// ```rust,ignore
/// use hixie_server::{Server, ServerConfig, ServerEvent};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let server = Server::new(ServerConfig::default());
///     let mut events = server.events().expect("events taken once");
///     server.listen("0.0.0.0:8000").await?;
///
///     while let Some(event) = events.recv().await {
///         if let ServerEvent::Message { id, text } = event {
///             server.send(&id, &format!("echo: {text}")).await;
///         }
///     }
///     Ok(())
/// }
/// ```
pub struct Server {
    config: ServerConfig,
    registry: Arc<Registry>,
    events: EventSender,
    receiver: parking_lot::Mutex<Option<EventReceiver>>,
    shutdown: ShutdownSignal,
    local_addr: parking_lot::Mutex<Option<SocketAddr>>,
}

impl Server {
    /// Create a server over a merged configuration.
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        let (events, receiver) = mpsc::unbounded_channel();
        Self {
            config,
            registry: Arc::new(Registry::new()),
            events,
            receiver: parking_lot::Mutex::new(Some(receiver)),
            shutdown: ShutdownSignal::new(),
            local_addr: parking_lot::Mutex::new(None),
        }
    }

    /// The merged configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The connection registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Address the built-in listener is bound to, once listening.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    /// Take the event stream. Yields `Some` exactly once.
    #[must_use]
    pub fn events(&self) -> Option<EventReceiver> {
        self.receiver.lock().take()
    }

    /// Apply an extension function against the merged configuration.
    ///
    /// Plugins run before `listen`; connections constructed earlier keep the
    /// configuration they were built with.
    pub fn use_plugin(&mut self, plugin: impl FnOnce(ServerConfig) -> ServerConfig) {
        self.config = plugin(std::mem::take(&mut self.config));
    }

    /// Bind the built-in TCP transport and start accepting upgrades.
    ///
    /// Returns the bound address; port 0 is supported and resolves to an
    /// ephemeral port.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] when the address cannot be bound and
    /// [`ServerError::AlreadyListening`] on a second call.
    pub async fn listen(&self, addr: &str) -> Result<SocketAddr, ServerError> {
        if self.local_addr().is_some() {
            return Err(ServerError::AlreadyListening);
        }

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::bind(addr, source))?;
        let local = listener
            .local_addr()
            .map_err(|source| ServerError::bind(addr, source))?;
        *self.local_addr.lock() = Some(local);
        info!(%local, "listening");

        tokio::spawn(accept_loop(
            listener,
            self.config.clone(),
            Arc::clone(&self.registry),
            self.events.clone(),
            self.shutdown.clone(),
        ));
        Ok(local)
    }

    /// Stop the accept loop and close every registered connection.
    pub async fn close(&self) {
        self.shutdown.trigger();
        for connection in self.registry.snapshot() {
            connection.close().await;
        }
    }

    /// Send a text message to one connection.
    ///
    /// Returns `false` when the id is absent or the connection is not in
    /// the connected state; never an error.
    pub async fn send(&self, id: &ConnectionId, data: &str) -> bool {
        match self.registry.find(id) {
            Some(connection) => connection.write(data).await,
            None => false,
        }
    }

    /// Send a text message to every connected client, in attachment order.
    ///
    /// Iterates a snapshot, so handlers reacting to the writes may close
    /// connections without disturbing the traversal.
    pub async fn broadcast(&self, data: &str) {
        for connection in self.registry.snapshot() {
            let _ = connection.write(data).await;
        }
    }

    /// Take over a socket whose request a host HTTP layer already parsed.
    ///
    /// Runs the same upgrade filter and connection construction as the
    /// built-in transport. A request that is not a WebSocket upgrade drops
    /// the socket and returns `None` with no event emitted.
    pub fn handle_upgrade(
        &self,
        stream: TcpStream,
        request: UpgradeRequest,
        upgrade_head: Bytes,
    ) -> Option<ConnectionId> {
        if !request.is_websocket_upgrade() {
            debug!(path = request.path(), "non-upgrade request dropped");
            return None;
        }
        let (connection, driver) = Connection::open(
            stream,
            request,
            upgrade_head,
            &self.config,
            Arc::clone(&self.registry),
            self.events.clone(),
        );
        let id = connection.id().clone();
        driver.spawn();
        Some(id)
    }
}

/// Accept sockets until shutdown, handing each to its own intake task.
async fn accept_loop(
    listener: TcpListener,
    config: ServerConfig,
    registry: Arc<Registry>,
    events: EventSender,
    shutdown: ShutdownSignal,
) {
    loop {
        tokio::select! {
            result = listener.accept() => match result {
                Ok((stream, peer)) => {
                    tokio::spawn(intake(
                        stream,
                        peer,
                        config.clone(),
                        Arc::clone(&registry),
                        events.clone(),
                    ));
                }
                Err(error) => {
                    warn!(%error, "accept failed");
                }
            },
            _ = shutdown.recv() => {
                debug!("accept loop stopping");
                return;
            }
        }
    }
}

/// Read and parse one request head, then filter and construct.
async fn intake(
    mut stream: TcpStream,
    peer: SocketAddr,
    config: ServerConfig,
    registry: Arc<Registry>,
    events: EventSender,
) {
    let (head, upgrade_head) = match read_head(&mut stream, config.max_head_bytes()).await {
        Ok(parts) => parts,
        Err(error) => {
            debug!(%peer, %error, "request head intake failed");
            let _ = events.send(ServerEvent::ClientError(error));
            return;
        }
    };

    let request = match UpgradeRequest::parse(&head, peer.port()) {
        Ok(request) => request,
        Err(error) => {
            debug!(%peer, %error, "malformed request head");
            let _ = events.send(ServerEvent::ClientError(error));
            return;
        }
    };

    // Anything that is not a websocket upgrade is dropped silently: no
    // connection, no event, socket destroyed.
    if !request.is_websocket_upgrade() {
        debug!(%peer, method = %request.method(), path = request.path(), "non-upgrade request dropped");
        return;
    }

    let (_, driver) = Connection::open(stream, request, upgrade_head, &config, registry, events);
    driver.spawn();
}

/// Read until the head terminator, splitting off the upgrade head.
///
/// Bytes after `\r\n\r\n` in the same reads are the upgrade head: draft76
/// key material and possibly the start of the first frame.
async fn read_head(
    stream: &mut TcpStream,
    limit: usize,
) -> Result<(Bytes, Bytes), UpgradeError> {
    let mut buf = BytesMut::with_capacity(1024);
    loop {
        if let Some(end) = head_terminator(&buf) {
            let mut head = buf.freeze();
            let upgrade_head = head.split_off(end);
            return Ok((head, upgrade_head));
        }
        if buf.len() >= limit {
            return Err(UpgradeError::HeadTooLarge { limit });
        }
        let read = stream.read_buf(&mut buf).await?;
        if read == 0 {
            return Err(UpgradeError::TruncatedHead);
        }
    }
}
