//! Per-socket connection driver.
//!
//! A [`Connection`] owns one socket's lifecycle: the version check, the
//! handshake, the read loop feeding the frame parser, and teardown. All
//! transitions go through the validated state table, which is what makes
//! `close` idempotent — a socket EOF racing an application `close` resolves
//! under the state lock, not by checking whether the socket still looks
//! writable.
//!
//! The write half sits behind an async mutex so the handshake response,
//! `write`, and broadcasts serialize; each frame is assembled in one buffer
//! and issued as a single write. The read half belongs to the driver task
//! alone, so bytes are parsed strictly in arrival order.

use std::fmt;
use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

use hixie_core::frame::{encode_text, is_closing_sequence, FrameParser, CLOSING_SEQUENCE};
use hixie_core::{
    ConnectionState, Handshake, HandshakeError, HandshakeOptions, Negotiate, ProtocolVersion,
    UpgradeRequest, VersionPolicy,
};

use crate::config::ServerConfig;
use crate::event::{EventSender, ServerEvent};
use crate::registry::{ConnectionId, Registry};
use crate::store::{Datastore, Session};

/// Read buffer size for the driver loop.
const READ_BUF_LEN: usize = 4096;

/// One live (or once-live) client connection.
pub struct Connection {
    id: ConnectionId,
    request: UpgradeRequest,
    version: ProtocolVersion,
    policy: VersionPolicy,
    options: HandshakeOptions,
    idle_timeout: Option<Duration>,
    datastore: Option<Arc<dyn Datastore>>,
    state: parking_lot::Mutex<ConnectionState>,
    writer: tokio::sync::Mutex<Option<OwnedWriteHalf>>,
    session: parking_lot::Mutex<Option<Arc<dyn Session>>>,
    registry: Arc<Registry>,
    events: EventSender,
}

impl Connection {
    /// Wrap an upgraded socket.
    ///
    /// The returned driver must be spawned for the connection to make
    /// progress; nothing has been validated or written yet.
    pub(crate) fn open(
        stream: TcpStream,
        request: UpgradeRequest,
        upgrade_head: Bytes,
        config: &ServerConfig,
        registry: Arc<Registry>,
        events: EventSender,
    ) -> (Arc<Self>, ConnectionDriver) {
        // Frames are tiny and latency-sensitive; never batch them.
        let _ = stream.set_nodelay(true);
        let (reader, writer) = stream.into_split();

        let connection = Arc::new(Self {
            id: Registry::create_id(request.remote_port()),
            version: request.version(),
            policy: config.version(),
            options: config.handshake_options(),
            idle_timeout: config.idle_timeout(),
            datastore: config.datastore().cloned(),
            state: parking_lot::Mutex::new(ConnectionState::Unknown),
            writer: tokio::sync::Mutex::new(Some(writer)),
            session: parking_lot::Mutex::new(None),
            registry,
            events,
            request,
        });

        let driver = ConnectionDriver {
            connection: Arc::clone(&connection),
            reader,
            upgrade_head,
        };
        (connection, driver)
    }

    /// Unique id of this connection.
    #[must_use]
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Draft revision the client negotiated.
    #[must_use]
    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// The upgrade request this connection was built from.
    #[must_use]
    pub fn request(&self) -> &UpgradeRequest {
        &self.request
    }

    /// The per-connection session, once the connection is established and a
    /// datastore is configured.
    #[must_use]
    pub fn session(&self) -> Option<Arc<dyn Session>> {
        self.session.lock().clone()
    }

    /// Frame and send a text message.
    ///
    /// Permitted only in the connected state. Returns `false` when the state
    /// forbids it or the socket rejected the write; the failure is logged
    /// and never propagated, and there is no retry.
    pub async fn write(&self, data: &str) -> bool {
        if self.state() != ConnectionState::Connected {
            debug!(id = %self.id, state = %self.state(), "write outside connected state dropped");
            return false;
        }
        self.write_raw(&encode_text(data)).await
    }

    /// Serialize a value as JSON and send it as one text message.
    pub async fn write_json<T: Serialize>(&self, value: &T) -> bool {
        match serde_json::to_string(value) {
            Ok(text) => self.write(&text).await,
            Err(error) => {
                debug!(id = %self.id, %error, "JSON serialization failed");
                false
            }
        }
    }

    /// Send a text message to every other connected client, in attachment
    /// order.
    pub async fn broadcast(&self, data: &str) {
        for other in self.registry.snapshot() {
            if other.id() == &self.id {
                continue;
            }
            let _ = other.write(data).await;
        }
    }

    /// Begin teardown.
    ///
    /// If the connection was established, the two-byte closing sequence is
    /// written first; then the socket is shut down and the terminal state is
    /// entered, detaching from the registry and emitting the close event.
    /// Idempotent: the state table admits a single entry into closing, so a
    /// second caller returns without touching the socket.
    pub async fn close(&self) {
        let prior = {
            let mut state = self.state.lock();
            let prior = *state;
            if !prior.can_transition(ConnectionState::Closing) {
                return;
            }
            *state = ConnectionState::Closing;
            prior
        };
        debug!(id = %self.id, from = %prior, "closing");

        {
            let mut writer = self.writer.lock().await;
            if let Some(mut half) = writer.take() {
                if prior == ConnectionState::Connected {
                    let _ = half.write_all(&CLOSING_SEQUENCE).await;
                }
                let _ = half.shutdown().await;
            }
        }

        if self.advance(ConnectionState::Closed) {
            self.registry.detach(&self.id);
            if let Some(session) = self.session.lock().take() {
                session.disconnect(&self.id);
            }
            let _ = self.events.send(ServerEvent::Close(self.id.clone()));
        }
    }

    /// Move to `next` if the state table allows it.
    fn advance(&self, next: ConnectionState) -> bool {
        let mut state = self.state.lock();
        if state.can_transition(next) {
            debug!(id = %self.id, from = %*state, to = %next, "state change");
            *state = next;
            true
        } else {
            debug!(id = %self.id, from = %*state, to = %next, "illegal state change rejected");
            false
        }
    }

    /// Write bytes to the socket, absorbing failure into a `false` return.
    async fn write_raw(&self, bytes: &[u8]) -> bool {
        let mut writer = self.writer.lock().await;
        let Some(half) = writer.as_mut() else {
            return false;
        };
        match half.write_all(bytes).await {
            Ok(()) => true,
            Err(error) => {
                debug!(id = %self.id, %error, "write failed");
                false
            }
        }
    }

    /// Terminate a handshake-phase failure: rejection event, then the
    /// ordinary close path (which skips the closing sequence because the
    /// connection never established).
    async fn reject(&self, reason: HandshakeError) {
        warn!(id = %self.id, %reason, "handshake rejected");
        let _ = self.events.send(ServerEvent::Rejected {
            id: self.id.clone(),
            reason,
        });
        self.close().await;
    }

    fn emit_messages(&self, messages: Vec<String>) {
        for text in messages {
            let _ = self.events.send(ServerEvent::Message {
                id: self.id.clone(),
                text,
            });
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("version", &self.version)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Owns the read half and runs the connection to completion.
#[must_use = "the driver must be spawned for the connection to make progress"]
pub(crate) struct ConnectionDriver {
    connection: Arc<Connection>,
    reader: OwnedReadHalf,
    upgrade_head: Bytes,
}

impl ConnectionDriver {
    /// Run the driver on its own task.
    pub(crate) fn spawn(self) {
        tokio::spawn(self.run());
    }

    /// Handshake, then the read loop, then teardown.
    async fn run(mut self) {
        let conn = Arc::clone(&self.connection);
        conn.advance(ConnectionState::Opening);

        if !conn.policy.accepts(conn.version) {
            conn.reject(HandshakeError::version_mismatch(conn.version)).await;
            return;
        }

        let (handshake, first_frame) = match Handshake::for_request(&conn.request, &self.upgrade_head)
        {
            Ok(pair) => pair,
            Err(reason) => {
                conn.reject(reason).await;
                return;
            }
        };

        conn.advance(ConnectionState::Handshaking);
        let response = match handshake.respond(&conn.request, &conn.options) {
            Ok(response) => response,
            Err(reason) => {
                conn.reject(reason).await;
                return;
            }
        };
        if !conn.write_raw(&response).await {
            // Client vanished mid-handshake.
            conn.close().await;
            return;
        }

        conn.advance(ConnectionState::Connected);
        conn.registry.attach(Arc::clone(&conn));
        if let Some(store) = conn.datastore.as_ref() {
            *conn.session.lock() = Some(store.create());
        }
        let _ = conn.events.send(ServerEvent::Connection(conn.id.clone()));
        debug!(id = %conn.id, version = %conn.version, "connection established");

        let mut parser = FrameParser::new();
        // Application bytes that rode in with the draft76 key material.
        conn.emit_messages(parser.feed(&first_frame));

        let mut buf = [0_u8; READ_BUF_LEN];
        loop {
            let result = if let Some(deadline) = conn.idle_timeout {
                match timeout(deadline, self.reader.read(&mut buf)).await {
                    Ok(result) => result,
                    Err(_) => {
                        // Notification only; the deadline never closes.
                        let _ = conn.events.send(ServerEvent::Timeout(conn.id.clone()));
                        continue;
                    }
                }
            } else {
                self.reader.read(&mut buf).await
            };

            match result {
                Ok(0) => {
                    debug!(id = %conn.id, "socket ended");
                    conn.close().await;
                    return;
                }
                Ok(n) => {
                    let chunk = &buf[..n];
                    if is_closing_sequence(chunk) {
                        debug!(id = %conn.id, "peer sent closing sequence");
                        conn.close().await;
                        return;
                    }
                    conn.emit_messages(parser.feed(chunk));
                }
                Err(error) if error.kind() == ErrorKind::BrokenPipe => {
                    // Absorbed: the peer is gone, closing is all that's left.
                    conn.close().await;
                    return;
                }
                Err(error) => {
                    warn!(id = %conn.id, %error, "socket error");
                    let _ = conn.events.send(ServerEvent::Error {
                        id: conn.id.clone(),
                        error,
                    });
                    conn.close().await;
                    return;
                }
            }
        }
    }
}
