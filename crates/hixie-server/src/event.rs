//! Server notification surface.
//!
//! Every application-visible occurrence travels as a [`ServerEvent`] on one
//! unbounded channel handed out by `Server::events`. Per-connection ordering
//! follows byte arrival order; there is no ordering guarantee across
//! connections. Steady-state failures never propagate as errors to
//! `send`/`broadcast` callers; they surface here instead.

use hixie_core::{HandshakeError, UpgradeError};
use tokio::sync::mpsc;

use crate::registry::ConnectionId;

/// Sender half shared by the server and every connection driver.
pub(crate) type EventSender = mpsc::UnboundedSender<ServerEvent>;

/// Receiver half handed to the application.
pub type EventReceiver = mpsc::UnboundedReceiver<ServerEvent>;

/// A notification from the server engine.
#[derive(Debug)]
pub enum ServerEvent {
    /// A connection finished its handshake and entered the connected state.
    Connection(ConnectionId),

    /// The frame parser completed a text message.
    Message {
        /// Connection the message arrived on.
        id: ConnectionId,
        /// Decoded payload.
        text: String,
    },

    /// A connection reached the terminal state. Fires exactly once per
    /// connection, including rejected ones (after their [`Rejected`] event).
    ///
    /// [`Rejected`]: ServerEvent::Rejected
    Close(ConnectionId),

    /// A handshake-phase failure terminated the connection before it ever
    /// became visible as connected.
    Rejected {
        /// Connection that was rejected.
        id: ConnectionId,
        /// Why, in the legacy reject wording.
        reason: HandshakeError,
    },

    /// A socket fault other than a broken pipe. The connection is force
    /// closed right after this event.
    Error {
        /// Connection the fault occurred on.
        id: ConnectionId,
        /// The underlying OS error.
        error: std::io::Error,
    },

    /// An inbound socket failed before a connection was constructed: the
    /// request head was oversized, truncated, or unparseable.
    ClientError(UpgradeError),

    /// The configured idle deadline elapsed with no bytes arriving.
    /// Notification only; the connection stays open and keeps reading.
    Timeout(ConnectionId),
}

impl ServerEvent {
    /// The connection this event concerns, when it concerns one.
    #[must_use]
    pub fn connection_id(&self) -> Option<&ConnectionId> {
        match self {
            Self::Connection(id)
            | Self::Close(id)
            | Self::Timeout(id)
            | Self::Message { id, .. }
            | Self::Rejected { id, .. }
            | Self::Error { id, .. } => Some(id),
            Self::ClientError(_) => None,
        }
    }
}
