//! Connection lifecycle states.
//!
//! A connection moves through seven ordinal states. Transitions are
//! validated by [`ConnectionState::can_transition`]: state only moves
//! forward, `Closed` is reachable only from `Closing`, and nothing leaves
//! `Closed`. Illegal moves are rejected instead of silently permitted.

use std::fmt;

/// Lifecycle state of a single connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ConnectionState {
    /// The connection object exists but processing has not started.
    Unknown = 0,
    /// The upgrade request arrived and version checks are running.
    Opening = 1,
    /// Waiting for upgrade-head bytes that were split off the request.
    Waiting = 2,
    /// The handshake response is being negotiated and written.
    Handshaking = 3,
    /// Handshake complete; frames flow in both directions.
    Connected = 4,
    /// Teardown has begun.
    Closing = 5,
    /// The socket is torn down. Terminal.
    Closed = 6,
}

impl ConnectionState {
    /// Ordinal value of this state, matching the legacy numbering.
    #[must_use]
    pub fn ordinal(self) -> u8 {
        self as u8
    }

    /// Whether a move from this state to `next` is legal.
    ///
    /// Legal moves are strictly forward, except that `Closed` may only be
    /// entered from `Closing` and never left.
    #[must_use]
    pub fn can_transition(self, next: Self) -> bool {
        match (self, next) {
            (Self::Closed, _) | (_, Self::Unknown) => false,
            (prev, Self::Closed) => prev == Self::Closing,
            (prev, next) => next.ordinal() > prev.ordinal(),
        }
    }

    /// Whether this state is the terminal one.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self == Self::Closed
    }

    /// Human-readable label (the legacy state-table names).
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Opening => "opening",
            Self::Waiting => "waiting",
            Self::Handshaking => "handshaking",
            Self::Connected => "connected",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.label(), self.ordinal())
    }
}
