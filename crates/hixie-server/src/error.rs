//! Server-level errors.
//!
//! These are the only errors that propagate to callers as `Result`s.
//! Everything that happens after a socket is accepted is absorbed locally
//! and surfaced through the event stream instead (see the event module).

use thiserror::Error;

/// Failures starting or running the built-in listener.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listen address could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested.
        addr: String,
        /// The underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// `listen` was called while the accept loop is already running.
    #[error("server is already listening")]
    AlreadyListening,
}

impl ServerError {
    /// Create a bind error for an address.
    pub fn bind(addr: impl Into<String>, source: std::io::Error) -> Self {
        Self::Bind {
            addr: addr.into(),
            source,
        }
    }
}
