//! # hixie-server
//!
//! Async runtime layer for the legacy hixie-75/hixie-76 WebSocket drafts,
//! on top of the sans-I/O engine in `hixie-core`:
//!
//! - [`Server`] — upgrade filtering, targeted [`send`](Server::send) and
//!   [`broadcast`](Server::broadcast), the built-in TCP transport, and the
//!   [`handle_upgrade`](Server::handle_upgrade) seam for host HTTP layers.
//! - [`Connection`] — one socket's state machine, handshake, and read loop.
//! - [`Registry`] — the insertion-ordered directory of live connections.
//! - [`ServerEvent`] — the notification surface; steady-state failures
//!   surface here, never as errors from `send`/`broadcast`.
//! - [`Datastore`]/[`Session`] — pluggable per-connection storage.
//!
//! One driver task per connection owns the read half, so frames for a
//! single connection are parsed strictly in arrival order; there is no
//! ordering guarantee across connections.

pub mod config;
pub mod connection;
pub mod error;
pub mod event;
pub mod registry;
pub mod server;
pub mod shutdown;
pub mod store;

pub use config::{ServerConfig, ServerConfigBuilder, DEFAULT_MAX_HEAD_BYTES};
pub use connection::Connection;
pub use error::ServerError;
pub use event::{EventReceiver, ServerEvent};
pub use registry::{ConnectionId, Registry};
pub use server::Server;
pub use shutdown::ShutdownSignal;
pub use store::{Datastore, MemStore, Session};
