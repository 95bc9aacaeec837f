//! # hixie
//!
//! Embedded WebSocket server for the legacy pre-standard drafts
//! (hixie-75/hixie-76): the handshake negotiation both revisions used before
//! RFC 6455, the `0x00`/`0xFF` text framing, a per-connection lifecycle
//! state machine, and an ordered connection registry with targeted send and
//! broadcast.
//!
//! The protocol engine (`hixie-core`) is sans-I/O and testable on byte
//! slices; the runtime layer (`hixie-server`) drives it over tokio.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use hixie::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::new(ServerConfig::builder().build());
//!     let mut events = server.events().expect("events taken once");
//!     server.listen("0.0.0.0:8000").await?;
//!
//!     while let Some(event) = events.recv().await {
//!         match event {
//!             ServerEvent::Connection(id) => println!("open: {id}"),
//!             ServerEvent::Message { id, text } => {
//!                 server.broadcast(&format!("{id}: {text}")).await;
//!             }
//!             ServerEvent::Close(id) => println!("closed: {id}"),
//!             _ => {}
//!         }
//!     }
//!     Ok(())
//! }
//! ```

// Re-export the protocol engine
pub use hixie_core as core;

// Re-export the runtime layer
pub use hixie_server as server;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust,ignore
/// use hixie::prelude::*;
/// ```
pub mod prelude {
    pub use hixie_core::{
        ConnectionState, FrameParser, Handshake, HandshakeError, HandshakeOptions, Negotiate,
        OriginPolicy, ProtocolVersion, UpgradeError, UpgradeRequest, VersionPolicy,
    };

    pub use hixie_server::{
        Connection, ConnectionId, Datastore, EventReceiver, MemStore, Registry, Server,
        ServerConfig, ServerError, ServerEvent, Session,
    };
}
