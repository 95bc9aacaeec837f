//! Ordered directory of live connections.
//!
//! Broadcast walks connections in attachment order, so the registry is an
//! insertion-ordered `IndexMap` behind an `RwLock`: O(1) append,
//! deterministic iteration, order-preserving removal. Detach is O(n), which
//! is acceptable because it runs at socket-teardown rate, not per message.
//!
//! The registry tracks connections, it does not own their lifetime; it hands
//! out [`Arc`] clones freely.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::connection::Connection;

/// Per-process monotonic counter feeding [`Registry::create_id`].
static NEXT_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Unique identifier of a connection.
///
/// Derived from the OS process id, the remote TCP port, and a per-process
/// monotonic counter: unique for the process lifetime without cross-process
/// coordination, even across rapid reconnects reusing the same port.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Wrap an already-derived id, e.g. one read back from a log line.
    #[must_use]
    pub fn from_raw(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Process-wide ordered directory of live connections.
#[derive(Debug, Default)]
pub struct Registry {
    connections: RwLock<IndexMap<ConnectionId, Arc<Connection>>>,
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive a fresh connection id for a socket's remote port.
    #[must_use]
    pub fn create_id(remote_port: u16) -> ConnectionId {
        let sequence = NEXT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        ConnectionId(format!(
            "{}-{}-{}",
            std::process::id(),
            remote_port,
            sequence
        ))
    }

    /// Append a connection. Insertion order is broadcast order.
    pub fn attach(&self, connection: Arc<Connection>) {
        self.connections
            .write()
            .insert(connection.id().clone(), connection);
    }

    /// Remove a connection, preserving the order of the rest.
    ///
    /// Returns whether the id was present. Safe to call for an id that was
    /// never attached (a rejected connection closes without attaching).
    pub fn detach(&self, id: &ConnectionId) -> bool {
        self.connections.write().shift_remove(id).is_some()
    }

    /// Look a connection up by id.
    #[must_use]
    pub fn find(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        self.connections.read().get(id).cloned()
    }

    /// Visit every connection in attachment order.
    pub fn for_each(&self, mut f: impl FnMut(&Arc<Connection>)) {
        for connection in self.connections.read().values() {
            f(connection);
        }
    }

    /// Transform every connection in attachment order.
    #[must_use]
    pub fn map<T>(&self, mut f: impl FnMut(&Arc<Connection>) -> T) -> Vec<T> {
        self.connections.read().values().map(&mut f).collect()
    }

    /// Collect the connections matching a predicate, in attachment order.
    #[must_use]
    pub fn filter(&self, mut predicate: impl FnMut(&Arc<Connection>) -> bool) -> Vec<Arc<Connection>> {
        self.connections
            .read()
            .values()
            .filter(|connection| predicate(connection))
            .cloned()
            .collect()
    }

    /// Clone the current connection list, in attachment order.
    ///
    /// Broadcast iterates a snapshot so a message handler that closes
    /// another connection cannot corrupt a live traversal.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.connections.read().values().cloned().collect()
    }

    /// Number of attached connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    /// Whether no connections are attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }
}
