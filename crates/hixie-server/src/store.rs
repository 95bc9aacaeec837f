//! Pluggable per-connection key/value storage.
//!
//! A [`Datastore`] mints one [`Session`] per connection at the moment the
//! connection becomes connected; the session's disconnect hook runs exactly
//! once when the connection reaches the terminal state. The engine never
//! interprets the stored values.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::registry::ConnectionId;

/// Factory for per-connection sessions.
pub trait Datastore: Send + Sync {
    /// Create a fresh session for a connection entering the connected state.
    fn create(&self) -> Arc<dyn Session>;
}

/// Per-connection key/value handle.
pub trait Session: Send + Sync {
    /// Store a value under a key, replacing any previous value.
    fn set(&self, key: &str, value: Value);

    /// Look a value up by key.
    fn get(&self, key: &str) -> Option<Value>;

    /// Remove a key, returning the value it held.
    fn remove(&self, key: &str) -> Option<Value>;

    /// Called exactly once when the owning connection closes.
    fn disconnect(&self, id: &ConnectionId) {
        let _ = id;
    }
}

/// Bundled in-memory datastore.
///
/// Each connection gets an independent map; disconnect clears it. Suited to
/// single-process deployments and tests; anything shared or durable belongs
/// in an application-provided [`Datastore`].
#[derive(Debug, Default)]
pub struct MemStore;

impl MemStore {
    /// Create the in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Datastore for MemStore {
    fn create(&self) -> Arc<dyn Session> {
        Arc::new(MemSession::default())
    }
}

#[derive(Debug, Default)]
struct MemSession {
    values: Mutex<HashMap<String, Value>>,
}

impl Session for MemSession {
    fn set(&self, key: &str, value: Value) {
        self.values.lock().insert(key.to_string(), value);
    }

    fn get(&self, key: &str) -> Option<Value> {
        self.values.lock().get(key).cloned()
    }

    fn remove(&self, key: &str) -> Option<Value> {
        self.values.lock().remove(key)
    }

    fn disconnect(&self, _id: &ConnectionId) {
        self.values.lock().clear();
    }
}
