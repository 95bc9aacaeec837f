//! Server configuration.
//!
//! Caller-supplied options merge over defaults through the builder; the
//! merged [`ServerConfig`] is what every connection sees. Debug logging has
//! no option here: components emit [`tracing`] events and filtering is the
//! subscriber's job.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use hixie_core::{HandshakeOptions, OriginPolicy, VersionPolicy};

use crate::store::Datastore;

/// Default cap on the request head read by the built-in transport.
pub const DEFAULT_MAX_HEAD_BYTES: usize = 8 * 1024;

/// Merged server configuration.
///
/// Use [`ServerConfig::builder()`] to construct instances.
#[derive(Clone)]
pub struct ServerConfig {
    version: VersionPolicy,
    origin: OriginPolicy,
    subprotocol: Option<String>,
    datastore: Option<Arc<dyn Datastore>>,
    idle_timeout: Option<Duration>,
    max_head_bytes: usize,
}

impl ServerConfig {
    /// Create a configuration builder with defaults.
    #[must_use]
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::new()
    }

    /// Which draft revisions are accepted.
    #[must_use]
    pub fn version(&self) -> VersionPolicy {
        self.version
    }

    /// How the response origin header is derived.
    #[must_use]
    pub fn origin(&self) -> &OriginPolicy {
        &self.origin
    }

    /// The configured subprotocol, if any.
    #[must_use]
    pub fn subprotocol(&self) -> Option<&str> {
        self.subprotocol.as_deref()
    }

    /// The per-connection session factory, if configured.
    #[must_use]
    pub fn datastore(&self) -> Option<&Arc<dyn Datastore>> {
        self.datastore.as_ref()
    }

    /// The idle-read deadline, if configured.
    #[must_use]
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout
    }

    /// Cap on the request head read by the built-in transport.
    #[must_use]
    pub fn max_head_bytes(&self) -> usize {
        self.max_head_bytes
    }

    /// The response-shaping options handed to the handshake strategies.
    #[must_use]
    pub fn handshake_options(&self) -> HandshakeOptions {
        HandshakeOptions {
            origin: self.origin.clone(),
            subprotocol: self.subprotocol.clone(),
        }
    }

    /// Reopen the configuration for modification, for plugin hooks.
    #[must_use]
    pub fn into_builder(self) -> ServerConfigBuilder {
        ServerConfigBuilder { config: self }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("version", &self.version)
            .field("origin", &self.origin)
            .field("subprotocol", &self.subprotocol)
            .field("datastore", &self.datastore.is_some())
            .field("idle_timeout", &self.idle_timeout)
            .field("max_head_bytes", &self.max_head_bytes)
            .finish()
    }
}

/// Builder for [`ServerConfig`].
#[derive(Debug, Clone)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    /// Create a builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: ServerConfig {
                version: VersionPolicy::Auto,
                origin: OriginPolicy::Any,
                subprotocol: None,
                datastore: None,
                idle_timeout: None,
                max_head_bytes: DEFAULT_MAX_HEAD_BYTES,
            },
        }
    }

    /// Accept only the given draft revisions.
    #[must_use]
    pub fn version(mut self, version: VersionPolicy) -> Self {
        self.config.version = version;
        self
    }

    /// Set the response origin policy.
    #[must_use]
    pub fn origin(mut self, origin: OriginPolicy) -> Self {
        self.config.origin = origin;
        self
    }

    /// Emit the subprotocol header with this value.
    #[must_use]
    pub fn subprotocol(mut self, subprotocol: impl Into<String>) -> Self {
        self.config.subprotocol = Some(subprotocol.into());
        self
    }

    /// Install a per-connection session factory.
    #[must_use]
    pub fn datastore(mut self, datastore: Arc<dyn Datastore>) -> Self {
        self.config.datastore = Some(datastore);
        self
    }

    /// Emit a timeout event when a read idles this long.
    #[must_use]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = Some(timeout);
        self
    }

    /// Cap the request head read by the built-in transport.
    #[must_use]
    pub fn max_head_bytes(mut self, limit: usize) -> Self {
        self.config.max_head_bytes = limit;
        self
    }

    /// Finish the configuration.
    #[must_use]
    pub fn build(self) -> ServerConfig {
        self.config
    }
}

impl Default for ServerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
