//! Protocol revision detection and acceptance policy.
//!
//! The two pre-standard drafts are distinguished solely by the presence of
//! the `Sec-WebSocket-Key1`/`Sec-WebSocket-Key2` request headers: draft76
//! clients send both, draft75 clients send neither.

use std::fmt;

use http::HeaderMap;

/// Header carrying the first draft76 challenge key.
pub const KEY1_HEADER: &str = "sec-websocket-key1";
/// Header carrying the second draft76 challenge key.
pub const KEY2_HEADER: &str = "sec-websocket-key2";

/// Pre-standard WebSocket draft revisions this engine speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolVersion {
    /// hixie-75: plain 101 response, no challenge.
    Draft75,
    /// hixie-76: MD5 challenge/response over key material.
    Draft76,
}

impl ProtocolVersion {
    /// Infer the draft revision from the upgrade request headers.
    ///
    /// Both key headers must be present for draft76; anything less is
    /// treated as draft75.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        if headers.contains_key(KEY1_HEADER) && headers.contains_key(KEY2_HEADER) {
            Self::Draft76
        } else {
            Self::Draft75
        }
    }

    /// The revision's conventional name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft75 => "draft75",
            Self::Draft76 => "draft76",
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which draft revisions a server accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VersionPolicy {
    /// Accept either draft.
    #[default]
    Auto,
    /// Accept only draft75 clients.
    Draft75,
    /// Accept only draft76 clients.
    Draft76,
}

impl VersionPolicy {
    /// Whether a client revision satisfies this policy.
    #[must_use]
    pub fn accepts(self, version: ProtocolVersion) -> bool {
        match self {
            Self::Auto => true,
            Self::Draft75 => version == ProtocolVersion::Draft75,
            Self::Draft76 => version == ProtocolVersion::Draft76,
        }
    }
}

impl fmt::Display for VersionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Auto => "auto",
            Self::Draft75 => "draft75",
            Self::Draft76 => "draft76",
        };
        f.write_str(name)
    }
}
