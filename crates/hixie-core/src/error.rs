//! Error types for the protocol engine.
//!
//! Two phases fail differently: the upgrade-head intake (before a
//! connection exists) and the handshake (before a connection becomes
//! visible as connected). Steady-state socket faults are plain
//! [`std::io::Error`]s and never surface as these types.

use thiserror::Error;

use crate::version::ProtocolVersion;

/// Handshake-phase rejections.
///
/// Display strings deliberately keep the legacy engine's reject reasons;
/// they travel verbatim in rejection notifications.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    /// The client's draft revision is not accepted by the configured policy.
    #[error("Invalid version")]
    VersionMismatch {
        /// Revision the client negotiated.
        requested: ProtocolVersion,
    },

    /// The request carried no `Host` header, so no Location can be derived.
    #[error("Missing host header")]
    MissingHost,

    /// draft76 requires at least 8 upgrade-head bytes of key material.
    #[error("Missing key3")]
    MissingKey3 {
        /// Upgrade-head bytes that actually arrived.
        available: usize,
    },

    /// A draft76 challenge key violated the space/digit rule.
    #[error("Invalid handshake key")]
    InvalidKey,
}

impl HandshakeError {
    /// Create a version-mismatch rejection.
    pub fn version_mismatch(requested: ProtocolVersion) -> Self {
        Self::VersionMismatch { requested }
    }

    /// Create a missing-key3 rejection.
    pub fn missing_key3(available: usize) -> Self {
        Self::MissingKey3 { available }
    }
}

/// Upgrade-head intake failures, surfaced before a connection exists.
#[derive(Debug, Error)]
pub enum UpgradeError {
    /// The request head grew past the configured cap without terminating.
    #[error("request head exceeds {limit} bytes")]
    HeadTooLarge {
        /// The configured cap.
        limit: usize,
    },

    /// The socket closed before the head terminator arrived.
    #[error("connection closed before the request head completed")]
    TruncatedHead,

    /// The request line could not be parsed.
    #[error("malformed request line: {0}")]
    MalformedRequestLine(String),

    /// A header line could not be parsed.
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    /// The socket failed while the head was being read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl UpgradeError {
    /// Create a malformed-request-line error.
    pub fn malformed_request_line(reason: impl Into<String>) -> Self {
        Self::MalformedRequestLine(reason.into())
    }

    /// Create a malformed-header error.
    pub fn malformed_header(reason: impl Into<String>) -> Self {
        Self::MalformedHeader(reason.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reject_reasons_keep_legacy_wording() {
        assert_eq!(
            HandshakeError::version_mismatch(ProtocolVersion::Draft76).to_string(),
            "Invalid version"
        );
        assert_eq!(HandshakeError::MissingHost.to_string(), "Missing host header");
        assert_eq!(HandshakeError::missing_key3(7).to_string(), "Missing key3");
        assert_eq!(HandshakeError::InvalidKey.to_string(), "Invalid handshake key");
    }

    #[test]
    fn test_missing_key3_records_available_bytes() {
        let err = HandshakeError::missing_key3(7);
        assert!(matches!(err, HandshakeError::MissingKey3 { available: 7 }));
    }

    #[test]
    fn test_upgrade_error_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err = UpgradeError::from(io);
        assert!(matches!(err, UpgradeError::Io(_)));
        assert!(err.to_string().contains("reset"));
    }

    #[test]
    fn test_malformed_request_line_message() {
        let err = UpgradeError::malformed_request_line("no method");
        assert_eq!(err.to_string(), "malformed request line: no method");
    }
}
