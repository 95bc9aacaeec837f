//! Upgrade request intake.
//!
//! Models the HTTP request head that precedes socket takeover: the request
//! line plus headers, parsed into [`http`] types so lookups stay
//! case-insensitive. Bytes arriving after the head terminator belong to the
//! upgrade head (draft76 key material, possibly the start of the first
//! frame) and are not this module's concern.

use http::header::{CONNECTION, UPGRADE};
use http::{HeaderMap, HeaderName, HeaderValue, Method};

use crate::error::UpgradeError;
use crate::version::{ProtocolVersion, KEY1_HEADER, KEY2_HEADER};

/// End-of-head marker.
const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Find the end of the request head in `buf`.
///
/// Returns the index just past the `\r\n\r\n` terminator; bytes from that
/// index on are upgrade-head data.
#[must_use]
pub fn head_terminator(buf: &[u8]) -> Option<usize> {
    buf.windows(HEAD_TERMINATOR.len())
        .position(|window| window == HEAD_TERMINATOR)
        .map(|index| index + HEAD_TERMINATOR.len())
}

/// Immutable snapshot of an inbound upgrade request head.
#[derive(Debug, Clone)]
pub struct UpgradeRequest {
    method: Method,
    path: String,
    headers: HeaderMap,
    remote_port: u16,
    secure: bool,
}

impl UpgradeRequest {
    /// Build a request from already-parsed parts.
    ///
    /// Host layers that run their own HTTP parser hand requests over
    /// through this constructor.
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>, headers: HeaderMap, remote_port: u16) -> Self {
        Self {
            method,
            path: path.into(),
            headers,
            remote_port,
            secure: false,
        }
    }

    /// Mark the request as having arrived over a TLS-terminating hop.
    ///
    /// Only affects the derived Location scheme (`wss://` and the 443
    /// default port); this engine itself never terminates TLS.
    #[must_use]
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Parse a raw request head.
    ///
    /// `head` must span exactly the request line and headers, including the
    /// trailing blank line if it was captured.
    ///
    /// # Errors
    ///
    /// Returns [`UpgradeError`] when the request line or a header line does
    /// not parse.
    pub fn parse(head: &[u8], remote_port: u16) -> Result<Self, UpgradeError> {
        let text = std::str::from_utf8(head)
            .map_err(|_| UpgradeError::malformed_request_line("head is not valid UTF-8"))?;

        let mut lines = text.split("\r\n");
        let request_line = lines.next().unwrap_or_default();

        let mut parts = request_line.split_whitespace();
        let method = parts
            .next()
            .ok_or_else(|| UpgradeError::malformed_request_line(request_line))?;
        let path = parts
            .next()
            .ok_or_else(|| UpgradeError::malformed_request_line(request_line))?;
        let http_version = parts
            .next()
            .ok_or_else(|| UpgradeError::malformed_request_line(request_line))?;
        if !http_version.starts_with("HTTP/") || parts.next().is_some() {
            return Err(UpgradeError::malformed_request_line(request_line));
        }

        let method = Method::from_bytes(method.as_bytes())
            .map_err(|_| UpgradeError::malformed_request_line(request_line))?;

        let mut headers = HeaderMap::new();
        for line in lines {
            if line.is_empty() {
                break;
            }
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| UpgradeError::malformed_header(line))?;
            let name = HeaderName::from_bytes(name.trim().as_bytes())
                .map_err(|_| UpgradeError::malformed_header(line))?;
            let value = HeaderValue::from_str(value.trim())
                .map_err(|_| UpgradeError::malformed_header(line))?;
            headers.append(name, value);
        }

        Ok(Self::new(method, path, headers, remote_port))
    }

    /// Whether this head asks for a WebSocket upgrade.
    ///
    /// The method must be GET and the `Upgrade`/`Connection` values must
    /// case-insensitively equal `websocket`/`upgrade`; the legacy drafts
    /// sent exactly these values, never connection-option lists.
    #[must_use]
    pub fn is_websocket_upgrade(&self) -> bool {
        self.method == Method::GET
            && header_equals(&self.headers, &UPGRADE, "websocket")
            && header_equals(&self.headers, &CONNECTION, "upgrade")
    }

    /// Draft revision the client negotiated.
    #[must_use]
    pub fn version(&self) -> ProtocolVersion {
        ProtocolVersion::from_headers(&self.headers)
    }

    /// Request method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Request path, exactly as sent.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Request headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Remote TCP port of the underlying socket.
    #[must_use]
    pub fn remote_port(&self) -> u16 {
        self.remote_port
    }

    /// Whether the request arrived over a TLS-terminating hop.
    #[must_use]
    pub fn secure(&self) -> bool {
        self.secure
    }

    /// The `Host` header, if present and readable.
    #[must_use]
    pub fn host(&self) -> Option<&str> {
        header_str(&self.headers, "host")
    }

    /// The `Origin` header, if present and readable.
    #[must_use]
    pub fn origin(&self) -> Option<&str> {
        header_str(&self.headers, "origin")
    }

    /// The first draft76 challenge key.
    #[must_use]
    pub fn key1(&self) -> Option<&str> {
        header_str(&self.headers, KEY1_HEADER)
    }

    /// The second draft76 challenge key.
    #[must_use]
    pub fn key2(&self) -> Option<&str> {
        header_str(&self.headers, KEY2_HEADER)
    }
}

/// Look a header up as a string, treating unreadable values as absent.
fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Whether a header's value case-insensitively equals `expected`.
fn header_equals(headers: &HeaderMap, name: &HeaderName, expected: &str) -> bool {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.eq_ignore_ascii_case(expected))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DRAFT75_HEAD: &[u8] = b"GET /demo HTTP/1.1\r\n\
        Upgrade: WebSocket\r\n\
        Connection: Upgrade\r\n\
        Host: example.com\r\n\
        Origin: http://example.com\r\n\
        \r\n";

    #[test]
    fn test_parse_draft75_head() {
        let request = UpgradeRequest::parse(DRAFT75_HEAD, 4_000).unwrap();
        assert_eq!(request.method(), Method::GET);
        assert_eq!(request.path(), "/demo");
        assert_eq!(request.host(), Some("example.com"));
        assert_eq!(request.origin(), Some("http://example.com"));
        assert_eq!(request.remote_port(), 4_000);
        assert_eq!(request.version(), ProtocolVersion::Draft75);
        assert!(request.is_websocket_upgrade());
    }

    #[test]
    fn test_parse_draft76_head_detects_version() {
        let head = b"GET /chat HTTP/1.1\r\n\
            Upgrade: WebSocket\r\n\
            Connection: Upgrade\r\n\
            Host: example.com\r\n\
            Sec-WebSocket-Key1: 4 @1  46546xW%0l 1 5\r\n\
            Sec-WebSocket-Key2: 12998 5 Y3 1  .P00\r\n\
            \r\n";
        let request = UpgradeRequest::parse(head, 4_001).unwrap();
        assert_eq!(request.version(), ProtocolVersion::Draft76);
        assert_eq!(request.key1(), Some("4 @1  46546xW%0l 1 5"));
        assert_eq!(request.key2(), Some("12998 5 Y3 1  .P00"));
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let head = b"GET / HTTP/1.1\r\nHOST: example.com\r\nupgrade: websocket\r\n\r\n";
        let request = UpgradeRequest::parse(head, 1).unwrap();
        assert_eq!(request.host(), Some("example.com"));
        assert!(request.headers().contains_key("Upgrade"));
    }

    #[test]
    fn test_upgrade_filter_accepts_mixed_case_values() {
        let head = b"GET / HTTP/1.1\r\nUpgrade: WebSocket\r\nConnection: UPGRADE\r\nHost: h\r\n\r\n";
        let request = UpgradeRequest::parse(head, 1).unwrap();
        assert!(request.is_websocket_upgrade());
    }

    #[test]
    fn test_upgrade_filter_rejects_non_get() {
        let head = b"POST /demo HTTP/1.1\r\nUpgrade: WebSocket\r\nConnection: Upgrade\r\n\r\n";
        let request = UpgradeRequest::parse(head, 1).unwrap();
        assert!(!request.is_websocket_upgrade());
    }

    #[test]
    fn test_upgrade_filter_rejects_missing_headers() {
        let head = b"GET /demo HTTP/1.1\r\nHost: example.com\r\n\r\n";
        let request = UpgradeRequest::parse(head, 1).unwrap();
        assert!(!request.is_websocket_upgrade());
    }

    #[test]
    fn test_upgrade_filter_requires_exact_values() {
        // Connection option lists are an RFC 6455 thing; the legacy drafts
        // sent the bare token and the filter demands it.
        let head = b"GET / HTTP/1.1\r\nUpgrade: websocket\r\nConnection: keep-alive, Upgrade\r\n\r\n";
        let request = UpgradeRequest::parse(head, 1).unwrap();
        assert!(!request.is_websocket_upgrade());
    }

    #[test]
    fn test_parse_rejects_malformed_request_line() {
        assert!(UpgradeRequest::parse(b"GARBAGE\r\n\r\n", 1).is_err());
        assert!(UpgradeRequest::parse(b"GET /demo\r\n\r\n", 1).is_err());
        assert!(UpgradeRequest::parse(b"GET /demo HTTP/1.1 extra\r\n\r\n", 1).is_err());
        assert!(UpgradeRequest::parse(b"GET /demo FTP/1.0\r\n\r\n", 1).is_err());
    }

    #[test]
    fn test_parse_rejects_malformed_header() {
        let head = b"GET / HTTP/1.1\r\nnot-a-header-line\r\n\r\n";
        let err = UpgradeRequest::parse(head, 1).unwrap_err();
        assert!(err.to_string().contains("malformed header"));
    }

    #[test]
    fn test_secure_flag_defaults_off() {
        let request = UpgradeRequest::parse(DRAFT75_HEAD, 1).unwrap();
        assert!(!request.secure());
        assert!(request.with_secure(true).secure());
    }

    #[test]
    fn test_head_terminator() {
        assert_eq!(head_terminator(b""), None);
        assert_eq!(head_terminator(b"GET / HTTP/1.1\r\n\r"), None);
        assert_eq!(head_terminator(b"GET / HTTP/1.1\r\n\r\n"), Some(18));

        let with_tail = b"GET / HTTP/1.1\r\n\r\n12345678";
        assert_eq!(head_terminator(with_tail), Some(18));
        assert_eq!(&with_tail[18..], b"12345678");
    }
}
