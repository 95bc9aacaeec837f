//! Handshake negotiation.
//!
//! Both drafts answer an upgrade with an HTTP 101 whose exact status line
//! and header names differ; draft76 additionally proves the server read the
//! client's key material by appending an MD5 digest as the raw response
//! body. Neither response can be produced through a standard HTTP response
//! writer (the reason phrases are nonstandard and the body is unencoded
//! bytes), so the strategies assemble the wire bytes directly and the whole
//! response goes out in a single write.

use bytes::{BufMut, Bytes, BytesMut};
use md5::{Digest, Md5};

use crate::error::HandshakeError;
use crate::upgrade::UpgradeRequest;
use crate::version::ProtocolVersion;

/// Exact draft75 status line, space in "Web Socket" included.
const DRAFT75_STATUS_LINE: &[u8] = b"HTTP/1.1 101 Web Socket Protocol Handshake\r\n";
/// Exact draft76 status line.
const DRAFT76_STATUS_LINE: &[u8] = b"HTTP/1.1 101 WebSocket Protocol Handshake\r\n";

/// Bytes of key material draft76 requires at the front of the upgrade head.
pub const KEY3_LEN: usize = 8;
/// Length of the draft76 challenge digest body.
pub const CHALLENGE_LEN: usize = 16;

/// How the response origin header is derived.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum OriginPolicy {
    /// Echo the request's `Origin` header (the legacy `"*"` setting).
    #[default]
    Any,
    /// Always emit this fixed value.
    Fixed(String),
}

/// Response-shaping options shared by both strategies.
#[derive(Debug, Clone, Default)]
pub struct HandshakeOptions {
    /// Origin echo/override policy.
    pub origin: OriginPolicy,
    /// Subprotocol header value; the header is emitted only when this is
    /// configured.
    pub subprotocol: Option<String>,
}

/// Contract shared by both strategies: request in, response bytes out.
pub trait Negotiate {
    /// Draft revision this strategy implements.
    fn version(&self) -> ProtocolVersion;

    /// Validate the request and produce the complete 101 response.
    ///
    /// The returned buffer is the entire wire response, body included, and
    /// is meant to be written in one piece.
    ///
    /// # Errors
    ///
    /// Returns [`HandshakeError`] when the request must be rejected; no
    /// partial response exists in that case.
    fn respond(
        &self,
        request: &UpgradeRequest,
        options: &HandshakeOptions,
    ) -> Result<Bytes, HandshakeError>;
}

/// hixie-75: plain 101, no challenge.
#[derive(Debug, Clone, Copy, Default)]
pub struct Draft75;

impl Negotiate for Draft75 {
    fn version(&self) -> ProtocolVersion {
        ProtocolVersion::Draft75
    }

    fn respond(
        &self,
        request: &UpgradeRequest,
        options: &HandshakeOptions,
    ) -> Result<Bytes, HandshakeError> {
        let location = websocket_location(request)?;
        let origin = websocket_origin(request, &options.origin);

        let mut buf = BytesMut::with_capacity(192 + location.len());
        buf.put_slice(DRAFT75_STATUS_LINE);
        buf.put_slice(b"Upgrade: WebSocket\r\n");
        buf.put_slice(b"Connection: Upgrade\r\n");
        put_header(&mut buf, "WebSocket-Origin", &origin);
        put_header(&mut buf, "WebSocket-Location", &location);
        if let Some(subprotocol) = options.subprotocol.as_deref() {
            put_header(&mut buf, "WebSocket-Protocol", subprotocol);
        }
        buf.put_slice(b"\r\n");

        Ok(buf.freeze())
    }
}

/// hixie-76: MD5 challenge/response over the key material.
#[derive(Debug, Clone, Copy)]
pub struct Draft76 {
    key3: [u8; KEY3_LEN],
}

impl Draft76 {
    /// Build the strategy around the 8 key bytes from the upgrade head.
    #[must_use]
    pub fn new(key3: [u8; KEY3_LEN]) -> Self {
        Self { key3 }
    }
}

impl Negotiate for Draft76 {
    fn version(&self) -> ProtocolVersion {
        ProtocolVersion::Draft76
    }

    fn respond(
        &self,
        request: &UpgradeRequest,
        options: &HandshakeOptions,
    ) -> Result<Bytes, HandshakeError> {
        let location = websocket_location(request)?;
        let origin = websocket_origin(request, &options.origin);

        let key1 = request.key1().ok_or(HandshakeError::InvalidKey)?;
        let key2 = request.key2().ok_or(HandshakeError::InvalidKey)?;
        let part1 = key_number(key1)?;
        let part2 = key_number(key2)?;
        let digest = challenge_digest(part1, part2, &self.key3);

        let mut buf = BytesMut::with_capacity(224 + location.len());
        buf.put_slice(DRAFT76_STATUS_LINE);
        buf.put_slice(b"Upgrade: WebSocket\r\n");
        buf.put_slice(b"Connection: Upgrade\r\n");
        put_header(&mut buf, "Sec-WebSocket-Origin", &origin);
        put_header(&mut buf, "Sec-WebSocket-Location", &location);
        if let Some(subprotocol) = options.subprotocol.as_deref() {
            put_header(&mut buf, "Sec-WebSocket-Protocol", subprotocol);
        }
        buf.put_slice(b"\r\n");
        buf.put_slice(&digest);

        Ok(buf.freeze())
    }
}

/// Tagged dispatch over the two strategies.
#[derive(Debug, Clone, Copy)]
pub enum Handshake {
    /// Plain draft75 negotiation.
    Draft75(Draft75),
    /// Challenge/response draft76 negotiation.
    Draft76(Draft76),
}

impl Handshake {
    /// Select the strategy for a request and split draft76 key material out
    /// of the upgrade head.
    ///
    /// Returns the strategy plus the buffered first-frame fragment: any
    /// application bytes that arrived after the key material, to be replayed
    /// into the frame parser once the connection is up. draft75 carries no
    /// key material, so its fragment is always empty.
    ///
    /// # Errors
    ///
    /// Returns [`HandshakeError::MissingKey3`] when a draft76 upgrade head
    /// holds fewer than [`KEY3_LEN`] bytes.
    pub fn for_request(
        request: &UpgradeRequest,
        upgrade_head: &Bytes,
    ) -> Result<(Self, Bytes), HandshakeError> {
        match request.version() {
            ProtocolVersion::Draft75 => Ok((Self::Draft75(Draft75), Bytes::new())),
            ProtocolVersion::Draft76 => {
                if upgrade_head.len() < KEY3_LEN {
                    return Err(HandshakeError::missing_key3(upgrade_head.len()));
                }
                let mut key3 = [0_u8; KEY3_LEN];
                key3.copy_from_slice(&upgrade_head[..KEY3_LEN]);
                let first_frame = upgrade_head.slice(KEY3_LEN..);
                Ok((Self::Draft76(Draft76::new(key3)), first_frame))
            }
        }
    }
}

impl Negotiate for Handshake {
    fn version(&self) -> ProtocolVersion {
        match self {
            Self::Draft75(strategy) => strategy.version(),
            Self::Draft76(strategy) => strategy.version(),
        }
    }

    fn respond(
        &self,
        request: &UpgradeRequest,
        options: &HandshakeOptions,
    ) -> Result<Bytes, HandshakeError> {
        match self {
            Self::Draft75(strategy) => strategy.respond(request, options),
            Self::Draft76(strategy) => strategy.respond(request, options),
        }
    }
}

/// Append one `Name: value` header line.
fn put_header(buf: &mut BytesMut, name: &str, value: &str) {
    buf.put_slice(name.as_bytes());
    buf.put_slice(b": ");
    buf.put_slice(value.as_bytes());
    buf.put_slice(b"\r\n");
}

/// Derive the origin header value.
fn websocket_origin(request: &UpgradeRequest, policy: &OriginPolicy) -> String {
    match policy {
        OriginPolicy::Any => request.origin().unwrap_or("null").to_string(),
        OriginPolicy::Fixed(origin) => origin.clone(),
    }
}

/// Derive the location the client must see in the response.
///
/// `ws://host[:port]/path`, eliding the scheme's default port; `wss://` when
/// a TLS-terminating hop marked the request secure.
fn websocket_location(request: &UpgradeRequest) -> Result<String, HandshakeError> {
    let host = request.host().ok_or(HandshakeError::MissingHost)?;
    let secure = request.secure();

    let (hostname, port) = match host.split_once(':') {
        Some((hostname, port)) => (hostname, Some(port)),
        None => (host, None),
    };

    let mut location = String::with_capacity(host.len() + request.path().len() + 8);
    location.push_str(if secure { "wss://" } else { "ws://" });
    location.push_str(hostname);

    if let Some(port) = port {
        let is_default = matches!(
            (secure, port.parse::<u16>()),
            (false, Ok(80)) | (true, Ok(443))
        );
        if !is_default {
            location.push(':');
            location.push_str(port);
        }
    }

    location.push_str(request.path());
    Ok(location)
}

/// Reduce a challenge key to its 32-bit number.
///
/// The digit characters form an integer that must divide evenly by the
/// number of spaces; the quotient is the key number. Keys with no spaces,
/// no digits, or an indivisible value are invalid.
fn key_number(key: &str) -> Result<u32, HandshakeError> {
    let digits: String = key.chars().filter(char::is_ascii_digit).collect();
    let spaces = key.chars().filter(|&c| c == ' ').count() as u64;

    if spaces == 0 {
        return Err(HandshakeError::InvalidKey);
    }
    let number: u64 = digits.parse().map_err(|_| HandshakeError::InvalidKey)?;
    if number % spaces != 0 {
        return Err(HandshakeError::InvalidKey);
    }

    Ok((number / spaces) as u32)
}

/// The draft76 challenge: MD5 over the two packed key numbers and key3.
fn challenge_digest(part1: u32, part2: u32, key3: &[u8; KEY3_LEN]) -> [u8; CHALLENGE_LEN] {
    let mut hasher = Md5::new();
    hasher.update(part1.to_be_bytes());
    hasher.update(part2.to_be_bytes());
    hasher.update(key3);
    hasher.finalize().into()
}
