//! Legacy text framing.
//!
//! Both drafts frame a message as a `0x00` byte, the UTF-8 payload, and a
//! `0xFF` terminator. The closing handshake is the bare two-byte sequence
//! `0xFF 0x00`, detected on whole chunks by the connection driver, never by
//! the parser. Binary ("high order") framing was never implemented in this
//! protocol family and stays an explicit stub here.

use bytes::{BufMut, Bytes, BytesMut};
use tracing::warn;

/// Frame-type byte opening a text frame.
const TEXT_MARKER: u8 = 0x00;
/// Terminator byte closing a text frame.
const TEXT_TERMINATOR: u8 = 0xFF;
/// High bit distinguishing the unimplemented high-order frame family.
const HIGH_ORDER_BIT: u8 = 0x80;

/// The two-byte closing handshake.
pub const CLOSING_SEQUENCE: [u8; 2] = [0xFF, 0x00];

/// Whether a chunk is exactly the closing handshake.
#[must_use]
pub fn is_closing_sequence(chunk: &[u8]) -> bool {
    chunk == CLOSING_SEQUENCE
}

/// Frame a payload for the wire: `0x00`, UTF-8 bytes, `0xFF`.
#[must_use]
pub fn encode_text(payload: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(payload.len() + 2);
    buf.put_u8(TEXT_MARKER);
    buf.put_slice(payload.as_bytes());
    buf.put_u8(TEXT_TERMINATOR);
    buf.freeze()
}

/// What the scanner expects next. Kept across calls so chunk boundaries
/// carry no protocol meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Order {
    /// Expecting a frame-type byte.
    #[default]
    AwaitFrameType,
    /// Inside a text frame, accumulating payload until the terminator.
    Text,
    /// Saw a high-order marker; the next byte is discarded by the stub.
    HighOrder,
}

/// Incremental scanner turning a byte stream into complete text messages.
///
/// Partial frames are buffered across [`feed`](Self::feed) calls: a message
/// split into single-byte chunks and the same message in one chunk produce
/// identical output. A message is emitted only when its terminator arrives,
/// exactly once per frame.
///
/// # Example
///
/// ```
/// use hixie_core::frame::{encode_text, FrameParser};
///
/// let mut parser = FrameParser::new();
/// let wire = encode_text("hello");
/// assert_eq!(parser.feed(&wire), vec!["hello".to_string()]);
/// ```
#[derive(Debug, Default)]
pub struct FrameParser {
    payload: BytesMut,
    order: Order,
}

impl FrameParser {
    /// Create a parser expecting a frame-type byte.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan a chunk, returning the messages it completed, in order.
    ///
    /// Payload bytes are decoded lossily: the legacy engine decoded with a
    /// replacement-character decoder and peers relied on it.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut messages = Vec::new();

        for &byte in chunk {
            match self.order {
                Order::AwaitFrameType => {
                    if byte & HIGH_ORDER_BIT == HIGH_ORDER_BIT {
                        self.order = Order::HighOrder;
                    } else {
                        self.order = Order::Text;
                    }
                }
                Order::Text => {
                    if byte == TEXT_TERMINATOR {
                        let payload = self.payload.split();
                        self.order = Order::AwaitFrameType;
                        messages.push(String::from_utf8_lossy(&payload).into_owned());
                    } else {
                        self.payload.put_u8(byte);
                    }
                }
                Order::HighOrder => {
                    // Length-prefixed framing never shipped in this protocol
                    // family; swallow the byte and resynchronize.
                    warn!("high order frame handling is not implemented");
                    self.order = Order::AwaitFrameType;
                }
            }
        }

        messages
    }

    /// Whether a partial frame is buffered.
    #[must_use]
    pub fn is_mid_frame(&self) -> bool {
        self.order != Order::AwaitFrameType || !self.payload.is_empty()
    }
}
