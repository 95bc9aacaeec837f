//! # hixie-core
//!
//! Sans-I/O protocol engine for the legacy hixie-75/hixie-76 WebSocket
//! drafts: draft detection and acceptance policy, the upgrade-request model,
//! the two handshake strategies (draft76 with its MD5 challenge/response),
//! the incremental text-frame parser, and the connection state machine.
//!
//! Nothing in this crate touches a socket. Every operation works on byte
//! slices and [`http`] types, so the whole protocol surface is testable
//! without a runtime; the async layer lives in `hixie-server`.
//!
//! ## Example
//!
//! ```
//! use hixie_core::frame::{encode_text, FrameParser};
//!
//! let mut parser = FrameParser::new();
//! let wire = encode_text("hello");
//! assert_eq!(parser.feed(&wire), vec!["hello".to_string()]);
//! ```

pub mod error;
pub mod frame;
pub mod handshake;
pub mod state;
pub mod upgrade;
pub mod version;

pub use error::{HandshakeError, UpgradeError};
pub use frame::{encode_text, is_closing_sequence, FrameParser, CLOSING_SEQUENCE};
pub use handshake::{
    Draft75, Draft76, Handshake, HandshakeOptions, Negotiate, OriginPolicy, CHALLENGE_LEN,
    KEY3_LEN,
};
pub use state::ConnectionState;
pub use upgrade::{head_terminator, UpgradeRequest};
pub use version::{ProtocolVersion, VersionPolicy};
