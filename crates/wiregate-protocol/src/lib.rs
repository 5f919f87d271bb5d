//! Wire protocol for Wiregate.
//!
//! This crate defines the "language" the two ends of a gateway speak:
//!
//! - **Frames** ([`Message`], [`MessageKind`]) — the six-kind framed wire
//!   format, with its fixed numeric kind table.
//! - **Values** ([`Value`]) — the tagged codec for channel items, honoring
//!   the round-trip contract `from_bytes(to_bytes(v)) == v`.
//! - **Errors** ([`ProtocolError`]) — what can go wrong while framing or
//!   encoding.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (raw bytes) and the gateway
//! (channels, workers). It doesn't know about streams' origins or channel
//! bookkeeping — only how frames and values become bytes and back.
//!
//! ```text
//! Transport (bytes) → Protocol (Message, Value) → Gateway (channels)
//! ```

mod error;
mod message;
mod value;

pub use error::ProtocolError;
pub use message::{Message, MessageKind, HEADER_LEN, MAX_PAYLOAD_LEN};
pub use value::Value;
