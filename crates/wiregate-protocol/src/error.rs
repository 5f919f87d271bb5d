//! Error types for the protocol layer.
//!
//! Each crate in Wiregate defines its own error enum. When you see a
//! `ProtocolError`, the problem is in framing or the value codec, not in
//! transport plumbing or channel bookkeeping.

/// Errors that can occur while framing, encoding, or decoding messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The stream ended cleanly before the start of a frame.
    ///
    /// This is the normal way a receiver loop discovers the peer is gone.
    /// It is distinguished from [`ProtocolError::Truncated`] so callers can
    /// treat clean end-of-stream differently from a cut-off frame.
    #[error("end of stream")]
    Eof,

    /// The stream ended in the middle of a frame.
    ///
    /// A partial header or a payload shorter than its declared length.
    /// Fatal to the receiver: a torn frame is never retried.
    #[error("truncated frame")]
    Truncated,

    /// The frame header carried a message kind outside the fixed 0..=5 table.
    #[error("unknown message kind: {0}")]
    UnknownKind(u32),

    /// The declared payload length exceeds the sanity bound.
    ///
    /// Protects against a corrupt header turning into a multi-gigabyte
    /// allocation before the truncation is even noticed.
    #[error("frame payload of {0} bytes exceeds maximum")]
    FrameTooLarge(u32),

    /// A text payload (source or error text) was not valid UTF-8.
    #[error("invalid text payload: {0}")]
    InvalidText(#[from] std::string::FromUtf8Error),

    /// A decoded buffer carried bytes past the end of the frame.
    #[error("{0} trailing bytes after frame")]
    TrailingBytes(usize),

    /// A value contained a float that cannot round-trip through the codec.
    #[error("non-finite float {0} is not encodable")]
    NonFiniteFloat(f64),

    /// Value serialization failed.
    #[error("encode failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// Value deserialization failed (malformed or mistyped payload).
    #[error("decode failed: {0}")]
    Decode(#[source] serde_json::Error),

    /// Reading or writing the underlying stream failed.
    #[error("stream i/o failed: {0}")]
    Io(#[from] std::io::Error),
}
