//! Error types for the gateway layer.

use wiregate_protocol::ProtocolError;

/// A peer-side execution failure, carried to the local consumer.
///
/// The text is the peer's rendering of whatever went wrong — there is no
/// structured exception marshaling across the wire, so the text *is* the
/// error. It is sticky: an error-closed channel surfaces the same
/// `RemoteError` on every subsequent receive rather than degrading to
/// silent emptiness.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{text}")]
pub struct RemoteError {
    text: String,
}

impl RemoteError {
    /// Wraps a rendered failure text.
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// The failure text as sent by the peer.
    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Errors surfaced by gateways and channels.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The peer's execution of this channel's source failed.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// The channel closed normally and its item queue is drained.
    #[error("channel closed")]
    Closed,

    /// A `wait_close` deadline elapsed before the channel closed.
    #[error("timed out waiting for channel close")]
    Timeout,

    /// A frame referenced a channel id this gateway doesn't know.
    #[error("no channel with id {0}")]
    ChannelNotFound(u32),

    /// The gateway's i/o tasks have terminated; nothing can be sent.
    #[error("gateway is no longer running")]
    Disconnected,

    /// A framing or codec error (see [`ProtocolError`]).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_displays_bare_text() {
        // The display form must be exactly the peer's text — consumers
        // match on it, and decoration would leak into their messages.
        let err = RemoteError::new("boom");
        assert_eq!(err.to_string(), "boom");
        assert_eq!(err.text(), "boom");
    }

    #[test]
    fn test_gateway_error_is_transparent_for_remote() {
        let err: GatewayError = RemoteError::new("worker died").into();
        assert_eq!(err.to_string(), "worker died");
        assert!(matches!(err, GatewayError::Remote(_)));
    }

    #[test]
    fn test_protocol_error_converts() {
        let err: GatewayError = ProtocolError::Truncated.into();
        assert!(matches!(err, GatewayError::Protocol(_)));
    }
}
