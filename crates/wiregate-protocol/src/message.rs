//! Wire frames and message kinds.
//!
//! Every unit on the wire is one frame:
//!
//! ```text
//! ┌──────────────┬────────────────┬──────────────┬─────────────┐
//! │ msgtype: u32 │ channelid: u32 │ length: u32  │ payload     │
//! │ (big-endian) │ (big-endian)   │ (big-endian) │ length bytes│
//! └──────────────┴────────────────┴──────────────┴─────────────┘
//! ```
//!
//! The numeric kind table is part of the wire contract and comes from
//! sorting the kind names lexicographically. Reordering or extending it
//! without a protocol version bump breaks interoperability.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{ProtocolError, Value};

/// Size of the fixed frame header in bytes (three big-endian `u32`s).
pub const HEADER_LEN: usize = 12;

/// Sanity bound on a single frame's payload.
///
/// Each channel item is one complete serialized value, so frames are
/// expected to stay small; anything past this bound is treated as a
/// corrupt header rather than a legitimate payload.
pub const MAX_PAYLOAD_LEN: u32 = 16 * 1024 * 1024;

// ---------------------------------------------------------------------------
// MessageKind
// ---------------------------------------------------------------------------

/// The six message kinds, with their fixed wire ids.
///
/// The ids are the lexicographic rank of the kind names — a reimplementation
/// must reproduce this numbering exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MessageKind {
    /// Channel closed normally on the sending side.
    ChannelClose = 0,
    /// Channel closed because remote execution failed; payload is the
    /// rendered failure text.
    ChannelCloseError = 1,
    /// One value for a channel; payload is an encoded [`Value`].
    ChannelData = 2,
    /// Request to execute source text; payload is the source.
    ChannelOpen = 3,
    /// Shutdown initiator's half of the exit handshake.
    ExitGateway = 4,
    /// Responder's half of the exit handshake.
    StopReceiving = 5,
}

impl MessageKind {
    /// Maps a wire id back to a kind.
    fn from_wire(id: u32) -> Result<Self, ProtocolError> {
        match id {
            0 => Ok(Self::ChannelClose),
            1 => Ok(Self::ChannelCloseError),
            2 => Ok(Self::ChannelData),
            3 => Ok(Self::ChannelOpen),
            4 => Ok(Self::ExitGateway),
            5 => Ok(Self::StopReceiving),
            other => Err(ProtocolError::UnknownKind(other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// One decoded protocol frame.
///
/// Messages are transient: one exists only for the hop between a queue and
/// the wire (or the wire and a dispatch). The enum-per-kind shape keeps
/// dispatch a plain `match` over the fixed kind set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Latches channel `channel_id` closed with no error.
    ChannelClose { channel_id: u32 },

    /// Latches channel `channel_id` closed with a remote failure.
    ChannelCloseError { channel_id: u32, text: String },

    /// Carries one encoded value for channel `channel_id`.
    ChannelData { channel_id: u32, data: Vec<u8> },

    /// Asks the peer to execute `source` bound to channel `channel_id`.
    ChannelOpen { channel_id: u32, source: String },

    /// Control: the peer has stopped its workers and is done sending
    /// application messages.
    ExitGateway,

    /// Control: the peer has observed [`Message::ExitGateway`] and is done
    /// sending too; the receiver loop can end.
    StopReceiving,
}

impl Message {
    /// Returns this message's wire kind.
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::ChannelClose { .. } => MessageKind::ChannelClose,
            Self::ChannelCloseError { .. } => MessageKind::ChannelCloseError,
            Self::ChannelData { .. } => MessageKind::ChannelData,
            Self::ChannelOpen { .. } => MessageKind::ChannelOpen,
            Self::ExitGateway => MessageKind::ExitGateway,
            Self::StopReceiving => MessageKind::StopReceiving,
        }
    }

    /// Returns the channel id carried in the header (0 for control kinds).
    pub fn channel_id(&self) -> u32 {
        match self {
            Self::ChannelClose { channel_id }
            | Self::ChannelCloseError { channel_id, .. }
            | Self::ChannelData { channel_id, .. }
            | Self::ChannelOpen { channel_id, .. } => *channel_id,
            Self::ExitGateway | Self::StopReceiving => 0,
        }
    }

    /// Builds a `ChannelData` message from a value.
    ///
    /// # Errors
    /// Returns an encode error if the value cannot round-trip (e.g. a
    /// non-finite float).
    pub fn data(channel_id: u32, value: &Value) -> Result<Self, ProtocolError> {
        Ok(Self::ChannelData {
            channel_id,
            data: value.to_bytes()?,
        })
    }

    fn payload(&self) -> &[u8] {
        match self {
            Self::ChannelClose { .. }
            | Self::ExitGateway
            | Self::StopReceiving => &[],
            Self::ChannelCloseError { text, .. } => text.as_bytes(),
            Self::ChannelData { data, .. } => data,
            Self::ChannelOpen { source, .. } => source.as_bytes(),
        }
    }

    /// Rebuilds a message from its header fields and payload.
    fn from_wire(
        kind: u32,
        channel_id: u32,
        payload: Vec<u8>,
    ) -> Result<Self, ProtocolError> {
        match MessageKind::from_wire(kind)? {
            MessageKind::ChannelClose => Ok(Self::ChannelClose { channel_id }),
            MessageKind::ChannelCloseError => Ok(Self::ChannelCloseError {
                channel_id,
                text: String::from_utf8(payload)?,
            }),
            MessageKind::ChannelData => Ok(Self::ChannelData {
                channel_id,
                data: payload,
            }),
            MessageKind::ChannelOpen => Ok(Self::ChannelOpen {
                channel_id,
                source: String::from_utf8(payload)?,
            }),
            MessageKind::ExitGateway => Ok(Self::ExitGateway),
            MessageKind::StopReceiving => Ok(Self::StopReceiving),
        }
    }

    // -- Encoding -----------------------------------------------------------

    /// Encodes this message as one complete frame.
    pub fn encode(&self) -> Vec<u8> {
        let payload = self.payload();
        let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
        buf.extend_from_slice(&(self.kind() as u32).to_be_bytes());
        buf.extend_from_slice(&self.channel_id().to_be_bytes());
        buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        buf.extend_from_slice(payload);
        buf
    }

    /// Decodes exactly one frame from a buffer. The exact inverse of
    /// [`Message::encode`].
    ///
    /// # Errors
    /// - [`ProtocolError::Truncated`] if the buffer is shorter than the
    ///   header plus the declared payload length.
    /// - [`ProtocolError::TrailingBytes`] if bytes remain past the frame.
    /// - Header validation errors as in [`Message::read_from`].
    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() < HEADER_LEN {
            return Err(ProtocolError::Truncated);
        }
        let mut header = [0u8; HEADER_LEN];
        header.copy_from_slice(&buf[..HEADER_LEN]);
        let (kind, channel_id, len) = parse_header(&header)?;
        let end = HEADER_LEN + len as usize;
        if buf.len() < end {
            return Err(ProtocolError::Truncated);
        }
        if buf.len() > end {
            return Err(ProtocolError::TrailingBytes(buf.len() - end));
        }
        Self::from_wire(kind, channel_id, buf[HEADER_LEN..end].to_vec())
    }

    // -- Stream i/o ---------------------------------------------------------

    /// Reads one complete frame from a stream.
    ///
    /// Awaits until the full frame has arrived. A clean end-of-stream before
    /// the first header byte is [`ProtocolError::Eof`]; running out of bytes
    /// anywhere inside a frame is [`ProtocolError::Truncated`].
    pub async fn read_from<R>(reader: &mut R) -> Result<Self, ProtocolError>
    where
        R: AsyncRead + Unpin,
    {
        let mut header = [0u8; HEADER_LEN];
        let mut filled = 0;
        while filled < HEADER_LEN {
            let n = reader.read(&mut header[filled..]).await?;
            if n == 0 {
                return Err(if filled == 0 {
                    ProtocolError::Eof
                } else {
                    ProtocolError::Truncated
                });
            }
            filled += n;
        }

        let (kind, channel_id, len) = parse_header(&header)?;
        let mut payload = vec![0u8; len as usize];
        reader.read_exact(&mut payload).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                ProtocolError::Truncated
            } else {
                ProtocolError::Io(e)
            }
        })?;

        Self::from_wire(kind, channel_id, payload)
    }

    /// Writes this message as one frame and flushes the stream.
    pub async fn write_to<W>(&self, writer: &mut W) -> Result<(), ProtocolError>
    where
        W: AsyncWrite + Unpin,
    {
        writer.write_all(&self.encode()).await?;
        writer.flush().await?;
        Ok(())
    }
}

/// Splits a raw header into (kind, channel id, payload length), validating
/// the length bound. Kind validation happens later in `from_wire` so the
/// payload of an unknown kind is still drained consistently by `decode`.
fn parse_header(
    header: &[u8; HEADER_LEN],
) -> Result<(u32, u32, u32), ProtocolError> {
    let word = |at: usize| {
        u32::from_be_bytes([
            header[at],
            header[at + 1],
            header[at + 2],
            header[at + 3],
        ])
    };
    let kind = word(0);
    let channel_id = word(4);
    let len = word(8);
    if len > MAX_PAYLOAD_LEN {
        return Err(ProtocolError::FrameTooLarge(len));
    }
    Ok((kind, channel_id, len))
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! The kind numbering and header layout are wire contracts; these tests
    //! pin the exact bytes, not just round-trip symmetry.

    use super::*;

    fn all_kinds() -> Vec<Message> {
        vec![
            Message::ChannelClose { channel_id: 7 },
            Message::ChannelCloseError {
                channel_id: 7,
                text: "Traceback: boom".into(),
            },
            Message::ChannelData {
                channel_id: 7,
                data: vec![1, 2, 3],
            },
            Message::ChannelOpen {
                channel_id: 7,
                source: "channel.send(1)".into(),
            },
            Message::ExitGateway,
            Message::StopReceiving,
        ]
    }

    // =====================================================================
    // Kind table
    // =====================================================================

    #[test]
    fn test_kind_table_matches_lexicographic_order() {
        assert_eq!(MessageKind::ChannelClose as u32, 0);
        assert_eq!(MessageKind::ChannelCloseError as u32, 1);
        assert_eq!(MessageKind::ChannelData as u32, 2);
        assert_eq!(MessageKind::ChannelOpen as u32, 3);
        assert_eq!(MessageKind::ExitGateway as u32, 4);
        assert_eq!(MessageKind::StopReceiving as u32, 5);
    }

    #[test]
    fn test_kind_from_wire_rejects_out_of_table_ids() {
        assert!(matches!(
            MessageKind::from_wire(6),
            Err(ProtocolError::UnknownKind(6))
        ));
        assert!(matches!(
            MessageKind::from_wire(u32::MAX),
            Err(ProtocolError::UnknownKind(_))
        ));
    }

    #[test]
    fn test_control_kinds_carry_channel_id_zero() {
        assert_eq!(Message::ExitGateway.channel_id(), 0);
        assert_eq!(Message::StopReceiving.channel_id(), 0);
    }

    // =====================================================================
    // Header layout
    // =====================================================================

    #[test]
    fn test_encode_header_is_three_big_endian_u32s() {
        let msg = Message::ChannelData {
            channel_id: 0x01020304,
            data: b"hi".to_vec(),
        };
        let bytes = msg.encode();

        // msgtype 2, channelid 0x01020304, length 2, then the payload.
        assert_eq!(&bytes[0..4], &[0, 0, 0, 2]);
        assert_eq!(&bytes[4..8], &[1, 2, 3, 4]);
        assert_eq!(&bytes[8..12], &[0, 0, 0, 2]);
        assert_eq!(&bytes[12..], b"hi");
    }

    #[test]
    fn test_encode_empty_payload_is_header_only() {
        let bytes = Message::ChannelClose { channel_id: 9 }.encode();
        assert_eq!(bytes.len(), HEADER_LEN);
        assert_eq!(&bytes[8..12], &[0, 0, 0, 0]);
    }

    // =====================================================================
    // encode / decode round trip
    // =====================================================================

    #[test]
    fn test_decode_encode_round_trips_every_kind() {
        for msg in all_kinds() {
            let decoded =
                Message::decode(&msg.encode()).expect("should decode");
            assert_eq!(decoded, msg);
        }
    }

    #[test]
    fn test_decode_short_header_is_truncated() {
        let result = Message::decode(&[0, 0, 0, 2, 0]);
        assert!(matches!(result, Err(ProtocolError::Truncated)));
    }

    #[test]
    fn test_decode_short_payload_is_truncated() {
        let mut bytes = Message::ChannelData {
            channel_id: 1,
            data: vec![9, 9, 9],
        }
        .encode();
        bytes.pop();

        let result = Message::decode(&bytes);
        assert!(matches!(result, Err(ProtocolError::Truncated)));
    }

    #[test]
    fn test_decode_rejects_trailing_bytes() {
        let mut bytes = Message::ExitGateway.encode();
        bytes.push(0xFF);

        let result = Message::decode(&bytes);
        assert!(matches!(result, Err(ProtocolError::TrailingBytes(1))));
    }

    #[test]
    fn test_decode_unknown_kind_fails() {
        let mut bytes = Message::ExitGateway.encode();
        bytes[3] = 6;

        let result = Message::decode(&bytes);
        assert!(matches!(result, Err(ProtocolError::UnknownKind(6))));
    }

    #[test]
    fn test_decode_oversized_length_fails_before_allocating() {
        let mut bytes = Message::ExitGateway.encode();
        bytes[8..12].copy_from_slice(&u32::MAX.to_be_bytes());

        let result = Message::decode(&bytes);
        assert!(matches!(result, Err(ProtocolError::FrameTooLarge(_))));
    }

    #[test]
    fn test_decode_non_utf8_source_fails() {
        let mut bytes = Message::ChannelOpen {
            channel_id: 1,
            source: "ab".into(),
        }
        .encode();
        bytes[12] = 0xFF;
        bytes[13] = 0xFE;

        let result = Message::decode(&bytes);
        assert!(matches!(result, Err(ProtocolError::InvalidText(_))));
    }

    // =====================================================================
    // Stream i/o
    // =====================================================================

    #[tokio::test]
    async fn test_read_from_reads_back_to_back_frames() {
        let mut wire = Vec::new();
        for msg in all_kinds() {
            wire.extend_from_slice(&msg.encode());
        }

        let mut reader = wire.as_slice();
        for expected in all_kinds() {
            let msg = Message::read_from(&mut reader)
                .await
                .expect("should read frame");
            assert_eq!(msg, expected);
        }
        assert!(matches!(
            Message::read_from(&mut reader).await,
            Err(ProtocolError::Eof)
        ));
    }

    #[tokio::test]
    async fn test_read_from_clean_eof_at_frame_boundary() {
        let mut reader: &[u8] = &[];
        assert!(matches!(
            Message::read_from(&mut reader).await,
            Err(ProtocolError::Eof)
        ));
    }

    #[tokio::test]
    async fn test_read_from_eof_inside_header_is_truncated() {
        let mut reader: &[u8] = &[0, 0, 0, 2, 0, 0];
        assert!(matches!(
            Message::read_from(&mut reader).await,
            Err(ProtocolError::Truncated)
        ));
    }

    #[tokio::test]
    async fn test_read_from_eof_inside_payload_is_truncated() {
        let full = Message::ChannelData {
            channel_id: 1,
            data: vec![1, 2, 3, 4],
        }
        .encode();
        let mut reader = &full[..full.len() - 2];
        assert!(matches!(
            Message::read_from(&mut reader).await,
            Err(ProtocolError::Truncated)
        ));
    }

    #[tokio::test]
    async fn test_write_to_then_read_from_round_trips() {
        let msg = Message::ChannelOpen {
            channel_id: 4,
            source: "echo".into(),
        };

        let mut wire = Vec::new();
        msg.write_to(&mut wire).await.expect("should write");

        let mut reader = wire.as_slice();
        let decoded = Message::read_from(&mut reader)
            .await
            .expect("should read");
        assert_eq!(decoded, msg);
    }
}
