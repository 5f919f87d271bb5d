//! Transport abstraction layer for Wiregate.
//!
//! A gateway needs exactly one thing from its transport: a raw duplex byte
//! stream with blocking-style reads, writes, and half-close. The
//! [`ByteStream`] trait names that contract; anything satisfying it — a TCP
//! socket, a pipe to a child process, an in-memory pair — can carry a
//! gateway.
//!
//! The stream contract, in tokio terms:
//! - `read(n)` → `AsyncReadExt::read_exact` (full n bytes or EOF)
//! - `write(bytes)` → `AsyncWriteExt::write_all`
//! - `close_write()` → `AsyncWriteExt::shutdown` — a *half*-close: the peer
//!   can keep being read from after local writes stop, which the exit
//!   handshake depends on.

mod error;
mod tcp;

pub use error::TransportError;
pub use tcp::{connect, Listener};

use tokio::io::{AsyncRead, AsyncWrite, DuplexStream};

/// The duplex stream contract a gateway runs over.
///
/// Blanket-implemented, so this is a name for a set of bounds rather than
/// something to implement by hand.
pub trait ByteStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> ByteStream for T where
    T: AsyncRead + AsyncWrite + Send + Unpin + 'static
{
}

/// Buffer size for in-memory stream pairs.
///
/// Large enough that neither side's writer stalls mid-frame in tests and
/// demos; the gateway's own queues are unbounded, this only bounds bytes
/// in flight on the simulated wire.
const PAIR_BUFFER: usize = 256 * 1024;

/// Creates a linked in-memory stream pair.
///
/// Bytes written to one end appear on the other, in both directions, with
/// working half-close semantics. This is the transport used by tests and
/// in-process demos; production peers use [`Listener`] / [`connect`].
pub fn pair() -> (DuplexStream, DuplexStream) {
    tokio::io::duplex(PAIR_BUFFER)
}

// =========================================================================
// Tests
// =========================================================================
