//! Channels: ordered, bidirectional value streams multiplexed over one
//! gateway.
//!
//! A channel is created in matched pairs — one end by `remote_exec` on the
//! initiating gateway, the other by the peer when it receives the paired
//! `ChannelOpen`. Both ends carry the same id and exchange values until one
//! side closes.
//!
//! State machine:
//!
//! ```text
//!   OPEN ──(ChannelClose received)──────→ CLOSED_OK
//!   OPEN ──(ChannelCloseError received)─→ CLOSED_ERROR
//! ```
//!
//! Both closed states are terminal for the latch, but items enqueued before
//! the close remain drainable afterward.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex};
use wiregate_protocol::{Message, Value};

use crate::{GatewayError, RemoteError};

/// Why a channel closed. Once set, final.
#[derive(Debug, Clone)]
pub(crate) enum CloseReason {
    /// The peer finished normally.
    Ok,
    /// The peer's execution failed; the error is surfaced to the consumer.
    Error(RemoteError),
}

impl CloseReason {
    fn into_error(self) -> GatewayError {
        match self {
            Self::Ok => GatewayError::Closed,
            Self::Error(e) => GatewayError::Remote(e),
        }
    }
}

/// What flows through a channel's item queue.
///
/// The close sentinel travels *through the queue* so that values enqueued
/// just before the close drain in order before the consumer observes it.
enum Item {
    Value(Value),
    Closed(CloseReason),
}

struct ChannelState {
    id: u32,
    /// Handle into the owning gateway's single outgoing queue. All frames
    /// funnel through one sender task, which is what guarantees per-channel
    /// FIFO order on the wire.
    outgoing: mpsc::UnboundedSender<Message>,
    item_tx: mpsc::UnboundedSender<Item>,
    items: Mutex<mpsc::UnboundedReceiver<Item>>,
    /// The close latch. Holding the sender inside the channel itself means
    /// `wait_close` subscribers never see the latch disappear.
    closed: watch::Sender<Option<CloseReason>>,
    /// Set once the consumer has dequeued the close sentinel; after that
    /// every `receive` short-circuits to the same (sticky) result.
    drained: std::sync::Mutex<Option<CloseReason>>,
}

/// One end of a value stream between the two gateways.
///
/// Cheap to clone; all clones refer to the same underlying queue and latch.
#[derive(Clone)]
pub struct Channel {
    state: Arc<ChannelState>,
}

impl Channel {
    pub(crate) fn new(
        id: u32,
        outgoing: mpsc::UnboundedSender<Message>,
    ) -> Self {
        let (item_tx, item_rx) = mpsc::unbounded_channel();
        let (closed, _) = watch::channel(None);
        Self {
            state: Arc::new(ChannelState {
                id,
                outgoing,
                item_tx,
                items: Mutex::new(item_rx),
                closed,
                drained: std::sync::Mutex::new(None),
            }),
        }
    }

    /// This channel's id, shared with its peer end.
    pub fn id(&self) -> u32 {
        self.state.id
    }

    /// Sends one value to the peer end.
    ///
    /// Never blocks: the value is encoded and enqueued on the gateway's
    /// outgoing queue, which is unbounded by design.
    ///
    /// # Errors
    /// - An encode error if the value cannot round-trip (non-finite float).
    /// - [`GatewayError::Disconnected`] if the gateway has been torn down.
    pub fn send(&self, value: Value) -> Result<(), GatewayError> {
        let msg = Message::data(self.state.id, &value)?;
        self.state
            .outgoing
            .send(msg)
            .map_err(|_| GatewayError::Disconnected)
    }

    /// Receives the next value from the peer end.
    ///
    /// Awaits until a value or the close sentinel is available. After an
    /// error close the same [`RemoteError`] keeps being returned; after a
    /// normal close, [`GatewayError::Closed`].
    pub async fn receive(&self) -> Result<Value, GatewayError> {
        let mut items = self.state.items.lock().await;

        // Sticky fast path once the close sentinel has been consumed.
        let drained = self.state.drained.lock().expect("drained lock").clone();
        if let Some(reason) = drained {
            return Err(reason.into_error());
        }

        match items.recv().await {
            Some(Item::Value(value)) => Ok(value),
            Some(Item::Closed(reason)) => {
                *self.state.drained.lock().expect("drained lock") =
                    Some(reason.clone());
                Err(reason.into_error())
            }
            // item_tx lives inside ChannelState, so this can't happen while
            // the channel is alive; kept as a defined fallback.
            None => Err(GatewayError::Disconnected),
        }
    }

    /// Waits for the close latch, up to `timeout`.
    ///
    /// # Errors
    /// - [`GatewayError::Timeout`] if the latch isn't set in time.
    /// - The stored [`RemoteError`] if the channel closed with one.
    pub async fn wait_close(
        &self,
        timeout: Duration,
    ) -> Result<(), GatewayError> {
        let mut latch = self.state.closed.subscribe();
        let wait = async {
            loop {
                if let Some(reason) = latch.borrow_and_update().clone() {
                    return reason;
                }
                // Can't fail: the watch sender is owned by this channel.
                let _ = latch.changed().await;
            }
        };
        match tokio::time::timeout(timeout, wait).await {
            Ok(CloseReason::Ok) => Ok(()),
            Ok(CloseReason::Error(e)) => Err(GatewayError::Remote(e)),
            Err(_) => Err(GatewayError::Timeout),
        }
    }

    /// Enqueues a value received from the wire.
    pub(crate) fn push(&self, value: Value) {
        let _ = self.state.item_tx.send(Item::Value(value));
    }

    /// Latches the channel closed.
    ///
    /// Sets the latch first (so `wait_close` observers wake immediately),
    /// then threads the sentinel through the item queue behind any values
    /// still waiting to be drained.
    pub(crate) fn close(&self, reason: CloseReason) {
        self.state.closed.send_replace(Some(reason.clone()));
        let _ = self.state.item_tx.send(Item::Closed(reason));
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.state.id)
            .finish_non_exhaustive()
    }
}

// =========================================================================
// Tests
// =========================================================================
