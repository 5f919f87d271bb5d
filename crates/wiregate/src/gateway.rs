//! The gateway: one end of the execution protocol over one duplex stream.
//!
//! A gateway owns three kinds of protocol tasks:
//!   - **receiver** — reads frames off the stream and dispatches them
//!   - **sender** — the *only* writer: drains the single outgoing queue
//!   - **workers** — a small pool executing received source
//!
//! plus one watchdog that flips the `done` latch when both i/o tasks have
//! terminated; `join` waits on that latch.
//!
//! All cross-task handoff goes through unbounded queues; the only other
//! shared mutable state is the channel factory table. Because every frame
//! funnels through the one sender task, wire order equals enqueue order,
//! which is what gives each channel FIFO delivery.
//!
//! # Shutdown handshake
//!
//! ```text
//! initiator                               peer
//! ─────────                               ────
//! exit(): stop workers
//!         send ExitGateway ────────────→  receiver: stop workers
//!         (post-send: half-close,           enqueue StopReceiving
//!          sender stops)                    receiver loop ends
//!                          ←──────────── send StopReceiving
//! receiver: loop ends                     (post-send: half-close,
//!                                          sender stops)
//! ```
//!
//! Neither side half-closes its write side before it has flushed every
//! pending application frame — the control frame rides the same queue
//! behind them.

use std::sync::Arc;

use tokio::io::{AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use wiregate_protocol::{Message, MessageKind, ProtocolError, Value};
use wiregate_transport::ByteStream;

use crate::channel::CloseReason;
use crate::factory::ChannelFactory;
use crate::{Channel, Executor, GatewayError, RejectExecutor, RemoteError};

/// Default size of the worker pool.
pub const DEFAULT_WORKERS: usize = 2;

/// Default first channel id for the exec-initiating side. A bare/serving
/// side uses start id 1 so the two parities never collide.
pub const DEFAULT_START_ID: u32 = 2;

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for configuring and spawning a [`Gateway`].
///
/// # Example
///
/// ```rust,ignore
/// let gateway = Gateway::builder()
///     .start_id(1)
///     .executor(my_handlers)
///     .spawn(stream);
/// ```
pub struct GatewayBuilder {
    start_id: u32,
    workers: usize,
    executor: Arc<dyn Executor>,
}

impl GatewayBuilder {
    /// Creates a builder with the defaults: start id 2, two workers, and
    /// the rejecting executor.
    pub fn new() -> Self {
        Self {
            start_id: DEFAULT_START_ID,
            workers: DEFAULT_WORKERS,
            executor: Arc::new(RejectExecutor),
        }
    }

    /// Sets the first channel id this side allocates. The two ends of a
    /// connection must use different parities.
    pub fn start_id(mut self, start_id: u32) -> Self {
        self.start_id = start_id;
        self
    }

    /// Sets the worker pool size.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Sets the executor that runs received source.
    pub fn executor(mut self, executor: impl Executor) -> Self {
        self.executor = Arc::new(executor);
        self
    }

    /// Splits the stream and starts the receiver, sender, and worker tasks.
    pub fn spawn<S: ByteStream>(self, stream: S) -> Gateway {
        let (rd, wr) = tokio::io::split(stream);
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (exec_tx, exec_rx) = mpsc::unbounded_channel();
        let exec_rx = Arc::new(Mutex::new(exec_rx));

        let (done, _) = watch::channel(false);
        let shared = Arc::new(Shared {
            outgoing: out_tx,
            exec_tx,
            factory: ChannelFactory::new(self.start_id),
            workers: std::sync::Mutex::new(None),
            done,
        });

        let mut workers = Vec::with_capacity(self.workers);
        for worker_id in 0..self.workers {
            workers.push(tokio::spawn(worker_loop(
                worker_id,
                Arc::clone(&exec_rx),
                shared.outgoing.clone(),
                Arc::clone(&self.executor),
            )));
        }
        *shared.workers.lock().expect("worker lock") = Some(workers);

        let receiver = tokio::spawn(receiver_loop(rd, Arc::clone(&shared)));
        let sender = tokio::spawn(sender_loop(wr, out_rx));
        tokio::spawn({
            let shared = Arc::clone(&shared);
            async move {
                let _ = receiver.await;
                let _ = sender.await;
                shared.done.send_replace(true);
            }
        });

        tracing::debug!(
            start_id = self.start_id,
            workers = self.workers,
            "gateway spawned"
        );
        Gateway { shared }
    }
}

impl Default for GatewayBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

struct Shared {
    /// The single outgoing queue. Everything written to the wire — data,
    /// closes, control frames — is enqueued here and drained by the one
    /// sender task.
    outgoing: mpsc::UnboundedSender<Message>,
    exec_tx: mpsc::UnboundedSender<Task>,
    factory: ChannelFactory,
    /// Worker join handles; `take`n exactly once by whichever side stops
    /// the workers first (a local `exit` or a received `ExitGateway`).
    workers: std::sync::Mutex<Option<Vec<JoinHandle<()>>>>,
    /// Flips to `true` once both i/o tasks have terminated. A latch rather
    /// than the handles themselves, so any number of concurrent `join`
    /// callers (the gateway is `Clone`) can all wait on it.
    done: watch::Sender<bool>,
}

impl Shared {
    /// Stops the worker pool if it is still running: one stop sentinel per
    /// worker, then await them all. Returns whether this call did the stop.
    async fn stop_workers(&self) -> bool {
        let handles = self.workers.lock().expect("worker lock").take();
        let Some(handles) = handles else {
            return false;
        };
        for _ in &handles {
            let _ = self.exec_tx.send(Task::Stop);
        }
        // A worker may be parked in `receive()` on a channel that will
        // never see another frame; latch every open channel closed so it
        // unblocks and the worker can reach its stop sentinel.
        for channel in self.factory.channels() {
            channel.close(CloseReason::Ok);
        }
        for handle in handles {
            let _ = handle.await;
        }
        tracing::debug!("worker pool stopped");
        true
    }
}

/// One end of an execution gateway.
///
/// Cheap to clone; all clones drive the same connection. `exit()` followed
/// by `join()` drives the gateway to its terminal, inert state.
#[derive(Clone)]
pub struct Gateway {
    shared: Arc<Shared>,
}

impl Gateway {
    /// Creates a builder with default settings.
    pub fn builder() -> GatewayBuilder {
        GatewayBuilder::new()
    }

    /// Spawns a gateway with default settings over the given stream.
    pub fn spawn<S: ByteStream>(stream: S) -> Self {
        GatewayBuilder::new().spawn(stream)
    }

    /// Ships `source` to the peer for asynchronous execution.
    ///
    /// Allocates a channel, enqueues the paired `ChannelOpen`, and returns
    /// the local end immediately; the peer executes with its end of the
    /// same channel in scope.
    ///
    /// # Errors
    /// [`GatewayError::Disconnected`] if the gateway has been torn down.
    pub fn remote_exec(
        &self,
        source: impl Into<String>,
    ) -> Result<Channel, GatewayError> {
        let channel = self.shared.factory.new_channel(&self.shared.outgoing);
        let msg = Message::ChannelOpen {
            channel_id: channel.id(),
            source: source.into(),
        };
        self.shared
            .outgoing
            .send(msg)
            .map_err(|_| GatewayError::Disconnected)?;
        tracing::debug!(channel_id = channel.id(), "remote exec requested");
        Ok(channel)
    }

    /// Initiates the shutdown handshake.
    ///
    /// If the workers are still running: stop them, await them, then
    /// enqueue `ExitGateway` (whose post-send action half-closes the write
    /// side). Otherwise a no-op, so repeated or racing calls are safe.
    ///
    /// Any channel still open is latched closed so in-flight executions
    /// wind down instead of blocking shutdown.
    pub async fn exit(&self) {
        if self.shared.stop_workers().await {
            let _ = self.shared.outgoing.send(Message::ExitGateway);
            tracing::debug!("exit initiated");
        }
    }

    /// Waits until the receiver and sender tasks have terminated.
    ///
    /// Every caller blocks until teardown completes, however many clones
    /// join concurrently; once the tasks are down, returns immediately.
    pub async fn join(&self) {
        let mut done = self.shared.done.subscribe();
        while !*done.borrow_and_update() {
            // Can't fail: the latch sender lives in the shared state this
            // gateway holds.
            if done.changed().await.is_err() {
                break;
            }
        }
    }

    /// Number of channels currently registered on this side.
    pub fn open_channels(&self) -> usize {
        self.shared.factory.len()
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("open_channels", &self.open_channels())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Worker pool
// ---------------------------------------------------------------------------

/// What flows through the execution queue.
enum Task {
    /// Execute `source` with `channel` in scope.
    Run { channel: Channel, source: String },
    /// Stop sentinel; each worker consumes exactly one and exits.
    Stop,
}

async fn worker_loop(
    worker_id: usize,
    tasks: Arc<Mutex<mpsc::UnboundedReceiver<Task>>>,
    outgoing: mpsc::UnboundedSender<Message>,
    executor: Arc<dyn Executor>,
) {
    loop {
        // Lock only around the dequeue so the pool shares one queue without
        // serializing execution.
        let task = { tasks.lock().await.recv().await };
        match task {
            Some(Task::Run { channel, source }) => {
                let channel_id = channel.id();
                tracing::debug!(worker_id, channel_id, "executing source");

                let fut = executor.execute(&source, channel);
                let result = futures_util::FutureExt::catch_unwind(
                    std::panic::AssertUnwindSafe(fut),
                )
                .await;

                let reply = match result {
                    Ok(Ok(())) => Message::ChannelClose { channel_id },
                    Ok(Err(e)) => {
                        tracing::debug!(
                            worker_id,
                            channel_id,
                            error = %e,
                            "execution failed"
                        );
                        Message::ChannelCloseError {
                            channel_id,
                            text: e.to_string(),
                        }
                    }
                    Err(panic) => Message::ChannelCloseError {
                        channel_id,
                        text: panic_text(panic),
                    },
                };
                let _ = outgoing.send(reply);
            }
            Some(Task::Stop) | None => break,
        }
    }
    tracing::debug!(worker_id, "worker stopped");
}

fn panic_text(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("execution panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("execution panicked: {s}")
    } else {
        "execution panicked".to_string()
    }
}

// ---------------------------------------------------------------------------
// Receiver
// ---------------------------------------------------------------------------

/// Whether the receiver loop keeps going after a dispatch.
enum Flow {
    Continue,
    Stop,
}

async fn receiver_loop<S: ByteStream>(
    mut rd: ReadHalf<S>,
    shared: Arc<Shared>,
) {
    loop {
        match Message::read_from(&mut rd).await {
            Ok(msg) => match dispatch(&shared, msg).await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Stop) => break,
                Err(e) => {
                    // Protocol violations are fatal to the receiver; the
                    // gateway becomes half-dead and sends eventually fail.
                    tracing::error!(error = %e, "receiver dispatch failed");
                    break;
                }
            },
            Err(ProtocolError::Eof) => {
                tracing::debug!("peer closed its write half");
                break;
            }
            Err(e) => {
                tracing::error!(error = %e, "malformed frame; receiver stopping");
                break;
            }
        }
    }
    tracing::debug!("receiver loop ended");
}

/// Applies one received message. A plain `match` over the fixed kind set.
async fn dispatch(
    shared: &Arc<Shared>,
    msg: Message,
) -> Result<Flow, GatewayError> {
    match msg {
        Message::ChannelOpen { channel_id, source } => {
            let channel = shared.factory.register(channel_id, &shared.outgoing);
            let queued = shared
                .exec_tx
                .send(Task::Run { channel, source })
                .is_ok();
            if !queued {
                // Workers already stopped (we are mid-shutdown); fail the
                // open back instead of leaving the peer's channel hanging.
                let _ = shared.factory.remove(channel_id);
                let _ = shared.outgoing.send(Message::ChannelCloseError {
                    channel_id,
                    text: "gateway is exiting; execution refused".into(),
                });
            }
        }

        Message::ChannelData { channel_id, data } => {
            let channel = shared.factory.get(channel_id)?;
            let value = Value::from_bytes(&data)?;
            channel.push(value);
        }

        Message::ChannelClose { channel_id } => {
            let channel = shared.factory.remove(channel_id)?;
            channel.close(CloseReason::Ok);
        }

        Message::ChannelCloseError { channel_id, text } => {
            // Error closes deregister too; an error-closed channel keeps
            // its sticky error in the channel itself, not in the table.
            let channel = shared.factory.remove(channel_id)?;
            channel.close(CloseReason::Error(RemoteError::new(text)));
        }

        Message::ExitGateway => {
            // The peer has stopped sending application frames. Mirror it:
            // stop our workers, tell the peer we are done sending, and end
            // this receiver loop.
            shared.stop_workers().await;
            let _ = shared.outgoing.send(Message::StopReceiving);
            return Ok(Flow::Stop);
        }

        Message::StopReceiving => return Ok(Flow::Stop),
    }
    Ok(Flow::Continue)
}

// ---------------------------------------------------------------------------
// Sender
// ---------------------------------------------------------------------------

async fn sender_loop<S: ByteStream>(
    mut wr: WriteHalf<S>,
    mut outgoing: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(msg) = outgoing.recv().await {
        let kind = msg.kind();
        match msg.write_to(&mut wr).await {
            Ok(()) => {
                // Post-send action: after either half of the exit
                // handshake goes out, half-close so the peer sees EOF
                // behind it, and stop writing.
                if matches!(
                    kind,
                    MessageKind::ExitGateway | MessageKind::StopReceiving
                ) {
                    if let Err(e) = wr.shutdown().await {
                        tracing::debug!(error = %e, "write half-close failed");
                    }
                    break;
                }
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    kind = ?kind,
                    "write failed; sender stopping"
                );
                let _ = wr.shutdown().await;
                break;
            }
        }
    }
    tracing::debug!("sender loop ended");
}
