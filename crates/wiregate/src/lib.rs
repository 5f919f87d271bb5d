//! # Wiregate
//!
//! A bidirectional execution gateway: ship source text to a peer for
//! asynchronous execution and exchange values with it over multiplexed,
//! independently-identified channels — all on one raw duplex byte stream
//! (a socket, a pipe, or an in-memory pair).
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use wiregate::{ExecError, Gateway, HandlerExecutor, Value};
//!
//! # async fn run() -> Result<(), wiregate::GatewayError> {
//! // One end executes; it registers the sources it honors.
//! let (near, far) = wiregate::pair();
//! let _peer = Gateway::builder()
//!     .start_id(1)
//!     .executor(HandlerExecutor::new().register("echo", |channel| async move {
//!         let value = channel.receive().await.map_err(ExecError::from)?;
//!         channel.send(value).map_err(ExecError::from)?;
//!         Ok(())
//!     }))
//!     .spawn(far);
//!
//! // The other end initiates.
//! let gateway = Gateway::spawn(near);
//! let channel = gateway.remote_exec("echo")?;
//! channel.send(Value::Int(42))?;
//! assert_eq!(channel.receive().await?, Value::Int(42));
//! channel.wait_close(Duration::from_secs(1)).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Layers
//!
//! ```text
//! wiregate-transport (bytes) → wiregate-protocol (frames, values)
//!                            → wiregate (channels, workers, shutdown)
//! ```

mod channel;
mod error;
mod executor;
mod factory;
mod gateway;
mod registry;

pub use channel::Channel;
pub use error::{GatewayError, RemoteError};
pub use executor::{ExecError, Executor, HandlerExecutor, RejectExecutor};
pub use gateway::{
    Gateway, GatewayBuilder, DEFAULT_START_ID, DEFAULT_WORKERS,
};
pub use registry::GatewayRegistry;

// Re-exported so most users need only this crate.
pub use wiregate_protocol::{Message, MessageKind, ProtocolError, Value};
pub use wiregate_transport::{pair, ByteStream, Listener, TransportError};
