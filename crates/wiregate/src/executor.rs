//! Executors: how a gateway runs source text it receives.
//!
//! The wire carries *source text* — the sending side's helper turns a
//! "thing to execute" into text before transmission, and the receiving
//! side's executor turns that text back into work. Rust has no runtime
//! evaluator, so the executor is a trait injected at gateway construction:
//! a peer decides what sources it honors and how they run.
//!
//! Whatever the executor does, the worker that drives it settles the
//! paired channel afterwards: a clean return closes it, a failure closes
//! it with the rendered error text.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::Channel;

/// A failure produced while executing received source.
///
/// The display text is what crosses the wire in `ChannelCloseError` and
/// what the initiating side's consumer ultimately sees as a
/// [`RemoteError`](crate::RemoteError).
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct ExecError(pub String);

impl ExecError {
    /// Wraps a failure description.
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }
}

/// Runs received source text against its paired channel.
///
/// Boxed futures keep the trait dyn-compatible, so one gateway can hold
/// `Arc<dyn Executor>` regardless of the concrete implementation.
pub trait Executor: Send + Sync + 'static {
    /// Executes `source` with `channel` bound to the peer's end of the
    /// initiating channel.
    fn execute(
        &self,
        source: &str,
        channel: Channel,
    ) -> BoxFuture<'static, Result<(), ExecError>>;
}

// ---------------------------------------------------------------------------
// RejectExecutor
// ---------------------------------------------------------------------------

/// An executor that refuses everything.
///
/// The default for gateways that only *initiate* executions: any
/// `ChannelOpen` arriving at such an endpoint fails back to the sender
/// instead of being silently dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct RejectExecutor;

impl Executor for RejectExecutor {
    fn execute(
        &self,
        source: &str,
        _channel: Channel,
    ) -> BoxFuture<'static, Result<(), ExecError>> {
        let text = format!(
            "this endpoint does not execute received source (got {:?})",
            source.chars().take(80).collect::<String>(),
        );
        Box::pin(async move { Err(ExecError(text)) })
    }
}

// ---------------------------------------------------------------------------
// HandlerExecutor
// ---------------------------------------------------------------------------

type Handler = Arc<
    dyn Fn(Channel) -> BoxFuture<'static, Result<(), ExecError>>
        + Send
        + Sync,
>;

/// An executor that maps exact source text to registered async handlers.
///
/// This is the practical executor for Rust peers: the two sides agree on a
/// vocabulary of source strings, and each string names a handler compiled
/// into the receiving binary. Unknown source fails back to the sender.
///
/// ## Example
///
/// ```rust
/// use wiregate::HandlerExecutor;
///
/// let executor = HandlerExecutor::new().register("echo", |channel| async move {
///     let value = channel.receive().await.map_err(wiregate::ExecError::from)?;
///     channel.send(value).map_err(wiregate::ExecError::from)?;
///     Ok(())
/// });
/// ```
#[derive(Default)]
pub struct HandlerExecutor {
    handlers: HashMap<String, Handler>,
}

impl HandlerExecutor {
    /// Creates an executor with no handlers registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for an exact source string.
    ///
    /// Builder-style so registration chains before the executor is handed
    /// to a gateway. Re-registering a source replaces the old handler.
    pub fn register<F, Fut>(mut self, source: impl Into<String>, f: F) -> Self
    where
        F: Fn(Channel) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<(), ExecError>>
            + Send
            + 'static,
    {
        self.handlers
            .insert(source.into(), Arc::new(move |ch| Box::pin(f(ch))));
        self
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns `true` if no handlers are registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Executor for HandlerExecutor {
    fn execute(
        &self,
        source: &str,
        channel: Channel,
    ) -> BoxFuture<'static, Result<(), ExecError>> {
        match self.handlers.get(source) {
            Some(handler) => handler(channel),
            None => {
                let text = format!("no handler registered for source {source:?}");
                Box::pin(async move { Err(ExecError(text)) })
            }
        }
    }
}

impl From<crate::GatewayError> for ExecError {
    /// Lets handlers use `?` on channel operations; the gateway error's
    /// display text becomes the remote failure text.
    fn from(e: crate::GatewayError) -> Self {
        Self(e.to_string())
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use wiregate_protocol::Value;

    fn channel() -> Channel {
        Channel::new(1, mpsc::unbounded_channel().0)
    }

    #[tokio::test]
    async fn test_reject_executor_fails_every_source() {
        let result = RejectExecutor.execute("anything", channel()).await;
        let err = result.expect_err("should reject");
        assert!(err.to_string().contains("does not execute"));
    }

    #[tokio::test]
    async fn test_handler_executor_runs_registered_handler() {
        let executor =
            HandlerExecutor::new().register("push-one", |ch| async move {
                ch.push(Value::Int(1));
                Ok(())
            });

        let ch = channel();
        executor
            .execute("push-one", ch.clone())
            .await
            .expect("handler should run");
        assert_eq!(ch.receive().await.unwrap(), Value::Int(1));
    }

    #[tokio::test]
    async fn test_handler_executor_unknown_source_fails() {
        let executor = HandlerExecutor::new();

        let err = executor
            .execute("mystery", channel())
            .await
            .expect_err("should fail");
        assert!(err.to_string().contains("no handler registered"));
        assert!(err.to_string().contains("mystery"));
    }

    #[tokio::test]
    async fn test_handler_executor_reregistering_replaces() {
        let executor = HandlerExecutor::new()
            .register("job", |_ch| async { Err(ExecError::new("old")) })
            .register("job", |_ch| async { Err(ExecError::new("new")) });
        assert_eq!(executor.len(), 1);

        let err = executor
            .execute("job", channel())
            .await
            .expect_err("should fail");
        assert_eq!(err.to_string(), "new");
    }

    #[test]
    fn test_exec_error_from_gateway_error_uses_display_text() {
        let err: ExecError = crate::GatewayError::Closed.into();
        assert_eq!(err.to_string(), "channel closed");
    }
}
