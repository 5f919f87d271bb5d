/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Binding a listener failed.
    #[error("bind failed: {0}")]
    Bind(#[source] std::io::Error),

    /// Accepting an incoming connection failed.
    #[error("accept failed: {0}")]
    Accept(#[source] std::io::Error),

    /// Connecting to a peer failed.
    #[error("connect failed: {0}")]
    Connect(#[source] std::io::Error),
}
