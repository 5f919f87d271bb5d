//! TCP transport: the usual way two processes on different hosts share a
//! gateway. `TcpStream` already satisfies the duplex contract — including
//! half-close via `shutdown()`, which lets the peer keep sending after our
//! writes stop.

use tokio::net::{TcpListener, TcpStream};

use crate::TransportError;

/// A TCP listener that hands out duplex streams for gateways.
pub struct Listener {
    listener: TcpListener,
}

impl Listener {
    /// Binds a listener to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener =
            TcpListener::bind(addr).await.map_err(TransportError::Bind)?;
        tracing::info!(addr, "tcp transport listening");
        Ok(Self { listener })
    }

    /// Returns the local address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Waits for and accepts the next incoming connection.
    pub async fn accept(&self) -> Result<TcpStream, TransportError> {
        let (stream, peer) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::Accept)?;
        tracing::debug!(%peer, "accepted tcp connection");
        Ok(stream)
    }
}

/// Connects to a listening peer.
pub async fn connect(addr: &str) -> Result<TcpStream, TransportError> {
    let stream = TcpStream::connect(addr)
        .await
        .map_err(TransportError::Connect)?;
    tracing::debug!(addr, "connected tcp stream");
    Ok(stream)
}
