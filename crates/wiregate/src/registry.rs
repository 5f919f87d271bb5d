//! A registry of open gateways for best-effort cleanup.
//!
//! Deliberately *not* an ambient global: the process-lifetime owner (a
//! `main`, a test harness, a larger runtime) creates one, registers the
//! gateways it opens, and calls [`GatewayRegistry::shutdown_all`] when it
//! winds down. Independent registries never contaminate each other, so
//! tests can run many gateways side by side.

use crate::Gateway;

/// Tracks open gateways so they can be shut down together.
#[derive(Default)]
pub struct GatewayRegistry {
    gateways: std::sync::Mutex<Vec<Gateway>>,
}

impl GatewayRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a gateway for shutdown at wind-down time.
    pub fn register(&self, gateway: Gateway) {
        self.gateways.lock().expect("registry lock").push(gateway);
    }

    /// Number of registered gateways.
    pub fn len(&self) -> usize {
        self.gateways.lock().expect("registry lock").len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Exits and joins every registered gateway, clearing the registry.
    ///
    /// Best effort: a gateway whose peer is already gone still completes
    /// its local teardown (its i/o tasks have ended), so this never hangs
    /// on a dead connection's handshake.
    pub async fn shutdown_all(&self) {
        let gateways =
            std::mem::take(&mut *self.gateways.lock().expect("registry lock"));
        let count = gateways.len();
        for gateway in gateways {
            gateway.exit().await;
            gateway.join().await;
        }
        if count > 0 {
            tracing::info!(count, "registry shut down all gateways");
        }
    }
}
