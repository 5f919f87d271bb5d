//! The channel factory: thread-safe allocator and registry of channels.
//!
//! Ids advance by 2, so every id a factory hands out shares one parity.
//! Two communicating factories started at different parities (the
//! exec-initiating side at 2, the bare side at 1) can both allocate freely
//! without any handshake and never collide.

use std::collections::HashMap;

use tokio::sync::mpsc;
use wiregate_protocol::Message;

use crate::{Channel, GatewayError};

struct FactoryState {
    table: HashMap<u32, Channel>,
    next_id: u32,
}

/// Allocates channel ids and maps ids back to live channels.
///
/// One lock guards both the table and the id counter; every operation is a
/// short critical section.
pub(crate) struct ChannelFactory {
    state: std::sync::Mutex<FactoryState>,
}

impl ChannelFactory {
    pub(crate) fn new(start_id: u32) -> Self {
        Self {
            state: std::sync::Mutex::new(FactoryState {
                table: HashMap::new(),
                next_id: start_id,
            }),
        }
    }

    /// Allocates the next local id and registers a fresh channel under it.
    pub(crate) fn new_channel(
        &self,
        outgoing: &mpsc::UnboundedSender<Message>,
    ) -> Channel {
        let mut state = self.state.lock().expect("factory lock");
        let id = state.next_id;
        state.next_id += 2;
        let channel = Channel::new(id, outgoing.clone());
        state.table.insert(id, channel.clone());
        channel
    }

    /// Registers a channel under a peer-allocated id (from `ChannelOpen`).
    pub(crate) fn register(
        &self,
        id: u32,
        outgoing: &mpsc::UnboundedSender<Message>,
    ) -> Channel {
        let channel = Channel::new(id, outgoing.clone());
        self.state
            .lock()
            .expect("factory lock")
            .table
            .insert(id, channel.clone());
        channel
    }

    /// Looks up a live channel by id.
    pub(crate) fn get(&self, id: u32) -> Result<Channel, GatewayError> {
        self.state
            .lock()
            .expect("factory lock")
            .table
            .get(&id)
            .cloned()
            .ok_or(GatewayError::ChannelNotFound(id))
    }

    /// Deregisters and returns a channel.
    pub(crate) fn remove(&self, id: u32) -> Result<Channel, GatewayError> {
        self.state
            .lock()
            .expect("factory lock")
            .table
            .remove(&id)
            .ok_or(GatewayError::ChannelNotFound(id))
    }

    /// Snapshot of every currently registered channel.
    pub(crate) fn channels(&self) -> Vec<Channel> {
        self.state
            .lock()
            .expect("factory lock")
            .table
            .values()
            .cloned()
            .collect()
    }

    /// Number of currently registered channels.
    pub(crate) fn len(&self) -> usize {
        self.state.lock().expect("factory lock").table.len()
    }
}

// =========================================================================
// Tests
// =========================================================================
