//! Connectivity state derived from channel lifecycle events

use serde::{Deserialize, Serialize};

/// Lifecycle transitions reported by a transport channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelLifecycle {
    Open,
    Close,
}

/// Whether the channel to the backend is currently usable
///
/// Starts out disconnected and only ever changes in response to a
/// [`ChannelLifecycle`] event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectivityState {
    connected: bool,
}

impl ConnectivityState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Fold a lifecycle event into the state; returns true when it changed
    pub fn apply(&mut self, event: ChannelLifecycle) -> bool {
        let connected = matches!(event, ChannelLifecycle::Open);
        let changed = self.connected != connected;
        self.connected = connected;
        changed
    }
}
