//! Connectivity monitor
//!
//! Folds a channel's open/close events into a [`ConnectivityState`] and
//! publishes it through a `watch` channel. Consumers get a read-only
//! [`ConnectivityHandle`].

use std::time::Duration;

use nayouchi_core::{
    protocol::ChannelLifecycle, ConnectivityState, NayouchiError, Result, TransportError,
};
use tokio::sync::{broadcast::error::RecvError, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::channel::{ChannelEvent, SharedChannel};

// ----------------------------------------------------------------------------
// Connectivity Handle
// ----------------------------------------------------------------------------

/// Read-only view of the current connectivity
#[derive(Debug, Clone)]
pub struct ConnectivityHandle {
    state: watch::Receiver<ConnectivityState>,
}

impl ConnectivityHandle {
    pub fn is_connected(&self) -> bool {
        self.state.borrow().is_connected()
    }

    pub fn current(&self) -> ConnectivityState {
        *self.state.borrow()
    }

    /// Wait for the next change and return the new state
    pub async fn changed(&mut self) -> Result<ConnectivityState> {
        self.state
            .changed()
            .await
            .map_err(|_| NayouchiError::channel_error("Connectivity monitor stopped"))?;
        Ok(*self.state.borrow_and_update())
    }

    /// Wait until the channel is open, up to `timeout`
    pub async fn wait_connected(&mut self, timeout: Duration) -> Result<()> {
        let wait = self.state.wait_for(|state| state.is_connected());
        match tokio::time::timeout(timeout, wait).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(NayouchiError::channel_error("Connectivity monitor stopped")),
            Err(_) => Err(TransportError::NotConnected.into()),
        }
    }
}

// ----------------------------------------------------------------------------
// Connectivity Monitor
// ----------------------------------------------------------------------------

/// Task that keeps the published connectivity in sync with the channel
pub struct ConnectivityMonitor {
    handle: ConnectivityHandle,
    task: JoinHandle<()>,
}

impl ConnectivityMonitor {
    pub fn spawn(channel: SharedChannel) -> Self {
        let mut events = channel.events();
        let mut initial = ConnectivityState::new();
        if channel.is_open() {
            initial.apply(ChannelLifecycle::Open);
        }
        let (sender, receiver) = watch::channel(initial);

        let task = tokio::spawn(async move {
            loop {
                let lifecycle = match events.recv().await {
                    Ok(ChannelEvent::Open) => ChannelLifecycle::Open,
                    Ok(ChannelEvent::Close) => ChannelLifecycle::Close,
                    Ok(ChannelEvent::Push { .. }) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Connectivity monitor skipped {} events, resyncing", skipped);
                        if channel.is_open() {
                            ChannelLifecycle::Open
                        } else {
                            ChannelLifecycle::Close
                        }
                    }
                    Err(RecvError::Closed) => {
                        debug!("Channel event stream ended");
                        break;
                    }
                };

                sender.send_if_modified(|state| {
                    let changed = state.apply(lifecycle);
                    if changed {
                        info!("Connectivity changed: connected={}", state.is_connected());
                    }
                    changed
                });
            }
        });

        Self {
            handle: ConnectivityHandle { state: receiver },
            task,
        }
    }

    pub fn handle(&self) -> ConnectivityHandle {
        self.handle.clone()
    }

    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for ConnectivityMonitor {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{MemoryChannel, MemoryReply};
    use serde_json::Value;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_monitor_tracks_open_and_close() {
        let channel = MemoryChannel::new(|_, _| MemoryReply::Value(Value::Null));
        let monitor = ConnectivityMonitor::spawn(Arc::new(channel.clone()));
        let mut handle = monitor.handle();
        assert!(!handle.is_connected());

        channel.open();
        handle.wait_connected(Duration::from_secs(1)).await.unwrap();
        assert!(handle.is_connected());

        channel.close();
        let state = handle.changed().await.unwrap();
        assert!(!state.is_connected());
    }

    #[tokio::test]
    async fn test_wait_connected_times_out() {
        let channel = MemoryChannel::new(|_, _| MemoryReply::Value(Value::Null));
        let monitor = ConnectivityMonitor::spawn(Arc::new(channel));
        let err = monitor
            .handle()
            .wait_connected(Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
