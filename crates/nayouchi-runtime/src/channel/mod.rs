//! Transport channel contract
//!
//! A channel is an address-based message pipe to the backend supporting
//! request/reply, fire-and-forget sends and named topic subscriptions. It
//! reconnects by itself; consumers only observe [`ChannelEvent::Open`] and
//! [`ChannelEvent::Close`].

use std::sync::Arc;
use std::time::Duration;

use nayouchi_core::{Address, NayouchiError, Result, Topic, TransportError};
use serde_json::Value;
use tokio::sync::{broadcast, oneshot};

pub mod eventbus;
mod frame;
pub mod memory;

pub use eventbus::EventBusChannel;
pub use memory::{MemoryChannel, MemoryReply, RecordedCall};

// ----------------------------------------------------------------------------
// Channel Events
// ----------------------------------------------------------------------------

/// Lifecycle and push notifications emitted by a channel
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Open,
    Close,
    /// The backend pushed `body` on a subscribed topic
    Push { topic: Topic, body: Value },
}

// ----------------------------------------------------------------------------
// Pending Replies
// ----------------------------------------------------------------------------

/// Reply to a request that is still in flight
#[derive(Debug)]
pub struct PendingReply {
    address: Address,
    receiver: oneshot::Receiver<Result<Value>>,
}

impl PendingReply {
    pub fn new(address: Address, receiver: oneshot::Receiver<Result<Value>>) -> Self {
        Self { address, receiver }
    }

    /// A reply that is already known
    pub fn ready(address: Address, result: Result<Value>) -> Self {
        let (sender, receiver) = oneshot::channel();
        let _ = sender.send(result);
        Self { address, receiver }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Wait for the reply, giving up after `timeout` if one is set
    pub async fn wait(self, timeout: Option<Duration>) -> Result<Value> {
        let address = self.address;
        let lost = move |_| {
            NayouchiError::from(TransportError::ConnectionLost {
                address: address.to_string(),
            })
        };

        match timeout {
            Some(duration) => match tokio::time::timeout(duration, self.receiver).await {
                Ok(reply) => reply.map_err(lost)?,
                Err(_) => Err(TransportError::Timeout {
                    address: address.to_string(),
                    duration_ms: duration.as_millis() as u64,
                }
                .into()),
            },
            None => self.receiver.await.map_err(lost)?,
        }
    }
}

// ----------------------------------------------------------------------------
// Channel Trait
// ----------------------------------------------------------------------------

/// Contract the session engine consumes from a transport
///
/// All operations enqueue synchronously; only replies are awaited.
pub trait Channel: Send + Sync + 'static {
    /// Point-to-point request with an asynchronous reply
    fn request(&self, address: Address, body: Value) -> Result<PendingReply>;

    /// Point-to-point message without a reply
    fn send(&self, address: Address, body: Value) -> Result<()>;

    /// Start receiving pushes on `topic` as [`ChannelEvent::Push`]
    fn subscribe(&self, topic: &Topic) -> Result<()>;

    fn unsubscribe(&self, topic: &Topic) -> Result<()>;

    /// New receiver for lifecycle and push events
    fn events(&self) -> broadcast::Receiver<ChannelEvent>;

    fn is_open(&self) -> bool;
}

pub type SharedChannel = Arc<dyn Channel>;
