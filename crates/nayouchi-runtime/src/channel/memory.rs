//! In-process channel
//!
//! A [`Channel`] without a network: replies come from a pluggable responder,
//! every call is recorded, and tests drive open/close/push by hand. Replies the
//! responder holds back can be released later, in any order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dashmap::DashMap;
use nayouchi_core::{Address, NayouchiError, Result, Topic, TransportError};
use serde_json::Value;
use tokio::sync::{broadcast, oneshot};
use tracing::debug;

use super::{Channel, ChannelEvent, PendingReply};

/// What the responder does with a request
#[derive(Debug)]
pub enum MemoryReply {
    Value(Value),
    Error(NayouchiError),
    /// Keep the request pending until [`MemoryChannel::release`]
    Hold,
}

/// One call made through the channel
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCall {
    Request { address: Address, body: Value },
    Send { address: Address, body: Value },
    Subscribe(Topic),
    Unsubscribe(Topic),
}

type Responder = dyn Fn(Address, &Value) -> MemoryReply + Send + Sync;

struct HeldReply {
    address: Address,
    body: Value,
    reply: oneshot::Sender<Result<Value>>,
}

struct Inner {
    open: AtomicBool,
    events: broadcast::Sender<ChannelEvent>,
    responder: Box<Responder>,
    calls: Mutex<Vec<RecordedCall>>,
    held: Mutex<Vec<HeldReply>>,
    /// Subscription count per topic; more than one means a double subscribe
    subscriptions: DashMap<Topic, usize>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Cloneable handle to an in-process channel
#[derive(Clone)]
pub struct MemoryChannel {
    inner: Arc<Inner>,
}

impl MemoryChannel {
    /// Create a closed channel answering requests with `responder`
    ///
    /// The responder also sees fire-and-forget sends; its answer to those is
    /// ignored.
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(Address, &Value) -> MemoryReply + Send + Sync + 'static,
    {
        let (events, _) = broadcast::channel(128);
        Self {
            inner: Arc::new(Inner {
                open: AtomicBool::new(false),
                events,
                responder: Box::new(responder),
                calls: Mutex::new(Vec::new()),
                held: Mutex::new(Vec::new()),
                subscriptions: DashMap::new(),
            }),
        }
    }

    /// Create a channel that is already open
    pub fn open_with<F>(responder: F) -> Self
    where
        F: Fn(Address, &Value) -> MemoryReply + Send + Sync + 'static,
    {
        let channel = Self::new(responder);
        channel.open();
        channel
    }

    pub fn open(&self) {
        if !self.inner.open.swap(true, Ordering::SeqCst) {
            let _ = self.inner.events.send(ChannelEvent::Open);
        }
    }

    /// Close the channel, failing held replies with a connection loss
    pub fn close(&self) {
        if self.inner.open.swap(false, Ordering::SeqCst) {
            for held in lock(&self.inner.held).drain(..) {
                let _ = held.reply.send(Err(TransportError::ConnectionLost {
                    address: held.address.to_string(),
                }
                .into()));
            }
            let _ = self.inner.events.send(ChannelEvent::Close);
        }
    }

    /// Push `body` on `topic`; delivered only while someone is subscribed
    pub fn push(&self, topic: &Topic, body: Value) -> bool {
        if self.subscription_count(topic) == 0 || !self.is_open() {
            return false;
        }
        self.inner
            .events
            .send(ChannelEvent::Push {
                topic: topic.clone(),
                body,
            })
            .is_ok()
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.inner.calls).clone()
    }

    /// Addresses of recorded requests and sends, in call order
    pub fn addresses(&self) -> Vec<Address> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                RecordedCall::Request { address, .. } | RecordedCall::Send { address, .. } => {
                    Some(address)
                }
                _ => None,
            })
            .collect()
    }

    pub fn clear_calls(&self) {
        lock(&self.inner.calls).clear();
    }

    pub fn subscription_count(&self, topic: &Topic) -> usize {
        self.inner.subscriptions.get(topic).map_or(0, |count| *count)
    }

    /// Topics with at least one active subscription
    pub fn active_topics(&self) -> Vec<Topic> {
        self.inner
            .subscriptions
            .iter()
            .filter(|entry| *entry.value() > 0)
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Requests currently held back, as `(address, body)`
    pub fn held(&self) -> Vec<(Address, Value)> {
        lock(&self.inner.held)
            .iter()
            .map(|h| (h.address, h.body.clone()))
            .collect()
    }

    /// Answer the held request at `index` with `reply`
    pub fn release(&self, index: usize, reply: Result<Value>) -> bool {
        let mut held = lock(&self.inner.held);
        if index >= held.len() {
            return false;
        }
        let entry = held.remove(index);
        entry.reply.send(reply).is_ok()
    }

    fn record(&self, call: RecordedCall) {
        lock(&self.inner.calls).push(call);
    }

    fn require_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(TransportError::NotConnected.into())
        }
    }
}

impl Channel for MemoryChannel {
    fn request(&self, address: Address, body: Value) -> Result<PendingReply> {
        self.require_open()?;
        self.record(RecordedCall::Request {
            address,
            body: body.clone(),
        });

        match (self.inner.responder)(address, &body) {
            MemoryReply::Value(value) => Ok(PendingReply::ready(address, Ok(value))),
            MemoryReply::Error(error) => Ok(PendingReply::ready(address, Err(error))),
            MemoryReply::Hold => {
                debug!("Holding reply to '{}'", address);
                let (reply, receiver) = oneshot::channel();
                lock(&self.inner.held).push(HeldReply {
                    address,
                    body,
                    reply,
                });
                Ok(PendingReply::new(address, receiver))
            }
        }
    }

    fn send(&self, address: Address, body: Value) -> Result<()> {
        self.require_open()?;
        self.record(RecordedCall::Send {
            address,
            body: body.clone(),
        });
        let _ = (self.inner.responder)(address, &body);
        Ok(())
    }

    fn subscribe(&self, topic: &Topic) -> Result<()> {
        self.record(RecordedCall::Subscribe(topic.clone()));
        *self.inner.subscriptions.entry(topic.clone()).or_insert(0) += 1;
        Ok(())
    }

    fn unsubscribe(&self, topic: &Topic) -> Result<()> {
        self.record(RecordedCall::Unsubscribe(topic.clone()));
        if let Some(mut count) = self.inner.subscriptions.get_mut(topic) {
            *count = count.saturating_sub(1);
        }
        Ok(())
    }

    fn events(&self) -> broadcast::Receiver<ChannelEvent> {
        self.inner.events.subscribe()
    }

    fn is_open(&self) -> bool {
        self.inner.open.load(Ordering::SeqCst)
    }
}
