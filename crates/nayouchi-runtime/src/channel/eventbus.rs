//! Event-bus bridge transport
//!
//! Speaks the SockJS event-bus bridge protocol over a raw WebSocket using
//! tokio-tungstenite. A single connection task owns the socket: it writes
//! queued frames, dispatches inbound frames to pending replies or topic
//! subscribers, sends periodic pings, and reconnects with exponential backoff.
//! Registered topics are re-registered after every reconnect.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use dashmap::{DashMap, DashSet};
use futures::{SinkExt, StreamExt};
use nayouchi_core::{
    Address, NayouchiError, Result, Topic, TransportConfig, TransportError,
};
use rand::Rng;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use super::frame::{InboundFrame, OutboundFrame};
use super::{Channel, ChannelEvent, PendingReply};

// ----------------------------------------------------------------------------
// Shared State
// ----------------------------------------------------------------------------

struct PendingRequest {
    address: Address,
    reply: oneshot::Sender<Result<Value>>,
}

struct Shared {
    open: AtomicBool,
    /// Requests awaiting a reply, keyed by reply address
    pending: DashMap<String, PendingRequest>,
    topics: DashSet<String>,
    /// Serializes topic changes against the switch to open
    registration: Mutex<()>,
    events: broadcast::Sender<ChannelEvent>,
    outbound: mpsc::UnboundedSender<String>,
}

impl Shared {
    fn new(event_buffer_size: usize) -> (Arc<Self>, mpsc::UnboundedReceiver<String>) {
        let (events, _) = broadcast::channel(event_buffer_size);
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Self {
            open: AtomicBool::new(false),
            pending: DashMap::new(),
            topics: DashSet::new(),
            registration: Mutex::new(()),
            events,
            outbound,
        });
        (shared, outbound_rx)
    }

    fn enqueue(&self, frame: &OutboundFrame<'_>) -> Result<()> {
        let text = frame.encode()?;
        self.outbound
            .send(text)
            .map_err(|_| NayouchiError::from(TransportError::Closed {
                reason: "connection task stopped".to_string(),
            }))
    }

    fn require_open(&self) -> Result<()> {
        if self.open.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(TransportError::NotConnected.into())
        }
    }

    fn dispatch(&self, text: &str) {
        let frame = match InboundFrame::decode(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Dropping undecodable frame: {}", e);
                return;
            }
        };

        match frame {
            InboundFrame::Rec { address, body } => {
                if let Some((_, pending)) = self.pending.remove(&address) {
                    debug!("Reply to '{}' received", pending.address);
                    let _ = pending.reply.send(Ok(body));
                } else if self.topics.contains(&address) {
                    debug!("Push on topic {}", address);
                    let _ = self.events.send(ChannelEvent::Push {
                        topic: Topic::new(address),
                        body,
                    });
                } else {
                    debug!("Ignoring message for unknown address {}", address);
                }
            }
            InboundFrame::Err {
                address,
                failure_code,
                failure_type,
                message,
            } => {
                let pending = address.as_ref().and_then(|a| self.pending.remove(a));
                let message = message
                    .or(failure_type)
                    .unwrap_or_else(|| "unspecified failure".to_string());
                match pending {
                    Some((_, pending)) => {
                        let error = NayouchiError::rejected(
                            pending.address.as_str(),
                            failure_code.unwrap_or(-1),
                            message,
                        );
                        let _ = pending.reply.send(Err(error));
                    }
                    None => warn!("Event bus error: {}", message),
                }
            }
            InboundFrame::Pong | InboundFrame::Unknown => {}
        }
    }

    /// Remember `topic`; registers it right away when the socket is up
    fn subscribe(&self, topic: &str) -> Result<bool> {
        let _guard = self.registration.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.topics.insert(topic.to_string()) {
            return Ok(false);
        }
        if self.open.load(Ordering::SeqCst) {
            self.enqueue(&OutboundFrame::Register { address: topic })?;
        }
        Ok(true)
    }

    fn unsubscribe(&self, topic: &str) -> Result<bool> {
        let _guard = self.registration.lock().unwrap_or_else(PoisonError::into_inner);
        if self.topics.remove(topic).is_none() {
            return Ok(false);
        }
        if self.open.load(Ordering::SeqCst) {
            self.enqueue(&OutboundFrame::Unregister { address: topic })?;
        }
        Ok(true)
    }

    /// Switch to open and return the topics the new connection must register
    ///
    /// Topics subscribed after this point are registered through the outbound
    /// queue, which the connection drains only after the returned ones.
    fn open_with_topics(&self) -> Vec<String> {
        let _guard = self.registration.lock().unwrap_or_else(PoisonError::into_inner);
        let topics = self.topics.iter().map(|t| t.key().clone()).collect();
        self.open.store(true, Ordering::SeqCst);
        let _ = self.events.send(ChannelEvent::Open);
        topics
    }

    fn mark_closed(&self) {
        let was_open = self.open.swap(false, Ordering::SeqCst);

        let lost: Vec<String> = self.pending.iter().map(|entry| entry.key().clone()).collect();
        for reply_address in lost {
            if let Some((_, pending)) = self.pending.remove(&reply_address) {
                let _ = pending.reply.send(Err(TransportError::ConnectionLost {
                    address: pending.address.to_string(),
                }
                .into()));
            }
        }

        if was_open {
            let _ = self.events.send(ChannelEvent::Close);
        }
    }
}

// ----------------------------------------------------------------------------
// Event Bus Channel
// ----------------------------------------------------------------------------

/// [`Channel`] backed by a Vert.x-style event-bus bridge
pub struct EventBusChannel {
    shared: Arc<Shared>,
    task: JoinHandle<()>,
}

impl EventBusChannel {
    /// Start connecting to the bridge described by `config`
    ///
    /// Returns immediately; [`ChannelEvent::Open`] is emitted once the socket
    /// is up. Must be called from within a tokio runtime.
    pub fn connect(config: TransportConfig) -> Result<Self> {
        config.validate()?;
        let url = config.websocket_url()?;

        let (shared, outbound_rx) = Shared::new(config.event_buffer_size);

        info!("Connecting to event bus at {}", url);
        let task = tokio::spawn(connection_loop(shared.clone(), config, url, outbound_rx));
        Ok(Self { shared, task })
    }

    /// Stop the connection task and fail everything still pending
    pub fn shutdown(&self) {
        self.task.abort();
        self.shared.mark_closed();
    }
}

impl Drop for EventBusChannel {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl Channel for EventBusChannel {
    fn request(&self, address: Address, body: Value) -> Result<PendingReply> {
        self.shared.require_open()?;

        let reply_address = uuid::Uuid::new_v4().to_string();
        let (reply, receiver) = oneshot::channel();
        self.shared
            .pending
            .insert(reply_address.clone(), PendingRequest { address, reply });

        let frame = OutboundFrame::Send {
            address: address.as_str(),
            body: &body,
            reply_address: Some(&reply_address),
        };
        if let Err(e) = self.shared.enqueue(&frame) {
            self.shared.pending.remove(&reply_address);
            return Err(e);
        }
        debug!("Request '{}' sent (reply to {})", address, reply_address);
        Ok(PendingReply::new(address, receiver))
    }

    fn send(&self, address: Address, body: Value) -> Result<()> {
        self.shared.require_open()?;
        debug!("Sending '{}'", address);
        self.shared.enqueue(&OutboundFrame::Send {
            address: address.as_str(),
            body: &body,
            reply_address: None,
        })
    }

    fn subscribe(&self, topic: &Topic) -> Result<()> {
        // registration happens on (re)connect when the socket is down
        if self.shared.subscribe(topic.as_str())? {
            debug!("Subscribed to {}", topic);
        }
        Ok(())
    }

    fn unsubscribe(&self, topic: &Topic) -> Result<()> {
        if self.shared.unsubscribe(topic.as_str())? {
            debug!("Unsubscribed from {}", topic);
        }
        Ok(())
    }

    fn events(&self) -> broadcast::Receiver<ChannelEvent> {
        self.shared.events.subscribe()
    }

    fn is_open(&self) -> bool {
        self.shared.open.load(Ordering::SeqCst)
    }
}

// ----------------------------------------------------------------------------
// Connection Task
// ----------------------------------------------------------------------------

async fn connection_loop(
    shared: Arc<Shared>,
    config: TransportConfig,
    url: url::Url,
    mut outbound: mpsc::UnboundedReceiver<String>,
) {
    let mut attempt: u32 = 0;

    loop {
        // frames queued for a previous connection are not replayed
        while outbound.try_recv().is_ok() {}

        match tokio_tungstenite::connect_async(url.as_str()).await {
            Ok((socket, _response)) => {
                attempt = 0;
                let (mut sink, mut stream) = socket.split();

                let topics = shared.open_with_topics();
                let mut registered = true;
                for topic in &topics {
                    let frame = OutboundFrame::Register { address: topic };
                    let sent = match frame.encode() {
                        Ok(text) => sink.send(Message::Text(text)).await.is_ok(),
                        Err(_) => false,
                    };
                    if !sent {
                        registered = false;
                        break;
                    }
                }

                if registered {
                    info!("Event bus connected ({} topics registered)", topics.len());

                    let mut ping = tokio::time::interval(config.ping_interval);
                    ping.tick().await;

                    loop {
                        tokio::select! {
                            frame = outbound.recv() => match frame {
                                Some(text) => {
                                    if let Err(e) = sink.send(Message::Text(text)).await {
                                        warn!("Event bus write failed: {}", e);
                                        break;
                                    }
                                }
                                None => break,
                            },
                            message = stream.next() => match message {
                                Some(Ok(Message::Text(text))) => shared.dispatch(&text),
                                Some(Ok(Message::Close(_))) | None => {
                                    info!("Event bus connection closed by server");
                                    break;
                                }
                                Some(Ok(_)) => {}
                                Some(Err(e)) => {
                                    warn!("Event bus read failed: {}", e);
                                    break;
                                }
                            },
                            _ = ping.tick() => {
                                if let Ok(text) = OutboundFrame::Ping.encode() {
                                    if sink.send(Message::Text(text)).await.is_err() {
                                        break;
                                    }
                                }
                            }
                        }
                    }
                }

                shared.mark_closed();
            }
            Err(e) => warn!("Event bus connection to {} failed: {}", url, e),
        }

        if !config.auto_reconnect || !config.reconnect.allows_attempt(attempt) {
            warn!("Event bus giving up after {} reconnect attempts", attempt);
            shared.mark_closed();
            return;
        }

        let sample: f64 = rand::thread_rng().gen();
        let delay = config
            .reconnect
            .jittered(config.reconnect.base_delay(attempt), sample);
        attempt += 1;
        debug!("Reconnecting in {:?} (attempt {})", delay, attempt);
        tokio::time::sleep(delay).await;
    }
}
