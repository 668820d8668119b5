//! Application context
//!
//! The explicit context object handed to every presentation component. It is
//! built once at startup: the builder opens the channel, waits for
//! connectivity, starts the session task and identifies the participant.

use std::sync::Arc;
use std::time::Duration;

use nayouchi_core::{
    NayouchiError, NayouchiResult, ParticipantId, SessionConfig, TransportConfig,
};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::info;

use crate::channel::{EventBusChannel, SharedChannel};
use crate::connectivity::{ConnectivityHandle, ConnectivityMonitor};
use crate::handle::{SessionHandle, SessionSnapshot};
use crate::task::SessionTask;

// ----------------------------------------------------------------------------
// Channel Bootstrap
// ----------------------------------------------------------------------------

/// Open an event-bus channel and wait until it is connected
pub async fn open_channel(
    config: TransportConfig,
    timeout: Duration,
) -> NayouchiResult<(SharedChannel, ConnectivityMonitor)> {
    let channel: SharedChannel = Arc::new(EventBusChannel::connect(config)?);
    let monitor = ConnectivityMonitor::spawn(channel.clone());
    monitor.handle().wait_connected(timeout).await?;
    Ok((channel, monitor))
}

// ----------------------------------------------------------------------------
// Context Builder
// ----------------------------------------------------------------------------

/// Builder for an [`AppContext`]
pub struct AppContextBuilder {
    participant: ParticipantId,
    channel: Option<SharedChannel>,
    transport: TransportConfig,
    session: SessionConfig,
    connect_timeout: Duration,
}

impl AppContextBuilder {
    pub fn new(participant: ParticipantId) -> Self {
        Self {
            participant,
            channel: None,
            transport: TransportConfig::default(),
            session: SessionConfig::default(),
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Use an existing channel instead of opening an event-bus connection
    pub fn with_channel(mut self, channel: SharedChannel) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn with_transport_config(mut self, config: TransportConfig) -> Self {
        self.transport = config;
        self
    }

    pub fn with_session_config(mut self, config: SessionConfig) -> Self {
        self.session = config;
        self
    }

    /// How long to wait for the channel to open before giving up
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Connect, start the session task and identify the participant
    pub async fn build_and_start(self) -> NayouchiResult<AppContext> {
        self.session.validate()?;

        let channel: SharedChannel = match self.channel {
            Some(channel) => channel,
            None => Arc::new(EventBusChannel::connect(self.transport)?),
        };

        let monitor = ConnectivityMonitor::spawn(channel.clone());
        let mut connectivity = monitor.handle();
        connectivity.wait_connected(self.connect_timeout).await?;

        let (command_sender, command_receiver) = mpsc::channel(self.session.command_buffer_size);
        let (snapshot_sender, snapshot_receiver) = watch::channel(SessionSnapshot::default());
        let task = SessionTask::new(
            channel.clone(),
            self.session,
            command_receiver,
            snapshot_sender,
        );
        let task_handle = tokio::spawn(task.run());

        let session = SessionHandle::new(command_sender, snapshot_receiver);
        if let Err(e) = session.initialize(self.participant.clone()).await {
            task_handle.abort();
            return Err(e);
        }

        info!("Session started for participant {}", self.participant);
        Ok(AppContext {
            participant: self.participant,
            channel,
            session,
            monitor,
            task_handle: Some(task_handle),
        })
    }
}

// ----------------------------------------------------------------------------
// App Context
// ----------------------------------------------------------------------------

/// Session, connectivity and channel of one running participant
pub struct AppContext {
    participant: ParticipantId,
    channel: SharedChannel,
    session: SessionHandle,
    monitor: ConnectivityMonitor,
    task_handle: Option<JoinHandle<()>>,
}

impl AppContext {
    pub fn builder(participant: ParticipantId) -> AppContextBuilder {
        AppContextBuilder::new(participant)
    }

    pub fn participant(&self) -> &ParticipantId {
        &self.participant
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    pub fn connectivity(&self) -> ConnectivityHandle {
        self.monitor.handle()
    }

    pub fn channel(&self) -> &SharedChannel {
        &self.channel
    }

    pub fn is_running(&self) -> bool {
        self.task_handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the session task and the connectivity monitor
    pub async fn shutdown(&mut self) -> NayouchiResult<()> {
        info!("Shutting down session for {}", self.participant);
        let _ = self.session.shutdown().await;

        if let Some(handle) = self.task_handle.take() {
            if tokio::time::timeout(Duration::from_secs(5), handle).await.is_err() {
                return Err(NayouchiError::channel_error("Session task did not stop in time"));
            }
        }
        self.monitor.stop();
        Ok(())
    }
}
