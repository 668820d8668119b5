//! Session Task Implementation
//!
//! The session task is the only writer of session state. It owns the
//! [`SessionMachine`] and runs a `select!` loop over three sources: commands
//! from [`SessionHandle`](crate::SessionHandle)s, events from the channel and
//! completions of in-flight requests. Requests are awaited on spawned tasks so
//! replies can arrive in any order while state changes stay sequential.

use std::collections::HashMap;

use nayouchi_core::{
    Completion, Confirmation, GroupId, Name, NayouchiError, ParticipantId, RequestTicket, Result,
    SessionConfig, SessionEffect, SessionMachine,
};
use serde_json::Value;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::channel::{ChannelEvent, SharedChannel};
use crate::handle::SessionSnapshot;

// ----------------------------------------------------------------------------
// Commands
// ----------------------------------------------------------------------------

/// Session operation requested by a handle
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOp {
    Initialize(ParticipantId),
    FetchGroups,
    EnterGroup(GroupId),
    RefreshGroup,
    LeaveGroup,
    Resign(Confirmation),
    Propose(Name),
    RemoveName(Name),
    CreateGroup(String),
    AddMember(String),
    SetUserName(String),
    Upgrade { member: String, confirmation: Confirmation },
}

/// Message from a handle to the session task
#[derive(Debug)]
pub enum SessionCommand {
    Execute {
        op: SessionOp,
        reply: oneshot::Sender<Result<()>>,
    },
    Shutdown,
}

type Completed = (RequestTicket, Result<Value>);

// ----------------------------------------------------------------------------
// Session Task
// ----------------------------------------------------------------------------

pub struct SessionTask {
    machine: SessionMachine,
    channel: SharedChannel,
    config: SessionConfig,
    commands: mpsc::Receiver<SessionCommand>,
    events: broadcast::Receiver<ChannelEvent>,
    events_open: bool,
    /// Set once the channel closed; pushes may have been missed since
    channel_lost: bool,
    completion_sender: mpsc::UnboundedSender<Completed>,
    completion_receiver: mpsc::UnboundedReceiver<Completed>,
    /// Callers waiting for the request with the given ticket id
    waiters: HashMap<u64, oneshot::Sender<Result<()>>>,
    snapshot: watch::Sender<SessionSnapshot>,
}

impl SessionTask {
    pub fn new(
        channel: SharedChannel,
        config: SessionConfig,
        commands: mpsc::Receiver<SessionCommand>,
        snapshot: watch::Sender<SessionSnapshot>,
    ) -> Self {
        let (completion_sender, completion_receiver) = mpsc::unbounded_channel();
        Self {
            machine: SessionMachine::new(&config),
            events: channel.events(),
            events_open: true,
            channel_lost: false,
            channel,
            config,
            commands,
            completion_sender,
            completion_receiver,
            waiters: HashMap::new(),
            snapshot,
        }
    }

    /// Run until shut down or until every handle is dropped
    pub async fn run(mut self) {
        info!("Session task starting");

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(SessionCommand::Execute { op, reply }) => self.execute(op, reply),
                    Some(SessionCommand::Shutdown) => {
                        info!("Session task shutting down");
                        break;
                    }
                    None => {
                        info!("All session handles dropped, shutting down");
                        break;
                    }
                },

                event = self.events.recv(), if self.events_open => match event {
                    Ok(ChannelEvent::Push { topic, .. }) => {
                        let effects = self.machine.on_push(&topic);
                        let _ = self.perform(effects);
                    }
                    Ok(ChannelEvent::Open) if self.channel_lost => {
                        info!("Channel reopened, resynchronizing session");
                        self.channel_lost = false;
                        let effects = self.machine.on_reconnect();
                        if let Err(e) = self.perform(effects) {
                            warn!("Resync after reconnect failed: {}", e);
                        }
                    }
                    Ok(ChannelEvent::Open) => debug!("Channel open"),
                    Ok(ChannelEvent::Close) => {
                        debug!("Channel closed");
                        self.channel_lost = true;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Missed {} channel events, refreshing group", skipped);
                        if let Ok(effects) = self.machine.refresh_group() {
                            let _ = self.perform(effects);
                        }
                    }
                    Err(RecvError::Closed) => {
                        warn!("Channel event stream ended");
                        self.events_open = false;
                    }
                },

                Some((ticket, result)) = self.completion_receiver.recv() => {
                    self.complete(ticket, result);
                }
            }

            self.publish();
        }

        for (_, waiter) in self.waiters.drain() {
            let _ = waiter.send(Err(NayouchiError::channel_error("Session task stopped")));
        }
    }

    fn execute(&mut self, op: SessionOp, reply: oneshot::Sender<Result<()>>) {
        debug!("Executing {:?}", op);
        let machine = &mut self.machine;
        let result = match op {
            SessionOp::Initialize(participant) => machine.initialize(participant),
            SessionOp::FetchGroups => machine.fetch_groups(),
            SessionOp::EnterGroup(group) => machine.enter_group(group),
            SessionOp::RefreshGroup => machine.refresh_group(),
            SessionOp::LeaveGroup => machine.leave_group(),
            SessionOp::Resign(confirmation) => machine.resign(confirmation),
            SessionOp::Propose(name) => machine.propose(name),
            SessionOp::RemoveName(name) => machine.remove_name(name),
            SessionOp::CreateGroup(name) => machine.create_group(&name),
            SessionOp::AddMember(email) => machine.add_member(&email),
            SessionOp::SetUserName(name) => machine.set_user_name(&name),
            SessionOp::Upgrade {
                member,
                confirmation,
            } => machine.upgrade(&member, confirmation),
        };

        let effects = match result {
            Ok(effects) => effects,
            Err(e) => {
                debug!("Operation rejected: {}", e);
                let _ = reply.send(Err(e));
                return;
            }
        };

        let performed = self.perform(effects);
        self.publish();
        match performed {
            Ok(Some(ticket)) => {
                self.waiters.insert(ticket, reply);
            }
            Ok(None) => {
                let _ = reply.send(Ok(()));
            }
            Err(e) => {
                let _ = reply.send(Err(e));
            }
        }
    }

    fn complete(&mut self, ticket: RequestTicket, result: Result<Value>) {
        let id = ticket.id;
        let outcome = self.machine.on_reply(ticket, result);
        if let Err(e) = self.perform(outcome.effects) {
            warn!("Follow-up effects failed: {}", e);
        }
        // waiters observe the state their reply produced
        self.publish();

        let waiter = self.waiters.remove(&id);
        match outcome.completion {
            Completion::Done(result) => {
                if let Err(e) = &result {
                    debug!("Request {} finished with error: {}", id, e);
                }
                if let Some(waiter) = waiter {
                    let _ = waiter.send(result);
                }
            }
            Completion::ContinuesAs(next) => {
                if let Some(waiter) = waiter {
                    self.waiters.insert(next, waiter);
                }
            }
        }
    }

    /// Execute effects; returns the ticket id of the last request issued
    fn perform(&mut self, effects: Vec<SessionEffect>) -> Result<Option<u64>> {
        let mut last_request = None;
        let mut first_error = None;

        for effect in effects {
            let outcome = match effect {
                SessionEffect::Request { ticket, request } => {
                    last_request = Some(ticket.id);
                    self.dispatch(ticket, request.address(), request.to_body());
                    Ok(())
                }
                SessionEffect::Send(request) => request
                    .to_body()
                    .and_then(|body| self.channel.send(request.address(), body)),
                SessionEffect::Subscribe(topic) => self.channel.subscribe(&topic),
                SessionEffect::Unsubscribe(topic) => self.channel.unsubscribe(&topic),
            };

            if let Err(e) = outcome {
                warn!("Effect failed: {}", e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(last_request),
        }
    }

    /// Issue a request and route its reply back into the loop
    fn dispatch(
        &self,
        ticket: RequestTicket,
        address: nayouchi_core::Address,
        body: Result<Value>,
    ) {
        let completions = self.completion_sender.clone();
        let pending = body.and_then(|body| self.channel.request(address, body));

        match pending {
            Ok(pending) => {
                let timeout = self.config.request_timeout;
                tokio::spawn(async move {
                    let result = pending.wait(timeout).await;
                    let _ = completions.send((ticket, result));
                });
            }
            Err(e) => {
                if completions.send((ticket, Err(e))).is_err() {
                    error!("Session task completion queue closed");
                }
            }
        }
    }

    fn publish(&self) {
        let snapshot = SessionSnapshot::of(&self.machine);
        self.snapshot.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }
}
