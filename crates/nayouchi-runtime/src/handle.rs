//! Session handle
//!
//! Cloneable async API over the session task. Every operation resolves once
//! its reply has been applied to session state (or immediately for
//! fire-and-forget messages). State is observed through [`SessionSnapshot`]s.

use std::time::Duration;

use nayouchi_core::{
    Confirmation, Group, GroupId, GroupSummary, Name, NayouchiError, ParticipantId, Result,
    SessionMachine, SessionPhase, Topic,
};
use tokio::sync::{mpsc, oneshot, watch};

use crate::task::{SessionCommand, SessionOp};

// ----------------------------------------------------------------------------
// Session Snapshot
// ----------------------------------------------------------------------------

/// Read-only copy of session state published after every change
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub participant: Option<ParticipantId>,
    pub phase: SessionPhase,
    pub groups: Option<Vec<GroupSummary>>,
    pub group: Option<Group>,
    pub subscription: Option<Topic>,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            participant: None,
            phase: SessionPhase::Unidentified,
            groups: None,
            group: None,
            subscription: None,
        }
    }
}

impl SessionSnapshot {
    pub fn of(machine: &SessionMachine) -> Self {
        Self {
            participant: machine.participant().cloned(),
            phase: machine.phase(),
            groups: machine.groups().map(<[GroupSummary]>::to_vec),
            group: machine.group().cloned(),
            subscription: machine.subscription().cloned(),
        }
    }

    /// Shared matches of the current group, if in one
    pub fn duplicates(&self) -> &[Name] {
        match &self.group {
            Some(group) => &group.duplicates,
            None => &[],
        }
    }
}

// ----------------------------------------------------------------------------
// Session Handle
// ----------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    snapshot: watch::Receiver<SessionSnapshot>,
}

impl SessionHandle {
    pub fn new(
        commands: mpsc::Sender<SessionCommand>,
        snapshot: watch::Receiver<SessionSnapshot>,
    ) -> Self {
        Self { commands, snapshot }
    }

    async fn execute(&self, op: SessionOp) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(SessionCommand::Execute { op, reply })
            .await
            .map_err(|_| NayouchiError::channel_error("Failed to send command to session task"))?;
        response
            .await
            .map_err(|_| NayouchiError::channel_error("Session task dropped the command"))?
    }

    pub async fn initialize(&self, participant: ParticipantId) -> Result<()> {
        self.execute(SessionOp::Initialize(participant)).await
    }

    pub async fn fetch_groups(&self) -> Result<()> {
        self.execute(SessionOp::FetchGroups).await
    }

    pub async fn enter_group(&self, group: GroupId) -> Result<()> {
        self.execute(SessionOp::EnterGroup(group)).await
    }

    pub async fn refresh_group(&self) -> Result<()> {
        self.execute(SessionOp::RefreshGroup).await
    }

    /// Leave the current group; resolves once the group list is back
    pub async fn leave_group(&self) -> Result<()> {
        self.execute(SessionOp::LeaveGroup).await
    }

    pub async fn resign(&self, confirmation: Confirmation) -> Result<()> {
        self.execute(SessionOp::Resign(confirmation)).await
    }

    pub async fn propose<N: Into<Name>>(&self, name: N) -> Result<()> {
        self.execute(SessionOp::Propose(name.into())).await
    }

    pub async fn remove_name<N: Into<Name>>(&self, name: N) -> Result<()> {
        self.execute(SessionOp::RemoveName(name.into())).await
    }

    /// Create a group; resolves once the new group has been entered
    pub async fn create_group(&self, name: &str) -> Result<()> {
        self.execute(SessionOp::CreateGroup(name.to_string())).await
    }

    pub async fn add_member(&self, email: &str) -> Result<()> {
        self.execute(SessionOp::AddMember(email.to_string())).await
    }

    pub async fn set_user_name(&self, name: &str) -> Result<()> {
        self.execute(SessionOp::SetUserName(name.to_string())).await
    }

    pub async fn upgrade(&self, member: &str, confirmation: Confirmation) -> Result<()> {
        self.execute(SessionOp::Upgrade {
            member: member.to_string(),
            confirmation,
        })
        .await
    }

    /// Ask the session task to stop
    pub async fn shutdown(&self) -> Result<()> {
        self.commands
            .send(SessionCommand::Shutdown)
            .await
            .map_err(|_| NayouchiError::channel_error("Session task already stopped"))
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Receiver notified on every state change
    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    /// Wait until the published state satisfies `predicate`
    pub async fn wait_until<F>(&self, timeout: Duration, mut predicate: F) -> Result<SessionSnapshot>
    where
        F: FnMut(&SessionSnapshot) -> bool,
    {
        let mut receiver = self.snapshot.clone();
        let wait = async {
            receiver
                .wait_for(|snapshot| predicate(snapshot))
                .await
                .map(|snapshot| snapshot.clone())
        };
        match tokio::time::timeout(timeout, wait).await {
            Ok(Ok(snapshot)) => Ok(snapshot),
            Ok(Err(_)) => Err(NayouchiError::channel_error("Session task stopped")),
            Err(_) => Err(NayouchiError::channel_error(format!(
                "Session state did not settle within {:?}",
                timeout
            ))),
        }
    }
}
