//! Session State Machine
//!
//! Pure model of one participant's session: which groups they see, which group
//! they are in and which push topic they are subscribed to. Operations never
//! perform I/O; they validate preconditions, update state and return the
//! [`SessionEffect`]s a runtime must execute. Replies are fed back through
//! [`SessionMachine::on_reply`] with the ticket that requested them.
//!
//! Navigation (listing, entering and leaving groups) bumps an epoch. Every
//! request carries the epoch it was issued in, and replies from an older epoch
//! are discarded instead of overwriting newer state.

use serde_json::Value;
use tracing::{debug, warn};

use crate::config::SessionConfig;
use crate::errors::{NayouchiError, Result, SessionError};
use crate::protocol::messages::{
    decode_ack, decode_reply, AddMemberRequest, Address, CreateReply, CreateRequest,
    GroupRequest, ListRequest, NominationRequest, Request, ResignReply, SetUserNameRequest,
    Topic, UpgradeRequest,
};
use crate::types::{Group, GroupId, GroupSummary, Name, ParticipantId};

// ----------------------------------------------------------------------------
// Session State Types
// ----------------------------------------------------------------------------

/// What the participant is currently looking at
///
/// Once identified the session is either listing groups or inside exactly one
/// group, never both.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionView {
    /// No group list has been received yet
    #[default]
    Unidentified,
    Listing { groups: Vec<GroupSummary> },
    InGroup { group: Group },
}

/// Coarse session state as seen by a presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Unidentified,
    Listing,
    InGroup,
    /// In a group whose own display name is still empty
    Naming,
}

impl SessionPhase {
    pub fn of(view: &SessionView) -> Self {
        match view {
            SessionView::Unidentified => SessionPhase::Unidentified,
            SessionView::Listing { .. } => SessionPhase::Listing,
            SessionView::InGroup { group } => group.phase_for_me(),
        }
    }

    pub fn in_group(&self) -> bool {
        matches!(self, SessionPhase::InGroup | SessionPhase::Naming)
    }
}

impl Group {
    /// Phase of a session that is inside this group
    pub fn phase_for_me(&self) -> SessionPhase {
        if self.needs_name() {
            SessionPhase::Naming
        } else {
            SessionPhase::InGroup
        }
    }
}

/// Explicit human confirmation for destructive operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Granted,
    Declined,
}

impl From<bool> for Confirmation {
    fn from(granted: bool) -> Self {
        if granted {
            Confirmation::Granted
        } else {
            Confirmation::Declined
        }
    }
}

// ----------------------------------------------------------------------------
// Effects and Tickets
// ----------------------------------------------------------------------------

/// Operation a reply belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingOp {
    FetchGroups,
    /// Cold entry: installs the group and its subscription
    EnterGroup { group: GroupId },
    /// Warm refresh: replaces the snapshot only
    RefreshGroup { group: GroupId },
    CreateGroup,
    Resign { group: GroupId },
    SetUserName { group: GroupId },
}

impl PendingOp {
    pub fn name(&self) -> &'static str {
        match self {
            PendingOp::FetchGroups => "fetch_groups",
            PendingOp::EnterGroup { .. } => "enter_group",
            PendingOp::RefreshGroup { .. } => "refresh_group",
            PendingOp::CreateGroup => "create_group",
            PendingOp::Resign { .. } => "resign",
            PendingOp::SetUserName { .. } => "set_user_name",
        }
    }
}

/// Correlates a request with the session state it was issued from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTicket {
    pub id: u64,
    pub epoch: u64,
    pub op: PendingOp,
}

/// I/O the runtime performs on behalf of the machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEffect {
    /// Request/reply message; the reply goes back to [`SessionMachine::on_reply`]
    Request {
        ticket: RequestTicket,
        request: Request,
    },
    /// Fire-and-forget message
    Send(Request),
    Subscribe(Topic),
    Unsubscribe(Topic),
}

/// How the operation a reply belonged to ended
#[derive(Debug)]
pub enum Completion {
    /// The operation is finished
    Done(Result<()>),
    /// The operation chained into the request with this ticket id
    ContinuesAs(u64),
}

/// Result of feeding a reply into the machine
#[derive(Debug)]
pub struct ReplyOutcome {
    pub effects: Vec<SessionEffect>,
    pub completion: Completion,
}

impl ReplyOutcome {
    fn done(effects: Vec<SessionEffect>) -> Self {
        Self {
            effects,
            completion: Completion::Done(Ok(())),
        }
    }

    fn failed(error: NayouchiError) -> Self {
        Self {
            effects: Vec::new(),
            completion: Completion::Done(Err(error)),
        }
    }

    fn superseded(op: &PendingOp) -> Self {
        Self::failed(SessionError::Superseded { operation: op.name() }.into())
    }

    /// Continue with the request emitted last in `effects`
    fn chained(effects: Vec<SessionEffect>) -> Self {
        let next = effects.iter().rev().find_map(|effect| match effect {
            SessionEffect::Request { ticket, .. } => Some(ticket.id),
            _ => None,
        });
        let completion = match next {
            Some(id) => Completion::ContinuesAs(id),
            None => Completion::Done(Ok(())),
        };
        Self { effects, completion }
    }
}

// ----------------------------------------------------------------------------
// Session Machine
// ----------------------------------------------------------------------------

/// Participant-scoped session state machine
#[derive(Debug, Clone)]
pub struct SessionMachine {
    participant: Option<ParticipantId>,
    view: SessionView,
    subscription: Option<Topic>,
    epoch: u64,
    next_ticket: u64,
    /// Ticket of the list or enter request that has not been answered yet
    navigation: Option<u64>,
    catch_up_refresh: bool,
}

impl Default for SessionMachine {
    fn default() -> Self {
        Self::new(&SessionConfig::default())
    }
}

impl SessionMachine {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            participant: None,
            view: SessionView::Unidentified,
            subscription: None,
            epoch: 0,
            next_ticket: 1,
            navigation: None,
            catch_up_refresh: config.catch_up_refresh,
        }
    }

    // ------------------------------------------------------------------------
    // Observation
    // ------------------------------------------------------------------------

    pub fn participant(&self) -> Option<&ParticipantId> {
        self.participant.as_ref()
    }

    pub fn view(&self) -> &SessionView {
        &self.view
    }

    pub fn phase(&self) -> SessionPhase {
        SessionPhase::of(&self.view)
    }

    pub fn groups(&self) -> Option<&[GroupSummary]> {
        match &self.view {
            SessionView::Listing { groups } => Some(groups),
            _ => None,
        }
    }

    pub fn group(&self) -> Option<&Group> {
        match &self.view {
            SessionView::InGroup { group } => Some(group),
            _ => None,
        }
    }

    /// Topic of the live subscription, held iff the session is in a group
    pub fn subscription(&self) -> Option<&Topic> {
        self.subscription.as_ref()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    // ------------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------------

    /// Identify the participant and request their group list
    pub fn initialize(&mut self, participant: ParticipantId) -> Result<Vec<SessionEffect>> {
        if let Some(existing) = &self.participant {
            return Err(SessionError::AlreadyIdentified {
                participant: existing.to_string(),
            }
            .into());
        }
        debug!("Session initialized for participant {}", participant);
        self.participant = Some(participant);
        self.fetch_groups()
    }

    /// Request the group list; on reply the session is in `Listing`
    pub fn fetch_groups(&mut self) -> Result<Vec<SessionEffect>> {
        let participant = self.require_participant("fetch_groups")?;
        self.begin_navigation();
        let request = Request::List(ListRequest { participant });
        Ok(vec![self.navigate(PendingOp::FetchGroups, request)])
    }

    /// Cold entry into `group`
    pub fn enter_group(&mut self, group: GroupId) -> Result<Vec<SessionEffect>> {
        let participant = self.require_participant("enter_group")?;
        self.begin_navigation();
        let request = Request::Enter(GroupRequest {
            participant,
            group: group.clone(),
        });
        Ok(vec![self.navigate(PendingOp::EnterGroup { group }, request)])
    }

    /// Warm re-fetch of the current group's snapshot
    pub fn refresh_group(&mut self) -> Result<Vec<SessionEffect>> {
        let (participant, group) = self.require_group("refresh_group")?;
        Ok(vec![self.refresh_request(participant, group)])
    }

    /// Leave the current group, drop its subscription and list groups again
    pub fn leave_group(&mut self) -> Result<Vec<SessionEffect>> {
        self.require_group("leave_group")?;
        Ok(self.leave())
    }

    /// Ask the backend to remove the participant from the current group
    pub fn resign(&mut self, confirmation: Confirmation) -> Result<Vec<SessionEffect>> {
        let (participant, group) = self.require_group("resign")?;
        Self::require_confirmation("resign", confirmation)?;
        let request = Request::Resign(GroupRequest {
            participant,
            group: group.clone(),
        });
        Ok(vec![self.request(PendingOp::Resign { group }, request)])
    }

    /// Nominate a name; the group snapshot updates through the push topic
    pub fn propose(&mut self, name: Name) -> Result<Vec<SessionEffect>> {
        let request = self.nomination("propose", name)?;
        Ok(vec![SessionEffect::Send(Request::ProposeName(request))])
    }

    /// Withdraw a nomination; the group snapshot updates through the push topic
    pub fn remove_name(&mut self, name: Name) -> Result<Vec<SessionEffect>> {
        let request = self.nomination("remove_name", name)?;
        Ok(vec![SessionEffect::Send(Request::RemoveName(request))])
    }

    /// Create a group and enter it once the backend assigned its id
    pub fn create_group(&mut self, name: &str) -> Result<Vec<SessionEffect>> {
        let participant = self.require_participant("create_group")?;
        let name = Self::require_value("create_group", name)?;
        let request = Request::Create(CreateRequest { name, participant });
        Ok(vec![self.request(PendingOp::CreateGroup, request)])
    }

    pub fn add_member(&mut self, email: &str) -> Result<Vec<SessionEffect>> {
        let (participant, group) = self.require_group("add_member")?;
        let email = Self::require_value("add_member", email)?;
        Ok(vec![SessionEffect::Send(Request::AddMember(AddMemberRequest {
            participant,
            group,
            email,
        }))])
    }

    /// Set the participant's display name within the current group
    pub fn set_user_name(&mut self, name: &str) -> Result<Vec<SessionEffect>> {
        let (participant, group) = self.require_group("set_user_name")?;
        let name = Self::require_value("set_user_name", name)?;
        let request = Request::SetUserName(SetUserNameRequest {
            participant,
            group: group.clone(),
            name,
        });
        Ok(vec![self.request(PendingOp::SetUserName { group }, request)])
    }

    /// Promote a proposer to initiator
    pub fn upgrade(&mut self, member: &str, confirmation: Confirmation) -> Result<Vec<SessionEffect>> {
        let (participant, group) = self.require_group("upgrade")?;
        let member = Self::require_value("upgrade", member)?;
        if !self.group().map_or(false, |g| g.me.is_initiator()) {
            return Err(SessionError::NotInitiator { operation: "upgrade" }.into());
        }
        Self::require_confirmation("upgrade", confirmation)?;
        Ok(vec![SessionEffect::Send(Request::Upgrade(UpgradeRequest {
            participant,
            group,
            member,
        }))])
    }

    // ------------------------------------------------------------------------
    // Inbound
    // ------------------------------------------------------------------------

    /// A message was pushed on `topic`
    pub fn on_push(&mut self, topic: &Topic) -> Vec<SessionEffect> {
        if self.subscription.as_ref() != Some(topic) {
            debug!("Ignoring push on unsubscribed topic {}", topic);
            return Vec::new();
        }
        match self.require_group("refresh_group") {
            Ok((participant, group)) => vec![self.refresh_request(participant, group)],
            Err(_) => Vec::new(),
        }
    }

    /// The channel reopened after a loss; pushes sent while it was down are gone
    pub fn on_reconnect(&mut self) -> Vec<SessionEffect> {
        if let Ok((participant, group)) = self.require_group("refresh_group") {
            debug!("Reconnected, refreshing group {}", group);
            return vec![self.refresh_request(participant, group)];
        }
        if self.participant.is_none() || self.navigation.is_some() {
            return Vec::new();
        }
        debug!("Reconnected, listing groups again");
        self.fetch_groups().unwrap_or_default()
    }

    /// Apply the reply to the request identified by `ticket`
    pub fn on_reply(&mut self, ticket: RequestTicket, reply: Result<Value>) -> ReplyOutcome {
        if self.navigation == Some(ticket.id) {
            self.navigation = None;
        }
        let body = match reply {
            Ok(body) => body,
            Err(error) => {
                debug!("Request '{}' failed: {}", ticket.op.name(), error);
                return ReplyOutcome::failed(error);
            }
        };

        let stale = ticket.epoch != self.epoch;
        match ticket.op {
            PendingOp::FetchGroups => {
                if stale {
                    warn!("Discarding stale group list (epoch {} < {})", ticket.epoch, self.epoch);
                    return ReplyOutcome::superseded(&ticket.op);
                }
                match decode_reply::<Vec<GroupSummary>>(Address::List, body) {
                    Ok(groups) => {
                        let mut effects = Vec::new();
                        if let Some(topic) = self.subscription.take() {
                            effects.push(SessionEffect::Unsubscribe(topic));
                        }
                        debug!("Listing {} groups", groups.len());
                        self.view = SessionView::Listing { groups };
                        ReplyOutcome::done(effects)
                    }
                    Err(e) => ReplyOutcome::failed(e),
                }
            }

            PendingOp::EnterGroup { ref group } => {
                if stale {
                    warn!("Discarding stale snapshot of group {}", group);
                    return ReplyOutcome::superseded(&ticket.op);
                }
                match decode_reply::<Group>(Address::Enter, body) {
                    Ok(snapshot) => ReplyOutcome::done(self.install_group(snapshot)),
                    Err(e) => ReplyOutcome::failed(e),
                }
            }

            PendingOp::RefreshGroup { ref group } => {
                if stale || self.group().map(|g| &g.id) != Some(group) {
                    debug!("Discarding refresh of group {} no longer in view", group);
                    return ReplyOutcome::superseded(&ticket.op);
                }
                match decode_reply::<Group>(Address::Enter, body) {
                    Ok(snapshot) => {
                        self.view = SessionView::InGroup { group: snapshot };
                        ReplyOutcome::done(Vec::new())
                    }
                    Err(e) => ReplyOutcome::failed(e),
                }
            }

            PendingOp::CreateGroup => match decode_reply::<CreateReply>(Address::Create, body) {
                Ok(_) if stale => {
                    warn!("Not entering created group after navigation moved on");
                    ReplyOutcome::superseded(&ticket.op)
                }
                Ok(created) => match self.enter_group(created.group) {
                    Ok(effects) => ReplyOutcome::chained(effects),
                    Err(e) => ReplyOutcome::failed(e),
                },
                Err(e) => ReplyOutcome::failed(e),
            },

            PendingOp::Resign { ref group } => {
                match decode_reply::<ResignReply>(Address::Resign, body) {
                    Ok(reply) => {
                        debug!("Resigned from group {} ({:?})", group, reply.group);
                        if self.group().map(|g| &g.id) == Some(group) {
                            ReplyOutcome::chained(self.leave())
                        } else {
                            ReplyOutcome::done(Vec::new())
                        }
                    }
                    Err(e) => ReplyOutcome::failed(e),
                }
            }

            PendingOp::SetUserName { .. } => match decode_ack(Address::SetUserName, body) {
                Ok(()) => ReplyOutcome::done(Vec::new()),
                Err(e) => ReplyOutcome::failed(e),
            },
        }
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn begin_navigation(&mut self) {
        self.epoch += 1;
    }

    fn request(&mut self, op: PendingOp, request: Request) -> SessionEffect {
        let ticket = RequestTicket {
            id: self.next_ticket,
            epoch: self.epoch,
            op,
        };
        self.next_ticket += 1;
        SessionEffect::Request { ticket, request }
    }

    fn navigate(&mut self, op: PendingOp, request: Request) -> SessionEffect {
        let effect = self.request(op, request);
        if let SessionEffect::Request { ticket, .. } = &effect {
            self.navigation = Some(ticket.id);
        }
        effect
    }

    fn refresh_request(&mut self, participant: ParticipantId, group: GroupId) -> SessionEffect {
        let request = Request::Enter(GroupRequest {
            participant,
            group: group.clone(),
        });
        self.request(PendingOp::RefreshGroup { group }, request)
    }

    /// Install a freshly entered group together with its subscription
    fn install_group(&mut self, snapshot: Group) -> Vec<SessionEffect> {
        let topic = Topic::for_group(&snapshot.id);
        let mut effects = Vec::new();

        match self.subscription.take() {
            Some(current) if current == topic => {}
            Some(previous) => {
                effects.push(SessionEffect::Unsubscribe(previous));
                effects.push(SessionEffect::Subscribe(topic.clone()));
            }
            None => effects.push(SessionEffect::Subscribe(topic.clone())),
        }
        self.subscription = Some(topic);

        let group_id = snapshot.id.clone();
        debug!("Entered group {} as {:?}", group_id, snapshot.phase_for_me());
        self.view = SessionView::InGroup { group: snapshot };

        if self.catch_up_refresh {
            if let Some(participant) = self.participant.clone() {
                effects.push(self.refresh_request(participant, group_id));
            }
        }
        effects
    }

    fn leave(&mut self) -> Vec<SessionEffect> {
        let mut effects = Vec::new();
        if let Some(topic) = self.subscription.take() {
            effects.push(SessionEffect::Unsubscribe(topic));
        }
        self.view = SessionView::Listing { groups: Vec::new() };
        if let Ok(mut fetch) = self.fetch_groups() {
            effects.append(&mut fetch);
        }
        effects
    }

    fn nomination(&self, operation: &'static str, name: Name) -> Result<NominationRequest> {
        let (participant, group) = self.require_group(operation)?;
        if name.is_blank() {
            return Err(SessionError::EmptyName { operation }.into());
        }
        if self.group().map_or(true, Group::needs_name) {
            return Err(SessionError::NameRequired { operation }.into());
        }
        Ok(NominationRequest {
            group,
            participant,
            name,
        })
    }

    fn require_participant(&self, operation: &'static str) -> Result<ParticipantId> {
        self.participant
            .clone()
            .ok_or_else(|| SessionError::NotIdentified { operation }.into())
    }

    fn require_group(&self, operation: &'static str) -> Result<(ParticipantId, GroupId)> {
        let participant = self.require_participant(operation)?;
        match &self.view {
            SessionView::InGroup { group } => Ok((participant, group.id.clone())),
            _ => Err(SessionError::RequiresGroup { operation }.into()),
        }
    }

    fn require_value(operation: &'static str, value: &str) -> Result<String> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(SessionError::EmptyName { operation }.into());
        }
        Ok(trimmed.to_string())
    }

    fn require_confirmation(operation: &'static str, confirmation: Confirmation) -> Result<()> {
        match confirmation {
            Confirmation::Granted => Ok(()),
            Confirmation::Declined => Err(SessionError::ConfirmationRequired { operation }.into()),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn machine() -> SessionMachine {
        SessionMachine::new(&SessionConfig {
            catch_up_refresh: false,
            ..SessionConfig::default()
        })
    }

    fn ticket_of(effects: &[SessionEffect]) -> RequestTicket {
        effects
            .iter()
            .find_map(|e| match e {
                SessionEffect::Request { ticket, .. } => Some(ticket.clone()),
                _ => None,
            })
            .expect("effects contain a request")
    }

    fn snapshot(id: &str, me: &str) -> Value {
        json!({
            "id": id,
            "name": "Trip",
            "me": { "name": me, "role": "INITIATOR", "nominations": [] },
            "initiators": [me],
            "proposers": [],
            "duplicates": [],
            "proposersNominations": []
        })
    }

    fn listing(m: &mut SessionMachine) {
        let effects = m.initialize(ParticipantId::new("u1")).unwrap();
        m.on_reply(ticket_of(&effects), Ok(json!([])));
    }

    fn entered(m: &mut SessionMachine, id: &str) -> Vec<SessionEffect> {
        let effects = m.enter_group(GroupId::new(id)).unwrap();
        m.on_reply(ticket_of(&effects), Ok(snapshot(id, "Kim"))).effects
    }

    #[test]
    fn test_initialize_lists_groups() {
        let mut m = machine();
        assert_eq!(m.phase(), SessionPhase::Unidentified);
        listing(&mut m);
        assert_eq!(m.phase(), SessionPhase::Listing);
        assert_eq!(m.groups(), Some(&[][..]));
        assert!(m.initialize(ParticipantId::new("u2")).is_err());
    }

    #[test]
    fn test_enter_subscribes_once() {
        let mut m = machine();
        listing(&mut m);
        let effects = entered(&mut m, "g1");
        assert_eq!(effects, vec![SessionEffect::Subscribe(Topic::new("grp-g1"))]);
        assert!(m.groups().is_none());

        // push triggers a warm refresh that does not re-subscribe
        let refresh = m.on_push(&Topic::new("grp-g1"));
        let outcome = m.on_reply(ticket_of(&refresh), Ok(snapshot("g1", "Kim")));
        assert!(outcome.effects.is_empty());
        assert_eq!(m.subscription(), Some(&Topic::new("grp-g1")));
    }

    #[test]
    fn test_switching_groups_replaces_subscription() {
        let mut m = machine();
        listing(&mut m);
        entered(&mut m, "g1");
        let effects = entered(&mut m, "g2");
        assert_eq!(
            effects,
            vec![
                SessionEffect::Unsubscribe(Topic::new("grp-g1")),
                SessionEffect::Subscribe(Topic::new("grp-g2")),
            ]
        );
    }

    #[test]
    fn test_stale_enter_reply_is_discarded() {
        let mut m = machine();
        listing(&mut m);
        let first = m.enter_group(GroupId::new("g1")).unwrap();
        let second = m.enter_group(GroupId::new("g2")).unwrap();

        let outcome = m.on_reply(ticket_of(&second), Ok(snapshot("g2", "Kim")));
        assert!(matches!(outcome.completion, Completion::Done(Ok(()))));

        let outcome = m.on_reply(ticket_of(&first), Ok(snapshot("g1", "Kim")));
        assert!(outcome.effects.is_empty());
        assert!(matches!(
            outcome.completion,
            Completion::Done(Err(NayouchiError::Session(SessionError::Superseded { .. })))
        ));
        assert_eq!(m.group().map(|g| g.id.as_str()), Some("g2"));
    }

    #[test]
    fn test_group_operations_require_group() {
        let mut m = machine();
        listing(&mut m);
        let err = m.propose(Name::new("Smith")).unwrap_err();
        assert!(matches!(err, NayouchiError::Session(SessionError::RequiresGroup { .. })));
        assert!(m.leave_group().is_err());
        assert!(m.add_member("a@b.c").is_err());
        assert_eq!(m.phase(), SessionPhase::Listing);
    }

    #[test]
    fn test_naming_gate() {
        let mut m = machine();
        listing(&mut m);
        let effects = m.enter_group(GroupId::new("g1")).unwrap();
        m.on_reply(ticket_of(&effects), Ok(snapshot("g1", "")));
        assert_eq!(m.phase(), SessionPhase::Naming);

        let err = m.propose(Name::new("Smith")).unwrap_err();
        assert!(matches!(err, NayouchiError::Session(SessionError::NameRequired { .. })));
        assert!(m.set_user_name("  ").is_err());
        assert!(m.set_user_name("Kim").is_ok());
    }

    #[test]
    fn test_destructive_operations_need_confirmation() {
        let mut m = machine();
        listing(&mut m);
        entered(&mut m, "g1");

        let err = m.resign(Confirmation::Declined).unwrap_err();
        assert!(matches!(err, NayouchiError::Session(SessionError::ConfirmationRequired { .. })));
        assert!(m.upgrade("Sam", Confirmation::Declined).is_err());

        let effects = m.upgrade("Sam", Confirmation::Granted).unwrap();
        assert!(matches!(&effects[..], [SessionEffect::Send(Request::Upgrade(_))]));
    }

    #[test]
    fn test_resign_leaves_and_lists() {
        let mut m = machine();
        listing(&mut m);
        entered(&mut m, "g1");

        let effects = m.resign(Confirmation::Granted).unwrap();
        let outcome = m.on_reply(ticket_of(&effects), Ok(json!({ "group": "removed" })));
        assert_eq!(outcome.effects[0], SessionEffect::Unsubscribe(Topic::new("grp-g1")));
        let next = ticket_of(&outcome.effects);
        assert!(matches!(outcome.completion, Completion::ContinuesAs(id) if id == next.id));
        assert_eq!(m.phase(), SessionPhase::Listing);
        assert!(m.subscription().is_none());
    }

    #[test]
    fn test_failed_reply_leaves_state_unchanged() {
        let mut m = machine();
        listing(&mut m);
        let effects = m.enter_group(GroupId::new("g1")).unwrap();
        let outcome = m.on_reply(
            ticket_of(&effects),
            Err(NayouchiError::rejected("enter", 403, "not a member")),
        );
        assert!(matches!(outcome.completion, Completion::Done(Err(_))));
        assert_eq!(m.phase(), SessionPhase::Listing);
        assert!(m.subscription().is_none());
    }

    #[test]
    fn test_reconnect_resyncs_current_view() {
        let mut m = machine();
        assert!(m.on_reconnect().is_empty());

        listing(&mut m);
        let epoch = m.epoch();
        let effects = m.on_reconnect();
        assert!(matches!(ticket_of(&effects).op, PendingOp::FetchGroups));
        assert!(m.epoch() > epoch);
        m.on_reply(ticket_of(&effects), Ok(json!([])));

        // an enter issued after the reopen already brings fresh state
        let pending = m.enter_group(GroupId::new("g1")).unwrap();
        assert!(m.on_reconnect().is_empty());
        m.on_reply(ticket_of(&pending), Ok(snapshot("g1", "Kim")));
        assert_eq!(m.phase(), SessionPhase::InGroup);

        let epoch = m.epoch();
        let effects = m.on_reconnect();
        assert!(matches!(
            ticket_of(&effects).op,
            PendingOp::RefreshGroup { ref group } if group.as_str() == "g1"
        ));
        assert_eq!(m.epoch(), epoch);
        assert_eq!(m.subscription(), Some(&Topic::new("grp-g1")));
    }

    #[test]
    fn test_catch_up_refresh_follows_subscribe() {
        let mut m = SessionMachine::default();
        listing(&mut m);
        let effects = m.enter_group(GroupId::new("g1")).unwrap();
        let outcome = m.on_reply(ticket_of(&effects), Ok(snapshot("g1", "Kim")));
        assert_eq!(outcome.effects[0], SessionEffect::Subscribe(Topic::new("grp-g1")));
        assert!(matches!(
            &outcome.effects[1],
            SessionEffect::Request { ticket, .. } if matches!(ticket.op, PendingOp::RefreshGroup { .. })
        ));
    }
}
