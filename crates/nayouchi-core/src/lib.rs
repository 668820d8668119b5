//! Nayouchi Core
//!
//! I/O-free building blocks of the Nayouchi name search client: the data model
//! shared with the backend, typed wire payloads, aggregation utilities, and the
//! session and connectivity state machines. The async engine that drives these
//! machines over a real channel lives in `nayouchi-runtime`.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod aggregation;
pub mod config;
pub mod errors;
pub mod protocol;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use aggregation::{
    as_key_value_list, contains, duplicates, duplicates_among, nominations_per_member, pluck,
    project_keys, tally, DuplicateScope, KeyValue, NameRecord, Nomination,
};
pub use config::{ReconnectPolicy, SessionConfig, TransportConfig};
pub use errors::{BackendError, NayouchiError, NayouchiResult, Result, SessionError, TransportError};
pub use protocol::{
    Address, ChannelLifecycle, Completion, Confirmation, ConnectivityState, PendingOp,
    ReplyOutcome, Request, RequestTicket, SessionEffect, SessionMachine, SessionPhase,
    SessionView, Topic,
};
pub use types::{Group, GroupId, GroupSummary, Member, MemberSummary, Name, ParticipantId, Role};
