//! Backend message surface and the state machines driven by it

pub mod connectivity;
pub mod messages;
pub mod session;

pub use connectivity::{ChannelLifecycle, ConnectivityState};
pub use messages::{
    decode_ack, decode_reply, Ack, AckResult, AddMemberRequest, Address, CreateReply,
    CreateRequest, GroupRequest, ListRequest, NominationRequest, Request, ResignOutcome,
    ResignReply, SetUserNameRequest, SignupRequest, Topic, UpgradeRequest,
};
pub use session::{
    Completion, Confirmation, PendingOp, ReplyOutcome, RequestTicket, SessionEffect, SessionMachine,
    SessionPhase, SessionView,
};
