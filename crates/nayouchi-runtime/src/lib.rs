//! Nayouchi Runtime
//!
//! This crate drives the pure session machine from `nayouchi-core` over a real
//! channel:
//! - `EventBusChannel`: event-bus bridge transport over WebSocket with reconnect
//! - `MemoryChannel`: in-process channel for tests and simulations
//! - `SessionTask`: the single writer of session state
//! - `SessionHandle`: async command API and state snapshots
//! - `AppContext`: the explicit context object built once at startup

pub mod bootstrap;
pub mod channel;
pub mod connectivity;
pub mod context;
pub mod handle;
pub mod task;

pub use bootstrap::signup;
pub use channel::{
    Channel, ChannelEvent, EventBusChannel, MemoryChannel, MemoryReply, PendingReply,
    RecordedCall, SharedChannel,
};
pub use connectivity::{ConnectivityHandle, ConnectivityMonitor};
pub use context::{open_channel, AppContext, AppContextBuilder};
pub use handle::{SessionHandle, SessionSnapshot};
pub use task::{SessionCommand, SessionOp, SessionTask};

// Re-export core types for convenience
pub use nayouchi_core::{
    Confirmation, Group, GroupId, GroupSummary, Name, NayouchiError, NayouchiResult,
    ParticipantId, Role, SessionConfig, SessionPhase, Topic, TransportConfig,
};
