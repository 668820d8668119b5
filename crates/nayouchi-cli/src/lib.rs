//! Nayouchi CLI library
//!
//! Terminal client for the group name search: configuration, the persisted
//! identity, plain-text views and the interactive session.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod identity;
pub mod terminal_interface;
pub mod view;

pub use cli::{Cli, Commands, IdentityAction};
pub use config::CliAppConfig;
pub use error::{CliError, Result};
pub use identity::IdentityStore;
pub use terminal_interface::{ReplCommand, TerminalInterface};
