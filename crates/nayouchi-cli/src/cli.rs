//! Command-line interface definitions and parsing

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<String>,

    /// Event-bus endpoint, overrides the configured one
    #[arg(short, long)]
    pub url: Option<String>,

    /// Participant id or invitation link, overrides the stored identity
    #[arg(short, long)]
    pub participant: Option<String>,

    /// Data directory for the stored identity
    #[arg(short, long)]
    pub data_dir: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Request an invitation link by mail
    Signup {
        /// Address the invitation is sent to
        email: String,
    },
    /// List your groups and exit
    Groups,
    /// Start the interactive session
    Interactive,
    /// Show or change the stored identity
    Identity {
        #[command(subcommand)]
        action: IdentityAction,
    },
    /// Print an example configuration file
    Config,
}

#[derive(Subcommand)]
pub enum IdentityAction {
    /// Print the stored identity
    Show,
    /// Store a participant id (or invitation link) and display name
    Set {
        /// Participant id or invitation link
        #[arg(short, long)]
        participant: Option<String>,
        /// Display name used when a group asks for one
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Forget the stored identity
    Clear,
}
