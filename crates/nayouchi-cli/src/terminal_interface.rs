//! Terminal Interface Implementation
//!
//! Line-oriented interactive session. A `select!` loop multiplexes stdin,
//! session snapshots and connectivity changes; commands are parsed into
//! [`ReplCommand`]s and forwarded to the [`SessionHandle`]. Destructive
//! commands ask for a `y/N` answer on the next line.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info};

use nayouchi_core::{Address, NayouchiError, TransportError};
use nayouchi_runtime::{
    AppContext, Confirmation, GroupId, SessionHandle, SessionPhase, SessionSnapshot,
};

use crate::config::CliAppConfig;
use crate::error::{CliError, Result};
use crate::identity::IdentityStore;
use crate::view;

// ----------------------------------------------------------------------------
// Command Parsing
// ----------------------------------------------------------------------------

/// One line of interactive input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    List,
    Create(String),
    Enter(String),
    Leave,
    /// Set the display name; `None` reuses the stored one
    Name(Option<String>),
    Propose(String),
    Remove(String),
    Invite(String),
    Upgrade(String),
    Resign,
    Show,
    Help,
    Quit,
}

impl ReplCommand {
    /// Parse a line; blank lines yield `Ok(None)`
    pub fn parse(line: &str) -> std::result::Result<Option<Self>, String> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };
        let argument = |usage: &str| -> std::result::Result<String, String> {
            if rest.is_empty() {
                Err(format!("Usage: {}", usage))
            } else {
                Ok(rest.to_string())
            }
        };

        let command = match word.to_lowercase().as_str() {
            "list" | "ls" => ReplCommand::List,
            "create" => ReplCommand::Create(argument("create <group name>")?),
            "enter" | "open" => ReplCommand::Enter(argument("enter <n|id>")?),
            "leave" | "back" => ReplCommand::Leave,
            "name" => ReplCommand::Name((!rest.is_empty()).then(|| rest.to_string())),
            "propose" | "add" => ReplCommand::Propose(argument("propose <name>")?),
            "remove" | "rm" => ReplCommand::Remove(argument("remove <name>")?),
            "invite" => ReplCommand::Invite(argument("invite <email>")?),
            "upgrade" => ReplCommand::Upgrade(argument("upgrade <member>")?),
            "resign" => ReplCommand::Resign,
            "show" => ReplCommand::Show,
            "help" | "?" => ReplCommand::Help,
            "quit" | "exit" | "q" => ReplCommand::Quit,
            other => return Err(format!("Unknown command '{}', try `help`", other)),
        };
        Ok(Some(command))
    }
}

/// Resolve an `enter` argument: a 1-based list index or a group id
pub fn resolve_group(argument: &str, snapshot: &SessionSnapshot) -> GroupId {
    let groups = snapshot.groups.as_deref().unwrap_or_default();
    argument
        .parse::<usize>()
        .ok()
        .and_then(|index| index.checked_sub(1))
        .and_then(|index| groups.get(index))
        .map(|group| group.id.clone())
        .unwrap_or_else(|| GroupId::new(argument))
}

/// Destructive command waiting for a `y/N` answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingConfirmation {
    Resign,
    Upgrade(String),
}

impl PendingConfirmation {
    pub fn question(&self) -> String {
        match self {
            PendingConfirmation::Resign => "Really leave this group for good? [y/N] ".to_string(),
            PendingConfirmation::Upgrade(member) => {
                format!("Make {} an initiator? This cannot be undone. [y/N] ", member)
            }
        }
    }
}

/// Interpret a `y/N` answer; anything but yes declines
pub fn parse_confirmation(answer: &str) -> Confirmation {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes").into()
}

// ----------------------------------------------------------------------------
// Terminal Interface
// ----------------------------------------------------------------------------

pub struct TerminalInterface {
    context: AppContext,
    identity: IdentityStore,
    config: CliAppConfig,
    pending: Option<PendingConfirmation>,
    running: bool,
}

impl TerminalInterface {
    pub fn new(context: AppContext, identity: IdentityStore, config: CliAppConfig) -> Self {
        Self {
            context,
            identity,
            config,
            pending: None,
            running: false,
        }
    }

    fn session(&self) -> &SessionHandle {
        self.context.session()
    }

    /// Run until `quit`, end of input, or the session stops
    pub async fn run(&mut self) -> Result<()> {
        info!("Terminal interface starting");
        self.running = true;

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut updates = self.session().watch();
        let mut connectivity = self.context.connectivity();

        println!(
            "Signed in as {}. Invite link: {}",
            self.context.participant(),
            self.config.invite_link(self.context.participant())
        );
        self.show(&updates.borrow_and_update().clone());
        self.prompt().await?;

        while self.running {
            tokio::select! {
                line = lines.next_line() => match line? {
                    Some(line) => {
                        self.handle_line(&line).await;
                        if self.running {
                            self.prompt().await?;
                        }
                    }
                    None => break,
                },

                changed = updates.changed() => {
                    if changed.is_err() {
                        println!("Session stopped.");
                        break;
                    }
                    let snapshot = updates.borrow_and_update().clone();
                    debug!("Session state changed: {:?}", snapshot.phase);
                    println!();
                    self.show(&snapshot);
                    self.prompt().await?;
                }

                state = connectivity.changed() => match state {
                    Ok(state) if state.is_connected() => println!("\n* connected"),
                    Ok(_) => println!("\n* connection lost, reconnecting..."),
                    Err(_) => break,
                },
            }
        }

        info!("Terminal interface stopped");
        self.context.shutdown().await?;
        Ok(())
    }

    async fn prompt(&self) -> Result<()> {
        let text = match &self.pending {
            Some(pending) => pending.question(),
            None => self.config.cli.prompt.clone(),
        };
        let mut stdout = tokio::io::stdout();
        stdout.write_all(text.as_bytes()).await?;
        stdout.flush().await?;
        Ok(())
    }

    fn show(&self, snapshot: &SessionSnapshot) {
        print!("{}", view::render_snapshot(snapshot, self.config.cli.show_stats));
        if snapshot.phase == SessionPhase::Naming {
            if let Some(name) = self.identity.name() {
                println!("Type `name` to use your usual name ({}).", name);
            }
        }
    }

    async fn handle_line(&mut self, line: &str) {
        if let Some(pending) = self.pending.take() {
            let result = self.confirm(pending, parse_confirmation(line)).await;
            report(result);
            return;
        }

        match ReplCommand::parse(line) {
            Ok(Some(command)) => {
                let result = self.execute(command).await;
                report(result);
            }
            Ok(None) => {}
            Err(message) => println!("{}", message),
        }
    }

    /// Run one command against the session
    pub async fn execute(&mut self, command: ReplCommand) -> Result<()> {
        let session = self.session().clone();
        match command {
            ReplCommand::List => session.fetch_groups().await?,
            ReplCommand::Create(name) => session.create_group(&name).await?,
            ReplCommand::Enter(argument) => {
                let group = resolve_group(&argument, &session.snapshot());
                session.enter_group(group).await?
            }
            ReplCommand::Leave => session.leave_group().await?,
            ReplCommand::Name(name) => {
                let name = name
                    .or_else(|| self.identity.name().map(str::to_string))
                    .ok_or_else(|| CliError::Input("Usage: name <display name>".to_string()))?;
                match session.set_user_name(&name).await {
                    Ok(()) => {}
                    Err(e) if is_unconfirmed_rename(&e) => {
                        info!("Display name change not acknowledged: {}", e);
                        println!("Name sent; the group view updates once the server applies it");
                    }
                    Err(e) => return Err(e.into()),
                }
                self.identity.set_name(&name)?;
            }
            ReplCommand::Propose(name) => session.propose(name).await?,
            ReplCommand::Remove(name) => session.remove_name(name).await?,
            ReplCommand::Invite(email) => {
                session.add_member(&email).await?;
                println!("Invitation sent to {}", email);
            }
            ReplCommand::Upgrade(member) => {
                self.pending = Some(PendingConfirmation::Upgrade(member));
            }
            ReplCommand::Resign => {
                if !session.snapshot().phase.in_group() {
                    return Err(CliError::Input("Enter a group first".to_string()));
                }
                self.pending = Some(PendingConfirmation::Resign);
            }
            ReplCommand::Show => self.show(&session.snapshot()),
            ReplCommand::Help => print!("{}", view::help_text()),
            ReplCommand::Quit => self.running = false,
        }
        Ok(())
    }

    async fn confirm(&mut self, pending: PendingConfirmation, answer: Confirmation) -> Result<()> {
        if answer == Confirmation::Declined {
            println!("Cancelled.");
            return Ok(());
        }
        match pending {
            PendingConfirmation::Resign => self.session().resign(answer).await?,
            PendingConfirmation::Upgrade(member) => {
                self.session().upgrade(&member, answer).await?;
                println!("{} is now an initiator", member);
            }
        }
        Ok(())
    }
}

fn report(result: Result<()>) {
    match result {
        Ok(()) => {}
        Err(CliError::Nayouchi(e)) => println!("{}", describe(&e)),
        Err(e) => println!("{}", e),
    }
}

/// Backends may apply `setUserName` without ever replying to it
fn is_unconfirmed_rename(error: &NayouchiError) -> bool {
    matches!(
        error,
        NayouchiError::Transport(TransportError::Timeout { address, .. })
            if address == Address::SetUserName.as_str()
    )
}

/// Human wording for errors surfaced at the prompt
pub fn describe(error: &NayouchiError) -> String {
    if error.is_precondition() {
        format!("Not possible right now: {}", error)
    } else if error.is_retryable() {
        format!("Connection problem, try again: {}", error)
    } else {
        format!("Failed: {}", error)
    }
}
