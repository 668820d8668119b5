//! Command handlers for the Nayouchi CLI

use std::path::PathBuf;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;

use nayouchi_core::ParticipantId;
use nayouchi_runtime::{open_channel, signup, AppContext};

use crate::cli::{Cli, Commands, IdentityAction};
use crate::config::{parse_participant, CliAppConfig};
use crate::error::{CliError, Result};
use crate::identity::IdentityStore;
use crate::terminal_interface::TerminalInterface;
use crate::view;

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command
    pub async fn execute(cli: Cli, config: CliAppConfig) -> Result<()> {
        let data_dir = cli.data_dir.as_ref().map(PathBuf::from);
        let identity = IdentityStore::open(config.identity_path(data_dir.as_deref())?)?;

        match cli.command {
            Commands::Signup { email } => Self::handle_signup_command(&config, &email).await,
            Commands::Groups => {
                let participant = Self::participant(cli.participant.as_deref(), &config, &identity)?
                    .ok_or_else(|| {
                        CliError::Identity("No participant configured, see `identity set`".to_string())
                    })?;
                Self::handle_groups_command(&config, participant).await
            }
            Commands::Interactive => {
                Self::handle_interactive_command(cli.participant.as_deref(), config, identity).await
            }
            Commands::Identity { action } => Self::handle_identity_command(action, identity),
            Commands::Config => {
                print!("{}", CliAppConfig::example_config());
                Ok(())
            }
        }
    }

    /// Flag beats configuration beats the stored identity
    fn participant(
        flag: Option<&str>,
        config: &CliAppConfig,
        identity: &IdentityStore,
    ) -> Result<Option<ParticipantId>> {
        if let Some(value) = flag {
            return Ok(Some(parse_participant(value)?));
        }
        if let Some(participant) = config.participant()? {
            return Ok(Some(participant));
        }
        Ok(identity.participant().cloned())
    }

    async fn start(config: &CliAppConfig, participant: ParticipantId) -> Result<AppContext> {
        info!("Connecting to {}", config.transport.url);
        let context = AppContext::builder(participant)
            .with_transport_config(config.transport.clone())
            .with_session_config(config.session.clone())
            .connect_timeout(config.connect_timeout())
            .build_and_start()
            .await?;
        Ok(context)
    }

    async fn handle_signup_command(config: &CliAppConfig, email: &str) -> Result<()> {
        let (channel, monitor) =
            open_channel(config.transport.clone(), config.connect_timeout()).await?;
        let result = signup(channel.as_ref(), email, config.session.request_timeout).await;
        monitor.stop();
        result?;
        println!("An invitation link is on its way to {}", email.trim());
        Ok(())
    }

    async fn handle_groups_command(config: &CliAppConfig, participant: ParticipantId) -> Result<()> {
        let mut context = Self::start(config, participant).await?;
        let groups = context.session().snapshot().groups.unwrap_or_default();
        print!("{}", view::render_group_list(&groups));
        context.shutdown().await?;
        Ok(())
    }

    async fn handle_interactive_command(
        flag: Option<&str>,
        config: CliAppConfig,
        mut identity: IdentityStore,
    ) -> Result<()> {
        let participant = match Self::participant(flag, &config, &identity)? {
            Some(participant) => participant,
            None => {
                let participant = Self::ask_participant().await?;
                identity.set_participant(participant.clone())?;
                participant
            }
        };

        let context = Self::start(&config, participant).await?;
        let mut interface = TerminalInterface::new(context, identity, config);
        interface.run().await
    }

    /// Identity entry flow for a first start
    async fn ask_participant() -> Result<ParticipantId> {
        let mut stdout = tokio::io::stdout();
        stdout
            .write_all(b"Paste the invitation link from your mail: ")
            .await?;
        stdout.flush().await?;

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let line = lines
            .next_line()
            .await?
            .ok_or_else(|| CliError::Input("No invitation link given".to_string()))?;
        Ok(parse_participant(&line)?)
    }

    fn handle_identity_command(action: IdentityAction, mut identity: IdentityStore) -> Result<()> {
        match action {
            IdentityAction::Show => {
                if identity.identity().is_empty() {
                    println!("No identity stored ({})", identity.path().display());
                } else {
                    println!("{}", serde_json::to_string_pretty(identity.identity())?);
                }
            }
            IdentityAction::Set { participant, name } => {
                if participant.is_none() && name.is_none() {
                    return Err(CliError::Input(
                        "Give --participant and/or --name".to_string(),
                    ));
                }
                if let Some(value) = participant {
                    identity.set_participant(parse_participant(&value)?)?;
                }
                if let Some(name) = name {
                    identity.set_name(&name)?;
                }
                println!("Identity saved to {}", identity.path().display());
            }
            IdentityAction::Clear => {
                identity.clear()?;
                println!("Identity cleared");
            }
        }
        Ok(())
    }
}
