//! Nayouchi CLI entry point

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use nayouchi_cli::{cli::Cli, commands::CommandDispatcher, config::CliAppConfig, error::Result};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_configuration(&cli)?;
    setup_logging(cli.verbose || config.cli.verbose);

    if let Some(url) = &cli.url {
        config.transport.url = url.clone();
        config.validate()?;
    }

    if let Err(e) = CommandDispatcher::execute(cli, config).await {
        error!("Command execution failed: {}", e);
        std::process::exit(1);
    }

    info!("Nayouchi CLI exited");
    Ok(())
}

/// Setup logging based on verbosity level; `RUST_LOG` wins when set
fn setup_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

/// Load configuration from file or the layered defaults
fn load_configuration(cli: &Cli) -> Result<CliAppConfig> {
    match &cli.config {
        Some(config_path) => Ok(CliAppConfig::load_from_file(config_path)?),
        None => Ok(CliAppConfig::load()?),
    }
}
