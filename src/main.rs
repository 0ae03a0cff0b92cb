//! NexusClip - clipboard classification and LAN clipboard sync
//!
//! This is the main entry point for the `nexusclip` command.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nexusclip::cli::{Cli, CliHandler, Commands, ConfigAction};
use nexusclip::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match Config::load_config(cli.config.as_deref()) {
        Ok(config) => config,
        // A broken file must not stop `config init --force` from replacing it
        Err(_)
            if matches!(
                cli.command,
                Commands::Config {
                    action: ConfigAction::Init { .. }
                }
            ) =>
        {
            Config::default()
        }
        Err(e) => return Err(e).context("Failed to load configuration"),
    };

    // Initialize logging
    let log_level = if cli.verbose {
        "debug"
    } else {
        config.log_level.as_str()
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("nexusclip={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!(
        "NexusClip v{} ({} {})",
        nexusclip::VERSION,
        env!("TARGET"),
        env!("BUILD_DATE")
    );
    debug!("Loaded configuration: {:?}", config);

    let handler = CliHandler::new(config, cli.config);
    handler.handle_command(cli.command).await?;

    Ok(())
}
