//! Command-line interface

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::info;

use crate::classifier::{
    check_password_strength, generate_random_password, Classification, PasswordOptions,
};
use crate::clipboard::create_provider;
use crate::companion::Companion;
use crate::config::Config;
use crate::sync::{local_address, Peer, SyncEngine};

#[derive(Parser)]
#[command(name = "nexusclip")]
#[command(about = "Clipboard classification and LAN clipboard sync")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run the clipboard companion until Ctrl+C")]
    Daemon {
        #[arg(short, long)]
        port: Option<u16>,
    },

    #[command(about = "Classify a piece of text")]
    Classify {
        text: String,

        #[arg(long)]
        json: bool,
    },

    #[command(about = "Password strength and generation")]
    Password {
        #[command(subcommand)]
        action: PasswordAction,
    },

    #[command(about = "Discover devices on the local network")]
    Peers {
        #[arg(long)]
        json: bool,
    },

    #[command(about = "Send text to the network, or to one device")]
    Send {
        text: String,

        #[arg(long)]
        to: Option<IpAddr>,
    },

    #[command(about = "Show this device's LAN address")]
    LocalIp,

    #[command(about = "Configuration management")]
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum PasswordAction {
    #[command(about = "Rate a password")]
    Strength { password: String },

    #[command(about = "Generate a random password")]
    Generate {
        #[arg(short, long, default_value = "16")]
        length: usize,

        #[arg(long)]
        no_uppercase: bool,

        #[arg(long)]
        no_lowercase: bool,

        #[arg(long)]
        no_numbers: bool,

        #[arg(long)]
        no_special: bool,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    #[command(about = "Show current configuration")]
    Show,

    #[command(about = "Generate example configuration")]
    Init {
        #[arg(long)]
        force: bool,
    },

    #[command(about = "Validate configuration")]
    Validate,
}

pub struct CliHandler {
    config: Config,
    config_path: Option<PathBuf>,
}

impl CliHandler {
    pub fn new(config: Config, config_path: Option<PathBuf>) -> Self {
        Self {
            config,
            config_path,
        }
    }

    pub async fn handle_command(&self, command: Commands) -> Result<()> {
        match command {
            Commands::Daemon { port } => self.run_daemon(port).await,
            Commands::Classify { text, json } => classify_text(&text, json),
            Commands::Password { action } => handle_password_action(action),
            Commands::Peers { json } => self.show_peers(json).await,
            Commands::Send { text, to } => self.send_text(&text, to).await,
            Commands::LocalIp => show_local_ip(),
            Commands::Config { action } => self.handle_config_action(action),
        }
    }

    async fn run_daemon(&self, port: Option<u16>) -> Result<()> {
        let mut sync_config = self.config.sync.clone();
        if let Some(port) = port {
            sync_config.port = port;
        }

        let clipboard = create_provider().context("Clipboard is not available")?;
        let engine = Arc::new(SyncEngine::with_udp(sync_config));
        let companion = Companion::new(engine, clipboard, self.config.companion.clone());

        info!("Starting NexusClip companion");
        companion
            .run_until(async {
                let _ = tokio::signal::ctrl_c().await;
            })
            .await?;

        info!("NexusClip companion stopped");
        Ok(())
    }

    async fn show_peers(&self, json: bool) -> Result<()> {
        let engine = SyncEngine::with_udp(self.config.sync.clone());
        engine.start().await?;
        let peers = engine.discover_devices().await;
        engine.stop().await;

        if json {
            let entries: Vec<_> = peers
                .iter()
                .map(|peer| {
                    serde_json::json!({
                        "address": peer.address.to_string(),
                        "platform": peer.platform,
                        "name": peer.display_name,
                        "discovered_at": peer.discovered_at.to_rfc3339(),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&entries)?);
            return Ok(());
        }

        if peers.is_empty() {
            println!("No devices found");
            return Ok(());
        }

        println!("Devices ({}):", peers.len());
        for peer in peers {
            println!("  {}", peer);
        }
        Ok(())
    }

    async fn send_text(&self, text: &str, to: Option<IpAddr>) -> Result<()> {
        let engine = SyncEngine::with_udp(self.config.sync.clone());
        engine.start().await?;

        let result = match to {
            Some(address) => {
                let peer = Peer {
                    address,
                    platform: "unknown".to_string(),
                    display_name: address.to_string(),
                    last_seen: tokio::time::Instant::now(),
                    discovered_at: Utc::now(),
                };
                match engine.connect_to_device(&peer).await {
                    Ok(()) => engine.send_clipboard(text).await,
                    Err(e) => Err(e),
                }
            }
            None => engine.broadcast_clipboard(text).await,
        };
        engine.stop().await;
        result?;

        match to {
            Some(address) => println!("Sent {} characters to {}", text.chars().count(), address),
            None => println!("Broadcast {} characters", text.chars().count()),
        }
        Ok(())
    }

    fn handle_config_action(&self, action: ConfigAction) -> Result<()> {
        match action {
            ConfigAction::Show => {
                println!("{}", toml::to_string_pretty(&self.config)?);
            }
            ConfigAction::Init { force } => {
                let path = self
                    .config_path
                    .clone()
                    .or_else(Config::default_path)
                    .ok_or_else(|| anyhow!("Could not find config directory"))?;
                Config::write_example(&path, force)?;
                println!("Example configuration written to {}", path.display());
            }
            ConfigAction::Validate => {
                self.config.validate()?;
                println!("Configuration is valid");
            }
        }
        Ok(())
    }
}

fn classify_text(text: &str, json: bool) -> Result<()> {
    let classification = Classification::of(text);

    if json {
        println!("{}", serde_json::to_string_pretty(&classification)?);
    } else {
        println!("Type: {}", classification.content_type);
        if let Some(language) = classification.language {
            println!("Language: {}", language);
        }
    }
    Ok(())
}

fn handle_password_action(action: PasswordAction) -> Result<()> {
    match action {
        PasswordAction::Strength { password } => {
            println!("{}", check_password_strength(&password));
        }
        PasswordAction::Generate {
            length,
            no_uppercase,
            no_lowercase,
            no_numbers,
            no_special,
        } => {
            let options = PasswordOptions {
                length,
                uppercase: !no_uppercase,
                lowercase: !no_lowercase,
                numbers: !no_numbers,
                special: !no_special,
            };
            println!("{}", generate_random_password(&options));
        }
    }
    Ok(())
}

fn show_local_ip() -> Result<()> {
    let address = local_address().ok_or_else(|| anyhow!("No network address found"))?;
    println!("{}", address);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_daemon_with_port() {
        let cli = Cli::try_parse_from(["nexusclip", "daemon", "--port", "5050"]).unwrap();
        assert!(matches!(cli.command, Commands::Daemon { port: Some(5050) }));
    }

    #[test]
    fn test_parse_password_generate_flags() {
        let cli = Cli::try_parse_from([
            "nexusclip",
            "password",
            "generate",
            "--length",
            "24",
            "--no-special",
        ])
        .unwrap();

        match cli.command {
            Commands::Password {
                action:
                    PasswordAction::Generate {
                        length,
                        no_special,
                        no_numbers,
                        ..
                    },
            } => {
                assert_eq!(length, 24);
                assert!(no_special);
                assert!(!no_numbers);
            }
            _ => panic!("expected password generate"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli =
            Cli::try_parse_from(["nexusclip", "local-ip", "--verbose", "--config", "x.toml"])
                .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
    }

    #[test]
    fn test_send_rejects_bad_address() {
        assert!(Cli::try_parse_from(["nexusclip", "send", "hi", "--to", "not-an-ip"]).is_err());
    }

    #[test]
    fn test_config_init_writes_example() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let handler = CliHandler::new(Config::default(), Some(path.clone()));

        handler
            .handle_config_action(ConfigAction::Init { force: false })
            .unwrap();
        assert!(Config::load_from_path(&path).is_ok());

        // Refuses to overwrite without --force
        assert!(handler
            .handle_config_action(ConfigAction::Init { force: false })
            .is_err());
        assert!(handler
            .handle_config_action(ConfigAction::Init { force: true })
            .is_ok());
    }
}
