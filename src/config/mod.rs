//! Configuration management for NexusClip
//!
//! This module handles loading, validating, and managing configuration
//! for the sync engine and the clipboard companion.

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::sync::protocol::DEFAULT_SYNC_PORT;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error reading config file
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("Failed to parse TOML: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Validation error
    #[error("Config validation failed: {0}")]
    Validation(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Sync protocol settings
    #[serde(default)]
    pub sync: SyncConfig,

    /// Clipboard companion settings
    #[serde(default)]
    pub companion: CompanionConfig,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Sync engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// UDP port used for every message
    #[serde(default = "default_port")]
    pub port: u16,

    /// Destination for DISCOVER, HEARTBEAT and broadcast clips
    #[serde(default = "default_broadcast_address")]
    pub broadcast_address: Ipv4Addr,

    /// Name reported in DEVICE responses
    #[serde(default = "default_device_name")]
    pub device_name: String,

    /// Platform label reported in DEVICE responses
    #[serde(default = "default_platform")]
    pub platform: String,

    /// Seconds between heartbeat and cleanup ticks
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    /// Seconds of silence after which a peer is evicted
    #[serde(default = "default_stale_timeout")]
    pub stale_timeout_secs: u64,

    /// Seconds `discover_devices` waits for responses
    #[serde(default = "default_discovery_window")]
    pub discovery_window_secs: u64,
}

/// Clipboard companion configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanionConfig {
    /// How often the local clipboard is polled
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Announce the service over mDNS
    #[serde(default = "default_mdns_announce")]
    pub mdns_announce: bool,
}

// Default value functions
fn default_port() -> u16 {
    DEFAULT_SYNC_PORT
}

fn default_broadcast_address() -> Ipv4Addr {
    Ipv4Addr::BROADCAST
}

fn default_device_name() -> String {
    let hostname = gethostname::gethostname().to_string_lossy().to_string();
    if hostname.is_empty() {
        default_platform()
    } else {
        hostname.replace('|', "-")
    }
}

fn default_platform() -> String {
    match std::env::consts::OS {
        "linux" => "Linux",
        "macos" => "macOS",
        "windows" => "Windows",
        "android" => "Android",
        "ios" => "iOS",
        other => other,
    }
    .to_string()
}

fn default_heartbeat_interval() -> u64 {
    30
}

fn default_stale_timeout() -> u64 {
    120
}

fn default_discovery_window() -> u64 {
    5
}

fn default_poll_interval() -> u64 {
    500
}

fn default_mdns_announce() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            broadcast_address: default_broadcast_address(),
            device_name: default_device_name(),
            platform: default_platform(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            stale_timeout_secs: default_stale_timeout(),
            discovery_window_secs: default_discovery_window(),
        }
    }
}

impl Default for CompanionConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            mdns_announce: default_mdns_announce(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sync: SyncConfig::default(),
            companion: CompanionConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl SyncConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn stale_timeout(&self) -> Duration {
        Duration::from_secs(self.stale_timeout_secs)
    }

    pub fn discovery_window(&self) -> Duration {
        Duration::from_secs(self.discovery_window_secs)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::Validation(
                "sync.port must be a fixed port, not 0".to_string(),
            ));
        }
        if self.heartbeat_interval_secs < 1 {
            return Err(ConfigError::Validation(
                "sync.heartbeat_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.stale_timeout_secs <= self.heartbeat_interval_secs {
            return Err(ConfigError::Validation(
                "sync.stale_timeout_secs must exceed sync.heartbeat_interval_secs".to_string(),
            ));
        }
        if !(1..=60).contains(&self.discovery_window_secs) {
            return Err(ConfigError::Validation(
                "sync.discovery_window_secs must be between 1 and 60".to_string(),
            ));
        }

        for (field, value) in [("device_name", &self.device_name), ("platform", &self.platform)] {
            if value.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "sync.{} must not be empty",
                    field
                )));
            }
            // `|` separates platform and name on the wire
            if value.contains('|') {
                return Err(ConfigError::Validation(format!(
                    "sync.{} must not contain '|'",
                    field
                )));
            }
        }

        Ok(())
    }
}

impl CompanionConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms < 50 {
            return Err(ConfigError::Validation(
                "companion.poll_interval_ms must be at least 50".to_string(),
            ));
        }
        Ok(())
    }
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Checks in order:
    /// 1. Path from NEXUSCLIP_CONFIG environment variable
    /// 2. ~/.config/nexusclip/config.toml
    /// 3. Falls back to defaults if none exists
    pub fn load() -> Result<Self, ConfigError> {
        match Self::find_config_path() {
            Some(path) => Self::load_from_path(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load configuration with optional custom path
    pub fn load_config(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        match config_path {
            Some(path) => Self::load_from_path(path),
            None => Self::load(),
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.sync.validate()?;
        self.companion.validate()?;

        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
            other => Err(ConfigError::Validation(format!(
                "unknown log_level '{}'",
                other
            ))),
        }
    }

    /// Default config file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("nexusclip").join("config.toml"))
    }

    /// Find configuration file path
    fn find_config_path() -> Option<PathBuf> {
        // Check environment variable first
        if let Ok(path) = std::env::var("NEXUSCLIP_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        Self::default_path().filter(|p| p.exists())
    }

    /// Save configuration to `path`, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Save configuration to default location
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::default_path().ok_or_else(|| {
            ConfigError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "Could not find config directory",
            ))
        })?;
        self.save_to(&path)
    }

    /// Write the commented example file to `path`
    pub fn write_example(path: &Path, force: bool) -> Result<(), ConfigError> {
        if !force && path.exists() {
            return Err(ConfigError::Validation(
                "Config file already exists. Use --force to overwrite.".to_string(),
            ));
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, Self::generate_example())?;
        Ok(())
    }

    /// Generate example configuration file
    pub fn generate_example() -> String {
        let config = Config::default();

        format!(
            r#"# NexusClip Configuration File
# Location: ~/.config/nexusclip/config.toml

# Logging level (trace, debug, info, warn, error)
log_level = "{}"

# LAN sync protocol
[sync]
# UDP port shared by every device on the network
port = {}
# Broadcast destination for discovery, heartbeats and broadcast clips
broadcast_address = "{}"
# Name and platform reported to other devices
device_name = "{}"
platform = "{}"
# Heartbeat and stale-peer cleanup period
heartbeat_interval_secs = {}
# Peers silent for longer than this are dropped
stale_timeout_secs = {}
# How long discovery waits for replies
discovery_window_secs = {}

# Clipboard companion daemon
[companion]
# Local clipboard polling period
poll_interval_ms = {}
# Announce _nexusclip._udp over mDNS
mdns_announce = {}
"#,
            config.log_level,
            config.sync.port,
            config.sync.broadcast_address,
            config.sync.device_name,
            config.sync.platform,
            config.sync.heartbeat_interval_secs,
            config.sync.stale_timeout_secs,
            config.sync.discovery_window_secs,
            config.companion.poll_interval_ms,
            config.companion.mdns_announce,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.sync.port, 4040);
        assert_eq!(config.sync.broadcast_address, Ipv4Addr::BROADCAST);
        assert_eq!(config.sync.heartbeat_interval(), Duration::from_secs(30));
        assert_eq!(config.sync.stale_timeout(), Duration::from_secs(120));
        assert_eq!(config.sync.discovery_window(), Duration::from_secs(5));
        assert_eq!(config.companion.poll_interval(), Duration::from_millis(500));
        assert!(!config.sync.device_name.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_toml() {
        let toml_str = r#"
            log_level = "debug"

            [sync]
            port = 5050
            broadcast_address = "192.168.1.255"
            device_name = "test-machine"
            platform = "Linux"
        "#;

        let config = Config::from_toml(toml_str).unwrap();
        assert_eq!(config.sync.port, 5050);
        assert_eq!(
            config.sync.broadcast_address,
            Ipv4Addr::new(192, 168, 1, 255)
        );
        assert_eq!(config.sync.device_name, "test-machine");
        assert_eq!(config.log_level, "debug");
        // Unspecified fields keep their defaults
        assert_eq!(config.sync.stale_timeout_secs, 120);
        assert!(config.companion.mdns_announce);
    }

    #[test]
    fn test_validation_rejects_separator_in_name() {
        let result = Config::from_toml(
            r#"
            [sync]
            device_name = "bad|name"
        "#,
        );
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_validation_stale_timeout_must_exceed_heartbeat() {
        let result = Config::from_toml(
            r#"
            [sync]
            heartbeat_interval_secs = 60
            stale_timeout_secs = 60
        "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_other_ranges() {
        assert!(Config::from_toml("[sync]\nport = 0").is_err());
        assert!(Config::from_toml("[sync]\ndiscovery_window_secs = 0").is_err());
        assert!(Config::from_toml("[companion]\npoll_interval_ms = 10").is_err());
        assert!(Config::from_toml("log_level = \"loud\"").is_err());
        assert!(Config::from_toml("[sync]\nbroadcast_address = \"nope\"").is_err());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.sync.device_name = "saved".to_string();
        config.save_to(&path).unwrap();

        let loaded = Config::load_from_path(&path).unwrap();
        assert_eq!(loaded.sync, config.sync);
        assert_eq!(loaded.companion, config.companion);
    }

    #[test]
    fn test_generate_example_parses() {
        let example = Config::generate_example();
        assert!(example.contains("NexusClip Configuration"));
        assert!(example.contains("port = 4040"));

        let parsed = Config::from_toml(&example).unwrap();
        assert_eq!(parsed.sync.port, 4040);
    }

    #[test]
    fn test_write_example_respects_force() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");

        Config::write_example(&path, false).unwrap();
        assert!(Config::write_example(&path, false).is_err());
        assert!(Config::write_example(&path, true).is_ok());
    }
}
