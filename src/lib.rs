//! # NexusClip
//!
//! Clipboard content classification and peer-to-peer clipboard sync over
//! UDP broadcast on the local network.
//!
//! - [`classifier`] tags copied text as link, email, code, password, phone
//!   or plain text, and guesses the language of code snippets.
//! - [`sync`] discovers other devices, keeps them alive with heartbeats and
//!   relays clipboard text between them.
//! - [`companion`] ties the local clipboard to the sync engine.

pub mod classifier;
pub mod cli;
pub mod clipboard;
pub mod companion;
pub mod config;
pub mod sync;

pub use config::Config;

/// Result type alias for NexusClip operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for NexusClip operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Sync engine error
    #[error("Sync error: {0}")]
    Sync(#[from] sync::SyncError),

    /// Clipboard operation error
    #[error("Clipboard error: {0}")]
    Clipboard(#[from] clipboard::ClipboardError),
}

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
