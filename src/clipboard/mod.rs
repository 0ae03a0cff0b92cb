//! Clipboard abstraction layer
//!
//! The companion loop only ever reads and writes plain text, so the
//! provider trait is text-only. [`SystemClipboard`] talks to the OS
//! clipboard through `arboard`; [`MemoryClipboard`] backs tests.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Clipboard errors
#[derive(Debug, Error)]
pub enum ClipboardError {
    /// No clipboard is reachable (no display server, unsupported platform)
    #[error("Clipboard unavailable: {0}")]
    Unavailable(String),

    /// Platform-specific error
    #[error("Platform error: {0}")]
    Platform(String),
}

/// Clipboard provider trait
#[async_trait]
pub trait ClipboardProvider: Send + Sync {
    /// Current clipboard text; empty when the clipboard holds no text
    async fn get_text(&self) -> Result<String, ClipboardError>;

    /// Replace the clipboard with `text`
    async fn set_text(&self, text: &str) -> Result<(), ClipboardError>;

    /// Get provider name
    fn name(&self) -> &str;
}

/// OS clipboard via `arboard`
pub struct SystemClipboard {
    inner: Mutex<arboard::Clipboard>,
}

impl SystemClipboard {
    pub fn new() -> Result<Self, ClipboardError> {
        let clipboard =
            arboard::Clipboard::new().map_err(|e| ClipboardError::Unavailable(e.to_string()))?;
        Ok(Self {
            inner: Mutex::new(clipboard),
        })
    }

    fn with_clipboard<T>(
        &self,
        f: impl FnOnce(&mut arboard::Clipboard) -> Result<T, arboard::Error>,
    ) -> Result<T, ClipboardError> {
        let mut clipboard = self
            .inner
            .lock()
            .map_err(|_| ClipboardError::Platform("clipboard lock poisoned".to_string()))?;
        f(&mut clipboard).map_err(|e| ClipboardError::Platform(e.to_string()))
    }
}

#[async_trait]
impl ClipboardProvider for SystemClipboard {
    async fn get_text(&self) -> Result<String, ClipboardError> {
        self.with_clipboard(|clipboard| match clipboard.get_text() {
            // Images and empty clipboards are not text
            Err(arboard::Error::ContentNotAvailable) => Ok(String::new()),
            other => other,
        })
    }

    async fn set_text(&self, text: &str) -> Result<(), ClipboardError> {
        self.with_clipboard(|clipboard| clipboard.set_text(text))
    }

    fn name(&self) -> &str {
        "system"
    }
}

/// In-memory clipboard; clones share the same contents
#[derive(Debug, Clone, Default)]
pub struct MemoryClipboard {
    text: Arc<Mutex<String>>,
}

impl MemoryClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(text: &str) -> Self {
        Self {
            text: Arc::new(Mutex::new(text.to_string())),
        }
    }

    /// Contents without going through the async trait
    pub fn snapshot(&self) -> String {
        self.text.lock().map(|t| t.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ClipboardProvider for MemoryClipboard {
    async fn get_text(&self) -> Result<String, ClipboardError> {
        Ok(self.snapshot())
    }

    async fn set_text(&self, text: &str) -> Result<(), ClipboardError> {
        let mut current = self
            .text
            .lock()
            .map_err(|_| ClipboardError::Platform("clipboard lock poisoned".to_string()))?;
        *current = text.to_string();
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Create a clipboard provider for the current platform
pub fn create_provider() -> Result<Arc<dyn ClipboardProvider>, ClipboardError> {
    Ok(Arc::new(SystemClipboard::new()?))
}
