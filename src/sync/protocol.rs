//! Wire format for the LAN sync protocol
//!
//! Every message is a single UTF-8 text datagram identified by a literal,
//! case-sensitive prefix. Peers built independently interoperate only if
//! these strings match byte for byte.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use std::fmt;

/// Well-known UDP port for discovery and sync
pub const DEFAULT_SYNC_PORT: u16 = 4040;

/// Receive buffer size; large enough for any UDP datagram
pub const RECV_BUFFER_SIZE: usize = 65_535;

/// Largest UDP payload deliverable over IPv4
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

pub const DISCOVER: &str = "NEXUSCLIP_DISCOVER";
pub const DEVICE_PREFIX: &str = "NEXUSCLIP_DEVICE:";
pub const CLIP_PREFIX: &str = "NEXUSCLIP_CLIP:";
pub const ACK_PREFIX: &str = "NEXUSCLIP_ACK:";
pub const HEARTBEAT: &str = "NEXUSCLIP_HEARTBEAT";

/// Acknowledgment carried by `NEXUSCLIP_ACK:<kind>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckKind {
    Received,
    Connected,
    Disconnected,
    /// Any kind this build does not know; kept for logging
    Other(String),
}

impl AckKind {
    fn parse(kind: &str) -> Self {
        match kind {
            "RECEIVED" => AckKind::Received,
            "CONNECTED" => AckKind::Connected,
            "DISCONNECTED" => AckKind::Disconnected,
            other => AckKind::Other(other.to_string()),
        }
    }

    fn as_str(&self) -> &str {
        match self {
            AckKind::Received => "RECEIVED",
            AckKind::Connected => "CONNECTED",
            AckKind::Disconnected => "DISCONNECTED",
            AckKind::Other(kind) => kind,
        }
    }
}

impl fmt::Display for AckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded protocol message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Broadcast request for every device to report itself
    Discover,
    /// Reply to [`Message::Discover`]
    Device { platform: String, name: String },
    /// Clipboard text, base64 over UTF-8 on the wire
    Clip(String),
    Ack(AckKind),
    /// Periodic liveness broadcast
    Heartbeat,
}

impl Message {
    /// Frame the message as its wire string
    pub fn encode(&self) -> String {
        match self {
            Message::Discover => DISCOVER.to_string(),
            Message::Device { platform, name } => format!("{DEVICE_PREFIX}{platform}|{name}"),
            Message::Clip(text) => format!("{CLIP_PREFIX}{}", BASE64.encode(text.as_bytes())),
            Message::Ack(kind) => format!("{ACK_PREFIX}{kind}"),
            Message::Heartbeat => HEARTBEAT.to_string(),
        }
    }

    /// Parse a received datagram
    ///
    /// Returns `None` for anything that should be dropped: non-UTF-8 data,
    /// unknown prefixes, DEVICE payloads without both parts, and CLIP
    /// payloads that are not valid base64 of UTF-8 text. Prefixes are
    /// checked in a fixed order: DISCOVER, DEVICE, CLIP, ACK, HEARTBEAT.
    pub fn decode(datagram: &[u8]) -> Option<Self> {
        let text = std::str::from_utf8(datagram).ok()?;

        if text == DISCOVER {
            Some(Message::Discover)
        } else if let Some(payload) = text.strip_prefix(DEVICE_PREFIX) {
            Self::parse_device(payload)
        } else if let Some(payload) = text.strip_prefix(CLIP_PREFIX) {
            Self::parse_clip(payload).map(Message::Clip)
        } else if let Some(kind) = text.strip_prefix(ACK_PREFIX) {
            Some(Message::Ack(AckKind::parse(kind)))
        } else if text == HEARTBEAT {
            Some(Message::Heartbeat)
        } else {
            None
        }
    }

    fn parse_device(payload: &str) -> Option<Self> {
        let mut parts = payload.split('|');
        let platform = parts.next().filter(|p| !p.is_empty())?;
        let name = parts.next().filter(|n| !n.is_empty())?;

        Some(Message::Device {
            platform: platform.to_string(),
            name: name.to_string(),
        })
    }

    fn parse_clip(payload: &str) -> Option<String> {
        // Some encoders wrap base64 output at 76 columns
        let compact: String = payload
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        let bytes = BASE64.decode(compact).ok()?;
        String::from_utf8(bytes).ok()
    }
}
