//! Clipboard companion daemon
//!
//! Glues the local clipboard to the [`SyncEngine`]: new local text is
//! broadcast, received text is written to the clipboard. A single "last
//! clipboard" value is shared by both directions so a clip that was just
//! received is not sent straight back out.

pub mod mdns;

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{broadcast::error::RecvError, Mutex};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::classifier::Classification;
use crate::clipboard::ClipboardProvider;
use crate::config::CompanionConfig;
use crate::sync::{preview, SyncEngine, SyncEvent};
use crate::Result;

pub use mdns::MdnsAnnouncer;

/// Clipboard companion
pub struct Companion {
    engine: Arc<SyncEngine>,
    clipboard: Arc<dyn ClipboardProvider>,
    config: CompanionConfig,
    last_clipboard: Mutex<String>,
}

impl Companion {
    pub fn new(
        engine: Arc<SyncEngine>,
        clipboard: Arc<dyn ClipboardProvider>,
        config: CompanionConfig,
    ) -> Self {
        Self {
            engine,
            clipboard,
            config,
            last_clipboard: Mutex::new(String::new()),
        }
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    /// The most recent clipboard value seen in either direction
    pub async fn last_clipboard(&self) -> String {
        self.last_clipboard.lock().await.clone()
    }

    /// Run until `shutdown` resolves, then stop the engine
    ///
    /// Whatever is on the clipboard at startup is taken as already synced.
    pub async fn run_until(&self, shutdown: impl Future<Output = ()>) -> Result<()> {
        let mut events = self.engine.subscribe();
        self.engine.start().await?;

        let announcer = if self.config.mdns_announce {
            match MdnsAnnouncer::register(self.engine.config()) {
                Ok(announcer) => Some(announcer),
                Err(e) => {
                    warn!("mDNS announcement failed: {}", e);
                    None
                }
            }
        } else {
            None
        };

        match self.clipboard.get_text().await {
            Ok(text) => *self.last_clipboard.lock().await = text,
            Err(e) => warn!("Could not read initial clipboard: {}", e),
        }

        let mut ticker = interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        info!(
            "Companion running with {} clipboard, polling every {:?}",
            self.clipboard.name(),
            self.config.poll_interval()
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_clipboard().await {
                        warn!("Clipboard poll failed: {}", e);
                    }
                }
                event = events.recv() => match event {
                    Ok(event) => {
                        if let Err(e) = self.handle_event(event).await {
                            warn!("Failed to handle sync event: {}", e);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Dropped {} sync events", skipped);
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }

        self.engine.stop().await;
        if let Some(announcer) = announcer {
            if let Err(e) = announcer.shutdown() {
                warn!("Failed to withdraw mDNS announcement: {}", e);
            }
        }

        Ok(())
    }

    /// Read the clipboard once and broadcast it if it changed
    ///
    /// Returns whether a broadcast was attempted.
    pub async fn poll_clipboard(&self) -> Result<bool> {
        let text = self.clipboard.get_text().await?;
        if text.is_empty() {
            return Ok(false);
        }

        {
            let mut last = self.last_clipboard.lock().await;
            if *last == text {
                return Ok(false);
            }
            *last = text.clone();
        }

        info!(
            "Local clipboard changed [{}]: {}",
            describe(&Classification::of(&text)),
            preview(&text, 30)
        );
        self.engine.broadcast_clipboard(&text).await?;
        Ok(true)
    }

    /// React to one engine event
    pub async fn handle_event(&self, event: SyncEvent) -> Result<()> {
        match event {
            SyncEvent::ClipboardReceived { text, from } => {
                {
                    let mut last = self.last_clipboard.lock().await;
                    if *last == text {
                        debug!("Ignoring echo of current clipboard from {}", from);
                        return Ok(());
                    }
                    *last = text.clone();
                }

                info!(
                    "Clipboard from {} [{}]",
                    from,
                    describe(&Classification::of(&text))
                );
                self.clipboard.set_text(&text).await?;
            }
            SyncEvent::PeerDiscovered(peer) => info!("New device: {}", peer),
            SyncEvent::PeerLost(peer) => info!("Device lost: {}", peer),
            SyncEvent::PeerDisconnected(peer) => info!("Device disconnected: {}", peer),
            SyncEvent::Error(message) => warn!("Sync error: {}", message),
        }
        Ok(())
    }
}

fn describe(classification: &Classification) -> String {
    match classification.language {
        Some(language) => format!("{}/{}", classification.content_type, language),
        None => classification.content_type.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{ContentType, Language};
    use crate::clipboard::MemoryClipboard;
    use crate::config::SyncConfig;
    use crate::sync::MemoryNetwork;
    use std::net::{IpAddr, Ipv4Addr};
    use tokio::time::{sleep, Duration};

    fn companion(network: &MemoryNetwork, last: u8, clipboard: &MemoryClipboard) -> Companion {
        let config = SyncConfig {
            device_name: format!("host-{}", last),
            ..SyncConfig::default()
        };
        let transport = network.transport(Ipv4Addr::new(10, 0, 0, last));
        let engine = Arc::new(SyncEngine::new(config, Arc::new(transport)));
        let companion_config = CompanionConfig {
            mdns_announce: false,
            ..CompanionConfig::default()
        };
        Companion::new(engine, Arc::new(clipboard.clone()), companion_config)
    }

    #[test]
    fn test_describe() {
        let code = Classification {
            content_type: ContentType::Code,
            language: Some(Language::Go),
        };
        assert_eq!(describe(&code), "code/go");
        assert_eq!(describe(&Classification::of("hello")), "text");
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_broadcasts_only_changes() {
        let network = MemoryNetwork::new();
        let clipboard = MemoryClipboard::new();
        let companion = companion(&network, 1, &clipboard);
        companion.engine().start().await.unwrap();

        // Empty clipboard is never sent
        assert!(!companion.poll_clipboard().await.unwrap());

        clipboard.set_text("first").await.unwrap();
        assert!(companion.poll_clipboard().await.unwrap());
        assert!(!companion.poll_clipboard().await.unwrap());
        assert_eq!(companion.last_clipboard().await, "first");
    }

    #[tokio::test(start_paused = true)]
    async fn test_received_clip_is_written_once() {
        let network = MemoryNetwork::new();
        let clipboard = MemoryClipboard::new();
        let companion = companion(&network, 1, &clipboard);
        let from = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));

        let event = SyncEvent::ClipboardReceived {
            text: "from phone".into(),
            from,
        };
        companion.handle_event(event.clone()).await.unwrap();
        assert_eq!(clipboard.snapshot(), "from phone");

        // A local edit in between, then the same clip echoes back
        clipboard.set_text("edited locally").await.unwrap();
        companion.handle_event(event).await.unwrap();
        assert_eq!(clipboard.snapshot(), "edited locally");
    }

    #[tokio::test(start_paused = true)]
    async fn test_received_clip_is_not_rebroadcast() {
        let network = MemoryNetwork::new();
        let clipboard = MemoryClipboard::new();
        let companion = companion(&network, 1, &clipboard);
        companion.engine().start().await.unwrap();

        companion
            .handle_event(SyncEvent::ClipboardReceived {
                text: "shared".into(),
                from: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
            })
            .await
            .unwrap();

        assert!(!companion.poll_clipboard().await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_companions_sync() {
        let network = MemoryNetwork::new();
        let clipboard_a = MemoryClipboard::with_text("already here");
        let clipboard_b = MemoryClipboard::new();
        let a = Arc::new(companion(&network, 1, &clipboard_a));
        let b = Arc::new(companion(&network, 2, &clipboard_b));

        let (stop_tx, stop_rx) = tokio::sync::watch::channel(false);
        let run = |companion: Arc<Companion>| {
            let mut stop = stop_rx.clone();
            tokio::spawn(async move {
                companion
                    .run_until(async move {
                        let _ = stop.changed().await;
                    })
                    .await
            })
        };
        let task_a = run(a.clone());
        let task_b = run(b.clone());

        sleep(Duration::from_secs(1)).await;
        // Startup contents are not pushed
        assert_eq!(clipboard_b.snapshot(), "");

        clipboard_a.set_text("let x = 1;").await.unwrap();
        sleep(Duration::from_secs(1)).await;
        assert_eq!(clipboard_b.snapshot(), "let x = 1;");

        clipboard_b.set_text("reply").await.unwrap();
        sleep(Duration::from_secs(1)).await;
        assert_eq!(clipboard_a.snapshot(), "reply");

        stop_tx.send(true).unwrap();
        task_a.await.unwrap().unwrap();
        task_b.await.unwrap().unwrap();
        assert!(!a.engine().is_running().await);
    }
}
