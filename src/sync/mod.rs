//! LAN clipboard sync engine
//!
//! [`SyncEngine`] owns one datagram socket and runs two background tasks
//! while started: a receive loop that handles inbound datagrams one at a
//! time, and a heartbeat ticker that evicts stale peers and broadcasts
//! `NEXUSCLIP_HEARTBEAT`. Both tasks and every public operation serialize on
//! a single mutex around the peer table and connection state.
//!
//! Inbound events are published on a broadcast channel, see
//! [`SyncEngine::subscribe`].

pub mod peers;
pub mod protocol;
pub mod transport;

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex as StdMutex};

use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::{interval, sleep, Duration, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

pub use peers::{Peer, PeerTable, Upsert};
pub use protocol::{AckKind, Message, DEFAULT_SYNC_PORT};
pub use transport::{
    DatagramSocket, MemoryNetwork, MemorySocket, MemoryTransport, Transport, UdpTransport,
};

use crate::config::SyncConfig;
use protocol::{MAX_DATAGRAM_SIZE, RECV_BUFFER_SIZE};

const EVENT_CHANNEL_CAPACITY: usize = 100;
const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Sync engine errors
#[derive(Debug, Error)]
pub enum SyncError {
    /// The UDP port could not be bound; the engine stays stopped
    #[error("Failed to bind UDP port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },

    /// A datagram could not be sent on a live socket
    #[error("Failed to send to {target}: {source}")]
    Send {
        target: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("Sync engine is not running")]
    NotRunning,

    #[error("No device is connected")]
    NotConnected,

    #[error("Clipboard frame of {size} bytes exceeds the {max} byte datagram limit")]
    PayloadTooLarge { size: usize, max: usize },
}

/// Events published by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// A CLIP message was decoded and acknowledged
    ClipboardReceived { text: String, from: IpAddr },
    /// First DEVICE response from a new address
    PeerDiscovered(Peer),
    /// A peer was evicted for staleness
    PeerLost(Peer),
    /// The connected peer went away, by `disconnect()` or eviction
    PeerDisconnected(Peer),
    /// Transport failure on a live socket
    Error(String),
}

/// UDP discovery, heartbeat and clipboard relay
pub struct SyncEngine {
    config: Arc<SyncConfig>,
    transport: Arc<dyn Transport>,
    shared: Arc<Shared>,
    /// Held outside the state mutex so drop can always reach the tasks
    abort_handles: StdMutex<Vec<AbortHandle>>,
}

struct Shared {
    state: Mutex<EngineState>,
    events: broadcast::Sender<SyncEvent>,
}

#[derive(Default)]
struct EngineState {
    session: Option<Session>,
    peers: PeerTable,
    connected: Option<Peer>,
    /// Bumped on every start so tasks of an old session can tell they are stale
    generation: u64,
}

/// Everything that exists only while the engine is running
struct Session {
    socket: Arc<dyn DatagramSocket>,
    generation: u64,
    tasks: Vec<JoinHandle<()>>,
}

impl EngineState {
    fn socket(&self) -> Option<Arc<dyn DatagramSocket>> {
        self.session.as_ref().map(|s| s.socket.clone())
    }

    fn is_current(&self, generation: u64) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.generation == generation)
    }

    fn is_connected_to(&self, address: IpAddr) -> bool {
        self.connected
            .as_ref()
            .is_some_and(|peer| peer.address == address)
    }
}

impl Shared {
    fn publish(&self, event: SyncEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

impl SyncEngine {
    /// Create a stopped engine on top of `transport`
    pub fn new(config: SyncConfig, transport: Arc<dyn Transport>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            config: Arc::new(config),
            transport,
            shared: Arc::new(Shared {
                state: Mutex::new(EngineState::default()),
                events,
            }),
            abort_handles: StdMutex::new(Vec::new()),
        }
    }

    /// Create a stopped engine on real UDP
    pub fn with_udp(config: SyncConfig) -> Self {
        Self::new(config, Arc::new(UdpTransport))
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Subscribe to engine events
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.shared.events.subscribe()
    }

    pub async fn is_running(&self) -> bool {
        self.shared.state.lock().await.session.is_some()
    }

    /// Bind the socket, start the background tasks and send one DISCOVER
    ///
    /// Does nothing if already running. A bind failure is published as
    /// [`SyncEvent::Error`], returned, and leaves the engine stopped.
    pub async fn start(&self) -> Result<(), SyncError> {
        let mut state = self.shared.state.lock().await;
        if state.session.is_some() {
            debug!("Sync engine already running");
            return Ok(());
        }

        let port = self.config.port;
        let socket = match self.transport.bind(port).await {
            Ok(socket) => socket,
            Err(source) => {
                error!("Failed to bind UDP port {}: {}", port, source);
                let err = SyncError::Bind { port, source };
                self.shared.publish(SyncEvent::Error(err.to_string()));
                return Err(err);
            }
        };

        state.generation += 1;
        let generation = state.generation;
        state.peers.clear();
        state.connected = None;

        let receiver = tokio::spawn(receive_loop(
            self.shared.clone(),
            self.config.clone(),
            socket.clone(),
            generation,
        ));
        let heartbeat = tokio::spawn(heartbeat_loop(
            self.shared.clone(),
            self.config.clone(),
            socket.clone(),
            generation,
        ));

        *self.abort_handles() = vec![receiver.abort_handle(), heartbeat.abort_handle()];
        state.session = Some(Session {
            socket: socket.clone(),
            generation,
            tasks: vec![receiver, heartbeat],
        });
        info!(
            "Sync engine listening on UDP port {} as {} ({})",
            port, self.config.device_name, self.config.platform
        );

        // Replies arrive through the receive loop
        let _ = send_or_report(
            &self.shared,
            socket.as_ref(),
            &Message::Discover,
            self.broadcast_target(),
        )
        .await;

        Ok(())
    }

    /// Cancel the background tasks, close the socket and forget all peers
    pub async fn stop(&self) {
        let mut state = self.shared.state.lock().await;
        let Some(session) = state.session.take() else {
            return;
        };

        state.peers.clear();
        state.connected = None;
        self.abort_handles().clear();

        for task in &session.tasks {
            task.abort();
        }
        // Wait for the tasks to drop their socket handles so the port is free again
        for task in session.tasks {
            let _ = task.await;
        }

        info!("Sync engine stopped");
    }

    /// Reset the peer table, broadcast DISCOVER and collect replies
    ///
    /// Waits for the configured discovery window without holding the state
    /// lock, so the receive loop keeps recording DEVICE responses. Returns
    /// an empty list if the engine is not running, or stops meanwhile.
    pub async fn discover_devices(&self) -> Vec<Peer> {
        let generation = {
            let mut state = self.shared.state.lock().await;
            let Some(socket) = state.socket() else {
                debug!("Discovery requested while stopped");
                return Vec::new();
            };

            state.peers.clear();
            info!("Discovering devices");
            let _ = send_or_report(
                &self.shared,
                socket.as_ref(),
                &Message::Discover,
                self.broadcast_target(),
            )
            .await;
            state.generation
        };

        sleep(self.config.discovery_window()).await;

        let state = self.shared.state.lock().await;
        if !state.is_current(generation) {
            return Vec::new();
        }
        let peers = state.peers.peers();
        info!("Discovery finished with {} device(s)", peers.len());
        peers
    }

    /// Make `peer` the unicast target and tell it with `ACK:CONNECTED`
    ///
    /// Replaces any existing connection without notifying the old peer.
    /// The connection is recorded even if the ACK cannot be sent.
    pub async fn connect_to_device(&self, peer: &Peer) -> Result<(), SyncError> {
        let mut state = self.shared.state.lock().await;
        let socket = state.socket().ok_or(SyncError::NotRunning)?;

        if let Some(previous) = state.connected.replace(peer.clone()) {
            if previous.address != peer.address {
                info!("Switching connection from {} to {}", previous, peer);
            }
        }
        info!("Connected to {}", peer);

        send_or_report(
            &self.shared,
            socket.as_ref(),
            &Message::Ack(AckKind::Connected),
            self.peer_target(peer.address),
        )
        .await
    }

    /// Send `ACK:DISCONNECTED` to the connected peer and forget it
    pub async fn disconnect(&self) {
        let mut state = self.shared.state.lock().await;
        let Some(peer) = state.connected.take() else {
            return;
        };

        if let Some(socket) = state.socket() {
            let _ = send_or_report(
                &self.shared,
                socket.as_ref(),
                &Message::Ack(AckKind::Disconnected),
                self.peer_target(peer.address),
            )
            .await;
        }

        info!("Disconnected from {}", peer);
        self.shared.publish(SyncEvent::PeerDisconnected(peer));
    }

    /// Unicast clipboard text to the connected peer
    pub async fn send_clipboard(&self, text: &str) -> Result<(), SyncError> {
        let state = self.shared.state.lock().await;
        let socket = state.socket().ok_or(SyncError::NotRunning)?;
        let peer = state.connected.as_ref().ok_or(SyncError::NotConnected)?;

        send_or_report(
            &self.shared,
            socket.as_ref(),
            &Message::Clip(text.to_string()),
            self.peer_target(peer.address),
        )
        .await?;

        debug!("Sent clipboard to {}: {}", peer, preview(text, 30));
        Ok(())
    }

    /// Broadcast clipboard text to every device on the network
    ///
    /// Only needs the engine to be running. While stopped this returns
    /// [`SyncError::NotRunning`] without publishing anything.
    pub async fn broadcast_clipboard(&self, text: &str) -> Result<(), SyncError> {
        let state = self.shared.state.lock().await;
        let Some(socket) = state.socket() else {
            debug!("Broadcast requested while stopped");
            return Err(SyncError::NotRunning);
        };

        send_or_report(
            &self.shared,
            socket.as_ref(),
            &Message::Clip(text.to_string()),
            self.broadcast_target(),
        )
        .await?;

        info!("Broadcast clipboard: {}", preview(text, 30));
        Ok(())
    }

    /// Snapshot of the peer table, ordered by address
    pub async fn peers(&self) -> Vec<Peer> {
        self.shared.state.lock().await.peers.peers()
    }

    /// The connected peer, refreshed from the peer table when present
    pub async fn connected_peer(&self) -> Option<Peer> {
        let state = self.shared.state.lock().await;
        let connected = state.connected.as_ref()?;
        state
            .peers
            .get(&connected.address)
            .cloned()
            .or_else(|| Some(connected.clone()))
    }

    fn broadcast_target(&self) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(self.config.broadcast_address), self.config.port)
    }

    fn peer_target(&self, address: IpAddr) -> SocketAddr {
        SocketAddr::new(address, self.config.port)
    }

    fn abort_handles(&self) -> std::sync::MutexGuard<'_, Vec<AbortHandle>> {
        self.abort_handles.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        for handle in self.abort_handles().drain(..) {
            handle.abort();
        }
    }
}

/// First non-loopback IPv4 address of this host, for display
pub fn local_address() -> Option<Ipv4Addr> {
    if_addrs::get_if_addrs()
        .ok()?
        .into_iter()
        .filter(|iface| !iface.is_loopback())
        .find_map(|iface| match iface.ip() {
            IpAddr::V4(ip) => Some(ip),
            IpAddr::V6(_) => None,
        })
}

/// Shorten clipboard text for log lines
pub(crate) fn preview(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

/// Frame and send one message; transport failures are also published
async fn send_or_report(
    shared: &Shared,
    socket: &dyn DatagramSocket,
    message: &Message,
    target: SocketAddr,
) -> Result<(), SyncError> {
    let frame = message.encode();
    if frame.len() > MAX_DATAGRAM_SIZE {
        return Err(SyncError::PayloadTooLarge {
            size: frame.len(),
            max: MAX_DATAGRAM_SIZE,
        });
    }

    if let Err(source) = socket.send_to(frame.as_bytes(), target).await {
        warn!("Failed to send to {}: {}", target, source);
        let err = SyncError::Send { target, source };
        shared.publish(SyncEvent::Error(err.to_string()));
        return Err(err);
    }

    Ok(())
}

async fn receive_loop(
    shared: Arc<Shared>,
    config: Arc<SyncConfig>,
    socket: Arc<dyn DatagramSocket>,
    generation: u64,
) {
    let mut buf = vec![0u8; RECV_BUFFER_SIZE];

    loop {
        let (len, from) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) if e.kind() == io::ErrorKind::NotConnected => {
                debug!("Socket closed, receive loop exiting");
                break;
            }
            Err(e) => {
                warn!("Receive error: {}", e);
                sleep(RECV_ERROR_BACKOFF).await;
                continue;
            }
        };

        // Our own broadcasts come straight back
        if socket.is_own_address(from.ip()) {
            continue;
        }

        let Some(message) = Message::decode(&buf[..len]) else {
            debug!("Dropping unrecognised datagram ({} bytes) from {}", len, from);
            continue;
        };

        handle_message(&shared, &config, socket.as_ref(), generation, message, from.ip()).await;
    }
}

async fn handle_message(
    shared: &Shared,
    config: &SyncConfig,
    socket: &dyn DatagramSocket,
    generation: u64,
    message: Message,
    sender: IpAddr,
) {
    let mut state = shared.state.lock().await;
    if !state.is_current(generation) {
        return;
    }

    let now = Instant::now();
    let reply_to = SocketAddr::new(sender, config.port);

    match message {
        Message::Discover => {
            state.peers.touch(sender, now);
            debug!("Discovery request from {}", sender);
            let reply = Message::Device {
                platform: config.platform.clone(),
                name: config.device_name.clone(),
            };
            let _ = send_or_report(shared, socket, &reply, reply_to).await;
        }
        Message::Device { platform, name } => {
            match state.peers.upsert(sender, &platform, &name, now) {
                Upsert::Inserted(peer) => {
                    info!("Device discovered: {}", peer);
                    shared.publish(SyncEvent::PeerDiscovered(peer));
                }
                Upsert::Updated(peer) => debug!("Device refreshed: {}", peer),
            }
        }
        Message::Clip(text) => {
            state.peers.touch(sender, now);
            let ack = Message::Ack(AckKind::Received);
            let _ = send_or_report(shared, socket, &ack, reply_to).await;

            info!("Received clipboard from {}: {}", sender, preview(&text, 50));
            shared.publish(SyncEvent::ClipboardReceived { text, from: sender });
        }
        Message::Ack(kind) => {
            state.peers.touch(sender, now);
            debug!("ACK {} from {}", kind, sender);
        }
        Message::Heartbeat => {
            if state.peers.touch(sender, now) {
                debug!("Heartbeat from {}", sender);
            }
        }
    }
}

async fn heartbeat_loop(
    shared: Arc<Shared>,
    config: Arc<SyncConfig>,
    socket: Arc<dyn DatagramSocket>,
    generation: u64,
) {
    let mut ticker = interval(config.heartbeat_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let target = SocketAddr::new(IpAddr::V4(config.broadcast_address), config.port);

    loop {
        ticker.tick().await;

        let mut state = shared.state.lock().await;
        if !state.is_current(generation) {
            break;
        }

        evict_stale_peers(&shared, &mut state, config.stale_timeout());
        let _ = send_or_report(&shared, socket.as_ref(), &Message::Heartbeat, target).await;
    }
}

fn evict_stale_peers(shared: &Shared, state: &mut EngineState, timeout: Duration) {
    for peer in state.peers.evict_stale(Instant::now(), timeout) {
        info!("Device went stale: {}", peer);

        if state.is_connected_to(peer.address) {
            state.connected = None;
            shared.publish(SyncEvent::PeerDisconnected(peer.clone()));
        }
        shared.publish(SyncEvent::PeerLost(peer));
    }
}
