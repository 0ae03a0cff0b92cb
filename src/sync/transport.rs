//! Datagram transport abstraction
//!
//! The sync engine only needs to bind a port, send a datagram to an address
//! (unicast or broadcast) and receive datagrams. [`UdpTransport`] does this
//! over real UDP; [`MemoryNetwork`] is an in-process network with the same
//! delivery semantics, used to run several engines side by side in tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

/// A bound datagram socket
#[async_trait]
pub trait DatagramSocket: Send + Sync {
    /// Send one datagram; a broadcast target reaches every listener on that port
    async fn send_to(&self, payload: &[u8], target: SocketAddr) -> io::Result<usize>;

    /// Wait for the next datagram, truncated to `buf`
    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;

    /// Whether `ip` belongs to this host, so its own broadcasts can be skipped
    fn is_own_address(&self, ip: IpAddr) -> bool;
}

/// Something that can bind datagram sockets
#[async_trait]
pub trait Transport: Send + Sync {
    async fn bind(&self, port: u16) -> io::Result<Arc<dyn DatagramSocket>>;
}

/// Real UDP with broadcast enabled, bound on all IPv4 interfaces
#[derive(Debug, Default, Clone, Copy)]
pub struct UdpTransport;

type AddressSource = Box<dyn Fn() -> Vec<IpAddr> + Send + Sync>;

/// This host's interface addresses, re-listed whenever a lookup misses
///
/// Addresses gained after bind are picked up on the first datagram from them.
struct OwnAddresses {
    source: AddressSource,
    known: Mutex<HashSet<IpAddr>>,
}

impl OwnAddresses {
    fn new(source: AddressSource) -> Self {
        let known = source().into_iter().collect();
        Self {
            source,
            known: Mutex::new(known),
        }
    }

    fn contains(&self, ip: IpAddr) -> bool {
        let mut known = self.known.lock().unwrap_or_else(|e| e.into_inner());
        if known.contains(&ip) {
            return true;
        }

        *known = (self.source)().into_iter().collect();
        known.contains(&ip)
    }
}

fn interface_addresses() -> Vec<IpAddr> {
    match if_addrs::get_if_addrs() {
        Ok(ifaces) => ifaces.iter().map(|iface| iface.ip()).collect(),
        Err(e) => {
            tracing::warn!("Could not list local interfaces: {}", e);
            Vec::new()
        }
    }
}

struct UdpDatagramSocket {
    socket: UdpSocket,
    own_addresses: OwnAddresses,
}

impl UdpDatagramSocket {
    async fn bind(port: u16) -> io::Result<Self> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port)).await?;
        socket.set_broadcast(true)?;

        Ok(Self {
            socket,
            own_addresses: OwnAddresses::new(Box::new(interface_addresses)),
        })
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn bind(&self, port: u16) -> io::Result<Arc<dyn DatagramSocket>> {
        Ok(Arc::new(UdpDatagramSocket::bind(port).await?))
    }
}

#[async_trait]
impl DatagramSocket for UdpDatagramSocket {
    async fn send_to(&self, payload: &[u8], target: SocketAddr) -> io::Result<usize> {
        self.socket.send_to(payload, target).await
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.socket.recv_from(buf).await
    }

    fn is_own_address(&self, ip: IpAddr) -> bool {
        self.own_addresses.contains(ip)
    }
}

type Datagram = (Vec<u8>, SocketAddr);

#[derive(Default)]
struct NetworkState {
    endpoints: HashMap<SocketAddr, mpsc::UnboundedSender<Datagram>>,
    unreachable: HashSet<IpAddr>,
    aliases: HashMap<IpAddr, IpAddr>,
}

/// In-process datagram network
///
/// Hosts are identified by IPv4 address. Delivery is immediate and
/// lossless; datagrams to an address nobody has bound are dropped, as UDP
/// would. Sending to `255.255.255.255` reaches every socket bound on the
/// target port, including the sender's own.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    state: Arc<Mutex<NetworkState>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport for the host at `ip`
    pub fn transport(&self, ip: Ipv4Addr) -> MemoryTransport {
        MemoryTransport {
            network: self.clone(),
            ip,
        }
    }

    /// Make sends to `ip` fail with `ConnectionRefused` until restored
    pub fn set_unreachable(&self, ip: Ipv4Addr, unreachable: bool) {
        let mut state = self.lock();
        if unreachable {
            state.unreachable.insert(IpAddr::V4(ip));
        } else {
            state.unreachable.remove(&IpAddr::V4(ip));
        }
    }

    /// Give `host` a further address, as when an interface comes up after bind
    ///
    /// Sockets bound on `host` report `extra` as their own from then on.
    pub fn add_address(&self, host: Ipv4Addr, extra: Ipv4Addr) {
        self.lock()
            .aliases
            .insert(IpAddr::V4(extra), IpAddr::V4(host));
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, NetworkState> {
        // A poisoned lock only means a test panicked mid-send
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn deliver(&self, from: SocketAddr, payload: &[u8], target: SocketAddr) -> io::Result<usize> {
        let state = self.lock();

        if state.unreachable.contains(&target.ip()) {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("{} is unreachable", target.ip()),
            ));
        }

        let is_broadcast = matches!(target.ip(), IpAddr::V4(ip) if ip.is_broadcast());
        for (addr, sender) in &state.endpoints {
            let matches = if is_broadcast {
                addr.port() == target.port()
            } else {
                *addr == target
            };
            if matches {
                let _ = sender.send((payload.to_vec(), from));
            }
        }

        Ok(payload.len())
    }
}

/// Binds sockets on one host of a [`MemoryNetwork`]
#[derive(Clone)]
pub struct MemoryTransport {
    network: MemoryNetwork,
    ip: Ipv4Addr,
}

/// Socket handed out by [`MemoryTransport`]; unbinds on drop
pub struct MemorySocket {
    network: MemoryNetwork,
    local: SocketAddr,
    inbox: tokio::sync::Mutex<mpsc::UnboundedReceiver<Datagram>>,
}

impl MemorySocket {
    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }
}

impl MemoryTransport {
    pub fn ip(&self) -> Ipv4Addr {
        self.ip
    }

    /// Bind and return the concrete socket type
    pub fn bind_socket(&self, port: u16) -> io::Result<Arc<MemorySocket>> {
        let local = SocketAddr::new(IpAddr::V4(self.ip), port);
        let mut state = self.network.lock();

        if state.endpoints.contains_key(&local) {
            return Err(io::Error::new(
                io::ErrorKind::AddrInUse,
                format!("{} is already bound", local),
            ));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        state.endpoints.insert(local, tx);

        Ok(Arc::new(MemorySocket {
            network: self.network.clone(),
            local,
            inbox: tokio::sync::Mutex::new(rx),
        }))
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn bind(&self, port: u16) -> io::Result<Arc<dyn DatagramSocket>> {
        let socket: Arc<dyn DatagramSocket> = self.bind_socket(port)?;
        Ok(socket)
    }
}

#[async_trait]
impl DatagramSocket for MemorySocket {
    async fn send_to(&self, payload: &[u8], target: SocketAddr) -> io::Result<usize> {
        self.network.deliver(self.local, payload, target)
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        let (payload, from) = self
            .inbox
            .lock()
            .await
            .recv()
            .await
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "socket closed"))?;

        let len = payload.len().min(buf.len());
        buf[..len].copy_from_slice(&payload[..len]);
        Ok((len, from))
    }

    fn is_own_address(&self, ip: IpAddr) -> bool {
        ip == self.local.ip() || self.network.lock().aliases.get(&ip) == Some(&self.local.ip())
    }
}

impl Drop for MemorySocket {
    fn drop(&mut self) {
        self.network.lock().endpoints.remove(&self.local);
    }
}
