//! Peer table keyed by network address

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use tokio::time::{Duration, Instant};

/// A device discovered on the local network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    /// Identity key; one entry per address
    pub address: IpAddr,
    /// Platform label reported by the peer (e.g. "Android", "Linux")
    pub platform: String,
    /// Human-readable name reported by the peer
    pub display_name: String,
    /// Most recent message received from this address
    pub last_seen: Instant,
    /// Wall-clock time of the first DEVICE response, for display
    pub discovered_at: DateTime<Utc>,
}

impl Peer {
    /// Time since the last message from this peer
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_seen)
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) - {}", self.display_name, self.platform, self.address)
    }
}

/// Outcome of recording a DEVICE response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Upsert {
    Inserted(Peer),
    Updated(Peer),
}

/// Known peers, at most one per address
#[derive(Debug, Default)]
pub struct PeerTable {
    peers: HashMap<IpAddr, Peer>,
}

impl PeerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a peer or refresh an existing one in place
    pub fn upsert(
        &mut self,
        address: IpAddr,
        platform: &str,
        display_name: &str,
        now: Instant,
    ) -> Upsert {
        if let Some(existing) = self.peers.get_mut(&address) {
            existing.platform = platform.to_string();
            existing.display_name = display_name.to_string();
            existing.last_seen = now;
            return Upsert::Updated(existing.clone());
        }

        let peer = Peer {
            address,
            platform: platform.to_string(),
            display_name: display_name.to_string(),
            last_seen: now,
            discovered_at: Utc::now(),
        };
        self.peers.insert(address, peer.clone());
        Upsert::Inserted(peer)
    }

    /// Refresh `last_seen` of a known peer; unknown addresses are ignored
    pub fn touch(&mut self, address: IpAddr, now: Instant) -> bool {
        match self.peers.get_mut(&address) {
            Some(peer) => {
                peer.last_seen = now;
                true
            }
            None => false,
        }
    }

    /// Remove and return every peer idle for strictly longer than `timeout`
    pub fn evict_stale(&mut self, now: Instant, timeout: Duration) -> Vec<Peer> {
        let stale: Vec<IpAddr> = self
            .peers
            .values()
            .filter(|peer| peer.idle_for(now) > timeout)
            .map(|peer| peer.address)
            .collect();

        let mut evicted: Vec<Peer> = stale
            .into_iter()
            .filter_map(|address| self.peers.remove(&address))
            .collect();
        evicted.sort_by_key(|peer| peer.address);
        evicted
    }

    pub fn get(&self, address: &IpAddr) -> Option<&Peer> {
        self.peers.get(address)
    }

    /// Snapshot of all peers, ordered by address
    pub fn peers(&self) -> Vec<Peer> {
        let mut peers: Vec<Peer> = self.peers.values().cloned().collect();
        peers.sort_by_key(|peer| peer.address);
        peers
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn clear(&mut self) {
        self.peers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn addr(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(192, 168, 1, last))
    }

    #[test]
    fn test_upsert_inserts_then_updates() {
        let mut table = PeerTable::new();
        let now = Instant::now();

        let first = table.upsert(addr(10), "Android", "Pixel", now);
        assert!(matches!(first, Upsert::Inserted(_)));

        let later = now + Duration::from_secs(5);
        match table.upsert(addr(10), "Android", "Pixel 8", later) {
            Upsert::Updated(peer) => {
                assert_eq!(peer.display_name, "Pixel 8");
                assert_eq!(peer.last_seen, later);
            }
            other => panic!("expected update, got {:?}", other),
        }

        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_touch_only_known_peers() {
        let mut table = PeerTable::new();
        let now = Instant::now();
        table.upsert(addr(10), "Linux", "desk", now);

        let later = now + Duration::from_secs(30);
        assert!(table.touch(addr(10), later));
        assert!(!table.touch(addr(11), later));
        assert_eq!(table.get(&addr(10)).unwrap().last_seen, later);
        assert!(table.get(&addr(11)).is_none());
    }

    #[test]
    fn test_evict_stale_is_strict() {
        let mut table = PeerTable::new();
        let start = Instant::now();
        let timeout = Duration::from_secs(120);

        table.upsert(addr(10), "Linux", "old", start);
        table.upsert(addr(11), "Linux", "fresh", start + Duration::from_secs(60));

        // Exactly at the timeout nothing is evicted
        assert!(table.evict_stale(start + timeout, timeout).is_empty());

        let evicted = table.evict_stale(start + timeout + Duration::from_secs(1), timeout);
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].display_name, "old");
        assert_eq!(table.len(), 1);
        assert!(table.get(&addr(11)).is_some());
    }

    #[test]
    fn test_peers_sorted_and_clear() {
        let mut table = PeerTable::new();
        let now = Instant::now();
        table.upsert(addr(30), "Linux", "c", now);
        table.upsert(addr(10), "Linux", "a", now);
        table.upsert(addr(20), "Linux", "b", now);

        let names: Vec<_> = table.peers().into_iter().map(|p| p.display_name).collect();
        assert_eq!(names, vec!["a", "b", "c"]);

        table.clear();
        assert!(table.is_empty());
    }
}
