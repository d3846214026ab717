use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::Arc,
    time::{Duration, Instant},
};

use gramlink_core::{config::LinkConfig, PeerId};
use gramlink_peer::Peer;
use parking_lot::Mutex;

/// A peer behind its own lock, so the I/O thread composing for one peer does not block
/// callers working on another.
pub type SharedPeer = Arc<Mutex<Peer>>;

/// Peers keyed by id, with the address as a secondary index.
///
/// Ids are handed out monotonically from `peer_id_base` and never reused.
#[derive(Debug)]
pub struct PeerTable {
    by_id: HashMap<PeerId, SharedPeer>,
    by_addr: HashMap<SocketAddr, PeerId>,
    next_id: PeerId,
}

impl PeerTable {
    /// Creates an empty table whose first id is `base`.
    pub fn new(base: PeerId) -> Self {
        Self { by_id: HashMap::new(), by_addr: HashMap::new(), next_id: base }
    }

    /// Returns the peer for `address`, creating it if the address is new.
    pub fn get_or_create(&mut self, address: SocketAddr, config: &LinkConfig, now: Instant) -> (PeerId, SharedPeer) {
        if let Some(&id) = self.by_addr.get(&address) {
            if let Some(peer) = self.by_id.get(&id) {
                return (id, Arc::clone(peer));
            }
        }

        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        let peer = Arc::new(Mutex::new(Peer::new(address, id, config, now)));
        self.by_id.insert(id, Arc::clone(&peer));
        self.by_addr.insert(address, id);
        tracing::debug!("Created peer {} for {}", id, address);
        (id, peer)
    }

    /// Looks a peer up by id.
    pub fn get(&self, id: PeerId) -> Option<SharedPeer> {
        self.by_id.get(&id).cloned()
    }

    /// Looks a peer up by address.
    pub fn by_address(&self, address: &SocketAddr) -> Option<SharedPeer> {
        self.by_addr.get(address).and_then(|id| self.get(*id))
    }

    /// Id registered for `address`.
    pub fn id_for(&self, address: &SocketAddr) -> Option<PeerId> {
        self.by_addr.get(address).copied()
    }

    /// Removes a peer and its address entry.
    pub fn remove(&mut self, id: PeerId) -> Option<SharedPeer> {
        let peer = self.by_id.remove(&id)?;
        let address = peer.lock().address();
        self.by_addr.remove(&address);
        Some(peer)
    }

    /// Ids of peers that have been silent for longer than `timeout`.
    pub fn idle(&self, now: Instant, timeout: Duration) -> Vec<PeerId> {
        self.by_id
            .iter()
            .filter(|(_, peer)| peer.lock().is_idle(now, timeout))
            .map(|(id, _)| *id)
            .collect()
    }

    /// Every peer, ordered by id.
    pub fn snapshot(&self) -> Vec<(PeerId, SharedPeer)> {
        let mut peers: Vec<_> = self.by_id.iter().map(|(id, peer)| (*id, Arc::clone(peer))).collect();
        peers.sort_by_key(|(id, _)| *id);
        peers
    }

    /// Registered ids, ascending.
    pub fn ids(&self) -> Vec<PeerId> {
        let mut ids: Vec<_> = self.by_id.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Number of peers.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([192, 168, 1, 20], port))
    }

    #[test]
    fn test_get_or_create_is_idempotent() {
        let config = LinkConfig::default();
        let mut table = PeerTable::new(config.peer_id_base);
        let now = Instant::now();

        let (first, _) = table.get_or_create(addr(1), &config, now);
        let (again, _) = table.get_or_create(addr(1), &config, now);
        let (second, _) = table.get_or_create(addr(2), &config, now);
        assert_eq!(first, 1);
        assert_eq!(again, first);
        assert_eq!(second, 2);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_ids_not_reused_after_removal() {
        let config = LinkConfig::default();
        let mut table = PeerTable::new(100);
        let now = Instant::now();

        let (id, _) = table.get_or_create(addr(1), &config, now);
        assert!(table.remove(id).is_some());
        assert!(table.id_for(&addr(1)).is_none());
        let (next, _) = table.get_or_create(addr(1), &config, now);
        assert_eq!(next, 101);
    }

    #[test]
    fn test_idle_lists_silent_peers() {
        let config = LinkConfig::default();
        let mut table = PeerTable::new(1);
        let start = Instant::now();
        table.get_or_create(addr(1), &config, start);
        let (busy, peer) = table.get_or_create(addr(2), &config, start);
        peer.lock().touch(start + Duration::from_secs(200));

        let idle = table.idle(start + Duration::from_secs(301), config.disconnect_timeout);
        assert_eq!(idle, vec![1]);
        assert_ne!(idle[0], busy);
    }
}
