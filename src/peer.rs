// Numan Thabit 2026
// peer.rs - peer records and the per-swarm peer pool

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use ahash::AHashSet;

use crate::sched::ConnectionId;

/// 20-byte peer identity learned from the wire.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerId(pub [u8; 20]);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0.iter() {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({self})")
    }
}

/// A candidate peer within one swarm.
///
/// The used-by marker ties the peer to at most one in-flight connection
/// attempt at a time; it is touched only through [`PeerPool`] operations and
/// [`Peer::set_used_by`].
#[derive(Debug)]
pub struct Peer {
    addr: SocketAddr,
    peer_id: Mutex<Option<PeerId>>,
    // 0 = unused; connection ids are minted starting at 1.
    used_by: AtomicU64,
}

impl Peer {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            peer_id: Mutex::new(None),
            used_by: AtomicU64::new(0),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn peer_id(&self) -> Option<PeerId> {
        *self.peer_id.lock().expect("peer id lock")
    }

    /// Records the identity once it is learned from the handshake.
    pub fn set_peer_id(&self, id: PeerId) {
        *self.peer_id.lock().expect("peer id lock") = Some(id);
    }

    pub fn used_by(&self) -> Option<ConnectionId> {
        match self.used_by.load(Ordering::Relaxed) {
            0 => None,
            raw => Some(ConnectionId(raw)),
        }
    }

    pub fn set_used_by(&self, id: ConnectionId) {
        debug_assert!(id.0 != 0, "connection ids start at 1");
        self.used_by.store(id.0, Ordering::Relaxed);
    }

    pub fn is_unused(&self) -> bool {
        self.used_by.load(Ordering::Relaxed) == 0
    }

    fn clear_used_by(&self) {
        self.used_by.store(0, Ordering::Relaxed);
    }
}

/// Pool of candidate peers for one swarm, deduplicated by address.
#[derive(Debug, Default)]
pub struct PeerPool {
    inner: Mutex<PoolInner>,
}

#[derive(Debug, Default)]
struct PoolInner {
    peers: Vec<Arc<Peer>>,
    known_addrs: AHashSet<SocketAddr>,
}

impl PeerPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a peer unless one with the same address is already tracked.
    pub fn add(&self, peer: Arc<Peer>) -> bool {
        let mut inner = self.inner.lock().expect("peer pool lock");
        if !inner.known_addrs.insert(peer.addr()) {
            return false;
        }
        inner.peers.push(peer);
        true
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("peer pool lock").peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when at least one tracked peer is not tied to a connection attempt.
    pub fn has_unused(&self) -> bool {
        let inner = self.inner.lock().expect("peer pool lock");
        inner.peers.iter().any(|peer| peer.is_unused())
    }

    /// Returns an unused peer without marking it; the caller stamps the
    /// used-by marker once it has minted a connection id.
    pub fn acquire_unused(&self) -> Option<Arc<Peer>> {
        let inner = self.inner.lock().expect("peer pool lock");
        inner
            .peers
            .iter()
            .find(|peer| peer.is_unused())
            .map(Arc::clone)
    }

    /// Returns a peer to the pool so a later attempt may pick it up again.
    pub fn return_peer(&self, peer: &Peer) {
        peer.clear_used_by();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        format!("10.0.0.1:{port}").parse().expect("addr")
    }

    #[test]
    fn add_deduplicates_by_address() {
        let pool = PeerPool::new();
        assert!(pool.add(Arc::new(Peer::new(addr(6881)))));
        assert!(!pool.add(Arc::new(Peer::new(addr(6881)))));
        assert!(pool.add(Arc::new(Peer::new(addr(6882)))));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn acquire_skips_used_peers() {
        let pool = PeerPool::new();
        let first = Arc::new(Peer::new(addr(6881)));
        let second = Arc::new(Peer::new(addr(6882)));
        pool.add(Arc::clone(&first));
        pool.add(Arc::clone(&second));

        first.set_used_by(ConnectionId(1));
        let acquired = pool.acquire_unused().expect("unused peer");
        assert_eq!(acquired.addr(), second.addr());

        second.set_used_by(ConnectionId(2));
        assert!(!pool.has_unused());
        assert!(pool.acquire_unused().is_none());
    }

    #[test]
    fn returned_peer_becomes_available_again() {
        let pool = PeerPool::new();
        let peer = Arc::new(Peer::new(addr(6881)));
        pool.add(Arc::clone(&peer));
        peer.set_used_by(ConnectionId(7));
        assert!(!pool.has_unused());

        pool.return_peer(&peer);
        assert!(pool.has_unused());
        assert!(peer.used_by().is_none());
    }
}
