// Numan Thabit 2026
// swarm.rs - per-swarm runtime counters and the owning download unit

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// 20-byte content identifier binding a swarm to its metadata.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct InfoHash(pub [u8; 20]);

impl InfoHash {
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0.iter() {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InfoHash({self})")
    }
}

/// Shared per-swarm state mutated by many concurrent connection attempts.
///
/// All mutation happens on the single scheduler worker; the atomics only make
/// the handle safe to share with a driver task.
#[derive(Debug)]
pub struct SwarmRuntime {
    connections: AtomicU32,
    halted: AtomicBool,
    min_peers: u32,
}

impl SwarmRuntime {
    pub fn new(min_peers: u32) -> Self {
        Self {
            connections: AtomicU32::new(0),
            halted: AtomicBool::new(false),
            min_peers,
        }
    }

    /// Claims one active-connection slot, returning the new count.
    pub fn acquire_connection(&self) -> u32 {
        self.connections.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Releases one active-connection slot, returning the new count.
    pub fn release_connection(&self) -> u32 {
        let prev = self.connections.fetch_sub(1, Ordering::Relaxed);
        debug_assert!(prev > 0, "connection counter underflow");
        prev.saturating_sub(1)
    }

    pub fn connection_count(&self) -> u32 {
        self.connections.load(Ordering::Relaxed)
    }

    /// True while the swarm still wants more connections than it has.
    pub fn below_min_peers(&self) -> bool {
        self.connection_count() < self.min_peers
    }

    pub fn min_peers(&self) -> u32 {
        self.min_peers
    }

    /// Raises the swarm-wide halt flag; every in-flight attempt observes it
    /// before its next step.
    pub fn request_halt(&self) {
        self.halted.store(true, Ordering::Relaxed);
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Relaxed)
    }
}

/// The owning download unit a connection attempt works on behalf of.
#[derive(Debug)]
pub struct Download {
    info_hash: InfoHash,
    active_commands: AtomicU32,
}

impl Download {
    pub fn new(info_hash: InfoHash) -> Self {
        Self {
            info_hash,
            active_commands: AtomicU32::new(0),
        }
    }

    pub fn info_hash(&self) -> &InfoHash {
        &self.info_hash
    }

    /// Counts one more outstanding command against this download.
    pub fn retain_command(&self) -> u32 {
        self.active_commands.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Releases one outstanding command.
    pub fn release_command(&self) -> u32 {
        let prev = self.active_commands.fetch_sub(1, Ordering::Relaxed);
        debug_assert!(prev > 0, "command counter underflow");
        prev.saturating_sub(1)
    }

    pub fn active_commands(&self) -> u32 {
        self.active_commands.load(Ordering::Relaxed)
    }
}
