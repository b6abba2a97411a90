//! # Tracker Registry
//!
//! Process-wide table of peer address → last contact. Knows nothing about
//! which blocks a peer owns.

use blockswarm_core::types::PeerAddress;
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Result of one announce
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Announcement {
    /// Random sample of other live peers
    pub peers: Vec<PeerAddress>,
    /// False when the announce only refreshed an existing entry
    pub newly_registered: bool,
}

/// Peer registry with liveness expiry
pub struct TrackerRegistry {
    /// Last contact per peer
    peers: Mutex<HashMap<PeerAddress, Instant>>,

    /// Entries older than this are purged by `sweep`
    timeout: Duration,

    /// Upper bound on peers returned per announce
    sample_size: usize,
}

impl TrackerRegistry {
    pub fn new(timeout: Duration, sample_size: usize) -> Self {
        Self {
            peers: Mutex::new(HashMap::new()),
            timeout,
            sample_size,
        }
    }

    /// Register or refresh `peer` and sample other peers for it
    pub fn announce(&self, peer: PeerAddress) -> Announcement {
        self.announce_at(peer, Instant::now(), &mut rand::thread_rng())
    }

    /// `announce` with an explicit clock and random source
    pub fn announce_at<R: Rng + ?Sized>(&self, peer: PeerAddress, now: Instant, rng: &mut R) -> Announcement {
        let (newly_registered, others) = {
            let mut peers = self.peers.lock();
            let newly_registered = peers.insert(peer, now).is_none();
            let others: Vec<PeerAddress> = peers.keys().filter(|&&p| p != peer).copied().collect();
            (newly_registered, others)
        };

        let count = self.sample_size.min(others.len());
        let peers = others.choose_multiple(rng, count).copied().collect();

        Announcement {
            peers,
            newly_registered,
        }
    }

    /// Purge entries not seen for longer than the timeout
    pub fn sweep(&self) -> Vec<PeerAddress> {
        self.sweep_at(Instant::now())
    }

    /// `sweep` with an explicit clock; returns the purged peers in address order
    pub fn sweep_at(&self, now: Instant) -> Vec<PeerAddress> {
        let mut removed = Vec::new();
        self.peers.lock().retain(|peer, last_seen| {
            let alive = now.saturating_duration_since(*last_seen) <= self.timeout;
            if !alive {
                removed.push(*peer);
            }
            alive
        });
        removed.sort();
        removed
    }

    pub fn contains(&self, peer: &PeerAddress) -> bool {
        self.peers.lock().contains_key(peer)
    }

    pub fn len(&self) -> usize {
        self.peers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
