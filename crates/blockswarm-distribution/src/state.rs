//! # Peer Network State
//!
//! The one mutable aggregate shared by every activity of a peer agent:
//! owned blocks, known peers, the current unchoke decision, and the
//! refusal memory. A single lock covers all four fields; every operation
//! below takes it once and returns owned copies, so no guard ever lives
//! across a network call.

use blockswarm_core::types::{needed_blocks, progress_percent, BlockIndex, BlockSet, PeerAddress};
use parking_lot::Mutex;
use std::collections::BTreeSet;

/// Which peers may currently pull blocks from us
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UnchokeDecision {
    /// Regular unchoke slots
    pub unchoked: BTreeSet<PeerAddress>,
    /// Optimistic slot, disjoint from `unchoked`
    pub optimistic: Option<PeerAddress>,
}

impl UnchokeDecision {
    pub fn new(unchoked: impl IntoIterator<Item = PeerAddress>, optimistic: Option<PeerAddress>) -> Self {
        Self {
            unchoked: unchoked.into_iter().collect(),
            optimistic,
        }
    }

    /// True if `peer` holds a regular or the optimistic slot
    pub fn allows(&self, peer: &PeerAddress) -> bool {
        self.unchoked.contains(peer) || self.optimistic.as_ref() == Some(peer)
    }

    /// Regular slots followed by the optimistic slot
    pub fn sources(&self) -> Vec<PeerAddress> {
        let mut sources: Vec<PeerAddress> = self.unchoked.iter().copied().collect();
        if let Some(optimistic) = self.optimistic {
            if !self.unchoked.contains(&optimistic) {
                sources.push(optimistic);
            }
        }
        sources
    }
}

struct NetworkState {
    owned: BlockSet,
    known_peers: BTreeSet<PeerAddress>,
    decision: UnchokeDecision,
    /// Peers that answered "choked" since the last choke-policy round
    choked_by: BTreeSet<PeerAddress>,
}

/// Lock-protected state of one peer agent
pub struct PeerNetworkState {
    self_addr: PeerAddress,
    total_blocks: u32,
    inner: Mutex<NetworkState>,
}

impl PeerNetworkState {
    /// Seed the state with the blocks held at startup
    ///
    /// Indices outside `[0, total_blocks)` are ignored.
    pub fn new(self_addr: PeerAddress, total_blocks: u32, initial_blocks: impl IntoIterator<Item = BlockIndex>) -> Self {
        let owned = initial_blocks.into_iter().filter(|&b| b < total_blocks).collect();
        Self {
            self_addr,
            total_blocks,
            inner: Mutex::new(NetworkState {
                owned,
                known_peers: BTreeSet::new(),
                decision: UnchokeDecision::default(),
                choked_by: BTreeSet::new(),
            }),
        }
    }

    pub fn self_addr(&self) -> PeerAddress {
        self.self_addr
    }

    pub fn total_blocks(&self) -> u32 {
        self.total_blocks
    }

    // === Owned blocks ===

    pub fn owned_blocks(&self) -> BlockSet {
        self.inner.lock().owned.clone()
    }

    pub fn owns(&self, block: BlockIndex) -> bool {
        self.inner.lock().owned.contains(&block)
    }

    pub fn owned_count(&self) -> usize {
        self.inner.lock().owned.len()
    }

    pub fn is_complete(&self) -> bool {
        self.inner.lock().owned.len() as u64 >= self.total_blocks as u64
    }

    /// Blocks of the file we do not hold yet
    pub fn needed_blocks(&self) -> BlockSet {
        needed_blocks(&self.inner.lock().owned, self.total_blocks)
    }

    pub fn progress_percent(&self) -> u32 {
        progress_percent(self.owned_count(), self.total_blocks)
    }

    /// Mark `block` as owned; returns false if it was already owned or is out of range
    pub fn add_owned_block(&self, block: BlockIndex) -> bool {
        if block >= self.total_blocks {
            return false;
        }
        self.inner.lock().owned.insert(block)
    }

    // === Known peers ===

    pub fn known_peers(&self) -> BTreeSet<PeerAddress> {
        self.inner.lock().known_peers.clone()
    }

    pub fn has_known_peers(&self) -> bool {
        !self.inner.lock().known_peers.is_empty()
    }

    /// Merge peers learned from the tracker; our own address is never stored
    pub fn add_known_peers(&self, peers: impl IntoIterator<Item = PeerAddress>) -> usize {
        let mut inner = self.inner.lock();
        let before = inner.known_peers.len();
        inner
            .known_peers
            .extend(peers.into_iter().filter(|p| *p != self.self_addr));
        inner.known_peers.len() - before
    }

    pub fn remove_known_peer(&self, peer: &PeerAddress) -> bool {
        self.inner.lock().known_peers.remove(peer)
    }

    // === Unchoke decision ===

    pub fn unchoke_decision(&self) -> UnchokeDecision {
        self.inner.lock().decision.clone()
    }

    /// Replace the previous decision wholesale
    pub fn replace_unchoke_decision(&self, decision: UnchokeDecision) {
        self.inner.lock().decision = decision;
    }

    /// Peers we are willing to download from: unchoked ∪ optimistic
    pub fn candidate_sources(&self) -> Vec<PeerAddress> {
        self.inner.lock().decision.sources()
    }

    /// Whether `requester` may receive `block` right now
    ///
    /// The unchoke check and the ownership check observe the same instant.
    pub fn authorize_block(&self, requester: &PeerAddress, block: BlockIndex) -> bool {
        let inner = self.inner.lock();
        inner.decision.allows(requester) && inner.owned.contains(&block)
    }

    // === Refusal memory ===

    pub fn record_refusal(&self, peer: PeerAddress) {
        self.inner.lock().choked_by.insert(peer);
    }

    pub fn refusals(&self) -> BTreeSet<PeerAddress> {
        self.inner.lock().choked_by.clone()
    }

    /// Snapshot and clear the refusal memory in one step
    pub fn take_refusals(&self) -> BTreeSet<PeerAddress> {
        std::mem::take(&mut self.inner.lock().choked_by)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> PeerAddress {
        format!("127.0.0.1:{}", port).parse().unwrap()
    }

    #[test]
    fn test_initial_state() {
        let state = PeerNetworkState::new(addr(9000), 4, [0, 2, 9]);
        assert_eq!(state.owned_blocks().into_iter().collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(state.needed_blocks().into_iter().collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(state.progress_percent(), 50);
        assert!(!state.is_complete());
        assert!(!state.has_known_peers());
        assert_eq!(state.unchoke_decision(), UnchokeDecision::default());
    }

    #[test]
    fn test_owned_blocks_only_grow() {
        let state = PeerNetworkState::new(addr(9000), 3, [0]);
        assert!(state.add_owned_block(1));
        assert!(!state.add_owned_block(1));
        assert!(!state.add_owned_block(3));
        assert!(state.add_owned_block(2));
        assert!(state.is_complete());
        assert!(state.needed_blocks().is_empty());
        assert_eq!(state.progress_percent(), 100);
    }

    #[test]
    fn test_known_peers_exclude_self() {
        let state = PeerNetworkState::new(addr(9000), 3, [0]);
        let added = state.add_known_peers([addr(9000), addr(9001), addr(9002), addr(9001)]);
        assert_eq!(added, 2);
        assert!(!state.known_peers().contains(&addr(9000)));

        assert!(state.remove_known_peer(&addr(9001)));
        assert!(!state.remove_known_peer(&addr(9001)));
        assert_eq!(state.known_peers().into_iter().collect::<Vec<_>>(), vec![addr(9002)]);
    }

    #[test]
    fn test_authorize_block() {
        let state = PeerNetworkState::new(addr(9000), 4, [1]);
        assert!(!state.authorize_block(&addr(9001), 1));

        state.replace_unchoke_decision(UnchokeDecision::new([addr(9001)], Some(addr(9002))));
        assert!(state.authorize_block(&addr(9001), 1));
        assert!(state.authorize_block(&addr(9002), 1));
        // Unchoked but block not owned
        assert!(!state.authorize_block(&addr(9001), 2));
        // Owned but requester choked
        assert!(!state.authorize_block(&addr(9003), 1));
    }

    #[test]
    fn test_decision_is_replaced_not_merged() {
        let state = PeerNetworkState::new(addr(9000), 4, [1]);
        state.replace_unchoke_decision(UnchokeDecision::new([addr(9001), addr(9002)], None));
        state.replace_unchoke_decision(UnchokeDecision::new([addr(9003)], Some(addr(9004))));

        assert_eq!(state.candidate_sources(), vec![addr(9003), addr(9004)]);
        assert!(!state.authorize_block(&addr(9001), 1));
    }

    #[test]
    fn test_take_refusals_clears() {
        let state = PeerNetworkState::new(addr(9000), 4, [1]);
        state.record_refusal(addr(9001));
        state.record_refusal(addr(9001));
        state.record_refusal(addr(9002));

        let taken = state.take_refusals();
        assert_eq!(taken.len(), 2);
        assert!(state.refusals().is_empty());
        assert!(state.take_refusals().is_empty());
    }
}
