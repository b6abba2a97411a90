//! # Choke Policy Engine
//!
//! Recomputes, on a fixed timer, which peers may pull blocks from us.
//!
//! ## Policy
//!
//! - **Seeding** (nothing left to download): unchoke a uniform sample of
//!   known peers, no optimistic slot.
//! - **Leeching**: score each peer by how many of our missing blocks it
//!   offers; peers that refused us during the last window score -1. The
//!   best non-negative peers take the regular slots, and one peer drawn from
//!   the rest takes the optimistic slot.
//!
//! Punished peers never take a regular slot, even when slots would
//! otherwise stay empty. They remain eligible for the optimistic slot.

use crate::discovery::{discover, InventorySnapshot};
use crate::state::{PeerNetworkState, UnchokeDecision};
use crate::transport::PeerTransport;
use blockswarm_core::types::{format_peers, BlockSet, PeerAddress};
use blockswarm_core::SwarmConfig;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// Score assigned to peers that refused us during the last window
pub const REFUSER_SCORE: i64 = -1;

/// Slot counts for unchoke decisions
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChokePolicy {
    pub max_unchoked: usize,
    pub optimistic_slots: usize,
}

impl ChokePolicy {
    pub fn from_config(config: &SwarmConfig) -> Self {
        Self {
            max_unchoked: config.max_unchoked,
            optimistic_slots: config.optimistic_unchoke_slots,
        }
    }

    /// Decision for a peer that already holds every block
    pub fn seeding_decision<R: Rng + ?Sized>(
        &self,
        known_peers: &BTreeSet<PeerAddress>,
        self_addr: PeerAddress,
        rng: &mut R,
    ) -> UnchokeDecision {
        let others: Vec<PeerAddress> = known_peers.iter().filter(|&&p| p != self_addr).copied().collect();
        let count = self.max_unchoked.min(others.len());
        UnchokeDecision::new(others.choose_multiple(rng, count).copied(), None)
    }

    /// Decision for a peer still downloading
    ///
    /// `scores` must already be sorted best first.
    pub fn leeching_decision<R: Rng + ?Sized>(&self, scores: &[(PeerAddress, i64)], rng: &mut R) -> UnchokeDecision {
        let unchoked: BTreeSet<PeerAddress> = scores
            .iter()
            .filter(|(_, score)| *score >= 0)
            .take(self.max_unchoked)
            .map(|(peer, _)| *peer)
            .collect();

        let optimistic = if self.optimistic_slots > 0 {
            let rest: Vec<PeerAddress> = scores
                .iter()
                .map(|(peer, _)| *peer)
                .filter(|peer| !unchoked.contains(peer))
                .collect();
            rest.choose(rng).copied()
        } else {
            None
        };

        UnchokeDecision { unchoked, optimistic }
    }
}

/// Reciprocity scores sorted best first
///
/// Ties keep inventory order.
pub fn score_peers(
    needed: &BlockSet,
    inventories: &InventorySnapshot,
    refusals: &BTreeSet<PeerAddress>,
) -> Vec<(PeerAddress, i64)> {
    let mut scores: Vec<(PeerAddress, i64)> = inventories
        .iter()
        .map(|(peer, inventory)| {
            let score = if refusals.contains(peer) {
                REFUSER_SCORE
            } else {
                needed.intersection(inventory).count() as i64
            };
            (*peer, score)
        })
        .collect();
    // sort_by is stable
    scores.sort_by(|a, b| b.1.cmp(&a.1));
    scores
}

/// Periodic driver of the choke policy
pub struct ChokeEngine {
    state: Arc<PeerNetworkState>,
    transport: Arc<dyn PeerTransport>,
    policy: ChokePolicy,
    interval: Duration,
}

impl ChokeEngine {
    pub fn new(
        state: Arc<PeerNetworkState>,
        transport: Arc<dyn PeerTransport>,
        policy: ChokePolicy,
        interval: Duration,
    ) -> Self {
        Self {
            state,
            transport,
            policy,
            interval,
        }
    }

    /// One policy round; `None` when no peers are known yet
    pub async fn tick(&self) -> Option<UnchokeDecision> {
        if !self.state.has_known_peers() {
            return None;
        }

        let round = discover(self.state.as_ref(), self.transport.as_ref()).await;
        let needed = self.state.needed_blocks();
        let refusals = self.state.take_refusals();

        let decision = if needed.is_empty() {
            let known = self.state.known_peers();
            self.policy
                .seeding_decision(&known, self.state.self_addr(), &mut rand::thread_rng())
        } else {
            let scores = score_peers(&needed, &round.inventories, &refusals);
            for (peer, score) in &scores {
                tracing::trace!(%peer, score, "Peer scored");
            }
            self.policy.leeching_decision(&scores, &mut rand::thread_rng())
        };

        self.state.replace_unchoke_decision(decision.clone());

        let progress = self.state.progress_percent();
        tracing::info!(
            progress = format_args!("{}%", progress),
            unchoked = %format_peers(&decision.unchoked),
            "Unchoked peers updated"
        );
        match decision.optimistic {
            Some(peer) => tracing::info!(progress = format_args!("{}%", progress), %peer, "Optimistic unchoke"),
            None => tracing::debug!(progress = format_args!("{}%", progress), "No optimistic unchoke"),
        }

        Some(decision)
    }

    /// Tick every interval until `shutdown` flips
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                _ = shutdown.changed() => break,
            }
        }
        tracing::debug!("Choke engine stopped");
    }
}
