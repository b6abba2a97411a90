//! # Block Discovery
//!
//! One round asks every known peer for its inventory and folds the answers
//! into a rarity histogram. Peers that do not answer are pruned from the
//! known set.

use crate::state::PeerNetworkState;
use crate::transport::PeerTransport;
use blockswarm_core::types::{BlockIndex, BlockSet, PeerAddress};
use blockswarm_network::{PeerRequest, PeerResponse};
use std::collections::BTreeMap;

/// Block index → number of peers reporting it
pub type RarityHistogram = BTreeMap<BlockIndex, usize>;

/// Peer → blocks it reported this round
pub type InventorySnapshot = BTreeMap<PeerAddress, BlockSet>;

/// Result of one discovery round
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DiscoveryRound {
    pub histogram: RarityHistogram,
    pub inventories: InventorySnapshot,
}

impl DiscoveryRound {
    /// Whether `peer` reported `block` this round
    pub fn has_block(&self, peer: &PeerAddress, block: BlockIndex) -> bool {
        self.inventories
            .get(peer)
            .map_or(false, |inventory| inventory.contains(&block))
    }

    pub fn responders(&self) -> usize {
        self.inventories.len()
    }
}

/// Query every known peer sequentially
pub async fn discover<T>(state: &PeerNetworkState, transport: &T) -> DiscoveryRound
where
    T: PeerTransport + ?Sized,
{
    let self_addr = state.self_addr();
    let total_blocks = state.total_blocks();
    let mut round = DiscoveryRound::default();

    for peer in state.known_peers() {
        if peer == self_addr {
            continue;
        }

        let inventory = match transport.send_request(peer, PeerRequest::List).await {
            Some(PeerResponse::Inventory(blocks)) => blocks,
            other => {
                if let Some(response) = other {
                    tracing::debug!(%peer, ?response, "Unexpected answer to list request");
                }
                if state.remove_known_peer(&peer) {
                    tracing::debug!(%peer, "Peer gone, removed from known peers");
                }
                continue;
            }
        };

        // Duplicates and indices beyond the file are not counted
        let inventory: BlockSet = inventory.into_iter().filter(|&b| b < total_blocks).collect();
        for &block in &inventory {
            *round.histogram.entry(block).or_insert(0) += 1;
        }
        round.inventories.insert(peer, inventory);
    }

    tracing::trace!(
        responders = round.responders(),
        available = round.histogram.len(),
        "Discovery round finished"
    );
    round
}
