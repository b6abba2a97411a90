//! # Network Messages
//!
//! Every message type exchanged between peers and between a peer and the
//! tracker. Each connection carries exactly one request and at most one
//! response.

use blockswarm_core::types::{BlockIndex, PeerAddress};
use serde::{Deserialize, Serialize};

/// Wire schema version carried in every frame header
pub const PROTOCOL_VERSION: u8 = 1;

/// Peer-to-peer request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeerRequest {
    /// Ask for the responder's full block inventory
    List,
    /// Ask for one block's bytes
    BlockRequest {
        /// Address the requester listens on; checked against the unchoke set
        requester: PeerAddress,
        block_id: BlockIndex,
    },
}

impl PeerRequest {
    pub fn block(requester: PeerAddress, block_id: BlockIndex) -> Self {
        Self::BlockRequest {
            requester,
            block_id,
        }
    }

    /// Short name for log fields
    pub fn kind(&self) -> &'static str {
        match self {
            Self::List => "list",
            Self::BlockRequest { .. } => "block_request",
        }
    }
}

/// Peer-to-peer response
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeerResponse {
    /// Responder's owned blocks, order irrelevant
    Inventory(Vec<BlockIndex>),
    /// Raw block bytes
    Block(Vec<u8>),
    /// Request refused: requester is choked or the block is not owned
    Choked,
}

/// Peer-to-tracker request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackerRequest {
    /// Register (or refresh) `peer` and ask for other live peers
    Announce { peer: PeerAddress },
}

/// Tracker-to-peer response
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackerResponse {
    /// Random sample of other live peers, never including the requester
    Peers(Vec<PeerAddress>),
}
