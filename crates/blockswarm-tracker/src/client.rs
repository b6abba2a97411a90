//! # Tracker Client
//!
//! Peer side of the announce exchange.

use blockswarm_core::types::PeerAddress;
use blockswarm_network::{NetworkError, TcpTransport, TrackerRequest, TrackerResponse};
use std::net::SocketAddr;

/// Announces a peer to one tracker
pub struct TrackerClient {
    tracker: SocketAddr,
    transport: TcpTransport,
}

impl TrackerClient {
    pub fn new(tracker: SocketAddr, transport: TcpTransport) -> Self {
        Self { tracker, transport }
    }

    pub fn tracker_addr(&self) -> SocketAddr {
        self.tracker
    }

    /// Register `peer` and return the tracker's sample of other live peers
    pub async fn announce(&self, peer: PeerAddress) -> Result<Vec<PeerAddress>, NetworkError> {
        let request = TrackerRequest::Announce { peer };
        let TrackerResponse::Peers(peers) = self.transport.exchange(self.tracker, &request).await?;
        Ok(peers)
    }
}
