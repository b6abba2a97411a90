//! Outbound request seam
//!
//! Every outbound peer call goes through [`PeerTransport`]. A failed
//! exchange of any kind (refused, reset, timed out, garbled) collapses to
//! `None`; callers only distinguish "answered" from "did not answer".

use async_trait::async_trait;
use blockswarm_core::types::PeerAddress;
use blockswarm_network::{PeerRequest, PeerResponse, TcpTransport};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// One request, at most one response
    async fn send_request(&self, destination: PeerAddress, request: PeerRequest) -> Option<PeerResponse>;
}

#[async_trait]
impl PeerTransport for TcpTransport {
    async fn send_request(&self, destination: PeerAddress, request: PeerRequest) -> Option<PeerResponse> {
        match self.exchange(destination.socket_addr(), &request).await {
            Ok(response) => Some(response),
            Err(e) => {
                tracing::debug!(%destination, kind = request.kind(), error = %e, "Peer did not answer");
                None
            }
        }
    }
}
