//! # Inbound Request Handler
//!
//! Serves `list` and `block_request` for other peers. Never mutates the
//! peer state.

use crate::state::PeerNetworkState;
use blockswarm_network::{read_frame, write_frame, NetworkError, PeerRequest, PeerResponse};
use blockswarm_storage::BlockStore;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::timeout;

/// Answers inbound peer requests from the shared state and block store
#[derive(Clone)]
pub struct InboundHandler {
    state: Arc<PeerNetworkState>,
    store: BlockStore,
    request_timeout: Duration,
    max_frame_size: usize,
}

impl InboundHandler {
    pub fn new(
        state: Arc<PeerNetworkState>,
        store: BlockStore,
        request_timeout: Duration,
        max_frame_size: usize,
    ) -> Self {
        Self {
            state,
            store,
            request_timeout,
            max_frame_size,
        }
    }

    /// Build the response for one decoded request
    pub async fn respond(&self, request: PeerRequest) -> PeerResponse {
        match request {
            PeerRequest::List => PeerResponse::Inventory(self.state.owned_blocks().into_iter().collect()),
            PeerRequest::BlockRequest {
                requester,
                block_id,
            } => {
                if !self.state.authorize_block(&requester, block_id) {
                    tracing::debug!(%requester, block = block_id, "Refused block request");
                    return PeerResponse::Choked;
                }
                match self.store.read_block(block_id).await {
                    Ok(data) => {
                        tracing::debug!(%requester, block = block_id, bytes = data.len(), "Serving block");
                        PeerResponse::Block(data)
                    }
                    Err(e) => {
                        tracing::error!(block = block_id, error = %e, "Owned block unreadable");
                        PeerResponse::Choked
                    }
                }
            }
        }
    }

    /// Read one request, write one response, close
    ///
    /// Malformed requests are dropped without a response.
    pub async fn handle_connection(&self, mut stream: TcpStream, remote: SocketAddr) {
        let exchange = async {
            let request: PeerRequest = read_frame(&mut stream, self.max_frame_size).await?;
            let response = self.respond(request).await;
            write_frame(&mut stream, &response, self.max_frame_size).await?;
            Ok::<_, NetworkError>(())
        };

        match timeout(self.request_timeout, exchange).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::trace!(%remote, error = %e, "Inbound request dropped"),
            Err(_) => tracing::trace!(%remote, "Inbound request timed out"),
        }
    }

    /// Accept connections until `shutdown` flips or the listener fails
    ///
    /// Each connection runs on its own task; in-flight handlers finish
    /// before this returns.
    pub async fn serve(&self, listener: TcpListener, mut shutdown: watch::Receiver<bool>) {
        let local = listener.local_addr().ok();
        tracing::info!(addr = ?local, "Listening for peers");

        let mut connections = JoinSet::new();
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, remote)) => {
                        let handler = self.clone();
                        connections.spawn(async move {
                            handler.handle_connection(stream, remote).await;
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Peer listener failed, no longer serving");
                        break;
                    }
                },
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                _ = shutdown.changed() => break,
            }
        }

        while connections.join_next().await.is_some() {}
        tracing::debug!("Peer listener stopped");
    }
}
