//! Peer process runtime
//!
//! Wires one peer agent together: the inbound listener, the tracker
//! contact loop, the choke engine, and the download orchestrator, all
//! sharing a single [`PeerNetworkState`].

use crate::config::NodeConfig;
use anyhow::Context;
use blockswarm_core::types::PeerAddress;
use blockswarm_core::PeerIdentity;
use blockswarm_distribution::{
    ChokeEngine, ChokePolicy, DistributionError, DownloadOrchestrator, InboundHandler, OrchestratorConfig,
    PeerNetworkState, PeerTransport,
};
use blockswarm_network::{TcpTransport, TransportConfig};
use blockswarm_storage::BlockStore;
use blockswarm_tracker::TrackerClient;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;

/// A bound, validated peer ready to run
pub struct PeerNode {
    config: NodeConfig,
    identity: PeerIdentity,
    listener: TcpListener,
    state: Arc<PeerNetworkState>,
    store: BlockStore,
}

impl PeerNode {
    /// Bind the listening port derived from the peer id
    pub async fn bind(config: NodeConfig, identity: PeerIdentity) -> anyhow::Result<Self> {
        let address = config.swarm.peer_address(identity.id)?;
        let listener = TcpListener::bind(address.socket_addr())
            .await
            .with_context(|| format!("Cannot listen on {}", address))?;
        Self::with_listener(config, identity, listener).await
    }

    /// Use an already bound listener; its local address becomes the peer address
    pub async fn with_listener(
        config: NodeConfig,
        identity: PeerIdentity,
        listener: TcpListener,
    ) -> anyhow::Result<Self> {
        let address = PeerAddress::new(listener.local_addr()?);
        let store = BlockStore::open(&config.storage.blocks_dir).await?;
        let state = Arc::new(PeerNetworkState::new(
            address,
            identity.total_blocks,
            identity.initial_blocks.iter().copied(),
        ));

        Ok(Self {
            config,
            identity,
            listener,
            state,
            store,
        })
    }

    pub fn address(&self) -> PeerAddress {
        self.state.self_addr()
    }

    pub fn state(&self) -> Arc<PeerNetworkState> {
        self.state.clone()
    }

    /// Run until `shutdown` flips
    ///
    /// After the download completes the peer keeps serving and seeding.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let swarm = &self.config.swarm;
        let address = self.address();
        let tcp = Arc::new(TcpTransport::new(TransportConfig {
            request_timeout: swarm.request_timeout(),
            max_frame_size: swarm.max_frame_size,
        }));
        let transport: Arc<dyn PeerTransport> = tcp.clone();

        let orchestrator = DownloadOrchestrator::new(
            self.state.clone(),
            transport.clone(),
            self.store.clone(),
            self.config.output_path(self.identity.id),
            OrchestratorConfig::from_config(swarm),
        );
        orchestrator
            .verify_owned_blocks()
            .await
            .context("Startup validation failed")?;

        tracing::info!(
            peer = self.identity.id,
            %address,
            total_blocks = self.identity.total_blocks,
            initial = self.state.owned_count(),
            "Peer starting"
        );

        let mut tasks = JoinSet::new();

        let handler = InboundHandler::new(
            self.state.clone(),
            self.store.clone(),
            swarm.request_timeout(),
            swarm.max_frame_size,
        );
        let listener = self.listener;
        let rx = shutdown.clone();
        tasks.spawn(async move { handler.serve(listener, rx).await });

        let tracker = TrackerClient::new(
            swarm.tracker_addr,
            TcpTransport::new(TransportConfig {
                request_timeout: swarm.tracker_request_timeout(),
                max_frame_size: swarm.max_frame_size,
            }),
        );
        tasks.spawn(announce_loop(
            tracker,
            self.state.clone(),
            swarm.tracker_update_interval(),
            shutdown.clone(),
        ));

        let engine = ChokeEngine::new(
            self.state.clone(),
            transport,
            ChokePolicy::from_config(swarm),
            swarm.unchoke_interval(),
        );
        let rx = shutdown.clone();
        tasks.spawn(async move { engine.run(rx).await });

        match orchestrator.run(shutdown.clone()).await {
            Ok(_) => {
                tracing::info!("Seeding until shutdown");
                wait_for_flag(shutdown).await;
            }
            Err(DistributionError::Interrupted) => {
                tracing::info!(
                    progress = format_args!("{}%", self.state.progress_percent()),
                    "Shutdown before download completed"
                );
            }
            Err(e) => {
                tasks.abort_all();
                return Err(e).context("Download failed");
            }
        }

        while tasks.join_next().await.is_some() {}
        let stats = tcp.stats();
        tracing::info!(
            exchanges = stats.exchanges,
            failures = stats.failures,
            timeouts = stats.timeouts,
            "Peer stopped"
        );
        Ok(())
    }
}

/// Announce on every interval and merge the returned peers
async fn announce_loop(
    tracker: TrackerClient,
    state: Arc<PeerNetworkState>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let address = state.self_addr();

    loop {
        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => break,
        }

        match tracker.announce(address).await {
            Ok(peers) => {
                let added = state.add_known_peers(peers);
                if added > 0 {
                    tracing::info!(added, known = state.known_peers().len(), "New peers from tracker");
                }
            }
            Err(e) => {
                tracing::warn!(tracker = %tracker.tracker_addr(), error = %e, "Tracker unreachable");
            }
        }
    }
}

/// Resolve once the flag reads true or its sender is gone
pub async fn wait_for_flag(mut shutdown: watch::Receiver<bool>) {
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            break;
        }
    }
}

/// Wait for Ctrl-C or SIGTERM
pub async fn wait_for_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = signal::ctrl_c() => result?,
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    signal::ctrl_c().await?;

    Ok(())
}

/// Shutdown flag flipped by the first Ctrl-C or SIGTERM
pub fn shutdown_on_signal() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        match wait_for_signal().await {
            Ok(()) => tracing::info!("Shutdown signal received"),
            Err(e) => {
                tracing::error!(error = %e, "Cannot install signal handlers");
                // Keep the flag unset for the life of the process
                std::future::pending::<()>().await;
            }
        }
        let _ = tx.send(true);
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> NodeConfig {
        let mut config = NodeConfig::default();
        config.storage.blocks_dir = dir.path().join("blocks");
        config.storage.output_dir = dir.path().join("out");
        config
    }

    #[tokio::test]
    async fn test_missing_initial_block_fails_startup() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let identity = PeerIdentity::new(0, 2, [0]).unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();

        let node = PeerNode::with_listener(config, identity, listener).await.unwrap();
        let (_tx, rx) = watch::channel(false);
        assert!(node.run(rx).await.is_err());
    }

    #[tokio::test]
    async fn test_address_comes_from_listener() {
        let dir = TempDir::new().unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let local = listener.local_addr().unwrap();

        let node = PeerNode::with_listener(config_in(&dir), PeerIdentity::new(3, 4, [1]).unwrap(), listener)
            .await
            .unwrap();
        assert_eq!(node.address().socket_addr(), local);
        assert_eq!(node.state().owned_count(), 1);
    }

    #[tokio::test]
    async fn test_wait_for_flag() {
        let (tx, rx) = watch::channel(false);
        let waiter = tokio::spawn(wait_for_flag(rx));
        tx.send(true).unwrap();
        waiter.await.unwrap();

        // Dropped sender also releases the waiter
        let (tx, rx) = watch::channel(false);
        drop(tx);
        wait_for_flag(rx).await;
    }
}
