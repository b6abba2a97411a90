//! Tracker process runtime

use anyhow::Context;
use blockswarm_core::SwarmConfig;
use blockswarm_tracker::{TrackerRegistry, TrackerServer, TrackerServerConfig};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;

/// Announces are a single address each way
const TRACKER_MAX_FRAME: usize = 64 * 1024;

/// Build a tracker server from the swarm parameters
pub fn tracker_server(config: &SwarmConfig) -> TrackerServer {
    let registry = Arc::new(TrackerRegistry::new(config.tracker_timeout(), config.max_unchoked));
    TrackerServer::new(
        registry,
        TrackerServerConfig {
            sweep_interval: config.tracker_sweep_interval(),
            request_timeout: config.tracker_request_timeout(),
            max_frame_size: TRACKER_MAX_FRAME.min(config.max_frame_size),
        },
    )
}

/// Bind the configured tracker address and serve until `shutdown` flips
pub async fn run_tracker(config: &SwarmConfig, shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.tracker_addr)
        .await
        .with_context(|| format!("Cannot listen on {}", config.tracker_addr))?;
    tracker_server(config).run(listener, shutdown).await;
    Ok(())
}
