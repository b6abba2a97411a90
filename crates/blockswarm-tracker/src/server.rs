//! # Tracker Server
//!
//! Accepts one announce per connection and runs the liveness sweep on a
//! timer at half the registry timeout.

use crate::registry::TrackerRegistry;
use blockswarm_network::{read_frame, write_frame, NetworkError, TrackerRequest, TrackerResponse};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};

/// Tracker server settings
#[derive(Clone, Debug)]
pub struct TrackerServerConfig {
    /// How often stale peers are purged
    pub sweep_interval: Duration,
    /// Time allowed to read the announce and write the answer
    pub request_timeout: Duration,
    /// Largest accepted frame
    pub max_frame_size: usize,
}

impl Default for TrackerServerConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(20),
            request_timeout: Duration::from_secs(5),
            max_frame_size: 64 * 1024,
        }
    }
}

/// Rendezvous server over a [`TrackerRegistry`]
pub struct TrackerServer {
    registry: Arc<TrackerRegistry>,
    config: TrackerServerConfig,
}

impl TrackerServer {
    pub fn new(registry: Arc<TrackerRegistry>, config: TrackerServerConfig) -> Self {
        Self { registry, config }
    }

    /// Serve until `shutdown` flips or the listener fails
    ///
    /// In-flight announces are allowed to finish before returning.
    pub async fn run(&self, listener: TcpListener, mut shutdown: watch::Receiver<bool>) {
        let local = listener.local_addr().ok();
        tracing::info!(addr = ?local, "Tracker online, waiting for peers");

        let period = self.config.sweep_interval;
        let mut sweep = interval_at(Instant::now() + period, period);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut connections = JoinSet::new();
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, remote)) => {
                        let registry = self.registry.clone();
                        let config = self.config.clone();
                        connections.spawn(async move {
                            handle_connection(stream, remote, &registry, &config).await;
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Tracker listener failed, no longer accepting");
                        break;
                    }
                },
                _ = sweep.tick() => {
                    for peer in self.registry.sweep() {
                        tracing::info!(%peer, "Inactive peer removed");
                    }
                }
                // Reap finished handlers so the set does not grow unbounded
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                _ = shutdown.changed() => break,
            }
        }

        while connections.join_next().await.is_some() {}
        tracing::info!("Tracker stopped");
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    remote: SocketAddr,
    registry: &TrackerRegistry,
    config: &TrackerServerConfig,
) {
    let exchange = async {
        let request: TrackerRequest = read_frame(&mut stream, config.max_frame_size).await?;
        let TrackerRequest::Announce { peer } = request;

        let announcement = registry.announce(peer);
        if announcement.newly_registered {
            tracing::info!(%peer, "Peer registered");
        } else {
            tracing::debug!(%peer, "Peer refreshed");
        }

        let response = TrackerResponse::Peers(announcement.peers);
        write_frame(&mut stream, &response, config.max_frame_size).await?;
        Ok::<_, NetworkError>(())
    };

    // Routine disconnects and malformed announces are not worth more than a trace
    match timeout(config.request_timeout, exchange).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::trace!(%remote, error = %e, "Announce dropped"),
        Err(_) => tracing::trace!(%remote, "Announce timed out"),
    }
}
