//! # Download Orchestrator
//!
//! Drives the download to completion: discover, select the rarest needed
//! block, try unchoked sources in random order, back off, repeat. Once the
//! block set is complete the file is reconstructed.

use crate::discovery::discover;
use crate::error::{DistributionError, Result};
use crate::selector::select_block;
use crate::state::PeerNetworkState;
use crate::transport::PeerTransport;
use blockswarm_core::types::{BlockIndex, PeerAddress};
use blockswarm_core::SwarmConfig;
use blockswarm_network::{PeerRequest, PeerResponse};
use blockswarm_storage::{reconstruct, BlockStore};
use rand::seq::SliceRandom;
use rand::Rng;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Orchestrator timing
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Sleep after a round with nothing fetchable
    pub idle_backoff: Duration,
    /// Jittered sleep bounds after a round where no source yielded data
    pub retry_backoff_min: Duration,
    pub retry_backoff_max: Duration,
}

impl OrchestratorConfig {
    pub fn from_config(config: &SwarmConfig) -> Self {
        Self {
            idle_backoff: config.idle_backoff(),
            retry_backoff_min: Duration::from_millis(config.retry_backoff_min_ms),
            retry_backoff_max: Duration::from_millis(config.retry_backoff_max_ms),
        }
    }

    /// Jittered pause drawn from the thread-local generator
    pub fn next_retry_backoff(&self) -> Duration {
        self.retry_backoff(&mut rand::thread_rng())
    }

    fn retry_backoff<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.retry_backoff_max <= self.retry_backoff_min {
            return self.retry_backoff_min;
        }
        rng.gen_range(self.retry_backoff_min..=self.retry_backoff_max)
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::from_config(&SwarmConfig::default())
    }
}

/// What one iteration achieved
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// Every block is owned
    Complete,
    /// No needed block is offered by any responding peer
    NothingAvailable,
    /// `block` was fetched from `source`
    Fetched { block: BlockIndex, source: PeerAddress },
    /// A block was selected but no candidate delivered it
    NoSourceYielded { block: BlockIndex },
}

/// Main download loop of a peer agent
pub struct DownloadOrchestrator {
    state: Arc<PeerNetworkState>,
    transport: Arc<dyn PeerTransport>,
    store: BlockStore,
    output: PathBuf,
    config: OrchestratorConfig,
}

impl DownloadOrchestrator {
    pub fn new(
        state: Arc<PeerNetworkState>,
        transport: Arc<dyn PeerTransport>,
        store: BlockStore,
        output: impl Into<PathBuf>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            state,
            transport,
            store,
            output: output.into(),
            config,
        }
    }

    pub fn output_path(&self) -> &std::path::Path {
        &self.output
    }

    /// Check that every block the state claims is present in the store
    pub async fn verify_owned_blocks(&self) -> Result<()> {
        for block in self.state.owned_blocks() {
            if !self.store.contains(block).await {
                return Err(DistributionError::MissingInitialBlock(block));
            }
        }
        Ok(())
    }

    /// One discover → select → fetch iteration, without sleeping
    pub async fn step(&self) -> Result<StepOutcome> {
        if self.state.is_complete() {
            return Ok(StepOutcome::Complete);
        }

        let round = discover(self.state.as_ref(), self.transport.as_ref()).await;
        let owned = self.state.owned_blocks();
        let target = select_block(
            &round.histogram,
            &owned,
            self.state.total_blocks(),
            &mut rand::thread_rng(),
        );
        let Some(block) = target else {
            return Ok(if self.state.is_complete() {
                StepOutcome::Complete
            } else {
                StepOutcome::NothingAvailable
            });
        };

        let mut candidates = self.state.candidate_sources();
        candidates.shuffle(&mut rand::thread_rng());

        let requester = self.state.self_addr();
        for source in candidates {
            if !round.has_block(&source, block) {
                continue;
            }

            match self
                .transport
                .send_request(source, PeerRequest::block(requester, block))
                .await
            {
                Some(PeerResponse::Block(data)) => {
                    self.store.write_block(block, &data).await?;
                    self.state.add_owned_block(block);
                    tracing::info!(
                        progress = format_args!("{}%", self.state.progress_percent()),
                        block,
                        %source,
                        "Block acquired"
                    );
                    return Ok(StepOutcome::Fetched { block, source });
                }
                Some(PeerResponse::Choked) => {
                    self.state.record_refusal(source);
                    tracing::info!(
                        progress = format_args!("{}%", self.state.progress_percent()),
                        block,
                        %source,
                        "Choked by peer"
                    );
                }
                Some(other) => {
                    tracing::debug!(%source, block, response = ?other, "Unexpected answer to block request");
                }
                None => {}
            }
        }

        Ok(StepOutcome::NoSourceYielded { block })
    }

    /// Download until complete, then reconstruct the file
    ///
    /// Returns the number of bytes written to the output file.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<u64> {
        loop {
            if *shutdown.borrow() {
                return Err(DistributionError::Interrupted);
            }

            let pause = match self.step().await? {
                StepOutcome::Complete => break,
                StepOutcome::Fetched { .. } => continue,
                StepOutcome::NothingAvailable => {
                    tracing::info!(
                        progress = format_args!("{}%", self.state.progress_percent()),
                        "Nothing available, waiting"
                    );
                    self.config.idle_backoff
                }
                StepOutcome::NoSourceYielded { block } => {
                    tracing::debug!(block, "No source delivered the block, retrying");
                    self.config.next_retry_backoff()
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                Ok(()) = shutdown.changed() => {}
            }
        }

        let owned = self.state.owned_blocks();
        let bytes = reconstruct(&self.store, owned, &self.output).await?;
        tracing::info!(
            progress = "100%",
            output = %self.output.display(),
            bytes,
            "Download complete, file reconstructed"
        );
        Ok(bytes)
    }
}
