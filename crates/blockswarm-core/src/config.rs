//! Swarm-wide protocol parameters
//!
//! Fixed at startup and shared by every component of a peer agent and the
//! tracker. Durations are stored as milliseconds so they round-trip through
//! TOML unchanged.

use crate::error::{Result, SwarmError};
use crate::types::{BlockIndex, BlockSet, PeerAddress, PeerId};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Protocol configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwarmConfig {
    /// Block size in bytes
    #[serde(default = "default_block_size")]
    pub block_size: usize,

    /// Choke policy recomputation interval
    #[serde(default = "default_unchoke_interval_ms")]
    pub unchoke_interval_ms: u64,

    /// Maximum simultaneously unchoked peers (excluding the optimistic slot)
    #[serde(default = "default_max_unchoked")]
    pub max_unchoked: usize,

    /// Optimistic unchoke slots (0 or 1)
    #[serde(default = "default_optimistic_slots")]
    pub optimistic_unchoke_slots: usize,

    /// Tracker endpoint
    #[serde(default = "default_tracker_addr")]
    pub tracker_addr: SocketAddr,

    /// How often a peer re-announces to the tracker
    #[serde(default = "default_tracker_update_interval_ms")]
    pub tracker_update_interval_ms: u64,

    /// Tracker liveness timeout
    #[serde(default = "default_tracker_timeout_ms")]
    pub tracker_timeout_ms: u64,

    /// Host peers listen on
    #[serde(default = "default_peer_host")]
    pub peer_host: IpAddr,

    /// Peer `id` listens on `peer_port_base + id`
    #[serde(default = "default_peer_port_base")]
    pub peer_port_base: u16,

    /// Timeout for one peer-to-peer exchange
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Timeout for one tracker exchange
    #[serde(default = "default_tracker_request_timeout_ms")]
    pub tracker_request_timeout_ms: u64,

    /// Sleep when no needed block is available anywhere
    #[serde(default = "default_idle_backoff_ms")]
    pub idle_backoff_ms: u64,

    /// Lower bound of the jittered retry sleep
    #[serde(default = "default_retry_backoff_min_ms")]
    pub retry_backoff_min_ms: u64,

    /// Upper bound of the jittered retry sleep
    #[serde(default = "default_retry_backoff_max_ms")]
    pub retry_backoff_max_ms: u64,

    /// Largest accepted wire frame
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,
}

fn default_block_size() -> usize {
    64
}

fn default_unchoke_interval_ms() -> u64 {
    10_000
}

fn default_max_unchoked() -> usize {
    4
}

fn default_optimistic_slots() -> usize {
    1
}

fn default_tracker_addr() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8000)
}

fn default_tracker_update_interval_ms() -> u64 {
    15_000
}

fn default_tracker_timeout_ms() -> u64 {
    40_000
}

fn default_peer_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_peer_port_base() -> u16 {
    9000
}

fn default_request_timeout_ms() -> u64 {
    2_000
}

fn default_tracker_request_timeout_ms() -> u64 {
    5_000
}

fn default_idle_backoff_ms() -> u64 {
    5_000
}

fn default_retry_backoff_min_ms() -> u64 {
    1_000
}

fn default_retry_backoff_max_ms() -> u64 {
    2_000
}

fn default_max_frame_size() -> usize {
    16 * 1024 * 1024 // 16 MiB
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            block_size: default_block_size(),
            unchoke_interval_ms: default_unchoke_interval_ms(),
            max_unchoked: default_max_unchoked(),
            optimistic_unchoke_slots: default_optimistic_slots(),
            tracker_addr: default_tracker_addr(),
            tracker_update_interval_ms: default_tracker_update_interval_ms(),
            tracker_timeout_ms: default_tracker_timeout_ms(),
            peer_host: default_peer_host(),
            peer_port_base: default_peer_port_base(),
            request_timeout_ms: default_request_timeout_ms(),
            tracker_request_timeout_ms: default_tracker_request_timeout_ms(),
            idle_backoff_ms: default_idle_backoff_ms(),
            retry_backoff_min_ms: default_retry_backoff_min_ms(),
            retry_backoff_max_ms: default_retry_backoff_max_ms(),
            max_frame_size: default_max_frame_size(),
        }
    }
}

impl SwarmConfig {
    /// Check every value is usable
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(SwarmError::InvalidConfig(msg.to_string()));

        if self.block_size == 0 {
            return invalid("block_size must be greater than zero");
        }
        if self.max_unchoked == 0 {
            return invalid("max_unchoked must be greater than zero");
        }
        if self.optimistic_unchoke_slots > 1 {
            return invalid("optimistic_unchoke_slots must be 0 or 1");
        }
        if self.unchoke_interval_ms == 0
            || self.tracker_update_interval_ms == 0
            || self.tracker_timeout_ms == 0
        {
            return invalid("intervals and timeouts must be greater than zero");
        }
        if self.request_timeout_ms == 0 || self.tracker_request_timeout_ms == 0 {
            return invalid("request timeouts must be greater than zero");
        }
        if self.retry_backoff_min_ms > self.retry_backoff_max_ms {
            return invalid("retry_backoff_min_ms must not exceed retry_backoff_max_ms");
        }
        if self.max_frame_size < self.block_size {
            return invalid("max_frame_size must hold at least one block");
        }
        Ok(())
    }

    /// Listening address of peer `id`
    pub fn peer_address(&self, id: PeerId) -> Result<PeerAddress> {
        PeerAddress::for_peer(self.peer_host, self.peer_port_base, id).ok_or(
            SwarmError::PortOverflow {
                id,
                port_base: self.peer_port_base,
            },
        )
    }

    pub fn unchoke_interval(&self) -> Duration {
        Duration::from_millis(self.unchoke_interval_ms)
    }

    pub fn tracker_update_interval(&self) -> Duration {
        Duration::from_millis(self.tracker_update_interval_ms)
    }

    pub fn tracker_timeout(&self) -> Duration {
        Duration::from_millis(self.tracker_timeout_ms)
    }

    /// The tracker sweeps at half its liveness timeout
    pub fn tracker_sweep_interval(&self) -> Duration {
        Duration::from_millis((self.tracker_timeout_ms / 2).max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn tracker_request_timeout(&self) -> Duration {
        Duration::from_millis(self.tracker_request_timeout_ms)
    }

    pub fn idle_backoff(&self) -> Duration {
        Duration::from_millis(self.idle_backoff_ms)
    }
}

/// What a peer process is told on the command line
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerIdentity {
    /// Numeric id, mapped to the listening port
    pub id: PeerId,
    /// Number of blocks in the file
    pub total_blocks: u32,
    /// Blocks already held at startup
    pub initial_blocks: BlockSet,
}

impl PeerIdentity {
    /// Build and validate a peer identity
    pub fn new(
        id: PeerId,
        total_blocks: u32,
        initial_blocks: impl IntoIterator<Item = BlockIndex>,
    ) -> Result<Self> {
        if total_blocks == 0 {
            return Err(SwarmError::EmptyFile);
        }
        let initial_blocks: BlockSet = initial_blocks.into_iter().collect();
        if initial_blocks.is_empty() {
            return Err(SwarmError::NoInitialBlocks);
        }
        if let Some(&block) = initial_blocks.iter().find(|&&b| b >= total_blocks) {
            return Err(SwarmError::BlockOutOfRange {
                block,
                total_blocks,
            });
        }
        Ok(Self {
            id,
            total_blocks,
            initial_blocks,
        })
    }
}
