//! Core type definitions for blockswarm
//!
//! A run distributes exactly one logical file, split into `total_blocks`
//! fixed-size blocks. Blocks are named by their index; peers are named by
//! the socket address they listen on.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

/// Index of a block in `[0, total_blocks)`
pub type BlockIndex = u32;

/// Numeric peer identity given on the command line
pub type PeerId = u16;

/// Ordered set of block indices
pub type BlockSet = BTreeSet<BlockIndex>;

/// PeerAddress - Listening endpoint of a peer agent
///
/// Used both as the network destination for requests and as the key that
/// identifies a peer in every map and set. No two peers share one.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerAddress(SocketAddr);

impl PeerAddress {
    pub fn new(addr: SocketAddr) -> Self {
        Self(addr)
    }

    /// Deterministic address of peer `id`: `host:(port_base + id)`
    ///
    /// Returns `None` when the port would not fit in 16 bits.
    pub fn for_peer(host: IpAddr, port_base: u16, id: PeerId) -> Option<Self> {
        let port = port_base.checked_add(id)?;
        Some(Self(SocketAddr::new(host, port)))
    }

    pub fn socket_addr(&self) -> SocketAddr {
        self.0
    }

    pub fn port(&self) -> u16 {
        self.0.port()
    }
}

impl From<SocketAddr> for PeerAddress {
    fn from(addr: SocketAddr) -> Self {
        Self(addr)
    }
}

impl FromStr for PeerAddress {
    type Err = std::net::AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<SocketAddr>().map(Self)
    }
}

impl fmt::Debug for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerAddress({})", self.0)
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Blocks of `[0, total_blocks)` that are not in `owned`
pub fn needed_blocks(owned: &BlockSet, total_blocks: u32) -> BlockSet {
    (0..total_blocks).filter(|b| !owned.contains(b)).collect()
}

/// Integer download progress, 0-100
pub fn progress_percent(owned: usize, total_blocks: u32) -> u32 {
    if total_blocks == 0 {
        return 100;
    }
    ((owned as u64 * 100) / total_blocks as u64) as u32
}

/// Render a set of peers for log lines: `[a, b, c]`
pub fn format_peers<'a>(peers: impl IntoIterator<Item = &'a PeerAddress>) -> String {
    let names: Vec<String> = peers.into_iter().map(|p| p.to_string()).collect();
    format!("[{}]", names.join(", "))
}
