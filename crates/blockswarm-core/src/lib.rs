//! # blockswarm core
//!
//! Shared vocabulary for the blockswarm peer-to-peer block distribution
//! network:
//! - `BlockIndex` / `BlockSet` - identity of the fixed-size blocks of the file
//! - `PeerAddress` - listening endpoint that names a peer
//! - `SwarmConfig` - protocol parameters fixed at startup
//! - `PeerIdentity` - the validated peer entry contract
//!
//! ```text
//!   tracker  <── announce ──  peer A  ── list / block_request ──>  peer B
//!      │                        ▲                                     │
//!      └── sample of peers ─────┘<──────── inventory / block ─────────┘
//! ```

pub mod config;
pub mod error;
pub mod types;

pub use config::{PeerIdentity, SwarmConfig};
pub use error::{Result, SwarmError};
pub use types::*;
