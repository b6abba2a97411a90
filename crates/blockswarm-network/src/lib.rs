//! # blockswarm Network Layer
//!
//! Point-to-point request/response messaging over TCP.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │               NETWORK LAYER                  │
//! ├──────────────────────────────────────────────┤
//! │  message    PeerRequest / PeerResponse       │
//! │             TrackerRequest / TrackerResponse │
//! │     │                                        │
//! │  codec      [version][len u32 BE][bincode]   │
//! │     │                                        │
//! │  transport  connect → write → read, with one │
//! │             timeout over the whole exchange  │
//! └──────────────────────────────────────────────┘
//! ```

pub mod codec;
pub mod error;
pub mod message;
pub mod transport;

// Re-exports
pub use codec::{read_frame, write_frame};
pub use error::NetworkError;
pub use message::{PeerRequest, PeerResponse, TrackerRequest, TrackerResponse, PROTOCOL_VERSION};
pub use transport::{ConnectionStats, TcpTransport, TransportConfig};
