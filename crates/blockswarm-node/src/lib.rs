//! # blockswarm Node
//!
//! Process runtime for the two roles of a blockswarm deployment:
//!
//! - [`PeerNode`] - a peer agent bound to its listening port, running the
//!   tracker contact loop, the choke engine, and the download orchestrator
//! - [`run_tracker`] - the rendezvous tracker
//!
//! Both stop when their shutdown flag flips; [`shutdown_on_signal`] flips it
//! on Ctrl-C or SIGTERM.

pub mod config;
pub mod node;
pub mod tracker;

pub use config::{LoggingConfig, NodeConfig, StorageConfig};
pub use node::{shutdown_on_signal, wait_for_flag, wait_for_signal, PeerNode};
pub use tracker::{run_tracker, tracker_server};
