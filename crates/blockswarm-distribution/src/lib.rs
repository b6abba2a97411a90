//! # blockswarm Distribution
//!
//! The peer agent: everything a peer does between announcing itself to the
//! tracker and writing out the completed file.
//!
//! ## Components
//!
//! - **State**: owned blocks, known peers, unchoke decision, and refusal
//!   memory behind one lock
//! - **Handler**: answers `list` and `block_request` from other peers
//! - **Discovery**: polls known peers for inventories, builds the rarity
//!   histogram, prunes unreachable peers
//! - **Selector**: rarest-first block choice with random tie-break
//! - **Choke**: periodic tit-for-tat unchoke decision with an optimistic slot
//! - **Orchestrator**: the download loop
//!
//! ```text
//!            ┌──────────────── PeerNetworkState ────────────────┐
//!            │ owned │ known peers │ unchoke decision │ refusals │
//!            └───▲───────────▲──────────────▲────────────▲──────┘
//!   reads        │  prunes   │    replaces  │   records  │ takes
//!   InboundHandler   discover ──► ChokeEngine   DownloadOrchestrator
//! ```

pub mod choke;
pub mod discovery;
pub mod error;
pub mod handler;
pub mod orchestrator;
pub mod selector;
pub mod state;
pub mod transport;

pub use choke::{score_peers, ChokeEngine, ChokePolicy};
pub use discovery::{discover, DiscoveryRound, InventorySnapshot, RarityHistogram};
pub use error::{DistributionError, Result};
pub use handler::InboundHandler;
pub use orchestrator::{DownloadOrchestrator, OrchestratorConfig, StepOutcome};
pub use selector::select_block;
pub use state::{PeerNetworkState, UnchokeDecision};
pub use transport::PeerTransport;
