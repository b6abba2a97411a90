//! Error types for blockswarm core operations

use crate::types::BlockIndex;
use thiserror::Error;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, SwarmError>;

/// Errors raised while validating configuration and the peer entry contract
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SwarmError {
    /// A configuration value is out of its accepted range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Block index is outside `[0, total_blocks)`
    #[error("Block {block} is out of range for {total_blocks} blocks")]
    BlockOutOfRange { block: BlockIndex, total_blocks: u32 },

    /// A run needs at least one block
    #[error("Total block count must be greater than zero")]
    EmptyFile,

    /// A peer must start with at least one block
    #[error("A peer must start with at least one block")]
    NoInitialBlocks,

    /// Peer id does not map to a valid listening port
    #[error("Peer id {id} overflows the port range from base {port_base}")]
    PortOverflow { id: u16, port_base: u16 },
}
