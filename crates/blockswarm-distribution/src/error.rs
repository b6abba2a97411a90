//! Error types for the peer agent

use blockswarm_core::types::BlockIndex;
use blockswarm_storage::StorageError;
use thiserror::Error;

/// Peer agent errors
#[derive(Error, Debug)]
pub enum DistributionError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Initial block {0} is not present in the block store")]
    MissingInitialBlock(BlockIndex),

    #[error("Shutdown requested before the download completed")]
    Interrupted,
}

pub type Result<T> = std::result::Result<T, DistributionError>;
