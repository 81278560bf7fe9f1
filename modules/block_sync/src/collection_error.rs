//! Error types for block collection operations.

use crate::chain_store::StoreError;

/// Errors returned by [`BlockCollection`](crate::block_collection::BlockCollection) operations.
///
/// Routing decisions (duplicates, orphans, stale blocks, rejected blocks) are
/// never errors; only storage failures escape the engine.
#[derive(Debug, thiserror::Error)]
pub enum CollectionError {
    /// Reading the durable chain failed.
    #[error("chain store query failed: {0}")]
    Store(#[from] StoreError),

    /// Storage refused the rollback; the fork was not checked out.
    #[error("rollback to height {height} failed: {source}")]
    RollbackFailed {
        height: u64,
        #[source]
        source: StoreError,
    },

    /// The fork would replace the genesis block.
    #[error("fork starting at height {start_height} has no block to roll back to")]
    InvalidForkPoint { start_height: u64 },
}
