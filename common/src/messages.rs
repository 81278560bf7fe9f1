//! Definition of Tributary messages

use crate::types::*;
use crate::validation::ValidationResult;

/// Block delivered by the network layer
#[derive(Debug, Default, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BlockReceivedMessage {
    /// The block
    pub block: Block,

    /// Announced as a new head, or fetched on request
    pub kind: MessageKind,
}

/// Verdict pushed by the block validator
#[derive(Debug, Default, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BlockValidationMessage {
    /// Hash of the block that was validated
    pub hash: BlockHash,

    /// Outcome
    pub result: ValidationResult,
}

/// Queued block handed to the validator, in height order
#[derive(Debug, Default, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BlockProposedMessage {
    pub block: Block,
}

/// Block appended to durable storage
#[derive(Debug, Default, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BlockCommittedMessage {
    pub height: u64,
    pub hash: BlockHash,
}

/// The canonical chain switched to a fork
#[derive(Debug, Default, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RollbackMessage {
    /// Storage was rolled back to this height
    pub to_height: u64,

    /// Transactions of displaced blocks, in block order, to be replayed
    pub transactions: Vec<Transaction>,
}

/// Local block production switched on or off
#[derive(Debug, Default, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ProductionStatusMessage {
    pub producing: bool,
}

/// Snapshot of the sync engine for diagnostics
#[derive(Debug, Default, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SyncStatusMessage {
    pub phase: SyncPhase,
    pub synced_height: u64,
    pub highest_queued_height: u64,
    pub segment_count: usize,

    /// Canonical queue, height order
    pub pending: Vec<BlockSummary>,

    /// Blocks of every fork segment, flattened
    pub branched: Vec<BlockSummary>,
}

// === Global message enum ===
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum Message {
    None(()), // Just so we have a simple default

    // Network / validator inputs
    BlockReceived(BlockReceivedMessage),
    BlockValidation(BlockValidationMessage),
    ProductionStatus(ProductionStatusMessage),

    // Sync engine outputs
    BlockProposed(BlockProposedMessage),
    BlockCommitted(BlockCommittedMessage),
    Rollback(RollbackMessage),

    // Status request / response
    SyncStatusQuery,
    SyncStatus(SyncStatusMessage),
}

impl Default for Message {
    fn default() -> Self {
        Self::None(())
    }
}

// Casts from specific messages
impl From<BlockReceivedMessage> for Message {
    fn from(msg: BlockReceivedMessage) -> Self {
        Message::BlockReceived(msg)
    }
}

impl From<BlockValidationMessage> for Message {
    fn from(msg: BlockValidationMessage) -> Self {
        Message::BlockValidation(msg)
    }
}

impl From<ProductionStatusMessage> for Message {
    fn from(msg: ProductionStatusMessage) -> Self {
        Message::ProductionStatus(msg)
    }
}

impl From<BlockProposedMessage> for Message {
    fn from(msg: BlockProposedMessage) -> Self {
        Message::BlockProposed(msg)
    }
}

impl From<BlockCommittedMessage> for Message {
    fn from(msg: BlockCommittedMessage) -> Self {
        Message::BlockCommitted(msg)
    }
}

impl From<RollbackMessage> for Message {
    fn from(msg: RollbackMessage) -> Self {
        Message::Rollback(msg)
    }
}

impl From<SyncStatusMessage> for Message {
    fn from(msg: SyncStatusMessage) -> Self {
        Message::SyncStatus(msg)
    }
}
