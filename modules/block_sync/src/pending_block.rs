//! A block received from the network, awaiting its place in the chain.

use tributary_common::{Block, BlockHash, MessageKind, ValidationResult};

/// A received block plus how it arrived and what the validator made of it.
///
/// Identity is the block hash; two pending blocks with the same hash are the
/// same block regardless of arrival kind or verdict.
#[derive(Debug, Clone)]
pub struct PendingBlock {
    pub block: Block,
    pub message_kind: MessageKind,
    pub validation_result: ValidationResult,
}

impl PendingBlock {
    pub fn new(block: Block, message_kind: MessageKind) -> Self {
        Self {
            block,
            message_kind,
            validation_result: ValidationResult::Unvalidated,
        }
    }

    pub fn announced(block: Block) -> Self {
        Self::new(block, MessageKind::Announced)
    }

    pub fn fetched(block: Block) -> Self {
        Self::new(block, MessageKind::Fetched)
    }

    /// Same block with the validator's verdict attached.
    pub fn with_result(mut self, result: ValidationResult) -> Self {
        self.validation_result = result;
        self
    }

    pub fn hash(&self) -> BlockHash {
        self.block.header.hash
    }

    pub fn height(&self) -> u64 {
        self.block.header.height
    }

    pub fn previous_hash(&self) -> BlockHash {
        self.block.header.previous_hash
    }

    /// True if this block directly follows `parent` by hash and height.
    pub fn is_child_of(&self, parent: &PendingBlock) -> bool {
        self.block.is_child_of(&parent.block)
    }
}

impl PartialEq for PendingBlock {
    fn eq(&self, other: &Self) -> bool {
        self.hash() == other.hash()
    }
}

impl Eq for PendingBlock {}
