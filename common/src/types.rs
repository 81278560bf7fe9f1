//! Core type definitions for Tributary

use crate::declare_hash_type;

declare_hash_type!(BlockHash, 32);
declare_hash_type!(TxHash, 32);
declare_hash_type!(
    /// Identifier of the chain a block belongs to
    ChainId,
    4
);

/// Transaction as carried inside a block body
#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Transaction {
    /// Transaction hash
    pub hash: TxHash,

    /// Raw encoded transaction
    pub raw: Vec<u8>,
}

/// Block header
#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BlockHeader {
    /// Chain the block was produced for
    pub chain_id: ChainId,

    /// Block height
    pub height: u64,

    /// Hash of the parent block
    pub previous_hash: BlockHash,

    /// Hash of this block
    pub hash: BlockHash,

    /// Production time (milliseconds since epoch)
    pub timestamp: u64,
}

/// Block body
#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BlockBody {
    /// Transactions in execution order
    pub transactions: Vec<Transaction>,
}

/// Full block
#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub body: BlockBody,
}

impl Block {
    pub fn hash(&self) -> BlockHash {
        self.header.hash
    }

    pub fn height(&self) -> u64 {
        self.header.height
    }

    pub fn previous_hash(&self) -> BlockHash {
        self.header.previous_hash
    }

    /// True if `self` directly follows `parent` by both hash and height.
    pub fn is_child_of(&self, parent: &Block) -> bool {
        self.header.previous_hash == parent.header.hash
            && parent.header.height.checked_add(1) == Some(self.header.height)
    }
}

/// How a block reached us from the network
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum MessageKind {
    /// A peer announced this block as its new head
    #[default]
    Announced,

    /// A peer supplied this block in response to our request
    Fetched,
}

/// Where the engine stands in establishing its position on the network
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SyncPhase {
    /// Joining the network; ordering against local height not yet known
    #[default]
    InitialCatchUp,

    /// Caught up; blocks are classified one by one
    Steady,
}

/// Height and linkage of a block, for status reporting
#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BlockSummary {
    pub height: u64,
    pub hash: BlockHash,
    pub previous_hash: BlockHash,
}

impl From<&Block> for BlockSummary {
    fn from(block: &Block) -> Self {
        Self {
            height: block.header.height,
            hash: block.header.hash,
            previous_hash: block.header.previous_hash,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(height: u64, previous: u8, hash: u8) -> Block {
        Block {
            header: BlockHeader {
                height,
                previous_hash: BlockHash::new([previous; 32]),
                hash: BlockHash::new([hash; 32]),
                ..Default::default()
            },
            body: BlockBody::default(),
        }
    }

    #[test]
    fn child_requires_hash_and_height() {
        let parent = block(10, 0, 1);
        assert!(block(11, 1, 2).is_child_of(&parent));
        assert!(!block(12, 1, 2).is_child_of(&parent));
        assert!(!block(11, 9, 2).is_child_of(&parent));
    }
}
