//! Durable chain storage as seen by the sync engine.

use tributary_common::{Block, BlockHash, Transaction};

/// Errors from a [`ChainStore`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("height {requested} predates available history (earliest {earliest})")]
    HeightUnavailable { requested: u64, earliest: u64 },

    #[error("block {hash} at {height} does not extend the head at {head_height}")]
    NotContiguous {
        hash: BlockHash,
        height: u64,
        head_height: u64,
    },

    #[error("chain store holds no blocks")]
    Empty,
}

/// The storage service the engine commits to and rolls back.
///
/// Calls are blocking from the engine's point of view; only one rollback is
/// ever in flight per chain.
pub trait ChainStore: Send + 'static {
    /// Height of the durable head.
    fn current_height(&self) -> Result<u64, StoreError>;

    /// Hash of the durable head.
    fn current_head_hash(&self) -> Result<BlockHash, StoreError>;

    /// Drop every block above `height` and return their transactions in block
    /// order.
    fn rollback_to(&mut self, height: u64) -> Result<Vec<Transaction>, StoreError>;

    /// Append a validated block on top of the durable head.
    fn append_block(&mut self, block: &Block) -> Result<(), StoreError>;
}

/// Chain store kept entirely in memory, seeded with a genesis block.
pub struct InMemoryChainStore {
    blocks: Vec<Block>,
}

impl InMemoryChainStore {
    pub fn new(genesis: Block) -> Self {
        Self {
            blocks: vec![genesis],
        }
    }

    /// Store already holding `blocks`, which must be contiguous from the first.
    pub fn with_blocks(blocks: Vec<Block>) -> Result<Self, StoreError> {
        let mut iter = blocks.into_iter();
        let genesis = iter.next().ok_or(StoreError::Empty)?;
        let mut store = Self::new(genesis);
        for block in iter {
            store.append_block(&block)?;
        }
        Ok(store)
    }

    fn head(&self) -> Result<&Block, StoreError> {
        self.blocks.last().ok_or(StoreError::Empty)
    }
}

impl ChainStore for InMemoryChainStore {
    fn current_height(&self) -> Result<u64, StoreError> {
        Ok(self.head()?.header.height)
    }

    fn current_head_hash(&self) -> Result<BlockHash, StoreError> {
        Ok(self.head()?.header.hash)
    }

    fn rollback_to(&mut self, height: u64) -> Result<Vec<Transaction>, StoreError> {
        let earliest = self.blocks.first().ok_or(StoreError::Empty)?.header.height;
        if height < earliest {
            return Err(StoreError::HeightUnavailable {
                requested: height,
                earliest,
            });
        }

        let keep = self.blocks.iter().take_while(|b| b.header.height <= height).count();
        Ok(self
            .blocks
            .drain(keep..)
            .flat_map(|b| b.body.transactions)
            .collect())
    }

    fn append_block(&mut self, block: &Block) -> Result<(), StoreError> {
        let head = self.head()?;
        if !block.is_child_of(head) {
            return Err(StoreError::NotContiguous {
                hash: block.header.hash,
                height: block.header.height,
                head_height: head.header.height,
            });
        }
        self.blocks.push(block.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tributary_test_utils::{block_tx, chain, extend, MAIN};

    #[test]
    fn head_follows_appends() {
        let main = chain(3);
        let mut store = InMemoryChainStore::new(main[0].clone());
        assert_eq!(store.current_height().unwrap(), 0);

        store.append_block(&main[1]).unwrap();
        store.append_block(&main[2]).unwrap();
        assert_eq!(store.current_height().unwrap(), 2);
        assert_eq!(store.current_head_hash().unwrap(), main[2].hash());
    }

    #[test]
    fn append_rejects_gap_and_wrong_parent() {
        let main = chain(3);
        let mut store = InMemoryChainStore::new(main[0].clone());
        assert!(matches!(
            store.append_block(&main[2]),
            Err(StoreError::NotContiguous { height: 2, head_height: 0, .. })
        ));

        store.append_block(&main[1]).unwrap();
        let fork = extend(&main[0], 2, 4);
        assert!(store.append_block(&fork[1]).is_err());
    }

    #[test]
    fn rollback_returns_transactions_in_block_order() {
        let mut store = InMemoryChainStore::with_blocks(chain(5)).unwrap();
        let txs = store.rollback_to(2).unwrap();

        assert_eq!(txs, vec![block_tx(MAIN, 3), block_tx(MAIN, 4), block_tx(MAIN, 5)]);
        assert_eq!(store.current_height().unwrap(), 2);
    }

    #[test]
    fn rollback_above_head_is_a_no_op() {
        let mut store = InMemoryChainStore::with_blocks(chain(3)).unwrap();
        assert!(store.rollback_to(7).unwrap().is_empty());
        assert_eq!(store.current_height().unwrap(), 3);
    }

    #[test]
    fn rollback_before_history_fails() {
        let main = chain(12);
        let mut store = InMemoryChainStore::with_blocks(main[10..].to_vec()).unwrap();
        assert_eq!(
            store.rollback_to(9),
            Err(StoreError::HeightUnavailable {
                requested: 9,
                earliest: 10
            })
        );
        assert_eq!(store.current_height().unwrap(), 12);
    }
}
