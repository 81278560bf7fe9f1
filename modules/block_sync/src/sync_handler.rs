//! Bus-facing driver for a [`BlockCollection`].
//!
//! Turns received blocks and validator verdicts into engine calls, commits
//! validated blocks to storage and reports what the rest of the node has to
//! hear about as [`SyncEvent`]s. Publishing is left to the caller.

use std::collections::HashSet;

use tracing::{debug, info, warn};
use tributary_common::{
    messages::{
        BlockCommittedMessage, BlockProposedMessage, BlockReceivedMessage, BlockValidationMessage,
        RollbackMessage, SyncStatusMessage,
    },
    BlockHash, BlockSummary, Transaction, ValidationError, ValidationResult,
};

use crate::{
    block_collection::BlockCollection,
    chain_store::{ChainStore, StoreError},
    collection_error::CollectionError,
    pending_block::PendingBlock,
};

/// Output of one handled message, in publication order.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// Queued block ready for the validator
    Proposed(BlockProposedMessage),

    /// Block appended to durable storage
    Committed(BlockCommittedMessage),

    /// Canonical chain switched to a fork
    Rollback(RollbackMessage),
}

pub struct SyncHandler<S: ChainStore> {
    collection: BlockCollection<S>,

    /// Queued blocks already handed to the validator
    proposed: HashSet<BlockHash>,
}

impl<S: ChainStore> SyncHandler<S> {
    pub fn new(collection: BlockCollection<S>) -> Self {
        Self {
            collection,
            proposed: HashSet::new(),
        }
    }

    pub fn collection(&self) -> &BlockCollection<S> {
        &self.collection
    }

    pub fn handle_received(
        &mut self,
        received: &BlockReceivedMessage,
    ) -> Result<Vec<SyncEvent>, CollectionError> {
        let pending = PendingBlock::new(received.block.clone(), received.kind);
        let replayed = self.collection.add_pending_block(pending)?;

        let mut events = Vec::new();
        self.report_rollback(replayed, &mut events)?;
        self.propose(&mut events)?;
        Ok(events)
    }

    /// Apply a verdict: commit a valid block, route a rejected one to the pool.
    pub fn handle_validation(
        &mut self,
        validation: &BlockValidationMessage,
    ) -> Result<Vec<SyncEvent>, CollectionError> {
        let Some(pending) = self.collection.pending_block(&validation.hash).cloned() else {
            debug!(hash = %validation.hash, "Verdict for a block that is no longer queued");
            return Ok(Vec::new());
        };

        let mut events = Vec::new();
        let mut result = validation.result;
        if result == ValidationResult::Valid {
            match self.collection.chain_store_mut().append_block(&pending.block) {
                Ok(()) => {
                    debug!(hash = %pending.hash(), "Committed block at {}", pending.height());
                    events.push(SyncEvent::Committed(BlockCommittedMessage {
                        height: pending.height(),
                        hash: pending.hash(),
                    }));
                }
                Err(e @ StoreError::NotContiguous { .. }) => {
                    warn!("Valid block cannot be committed, rejecting: {e}");
                    result = ValidationResult::Invalid(ValidationError::IncorrectPreviousHash);
                }
                Err(e) => return Err(e.into()),
            }
        }

        let replayed = self.collection.remove_pending_block(pending.with_result(result))?;
        self.report_rollback(replayed, &mut events)?;
        self.propose(&mut events)?;
        Ok(events)
    }

    pub fn status(&self) -> Result<SyncStatusMessage, CollectionError> {
        let collection = &self.collection;
        Ok(SyncStatusMessage {
            phase: collection.sync_phase(),
            synced_height: collection.synced_height()?,
            highest_queued_height: collection.pending_block_height(),
            segment_count: collection.segment_count(),
            pending: collection.pending_blocks().iter().map(|b| BlockSummary::from(&b.block)).collect(),
            branched: collection
                .branched_pending_blocks()
                .iter()
                .map(|b| BlockSummary::from(&b.block))
                .collect(),
        })
    }

    fn report_rollback(
        &self,
        replayed: Option<Vec<Transaction>>,
        events: &mut Vec<SyncEvent>,
    ) -> Result<(), CollectionError> {
        let Some(transactions) = replayed else {
            return Ok(());
        };
        let to_height = self.collection.synced_height()?;
        info!(
            "Rolled back to {to_height}, {} transactions to replay",
            transactions.len()
        );
        events.push(SyncEvent::Rollback(RollbackMessage {
            to_height,
            transactions,
        }));
        Ok(())
    }

    /// Propose every block of the linked run above the durable head that the
    /// validator has not seen yet.
    fn propose(&mut self, events: &mut Vec<SyncEvent>) -> Result<(), CollectionError> {
        let queued: HashSet<BlockHash> =
            self.collection.pending_blocks().iter().map(|b| b.hash()).collect();
        self.proposed.retain(|hash| queued.contains(hash));

        let store = self.collection.chain_store();
        let mut parent_height = store.current_height()?;
        let mut parent_hash = store.current_head_hash()?;
        for pending in self.collection.pending_blocks() {
            if parent_height.checked_add(1) != Some(pending.height())
                || pending.previous_hash() != parent_hash
            {
                break;
            }
            if self.proposed.insert(pending.hash()) {
                events.push(SyncEvent::Proposed(BlockProposedMessage {
                    block: pending.block.clone(),
                }));
            }
            parent_height = pending.height();
            parent_hash = pending.hash();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        block_collection::CollectionConfig, chain_store::InMemoryChainStore,
        production::NoProduction,
    };
    use tributary_common::{Block, MessageKind};
    use tributary_test_utils::{chain, extend, TEST_CHAIN_ID};

    fn handler(blocks: Vec<Block>) -> SyncHandler<InMemoryChainStore> {
        let config = CollectionConfig {
            chain_id: TEST_CHAIN_ID,
            round_window: 4,
        };
        let store = InMemoryChainStore::with_blocks(blocks).unwrap();
        SyncHandler::new(BlockCollection::new(config, store, Box::new(NoProduction)).unwrap())
    }

    fn received(block: &Block) -> BlockReceivedMessage {
        BlockReceivedMessage {
            block: block.clone(),
            kind: MessageKind::Announced,
        }
    }

    fn verdict(block: &Block, result: ValidationResult) -> BlockValidationMessage {
        BlockValidationMessage {
            hash: block.header.hash,
            result,
        }
    }

    fn proposed(block: &Block) -> SyncEvent {
        SyncEvent::Proposed(BlockProposedMessage {
            block: block.clone(),
        })
    }

    #[test]
    fn queued_blocks_are_proposed_once() {
        let main = chain(12);
        let mut handler = handler(main[..=10].to_vec());

        assert_eq!(handler.handle_received(&received(&main[11])).unwrap(), vec![proposed(&main[11])]);
        assert_eq!(handler.handle_received(&received(&main[12])).unwrap(), vec![proposed(&main[12])]);
        assert!(handler.handle_received(&received(&main[12])).unwrap().is_empty());
    }

    #[test]
    fn valid_verdict_commits() {
        let main = chain(11);
        let mut handler = handler(main[..=10].to_vec());
        handler.handle_received(&received(&main[11])).unwrap();

        let events = handler.handle_validation(&verdict(&main[11], ValidationResult::Valid)).unwrap();

        assert_eq!(
            events,
            vec![SyncEvent::Committed(BlockCommittedMessage {
                height: 11,
                hash: main[11].header.hash,
            })]
        );
        assert_eq!(handler.collection().synced_height().unwrap(), 11);
        assert!(handler.collection().is_empty());
    }

    #[test]
    fn verdict_for_unknown_block_is_ignored() {
        let main = chain(11);
        let mut handler = handler(main[..=10].to_vec());

        let events = handler.handle_validation(&verdict(&main[11], ValidationResult::Valid)).unwrap();

        assert!(events.is_empty());
        assert_eq!(handler.collection().synced_height().unwrap(), 10);
    }

    #[test]
    fn valid_block_that_does_not_extend_storage_is_rejected() {
        let main = chain(12);
        let mut handler = handler(main[..=10].to_vec());
        handler.handle_received(&received(&main[11])).unwrap();
        handler.handle_received(&received(&main[12])).unwrap();

        // Verdict for 12 before 11 was committed
        let events = handler.handle_validation(&verdict(&main[12], ValidationResult::Valid)).unwrap();

        assert!(events.is_empty());
        assert_eq!(handler.collection().synced_height().unwrap(), 10);
        assert_eq!(handler.collection().len(), 1);
        assert_eq!(handler.collection().segment_count(), 1);
    }

    #[test]
    fn reorg_reports_rollback_then_proposes_fork() {
        let main = chain(12);
        let fork = extend(&main[10], 2, 1);
        let mut handler = handler(main[..=10].to_vec());
        handler.handle_received(&received(&main[11])).unwrap();
        handler.handle_received(&received(&main[12])).unwrap();
        assert!(handler.handle_received(&received(&fork[0])).unwrap().is_empty());

        let events = handler.handle_received(&received(&fork[1])).unwrap();

        assert_eq!(
            events,
            vec![
                SyncEvent::Rollback(RollbackMessage {
                    to_height: 10,
                    transactions: vec![
                        main[11].body.transactions[0].clone(),
                        main[12].body.transactions[0].clone(),
                    ],
                }),
                proposed(&fork[0]),
                proposed(&fork[1]),
            ]
        );
    }

    #[test]
    fn status_reports_queue_and_pool() {
        let main = chain(11);
        let fork = extend(&main[10], 1, 3);
        let mut handler = handler(main[..=10].to_vec());
        handler.handle_received(&received(&main[11])).unwrap();
        handler.handle_received(&received(&fork[0])).unwrap();

        let status = handler.status().unwrap();

        assert_eq!(status.phase, tributary_common::SyncPhase::Steady);
        assert_eq!(status.synced_height, 10);
        assert_eq!(status.highest_queued_height, 11);
        assert_eq!(status.segment_count, 1);
        assert_eq!(status.pending, vec![BlockSummary::from(&main[11])]);
        assert_eq!(status.branched, vec![BlockSummary::from(&fork[0])]);
    }
}
