//! Fork-choice engine for out-of-order block arrival.
//!
//! Holds the canonical queue (blocks believed to extend the durable chain,
//! awaiting validation and commit) and a pool of fork segments (contiguous
//! runs that do not currently extend the queue). Every block enters through
//! [`BlockCollection::add_pending_block`]; whenever the pool changes the engine
//! checks whether a segment should replace the canonical chain and, if so,
//! rolls storage back to the fork point.
//!
//! Chain selection: the first segment in pool order that can be spliced on
//! without a gap, attaches to a known parent and does not start with a
//! rejected block is checked out.

use std::collections::BTreeSet;

use tracing::{debug, info, trace, warn};
use tributary_common::{BlockHash, ChainId, MessageKind, SyncPhase, Transaction, ValidationResult};

use crate::{
    chain_segment::ChainSegment, chain_store::ChainStore, collection_error::CollectionError,
    pending_block::PendingBlock, production::BlockProduction,
};

/// Engine settings, fixed at construction.
#[derive(Debug, Clone)]
pub struct CollectionConfig {
    /// Blocks for any other chain are ignored.
    pub chain_id: ChainId,

    /// Blocks produced per consensus round. Forks starting this far below the
    /// canonical tip are pruned.
    pub round_window: u64,
}

/// The canonical pending-block queue plus the pool of candidate forks.
///
/// Single writer: callers serialise every mutating call per chain. Storage
/// calls block until they complete.
pub struct BlockCollection<S: ChainStore> {
    config: CollectionConfig,
    store: S,
    production: Box<dyn BlockProduction>,

    /// Canonical queue, sorted by height, unique by hash.
    pending_blocks: Vec<PendingBlock>,
    /// Fork pool in creation order; replacements keep their slot.
    segments: Vec<ChainSegment>,
    /// Highest height placed in the canonical queue.
    pending_block_height: u64,

    sync_phase: SyncPhase,
    /// Height of the first announced block seen during catch-up.
    target_height: Option<u64>,
    /// Heights queued during catch-up.
    catch_up_heights: BTreeSet<u64>,
    /// Durable height when the engine was built.
    height_before: u64,
}

impl<S: ChainStore> BlockCollection<S> {
    /// Create an engine on top of `store`, starting in initial catch-up.
    pub fn new(
        config: CollectionConfig,
        store: S,
        production: Box<dyn BlockProduction>,
    ) -> Result<Self, CollectionError> {
        let height_before = store.current_height()?;
        info!(
            chain = %config.chain_id,
            round_window = config.round_window,
            "Block collection starting at height {height_before}"
        );
        Ok(Self {
            config,
            store,
            production,
            pending_blocks: Vec::new(),
            segments: Vec::new(),
            pending_block_height: 0,
            sync_phase: SyncPhase::InitialCatchUp,
            target_height: None,
            catch_up_heights: BTreeSet::new(),
            height_before,
        })
    }

    /// Canonical queue in height order.
    pub fn pending_blocks(&self) -> &[PendingBlock] {
        &self.pending_blocks
    }

    /// Queued block with the given hash, if any.
    pub fn pending_block(&self, hash: &BlockHash) -> Option<&PendingBlock> {
        self.pending_blocks.iter().find(|b| b.hash() == *hash)
    }

    /// Every block held in fork segments, segment by segment.
    pub fn branched_pending_blocks(&self) -> Vec<PendingBlock> {
        self.segments.iter().flat_map(|s| s.blocks().iter().cloned()).collect()
    }

    pub fn segments(&self) -> &[ChainSegment] {
        &self.segments
    }

    /// Number of queued blocks.
    pub fn len(&self) -> usize {
        self.pending_blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending_blocks.is_empty()
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn pending_block_height(&self) -> u64 {
        self.pending_block_height
    }

    /// Height already durably committed.
    pub fn synced_height(&self) -> Result<u64, CollectionError> {
        Ok(self.store.current_height()?)
    }

    pub fn sync_phase(&self) -> SyncPhase {
        self.sync_phase
    }

    pub fn chain_store(&self) -> &S {
        &self.store
    }

    /// Mutable access for committing validated blocks.
    pub fn chain_store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    // ── Admission ─────────────────────────────────────────────────

    /// Admit a block from the network.
    ///
    /// Returns the transactions to replay if the block caused a switch to a
    /// fork, `None` otherwise. Only storage failures are errors.
    pub fn add_pending_block(
        &mut self,
        pending: PendingBlock,
    ) -> Result<Option<Vec<Transaction>>, CollectionError> {
        if pending.block.header.chain_id != self.config.chain_id {
            warn!(
                hash = %pending.hash(),
                chain = %pending.block.header.chain_id,
                "Ignoring block for another chain"
            );
            return Ok(None);
        }

        if self.contains(&pending.hash()) {
            trace!(hash = %pending.hash(), "Ignoring known block at {}", pending.height());
            return Ok(None);
        }

        if self.sync_phase == SyncPhase::InitialCatchUp && self.production.is_producing() {
            info!("Producing blocks locally, leaving initial catch-up");
            self.sync_phase = SyncPhase::Steady;
        }

        match self.sync_phase {
            SyncPhase::InitialCatchUp => self.add_during_catch_up(pending),
            SyncPhase::Steady => self.add_when_steady(pending),
        }
    }

    /// True if the hash is queued or held by any fork segment.
    fn contains(&self, hash: &BlockHash) -> bool {
        self.pending_blocks.iter().any(|b| b.hash() == *hash)
            || self.segments.iter().any(|s| s.contains(hash))
    }

    fn add_when_steady(
        &mut self,
        pending: PendingBlock,
    ) -> Result<Option<Vec<Transaction>>, CollectionError> {
        if self.extends_queue(&pending)? {
            self.push_pending(pending);
            return Ok(None);
        }

        trace!(
            hash = %pending.hash(),
            kind = ?pending.message_kind,
            "Block at {} does not extend the queue",
            pending.height()
        );
        self.integrate_into_segments(pending)
    }

    /// True if `pending` is the next canonical block: announced, and linked to
    /// the last queued block or, with an empty queue, to the durable head.
    fn extends_queue(&self, pending: &PendingBlock) -> Result<bool, CollectionError> {
        // Fetched blocks answer our own requests; they are no proof of progress
        if pending.message_kind == MessageKind::Fetched {
            return Ok(false);
        }

        match self.pending_blocks.last() {
            Some(last) => Ok(pending.is_child_of(last)),
            None => {
                let synced_height = self.store.current_height()?;
                Ok(synced_height.checked_add(1) == Some(pending.height())
                    && pending.previous_hash() == self.store.current_head_hash()?)
            }
        }
    }

    fn push_pending(&mut self, pending: PendingBlock) {
        self.pending_block_height = self.pending_block_height.max(pending.height());
        trace!(hash = %pending.hash(), "Queueing block at {}", pending.height());
        self.pending_blocks.push(pending);
        self.pending_blocks.sort_by_key(|b| b.height());
    }

    // ── Initial catch-up ──────────────────────────────────────────

    fn add_during_catch_up(
        &mut self,
        pending: PendingBlock,
    ) -> Result<Option<Vec<Transaction>>, CollectionError> {
        let height = pending.height();
        match pending.message_kind {
            MessageKind::Announced if self.target_height.is_none() && height > self.height_before => {
                self.target_height = Some(height);
                info!(
                    "Initial catch-up target height {height} (local height {})",
                    self.height_before
                );

                if self.height_before.checked_add(1) == Some(height) {
                    self.finish_catch_up();
                    return self.add_when_steady(pending);
                }

                self.record_catch_up(pending);
                Ok(None)
            }

            MessageKind::Fetched if self.accepts_during_catch_up(height) => {
                self.record_catch_up(pending);
                Ok(None)
            }

            _ => {
                trace!(
                    hash = %pending.hash(),
                    kind = ?pending.message_kind,
                    "Block at {height} does not fit initial catch-up"
                );
                self.integrate_into_segments(pending)
            }
        }
    }

    /// True if a fetched block at `height` fills a hole below the target.
    fn accepts_during_catch_up(&self, height: u64) -> bool {
        height > self.height_before
            && !matches!(self.target_height, Some(target) if height >= target)
            && !self.catch_up_heights.contains(&height)
            && !self.received_all_before_target()
    }

    fn record_catch_up(&mut self, pending: PendingBlock) {
        self.catch_up_heights.insert(pending.height());
        self.push_pending(pending);
        if self.received_all_before_target() {
            self.finish_catch_up();
        }
    }

    /// Every height from the pre-catch-up height up to the target has arrived.
    fn received_all_before_target(&self) -> bool {
        let Some(target) = self.target_height else {
            return false;
        };
        let received =
            self.catch_up_heights.range(self.height_before.saturating_add(1)..=target).count();
        received as u64 + self.height_before == target
    }

    fn finish_catch_up(&mut self) {
        info!(
            "Initial catch-up complete: local height {}, queued up to {}",
            self.height_before, self.pending_block_height
        );
        self.sync_phase = SyncPhase::Steady;
    }

    // ── Fork pool ─────────────────────────────────────────────────

    /// Height forks are measured against: the highest queued block, or the
    /// durable head before anything was queued.
    fn reference_height(&self) -> Result<u64, CollectionError> {
        if self.pending_block_height != 0 {
            Ok(self.pending_block_height)
        } else {
            self.synced_height()
        }
    }

    /// Place a block that does not extend the queue into the fork pool, then
    /// prune, merge and check whether a fork should become canonical.
    fn integrate_into_segments(
        &mut self,
        pending: PendingBlock,
    ) -> Result<Option<Vec<Transaction>>, CollectionError> {
        let reference_height = self.reference_height()?;
        let window = self.config.round_window;
        let height = pending.height();

        if height.saturating_add(window) < reference_height {
            debug!(
                hash = %pending.hash(),
                "Dropping stale block at {height}, reference height {reference_height}"
            );
            return Ok(None);
        }

        if self.segments.iter().any(|s| s.contains(&pending.hash())) {
            trace!(hash = %pending.hash(), "Block at {height} already in a fork segment");
            return Ok(None);
        }

        if self.segments.is_empty() {
            debug!(hash = %pending.hash(), "Starting first fork segment at {height}");
            self.segments.push(ChainSegment::new(pending));
            return Ok(None);
        }

        // Build the replacement pool, then swap it in
        let mut unplaced = Some(pending);
        let mut next = Vec::with_capacity(self.segments.len() + 1);
        for segment in std::mem::take(&mut self.segments) {
            match unplaced.take() {
                Some(block) if segment.is_preceded_by(&block) => {
                    debug!(hash = %block.hash(), "Prepending block at {height} to fork segment");
                    next.push(segment.prepend(block));
                }
                Some(block) if segment.is_followed_by(&block) => {
                    debug!(hash = %block.hash(), "Appending block at {height} to fork segment");
                    next.push(segment.append(block));
                }
                other => {
                    unplaced = other;
                    next.push(segment);
                }
            }
        }
        if let Some(block) = unplaced {
            debug!(hash = %block.hash(), "Starting fork segment at {height}");
            next.push(ChainSegment::new(block));
        }
        self.segments = next;

        self.prune_segments(reference_height);
        self.merge_adjacent_segments();
        trace!(
            segments = self.segments.len(),
            branched = ?self.segments.iter().map(|s| (s.start_height(), s.end_height())).collect::<Vec<_>>(),
            "Fork pool updated"
        );

        let Some(index) = self.find_reorg_target(reference_height)? else {
            return Ok(None);
        };
        self.checkout(index).map(Some)
    }

    /// Drop segments starting too far below the reference height to ever win.
    fn prune_segments(&mut self, reference_height: u64) {
        let window = self.config.round_window;
        let before = self.segments.len();
        self.segments.retain(|s| s.start_height().saturating_add(window) >= reference_height);
        let pruned = before - self.segments.len();
        if pruned > 0 {
            debug!("Pruned {pruned} fork segments below reference height {reference_height}");
        }
    }

    /// Join segments where one continues directly from another, until none do.
    fn merge_adjacent_segments(&mut self) {
        loop {
            let pair = self.segments.iter().enumerate().find_map(|(i, earlier)| {
                self.segments.iter().position(|later| earlier.is_continued_by(later)).map(|j| (i, j))
            });
            let Some((earlier_index, later_index)) = pair else {
                return;
            };

            let (low, high) = if earlier_index < later_index {
                (earlier_index, later_index)
            } else {
                (later_index, earlier_index)
            };
            let removed_high = self.segments.remove(high);
            let removed_low = self.segments.remove(low);
            let (earlier, later) = if earlier_index < later_index {
                (removed_low, removed_high)
            } else {
                (removed_high, removed_low)
            };

            debug!(
                "Merging fork segments {}..{} and {}..{}",
                earlier.start_height(),
                earlier.end_height(),
                later.start_height(),
                later.end_height()
            );
            self.segments.insert(low, ChainSegment::merge(earlier, later));
        }
    }

    /// First segment, in pool order, that can be spliced on at the reference
    /// height, is not led by a rejected block and attaches to a known parent.
    fn find_reorg_target(&self, reference_height: u64) -> Result<Option<usize>, CollectionError> {
        for (index, segment) in self.segments.iter().enumerate() {
            if segment.can_checkout(reference_height)
                && !segment.first().validation_result.is_failure()
                && self.attaches(segment)?
            {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    /// True if the segment's parent is the durable head or a queued block.
    /// Segments starting inside durable history are taken on trust; the
    /// validator rejects them if they do not link.
    fn attaches(&self, segment: &ChainSegment) -> Result<bool, CollectionError> {
        let synced_height = self.store.current_height()?;
        let start_height = segment.start_height();
        if start_height <= synced_height {
            return Ok(true);
        }
        if synced_height.checked_add(1) == Some(start_height) {
            return Ok(segment.first_previous_hash() == self.store.current_head_hash()?);
        }
        Ok(self.pending_blocks.iter().any(|b| segment.first().is_child_of(b)))
    }

    // ── Reorg ─────────────────────────────────────────────────────

    /// Make the segment at `index` canonical and roll storage back to its fork
    /// point.
    ///
    /// Nothing changes unless the rollback succeeds. Returns the transactions
    /// of every displaced block: durable ones from storage, then queued ones,
    /// in block order.
    fn checkout(&mut self, index: usize) -> Result<Vec<Transaction>, CollectionError> {
        let segment = &self.segments[index];
        let start_height = segment.start_height();
        let end_height = segment.end_height();
        let rollback_height = start_height
            .checked_sub(1)
            .ok_or(CollectionError::InvalidForkPoint { start_height })?;

        let synced_height = self.store.current_height()?;
        let (queue, displaced) = if synced_height < start_height {
            self.splice(segment)
        } else {
            (segment.blocks().to_vec(), self.pending_blocks.clone())
        };

        info!(
            fork = %segment.last_hash(),
            synced_height,
            "Switching to fork {start_height}..{end_height}, rolling back to {rollback_height}"
        );

        self.production.cancel_scheduled();
        let mut transactions = self.store.rollback_to(rollback_height).map_err(|source| {
            CollectionError::RollbackFailed {
                height: rollback_height,
                source,
            }
        })?;

        if !displaced.is_empty() {
            // Displaced blocks are not kept as a fork segment
            debug!(
                displaced = ?displaced.iter().map(|b| b.height()).collect::<Vec<_>>(),
                "Dropping queued blocks replaced by fork"
            );
        }

        self.segments.remove(index);
        self.pending_block_height = queue.last().map_or(end_height, |b| b.height());
        self.pending_blocks = queue;
        transactions.extend(displaced.into_iter().flat_map(|b| b.block.body.transactions));
        Ok(transactions)
    }

    /// Queue with `segment` spliced in above durable storage, plus the queued
    /// blocks it displaces.
    ///
    /// Blocks below the segment stay; blocks at its heights are replaced;
    /// blocks above it stay only while they still link to the new tail.
    fn splice(&self, segment: &ChainSegment) -> (Vec<PendingBlock>, Vec<PendingBlock>) {
        let start_height = segment.start_height();
        let end_height = segment.end_height();

        let mut queue: Vec<PendingBlock> =
            self.pending_blocks.iter().filter(|b| b.height() < start_height).cloned().collect();
        queue.extend(segment.blocks().iter().cloned());

        let mut displaced = Vec::new();
        for block in self.pending_blocks.iter().filter(|b| b.height() >= start_height) {
            let links_to_tail = queue.last().is_some_and(|tail| block.is_child_of(tail));
            if block.height() > end_height && links_to_tail {
                queue.push(block.clone());
            } else {
                displaced.push(block.clone());
            }
        }
        (queue, displaced)
    }

    // ── Removal after validation ──────────────────────────────────

    /// Take a queued block out once the validator has ruled on it.
    ///
    /// A valid block is simply removed. A rejected block is removed and moved
    /// to the fork pool, which can itself trigger a reorg. If the queue ends up
    /// empty it is refilled from a fork segment so sync keeps moving.
    pub fn remove_pending_block(
        &mut self,
        pending: PendingBlock,
    ) -> Result<Option<Vec<Transaction>>, CollectionError> {
        let hash = pending.hash();
        let transactions = match pending.validation_result {
            ValidationResult::Valid => {
                self.pending_blocks.retain(|b| b.hash() != hash);
                None
            }
            ValidationResult::Invalid(error) => {
                warn!(%hash, "Block at {} failed validation: {error}", pending.height());
                self.pending_blocks.retain(|b| b.hash() != hash);
                self.integrate_into_segments(pending)?
            }
            ValidationResult::Unvalidated => {
                warn!(%hash, "Ignoring removal of unvalidated block at {}", pending.height());
                return Ok(None);
            }
        };

        if self.pending_blocks.is_empty() && !self.segments.is_empty() {
            self.refill_from_segments();
        }
        Ok(transactions)
    }

    /// Move a fork segment into the empty queue: one that can be checked out
    /// at the queued height if possible, else the first one. Segments led by a
    /// rejected block are skipped.
    fn refill_from_segments(&mut self) {
        let usable = |s: &ChainSegment| !s.first().validation_result.is_failure();
        let index = self
            .segments
            .iter()
            .position(|s| usable(s) && s.can_checkout(self.pending_block_height))
            .or_else(|| self.segments.iter().position(usable));
        let Some(index) = index else {
            return;
        };

        let segment = self.segments.remove(index);
        debug!(
            "Refilling queue from fork segment {}..{}",
            segment.start_height(),
            segment.end_height()
        );
        self.pending_block_height = self.pending_block_height.max(segment.end_height());
        self.pending_blocks = segment.into_blocks();
    }
}
