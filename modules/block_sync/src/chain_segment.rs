//! A contiguous run of pending blocks: one candidate fork.

use tributary_common::BlockHash;

use crate::pending_block::PendingBlock;

/// An ordered, contiguous run of pending blocks.
///
/// Blocks are strictly increasing by height and each one's previous hash is
/// the hash of the block before it. A segment is never empty. Both properties
/// are enforced whenever a segment is built or grown; a broken link is a bug
/// in the caller's routing and panics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainSegment {
    blocks: Vec<PendingBlock>,
}

impl ChainSegment {
    /// Single-block segment.
    pub fn new(block: PendingBlock) -> Self {
        Self {
            blocks: vec![block],
        }
    }

    /// Segment from an already ordered run.
    ///
    /// # Panics
    ///
    /// If `blocks` is empty or not contiguous.
    pub fn from_blocks(blocks: Vec<PendingBlock>) -> Self {
        assert!(!blocks.is_empty(), "chain segment cannot be empty");
        for pair in blocks.windows(2) {
            assert!(
                pair[1].is_child_of(&pair[0]),
                "block {} at {} does not follow {} at {}",
                pair[1].hash(),
                pair[1].height(),
                pair[0].hash(),
                pair[0].height()
            );
        }
        Self { blocks }
    }

    pub fn first(&self) -> &PendingBlock {
        &self.blocks[0]
    }

    pub fn last(&self) -> &PendingBlock {
        &self.blocks[self.blocks.len() - 1]
    }

    pub fn start_height(&self) -> u64 {
        self.first().height()
    }

    pub fn end_height(&self) -> u64 {
        self.last().height()
    }

    /// Hash the first block builds on; where this fork attaches.
    pub fn first_previous_hash(&self) -> BlockHash {
        self.first().previous_hash()
    }

    pub fn last_hash(&self) -> BlockHash {
        self.last().hash()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn blocks(&self) -> &[PendingBlock] {
        &self.blocks
    }

    pub fn into_blocks(self) -> Vec<PendingBlock> {
        self.blocks
    }

    pub fn contains(&self, hash: &BlockHash) -> bool {
        self.blocks.iter().any(|b| b.hash() == *hash)
    }

    /// True if the segment can be spliced onto a chain whose tip is at
    /// `reference_height` without leaving a gap.
    pub fn can_checkout(&self, reference_height: u64) -> bool {
        self.start_height() <= reference_height.saturating_add(1)
    }

    /// True if `block` is the parent of this segment's first block.
    pub fn is_preceded_by(&self, block: &PendingBlock) -> bool {
        self.first().is_child_of(block)
    }

    /// True if `block` is the child of this segment's last block.
    pub fn is_followed_by(&self, block: &PendingBlock) -> bool {
        block.is_child_of(self.last())
    }

    /// True if `later` continues directly from this segment's tail.
    pub fn is_continued_by(&self, later: &ChainSegment) -> bool {
        later.first().is_child_of(self.last())
    }

    /// This segment with `block` in front.
    ///
    /// # Panics
    ///
    /// If `block` is not the parent of the current first block.
    pub fn prepend(self, block: PendingBlock) -> Self {
        assert!(
            self.is_preceded_by(&block),
            "cannot prepend {} at {} to segment starting {} at {}",
            block.hash(),
            block.height(),
            self.first().hash(),
            self.start_height()
        );
        let mut blocks = Vec::with_capacity(self.blocks.len() + 1);
        blocks.push(block);
        blocks.extend(self.blocks);
        Self { blocks }
    }

    /// This segment with `block` at the end.
    ///
    /// # Panics
    ///
    /// If `block` is not the child of the current last block.
    pub fn append(mut self, block: PendingBlock) -> Self {
        assert!(
            self.is_followed_by(&block),
            "cannot append {} at {} to segment ending {} at {}",
            block.hash(),
            block.height(),
            self.last_hash(),
            self.end_height()
        );
        self.blocks.push(block);
        self
    }

    /// Concatenate two segments where `later` continues from `earlier`.
    ///
    /// # Panics
    ///
    /// If `later` does not start on `earlier`'s last block.
    pub fn merge(earlier: ChainSegment, later: ChainSegment) -> Self {
        assert!(
            earlier.is_continued_by(&later),
            "segment ending {} at {} is not continued by segment starting at {}",
            earlier.last_hash(),
            earlier.end_height(),
            later.start_height()
        );
        let mut blocks = earlier.blocks;
        blocks.extend(later.blocks);
        Self { blocks }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tributary_test_utils::{chain, extend};

    fn pending(blocks: &[tributary_common::Block]) -> Vec<PendingBlock> {
        blocks.iter().cloned().map(PendingBlock::announced).collect()
    }

    #[test]
    fn bounds_and_endpoints() {
        let main = chain(5);
        let segment = ChainSegment::from_blocks(pending(&main[2..5]));

        assert_eq!(segment.start_height(), 2);
        assert_eq!(segment.end_height(), 4);
        assert_eq!(segment.first_previous_hash(), main[1].hash());
        assert_eq!(segment.last_hash(), main[4].hash());
        assert_eq!(segment.len(), 3);
        assert!(segment.contains(&main[3].hash()));
        assert!(!segment.contains(&main[5].hash()));
    }

    #[test]
    fn can_checkout_allows_next_height_only() {
        let main = chain(12);
        let segment = ChainSegment::new(PendingBlock::announced(main[11].clone()));

        assert!(segment.can_checkout(10));
        assert!(segment.can_checkout(11));
        assert!(segment.can_checkout(30));
        assert!(!segment.can_checkout(9));
    }

    #[test]
    fn prepend_and_append_grow_both_ends() {
        let main = chain(6);
        let blocks = pending(&main);

        let segment = ChainSegment::new(blocks[3].clone())
            .prepend(blocks[2].clone())
            .append(blocks[4].clone())
            .append(blocks[5].clone());

        assert_eq!(segment.start_height(), 2);
        assert_eq!(segment.end_height(), 5);
        assert_eq!(segment.blocks().iter().map(|b| b.height()).collect::<Vec<_>>(), vec![2, 3, 4, 5]);
    }

    #[test]
    fn merge_concatenates_linked_segments() {
        let main = chain(9);
        let blocks = pending(&main);
        let earlier = ChainSegment::from_blocks(blocks[1..6].to_vec());
        let later = ChainSegment::from_blocks(blocks[6..10].to_vec());

        assert!(earlier.is_continued_by(&later));
        let merged = ChainSegment::merge(earlier, later);
        assert_eq!(merged.start_height(), 1);
        assert_eq!(merged.end_height(), 9);
        assert_eq!(merged.len(), 9);
    }

    #[test]
    #[should_panic(expected = "cannot append")]
    fn append_rejects_unlinked_block() {
        let main = chain(4);
        let fork = extend(&main[1], 3, 9);
        let segment = ChainSegment::new(PendingBlock::announced(main[2].clone()));
        // Right height, wrong parent
        let _ = segment.append(PendingBlock::announced(fork[1].clone()));
    }

    #[test]
    #[should_panic(expected = "cannot prepend")]
    fn prepend_rejects_wrong_height() {
        let main = chain(4);
        let segment = ChainSegment::new(PendingBlock::announced(main[3].clone()));
        let _ = segment.prepend(PendingBlock::announced(main[1].clone()));
    }

    #[test]
    #[should_panic(expected = "is not continued by")]
    fn merge_rejects_gap() {
        let main = chain(6);
        let blocks = pending(&main);
        let _ = ChainSegment::merge(
            ChainSegment::from_blocks(blocks[1..3].to_vec()),
            ChainSegment::from_blocks(blocks[4..6].to_vec()),
        );
    }

    #[test]
    #[should_panic(expected = "cannot be empty")]
    fn empty_segment_is_rejected() {
        let _ = ChainSegment::from_blocks(Vec::new());
    }
}
