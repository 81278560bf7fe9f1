//! Deterministic block and fork builders for Tributary tests.
//!
//! Every block is identified by a `(fork, height)` pair: the fork tag goes in
//! the first hash byte and the height in the next eight, so two forks never
//! collide and failing assertions print readable hashes.

use tributary_common::{
    Block, BlockBody, BlockHash, BlockHeader, ChainId, Transaction, TxHash,
};

/// Chain id used by all helpers
pub const TEST_CHAIN_ID: ChainId = ChainId::new([0x7a, 0x11, 0x00, 0x01]);

/// Fork tag of the canonical test chain
pub const MAIN: u8 = 0;

/// Hash of the block at `height` on fork `fork`.
pub fn block_hash(fork: u8, height: u64) -> BlockHash {
    let mut bytes = [0u8; 32];
    bytes[0] = fork;
    bytes[1..9].copy_from_slice(&height.to_be_bytes());
    BlockHash::new(bytes)
}

/// The single transaction carried by the block at `(fork, height)`.
pub fn block_tx(fork: u8, height: u64) -> Transaction {
    let mut bytes = *block_hash(fork, height);
    bytes[31] = 0xff;
    Transaction {
        hash: TxHash::new(bytes),
        raw: vec![fork, height as u8],
    }
}

/// Genesis block of the test chain at height 0.
pub fn genesis() -> Block {
    make_block(MAIN, 0, BlockHash::default())
}

/// A block on `fork` at `height` whose parent hash is `previous`.
pub fn make_block(fork: u8, height: u64, previous: BlockHash) -> Block {
    Block {
        header: BlockHeader {
            chain_id: TEST_CHAIN_ID,
            height,
            previous_hash: previous,
            hash: block_hash(fork, height),
            timestamp: height * 4_000,
        },
        body: BlockBody {
            transactions: vec![block_tx(fork, height)],
        },
    }
}

/// `count` linked blocks on `fork` following `parent`.
pub fn extend(parent: &Block, count: usize, fork: u8) -> Vec<Block> {
    let mut blocks: Vec<Block> = Vec::with_capacity(count);
    let mut previous = parent.header.hash;
    for i in 0..count as u64 {
        let block = make_block(fork, parent.header.height + 1 + i, previous);
        previous = block.header.hash;
        blocks.push(block);
    }
    blocks
}

/// Genesis plus `length` main-chain blocks, so `chain(n)[h]` is at height `h`.
pub fn chain(length: usize) -> Vec<Block> {
    let genesis = genesis();
    let mut blocks = vec![genesis.clone()];
    blocks.extend(extend(&genesis, length, MAIN));
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_is_linked() {
        let blocks = chain(5);
        assert_eq!(blocks.len(), 6);
        for pair in blocks.windows(2) {
            assert!(pair[1].is_child_of(&pair[0]));
        }
    }

    #[test]
    fn forks_do_not_collide() {
        let blocks = chain(3);
        let fork = extend(&blocks[1], 2, 7);
        assert_eq!(fork[0].header.height, 2);
        assert_ne!(fork[0].header.hash, blocks[2].header.hash);
        assert_eq!(fork[0].header.previous_hash, blocks[1].header.hash);
    }
}
