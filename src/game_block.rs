//! `GameBlock`: header + ordered moves, content-hashed and mined under
//! proof-of-work.

use std::sync::atomic::AtomicBool;

use serde::{Deserialize, Serialize};

use crate::crypto;
use crate::mv::Move;
use crate::pow::{self, BlockHeader};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameBlock {
    pub index: u64,
    pub previous_hash: String,
    pub moves: Vec<Move>,
    pub timestamp: i64,
    pub nonce: u64,
    pub hash: String,
    pub difficulty: u32,
}

impl GameBlock {
    fn header(&self) -> BlockHeader {
        BlockHeader {
            index: self.index,
            previous_hash: self.previous_hash.clone(),
            timestamp: self.timestamp,
            nonce: self.nonce,
        }
    }

    fn payload_canonical(&self) -> String {
        self.moves.iter().map(|m| m.canonical_string()).collect()
    }

    /// Constructs a block with `nonce=0` and a provisional hash; the block
    /// is not yet mined (`difficulty=0`) until `mine` is called.
    pub fn new(index: u64, previous_hash: String, moves: Vec<Move>) -> GameBlock {
        let header = BlockHeader::new(index, previous_hash);
        let payload: String = moves.iter().map(|m| m.canonical_string()).collect();
        let hash = pow::compute_hash(&header, &payload);
        GameBlock {
            index: header.index,
            previous_hash: header.previous_hash,
            moves,
            timestamp: header.timestamp,
            nonce: header.nonce,
            hash,
            difficulty: 0,
        }
    }

    /// The genesis block: `index=0`, `previousHash="0"`, empty moves.
    /// Trivially mined since difficulty 0 is satisfied unconditionally.
    pub fn genesis() -> GameBlock {
        GameBlock::new(0, "0".to_string(), Vec::new())
    }

    /// Sets `difficulty`, then searches for a nonce whose hash has that
    /// many leading hex zeros. Returns `false` if cancelled via `running`
    /// before a solution was found.
    pub fn mine(&mut self, difficulty: u32, running: &AtomicBool) -> bool {
        self.difficulty = difficulty;
        let mut header = self.header();
        let payload = self.payload_canonical();
        match pow::mine(&mut header, &payload, difficulty, running) {
            Some(hash) => {
                self.nonce = header.nonce;
                self.hash = hash;
                true
            }
            None => {
                self.nonce = header.nonce;
                false
            }
        }
    }

    /// Recomputes the hash from the block's current fields.
    pub fn recompute_hash(&self) -> String {
        pow::compute_hash(&self.header(), &self.payload_canonical())
    }

    /// Checks that the stored hash matches the recomputed
    /// digest and satisfies the difficulty prefix.
    pub fn has_valid_pow(&self) -> bool {
        self.hash == self.recompute_hash() && crypto::meets_difficulty(&self.hash, self.difficulty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_block_has_index_zero_and_no_moves() {
        let g = GameBlock::genesis();
        assert_eq!(g.index, 0);
        assert_eq!(g.previous_hash, "0");
        assert!(g.moves.is_empty());
        assert!(g.has_valid_pow());
    }

    #[test]
    fn mined_block_satisfies_difficulty() {
        let mut b = GameBlock::new(1, GameBlock::genesis().hash, Vec::new());
        let running = AtomicBool::new(true);
        assert!(b.mine(3, &running));
        assert!(b.has_valid_pow());
    }

    #[test]
    fn tampering_breaks_hash_invariant() {
        let mut b = GameBlock::new(1, "0".to_string(), Vec::new());
        let running = AtomicBool::new(true);
        b.mine(2, &running);
        b.nonce += 1;
        assert!(!b.has_valid_pow());
    }
}
