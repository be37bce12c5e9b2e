//! `MainBlock`: header + ordered completed games, content-hashed and mined
//! under the main chain's proof-of-work.

use std::sync::atomic::AtomicBool;

use serde::{Deserialize, Serialize};

use crate::crypto;
use crate::game::Game;
use crate::pow::{self, BlockHeader};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MainBlock {
    pub index: u64,
    pub previous_hash: String,
    pub games: Vec<Game>,
    pub timestamp: i64,
    pub nonce: u64,
    pub hash: String,
    pub difficulty: u32,
}

impl MainBlock {
    fn header(&self) -> BlockHeader {
        BlockHeader {
            index: self.index,
            previous_hash: self.previous_hash.clone(),
            timestamp: self.timestamp,
            nonce: self.nonce,
        }
    }

    fn payload_canonical(&self) -> String {
        self.games.iter().map(|g| g.canonical_string()).collect()
    }

    pub fn new(index: u64, previous_hash: String, games: Vec<Game>) -> MainBlock {
        let header = BlockHeader::new(index, previous_hash);
        let payload: String = games.iter().map(|g| g.canonical_string()).collect();
        let hash = pow::compute_hash(&header, &payload);
        MainBlock {
            index: header.index,
            previous_hash: header.previous_hash,
            games,
            timestamp: header.timestamp,
            nonce: header.nonce,
            hash,
            difficulty: 0,
        }
    }

    /// The genesis block: `index=0`, `previousHash="0"`, no games.
    pub fn genesis() -> MainBlock {
        MainBlock::new(0, "0".to_string(), Vec::new())
    }

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

    pub fn recompute_hash(&self) -> String {
        pow::compute_hash(&self.header(), &self.payload_canonical())
    }

    pub fn has_valid_pow(&self) -> bool {
        self.hash == self.recompute_hash() && crypto::meets_difficulty(&self.hash, self.difficulty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_has_no_games() {
        let g = MainBlock::genesis();
        assert!(g.games.is_empty());
        assert_eq!(g.previous_hash, "0");
    }

    #[test]
    fn mined_block_satisfies_difficulty() {
        let mut b = MainBlock::new(1, MainBlock::genesis().hash, Vec::new());
        let running = AtomicBool::new(true);
        assert!(b.mine(3, &running));
        assert!(b.has_valid_pow());
    }
}
