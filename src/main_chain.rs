//! `MainChain`: the global blockchain of `MainBlock`s plus the derived
//! rating ledger.

use std::collections::BTreeMap;

use crate::error::{GameChainError, Result};
use crate::main_block::MainBlock;

#[derive(Debug, Clone)]
pub struct MainChain {
    pub chain: Vec<MainBlock>,
    rating: BTreeMap<String, f64>,
}

impl MainChain {
    pub fn new() -> MainChain {
        MainChain {
            chain: vec![MainBlock::genesis()],
            rating: BTreeMap::new(),
        }
    }

    pub fn last_block(&self) -> Result<&MainBlock> {
        self.chain
            .last()
            .ok_or_else(|| GameChainError::StateConflict("chain is empty".to_string()))
    }

    /// Appends a block, updating the rating ledger first so the two stay
    /// consistent. Callers must have already verified the
    /// block; this is the sole entry point that mutates `rating`.
    pub fn add_block(&mut self, block: MainBlock) {
        self.update_rating(&block);
        self.chain.push(block);
    }

    fn update_rating(&mut self, block: &MainBlock) {
        for game in &block.games {
            if !game.complete {
                continue;
            }
            let [a, b] = game.players.clone();
            if game.winner_id == a {
                *self.rating.entry(a).or_insert(0.0) += 1.0;
                *self.rating.entry(b).or_insert(0.0) -= 1.0;
            } else {
                *self.rating.entry(a).or_insert(0.0) -= 1.0;
                *self.rating.entry(b).or_insert(0.0) += 1.0;
            }
        }
    }

    /// The rating of a player, defaulting to 0 for unseen keys.
    pub fn get_rating(&self, player: &str) -> f64 {
        *self.rating.get(player).unwrap_or(&0.0)
    }

    pub fn ratings(&self) -> &BTreeMap<String, f64> {
        &self.rating
    }

    /// Whether any block in the chain already carries a game with this
    /// `(gameId, players, winnerId, complete)` identity — used to enforce
    /// that a completed game appears in at most one `MainBlock`, across
    /// nodes that may see duplicate blocks.
    pub fn contains_game(&self, key: &(u64, [String; 2], String, bool)) -> bool {
        self.chain.iter().skip(1).any(|b| {
            b.games.iter().any(|g| {
                (g.game_id, g.players.clone(), g.winner_id.clone(), g.complete) == *key
            })
        })
    }

    pub fn contains_hash(&self, hash: &str) -> bool {
        self.chain.iter().any(|b| b.hash == hash)
    }
}

impl Default for MainChain {
    fn default() -> Self {
        MainChain::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::Game;

    fn completed_game(winner_is_first: bool) -> Game {
        let a = "playerA".to_string();
        let b = "playerB".to_string();
        let mut g = Game::new(vec![a.clone(), b.clone()], 3).unwrap();
        g.complete = true;
        g.winner_id = if winner_is_first { a } else { b };
        g
    }

    #[test]
    fn rating_updates_symmetrically() {
        let mut chain = MainChain::new();
        let block = MainBlock::new(1, chain.last_block().unwrap().hash.clone(), vec![completed_game(true)]);
        chain.add_block(block);
        assert_eq!(chain.get_rating("playerA"), 1.0);
        assert_eq!(chain.get_rating("playerB"), -1.0);
    }

    #[test]
    fn unknown_player_defaults_to_zero() {
        let chain = MainChain::new();
        assert_eq!(chain.get_rating("nobody"), 0.0);
    }

    #[test]
    fn duplicate_block_detection_by_hash() {
        let mut chain = MainChain::new();
        let block = MainBlock::new(1, chain.last_block().unwrap().hash.clone(), vec![completed_game(true)]);
        let hash = block.hash.clone();
        chain.add_block(block);
        assert!(chain.contains_hash(&hash));
    }
}
