//! `Game`: the per-game inner blockchain.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{GameChainError, Result};
use crate::game_block::GameBlock;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Game {
    pub game_id: u64,
    pub players: [String; 2],
    pub chain: Vec<GameBlock>,
    pub winner_id: String,
    pub complete: bool,
    /// The chain length (including genesis) at which this game finalizes.
    /// Carried as policy rather than a literal.
    pub chain_length: usize,
}

impl Game {
    /// Constructs a game with only the genesis block. Rejects fewer than
    /// two players.
    pub fn new(players: Vec<String>, chain_length: usize) -> Result<Game> {
        if players.len() < 2 {
            return Err(GameChainError::InvalidInput(
                "at least two players are required to start a game".to_string(),
            ));
        }
        let game_id = rand::thread_rng().gen_range(0u64..1_000_000);
        Ok(Game {
            game_id,
            players: [players[0].clone(), players[1].clone()],
            chain: vec![GameBlock::genesis()],
            winner_id: String::new(),
            complete: false,
            chain_length,
        })
    }

    /// A game with no assigned players, used by `Player` as its idle
    /// state before a game starts and after one finishes. Bypasses the
    /// two-player check: it is never gossiped or finalized as-is.
    pub fn placeholder(chain_length: usize) -> Game {
        Game {
            game_id: 0,
            players: [String::new(), String::new()],
            chain: vec![GameBlock::genesis()],
            winner_id: String::new(),
            complete: false,
            chain_length,
        }
    }

    /// Appends a block. Callers must have already verified the link and
    /// PoW.
    pub fn add_block(&mut self, block: GameBlock) {
        self.chain.push(block);
    }

    pub fn last_block(&self) -> Result<&GameBlock> {
        self.chain
            .last()
            .ok_or_else(|| GameChainError::StateConflict("chain is empty".to_string()))
    }

    /// Whether the chain has reached the termination length and is ready
    /// to be finalized.
    pub fn is_ready_to_finalize(&self) -> bool {
        self.chain.len() == self.chain_length
    }

    /// Idempotent-by-guard finalization: a no-op with a
    /// warning if already ended; sets `complete`/`winnerId` if the chain
    /// has reached its termination length; otherwise a no-op with a
    /// warning.
    pub fn end_game(&mut self) {
        if !self.winner_id.is_empty() {
            log::warn!("game {} already ended", self.game_id);
            return;
        }
        if self.chain.len() == self.chain_length {
            match self.chain.last().and_then(|b| b.moves.first()) {
                Some(first_move) => {
                    self.winner_id = first_move.receiver.clone();
                    self.complete = true;
                    log::info!(
                        "game {} ended, winner {}",
                        self.game_id,
                        self.winner_id
                    );
                }
                None => {
                    log::warn!(
                        "game {} reached termination length with no moves in the final block",
                        self.game_id
                    );
                }
            }
        } else {
            log::warn!(
                "game {} has {} blocks, not ready to end",
                self.game_id,
                self.chain.len()
            );
        }
    }

    /// The canonical string embedded wherever a completed `Game` appears
    /// in a `MainBlock`'s hash input. The per-block hashes already commit
    /// to every move via the PoW chain, so folding them in is sufficient
    /// to make two distinct games hash differently.
    pub fn canonical_string(&self) -> String {
        let mut s = String::new();
        s.push_str(&self.game_id.to_string());
        s.push_str(&self.players[0]);
        s.push_str(&self.players[1]);
        s.push_str(&self.winner_id);
        s.push_str(if self.complete { "1" } else { "0" });
        for b in &self.chain {
            s.push_str(&b.hash);
        }
        s
    }

    /// Checks chain linkage plus PoW and move verification, link-by-link.
    pub fn is_internally_consistent(&self) -> bool {
        if self.chain.is_empty() || self.chain[0].index != 0 || self.chain[0].previous_hash != "0"
        {
            return false;
        }
        for i in 1..self.chain.len() {
            if self.chain[i].previous_hash != self.chain[i - 1].hash {
                return false;
            }
        }
        self.chain.iter().all(|b| b.has_valid_pow())
            && self
                .chain
                .iter()
                .skip(1)
                .flat_map(|b| b.moves.iter())
                .all(|m| m.is_valid())
    }
}

impl fmt::Display for Game {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Game ID: {}", self.game_id)?;
        writeln!(f, "Players: {} {}", self.players[0], self.players[1])?;
        writeln!(
            f,
            "Winner ID: {}",
            if self.winner_id.is_empty() {
                "None"
            } else {
                &self.winner_id
            }
        )?;
        writeln!(f, "Game Complete: {}", if self.complete { "Yes" } else { "No" })?;
        writeln!(f, "Chain Size: {}", self.chain.len())?;
        writeln!(f, "Moves:")?;
        for block in &self.chain {
            for mv in &block.moves {
                writeln!(f, "  Sender: {}, Receiver: {}, Move: {}", mv.sender, mv.receiver, mv.data)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto;
    use crate::mv::Move;
    use std::sync::atomic::AtomicBool;

    fn player_id() -> String {
        crypto::public_key_to_pem(&crypto::generate().public)
    }

    #[test]
    fn rejects_fewer_than_two_players() {
        let err = Game::new(vec![player_id()], 3);
        assert!(err.is_err());
    }

    #[test]
    fn genesis_only_is_not_ready() {
        let g = Game::new(vec![player_id(), player_id()], 3).unwrap();
        assert!(!g.is_ready_to_finalize());
        assert!(!g.complete);
    }

    #[test]
    fn end_game_on_wrong_length_is_noop() {
        let mut g = Game::new(vec![player_id(), player_id()], 3).unwrap();
        g.end_game();
        assert!(!g.complete);
        assert_eq!(g.winner_id, "");
    }

    #[test]
    fn finalizes_at_termination_length() {
        let p1 = crypto::generate();
        let p2 = crypto::generate();
        let p1_pem = crypto::public_key_to_pem(&p1.public);
        let p2_pem = crypto::public_key_to_pem(&p2.public);
        let mut g = Game::new(vec![p1_pem.clone(), p2_pem.clone()], 3).unwrap();
        let running = AtomicBool::new(true);

        let mut mv1 = Move::new(p1_pem.clone(), p2_pem.clone(), "e4".to_string());
        mv1.sign(&p1);
        let mut b1 = GameBlock::new(1, g.last_block().unwrap().hash.clone(), vec![mv1]);
        b1.mine(1, &running);
        g.add_block(b1);

        let mut mv2 = Move::new(p2_pem.clone(), p1_pem.clone(), "e5".to_string());
        mv2.sign(&p2);
        let mut b2 = GameBlock::new(2, g.last_block().unwrap().hash.clone(), vec![mv2]);
        b2.mine(1, &running);
        g.add_block(b2);

        assert!(g.is_ready_to_finalize());
        g.end_game();
        assert!(g.complete);
        assert_eq!(g.winner_id, p1_pem);
        assert!(g.is_internally_consistent());
    }
}
