//! `MainNode`: ingests completed games from `Player`s, mines them into the
//! global `MainChain`, and gossips blocks to peer main nodes
//! over its own thread.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, Weak};

use rand::Rng;

use crate::config::ChainConfig;
use crate::game::Game;
use crate::journal::Journal;
use crate::main_block::MainBlock;
use crate::main_chain::MainChain;

struct MainNodeState {
    chain: MainChain,
    peers: Vec<Weak<MainNode>>,
    pending_games: VecDeque<Game>,
}

/// A global-chain node. Owns a `MainChain`, gossips `MainBlock`s to other
/// main nodes, and accepts completed `Game`s from `Player`s. Fork policy
/// is append-only: a block whose `previousHash` doesn't match the local
/// tip is rejected outright, there is no reorg.
pub struct MainNode {
    pub node_id: String,
    config: ChainConfig,
    journal: Arc<dyn Journal>,
    running: AtomicBool,
    state: Mutex<MainNodeState>,
    cv: Condvar,
}

fn dedup_identity(game: &Game) -> (u64, [String; 2], String, bool) {
    (game.game_id, game.players.clone(), game.winner_id.clone(), game.complete)
}

impl MainNode {
    /// Mode B: a joining node, allocating a fresh chain. Connect at least
    /// one peer with `connect_peer` and call `sync_peers` afterward to
    /// adopt the network's existing chain before starting `run`.
    pub fn new(config: ChainConfig, journal: Arc<dyn Journal>) -> Arc<MainNode> {
        Self::with_chain(MainChain::new(), config, journal)
    }

    /// Mode A: a seed node binding to a given, possibly
    /// externally-constructed `MainChain` rather than starting fresh, and
    /// persisting its genesis block to the journal.
    pub fn with_chain(chain: MainChain, config: ChainConfig, journal: Arc<dyn Journal>) -> Arc<MainNode> {
        let node_id = rand::thread_rng()
            .gen_range(1_000_000_000u64..10_000_000_000u64)
            .to_string();
        let genesis = chain.chain[0].clone();
        let node = Arc::new(MainNode {
            node_id,
            config,
            journal,
            running: AtomicBool::new(true),
            state: Mutex::new(MainNodeState {
                chain,
                peers: Vec::new(),
                pending_games: VecDeque::new(),
            }),
            cv: Condvar::new(),
        });
        node.journal.record_main_block(&node.node_id, &genesis);
        node
    }

    // -- Connection graph ------------------------------------------------

    fn add_peer_one_way(self: &Arc<MainNode>, peer: &Arc<MainNode>) -> bool {
        let mut state = self.state.lock().unwrap();
        let already = state
            .peers
            .iter()
            .any(|w| w.upgrade().map(|p| Arc::ptr_eq(&p, peer)).unwrap_or(false));
        if already {
            return false;
        }
        state.peers.push(Arc::downgrade(peer));
        true
    }

    pub fn connect_peer(self: &Arc<MainNode>, peer: &Arc<MainNode>) {
        if Arc::ptr_eq(self, peer) {
            log::warn!("main node {} refused to connect to itself", self.node_id);
            return;
        }
        if self.add_peer_one_way(peer) {
            peer.add_peer_one_way(self);
        }
    }

    fn snapshot_peers(&self) -> Vec<Arc<MainNode>> {
        let state = self.state.lock().unwrap();
        state.peers.iter().filter_map(|w| w.upgrade()).collect()
    }

    /// A locked read of this node's chain, consulted by a peer's
    /// `sync_peers` (mode B joiner) without racing local mutation.
    pub fn snapshot_chain(&self) -> MainChain {
        self.state.lock().unwrap().chain.clone()
    }

    /// Mode B: adopts the longest chain among already-connected peers.
    /// Call after connecting at least one peer and before `run`.
    pub fn sync_peers(self: &Arc<MainNode>) {
        for peer in self.snapshot_peers() {
            let peer_chain = peer.snapshot_chain();
            let mut state = self.state.lock().unwrap();
            if peer_chain.chain.len() > state.chain.chain.len() {
                state.chain = peer_chain;
                log::info!("main node {} synced chain from peer", self.node_id);
            }
        }
    }

    pub fn ratings(&self) -> std::collections::BTreeMap<String, f64> {
        self.state.lock().unwrap().chain.ratings().clone()
    }

    pub fn pending_game_count(&self) -> usize {
        self.state.lock().unwrap().pending_games.len()
    }

    // -- Game ingestion ---------------------------------------------------

    /// Accepts a completed game from a `Player` or gossiping peer, dedups
    /// it against the chain and the pending queue, and forwards it on.
    pub fn add_transaction(self: &Arc<MainNode>, game: Game, from_peer: Option<&str>) {
        if !game.complete || !game.is_internally_consistent() {
            log::warn!("main node {} rejected an invalid completed game", self.node_id);
            return;
        }
        let key = dedup_identity(&game);
        let is_dup = {
            let mut state = self.state.lock().unwrap();
            let dup = state.chain.contains_game(&key)
                || state.pending_games.iter().any(|g| dedup_identity(g) == key);
            if !dup {
                state.pending_games.push_back(game.clone());
            }
            dup
        };
        if is_dup {
            log::debug!("main node {} dropped duplicate game {}", self.node_id, game.game_id);
            return;
        }
        self.cv.notify_all();
        self.broadcast_transaction(&game, from_peer);
    }

    fn broadcast_transaction(self: &Arc<MainNode>, game: &Game, skip_node_id: Option<&str>) {
        for peer in self.snapshot_peers() {
            if Some(peer.node_id.as_str()) == skip_node_id {
                continue;
            }
            peer.add_transaction(game.clone(), Some(self.node_id.as_str()));
        }
    }

    fn broadcast_block(self: &Arc<MainNode>, block: &MainBlock, skip_node_id: Option<&str>) {
        for peer in self.snapshot_peers() {
            if Some(peer.node_id.as_str()) == skip_node_id {
                continue;
            }
            peer.receive_block(block.clone(), self.node_id.clone());
        }
    }

    fn verify_new_block(&self, chain: &MainChain, block: &MainBlock) -> bool {
        let tip = match chain.last_block() {
            Ok(b) => b,
            Err(_) => return false,
        };
        if block.previous_hash != tip.hash
            || !block.has_valid_pow()
            || !crate::crypto::meets_difficulty(&block.hash, self.config.main_difficulty)
        {
            return false;
        }
        block
            .games
            .iter()
            .all(|g| g.complete && g.is_internally_consistent() && !chain.contains_game(&dedup_identity(g)))
    }

    /// Ingests a block gossiped by a peer main node: rejects by-hash
    /// duplicates and invalid links/PoW/games, otherwise appends and
    /// forwards on (no reorg: non-matching links are rejected outright).
    pub fn receive_block(self: &Arc<MainNode>, block: MainBlock, from_peer: String) {
        enum Outcome {
            Duplicate,
            Invalid,
            Applied,
        }

        let outcome = {
            let mut state = self.state.lock().unwrap();
            if state.chain.contains_hash(&block.hash) {
                Outcome::Duplicate
            } else if !self.verify_new_block(&state.chain, &block) {
                Outcome::Invalid
            } else {
                state.chain.add_block(block.clone());
                let keys: Vec<_> = block.games.iter().map(dedup_identity).collect();
                state
                    .pending_games
                    .retain(|g| !keys.contains(&dedup_identity(g)));
                Outcome::Applied
            }
        };

        match outcome {
            Outcome::Duplicate => {
                log::debug!("main node {} dropped duplicate block {}", self.node_id, block.hash)
            }
            Outcome::Invalid => {
                log::warn!("main node {} rejected an invalid block", self.node_id)
            }
            Outcome::Applied => {
                self.journal.record_main_block(&self.node_id, &block);
                self.broadcast_block(&block, Some(&from_peer));
            }
        }
    }

    /// The mining loop: waits for at least one pending game, mines a
    /// block over up to `games_per_main_block` of them, verifies,
    /// appends, and gossips. Runs until `stop` is called.
    pub fn run(self: &Arc<MainNode>) {
        while self.running.load(Ordering::SeqCst) {
            let (index, previous_hash, games) = {
                let guard = self.state.lock().unwrap();
                let (guard, _) = self
                    .cv
                    .wait_timeout_while(guard, self.config.mining_poll_interval, |s| {
                        self.running.load(Ordering::SeqCst) && s.pending_games.is_empty()
                    })
                    .unwrap();
                if !self.running.load(Ordering::SeqCst) {
                    return;
                }
                if guard.pending_games.is_empty() {
                    continue;
                }
                let mut guard = guard;
                let take = self.config.games_per_main_block.min(guard.pending_games.len());
                let games: Vec<Game> = guard.pending_games.drain(..take).collect();
                let tip = guard.chain.last_block().unwrap().hash.clone();
                let index = guard.chain.chain.len() as u64;
                (index, tip, games)
            };

            let mut block = MainBlock::new(index, previous_hash, games);
            if !block.mine(self.config.main_difficulty, &self.running) {
                return;
            }

            {
                let mut state = self.state.lock().unwrap();
                if !self.verify_new_block(&state.chain, &block) {
                    log::warn!("main node {} mined an invalid block, discarding", self.node_id);
                    continue;
                }
                state.chain.add_block(block.clone());
            }

            self.journal.record_main_block(&self.node_id, &block);
            self.broadcast_block(&block, None);
        }
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.cv.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::NullJournal;
    use crate::crypto;

    fn node() -> Arc<MainNode> {
        MainNode::new(ChainConfig::default(), Arc::new(NullJournal))
    }

    fn completed_game() -> Game {
        let a = crypto::public_key_to_pem(&crypto::generate().public);
        let b = crypto::public_key_to_pem(&crypto::generate().public);
        let mut g = Game::new(vec![a.clone(), b], 3).unwrap();
        g.complete = true;
        g.winner_id = a;
        g
    }

    #[test]
    fn connect_peer_is_symmetric() {
        let a = node();
        let b = node();
        a.connect_peer(&b);
        assert_eq!(a.snapshot_peers().len(), 1);
        assert_eq!(b.snapshot_peers().len(), 1);
    }

    #[test]
    fn add_transaction_rejects_incomplete_games() {
        let n = node();
        let a = crypto::public_key_to_pem(&crypto::generate().public);
        let b = crypto::public_key_to_pem(&crypto::generate().public);
        let g = Game::new(vec![a, b], 3).unwrap();
        n.add_transaction(g, None);
        assert_eq!(n.snapshot_chain().chain.len(), 1);
    }

    #[test]
    fn duplicate_transaction_is_dropped() {
        let a = node();
        let b = node();
        a.connect_peer(&b);
        let g = completed_game();
        a.add_transaction(g.clone(), None);
        a.add_transaction(g, None);
        assert_eq!(a.pending_game_count(), 1);
        assert_eq!(b.pending_game_count(), 1);
    }
}
