//! `Player`: a node that plays one game at a time over its own inner
//! chain, gossips moves and blocks to peer players, and forwards
//! completed games to connected `MainNode`s.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, Weak};

use ed25519_dalek::Keypair;

use crate::config::ChainConfig;
use crate::crypto;
use crate::error::{GameChainError, Result};
use crate::game::Game;
use crate::game_block::GameBlock;
use crate::journal::Journal;
use crate::main_node::MainNode;
use crate::mv::Move;

struct PlayerState {
    blockchain: Game,
    opponent: Option<Weak<Player>>,
    peers: Vec<Weak<Player>>,
    main_nodes: Vec<Weak<MainNode>>,
    pending_moves: VecDeque<Move>,
    completed_games: VecDeque<Game>,
}

/// A player node. Holds its own key material and a single mutex guarding
/// all mutable state; peers are weak collaborator references, not owned
/// by this node.
pub struct Player {
    pub public_key: String,
    keypair: Keypair,
    pub node_id: String,
    config: ChainConfig,
    journal: Arc<dyn Journal>,
    running: AtomicBool,
    state: Mutex<PlayerState>,
    cv: Condvar,
}

impl Player {
    pub fn new(config: ChainConfig, journal: Arc<dyn Journal>) -> Arc<Player> {
        let keypair = crypto::generate();
        let public_key = crypto::public_key_to_pem(&keypair.public);
        let node_id = crypto::node_id_from_pem(&public_key);
        let state = PlayerState {
            blockchain: Game::placeholder(config.game_chain_length),
            opponent: None,
            peers: Vec::new(),
            main_nodes: Vec::new(),
            pending_moves: VecDeque::new(),
            completed_games: VecDeque::new(),
        };
        Arc::new(Player {
            public_key,
            keypair,
            node_id,
            config,
            journal,
            running: AtomicBool::new(true),
            state: Mutex::new(state),
            cv: Condvar::new(),
        })
    }

    // -- Connection graph ---------------------------------------------

    fn add_peer_one_way(self: &Arc<Player>, peer: &Arc<Player>) -> bool {
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

    /// Connects two player nodes symmetrically. Idempotent and rejects
    /// self-connection.
    pub fn connect_peer(self: &Arc<Player>, peer: &Arc<Player>) {
        if Arc::ptr_eq(self, peer) {
            log::warn!("player {} refused to connect to itself", self.node_id);
            return;
        }
        if self.add_peer_one_way(peer) {
            peer.add_peer_one_way(self);
        }
    }

    pub fn connect_node(self: &Arc<Player>, node: &Arc<MainNode>) {
        let mut state = self.state.lock().unwrap();
        let already = state
            .main_nodes
            .iter()
            .any(|w| w.upgrade().map(|n| Arc::ptr_eq(&n, node)).unwrap_or(false));
        if !already {
            state.main_nodes.push(Arc::downgrade(node));
        }
    }

    fn snapshot_peers(&self) -> Vec<Arc<Player>> {
        let state = self.state.lock().unwrap();
        state.peers.iter().filter_map(|w| w.upgrade()).collect()
    }

    fn snapshot_main_nodes(&self) -> Vec<Arc<MainNode>> {
        let state = self.state.lock().unwrap();
        state.main_nodes.iter().filter_map(|w| w.upgrade()).collect()
    }

    /// A locked read of this node's chain, for a peer's `sync_peers` to
    /// consult without racing its own mutations.
    pub fn snapshot_blockchain(&self) -> Game {
        self.state.lock().unwrap().blockchain.clone()
    }

    pub fn snapshot_pending(&self) -> Vec<Move> {
        self.state.lock().unwrap().pending_moves.iter().cloned().collect()
    }

    /// Adopts the longest known peer chain and ingests valid peer-pending
    /// moves. Intended for a node joining with peers already connected.
    pub fn sync_peers(self: &Arc<Player>) {
        for peer in self.snapshot_peers() {
            let peer_game = peer.snapshot_blockchain();
            let local_len = self.state.lock().unwrap().blockchain.chain.len();
            if peer_game.chain.len() > local_len && peer_game.is_internally_consistent() {
                let mut state = self.state.lock().unwrap();
                state.blockchain = peer_game;
                log::info!("player {} synced blockchain from peer", self.node_id);
            }
            for mv in peer.snapshot_pending() {
                if self.is_valid_move(&mv) && mv.is_valid() {
                    self.add_move(mv);
                }
            }
        }
    }

    // -- Game lifecycle -------------------------------------------------

    /// Begins a game against `opponent` with the given freshly constructed
    /// chain. Fails if this player is already mid-game.
    pub fn start_game(self: &Arc<Player>, opponent: &Arc<Player>, new_game: Game) -> Result<()> {
        {
            let mut state = self.state.lock().unwrap();
            if state.opponent.is_some() {
                return Err(GameChainError::StateConflict(format!(
                    "player {} already has an opponent",
                    self.node_id
                )));
            }
            state.opponent = Some(Arc::downgrade(opponent));
            state.blockchain = new_game;
        }
        self.connect_peer(opponent);
        Ok(())
    }

    fn is_valid_move(&self, mv: &Move) -> bool {
        !mv.data.is_empty() && !mv.sender.is_empty() && !mv.receiver.is_empty()
    }

    /// Creates, signs, and enqueues a move against the current opponent.
    /// A locally initiated action: failures are surfaced, not swallowed.
    pub fn create_move(self: &Arc<Player>, data: String) -> Result<()> {
        if data.is_empty() {
            return Err(GameChainError::InvalidInput("move data must not be empty".to_string()));
        }
        let opponent = {
            let state = self.state.lock().unwrap();
            state.opponent.clone()
        };
        let opponent = opponent
            .and_then(|w| w.upgrade())
            .ok_or_else(|| GameChainError::InvalidInput("no opponent is set".to_string()))?;

        let mut mv = Move::new(self.public_key.clone(), opponent.public_key.clone(), data);
        mv.sign(&self.keypair);
        if !mv.is_valid() {
            return Err(GameChainError::InvalidSignature);
        }
        self.add_move(mv);
        Ok(())
    }

    fn add_move_internal(self: &Arc<Player>, mv: Move, from_peer: Option<String>) {
        if !(self.is_valid_move(&mv) && mv.is_valid()) {
            log::warn!("player {} rejected an invalid move", self.node_id);
            return;
        }
        let is_dup = {
            let mut state = self.state.lock().unwrap();
            let dup = state
                .pending_moves
                .iter()
                .any(|q| q.dedup_key() == mv.dedup_key());
            if !dup {
                state.pending_moves.push_back(mv.clone());
            }
            dup
        };
        if is_dup {
            log::debug!("player {} dropped duplicate move {}", self.node_id, mv.id);
            return;
        }
        self.journal.record_move(&self.node_id, &mv);
        self.cv.notify_all();
        self.broadcast_transaction(&mv, from_peer.as_deref());
    }

    /// Adds a locally created move, gossiping it to every connected peer.
    pub fn add_move(self: &Arc<Player>, mv: Move) {
        self.add_move_internal(mv, None);
    }

    /// Ingests a move received from a peer, forwarding to everyone else.
    pub fn receive_transaction(self: &Arc<Player>, mv: Move, from_peer: String) {
        self.add_move_internal(mv, Some(from_peer));
    }

    fn broadcast_transaction(self: &Arc<Player>, mv: &Move, skip_node_id: Option<&str>) {
        for peer in self.snapshot_peers() {
            if Some(peer.node_id.as_str()) == skip_node_id {
                continue;
            }
            log::debug!("player {} forwarding move to {}", self.node_id, peer.node_id);
            peer.receive_transaction(mv.clone(), self.node_id.clone());
        }
    }

    fn broadcast_block(self: &Arc<Player>, block: &GameBlock, skip_node_id: Option<&str>) {
        for peer in self.snapshot_peers() {
            if Some(peer.node_id.as_str()) == skip_node_id {
                continue;
            }
            log::debug!("player {} forwarding block to {}", self.node_id, peer.node_id);
            peer.receive_block(block.clone(), self.node_id.clone());
        }
    }

    fn verify_new_block(&self, current: &Game, block: &GameBlock) -> bool {
        let tip = match current.last_block() {
            Ok(b) => b,
            Err(_) => return false,
        };
        block.previous_hash == tip.hash
            && block.has_valid_pow()
            && crypto::meets_difficulty(&block.hash, self.config.game_difficulty)
            && block.moves.iter().all(|m| self.is_valid_move(m) && m.is_valid())
    }

    /// Finalizes the current game, stashes it for delivery to a
    /// `MainNode`, and resets local state to an idle placeholder.
    fn finalize_and_reset(state: &mut PlayerState, chain_length: usize) -> Game {
        state.blockchain.end_game();
        let finished = state.blockchain.clone();
        state.completed_games.push_back(finished.clone());
        state.blockchain = Game::placeholder(chain_length);
        state.opponent = None;
        finished
    }

    /// Ingests a block gossiped by a peer: rejects duplicates by hash,
    /// rejects invalid links/PoW/moves, otherwise appends, finalizes if
    /// the game just reached its termination length, and forwards on.
    pub fn receive_block(self: &Arc<Player>, block: GameBlock, from_peer: String) {
        enum Outcome {
            Duplicate,
            Invalid,
            Applied { finalized: bool },
        }

        let outcome = {
            let mut state = self.state.lock().unwrap();
            if state.blockchain.chain.iter().any(|b| b.hash == block.hash) {
                Outcome::Duplicate
            } else if !self.verify_new_block(&state.blockchain, &block) {
                Outcome::Invalid
            } else {
                state.blockchain.add_block(block.clone());
                let keys: HashSet<_> = block.moves.iter().map(|m| m.dedup_key()).collect();
                state.pending_moves.retain(|m| !keys.contains(&m.dedup_key()));
                let finalized = state.blockchain.is_ready_to_finalize();
                if finalized {
                    Self::finalize_and_reset(&mut state, self.config.game_chain_length);
                }
                Outcome::Applied { finalized }
            }
        };

        match outcome {
            Outcome::Duplicate => {
                log::debug!("player {} dropped duplicate block {}", self.node_id, block.hash)
            }
            Outcome::Invalid => {
                log::warn!("player {} rejected an invalid block", self.node_id)
            }
            Outcome::Applied { finalized } => {
                self.journal.record_block(&self.node_id, &block);
                self.broadcast_block(&block, Some(&from_peer));
                if finalized {
                    self.send_complete_games();
                }
            }
        }
    }

    fn send_complete_games(self: &Arc<Player>) {
        loop {
            let game = {
                let mut state = self.state.lock().unwrap();
                match state.completed_games.pop_front() {
                    Some(g) => g,
                    None => return,
                }
            };
            let main_nodes = self.snapshot_main_nodes();
            if main_nodes.is_empty() {
                log::warn!(
                    "player {} has no connected MainNode, dropping completed game {}",
                    self.node_id,
                    game.game_id
                );
                continue;
            }
            for node in &main_nodes {
                node.add_transaction(game.clone(), None);
            }
            self.journal.record_completed_game(&self.node_id, &game);
        }
    }

    /// The mining loop: waits for enough pending moves, mines a block,
    /// verifies it, appends, and gossips. Runs until `stop` is called.
    /// Intended to be spawned on its own `std::thread`.
    pub fn run(self: &Arc<Player>) {
        while self.running.load(Ordering::SeqCst) {
            self.send_complete_games();

            let (index, previous_hash, moves) = {
                let guard = self.state.lock().unwrap();
                let (guard, _) = self
                    .cv
                    .wait_timeout_while(guard, self.config.mining_poll_interval, |s| {
                        self.running.load(Ordering::SeqCst)
                            && s.pending_moves.len() < self.config.moves_per_game_block
                    })
                    .unwrap();
                if !self.running.load(Ordering::SeqCst) {
                    return;
                }
                if guard.pending_moves.len() < self.config.moves_per_game_block {
                    continue;
                }
                let mut guard = guard;
                let moves: Vec<Move> = guard
                    .pending_moves
                    .drain(..self.config.moves_per_game_block)
                    .collect();
                let tip = guard.blockchain.last_block().unwrap().hash.clone();
                let index = guard.blockchain.chain.len() as u64;
                (index, tip, moves)
            };

            let mut block = GameBlock::new(index, previous_hash, moves);
            if !block.mine(self.config.game_difficulty, &self.running) {
                return;
            }

            let outcome_finalized = {
                let mut state = self.state.lock().unwrap();
                if !self.verify_new_block(&state.blockchain, &block) {
                    log::warn!("player {} mined an invalid block, discarding", self.node_id);
                    continue;
                }
                state.blockchain.add_block(block.clone());
                let finalized = state.blockchain.is_ready_to_finalize();
                if finalized {
                    Self::finalize_and_reset(&mut state, self.config.game_chain_length);
                }
                finalized
            };

            self.journal.record_block(&self.node_id, &block);
            self.broadcast_block(&block, None);
            if outcome_finalized {
                self.send_complete_games();
            }
        }
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.cv.notify_all();
    }
}
