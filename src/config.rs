//! Tunable policy parameters.
//!
//! The inner-chain terminal length and the "winner is the receiver of the
//! first move in the final block" rule both look arbitrary taken on their
//! own. We carry both as policy on `ChainConfig` rather than as literals
//! scattered through the code, with the documented defaults below.

use std::time::Duration;

/// Policy knobs shared by a node's mining loop and validators.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChainConfig {
    /// Leading hex `'0'` characters required of a `GameBlock` hash.
    pub game_difficulty: u32,
    /// Leading hex `'0'` characters required of a `MainBlock` hash.
    pub main_difficulty: u32,
    /// Moves drained into each mined `GameBlock`.
    pub moves_per_game_block: usize,
    /// Maximum games drained into each mined `MainBlock`.
    pub games_per_main_block: usize,
    /// Inner-chain length (including genesis) at which a `Game` is
    /// finalized. Default 3: genesis + two mined blocks.
    pub game_chain_length: usize,
    /// How long a mining loop cooperatively yields between rounds once a
    /// block has been mined and broadcast.
    pub mining_poll_interval: Duration,
}

impl Default for ChainConfig {
    fn default() -> Self {
        ChainConfig {
            game_difficulty: 4,
            main_difficulty: 5,
            moves_per_game_block: 5,
            games_per_main_block: 10,
            game_chain_length: 3,
            mining_poll_interval: Duration::from_secs(2),
        }
    }
}
