//! Error kinds for the game blockchain core.

use thiserror::Error;

/// The closed set of failure kinds a locally-initiated operation can
/// surface to its caller. Gossip/receive paths never propagate these;
/// they log and drop (see module docs on `player` and `main_node`).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GameChainError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid block: {0}")]
    InvalidBlock(String),

    #[error("duplicate: {0}")]
    Duplicate(String),

    #[error("state conflict: {0}")]
    StateConflict(String),

    #[error("peer unreachable")]
    PeerUnreachable,
}

pub type Result<T> = std::result::Result<T, GameChainError>;
