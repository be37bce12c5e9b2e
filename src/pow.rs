//! The proof-of-work mining primitive shared by `GameBlock` and `MainBlock`.
//! Both block kinds have identical header shape and mine by nonce search
//! over `(header, payload-canonical-bytes, difficulty)`. This module owns
//! that one algorithm; the block kinds are payload-tagged variants built
//! on top of it.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::crypto;

/// The header fields common to `GameBlock` and `MainBlock`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    pub index: u64,
    pub previous_hash: String,
    pub timestamp: i64,
    pub nonce: u64,
}

impl BlockHeader {
    pub fn genesis() -> BlockHeader {
        BlockHeader {
            index: 0,
            previous_hash: "0".to_string(),
            timestamp: now_secs(),
            nonce: 0,
        }
    }

    pub fn new(index: u64, previous_hash: String) -> BlockHeader {
        BlockHeader {
            index,
            previous_hash,
            timestamp: now_secs(),
            nonce: 0,
        }
    }
}

fn now_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// The hash input is `index ‖ previousHash ‖ timestamp ‖ nonce ‖ payload`,
/// where `payload` is the concatenation of each entry's canonical form.
pub fn canonical_bytes(header: &BlockHeader, payload_canonical: &str) -> Vec<u8> {
    let mut s = String::new();
    s.push_str(&header.index.to_string());
    s.push_str(&header.previous_hash);
    s.push_str(&header.timestamp.to_string());
    s.push_str(&header.nonce.to_string());
    s.push_str(payload_canonical);
    s.into_bytes()
}

/// Recomputes the hash for a header/payload pair at the header's current
/// nonce.
pub fn compute_hash(header: &BlockHeader, payload_canonical: &str) -> String {
    crypto::hash_hex(&canonical_bytes(header, payload_canonical))
}

/// Mines `header` in place: increments `nonce` and recomputes the hash
/// until the hash has `difficulty` leading hex zeros, then returns the
/// final hash. Samples `running` between nonce increments so callers can
/// request prompt cooperative cancellation; returns `None`
/// if mining was cancelled before a valid nonce was found.
pub fn mine(header: &mut BlockHeader, payload_canonical: &str, difficulty: u32, running: &AtomicBool) -> Option<String> {
    loop {
        let hash = compute_hash(header, payload_canonical);
        if crypto::meets_difficulty(&hash, difficulty) {
            return Some(hash);
        }
        if !running.load(Ordering::SeqCst) {
            return None;
        }
        header.nonce += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mining_finds_a_hash_meeting_difficulty() {
        let mut header = BlockHeader::genesis();
        let running = AtomicBool::new(true);
        let hash = mine(&mut header, "payload", 2, &running).unwrap();
        assert!(crypto::meets_difficulty(&hash, 2));
        assert_eq!(hash, compute_hash(&header, "payload"));
    }

    #[test]
    fn cancellation_stops_mining() {
        let mut header = BlockHeader::genesis();
        let running = AtomicBool::new(false);
        // Difficulty high enough that the first hash (nonce=0) is very
        // unlikely to already satisfy it.
        let result = mine(&mut header, "payload", 12, &running);
        assert!(result.is_none());
    }
}
