//! Property-based checks for the core invariants: signature validity,
//! proof-of-work correctness, and dedup-key stability.

use std::sync::atomic::AtomicBool;

use proptest::prelude::*;

use gamechain::crypto;
use gamechain::game_block::GameBlock;
use gamechain::mv::Move;

fn arb_move_data() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9]{1,12}"
}

proptest! {
    /// A move signed by its sender always validates, for any non-empty data.
    #[test]
    fn signed_move_is_always_valid(data in arb_move_data()) {
        let sender = crypto::generate();
        let receiver = crypto::generate();
        let sender_pem = crypto::public_key_to_pem(&sender.public);
        let receiver_pem = crypto::public_key_to_pem(&receiver.public);

        let mut mv = Move::new(sender_pem, receiver_pem, data);
        mv.sign(&sender);

        prop_assert!(mv.is_valid());
    }

    /// Signing with any key other than the sender's never validates.
    #[test]
    fn move_signed_by_a_stranger_is_never_valid(data in arb_move_data()) {
        let sender = crypto::generate();
        let stranger = crypto::generate();
        let receiver = crypto::generate();
        let sender_pem = crypto::public_key_to_pem(&sender.public);
        let receiver_pem = crypto::public_key_to_pem(&receiver.public);

        let mut mv = Move::new(sender_pem, receiver_pem, data);
        mv.sign(&stranger);

        prop_assert!(!mv.is_valid());
    }

    /// `dedup_key` is stable under cloning and differs whenever `id` does.
    #[test]
    fn dedup_key_is_deterministic_and_id_sensitive(data in arb_move_data(), bump in 1u64..1000) {
        let sender = crypto::public_key_to_pem(&crypto::generate().public);
        let receiver = crypto::public_key_to_pem(&crypto::generate().public);
        let mv = Move::new(sender, receiver, data);
        let mut other = mv.clone();
        other.id = mv.id.wrapping_add(bump);

        prop_assert_eq!(mv.dedup_key(), mv.clone().dedup_key());
        prop_assert_ne!(mv.dedup_key(), other.dedup_key());
    }

    /// Any block mined at a given difficulty passes its own PoW check, and
    /// its hash has at least that many leading hex zeros.
    #[test]
    fn mined_block_always_satisfies_its_own_difficulty(difficulty in 0u32..3) {
        let mut block = GameBlock::new(1, "0".to_string(), Vec::new());
        let running = AtomicBool::new(true);

        prop_assert!(block.mine(difficulty, &running));
        prop_assert!(block.has_valid_pow());
        prop_assert!(crypto::meets_difficulty(&block.hash, difficulty));
    }

    /// Tampering with a mined block's nonce after the fact always breaks
    /// its PoW check (the recomputed hash no longer matches).
    #[test]
    fn tampering_with_nonce_breaks_pow(difficulty in 0u32..3, bump in 1u64..50) {
        let mut block = GameBlock::new(1, "0".to_string(), Vec::new());
        let running = AtomicBool::new(true);
        block.mine(difficulty, &running);

        block.nonce = block.nonce.wrapping_add(bump);
        prop_assert!(!block.has_valid_pow());
    }
}
