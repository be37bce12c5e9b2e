//! `Move`: a signed player-to-player message carrying opaque game data.

use ed25519_dalek::Keypair;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::crypto;

/// A signed message from one player to another carrying opaque game data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Move {
    pub id: u64,
    pub sender: String,
    pub receiver: String,
    pub data: String,
    /// Hex-encoded detached signature; empty until `sign` is called.
    pub signature: String,
}

impl Move {
    /// Creates an unsigned move. Draws a random `id` uniform over
    /// `[1e9, 1e10)`.
    pub fn new(sender: String, receiver: String, data: String) -> Move {
        let id = rand::thread_rng().gen_range(1_000_000_000u64..10_000_000_000u64);
        Move {
            id,
            sender,
            receiver,
            data,
            signature: String::new(),
        }
    }

    /// The canonical bytes signed over: `sender ‖ receiver ‖ data`.
    fn signing_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(self.sender.as_bytes());
        bytes.extend_from_slice(self.receiver.as_bytes());
        bytes.extend_from_slice(self.data.as_bytes());
        bytes
    }

    /// Signs the move with the sender's private key, filling in `signature`.
    pub fn sign(&mut self, keypair: &Keypair) {
        let sig = crypto::sign(keypair, &self.signing_bytes());
        self.signature = crypto::to_hex(&sig);
    }

    /// True iff `data` is non-empty, `sender`/`receiver` are non-empty and
    /// distinct, and the signature verifies under `sender`.
    pub fn is_valid(&self) -> bool {
        if self.data.is_empty() {
            return false;
        }
        if self.sender.is_empty() || self.receiver.is_empty() {
            return false;
        }
        if self.sender == self.receiver {
            return false;
        }
        let sig_bytes = match hex_decode(&self.signature) {
            Some(b) => b,
            None => return false,
        };
        crypto::verify(&self.sender, &self.signing_bytes(), &sig_bytes)
    }

    /// The canonical string embedded wherever a `Move` appears in a block's
    /// hash input: `sender ‖ receiver ‖ data ‖ hex(signature)`.
    pub fn canonical_string(&self) -> String {
        format!(
            "{}{}{}{}",
            self.sender, self.receiver, self.data, self.signature
        )
    }

    /// The tuple used for dedup comparisons.
    pub fn dedup_key(&self) -> (u64, String, String, String) {
        (
            self.id,
            self.sender.clone(),
            self.receiver.clone(),
            self.data.clone(),
        )
    }
}

fn hex_decode(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    let mut out = Vec::with_capacity(s.len() / 2);
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let hi = (bytes[i] as char).to_digit(16)?;
        let lo = (bytes[i + 1] as char).to_digit(16)?;
        out.push(((hi << 4) | lo) as u8);
        i += 2;
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto;

    fn make_signed_move(data: &str) -> Move {
        let sender = crypto::generate();
        let receiver = crypto::generate();
        let mut m = Move::new(
            crypto::public_key_to_pem(&sender.public),
            crypto::public_key_to_pem(&receiver.public),
            data.to_string(),
        );
        m.sign(&sender);
        m
    }

    #[test]
    fn valid_move_round_trips() {
        let m = make_signed_move("e4");
        assert!(m.is_valid());
    }

    #[test]
    fn empty_data_is_invalid() {
        let mut m = make_signed_move("e4");
        m.data = String::new();
        assert!(!m.is_valid());
    }

    #[test]
    fn wrong_key_signature_is_invalid() {
        let attacker = crypto::generate();
        let mut m = make_signed_move("e4");
        m.sign(&attacker);
        assert!(!m.is_valid());
    }

    #[test]
    fn same_sender_and_receiver_is_invalid() {
        let sender = crypto::generate();
        let pem = crypto::public_key_to_pem(&sender.public);
        let mut m = Move::new(pem.clone(), pem, "e4".to_string());
        m.sign(&sender);
        assert!(!m.is_valid());
    }
}
