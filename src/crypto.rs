//! Cryptographic types and operations: key generation, detached signatures
//! over opaque byte strings, and the hex-hashing used throughout the chain.

use ed25519_dalek::{Keypair, PublicKey, Signature as Sig, Signer, Verifier};
use rand::rngs::OsRng;

/// Public keys double as player identifiers, so they are carried as PEM
/// text rather than raw bytes. `ed25519-dalek` 1.x has no
/// built-in PEM support, so we wrap/unwrap a minimal PEM envelope around the
/// raw 32-byte key ourselves.
const PEM_HEADER: &str = "-----BEGIN PUBLIC KEY-----";
const PEM_FOOTER: &str = "-----END PUBLIC KEY-----";

/// Generates a fresh ed25519 key pair.
pub fn generate() -> Keypair {
    let mut csprng = OsRng {};
    Keypair::generate(&mut csprng)
}

/// Encodes a public key as PEM text.
pub fn public_key_to_pem(key: &PublicKey) -> String {
    let encoded = base64::encode(key.as_bytes());
    let mut body = String::new();
    for chunk in encoded.as_bytes().chunks(64) {
        body.push_str(std::str::from_utf8(chunk).unwrap());
        body.push('\n');
    }
    format!("{}\n{}{}\n", PEM_HEADER, body, PEM_FOOTER)
}

/// Decodes a PEM-encoded public key. Returns `None` on any malformed input;
/// this function never panics.
pub fn pem_to_public_key(pem: &str) -> Option<PublicKey> {
    let body: String = pem
        .lines()
        .filter(|line| !line.starts_with("-----"))
        .collect();
    let bytes = base64::decode(body).ok()?;
    PublicKey::from_bytes(&bytes).ok()
}

/// Strips line breaks from a PEM string, for use as a compact identifier.
pub fn sanitize_pem(pem: &str) -> String {
    pem.chars().filter(|c| *c != '\n' && *c != '\r').collect()
}

/// The final 40 characters of the sanitized PEM, used as a player's
/// display `nodeId`.
pub fn node_id_from_pem(pem: &str) -> String {
    let sanitized = sanitize_pem(pem);
    let len = sanitized.chars().count();
    if len <= 40 {
        sanitized
    } else {
        sanitized.chars().skip(len - 40).collect()
    }
}

/// Signs an opaque byte string, returning the raw signature bytes.
pub fn sign(keypair: &Keypair, bytes: &[u8]) -> Vec<u8> {
    keypair.sign(bytes).to_bytes().to_vec()
}

/// Verifies a signature over a byte string against a PEM-encoded public
/// key. Never raises: any malformed input (bad PEM, bad signature length)
/// simply yields `false`.
pub fn verify(pem_public_key: &str, bytes: &[u8], signature: &[u8]) -> bool {
    let key = match pem_to_public_key(pem_public_key) {
        Some(k) => k,
        None => return false,
    };
    let sig = match Sig::from_bytes(signature) {
        Ok(s) => s,
        Err(_) => return false,
    };
    key.verify(bytes, &sig).is_ok()
}

/// Hex-encodes a byte slice, used for embedding signatures in canonical
/// strings and for rendering block hashes.
pub fn to_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{:02x}", b));
    }
    s
}

/// The blake3 hash of a byte string, rendered as lowercase hex. Used for
/// all `hash`/`previousHash` fields.
pub fn hash_hex(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// Whether `hash` begins with `difficulty` hex `'0'` characters.
pub fn meets_difficulty(hash: &str, difficulty: u32) -> bool {
    let target = "0".repeat(difficulty as usize);
    hash.starts_with(&target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_round_trip() {
        let keys = generate();
        let pem = public_key_to_pem(&keys.public);
        let msg = b"sendereceiverdata";
        let sig = sign(&keys, msg);
        assert!(verify(&pem, msg, &sig));
    }

    #[test]
    fn verify_rejects_wrong_key() {
        let keys = generate();
        let other = generate();
        let pem_other = public_key_to_pem(&other.public);
        let msg = b"payload";
        let sig = sign(&keys, msg);
        assert!(!verify(&pem_other, msg, &sig));
    }

    #[test]
    fn verify_rejects_malformed_input() {
        assert!(!verify("not a pem", b"x", b"y"));
        assert!(!verify(
            "-----BEGIN PUBLIC KEY-----\n-----END PUBLIC KEY-----\n",
            b"x",
            &[0u8; 64]
        ));
    }

    #[test]
    fn node_id_is_last_40_chars_of_sanitized_pem() {
        let keys = generate();
        let pem = public_key_to_pem(&keys.public);
        let sanitized = sanitize_pem(&pem);
        let id = node_id_from_pem(&pem);
        assert_eq!(id.chars().count(), 40);
        assert!(sanitized.ends_with(&id));
    }

    #[test]
    fn difficulty_prefix_check() {
        assert!(meets_difficulty("000abc", 3));
        assert!(!meets_difficulty("00abc", 3));
    }
}
