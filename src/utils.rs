//! Cryptographic hash functions and hex helpers

use sha2::{Digest, Sha256};

use crate::errors::StoreError;

/// Type alias for 32-byte arrays used throughout cryptographic operations
pub type Bytes32 = [u8; 32];

/// Computes the SHA-256 digest of the input.
///
/// This is the single commitment hash used for liability leaves, the
/// reserve leaf, and every internal Merkle node. Callers must
/// canonicalize their input before hashing: the digest commits to the
/// exact bytes, so a third party re-serializing the same underlying
/// data differently (e.g. JSON with another key order) produces an
/// unverifiable hash.
pub fn sha256(data: impl AsRef<[u8]>) -> Bytes32 {
    let mut hasher = Sha256::new();
    hasher.update(data.as_ref());
    hasher.finalize().into()
}

/// Hashes a pair of Merkle nodes, sorting the operands first.
///
/// The two hashes are compared as raw bytes and concatenated in
/// ascending order before hashing, so `hash_pair(a, b) ==
/// hash_pair(b, a)`. This makes the tree insensitive to leaf
/// insertion order; proof verification must replay the same
/// discipline.
pub fn hash_pair(a: Bytes32, b: Bytes32) -> Bytes32 {
    let mut hasher = Sha256::new();
    if a <= b {
        hasher.update(a);
        hasher.update(b);
    } else {
        hasher.update(b);
        hasher.update(a);
    }
    hasher.finalize().into()
}

/// Encodes a 32-byte hash as lowercase hex
pub fn to_hex(bytes: Bytes32) -> String { hex::encode(bytes) }

/// Decodes a 64-character hex string into a 32-byte hash
pub fn from_hex(s: &str) -> Result<Bytes32, StoreError> {
    let raw = hex::decode(s).map_err(|_| StoreError::MalformedHash(s.to_string()))?;
    raw.try_into().map_err(|_| StoreError::MalformedHash(s.to_string()))
}
