use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Equality check for secrets whose timing does not reveal where the inputs
/// first differ.
///
/// Both sides are hashed to 32-byte SHA-256 digests and the digests are
/// compared with a constant-time primitive, so a length mismatch is not
/// visible from the comparison itself. Hashing still takes time proportional
/// to the input length; an attacker can learn roughly how long their own
/// candidate is, nothing about the secret's contents.
///
/// Empty inputs never match, not even each other.
pub fn secure_compare(a: &str, b: &str) -> bool {
    if a.is_empty() || b.is_empty() {
        return false;
    }
    let left = Sha256::digest(a.as_bytes());
    let right = Sha256::digest(b.as_bytes());
    left.as_slice().ct_eq(right.as_slice()).into()
}
