//! Content hashing for cache keys.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// SHA-256 content hash, hex-encoded.
///
/// Used to content-address per-file correlation results: a source file
/// that changes on disk mid-run hashes differently and misses the
/// cache instead of resolving against stale bytecode.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub String);

impl ContentHash {
    /// Compute the SHA-256 hash of the given bytes.
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        ContentHash(hex::encode(hasher.finalize()))
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compute_produces_64_hex_chars() {
        let hash = ContentHash::compute(b"let x = 1\n");
        assert_eq!(hash.0.len(), 64);
        assert!(hash.0.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn different_content_different_hash() {
        assert_ne!(
            ContentHash::compute(b"let x = 1"),
            ContentHash::compute(b"let x = 2")
        );
    }
}
