// crates/dropgate-core/src/core/hashing.rs
// ============================================================================
// Module: Dropgate Content Hashing
// Description: Chunk digests, whole-content digests, and canonical JSON bytes.
// Purpose: Provide the integrity primitives behind manifests and tokens.
// Dependencies: serde, serde_jcs, sha2
// ============================================================================

//! ## Overview
//! Every stored chunk is addressed by its SHA-256 digest and every manifest
//! records those digests. Whole-content digests are computed incrementally so
//! completion can stream chunks without buffering the full file. Token claims
//! are canonicalized with RFC 8785 (JCS) before signing so signatures are
//! stable across serializers.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

// ============================================================================
// SECTION: Hash Algorithm
// ============================================================================

/// Supported hash algorithms for chunk and content digests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashAlgorithm {
    /// SHA-256 hashing.
    Sha256,
}

impl HashAlgorithm {
    /// Returns the canonical label for the algorithm.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
        }
    }

    /// Parses a canonical algorithm label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "sha256" => Some(Self::Sha256),
            _ => None,
        }
    }
}

/// Default hash algorithm for Dropgate.
pub const DEFAULT_HASH_ALGORITHM: HashAlgorithm = HashAlgorithm::Sha256;

// ============================================================================
// SECTION: Hash Digest
// ============================================================================

/// Content hash representation.
///
/// # Invariants
/// - `value` is lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HashDigest {
    /// Hash algorithm identifier.
    pub algorithm: HashAlgorithm,
    /// Lowercase hex-encoded digest bytes.
    pub value: String,
}

impl HashDigest {
    /// Creates a new digest from raw bytes.
    #[must_use]
    pub fn new(algorithm: HashAlgorithm, bytes: &[u8]) -> Self {
        Self {
            algorithm,
            value: hex_encode(bytes),
        }
    }

    /// Parses a digest from `<algorithm>:<hex>` or bare SHA-256 hex.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let (algorithm, value) = match raw.split_once(':') {
            Some((label, value)) => (HashAlgorithm::parse(label)?, value),
            None => (DEFAULT_HASH_ALGORITHM, raw),
        };
        let expected_len = match algorithm {
            HashAlgorithm::Sha256 => 64,
        };
        if value.len() != expected_len || !value.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        Some(Self {
            algorithm,
            value: value.to_ascii_lowercase(),
        })
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised when computing canonical hashes.
#[derive(Debug, Error)]
pub enum HashError {
    /// JSON canonicalization failed.
    #[error("failed to canonicalize json: {0}")]
    Canonicalization(String),
}

// ============================================================================
// SECTION: Hashing Helpers
// ============================================================================

/// Returns canonical JSON bytes for a serializable value using RFC 8785.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when serialization fails.
pub fn canonical_json_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, HashError> {
    serde_jcs::to_vec(value).map_err(|err| HashError::Canonicalization(err.to_string()))
}

/// Hashes raw bytes using the provided algorithm.
#[must_use]
pub fn hash_bytes(algorithm: HashAlgorithm, bytes: &[u8]) -> HashDigest {
    let mut hasher = ContentHasher::new(algorithm);
    hasher.update(bytes);
    hasher.finalize()
}

/// Incremental hasher for whole-content digests over streamed chunks.
pub struct ContentHasher {
    /// Selected algorithm.
    algorithm: HashAlgorithm,
    /// SHA-256 state.
    inner: Sha256,
}

impl ContentHasher {
    /// Creates a new incremental hasher.
    #[must_use]
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self {
            algorithm,
            inner: Sha256::new(),
        }
    }

    /// Feeds bytes into the digest.
    pub fn update(&mut self, bytes: &[u8]) {
        match self.algorithm {
            HashAlgorithm::Sha256 => self.inner.update(bytes),
        }
    }

    /// Finishes the digest.
    #[must_use]
    pub fn finalize(self) -> HashDigest {
        match self.algorithm {
            HashAlgorithm::Sha256 => {
                let digest = self.inner.finalize();
                HashDigest::new(HashAlgorithm::Sha256, &digest)
            }
        }
    }
}

// ============================================================================
// SECTION: Hex Encoding
// ============================================================================

/// Encodes bytes as a lowercase hex string.
pub(crate) fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::DEFAULT_HASH_ALGORITHM;
    use super::hash_bytes;
    use super::hex_encode;

    #[test]
    fn hex_encoding_is_lowercase_and_padded() {
        assert_eq!(hex_encode(&[0x00, 0x0a, 0xff]), "000aff");
    }

    #[test]
    fn digests_deduplicate_in_hash_sets() {
        let digests: HashSet<_> = [b"a".as_slice(), b"b".as_slice(), b"a".as_slice()]
            .into_iter()
            .map(|bytes| hash_bytes(DEFAULT_HASH_ALGORITHM, bytes))
            .collect();
        assert_eq!(digests.len(), 2);
    }
}
