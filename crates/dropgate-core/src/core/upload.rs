// crates/dropgate-core/src/core/upload.rs
// ============================================================================
// Module: Dropgate Upload Sessions
// Description: Ephemeral chunked-upload session state and chunk planning.
// Purpose: Track which chunk indices have arrived for a pending product.
// Dependencies: crate::core, serde
// ============================================================================

//! ## Overview
//! An [`UploadSession`] is short-lived state held in an expiring arena, not
//! in the relational store. It records the digest and size of every chunk that
//! has arrived so completion can build and verify the manifest without
//! re-reading the blob store.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::core::hashing::HashDigest;
use crate::core::identifiers::PrincipalId;
use crate::core::identifiers::ProductId;
use crate::core::identifiers::UploadId;
use crate::core::product::ManifestEntry;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Hard ceiling on chunk size (4.5 MiB).
pub const MAX_CHUNK_SIZE_BYTES: u64 = 4_718_592;
/// Hard ceiling on total upload size (200 MiB).
pub const MAX_TOTAL_SIZE_BYTES: u64 = 209_715_200;
/// Zero-padding width for chunk blob keys.
pub const CHUNK_INDEX_WIDTH: usize = 6;

// ============================================================================
// SECTION: Chunk Planning
// ============================================================================

/// Returns `ceil(total_size / chunk_size)`, or `None` for a zero chunk size
/// or a count that does not fit in `u32`.
#[must_use]
pub fn expected_chunk_count(total_size: u64, chunk_size: u64) -> Option<u32> {
    if chunk_size == 0 {
        return None;
    }
    u32::try_from(total_size.div_ceil(chunk_size)).ok()
}

/// Returns the exact byte length expected for chunk `index`.
#[must_use]
pub fn expected_chunk_len(total_size: u64, chunk_size: u64, index: u32) -> Option<u64> {
    let count = expected_chunk_count(total_size, chunk_size)?;
    if index >= count {
        return None;
    }
    let offset = u64::from(index).checked_mul(chunk_size)?;
    Some(chunk_size.min(total_size - offset))
}

/// Returns the blob key of chunk `index` under `prefix`.
#[must_use]
pub fn chunk_key(prefix: &str, index: u32) -> String {
    format!("{prefix}/chunk_{index:0width$}", width = CHUNK_INDEX_WIDTH)
}

/// Returns the blob key of the manifest document under `prefix`.
#[must_use]
pub fn manifest_key(prefix: &str) -> String {
    format!("{prefix}/manifest.json")
}

// ============================================================================
// SECTION: Session
// ============================================================================

/// Digest and size recorded for an uploaded chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkRecord {
    /// Chunk digest.
    pub hash: HashDigest,
    /// Chunk size in bytes.
    pub size: u64,
}

/// In-flight chunked upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSession {
    /// Session identifier.
    pub upload_id: UploadId,
    /// Product being uploaded.
    pub product_id: ProductId,
    /// Seller performing the upload.
    pub owner_id: PrincipalId,
    /// Blob key prefix for this upload's chunks.
    pub storage_prefix: String,
    /// Nominal chunk size.
    pub chunk_size: u64,
    /// Declared total size.
    pub total_size: u64,
    /// Number of chunks required for completion.
    pub expected_chunks: u32,
    /// Chunks received so far, keyed by index.
    pub uploaded_chunks: BTreeMap<u32, ChunkRecord>,
    /// Creation time.
    pub created_at: Timestamp,
    /// Time after which the session is discarded.
    pub expires_at: Timestamp,
}

impl UploadSession {
    /// Returns indices that have not been uploaded yet.
    #[must_use]
    pub fn missing_indices(&self) -> Vec<u32> {
        (0 .. self.expected_chunks)
            .filter(|index| !self.uploaded_chunks.contains_key(index))
            .collect()
    }

    /// Returns true when every expected index has arrived.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.uploaded_chunks.len() == self.expected_chunks as usize
            && self.missing_indices().is_empty()
    }

    /// Builds manifest entries from the recorded chunks, ordered by index.
    #[must_use]
    pub fn manifest_entries(&self) -> Vec<ManifestEntry> {
        self.uploaded_chunks
            .iter()
            .map(|(index, record)| ManifestEntry {
                index: *index,
                hash: record.hash.clone(),
                size: record.size,
            })
            .collect()
    }
}
