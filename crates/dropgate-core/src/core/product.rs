// crates/dropgate-core/src/core/product.rs
// ============================================================================
// Module: Dropgate Products and Manifests
// Description: Product metadata, chunk manifests, and buyer requirements.
// Purpose: Define the durable product record and its integrity invariants.
// Dependencies: crate::core, serde
// ============================================================================

//! ## Overview
//! A [`Product`] is created in a pending storage state when an upload starts
//! and is finalized exactly once when the upload completes, at which point it
//! carries a [`Manifest`] and a storage pointer into the blob store.
//!
//! # Invariants
//! - `manifest.is_some()` iff `storage_pointer != PENDING_STORAGE_POINTER`.
//! - Manifest entries are contiguous from zero and their sizes sum to the
//!   declared total size.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::hashing::HashDigest;
use crate::core::identifiers::PrincipalId;
use crate::core::identifiers::ProductId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Storage pointer value for products whose upload has not completed.
pub const PENDING_STORAGE_POINTER: &str = "pending";
/// Default encryption algorithm label recorded on products.
pub const DEFAULT_ENCRYPTION_ALGORITHM: &str = "chacha20poly1305";

// ============================================================================
// SECTION: Storage Type
// ============================================================================

/// Blob backend holding a product's chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageType {
    /// Process-local memory (tests and demos).
    Memory,
    /// Local filesystem directory.
    Filesystem,
    /// S3-compatible object storage.
    S3,
}

impl StorageType {
    /// Returns the stable label for the storage type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Filesystem => "filesystem",
            Self::S3 => "s3",
        }
    }

    /// Parses a storage type label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "memory" => Some(Self::Memory),
            "filesystem" => Some(Self::Filesystem),
            "s3" => Some(Self::S3),
            _ => None,
        }
    }
}

// ============================================================================
// SECTION: Required Inputs
// ============================================================================

/// When a declared buyer input must be present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputTiming {
    /// Must be present before an invoice can be created.
    PrePayment,
    /// Must be present before access is granted.
    PostPaymentPreGrant,
}

/// Buyer input declared by the product owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequiredInput {
    /// Field name expected in the transfer's buyer inputs.
    pub name: String,
    /// Free-form type hint for client tooling (e.g. `string`, `email`).
    #[serde(rename = "type")]
    pub input_type: String,
    /// Point in the lifecycle at which the input is enforced.
    pub timing: InputTiming,
    /// Whether the input is mandatory.
    #[serde(default = "default_required")]
    pub required: bool,
}

/// Declared inputs default to required.
const fn default_required() -> bool {
    true
}

/// Returns the names of required inputs at `timing` that are absent or null in `inputs`.
#[must_use]
pub fn missing_inputs(
    required: &[RequiredInput],
    timing: InputTiming,
    inputs: &serde_json::Map<String, serde_json::Value>,
) -> Vec<String> {
    required
        .iter()
        .filter(|input| input.required && input.timing == timing)
        .filter(|input| inputs.get(&input.name).is_none_or(serde_json::Value::is_null))
        .map(|input| input.name.clone())
        .collect()
}

// ============================================================================
// SECTION: Manifest
// ============================================================================

/// One chunk entry in a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    /// Zero-based chunk index.
    pub index: u32,
    /// Chunk digest.
    pub hash: HashDigest,
    /// Chunk size in bytes.
    pub size: u64,
}

/// Ordered description of a product's chunks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Chunk entries ordered by index.
    pub entries: Vec<ManifestEntry>,
    /// Number of chunks.
    pub total_chunks: u32,
    /// Nominal chunk size in bytes.
    pub chunk_size: u64,
    /// Total content size in bytes.
    pub total_size: u64,
    /// Whole-content digest.
    pub content_hash: HashDigest,
}

/// Manifest invariant violations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManifestError {
    /// Entry count does not match `total_chunks`.
    #[error("manifest lists {actual} entries but declares {declared} chunks")]
    CountMismatch {
        /// Declared chunk count.
        declared: u32,
        /// Actual entry count.
        actual: usize,
    },
    /// Entries are not contiguous from zero.
    #[error("manifest entry at position {position} has index {index}")]
    NonContiguous {
        /// Position in the entry list.
        position: usize,
        /// Index found at that position.
        index: u32,
    },
    /// Entry sizes do not sum to the declared total.
    #[error("manifest entry sizes sum to {actual} but total size is {declared}")]
    SizeMismatch {
        /// Declared total size.
        declared: u64,
        /// Sum of entry sizes.
        actual: u64,
    },
    /// An entry has zero size or exceeds the chunk size.
    #[error("manifest entry {index} has invalid size {size}")]
    InvalidEntrySize {
        /// Chunk index.
        index: u32,
        /// Recorded size.
        size: u64,
    },
}

impl Manifest {
    /// Validates the manifest's structural invariants.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError`] when an invariant does not hold.
    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.entries.len() != self.total_chunks as usize {
            return Err(ManifestError::CountMismatch {
                declared: self.total_chunks,
                actual: self.entries.len(),
            });
        }
        let mut sum: u64 = 0;
        for (position, entry) in self.entries.iter().enumerate() {
            if entry.index as usize != position {
                return Err(ManifestError::NonContiguous {
                    position,
                    index: entry.index,
                });
            }
            if entry.size == 0 || entry.size > self.chunk_size {
                return Err(ManifestError::InvalidEntrySize {
                    index: entry.index,
                    size: entry.size,
                });
            }
            sum = sum.saturating_add(entry.size);
        }
        if sum != self.total_size {
            return Err(ManifestError::SizeMismatch {
                declared: self.total_size,
                actual: sum,
            });
        }
        Ok(())
    }

    /// Returns the entry for a chunk index.
    #[must_use]
    pub fn entry(&self, index: u32) -> Option<&ManifestEntry> {
        self.entries.get(index as usize).filter(|entry| entry.index == index)
    }
}

// ============================================================================
// SECTION: Product
// ============================================================================

/// Registered digital product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    /// Product identifier.
    pub id: ProductId,
    /// Seller that owns the product.
    pub owner_id: PrincipalId,
    /// Display title.
    pub title: String,
    /// MIME content type.
    pub content_type: String,
    /// Declared size in bytes.
    pub size_bytes: u64,
    /// Declared whole-content digest, verified at completion when present.
    pub content_hash: Option<HashDigest>,
    /// Encryption algorithm label for delivered key envelopes.
    pub encryption_algorithm: String,
    /// Blob backend holding the chunks.
    pub storage_type: StorageType,
    /// Blob key prefix, or [`PENDING_STORAGE_POINTER`].
    pub storage_pointer: String,
    /// Finalized manifest.
    pub manifest: Option<Manifest>,
    /// Owner-declared buyer inputs.
    #[serde(default)]
    pub required_inputs: Vec<RequiredInput>,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last mutation time.
    pub updated_at: Timestamp,
}

impl Product {
    /// Returns true once the upload has completed and the manifest is set.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.manifest.is_some() && self.storage_pointer != PENDING_STORAGE_POINTER
    }

    /// Returns the manifest when the product is ready.
    #[must_use]
    pub fn ready_manifest(&self) -> Option<&Manifest> {
        if self.is_ready() { self.manifest.as_ref() } else { None }
    }
}

/// Validates owner-declared inputs: names must be non-empty and unique.
///
/// # Errors
///
/// Returns a message describing the first invalid declaration.
pub fn validate_required_inputs(inputs: &[RequiredInput]) -> Result<(), String> {
    let mut seen = BTreeSet::new();
    for input in inputs {
        let name = input.name.trim();
        if name.is_empty() {
            return Err("required input name must be non-empty".to_string());
        }
        if name.len() > 128 {
            return Err(format!("required input name too long: {name}"));
        }
        if !seen.insert(name.to_string()) {
            return Err(format!("duplicate required input: {name}"));
        }
    }
    Ok(())
}
