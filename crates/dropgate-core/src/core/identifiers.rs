// crates/dropgate-core/src/core/identifiers.rs
// ============================================================================
// Module: Dropgate Identifiers
// Description: Canonical opaque identifiers for products, transfers, and keys.
// Purpose: Provide strongly typed, serializable IDs with stable string forms.
// Dependencies: rand, serde
// ============================================================================

//! ## Overview
//! This module defines the canonical string-based identifiers used throughout
//! Dropgate. Identifiers are opaque and serialize as strings. Generated
//! identifiers carry a short type prefix followed by 128 random bits in hex so
//! they are unguessable; identifiers supplied by callers are accepted as-is and
//! validated at request boundaries.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use rand::RngCore;
use serde::Deserialize;
use serde::Serialize;

use crate::core::hashing::hex_encode;

// ============================================================================
// SECTION: Generation
// ============================================================================

/// Number of random bytes in a generated identifier.
const GENERATED_ID_BYTES: usize = 16;

/// Generates a prefixed random identifier string.
fn generate_with_prefix(prefix: &str) -> String {
    let mut bytes = [0u8; GENERATED_ID_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("{prefix}_{}", hex_encode(&bytes))
}

// ============================================================================
// SECTION: Identifier Types
// ============================================================================

/// Principal identifier resolved by the identity collaborator (seller or buyer).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(String);

impl PrincipalId {
    /// Creates a new principal identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for PrincipalId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for PrincipalId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Product identifier for a registered digital file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(String);

impl ProductId {
    /// Creates a new product identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random product identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(generate_with_prefix("prd"))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for ProductId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ProductId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Upload session identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploadId(String);

impl UploadId {
    /// Creates a new upload session identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random upload session identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(generate_with_prefix("upl"))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for UploadId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for UploadId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Transfer identifier for one seller to buyer handoff.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransferId(String);

impl TransferId {
    /// Creates a new transfer identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random transfer identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(generate_with_prefix("trf"))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for TransferId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for TransferId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Product key identifier for an issued key envelope.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyId(String);

impl KeyId {
    /// Creates a new product key identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random product key identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(generate_with_prefix("key"))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for KeyId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for KeyId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Payment intent identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentIntentId(String);

impl PaymentIntentId {
    /// Creates a new payment intent identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random payment intent identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(generate_with_prefix("pay"))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PaymentIntentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for PaymentIntentId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for PaymentIntentId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Delivery receipt identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReceiptId(String);

impl ReceiptId {
    /// Creates a new delivery receipt identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random delivery receipt identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(generate_with_prefix("rcp"))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReceiptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for ReceiptId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ReceiptId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Dispute identifier recorded in transfer policy.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DisputeId(String);

impl DisputeId {
    /// Creates a new dispute identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random dispute identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(generate_with_prefix("dsp"))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DisputeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for DisputeId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for DisputeId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::ProductId;
    use super::TransferId;

    #[test]
    fn generated_ids_carry_prefix_and_lowercase_hex() {
        let id = ProductId::generate();
        let suffix = id.as_str().strip_prefix("prd_");
        assert!(suffix.is_some_and(|hex| {
            hex.len() == 32 && hex.bytes().all(|b| matches!(b, b'0' ..= b'9' | b'a' ..= b'f'))
        }));
        assert_ne!(TransferId::generate(), TransferId::generate());
    }
}
