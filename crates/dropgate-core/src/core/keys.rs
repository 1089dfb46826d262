// crates/dropgate-core/src/core/keys.rs
// ============================================================================
// Module: Dropgate Product Keys
// Description: Per-recipient key envelope records with expiry.
// Purpose: Bind one encrypted content key to one product and one recipient.
// Dependencies: crate::core, serde
// ============================================================================

//! ## Overview
//! A [`ProductKey`] is live while `now < expires_at`. At most one live key per
//! `(product, recipient)` is meaningful; grants reuse it. Revocation expires
//! it by setting `expires_at` to the revocation time.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::KeyId;
use crate::core::identifiers::PrincipalId;
use crate::core::identifiers::ProductId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Key Envelope
// ============================================================================

/// Encrypted content-key payload delivered to a recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyEnvelope {
    /// AEAD algorithm label.
    pub algorithm: String,
    /// Base64 of `nonce || ciphertext`.
    pub sealed: String,
}

// ============================================================================
// SECTION: Product Key
// ============================================================================

/// Issued key envelope for one recipient of one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductKey {
    /// Key identifier.
    pub id: KeyId,
    /// Product the key unlocks.
    pub product_id: ProductId,
    /// Recipient the envelope is bound to.
    pub recipient_id: PrincipalId,
    /// Encrypted key payload.
    pub key_envelope: KeyEnvelope,
    /// Issue time.
    pub created_at: Timestamp,
    /// Expiry time.
    pub expires_at: Timestamp,
}

impl ProductKey {
    /// Returns true while the key has not expired at `now`.
    #[must_use]
    pub const fn is_live(&self, now: Timestamp) -> bool {
        !now.has_reached(self.expires_at)
    }
}
