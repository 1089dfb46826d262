// crates/dropgate-core/src/runtime/tokens.rs
// ============================================================================
// Module: Dropgate Access Tokens
// Description: Signed, time-boxed claim and download tokens.
// Purpose: Mint and verify single-purpose credentials bound to a recipient.
// Dependencies: base64, ed25519-dalek, rand, serde, sha2
// ============================================================================

//! ## Overview
//! A token is `base64url(canonical JSON claims) "." base64url(signature)`.
//! Claims are canonicalized with RFC 8785 before signing and the signature is
//! Ed25519. Verification uses strict signature checks, then the token type,
//! then expiry. Tokens carry a random nonce so two tokens minted for the same
//! binding are never equal.
//!
//! Security posture: token strings are bearer credentials; audit records only
//! carry [`token_fingerprint`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use ed25519_dalek::Signature;
use ed25519_dalek::Signer;
use ed25519_dalek::SigningKey;
use ed25519_dalek::VerifyingKey;
use rand::RngCore;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::HashAlgorithm;
use crate::core::KeyId;
use crate::core::PrincipalId;
use crate::core::ProductId;
use crate::core::Timestamp;
use crate::core::TransferId;
use crate::core::canonical_json_bytes;
use crate::core::hash_bytes;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Random nonce length in bytes.
const NONCE_BYTES: usize = 12;
/// Number of digest characters kept in a token fingerprint.
const FINGERPRINT_CHARS: usize = 16;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Token purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    /// Exchanged once for a download token.
    Claim,
    /// Presented on manifest and chunk fetches.
    Download,
}

/// Signed token claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenClaims {
    /// Token purpose.
    pub typ: TokenType,
    /// Bound transfer.
    pub transfer_id: TransferId,
    /// Bound product.
    pub product_id: ProductId,
    /// Bound recipient.
    pub recipient_id: PrincipalId,
    /// Bound key (claim tokens only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_id: Option<KeyId>,
    /// Issue time.
    pub iat: Timestamp,
    /// Expiry time.
    pub exp: Timestamp,
    /// Random nonce (base64url).
    pub nonce: String,
}

/// Token errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    /// Token is not two base64url segments of valid claims.
    #[error("token malformed")]
    Malformed,
    /// Signature does not verify.
    #[error("token signature invalid")]
    BadSignature,
    /// Token type does not match the expected purpose.
    #[error("token type mismatch")]
    WrongType,
    /// Token has expired.
    #[error("token expired")]
    Expired,
    /// Claims could not be canonicalized for signing.
    #[error("token signing failed: {0}")]
    Signing(String),
}

// ============================================================================
// SECTION: Signer
// ============================================================================

/// Ed25519 token signer and verifier.
#[derive(Clone)]
pub struct TokenSigner {
    /// Signing key.
    signing_key: SigningKey,
    /// Verifying key derived from the signing key.
    verifying_key: VerifyingKey,
}

impl TokenSigner {
    /// Creates a signer from a 32-byte Ed25519 seed.
    #[must_use]
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(seed);
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Returns the public verifying key bytes.
    #[must_use]
    pub fn public_key(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }

    /// Builds claims with a fresh random nonce.
    #[must_use]
    pub fn claims(
        typ: TokenType,
        binding: TokenBinding,
        issued_at: Timestamp,
        expires_at: Timestamp,
    ) -> TokenClaims {
        let mut nonce = [0u8; NONCE_BYTES];
        rand::thread_rng().fill_bytes(&mut nonce);
        TokenClaims {
            typ,
            transfer_id: binding.transfer_id,
            product_id: binding.product_id,
            recipient_id: binding.recipient_id,
            key_id: binding.key_id,
            iat: issued_at,
            exp: expires_at,
            nonce: URL_SAFE_NO_PAD.encode(nonce),
        }
    }

    /// Signs claims into a token string.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Signing`] when canonicalization fails.
    pub fn sign(&self, claims: &TokenClaims) -> Result<String, TokenError> {
        let payload =
            canonical_json_bytes(claims).map_err(|err| TokenError::Signing(err.to_string()))?;
        let signature = self.signing_key.sign(&payload);
        let mut token = URL_SAFE_NO_PAD.encode(&payload);
        token.push('.');
        token.push_str(&URL_SAFE_NO_PAD.encode(signature.to_bytes()));
        Ok(token)
    }

    /// Verifies a token's signature, purpose, and expiry.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError`] describing the first failed check.
    pub fn verify(
        &self,
        token: &str,
        expected: TokenType,
        now: Timestamp,
    ) -> Result<TokenClaims, TokenError> {
        let (payload_part, signature_part) = token.split_once('.').ok_or(TokenError::Malformed)?;
        let payload = URL_SAFE_NO_PAD.decode(payload_part).map_err(|_| TokenError::Malformed)?;
        let signature_bytes =
            URL_SAFE_NO_PAD.decode(signature_part).map_err(|_| TokenError::Malformed)?;
        let signature =
            Signature::from_slice(&signature_bytes).map_err(|_| TokenError::Malformed)?;
        self.verifying_key
            .verify_strict(&payload, &signature)
            .map_err(|_| TokenError::BadSignature)?;
        let claims: TokenClaims =
            serde_json::from_slice(&payload).map_err(|_| TokenError::Malformed)?;
        if claims.typ != expected {
            return Err(TokenError::WrongType);
        }
        if now.has_reached(claims.exp) {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }
}

/// Identifiers a token binds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenBinding {
    /// Bound transfer.
    pub transfer_id: TransferId,
    /// Bound product.
    pub product_id: ProductId,
    /// Bound recipient.
    pub recipient_id: PrincipalId,
    /// Bound key.
    pub key_id: Option<KeyId>,
}

/// Returns a short digest of a token suitable for audit logs.
#[must_use]
pub fn token_fingerprint(token: &str) -> String {
    let digest = hash_bytes(HashAlgorithm::Sha256, token.as_bytes());
    digest.value.chars().take(FINGERPRINT_CHARS).collect()
}
