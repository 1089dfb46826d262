// crates/dropgate-core/src/runtime/envelope.rs
// ============================================================================
// Module: Dropgate Key Envelopes
// Description: Per-recipient content keys sealed with ChaCha20-Poly1305.
// Purpose: Produce key envelopes bound to one product and one recipient.
// Dependencies: base64, chacha20poly1305, rand
// ============================================================================

//! ## Overview
//! Each envelope wraps a fresh random 256-bit content key. The key is sealed
//! under the configured envelope key with associated data naming the product
//! and the recipient, so an envelope moved to another binding fails to open.
//! The serialized form is base64 of `nonce || ciphertext`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chacha20poly1305::ChaCha20Poly1305;
use chacha20poly1305::Nonce;
use chacha20poly1305::aead::Aead;
use chacha20poly1305::aead::AeadCore;
use chacha20poly1305::aead::KeyInit;
use chacha20poly1305::aead::Payload;
use rand::RngCore;
use rand::rngs::OsRng;
use thiserror::Error;

use crate::core::DEFAULT_ENCRYPTION_ALGORITHM;
use crate::core::KeyEnvelope;
use crate::core::PrincipalId;
use crate::core::ProductId;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Content key length in bytes.
pub const CONTENT_KEY_BYTES: usize = 32;
/// ChaCha20-Poly1305 nonce length in bytes.
const NONCE_BYTES: usize = 12;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Envelope sealing errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    /// Envelope key has the wrong length.
    #[error("envelope key must be 32 bytes")]
    InvalidKey,
    /// Envelope algorithm label is not supported.
    #[error("unsupported envelope algorithm: {0}")]
    UnsupportedAlgorithm(String),
    /// Envelope payload is not valid base64 or too short.
    #[error("envelope payload malformed")]
    Malformed,
    /// AEAD encryption or decryption failed.
    #[error("envelope cryptography failed")]
    Crypto,
}

// ============================================================================
// SECTION: Sealer
// ============================================================================

/// Seals and opens content-key envelopes.
#[derive(Clone)]
pub struct EnvelopeSealer {
    /// AEAD cipher keyed with the envelope key.
    cipher: ChaCha20Poly1305,
}

impl EnvelopeSealer {
    /// Creates a sealer from a 32-byte envelope key.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::InvalidKey`] when the key length is wrong.
    pub fn new(envelope_key: &[u8]) -> Result<Self, EnvelopeError> {
        let cipher =
            ChaCha20Poly1305::new_from_slice(envelope_key).map_err(|_| EnvelopeError::InvalidKey)?;
        Ok(Self {
            cipher,
        })
    }

    /// Generates a fresh content key and seals it for the binding.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Crypto`] when encryption fails.
    pub fn seal_new(
        &self,
        product_id: &ProductId,
        recipient_id: &PrincipalId,
    ) -> Result<KeyEnvelope, EnvelopeError> {
        let mut content_key = [0u8; CONTENT_KEY_BYTES];
        OsRng.fill_bytes(&mut content_key);
        self.seal(&content_key, product_id, recipient_id)
    }

    /// Seals a content key for the binding.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Crypto`] when encryption fails.
    pub fn seal(
        &self,
        content_key: &[u8; CONTENT_KEY_BYTES],
        product_id: &ProductId,
        recipient_id: &PrincipalId,
    ) -> Result<KeyEnvelope, EnvelopeError> {
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let aad = associated_data(product_id, recipient_id);
        let ciphertext = self
            .cipher
            .encrypt(
                &nonce,
                Payload {
                    msg: content_key,
                    aad: &aad,
                },
            )
            .map_err(|_| EnvelopeError::Crypto)?;
        let mut sealed = Vec::with_capacity(NONCE_BYTES + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(KeyEnvelope {
            algorithm: DEFAULT_ENCRYPTION_ALGORITHM.to_string(),
            sealed: STANDARD.encode(sealed),
        })
    }

    /// Opens an envelope for the binding and returns the content key.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError`] when the envelope is malformed, uses another
    /// algorithm, or was sealed for a different binding.
    pub fn open(
        &self,
        envelope: &KeyEnvelope,
        product_id: &ProductId,
        recipient_id: &PrincipalId,
    ) -> Result<[u8; CONTENT_KEY_BYTES], EnvelopeError> {
        if envelope.algorithm != DEFAULT_ENCRYPTION_ALGORITHM {
            return Err(EnvelopeError::UnsupportedAlgorithm(envelope.algorithm.clone()));
        }
        let sealed = STANDARD.decode(&envelope.sealed).map_err(|_| EnvelopeError::Malformed)?;
        if sealed.len() <= NONCE_BYTES {
            return Err(EnvelopeError::Malformed);
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_BYTES);
        let aad = associated_data(product_id, recipient_id);
        let plaintext = self
            .cipher
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad: &aad,
                },
            )
            .map_err(|_| EnvelopeError::Crypto)?;
        plaintext.try_into().map_err(|_| EnvelopeError::Malformed)
    }
}

/// Associated data binding an envelope to its product and recipient.
fn associated_data(product_id: &ProductId, recipient_id: &PrincipalId) -> Vec<u8> {
    format!("dropgate:v1:{product_id}:{recipient_id}").into_bytes()
}
