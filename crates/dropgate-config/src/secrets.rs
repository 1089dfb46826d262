// crates/dropgate-config/src/secrets.rs
// ============================================================================
// Module: Dropgate Secrets
// Description: Resolution of secrets named by the config.
// Purpose: Read signing, envelope, webhook, payment, and bearer secrets.
// Dependencies: base64, crate::config
// ============================================================================

//! ## Overview
//! Secrets are never stored in the config file. Each is read from the
//! environment variable the config names; binary keys are standard base64 of
//! exactly [`SECRET_KEY_BYTES`] bytes. Resolution goes through a lookup
//! function so callers and tests can supply their own environment.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::config::ConfigError;
use crate::config::DropgateConfig;
use crate::config::PaymentProvider;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Byte length of the signing seed and the envelope key.
pub const SECRET_KEY_BYTES: usize = 32;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Principal with its resolved bearer token.
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedPrincipal {
    /// Principal identifier.
    pub id: String,
    /// Bearer token.
    pub token: String,
}

impl fmt::Debug for ResolvedPrincipal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedPrincipal").field("id", &self.id).finish_non_exhaustive()
    }
}

/// Secrets read from the environment.
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedSecrets {
    /// Ed25519 seed for token signing.
    pub signing_seed: [u8; SECRET_KEY_BYTES],
    /// Envelope wrapping key.
    pub envelope_key: [u8; SECRET_KEY_BYTES],
    /// Shared webhook secret.
    pub webhook_secret: String,
    /// Payment API key (http provider only).
    pub payment_api_key: Option<String>,
    /// Static principals with bearer tokens.
    pub principals: Vec<ResolvedPrincipal>,
}

impl fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field("principals", &self.principals)
            .finish_non_exhaustive()
    }
}

impl ResolvedSecrets {
    /// Resolves secrets from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingSecret`] when a variable is unset,
    /// empty, or malformed.
    pub fn from_env(config: &DropgateConfig) -> Result<Self, ConfigError> {
        Self::resolve(config, |name| std::env::var(name).ok())
    }

    /// Resolves secrets through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingSecret`] when a variable is unset,
    /// empty, or malformed.
    pub fn resolve(
        config: &DropgateConfig,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let secrets = &config.secrets;
        let signing_seed = read_key(&lookup, &secrets.signing_seed_env)?;
        let envelope_key = read_key(&lookup, &secrets.envelope_key_env)?;
        let webhook_secret = read_text(&lookup, &secrets.webhook_secret_env)?;
        let payment_api_key = match config.payments.provider {
            PaymentProvider::Http => Some(read_text(&lookup, &secrets.payment_api_key_env)?),
            PaymentProvider::Mock => None,
        };
        let principals = config
            .identity
            .principals
            .iter()
            .map(|principal| {
                Ok(ResolvedPrincipal {
                    id: principal.id.clone(),
                    token: read_text(&lookup, &principal.token_env)?,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;
        Ok(Self {
            signing_seed,
            envelope_key,
            webhook_secret,
            payment_api_key,
            principals,
        })
    }
}

/// Encodes a key for display by key generation tooling.
#[must_use]
pub fn encode_key(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Reads a non-empty text secret.
fn read_text(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<String, ConfigError> {
    match lookup(name) {
        Some(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(ConfigError::MissingSecret(format!("{name} is not set"))),
    }
}

/// Reads a base64 key of exactly [`SECRET_KEY_BYTES`] bytes.
fn read_key(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<[u8; SECRET_KEY_BYTES], ConfigError> {
    let text = read_text(lookup, name)?;
    let bytes = STANDARD
        .decode(text.as_bytes())
        .map_err(|_| ConfigError::MissingSecret(format!("{name} is not valid base64")))?;
    <[u8; SECRET_KEY_BYTES]>::try_from(bytes.as_slice()).map_err(|_| {
        ConfigError::MissingSecret(format!("{name} must decode to {SECRET_KEY_BYTES} bytes"))
    })
}
