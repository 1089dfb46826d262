// crates/dropgate-server/src/blob_keys.rs
// ============================================================================
// Module: Blob Key Validation
// Description: Shared key and prefix checks for durable blob backends.
// Purpose: Reject traversal, absolute paths, and oversized keys fail-closed.
// Dependencies: dropgate-core
// ============================================================================

//! ## Overview
//! Blob keys are slash-separated relative paths such as
//! `products/{id}/chunks/000001`. Every durable backend validates keys here
//! before touching disk or object storage. Storage is untrusted, so keys are
//! checked on reads as well as writes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use dropgate_core::BlobError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum length of a single key segment.
pub const MAX_KEY_SEGMENT_LENGTH: usize = 255;
/// Maximum total key length.
pub const MAX_KEY_LENGTH: usize = 4096;

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Validates a blob key.
///
/// # Errors
///
/// Returns [`BlobError::InvalidKey`] when the key is empty, absolute,
/// too long, or contains traversal or hidden segments.
pub fn validate_key(key: &str) -> Result<(), BlobError> {
    if key.is_empty() {
        return Err(BlobError::InvalidKey("key must be set".to_string()));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(BlobError::InvalidKey("key exceeds length limit".to_string()));
    }
    if key.starts_with('/') {
        return Err(BlobError::InvalidKey("key must be relative".to_string()));
    }
    key.split('/').try_for_each(validate_segment)
}

/// Validates a listing prefix. An empty prefix or a trailing slash is allowed.
///
/// # Errors
///
/// Returns [`BlobError::InvalidKey`] when a complete segment is invalid.
pub fn validate_prefix(prefix: &str) -> Result<(), BlobError> {
    if prefix.is_empty() {
        return Ok(());
    }
    validate_key(prefix.strip_suffix('/').unwrap_or(prefix))
}

/// Normalizes a configured root prefix to `""` or `"segment/.../"`.
///
/// # Errors
///
/// Returns [`BlobError::InvalidKey`] when the prefix is absolute or invalid.
pub fn normalize_prefix(raw: &str) -> Result<String, BlobError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(String::new());
    }
    if trimmed.starts_with('/') {
        return Err(BlobError::InvalidKey(
            "prefix must be relative (no leading slash)".to_string(),
        ));
    }
    let normalized = trimmed.strip_suffix('/').unwrap_or(trimmed);
    validate_key(normalized)?;
    Ok(format!("{normalized}/"))
}

/// Validates a single key segment.
fn validate_segment(value: &str) -> Result<(), BlobError> {
    if value.is_empty() {
        return Err(BlobError::InvalidKey("key segment is empty".to_string()));
    }
    if value.starts_with('.') {
        return Err(BlobError::InvalidKey("key segment must not start with '.'".to_string()));
    }
    if value.len() > MAX_KEY_SEGMENT_LENGTH {
        return Err(BlobError::InvalidKey("key segment exceeds length limit".to_string()));
    }
    if value.contains('\\') || value.chars().any(char::is_control) {
        return Err(BlobError::InvalidKey("key segment contains invalid characters".to_string()));
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
