// crates/dropgate-core/src/runtime/retry.rs
// ============================================================================
// Module: Dropgate Store Retry
// Description: Bounded retry with linear backoff for transient store failures.
// Purpose: Absorb busy/locked storage without surfacing errors to callers.
// Dependencies: crate::runtime::error
// ============================================================================

//! ## Overview
//! Relational mutations run through [`RetryPolicy::run`]. Only
//! [`DeliveryError::Transient`] is retried; every other error returns
//! immediately. The wait before attempt `n + 1` is `base_backoff_ms * n`.

use std::thread;
use std::time::Duration;

use crate::runtime::error::DeliveryError;

/// Default number of attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Default base backoff in milliseconds.
pub const DEFAULT_BASE_BACKOFF_MS: u64 = 200;

/// Retry policy for transient store errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first (minimum 1).
    pub max_attempts: u32,
    /// Linear backoff unit in milliseconds.
    pub base_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_backoff_ms: DEFAULT_BASE_BACKOFF_MS,
        }
    }
}

impl RetryPolicy {
    /// Runs `operation`, retrying transient failures.
    ///
    /// # Errors
    ///
    /// Returns the last error once attempts are exhausted, or the first
    /// non-transient error.
    pub fn run<T>(
        &self,
        mut operation: impl FnMut() -> Result<T, DeliveryError>,
    ) -> Result<T, DeliveryError> {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match operation() {
                Err(err) if err.is_transient() && attempt < attempts => {
                    let wait = self.base_backoff_ms.saturating_mul(u64::from(attempt));
                    if wait > 0 {
                        thread::sleep(Duration::from_millis(wait));
                    }
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}
