// crates/dropgate-core/src/core/time.rs
// ============================================================================
// Module: Dropgate Time Model
// Description: Canonical timestamps and durations for expiry decisions.
// Purpose: Keep every expiry check an explicit timestamp comparison.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! Dropgate evaluates key, token, session, and dispute expiry at use time by
//! comparing unix-millisecond timestamps. The runtime never reads the wall
//! clock directly; it asks a [`crate::interfaces::Clock`] so tests can pin
//! time.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Milliseconds per second.
const MILLIS_PER_SECOND: i64 = 1_000;
/// Milliseconds per minute.
const MILLIS_PER_MINUTE: i64 = 60 * MILLIS_PER_SECOND;
/// Milliseconds per hour.
const MILLIS_PER_HOUR: i64 = 60 * MILLIS_PER_MINUTE;
/// Milliseconds per day.
const MILLIS_PER_DAY: i64 = 24 * MILLIS_PER_HOUR;

// ============================================================================
// SECTION: Timestamp
// ============================================================================

/// Unix-epoch millisecond timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from unix milliseconds.
    #[must_use]
    pub const fn from_unix_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the current wall-clock time.
    #[must_use]
    pub fn now_utc() -> Self {
        let now = OffsetDateTime::now_utc();
        let millis = now.unix_timestamp_nanos() / 1_000_000;
        Self(i64::try_from(millis).unwrap_or(i64::MAX))
    }

    /// Returns the timestamp as unix milliseconds.
    #[must_use]
    pub const fn as_unix_millis(self) -> i64 {
        self.0
    }

    /// Returns the timestamp as whole unix seconds.
    #[must_use]
    pub const fn as_unix_seconds(self) -> i64 {
        self.0 / MILLIS_PER_SECOND
    }

    /// Returns this timestamp advanced by the given span (saturating).
    #[must_use]
    pub const fn saturating_add(self, span: Span) -> Self {
        Self(self.0.saturating_add(span.0))
    }

    /// Returns true when `self` is at or after `deadline`.
    #[must_use]
    pub const fn has_reached(self, deadline: Self) -> bool {
        self.0 >= deadline.0
    }

    /// Formats the timestamp as RFC 3339 for API responses.
    #[must_use]
    pub fn to_rfc3339(self) -> String {
        let nanos = i128::from(self.0) * 1_000_000;
        OffsetDateTime::from_unix_timestamp_nanos(nanos)
            .ok()
            .and_then(|value| value.format(&Rfc3339).ok())
            .unwrap_or_else(|| self.0.to_string())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// SECTION: Span
// ============================================================================

/// Non-negative duration in milliseconds used for TTLs and windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Span(i64);

impl Span {
    /// Span of the given number of milliseconds (negative clamps to zero).
    #[must_use]
    pub const fn millis(value: i64) -> Self {
        if value < 0 { Self(0) } else { Self(value) }
    }

    /// Span of the given number of seconds.
    #[must_use]
    pub const fn seconds(value: i64) -> Self {
        Self::millis(value.saturating_mul(MILLIS_PER_SECOND))
    }

    /// Span of the given number of minutes.
    #[must_use]
    pub const fn minutes(value: i64) -> Self {
        Self::millis(value.saturating_mul(MILLIS_PER_MINUTE))
    }

    /// Span of the given number of hours.
    #[must_use]
    pub const fn hours(value: i64) -> Self {
        Self::millis(value.saturating_mul(MILLIS_PER_HOUR))
    }

    /// Span of the given number of days.
    #[must_use]
    pub const fn days(value: i64) -> Self {
        Self::millis(value.saturating_mul(MILLIS_PER_DAY))
    }

    /// Returns the span in milliseconds.
    #[must_use]
    pub const fn as_millis(self) -> i64 {
        self.0
    }
}
