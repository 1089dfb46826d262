// crates/dropgate-core/src/runtime/collaborators.rs
// ============================================================================
// Module: Dropgate Local Collaborators
// Description: Mock payment gateway, static directory, and manual clock.
// Purpose: Stand in for external systems in tests and local deployments.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! These collaborators are selected by configuration when no external system
//! is wired in. The mock gateway issues deterministic checkout URLs and never
//! moves money; payment is confirmed through the webhook path like any real
//! gateway.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use crate::core::PrincipalId;
use crate::core::Span;
use crate::core::Timestamp;
use crate::interfaces::CheckoutRequest;
use crate::interfaces::CheckoutSession;
use crate::interfaces::Clock;
use crate::interfaces::PaymentError;
use crate::interfaces::PaymentGateway;
use crate::interfaces::RecipientDirectory;

// ============================================================================
// SECTION: Mock Payment Gateway
// ============================================================================

/// Provider label recorded on intents created by the mock gateway.
pub const MOCK_PROVIDER: &str = "mock";

/// Payment gateway that issues local checkout URLs.
#[derive(Debug, Clone)]
pub struct MockPaymentGateway {
    /// Base URL for generated checkout links.
    base_url: String,
    /// Number of checkouts created.
    created: Arc<AtomicU64>,
}

impl MockPaymentGateway {
    /// Creates a mock gateway rooted at `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            created: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Returns how many checkouts were created.
    #[must_use]
    pub fn checkouts_created(&self) -> u64 {
        self.created.load(Ordering::SeqCst)
    }
}

impl PaymentGateway for MockPaymentGateway {
    fn create_checkout(&self, request: &CheckoutRequest) -> Result<CheckoutSession, PaymentError> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(CheckoutSession {
            provider: MOCK_PROVIDER.to_string(),
            provider_ref: None,
            checkout_url: format!("{}/checkout/{}", self.base_url, request.transfer_id),
        })
    }
}

// ============================================================================
// SECTION: Static Recipient Directory
// ============================================================================

/// Recipient directory backed by a fixed principal set.
#[derive(Debug, Clone, Default)]
pub struct StaticRecipientDirectory {
    /// Known principals.
    principals: BTreeSet<PrincipalId>,
}

impl StaticRecipientDirectory {
    /// Creates a directory from principal ids.
    #[must_use]
    pub fn new(principals: impl IntoIterator<Item = PrincipalId>) -> Self {
        Self {
            principals: principals.into_iter().collect(),
        }
    }
}

impl RecipientDirectory for StaticRecipientDirectory {
    fn contains(&self, principal: &PrincipalId) -> bool {
        self.principals.contains(principal)
    }
}

// ============================================================================
// SECTION: Manual Clock
// ============================================================================

/// Clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    /// Current time in unix milliseconds.
    now_ms: Arc<AtomicI64>,
}

impl ManualClock {
    /// Creates a clock pinned at `start`.
    #[must_use]
    pub fn new(start: Timestamp) -> Self {
        Self {
            now_ms: Arc::new(AtomicI64::new(start.as_unix_millis())),
        }
    }

    /// Advances the clock by `span`.
    pub fn advance(&self, span: Span) {
        self.now_ms.fetch_add(span.as_millis(), Ordering::SeqCst);
    }

    /// Pins the clock at `at`.
    pub fn set(&self, at: Timestamp) {
        self.now_ms.store(at.as_unix_millis(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_unix_millis(self.now_ms.load(Ordering::SeqCst))
    }
}
