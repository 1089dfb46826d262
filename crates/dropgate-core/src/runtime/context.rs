// crates/dropgate-core/src/runtime/context.rs
// ============================================================================
// Module: Dropgate Runtime Context
// Description: Shared collaborators and tunables for every runtime component.
// Purpose: Give components one place to read time, persist, audit, and notify.
// Dependencies: crate::core, crate::interfaces, crate::runtime
// ============================================================================

//! ## Overview
//! [`DeliveryContext`] bundles the stores and collaborators a component needs
//! and the [`DeliveryConfig`] tunables. Components hold it behind an `Arc` so
//! the whole runtime shares one view of configuration and backends. Audit and
//! notification calls made through the context never fail the caller.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use crate::core::DeliveryAuditEvent;
use crate::core::DeliveryAuditEventParams;
use crate::core::DeliveryAuditKind;
use crate::core::DeliveryNotification;
use crate::core::MAX_CHUNK_SIZE_BYTES;
use crate::core::MAX_TOTAL_SIZE_BYTES;
use crate::core::Span;
use crate::core::StorageType;
use crate::core::Timestamp;
use crate::interfaces::AuditSink;
use crate::interfaces::Clock;
use crate::interfaces::Notifier;
use crate::interfaces::PaymentGateway;
use crate::interfaces::RecipientDirectory;
use crate::runtime::error::DeliveryError;
use crate::runtime::retry::RetryPolicy;
use crate::runtime::store::SharedBlobStore;
use crate::runtime::store::SharedDeliveryStore;

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// Default upload session lifetime.
pub const DEFAULT_SESSION_TTL: Span = Span::hours(24);
/// Default key envelope lifetime.
pub const DEFAULT_KEY_TTL: Span = Span::days(7);
/// Default claim token lifetime.
pub const DEFAULT_CLAIM_TOKEN_TTL: Span = Span::hours(24);
/// Default download token lifetime.
pub const DEFAULT_DOWNLOAD_TOKEN_TTL: Span = Span::hours(1);
/// Default dispute window measured from the transfer's last update.
pub const DEFAULT_DISPUTE_WINDOW: Span = Span::days(30);
/// Default currency for offers without one.
pub const DEFAULT_CURRENCY: &str = "USD";

// ============================================================================
// SECTION: Config
// ============================================================================

/// Runtime tunables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryConfig {
    /// Blob backend recorded on new products.
    pub storage_type: StorageType,
    /// Chunk size ceiling (at most [`MAX_CHUNK_SIZE_BYTES`]).
    pub max_chunk_size_bytes: u64,
    /// Total size ceiling (at most [`MAX_TOTAL_SIZE_BYTES`]).
    pub max_total_size_bytes: u64,
    /// Upload session lifetime.
    pub session_ttl: Span,
    /// Key envelope lifetime.
    pub key_ttl: Span,
    /// Claim token lifetime.
    pub claim_token_ttl: Span,
    /// Download token lifetime.
    pub download_token_ttl: Span,
    /// Dispute window when the policy sets no deadline.
    pub dispute_window: Span,
    /// Permit grant from `invoiced` without payment.
    pub allow_unpaid_grant: bool,
    /// Currency used when an offer names none.
    pub default_currency: String,
    /// Externally reachable base URL used for download links.
    pub public_base_url: String,
    /// Retry policy for transient store errors.
    pub retry: RetryPolicy,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            storage_type: StorageType::Memory,
            max_chunk_size_bytes: MAX_CHUNK_SIZE_BYTES,
            max_total_size_bytes: MAX_TOTAL_SIZE_BYTES,
            session_ttl: DEFAULT_SESSION_TTL,
            key_ttl: DEFAULT_KEY_TTL,
            claim_token_ttl: DEFAULT_CLAIM_TOKEN_TTL,
            download_token_ttl: DEFAULT_DOWNLOAD_TOKEN_TTL,
            dispute_window: DEFAULT_DISPUTE_WINDOW,
            allow_unpaid_grant: false,
            default_currency: DEFAULT_CURRENCY.to_string(),
            public_base_url: "http://127.0.0.1:8080".to_string(),
            retry: RetryPolicy::default(),
        }
    }
}

impl DeliveryConfig {
    /// Validates tunables. Size ceilings may only be lowered.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::Configuration`] when a value is out of range.
    pub fn validate(&self) -> Result<(), DeliveryError> {
        if self.max_chunk_size_bytes == 0 || self.max_chunk_size_bytes > MAX_CHUNK_SIZE_BYTES {
            return Err(DeliveryError::Configuration(format!(
                "max_chunk_size_bytes must be in 1..={MAX_CHUNK_SIZE_BYTES}"
            )));
        }
        if self.max_total_size_bytes == 0 || self.max_total_size_bytes > MAX_TOTAL_SIZE_BYTES {
            return Err(DeliveryError::Configuration(format!(
                "max_total_size_bytes must be in 1..={MAX_TOTAL_SIZE_BYTES}"
            )));
        }
        for (name, span) in [
            ("session_ttl", self.session_ttl),
            ("key_ttl", self.key_ttl),
            ("claim_token_ttl", self.claim_token_ttl),
            ("download_token_ttl", self.download_token_ttl),
            ("dispute_window", self.dispute_window),
        ] {
            if span.as_millis() == 0 {
                return Err(DeliveryError::Configuration(format!("{name} must be non-zero")));
            }
        }
        if normalize_currency(&self.default_currency).is_none() {
            return Err(DeliveryError::Configuration(
                "default_currency must be three ASCII letters".to_string(),
            ));
        }
        Ok(())
    }
}

/// Normalizes a currency code to three upper-case ASCII letters.
#[must_use]
pub fn normalize_currency(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.len() == 3 && trimmed.bytes().all(|b| b.is_ascii_alphabetic()) {
        Some(trimmed.to_ascii_uppercase())
    } else {
        None
    }
}

// ============================================================================
// SECTION: Context
// ============================================================================

/// Collaborators shared by runtime components.
#[derive(Clone)]
pub struct DeliveryServices {
    /// Relational store.
    pub store: SharedDeliveryStore,
    /// Blob store.
    pub blobs: SharedBlobStore,
    /// Time source.
    pub clock: Arc<dyn Clock + Send + Sync>,
    /// Audit sink.
    pub audit: Arc<dyn AuditSink>,
    /// Outbound notifier.
    pub notifier: Arc<dyn Notifier + Send + Sync>,
    /// Recipient directory.
    pub directory: Arc<dyn RecipientDirectory + Send + Sync>,
    /// Payment gateway.
    pub payments: Arc<dyn PaymentGateway + Send + Sync>,
}

/// Services plus tunables shared by every component.
pub struct DeliveryContext {
    /// Collaborators.
    pub services: DeliveryServices,
    /// Tunables.
    pub config: DeliveryConfig,
}

impl DeliveryContext {
    /// Creates a context after validating the config.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::Configuration`] when the config is invalid.
    pub fn new(services: DeliveryServices, config: DeliveryConfig) -> Result<Self, DeliveryError> {
        config.validate()?;
        Ok(Self {
            services,
            config,
        })
    }

    /// Returns the relational store.
    #[must_use]
    pub const fn store(&self) -> &SharedDeliveryStore {
        &self.services.store
    }

    /// Returns the blob store.
    #[must_use]
    pub const fn blobs(&self) -> &SharedBlobStore {
        &self.services.blobs
    }

    /// Returns the current time.
    #[must_use]
    pub fn now(&self) -> Timestamp {
        self.services.clock.now()
    }

    /// Runs a store operation under the retry policy.
    ///
    /// # Errors
    ///
    /// Returns the operation's error once retries are exhausted.
    pub fn retry<T>(
        &self,
        operation: impl FnMut() -> Result<T, DeliveryError>,
    ) -> Result<T, DeliveryError> {
        self.config.retry.run(operation)
    }

    /// Records an audit event stamped with the current time.
    pub fn audit(&self, params: DeliveryAuditEventParams) {
        self.services.audit.record(&DeliveryAuditEvent::new(params));
    }

    /// Delivers a notification, auditing (never propagating) failures.
    pub fn notify(&self, notification: &DeliveryNotification) {
        if let Err(err) = self.services.notifier.notify(notification) {
            self.audit(DeliveryAuditEventParams {
                kind: DeliveryAuditKind::NotificationFailed,
                at: self.now(),
                actor: None,
                product_id: Some(notification.product_id.clone()),
                transfer_id: Some(notification.transfer_id.clone()),
                from_status: None,
                to_status: Some(notification.status),
                detail: Some(err.to_string()),
            });
        }
    }
}
