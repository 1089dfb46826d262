// crates/dropgate-core/src/interfaces/mod.rs
// ============================================================================
// Module: Dropgate Interfaces
// Description: Backend-agnostic seams for storage, payments, identity, and audit.
// Purpose: Define the contract surfaces consumed by the Dropgate runtime.
// Dependencies: crate::core, serde, thiserror
// ============================================================================

//! ## Overview
//! Interfaces define how Dropgate integrates with relational storage, blob
//! storage, payment gateways, recipient directories, and notification
//! channels without embedding backend-specific details. Implementations must
//! fail closed on missing or invalid data.
//!
//! Every multi-row mutation is expressed as one [`TransferChange`] so a
//! backend can apply it in a single transaction guarded by the expected
//! transfer status.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::core::DeliveryAuditEvent;
use crate::core::DeliveryNotification;
use crate::core::DeliveryReceipt;
use crate::core::KeyId;
use crate::core::PaymentIntent;
use crate::core::PrincipalId;
use crate::core::Product;
use crate::core::ProductId;
use crate::core::ProductKey;
use crate::core::Timestamp;
use crate::core::Transfer;
use crate::core::TransferId;
use crate::core::TransferStatus;

// ============================================================================
// SECTION: Delivery Store
// ============================================================================

/// Relational store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Busy, locked, or otherwise retryable failure.
    #[error("delivery store transient error: {0}")]
    Transient(String),
    /// Uniqueness or compare-and-set violation.
    #[error("delivery store conflict: {0}")]
    Conflict(String),
    /// Row addressed by an update does not exist.
    #[error("delivery store missing record: {0}")]
    NotFound(String),
    /// Stored data failed to decode.
    #[error("delivery store corruption: {0}")]
    Corrupt(String),
    /// Caller supplied data the store refuses.
    #[error("delivery store invalid data: {0}")]
    Invalid(String),
    /// Backend I/O error.
    #[error("delivery store io error: {0}")]
    Io(String),
}

/// Key mutation attached to a transfer change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyChange {
    /// Insert a freshly minted key.
    Insert(ProductKey),
    /// Set an existing key's expiry.
    Expire {
        /// Key to expire.
        key_id: KeyId,
        /// New expiry.
        expires_at: Timestamp,
    },
}

/// Atomic transfer mutation with optional side rows.
///
/// # Invariants
/// - Applied only when the stored transfer status equals `expected_status`.
/// - Either every row is written or none is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferChange {
    /// Transfer row to write.
    pub transfer: Transfer,
    /// Status the stored row must hold for the change to apply.
    pub expected_status: TransferStatus,
    /// Payment intent row to upsert.
    pub payment: Option<PaymentIntent>,
    /// Receipt row to insert (unique per transfer).
    pub receipt: Option<DeliveryReceipt>,
    /// Key row change.
    pub key: Option<KeyChange>,
}

impl TransferChange {
    /// Creates a change that only rewrites the transfer row.
    #[must_use]
    pub const fn transfer_only(transfer: Transfer, expected_status: TransferStatus) -> Self {
        Self {
            transfer,
            expected_status,
            payment: None,
            receipt: None,
            key: None,
        }
    }
}

/// Durable store for products, transfers, keys, intents, and receipts.
pub trait DeliveryStore {
    /// Inserts a product.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when the id already exists.
    fn insert_product(&self, product: &Product) -> Result<(), StoreError>;

    /// Loads a product by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn get_product(&self, product_id: &ProductId) -> Result<Option<Product>, StoreError>;

    /// Rewrites an existing product.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the product does not exist.
    fn update_product(&self, product: &Product) -> Result<(), StoreError>;

    /// Inserts a transfer.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when the id exists or another active
    /// transfer already covers the same product and recipient.
    fn insert_transfer(&self, transfer: &Transfer) -> Result<(), StoreError>;

    /// Loads a transfer by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn get_transfer(&self, transfer_id: &TransferId) -> Result<Option<Transfer>, StoreError>;

    /// Lists transfers for a product and recipient, most recently updated first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn find_transfers(
        &self,
        product_id: &ProductId,
        recipient_id: &PrincipalId,
    ) -> Result<Vec<Transfer>, StoreError>;

    /// Applies a guarded transfer change atomically.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when the stored status differs from
    /// the expected status or a unique row already exists, and
    /// [`StoreError::NotFound`] when the transfer does not exist.
    fn apply_transfer_change(&self, change: &TransferChange) -> Result<(), StoreError>;

    /// Loads the payment intent for a transfer.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn get_payment_intent(
        &self,
        transfer_id: &TransferId,
    ) -> Result<Option<PaymentIntent>, StoreError>;

    /// Upserts a payment intent without touching the transfer.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn put_payment_intent(&self, intent: &PaymentIntent) -> Result<(), StoreError>;

    /// Loads a key by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn get_key(&self, key_id: &KeyId) -> Result<Option<ProductKey>, StoreError>;

    /// Loads the newest key for a product and recipient that is live at `now`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn get_live_key(
        &self,
        product_id: &ProductId,
        recipient_id: &PrincipalId,
        now: Timestamp,
    ) -> Result<Option<ProductKey>, StoreError>;

    /// Loads the receipt for a transfer.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn get_receipt(&self, transfer_id: &TransferId)
    -> Result<Option<DeliveryReceipt>, StoreError>;

    /// Checks backend connectivity.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the backend is unreachable.
    fn readiness(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

// ============================================================================
// SECTION: Blob Store
// ============================================================================

/// Blob store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlobError {
    /// Key is not a safe relative path.
    #[error("blob key invalid: {0}")]
    InvalidKey(String),
    /// Backend I/O error.
    #[error("blob store io error: {0}")]
    Io(String),
    /// Backend reported an error.
    #[error("blob store error: {0}")]
    Backend(String),
    /// Document failed to encode or decode.
    #[error("blob document error: {0}")]
    Document(String),
}

/// Byte blob store addressed by slash-separated keys.
pub trait BlobStore {
    /// Writes a blob, replacing any existing value.
    ///
    /// # Errors
    ///
    /// Returns [`BlobError`] when the write fails.
    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), BlobError>;

    /// Reads a blob.
    ///
    /// # Errors
    ///
    /// Returns [`BlobError`] when the read fails.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BlobError>;

    /// Deletes a blob. Deleting a missing key succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`BlobError`] when the delete fails.
    fn delete(&self, key: &str) -> Result<(), BlobError>;

    /// Lists keys under a prefix in lexicographic order.
    ///
    /// # Errors
    ///
    /// Returns [`BlobError`] when the listing fails.
    fn list_prefix(&self, prefix: &str) -> Result<Vec<String>, BlobError>;
}

/// Serializes `value` as JSON and stores it at `key`.
///
/// # Errors
///
/// Returns [`BlobError`] when encoding or the write fails.
pub fn put_json_document<T: Serialize + ?Sized>(
    store: &dyn BlobStore,
    key: &str,
    value: &T,
) -> Result<(), BlobError> {
    let bytes = serde_json::to_vec(value).map_err(|err| BlobError::Document(err.to_string()))?;
    store.put(key, &bytes)
}

/// Loads and decodes a JSON document stored at `key`.
///
/// # Errors
///
/// Returns [`BlobError`] when the read or decoding fails.
pub fn get_json_document<T: DeserializeOwned>(
    store: &dyn BlobStore,
    key: &str,
) -> Result<Option<T>, BlobError> {
    let Some(bytes) = store.get(key)? else {
        return Ok(None);
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|err| BlobError::Document(err.to_string()))
}

// ============================================================================
// SECTION: Payment Gateway
// ============================================================================

/// Checkout request sent to the payment gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    /// Transfer being paid for (echoed back by the webhook).
    pub transfer_id: TransferId,
    /// Product being sold.
    pub product_id: ProductId,
    /// Paying recipient.
    pub recipient_id: PrincipalId,
    /// Amount in currency minor units.
    pub amount: u64,
    /// Upper-case currency code.
    pub currency: String,
    /// Line item description.
    pub description: String,
}

/// Checkout session returned by the payment gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSession {
    /// Gateway label.
    pub provider: String,
    /// Gateway reference when known at creation.
    pub provider_ref: Option<String>,
    /// URL the buyer follows to pay.
    pub checkout_url: String,
}

/// Payment gateway errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaymentError {
    /// Gateway unreachable or rate limited.
    #[error("payment gateway unavailable: {0}")]
    Unavailable(String),
    /// Gateway refused the request.
    #[error("payment gateway rejected request: {0}")]
    Rejected(String),
}

/// Payment gateway collaborator.
pub trait PaymentGateway {
    /// Creates a checkout session for a transfer.
    ///
    /// # Errors
    ///
    /// Returns [`PaymentError`] when the gateway fails.
    fn create_checkout(&self, request: &CheckoutRequest) -> Result<CheckoutSession, PaymentError>;
}

// ============================================================================
// SECTION: Recipient Directory
// ============================================================================

/// Directory of principals that may receive transfers.
pub trait RecipientDirectory {
    /// Returns true when the principal exists.
    fn contains(&self, principal: &PrincipalId) -> bool;
}

// ============================================================================
// SECTION: Notifier
// ============================================================================

/// Notification delivery errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("notification failed: {0}")]
pub struct NotifyError(pub String);

/// Outbound notification channel. Failures never fail the primary operation.
pub trait Notifier {
    /// Delivers a notification.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError`] when delivery fails.
    fn notify(&self, notification: &DeliveryNotification) -> Result<(), NotifyError>;
}

/// Notifier that discards every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _notification: &DeliveryNotification) -> Result<(), NotifyError> {
        Ok(())
    }
}

// ============================================================================
// SECTION: Audit Sink
// ============================================================================

/// Audit sink for delivery events.
pub trait AuditSink: Send + Sync {
    /// Records an audit event.
    fn record(&self, event: &DeliveryAuditEvent);
}

/// No-op audit sink.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record(&self, _event: &DeliveryAuditEvent) {}
}

// ============================================================================
// SECTION: Clock
// ============================================================================

/// Time source for expiry decisions.
pub trait Clock {
    /// Returns the current time.
    fn now(&self) -> Timestamp;
}

/// Wall-clock time source.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now_utc()
    }
}
