// crates/dropgate-core/tests/common/mod.rs
// ============================================================================
// Module: Common Test Fixtures
// Description: Shared engine harness and fixtures for delivery tests.
// Purpose: Provide deterministic engines over in-memory backends.
// Dependencies: dropgate-core
// ============================================================================

//! ## Overview
//! Builds a [`DeliveryEngine`] over in-memory stores with a manual clock, a
//! mock payment gateway, and a recording audit sink, plus helpers that drive
//! a product through upload and a transfer through payment.

#![allow(dead_code, reason = "Shared test helpers may be unused in some cases.")]
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test fixtures use unwrap for clarity."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;

use dropgate_core::AuditSink;
use dropgate_core::DeliveryAuditEvent;
use dropgate_core::DeliveryAuditKind;
use dropgate_core::DeliveryConfig;
use dropgate_core::DeliveryEngine;
use dropgate_core::DeliveryNotification;
use dropgate_core::DeliveryServices;
use dropgate_core::EnvelopeSealer;
use dropgate_core::InMemoryBlobStore;
use dropgate_core::InMemoryDeliveryStore;
use dropgate_core::ManualClock;
use dropgate_core::MockPaymentGateway;
use dropgate_core::NewProduct;
use dropgate_core::NoopNotifier;
use dropgate_core::Notifier;
use dropgate_core::NotifyError;
use dropgate_core::OfferRequest;
use dropgate_core::PaymentWebhook;
use dropgate_core::PrincipalId;
use dropgate_core::Product;
use dropgate_core::SharedBlobStore;
use dropgate_core::SharedDeliveryStore;
use dropgate_core::StaticRecipientDirectory;
use dropgate_core::Timestamp;
use dropgate_core::TokenSigner;
use dropgate_core::Transfer;
use dropgate_core::TransferRef;
use dropgate_core::runtime::EVENT_PAYMENT_SUCCEEDED;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// One mebibyte.
pub const MIB: u64 = 1_048_576;
/// Fixed start time for every harness clock.
pub const START_MS: i64 = 1_700_000_000_000;

// ============================================================================
// SECTION: Recording Collaborators
// ============================================================================

/// Audit sink that keeps every event in memory.
#[derive(Default)]
pub struct RecordingAuditSink {
    /// Recorded events.
    events: Mutex<Vec<DeliveryAuditEvent>>,
}

impl RecordingAuditSink {
    /// Returns recorded events.
    pub fn events(&self) -> Vec<DeliveryAuditEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Counts events of one kind.
    pub fn count(&self, kind: DeliveryAuditKind) -> usize {
        self.events().iter().filter(|event| event.kind == kind).count()
    }
}

impl AuditSink for RecordingAuditSink {
    fn record(&self, event: &DeliveryAuditEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// Notifier that always fails.
pub struct FailingNotifier;

impl Notifier for FailingNotifier {
    fn notify(&self, _notification: &DeliveryNotification) -> Result<(), NotifyError> {
        Err(NotifyError("mail relay offline".to_string()))
    }
}

// ============================================================================
// SECTION: Harness
// ============================================================================

/// Engine plus handles to its test collaborators.
pub struct Harness {
    /// Engine under test.
    pub engine: DeliveryEngine,
    /// Relational store shared with the engine.
    pub store: SharedDeliveryStore,
    /// Blob store shared with the engine.
    pub blobs: SharedBlobStore,
    /// Clock shared with the engine.
    pub clock: ManualClock,
    /// Payment gateway shared with the engine.
    pub payments: MockPaymentGateway,
    /// Audit sink shared with the engine.
    pub audit: Arc<RecordingAuditSink>,
    /// Product owner.
    pub seller: PrincipalId,
    /// Buyer.
    pub buyer: PrincipalId,
    /// Principal with no relationship to any transfer.
    pub stranger: PrincipalId,
}

/// Builds a harness with default config and a no-op notifier.
pub fn harness() -> Harness {
    harness_with(DeliveryConfig::default(), Arc::new(NoopNotifier))
}

/// Builds a harness with the given config and notifier.
pub fn harness_with(
    config: DeliveryConfig,
    notifier: Arc<dyn Notifier + Send + Sync>,
) -> Harness {
    let seller = PrincipalId::new("seller-1");
    let buyer = PrincipalId::new("buyer-1");
    let stranger = PrincipalId::new("stranger-1");
    let store = SharedDeliveryStore::from_store(InMemoryDeliveryStore::new());
    let blobs = SharedBlobStore::from_store(InMemoryBlobStore::new());
    let clock = ManualClock::new(Timestamp::from_unix_millis(START_MS));
    let payments = MockPaymentGateway::new("http://payments.test");
    let audit = Arc::new(RecordingAuditSink::default());
    let services = DeliveryServices {
        store: store.clone(),
        blobs: blobs.clone(),
        clock: Arc::new(clock.clone()),
        audit: audit.clone(),
        notifier,
        directory: Arc::new(StaticRecipientDirectory::new([
            seller.clone(),
            buyer.clone(),
            stranger.clone(),
        ])),
        payments: Arc::new(payments.clone()),
    };
    let engine = DeliveryEngine::new(
        services,
        config,
        TokenSigner::from_seed(&[7u8; 32]),
        EnvelopeSealer::new(&[9u8; 32]).unwrap(),
    )
    .unwrap();
    Harness {
        engine,
        store,
        blobs,
        clock,
        payments,
        audit,
        seller,
        buyer,
        stranger,
    }
}

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Deterministic content of `len` bytes.
pub fn content(len: u64) -> Vec<u8> {
    (0 ..= 250u8).cycle().take(usize::try_from(len).unwrap()).collect()
}

/// Product creation request for `size` bytes.
pub fn new_product(size: u64) -> NewProduct {
    NewProduct {
        title: "Field Recordings Vol. 1".to_string(),
        content_type: "application/zip".to_string(),
        size_bytes: size,
        content_hash: None,
        encryption_algorithm: None,
    }
}

/// Uploads `bytes` as a ready product owned by the harness seller.
pub fn upload_product(h: &Harness, bytes: &[u8], chunk_size: u64) -> Product {
    let total = u64::try_from(bytes.len()).unwrap();
    let started = h.engine.start_upload(&h.seller, new_product(total), chunk_size).unwrap();
    let chunk_len = usize::try_from(chunk_size).unwrap();
    for (index, chunk) in bytes.chunks(chunk_len).enumerate() {
        let index = u32::try_from(index).unwrap();
        h.engine
            .uploads()
            .upload_chunk(&h.seller, &started.session.upload_id, index, chunk)
            .unwrap();
    }
    h.engine.uploads().complete_upload(&h.seller, &started.session.upload_id, None).unwrap().product
}

/// Small ready product (3 chunks of 4 bytes, last chunk 2 bytes).
pub fn small_product(h: &Harness) -> Product {
    upload_product(h, &content(10), 4)
}

/// Seller-initiated offer to the harness buyer.
pub fn offer(h: &Harness, product: &Product, price: u64) -> Transfer {
    h.engine
        .transfers()
        .offer(
            &h.seller,
            OfferRequest {
                product_id: product.id.clone(),
                to_recipient_id: h.buyer.clone(),
                price: Some(price),
                currency: None,
                policy: None,
            },
        )
        .unwrap()
        .transfer
}

/// Offers, invoices, and confirms payment.
pub fn paid_transfer(h: &Harness, product: &Product) -> Transfer {
    let transfer = offer(h, product, 1_500);
    h.engine.transfers().invoice(&h.buyer, &TransferRef::Id(transfer.id.clone()), None).unwrap();
    h.engine
        .transfers()
        .handle_payment_webhook(&PaymentWebhook {
            event_type: EVENT_PAYMENT_SUCCEEDED.to_string(),
            transfer_id: transfer.id.clone(),
            payment_ref: Some("pi_test_1".to_string()),
        })
        .unwrap();
    h.engine.transfers().get_transfer(&h.buyer, &transfer.id).unwrap().transfer
}
