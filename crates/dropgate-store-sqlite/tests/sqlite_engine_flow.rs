// crates/dropgate-store-sqlite/tests/sqlite_engine_flow.rs
// ============================================================================
// Module: SQLite Engine Flow Tests
// Description: Full delivery lifecycle driven through the SQLite store.
// ============================================================================

//! ## Overview
//! Runs upload, offer, payment, grant, claim, download, and acknowledgement
//! against a file-backed store, then reopens the database to confirm the
//! lifecycle survives a restart.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions use unwrap for clarity."
)]

use std::path::Path;
use std::sync::Arc;

use dropgate_core::AcknowledgeRequest;
use dropgate_core::DeliveryConfig;
use dropgate_core::DeliveryEngine;
use dropgate_core::DeliveryError;
use dropgate_core::DeliveryServices;
use dropgate_core::DeliveryStore;
use dropgate_core::DownloadCredentials;
use dropgate_core::EnvelopeSealer;
use dropgate_core::InMemoryBlobStore;
use dropgate_core::ManualClock;
use dropgate_core::MockPaymentGateway;
use dropgate_core::NewProduct;
use dropgate_core::NoopAuditSink;
use dropgate_core::NoopNotifier;
use dropgate_core::OfferRequest;
use dropgate_core::PaymentWebhook;
use dropgate_core::PrincipalId;
use dropgate_core::SharedBlobStore;
use dropgate_core::SharedDeliveryStore;
use dropgate_core::StaticRecipientDirectory;
use dropgate_core::Timestamp;
use dropgate_core::TokenSigner;
use dropgate_core::TransferRef;
use dropgate_core::TransferStatus;
use dropgate_core::runtime::EVENT_PAYMENT_SUCCEEDED;
use dropgate_store_sqlite::SqliteDeliveryStore;
use dropgate_store_sqlite::SqliteStoreConfig;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn engine_over(path: &Path, blobs: &SharedBlobStore) -> DeliveryEngine {
    let store = SqliteDeliveryStore::new(SqliteStoreConfig::for_path(path)).unwrap();
    let services = DeliveryServices {
        store: SharedDeliveryStore::from_store(store),
        blobs: blobs.clone(),
        clock: Arc::new(ManualClock::new(Timestamp::from_unix_millis(1_700_000_000_000))),
        audit: Arc::new(NoopAuditSink),
        notifier: Arc::new(NoopNotifier),
        directory: Arc::new(StaticRecipientDirectory::new([
            PrincipalId::new("seller-1"),
            PrincipalId::new("buyer-1"),
        ])),
        payments: Arc::new(MockPaymentGateway::new("http://payments.test")),
    };
    DeliveryEngine::new(
        services,
        DeliveryConfig::default(),
        TokenSigner::from_seed(&[3u8; 32]),
        EnvelopeSealer::new(&[5u8; 32]).unwrap(),
    )
    .unwrap()
}

// ============================================================================
// SECTION: Lifecycle
// ============================================================================

#[test]
fn sqlite_backed_engine_runs_full_lifecycle() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("dropgate.sqlite");
    let blobs = SharedBlobStore::from_store(InMemoryBlobStore::new());
    let engine = engine_over(&path, &blobs);
    let seller = PrincipalId::new("seller-1");
    let buyer = PrincipalId::new("buyer-1");

    let content: Vec<u8> = (0 .. 10u8).collect();
    let started = engine
        .start_upload(
            &seller,
            NewProduct {
                title: "Stems".to_string(),
                content_type: "application/zip".to_string(),
                size_bytes: 10,
                content_hash: None,
                encryption_algorithm: None,
            },
            4,
        )
        .unwrap();
    for (index, chunk) in content.chunks(4).enumerate() {
        let index = u32::try_from(index).unwrap();
        engine.uploads().upload_chunk(&seller, &started.session.upload_id, index, chunk).unwrap();
    }
    let completed =
        engine.uploads().complete_upload(&seller, &started.session.upload_id, None).unwrap();
    let product = completed.product;

    let transfer = engine
        .transfers()
        .offer(
            &seller,
            OfferRequest {
                product_id: product.id.clone(),
                to_recipient_id: buyer.clone(),
                price: Some(900),
                currency: None,
                policy: None,
            },
        )
        .unwrap()
        .transfer;
    engine.transfers().invoice(&buyer, &TransferRef::Id(transfer.id.clone()), None).unwrap();
    engine
        .transfers()
        .handle_payment_webhook(&PaymentWebhook {
            event_type: EVENT_PAYMENT_SUCCEEDED.to_string(),
            transfer_id: transfer.id.clone(),
            payment_ref: Some("pi_sqlite".to_string()),
        })
        .unwrap();

    let grant = engine.keys().grant(&buyer, &transfer.id).unwrap();
    let again = engine.keys().grant(&buyer, &transfer.id).unwrap();
    assert!(again.key_reused);
    assert_eq!(again.key.id, grant.key.id);

    let claim = engine.keys().claim(&grant.claim_token).unwrap();
    let credentials = DownloadCredentials {
        token: Some(claim.download_token.clone()),
        ..DownloadCredentials::default()
    };
    let mut downloaded = Vec::new();
    for index in 0 .. claim.manifest.total_chunks {
        downloaded.extend(engine.gate().download_chunk(&product.id, index, &credentials).unwrap());
    }
    assert_eq!(downloaded, content);

    engine
        .transfers()
        .acknowledge(
            &buyer,
            AcknowledgeRequest {
                transfer_id: transfer.id.clone(),
                client_hash: claim.manifest.content_hash.value.clone(),
                signature: "signed".to_string(),
                meta: None,
            },
        )
        .unwrap();
    drop(engine);

    let reopened = SqliteDeliveryStore::new(SqliteStoreConfig::for_path(&path)).unwrap();
    let stored = reopened.get_transfer(&transfer.id).unwrap().unwrap();
    assert_eq!(stored.status, TransferStatus::Acknowledged);
    assert!(reopened.get_receipt(&transfer.id).unwrap().is_some());
    assert!(reopened.get_payment_intent(&transfer.id).unwrap().is_some());
    assert_eq!(reopened.get_key(&grant.key.id).unwrap(), Some(grant.key));
}

#[test]
fn sqlite_backed_engine_denies_unpaid_download() {
    let temp = TempDir::new().unwrap();
    let blobs = SharedBlobStore::from_store(InMemoryBlobStore::new());
    let engine = engine_over(&temp.path().join("dropgate.sqlite"), &blobs);
    let seller = PrincipalId::new("seller-1");
    let buyer = PrincipalId::new("buyer-1");

    let started = engine
        .start_upload(
            &seller,
            NewProduct {
                title: "Preset".to_string(),
                content_type: "application/octet-stream".to_string(),
                size_bytes: 3,
                content_hash: None,
                encryption_algorithm: None,
            },
            4,
        )
        .unwrap();
    engine.uploads().upload_chunk(&seller, &started.session.upload_id, 0, b"abc").unwrap();
    let completed =
        engine.uploads().complete_upload(&seller, &started.session.upload_id, None).unwrap();
    let product = completed.product;
    engine
        .transfers()
        .offer(
            &seller,
            OfferRequest {
                product_id: product.id.clone(),
                to_recipient_id: buyer.clone(),
                price: Some(100),
                currency: None,
                policy: None,
            },
        )
        .unwrap();

    let credentials = DownloadCredentials {
        caller: Some(buyer),
        ..DownloadCredentials::default()
    };
    let err = engine.gate().download_chunk(&product.id, 0, &credentials).unwrap_err();
    assert_eq!(err, DeliveryError::NotFoundOrDenied);
}
