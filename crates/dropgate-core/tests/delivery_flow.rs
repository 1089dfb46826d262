// crates/dropgate-core/tests/delivery_flow.rs
// ============================================================================
// Module: Delivery Flow Tests
// Description: End-to-end upload, sale, grant, claim, and download flows.
// ============================================================================
//! ## Overview
//! Drives a product from chunked upload through payment, grant, claim,
//! download, acknowledgment, and revocation against in-memory backends.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions use unwrap for clarity."
)]

mod common;

use common::MIB;
use common::content;
use common::harness;
use common::new_product;
use common::offer;
use common::paid_transfer;
use common::small_product;
use common::upload_product;
use dropgate_core::AcknowledgeRequest;
use dropgate_core::BlobStore;
use dropgate_core::DeliveryAuditKind;
use dropgate_core::DeliveryError;
use dropgate_core::DeliveryStore;
use dropgate_core::DownloadCredentials;
use dropgate_core::ErrorKind;
use dropgate_core::PaymentWebhook;
use dropgate_core::PrincipalId;
use dropgate_core::RevokeRequest;
use dropgate_core::TransferRef;
use dropgate_core::TransferStatus;
use dropgate_core::chunk_key;
use dropgate_core::hash_bytes;
use dropgate_core::runtime::EVENT_PAYMENT_SUCCEEDED;
use dropgate_core::runtime::READY_FOR_DOWNLOAD;
use serde_json::json;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Credentials naming a bearer caller.
fn as_caller(principal: &PrincipalId) -> DownloadCredentials {
    DownloadCredentials {
        caller: Some(principal.clone()),
        ..DownloadCredentials::default()
    }
}

// ============================================================================
// SECTION: Full Scenario
// ============================================================================

#[test]
fn nine_mib_product_sells_and_downloads_in_three_chunks() {
    let h = harness();
    let bytes = content(9 * MIB);
    let started = h
        .engine
        .start_upload(&h.seller, new_product(9 * MIB), 4 * MIB)
        .unwrap();
    assert_eq!(started.session.expected_chunks, 3);
    assert_eq!(started.session.total_size, 9_437_184);

    for (index, chunk) in bytes.chunks(usize::try_from(4 * MIB).unwrap()).enumerate() {
        let index = u32::try_from(index).unwrap();
        let receipt = h
            .engine
            .uploads()
            .upload_chunk(&h.seller, &started.session.upload_id, index, chunk)
            .unwrap();
        assert_eq!(receipt.hash, hash_bytes(receipt.hash.algorithm, chunk));
    }
    let completed = h
        .engine
        .uploads()
        .complete_upload(&h.seller, &started.session.upload_id, None)
        .unwrap();
    let sizes: Vec<u64> = completed.manifest.entries.iter().map(|entry| entry.size).collect();
    assert_eq!(sizes, vec![4 * MIB, 4 * MIB, MIB]);
    assert_eq!(completed.manifest.total_size, 9_437_184);
    let product = completed.product;

    let denied = h.engine.registry().get_product_manifest(&product.id, &h.stranger);
    assert_eq!(denied.unwrap_err(), DeliveryError::NotFoundOrDenied);

    let transfer = offer(&h, &product, 2_500);
    assert_eq!(transfer.status, TransferStatus::Offered);
    let invoice = h
        .engine
        .transfers()
        .invoice(&h.buyer, &TransferRef::Id(transfer.id.clone()), None)
        .unwrap();
    assert_eq!(invoice.transfer.status, TransferStatus::Invoiced);
    assert_eq!(invoice.intent.amount, 2_500);
    assert!(invoice.intent.checkout_url.ends_with(transfer.id.as_str()));

    let outcome = h
        .engine
        .transfers()
        .handle_payment_webhook(&PaymentWebhook {
            event_type: EVENT_PAYMENT_SUCCEEDED.to_string(),
            transfer_id: transfer.id.clone(),
            payment_ref: Some("pi_9mib".to_string()),
        })
        .unwrap();
    assert_eq!(outcome.status, TransferStatus::Paid);

    let grant = h.engine.keys().grant(&h.buyer, &transfer.id).unwrap();
    assert_eq!(grant.transfer.status, TransferStatus::Delivered);
    let claim = h.engine.keys().claim(&grant.claim_token).unwrap();
    assert_eq!(claim.status, READY_FOR_DOWNLOAD);
    assert_eq!(claim.download_urls.len(), 3);
    assert!(claim.download_urls[2].contains("chunkIndex=2"));
    assert_eq!(claim.key_envelope, grant.key.key_envelope);

    let manifest = h.engine.registry().get_product_manifest(&product.id, &h.buyer).unwrap();
    assert_eq!(manifest, claim.manifest);

    let credentials = DownloadCredentials {
        token: Some(claim.download_token.clone()),
        ..DownloadCredentials::default()
    };
    let mut downloaded = Vec::new();
    for index in 0 .. 3 {
        downloaded
            .extend(h.engine.gate().download_chunk(&product.id, index, &credentials).unwrap());
    }
    assert_eq!(downloaded, bytes);

    h.engine
        .transfers()
        .revoke(
            &h.seller,
            RevokeRequest {
                transfer_id: transfer.id.clone(),
                reason: Some("chargeback".to_string()),
            },
        )
        .unwrap();
    let after = h.engine.gate().download_chunk(&product.id, 0, &credentials);
    assert_eq!(after.unwrap_err(), DeliveryError::NotFoundOrDenied);
}

// ============================================================================
// SECTION: Payment Gating
// ============================================================================

#[test]
fn recipient_cannot_download_before_payment() {
    let h = harness();
    let product = small_product(&h);
    let transfer = offer(&h, &product, 900);
    let gate = h.engine.gate();

    let err = gate.download_chunk(&product.id, 0, &as_caller(&h.buyer)).unwrap_err();
    assert_eq!(err, DeliveryError::NotFoundOrDenied);

    h.engine.transfers().invoice(&h.buyer, &TransferRef::Id(transfer.id.clone()), None).unwrap();
    let err = gate.get_manifest(&product.id, &as_caller(&h.buyer)).unwrap_err();
    assert_eq!(err, DeliveryError::NotFoundOrDenied);

    let err = h.engine.keys().grant(&h.buyer, &transfer.id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[test]
fn paid_without_key_is_still_denied() {
    let h = harness();
    let product = small_product(&h);
    paid_transfer(&h, &product);
    let err = h.engine.gate().get_manifest(&product.id, &as_caller(&h.buyer)).unwrap_err();
    assert_eq!(err, DeliveryError::NotFoundOrDenied);
    assert!(h.audit.count(DeliveryAuditKind::AccessDenied) >= 1);
}

#[test]
fn owner_reads_own_product_without_transfer() {
    let h = harness();
    let product = small_product(&h);
    let bytes = h.engine.gate().download_chunk(&product.id, 2, &as_caller(&h.seller)).unwrap();
    assert_eq!(bytes, content(10)[8 ..].to_vec());
}

#[test]
fn chunk_index_past_manifest_is_invalid_input() {
    let h = harness();
    let product = small_product(&h);
    let err = h.engine.gate().download_chunk(&product.id, 3, &as_caller(&h.seller)).unwrap_err();
    assert_eq!(
        err,
        DeliveryError::InvalidChunkIndex {
            index: 3,
            expected: 3,
        }
    );
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

#[test]
fn tampered_chunk_fails_integrity_check() {
    let h = harness();
    let product = small_product(&h);
    let key = chunk_key(&product.storage_pointer, 1);
    h.blobs.put(&key, b"XXXX").unwrap();
    let err = h.engine.gate().download_chunk(&product.id, 1, &as_caller(&h.seller)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

// ============================================================================
// SECTION: Grant Idempotency
// ============================================================================

#[test]
fn repeated_grant_reuses_envelope_with_fresh_claim_token() {
    let h = harness();
    let product = small_product(&h);
    let transfer = paid_transfer(&h, &product);

    let first = h.engine.keys().grant(&h.buyer, &transfer.id).unwrap();
    let second = h.engine.keys().grant(&h.buyer, &transfer.id).unwrap();
    assert!(!first.key_reused);
    assert!(second.key_reused);
    assert_eq!(first.key.id, second.key.id);
    assert_eq!(first.key.key_envelope, second.key.key_envelope);
    assert_ne!(first.claim_token, second.claim_token);
    assert_eq!(second.transfer.status, TransferStatus::Delivered);
    assert_eq!(h.audit.count(DeliveryAuditKind::KeyMinted), 1);

    assert!(h.engine.keys().claim(&first.claim_token).is_ok());
    assert!(h.engine.keys().claim(&second.claim_token).is_ok());
}

#[test]
fn seller_may_grant_but_stranger_may_not() {
    let h = harness();
    let product = small_product(&h);
    let transfer = paid_transfer(&h, &product);
    let err = h.engine.keys().grant(&h.stranger, &transfer.id).unwrap_err();
    assert_eq!(err, DeliveryError::NotFoundOrDenied);
    let grant = h.engine.keys().grant(&h.seller, &transfer.id).unwrap();
    assert_eq!(grant.key.recipient_id, h.buyer);
}

// ============================================================================
// SECTION: Acknowledgment
// ============================================================================

#[test]
fn second_receipt_conflicts_and_status_stays_acknowledged() {
    let h = harness();
    let product = small_product(&h);
    let transfer = paid_transfer(&h, &product);
    h.engine.keys().grant(&h.buyer, &transfer.id).unwrap();

    let request = AcknowledgeRequest {
        transfer_id: transfer.id.clone(),
        client_hash: product.content_hash.clone().unwrap().value,
        signature: "sig-1".to_string(),
        meta: Some(json!({"client": "desktop"})),
    };
    let receipt = h.engine.transfers().acknowledge(&h.buyer, request.clone()).unwrap();
    assert_eq!(receipt.transfer_id, transfer.id);

    let err = h.engine.transfers().acknowledge(&h.buyer, request).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    let view = h.engine.transfers().get_transfer(&h.buyer, &transfer.id).unwrap();
    assert_eq!(view.transfer.status, TransferStatus::Acknowledged);
    assert_eq!(view.receipt.unwrap().id, receipt.id);
}

#[test]
fn acknowledge_requires_delivery() {
    let h = harness();
    let product = small_product(&h);
    let transfer = paid_transfer(&h, &product);
    let err = h
        .engine
        .transfers()
        .acknowledge(
            &h.buyer,
            AcknowledgeRequest {
                transfer_id: transfer.id,
                client_hash: "abc".to_string(),
                signature: "sig".to_string(),
                meta: None,
            },
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

// ============================================================================
// SECTION: Revocation
// ============================================================================

#[test]
fn revocation_is_immediate_for_claims_and_downloads() {
    let h = harness();
    let product = upload_product(&h, &content(20), 8);
    let transfer = paid_transfer(&h, &product);
    let grant = h.engine.keys().grant(&h.buyer, &transfer.id).unwrap();
    let claim = h.engine.keys().claim(&grant.claim_token).unwrap();

    let revoked = h
        .engine
        .transfers()
        .revoke(
            &h.seller,
            RevokeRequest {
                transfer_id: transfer.id.clone(),
                reason: None,
            },
        )
        .unwrap();
    assert_eq!(revoked.status, TransferStatus::Refunded);
    assert!(revoked.policy.revoked);
    assert_eq!(revoked.policy.revocation.unwrap().revoked_by, h.seller);

    let err = h.engine.keys().claim(&grant.claim_token).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    let credentials = DownloadCredentials {
        token: Some(claim.download_token),
        ..DownloadCredentials::default()
    };
    let err = h.engine.gate().get_manifest(&product.id, &credentials).unwrap_err();
    assert_eq!(err, DeliveryError::NotFoundOrDenied);
    let err = h.engine.gate().download_chunk(&product.id, 0, &credentials).unwrap_err();
    assert_eq!(err, DeliveryError::NotFoundOrDenied);
    let bearer = DownloadCredentials {
        caller: Some(h.buyer.clone()),
        ..DownloadCredentials::default()
    };
    let err = h.engine.gate().download_chunk(&product.id, 0, &bearer).unwrap_err();
    assert_eq!(err, DeliveryError::NotFoundOrDenied);
    let key = h.store.get_key(&grant.key.id).unwrap().unwrap();
    assert!(!key.is_live(h.engine.context().now()));
}

#[test]
fn recipient_cannot_revoke() {
    let h = harness();
    let product = small_product(&h);
    let transfer = paid_transfer(&h, &product);
    h.engine.keys().grant(&h.buyer, &transfer.id).unwrap();
    let err = h
        .engine
        .transfers()
        .revoke(
            &h.buyer,
            RevokeRequest {
                transfer_id: transfer.id,
                reason: None,
            },
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}
