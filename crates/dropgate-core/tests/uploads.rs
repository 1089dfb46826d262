// crates/dropgate-core/tests/uploads.rs
// ============================================================================
// Module: Upload Session Tests
// Description: Chunk planning, session lifecycle, and manifest finalization.
// ============================================================================
//! ## Overview
//! Validates size limits, per-index chunk lengths, resumable status, session
//! expiry, and the single pending-to-ready transition at completion.

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

use std::sync::Arc;

use common::content;
use common::harness;
use common::harness_with;
use common::new_product;
use dropgate_core::DEFAULT_HASH_ALGORITHM;
use dropgate_core::DeliveryAuditKind;
use dropgate_core::DeliveryConfig;
use dropgate_core::DeliveryEngine;
use dropgate_core::DeliveryError;
use dropgate_core::DownloadCredentials;
use dropgate_core::EnvelopeSealer;
use dropgate_core::ErrorKind;
use dropgate_core::MAX_CHUNK_SIZE_BYTES;
use dropgate_core::MAX_TOTAL_SIZE_BYTES;
use dropgate_core::Manifest;
use dropgate_core::ManifestEntry;
use dropgate_core::NoopNotifier;
use dropgate_core::PENDING_STORAGE_POINTER;
use dropgate_core::Span;
use dropgate_core::TokenSigner;
use dropgate_core::expected_chunk_count;
use dropgate_core::expected_chunk_len;
use dropgate_core::get_json_document;
use dropgate_core::hash_bytes;
use dropgate_core::manifest_key;
use proptest::prelude::*;

// ============================================================================
// SECTION: Size Limits
// ============================================================================

#[test]
fn rejects_out_of_range_plans() {
    let h = harness();
    let uploads = h.engine.uploads();
    let product = h.engine.registry().create_product(&h.seller, new_product(1_000)).unwrap();

    for (total, chunk) in
        [(1_000, 0), (1_000, MAX_CHUNK_SIZE_BYTES + 1), (0, 100), (MAX_TOTAL_SIZE_BYTES + 1, 100)]
    {
        let err = uploads.initialize_upload(&h.seller, &product.id, total, chunk).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput, "total={total} chunk={chunk}");
    }
}

#[test]
fn lowered_ceiling_applies_to_new_sessions() {
    let config = DeliveryConfig {
        max_chunk_size_bytes: 1_024,
        ..DeliveryConfig::default()
    };
    let h = harness_with(config, Arc::new(NoopNotifier));
    let err = h.engine.start_upload(&h.seller, new_product(4_096), 2_048).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert!(h.engine.start_upload(&h.seller, new_product(4_096), 1_024).is_ok());
}

#[test]
fn raised_ceiling_is_a_configuration_error() {
    let config = DeliveryConfig {
        max_total_size_bytes: MAX_TOTAL_SIZE_BYTES + 1,
        ..DeliveryConfig::default()
    };
    let services = {
        let h = harness();
        h.engine.context().services.clone()
    };
    let err = DeliveryEngine::new(
        services,
        config,
        TokenSigner::from_seed(&[1u8; 32]),
        EnvelopeSealer::new(&[2u8; 32]).unwrap(),
    )
    .err()
    .unwrap();
    assert_eq!(err.kind(), ErrorKind::ConfigurationError);
}

#[test]
fn declared_size_must_match_total_size() {
    let h = harness();
    let product = h.engine.registry().create_product(&h.seller, new_product(100)).unwrap();
    let err = h.engine.uploads().initialize_upload(&h.seller, &product.id, 99, 10).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

#[test]
fn foreign_owner_cannot_open_session() {
    let h = harness();
    let product = h.engine.registry().create_product(&h.seller, new_product(100)).unwrap();
    let err = h.engine.uploads().initialize_upload(&h.buyer, &product.id, 100, 10).unwrap_err();
    assert_eq!(err, DeliveryError::NotFoundOrDenied);
}

// ============================================================================
// SECTION: Chunks
// ============================================================================

#[test]
fn chunk_index_and_length_are_checked() {
    let h = harness();
    let started = h.engine.start_upload(&h.seller, new_product(10), 4).unwrap();
    let id = &started.session.upload_id;
    let uploads = h.engine.uploads();

    let err = uploads.upload_chunk(&h.seller, id, 3, b"ab").unwrap_err();
    assert_eq!(
        err,
        DeliveryError::InvalidChunkIndex {
            index: 3,
            expected: 3,
        }
    );
    let err = uploads.upload_chunk(&h.seller, id, 0, b"abc").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    let err = uploads.upload_chunk(&h.seller, id, 2, b"abcd").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert!(uploads.upload_chunk(&h.seller, id, 2, b"ab").is_ok());
}

#[test]
fn reupload_overwrites_previous_chunk() {
    let h = harness();
    let started = h.engine.start_upload(&h.seller, new_product(8), 4).unwrap();
    let id = &started.session.upload_id;
    let uploads = h.engine.uploads();
    uploads.upload_chunk(&h.seller, id, 0, b"AAAA").unwrap();
    let receipt = uploads.upload_chunk(&h.seller, id, 0, b"BBBB").unwrap();
    uploads.upload_chunk(&h.seller, id, 1, b"CCCC").unwrap();
    let completed = uploads.complete_upload(&h.seller, id, None).unwrap();
    assert_eq!(completed.manifest.entries[0].hash, receipt.hash);
    let bytes = h
        .engine
        .gate()
        .download_chunk(
            &completed.product.id,
            0,
            &DownloadCredentials {
                caller: Some(h.seller.clone()),
                ..DownloadCredentials::default()
            },
        )
        .unwrap();
    assert_eq!(bytes, b"BBBB".to_vec());
}

#[test]
fn status_reports_missing_indices_for_resume() {
    let h = harness();
    let started = h.engine.start_upload(&h.seller, new_product(10), 4).unwrap();
    let id = &started.session.upload_id;
    h.engine.uploads().upload_chunk(&h.seller, id, 1, b"efgh").unwrap();
    let status = h.engine.uploads().upload_status(&h.seller, id).unwrap();
    assert_eq!(status.expected_chunks, 3);
    assert_eq!(status.uploaded, vec![1]);
    assert_eq!(status.missing, vec![0, 2]);

    let err = h.engine.uploads().complete_upload(&h.seller, id, None).unwrap_err();
    assert_eq!(
        err,
        DeliveryError::IncompleteUpload {
            missing: vec![0, 2],
        }
    );
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[test]
fn foreign_or_expired_sessions_are_not_found() {
    let h = harness();
    let started = h.engine.start_upload(&h.seller, new_product(4), 4).unwrap();
    let id = &started.session.upload_id;
    let err = h.engine.uploads().upload_chunk(&h.buyer, id, 0, b"abcd").unwrap_err();
    assert_eq!(err, DeliveryError::SessionNotFound);
    assert_eq!(err.kind(), ErrorKind::NotFoundOrDenied);

    h.clock.advance(Span::hours(24));
    let err = h.engine.uploads().upload_chunk(&h.seller, id, 0, b"abcd").unwrap_err();
    assert_eq!(err, DeliveryError::SessionNotFound);
    let now = h.engine.context().now();
    assert_eq!(h.engine.uploads().arena().live_sessions(now).unwrap(), 0);
}

// ============================================================================
// SECTION: Completion
// ============================================================================

#[test]
fn completion_finalizes_product_and_writes_manifest_document() {
    let h = harness();
    let bytes = content(10);
    let started = h.engine.start_upload(&h.seller, new_product(10), 4).unwrap();
    assert_eq!(started.product.storage_pointer, PENDING_STORAGE_POINTER);
    assert!(started.product.manifest.is_none());
    let id = &started.session.upload_id;
    for (index, chunk) in bytes.chunks(4).enumerate() {
        let index = u32::try_from(index).unwrap();
        h.engine.uploads().upload_chunk(&h.seller, id, index, chunk).unwrap();
    }
    let completed = h.engine.uploads().complete_upload(&h.seller, id, None).unwrap();
    let product = completed.product;
    assert!(product.is_ready());
    assert_ne!(product.storage_pointer, PENDING_STORAGE_POINTER);
    assert_eq!(completed.manifest.content_hash, hash_bytes(DEFAULT_HASH_ALGORITHM, &bytes));
    completed.manifest.validate().unwrap();

    let stored: Manifest =
        get_json_document(&h.blobs, &manifest_key(&product.storage_pointer)).unwrap().unwrap();
    assert_eq!(stored, completed.manifest);
    assert_eq!(h.audit.count(DeliveryAuditKind::UploadCompleted), 1);

    let err = h.engine.uploads().upload_status(&h.seller, id).unwrap_err();
    assert_eq!(err, DeliveryError::SessionNotFound);
}

#[test]
fn supplied_manifest_must_match_recorded_chunks() {
    let h = harness();
    let started = h.engine.start_upload(&h.seller, new_product(8), 4).unwrap();
    let id = &started.session.upload_id;
    h.engine.uploads().upload_chunk(&h.seller, id, 0, b"abcd").unwrap();
    h.engine.uploads().upload_chunk(&h.seller, id, 1, b"efgh").unwrap();
    let forged = vec![
        ManifestEntry {
            index: 0,
            hash: hash_bytes(DEFAULT_HASH_ALGORITHM, b"abcd"),
            size: 4,
        },
        ManifestEntry {
            index: 1,
            hash: hash_bytes(DEFAULT_HASH_ALGORITHM, b"zzzz"),
            size: 4,
        },
    ];
    let err = h.engine.uploads().complete_upload(&h.seller, id, Some(&forged)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    let genuine = vec![
        forged[0].clone(),
        ManifestEntry {
            index: 1,
            hash: hash_bytes(DEFAULT_HASH_ALGORITHM, b"efgh"),
            size: 4,
        },
    ];
    assert!(h.engine.uploads().complete_upload(&h.seller, id, Some(&genuine)).is_ok());
}

#[test]
fn declared_content_hash_is_verified() {
    let h = harness();
    let mut request = new_product(4);
    request.content_hash = Some(hash_bytes(DEFAULT_HASH_ALGORITHM, b"nope"));
    let started = h.engine.start_upload(&h.seller, request, 4).unwrap();
    let id = &started.session.upload_id;
    h.engine.uploads().upload_chunk(&h.seller, id, 0, b"abcd").unwrap();
    let err = h.engine.uploads().complete_upload(&h.seller, id, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    let product = h.engine.registry().get_product(&started.product.id, &h.seller).unwrap();
    assert!(!product.is_ready());
}

#[test]
fn pending_product_is_hidden_even_from_owner_manifest_reads() {
    let h = harness();
    let product = h.engine.registry().create_product(&h.seller, new_product(4)).unwrap();
    let err = h.engine.registry().get_product_manifest(&product.id, &h.seller).unwrap_err();
    assert_eq!(err, DeliveryError::NotFoundOrDenied);
}

// ============================================================================
// SECTION: Chunk Plan Properties
// ============================================================================

proptest! {
    #[test]
    fn chunk_plan_covers_total_size(
        total in 1u64 ..= MAX_TOTAL_SIZE_BYTES,
        chunk in 1u64 ..= MAX_CHUNK_SIZE_BYTES,
    ) {
        let count = expected_chunk_count(total, chunk).unwrap();
        prop_assert_eq!(u64::from(count), total.div_ceil(chunk));
        let last = expected_chunk_len(total, chunk, count - 1).unwrap();
        prop_assert!(last >= 1 && last <= chunk);
        if count > 1 {
            prop_assert_eq!(expected_chunk_len(total, chunk, 0).unwrap(), chunk);
        }
        prop_assert_eq!(u64::from(count - 1) * chunk + last, total);
        prop_assert!(expected_chunk_len(total, chunk, count).is_none());
    }
}
