// crates/dropgate-core/src/lib.rs
// ============================================================================
// Module: Dropgate Core Library
// Description: Public API surface for the Dropgate delivery engine.
// Purpose: Expose core types, interfaces, and runtime components.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Dropgate core registers digital products, sells access to them through a
//! transfer state machine, and delivers them as verified chunks behind a
//! per-request access gate. It is backend-agnostic: relational storage, blob
//! storage, payments, notifications, and identity are reached through the
//! traits in [`interfaces`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use core::*;

pub use interfaces::AuditSink;
pub use interfaces::BlobError;
pub use interfaces::BlobStore;
pub use interfaces::CheckoutRequest;
pub use interfaces::CheckoutSession;
pub use interfaces::Clock;
pub use interfaces::DeliveryStore;
pub use interfaces::KeyChange;
pub use interfaces::NoopAuditSink;
pub use interfaces::NoopNotifier;
pub use interfaces::Notifier;
pub use interfaces::NotifyError;
pub use interfaces::PaymentError;
pub use interfaces::PaymentGateway;
pub use interfaces::RecipientDirectory;
pub use interfaces::StoreError;
pub use interfaces::SystemClock;
pub use interfaces::TransferChange;
pub use interfaces::get_json_document;
pub use interfaces::put_json_document;
pub use runtime::AccessBasis;
pub use runtime::AccessGrant;
pub use runtime::AcknowledgeRequest;
pub use runtime::ChunkReceipt;
pub use runtime::ClaimResult;
pub use runtime::CompletedUpload;
pub use runtime::DeliveryConfig;
pub use runtime::DeliveryContext;
pub use runtime::DeliveryEngine;
pub use runtime::DeliveryError;
pub use runtime::DeliveryServices;
pub use runtime::DisputeRequest;
pub use runtime::DownloadAccessGate;
pub use runtime::DownloadCredentials;
pub use runtime::EnvelopeError;
pub use runtime::EnvelopeSealer;
pub use runtime::ErrorKind;
pub use runtime::GrantResult;
pub use runtime::InMemoryBlobStore;
pub use runtime::InMemoryDeliveryStore;
pub use runtime::InvoiceResult;
pub use runtime::KeyEnvelopeManager;
pub use runtime::ManualClock;
pub use runtime::MockPaymentGateway;
pub use runtime::NewProduct;
pub use runtime::OfferRequest;
pub use runtime::OfferResult;
pub use runtime::PaymentWebhook;
pub use runtime::ProductRegistry;
pub use runtime::RetryPolicy;
pub use runtime::RevokeRequest;
pub use runtime::SharedBlobStore;
pub use runtime::SharedDeliveryStore;
pub use runtime::StartedUpload;
pub use runtime::StaticRecipientDirectory;
pub use runtime::StatusClass;
pub use runtime::TokenError;
pub use runtime::TokenSigner;
pub use runtime::TokenType;
pub use runtime::TransferMachine;
pub use runtime::TransferRef;
pub use runtime::TransferView;
pub use runtime::UploadSessionManager;
pub use runtime::UploadStatus;
pub use runtime::WebhookOutcome;
pub use runtime::token_fingerprint;
