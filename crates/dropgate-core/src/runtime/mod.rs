// crates/dropgate-core/src/runtime/mod.rs
// ============================================================================
// Module: Dropgate Runtime
// Description: Upload, registry, transfer, key, and access components.
// Purpose: Execute delivery operations over the core interfaces.
// Dependencies: crate::{core, interfaces}, chacha20poly1305, ed25519-dalek
// ============================================================================

//! ## Overview
//! Runtime modules implement the delivery engine. Every component shares one
//! [`DeliveryContext`] and all external surfaces call into the same
//! components through [`DeliveryEngine`].

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod access;
pub mod collaborators;
pub mod context;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod keys;
pub mod registry;
pub mod retry;
pub mod store;
pub mod tokens;
pub mod transfers;
pub mod uploads;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use access::AccessBasis;
pub use access::AccessGrant;
pub use access::DownloadAccessGate;
pub use access::DownloadCredentials;
pub use collaborators::MOCK_PROVIDER;
pub use collaborators::ManualClock;
pub use collaborators::MockPaymentGateway;
pub use collaborators::StaticRecipientDirectory;
pub use context::DEFAULT_CLAIM_TOKEN_TTL;
pub use context::DEFAULT_CURRENCY;
pub use context::DEFAULT_DISPUTE_WINDOW;
pub use context::DEFAULT_DOWNLOAD_TOKEN_TTL;
pub use context::DEFAULT_KEY_TTL;
pub use context::DEFAULT_SESSION_TTL;
pub use context::DeliveryConfig;
pub use context::DeliveryContext;
pub use context::DeliveryServices;
pub use context::normalize_currency;
pub use engine::DeliveryEngine;
pub use engine::StartedUpload;
pub use envelope::CONTENT_KEY_BYTES;
pub use envelope::EnvelopeError;
pub use envelope::EnvelopeSealer;
pub use error::DeliveryError;
pub use error::ErrorKind;
pub use error::StatusClass;
pub use keys::ClaimResult;
pub use keys::GrantResult;
pub use keys::KeyEnvelopeManager;
pub use keys::READY_FOR_DOWNLOAD;
pub use registry::NewProduct;
pub use registry::ProductRegistry;
pub use retry::RetryPolicy;
pub use store::InMemoryBlobStore;
pub use store::InMemoryDeliveryStore;
pub use store::SharedBlobStore;
pub use store::SharedDeliveryStore;
pub use tokens::TokenBinding;
pub use tokens::TokenClaims;
pub use tokens::TokenError;
pub use tokens::TokenSigner;
pub use tokens::TokenType;
pub use tokens::token_fingerprint;
pub use transfers::AcknowledgeRequest;
pub use transfers::DisputeRequest;
pub use transfers::EVENT_CHECKOUT_COMPLETED;
pub use transfers::EVENT_PAYMENT_FAILED;
pub use transfers::EVENT_PAYMENT_SUCCEEDED;
pub use transfers::InvoiceResult;
pub use transfers::OfferRequest;
pub use transfers::OfferResult;
pub use transfers::PaymentWebhook;
pub use transfers::RevokeRequest;
pub use transfers::TransferMachine;
pub use transfers::TransferRef;
pub use transfers::TransferView;
pub use transfers::WebhookOutcome;
pub use uploads::ChunkReceipt;
pub use uploads::CompletedUpload;
pub use uploads::SessionArena;
pub use uploads::UploadSessionManager;
pub use uploads::UploadStatus;
