// crates/dropgate-server/src/lib.rs
// ============================================================================
// Module: Dropgate Server
// Description: HTTP surface and production backends for dropgate.
// Purpose: Expose the delivery engine over a `/v1` JSON API.
// Dependencies: axum, dropgate-config, dropgate-core, dropgate-store-sqlite, tokio
// ============================================================================

//! ## Overview
//! The server authenticates callers with static bearer tokens, maps engine
//! errors onto stable HTTP statuses, and selects storage, payment, and audit
//! backends from configuration. All delivery semantics live in
//! [`dropgate_core::DeliveryEngine`]; handlers are thin adapters.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod auth;
pub mod blob_fs;
mod blob_keys;
pub mod blob_s3;
mod blocking;
pub mod error;
pub mod payments;
mod routes;
pub mod server;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::FileAuditSink;
pub use audit::HttpAuditEvent;
pub use audit::HttpAuditSink;
pub use audit::ServerAuditSink;
pub use audit::StderrAuditSink;
pub use auth::AuthError;
pub use auth::BearerAuthenticator;
pub use auth::Caller;
pub use auth::WEBHOOK_SECRET_HEADER;
pub use blob_fs::FilesystemBlobStore;
pub use blob_s3::S3BlobStore;
pub use error::ApiError;
pub use error::ServerError;
pub use payments::HttpPaymentGateway;
pub use server::DropgateServer;
