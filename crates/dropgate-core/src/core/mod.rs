// crates/dropgate-core/src/core/mod.rs
// ============================================================================
// Module: Dropgate Core Types
// Description: Canonical Dropgate records, identifiers, and the transition table.
// Purpose: Provide stable, serializable types shared by every backend and surface.
// Dependencies: serde, sha2, time
// ============================================================================

//! ## Overview
//! Core types define products, manifests, upload sessions, transfers, keys,
//! payment intents, and receipts. They are the canonical source of truth for
//! the HTTP surface and every storage backend.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod events;
pub mod hashing;
pub mod identifiers;
pub mod keys;
pub mod payment;
pub mod product;
pub mod receipt;
pub mod time;
pub mod transfer;
pub mod upload;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use events::DeliveryAuditEvent;
pub use events::DeliveryAuditEventParams;
pub use events::DeliveryAuditKind;
pub use events::DeliveryNotification;
pub use hashing::ContentHasher;
pub use hashing::DEFAULT_HASH_ALGORITHM;
pub use hashing::HashAlgorithm;
pub use hashing::HashDigest;
pub use hashing::HashError;
pub use hashing::canonical_json_bytes;
pub use hashing::hash_bytes;
pub use identifiers::DisputeId;
pub use identifiers::KeyId;
pub use identifiers::PaymentIntentId;
pub use identifiers::PrincipalId;
pub use identifiers::ProductId;
pub use identifiers::ReceiptId;
pub use identifiers::TransferId;
pub use identifiers::UploadId;
pub use keys::KeyEnvelope;
pub use keys::ProductKey;
pub use payment::PaymentIntent;
pub use payment::PaymentStatus;
pub use product::DEFAULT_ENCRYPTION_ALGORITHM;
pub use product::InputTiming;
pub use product::Manifest;
pub use product::ManifestEntry;
pub use product::ManifestError;
pub use product::PENDING_STORAGE_POINTER;
pub use product::Product;
pub use product::RequiredInput;
pub use product::StorageType;
pub use product::missing_inputs;
pub use product::validate_required_inputs;
pub use receipt::DeliveryReceipt;
pub use time::Span;
pub use time::Timestamp;
pub use transfer::DisputeRecord;
pub use transfer::RevocationRecord;
pub use transfer::Transfer;
pub use transfer::TransferAction;
pub use transfer::TransferPolicy;
pub use transfer::TransferStatus;
pub use transfer::TransitionError;
pub use transfer::TransitionPolicy;
pub use transfer::next_status;
pub use upload::ChunkRecord;
pub use upload::MAX_CHUNK_SIZE_BYTES;
pub use upload::MAX_TOTAL_SIZE_BYTES;
pub use upload::UploadSession;
pub use upload::chunk_key;
pub use upload::expected_chunk_count;
pub use upload::expected_chunk_len;
pub use upload::manifest_key;
