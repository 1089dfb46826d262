// crates/dropgate-store-sqlite/src/lib.rs
// ============================================================================
// Module: Dropgate SQLite Store
// Description: Durable delivery store backed by SQLite.
// Purpose: Persist products, transfers, keys, payment intents, and receipts.
// Dependencies: dropgate-core, rusqlite
// ============================================================================

//! ## Overview
//! Exposes [`SqliteDeliveryStore`], a [`dropgate_core::DeliveryStore`]
//! implementation that keeps every record as canonical JSON next to the
//! columns needed for lookups and uniqueness constraints.

pub mod store;

pub use store::MAX_RECORD_BYTES;
pub use store::SqliteDeliveryStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
