// crates/dropgate-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Delivery Store
// Description: Durable DeliveryStore backed by SQLite WAL.
// Purpose: Persist delivery records with hashed canonical JSON payloads.
// Dependencies: dropgate-core, rusqlite, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! This module implements a durable [`DeliveryStore`] using `SQLite`. Each
//! record is stored as canonical JSON with its hash; loads verify the hash and
//! fail closed on corruption. Lookup columns (status, recipient, expiry) are
//! duplicated out of the record so uniqueness rules live in the schema:
//! - one committed transfer per product and recipient (partial unique index)
//! - one receipt and one payment intent per transfer (primary keys)
//!
//! Guarded transfer changes run inside a single immediate transaction with a
//! status compare-and-set, so every row of a change lands or none do.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;

use dropgate_core::DEFAULT_HASH_ALGORITHM;
use dropgate_core::DeliveryReceipt;
use dropgate_core::DeliveryStore;
use dropgate_core::HashAlgorithm;
use dropgate_core::KeyChange;
use dropgate_core::KeyId;
use dropgate_core::PaymentIntent;
use dropgate_core::PrincipalId;
use dropgate_core::Product;
use dropgate_core::ProductId;
use dropgate_core::ProductKey;
use dropgate_core::StoreError;
use dropgate_core::Timestamp;
use dropgate_core::Transfer;
use dropgate_core::TransferChange;
use dropgate_core::TransferId;
use dropgate_core::canonical_json_bytes;
use dropgate_core::hash_bytes;
use rusqlite::Connection;
use rusqlite::ErrorCode;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::Transaction;
use rusqlite::TransactionBehavior;
use rusqlite::params;
use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum serialized record size accepted by the store.
pub const MAX_RECORD_BYTES: usize = 4 * 1024 * 1024;

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `synchronous` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` delivery store.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `busy_timeout_ms` is interpreted as milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl SqliteStoreConfig {
    /// Creates a config for `path` with default pragmas.
    #[must_use]
    pub fn for_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
///
/// # Invariants
/// - Error messages avoid embedding raw record payloads.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Database busy or locked; the caller should retry.
    #[error("sqlite store busy: {0}")]
    Busy(String),
    /// Constraint or compare-and-set violation.
    #[error("sqlite store conflict: {0}")]
    Conflict(String),
    /// Row addressed by an update does not exist.
    #[error("sqlite store missing record: {0}")]
    NotFound(String),
    /// Store corruption or hash mismatch.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store data or configuration.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
    /// Record exceeded the size limit.
    #[error("sqlite store record too large: {actual_bytes} bytes (max {max_bytes})")]
    TooLarge {
        /// Maximum allowed bytes.
        max_bytes: usize,
        /// Actual record size in bytes.
        actual_bytes: usize,
    },
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) => Self::Io(format!("sqlite: {message}")),
            SqliteStoreError::Busy(message) => Self::Transient(message),
            SqliteStoreError::Conflict(message) => Self::Conflict(message),
            SqliteStoreError::NotFound(message) => Self::NotFound(message),
            SqliteStoreError::Corrupt(message) | SqliteStoreError::VersionMismatch(message) => {
                Self::Corrupt(message)
            }
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
            SqliteStoreError::TooLarge {
                max_bytes,
                actual_bytes,
            } => Self::Invalid(format!(
                "record exceeds size limit: {actual_bytes} bytes (max {max_bytes})"
            )),
        }
    }
}

impl From<rusqlite::Error> for SqliteStoreError {
    fn from(error: rusqlite::Error) -> Self {
        match error.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => {
                Self::Busy(error.to_string())
            }
            Some(ErrorCode::ConstraintViolation) => Self::Conflict(error.to_string()),
            _ => Self::Db(error.to_string()),
        }
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed delivery store with WAL support.
///
/// # Invariants
/// - Record loads verify stored hashes before deserialization.
/// - `SQLite` connection access is serialized through a mutex.
#[derive(Clone)]
pub struct SqliteDeliveryStore {
    /// Store configuration.
    config: SqliteStoreConfig,
    /// Shared connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteDeliveryStore {
    /// Opens an `SQLite`-backed delivery store.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// initialized.
    pub fn new(config: SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(&config)?;
        initialize_schema(&mut connection)?;
        Ok(Self {
            config,
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Returns the store configuration.
    #[must_use]
    pub const fn config(&self) -> &SqliteStoreConfig {
        &self.config
    }

    /// Locks the connection.
    fn lock(&self) -> Result<MutexGuard<'_, Connection>, SqliteStoreError> {
        self.connection
            .lock()
            .map_err(|_| SqliteStoreError::Io("sqlite mutex poisoned".to_string()))
    }

    /// Runs `op` inside an immediate transaction and commits on success.
    fn write<T>(
        &self,
        op: impl FnOnce(&Transaction<'_>) -> Result<T, SqliteStoreError>,
    ) -> Result<T, SqliteStoreError> {
        let mut guard = self.lock()?;
        let tx = guard.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = op(&tx)?;
        tx.commit()?;
        drop(guard);
        Ok(value)
    }

    /// Loads and verifies one record by primary key.
    fn load_record<T: DeserializeOwned>(
        &self,
        table: Table,
        id: &str,
    ) -> Result<Option<T>, SqliteStoreError> {
        let guard = self.lock()?;
        let stored = query_record(&guard, table, id)?;
        drop(guard);
        stored.map(|stored| stored.decode(table, id)).transpose()
    }

    /// Applies a guarded transfer change inside `tx`.
    fn apply_change_in_tx(
        tx: &Transaction<'_>,
        change: &TransferChange,
    ) -> Result<(), SqliteStoreError> {
        let transfer = &change.transfer;
        let current: Option<String> = tx
            .query_row(
                "SELECT status FROM transfers WHERE transfer_id = ?1",
                params![transfer.id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        let Some(current) = current else {
            return Err(SqliteStoreError::NotFound(format!("transfer {}", transfer.id)));
        };
        if current != change.expected_status.as_str() {
            return Err(SqliteStoreError::Conflict(format!(
                "transfer {} is {current}, expected {}",
                transfer.id,
                change.expected_status.as_str()
            )));
        }

        let record = EncodedRecord::encode(transfer)?;
        tx.execute(
            "UPDATE transfers SET status = ?2, updated_at = ?3, record_json = ?4, record_hash = \
             ?5, hash_algorithm = ?6 WHERE transfer_id = ?1",
            params![
                transfer.id.as_str(),
                transfer.status.as_str(),
                transfer.updated_at.as_unix_millis(),
                record.bytes,
                record.hash_value,
                record.hash_algorithm,
            ],
        )
        .map_err(|err| {
            conflict_or(err, "active transfer already exists for product and recipient")
        })?;

        if let Some(intent) = &change.payment {
            upsert_intent(tx, intent)?;
        }
        if let Some(receipt) = &change.receipt {
            let record = EncodedRecord::encode(receipt)?;
            tx.execute(
                "INSERT INTO delivery_receipts (transfer_id, receipt_id, record_json, \
                 record_hash, hash_algorithm) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    receipt.transfer_id.as_str(),
                    receipt.id.as_str(),
                    record.bytes,
                    record.hash_value,
                    record.hash_algorithm,
                ],
            )
            .map_err(|err| {
                conflict_or(
                    err,
                    &format!("receipt already recorded for transfer {}", receipt.transfer_id),
                )
            })?;
        }
        match &change.key {
            Some(KeyChange::Insert(key)) => insert_key(tx, key)?,
            Some(KeyChange::Expire {
                key_id,
                expires_at,
            }) => expire_key(tx, key_id, *expires_at)?,
            None => {}
        }
        Ok(())
    }
}

impl DeliveryStore for SqliteDeliveryStore {
    fn insert_product(&self, product: &Product) -> Result<(), StoreError> {
        let record = EncodedRecord::encode(product)?;
        self.write(|tx| {
            tx.execute(
                "INSERT INTO products (product_id, owner_id, record_json, record_hash, \
                 hash_algorithm) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    product.id.as_str(),
                    product.owner_id.as_str(),
                    record.bytes,
                    record.hash_value,
                    record.hash_algorithm,
                ],
            )
            .map_err(|err| conflict_or(err, &format!("product {} exists", product.id)))?;
            Ok(())
        })?;
        Ok(())
    }

    fn get_product(&self, product_id: &ProductId) -> Result<Option<Product>, StoreError> {
        Ok(self.load_record(Table::Products, product_id.as_str())?)
    }

    fn update_product(&self, product: &Product) -> Result<(), StoreError> {
        let record = EncodedRecord::encode(product)?;
        self.write(|tx| {
            let updated = tx.execute(
                "UPDATE products SET owner_id = ?2, record_json = ?3, record_hash = ?4, \
                 hash_algorithm = ?5 WHERE product_id = ?1",
                params![
                    product.id.as_str(),
                    product.owner_id.as_str(),
                    record.bytes,
                    record.hash_value,
                    record.hash_algorithm,
                ],
            )?;
            if updated == 0 {
                return Err(SqliteStoreError::NotFound(format!("product {}", product.id)));
            }
            Ok(())
        })?;
        Ok(())
    }

    fn insert_transfer(&self, transfer: &Transfer) -> Result<(), StoreError> {
        let record = EncodedRecord::encode(transfer)?;
        self.write(|tx| {
            tx.execute(
                "INSERT INTO transfers (transfer_id, product_id, recipient_id, status, \
                 updated_at, record_json, record_hash, hash_algorithm) VALUES (?1, ?2, ?3, ?4, \
                 ?5, ?6, ?7, ?8)",
                params![
                    transfer.id.as_str(),
                    transfer.product_id.as_str(),
                    transfer.to_recipient_id.as_str(),
                    transfer.status.as_str(),
                    transfer.updated_at.as_unix_millis(),
                    record.bytes,
                    record.hash_value,
                    record.hash_algorithm,
                ],
            )
            .map_err(|err| {
                conflict_or(
                    err,
                    "transfer exists or an active transfer covers the product and recipient",
                )
            })?;
            Ok(())
        })?;
        Ok(())
    }

    fn get_transfer(&self, transfer_id: &TransferId) -> Result<Option<Transfer>, StoreError> {
        Ok(self.load_record(Table::Transfers, transfer_id.as_str())?)
    }

    fn find_transfers(
        &self,
        product_id: &ProductId,
        recipient_id: &PrincipalId,
    ) -> Result<Vec<Transfer>, StoreError> {
        let guard = self.lock()?;
        let rows = {
            let mut stmt = guard
                .prepare(
                    "SELECT transfer_id, record_json, record_hash, hash_algorithm FROM transfers \
                     WHERE product_id = ?1 AND recipient_id = ?2 ORDER BY updated_at DESC, \
                     transfer_id DESC",
                )
                .map_err(SqliteStoreError::from)?;
            let mapped = stmt
                .query_map(params![product_id.as_str(), recipient_id.as_str()], |row| {
                    Ok((row.get::<_, String>(0)?, StoredRecord::from_row(row, 1)?))
                })
                .map_err(SqliteStoreError::from)?;
            mapped.collect::<Result<Vec<_>, _>>().map_err(SqliteStoreError::from)?
        };
        drop(guard);
        let transfers = rows
            .into_iter()
            .map(|(id, stored)| stored.decode(Table::Transfers, &id))
            .collect::<Result<Vec<Transfer>, _>>()?;
        Ok(transfers)
    }

    fn apply_transfer_change(&self, change: &TransferChange) -> Result<(), StoreError> {
        self.write(|tx| Self::apply_change_in_tx(tx, change))?;
        Ok(())
    }

    fn get_payment_intent(
        &self,
        transfer_id: &TransferId,
    ) -> Result<Option<PaymentIntent>, StoreError> {
        Ok(self.load_record(Table::PaymentIntents, transfer_id.as_str())?)
    }

    fn put_payment_intent(&self, intent: &PaymentIntent) -> Result<(), StoreError> {
        self.write(|tx| upsert_intent(tx, intent))?;
        Ok(())
    }

    fn get_key(&self, key_id: &KeyId) -> Result<Option<ProductKey>, StoreError> {
        Ok(self.load_record(Table::ProductKeys, key_id.as_str())?)
    }

    fn get_live_key(
        &self,
        product_id: &ProductId,
        recipient_id: &PrincipalId,
        now: Timestamp,
    ) -> Result<Option<ProductKey>, StoreError> {
        let guard = self.lock()?;
        let row = guard
            .query_row(
                "SELECT key_id, record_json, record_hash, hash_algorithm FROM product_keys WHERE \
                 product_id = ?1 AND recipient_id = ?2 AND expires_at > ?3 ORDER BY created_at \
                 DESC, key_id DESC LIMIT 1",
                params![product_id.as_str(), recipient_id.as_str(), now.as_unix_millis()],
                |row| Ok((row.get::<_, String>(0)?, StoredRecord::from_row(row, 1)?)),
            )
            .optional()
            .map_err(SqliteStoreError::from)?;
        drop(guard);
        Ok(row.map(|(id, stored)| stored.decode(Table::ProductKeys, &id)).transpose()?)
    }

    fn get_receipt(
        &self,
        transfer_id: &TransferId,
    ) -> Result<Option<DeliveryReceipt>, StoreError> {
        Ok(self.load_record(Table::DeliveryReceipts, transfer_id.as_str())?)
    }

    fn readiness(&self) -> Result<(), StoreError> {
        let guard = self.lock()?;
        guard
            .query_row("SELECT 1", params![], |row| row.get::<_, i64>(0))
            .map_err(SqliteStoreError::from)?;
        drop(guard);
        Ok(())
    }
}

// ============================================================================
// SECTION: Records
// ============================================================================

/// Tables holding hashed JSON records.
#[derive(Debug, Clone, Copy)]
enum Table {
    /// `products`, keyed by product id.
    Products,
    /// `transfers`, keyed by transfer id.
    Transfers,
    /// `product_keys`, keyed by key id.
    ProductKeys,
    /// `payment_intents`, keyed by transfer id.
    PaymentIntents,
    /// `delivery_receipts`, keyed by transfer id.
    DeliveryReceipts,
}

impl Table {
    /// Returns the primary-key select statement for the table.
    const fn select_sql(self) -> &'static str {
        match self {
            Self::Products => {
                "SELECT record_json, record_hash, hash_algorithm FROM products WHERE product_id \
                 = ?1"
            }
            Self::Transfers => {
                "SELECT record_json, record_hash, hash_algorithm FROM transfers WHERE \
                 transfer_id = ?1"
            }
            Self::ProductKeys => {
                "SELECT record_json, record_hash, hash_algorithm FROM product_keys WHERE key_id \
                 = ?1"
            }
            Self::PaymentIntents => {
                "SELECT record_json, record_hash, hash_algorithm FROM payment_intents WHERE \
                 transfer_id = ?1"
            }
            Self::DeliveryReceipts => {
                "SELECT record_json, record_hash, hash_algorithm FROM delivery_receipts WHERE \
                 transfer_id = ?1"
            }
        }
    }

    /// Returns the table name.
    const fn name(self) -> &'static str {
        match self {
            Self::Products => "products",
            Self::Transfers => "transfers",
            Self::ProductKeys => "product_keys",
            Self::PaymentIntents => "payment_intents",
            Self::DeliveryReceipts => "delivery_receipts",
        }
    }
}

/// Canonical JSON bytes and their hash, ready to write.
struct EncodedRecord {
    /// Canonical JSON bytes.
    bytes: Vec<u8>,
    /// Hex digest of `bytes`.
    hash_value: String,
    /// Hash algorithm label.
    hash_algorithm: &'static str,
}

impl EncodedRecord {
    /// Serializes and hashes a record.
    fn encode<T: Serialize>(value: &T) -> Result<Self, SqliteStoreError> {
        let bytes =
            canonical_json_bytes(value).map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
        if bytes.len() > MAX_RECORD_BYTES {
            return Err(SqliteStoreError::TooLarge {
                max_bytes: MAX_RECORD_BYTES,
                actual_bytes: bytes.len(),
            });
        }
        let digest = hash_bytes(DEFAULT_HASH_ALGORITHM, &bytes);
        Ok(Self {
            bytes,
            hash_value: digest.value,
            hash_algorithm: DEFAULT_HASH_ALGORITHM.label(),
        })
    }
}

/// Record payload as read back from a row.
struct StoredRecord {
    /// Stored JSON bytes.
    bytes: Vec<u8>,
    /// Stored hash value.
    hash_value: String,
    /// Stored hash algorithm label.
    hash_algorithm: String,
}

impl StoredRecord {
    /// Reads the three record columns starting at `offset`.
    fn from_row(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            bytes: row.get(offset)?,
            hash_value: row.get(offset + 1)?,
            hash_algorithm: row.get(offset + 2)?,
        })
    }

    /// Verifies the hash and deserializes the record.
    fn decode<T: DeserializeOwned>(self, table: Table, id: &str) -> Result<T, SqliteStoreError> {
        if self.bytes.len() > MAX_RECORD_BYTES {
            return Err(SqliteStoreError::TooLarge {
                max_bytes: MAX_RECORD_BYTES,
                actual_bytes: self.bytes.len(),
            });
        }
        let algorithm = parse_hash_algorithm(&self.hash_algorithm)?;
        let digest = hash_bytes(algorithm, &self.bytes);
        if digest.value != self.hash_value {
            return Err(SqliteStoreError::Corrupt(format!(
                "hash mismatch for {} {id}",
                table.name()
            )));
        }
        serde_json::from_slice(&self.bytes).map_err(|err| {
            SqliteStoreError::Corrupt(format!("{} {id} failed to decode: {err}", table.name()))
        })
    }
}

/// Loads one stored record by primary key.
fn query_record(
    connection: &Connection,
    table: Table,
    id: &str,
) -> Result<Option<StoredRecord>, SqliteStoreError> {
    Ok(connection
        .query_row(table.select_sql(), params![id], |row| StoredRecord::from_row(row, 0))
        .optional()?)
}

/// Parses a stored hash algorithm label.
fn parse_hash_algorithm(label: &str) -> Result<HashAlgorithm, SqliteStoreError> {
    HashAlgorithm::parse(label)
        .ok_or_else(|| SqliteStoreError::Corrupt(format!("unsupported hash algorithm: {label}")))
}

/// Maps constraint violations to a readable conflict message.
fn conflict_or(error: rusqlite::Error, message: &str) -> SqliteStoreError {
    match SqliteStoreError::from(error) {
        SqliteStoreError::Conflict(_) => SqliteStoreError::Conflict(message.to_string()),
        other => other,
    }
}

/// Inserts or replaces the payment intent for a transfer.
fn upsert_intent(tx: &Transaction<'_>, intent: &PaymentIntent) -> Result<(), SqliteStoreError> {
    let existing: Option<String> = tx
        .query_row(
            "SELECT intent_id FROM payment_intents WHERE transfer_id = ?1",
            params![intent.transfer_id.as_str()],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(existing) = existing
        && existing != intent.id.as_str()
    {
        return Err(SqliteStoreError::Conflict(format!(
            "payment intent already exists for transfer {}",
            intent.transfer_id
        )));
    }
    let record = EncodedRecord::encode(intent)?;
    tx.execute(
        "INSERT OR REPLACE INTO payment_intents (transfer_id, intent_id, record_json, \
         record_hash, hash_algorithm) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            intent.transfer_id.as_str(),
            intent.id.as_str(),
            record.bytes,
            record.hash_value,
            record.hash_algorithm,
        ],
    )?;
    Ok(())
}

/// Inserts a new key unless another live key covers the same pair.
fn insert_key(tx: &Transaction<'_>, key: &ProductKey) -> Result<(), SqliteStoreError> {
    let live: i64 = tx.query_row(
        "SELECT COUNT(1) FROM product_keys WHERE product_id = ?1 AND recipient_id = ?2 AND \
         expires_at > ?3",
        params![
            key.product_id.as_str(),
            key.recipient_id.as_str(),
            key.created_at.as_unix_millis()
        ],
        |row| row.get(0),
    )?;
    if live > 0 {
        return Err(SqliteStoreError::Conflict(format!(
            "live key already exists for product {}",
            key.product_id
        )));
    }
    let record = EncodedRecord::encode(key)?;
    tx.execute(
        "INSERT INTO product_keys (key_id, product_id, recipient_id, created_at, expires_at, \
         record_json, record_hash, hash_algorithm) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            key.id.as_str(),
            key.product_id.as_str(),
            key.recipient_id.as_str(),
            key.created_at.as_unix_millis(),
            key.expires_at.as_unix_millis(),
            record.bytes,
            record.hash_value,
            record.hash_algorithm,
        ],
    )
    .map_err(|err| conflict_or(err, &format!("key {} exists", key.id)))?;
    Ok(())
}

/// Rewrites a key's expiry in both the column and the record.
fn expire_key(
    tx: &Transaction<'_>,
    key_id: &KeyId,
    expires_at: Timestamp,
) -> Result<(), SqliteStoreError> {
    let stored = query_record(tx, Table::ProductKeys, key_id.as_str())?
        .ok_or_else(|| SqliteStoreError::NotFound(format!("key {key_id}")))?;
    let mut key: ProductKey = stored.decode(Table::ProductKeys, key_id.as_str())?;
    key.expires_at = expires_at;
    let record = EncodedRecord::encode(&key)?;
    tx.execute(
        "UPDATE product_keys SET expires_at = ?2, record_json = ?3, record_hash = ?4, \
         hash_algorithm = ?5 WHERE key_id = ?1",
        params![
            key_id.as_str(),
            expires_at.as_unix_millis(),
            record.bytes,
            record.hash_value,
            record.hash_algorithm,
        ],
    )?;
    Ok(())
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    if path.as_os_str().is_empty() {
        return Err(SqliteStoreError::Invalid("store path must not be empty".to_string()));
    }
    let path_string = path.display().to_string();
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteStoreError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    if path.exists() && path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection with durable defaults.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags)?;
    connection.execute_batch("PRAGMA foreign_keys = ON;")?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))?;
    connection.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
    Ok(connection)
}

/// Initializes the `SQLite` schema or validates the existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction()?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS products (
                    product_id TEXT PRIMARY KEY,
                    owner_id TEXT NOT NULL,
                    record_json BLOB NOT NULL,
                    record_hash TEXT NOT NULL,
                    hash_algorithm TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_products_owner ON products (owner_id);
                CREATE TABLE IF NOT EXISTS transfers (
                    transfer_id TEXT PRIMARY KEY,
                    product_id TEXT NOT NULL REFERENCES products(product_id),
                    recipient_id TEXT NOT NULL,
                    status TEXT NOT NULL,
                    updated_at INTEGER NOT NULL,
                    record_json BLOB NOT NULL,
                    record_hash TEXT NOT NULL,
                    hash_algorithm TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_transfers_pair
                    ON transfers (product_id, recipient_id, updated_at);
                CREATE UNIQUE INDEX IF NOT EXISTS idx_transfers_active_pair
                    ON transfers (product_id, recipient_id)
                    WHERE status IN ('offered', 'invoiced', 'paid');
                CREATE TABLE IF NOT EXISTS product_keys (
                    key_id TEXT PRIMARY KEY,
                    product_id TEXT NOT NULL REFERENCES products(product_id),
                    recipient_id TEXT NOT NULL,
                    created_at INTEGER NOT NULL,
                    expires_at INTEGER NOT NULL,
                    record_json BLOB NOT NULL,
                    record_hash TEXT NOT NULL,
                    hash_algorithm TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_product_keys_pair
                    ON product_keys (product_id, recipient_id, expires_at);
                CREATE TABLE IF NOT EXISTS payment_intents (
                    transfer_id TEXT PRIMARY KEY REFERENCES transfers(transfer_id),
                    intent_id TEXT NOT NULL UNIQUE,
                    record_json BLOB NOT NULL,
                    record_hash TEXT NOT NULL,
                    hash_algorithm TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS delivery_receipts (
                    transfer_id TEXT PRIMARY KEY REFERENCES transfers(transfer_id),
                    receipt_id TEXT NOT NULL UNIQUE,
                    record_json BLOB NOT NULL,
                    record_hash TEXT NOT NULL,
                    hash_algorithm TEXT NOT NULL
                );",
            )?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    tx.commit()?;
    Ok(())
}
