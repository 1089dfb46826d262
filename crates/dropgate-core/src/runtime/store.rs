// crates/dropgate-core/src/runtime/store.rs
// ============================================================================
// Module: Dropgate In-Memory Stores
// Description: In-memory delivery and blob stores plus shared wrappers.
// Purpose: Provide deterministic backends for tests and local development.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! [`InMemoryDeliveryStore`] keeps every table behind one mutex so a
//! [`TransferChange`] applies atomically, mirroring a relational transaction.
//! [`InMemoryBlobStore`] keeps blobs in an ordered map so prefix listing is
//! lexicographic. Shared wrappers erase backend types behind `Arc` trait
//! objects so the runtime can be assembled from configuration.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use crate::core::DeliveryReceipt;
use crate::core::KeyId;
use crate::core::PaymentIntent;
use crate::core::PrincipalId;
use crate::core::Product;
use crate::core::ProductId;
use crate::core::ProductKey;
use crate::core::Timestamp;
use crate::core::Transfer;
use crate::core::TransferId;
use crate::interfaces::BlobError;
use crate::interfaces::BlobStore;
use crate::interfaces::DeliveryStore;
use crate::interfaces::KeyChange;
use crate::interfaces::StoreError;
use crate::interfaces::TransferChange;

// ============================================================================
// SECTION: In-Memory Delivery Store
// ============================================================================

/// Tables held by the in-memory delivery store.
#[derive(Debug, Default)]
struct MemoryTables {
    /// Products keyed by id.
    products: BTreeMap<ProductId, Product>,
    /// Transfers keyed by id.
    transfers: BTreeMap<TransferId, Transfer>,
    /// Keys keyed by id.
    keys: BTreeMap<KeyId, ProductKey>,
    /// Payment intents keyed by transfer id.
    intents: BTreeMap<TransferId, PaymentIntent>,
    /// Receipts keyed by transfer id.
    receipts: BTreeMap<TransferId, DeliveryReceipt>,
}

impl MemoryTables {
    /// Returns true when another active transfer covers the same pair.
    fn has_other_active(&self, transfer: &Transfer) -> bool {
        self.transfers.values().any(|existing| {
            existing.id != transfer.id
                && existing.product_id == transfer.product_id
                && existing.to_recipient_id == transfer.to_recipient_id
                && existing.status.is_committed()
        })
    }

    /// Returns true when a live key already covers the new key's pair.
    fn has_live_key(&self, key: &ProductKey) -> bool {
        self.keys.values().any(|existing| {
            existing.product_id == key.product_id
                && existing.recipient_id == key.recipient_id
                && existing.is_live(key.created_at)
        })
    }
}

/// In-memory delivery store for tests and local development.
#[derive(Debug, Default, Clone)]
pub struct InMemoryDeliveryStore {
    /// Tables protected by a single mutex.
    tables: Arc<Mutex<MemoryTables>>,
}

impl InMemoryDeliveryStore {
    /// Creates an empty in-memory delivery store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the tables.
    fn lock(&self) -> Result<MutexGuard<'_, MemoryTables>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Io("delivery store mutex poisoned".to_string()))
    }
}

impl DeliveryStore for InMemoryDeliveryStore {
    fn insert_product(&self, product: &Product) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        if tables.products.contains_key(&product.id) {
            return Err(StoreError::Conflict(format!("product {} exists", product.id)));
        }
        tables.products.insert(product.id.clone(), product.clone());
        Ok(())
    }

    fn get_product(&self, product_id: &ProductId) -> Result<Option<Product>, StoreError> {
        Ok(self.lock()?.products.get(product_id).cloned())
    }

    fn update_product(&self, product: &Product) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        let slot = tables
            .products
            .get_mut(&product.id)
            .ok_or_else(|| StoreError::NotFound(format!("product {}", product.id)))?;
        *slot = product.clone();
        Ok(())
    }

    fn insert_transfer(&self, transfer: &Transfer) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        if tables.transfers.contains_key(&transfer.id) {
            return Err(StoreError::Conflict(format!("transfer {} exists", transfer.id)));
        }
        if transfer.status.is_committed() && tables.has_other_active(transfer) {
            return Err(StoreError::Conflict(
                "active transfer already exists for product and recipient".to_string(),
            ));
        }
        tables.transfers.insert(transfer.id.clone(), transfer.clone());
        Ok(())
    }

    fn get_transfer(&self, transfer_id: &TransferId) -> Result<Option<Transfer>, StoreError> {
        Ok(self.lock()?.transfers.get(transfer_id).cloned())
    }

    fn find_transfers(
        &self,
        product_id: &ProductId,
        recipient_id: &PrincipalId,
    ) -> Result<Vec<Transfer>, StoreError> {
        let tables = self.lock()?;
        let mut found: Vec<Transfer> = tables
            .transfers
            .values()
            .filter(|transfer| {
                transfer.product_id == *product_id && transfer.to_recipient_id == *recipient_id
            })
            .cloned()
            .collect();
        found.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| b.id.cmp(&a.id)));
        Ok(found)
    }

    fn apply_transfer_change(&self, change: &TransferChange) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        let transfer = &change.transfer;
        let current = tables
            .transfers
            .get(&transfer.id)
            .ok_or_else(|| StoreError::NotFound(format!("transfer {}", transfer.id)))?;
        if current.status != change.expected_status {
            return Err(StoreError::Conflict(format!(
                "transfer {} is {}, expected {}",
                transfer.id,
                current.status.as_str(),
                change.expected_status.as_str()
            )));
        }
        if transfer.status.is_committed() && tables.has_other_active(transfer) {
            return Err(StoreError::Conflict(
                "active transfer already exists for product and recipient".to_string(),
            ));
        }
        if let Some(receipt) = &change.receipt
            && tables.receipts.contains_key(&receipt.transfer_id)
        {
            return Err(StoreError::Conflict(format!(
                "receipt already recorded for transfer {}",
                receipt.transfer_id
            )));
        }
        if let Some(KeyChange::Expire {
            key_id, ..
        }) = &change.key
            && !tables.keys.contains_key(key_id)
        {
            return Err(StoreError::NotFound(format!("key {key_id}")));
        }
        if let Some(KeyChange::Insert(key)) = &change.key
            && (tables.keys.contains_key(&key.id) || tables.has_live_key(key))
        {
            return Err(StoreError::Conflict(format!("key {} exists", key.id)));
        }

        tables.transfers.insert(transfer.id.clone(), transfer.clone());
        if let Some(intent) = &change.payment {
            tables.intents.insert(intent.transfer_id.clone(), intent.clone());
        }
        if let Some(receipt) = &change.receipt {
            tables.receipts.insert(receipt.transfer_id.clone(), receipt.clone());
        }
        match &change.key {
            Some(KeyChange::Insert(key)) => {
                tables.keys.insert(key.id.clone(), key.clone());
            }
            Some(KeyChange::Expire {
                key_id,
                expires_at,
            }) => {
                if let Some(key) = tables.keys.get_mut(key_id) {
                    key.expires_at = *expires_at;
                }
            }
            None => {}
        }
        Ok(())
    }

    fn get_payment_intent(
        &self,
        transfer_id: &TransferId,
    ) -> Result<Option<PaymentIntent>, StoreError> {
        Ok(self.lock()?.intents.get(transfer_id).cloned())
    }

    fn put_payment_intent(&self, intent: &PaymentIntent) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        if let Some(existing) = tables.intents.get(&intent.transfer_id)
            && existing.id != intent.id
        {
            return Err(StoreError::Conflict(format!(
                "payment intent already exists for transfer {}",
                intent.transfer_id
            )));
        }
        tables.intents.insert(intent.transfer_id.clone(), intent.clone());
        Ok(())
    }

    fn get_key(&self, key_id: &KeyId) -> Result<Option<ProductKey>, StoreError> {
        Ok(self.lock()?.keys.get(key_id).cloned())
    }

    fn get_live_key(
        &self,
        product_id: &ProductId,
        recipient_id: &PrincipalId,
        now: Timestamp,
    ) -> Result<Option<ProductKey>, StoreError> {
        let tables = self.lock()?;
        Ok(tables
            .keys
            .values()
            .filter(|key| {
                key.product_id == *product_id
                    && key.recipient_id == *recipient_id
                    && key.is_live(now)
            })
            .max_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)))
            .cloned())
    }

    fn get_receipt(
        &self,
        transfer_id: &TransferId,
    ) -> Result<Option<DeliveryReceipt>, StoreError> {
        Ok(self.lock()?.receipts.get(transfer_id).cloned())
    }
}

// ============================================================================
// SECTION: In-Memory Blob Store
// ============================================================================

/// In-memory blob store for tests and local development.
#[derive(Debug, Default, Clone)]
pub struct InMemoryBlobStore {
    /// Blobs keyed by path.
    blobs: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

impl InMemoryBlobStore {
    /// Creates an empty in-memory blob store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the blob map.
    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<String, Vec<u8>>>, BlobError> {
        self.blobs.lock().map_err(|_| BlobError::Io("blob store mutex poisoned".to_string()))
    }
}

impl BlobStore for InMemoryBlobStore {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), BlobError> {
        self.lock()?.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BlobError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn delete(&self, key: &str) -> Result<(), BlobError> {
        self.lock()?.remove(key);
        Ok(())
    }

    fn list_prefix(&self, prefix: &str) -> Result<Vec<String>, BlobError> {
        Ok(self
            .lock()?
            .range(prefix.to_string() ..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect())
    }
}

// ============================================================================
// SECTION: Shared Wrappers
// ============================================================================

/// Shared delivery store backed by an `Arc` trait object.
#[derive(Clone)]
pub struct SharedDeliveryStore {
    /// Inner store implementation.
    inner: Arc<dyn DeliveryStore + Send + Sync>,
}

impl SharedDeliveryStore {
    /// Wraps a delivery store in a shared, clonable wrapper.
    #[must_use]
    pub fn from_store(store: impl DeliveryStore + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(store),
        }
    }

    /// Wraps an existing shared store.
    #[must_use]
    pub const fn new(store: Arc<dyn DeliveryStore + Send + Sync>) -> Self {
        Self {
            inner: store,
        }
    }
}

impl DeliveryStore for SharedDeliveryStore {
    fn insert_product(&self, product: &Product) -> Result<(), StoreError> {
        self.inner.insert_product(product)
    }

    fn get_product(&self, product_id: &ProductId) -> Result<Option<Product>, StoreError> {
        self.inner.get_product(product_id)
    }

    fn update_product(&self, product: &Product) -> Result<(), StoreError> {
        self.inner.update_product(product)
    }

    fn insert_transfer(&self, transfer: &Transfer) -> Result<(), StoreError> {
        self.inner.insert_transfer(transfer)
    }

    fn get_transfer(&self, transfer_id: &TransferId) -> Result<Option<Transfer>, StoreError> {
        self.inner.get_transfer(transfer_id)
    }

    fn find_transfers(
        &self,
        product_id: &ProductId,
        recipient_id: &PrincipalId,
    ) -> Result<Vec<Transfer>, StoreError> {
        self.inner.find_transfers(product_id, recipient_id)
    }

    fn apply_transfer_change(&self, change: &TransferChange) -> Result<(), StoreError> {
        self.inner.apply_transfer_change(change)
    }

    fn get_payment_intent(
        &self,
        transfer_id: &TransferId,
    ) -> Result<Option<PaymentIntent>, StoreError> {
        self.inner.get_payment_intent(transfer_id)
    }

    fn put_payment_intent(&self, intent: &PaymentIntent) -> Result<(), StoreError> {
        self.inner.put_payment_intent(intent)
    }

    fn get_key(&self, key_id: &KeyId) -> Result<Option<ProductKey>, StoreError> {
        self.inner.get_key(key_id)
    }

    fn get_live_key(
        &self,
        product_id: &ProductId,
        recipient_id: &PrincipalId,
        now: Timestamp,
    ) -> Result<Option<ProductKey>, StoreError> {
        self.inner.get_live_key(product_id, recipient_id, now)
    }

    fn get_receipt(
        &self,
        transfer_id: &TransferId,
    ) -> Result<Option<DeliveryReceipt>, StoreError> {
        self.inner.get_receipt(transfer_id)
    }

    fn readiness(&self) -> Result<(), StoreError> {
        self.inner.readiness()
    }
}

/// Shared blob store backed by an `Arc` trait object.
#[derive(Clone)]
pub struct SharedBlobStore {
    /// Inner store implementation.
    inner: Arc<dyn BlobStore + Send + Sync>,
}

impl SharedBlobStore {
    /// Wraps a blob store in a shared, clonable wrapper.
    #[must_use]
    pub fn from_store(store: impl BlobStore + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(store),
        }
    }

    /// Wraps an existing shared store.
    #[must_use]
    pub const fn new(store: Arc<dyn BlobStore + Send + Sync>) -> Self {
        Self {
            inner: store,
        }
    }
}

impl BlobStore for SharedBlobStore {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), BlobError> {
        self.inner.put(key, bytes)
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BlobError> {
        self.inner.get(key)
    }

    fn delete(&self, key: &str) -> Result<(), BlobError> {
        self.inner.delete(key)
    }

    fn list_prefix(&self, prefix: &str) -> Result<Vec<String>, BlobError> {
        self.inner.list_prefix(prefix)
    }
}
