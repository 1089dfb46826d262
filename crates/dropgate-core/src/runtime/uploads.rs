// crates/dropgate-core/src/runtime/uploads.rs
// ============================================================================
// Module: Dropgate Upload Sessions
// Description: Chunked upload sessions held in an expiring arena.
// Purpose: Accept chunks, track arrival, and finalize a verified manifest.
// Dependencies: crate::core, crate::interfaces, crate::runtime
// ============================================================================

//! ## Overview
//! An upload session is opened for a pending product, accepts exactly sized
//! chunks in any order, and is completed once every index has arrived.
//! Completion re-reads every chunk from the blob store in index order to
//! compute the whole-content digest, so the manifest never describes bytes the
//! store does not hold.
//!
//! Sessions live in a [`SessionArena`], not the relational store. Expired
//! sessions behave as not found and are dropped lazily.
//!
//! # Invariants
//! - A chunk is accepted only when its length equals the expected length for
//!   its index.
//! - Completion is the single pending to ready transition of a product.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use serde::Deserialize;
use serde::Serialize;

use crate::core::ChunkRecord;
use crate::core::ContentHasher;
use crate::core::DEFAULT_HASH_ALGORITHM;
use crate::core::DeliveryAuditEventParams;
use crate::core::DeliveryAuditKind;
use crate::core::HashDigest;
use crate::core::Manifest;
use crate::core::ManifestEntry;
use crate::core::PrincipalId;
use crate::core::Product;
use crate::core::ProductId;
use crate::core::Timestamp;
use crate::core::UploadId;
use crate::core::UploadSession;
use crate::core::chunk_key;
use crate::core::expected_chunk_count;
use crate::core::expected_chunk_len;
use crate::core::hash_bytes;
use crate::core::manifest_key;
use crate::interfaces::BlobStore;
use crate::interfaces::DeliveryStore;
use crate::interfaces::put_json_document;
use crate::runtime::context::DeliveryContext;
use crate::runtime::error::DeliveryError;

// ============================================================================
// SECTION: Session Arena
// ============================================================================

/// Expiring in-process map of upload sessions.
#[derive(Debug, Default)]
pub struct SessionArena {
    /// Sessions keyed by upload id.
    sessions: Mutex<BTreeMap<UploadId, UploadSession>>,
}

impl SessionArena {
    /// Creates an empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the arena, dropping sessions that expired at `now`.
    fn lock(
        &self,
        now: Timestamp,
    ) -> Result<MutexGuard<'_, BTreeMap<UploadId, UploadSession>>, DeliveryError> {
        let mut guard = self
            .sessions
            .lock()
            .map_err(|_| DeliveryError::Transient("upload session arena poisoned".to_string()))?;
        guard.retain(|_, session| !now.has_reached(session.expires_at));
        Ok(guard)
    }

    /// Inserts a session.
    fn insert(&self, session: UploadSession, now: Timestamp) -> Result<(), DeliveryError> {
        self.lock(now)?.insert(session.upload_id.clone(), session);
        Ok(())
    }

    /// Returns a live session owned by `owner`.
    fn get_owned(
        &self,
        upload_id: &UploadId,
        owner: &PrincipalId,
        now: Timestamp,
    ) -> Result<UploadSession, DeliveryError> {
        self.lock(now)?
            .get(upload_id)
            .filter(|session| session.owner_id == *owner)
            .cloned()
            .ok_or(DeliveryError::SessionNotFound)
    }

    /// Records a chunk on a live session.
    fn record_chunk(
        &self,
        upload_id: &UploadId,
        index: u32,
        record: ChunkRecord,
        now: Timestamp,
    ) -> Result<(), DeliveryError> {
        let mut guard = self.lock(now)?;
        let session = guard.get_mut(upload_id).ok_or(DeliveryError::SessionNotFound)?;
        session.uploaded_chunks.insert(index, record);
        Ok(())
    }

    /// Removes a session.
    fn remove(&self, upload_id: &UploadId, now: Timestamp) -> Result<(), DeliveryError> {
        self.lock(now)?.remove(upload_id);
        Ok(())
    }

    /// Returns the number of live sessions.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::Transient`] when the arena lock is poisoned.
    pub fn live_sessions(&self, now: Timestamp) -> Result<usize, DeliveryError> {
        Ok(self.lock(now)?.len())
    }
}

// ============================================================================
// SECTION: Results
// ============================================================================

/// Outcome of a chunk upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkReceipt {
    /// Chunk index.
    pub index: u32,
    /// Chunk digest.
    pub hash: HashDigest,
    /// Chunk size in bytes.
    pub size: u64,
}

/// Resumable view of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadStatus {
    /// Session identifier.
    pub upload_id: UploadId,
    /// Product being uploaded.
    pub product_id: ProductId,
    /// Chunks required.
    pub expected_chunks: u32,
    /// Indices received.
    pub uploaded: Vec<u32>,
    /// Indices still missing.
    pub missing: Vec<u32>,
    /// Session expiry.
    pub expires_at: Timestamp,
}

/// Outcome of upload completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedUpload {
    /// Finalized product.
    pub product: Product,
    /// Finalized manifest.
    pub manifest: Manifest,
}

// ============================================================================
// SECTION: Manager
// ============================================================================

/// Upload session manager.
pub struct UploadSessionManager {
    /// Shared runtime context.
    ctx: Arc<DeliveryContext>,
    /// Live sessions.
    arena: SessionArena,
}

impl UploadSessionManager {
    /// Creates a manager with an empty arena.
    #[must_use]
    pub fn new(ctx: Arc<DeliveryContext>) -> Self {
        Self {
            ctx,
            arena: SessionArena::new(),
        }
    }

    /// Returns the session arena.
    #[must_use]
    pub const fn arena(&self) -> &SessionArena {
        &self.arena
    }

    /// Opens an upload session for a pending product owned by `owner`.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::InvalidInput`] for out-of-range sizes,
    /// [`DeliveryError::NotFoundOrDenied`] for unknown or foreign products, and
    /// [`DeliveryError::InvalidState`] when the product is already finalized.
    pub fn initialize_upload(
        &self,
        owner: &PrincipalId,
        product_id: &ProductId,
        total_size: u64,
        chunk_size: u64,
    ) -> Result<UploadSession, DeliveryError> {
        let config = &self.ctx.config;
        if chunk_size == 0 || chunk_size > config.max_chunk_size_bytes {
            return Err(DeliveryError::InvalidInput(format!(
                "chunk size must be in 1..={}",
                config.max_chunk_size_bytes
            )));
        }
        if total_size == 0 || total_size > config.max_total_size_bytes {
            return Err(DeliveryError::InvalidInput(format!(
                "total size must be in 1..={}",
                config.max_total_size_bytes
            )));
        }
        let expected_chunks = expected_chunk_count(total_size, chunk_size)
            .ok_or_else(|| DeliveryError::InvalidInput("chunk count out of range".to_string()))?;

        let product = self
            .ctx
            .retry(|| Ok(self.ctx.store().get_product(product_id)?))?
            .filter(|product| product.owner_id == *owner)
            .ok_or(DeliveryError::NotFoundOrDenied)?;
        if product.is_ready() {
            return Err(DeliveryError::InvalidState("product upload already completed".to_string()));
        }
        if product.size_bytes != total_size {
            return Err(DeliveryError::InvalidInput(format!(
                "total size {total_size} does not match declared product size {}",
                product.size_bytes
            )));
        }

        let now = self.ctx.now();
        let session = UploadSession {
            upload_id: UploadId::generate(),
            product_id: product.id.clone(),
            owner_id: owner.clone(),
            storage_prefix: format!("products/{}", product.id),
            chunk_size,
            total_size,
            expected_chunks,
            uploaded_chunks: BTreeMap::new(),
            created_at: now,
            expires_at: now.saturating_add(config.session_ttl),
        };
        self.arena.insert(session.clone(), now)?;
        self.ctx.audit(DeliveryAuditEventParams {
            kind: DeliveryAuditKind::UploadStarted,
            at: now,
            actor: Some(owner.clone()),
            product_id: Some(product.id),
            transfer_id: None,
            from_status: None,
            to_status: None,
            detail: Some(format!("expected_chunks={expected_chunks}")),
        });
        Ok(session)
    }

    /// Stores one chunk. Re-uploading an index overwrites it.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::SessionNotFound`] for unknown, expired, or
    /// foreign sessions, [`DeliveryError::InvalidChunkIndex`] for indices past
    /// the expected count, and [`DeliveryError::InvalidInput`] for chunks of
    /// the wrong length.
    pub fn upload_chunk(
        &self,
        owner: &PrincipalId,
        upload_id: &UploadId,
        index: u32,
        bytes: &[u8],
    ) -> Result<ChunkReceipt, DeliveryError> {
        let session = self.arena.get_owned(upload_id, owner, self.ctx.now())?;
        let expected_len = expected_chunk_len(session.total_size, session.chunk_size, index)
            .ok_or(DeliveryError::InvalidChunkIndex {
                index,
                expected: session.expected_chunks,
            })?;
        let actual_len = bytes.len() as u64;
        if actual_len != expected_len {
            return Err(DeliveryError::InvalidInput(format!(
                "chunk {index} has {actual_len} bytes, expected {expected_len}"
            )));
        }

        let hash = hash_bytes(DEFAULT_HASH_ALGORITHM, bytes);
        let key = chunk_key(&session.storage_prefix, index);
        self.ctx.retry(|| Ok(self.ctx.blobs().put(&key, bytes)?))?;
        let record = ChunkRecord {
            hash: hash.clone(),
            size: actual_len,
        };
        self.arena.record_chunk(upload_id, index, record, self.ctx.now())?;
        Ok(ChunkReceipt {
            index,
            hash,
            size: actual_len,
        })
    }

    /// Returns expected, uploaded, and missing indices.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::SessionNotFound`] for unknown, expired, or
    /// foreign sessions.
    pub fn upload_status(
        &self,
        owner: &PrincipalId,
        upload_id: &UploadId,
    ) -> Result<UploadStatus, DeliveryError> {
        let session = self.arena.get_owned(upload_id, owner, self.ctx.now())?;
        Ok(UploadStatus {
            upload_id: session.upload_id.clone(),
            product_id: session.product_id.clone(),
            expected_chunks: session.expected_chunks,
            uploaded: session.uploaded_chunks.keys().copied().collect(),
            missing: session.missing_indices(),
            expires_at: session.expires_at,
        })
    }

    /// Finalizes the upload and the product.
    ///
    /// When `supplied` is given it must match the recorded chunk entries
    /// exactly. The product's declared content hash, when present, must match
    /// the digest of the stored chunks.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::IncompleteUpload`] when chunks are missing,
    /// [`DeliveryError::InvalidInput`] when the supplied manifest or declared
    /// content hash disagrees with the stored bytes, and
    /// [`DeliveryError::Conflict`] when the product was finalized concurrently.
    pub fn complete_upload(
        &self,
        owner: &PrincipalId,
        upload_id: &UploadId,
        supplied: Option<&[ManifestEntry]>,
    ) -> Result<CompletedUpload, DeliveryError> {
        let session = self.arena.get_owned(upload_id, owner, self.ctx.now())?;
        if !session.is_complete() {
            return Err(DeliveryError::IncompleteUpload {
                missing: session.missing_indices(),
            });
        }

        let entries = session.manifest_entries();
        if let Some(supplied) = supplied
            && supplied != entries.as_slice()
        {
            return Err(DeliveryError::InvalidInput(
                "supplied manifest does not match uploaded chunks".to_string(),
            ));
        }
        let content_hash = self.stream_content_hash(&session.storage_prefix, &entries)?;
        let manifest = Manifest {
            entries,
            total_chunks: session.expected_chunks,
            chunk_size: session.chunk_size,
            total_size: session.total_size,
            content_hash,
        };
        manifest.validate()?;

        let mut product = self
            .ctx
            .retry(|| Ok(self.ctx.store().get_product(&session.product_id)?))?
            .filter(|product| product.owner_id == *owner)
            .ok_or(DeliveryError::NotFoundOrDenied)?;
        if product.is_ready() {
            return Err(DeliveryError::Conflict("product upload already completed".to_string()));
        }
        if let Some(declared) = &product.content_hash
            && *declared != manifest.content_hash
        {
            return Err(DeliveryError::InvalidInput(
                "content hash does not match uploaded content".to_string(),
            ));
        }

        let manifest_path = manifest_key(&session.storage_prefix);
        self.ctx.retry(|| Ok(put_json_document(self.ctx.blobs(), &manifest_path, &manifest)?))?;

        let now = self.ctx.now();
        product.manifest = Some(manifest.clone());
        product.storage_pointer.clone_from(&session.storage_prefix);
        product.content_hash = Some(manifest.content_hash.clone());
        product.updated_at = now;
        self.ctx.retry(|| Ok(self.ctx.store().update_product(&product)?))?;
        self.arena.remove(upload_id, now)?;

        self.ctx.audit(DeliveryAuditEventParams {
            kind: DeliveryAuditKind::UploadCompleted,
            at: now,
            actor: Some(owner.clone()),
            product_id: Some(product.id.clone()),
            transfer_id: None,
            from_status: None,
            to_status: None,
            detail: Some(format!("total_chunks={}", manifest.total_chunks)),
        });
        Ok(CompletedUpload {
            product,
            manifest,
        })
    }

    /// Streams stored chunks in order, checking each against its recorded
    /// digest, and returns the whole-content digest.
    fn stream_content_hash(
        &self,
        prefix: &str,
        entries: &[ManifestEntry],
    ) -> Result<HashDigest, DeliveryError> {
        let mut hasher = ContentHasher::new(DEFAULT_HASH_ALGORITHM);
        for entry in entries {
            let key = chunk_key(prefix, entry.index);
            let bytes = self
                .ctx
                .retry(|| Ok(self.ctx.blobs().get(&key)?))?
                .ok_or_else(|| {
                    DeliveryError::InvalidState(format!(
                        "chunk {} missing from storage",
                        entry.index
                    ))
                })?;
            if hash_bytes(DEFAULT_HASH_ALGORITHM, &bytes) != entry.hash {
                return Err(DeliveryError::InvalidState(format!(
                    "chunk {} changed in storage",
                    entry.index
                )));
            }
            hasher.update(&bytes);
        }
        Ok(hasher.finalize())
    }
}
