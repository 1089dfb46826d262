// crates/dropgate-core/src/runtime/access.rs
// ============================================================================
// Module: Dropgate Download Access Gate
// Description: Per-request access checks for manifests and chunks.
// Purpose: Ensure content leaves storage only for owners and paid recipients.
// Dependencies: crate::core, crate::interfaces, crate::runtime
// ============================================================================

//! ## Overview
//! The gate is evaluated on every manifest and chunk fetch with no caching. A
//! requester has access when they own the product, or when a transfer of the
//! product to them is paid, delivered, or acknowledged and a live key exists
//! for the pair. Every refusal is the same [`DeliveryError::NotFoundOrDenied`]
//! so callers cannot distinguish a missing product from a denied one.
//!
//! Download tokens identify the requester when no bearer credential is
//! present. A token never widens access: the gate still runs for the principal
//! it names, and only the transfer the token was minted for can satisfy it.
//! A token from a refunded transfer stays dead after the recipient buys the
//! product again.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use crate::core::DeliveryAuditEventParams;
use crate::core::DeliveryAuditKind;
use crate::core::Manifest;
use crate::core::PrincipalId;
use crate::core::Product;
use crate::core::ProductId;
use crate::core::TransferId;
use crate::core::chunk_key;
use crate::core::hash_bytes;
use crate::interfaces::BlobStore;
use crate::interfaces::DeliveryStore;
use crate::runtime::context::DeliveryContext;
use crate::runtime::error::DeliveryError;
use crate::runtime::tokens::TokenSigner;
use crate::runtime::tokens::TokenType;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Why access was granted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessBasis {
    /// Requester owns the product.
    Owner,
    /// Requester is the recipient of a paid transfer with a live key.
    Recipient {
        /// Transfer that grants access.
        transfer_id: TransferId,
    },
}

/// Granted access to a ready product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessGrant {
    /// Principal the gate evaluated.
    pub requester: PrincipalId,
    /// Product with its manifest.
    pub product: Product,
    /// Access basis.
    pub basis: AccessBasis,
}

impl AccessGrant {
    /// Returns the product manifest.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::NotFoundOrDenied`] when the product is pending.
    pub fn manifest(&self) -> Result<&Manifest, DeliveryError> {
        self.product.ready_manifest().ok_or(DeliveryError::NotFoundOrDenied)
    }
}

/// Credentials presented on a download request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadCredentials {
    /// Principal resolved from a bearer credential.
    pub caller: Option<PrincipalId>,
    /// Recipient named by the request.
    pub recipient_id: Option<PrincipalId>,
    /// Download token.
    pub token: Option<String>,
}

// ============================================================================
// SECTION: Gate
// ============================================================================

/// Download access gate.
pub struct DownloadAccessGate {
    /// Shared runtime context.
    ctx: Arc<DeliveryContext>,
    /// Token verifier.
    signer: Arc<TokenSigner>,
}

impl DownloadAccessGate {
    /// Creates a gate.
    #[must_use]
    pub const fn new(ctx: Arc<DeliveryContext>, signer: Arc<TokenSigner>) -> Self {
        Self {
            ctx,
            signer,
        }
    }

    /// Evaluates access for `requester` to a ready product.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::NotFoundOrDenied`] on any refusal.
    pub fn check_access(
        &self,
        product_id: &ProductId,
        requester: &PrincipalId,
    ) -> Result<AccessGrant, DeliveryError> {
        self.gate(product_id, requester, None)
    }

    /// Resolves the requester from credentials, then evaluates access.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::NotFoundOrDenied`] on any refusal and
    /// [`DeliveryError::Expired`] for an expired download token.
    pub fn authorize(
        &self,
        product_id: &ProductId,
        credentials: &DownloadCredentials,
    ) -> Result<AccessGrant, DeliveryError> {
        let (requester, bound_transfer) = self.resolve_requester(product_id, credentials)?;
        self.gate(product_id, &requester, bound_transfer.as_ref())
    }

    /// Evaluates access and audits refusals.
    fn gate(
        &self,
        product_id: &ProductId,
        requester: &PrincipalId,
        bound_transfer: Option<&TransferId>,
    ) -> Result<AccessGrant, DeliveryError> {
        match self.evaluate(product_id, requester, bound_transfer)? {
            Some(grant) => Ok(grant),
            None => {
                self.ctx.audit(DeliveryAuditEventParams {
                    kind: DeliveryAuditKind::AccessDenied,
                    at: self.ctx.now(),
                    actor: Some(requester.clone()),
                    product_id: Some(product_id.clone()),
                    transfer_id: bound_transfer.cloned(),
                    from_status: None,
                    to_status: None,
                    detail: None,
                });
                Err(DeliveryError::NotFoundOrDenied)
            }
        }
    }

    /// Returns the manifest for an authorized requester.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::NotFoundOrDenied`] on any refusal.
    pub fn get_manifest(
        &self,
        product_id: &ProductId,
        credentials: &DownloadCredentials,
    ) -> Result<Manifest, DeliveryError> {
        let grant = self.authorize(product_id, credentials)?;
        grant.manifest().cloned()
    }

    /// Returns one chunk for an authorized requester.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::NotFoundOrDenied`] on any refusal,
    /// [`DeliveryError::InvalidChunkIndex`] for indices past the manifest, and
    /// [`DeliveryError::InvalidState`] when stored bytes no longer match.
    pub fn download_chunk(
        &self,
        product_id: &ProductId,
        index: u32,
        credentials: &DownloadCredentials,
    ) -> Result<Vec<u8>, DeliveryError> {
        let grant = self.authorize(product_id, credentials)?;
        let manifest = grant.manifest()?;
        if index >= manifest.total_chunks {
            return Err(DeliveryError::InvalidChunkIndex {
                index,
                expected: manifest.total_chunks,
            });
        }
        let entry = manifest.entry(index).ok_or(DeliveryError::NotFoundOrDenied)?;
        let key = chunk_key(&grant.product.storage_pointer, index);
        let bytes = self
            .ctx
            .retry(|| Ok(self.ctx.blobs().get(&key)?))?
            .ok_or_else(|| DeliveryError::InvalidState(format!("chunk {index} missing")))?;
        if hash_bytes(entry.hash.algorithm, &bytes) != entry.hash {
            return Err(DeliveryError::InvalidState(format!(
                "chunk {index} failed integrity check"
            )));
        }
        Ok(bytes)
    }

    /// Resolves the principal the gate evaluates and the transfer a download
    /// token is bound to.
    fn resolve_requester(
        &self,
        product_id: &ProductId,
        credentials: &DownloadCredentials,
    ) -> Result<(PrincipalId, Option<TransferId>), DeliveryError> {
        let Some(token) = &credentials.token else {
            let caller = credentials.caller.clone().ok_or(DeliveryError::NotFoundOrDenied)?;
            return Ok((caller, None));
        };
        let claims = self.signer.verify(token, TokenType::Download, self.ctx.now())?;
        if claims.product_id != *product_id {
            return Err(DeliveryError::NotFoundOrDenied);
        }
        let named_other = |principal: &Option<PrincipalId>| {
            principal.as_ref().is_some_and(|id| *id != claims.recipient_id)
        };
        if named_other(&credentials.recipient_id) || named_other(&credentials.caller) {
            return Err(DeliveryError::NotFoundOrDenied);
        }
        Ok((claims.recipient_id, Some(claims.transfer_id)))
    }

    /// Evaluates the access rule without auditing.
    ///
    /// With a bound transfer, only that transfer can grant recipient access.
    fn evaluate(
        &self,
        product_id: &ProductId,
        requester: &PrincipalId,
        bound_transfer: Option<&TransferId>,
    ) -> Result<Option<AccessGrant>, DeliveryError> {
        let store = self.ctx.store();
        let Some(product) = self.ctx.retry(|| Ok(store.get_product(product_id)?))? else {
            return Ok(None);
        };
        if !product.is_ready() {
            return Ok(None);
        }
        if product.owner_id == *requester && bound_transfer.is_none() {
            return Ok(Some(AccessGrant {
                requester: requester.clone(),
                product,
                basis: AccessBasis::Owner,
            }));
        }
        let transfers = self.ctx.retry(|| Ok(store.find_transfers(product_id, requester)?))?;
        let Some(transfer) = transfers.into_iter().find(|transfer| {
            transfer.status.is_paid_access()
                && bound_transfer.is_none_or(|bound| transfer.id == *bound)
        }) else {
            return Ok(None);
        };
        let now = self.ctx.now();
        let live_key = self.ctx.retry(|| Ok(store.get_live_key(product_id, requester, now)?))?;
        if live_key.is_none() {
            return Ok(None);
        }
        Ok(Some(AccessGrant {
            requester: requester.clone(),
            product,
            basis: AccessBasis::Recipient {
                transfer_id: transfer.id,
            },
        }))
    }
}
