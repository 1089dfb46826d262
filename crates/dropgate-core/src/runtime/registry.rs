// crates/dropgate-core/src/runtime/registry.rs
// ============================================================================
// Module: Dropgate Product Registry
// Description: Product creation, requirement metadata, and gated reads.
// Purpose: Own product metadata and expose it only through the access gate.
// Dependencies: crate::core, crate::interfaces, crate::runtime
// ============================================================================

//! ## Overview
//! Products are created in the pending storage state and finalized by the
//! upload manager. After creation only requirement metadata may change, and
//! only by the owner.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

use crate::core::DEFAULT_ENCRYPTION_ALGORITHM;
use crate::core::HashDigest;
use crate::core::Manifest;
use crate::core::PENDING_STORAGE_POINTER;
use crate::core::PrincipalId;
use crate::core::Product;
use crate::core::ProductId;
use crate::core::RequiredInput;
use crate::core::validate_required_inputs;
use crate::interfaces::DeliveryStore;
use crate::runtime::access::DownloadAccessGate;
use crate::runtime::context::DeliveryContext;
use crate::runtime::error::DeliveryError;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum title length in characters.
pub const MAX_TITLE_CHARS: usize = 256;
/// Maximum content type length in characters.
pub const MAX_CONTENT_TYPE_CHARS: usize = 128;

// ============================================================================
// SECTION: Requests
// ============================================================================

/// Product creation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    /// Display title.
    pub title: String,
    /// MIME content type.
    pub content_type: String,
    /// Declared size in bytes.
    pub size_bytes: u64,
    /// Declared whole-content digest.
    #[serde(default)]
    pub content_hash: Option<HashDigest>,
    /// Requested encryption algorithm label.
    #[serde(default)]
    pub encryption_algorithm: Option<String>,
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Product registry.
pub struct ProductRegistry {
    /// Shared runtime context.
    ctx: Arc<DeliveryContext>,
    /// Access gate for reads.
    gate: Arc<DownloadAccessGate>,
}

impl ProductRegistry {
    /// Creates a registry.
    #[must_use]
    pub const fn new(ctx: Arc<DeliveryContext>, gate: Arc<DownloadAccessGate>) -> Self {
        Self {
            ctx,
            gate,
        }
    }

    /// Creates a product in the pending storage state.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::InvalidInput`] when metadata is out of range.
    pub fn create_product(
        &self,
        owner: &PrincipalId,
        request: NewProduct,
    ) -> Result<Product, DeliveryError> {
        let title = request.title.trim();
        let title_len = title.chars().count();
        if title_len == 0 || title_len > MAX_TITLE_CHARS {
            return Err(DeliveryError::InvalidInput(format!(
                "title must be 1..={MAX_TITLE_CHARS} characters"
            )));
        }
        let content_type = request.content_type.trim();
        let content_type_len = content_type.chars().count();
        if content_type_len == 0 || content_type_len > MAX_CONTENT_TYPE_CHARS {
            return Err(DeliveryError::InvalidInput(format!(
                "content type must be 1..={MAX_CONTENT_TYPE_CHARS} characters"
            )));
        }
        let max_size = self.ctx.config.max_total_size_bytes;
        if request.size_bytes == 0 || request.size_bytes > max_size {
            return Err(DeliveryError::InvalidInput(format!("size must be in 1..={max_size}")));
        }
        let algorithm = request
            .encryption_algorithm
            .unwrap_or_else(|| DEFAULT_ENCRYPTION_ALGORITHM.to_string());
        if algorithm != DEFAULT_ENCRYPTION_ALGORITHM {
            return Err(DeliveryError::InvalidInput(format!(
                "unsupported encryption algorithm: {algorithm}"
            )));
        }

        let now = self.ctx.now();
        let product = Product {
            id: ProductId::generate(),
            owner_id: owner.clone(),
            title: title.to_string(),
            content_type: content_type.to_string(),
            size_bytes: request.size_bytes,
            content_hash: request.content_hash,
            encryption_algorithm: algorithm,
            storage_type: self.ctx.config.storage_type,
            storage_pointer: PENDING_STORAGE_POINTER.to_string(),
            manifest: None,
            required_inputs: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        self.ctx.retry(|| Ok(self.ctx.store().insert_product(&product)?))?;
        Ok(product)
    }

    /// Returns the manifest of a product the requester may download.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::NotFoundOrDenied`] on any refusal, including a
    /// pending product.
    pub fn get_product_manifest(
        &self,
        product_id: &ProductId,
        requester: &PrincipalId,
    ) -> Result<Manifest, DeliveryError> {
        let grant = self.gate.check_access(product_id, requester)?;
        grant.manifest().cloned()
    }

    /// Returns product metadata to the owner or a party with access.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::NotFoundOrDenied`] on any refusal.
    pub fn get_product(
        &self,
        product_id: &ProductId,
        requester: &PrincipalId,
    ) -> Result<Product, DeliveryError> {
        let product = self
            .ctx
            .retry(|| Ok(self.ctx.store().get_product(product_id)?))?
            .ok_or(DeliveryError::NotFoundOrDenied)?;
        if product.owner_id == *requester {
            return Ok(product);
        }
        Ok(self.gate.check_access(product_id, requester)?.product)
    }

    /// Replaces the owner-declared buyer inputs.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::NotFoundOrDenied`] for non-owners and
    /// [`DeliveryError::InvalidInput`] for invalid declarations.
    pub fn set_requirements(
        &self,
        product_id: &ProductId,
        owner: &PrincipalId,
        required_inputs: Vec<RequiredInput>,
    ) -> Result<Product, DeliveryError> {
        validate_required_inputs(&required_inputs).map_err(DeliveryError::InvalidInput)?;
        let mut product = self
            .ctx
            .retry(|| Ok(self.ctx.store().get_product(product_id)?))?
            .filter(|product| product.owner_id == *owner)
            .ok_or(DeliveryError::NotFoundOrDenied)?;
        product.required_inputs = required_inputs
            .into_iter()
            .map(|mut input| {
                input.name = input.name.trim().to_string();
                input
            })
            .collect();
        product.updated_at = self.ctx.now();
        self.ctx.retry(|| Ok(self.ctx.store().update_product(&product)?))?;
        Ok(product)
    }
}
