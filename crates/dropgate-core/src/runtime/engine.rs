// crates/dropgate-core/src/runtime/engine.rs
// ============================================================================
// Module: Dropgate Delivery Engine
// Description: Facade wiring every runtime component over one context.
// Purpose: Provide a single entry point for servers, CLIs, and tests.
// Dependencies: crate::runtime
// ============================================================================

//! ## Overview
//! [`DeliveryEngine`] owns one [`DeliveryContext`] and the components built on
//! it. All external surfaces call through the same components so behavior is
//! identical whether driven over HTTP or in-process.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use crate::core::PrincipalId;
use crate::core::Product;
use crate::core::UploadSession;
use crate::runtime::access::DownloadAccessGate;
use crate::runtime::context::DeliveryConfig;
use crate::runtime::context::DeliveryContext;
use crate::runtime::context::DeliveryServices;
use crate::runtime::envelope::EnvelopeSealer;
use crate::runtime::error::DeliveryError;
use crate::runtime::keys::KeyEnvelopeManager;
use crate::runtime::registry::NewProduct;
use crate::runtime::registry::ProductRegistry;
use crate::runtime::tokens::TokenSigner;
use crate::runtime::transfers::TransferMachine;
use crate::runtime::uploads::UploadSessionManager;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Product created together with its upload session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedUpload {
    /// Pending product.
    pub product: Product,
    /// Open upload session.
    pub session: UploadSession,
}

/// Delivery engine facade.
pub struct DeliveryEngine {
    /// Shared context.
    ctx: Arc<DeliveryContext>,
    /// Access gate.
    gate: Arc<DownloadAccessGate>,
    /// Product registry.
    registry: ProductRegistry,
    /// Upload sessions.
    uploads: UploadSessionManager,
    /// Transfer state machine.
    transfers: Arc<TransferMachine>,
    /// Key envelope manager.
    keys: KeyEnvelopeManager,
}

impl DeliveryEngine {
    /// Builds the engine.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::Configuration`] when the config is invalid.
    pub fn new(
        services: DeliveryServices,
        config: DeliveryConfig,
        signer: TokenSigner,
        sealer: EnvelopeSealer,
    ) -> Result<Self, DeliveryError> {
        let ctx = Arc::new(DeliveryContext::new(services, config)?);
        let signer = Arc::new(signer);
        let gate = Arc::new(DownloadAccessGate::new(Arc::clone(&ctx), Arc::clone(&signer)));
        let transfers = Arc::new(TransferMachine::new(Arc::clone(&ctx)));
        let keys = KeyEnvelopeManager::new(
            Arc::clone(&ctx),
            Arc::clone(&transfers),
            signer,
            Arc::new(sealer),
        );
        Ok(Self {
            registry: ProductRegistry::new(Arc::clone(&ctx), Arc::clone(&gate)),
            uploads: UploadSessionManager::new(Arc::clone(&ctx)),
            ctx,
            gate,
            transfers,
            keys,
        })
    }

    /// Returns the shared context.
    #[must_use]
    pub fn context(&self) -> &DeliveryContext {
        &self.ctx
    }

    /// Returns the access gate.
    #[must_use]
    pub fn gate(&self) -> &DownloadAccessGate {
        &self.gate
    }

    /// Returns the product registry.
    #[must_use]
    pub const fn registry(&self) -> &ProductRegistry {
        &self.registry
    }

    /// Returns the upload session manager.
    #[must_use]
    pub const fn uploads(&self) -> &UploadSessionManager {
        &self.uploads
    }

    /// Returns the transfer state machine.
    #[must_use]
    pub fn transfers(&self) -> &TransferMachine {
        &self.transfers
    }

    /// Returns the key envelope manager.
    #[must_use]
    pub const fn keys(&self) -> &KeyEnvelopeManager {
        &self.keys
    }

    /// Creates a pending product and opens its upload session.
    ///
    /// The chunk size is checked before the product is created so a rejected
    /// plan leaves nothing behind.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::InvalidInput`] for invalid metadata or sizes.
    pub fn start_upload(
        &self,
        owner: &PrincipalId,
        request: NewProduct,
        chunk_size: u64,
    ) -> Result<StartedUpload, DeliveryError> {
        let max_chunk = self.ctx.config.max_chunk_size_bytes;
        if chunk_size == 0 || chunk_size > max_chunk {
            return Err(DeliveryError::InvalidInput(format!(
                "chunk size must be in 1..={max_chunk}"
            )));
        }
        let total_size = request.size_bytes;
        let product = self.registry.create_product(owner, request)?;
        let session = self.uploads.initialize_upload(owner, &product.id, total_size, chunk_size)?;
        Ok(StartedUpload {
            product,
            session,
        })
    }
}
