// crates/dropgate-core/src/runtime/keys.rs
// ============================================================================
// Module: Dropgate Key Envelope Manager
// Description: Access grants, key envelopes, and claim token redemption.
// Purpose: Turn a paid transfer into recipient-bound, time-boxed credentials.
// Dependencies: crate::core, crate::interfaces, crate::runtime, url
// ============================================================================

//! ## Overview
//! A grant reuses the live key for the product and recipient or mints a new
//! envelope, then always issues a fresh claim token. Redeeming a claim token
//! re-checks the transfer and key and returns a short-lived download token
//! together with the envelope, manifest, and per-chunk download URLs.
//!
//! Expiry is never swept in the background; every check compares timestamps
//! at use time.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde::Serialize;
use url::Url;

use crate::core::DeliveryAuditEventParams;
use crate::core::DeliveryAuditKind;
use crate::core::InputTiming;
use crate::core::KeyEnvelope;
use crate::core::KeyId;
use crate::core::Manifest;
use crate::core::PrincipalId;
use crate::core::ProductId;
use crate::core::ProductKey;
use crate::core::Timestamp;
use crate::core::Transfer;
use crate::core::TransferAction;
use crate::core::TransferId;
use crate::core::TransferStatus;
use crate::core::missing_inputs;
use crate::core::next_status;
use crate::interfaces::DeliveryStore;
use crate::interfaces::KeyChange;
use crate::interfaces::TransferChange;
use crate::runtime::context::DeliveryContext;
use crate::runtime::envelope::EnvelopeSealer;
use crate::runtime::error::DeliveryError;
use crate::runtime::tokens::TokenBinding;
use crate::runtime::tokens::TokenSigner;
use crate::runtime::tokens::TokenType;
use crate::runtime::tokens::token_fingerprint;
use crate::runtime::transfers::TransferMachine;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Status label returned by a successful claim.
pub const READY_FOR_DOWNLOAD: &str = "ready_for_download";

// ============================================================================
// SECTION: Results
// ============================================================================

/// Grant outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantResult {
    /// Transfer after the grant.
    pub transfer: Transfer,
    /// Live key for the recipient.
    pub key: ProductKey,
    /// True when an existing live key was reused.
    pub key_reused: bool,
    /// Fresh claim token.
    pub claim_token: String,
    /// Claim token expiry.
    pub claim_expires_at: Timestamp,
}

/// Claim outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimResult {
    /// Transfer the claim was issued for.
    pub transfer_id: TransferId,
    /// Product to download.
    pub product_id: ProductId,
    /// Recipient.
    pub recipient_id: PrincipalId,
    /// Download token.
    pub download_token: String,
    /// Download token expiry.
    pub download_expires_at: Timestamp,
    /// Recipient's key envelope.
    pub key_envelope: KeyEnvelope,
    /// Product manifest.
    pub manifest: Manifest,
    /// One URL per chunk, in index order.
    pub download_urls: Vec<String>,
    /// Always [`READY_FOR_DOWNLOAD`].
    pub status: &'static str,
}

// ============================================================================
// SECTION: Manager
// ============================================================================

/// Key envelope manager.
pub struct KeyEnvelopeManager {
    /// Shared runtime context.
    ctx: Arc<DeliveryContext>,
    /// Transfer operations used for loading, auditing, and notifying.
    transfers: Arc<TransferMachine>,
    /// Token signer.
    signer: Arc<TokenSigner>,
    /// Envelope sealer.
    sealer: Arc<EnvelopeSealer>,
}

impl KeyEnvelopeManager {
    /// Creates the manager.
    #[must_use]
    pub const fn new(
        ctx: Arc<DeliveryContext>,
        transfers: Arc<TransferMachine>,
        signer: Arc<TokenSigner>,
        sealer: Arc<EnvelopeSealer>,
    ) -> Self {
        Self {
            ctx,
            transfers,
            signer,
            sealer,
        }
    }

    /// Grants access for a transfer and issues a fresh claim token.
    ///
    /// Repeated grants return the same envelope while its key is live and a
    /// different claim token every time.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::NotFoundOrDenied`] for non-parties,
    /// [`DeliveryError::InvalidState`] from statuses the table does not allow,
    /// and [`DeliveryError::MissingRequiredInputs`] when post-payment inputs
    /// are absent.
    pub fn grant(
        &self,
        caller: &PrincipalId,
        transfer_id: &TransferId,
    ) -> Result<GrantResult, DeliveryError> {
        let store = self.ctx.store();
        let mut transfer = self.transfers.load(transfer_id)?;
        if !transfer.is_party(caller) {
            return Err(DeliveryError::NotFoundOrDenied);
        }
        let read_status = transfer.status;
        let policy = self.transfers.transition_policy();
        let target = next_status(Some(read_status), TransferAction::Grant, policy)?;
        let product = self
            .ctx
            .retry(|| Ok(store.get_product(&transfer.product_id)?))?
            .ok_or(DeliveryError::NotFoundOrDenied)?;
        if !product.is_ready() {
            return Err(DeliveryError::InvalidState("product upload not completed".to_string()));
        }
        let missing = missing_inputs(
            &product.required_inputs,
            InputTiming::PostPaymentPreGrant,
            &transfer.buyer_inputs,
        );
        if !missing.is_empty() {
            return Err(DeliveryError::MissingRequiredInputs {
                missing,
            });
        }

        let now = self.ctx.now();
        let live_key = self.ctx.retry(|| {
            Ok(store.get_live_key(&transfer.product_id, &transfer.to_recipient_id, now)?)
        })?;
        let (key, key_reused) = match live_key {
            Some(key) => (key, true),
            None => {
                let envelope =
                    self.sealer.seal_new(&transfer.product_id, &transfer.to_recipient_id)?;
                let key = ProductKey {
                    id: KeyId::generate(),
                    product_id: transfer.product_id.clone(),
                    recipient_id: transfer.to_recipient_id.clone(),
                    key_envelope: envelope,
                    created_at: now,
                    expires_at: now.saturating_add(self.ctx.config.key_ttl),
                };
                (key, false)
            }
        };

        if target != read_status || !key_reused {
            transfer.status = target;
            transfer.updated_at = now;
            let mut change = TransferChange::transfer_only(transfer.clone(), read_status);
            if !key_reused {
                change.key = Some(KeyChange::Insert(key.clone()));
            }
            match self.ctx.retry(|| Ok(store.apply_transfer_change(&change)?)) {
                Ok(()) => {}
                Err(DeliveryError::Conflict(message)) => {
                    // A concurrent grant won; adopt its outcome when it matches ours.
                    let current = self.transfers.load(&transfer.id)?;
                    let winner = self.ctx.retry(|| {
                        Ok(store.get_live_key(&current.product_id, &current.to_recipient_id, now)?)
                    })?;
                    match winner {
                        Some(winner) if current.status == target => {
                            return self.issue_claim(caller, current, winner, true, None);
                        }
                        _ => return Err(DeliveryError::Conflict(message)),
                    }
                }
                Err(err) => return Err(err),
            }
        }

        let from = (target != read_status).then_some(read_status);
        self.issue_claim(caller, transfer, key, key_reused, from)
    }

    /// Signs a claim token for a granted transfer and records the grant.
    fn issue_claim(
        &self,
        caller: &PrincipalId,
        transfer: Transfer,
        key: ProductKey,
        key_reused: bool,
        from: Option<TransferStatus>,
    ) -> Result<GrantResult, DeliveryError> {
        let now = self.ctx.now();

        let claim_expires_at = now.saturating_add(self.ctx.config.claim_token_ttl);
        let claims = TokenSigner::claims(
            TokenType::Claim,
            TokenBinding {
                transfer_id: transfer.id.clone(),
                product_id: transfer.product_id.clone(),
                recipient_id: transfer.to_recipient_id.clone(),
                key_id: Some(key.id.clone()),
            },
            now,
            claim_expires_at,
        );
        let claim_token = self.signer.sign(&claims)?;

        if !key_reused {
            self.ctx.audit(DeliveryAuditEventParams {
                kind: DeliveryAuditKind::KeyMinted,
                at: now,
                actor: Some(caller.clone()),
                product_id: Some(transfer.product_id.clone()),
                transfer_id: Some(transfer.id.clone()),
                from_status: None,
                to_status: None,
                detail: Some(format!("key_id={}", key.id)),
            });
        }
        if let Some(from) = from {
            self.transfers.record_transition(caller, &transfer, Some(from));
            self.transfers.notify(&transfer, transfer.to_recipient_id.clone(), "access granted");
        }
        Ok(GrantResult {
            transfer,
            key,
            key_reused,
            claim_token,
            claim_expires_at,
        })
    }

    /// Redeems a claim token for a download token, envelope, and manifest.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::Expired`] for an expired token,
    /// [`DeliveryError::KeyExpired`] when the bound key has expired,
    /// [`DeliveryError::InvalidState`] unless the transfer is delivered or
    /// acknowledged, and [`DeliveryError::NotFoundOrDenied`] for tokens that
    /// fail verification or no longer match their transfer.
    pub fn claim(&self, claim_token: &str) -> Result<ClaimResult, DeliveryError> {
        let store = self.ctx.store();
        let now = self.ctx.now();
        let claims = self.signer.verify(claim_token, TokenType::Claim, now)?;
        let transfer = self.transfers.load(&claims.transfer_id)?;
        if transfer.product_id != claims.product_id
            || transfer.to_recipient_id != claims.recipient_id
        {
            return Err(DeliveryError::NotFoundOrDenied);
        }
        if !transfer.status.is_claimable() {
            return Err(DeliveryError::InvalidState(format!(
                "transfer is {}",
                transfer.status.as_str()
            )));
        }
        let key_id = claims.key_id.as_ref().ok_or(DeliveryError::NotFoundOrDenied)?;
        let key = self
            .ctx
            .retry(|| Ok(store.get_key(key_id)?))?
            .filter(|key| {
                key.product_id == claims.product_id && key.recipient_id == claims.recipient_id
            })
            .ok_or(DeliveryError::NotFoundOrDenied)?;
        if !key.is_live(now) {
            return Err(DeliveryError::KeyExpired);
        }
        let product = self
            .ctx
            .retry(|| Ok(store.get_product(&claims.product_id)?))?
            .ok_or(DeliveryError::NotFoundOrDenied)?;
        let manifest = product.ready_manifest().cloned().ok_or(DeliveryError::NotFoundOrDenied)?;

        let download_expires_at = now.saturating_add(self.ctx.config.download_token_ttl);
        let download_claims = TokenSigner::claims(
            TokenType::Download,
            TokenBinding {
                transfer_id: transfer.id.clone(),
                product_id: claims.product_id.clone(),
                recipient_id: claims.recipient_id.clone(),
                key_id: None,
            },
            now,
            download_expires_at,
        );
        let download_token = self.signer.sign(&download_claims)?;
        let download_urls = self.download_urls(
            &claims.product_id,
            &claims.recipient_id,
            &manifest,
            &download_token,
        )?;

        self.ctx.audit(DeliveryAuditEventParams {
            kind: DeliveryAuditKind::ClaimRedeemed,
            at: now,
            actor: Some(claims.recipient_id.clone()),
            product_id: Some(claims.product_id.clone()),
            transfer_id: Some(transfer.id.clone()),
            from_status: None,
            to_status: None,
            detail: Some(format!("claim={}", token_fingerprint(claim_token))),
        });
        Ok(ClaimResult {
            transfer_id: transfer.id,
            product_id: claims.product_id,
            recipient_id: claims.recipient_id,
            download_token,
            download_expires_at,
            key_envelope: key.key_envelope,
            manifest,
            download_urls,
            status: READY_FOR_DOWNLOAD,
        })
    }

    /// Builds one chunk URL per manifest entry.
    fn download_urls(
        &self,
        product_id: &ProductId,
        recipient_id: &PrincipalId,
        manifest: &Manifest,
        token: &str,
    ) -> Result<Vec<String>, DeliveryError> {
        let base = Url::parse(&self.ctx.config.public_base_url)
            .and_then(|base| base.join("v1/chunk"))
            .map_err(|err| DeliveryError::Configuration(format!("public base url: {err}")))?;
        Ok(manifest
            .entries
            .iter()
            .map(|entry| {
                let mut url = base.clone();
                url.query_pairs_mut()
                    .append_pair("productId", product_id.as_str())
                    .append_pair("recipientId", recipient_id.as_str())
                    .append_pair("chunkIndex", &entry.index.to_string())
                    .append_pair("token", token);
                url.to_string()
            })
            .collect())
    }
}
