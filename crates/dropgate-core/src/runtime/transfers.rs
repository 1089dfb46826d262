// crates/dropgate-core/src/runtime/transfers.rs
// ============================================================================
// Module: Dropgate Transfer Operations
// Description: Offer, invoice, payment, acknowledgment, dispute, and revocation.
// Purpose: Drive transfers through the transition table with guarded writes.
// Dependencies: crate::core, crate::interfaces, crate::runtime
// ============================================================================

//! ## Overview
//! Every status change resolves its target through
//! [`crate::core::next_status`] and is written as a [`TransferChange`]
//! guarded by the status the transfer held when it was read. Multi-row
//! changes (payment plus status, receipt plus status, revocation plus key
//! expiry) travel in one change so backends apply them in one transaction.
//!
//! Callers that are not a party to a transfer always receive
//! [`DeliveryError::NotFoundOrDenied`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use crate::core::DeliveryAuditEventParams;
use crate::core::DeliveryAuditKind;
use crate::core::DeliveryNotification;
use crate::core::DeliveryReceipt;
use crate::core::DisputeId;
use crate::core::DisputeRecord;
use crate::core::InputTiming;
use crate::core::PaymentIntent;
use crate::core::PaymentIntentId;
use crate::core::PaymentStatus;
use crate::core::PrincipalId;
use crate::core::ProductId;
use crate::core::ReceiptId;
use crate::core::RevocationRecord;
use crate::core::Transfer;
use crate::core::TransferAction;
use crate::core::TransferId;
use crate::core::TransferPolicy;
use crate::core::TransferStatus;
use crate::core::TransitionPolicy;
use crate::core::missing_inputs;
use crate::core::next_status;
use crate::interfaces::CheckoutRequest;
use crate::interfaces::DeliveryStore;
use crate::interfaces::KeyChange;
use crate::interfaces::TransferChange;
use crate::runtime::context::DeliveryContext;
use crate::runtime::context::normalize_currency;
use crate::runtime::error::DeliveryError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Webhook event confirming payment.
pub const EVENT_PAYMENT_SUCCEEDED: &str = "payment.succeeded";
/// Alias of [`EVENT_PAYMENT_SUCCEEDED`] sent by hosted checkouts.
pub const EVENT_CHECKOUT_COMPLETED: &str = "checkout.completed";
/// Webhook event reporting a failed payment.
pub const EVENT_PAYMENT_FAILED: &str = "payment.failed";
/// Maximum dispute reason length in characters.
const MAX_REASON_CHARS: usize = 2_000;

// ============================================================================
// SECTION: Requests
// ============================================================================

/// Offer request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferRequest {
    /// Product to transfer.
    pub product_id: ProductId,
    /// Buyer.
    pub to_recipient_id: PrincipalId,
    /// Price in minor units (default 0).
    #[serde(default)]
    pub price: Option<u64>,
    /// Currency code (default from config).
    #[serde(default)]
    pub currency: Option<String>,
    /// Seller policy flags.
    #[serde(default)]
    pub policy: Option<TransferPolicy>,
}

/// Offer outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfferResult {
    /// Created or reused transfer.
    pub transfer: Transfer,
    /// True when an active transfer was returned instead of a new one.
    pub reused: bool,
}

/// Transfer addressed by id or by product and recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferRef {
    /// Transfer id.
    Id(TransferId),
    /// Most recent transfer of a product to a recipient.
    Pair {
        /// Product.
        product_id: ProductId,
        /// Recipient.
        recipient_id: PrincipalId,
    },
}

/// Invoice outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceResult {
    /// Transfer after the call.
    pub transfer: Transfer,
    /// Payment intent for the transfer.
    pub intent: PaymentIntent,
}

/// Payment webhook payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentWebhook {
    /// Gateway event type.
    pub event_type: String,
    /// Transfer the payment is for.
    pub transfer_id: TransferId,
    /// Gateway payment reference.
    #[serde(default)]
    pub payment_ref: Option<String>,
}

/// Webhook outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookOutcome {
    /// Transfer concerned.
    pub transfer_id: TransferId,
    /// Transfer status after handling.
    pub status: TransferStatus,
    /// False when the event was acknowledged and ignored.
    pub handled: bool,
}

/// Delivery acknowledgment request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcknowledgeRequest {
    /// Transfer to acknowledge.
    pub transfer_id: TransferId,
    /// Client-computed content digest.
    pub client_hash: String,
    /// Client signature.
    pub signature: String,
    /// Optional client metadata.
    #[serde(default)]
    pub meta: Option<Value>,
}

/// Dispute request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisputeRequest {
    /// Transfer to dispute.
    pub transfer_id: TransferId,
    /// Reason.
    pub reason: String,
    /// Requested remedy.
    #[serde(default)]
    pub requested_action: Option<String>,
}

/// Revocation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeRequest {
    /// Transfer to revoke.
    pub transfer_id: TransferId,
    /// Optional reason.
    #[serde(default)]
    pub reason: Option<String>,
}

/// Transfer with its payment and receipt rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferView {
    /// Transfer row.
    pub transfer: Transfer,
    /// Payment intent when invoiced.
    pub payment: Option<PaymentIntent>,
    /// Receipt when acknowledged.
    pub receipt: Option<DeliveryReceipt>,
}

// ============================================================================
// SECTION: Machine
// ============================================================================

/// Transfer state machine operations.
pub struct TransferMachine {
    /// Shared runtime context.
    ctx: Arc<DeliveryContext>,
}

impl TransferMachine {
    /// Creates the machine.
    #[must_use]
    pub const fn new(ctx: Arc<DeliveryContext>) -> Self {
        Self {
            ctx,
        }
    }

    /// Returns the transition flags derived from config.
    #[must_use]
    pub fn transition_policy(&self) -> TransitionPolicy {
        TransitionPolicy {
            allow_unpaid_grant: self.ctx.config.allow_unpaid_grant,
        }
    }

    /// Creates an offer, or returns the active transfer for the pair.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::NotFoundOrDenied`] when the caller may not
    /// offer the product or the recipient is unknown,
    /// [`DeliveryError::InvalidState`] for pending products,
    /// [`DeliveryError::InvalidInput`] for self-offers or bad currency, and
    /// [`DeliveryError::Conflict`] when the pair is delivered or disputed.
    pub fn offer(
        &self,
        caller: &PrincipalId,
        request: OfferRequest,
    ) -> Result<OfferResult, DeliveryError> {
        let store = self.ctx.store();
        let product = self
            .ctx
            .retry(|| Ok(store.get_product(&request.product_id)?))?
            .ok_or(DeliveryError::NotFoundOrDenied)?;
        let seller_initiated = product.owner_id == *caller;
        if !seller_initiated && request.to_recipient_id != *caller {
            return Err(DeliveryError::NotFoundOrDenied);
        }
        if product.owner_id == request.to_recipient_id {
            return Err(DeliveryError::InvalidInput("owner cannot offer to self".to_string()));
        }
        if !product.is_ready() {
            return Err(DeliveryError::InvalidState("product upload not completed".to_string()));
        }
        if !self.ctx.services.directory.contains(&request.to_recipient_id) {
            return Err(DeliveryError::NotFoundOrDenied);
        }
        let currency = match &request.currency {
            Some(raw) => normalize_currency(raw).ok_or_else(|| {
                DeliveryError::InvalidInput("currency must be three ASCII letters".to_string())
            })?,
            None => self.ctx.config.default_currency.clone(),
        };
        let policy = match request.policy {
            Some(_) if !seller_initiated => {
                return Err(DeliveryError::InvalidInput(
                    "only the seller may set transfer policy".to_string(),
                ));
            }
            Some(policy) => seller_policy(policy),
            None => TransferPolicy::default(),
        };

        if let Some(result) = self.existing_offer(&request.product_id, &request.to_recipient_id)? {
            return Ok(result);
        }

        let status = next_status(None, TransferAction::Offer, self.transition_policy())?;
        let now = self.ctx.now();
        let transfer = Transfer {
            id: TransferId::generate(),
            product_id: product.id.clone(),
            from_owner_id: product.owner_id.clone(),
            to_recipient_id: request.to_recipient_id.clone(),
            price: request.price.unwrap_or(0),
            currency,
            status,
            policy,
            buyer_inputs: Map::new(),
            created_at: now,
            updated_at: now,
        };
        match self.ctx.retry(|| Ok(store.insert_transfer(&transfer)?)) {
            Ok(()) => {}
            Err(DeliveryError::Conflict(message)) => {
                return self
                    .existing_offer(&request.product_id, &request.to_recipient_id)?
                    .ok_or(DeliveryError::Conflict(message));
            }
            Err(err) => return Err(err),
        }

        self.record_transition(caller, &transfer, None);
        let notify = if seller_initiated {
            transfer.to_recipient_id.clone()
        } else {
            transfer.from_owner_id.clone()
        };
        self.notify(&transfer, notify, "transfer offered");
        Ok(OfferResult {
            transfer,
            reused: false,
        })
    }

    /// Returns an active transfer for the pair, or fails when the pair is
    /// already delivered or disputed.
    fn existing_offer(
        &self,
        product_id: &ProductId,
        recipient_id: &PrincipalId,
    ) -> Result<Option<OfferResult>, DeliveryError> {
        let existing =
            self.ctx.retry(|| Ok(self.ctx.store().find_transfers(product_id, recipient_id)?))?;
        if existing.iter().any(|transfer| transfer.status.blocks_new_offer()) {
            return Err(DeliveryError::Conflict(
                "product already delivered or disputed for recipient".to_string(),
            ));
        }
        Ok(existing.into_iter().find(|transfer| transfer.status.is_committed()).map(|transfer| {
            OfferResult {
                transfer,
                reused: true,
            }
        }))
    }

    /// Creates (once) or returns the payment intent for a transfer.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::MissingRequiredInputs`] when pre-payment
    /// inputs are absent and [`DeliveryError::NotFoundOrDenied`] for
    /// non-parties.
    pub fn invoice(
        &self,
        caller: &PrincipalId,
        target: &TransferRef,
        buyer_inputs: Option<Map<String, Value>>,
    ) -> Result<InvoiceResult, DeliveryError> {
        let store = self.ctx.store();
        let mut transfer = self.resolve(target)?;
        if !transfer.is_party(caller) {
            return Err(DeliveryError::NotFoundOrDenied);
        }
        let read_status = transfer.status;
        let inputs_changed = match buyer_inputs {
            Some(inputs) if !inputs.is_empty() && read_status.accepts_inputs() => {
                transfer.merge_inputs(inputs);
                true
            }
            _ => false,
        };

        let product = self
            .ctx
            .retry(|| Ok(store.get_product(&transfer.product_id)?))?
            .ok_or(DeliveryError::NotFoundOrDenied)?;
        let missing = missing_inputs(
            &product.required_inputs,
            InputTiming::PrePayment,
            &transfer.buyer_inputs,
        );
        if !missing.is_empty() {
            if inputs_changed {
                self.write_inputs(&mut transfer, read_status)?;
            }
            return Err(DeliveryError::MissingRequiredInputs {
                missing,
            });
        }

        let existing_intent = self.ctx.retry(|| Ok(store.get_payment_intent(&transfer.id)?))?;
        if read_status != TransferStatus::Offered {
            let intent = existing_intent.ok_or_else(|| {
                DeliveryError::InvalidState(format!(
                    "transfer is {} without a payment intent",
                    read_status.as_str()
                ))
            })?;
            if inputs_changed {
                self.write_inputs(&mut transfer, read_status)?;
            }
            return Ok(InvoiceResult {
                transfer,
                intent,
            });
        }

        let now = self.ctx.now();
        let intent = match existing_intent {
            Some(intent) => intent,
            None => {
                let request = CheckoutRequest {
                    transfer_id: transfer.id.clone(),
                    product_id: transfer.product_id.clone(),
                    recipient_id: transfer.to_recipient_id.clone(),
                    amount: transfer.price,
                    currency: transfer.currency.clone(),
                    description: product.title.clone(),
                };
                let session =
                    self.ctx.retry(|| Ok(self.ctx.services.payments.create_checkout(&request)?))?;
                PaymentIntent {
                    id: PaymentIntentId::generate(),
                    transfer_id: transfer.id.clone(),
                    amount: transfer.price,
                    currency: transfer.currency.clone(),
                    status: PaymentStatus::Pending,
                    provider: session.provider,
                    provider_ref: session.provider_ref,
                    checkout_url: session.checkout_url,
                    created_at: now,
                    updated_at: now,
                }
            }
        };

        transfer.status =
            next_status(Some(read_status), TransferAction::Invoice, self.transition_policy())?;
        transfer.updated_at = now;
        let mut change = TransferChange::transfer_only(transfer.clone(), read_status);
        change.payment = Some(intent.clone());
        match self.ctx.retry(|| Ok(store.apply_transfer_change(&change)?)) {
            Ok(()) => {}
            Err(DeliveryError::Conflict(message)) => {
                let current = self.load(&transfer.id)?;
                let intent = self.ctx.retry(|| Ok(store.get_payment_intent(&current.id)?))?;
                return match intent {
                    Some(intent) if current.status != TransferStatus::Offered => {
                        Ok(InvoiceResult {
                            transfer: current,
                            intent,
                        })
                    }
                    _ => Err(DeliveryError::Conflict(message)),
                };
            }
            Err(err) => return Err(err),
        }

        self.record_transition(caller, &transfer, Some(read_status));
        self.notify(&transfer, transfer.to_recipient_id.clone(), "invoice created");
        Ok(InvoiceResult {
            transfer,
            intent,
        })
    }

    /// Applies a payment gateway webhook.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::NotFoundOrDenied`] for unknown transfers and
    /// [`DeliveryError::InvalidState`] when a success event arrives for a
    /// transfer that was never invoiced.
    pub fn handle_payment_webhook(
        &self,
        webhook: &PaymentWebhook,
    ) -> Result<WebhookOutcome, DeliveryError> {
        let store = self.ctx.store();
        let mut transfer = self.load(&webhook.transfer_id)?;
        let read_status = transfer.status;
        let now = self.ctx.now();
        let event = webhook.event_type.as_str();

        if event != EVENT_PAYMENT_SUCCEEDED
            && event != EVENT_CHECKOUT_COMPLETED
            && event != EVENT_PAYMENT_FAILED
        {
            self.record_webhook(&transfer, format!("ignored event {event}"));
            return Ok(WebhookOutcome {
                transfer_id: transfer.id,
                status: read_status,
                handled: false,
            });
        }

        let mut intent = self
            .ctx
            .retry(|| Ok(store.get_payment_intent(&transfer.id)?))?
            .ok_or_else(|| {
                DeliveryError::InvalidState("transfer has no payment intent".to_string())
            })?;

        if event == EVENT_PAYMENT_FAILED {
            if intent.status == PaymentStatus::Pending {
                intent.status = PaymentStatus::Failed;
                if webhook.payment_ref.is_some() {
                    intent.provider_ref.clone_from(&webhook.payment_ref);
                }
                intent.updated_at = now;
                self.ctx.retry(|| Ok(store.put_payment_intent(&intent)?))?;
            }
            self.record_webhook(&transfer, "payment failed".to_string());
            return Ok(WebhookOutcome {
                transfer_id: transfer.id,
                status: read_status,
                handled: true,
            });
        }

        if read_status != TransferStatus::Invoiced {
            if intent.status == PaymentStatus::Paid {
                return Ok(WebhookOutcome {
                    transfer_id: transfer.id,
                    status: read_status,
                    handled: true,
                });
            }
            return Err(DeliveryError::InvalidState(format!(
                "payment confirmed for transfer in status {}",
                read_status.as_str()
            )));
        }

        transfer.status = next_status(
            Some(read_status),
            TransferAction::ConfirmPayment,
            self.transition_policy(),
        )?;
        transfer.updated_at = now;
        intent.status = PaymentStatus::Paid;
        if webhook.payment_ref.is_some() {
            intent.provider_ref.clone_from(&webhook.payment_ref);
        }
        intent.updated_at = now;
        let mut change = TransferChange::transfer_only(transfer.clone(), read_status);
        change.payment = Some(intent);
        match self.ctx.retry(|| Ok(store.apply_transfer_change(&change)?)) {
            Ok(()) => {}
            Err(DeliveryError::Conflict(_)) => {
                let current = self.load(&transfer.id)?;
                return Ok(WebhookOutcome {
                    transfer_id: current.id,
                    status: current.status,
                    handled: true,
                });
            }
            Err(err) => return Err(err),
        }

        self.record_transition(&transfer.to_recipient_id, &transfer, Some(read_status));
        self.notify(&transfer, transfer.from_owner_id.clone(), "payment received");
        Ok(WebhookOutcome {
            transfer_id: transfer.id,
            status: transfer.status,
            handled: true,
        })
    }

    /// Merges buyer inputs while the transfer is offered, invoiced, or paid.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::NotFoundOrDenied`] for callers other than the
    /// recipient and [`DeliveryError::InvalidState`] once inputs are closed.
    pub fn submit_requirements(
        &self,
        caller: &PrincipalId,
        transfer_id: &TransferId,
        inputs: Map<String, Value>,
    ) -> Result<Transfer, DeliveryError> {
        let mut transfer = self.load(transfer_id)?;
        if transfer.to_recipient_id != *caller {
            return Err(DeliveryError::NotFoundOrDenied);
        }
        let read_status = transfer.status;
        if !read_status.accepts_inputs() {
            return Err(DeliveryError::InvalidState(format!(
                "inputs closed in status {}",
                read_status.as_str()
            )));
        }
        transfer.merge_inputs(inputs);
        self.write_inputs(&mut transfer, read_status)?;
        Ok(transfer)
    }

    /// Records the delivery receipt and moves the transfer to acknowledged.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::Conflict`] when a receipt already exists and
    /// [`DeliveryError::InvalidState`] unless the transfer is delivered.
    pub fn acknowledge(
        &self,
        caller: &PrincipalId,
        request: AcknowledgeRequest,
    ) -> Result<DeliveryReceipt, DeliveryError> {
        let mut transfer = self.load(&request.transfer_id)?;
        if transfer.to_recipient_id != *caller {
            return Err(DeliveryError::NotFoundOrDenied);
        }
        if request.client_hash.trim().is_empty() || request.signature.trim().is_empty() {
            return Err(DeliveryError::InvalidInput(
                "clientHash and signature are required".to_string(),
            ));
        }
        let read_status = transfer.status;
        if read_status == TransferStatus::Acknowledged {
            return Err(DeliveryError::Conflict("delivery already acknowledged".to_string()));
        }
        transfer.status =
            next_status(Some(read_status), TransferAction::Acknowledge, self.transition_policy())?;
        let now = self.ctx.now();
        transfer.updated_at = now;
        let receipt = DeliveryReceipt {
            id: ReceiptId::generate(),
            transfer_id: transfer.id.clone(),
            client_hash: request.client_hash,
            signature: request.signature,
            meta: request.meta.unwrap_or(Value::Null),
            delivered_at: now,
        };
        let mut change = TransferChange::transfer_only(transfer.clone(), read_status);
        change.receipt = Some(receipt.clone());
        self.ctx.retry(|| Ok(self.ctx.store().apply_transfer_change(&change)?))?;

        self.record_transition(caller, &transfer, Some(read_status));
        self.notify(&transfer, transfer.from_owner_id.clone(), "delivery acknowledged");
        Ok(receipt)
    }

    /// Opens a dispute.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::Conflict`] when already disputed,
    /// [`DeliveryError::Expired`] past the dispute deadline, and
    /// [`DeliveryError::InvalidState`] from other statuses.
    pub fn dispute(
        &self,
        caller: &PrincipalId,
        request: DisputeRequest,
    ) -> Result<DisputeRecord, DeliveryError> {
        let mut transfer = self.load(&request.transfer_id)?;
        if !transfer.is_party(caller) {
            return Err(DeliveryError::NotFoundOrDenied);
        }
        let reason = request.reason.trim();
        if reason.is_empty() || reason.chars().count() > MAX_REASON_CHARS {
            return Err(DeliveryError::InvalidInput(format!(
                "reason must be 1..={MAX_REASON_CHARS} characters"
            )));
        }
        let read_status = transfer.status;
        if read_status == TransferStatus::Disputed {
            return Err(DeliveryError::Conflict("dispute already open".to_string()));
        }
        let target =
            next_status(Some(read_status), TransferAction::Dispute, self.transition_policy())?;
        let now = self.ctx.now();
        let deadline = transfer
            .policy
            .dispute_deadline
            .unwrap_or_else(|| transfer.updated_at.saturating_add(self.ctx.config.dispute_window));
        if now.has_reached(deadline) {
            return Err(DeliveryError::Expired("dispute window closed".to_string()));
        }

        let record = DisputeRecord {
            dispute_id: DisputeId::generate(),
            reason: reason.to_string(),
            requested_action: request.requested_action,
            opened_by: caller.clone(),
            opened_at: now,
            prior_status: read_status,
        };
        transfer.status = target;
        transfer.policy.dispute = Some(record.clone());
        transfer.updated_at = now;
        let change = TransferChange::transfer_only(transfer.clone(), read_status);
        self.ctx.retry(|| Ok(self.ctx.store().apply_transfer_change(&change)?))?;

        self.record_transition(caller, &transfer, Some(read_status));
        let counterparty = if transfer.from_owner_id == *caller {
            transfer.to_recipient_id.clone()
        } else {
            transfer.from_owner_id.clone()
        };
        self.notify(&transfer, counterparty, "dispute opened");
        Ok(record)
    }

    /// Revokes access: the transfer becomes refunded and the recipient's live
    /// key expires in the same write.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::InvalidState`] when revocation is waived, past
    /// its deadline, requested by the recipient, or not allowed from the
    /// current status.
    pub fn revoke(
        &self,
        caller: &PrincipalId,
        request: RevokeRequest,
    ) -> Result<Transfer, DeliveryError> {
        let store = self.ctx.store();
        let mut transfer = self.load(&request.transfer_id)?;
        if !transfer.is_party(caller) {
            return Err(DeliveryError::NotFoundOrDenied);
        }
        if transfer.from_owner_id != *caller {
            return Err(DeliveryError::InvalidState("only the seller may revoke".to_string()));
        }
        if transfer.policy.no_revocation {
            return Err(DeliveryError::InvalidState("transfer waives revocation".to_string()));
        }
        let now = self.ctx.now();
        if let Some(deadline) = transfer.policy.revocation_deadline
            && now.has_reached(deadline)
        {
            return Err(DeliveryError::InvalidState("revocation deadline passed".to_string()));
        }
        let read_status = transfer.status;
        transfer.status =
            next_status(Some(read_status), TransferAction::Revoke, self.transition_policy())?;
        transfer.policy.revoked = true;
        transfer.policy.revocation = Some(RevocationRecord {
            revoked_at: now,
            reason: request.reason,
            revoked_by: caller.clone(),
        });
        transfer.updated_at = now;

        let live_key = self.ctx.retry(|| {
            Ok(store.get_live_key(&transfer.product_id, &transfer.to_recipient_id, now)?)
        })?;
        let mut change = TransferChange::transfer_only(transfer.clone(), read_status);
        change.key = live_key.map(|key| KeyChange::Expire {
            key_id: key.id,
            expires_at: now,
        });
        self.ctx.retry(|| Ok(store.apply_transfer_change(&change)?))?;

        self.record_transition(caller, &transfer, Some(read_status));
        self.notify(&transfer, transfer.to_recipient_id.clone(), "access revoked");
        Ok(transfer)
    }

    /// Returns a transfer with its payment and receipt rows to either party.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::NotFoundOrDenied`] for non-parties.
    pub fn get_transfer(
        &self,
        caller: &PrincipalId,
        transfer_id: &TransferId,
    ) -> Result<TransferView, DeliveryError> {
        let store = self.ctx.store();
        let transfer = self.load(transfer_id)?;
        if !transfer.is_party(caller) {
            return Err(DeliveryError::NotFoundOrDenied);
        }
        let payment = self.ctx.retry(|| Ok(store.get_payment_intent(transfer_id)?))?;
        let receipt = self.ctx.retry(|| Ok(store.get_receipt(transfer_id)?))?;
        Ok(TransferView {
            transfer,
            payment,
            receipt,
        })
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    /// Loads a transfer or fails with `NotFoundOrDenied`.
    pub(crate) fn load(&self, transfer_id: &TransferId) -> Result<Transfer, DeliveryError> {
        self.ctx
            .retry(|| Ok(self.ctx.store().get_transfer(transfer_id)?))?
            .ok_or(DeliveryError::NotFoundOrDenied)
    }

    /// Resolves a transfer reference, preferring an active transfer for pairs.
    fn resolve(&self, target: &TransferRef) -> Result<Transfer, DeliveryError> {
        match target {
            TransferRef::Id(transfer_id) => self.load(transfer_id),
            TransferRef::Pair {
                product_id,
                recipient_id,
            } => {
                let transfers = self
                    .ctx
                    .retry(|| Ok(self.ctx.store().find_transfers(product_id, recipient_id)?))?;
                let active = transfers.iter().position(|transfer| transfer.status.is_committed());
                let index = active.unwrap_or(0);
                transfers.into_iter().nth(index).ok_or(DeliveryError::NotFoundOrDenied)
            }
        }
    }

    /// Persists merged buyer inputs without changing status.
    fn write_inputs(
        &self,
        transfer: &mut Transfer,
        read_status: TransferStatus,
    ) -> Result<(), DeliveryError> {
        transfer.updated_at = self.ctx.now();
        let change = TransferChange::transfer_only(transfer.clone(), read_status);
        self.ctx.retry(|| Ok(self.ctx.store().apply_transfer_change(&change)?))
    }

    /// Audits a status change.
    pub(crate) fn record_transition(
        &self,
        actor: &PrincipalId,
        transfer: &Transfer,
        from: Option<TransferStatus>,
    ) {
        self.ctx.audit(DeliveryAuditEventParams {
            kind: DeliveryAuditKind::TransferTransition,
            at: self.ctx.now(),
            actor: Some(actor.clone()),
            product_id: Some(transfer.product_id.clone()),
            transfer_id: Some(transfer.id.clone()),
            from_status: from,
            to_status: Some(transfer.status),
            detail: None,
        });
    }

    /// Audits a webhook that did not change status.
    fn record_webhook(&self, transfer: &Transfer, detail: String) {
        self.ctx.audit(DeliveryAuditEventParams {
            kind: DeliveryAuditKind::PaymentWebhook,
            at: self.ctx.now(),
            actor: None,
            product_id: Some(transfer.product_id.clone()),
            transfer_id: Some(transfer.id.clone()),
            from_status: Some(transfer.status),
            to_status: Some(transfer.status),
            detail: Some(detail),
        });
    }

    /// Sends a best-effort notification about a transfer.
    pub(crate) fn notify(&self, transfer: &Transfer, recipient: PrincipalId, message: &str) {
        self.ctx.notify(&DeliveryNotification {
            recipient_id: recipient,
            transfer_id: transfer.id.clone(),
            product_id: transfer.product_id.clone(),
            status: transfer.status,
            message: message.to_string(),
        });
    }
}

/// Keeps the seller-settable parts of a supplied policy.
fn seller_policy(policy: TransferPolicy) -> TransferPolicy {
    TransferPolicy {
        no_revocation: policy.no_revocation,
        revocation_deadline: policy.revocation_deadline,
        dispute_deadline: policy.dispute_deadline,
        revoked: false,
        revocation: None,
        dispute: None,
        extra: policy.extra,
    }
}
