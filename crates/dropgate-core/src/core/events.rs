// crates/dropgate-core/src/core/events.rs
// ============================================================================
// Module: Dropgate Delivery Events
// Description: Audit events and outbound notification payloads.
// Purpose: Describe lifecycle facts emitted by the delivery runtime.
// Dependencies: crate::core, serde
// ============================================================================

//! ## Overview
//! Two event families leave the runtime. [`DeliveryAuditEvent`] is a redacted
//! JSON-lines record for operators; token values and key material never
//! appear in it. [`DeliveryNotification`] is the best-effort message handed to
//! the notifier collaborator so parties learn about lifecycle changes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::PrincipalId;
use crate::core::identifiers::ProductId;
use crate::core::identifiers::TransferId;
use crate::core::time::Timestamp;
use crate::core::transfer::TransferStatus;

// ============================================================================
// SECTION: Audit Events
// ============================================================================

/// Audit event classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryAuditKind {
    /// Upload session opened.
    UploadStarted,
    /// Upload finalized and product became ready.
    UploadCompleted,
    /// Transfer status changed (or was created).
    TransferTransition,
    /// A new key envelope was minted.
    KeyMinted,
    /// A claim token was redeemed for a download token.
    ClaimRedeemed,
    /// The access gate refused a request.
    AccessDenied,
    /// A payment webhook was ignored or marked an intent failed.
    PaymentWebhook,
    /// The notifier collaborator failed.
    NotificationFailed,
}

impl DeliveryAuditKind {
    /// Returns the stable label for the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UploadStarted => "upload_started",
            Self::UploadCompleted => "upload_completed",
            Self::TransferTransition => "transfer_transition",
            Self::KeyMinted => "key_minted",
            Self::ClaimRedeemed => "claim_redeemed",
            Self::AccessDenied => "access_denied",
            Self::PaymentWebhook => "payment_webhook",
            Self::NotificationFailed => "notification_failed",
        }
    }
}

/// Redacted audit record emitted by the delivery runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event classification.
    pub kind: DeliveryAuditKind,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: i64,
    /// Acting principal when known.
    pub actor: Option<PrincipalId>,
    /// Product concerned.
    pub product_id: Option<ProductId>,
    /// Transfer concerned.
    pub transfer_id: Option<TransferId>,
    /// Status before the change.
    pub from_status: Option<TransferStatus>,
    /// Status after the change.
    pub to_status: Option<TransferStatus>,
    /// Short free-form detail (never secrets).
    pub detail: Option<String>,
}

/// Inputs required to construct a delivery audit event.
#[derive(Debug, Clone)]
pub struct DeliveryAuditEventParams {
    /// Event classification.
    pub kind: DeliveryAuditKind,
    /// Event time.
    pub at: Timestamp,
    /// Acting principal when known.
    pub actor: Option<PrincipalId>,
    /// Product concerned.
    pub product_id: Option<ProductId>,
    /// Transfer concerned.
    pub transfer_id: Option<TransferId>,
    /// Status before the change.
    pub from_status: Option<TransferStatus>,
    /// Status after the change.
    pub to_status: Option<TransferStatus>,
    /// Short free-form detail.
    pub detail: Option<String>,
}

impl DeliveryAuditEvent {
    /// Creates a new delivery audit event.
    #[must_use]
    pub fn new(params: DeliveryAuditEventParams) -> Self {
        Self {
            event: "delivery_audit",
            kind: params.kind,
            timestamp_ms: params.at.as_unix_millis(),
            actor: params.actor,
            product_id: params.product_id,
            transfer_id: params.transfer_id,
            from_status: params.from_status,
            to_status: params.to_status,
            detail: params.detail,
        }
    }
}

// ============================================================================
// SECTION: Notifications
// ============================================================================

/// Lifecycle fact delivered to the notifier collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryNotification {
    /// Principal to notify.
    pub recipient_id: PrincipalId,
    /// Transfer concerned.
    pub transfer_id: TransferId,
    /// Product concerned.
    pub product_id: ProductId,
    /// Status the transfer reached.
    pub status: TransferStatus,
    /// Human-readable summary.
    pub message: String,
}
