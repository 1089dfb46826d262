// crates/dropgate-core/src/core/transfer.rs
// ============================================================================
// Module: Dropgate Transfer State Machine
// Description: Transfer records, status enum, and the central transition table.
// Purpose: Make every lifecycle change a lookup in one closed table.
// Dependencies: crate::core, serde, thiserror
// ============================================================================

//! ## Overview
//! A [`Transfer`] is one seller to buyer handoff of one product. Its status is
//! a closed enum and every status change goes through [`next_status`], which
//! encodes the full transition table. Any (status, action) pair not listed is
//! rejected.
//!
//! | From | Action | To |
//! |---|---|---|
//! | (none) | offer | offered |
//! | offered | invoice | invoiced |
//! | invoiced | confirm payment | paid |
//! | paid | grant | delivered |
//! | invoiced | grant (unpaid grant enabled) | delivered |
//! | delivered, acknowledged | grant | unchanged (re-issue) |
//! | delivered | acknowledge | acknowledged |
//! | paid, delivered, acknowledged | dispute | disputed |
//! | delivered, acknowledged | revoke | refunded |

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

use crate::core::identifiers::DisputeId;
use crate::core::identifiers::PrincipalId;
use crate::core::identifiers::ProductId;
use crate::core::identifiers::TransferId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Status
// ============================================================================

/// Transfer lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    /// Seller offered the product to the recipient.
    Offered,
    /// A payment intent exists and awaits payment.
    Invoiced,
    /// Payment succeeded.
    Paid,
    /// Access was granted and a key envelope issued.
    Delivered,
    /// Recipient confirmed delivery with a receipt.
    Acknowledged,
    /// A dispute is open.
    Disputed,
    /// Access was revoked.
    Refunded,
}

impl TransferStatus {
    /// All statuses in lifecycle order.
    pub const ALL: [Self; 7] = [
        Self::Offered,
        Self::Invoiced,
        Self::Paid,
        Self::Delivered,
        Self::Acknowledged,
        Self::Disputed,
        Self::Refunded,
    ];

    /// Returns the stable label for the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Offered => "offered",
            Self::Invoiced => "invoiced",
            Self::Paid => "paid",
            Self::Delivered => "delivered",
            Self::Acknowledged => "acknowledged",
            Self::Disputed => "disputed",
            Self::Refunded => "refunded",
        }
    }

    /// Parses a status label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == label)
    }

    /// Statuses in which a new offer for the same pair reuses this transfer.
    #[must_use]
    pub const fn is_committed(self) -> bool {
        matches!(self, Self::Offered | Self::Invoiced | Self::Paid)
    }

    /// Statuses that block a new offer for the same pair outright.
    #[must_use]
    pub const fn blocks_new_offer(self) -> bool {
        matches!(self, Self::Delivered | Self::Disputed)
    }

    /// Statuses in which payment has been settled and access may be live.
    #[must_use]
    pub const fn is_paid_access(self) -> bool {
        matches!(self, Self::Paid | Self::Delivered | Self::Acknowledged)
    }

    /// Statuses from which a claim token may be redeemed.
    #[must_use]
    pub const fn is_claimable(self) -> bool {
        matches!(self, Self::Delivered | Self::Acknowledged)
    }

    /// Statuses in which buyer inputs may still be submitted.
    #[must_use]
    pub const fn accepts_inputs(self) -> bool {
        matches!(self, Self::Offered | Self::Invoiced | Self::Paid)
    }
}

// ============================================================================
// SECTION: Transition Table
// ============================================================================

/// Trigger for a transfer status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferAction {
    /// Create an offer.
    Offer,
    /// Create an invoice (payment intent).
    Invoice,
    /// Payment gateway reported success.
    ConfirmPayment,
    /// Grant access and issue a key envelope.
    Grant,
    /// Recipient submitted a delivery receipt.
    Acknowledge,
    /// Either party opened a dispute.
    Dispute,
    /// Seller revoked access.
    Revoke,
}

impl TransferAction {
    /// Returns the stable label for the action.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Offer => "offer",
            Self::Invoice => "invoice",
            Self::ConfirmPayment => "confirm_payment",
            Self::Grant => "grant",
            Self::Acknowledge => "acknowledge",
            Self::Dispute => "dispute",
            Self::Revoke => "revoke",
        }
    }
}

/// Rejected transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "transition {} not allowed from {}",
    .action.as_str(),
    .from.map_or("none", TransferStatus::as_str)
)]
pub struct TransitionError {
    /// Source status (`None` before creation).
    pub from: Option<TransferStatus>,
    /// Attempted action.
    pub action: TransferAction,
}

/// Flags that widen the transition table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransitionPolicy {
    /// Permit `invoiced -> delivered` on grant without a payment.
    pub allow_unpaid_grant: bool,
}

/// Resolves the target status for `action` from `from`.
///
/// # Errors
///
/// Returns [`TransitionError`] when the pair is not in the table.
pub const fn next_status(
    from: Option<TransferStatus>,
    action: TransferAction,
    policy: TransitionPolicy,
) -> Result<TransferStatus, TransitionError> {
    use TransferAction as A;
    use TransferStatus as S;
    let target = match (from, action) {
        (None, A::Offer) => Some(S::Offered),
        (Some(S::Offered), A::Invoice) => Some(S::Invoiced),
        (Some(S::Invoiced), A::ConfirmPayment) => Some(S::Paid),
        (Some(S::Paid), A::Grant) => Some(S::Delivered),
        (Some(S::Invoiced), A::Grant) if policy.allow_unpaid_grant => Some(S::Delivered),
        (Some(S::Delivered), A::Grant) => Some(S::Delivered),
        (Some(S::Acknowledged), A::Grant) => Some(S::Acknowledged),
        (Some(S::Delivered), A::Acknowledge) => Some(S::Acknowledged),
        (Some(S::Paid | S::Delivered | S::Acknowledged), A::Dispute) => Some(S::Disputed),
        (Some(S::Delivered | S::Acknowledged), A::Revoke) => Some(S::Refunded),
        _ => None,
    };
    match target {
        Some(status) => Ok(status),
        None => Err(TransitionError {
            from,
            action,
        }),
    }
}

// ============================================================================
// SECTION: Policy
// ============================================================================

/// Dispute record stored on the transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisputeRecord {
    /// Dispute identifier.
    pub dispute_id: DisputeId,
    /// Reason supplied by the opener.
    pub reason: String,
    /// Optional remedy requested (e.g. `refund`).
    pub requested_action: Option<String>,
    /// Party that opened the dispute.
    pub opened_by: PrincipalId,
    /// Time the dispute was opened.
    pub opened_at: Timestamp,
    /// Status the transfer held when the dispute opened.
    pub prior_status: TransferStatus,
}

/// Revocation record stored on the transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevocationRecord {
    /// Time access was revoked.
    pub revoked_at: Timestamp,
    /// Optional reason.
    pub reason: Option<String>,
    /// Party that revoked access.
    pub revoked_by: PrincipalId,
}

/// Structured transfer policy and audit metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferPolicy {
    /// Seller waived the right to revoke.
    #[serde(default)]
    pub no_revocation: bool,
    /// Revocation is refused at or after this time.
    #[serde(default)]
    pub revocation_deadline: Option<Timestamp>,
    /// Disputes are refused at or after this time.
    #[serde(default)]
    pub dispute_deadline: Option<Timestamp>,
    /// Set once access has been revoked.
    #[serde(default)]
    pub revoked: bool,
    /// Revocation details.
    #[serde(default)]
    pub revocation: Option<RevocationRecord>,
    /// Open dispute details.
    #[serde(default)]
    pub dispute: Option<DisputeRecord>,
    /// Additional caller-supplied flags.
    #[serde(default, flatten)]
    pub extra: Map<String, Value>,
}

// ============================================================================
// SECTION: Transfer
// ============================================================================

/// One seller to buyer handoff of one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transfer {
    /// Transfer identifier.
    pub id: TransferId,
    /// Product being transferred.
    pub product_id: ProductId,
    /// Seller.
    pub from_owner_id: PrincipalId,
    /// Buyer.
    pub to_recipient_id: PrincipalId,
    /// Price in currency minor units.
    pub price: u64,
    /// Upper-case currency code.
    pub currency: String,
    /// Lifecycle status.
    pub status: TransferStatus,
    /// Structured policy and audit metadata.
    #[serde(default)]
    pub policy: TransferPolicy,
    /// Buyer-submitted requirement values.
    #[serde(default)]
    pub buyer_inputs: Map<String, Value>,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last mutation time.
    pub updated_at: Timestamp,
}

impl Transfer {
    /// Returns true when `principal` is the seller or the buyer.
    #[must_use]
    pub fn is_party(&self, principal: &PrincipalId) -> bool {
        self.from_owner_id == *principal || self.to_recipient_id == *principal
    }

    /// Merges inputs into `buyer_inputs` (additive, last write wins per field).
    pub fn merge_inputs(&mut self, inputs: Map<String, Value>) {
        for (name, value) in inputs {
            self.buyer_inputs.insert(name, value);
        }
    }
}
