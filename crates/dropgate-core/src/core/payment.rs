// crates/dropgate-core/src/core/payment.rs
// ============================================================================
// Module: Dropgate Payment Intents
// Description: Payment intent records consumed from the payment gateway.
// Purpose: Track the single checkout created for a transfer.
// Dependencies: crate::core, serde
// ============================================================================

//! ## Overview
//! A [`PaymentIntent`] is created lazily the first time a transfer is
//! invoiced and is updated by the payment webhook. There is exactly one
//! intent per transfer.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::PaymentIntentId;
use crate::core::identifiers::TransferId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Status
// ============================================================================

/// Payment intent status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Awaiting payment.
    Pending,
    /// Payment succeeded.
    Paid,
    /// Gateway reported failure.
    Failed,
}

impl PaymentStatus {
    /// Returns the stable label for the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Failed => "failed",
        }
    }

    /// Parses a status label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "pending" => Some(Self::Pending),
            "paid" => Some(Self::Paid),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

// ============================================================================
// SECTION: Payment Intent
// ============================================================================

/// Checkout created for a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntent {
    /// Intent identifier.
    pub id: PaymentIntentId,
    /// Transfer being paid for.
    pub transfer_id: TransferId,
    /// Amount in currency minor units.
    pub amount: u64,
    /// Upper-case currency code.
    pub currency: String,
    /// Intent status.
    pub status: PaymentStatus,
    /// Gateway label.
    pub provider: String,
    /// Gateway reference (checkout or charge id).
    pub provider_ref: Option<String>,
    /// URL the buyer follows to pay.
    pub checkout_url: String,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last mutation time.
    pub updated_at: Timestamp,
}
