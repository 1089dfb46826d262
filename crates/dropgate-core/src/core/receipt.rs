// crates/dropgate-core/src/core/receipt.rs
// ============================================================================
// Module: Dropgate Delivery Receipts
// Description: Buyer-submitted proof of delivery.
// Purpose: Record the single acknowledgment that closes a transfer.
// Dependencies: crate::core, serde
// ============================================================================

//! ## Overview
//! A [`DeliveryReceipt`] is unique per transfer. The `signature` is stored
//! verbatim; verifying it is left to downstream tooling.

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::identifiers::ReceiptId;
use crate::core::identifiers::TransferId;
use crate::core::time::Timestamp;

/// Proof of delivery submitted by the recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryReceipt {
    /// Receipt identifier.
    pub id: ReceiptId,
    /// Acknowledged transfer.
    pub transfer_id: TransferId,
    /// Client-computed digest of the received content.
    pub client_hash: String,
    /// Client signature over the receipt.
    pub signature: String,
    /// Optional client metadata.
    #[serde(default)]
    pub meta: Value,
    /// Time the receipt was recorded.
    pub delivered_at: Timestamp,
}
