//! # Order Lifecycle Status
//!
//! Fixed, ordered table of the upstream order/refund statuses. Only a few
//! terminal stages produce a sale record; every other status is a no-op.
//!
//! ```text
//! ORDER:   Processing ─► Finished ─► ... ─► BuyerReceivedConfirmed ─► SaleOrderSuccess
//!                           ▲ sale record from here on
//! REFUND:  Registered ─► ... ─► RequisiteApprovals ─► RefundOrderSuccess
//!                                                      ▲ only this one
//! ```

use serde::{Deserialize, Serialize};

/// Whether a status belongs to the order or the refund lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StatusKind {
    Order,
    Refund,
    Undefined,
}

/// Upstream lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    SaleOrderProcessing,
    SaleOrderCancel,
    SaleOrderFinished,
    StockDistributed,
    SaleShippingWaiting,
    SaleShippingProcessing,
    SaleShippingFinished,
    BuyerReceivedConfirmed,
    SaleOrderSuccess,
    RefundOrderRegistered,
    SellerRefundAgree,
    RefundOrderCancel,
    RefundOrderProcessing,
    RefundShippingWaiting,
    RefundShippingProcessing,
    RefundShippingFinished,
    RefundRequisiteApprovals,
    RefundOrderSuccess,
    Undefined,
}

/// (status, name, sequence, kind, can_make_sale_record)
static STATUS_TABLE: [(OrderStatus, &str, u32, StatusKind, bool); 18] = [
    (OrderStatus::SaleOrderProcessing, "SaleOrderProcessing", 1, StatusKind::Order, false),
    (OrderStatus::SaleOrderCancel, "SaleOrderCancel", 2, StatusKind::Order, false),
    (OrderStatus::SaleOrderFinished, "SaleOrderFinished", 3, StatusKind::Order, true),
    (OrderStatus::StockDistributed, "StockDistributed", 4, StatusKind::Order, true),
    (OrderStatus::SaleShippingWaiting, "SaleShippingWaiting", 5, StatusKind::Order, true),
    (OrderStatus::SaleShippingProcessing, "SaleShippingProcessing", 6, StatusKind::Order, true),
    (OrderStatus::SaleShippingFinished, "SaleShippingFinished", 7, StatusKind::Order, true),
    (OrderStatus::BuyerReceivedConfirmed, "BuyerReceivedConfirmed", 8, StatusKind::Order, true),
    (OrderStatus::SaleOrderSuccess, "SaleOrderSuccess", 9, StatusKind::Order, true),
    (OrderStatus::RefundOrderRegistered, "RefundOrderRegistered", 10, StatusKind::Refund, false),
    (OrderStatus::SellerRefundAgree, "SellerRefundAgree", 11, StatusKind::Refund, false),
    (OrderStatus::RefundOrderCancel, "RefundOrderCancel", 12, StatusKind::Refund, false),
    (OrderStatus::RefundOrderProcessing, "RefundOrderProcessing", 13, StatusKind::Refund, false),
    (OrderStatus::RefundShippingWaiting, "RefundShippingWaiting", 14, StatusKind::Refund, false),
    (OrderStatus::RefundShippingProcessing, "RefundShippingProcessing", 15, StatusKind::Refund, false),
    (OrderStatus::RefundShippingFinished, "RefundShippingFinished", 16, StatusKind::Refund, false),
    (OrderStatus::RefundRequisiteApprovals, "RefundRequisiteApprovals", 17, StatusKind::Refund, false),
    (OrderStatus::RefundOrderSuccess, "RefundOrderSuccess", 18, StatusKind::Refund, true),
];

impl OrderStatus {
    /// Resolves a status label. Unknown labels become `Undefined`.
    pub fn from_label(label: &str) -> Self {
        STATUS_TABLE
            .iter()
            .find(|(_, name, ..)| *name == label)
            .map(|(status, ..)| *status)
            .unwrap_or(OrderStatus::Undefined)
    }

    fn entry(&self) -> Option<&'static (OrderStatus, &'static str, u32, StatusKind, bool)> {
        STATUS_TABLE.iter().find(|(status, ..)| status == self)
    }

    /// The label as it appears on the wire (empty for `Undefined`).
    pub fn label(&self) -> &'static str {
        self.entry().map(|e| e.1).unwrap_or("")
    }

    /// Position in the lifecycle table. `Undefined` sorts last.
    pub fn sequence(&self) -> u32 {
        self.entry().map(|e| e.2).unwrap_or(18)
    }

    pub fn kind(&self) -> StatusKind {
        self.entry().map(|e| e.3).unwrap_or(StatusKind::Undefined)
    }

    /// Whether an event in this status is allowed to produce a sale record.
    pub fn can_make_sale_record(&self) -> bool {
        self.entry().map(|e| e.4).unwrap_or(false)
    }
}
