//! # Domain Types
//!
//! The sale record aggregate and the audit log row.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Sale Record Aggregate                           │
//! │                                                                         │
//! │  ┌──────────────────────────┐                                          │
//! │  │       SaleRecord         │  one per committed order or refund       │
//! │  │  transaction_id (PK)     │                                          │
//! │  │  order_id / refund_id    │                                          │
//! │  │  totals, split, audit    │                                          │
//! │  └──┬─────────┬─────────┬───┘                                          │
//! │     │         │         │                                              │
//! │     ▼         ▼         ▼                                              │
//! │  lines     cart_offers  payments                                       │
//! │  (SaleRecordLine)  (CartOffer)  (Payment)                              │
//! │     │                                                                   │
//! │     ├──► item_offers (ItemOffer)       item-level promotions           │
//! │     └──► cart_offers (LineCartOffer)   cart promotions on this line    │
//! │                                                                         │
//! │  SaleRecordLog: latest outcome per dedup key (success or failure)      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The aggregate is immutable once committed. Only `transaction_status`
//! may be refreshed when a duplicate event arrives.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::money::Money;

/// Actor recorded on rows created from broker events.
pub const EVENT_ACTOR: &str = "kafka-listener";

// =============================================================================
// Transaction Type
// =============================================================================

/// `PLUS` for sales, `MINUS` for refunds.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "UPPERCASE"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionType {
    #[default]
    Plus,
    Minus,
}

impl TransactionType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Plus => "PLUS",
            TransactionType::Minus => "MINUS",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PLUS" => Ok(TransactionType::Plus),
            "MINUS" => Ok(TransactionType::Minus),
            other => Err(format!("unknown transaction type: {}", other)),
        }
    }
}

/// Which lifecycle produced an offer row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferSource {
    Order,
    Refund,
}

impl OfferSource {
    pub const fn as_str(&self) -> &'static str {
        match self {
            OfferSource::Order => "ORDER",
            OfferSource::Refund => "REFUND",
        }
    }
}

// =============================================================================
// Dedup Key
// =============================================================================

/// Identity of one business transaction.
///
/// ## Lookup Basis
/// - refund id set: by `refund_id`
/// - otherwise: by `order_id` with no refund id
///
/// Both bases also match channel, transaction type and tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub order_id: i64,
    pub refund_id: i64,
    pub channel_type: String,
    pub transaction_type: TransactionType,
    pub tenant_code: String,
}

impl DedupKey {
    /// Key for an order-side transaction.
    pub fn order(order_id: i64, channel_type: &str, tenant_code: &str) -> Self {
        DedupKey {
            order_id,
            refund_id: 0,
            channel_type: channel_type.to_string(),
            transaction_type: TransactionType::Plus,
            tenant_code: tenant_code.to_string(),
        }
    }

    /// Key for a refund-side transaction.
    pub fn refund(order_id: i64, refund_id: i64, channel_type: &str, tenant_code: &str) -> Self {
        DedupKey {
            order_id,
            refund_id,
            channel_type: channel_type.to_string(),
            transaction_type: TransactionType::Minus,
            tenant_code: tenant_code.to_string(),
        }
    }

    /// Whether the lookup goes by refund id. A MINUS key without a refund
    /// id still matches on its order id.
    pub fn is_refund(&self) -> bool {
        self.refund_id > 0
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}/{}/{}/{}",
            self.tenant_code, self.order_id, self.refund_id, self.channel_type, self.transaction_type
        )
    }
}

// =============================================================================
// Sale Record
// =============================================================================

/// A committed (or candidate) sale or refund transaction.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SaleRecord {
    /// Assigned on commit; 0 for a candidate.
    pub transaction_id: i64,
    pub tenant_code: String,
    pub store_id: i64,
    pub channel_id: i64,
    pub order_id: i64,
    pub refund_id: i64,
    pub outer_order_no: String,
    pub customer_id: i64,
    pub emp_id: String,
    pub salesman_id: i64,
    pub salesman_emp_id: String,
    pub salesman_shop_code: String,
    pub is_refund: bool,
    pub is_out_paid: bool,
    pub transaction_type: TransactionType,
    pub transaction_channel_type: String,
    pub transaction_status: String,
    #[ts(as = "String")]
    pub transaction_create_date: DateTime<Utc>,
    #[ts(as = "String")]
    pub transaction_update_date: DateTime<Utc>,
    pub transaction_created_id: i64,

    pub total_list_price: Money,
    pub total_sale_price: Money,
    pub total_discount_price: Money,
    pub total_transaction_price: Money,
    /// Discount that came from offers without a coupon.
    pub discount_offer_price: Money,
    /// Discount that came from coupons.
    pub discount_coupon_price: Money,
    pub freight_price: Money,
    pub cash_price: Money,
    pub mileage: Money,
    pub mileage_price: Money,
    pub obtain_mileage: Money,

    /// Store trim code in force when the record was built.
    pub base_trim_code: String,

    #[ts(as = "String")]
    pub created: DateTime<Utc>,
    pub created_by: String,
    #[ts(as = "String")]
    pub modified: DateTime<Utc>,
    pub modified_by: String,

    #[cfg_attr(feature = "sqlx", sqlx(skip))]
    pub lines: Vec<SaleRecordLine>,
    #[cfg_attr(feature = "sqlx", sqlx(skip))]
    pub cart_offers: Vec<CartOffer>,
    #[cfg_attr(feature = "sqlx", sqlx(skip))]
    pub payments: Vec<Payment>,
}

impl SaleRecord {
    /// Dedup key of this record.
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey {
            order_id: self.order_id,
            refund_id: self.refund_id,
            channel_type: self.transaction_channel_type.clone(),
            transaction_type: self.transaction_type,
            tenant_code: self.tenant_code.clone(),
        }
    }

    /// Sum of line payment totals.
    pub fn lines_transaction_total(&self) -> Money {
        self.lines.iter().map(|l| l.total_transaction_price).sum()
    }
}

/// One sold or refunded item.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SaleRecordLine {
    pub id: i64,
    pub transaction_id: i64,
    pub order_item_id: i64,
    pub refund_item_id: i64,
    pub brand_id: i64,
    pub brand_code: String,
    pub item_code: String,
    pub item_name: String,
    pub product_id: i64,
    pub sku_id: i64,
    pub sku_img: String,
    pub item_fee: Money,
    /// Fee rate with 4 fraction digits. Not money.
    pub fee_rate: f64,
    pub list_price: Money,
    pub sale_price: Money,
    pub quantity: i64,

    pub distributed_cash_price: Money,
    pub total_distributed_cart_offer_price: Money,
    pub total_distributed_item_offer_price: Money,
    pub total_distributed_payment_price: Money,

    pub total_list_price: Money,
    pub total_sale_price: Money,
    pub total_discount_price: Money,
    pub total_transaction_price: Money,
    pub mileage: Money,
    pub mileage_price: Money,
    pub obtain_mileage: Money,
    pub is_delivery: bool,
    pub status: String,

    #[ts(as = "String")]
    pub created: DateTime<Utc>,
    pub created_by: String,
    #[ts(as = "String")]
    pub modified: DateTime<Utc>,
    pub modified_by: String,

    #[cfg_attr(feature = "sqlx", sqlx(skip))]
    pub item_offers: Vec<ItemOffer>,
    #[cfg_attr(feature = "sqlx", sqlx(skip))]
    pub cart_offers: Vec<LineCartOffer>,
}

/// Cart-level offer applied to the transaction.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CartOffer {
    pub id: i64,
    pub transaction_id: i64,
    pub tenant_code: String,
    pub offer_no: String,
    pub coupon_no: String,
    /// Comma separated item ids.
    pub item_ids: String,
    pub target_item_ids: String,
    pub price: Money,
    /// `ORDER` or `REFUND`.
    pub offer_type: String,
    pub target_type: String,
}

/// Share of a cart offer carried by one line.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct LineCartOffer {
    pub id: i64,
    pub transaction_id: i64,
    /// Id of the owning [`SaleRecordLine`].
    pub line_id: i64,
    pub offer_no: String,
    pub coupon_no: String,
    pub offer_type: String,
    pub target_type: String,
    pub is_target: bool,
    pub price: Money,
}

/// Item-level promotion applied to a line.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ItemOffer {
    pub id: i64,
    pub transaction_id: i64,
    /// Id of the owning [`SaleRecordLine`].
    pub line_id: i64,
    pub tenant_code: String,
    pub offer_no: String,
    pub coupon_no: String,
    pub item_code: String,
    pub item_codes: String,
    pub price: Money,
    pub offer_type: String,
    pub target_type: String,
}

/// Settlement entry.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: i64,
    pub transaction_id: i64,
    pub seq_no: i64,
    pub pay_method: String,
    /// Always non-negative; refund rows are stored as absolute values.
    pub pay_amt: Money,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Sale Record Log
// =============================================================================

/// Latest outcome for one dedup key.
///
/// Upserted, never appended: retries of the same transaction converge on
/// a single row holding the most recent attempt.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SaleRecordLog {
    pub id: i64,
    pub tenant_code: String,
    pub channel_type: String,
    pub transaction_type: TransactionType,
    pub order_id: i64,
    pub refund_id: i64,
    pub store_id: i64,
    /// [`crate::ErrorKind`] tag, empty on success.
    pub error_type: String,
    pub error: String,
    pub details: String,
    pub is_success: bool,
    /// JSON snapshot of the event, API input, or committed record.
    pub order_entity: String,
    #[ts(as = "String")]
    pub transaction_create_date: DateTime<Utc>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl SaleRecordLog {
    /// Dedup key this log row belongs to.
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey {
            order_id: self.order_id,
            refund_id: self.refund_id,
            channel_type: self.channel_type.clone(),
            transaction_type: self.transaction_type,
            tenant_code: self.tenant_code.clone(),
        }
    }
}
