//! # Inbound Lifecycle Events
//!
//! Order and refund payloads as they arrive on the order-event channel.
//!
//! ```text
//! Event { entityType, status, payload: OrderEvent }
//!                                        │
//!                     refunds empty? ────┤
//!                       yes              │ no
//!                        ▼               ▼
//!                 order path       refunds[0]: RefundEvent
//! ```
//!
//! Every field defaults so partial payloads decode; validation decides
//! what is actually required.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::distribute::OfferTarget;
use crate::money::Money;
use crate::status::OrderStatus;

/// Envelope delivered by the broker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Event {
    /// Order, Refund, OrderDelivery, RefundDelivery, StockDistribution.
    pub entity_type: String,
    pub status: String,
    pub payload: OrderEvent,
}

impl Event {
    pub fn order_status(&self) -> OrderStatus {
        OrderStatus::from_label(&self.status)
    }

    /// The refund body to process, if this is a refund event.
    ///
    /// An empty `refunds` list means the order path.
    pub fn refund(&self) -> Option<&RefundEvent> {
        self.payload.refunds.first()
    }
}

// =============================================================================
// Order
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrderEvent {
    pub id: i64,
    pub outer_order_no: String,
    pub tenant_code: String,
    pub store_id: i64,
    pub channel_id: i64,
    /// Sales channel, e.g. `POS`.
    pub sale_type: String,
    pub customer_id: i64,
    pub salesman_id: i64,
    pub total_list_price: Money,
    pub total_sale_price: Money,
    pub total_discount_price: Money,
    pub freight_price: Money,
    pub total_payment_price: Money,
    pub mileage: Money,
    pub mileage_price: Money,
    pub obtain_mileage: Money,
    pub cash_price: Money,
    pub is_out_paid: bool,
    pub status: String,
    pub items: Vec<OrderEventItem>,
    pub offers: Vec<OfferEvent>,
    pub refunds: Vec<RefundEvent>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_id: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrderEventItem {
    pub id: i64,
    pub outer_order_item_no: String,
    pub item_code: String,
    pub item_name: String,
    pub item_fee: Money,
    pub fee_rate: f64,
    pub product_id: i64,
    pub sku_id: i64,
    pub sku_img: String,
    pub option: String,
    pub list_price: Money,
    pub sale_price: Money,
    pub quantity: i64,
    pub total_list_price: Money,
    pub total_sale_price: Money,
    pub total_discount_price: Money,
    pub total_payment_price: Money,
    pub mileage: Money,
    pub mileage_price: Money,
    pub obtain_mileage: Money,
    pub cash_price: Money,
    pub status: String,
    pub is_delivery: bool,
    pub is_stock_checked: bool,
    pub group_offers: Vec<GroupOffer>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub total_distributed_cart_offer_price: Money,
}

/// Cart-level offer on an order or refund.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OfferEvent {
    pub offer_no: String,
    pub coupon_no: String,
    pub item_ids: String,
    pub target_item_ids: String,
    pub price: Money,
    pub target_type: String,
}

impl OfferEvent {
    /// Item ids this offer applies to: the target list when present.
    pub fn eligible_ids(&self) -> Vec<i64> {
        let raw = if self.target_item_ids.is_empty() {
            &self.item_ids
        } else {
            &self.target_item_ids
        };
        raw.split(',')
            .filter_map(|id| id.trim().parse().ok())
            .collect()
    }

    pub fn is_gift(&self) -> bool {
        self.target_type == "gift"
    }
}

/// Cart offer share already attached to one item upstream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GroupOffer {
    pub offer_no: String,
    pub coupon_no: String,
    pub target_type: String,
    pub is_target: bool,
    pub price: Money,
}

// =============================================================================
// Refund
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RefundEvent {
    pub id: i64,
    pub outer_order_no: String,
    pub tenant_code: String,
    pub store_id: i64,
    pub channel_id: i64,
    /// Refund channel, same vocabulary as `saleType`.
    pub refund_type: String,
    pub customer_id: i64,
    pub salesman_id: i64,
    pub total_list_price: Money,
    pub total_sale_price: Money,
    pub total_discount_price: Money,
    pub freight_price: Money,
    pub total_refund_price: Money,
    pub mileage: Money,
    pub mileage_price: Money,
    pub obtain_mileage: Money,
    pub cash_price: Money,
    pub status: String,
    pub is_out_paid: bool,
    pub cust_remark: String,
    pub items: Vec<RefundEventItem>,
    pub refund_reason: String,
    pub refuse_reason: String,
    pub offers: Vec<OfferEvent>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_id: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RefundEventItem {
    pub id: i64,
    pub outer_order_item_no: String,
    pub order_item_id: i64,
    pub separate_id: i64,
    pub stock_distribution_item_id: i64,
    pub item_code: String,
    pub item_name: String,
    pub product_id: i64,
    pub sku_id: i64,
    pub sku_img: String,
    pub option: String,
    pub list_price: Money,
    pub sale_price: Money,
    pub quantity: i64,
    pub total_list_price: Money,
    pub total_sale_price: Money,
    pub total_discount_price: Money,
    pub total_refund_price: Money,
    pub mileage: Money,
    pub mileage_price: Money,
    pub obtain_mileage: Money,
    pub cash_price: Money,
    pub total_distributed_cart_offer_price: Money,
    pub item_fee: Money,
    pub fee_rate: f64,
    pub status: String,
    pub is_delivery: bool,
    pub group_offers: Vec<GroupOffer>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Distribution targets
// =============================================================================

impl OfferTarget for OrderEventItem {
    fn match_id(&self) -> i64 {
        self.id
    }
    fn item_code(&self) -> &str {
        &self.item_code
    }
    fn total_list_price(&self) -> Money {
        self.total_list_price
    }
    fn total_sale_price(&self) -> Money {
        self.total_sale_price
    }
    fn cart_offer_share_mut(&mut self) -> &mut Money {
        &mut self.total_distributed_cart_offer_price
    }
}

/// Refund items are matched by the order item they came from.
impl OfferTarget for RefundEventItem {
    fn match_id(&self) -> i64 {
        self.order_item_id
    }
    fn item_code(&self) -> &str {
        &self.item_code
    }
    fn total_list_price(&self) -> Money {
        self.total_list_price
    }
    fn total_sale_price(&self) -> Money {
        self.total_sale_price
    }
    fn cart_offer_share_mut(&mut self) -> &mut Money {
        &mut self.total_distributed_cart_offer_price
    }
}
