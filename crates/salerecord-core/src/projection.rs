//! # Outbound Projection
//!
//! Shapes published on the sale-record and sale-fail channels.
//!
//! ```text
//!   SaleRecord ──project──► SaleRecordEvent ──wrap──► EventEnvelope ──► broker
//!        ▲                        │
//!        └──into_sale_record──────┘   (downstream consumers, round-trip)
//!
//!   SaleRecordLog ──► SaleFailEvent ──wrap──► EventEnvelope ──► broker
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::money::Money;
use crate::types::{
    CartOffer, ItemOffer, LineCartOffer, Payment, SaleRecord, SaleRecordLine, SaleRecordLog,
    TransactionType,
};

// =============================================================================
// Envelope
// =============================================================================

/// Trace wrapper around every published payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope<T> {
    pub request_id: String,
    pub action_id: String,
    pub auth_token: String,
    pub payload: T,
}

impl<T> EventEnvelope<T> {
    /// Wraps a payload with a fresh request id.
    pub fn new(payload: T) -> Self {
        EventEnvelope {
            request_id: Uuid::new_v4().to_string(),
            action_id: String::new(),
            auth_token: String::new(),
            payload,
        }
    }

    pub fn with_action(mut self, action_id: impl Into<String>) -> Self {
        self.action_id = action_id.into();
        self
    }
}

// =============================================================================
// Sale Record Event
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct TotalPriceEvent {
    pub list_price: Money,
    pub sale_price: Money,
    pub discount_price: Money,
    pub transaction_price: Money,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct DistributedPriceEvent {
    pub total_distributed_item_offer_price: Money,
    pub total_distributed_cart_offer_price: Money,
    pub total_distributed_payment_price: Money,
    pub distributed_cash_price: Money,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CommittedEvent {
    #[ts(as = "String")]
    pub created: DateTime<Utc>,
    pub created_by: String,
    #[ts(as = "String")]
    pub modified: DateTime<Utc>,
    pub modified_by: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CartOfferEvent {
    pub offer_id: i64,
    pub offer_no: String,
    pub coupon_no: String,
    pub item_ids: String,
    pub target_item_ids: String,
    pub price: Money,
    #[serde(rename = "type")]
    pub offer_type: String,
    pub target_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ItemOfferEvent {
    pub offer_id: i64,
    pub offer_no: String,
    pub coupon_no: String,
    pub item_codes: String,
    pub item_code: String,
    pub price: Money,
    #[serde(rename = "type")]
    pub offer_type: String,
    pub target_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ItemCartOfferEvent {
    pub id: i64,
    pub offer_no: String,
    pub coupon_no: String,
    pub target_type: String,
    pub is_target: bool,
    pub price: Money,
    #[serde(rename = "type")]
    pub offer_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PaymentEvent {
    pub id: i64,
    pub seq_no: i64,
    pub pay_method: String,
    pub pay_amt: Money,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SaleRecordDtlEvent {
    pub id: i64,
    pub order_item_id: i64,
    pub refund_item_id: i64,
    pub brand_id: i64,
    pub brand_code: String,
    pub item_code: String,
    pub item_name: String,
    pub product_id: i64,
    pub sku_id: i64,
    pub sku_img: String,
    pub list_price: Money,
    pub sale_price: Money,
    pub quantity: i64,
    pub mileage: Money,
    pub mileage_price: Money,
    pub obtain_mileage: Money,
    pub is_delivery: bool,
    pub total_price: TotalPriceEvent,
    pub distributed_price: DistributedPriceEvent,
    pub status: String,
    pub item_fee: Money,
    pub fee_rate: f64,
    pub item_offers: Vec<ItemOfferEvent>,
    pub cart_offers: Vec<ItemCartOfferEvent>,
    pub committed: CommittedEvent,
}

/// Published once per committed (or republished) sale record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SaleRecordEvent {
    pub transaction_id: i64,
    pub assorted_sale_record_dtl_list: Vec<SaleRecordDtlEvent>,
    pub tenant_code: String,
    pub store_id: i64,
    pub channel_id: i64,
    pub order_id: i64,
    pub outer_order_no: String,
    pub refund_id: i64,
    pub transaction_type: TransactionType,
    pub transaction_channel_type: String,
    pub transaction_status: String,
    #[ts(as = "String")]
    pub transaction_create_date: DateTime<Utc>,
    #[ts(as = "String")]
    pub transaction_update_date: DateTime<Utc>,
    pub transaction_created_id: i64,
    pub customer_id: i64,
    pub emp_id: String,
    pub salesman_id: i64,
    pub salesman_emp_id: String,
    pub salesman_shop_code: String,
    pub total_price: TotalPriceEvent,
    pub discount_offer_price: Money,
    pub discount_coupon_price: Money,
    pub freight_price: Money,
    pub mileage: Money,
    pub mileage_price: Money,
    pub obtain_mileage: Money,
    pub cash_price: Money,
    pub is_out_paid: bool,
    pub cart_offers: Vec<CartOfferEvent>,
    pub committed: CommittedEvent,
    #[ts(as = "String")]
    pub order_created: DateTime<Utc>,
    pub base_trim_code: String,
    pub payments: Vec<PaymentEvent>,
}

impl From<&SaleRecordLine> for SaleRecordDtlEvent {
    fn from(line: &SaleRecordLine) -> Self {
        SaleRecordDtlEvent {
            id: line.id,
            order_item_id: line.order_item_id,
            refund_item_id: line.refund_item_id,
            brand_id: line.brand_id,
            brand_code: line.brand_code.clone(),
            item_code: line.item_code.clone(),
            item_name: line.item_name.clone(),
            product_id: line.product_id,
            sku_id: line.sku_id,
            sku_img: line.sku_img.clone(),
            list_price: line.list_price,
            sale_price: line.sale_price,
            quantity: line.quantity,
            mileage: line.mileage,
            mileage_price: line.mileage_price,
            obtain_mileage: line.obtain_mileage,
            is_delivery: line.is_delivery,
            total_price: TotalPriceEvent {
                list_price: line.total_list_price,
                sale_price: line.total_sale_price,
                discount_price: line.total_discount_price,
                transaction_price: line.total_transaction_price,
            },
            distributed_price: DistributedPriceEvent {
                total_distributed_item_offer_price: line.total_distributed_item_offer_price,
                total_distributed_cart_offer_price: line.total_distributed_cart_offer_price,
                total_distributed_payment_price: line.total_distributed_payment_price,
                distributed_cash_price: line.distributed_cash_price,
            },
            status: line.status.clone(),
            item_fee: line.item_fee,
            fee_rate: line.fee_rate,
            item_offers: line
                .item_offers
                .iter()
                .map(|o| ItemOfferEvent {
                    offer_id: o.id,
                    offer_no: o.offer_no.clone(),
                    coupon_no: o.coupon_no.clone(),
                    item_codes: o.item_codes.clone(),
                    item_code: o.item_code.clone(),
                    price: o.price,
                    offer_type: o.offer_type.clone(),
                    target_type: o.target_type.clone(),
                })
                .collect(),
            cart_offers: line
                .cart_offers
                .iter()
                .map(|o| ItemCartOfferEvent {
                    id: o.id,
                    offer_no: o.offer_no.clone(),
                    coupon_no: o.coupon_no.clone(),
                    target_type: o.target_type.clone(),
                    is_target: o.is_target,
                    price: o.price,
                    offer_type: o.offer_type.clone(),
                })
                .collect(),
            committed: CommittedEvent {
                created: line.created,
                created_by: line.created_by.clone(),
                modified: line.modified,
                modified_by: line.modified_by.clone(),
            },
        }
    }
}

impl From<&SaleRecord> for SaleRecordEvent {
    fn from(record: &SaleRecord) -> Self {
        SaleRecordEvent {
            transaction_id: record.transaction_id,
            assorted_sale_record_dtl_list: record.lines.iter().map(SaleRecordDtlEvent::from).collect(),
            tenant_code: record.tenant_code.clone(),
            store_id: record.store_id,
            channel_id: record.channel_id,
            order_id: record.order_id,
            outer_order_no: record.outer_order_no.clone(),
            refund_id: record.refund_id,
            transaction_type: record.transaction_type,
            transaction_channel_type: record.transaction_channel_type.clone(),
            transaction_status: record.transaction_status.clone(),
            transaction_create_date: record.transaction_create_date,
            transaction_update_date: record.transaction_update_date,
            transaction_created_id: record.transaction_created_id,
            customer_id: record.customer_id,
            emp_id: record.emp_id.clone(),
            salesman_id: record.salesman_id,
            salesman_emp_id: record.salesman_emp_id.clone(),
            salesman_shop_code: record.salesman_shop_code.clone(),
            total_price: TotalPriceEvent {
                list_price: record.total_list_price,
                sale_price: record.total_sale_price,
                discount_price: record.total_discount_price,
                transaction_price: record.total_transaction_price,
            },
            discount_offer_price: record.discount_offer_price,
            discount_coupon_price: record.discount_coupon_price,
            freight_price: record.freight_price,
            mileage: record.mileage,
            mileage_price: record.mileage_price,
            obtain_mileage: record.obtain_mileage,
            cash_price: record.cash_price,
            is_out_paid: record.is_out_paid,
            cart_offers: record
                .cart_offers
                .iter()
                .map(|o| CartOfferEvent {
                    offer_id: o.id,
                    offer_no: o.offer_no.clone(),
                    coupon_no: o.coupon_no.clone(),
                    item_ids: o.item_ids.clone(),
                    target_item_ids: o.target_item_ids.clone(),
                    price: o.price,
                    offer_type: o.offer_type.clone(),
                    target_type: o.target_type.clone(),
                })
                .collect(),
            committed: CommittedEvent {
                created: record.created,
                created_by: record.created_by.clone(),
                modified: record.modified,
                modified_by: record.modified_by.clone(),
            },
            order_created: record.transaction_create_date,
            base_trim_code: record.base_trim_code.clone(),
            payments: record
                .payments
                .iter()
                .map(|p| PaymentEvent {
                    id: p.id,
                    seq_no: p.seq_no,
                    pay_method: p.pay_method.clone(),
                    pay_amt: p.pay_amt,
                    created_at: p.created_at,
                })
                .collect(),
        }
    }
}

impl SaleRecordEvent {
    /// Rebuilds the aggregate from its published shape.
    pub fn into_sale_record(self) -> SaleRecord {
        let transaction_id = self.transaction_id;
        let tenant_code = self.tenant_code;

        let lines = self
            .assorted_sale_record_dtl_list
            .into_iter()
            .map(|dtl| {
                let line_id = dtl.id;
                SaleRecordLine {
                    id: line_id,
                    transaction_id,
                    order_item_id: dtl.order_item_id,
                    refund_item_id: dtl.refund_item_id,
                    brand_id: dtl.brand_id,
                    brand_code: dtl.brand_code,
                    item_code: dtl.item_code,
                    item_name: dtl.item_name,
                    product_id: dtl.product_id,
                    sku_id: dtl.sku_id,
                    sku_img: dtl.sku_img,
                    item_fee: dtl.item_fee,
                    fee_rate: dtl.fee_rate,
                    list_price: dtl.list_price,
                    sale_price: dtl.sale_price,
                    quantity: dtl.quantity,
                    distributed_cash_price: dtl.distributed_price.distributed_cash_price,
                    total_distributed_cart_offer_price: dtl
                        .distributed_price
                        .total_distributed_cart_offer_price,
                    total_distributed_item_offer_price: dtl
                        .distributed_price
                        .total_distributed_item_offer_price,
                    total_distributed_payment_price: dtl.distributed_price.total_distributed_payment_price,
                    total_list_price: dtl.total_price.list_price,
                    total_sale_price: dtl.total_price.sale_price,
                    total_discount_price: dtl.total_price.discount_price,
                    total_transaction_price: dtl.total_price.transaction_price,
                    mileage: dtl.mileage,
                    mileage_price: dtl.mileage_price,
                    obtain_mileage: dtl.obtain_mileage,
                    is_delivery: dtl.is_delivery,
                    status: dtl.status,
                    created: dtl.committed.created,
                    created_by: dtl.committed.created_by,
                    modified: dtl.committed.modified,
                    modified_by: dtl.committed.modified_by,
                    item_offers: dtl
                        .item_offers
                        .into_iter()
                        .map(|o| ItemOffer {
                            id: o.offer_id,
                            transaction_id,
                            line_id,
                            tenant_code: tenant_code.clone(),
                            offer_no: o.offer_no,
                            coupon_no: o.coupon_no,
                            item_code: o.item_code,
                            item_codes: o.item_codes,
                            price: o.price,
                            offer_type: o.offer_type,
                            target_type: o.target_type,
                        })
                        .collect(),
                    cart_offers: dtl
                        .cart_offers
                        .into_iter()
                        .map(|o| LineCartOffer {
                            id: o.id,
                            transaction_id,
                            line_id,
                            offer_no: o.offer_no,
                            coupon_no: o.coupon_no,
                            offer_type: o.offer_type,
                            target_type: o.target_type,
                            is_target: o.is_target,
                            price: o.price,
                        })
                        .collect(),
                }
            })
            .collect();

        let cart_offers = self
            .cart_offers
            .into_iter()
            .map(|o| CartOffer {
                id: o.offer_id,
                transaction_id,
                tenant_code: tenant_code.clone(),
                offer_no: o.offer_no,
                coupon_no: o.coupon_no,
                item_ids: o.item_ids,
                target_item_ids: o.target_item_ids,
                price: o.price,
                offer_type: o.offer_type,
                target_type: o.target_type,
            })
            .collect();

        let payments = self
            .payments
            .into_iter()
            .map(|p| Payment {
                id: p.id,
                transaction_id,
                seq_no: p.seq_no,
                pay_method: p.pay_method,
                pay_amt: p.pay_amt,
                created_at: p.created_at,
            })
            .collect();

        SaleRecord {
            transaction_id,
            tenant_code,
            store_id: self.store_id,
            channel_id: self.channel_id,
            order_id: self.order_id,
            refund_id: self.refund_id,
            outer_order_no: self.outer_order_no,
            customer_id: self.customer_id,
            emp_id: self.emp_id,
            salesman_id: self.salesman_id,
            salesman_emp_id: self.salesman_emp_id,
            salesman_shop_code: self.salesman_shop_code,
            is_refund: self.refund_id != 0,
            is_out_paid: self.is_out_paid,
            transaction_type: self.transaction_type,
            transaction_channel_type: self.transaction_channel_type,
            transaction_status: self.transaction_status,
            transaction_create_date: self.transaction_create_date,
            transaction_update_date: self.transaction_update_date,
            transaction_created_id: self.transaction_created_id,
            total_list_price: self.total_price.list_price,
            total_sale_price: self.total_price.sale_price,
            total_discount_price: self.total_price.discount_price,
            total_transaction_price: self.total_price.transaction_price,
            discount_offer_price: self.discount_offer_price,
            discount_coupon_price: self.discount_coupon_price,
            freight_price: self.freight_price,
            cash_price: self.cash_price,
            mileage: self.mileage,
            mileage_price: self.mileage_price,
            obtain_mileage: self.obtain_mileage,
            base_trim_code: self.base_trim_code,
            created: self.committed.created,
            created_by: self.committed.created_by,
            modified: self.committed.modified,
            modified_by: self.committed.modified_by,
            lines,
            cart_offers,
            payments,
        }
    }
}

// =============================================================================
// Sale Fail Event
// =============================================================================

/// Published when an event-sourced transaction is rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SaleFailEvent {
    pub id: i64,
    pub tenant_code: String,
    pub channel_type: String,
    pub order_id: i64,
    pub refund_id: i64,
    pub store_id: i64,
    pub error_type: String,
    pub error: String,
    pub is_success: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl From<&SaleRecordLog> for SaleFailEvent {
    fn from(log: &SaleRecordLog) -> Self {
        SaleFailEvent {
            id: log.id,
            tenant_code: log.tenant_code.clone(),
            channel_type: log.channel_type.clone(),
            order_id: log.order_id,
            refund_id: log.refund_id,
            store_id: log.store_id,
            error_type: log.error_type.clone(),
            error: log.error.clone(),
            is_success: log.is_success,
            created_at: log.created_at,
            updated_at: log.updated_at,
        }
    }
}
