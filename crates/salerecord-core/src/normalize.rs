//! # Event Normalizer
//!
//! Turns an order or refund event into a candidate [`SaleRecord`].
//!
//! ## Data Flow
//! ```text
//!   service (I/O, sequential)               core (this module, pure)
//!   ─────────────────────────               ─────────────────────────
//!   store      → RoundingSetting ─┐
//!   item/{code} per line          ├──► NormalizeContext ──► normalize_order
//!   payments by order/refund id   │                     └─► normalize_refund
//!   coupon → member (orders)      ┘                              │
//!                                                                ▼
//!                                                   SaleRecord (not yet saved)
//! ```
//!
//! ## Line Identities
//! ```text
//!   distributedCashPrice           = payment - cartOfferShare - mileagePrice
//!   totalDistributedItemOfferPrice = list - sale
//!   totalDistributedPaymentPrice   = payment - cartOfferShare
//! ```
//! `payment` is `totalPaymentPrice` for orders and `totalRefundPrice` for
//! refunds. A negative cash or payment share rejects the whole transaction.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::distribute::distribute_cart_offers;
use crate::error::{CoreError, CoreResult, ErrorKind};
use crate::event::{GroupOffer, OfferEvent, OrderEvent, RefundEvent};
use crate::lookup::{Item, PaymentRow};
use crate::money::Money;
use crate::rounding::RoundingSetting;
use crate::types::{
    CartOffer, ItemOffer, LineCartOffer, OfferSource, Payment, SaleRecord, SaleRecordLine,
    TransactionType, EVENT_ACTOR,
};

/// Everything the normalizer needs from the outside world.
#[derive(Debug, Clone)]
pub struct NormalizeContext {
    pub rounding: RoundingSetting,
    /// Catalog items keyed by item code.
    pub items: HashMap<String, Item>,
    pub payments: Vec<PaymentRow>,
    /// Employee number from the coupon walk (orders only).
    pub emp_id: String,
    pub now: DateTime<Utc>,
    /// Recompute cart offer shares instead of trusting the payload.
    pub redistribute: bool,
}

impl NormalizeContext {
    fn item(&self, code: &str) -> CoreResult<&Item> {
        self.items.get(code).ok_or_else(|| CoreError::ItemNotResolved {
            item_code: code.to_string(),
        })
    }

    fn payments(&self) -> CoreResult<Vec<Payment>> {
        if self.payments.is_empty() {
            return Err(ErrorKind::PayMentNotExist.into());
        }
        Ok(self
            .payments
            .iter()
            .map(|row| Payment {
                seq_no: row.seq_no,
                pay_method: row.pay_method.clone(),
                pay_amt: row.pay_amt.abs(),
                created_at: row.created_at.unwrap_or(self.now),
                ..Payment::default()
            })
            .collect())
    }
}

/// Coupon numbers to try, in order, when resolving the employee id.
///
/// Empty when the order has no customer.
pub fn coupon_candidates(order: &OrderEvent) -> Vec<&str> {
    if order.customer_id <= 0 {
        return Vec::new();
    }
    order
        .offers
        .iter()
        .map(|o| o.coupon_no.as_str())
        .filter(|c| !c.is_empty())
        .collect()
}

/// (offer discount, coupon discount) split of the cart offers.
fn discount_split(offers: &[OfferEvent]) -> (Money, Money) {
    offers.iter().fold((Money::zero(), Money::zero()), |(offer, coupon), o| {
        if o.coupon_no.is_empty() {
            (offer + o.price, coupon)
        } else {
            (offer, coupon + o.price)
        }
    })
}

fn cart_offers(offers: &[OfferEvent], tenant_code: &str, source: OfferSource) -> Vec<CartOffer> {
    offers
        .iter()
        .map(|o| CartOffer {
            tenant_code: tenant_code.to_string(),
            offer_no: o.offer_no.clone(),
            coupon_no: o.coupon_no.clone(),
            item_ids: o.item_ids.clone(),
            target_item_ids: o.target_item_ids.clone(),
            price: o.price,
            offer_type: source.as_str().to_string(),
            target_type: o.target_type.clone(),
            ..CartOffer::default()
        })
        .collect()
}

fn line_cart_offers(group_offers: &[GroupOffer], source: OfferSource) -> Vec<LineCartOffer> {
    group_offers
        .iter()
        .map(|g| LineCartOffer {
            offer_no: g.offer_no.clone(),
            coupon_no: g.coupon_no.clone(),
            offer_type: source.as_str().to_string(),
            target_type: g.target_type.clone(),
            is_target: g.is_target,
            price: g.price,
            ..LineCartOffer::default()
        })
        .collect()
}

fn item_offers(
    item: &Item,
    item_code: &str,
    line_discount: Money,
    tenant_code: &str,
    source: OfferSource,
) -> Vec<ItemOffer> {
    match &item.offer {
        Some(offer) if !line_discount.is_zero() => vec![ItemOffer {
            tenant_code: tenant_code.to_string(),
            offer_no: offer.no.clone(),
            item_code: item_code.to_string(),
            item_codes: item_code.to_string(),
            price: offer.discount_price,
            offer_type: source.as_str().to_string(),
            ..ItemOffer::default()
        }],
        _ => Vec::new(),
    }
}

/// Fills the distributed breakdown and rejects negative shares.
fn apply_distribution(line: &mut SaleRecordLine, payment: Money, cart_share: Money) -> CoreResult<()> {
    line.total_distributed_cart_offer_price = cart_share;
    line.distributed_cash_price = payment - cart_share - line.mileage_price;
    line.total_distributed_item_offer_price = line.total_list_price - line.total_sale_price;
    line.total_distributed_payment_price = payment - cart_share;

    if line.distributed_cash_price.is_negative() {
        return Err(ErrorKind::DistributedCashPrice.into());
    }
    if line.total_distributed_payment_price.is_negative() {
        return Err(ErrorKind::TotalDistributedPaymentPrice.into());
    }
    Ok(())
}

// =============================================================================
// Order
// =============================================================================

/// Builds the candidate record of an order event.
pub fn normalize_order(order: &OrderEvent, ctx: &NormalizeContext) -> CoreResult<SaleRecord> {
    let mut items = order.items.clone();
    if ctx.redistribute {
        distribute_cart_offers(&mut items, &order.offers, &ctx.rounding.spec);
    }

    let mut lines = Vec::with_capacity(items.len());
    for event_item in &items {
        let item = ctx.item(&event_item.item_code)?;
        let brand = &item.sku.product.brand;

        let mut line = SaleRecordLine {
            order_item_id: event_item.id,
            brand_id: brand.id,
            brand_code: brand.code.clone(),
            item_code: event_item.item_code.clone(),
            item_name: event_item.item_name.clone(),
            product_id: event_item.product_id,
            sku_id: event_item.sku_id,
            sku_img: event_item.sku_img.clone(),
            item_fee: event_item.item_fee,
            fee_rate: event_item.fee_rate,
            list_price: event_item.list_price,
            sale_price: event_item.sale_price,
            quantity: event_item.quantity,
            total_list_price: event_item.total_list_price,
            total_sale_price: event_item.total_sale_price,
            total_discount_price: event_item.total_discount_price,
            total_transaction_price: event_item.total_payment_price,
            mileage: event_item.mileage,
            mileage_price: event_item.mileage_price,
            obtain_mileage: event_item.obtain_mileage,
            is_delivery: event_item.is_delivery,
            status: event_item.status.clone(),
            created: event_item.created_at,
            created_by: EVENT_ACTOR.to_string(),
            modified: event_item.updated_at,
            modified_by: EVENT_ACTOR.to_string(),
            item_offers: item_offers(
                item,
                &event_item.item_code,
                event_item.total_discount_price,
                &order.tenant_code,
                OfferSource::Order,
            ),
            cart_offers: line_cart_offers(&event_item.group_offers, OfferSource::Order),
            ..SaleRecordLine::default()
        };
        apply_distribution(
            &mut line,
            event_item.total_payment_price,
            event_item.total_distributed_cart_offer_price,
        )?;
        lines.push(line);
    }

    let payments = ctx.payments()?;
    let (discount_offer_price, discount_coupon_price) = discount_split(&order.offers);

    Ok(SaleRecord {
        tenant_code: order.tenant_code.clone(),
        store_id: order.store_id,
        channel_id: order.channel_id,
        order_id: order.id,
        refund_id: 0,
        outer_order_no: order.outer_order_no.clone(),
        customer_id: order.customer_id,
        emp_id: ctx.emp_id.clone(),
        salesman_id: order.salesman_id,
        is_refund: false,
        is_out_paid: order.is_out_paid,
        transaction_type: TransactionType::Plus,
        transaction_channel_type: order.sale_type.clone(),
        transaction_status: order.status.clone(),
        transaction_create_date: order.created_at,
        transaction_update_date: order.created_at,
        transaction_created_id: order.created_id,
        total_list_price: order.total_list_price,
        total_sale_price: order.total_sale_price,
        total_discount_price: order.total_discount_price,
        total_transaction_price: order.total_payment_price,
        discount_offer_price,
        discount_coupon_price,
        freight_price: order.freight_price,
        cash_price: order.cash_price,
        mileage: order.mileage,
        mileage_price: order.mileage_price,
        obtain_mileage: order.obtain_mileage,
        base_trim_code: ctx.rounding.trim_code.clone(),
        created: ctx.now,
        created_by: EVENT_ACTOR.to_string(),
        modified: ctx.now,
        modified_by: EVENT_ACTOR.to_string(),
        lines,
        cart_offers: cart_offers(&order.offers, &order.tenant_code, OfferSource::Order),
        payments,
        ..SaleRecord::default()
    })
}

// =============================================================================
// Refund
// =============================================================================

/// Builds the candidate record of a refund event.
///
/// `order_id` is the originating order, kept on the record for tracing.
pub fn normalize_refund(order_id: i64, refund: &RefundEvent, ctx: &NormalizeContext) -> CoreResult<SaleRecord> {
    let mut items = refund.items.clone();
    if ctx.redistribute {
        distribute_cart_offers(&mut items, &refund.offers, &ctx.rounding.spec);
    }

    let mut lines = Vec::with_capacity(items.len());
    for event_item in &items {
        let item = ctx.item(&event_item.item_code)?;
        let product = &item.sku.product;

        let mut line = SaleRecordLine {
            order_item_id: event_item.order_item_id,
            refund_item_id: event_item.id,
            brand_id: product.brand.id,
            brand_code: product.brand.code.clone(),
            item_code: event_item.item_code.clone(),
            item_name: event_item.item_name.clone(),
            product_id: product.id,
            sku_id: event_item.sku_id,
            sku_img: event_item.sku_img.clone(),
            fee_rate: event_item.fee_rate,
            list_price: product.list_price,
            sale_price: item.sale_price,
            quantity: event_item.quantity,
            total_list_price: event_item.total_list_price,
            total_sale_price: event_item.total_sale_price,
            total_discount_price: event_item.total_discount_price,
            total_transaction_price: event_item.total_refund_price,
            mileage: event_item.mileage,
            mileage_price: event_item.mileage_price,
            obtain_mileage: event_item.obtain_mileage,
            is_delivery: event_item.is_delivery,
            status: event_item.status.clone(),
            created: event_item.created_at,
            created_by: EVENT_ACTOR.to_string(),
            modified: event_item.updated_at,
            modified_by: EVENT_ACTOR.to_string(),
            item_offers: item_offers(
                item,
                &event_item.item_code,
                event_item.total_discount_price,
                &refund.tenant_code,
                OfferSource::Refund,
            ),
            cart_offers: line_cart_offers(&event_item.group_offers, OfferSource::Refund),
            ..SaleRecordLine::default()
        };
        apply_distribution(
            &mut line,
            event_item.total_refund_price,
            event_item.total_distributed_cart_offer_price,
        )?;
        lines.push(line);
    }

    let payments = ctx.payments()?;
    let (discount_offer_price, discount_coupon_price) = discount_split(&refund.offers);
    let actor = refund.salesman_id.to_string();

    Ok(SaleRecord {
        tenant_code: refund.tenant_code.clone(),
        store_id: refund.store_id,
        channel_id: refund.channel_id,
        order_id,
        refund_id: refund.id,
        outer_order_no: refund.outer_order_no.clone(),
        customer_id: refund.customer_id,
        salesman_id: refund.salesman_id,
        is_refund: true,
        is_out_paid: refund.is_out_paid,
        transaction_type: TransactionType::Minus,
        transaction_channel_type: refund.refund_type.clone(),
        transaction_status: refund.status.clone(),
        transaction_create_date: refund.created_at,
        transaction_update_date: refund.created_at,
        transaction_created_id: refund.created_id,
        total_list_price: refund.total_list_price,
        total_sale_price: refund.total_sale_price,
        total_discount_price: refund.total_discount_price,
        total_transaction_price: refund.total_refund_price,
        discount_offer_price,
        discount_coupon_price,
        freight_price: refund.freight_price,
        cash_price: refund.cash_price,
        mileage: refund.mileage,
        mileage_price: refund.mileage_price,
        obtain_mileage: refund.obtain_mileage,
        base_trim_code: ctx.rounding.trim_code.clone(),
        created: ctx.now,
        created_by: actor.clone(),
        modified: ctx.now,
        modified_by: actor,
        lines,
        cart_offers: cart_offers(&refund.offers, &refund.tenant_code, OfferSource::Refund),
        payments,
        ..SaleRecord::default()
    })
}
