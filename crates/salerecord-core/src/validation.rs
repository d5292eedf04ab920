//! # Validation
//!
//! Price identity and referential checks run before a record is committed.
//!
//! ## Rule Sets
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Validation Call Sites                             │
//! │                                                                         │
//! │  API input (in order, first failure wins)                              │
//! │  ├── 1. Σ line totals == header totals           TotalPrice            │
//! │  ├── 2. createdId != 0                           CreatedId             │
//! │  ├── 3. discount == list - payment               DiscountPrice         │
//! │  ├── 4. discount > 0 ⇒ offers cover it           OfferNo / ...Offer    │
//! │  ├── 5. store exists, brands enabled             StoreNotExist / Brand │
//! │  └── 6. sku exists, price/product/brand agree    Sku* / Product*       │
//! │                                                                         │
//! │  Order / refund events                                                  │
//! │  ├── createdId != 0                              CreatedId             │
//! │  ├── POS ⇒ salesmanId != 0                       POSSalesmanId         │
//! │  ├── storeId != 0                                StoreId               │
//! │  ├── every item feeRate != 0                     ItemFeeRate           │
//! │  └── Σ item mileage(/price) == header            Mileage               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Rules 5 and 6 need remote data. The service fetches it in rule order and
//! hands it to [`check_store_brands`] and [`check_sku`]. Everything here is
//! read-only.

use crate::error::{CoreResult, ErrorKind};
use crate::event::{OrderEvent, RefundEvent};
use crate::input::{SaleRecordDtlInput, SaleRecordInput};
use crate::lookup::{Sku, Store};
use crate::money::Money;

/// Channel on which a salesman is mandatory.
pub const POS_CHANNEL: &str = "POS";

// =============================================================================
// API Input
// =============================================================================

/// Rules 1 to 4: the pure monetary identities of an API submission.
pub fn validate_input_totals(input: &SaleRecordInput) -> CoreResult<()> {
    let lines = &input.sale_record_dtl_inputs;
    let payment: Money = lines.iter().map(|l| l.total_payment_price).sum();
    let discount: Money = lines.iter().map(|l| l.total_discount_price).sum();
    let list: Money = lines.iter().map(|l| l.total_list_price).sum();

    if payment != input.total_payment_price
        || discount != input.total_discount_price
        || list != input.total_list_price
    {
        return Err(ErrorKind::TotalPrice.into());
    }

    if input.created_id == 0 {
        return Err(ErrorKind::CreatedId.into());
    }

    if discount != list - payment {
        return Err(ErrorKind::DiscountPrice.into());
    }

    if discount.is_positive() {
        let offers = &input.sale_record_cart_offers;
        if offers.is_empty() {
            return Err(ErrorKind::DiscountPriceNotMatchOffer.into());
        }
        if offers.iter().any(|o| o.offer_no.is_empty()) {
            return Err(ErrorKind::OfferNo.into());
        }
        let offered: Money = offers.iter().map(|o| o.price).sum();
        if offered != discount {
            return Err(ErrorKind::DiscountPriceNotMatchOffer.into());
        }
    }

    Ok(())
}

/// Rule 5: the store exists and carries every line's brand.
pub fn check_store_brands(input: &SaleRecordInput, store: Option<&Store>) -> CoreResult<()> {
    let store = store.ok_or(ErrorKind::StoreNotExist)?;
    for line in &input.sale_record_dtl_inputs {
        if !store.has_brand(line.brand_id, &line.brand_code) {
            return Err(ErrorKind::BrandNotMatch.into());
        }
    }
    Ok(())
}

/// Rule 6 for one line: the sku exists and agrees with the line.
pub fn check_sku(line: &SaleRecordDtlInput, sku: Option<&Sku>) -> CoreResult<()> {
    let sku = sku.ok_or(ErrorKind::SkuNotExist)?;
    let product = &sku.product;
    if product.list_price != line.list_price {
        return Err(ErrorKind::SkuListPrice.into());
    }
    if product.id != line.product_id {
        return Err(ErrorKind::ProductNotMatch.into());
    }
    if product.brand.code != line.brand_code {
        return Err(ErrorKind::ProductBrand.into());
    }
    Ok(())
}

// =============================================================================
// Events
// =============================================================================

struct EventHeader<'a> {
    created_id: i64,
    channel: &'a str,
    salesman_id: i64,
    store_id: i64,
    mileage: Money,
    mileage_price: Money,
}

fn validate_event<I>(header: EventHeader<'_>, items: I) -> CoreResult<()>
where
    I: IntoIterator<Item = (f64, Money, Money)>,
{
    if header.created_id == 0 {
        return Err(ErrorKind::CreatedId.into());
    }
    if header.channel == POS_CHANNEL && header.salesman_id == 0 {
        return Err(ErrorKind::PosSalesmanId.into());
    }
    if header.store_id == 0 {
        return Err(ErrorKind::StoreId.into());
    }

    let mut mileage = header.mileage;
    let mut mileage_price = header.mileage_price;
    for (fee_rate, item_mileage, item_mileage_price) in items {
        if fee_rate == 0.0 {
            return Err(ErrorKind::ItemFeeRate.into());
        }
        mileage -= item_mileage;
        mileage_price -= item_mileage_price;
    }
    if !mileage.is_zero() || !mileage_price.is_zero() {
        return Err(ErrorKind::Mileage.into());
    }
    Ok(())
}

pub fn validate_order_event(order: &OrderEvent) -> CoreResult<()> {
    validate_event(
        EventHeader {
            created_id: order.created_id,
            channel: &order.sale_type,
            salesman_id: order.salesman_id,
            store_id: order.store_id,
            mileage: order.mileage,
            mileage_price: order.mileage_price,
        },
        order
            .items
            .iter()
            .map(|i| (i.fee_rate, i.mileage, i.mileage_price)),
    )
}

pub fn validate_refund_event(refund: &RefundEvent) -> CoreResult<()> {
    validate_event(
        EventHeader {
            created_id: refund.created_id,
            channel: &refund.refund_type,
            salesman_id: refund.salesman_id,
            store_id: refund.store_id,
            mileage: refund.mileage,
            mileage_price: refund.mileage_price,
        },
        refund
            .items
            .iter()
            .map(|i| (i.fee_rate, i.mileage, i.mileage_price)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::event::{OrderEventItem, RefundEventItem};
    use crate::input::SaleRecordCartOffer;
    use crate::lookup::{Brand, Product, StoreBrand};

    fn m(cents: i64) -> Money {
        Money::from_cents(cents)
    }

    fn line(list: i64, discount: i64, payment: i64) -> SaleRecordDtlInput {
        SaleRecordDtlInput {
            brand_id: 3,
            brand_code: "NK".into(),
            product_id: 55,
            sku_id: 1,
            list_price: m(list),
            total_list_price: m(list),
            total_discount_price: m(discount),
            total_payment_price: m(payment),
            ..SaleRecordDtlInput::default()
        }
    }

    fn input() -> SaleRecordInput {
        SaleRecordInput {
            store_id: 5,
            created_id: 7,
            total_list_price: m(15000),
            total_discount_price: m(3000),
            total_payment_price: m(12000),
            sale_record_dtl_inputs: vec![line(10000, 2000, 8000), line(5000, 1000, 4000)],
            sale_record_cart_offers: vec![SaleRecordCartOffer {
                offer_no: "OF-1".into(),
                order_item_ids: "1,2".into(),
                price: m(3000),
            }],
            ..SaleRecordInput::default()
        }
    }

    fn rule(result: CoreResult<()>) -> ErrorKind {
        match result {
            Err(CoreError::Rule(kind)) => kind,
            other => panic!("expected rule error, got {:?}", other),
        }
    }

    #[test]
    fn test_balanced_input_passes() {
        assert!(validate_input_totals(&input()).is_ok());
    }

    #[test]
    fn test_one_cent_off_is_total_price() {
        let mut i = input();
        i.total_list_price = m(15001);
        assert_eq!(rule(validate_input_totals(&i)), ErrorKind::TotalPrice);

        let mut i = input();
        i.total_discount_price = m(2999);
        assert_eq!(rule(validate_input_totals(&i)), ErrorKind::TotalPrice);

        let mut i = input();
        i.total_payment_price = m(12001);
        assert_eq!(rule(validate_input_totals(&i)), ErrorKind::TotalPrice);
    }

    #[test]
    fn test_created_id_required() {
        let mut i = input();
        i.created_id = 0;
        assert_eq!(rule(validate_input_totals(&i)), ErrorKind::CreatedId);
    }

    #[test]
    fn test_discount_identity() {
        let mut i = input();
        // Sums agree with the header but list - payment != discount.
        i.sale_record_dtl_inputs = vec![line(10000, 1000, 8000)];
        i.total_list_price = m(10000);
        i.total_discount_price = m(1000);
        i.total_payment_price = m(8000);
        assert_eq!(rule(validate_input_totals(&i)), ErrorKind::DiscountPrice);
    }

    #[test]
    fn test_discount_needs_offers() {
        let mut i = input();
        i.sale_record_cart_offers.clear();
        assert_eq!(rule(validate_input_totals(&i)), ErrorKind::DiscountPriceNotMatchOffer);

        let mut i = input();
        i.sale_record_cart_offers[0].offer_no.clear();
        assert_eq!(rule(validate_input_totals(&i)), ErrorKind::OfferNo);

        let mut i = input();
        i.sale_record_cart_offers[0].price = m(2500);
        assert_eq!(rule(validate_input_totals(&i)), ErrorKind::DiscountPriceNotMatchOffer);
    }

    #[test]
    fn test_store_brand_checks() {
        let i = input();
        assert_eq!(rule(check_store_brands(&i, None)), ErrorKind::StoreNotExist);

        let mut store = Store {
            id: 5,
            brands: vec![StoreBrand { id: 3, code: "AD".into(), enable: true }],
            ..Store::default()
        };
        assert_eq!(rule(check_store_brands(&i, Some(&store))), ErrorKind::BrandNotMatch);

        store.brands[0].code = "NK".into();
        assert!(check_store_brands(&i, Some(&store)).is_ok());
    }

    #[test]
    fn test_sku_checks_in_order() {
        let l = line(10000, 2000, 8000);
        assert_eq!(rule(check_sku(&l, None)), ErrorKind::SkuNotExist);

        let mut sku = Sku {
            product: Product {
                id: 99,
                code: "P".into(),
                list_price: m(9000),
                brand: Brand { id: 3, code: "AD".into() },
            },
        };
        assert_eq!(rule(check_sku(&l, Some(&sku))), ErrorKind::SkuListPrice);
        sku.product.list_price = m(10000);
        assert_eq!(rule(check_sku(&l, Some(&sku))), ErrorKind::ProductNotMatch);
        sku.product.id = 55;
        assert_eq!(rule(check_sku(&l, Some(&sku))), ErrorKind::ProductBrand);
        sku.product.brand.code = "NK".into();
        assert!(check_sku(&l, Some(&sku)).is_ok());
    }

    fn order() -> OrderEvent {
        OrderEvent {
            created_id: 1,
            sale_type: "POS".into(),
            salesman_id: 2,
            store_id: 3,
            mileage: m(300),
            mileage_price: m(30),
            items: vec![
                OrderEventItem {
                    fee_rate: 0.2,
                    mileage: m(100),
                    mileage_price: m(10),
                    ..OrderEventItem::default()
                },
                OrderEventItem {
                    fee_rate: 0.2,
                    mileage: m(200),
                    mileage_price: m(20),
                    ..OrderEventItem::default()
                },
            ],
            ..OrderEvent::default()
        }
    }

    #[test]
    fn test_order_event_rules() {
        assert!(validate_order_event(&order()).is_ok());

        let mut o = order();
        o.created_id = 0;
        assert_eq!(rule(validate_order_event(&o)), ErrorKind::CreatedId);

        let mut o = order();
        o.salesman_id = 0;
        assert_eq!(rule(validate_order_event(&o)), ErrorKind::PosSalesmanId);
        o.sale_type = "EMALL".into();
        assert!(validate_order_event(&o).is_ok());

        let mut o = order();
        o.store_id = 0;
        assert_eq!(rule(validate_order_event(&o)), ErrorKind::StoreId);

        let mut o = order();
        o.items[1].fee_rate = 0.0;
        assert_eq!(rule(validate_order_event(&o)), ErrorKind::ItemFeeRate);

        let mut o = order();
        o.mileage_price = m(31);
        assert_eq!(rule(validate_order_event(&o)), ErrorKind::Mileage);
    }

    #[test]
    fn test_refund_event_rules() {
        let refund = RefundEvent {
            created_id: 1,
            refund_type: "POS".into(),
            salesman_id: 0,
            store_id: 3,
            items: vec![RefundEventItem {
                fee_rate: 0.1,
                ..RefundEventItem::default()
            }],
            ..RefundEvent::default()
        };
        assert_eq!(rule(validate_refund_event(&refund)), ErrorKind::PosSalesmanId);

        let refund = RefundEvent {
            salesman_id: 4,
            mileage: m(50),
            ..refund
        };
        assert_eq!(rule(validate_refund_event(&refund)), ErrorKind::Mileage);
    }
}
