//! Fixtures shared by the service tests: a table-driven lookup stub and
//! one consistent order, refund and API input.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::task::JoinHandle;

use salerecord_core::event::{Event, OfferEvent, OrderEvent, OrderEventItem, RefundEvent, RefundEventItem};
use salerecord_core::input::{SaleRecordCartOffer, SaleRecordDtlInput, SaleRecordInput};
use salerecord_core::lookup::{
    Brand, Coupon, Item, Member, PaymentQuery, PaymentRow, Product, RoundingType, Sku, Store, StoreBrand,
};
use salerecord_core::query::{LogFilter, Page};
use salerecord_core::{Money, SaleRecordLog};
use salerecord_db::{Database, DbConfig};

use crate::broker::MemoryBroker;
use crate::lookup::{LookupError, LookupResult, Lookups};
use crate::publisher::{PublishChannels, PublishWorker, PublisherHandle};
use crate::reconcile::{ReconcileSettings, Reconciler};

#[derive(Default)]
pub struct StubLookups {
    pub stores: HashMap<i64, Store>,
    pub items: HashMap<String, Item>,
    pub skus: HashMap<i64, Sku>,
    pub coupons: HashMap<String, Coupon>,
    pub members: HashMap<i64, Member>,
    /// Member lookups that answer `None` before `members` is consulted.
    pub member_misses: AtomicUsize,
    pub payments: Vec<(PaymentQuery, Vec<PaymentRow>)>,
    pub store_down: bool,
}

#[async_trait]
impl Lookups for StubLookups {
    async fn store(&self, store_id: i64) -> LookupResult<Option<Store>> {
        if self.store_down {
            return Err(LookupError::Status { entity: "store", status: 503 });
        }
        Ok(self.stores.get(&store_id).cloned())
    }
    async fn item(&self, item_code: &str) -> LookupResult<Option<Item>> {
        Ok(self.items.get(item_code).cloned())
    }
    async fn sku(&self, sku_id: i64) -> LookupResult<Option<Sku>> {
        Ok(self.skus.get(&sku_id).cloned())
    }
    async fn coupon(&self, coupon_no: &str) -> LookupResult<Option<Coupon>> {
        Ok(self.coupons.get(coupon_no).cloned())
    }
    async fn member(&self, customer_id: i64, _tenant_code: &str) -> LookupResult<Option<Member>> {
        let missed = self
            .member_misses
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if missed {
            return Ok(None);
        }
        Ok(self.members.get(&customer_id).cloned())
    }
    async fn payments(&self, query: PaymentQuery) -> LookupResult<Vec<PaymentRow>> {
        Ok(self
            .payments
            .iter()
            .find(|(q, _)| *q == query)
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default())
    }
}

pub fn sku() -> Sku {
    Sku {
        product: Product {
            id: 55,
            code: "P-55".into(),
            list_price: Money::from_cents(10000),
            brand: Brand { id: 3, code: "NK".into() },
        },
    }
}

pub fn lookups() -> StubLookups {
    let mut stub = StubLookups::default();
    stub.stores.insert(
        7,
        Store {
            id: 7,
            rounding_type: Some(RoundingType {
                code: "A".into(),
                ..RoundingType::default()
            }),
            brands: vec![StoreBrand { id: 3, code: "NK".into(), enable: true }],
            ..Store::default()
        },
    );
    stub.items.insert(
        "ITEM-1".into(),
        Item {
            sale_price: Money::from_cents(10000),
            sku: sku(),
            ..Item::default()
        },
    );
    stub.skus.insert(66, sku());
    let cash = |cents| {
        vec![PaymentRow {
            seq_no: 1,
            pay_method: "CASH".into(),
            pay_amt: Money::from_cents(cents),
            ..PaymentRow::default()
        }]
    };
    stub.payments.push((PaymentQuery::Order(100), cash(9000)));
    stub.payments.push((PaymentQuery::Refund(31), cash(-9000)));
    stub
}

pub fn created_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 2, 0, 0).unwrap()
}

pub fn order() -> OrderEvent {
    OrderEvent {
        id: 100,
        tenant_code: "hublabs".into(),
        store_id: 7,
        sale_type: "POS".into(),
        salesman_id: 5,
        created_id: 1,
        total_list_price: Money::from_cents(10000),
        total_sale_price: Money::from_cents(10000),
        total_discount_price: Money::from_cents(1000),
        total_payment_price: Money::from_cents(9000),
        items: vec![OrderEventItem {
            id: 1001,
            item_code: "ITEM-1".into(),
            fee_rate: 0.5,
            product_id: 55,
            quantity: 1,
            list_price: Money::from_cents(10000),
            sale_price: Money::from_cents(10000),
            total_list_price: Money::from_cents(10000),
            total_sale_price: Money::from_cents(10000),
            total_discount_price: Money::from_cents(1000),
            total_payment_price: Money::from_cents(9000),
            total_distributed_cart_offer_price: Money::from_cents(1000),
            ..OrderEventItem::default()
        }],
        offers: vec![OfferEvent {
            offer_no: "OF-1".into(),
            item_ids: "1001".into(),
            price: Money::from_cents(1000),
            ..OfferEvent::default()
        }],
        created_at: created_at(),
        ..OrderEvent::default()
    }
}

pub fn order_event(status: &str) -> Event {
    Event {
        entity_type: "Order".into(),
        status: status.into(),
        payload: order(),
    }
}

pub fn refund_event() -> Event {
    let mut payload = order();
    payload.refunds = vec![RefundEvent {
        id: 31,
        tenant_code: "hublabs".into(),
        store_id: 7,
        refund_type: "POS".into(),
        salesman_id: 5,
        created_id: 1,
        total_list_price: Money::from_cents(10000),
        total_refund_price: Money::from_cents(9000),
        items: vec![RefundEventItem {
            id: 2001,
            order_item_id: 1001,
            item_code: "ITEM-1".into(),
            fee_rate: 0.5,
            quantity: 1,
            total_list_price: Money::from_cents(10000),
            total_sale_price: Money::from_cents(10000),
            total_refund_price: Money::from_cents(9000),
            ..RefundEventItem::default()
        }],
        created_at: created_at(),
        ..RefundEvent::default()
    }];
    Event {
        entity_type: "Refund".into(),
        status: "RefundOrderSuccess".into(),
        payload,
    }
}

pub fn input() -> SaleRecordInput {
    SaleRecordInput {
        order_id: 500,
        store_id: 7,
        channel_type: "POS".into(),
        created_id: 1,
        salesman_id: 5,
        total_list_price: Money::from_cents(10000),
        total_discount_price: Money::from_cents(1000),
        total_payment_price: Money::from_cents(9000),
        sale_record_dtl_inputs: vec![SaleRecordDtlInput {
            order_item_id: 1,
            brand_id: 3,
            brand_code: "NK".into(),
            product_id: 55,
            sku_id: 66,
            fee_rate: 0.5,
            list_price: Money::from_cents(10000),
            sale_price: Money::from_cents(10000),
            quantity: 1,
            total_list_price: Money::from_cents(10000),
            total_discount_price: Money::from_cents(1000),
            total_payment_price: Money::from_cents(9000),
            ..SaleRecordDtlInput::default()
        }],
        sale_record_cart_offers: vec![SaleRecordCartOffer {
            offer_no: "OF-1".into(),
            order_item_ids: "1".into(),
            price: Money::from_cents(1000),
        }],
        ..SaleRecordInput::default()
    }
}

pub struct Harness {
    pub reconciler: Reconciler,
    pub publisher: PublisherHandle,
    pub broker: MemoryBroker,
    pub worker: JoinHandle<()>,
}

impl Harness {
    pub async fn new(stub: StubLookups) -> Self {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let broker = MemoryBroker::new();
        let (worker, publisher) = PublishWorker::new(
            Arc::new(broker.clone()),
            PublishChannels {
                sale_record: "sale-record".into(),
                sale_fail: "sale-record-fail".into(),
            },
            64,
        );
        let reconciler = Reconciler::new(
            db,
            Arc::new(stub),
            publisher.clone(),
            ReconcileSettings::default(),
        );
        Harness {
            reconciler,
            publisher,
            broker,
            worker: tokio::spawn(worker.run()),
        }
    }

    /// Stops the worker and returns the channels published to.
    pub async fn published_channels(self) -> Vec<String> {
        self.publisher.shutdown().await;
        self.worker.await.unwrap();
        self.broker
            .published()
            .await
            .into_iter()
            .map(|(channel, _)| channel)
            .collect()
    }

    pub async fn logs(&self) -> Vec<SaleRecordLog> {
        self.reconciler
            .database()
            .sale_record_logs()
            .search(&LogFilter::default(), Page::new(0, 100))
            .await
            .unwrap()
            .items
    }
}
