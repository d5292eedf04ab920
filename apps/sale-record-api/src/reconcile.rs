//! # Reconciliation Controller
//!
//! The idempotency gate between inbound transactions and committed sale
//! records.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Reconciliation States                              │
//! │                                                                         │
//! │   status not terminal ──► SKIPPED (nothing read or written)            │
//! │                                                                         │
//! │   NEW ── find_by_key hit ──► DUPLICATE ── republish unchanged          │
//! │    │                                                                    │
//! │    ├── validate + lookups + normalize ──► VALIDATED                    │
//! │    │                                         │                          │
//! │    │                                         ▼                          │
//! │    │                          insert (one transaction) ──► COMMITTED   │
//! │    │                                 │                        │         │
//! │    │                   unique violation ──► DUPLICATE         │         │
//! │    │                                                          ▼         │
//! │    │                                  publish + success log row        │
//! │    │                                                                    │
//! │    └── any error ──► FAILED: failure log row                           │
//! │                      (+ failure event for event-sourced input)          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Lookups run one at a time, in rule order, so the first failing rule is
//! the one reported.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use salerecord_core::event::{Event, OrderEvent, RefundEvent};
use salerecord_core::input::SaleRecordInput;
use salerecord_core::lookup::{Item, PaymentQuery};
use salerecord_core::normalize::{coupon_candidates, normalize_order, normalize_refund, NormalizeContext};
use salerecord_core::rounding::RoundingSetting;
use salerecord_core::validation::{
    check_sku, check_store_brands, validate_input_totals, validate_order_event, validate_refund_event,
    POS_CHANNEL,
};
use salerecord_core::{DedupKey, ErrorKind, SaleRecord, SaleRecordLog, EVENT_ACTOR};
use salerecord_db::Database;

use crate::error::{ServiceError, ServiceResult};
use crate::lookup::Lookups;
use crate::publisher::PublisherHandle;

/// Reconciliation tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileSettings {
    /// Tenant used for dedup keys when the payload carries none.
    pub default_tenant_code: String,
    pub redistribute_cart_offers: bool,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        ReconcileSettings {
            default_tenant_code: salerecord_core::DEFAULT_TENANT_CODE.to_string(),
            redistribute_cart_offers: false,
        }
    }
}

/// Result of handling one lifecycle event. Never an error: failures are
/// recorded and reported here.
#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    /// The status cannot produce a sale record.
    Skipped,
    Duplicate(SaleRecord),
    Committed(SaleRecord),
    Failed(ErrorKind),
}

/// Insert result.
enum Commit {
    Created(SaleRecord),
    Existing(SaleRecord),
}

#[derive(Clone)]
pub struct Reconciler {
    db: Database,
    lookups: Arc<dyn Lookups>,
    publisher: PublisherHandle,
    settings: Arc<ReconcileSettings>,
}

impl Reconciler {
    pub fn new(
        db: Database,
        lookups: Arc<dyn Lookups>,
        publisher: PublisherHandle,
        settings: ReconcileSettings,
    ) -> Self {
        Reconciler {
            db,
            lookups,
            publisher,
            settings: Arc::new(settings),
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// The given tenant, or the configured default when empty.
    pub fn tenant_or_default<'a>(&'a self, tenant_code: &'a str) -> &'a str {
        if tenant_code.is_empty() {
            &self.settings.default_tenant_code
        } else {
            tenant_code
        }
    }

    // =========================================================================
    // Event Path
    // =========================================================================

    /// Reconciles one order or refund lifecycle event.
    pub async fn handle_event(&self, event: &Event) -> EventOutcome {
        if !event.order_status().can_make_sale_record() {
            debug!(
                order_id = event.payload.id,
                status = %event.status,
                "Status cannot make a sale record, skipping"
            );
            return EventOutcome::Skipped;
        }

        let key = self.event_key(event);

        match self.process_event(event, &key).await {
            Ok(outcome) => outcome,
            Err(err) => {
                let kind = err.kind();
                warn!(%key, error_type = %kind, error = %err, "Sale record rejected");
                self.record_event_failure(event, &key, &err).await;
                EventOutcome::Failed(kind)
            }
        }
    }

    /// Refund events key on the refund id; order events on the order id.
    fn event_key(&self, event: &Event) -> DedupKey {
        let order = &event.payload;
        match event.refund() {
            Some(refund) => DedupKey::refund(
                order.id,
                refund.id,
                &refund.refund_type,
                self.tenant_or_default(&refund.tenant_code),
            ),
            None => DedupKey::order(order.id, &order.sale_type, self.tenant_or_default(&order.tenant_code)),
        }
    }

    async fn process_event(&self, event: &Event, key: &DedupKey) -> ServiceResult<EventOutcome> {
        if let Some(existing) = self.db.sale_records().find_by_key(key).await? {
            let existing = self.refresh_duplicate(existing, event).await?;
            info!(%key, transaction_id = existing.transaction_id, "Sale record exists, republishing");
            self.publisher.publish_sale_record(&existing);
            return Ok(EventOutcome::Duplicate(existing));
        }

        let mut record = match event.refund() {
            Some(refund) => self.build_refund(&event.payload, refund).await?,
            None => {
                let mut record = self.build_order(&event.payload).await?;
                if !event.status.is_empty() {
                    record.transaction_status = event.status.clone();
                }
                record
            }
        };
        record.tenant_code = key.tenant_code.clone();

        match self.insert(record).await? {
            Commit::Created(record) => {
                self.publisher.publish_sale_record(&record);
                self.record_success(&record, &record).await;
                Ok(EventOutcome::Committed(record))
            }
            Commit::Existing(record) => {
                self.publisher.publish_sale_record(&record);
                Ok(EventOutcome::Duplicate(record))
            }
        }
    }

    /// Order duplicates take the incoming status. Financial fields are
    /// never touched.
    async fn refresh_duplicate(&self, mut existing: SaleRecord, event: &Event) -> ServiceResult<SaleRecord> {
        if event.refund().is_some()
            || event.status.is_empty()
            || event.status == existing.transaction_status
        {
            return Ok(existing);
        }

        let now = Utc::now();
        self.db
            .sale_records()
            .refresh_status(existing.transaction_id, &event.status, now, EVENT_ACTOR)
            .await?;

        existing.transaction_status = event.status.clone();
        existing.transaction_update_date = now;
        existing.modified = now;
        existing.modified_by = EVENT_ACTOR.to_string();
        Ok(existing)
    }

    async fn build_order(&self, order: &OrderEvent) -> ServiceResult<SaleRecord> {
        validate_order_event(order)?;

        let rounding = self.rounding(order.store_id).await?;
        let codes = order.items.iter().map(|i| i.item_code.clone()).collect();
        let items = self.fetch_items(codes).await?;
        let payments = self.lookups.payments(PaymentQuery::Order(order.id)).await?;
        let emp_id = self.resolve_emp_id(order).await?;

        let ctx = NormalizeContext {
            rounding,
            items,
            payments,
            emp_id,
            now: Utc::now(),
            redistribute: self.settings.redistribute_cart_offers,
        };
        Ok(normalize_order(order, &ctx)?)
    }

    async fn build_refund(&self, order: &OrderEvent, refund: &RefundEvent) -> ServiceResult<SaleRecord> {
        validate_refund_event(refund)?;

        let rounding = self.rounding(refund.store_id).await?;
        let codes = refund.items.iter().map(|i| i.item_code.clone()).collect();
        let items = self.fetch_items(codes).await?;
        let payments = self.lookups.payments(PaymentQuery::Refund(refund.id)).await?;

        let ctx = NormalizeContext {
            rounding,
            items,
            payments,
            emp_id: String::new(),
            now: Utc::now(),
            redistribute: self.settings.redistribute_cart_offers,
        };
        Ok(normalize_refund(order.id, refund, &ctx)?)
    }

    async fn rounding(&self, store_id: i64) -> ServiceResult<RoundingSetting> {
        let store = self
            .lookups
            .store(store_id)
            .await?
            .ok_or(ErrorKind::StoreNotExist)?;
        Ok(RoundingSetting::from_store(&store)?)
    }

    /// Items by code, fetched sequentially. Unknown codes are left out and
    /// reported by the normalizer.
    async fn fetch_items(&self, codes: Vec<String>) -> ServiceResult<HashMap<String, Item>> {
        let mut items = HashMap::new();
        for code in codes {
            if items.contains_key(&code) {
                continue;
            }
            if let Some(item) = self.lookups.item(&code).await? {
                items.insert(code, item);
            }
        }
        Ok(items)
    }

    /// Employee number of the first internal coupon's member.
    async fn resolve_emp_id(&self, order: &OrderEvent) -> ServiceResult<String> {
        for coupon_no in coupon_candidates(order) {
            let Some(coupon) = self.lookups.coupon(coupon_no).await? else {
                continue;
            };
            if !coupon.is_internal {
                continue;
            }
            let member = self
                .lookups
                .member(order.customer_id, self.tenant_or_default(&order.tenant_code))
                .await?;
            if let Some(member) = member {
                return Ok(member.hr_emp_no);
            }
        }
        Ok(String::new())
    }

    async fn record_event_failure(&self, event: &Event, key: &DedupKey, err: &ServiceError) {
        let order = &event.payload;
        let (store_id, transaction_create_date) = match event.refund() {
            Some(refund) => (refund.store_id, refund.created_at),
            None => (order.store_id, order.created_at),
        };

        let log = failure_log(key, store_id, transaction_create_date, snapshot(event), err, Utc::now());
        match self.db.sale_record_logs().upsert(&log).await {
            Ok(saved) => {
                self.publisher.publish_sale_fail(&saved);
            }
            Err(e) => error!(%key, error = %e, "Failed to record sale record failure"),
        }
    }

    // =========================================================================
    // API Path
    // =========================================================================

    /// Validates and commits a directly submitted sale record.
    ///
    /// ## Errors
    /// - `MissingParameter` when both ids are 0, or a POS record has no
    ///   salesman. Nothing is recorded.
    /// - Any rule or lookup failure. A failure row is recorded but no
    ///   failure event is published.
    pub async fn create_from_input(&self, input: &SaleRecordInput) -> ServiceResult<SaleRecord> {
        if input.order_id == 0 && input.refund_id == 0 {
            return Err(ServiceError::MissingParameter(
                "orderId and refundId can't both 0".to_string(),
            ));
        }
        if input.channel_type == POS_CHANNEL && input.salesman_id == 0 {
            return Err(ServiceError::MissingParameter("salesmanId can't 0".to_string()));
        }
        if input.sale_record_dtl_inputs.is_empty() {
            return Err(ServiceError::InvalidRequest(
                "saleRecordDtlInputs is required".to_string(),
            ));
        }

        let key = input.dedup_key(&self.settings.default_tenant_code);
        let mut record = input.to_sale_record(Utc::now());
        record.tenant_code = key.tenant_code.clone();

        match self.commit_input(input, &key, record.clone()).await {
            Ok(record) => Ok(record),
            Err(err) => {
                warn!(%key, error_type = %err.kind(), error = %err, "Sale record input rejected");
                let log = failure_log(
                    &key,
                    record.store_id,
                    record.transaction_create_date,
                    snapshot(input),
                    &err,
                    Utc::now(),
                );
                if let Err(e) = self.db.sale_record_logs().upsert(&log).await {
                    error!(%key, error = %e, "Failed to record sale record failure");
                }
                Err(err)
            }
        }
    }

    async fn commit_input(
        &self,
        input: &SaleRecordInput,
        key: &DedupKey,
        record: SaleRecord,
    ) -> ServiceResult<SaleRecord> {
        if let Some(existing) = self.db.sale_records().find_by_key(key).await? {
            info!(%key, transaction_id = existing.transaction_id, "Sale record exists, republishing");
            self.publisher.publish_sale_record(&existing);
            return Ok(existing);
        }

        self.validate_input(input).await?;

        match self.insert(record).await? {
            Commit::Created(record) => {
                self.record_success(&record, input).await;
                self.publisher.publish_sale_record(&record);
                Ok(record)
            }
            Commit::Existing(record) => {
                self.publisher.publish_sale_record(&record);
                Ok(record)
            }
        }
    }

    /// Rules 1 to 6, with lookups in rule order.
    async fn validate_input(&self, input: &SaleRecordInput) -> ServiceResult<()> {
        validate_input_totals(input)?;

        if input.store_id == 0 {
            return Err(ErrorKind::StoreId.into());
        }
        let store = self.lookups.store(input.store_id).await?;
        check_store_brands(input, store.as_ref())?;

        for line in &input.sale_record_dtl_inputs {
            let sku = self.lookups.sku(line.sku_id).await?;
            check_sku(line, sku.as_ref())?;
        }
        Ok(())
    }

    // =========================================================================
    // Shared
    // =========================================================================

    /// Inserts the record. Losing an insert race on the dedup index
    /// yields the winner's record.
    async fn insert(&self, record: SaleRecord) -> ServiceResult<Commit> {
        let key = record.dedup_key();
        match self.db.sale_records().create(record).await {
            Ok(saved) => Ok(Commit::Created(saved)),
            Err(e) if e.is_unique_violation() => {
                warn!(%key, "Concurrent insert for the same key, treating as duplicate");
                match self.db.sale_records().find_by_key(&key).await? {
                    Some(existing) => Ok(Commit::Existing(existing)),
                    None => Err(e.into()),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn record_success<T: Serialize>(&self, record: &SaleRecord, snapshot_of: &T) {
        let now = Utc::now();
        let log = SaleRecordLog {
            tenant_code: record.tenant_code.clone(),
            channel_type: record.transaction_channel_type.clone(),
            transaction_type: record.transaction_type,
            order_id: record.order_id,
            refund_id: record.refund_id,
            store_id: record.store_id,
            is_success: true,
            order_entity: snapshot(snapshot_of),
            transaction_create_date: record.transaction_create_date,
            created_at: now,
            updated_at: now,
            ..SaleRecordLog::default()
        };
        if let Err(e) = self.db.sale_record_logs().upsert(&log).await {
            error!(key = %record.dedup_key(), error = %e, "Failed to record sale record success");
        }
    }

    /// Re-sends a stored record on the sale record channel.
    pub async fn republish(&self, transaction_id: i64) -> ServiceResult<SaleRecord> {
        let record = self
            .db
            .sale_records()
            .get_by_transaction_id(transaction_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("SaleRecord {transaction_id}")))?;

        self.publisher.republish_sale_record(&record);
        Ok(record)
    }
}

fn snapshot<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

fn failure_log(
    key: &DedupKey,
    store_id: i64,
    transaction_create_date: DateTime<Utc>,
    order_entity: String,
    err: &ServiceError,
    now: DateTime<Utc>,
) -> SaleRecordLog {
    let kind = err.kind();
    SaleRecordLog {
        tenant_code: key.tenant_code.clone(),
        channel_type: key.channel_type.clone(),
        transaction_type: key.transaction_type,
        order_id: key.order_id,
        refund_id: key.refund_id,
        store_id,
        error_type: kind.tag().to_string(),
        error: err.diagnostic(),
        details: kind.detail().to_string(),
        is_success: false,
        order_entity,
        transaction_create_date,
        created_at: now,
        updated_at: now,
        ..SaleRecordLog::default()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use salerecord_core::event::OfferEvent;
    use salerecord_core::lookup::{Coupon, Member};
    use salerecord_core::query::{Page, SaleRecordFilter};
    use salerecord_core::{Money, TransactionType};

    // -------------------------------------------------------------------------
    // Event path
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_order_event_commits() {
        let h = Harness::new(lookups()).await;

        let outcome = h.reconciler.handle_event(&order_event("BuyerReceivedConfirmed")).await;
        let EventOutcome::Committed(record) = outcome else {
            panic!("expected commit, got {outcome:?}");
        };

        assert!(record.transaction_id > 0);
        assert_eq!(record.transaction_type, TransactionType::Plus);
        assert_eq!(record.transaction_status, "BuyerReceivedConfirmed");
        assert_eq!(record.lines.len(), 1);
        assert_eq!(record.lines[0].distributed_cash_price.cents(), 8000);
        assert_eq!(record.payments.len(), 1);

        let logs = h.logs().await;
        assert_eq!(logs.len(), 1);
        assert!(logs[0].is_success);
        assert_eq!(logs[0].error_type, "");

        assert_eq!(h.published_channels().await, vec!["sale-record"]);
    }

    #[tokio::test]
    async fn test_event_futures_can_be_spawned() {
        fn assert_send<T: Send>(_: &T) {}

        let h = Harness::new(lookups()).await;
        let order = order_event("BuyerReceivedConfirmed");
        let refund = refund_event();

        let fut = h.reconciler.handle_event(&order);
        assert_send(&fut);
        assert!(matches!(fut.await, EventOutcome::Committed(_)));

        let reconciler = h.reconciler.clone();
        let outcome = tokio::spawn(async move { reconciler.handle_event(&refund).await })
            .await
            .unwrap();
        assert!(matches!(outcome, EventOutcome::Committed(_)));
    }

    #[tokio::test]
    async fn test_duplicate_event_refreshes_status_only() {
        let h = Harness::new(lookups()).await;

        let EventOutcome::Committed(first) =
            h.reconciler.handle_event(&order_event("BuyerReceivedConfirmed")).await
        else {
            panic!("first event should commit");
        };

        let outcome = h.reconciler.handle_event(&order_event("SaleOrderSuccess")).await;
        let EventOutcome::Duplicate(second) = outcome else {
            panic!("expected duplicate, got {outcome:?}");
        };

        assert_eq!(second.transaction_id, first.transaction_id);
        assert_eq!(second.transaction_status, "SaleOrderSuccess");
        assert_eq!(second.total_transaction_price, first.total_transaction_price);

        let stored = h
            .reconciler
            .database()
            .sale_records()
            .get_by_transaction_id(first.transaction_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.transaction_status, "SaleOrderSuccess");

        assert_eq!(h.published_channels().await, vec!["sale-record", "sale-record"]);
    }

    #[tokio::test]
    async fn test_non_terminal_status_is_skipped() {
        let h = Harness::new(lookups()).await;

        let outcome = h.reconciler.handle_event(&order_event("SaleOrderProcessing")).await;
        assert_eq!(outcome, EventOutcome::Skipped);
        assert!(h.logs().await.is_empty());
        assert!(h.published_channels().await.is_empty());
    }

    #[tokio::test]
    async fn test_rule_failure_is_recorded_and_published() {
        let h = Harness::new(lookups()).await;

        let mut event = order_event("BuyerReceivedConfirmed");
        event.payload.created_id = 0;

        let outcome = h.reconciler.handle_event(&event).await;
        assert_eq!(outcome, EventOutcome::Failed(ErrorKind::CreatedId));

        let logs = h.logs().await;
        assert_eq!(logs.len(), 1);
        let log = &logs[0];
        assert!(!log.is_success);
        assert_eq!(log.error_type, "CreatedId");
        assert_eq!(log.error, "CreatedId not avalable 0");
        assert_eq!(log.details, "登录人员信息错误！");
        assert_eq!(log.order_id, 100);
        assert_eq!(log.store_id, 7);
        assert_eq!(log.transaction_create_date, created_at());
        let snapshot: Event = serde_json::from_str(&log.order_entity).unwrap();
        assert_eq!(snapshot, event);

        assert_eq!(h.published_channels().await, vec!["sale-record-fail"]);
    }

    #[tokio::test]
    async fn test_negative_cash_share_persists_nothing() {
        let h = Harness::new(lookups()).await;

        let mut event = order_event("BuyerReceivedConfirmed");
        let mut second = event.payload.items[0].clone();
        second.id = 1002;
        second.total_payment_price = Money::from_cents(0);
        second.total_distributed_cart_offer_price = Money::from_cents(500);
        event.payload.items.push(second);

        let outcome = h.reconciler.handle_event(&event).await;
        assert_eq!(outcome, EventOutcome::Failed(ErrorKind::DistributedCashPrice));

        let records = h
            .reconciler
            .database()
            .sale_records()
            .search(&SaleRecordFilter::default(), Page::new(0, 10))
            .await
            .unwrap();
        assert_eq!(records.total_count, 0);
        assert!(h
            .reconciler
            .database()
            .sale_records()
            .find_by_key(&DedupKey::order(100, "POS", "hublabs"))
            .await
            .unwrap()
            .is_none());

        let logs = h.logs().await;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].error_type, "DistributedCashPrice");
        assert_eq!(h.published_channels().await, vec!["sale-record-fail"]);
    }

    #[tokio::test]
    async fn test_retry_after_failure_converges_on_one_log_row() {
        let h = Harness::new(lookups()).await;

        let mut bad = order_event("BuyerReceivedConfirmed");
        bad.payload.created_id = 0;
        h.reconciler.handle_event(&bad).await;

        let outcome = h.reconciler.handle_event(&order_event("BuyerReceivedConfirmed")).await;
        assert!(matches!(outcome, EventOutcome::Committed(_)));

        let logs = h.logs().await;
        assert_eq!(logs.len(), 1);
        assert!(logs[0].is_success);
    }

    #[tokio::test]
    async fn test_lookup_failures_map_to_kinds() {
        // Missing store.
        let mut stub = lookups();
        stub.stores.clear();
        let h = Harness::new(stub).await;
        let outcome = h.reconciler.handle_event(&order_event("BuyerReceivedConfirmed")).await;
        assert_eq!(outcome, EventOutcome::Failed(ErrorKind::StoreNotExist));

        // Missing payments.
        let mut stub = lookups();
        stub.payments.clear();
        let h = Harness::new(stub).await;
        let outcome = h.reconciler.handle_event(&order_event("BuyerReceivedConfirmed")).await;
        assert_eq!(outcome, EventOutcome::Failed(ErrorKind::PayMentNotExist));

        // Unknown item.
        let mut stub = lookups();
        stub.items.clear();
        let h = Harness::new(stub).await;
        let outcome = h.reconciler.handle_event(&order_event("BuyerReceivedConfirmed")).await;
        assert_eq!(outcome, EventOutcome::Failed(ErrorKind::SkuNotExist));

        // Transport failure.
        let mut stub = lookups();
        stub.store_down = true;
        let h = Harness::new(stub).await;
        let outcome = h.reconciler.handle_event(&order_event("BuyerReceivedConfirmed")).await;
        assert_eq!(outcome, EventOutcome::Failed(ErrorKind::SaleRecord));
        let logs = h.logs().await;
        assert_eq!(logs[0].error, "store lookup returned HTTP 503");
        assert_eq!(logs[0].details, "上传数据处理异常！");
    }

    #[tokio::test]
    async fn test_refund_event_commits_minus_record() {
        let h = Harness::new(lookups()).await;

        let outcome = h.reconciler.handle_event(&refund_event()).await;
        let EventOutcome::Committed(record) = outcome else {
            panic!("expected commit, got {outcome:?}");
        };

        assert_eq!(record.transaction_type, TransactionType::Minus);
        assert_eq!(record.order_id, 100);
        assert_eq!(record.refund_id, 31);
        assert!(record.is_refund);
        assert_eq!(record.payments[0].pay_amt.cents(), 9000);
        assert_eq!(record.lines[0].refund_item_id, 2001);

        // The order itself was never committed; the refund does not need it.
        let order_key = DedupKey::order(100, "POS", "hublabs");
        assert!(h
            .reconciler
            .database()
            .sale_records()
            .find_by_key(&order_key)
            .await
            .unwrap()
            .is_none());

        let again = h.reconciler.handle_event(&refund_event()).await;
        assert!(matches!(again, EventOutcome::Duplicate(r) if r.transaction_id == record.transaction_id));
    }

    #[tokio::test]
    async fn test_internal_coupon_resolves_emp_id() {
        let mut stub = lookups();
        stub.coupons.insert(
            "CP-EXT".into(),
            Coupon { coupon_no: "CP-EXT".into(), is_internal: false },
        );
        stub.coupons.insert(
            "CP-INT".into(),
            Coupon { coupon_no: "CP-INT".into(), is_internal: true },
        );
        stub.members.insert(
            9,
            Member { id: 9, hr_emp_no: "E-77".into(), ..Member::default() },
        );
        let h = Harness::new(stub).await;

        let mut event = order_event("BuyerReceivedConfirmed");
        event.payload.customer_id = 9;
        event.payload.offers = vec![
            OfferEvent {
                offer_no: "OF-1".into(),
                coupon_no: "CP-EXT".into(),
                item_ids: "1001".into(),
                price: Money::from_cents(500),
                ..OfferEvent::default()
            },
            OfferEvent {
                offer_no: "OF-2".into(),
                coupon_no: "CP-INT".into(),
                item_ids: "1001".into(),
                price: Money::from_cents(500),
                ..OfferEvent::default()
            },
        ];

        let EventOutcome::Committed(record) = h.reconciler.handle_event(&event).await else {
            panic!("expected commit");
        };
        assert_eq!(record.emp_id, "E-77");
        assert_eq!(record.discount_coupon_price.cents(), 1000);
    }

    #[tokio::test]
    async fn test_unknown_member_moves_to_next_internal_coupon() {
        let mut stub = lookups();
        for no in ["CP-INT-1", "CP-INT-2"] {
            stub.coupons.insert(no.into(), Coupon { coupon_no: no.into(), is_internal: true });
        }
        stub.members.insert(
            9,
            Member { id: 9, hr_emp_no: "E-88".into(), ..Member::default() },
        );
        stub.member_misses.store(1, std::sync::atomic::Ordering::SeqCst);
        let h = Harness::new(stub).await;

        let mut event = order_event("BuyerReceivedConfirmed");
        event.payload.customer_id = 9;
        event.payload.offers = ["CP-INT-1", "CP-INT-2"]
            .iter()
            .enumerate()
            .map(|(i, no)| OfferEvent {
                offer_no: format!("OF-{}", i + 1),
                coupon_no: no.to_string(),
                item_ids: "1001".into(),
                price: Money::from_cents(500),
                ..OfferEvent::default()
            })
            .collect();

        let EventOutcome::Committed(record) = h.reconciler.handle_event(&event).await else {
            panic!("expected commit");
        };
        assert_eq!(record.emp_id, "E-88");
    }

    #[tokio::test]
    async fn test_missing_tenant_uses_default() {
        let h = Harness::new(lookups()).await;

        let mut event = order_event("BuyerReceivedConfirmed");
        event.payload.tenant_code.clear();

        let EventOutcome::Committed(record) = h.reconciler.handle_event(&event).await else {
            panic!("expected commit");
        };
        assert_eq!(record.tenant_code, "hublabs");
    }

    // -------------------------------------------------------------------------
    // API path
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_create_from_input_is_idempotent() {
        let h = Harness::new(lookups()).await;

        let first = h.reconciler.create_from_input(&input()).await.unwrap();
        assert!(first.transaction_id > 0);
        assert_eq!(first.tenant_code, "hublabs");
        assert_eq!(first.transaction_type, TransactionType::Plus);

        let second = h.reconciler.create_from_input(&input()).await.unwrap();
        assert_eq!(second.transaction_id, first.transaction_id);

        let logs = h.logs().await;
        assert_eq!(logs.len(), 1);
        let snapshot: SaleRecordInput = serde_json::from_str(&logs[0].order_entity).unwrap();
        assert_eq!(snapshot, input());

        assert_eq!(h.published_channels().await, vec!["sale-record", "sale-record"]);
    }

    #[tokio::test]
    async fn test_explicit_minus_inputs_without_refund_id_stay_distinct() {
        let h = Harness::new(lookups()).await;

        let mut first = input();
        first.transaction_type = Some(TransactionType::Minus);
        let mut second = first.clone();
        second.order_id = 501;

        let a = h.reconciler.create_from_input(&first).await.unwrap();
        let b = h.reconciler.create_from_input(&second).await.unwrap();

        assert_eq!(a.order_id, 500);
        assert_eq!(b.order_id, 501);
        assert_ne!(a.transaction_id, b.transaction_id);
        assert_eq!(b.transaction_type, TransactionType::Minus);

        let again = h.reconciler.create_from_input(&second).await.unwrap();
        assert_eq!(again.transaction_id, b.transaction_id);
    }

    #[tokio::test]
    async fn test_create_from_input_missing_parameters() {
        let h = Harness::new(lookups()).await;

        let mut no_ids = input();
        no_ids.order_id = 0;
        let err = h.reconciler.create_from_input(&no_ids).await.unwrap_err();
        assert!(matches!(err, ServiceError::MissingParameter(_)));

        let mut no_salesman = input();
        no_salesman.salesman_id = 0;
        let err = h.reconciler.create_from_input(&no_salesman).await.unwrap_err();
        assert!(matches!(err, ServiceError::MissingParameter(_)));

        assert!(h.logs().await.is_empty());
    }

    #[tokio::test]
    async fn test_create_from_input_rule_failures_are_recorded_not_published() {
        let h = Harness::new(lookups()).await;

        let mut bad_total = input();
        bad_total.total_payment_price = Money::from_cents(8999);
        let err = h.reconciler.create_from_input(&bad_total).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TotalPrice);

        let logs = h.logs().await;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].error_type, "TotalPrice");
        assert_eq!(logs[0].order_id, 500);
        assert!(!logs[0].is_success);

        assert!(h.published_channels().await.is_empty());
    }

    #[tokio::test]
    async fn test_create_from_input_checks_store_then_sku() {
        let mut stub = lookups();
        stub.stores.get_mut(&7).unwrap().brands.clear();
        let h = Harness::new(stub).await;
        let err = h.reconciler.create_from_input(&input()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BrandNotMatch);

        let h = Harness::new(lookups()).await;
        let mut wrong_price = input();
        wrong_price.sale_record_dtl_inputs[0].list_price = Money::from_cents(9999);
        let err = h.reconciler.create_from_input(&wrong_price).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SkuListPrice);

        let h = Harness::new(lookups()).await;
        let mut unknown_sku = input();
        unknown_sku.sale_record_dtl_inputs[0].sku_id = 404;
        let err = h.reconciler.create_from_input(&unknown_sku).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SkuNotExist);

        let h = Harness::new(lookups()).await;
        let mut no_store = input();
        no_store.store_id = 0;
        let err = h.reconciler.create_from_input(&no_store).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StoreId);
    }

    #[tokio::test]
    async fn test_republish() {
        let h = Harness::new(lookups()).await;

        let record = h.reconciler.create_from_input(&input()).await.unwrap();
        let again = h.reconciler.republish(record.transaction_id).await.unwrap();
        assert_eq!(again.transaction_id, record.transaction_id);

        let err = h.reconciler.republish(9999).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));

        assert_eq!(h.published_channels().await, vec!["sale-record", "sale-record"]);
    }
}
