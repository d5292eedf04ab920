//! # Sale Record Repository
//!
//! Persists the sale record aggregate and reads it back whole.
//!
//! ## Atomic Insert
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                   SINGLE TRANSACTION                                    │
//! │                                                                         │
//! │  1. INSERT sale_records            → transaction_id                    │
//! │  2. for each line:                                                     │
//! │       INSERT sale_record_lines     → line id                           │
//! │       INSERT sale_record_line_item_offers (line_id)                    │
//! │       INSERT sale_record_line_cart_offers (line_id)                    │
//! │  3. INSERT sale_record_cart_offers                                     │
//! │  4. INSERT sale_record_payments                                        │
//! │                                                                         │
//! │  COMMIT ← all or nothing. A dedup race fails step 1 with a             │
//! │           UNIQUE violation and nothing else is written.                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use salerecord_core::query::{Page, SaleRecordFilter, SearchOutput};
use salerecord_core::{
    CartOffer, DedupKey, ItemOffer, LineCartOffer, Payment, SaleRecord, SaleRecordLine,
};

/// Repository for sale record aggregates.
#[derive(Debug, Clone)]
pub struct SaleRecordRepository {
    pool: SqlitePool,
}

impl SaleRecordRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SaleRecordRepository { pool }
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Inserts the header, lines, offers, and payments in one transaction.
    ///
    /// ## Returns
    /// The record with `transaction_id` and every child id assigned.
    ///
    /// ## Errors
    /// `DbError::UniqueViolation` when a record with the same dedup key
    /// was committed first.
    pub async fn create(&self, mut record: SaleRecord) -> DbResult<SaleRecord> {
        debug!(key = %record.dedup_key(), lines = record.lines.len(), "Creating sale record");

        let mut tx = self.pool.begin().await?;

        let transaction_id = insert_header(&mut tx, &record).await?;
        record.transaction_id = transaction_id;

        for line in &mut record.lines {
            line.transaction_id = transaction_id;
            line.id = insert_line(&mut tx, line).await?;

            for offer in &mut line.item_offers {
                offer.transaction_id = transaction_id;
                offer.line_id = line.id;
                offer.id = insert_item_offer(&mut tx, offer).await?;
            }
            for offer in &mut line.cart_offers {
                offer.transaction_id = transaction_id;
                offer.line_id = line.id;
                offer.id = insert_line_cart_offer(&mut tx, offer).await?;
            }
        }

        for offer in &mut record.cart_offers {
            offer.transaction_id = transaction_id;
            offer.id = insert_cart_offer(&mut tx, offer).await?;
        }

        for payment in &mut record.payments {
            payment.transaction_id = transaction_id;
            payment.id = insert_payment(&mut tx, payment).await?;
        }

        tx.commit().await?;

        info!(
            transaction_id,
            key = %record.dedup_key(),
            total = %record.total_transaction_price,
            "Sale record committed"
        );

        Ok(record)
    }

    /// Overwrites the lifecycle status of a committed record.
    ///
    /// Only the status label and modification audit change. Financial
    /// fields are immutable once committed.
    pub async fn refresh_status(
        &self,
        transaction_id: i64,
        status: &str,
        now: DateTime<Utc>,
        modified_by: &str,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE sale_records SET
                transaction_status = ?2,
                transaction_update_date = ?3,
                modified = ?3,
                modified_by = ?4
            WHERE transaction_id = ?1
            "#,
        )
        .bind(transaction_id)
        .bind(status)
        .bind(now)
        .bind(modified_by)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("SaleRecord", transaction_id));
        }

        debug!(transaction_id, status, "Sale record status refreshed");
        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Finds the committed record for a dedup key.
    ///
    /// Refund keys match on `refund_id`. Order keys match on `order_id`
    /// with no refund id.
    pub async fn find_by_key(&self, key: &DedupKey) -> DbResult<Option<SaleRecord>> {
        let header: Option<SaleRecord> = if key.is_refund() {
            sqlx::query_as(
                r#"
                SELECT * FROM sale_records
                WHERE refund_id = ?1
                  AND transaction_channel_type = ?2
                  AND transaction_type = ?3
                  AND tenant_code = ?4
                "#,
            )
            .bind(key.refund_id)
            .bind(&key.channel_type)
            .bind(key.transaction_type)
            .bind(&key.tenant_code)
            .fetch_optional(&self.pool)
            .await?
        } else {
            sqlx::query_as(
                r#"
                SELECT * FROM sale_records
                WHERE order_id = ?1
                  AND refund_id = 0
                  AND transaction_channel_type = ?2
                  AND transaction_type = ?3
                  AND tenant_code = ?4
                "#,
            )
            .bind(key.order_id)
            .bind(&key.channel_type)
            .bind(key.transaction_type)
            .bind(&key.tenant_code)
            .fetch_optional(&self.pool)
            .await?
        };

        match header {
            Some(record) => Ok(Some(self.with_children(record).await?)),
            None => Ok(None),
        }
    }

    pub async fn get_by_transaction_id(&self, transaction_id: i64) -> DbResult<Option<SaleRecord>> {
        let header: Option<SaleRecord> =
            sqlx::query_as("SELECT * FROM sale_records WHERE transaction_id = ?1")
                .bind(transaction_id)
                .fetch_optional(&self.pool)
                .await?;

        match header {
            Some(record) => Ok(Some(self.with_children(record).await?)),
            None => Ok(None),
        }
    }

    /// Filtered, paged search ordered by transaction create date, newest
    /// first.
    pub async fn search(
        &self,
        filter: &SaleRecordFilter,
        page: Page,
    ) -> DbResult<SearchOutput<SaleRecord>> {
        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM sale_records");
        push_filters(&mut count, filter);
        let total_count: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Sqlite>::new("SELECT * FROM sale_records");
        push_filters(&mut select, filter);
        select
            .push(" ORDER BY transaction_create_date DESC, transaction_id DESC LIMIT ")
            .push_bind(page.take)
            .push(" OFFSET ")
            .push_bind(page.skip);

        let headers: Vec<SaleRecord> = select.build_query_as().fetch_all(&self.pool).await?;

        let mut items = Vec::with_capacity(headers.len());
        for record in headers {
            items.push(self.with_children(record).await?);
        }

        debug!(total_count, returned = items.len(), "Sale record search");
        Ok(SearchOutput { total_count, items })
    }

    /// Attaches lines (with their offers), cart offers, and payments.
    async fn with_children(&self, mut record: SaleRecord) -> DbResult<SaleRecord> {
        let transaction_id = record.transaction_id;

        let mut lines: Vec<SaleRecordLine> = sqlx::query_as(
            "SELECT * FROM sale_record_lines WHERE transaction_id = ?1 ORDER BY id",
        )
        .bind(transaction_id)
        .fetch_all(&self.pool)
        .await?;

        let item_offers: Vec<ItemOffer> = sqlx::query_as(
            "SELECT * FROM sale_record_line_item_offers WHERE transaction_id = ?1 ORDER BY id",
        )
        .bind(transaction_id)
        .fetch_all(&self.pool)
        .await?;

        let line_cart_offers: Vec<LineCartOffer> = sqlx::query_as(
            "SELECT * FROM sale_record_line_cart_offers WHERE transaction_id = ?1 ORDER BY id",
        )
        .bind(transaction_id)
        .fetch_all(&self.pool)
        .await?;

        let mut item_offers_by_line: HashMap<i64, Vec<ItemOffer>> = HashMap::new();
        for offer in item_offers {
            item_offers_by_line.entry(offer.line_id).or_default().push(offer);
        }
        let mut cart_offers_by_line: HashMap<i64, Vec<LineCartOffer>> = HashMap::new();
        for offer in line_cart_offers {
            cart_offers_by_line.entry(offer.line_id).or_default().push(offer);
        }

        for line in &mut lines {
            line.item_offers = item_offers_by_line.remove(&line.id).unwrap_or_default();
            line.cart_offers = cart_offers_by_line.remove(&line.id).unwrap_or_default();
        }

        record.lines = lines;

        record.cart_offers = sqlx::query_as(
            "SELECT * FROM sale_record_cart_offers WHERE transaction_id = ?1 ORDER BY id",
        )
        .bind(transaction_id)
        .fetch_all(&self.pool)
        .await?;

        record.payments = sqlx::query_as(
            "SELECT * FROM sale_record_payments WHERE transaction_id = ?1 ORDER BY seq_no, id",
        )
        .bind(transaction_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(record)
    }
}

// =============================================================================
// Search Filters
// =============================================================================

fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, filter: &SaleRecordFilter) {
    qb.push(" WHERE 1 = 1");

    if let Some(tenant) = &filter.tenant_code {
        qb.push(" AND tenant_code = ").push_bind(tenant.clone());
    }
    if let Some(id) = filter.customer_id {
        qb.push(" AND customer_id = ").push_bind(id);
    }
    if let Some(id) = filter.created_id {
        qb.push(" AND transaction_created_id = ").push_bind(id);
    }
    if let Some(status) = &filter.status {
        qb.push(" AND transaction_status = ").push_bind(status.clone());
    }
    if let Some(kind) = &filter.transaction_type {
        qb.push(" AND transaction_type = ").push_bind(kind.to_uppercase());
    }
    if let Some(channel) = &filter.channel_type {
        qb.push(" AND transaction_channel_type = ").push_bind(channel.clone());
    }
    if let Some(id) = filter.salesman_id {
        qb.push(" AND salesman_id = ").push_bind(id);
    }
    if let Some(emp_id) = &filter.emp_id {
        qb.push(" AND emp_id = ").push_bind(emp_id.clone());
    }
    if let Some(id) = filter.store_id {
        qb.push(" AND store_id = ").push_bind(id);
    }
    if let Some(id) = filter.order_id {
        qb.push(" AND order_id = ").push_bind(id);
    }
    if let Some(id) = filter.refund_id {
        qb.push(" AND refund_id = ").push_bind(id);
    }
    push_in(qb, "order_id", &filter.order_ids);
    push_in(qb, "refund_id", &filter.refund_ids);
    if let Some(no) = &filter.outer_order_no {
        qb.push(" AND outer_order_no = ").push_bind(no.clone());
    }
    if let Some(out_paid) = filter.is_out_paid {
        qb.push(" AND is_out_paid = ").push_bind(out_paid);
    }
    if let Some(window) = &filter.window {
        qb.push(" AND transaction_create_date >= ")
            .push_bind(window.start)
            .push(" AND transaction_create_date < ")
            .push_bind(window.end);
    }
}

fn push_in(qb: &mut QueryBuilder<'_, Sqlite>, column: &str, ids: &[i64]) {
    if ids.is_empty() {
        return;
    }
    qb.push(" AND ").push(column).push(" IN (");
    let mut values = qb.separated(", ");
    for id in ids {
        values.push_bind(*id);
    }
    values.push_unseparated(")");
}

// =============================================================================
// Inserts (inside the create transaction)
// =============================================================================

async fn insert_header(conn: &mut SqliteConnection, r: &SaleRecord) -> DbResult<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO sale_records (
            tenant_code, store_id, channel_id, order_id, refund_id,
            outer_order_no, customer_id, emp_id,
            salesman_id, salesman_emp_id, salesman_shop_code,
            is_refund, is_out_paid, transaction_type, transaction_channel_type,
            transaction_status, transaction_create_date, transaction_update_date,
            transaction_created_id,
            total_list_price, total_sale_price, total_discount_price,
            total_transaction_price, discount_offer_price, discount_coupon_price,
            freight_price, cash_price, mileage, mileage_price, obtain_mileage,
            base_trim_code, created, created_by, modified, modified_by
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5,
            ?6, ?7, ?8,
            ?9, ?10, ?11,
            ?12, ?13, ?14, ?15,
            ?16, ?17, ?18,
            ?19,
            ?20, ?21, ?22,
            ?23, ?24, ?25,
            ?26, ?27, ?28, ?29, ?30,
            ?31, ?32, ?33, ?34, ?35
        )
        "#,
    )
    .bind(&r.tenant_code)
    .bind(r.store_id)
    .bind(r.channel_id)
    .bind(r.order_id)
    .bind(r.refund_id)
    .bind(&r.outer_order_no)
    .bind(r.customer_id)
    .bind(&r.emp_id)
    .bind(r.salesman_id)
    .bind(&r.salesman_emp_id)
    .bind(&r.salesman_shop_code)
    .bind(r.is_refund)
    .bind(r.is_out_paid)
    .bind(r.transaction_type)
    .bind(&r.transaction_channel_type)
    .bind(&r.transaction_status)
    .bind(r.transaction_create_date)
    .bind(r.transaction_update_date)
    .bind(r.transaction_created_id)
    .bind(r.total_list_price)
    .bind(r.total_sale_price)
    .bind(r.total_discount_price)
    .bind(r.total_transaction_price)
    .bind(r.discount_offer_price)
    .bind(r.discount_coupon_price)
    .bind(r.freight_price)
    .bind(r.cash_price)
    .bind(r.mileage)
    .bind(r.mileage_price)
    .bind(r.obtain_mileage)
    .bind(&r.base_trim_code)
    .bind(r.created)
    .bind(&r.created_by)
    .bind(r.modified)
    .bind(&r.modified_by)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

async fn insert_line(conn: &mut SqliteConnection, l: &SaleRecordLine) -> DbResult<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO sale_record_lines (
            transaction_id, order_item_id, refund_item_id,
            brand_id, brand_code, item_code, item_name,
            product_id, sku_id, sku_img,
            item_fee, fee_rate, list_price, sale_price, quantity,
            distributed_cash_price, total_distributed_cart_offer_price,
            total_distributed_item_offer_price, total_distributed_payment_price,
            total_list_price, total_sale_price, total_discount_price,
            total_transaction_price, mileage, mileage_price, obtain_mileage,
            is_delivery, status, created, created_by, modified, modified_by
        ) VALUES (
            ?1, ?2, ?3,
            ?4, ?5, ?6, ?7,
            ?8, ?9, ?10,
            ?11, ?12, ?13, ?14, ?15,
            ?16, ?17,
            ?18, ?19,
            ?20, ?21, ?22,
            ?23, ?24, ?25, ?26,
            ?27, ?28, ?29, ?30, ?31, ?32
        )
        "#,
    )
    .bind(l.transaction_id)
    .bind(l.order_item_id)
    .bind(l.refund_item_id)
    .bind(l.brand_id)
    .bind(&l.brand_code)
    .bind(&l.item_code)
    .bind(&l.item_name)
    .bind(l.product_id)
    .bind(l.sku_id)
    .bind(&l.sku_img)
    .bind(l.item_fee)
    .bind(l.fee_rate)
    .bind(l.list_price)
    .bind(l.sale_price)
    .bind(l.quantity)
    .bind(l.distributed_cash_price)
    .bind(l.total_distributed_cart_offer_price)
    .bind(l.total_distributed_item_offer_price)
    .bind(l.total_distributed_payment_price)
    .bind(l.total_list_price)
    .bind(l.total_sale_price)
    .bind(l.total_discount_price)
    .bind(l.total_transaction_price)
    .bind(l.mileage)
    .bind(l.mileage_price)
    .bind(l.obtain_mileage)
    .bind(l.is_delivery)
    .bind(&l.status)
    .bind(l.created)
    .bind(&l.created_by)
    .bind(l.modified)
    .bind(&l.modified_by)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

async fn insert_item_offer(conn: &mut SqliteConnection, o: &ItemOffer) -> DbResult<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO sale_record_line_item_offers (
            transaction_id, line_id, tenant_code, offer_no, coupon_no,
            item_code, item_codes, price, offer_type, target_type
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
    )
    .bind(o.transaction_id)
    .bind(o.line_id)
    .bind(&o.tenant_code)
    .bind(&o.offer_no)
    .bind(&o.coupon_no)
    .bind(&o.item_code)
    .bind(&o.item_codes)
    .bind(o.price)
    .bind(&o.offer_type)
    .bind(&o.target_type)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

async fn insert_line_cart_offer(conn: &mut SqliteConnection, o: &LineCartOffer) -> DbResult<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO sale_record_line_cart_offers (
            transaction_id, line_id, offer_no, coupon_no,
            offer_type, target_type, is_target, price
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(o.transaction_id)
    .bind(o.line_id)
    .bind(&o.offer_no)
    .bind(&o.coupon_no)
    .bind(&o.offer_type)
    .bind(&o.target_type)
    .bind(o.is_target)
    .bind(o.price)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

async fn insert_cart_offer(conn: &mut SqliteConnection, o: &CartOffer) -> DbResult<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO sale_record_cart_offers (
            transaction_id, tenant_code, offer_no, coupon_no,
            item_ids, target_item_ids, price, offer_type, target_type
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
    )
    .bind(o.transaction_id)
    .bind(&o.tenant_code)
    .bind(&o.offer_no)
    .bind(&o.coupon_no)
    .bind(&o.item_ids)
    .bind(&o.target_item_ids)
    .bind(o.price)
    .bind(&o.offer_type)
    .bind(&o.target_type)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

async fn insert_payment(conn: &mut SqliteConnection, p: &Payment) -> DbResult<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO sale_record_payments (
            transaction_id, seq_no, pay_method, pay_amt, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
    )
    .bind(p.transaction_id)
    .bind(p.seq_no)
    .bind(&p.pay_method)
    .bind(p.pay_amt)
    .bind(p.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

// =============================================================================
// Unit Tests
// =============================================================================
