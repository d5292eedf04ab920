//! # Sale Record Log Repository
//!
//! One row per dedup key holding the latest attempt's outcome. Retries
//! converge on that row instead of appending.

use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use salerecord_core::query::{LogFilter, Page, SearchOutput};
use salerecord_core::{DedupKey, SaleRecordLog};

/// Repository for reconciliation outcome rows.
#[derive(Debug, Clone)]
pub struct SaleRecordLogRepository {
    pool: SqlitePool,
}

impl SaleRecordLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SaleRecordLogRepository { pool }
    }

    /// Inserts the outcome row, or overwrites the existing row for the
    /// same key.
    ///
    /// ## Conflict Update
    /// `is_success`, `error`, `error_type`, `details`, `order_entity`,
    /// `store_id` and `updated_at` take the new values. `created_at`
    /// keeps the first attempt's time.
    pub async fn upsert(&self, log: &SaleRecordLog) -> DbResult<SaleRecordLog> {
        let saved: SaleRecordLog = sqlx::query_as(
            r#"
            INSERT INTO sale_record_logs (
                tenant_code, channel_type, transaction_type, order_id, refund_id,
                store_id, error_type, error, details, is_success, order_entity,
                transaction_create_date, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            ON CONFLICT (order_id, refund_id, tenant_code, channel_type, transaction_type)
            DO UPDATE SET
                is_success   = excluded.is_success,
                error        = excluded.error,
                error_type   = excluded.error_type,
                details      = excluded.details,
                order_entity = excluded.order_entity,
                store_id     = excluded.store_id,
                updated_at   = excluded.updated_at
            RETURNING *
            "#,
        )
        .bind(&log.tenant_code)
        .bind(&log.channel_type)
        .bind(log.transaction_type)
        .bind(log.order_id)
        .bind(log.refund_id)
        .bind(log.store_id)
        .bind(&log.error_type)
        .bind(&log.error)
        .bind(&log.details)
        .bind(log.is_success)
        .bind(&log.order_entity)
        .bind(log.transaction_create_date)
        .bind(log.created_at)
        .bind(log.updated_at)
        .fetch_one(&self.pool)
        .await?;

        debug!(
            id = saved.id,
            key = %saved.dedup_key(),
            is_success = saved.is_success,
            error_type = %saved.error_type,
            "Sale record log upserted"
        );

        Ok(saved)
    }

    pub async fn find_by_key(&self, key: &DedupKey) -> DbResult<Option<SaleRecordLog>> {
        let log: Option<SaleRecordLog> = sqlx::query_as(
            r#"
            SELECT * FROM sale_record_logs
            WHERE order_id = ?1
              AND refund_id = ?2
              AND tenant_code = ?3
              AND channel_type = ?4
              AND transaction_type = ?5
            "#,
        )
        .bind(key.order_id)
        .bind(key.refund_id)
        .bind(&key.tenant_code)
        .bind(&key.channel_type)
        .bind(key.transaction_type)
        .fetch_optional(&self.pool)
        .await?;

        Ok(log)
    }

    /// Filtered, paged search ordered by id, newest first.
    pub async fn search(&self, filter: &LogFilter, page: Page) -> DbResult<SearchOutput<SaleRecordLog>> {
        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM sale_record_logs");
        push_filters(&mut count, filter);
        let total_count: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Sqlite>::new("SELECT * FROM sale_record_logs");
        push_filters(&mut select, filter);
        select
            .push(" ORDER BY id DESC LIMIT ")
            .push_bind(page.take)
            .push(" OFFSET ")
            .push_bind(page.skip);

        let items: Vec<SaleRecordLog> = select.build_query_as().fetch_all(&self.pool).await?;

        Ok(SearchOutput { total_count, items })
    }
}

fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, filter: &LogFilter) {
    qb.push(" WHERE 1 = 1");

    if let Some(error_type) = &filter.error_type {
        qb.push(" AND error_type = ").push_bind(error_type.clone());
    }
    if let Some(channel) = &filter.channel_type {
        qb.push(" AND channel_type = ").push_bind(channel.clone());
    }
    if let Some(kind) = &filter.transaction_type {
        qb.push(" AND transaction_type = ").push_bind(kind.to_uppercase());
    }
    if let Some(is_success) = filter.is_success {
        qb.push(" AND is_success = ").push_bind(is_success);
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
    if let Some(window) = &filter.window {
        qb.push(" AND created_at >= ")
            .push_bind(window.start)
            .push(" AND created_at < ")
            .push_bind(window.end);
    }
}
