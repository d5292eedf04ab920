//! # HTTP API
//!
//! ```text
//! GET  /ping                                      liveness
//! GET  /whoami                                    service name
//! GET  /v1/sale-records                           search
//! POST /v1/sale-records                           create from input
//! GET  /v1/sale-records/get-by-orderId/{id}       PLUS record of an order
//! GET  /v1/sale-records/get-by-refundId/{id}      MINUS record of a refund
//! GET  /v1/sale-records/get-by-transactionId/{id}
//! GET  /v1/sale-records/republish/{transactionId}
//! POST /v1/order-events                           reconcile one event now
//! GET  /v1/sale-record-log                        outcome log search
//! ```
//!
//! Every JSON response is wrapped in [`ApiEnvelope`].

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::debug;

use salerecord_core::event::Event;
use salerecord_core::input::SaleRecordInput;
use salerecord_core::query::{LogQuery, Page, QuerySettings, SaleRecordFilter, SaleRecordQuery, SearchOutput};
use salerecord_core::{SaleRecord, SaleRecordLog, TransactionType};

use crate::error::{ApiEnvelope, ServiceError, ServiceResult};
use crate::reconcile::{EventOutcome, Reconciler};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub reconciler: Reconciler,
    pub query_settings: QuerySettings,
    pub service_name: Arc<str>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ping", get(ping))
        .route("/whoami", get(whoami))
        .route("/v1/sale-records", get(search_sale_records).post(create_sale_record))
        .route("/v1/sale-records/get-by-orderId/{id}", get(get_by_order_id))
        .route("/v1/sale-records/get-by-refundId/{id}", get(get_by_refund_id))
        .route("/v1/sale-records/get-by-transactionId/{id}", get(get_by_transaction_id))
        .route("/v1/sale-records/republish/{transaction_id}", get(republish))
        .route("/v1/order-events", post(handle_order_event))
        .route("/v1/sale-record-log", get(search_logs))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn ping() -> &'static str {
    "pong"
}

async fn whoami(State(state): State<AppState>) -> String {
    state.service_name.to_string()
}

// =============================================================================
// Sale Records
// =============================================================================

async fn search_sale_records(
    State(state): State<AppState>,
    Query(query): Query<SaleRecordQuery>,
) -> ServiceResult<ApiEnvelope<SearchOutput<SaleRecord>>> {
    let repo = state.reconciler.database().sale_records();

    if let Some(transaction_id) = query.transaction_id() {
        let items: Vec<SaleRecord> = repo.get_by_transaction_id(transaction_id).await?.into_iter().collect();
        return Ok(ApiEnvelope::ok(SearchOutput {
            total_count: items.len() as i64,
            items,
        }));
    }

    let filter = query.to_filter(&state.query_settings, Utc::now());
    debug!(?filter, "Searching sale records");
    let output = repo.search(&filter, query.page()).await?;
    Ok(ApiEnvelope::ok(output))
}

async fn create_sale_record(
    State(state): State<AppState>,
    Json(input): Json<SaleRecordInput>,
) -> ServiceResult<ApiEnvelope<SaleRecord>> {
    let record = state.reconciler.create_from_input(&input).await?;
    Ok(ApiEnvelope::ok(record))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct KeyQuery {
    channel_type: String,
    tenant_code: String,
}

async fn get_by_order_id(
    State(state): State<AppState>,
    Path(order_id): Path<i64>,
    Query(key): Query<KeyQuery>,
) -> ServiceResult<ApiEnvelope<SaleRecord>> {
    if order_id == 0 {
        return Err(ServiceError::MissingParameter("orderId".to_string()));
    }
    let filter = SaleRecordFilter {
        order_id: Some(order_id),
        ..key_filter(&state, &key, TransactionType::Plus)
    };
    find_one(&state, &filter, format!("SaleRecord for order {order_id}")).await
}

async fn get_by_refund_id(
    State(state): State<AppState>,
    Path(refund_id): Path<i64>,
    Query(key): Query<KeyQuery>,
) -> ServiceResult<ApiEnvelope<SaleRecord>> {
    if refund_id == 0 {
        return Err(ServiceError::MissingParameter("refundId".to_string()));
    }
    let filter = SaleRecordFilter {
        refund_id: Some(refund_id),
        ..key_filter(&state, &key, TransactionType::Minus)
    };
    find_one(&state, &filter, format!("SaleRecord for refund {refund_id}")).await
}

/// Tenant and type are always matched. An empty channel matches any.
fn key_filter(state: &AppState, key: &KeyQuery, transaction_type: TransactionType) -> SaleRecordFilter {
    SaleRecordFilter {
        tenant_code: Some(state.reconciler.tenant_or_default(&key.tenant_code).to_string()),
        transaction_type: Some(transaction_type.as_str().to_string()),
        channel_type: (!key.channel_type.is_empty()).then(|| key.channel_type.clone()),
        ..SaleRecordFilter::default()
    }
}

async fn find_one(
    state: &AppState,
    filter: &SaleRecordFilter,
    what: String,
) -> ServiceResult<ApiEnvelope<SaleRecord>> {
    let output = state
        .reconciler
        .database()
        .sale_records()
        .search(filter, Page::new(0, 1))
        .await?;
    output
        .items
        .into_iter()
        .next()
        .map(ApiEnvelope::ok)
        .ok_or(ServiceError::NotFound(what))
}

async fn get_by_transaction_id(
    State(state): State<AppState>,
    Path(transaction_id): Path<i64>,
) -> ServiceResult<ApiEnvelope<SaleRecord>> {
    if transaction_id == 0 {
        return Err(ServiceError::MissingParameter("transactionId".to_string()));
    }
    state
        .reconciler
        .database()
        .sale_records()
        .get_by_transaction_id(transaction_id)
        .await?
        .map(ApiEnvelope::ok)
        .ok_or_else(|| ServiceError::NotFound(format!("SaleRecord {transaction_id}")))
}

async fn republish(
    State(state): State<AppState>,
    Path(transaction_id): Path<i64>,
) -> ServiceResult<ApiEnvelope<SaleRecord>> {
    if transaction_id == 0 {
        return Err(ServiceError::MissingParameter("transactionId".to_string()));
    }
    let record = state.reconciler.republish(transaction_id).await?;
    Ok(ApiEnvelope::ok(record))
}

// =============================================================================
// Order Events
// =============================================================================

/// Result of a synchronously handled event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventResult {
    pub outcome: String,
    pub sale_record: Option<SaleRecord>,
}

async fn handle_order_event(
    State(state): State<AppState>,
    Json(event): Json<Event>,
) -> ServiceResult<ApiEnvelope<EventResult>> {
    let (outcome, sale_record) = match state.reconciler.handle_event(&event).await {
        EventOutcome::Skipped => ("Skipped", None),
        EventOutcome::Duplicate(record) => ("Duplicate", Some(record)),
        EventOutcome::Committed(record) => ("Committed", Some(record)),
        EventOutcome::Failed(kind) => return Err(kind.into()),
    };
    Ok(ApiEnvelope::ok(EventResult {
        outcome: outcome.to_string(),
        sale_record,
    }))
}

// =============================================================================
// Outcome Log
// =============================================================================

async fn search_logs(
    State(state): State<AppState>,
    Query(query): Query<LogQuery>,
) -> ServiceResult<ApiEnvelope<SearchOutput<SaleRecordLog>>> {
    let filter = query.to_filter(&state.query_settings, Utc::now());
    let output = state
        .reconciler
        .database()
        .sale_record_logs()
        .search(&filter, query.page())
        .await?;
    Ok(ApiEnvelope::ok(output))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiErrorBody;
    use crate::test_support::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde::de::DeserializeOwned;
    use tower::ServiceExt;

    fn app(h: &Harness) -> Router {
        router(AppState {
            reconciler: h.reconciler.clone(),
            query_settings: QuerySettings::default(),
            service_name: Arc::from("sale-record-api"),
        })
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    async fn get_json<T: DeserializeOwned>(app: &Router, uri: &str) -> (StatusCode, ApiEnvelope<T>) {
        let (status, body) = send(app, Request::get(uri).body(Body::empty()).unwrap()).await;
        (status, serde_json::from_slice(&body).unwrap())
    }

    async fn post_json<T: DeserializeOwned>(
        app: &Router,
        uri: &str,
        body: &impl Serialize,
    ) -> (StatusCode, ApiEnvelope<T>) {
        let request = Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(body).unwrap()))
            .unwrap();
        let (status, body) = send(app, request).await;
        (status, serde_json::from_slice(&body).unwrap())
    }

    fn error_of<T>(envelope: ApiEnvelope<T>) -> ApiErrorBody {
        assert!(!envelope.success);
        envelope.error.unwrap()
    }

    #[tokio::test]
    async fn test_ping_and_whoami() {
        let h = Harness::new(lookups()).await;
        let app = app(&h);

        let (status, body) = send(&app, Request::get("/ping").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"pong");

        let (_, body) = send(&app, Request::get("/whoami").body(Body::empty()).unwrap()).await;
        assert_eq!(body, b"sale-record-api");
    }

    #[tokio::test]
    async fn test_create_then_fetch_by_keys() {
        let h = Harness::new(lookups()).await;
        let app = app(&h);

        let (status, created) = post_json::<SaleRecord>(&app, "/v1/sale-records", &input()).await;
        assert_eq!(status, StatusCode::OK);
        let created = created.result.unwrap();

        let (status, found) = get_json::<SaleRecord>(
            &app,
            "/v1/sale-records/get-by-orderId/500?channelType=POS",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(found.result.unwrap().transaction_id, created.transaction_id);

        let uri = format!("/v1/sale-records/get-by-transactionId/{}", created.transaction_id);
        let (status, found) = get_json::<SaleRecord>(&app, &uri).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(found.result.unwrap().lines.len(), 1);

        // Wrong channel, wrong tenant, and wrong transaction type all miss.
        let (status, _) = get_json::<SaleRecord>(
            &app,
            "/v1/sale-records/get-by-orderId/500?channelType=EMALL",
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = get_json::<SaleRecord>(
            &app,
            "/v1/sale-records/get-by-orderId/500?tenantCode=other",
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = get_json::<SaleRecord>(&app, "/v1/sale-records/get-by-refundId/500").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_zero_ids_are_missing_parameters() {
        let h = Harness::new(lookups()).await;
        let app = app(&h);

        for uri in [
            "/v1/sale-records/get-by-orderId/0",
            "/v1/sale-records/get-by-refundId/0",
            "/v1/sale-records/get-by-transactionId/0",
            "/v1/sale-records/republish/0",
        ] {
            let (status, envelope) = get_json::<SaleRecord>(&app, uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(error_of(envelope).code, "MissParameter");
        }
    }

    #[tokio::test]
    async fn test_create_rejection_envelope() {
        let h = Harness::new(lookups()).await;
        let app = app(&h);

        let mut bad = input();
        bad.total_payment_price = salerecord_core::Money::from_cents(1);
        let (status, envelope) = post_json::<SaleRecord>(&app, "/v1/sale-records", &bad).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        let error = error_of(envelope);
        assert_eq!(error.code, "TotalPrice");
        assert_eq!(error.message, "总金额计算错误！");
        assert_eq!(error.details, "TotalPrice not equals sum dtl price");

        let (status, logs) = get_json::<SearchOutput<SaleRecordLog>>(
            &app,
            "/v1/sale-record-log?orderId=500&isSuccess=false",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let logs = logs.result.unwrap();
        assert_eq!(logs.total_count, 1);
        assert_eq!(logs.items[0].error_type, "TotalPrice");
    }

    #[tokio::test]
    async fn test_order_event_endpoint() {
        let h = Harness::new(lookups()).await;
        let app = app(&h);

        let (status, envelope) =
            post_json::<EventResult>(&app, "/v1/order-events", &order_event("SaleOrderSuccess")).await;
        assert_eq!(status, StatusCode::OK);
        let result = envelope.result.unwrap();
        assert_eq!(result.outcome, "Committed");
        let transaction_id = result.sale_record.unwrap().transaction_id;

        let (_, envelope) =
            post_json::<EventResult>(&app, "/v1/order-events", &order_event("SaleOrderSuccess")).await;
        assert_eq!(envelope.result.unwrap().outcome, "Duplicate");

        let (_, envelope) =
            post_json::<EventResult>(&app, "/v1/order-events", &order_event("SaleOrderProcessing")).await;
        let result = envelope.result.unwrap();
        assert_eq!(result.outcome, "Skipped");
        assert!(result.sale_record.is_none());

        let mut bad = order_event("SaleOrderSuccess");
        bad.payload.id = 101;
        bad.payload.created_id = 0;
        let (status, envelope) = post_json::<EventResult>(&app, "/v1/order-events", &bad).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error_of(envelope).code, "CreatedId");

        let uri = format!("/v1/sale-records?transactionId={transaction_id}");
        let (_, envelope) = get_json::<SearchOutput<SaleRecord>>(&app, &uri).await;
        assert_eq!(envelope.result.unwrap().total_count, 1);
    }

    #[tokio::test]
    async fn test_republish_and_not_found() {
        let h = Harness::new(lookups()).await;
        let app = app(&h);

        let (_, created) = post_json::<SaleRecord>(&app, "/v1/sale-records", &input()).await;
        let transaction_id = created.result.unwrap().transaction_id;

        let uri = format!("/v1/sale-records/republish/{transaction_id}");
        let (status, _) = get_json::<SaleRecord>(&app, &uri).await;
        assert_eq!(status, StatusCode::OK);

        let (status, envelope) = get_json::<SaleRecord>(&app, "/v1/sale-records/republish/9999").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(error_of(envelope).code, "404");

        assert_eq!(h.published_channels().await, vec!["sale-record", "sale-record"]);
    }
}
