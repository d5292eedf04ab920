//! # Lookup Services
//!
//! Remote reads the reconciler needs: store, item, sku, coupon, member
//! and settlement payments.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Lookup Flow                                     │
//! │                                                                         │
//! │  Reconciler ──► dyn Lookups                                            │
//! │                    │                                                    │
//! │                    ├── HttpLookups (production, reqwest)               │
//! │                    └── stub impls (tests)                               │
//! │                                                                         │
//! │  Every response is wrapped in { result, success, error{code,message} } │
//! │  success == false       ──► LookupError::Remote                        │
//! │  HTTP 404 / empty list  ──► Ok(None) (caller decides what absence is)  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Calls are made one at a time by the caller. No caching.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use salerecord_core::lookup::{Coupon, Item, Member, PaymentQuery, PaymentRow, Sku, Store, StoreList};

use crate::config::ServiceEndpoints;

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    /// The remote service answered `success: false`.
    #[error("Get {entity} error:[{code}]{message}")]
    Remote {
        entity: &'static str,
        code: i64,
        message: String,
    },

    #[error("Fail to get customer")]
    MemberUnavailable,

    #[error("{entity} lookup returned HTTP {status}")]
    Status { entity: &'static str, status: u16 },

    #[error("{entity} lookup failed: {source}")]
    Transport {
        entity: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

pub type LookupResult<T> = Result<T, LookupError>;

// =============================================================================
// Trait
// =============================================================================

/// Read-only view of the collaborating services.
#[async_trait]
pub trait Lookups: Send + Sync {
    async fn store(&self, store_id: i64) -> LookupResult<Option<Store>>;

    async fn item(&self, item_code: &str) -> LookupResult<Option<Item>>;

    async fn sku(&self, sku_id: i64) -> LookupResult<Option<Sku>>;

    async fn coupon(&self, coupon_no: &str) -> LookupResult<Option<Coupon>>;

    async fn member(&self, customer_id: i64, tenant_code: &str) -> LookupResult<Option<Member>>;

    /// Settlement rows. An empty list is returned as-is.
    async fn payments(&self, query: PaymentQuery) -> LookupResult<Vec<PaymentRow>>;
}

// =============================================================================
// HTTP Implementation
// =============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RemoteError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(bound = "T: DeserializeOwned")]
struct RemoteEnvelope<T> {
    #[serde(default)]
    result: Option<T>,
    #[serde(default)]
    success: bool,
    #[serde(default)]
    error: Option<RemoteError>,
}

impl<T> RemoteEnvelope<T> {
    fn into_result(self, entity: &'static str) -> LookupResult<Option<T>> {
        if !self.success {
            let error = self.error.unwrap_or_default();
            return Err(LookupError::Remote {
                entity,
                code: error.code,
                message: error.message,
            });
        }
        Ok(self.result)
    }
}

/// Lookups over HTTP.
#[derive(Debug, Clone)]
pub struct HttpLookups {
    client: reqwest::Client,
    endpoints: ServiceEndpoints,
}

impl HttpLookups {
    pub fn new(endpoints: ServiceEndpoints, timeout: Duration) -> LookupResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(LookupError::Client)?;

        Ok(HttpLookups { client, endpoints })
    }

    /// GETs `url` and unwraps the envelope. A 404 is `Ok(None)`.
    async fn fetch<T: DeserializeOwned>(
        &self,
        entity: &'static str,
        url: String,
    ) -> LookupResult<Option<RemoteEnvelope<T>>> {
        debug!(entity, %url, "Lookup request");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| LookupError::Transport { entity, source })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            warn!(entity, %url, status = status.as_u16(), "Lookup failed");
            return Err(LookupError::Status {
                entity,
                status: status.as_u16(),
            });
        }

        let envelope = response
            .json::<RemoteEnvelope<T>>()
            .await
            .map_err(|source| LookupError::Transport { entity, source })?;

        Ok(Some(envelope))
    }

    async fn get<T: DeserializeOwned>(&self, entity: &'static str, url: String) -> LookupResult<Option<T>> {
        match self.fetch::<T>(entity, url).await? {
            Some(envelope) => envelope.into_result(entity),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl Lookups for HttpLookups {
    async fn store(&self, store_id: i64) -> LookupResult<Option<Store>> {
        let url = format!(
            "{}/v1/store/getallinfo?storeIds={}&enable=true&withBrand=true&withRoundingType=true&maxResultCount=100",
            self.endpoints.place_management_addr, store_id
        );
        let list: Option<StoreList> = self.get("store", url).await?;

        Ok(list
            .filter(|l| l.total_count > 0)
            .and_then(|l| l.items.into_iter().next()))
    }

    async fn item(&self, item_code: &str) -> LookupResult<Option<Item>> {
        let url = format!("{}/v1/items/{}", self.endpoints.product_api, item_code);
        self.get("item", url).await
    }

    async fn sku(&self, sku_id: i64) -> LookupResult<Option<Sku>> {
        let url = format!("{}/v1/skus/{}", self.endpoints.product_api, sku_id);
        self.get("sku", url).await
    }

    async fn coupon(&self, coupon_no: &str) -> LookupResult<Option<Coupon>> {
        let url = format!("{}/v1/coupons/{}", self.endpoints.coupon_addr, coupon_no);
        self.get("Coupon", url).await
    }

    async fn member(&self, customer_id: i64, tenant_code: &str) -> LookupResult<Option<Member>> {
        let url = format!(
            "{}/v1/member?memberId={}&tenantCode={}",
            self.endpoints.membership_addr, customer_id, tenant_code
        );
        match self.fetch::<Member>("member", url).await? {
            Some(envelope) if !envelope.success => Err(LookupError::MemberUnavailable),
            Some(envelope) => Ok(envelope.result),
            None => Ok(None),
        }
    }

    async fn payments(&self, query: PaymentQuery) -> LookupResult<Vec<PaymentRow>> {
        let url = match query {
            PaymentQuery::Order(id) => format!("{}/v1/query/orderId/{}", self.endpoints.payamt_api, id),
            PaymentQuery::Refund(id) => format!("{}/v1/query/refundId/{}", self.endpoints.payamt_api, id),
        };

        // The success flag is not consulted: an empty list is the only
        // signal the caller acts on.
        let rows = self
            .fetch::<Vec<PaymentRow>>("payment", url)
            .await?
            .and_then(|envelope| envelope.result)
            .unwrap_or_default();

        debug!(?query, count = rows.len(), "Payments fetched");
        Ok(rows)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
