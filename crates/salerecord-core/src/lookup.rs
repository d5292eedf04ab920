//! # Lookup Contracts
//!
//! Response shapes of the remote Store, Item, Sku, Coupon, Member and
//! Payment services. The service crate fetches these; the core only reads
//! them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Money;

// =============================================================================
// Store
// =============================================================================

/// A store with its enabled brands and rounding configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Store {
    pub id: i64,
    pub tenant_code: String,
    pub code: String,
    pub name: String,
    pub enable: bool,
    pub rounding_type: Option<RoundingType>,
    pub brands: Vec<StoreBrand>,
}

impl Store {
    /// Checks whether `(brand_id, brand_code)` is one of the store's brands.
    pub fn has_brand(&self, brand_id: i64, brand_code: &str) -> bool {
        self.brands
            .iter()
            .any(|b| b.id == brand_id && b.code == brand_code)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreBrand {
    pub id: i64,
    pub code: String,
    pub enable: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoundingType {
    /// Trim code, see [`crate::rounding`].
    pub code: String,
    pub precision: f64,
    pub offset: i64,
}

/// Paged store list returned by the store service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreList {
    pub items: Vec<Store>,
    pub total_count: i64,
}

// =============================================================================
// Item / Sku / Product
// =============================================================================

/// Catalog item looked up by item code.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Item {
    pub sale_price: Money,
    pub name: String,
    pub offer: Option<ItemOfferInfo>,
    pub sku: Sku,
    pub bar_code: String,
}

/// Item-level promotion attached to a catalog item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ItemOfferInfo {
    pub no: String,
    pub name: String,
    pub discount_price: Money,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Sku {
    pub product: Product,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Product {
    pub id: i64,
    pub code: String,
    pub list_price: Money,
    pub brand: Brand,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Brand {
    pub id: i64,
    pub code: String,
}

// =============================================================================
// Coupon / Member
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Coupon {
    pub coupon_no: String,
    pub is_internal: bool,
}

/// Membership record. Only the linked employee number matters here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Member {
    pub id: i64,
    pub hr_emp_no: String,
    pub tenant_code: String,
    pub card_no: String,
    pub member_name: String,
}

// =============================================================================
// Payment
// =============================================================================

/// Which settlement rows to fetch: exactly one of order or refund.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentQuery {
    Order(i64),
    Refund(i64),
}

/// Settlement row from the payment service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PaymentRow {
    pub id: i64,
    pub order_id: i64,
    pub refund_order_id: i64,
    pub seq_no: i64,
    pub pay_method: String,
    pub pay_amt: Money,
    pub status: String,
    pub tenant_code: String,
    pub created_at: Option<DateTime<Utc>>,
}
