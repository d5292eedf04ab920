//! # Error Types
//!
//! Domain error types for salerecord-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  salerecord-core (this file)                                           │
//! │  ├── ErrorKind   - Closed taxonomy: tag + message + localized detail    │
//! │  └── CoreError   - Rule violations and configuration errors            │
//! │                                                                         │
//! │  salerecord-db                                                         │
//! │  └── DbError     - Database operation failures                         │
//! │                                                                         │
//! │  sale-record-api                                                       │
//! │  └── ServiceError - Lookup, broker, database and core errors           │
//! │                                                                         │
//! │  Every error resolves to exactly one ErrorKind before it is recorded   │
//! │  in the sale record log or published as a failure event.               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// =============================================================================
// Error Kind
// =============================================================================

/// Stable classification of every way a sale record can be rejected.
///
/// ## Fields Per Kind
/// - [`tag`](ErrorKind::tag): stable identifier stored in `error_type`
/// - [`message`](ErrorKind::message): diagnostic text stored in `error`
/// - [`detail`](ErrorKind::detail): localized text shown to users
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    ItemFeeRate,
    CreatedId,
    #[serde(rename = "POSSalesmanId")]
    PosSalesmanId,
    StoreId,
    TotalPrice,
    DiscountPrice,
    DiscountPriceNotMatchOffer,
    OfferNo,
    StoreNotExist,
    BrandNotMatch,
    SkuNotExist,
    ProductNotMatch,
    SkuListPrice,
    ProductBrand,
    DistributedCashPrice,
    TotalDistributedPaymentPrice,
    Mileage,
    PayMentNotExist,
    /// Anything that is not a business rule: lookups, storage, config.
    SaleRecord,
}

impl ErrorKind {
    /// Stable tag persisted as `error_type`.
    pub const fn tag(&self) -> &'static str {
        match self {
            ErrorKind::ItemFeeRate => "ItemFeeRate",
            ErrorKind::CreatedId => "CreatedId",
            ErrorKind::PosSalesmanId => "POSSalesmanId",
            ErrorKind::StoreId => "StoreId",
            ErrorKind::TotalPrice => "TotalPrice",
            ErrorKind::DiscountPrice => "DiscountPrice",
            ErrorKind::DiscountPriceNotMatchOffer => "DiscountPriceNotMatchOffer",
            ErrorKind::OfferNo => "OfferNo",
            ErrorKind::StoreNotExist => "StoreNotExist",
            ErrorKind::BrandNotMatch => "BrandNotMatch",
            ErrorKind::SkuNotExist => "SkuNotExist",
            ErrorKind::ProductNotMatch => "ProductNotMatch",
            ErrorKind::SkuListPrice => "SkuListPrice",
            ErrorKind::ProductBrand => "ProductBrand",
            ErrorKind::DistributedCashPrice => "DistributedCashPrice",
            ErrorKind::TotalDistributedPaymentPrice => "TotalDistributedPaymentPrice",
            ErrorKind::Mileage => "Mileage",
            ErrorKind::PayMentNotExist => "PayMentNotExist",
            ErrorKind::SaleRecord => "SaleRecord",
        }
    }

    /// Diagnostic message. `SaleRecord` has none of its own; the wrapped
    /// error's text is used instead.
    pub const fn message(&self) -> &'static str {
        match self {
            ErrorKind::ItemFeeRate => "Item FeeRate not avalable 0",
            ErrorKind::CreatedId => "CreatedId not avalable 0",
            ErrorKind::PosSalesmanId => "POS then SalesmanId not avalable 0",
            ErrorKind::StoreId => "StoreId not avalable 0",
            ErrorKind::TotalPrice => "TotalPrice not equals sum dtl price",
            ErrorKind::DiscountPrice => "DiscountPrice not correct",
            ErrorKind::DiscountPriceNotMatchOffer => "DiscountPrice not equals sum cartoffer's price",
            ErrorKind::OfferNo => "OfferNo not avalable",
            ErrorKind::StoreNotExist => "Store is not exists",
            ErrorKind::BrandNotMatch => "Store and Brand can't match",
            ErrorKind::SkuNotExist => "Sku is not exists",
            ErrorKind::ProductNotMatch => "Sku and Product can't match",
            ErrorKind::SkuListPrice => "Sku's listprice not correct",
            ErrorKind::ProductBrand => "Product's brand is not correct",
            ErrorKind::DistributedCashPrice => "Distributed CashPrice is not correct",
            ErrorKind::TotalDistributedPaymentPrice => "Distributed PaymentPrice is not correct",
            ErrorKind::Mileage => "Mileage is not correct",
            ErrorKind::PayMentNotExist => "PayMent not exists",
            ErrorKind::SaleRecord => "SaleRecord processing failed",
        }
    }

    /// Localized user-facing detail.
    pub const fn detail(&self) -> &'static str {
        match self {
            ErrorKind::ItemFeeRate => "正常扣率为0！",
            ErrorKind::CreatedId => "登录人员信息错误！",
            ErrorKind::PosSalesmanId => "销售人员信息错误！",
            ErrorKind::StoreId => "卖场代码为空！",
            ErrorKind::TotalPrice => "总金额计算错误！",
            ErrorKind::DiscountPrice => "折扣金额计算错误！",
            ErrorKind::DiscountPriceNotMatchOffer => "折扣金额和促销金额不匹配！",
            ErrorKind::OfferNo => "促销信息异常！",
            ErrorKind::StoreNotExist => "卖场信息异常！",
            ErrorKind::BrandNotMatch => "卖场品牌信息不匹配！",
            ErrorKind::SkuNotExist => "商品信息异常！",
            ErrorKind::ProductNotMatch => "商品信息不匹配！",
            ErrorKind::SkuListPrice => "商品吊牌金额不匹配！",
            ErrorKind::ProductBrand => "商品品牌信息不匹配！",
            ErrorKind::DistributedCashPrice => "商品实付金额计算错误！",
            ErrorKind::TotalDistributedPaymentPrice => "商品支付金额计算错误！",
            ErrorKind::Mileage => "积分计算错误！",
            ErrorKind::PayMentNotExist => "支付信息不存在！",
            ErrorKind::SaleRecord => "上传数据处理异常！",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

// =============================================================================
// Core Error
// =============================================================================

/// Errors raised by the pure reconciliation logic.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    /// A business rule rejected the transaction.
    ///
    /// ## When This Occurs
    /// - Price identities do not hold (`TotalPrice`, `DiscountPrice`, ...)
    /// - Referenced store/sku/brand/product does not match
    /// - A distributed share went negative
    #[error("{}", .0.message())]
    Rule(ErrorKind),

    /// The store's trim code is not in the rounding table.
    #[error("Unknown rounding trim code: {0:?}")]
    UnknownTrimCode(String),

    /// The store has no rounding configuration at all.
    #[error("Store does not have RoundingType: StoreID={store_id}")]
    MissingRoundingType { store_id: i64 },

    /// An event item references an item code the catalog lookup did not return.
    #[error("Item not resolved: {item_code}")]
    ItemNotResolved { item_code: String },
}

impl CoreError {
    /// Classifies the error for recording.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Rule(kind) => *kind,
            CoreError::ItemNotResolved { .. } => ErrorKind::SkuNotExist,
            CoreError::UnknownTrimCode(_) | CoreError::MissingRoundingType { .. } => {
                ErrorKind::SaleRecord
            }
        }
    }
}

impl From<ErrorKind> for CoreError {
    fn from(kind: ErrorKind) -> Self {
        CoreError::Rule(kind)
    }
}

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_error_displays_message() {
        let err = CoreError::Rule(ErrorKind::TotalPrice);
        assert_eq!(err.to_string(), "TotalPrice not equals sum dtl price");
        assert_eq!(err.kind().tag(), "TotalPrice");
        assert_eq!(err.kind().detail(), "总金额计算错误！");
    }

    #[test]
    fn test_pos_salesman_tag() {
        assert_eq!(ErrorKind::PosSalesmanId.tag(), "POSSalesmanId");
        let json = serde_json::to_string(&ErrorKind::PosSalesmanId).unwrap();
        assert_eq!(json, "\"POSSalesmanId\"");
    }

    #[test]
    fn test_config_errors_classify_as_sale_record() {
        let err = CoreError::UnknownTrimCode("Z".into());
        assert_eq!(err.kind(), ErrorKind::SaleRecord);
        assert_eq!(err.kind().detail(), "上传数据处理异常！");

        let err = CoreError::MissingRoundingType { store_id: 9 };
        assert_eq!(err.to_string(), "Store does not have RoundingType: StoreID=9");
    }

    #[test]
    fn test_unresolved_item_is_sku_not_exist() {
        let err = CoreError::ItemNotResolved {
            item_code: "I-1".into(),
        };
        assert_eq!(err.kind(), ErrorKind::SkuNotExist);
    }
}
