//! # API Input
//!
//! Sale records submitted directly through the HTTP API (spreadsheet
//! uploads, marketplace imports, manual POS corrections).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Money;
use crate::status::OrderStatus;
use crate::types::{CartOffer, DedupKey, Payment, SaleRecord, SaleRecordLine, TransactionType};

/// Actor recorded for spreadsheet uploads on the `EMALL` channel.
pub const EXCEL_UPLOAD_ACTOR: &str = "excel-upload";
/// Actor recorded for `TMALL` imports.
pub const TMALL_ACTOR: &str = "sale-record-tmall";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SaleRecordInput {
    pub order_id: i64,
    pub refund_id: i64,
    pub channel_id: i64,
    pub store_id: i64,
    pub outer_order_no: String,
    pub tenant_code: String,
    pub total_list_price: Money,
    pub total_discount_price: Money,
    pub total_payment_price: Money,
    pub freight_price: Money,
    pub channel_type: String,
    pub created_id: i64,
    pub salesman_id: i64,
    /// Overrides the PLUS/MINUS inference when present.
    pub transaction_type: Option<TransactionType>,
    /// `shopCode[,empId]`; the full-width comma is accepted too.
    pub offline_shop_code: String,
    pub sale_record_dtl_inputs: Vec<SaleRecordDtlInput>,
    pub sale_record_cart_offers: Vec<SaleRecordCartOffer>,
    pub sale_record_payments: Vec<SaleRecordPayment>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SaleRecordDtlInput {
    pub order_item_id: i64,
    pub refund_item_id: i64,
    pub brand_id: i64,
    pub brand_code: String,
    pub product_id: i64,
    pub sku_id: i64,
    pub fee_rate: f64,
    pub list_price: Money,
    pub sale_price: Money,
    pub quantity: i64,
    pub total_list_price: Money,
    pub total_discount_price: Money,
    pub total_payment_price: Money,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SaleRecordCartOffer {
    pub offer_no: String,
    pub order_item_ids: String,
    pub price: Money,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SaleRecordPayment {
    pub pay_amt: Money,
    pub pay_method: String,
}

impl SaleRecordInput {
    /// Explicit type, else MINUS for refunds and PLUS otherwise.
    pub fn resolved_transaction_type(&self) -> TransactionType {
        match self.transaction_type {
            Some(t) => t,
            None if self.refund_id > 0 => TransactionType::Minus,
            None => TransactionType::Plus,
        }
    }

    pub fn dedup_key(&self, default_tenant: &str) -> DedupKey {
        let tenant = if self.tenant_code.is_empty() {
            default_tenant
        } else {
            &self.tenant_code
        };
        DedupKey {
            order_id: self.order_id,
            refund_id: self.refund_id,
            channel_type: self.channel_type.clone(),
            transaction_type: self.resolved_transaction_type(),
            tenant_code: tenant.to_string(),
        }
    }

    /// Splits `offlineShopCode` into (shop code, employee id).
    fn salesman_shop(&self) -> (String, String) {
        if self.offline_shop_code.is_empty() {
            return (String::new(), String::new());
        }
        let parts: Vec<&str> = self.offline_shop_code.split([',', '，']).collect();
        let shop = parts.first().map(|s| s.to_string()).unwrap_or_default();
        let emp = if parts.len() > 1 {
            parts.last().map(|s| s.to_string()).unwrap_or_default()
        } else {
            String::new()
        };
        (shop, emp)
    }

    /// Maps the input onto a candidate sale record.
    pub fn to_sale_record(&self, now: DateTime<Utc>) -> SaleRecord {
        let (actor, salesman_id) = match self.channel_type.as_str() {
            "EMALL" => (EXCEL_UPLOAD_ACTOR.to_string(), 0),
            "TMALL" => (TMALL_ACTOR.to_string(), 0),
            _ => (self.created_id.to_string(), self.salesman_id),
        };

        let is_refund = self.refund_id != 0;
        let status = if is_refund {
            OrderStatus::RefundOrderSuccess
        } else {
            OrderStatus::BuyerReceivedConfirmed
        };
        let (shop_code, emp_id) = self.salesman_shop();

        let lines = self
            .sale_record_dtl_inputs
            .iter()
            .map(|dtl| SaleRecordLine {
                order_item_id: dtl.order_item_id,
                refund_item_id: dtl.refund_item_id,
                brand_id: dtl.brand_id,
                brand_code: dtl.brand_code.clone(),
                product_id: dtl.product_id,
                sku_id: dtl.sku_id,
                fee_rate: dtl.fee_rate,
                list_price: dtl.list_price,
                sale_price: dtl.sale_price,
                quantity: dtl.quantity,
                distributed_cash_price: dtl.total_payment_price,
                total_distributed_cart_offer_price: dtl.total_discount_price,
                total_distributed_payment_price: dtl.total_payment_price,
                total_list_price: dtl.total_list_price,
                total_sale_price: dtl.total_payment_price,
                total_discount_price: dtl.total_discount_price,
                total_transaction_price: dtl.total_payment_price,
                status: status.label().to_string(),
                created: now,
                created_by: actor.clone(),
                modified: now,
                modified_by: actor.clone(),
                ..SaleRecordLine::default()
            })
            .collect();

        let cart_offers = self
            .sale_record_cart_offers
            .iter()
            .map(|offer| CartOffer {
                tenant_code: self.tenant_code.clone(),
                offer_no: offer.offer_no.clone(),
                item_ids: offer.order_item_ids.clone(),
                price: offer.price,
                ..CartOffer::default()
            })
            .collect();

        SaleRecord {
            tenant_code: self.tenant_code.clone(),
            store_id: self.store_id,
            channel_id: self.channel_id,
            order_id: self.order_id,
            refund_id: self.refund_id,
            outer_order_no: self.outer_order_no.clone(),
            salesman_id,
            salesman_emp_id: emp_id,
            salesman_shop_code: shop_code,
            is_refund,
            is_out_paid: true,
            transaction_type: self.resolved_transaction_type(),
            transaction_channel_type: self.channel_type.clone(),
            transaction_status: status.label().to_string(),
            transaction_create_date: now,
            transaction_update_date: now,
            transaction_created_id: self.created_id,
            total_list_price: self.total_list_price,
            total_sale_price: self.total_payment_price,
            total_discount_price: self.total_discount_price,
            total_transaction_price: self.total_payment_price,
            discount_offer_price: self.total_discount_price,
            freight_price: self.freight_price,
            cash_price: self.total_payment_price,
            created: now,
            created_by: actor.clone(),
            modified: now,
            modified_by: actor,
            lines,
            cart_offers,
            payments: self.payments(now),
            ..SaleRecord::default()
        }
    }

    fn payments(&self, now: DateTime<Utc>) -> Vec<Payment> {
        if self.sale_record_payments.is_empty() {
            return vec![Payment {
                seq_no: 1,
                pay_method: "CASH".to_string(),
                pay_amt: self.total_payment_price,
                created_at: now,
                ..Payment::default()
            }];
        }
        self.sale_record_payments
            .iter()
            .enumerate()
            .map(|(i, p)| Payment {
                seq_no: i as i64 + 1,
                pay_method: p.pay_method.clone(),
                pay_amt: p.pay_amt.abs(),
                created_at: now,
                ..Payment::default()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> SaleRecordInput {
        SaleRecordInput {
            order_id: 42,
            store_id: 5,
            tenant_code: "hublabs".into(),
            total_list_price: Money::from_cents(15000),
            total_discount_price: Money::from_cents(3000),
            total_payment_price: Money::from_cents(12000),
            channel_type: "POS".into(),
            created_id: 7,
            salesman_id: 9,
            sale_record_dtl_inputs: vec![SaleRecordDtlInput {
                sku_id: 1,
                total_list_price: Money::from_cents(15000),
                total_discount_price: Money::from_cents(3000),
                total_payment_price: Money::from_cents(12000),
                ..SaleRecordDtlInput::default()
            }],
            ..SaleRecordInput::default()
        }
    }

    #[test]
    fn test_pos_input_mapping() {
        let now = Utc::now();
        let record = input().to_sale_record(now);

        assert_eq!(record.created_by, "7");
        assert_eq!(record.salesman_id, 9);
        assert_eq!(record.transaction_status, "BuyerReceivedConfirmed");
        assert_eq!(record.transaction_type, TransactionType::Plus);
        assert!(record.is_out_paid);
        assert!(!record.is_refund);

        let line = &record.lines[0];
        assert_eq!(line.distributed_cash_price.cents(), 12000);
        assert_eq!(line.total_distributed_cart_offer_price.cents(), 3000);
        assert_eq!(line.total_distributed_payment_price.cents(), 12000);

        assert_eq!(record.payments.len(), 1);
        assert_eq!(record.payments[0].pay_method, "CASH");
        assert_eq!(record.payments[0].pay_amt.cents(), 12000);
    }

    #[test]
    fn test_channel_actors() {
        let mut i = input();
        i.channel_type = "EMALL".into();
        let record = i.to_sale_record(Utc::now());
        assert_eq!(record.created_by, EXCEL_UPLOAD_ACTOR);
        assert_eq!(record.salesman_id, 0);

        i.channel_type = "TMALL".into();
        assert_eq!(i.to_sale_record(Utc::now()).modified_by, TMALL_ACTOR);
    }

    #[test]
    fn test_refund_input_infers_minus() {
        let mut i = input();
        i.refund_id = 88;
        let record = i.to_sale_record(Utc::now());
        assert!(record.is_refund);
        assert_eq!(record.transaction_status, "RefundOrderSuccess");
        assert_eq!(record.transaction_type, TransactionType::Minus);

        i.transaction_type = Some(TransactionType::Plus);
        assert_eq!(i.to_sale_record(Utc::now()).transaction_type, TransactionType::Plus);
    }

    #[test]
    fn test_offline_shop_code_split() {
        let mut i = input();
        i.offline_shop_code = "S001，E123".into();
        let record = i.to_sale_record(Utc::now());
        assert_eq!(record.salesman_shop_code, "S001");
        assert_eq!(record.salesman_emp_id, "E123");

        i.offline_shop_code = "S002".into();
        let record = i.to_sale_record(Utc::now());
        assert_eq!(record.salesman_shop_code, "S002");
        assert_eq!(record.salesman_emp_id, "");
    }

    #[test]
    fn test_supplied_payments_are_kept() {
        let mut i = input();
        i.sale_record_payments = vec![
            SaleRecordPayment {
                pay_amt: Money::from_cents(10000),
                pay_method: "CARD".into(),
            },
            SaleRecordPayment {
                pay_amt: Money::from_cents(2000),
                pay_method: "CASH".into(),
            },
        ];
        let payments = i.to_sale_record(Utc::now()).payments;
        assert_eq!(payments.len(), 2);
        assert_eq!(payments[1].seq_no, 2);
        assert_eq!(payments[0].pay_method, "CARD");
    }

    #[test]
    fn test_dedup_key_tenant_fallback() {
        let mut i = input();
        i.tenant_code.clear();
        let key = i.dedup_key("hublabs");
        assert_eq!(key.tenant_code, "hublabs");
        assert_eq!(key.order_id, 42);
    }
}
