//! # Query Surface
//!
//! Search filters for sale records and log rows, plus the date window rule
//! shared by both.
//!
//! ## Date Window
//! ```text
//!   start/end both empty ──► no range given
//!   exactly one empty    ──┐
//!   unparsable date      ──┤
//!   start after end      ──┼─► invalid ──► trailing window [now - 31d, now)
//!   longer than term     ──┘
//!
//!   valid range ──► [start - offset, end + 1d - offset)   (local → UTC)
//!   no range, no key filter ──► trailing window
//!   no range, key filter    ──► unbounded
//! ```

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default page size.
pub const DEFAULT_MAX_RESULT_COUNT: i64 = 10;
/// Hard cap on page size.
pub const MAX_RESULT_COUNT_CAP: i64 = 1000;

const DATE_FORMAT: &str = "%Y-%m-%d";

// =============================================================================
// Date Range
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DateRangeError {
    #[error("start date is empty")]
    MissingStart,

    #[error("end date is empty")]
    MissingEnd,

    #[error("invalid date {0:?}, expected YYYY-MM-DD")]
    Parse(String),

    #[error("start date is after end date")]
    StartAfterEnd,

    #[error("range cannot exceed {0} days")]
    TooLong(i64),
}

/// Checks a `YYYY-MM-DD` range.
///
/// Returns `Ok(None)` when both dates are empty.
pub fn validate_date_range(
    start: &str,
    end: &str,
    term_days: i64,
) -> Result<Option<(NaiveDate, NaiveDate)>, DateRangeError> {
    match (start.is_empty(), end.is_empty()) {
        (true, true) => return Ok(None),
        (true, false) => return Err(DateRangeError::MissingStart),
        (false, true) => return Err(DateRangeError::MissingEnd),
        (false, false) => {}
    }

    let parse = |s: &str| {
        NaiveDate::parse_from_str(s, DATE_FORMAT).map_err(|_| DateRangeError::Parse(s.to_string()))
    };
    let start = parse(start)?;
    let end = parse(end)?;

    if start > end {
        return Err(DateRangeError::StartAfterEnd);
    }
    if start + Duration::days(term_days - 1) < end {
        return Err(DateRangeError::TooLong(term_days));
    }
    Ok(Some((start, end)))
}

/// Query tuning read from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuerySettings {
    pub term_days: i64,
    /// Business timezone offset from UTC, in hours.
    pub utc_offset_hours: i64,
}

impl Default for QuerySettings {
    fn default() -> Self {
        QuerySettings {
            term_days: 31,
            utc_offset_hours: 8,
        }
    }
}

/// Half-open UTC window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateWindow {
    /// `[now - days, now)`.
    pub fn trailing(now: DateTime<Utc>, days: i64) -> Self {
        DateWindow {
            start: now - Duration::days(days),
            end: now,
        }
    }

    /// Converts a local business date range to UTC.
    pub fn from_local_dates(start: NaiveDate, end: NaiveDate, utc_offset_hours: i64) -> Self {
        let offset = Duration::hours(utc_offset_hours);
        let midnight = |d: NaiveDate| d.and_time(NaiveTime::MIN).and_utc() - offset;
        DateWindow {
            start: midnight(start),
            end: midnight(end) + Duration::days(1),
        }
    }

    /// Applies the window rule.
    ///
    /// Invalid ranges fall back to the trailing window. This also swallows
    /// ranges that are merely too long.
    pub fn resolve(
        start: &str,
        end: &str,
        has_key_filter: bool,
        settings: &QuerySettings,
        now: DateTime<Utc>,
    ) -> Option<Self> {
        match validate_date_range(start, end, settings.term_days) {
            Err(_) => Some(Self::trailing(now, settings.term_days)),
            Ok(None) if has_key_filter => None,
            Ok(None) => Some(Self::trailing(now, settings.term_days)),
            Ok(Some((s, e))) => Some(Self::from_local_dates(s, e, settings.utc_offset_hours)),
        }
    }
}

// =============================================================================
// Paging
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub skip: i64,
    pub take: i64,
}

impl Page {
    pub fn new(skip_count: i64, max_result_count: i64) -> Self {
        let take = if max_result_count <= 0 {
            DEFAULT_MAX_RESULT_COUNT
        } else {
            max_result_count.min(MAX_RESULT_COUNT_CAP)
        };
        Page {
            skip: skip_count.max(0),
            take,
        }
    }
}

/// Paged search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchOutput<T> {
    pub total_count: i64,
    pub items: Vec<T>,
}

/// Parses a comma separated id list, dropping anything unparsable.
pub fn parse_ids(raw: &str) -> Vec<i64> {
    raw.split(',')
        .filter_map(|id| id.trim().parse().ok())
        .collect()
}

fn non_negative(value: Option<i64>) -> Option<i64> {
    value.filter(|v| *v >= 0)
}

fn positive(value: Option<i64>) -> Option<i64> {
    value.filter(|v| *v > 0)
}

// =============================================================================
// Sale Record Search
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SaleRecordQuery {
    pub customer_id: Option<i64>,
    pub created_id: Option<i64>,
    pub status: String,
    #[serde(rename = "type")]
    pub transaction_type: String,
    pub channel_type: String,
    pub salesman_id: Option<i64>,
    pub emp_id: String,
    pub store_id: Option<i64>,
    pub transaction_id: Option<i64>,
    pub order_id: Option<i64>,
    pub refund_id: Option<i64>,
    pub order_ids: String,
    pub refund_ids: String,
    pub outer_order_no: String,
    pub is_out_paid: Option<bool>,
    pub order_start_at: String,
    pub order_end_at: String,
    pub skip_count: i64,
    pub max_result_count: i64,
}

/// Normalized sale record filter, ready for the repository.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SaleRecordFilter {
    pub tenant_code: Option<String>,
    pub customer_id: Option<i64>,
    pub created_id: Option<i64>,
    pub status: Option<String>,
    pub transaction_type: Option<String>,
    pub channel_type: Option<String>,
    pub salesman_id: Option<i64>,
    pub emp_id: Option<String>,
    pub store_id: Option<i64>,
    pub order_id: Option<i64>,
    pub refund_id: Option<i64>,
    pub order_ids: Vec<i64>,
    pub refund_ids: Vec<i64>,
    pub outer_order_no: Option<String>,
    pub is_out_paid: Option<bool>,
    pub window: Option<DateWindow>,
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

impl SaleRecordQuery {
    /// Exact lookup by transaction id, which bypasses every other filter.
    pub fn transaction_id(&self) -> Option<i64> {
        positive(self.transaction_id)
    }

    pub fn has_key_filter(&self) -> bool {
        positive(self.order_id).is_some()
            || positive(self.refund_id).is_some()
            || !self.order_ids.is_empty()
            || !self.refund_ids.is_empty()
            || !self.outer_order_no.is_empty()
    }

    pub fn page(&self) -> Page {
        Page::new(self.skip_count, self.max_result_count)
    }

    pub fn to_filter(&self, settings: &QuerySettings, now: DateTime<Utc>) -> SaleRecordFilter {
        SaleRecordFilter {
            tenant_code: None,
            customer_id: non_negative(self.customer_id),
            created_id: non_negative(self.created_id),
            status: non_empty(&self.status),
            transaction_type: non_empty(&self.transaction_type),
            channel_type: non_empty(&self.channel_type),
            salesman_id: non_negative(self.salesman_id),
            emp_id: non_empty(&self.emp_id),
            store_id: positive(self.store_id),
            order_id: positive(self.order_id),
            refund_id: positive(self.refund_id),
            order_ids: parse_ids(&self.order_ids),
            refund_ids: parse_ids(&self.refund_ids),
            outer_order_no: non_empty(&self.outer_order_no),
            is_out_paid: self.is_out_paid,
            window: DateWindow::resolve(
                &self.order_start_at,
                &self.order_end_at,
                self.has_key_filter(),
                settings,
                now,
            ),
        }
    }
}

// =============================================================================
// Log Search
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LogQuery {
    pub start_at: String,
    pub end_at: String,
    pub err_type: String,
    pub channel_type: String,
    pub transaction_type: String,
    pub is_success: Option<bool>,
    pub store_id: Option<i64>,
    pub order_id: Option<i64>,
    pub refund_id: Option<i64>,
    pub skip_count: i64,
    pub max_result_count: i64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogFilter {
    pub error_type: Option<String>,
    pub channel_type: Option<String>,
    pub transaction_type: Option<String>,
    pub is_success: Option<bool>,
    pub store_id: Option<i64>,
    pub order_id: Option<i64>,
    pub refund_id: Option<i64>,
    pub window: Option<DateWindow>,
}

impl LogQuery {
    pub fn has_key_filter(&self) -> bool {
        positive(self.order_id).is_some()
            || positive(self.refund_id).is_some()
            || !self.channel_type.is_empty()
    }

    pub fn page(&self) -> Page {
        Page::new(self.skip_count, self.max_result_count)
    }

    pub fn to_filter(&self, settings: &QuerySettings, now: DateTime<Utc>) -> LogFilter {
        LogFilter {
            error_type: non_empty(&self.err_type),
            channel_type: non_empty(&self.channel_type),
            transaction_type: non_empty(&self.transaction_type),
            is_success: self.is_success,
            store_id: positive(self.store_id),
            order_id: positive(self.order_id),
            refund_id: positive(self.refund_id),
            window: DateWindow::resolve(
                &self.start_at,
                &self.end_at,
                self.has_key_filter(),
                settings,
                now,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_validate_date_range() {
        assert_eq!(validate_date_range("", "", 31), Ok(None));
        assert_eq!(validate_date_range("", "2024-03-01", 31), Err(DateRangeError::MissingStart));
        assert_eq!(validate_date_range("2024-03-01", "", 31), Err(DateRangeError::MissingEnd));
        assert!(matches!(validate_date_range("2024/03/01", "2024-03-02", 31), Err(DateRangeError::Parse(_))));
        assert_eq!(
            validate_date_range("2024-03-02", "2024-03-01", 31),
            Err(DateRangeError::StartAfterEnd)
        );
        // 31 calendar days inclusive is the limit.
        assert!(validate_date_range("2024-01-01", "2024-01-31", 31).unwrap().is_some());
        assert_eq!(
            validate_date_range("2024-01-01", "2024-02-01", 31),
            Err(DateRangeError::TooLong(31))
        );
    }

    #[test]
    fn test_absent_range_defaults_to_trailing_window() {
        let w = DateWindow::resolve("", "", false, &QuerySettings::default(), now()).unwrap();
        assert_eq!(w.end, now());
        assert_eq!(w.start, now() - Duration::days(31));
    }

    #[test]
    fn test_too_long_range_defaults_to_trailing_window() {
        let w = DateWindow::resolve("2024-01-01", "2024-03-01", true, &QuerySettings::default(), now()).unwrap();
        assert_eq!(w, DateWindow::trailing(now(), 31));
    }

    #[test]
    fn test_key_filter_skips_default_window() {
        assert!(DateWindow::resolve("", "", true, &QuerySettings::default(), now()).is_none());
    }

    #[test]
    fn test_local_dates_convert_to_utc() {
        let w = DateWindow::resolve("2024-03-01", "2024-03-02", false, &QuerySettings::default(), now()).unwrap();
        assert_eq!(w.start, Utc.with_ymd_and_hms(2024, 2, 29, 16, 0, 0).unwrap());
        assert_eq!(w.end, Utc.with_ymd_and_hms(2024, 3, 2, 16, 0, 0).unwrap());
    }

    #[test]
    fn test_page_defaults_and_cap() {
        assert_eq!(Page::new(0, 0), Page { skip: 0, take: 10 });
        assert_eq!(Page::new(-5, 5000), Page { skip: 0, take: 1000 });
        assert_eq!(Page::new(20, 50), Page { skip: 20, take: 50 });
    }

    #[test]
    fn test_sale_record_query_filter() {
        let q: SaleRecordQuery = serde_json::from_value(serde_json::json!({
            "customerId": -1,
            "createdId": 0,
            "type": "PLUS",
            "orderIds": "1, 2,x,3",
            "storeId": -1
        }))
        .unwrap();
        assert!(q.has_key_filter());
        let f = q.to_filter(&QuerySettings::default(), now());
        assert_eq!(f.customer_id, None);
        assert_eq!(f.created_id, Some(0));
        assert_eq!(f.store_id, None);
        assert_eq!(f.transaction_type.as_deref(), Some("PLUS"));
        assert_eq!(f.order_ids, vec![1, 2, 3]);
        assert!(f.window.is_none());
    }

    #[test]
    fn test_log_query_filter() {
        let q = LogQuery {
            is_success: Some(false),
            err_type: "Mileage".into(),
            ..LogQuery::default()
        };
        let f = q.to_filter(&QuerySettings::default(), now());
        assert_eq!(f.error_type.as_deref(), Some("Mileage"));
        assert_eq!(f.window, Some(DateWindow::trailing(now(), 31)));
    }
}
