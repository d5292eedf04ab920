//! # Repository Module
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Layout                                    │
//! │                                                                         │
//! │  Reconciler / HTTP handler                                             │
//! │       │                                                                 │
//! │       │  db.sale_records().find_by_key(&key)                           │
//! │       ▼                                                                 │
//! │  SaleRecordRepository                  SaleRecordLogRepository         │
//! │  ├── create (one transaction)          ├── upsert (ON CONFLICT)        │
//! │  ├── find_by_key                       ├── find_by_key                 │
//! │  ├── get_by_transaction_id             └── search                      │
//! │  ├── refresh_status                                                    │
//! │  └── search                                                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod sale_record;
pub mod sale_record_log;
