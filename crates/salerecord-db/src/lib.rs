//! # salerecord-db: Persistence Gateway for the Sale Record Service
//!
//! SQLite storage for committed sale records and reconciliation outcomes,
//! using sqlx for async access.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Sale Record Data Flow                            │
//! │                                                                         │
//! │  Reconciler (handle_event / create_from_input)                         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  salerecord-db (THIS CRATE)                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────────┐  ┌─────────────┐ │   │
//! │  │   │   Database    │    │   Repositories     │  │ Migrations  │ │   │
//! │  │   │   (pool.rs)   │    │                    │  │ (embedded)  │ │   │
//! │  │   │               │    │ SaleRecordRepo     │  │             │ │   │
//! │  │   │ SqlitePool    │◄───│ SaleRecordLogRepo  │  │ 001_init    │ │   │
//! │  │   └───────────────┘    └────────────────────┘  └─────────────┘ │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite file (database_path)                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use salerecord_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("data/sale-record.db")).await?;
//! let existing = db.sale_records().find_by_key(&key).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::sale_record::SaleRecordRepository;
pub use repository::sale_record_log::SaleRecordLogRepository;
