//! # Sale Record API
//!
//! Turns order and refund lifecycle events into immutable, deduplicated
//! sale records and answers queries over them.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Sale Record API                                 │
//! │                                                                         │
//! │  Redis "order" ──► consumer ──┐                                         │
//! │                               ▼                                         │
//! │  HTTP (axum) ──► routes ──► reconcile ──► lookup (reqwest)              │
//! │                               │    │                                    │
//! │                               │    └──► salerecord-db (SQLite)          │
//! │                               ▼                                         │
//! │                           publisher ──► broker ──► Redis PUBLISH        │
//! │                                         "sale-record" / "sale-record-fail"
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration
//! Layered by [`config::ServiceConfig::load`]: built-in defaults, then
//! `config/{APP_ENV}.toml`, then `SALE_RECORD__*` environment variables.

pub mod broker;
pub mod config;
pub mod consumer;
pub mod error;
pub mod lookup;
pub mod publisher;
pub mod reconcile;
pub mod routes;

#[cfg(test)]
mod test_support;

// Re-exports
pub use config::ServiceConfig;
pub use error::{ServiceError, ServiceResult};
pub use reconcile::{EventOutcome, ReconcileSettings, Reconciler};
