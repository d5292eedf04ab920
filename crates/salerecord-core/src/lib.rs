//! # salerecord-core: Pure Reconciliation Logic
//!
//! Everything needed to turn an order, refund, or API submission into a
//! monetarily consistent sale record, without touching I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Sale Record Service                                │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              sale-record-api (HTTP + broker)                    │   │
//! │  │   routes ──► reconcile ◄── consumer       publisher ──► Redis   │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ plain data (lookups already done)      │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │             ★ salerecord-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   rounding ──► distribute ──► normalize ──► validation          │   │
//! │  │      money • status • types • projection • query • error       │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 salerecord-db (SQLite, sqlx)                    │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`money`] - Integer cents with decimal wire format
//! - [`rounding`] - Store trim codes and ratio rounding
//! - [`distribute`] - Proportional split with deterministic remainder
//! - [`event`] / [`input`] / [`lookup`] - Inbound contracts
//! - [`normalize`] - Event to candidate sale record
//! - [`validation`] - Price identities and referential checks
//! - [`status`] - Order lifecycle table
//! - [`projection`] - Outbound event shapes
//! - [`query`] - Search filters and the date window rule
//! - [`error`] - Error taxonomy
//!
//! ## Example Usage
//!
//! ```rust
//! use salerecord_core::distribute::DistributeData;
//! use salerecord_core::rounding::RoundingSpec;
//! use salerecord_core::Money;
//!
//! let mut data = DistributeData::new(Money::from_cents(11));
//! data.push(1, "A", Money::from_cents(1000));
//! data.push(2, "B", Money::from_cents(1000));
//! data.push(3, "C", Money::from_cents(500));
//! data.distribute(&RoundingSpec::DEFAULT);
//!
//! let shares: Vec<i64> = data.items.iter().map(|i| i.allocation.cents()).collect();
//! assert_eq!(shares, vec![5, 4, 2]);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod distribute;
pub mod error;
pub mod event;
pub mod input;
pub mod lookup;
pub mod money;
pub mod normalize;
pub mod projection;
pub mod query;
pub mod rounding;
pub mod status;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ErrorKind};
pub use money::Money;
pub use status::OrderStatus;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Tenant used for dedup when a payload carries none.
pub const DEFAULT_TENANT_CODE: &str = "hublabs";
