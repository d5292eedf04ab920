//! # Rounding Policies
//!
//! Maps a store's trim code to the rounding applied when cart-level
//! amounts are split across lines.
//!
//! ## Trim Code Table
//! ```text
//! ┌────────┬────────┬──────────┬──────────────────────────────────────────┐
//! │  code  │ digits │ strategy │ 12.345 becomes                           │
//! ├────────┼────────┼──────────┼──────────────────────────────────────────┤
//! │   C    │   0    │ ceil     │ 13                                       │
//! │   O    │   1    │ floor    │ 12.3                                     │
//! │   P    │   1    │ round    │ 12.3                                     │
//! │   Q    │   1    │ ceil     │ 12.4                                     │
//! │   R    │   0    │ round    │ 12                                       │
//! │   T    │   0    │ floor    │ 12                                       │
//! │ "" / A │   2    │ none     │ 12.35 (plain fixed-point rounding)       │
//! └────────┴────────┴──────────┴──────────────────────────────────────────┘
//! ```
//!
//! Any other code is a configuration error on the store.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoreError, CoreResult};
use crate::lookup::Store;
use crate::money::Money;

/// Direction applied when a value falls between two representable steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundingStrategy {
    /// No store-specific policy: round half away from zero at 2 digits.
    None,
    Ceil,
    Floor,
    /// Half away from zero.
    Round,
}

/// Rounding specification: number of fraction digits plus direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundingSpec {
    pub digits: u32,
    pub strategy: RoundingStrategy,
}

impl RoundingSpec {
    /// Default fixed-point rounding at 2 digits.
    pub const DEFAULT: RoundingSpec = RoundingSpec {
        digits: 2,
        strategy: RoundingStrategy::None,
    };

    /// Resolves a trim code.
    ///
    /// ## Example
    /// ```rust
    /// use salerecord_core::rounding::{RoundingSpec, RoundingStrategy};
    ///
    /// let spec = RoundingSpec::from_trim_code("Q").unwrap();
    /// assert_eq!(spec.digits, 1);
    /// assert_eq!(spec.strategy, RoundingStrategy::Ceil);
    /// assert!(RoundingSpec::from_trim_code("Z").is_err());
    /// ```
    pub fn from_trim_code(code: &str) -> CoreResult<Self> {
        let (digits, strategy) = match code {
            "" | "A" => return Ok(RoundingSpec::DEFAULT),
            "C" => (0, RoundingStrategy::Ceil),
            "O" => (1, RoundingStrategy::Floor),
            "P" => (1, RoundingStrategy::Round),
            "Q" => (1, RoundingStrategy::Ceil),
            "R" => (0, RoundingStrategy::Round),
            "T" => (0, RoundingStrategy::Floor),
            other => return Err(CoreError::UnknownTrimCode(other.to_string())),
        };
        Ok(RoundingSpec { digits, strategy })
    }

    /// Size of one rounding step in cents (100 for 0 digits, 10 for 1).
    fn step(&self) -> i128 {
        10_i128.pow(2u32.saturating_sub(self.digits.min(2)))
    }

    /// Computes `amount * weight / total` rounded to this policy.
    ///
    /// The product is formed in i128 and divided exactly, so the only
    /// rounding is the one the policy asks for.
    ///
    /// `total` must be non-zero. A zero total yields zero.
    pub fn ratio(&self, amount: Money, weight: Money, total: Money) -> Money {
        if total.is_zero() {
            return Money::zero();
        }

        let mut num = amount.cents() as i128 * weight.cents() as i128;
        let mut den = total.cents() as i128 * self.step();
        if den < 0 {
            num = -num;
            den = -den;
        }

        let steps = match self.strategy {
            RoundingStrategy::Ceil => div_ceil(num, den),
            RoundingStrategy::Floor => div_floor(num, den),
            RoundingStrategy::Round | RoundingStrategy::None => div_round_half_away(num, den),
        };

        Money::from_cents((steps * self.step()) as i64)
    }
}

impl Default for RoundingSpec {
    fn default() -> Self {
        RoundingSpec::DEFAULT
    }
}

impl fmt::Display for RoundingSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}@{}", self.strategy, self.digits)
    }
}

// den is always positive in the helpers below.

fn div_floor(num: i128, den: i128) -> i128 {
    let q = num / den;
    if num % den != 0 && num < 0 {
        q - 1
    } else {
        q
    }
}

fn div_ceil(num: i128, den: i128) -> i128 {
    let q = num / den;
    if num % den != 0 && num > 0 {
        q + 1
    } else {
        q
    }
}

fn div_round_half_away(num: i128, den: i128) -> i128 {
    let q = (num.abs() * 2 + den) / (den * 2);
    if num < 0 {
        -q
    } else {
        q
    }
}

// =============================================================================
// Rounding Setting
// =============================================================================

/// Output of the rounding policy resolver.
///
/// Keeps the raw trim code next to the resolved spec because the code is
/// persisted on every sale record as `base_trim_code`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundingSetting {
    pub trim_code: String,
    pub spec: RoundingSpec,
}

impl RoundingSetting {
    /// Resolves the rounding setting of a store.
    ///
    /// ## Errors
    /// - `MissingRoundingType` when the store has no rounding configuration
    /// - `UnknownTrimCode` when the code is not in the table
    pub fn from_store(store: &Store) -> CoreResult<Self> {
        let rounding = store
            .rounding_type
            .as_ref()
            .ok_or(CoreError::MissingRoundingType { store_id: store.id })?;

        Ok(RoundingSetting {
            trim_code: rounding.code.clone(),
            spec: RoundingSpec::from_trim_code(&rounding.code)?,
        })
    }
}
