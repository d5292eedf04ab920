//! # Proportional Distribution
//!
//! Splits a cart-level amount across weighted items so the shares sum to
//! the amount exactly.
//!
//! ## Remainder Correction
//! ```text
//!   allocation[i] = ratio(A, weight[i], Σweight)     (store rounding)
//!   R = A - Σallocation
//!
//!   R > 0  ──► first item holding the largest weight takes all of R
//!   R < 0  ──► first item (original order) with allocation + R >= 0
//!              takes R; if none can, R is taken greedily in order
//!   R = 0  ──► done
//! ```
//!
//! Tie-breaks and scan order are part of the contract: downstream totals
//! are only reproducible if every run assigns the remainder to the same
//! item.

use crate::event::OfferEvent;
use crate::money::Money;
use crate::rounding::RoundingSpec;

/// Working set for one distribution. Never persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DistributeData {
    pub amount: Money,
    pub items: Vec<DistributeItem>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DistributeItem {
    pub id: i64,
    pub item_code: String,
    /// Current sale price subtotal of the item.
    pub weight: Money,
    pub allocation: Money,
}

impl DistributeData {
    pub fn new(amount: Money) -> Self {
        DistributeData {
            amount,
            items: Vec::new(),
        }
    }

    pub fn push(&mut self, id: i64, item_code: impl Into<String>, weight: Money) {
        self.items.push(DistributeItem {
            id,
            item_code: item_code.into(),
            weight,
            allocation: Money::zero(),
        });
    }

    pub fn total_weight(&self) -> Money {
        self.items.iter().map(|i| i.weight).sum()
    }

    /// Fills every item's `allocation`.
    ///
    /// No-op for an empty set or a zero total weight.
    pub fn distribute(&mut self, spec: &RoundingSpec) {
        let total = self.total_weight();
        if self.items.is_empty() || total.is_zero() {
            return;
        }

        let amount = self.amount;
        for item in self.items.iter_mut() {
            item.allocation = spec.ratio(amount, item.weight, total);
        }

        let allocated: Money = self.items.iter().map(|i| i.allocation).sum();
        let remainder = amount - allocated;

        if remainder.is_positive() {
            self.assign_positive(remainder);
        } else if remainder.is_negative() {
            self.assign_negative(remainder);
        }
    }

    fn assign_positive(&mut self, remainder: Money) {
        // max_by_key keeps the last maximum, so scan manually for the first.
        let mut best = 0;
        for (i, item) in self.items.iter().enumerate() {
            if item.weight > self.items[best].weight {
                best = i;
            }
        }
        self.items[best].allocation += remainder;
    }

    fn assign_negative(&mut self, remainder: Money) {
        if let Some(item) = self
            .items
            .iter_mut()
            .find(|item| !(item.allocation + remainder).is_negative())
        {
            item.allocation += remainder;
            return;
        }

        let mut owed = remainder.abs();
        for item in self.items.iter_mut() {
            if owed.is_zero() {
                break;
            }
            let take = if item.allocation < owed {
                item.allocation
            } else {
                owed
            };
            item.allocation -= take;
            owed -= take;
        }
    }
}

// =============================================================================
// Cart Offer Redistribution
// =============================================================================

/// An event item that can receive a share of a cart offer.
pub trait OfferTarget {
    /// Id that offer item lists refer to.
    fn match_id(&self) -> i64;
    fn item_code(&self) -> &str;
    fn total_list_price(&self) -> Money;
    fn total_sale_price(&self) -> Money;
    fn cart_offer_share_mut(&mut self) -> &mut Money;
}

/// Recomputes every item's cart offer share from the cart offers.
///
/// - Offers with a zero price are skipped.
/// - `gift` offers make the eligible items fully discounted at list price.
/// - Other offers are split by sale price subtotal and added to the share.
pub fn distribute_cart_offers<T: OfferTarget>(items: &mut [T], offers: &[OfferEvent], spec: &RoundingSpec) {
    for item in items.iter_mut() {
        *item.cart_offer_share_mut() = Money::zero();
    }

    for offer in offers {
        if offer.price.is_zero() {
            continue;
        }
        let ids = offer.eligible_ids();

        if offer.is_gift() {
            for item in items.iter_mut().filter(|i| ids.contains(&i.match_id())) {
                let list = item.total_list_price();
                *item.cart_offer_share_mut() = list;
            }
            continue;
        }

        let mut data = DistributeData::new(offer.price);
        for item in items.iter().filter(|i| ids.contains(&i.match_id())) {
            data.push(item.match_id(), item.item_code(), item.total_sale_price());
        }
        data.distribute(spec);

        for share in &data.items {
            if let Some(item) = items.iter_mut().find(|i| i.match_id() == share.id) {
                *item.cart_offer_share_mut() += share.allocation;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(amount: i64, weights: &[i64]) -> DistributeData {
        let mut d = DistributeData::new(Money::from_cents(amount));
        for (i, w) in weights.iter().enumerate() {
            d.push(i as i64 + 1, format!("I-{}", i + 1), Money::from_cents(*w));
        }
        d
    }

    fn allocations(d: &DistributeData) -> Vec<i64> {
        d.items.iter().map(|i| i.allocation.cents()).collect()
    }

    #[test]
    fn test_positive_remainder_goes_to_first_largest() {
        // 0.11 over [10, 10, 5] → [4.4, 4.4, 2.2] → [4, 4, 2], R = 1
        let mut d = data(11, &[1000, 1000, 500]);
        d.distribute(&RoundingSpec::DEFAULT);
        assert_eq!(allocations(&d), vec![5, 4, 2]);
    }

    #[test]
    fn test_positive_remainder_under_floor_policy() {
        // 11.00 over [10, 10, 5] floored to whole units → [4, 4, 2], R = 1.00
        let spec = RoundingSpec::from_trim_code("T").unwrap();
        let mut d = data(1100, &[1000, 1000, 500]);
        d.distribute(&spec);
        assert_eq!(allocations(&d), vec![500, 400, 200]);
    }

    #[test]
    fn test_negative_remainder_first_absorber() {
        // 1.00 over [2, 1] at 1 digit ceil → [0.7, 0.4], R = -0.10
        let spec = RoundingSpec::from_trim_code("Q").unwrap();
        let mut d = data(100, &[200, 100]);
        d.distribute(&spec);
        assert_eq!(allocations(&d), vec![60, 40]);
    }

    #[test]
    fn test_negative_remainder_greedy_fallback() {
        // 1.00 over three equal weights, whole-unit ceil → [1, 1, 1], R = -2.00
        let spec = RoundingSpec::from_trim_code("C").unwrap();
        let mut d = data(100, &[300, 300, 300]);
        d.distribute(&spec);
        assert_eq!(allocations(&d), vec![0, 0, 100]);
    }

    #[test]
    fn test_conservation_and_non_negative() {
        let codes = ["", "C", "O", "P", "Q", "R", "T"];
        let weights = [1999, 1, 333, 4500, 77];
        for code in codes {
            let spec = RoundingSpec::from_trim_code(code).unwrap();
            for amount in [1, 99, 1000, 2345, 12_345] {
                let mut d = data(amount, &weights);
                d.distribute(&spec);
                let sum: i64 = allocations(&d).iter().sum();
                assert_eq!(sum, amount, "code {:?} amount {}", code, amount);
                assert!(d.items.iter().all(|i| !i.allocation.is_negative()));
            }
        }
    }

    #[test]
    fn test_empty_or_zero_weight_is_noop() {
        let mut d = data(100, &[]);
        d.distribute(&RoundingSpec::DEFAULT);
        assert!(d.items.is_empty());

        let mut d = data(100, &[0, 0]);
        d.distribute(&RoundingSpec::DEFAULT);
        assert_eq!(allocations(&d), vec![0, 0]);
    }

    #[derive(Debug, Default)]
    struct Line {
        id: i64,
        list: i64,
        sale: i64,
        share: Money,
    }

    impl OfferTarget for Line {
        fn match_id(&self) -> i64 {
            self.id
        }
        fn item_code(&self) -> &str {
            "code"
        }
        fn total_list_price(&self) -> Money {
            Money::from_cents(self.list)
        }
        fn total_sale_price(&self) -> Money {
            Money::from_cents(self.sale)
        }
        fn cart_offer_share_mut(&mut self) -> &mut Money {
            &mut self.share
        }
    }

    #[test]
    fn test_cart_offers_gift_and_ratio() {
        let mut lines = vec![
            Line { id: 1, list: 10000, sale: 8000, share: Money::from_cents(999) },
            Line { id: 2, list: 5000, sale: 4000, ..Line::default() },
            Line { id: 3, list: 3000, sale: 3000, ..Line::default() },
        ];
        let offers = vec![
            OfferEvent {
                offer_no: "CART".into(),
                item_ids: "1,2".into(),
                price: Money::from_cents(1200),
                ..OfferEvent::default()
            },
            OfferEvent {
                offer_no: "GIFT".into(),
                item_ids: "1,2,3".into(),
                target_item_ids: "3".into(),
                target_type: "gift".into(),
                price: Money::from_cents(3000),
                ..OfferEvent::default()
            },
            OfferEvent {
                offer_no: "FREE".into(),
                item_ids: "1".into(),
                ..OfferEvent::default()
            },
        ];

        distribute_cart_offers(&mut lines, &offers, &RoundingSpec::DEFAULT);

        let shares: Vec<i64> = lines.iter().map(|l| l.share.cents()).collect();
        assert_eq!(shares, vec![800, 400, 3000]);
    }
}
