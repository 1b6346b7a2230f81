//! VCG pricing for divisible supply.
//!
//! Bidders want up to `quantity` units at a constant per-unit `valuation`.
//! The welfare-maximizing allocation fills the highest valuations first.
//! Each winner pays the welfare the others lose because of its presence:
//! `W(-i) - (W - v_i * q_i)`, where `W(-i)` is re-solved without bidder `i`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VcgBid {
    pub bidder_id: String,
    /// Per-unit value
    pub valuation: Decimal,
    /// Maximum units demanded
    pub quantity: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VcgAllocation {
    pub bidder_id: String,
    pub quantity: Decimal,
    pub valuation: Decimal,
    pub payment: Decimal,
}

impl VcgAllocation {
    pub fn utility(&self) -> Decimal {
        self.valuation
            .saturating_mul(self.quantity)
            .saturating_sub(self.payment)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VcgResult {
    /// Winners in allocation order, highest valuation first
    pub allocations: Vec<VcgAllocation>,
    pub social_welfare: Decimal,
    pub revenue: Decimal,
}

impl VcgResult {
    pub fn allocation_for(&self, bidder_id: &str) -> Option<&VcgAllocation> {
        self.allocations.iter().find(|a| a.bidder_id == bidder_id)
    }
}

/// Greedy fill by descending valuation. Ties keep input order.
fn allocate(bids: &[VcgBid], supply: Decimal, excluded: Option<usize>) -> Vec<(usize, Decimal)> {
    let mut order: Vec<usize> = (0..bids.len())
        .filter(|&i| Some(i) != excluded)
        .filter(|&i| bids[i].valuation > Decimal::ZERO && bids[i].quantity > Decimal::ZERO)
        .collect();
    order.sort_by(|&a, &b| bids[b].valuation.cmp(&bids[a].valuation).then(a.cmp(&b)));

    let mut remaining = supply.max(Decimal::ZERO);
    let mut allocation = Vec::new();
    for i in order {
        if remaining <= Decimal::ZERO {
            break;
        }
        let quantity = bids[i].quantity.min(remaining);
        remaining -= quantity;
        allocation.push((i, quantity));
    }
    allocation
}

/// Saturates at `Decimal::MAX` instead of overflowing
fn welfare(bids: &[VcgBid], allocation: &[(usize, Decimal)]) -> Decimal {
    allocation.iter().fold(Decimal::ZERO, |total, &(i, q)| {
        total.saturating_add(bids[i].valuation.saturating_mul(q))
    })
}

pub fn run_vcg(bids: &[VcgBid], supply: Decimal) -> VcgResult {
    let allocation = allocate(bids, supply, None);
    let social_welfare = welfare(bids, &allocation);

    let allocations: Vec<VcgAllocation> = allocation
        .iter()
        .map(|&(i, quantity)| {
            let own_value = bids[i].valuation.saturating_mul(quantity);
            let without_i = welfare(bids, &allocate(bids, supply, Some(i)));
            let others_with_i = social_welfare.saturating_sub(own_value);
            VcgAllocation {
                bidder_id: bids[i].bidder_id.clone(),
                quantity,
                valuation: bids[i].valuation,
                payment: without_i.saturating_sub(others_with_i).max(Decimal::ZERO),
            }
        })
        .collect();

    let revenue = allocations
        .iter()
        .fold(Decimal::ZERO, |total, a| total.saturating_add(a.payment));

    VcgResult {
        allocations,
        social_welfare,
        revenue,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn bid(id: &str, valuation: &str, quantity: i64) -> VcgBid {
        VcgBid {
            bidder_id: id.to_string(),
            valuation: Decimal::from_str(valuation).unwrap(),
            quantity: Decimal::from(quantity),
        }
    }

    fn sample_bids() -> Vec<VcgBid> {
        vec![
            bid("a", "0.05", 60),
            bid("b", "0.04", 50),
            bid("c", "0.03", 40),
            bid("d", "0.01", 100),
        ]
    }

    #[test]
    fn test_single_unit_is_second_price() {
        let bids = vec![bid("a", "10", 1), bid("b", "7", 1), bid("c", "3", 1)];
        let result = run_vcg(&bids, Decimal::ONE);

        assert_eq!(result.allocations.len(), 1);
        assert_eq!(result.allocations[0].bidder_id, "a");
        assert_eq!(result.allocations[0].payment, Decimal::from(7));
        assert_eq!(result.revenue, Decimal::from(7));
    }

    #[test]
    fn test_payment_is_externality_not_bid() {
        let result = run_vcg(&sample_bids(), Decimal::from(100));

        // a gets 60, b gets 40
        let a = result.allocation_for("a").unwrap();
        let b = result.allocation_for("b").unwrap();
        assert_eq!(a.quantity, Decimal::from(60));
        assert_eq!(b.quantity, Decimal::from(40));
        assert!(result.allocation_for("c").is_none());

        // Without a: b takes 50 and c 40, d 10 -> 2.0 + 1.2 + 0.1 = 3.3.
        // Others with a: b's 40 * 0.04 = 1.6. Payment 1.7.
        assert_eq!(a.payment, Decimal::from_str("1.7").unwrap());
        // Without b: a 60, c 40 -> 3.0 + 1.2 = 4.2; others with b: 3.0.
        assert_eq!(b.payment, Decimal::from_str("1.2").unwrap());

        assert_eq!(result.social_welfare, Decimal::from_str("4.6").unwrap());
        assert_eq!(result.revenue, Decimal::from_str("2.9").unwrap());
    }

    #[test]
    fn test_individual_rationality() {
        let bid_sets = vec![
            sample_bids(),
            vec![bid("x", "1", 10)],
            vec![bid("x", "2", 5), bid("y", "2", 5), bid("z", "1", 20)],
            vec![bid("x", "0.3", 7), bid("y", "0.9", 3), bid("z", "0.6", 11), bid("w", "0.2", 2)],
        ];

        for bids in bid_sets {
            for supply in [1, 5, 12, 100] {
                let result = run_vcg(&bids, Decimal::from(supply));
                for allocation in &result.allocations {
                    assert!(allocation.utility() >= Decimal::ZERO, "{allocation:?}");
                    assert!(allocation.payment >= Decimal::ZERO);
                }
            }
        }
    }

    #[test]
    fn test_truthful_bidding_dominates_deviation() {
        let supply = Decimal::from(100);
        let truthful = sample_bids();

        for (idx, honest) in truthful.iter().enumerate() {
            let truthful_utility = run_vcg(&truthful, supply)
                .allocation_for(&honest.bidder_id)
                .map(|a| a.utility())
                .unwrap_or(Decimal::ZERO);

            for pct in ["0.05", "0.2", "0.5"] {
                let pct = Decimal::from_str(pct).unwrap();
                for factor in [Decimal::ONE - pct, Decimal::ONE + pct] {
                    let mut deviated = truthful.clone();
                    deviated[idx].valuation = honest.valuation * factor;

                    // Utility is always measured at the true valuation
                    let utility = run_vcg(&deviated, supply)
                        .allocation_for(&honest.bidder_id)
                        .map(|a| honest.valuation * a.quantity - a.payment)
                        .unwrap_or(Decimal::ZERO);

                    assert!(
                        truthful_utility >= utility,
                        "{} gains by scaling bid by {factor}: {utility} > {truthful_utility}",
                        honest.bidder_id
                    );
                }
            }
        }
    }

    #[test]
    fn test_welfare_saturates_instead_of_overflowing() {
        let bids = vec![
            VcgBid {
                bidder_id: "a".into(),
                valuation: Decimal::MAX,
                quantity: Decimal::from(10),
            },
            bid("b", "5", 10),
        ];
        let result = run_vcg(&bids, Decimal::from(20));

        assert_eq!(result.social_welfare, Decimal::MAX);
        assert_eq!(result.allocations.len(), 2);
        for allocation in &result.allocations {
            assert!(allocation.payment >= Decimal::ZERO);
        }
    }

    #[test]
    fn test_empty_and_zero_supply() {
        assert_eq!(run_vcg(&[], Decimal::from(10)), VcgResult::default());

        let result = run_vcg(&sample_bids(), Decimal::ZERO);
        assert!(result.allocations.is_empty());
        assert_eq!(result.social_welfare, Decimal::ZERO);
    }
}
