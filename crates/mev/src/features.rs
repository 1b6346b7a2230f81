//! Sandwich-risk features.
//!
//! Each feature is computed independently from the market context and
//! normalized to `[0, 1]`, where 1 is maximally suspicious.

use auction_settlement_types::{AuctionResult, MarketContext};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Price impact at which the feature saturates (5%)
pub const PRICE_IMPACT_SATURATION: f64 = 0.05;
/// Volume multiple of the rolling average at which the feature saturates
pub const VOLUME_SPIKE_SATURATION: f64 = 5.0;
/// Gas price multiple of the median at which the feature saturates
pub const GAS_RATIO_SATURATION: f64 = 3.0;
/// Floor applied before taking logs so a zero feature does not zero the score
pub const FEATURE_FLOOR: f64 = 0.01;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MevFeatures {
    pub price_impact: f64,
    pub volume_spike: f64,
    pub timing_anomaly: f64,
    pub gas_anomaly: f64,
    pub sender_risk: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureWeights {
    pub price_impact: f64,
    pub volume_spike: f64,
    pub timing_anomaly: f64,
    pub gas_anomaly: f64,
    pub sender_risk: f64,
}

impl Default for FeatureWeights {
    fn default() -> Self {
        Self {
            price_impact: 0.35,
            volume_spike: 0.20,
            timing_anomaly: 0.15,
            gas_anomaly: 0.15,
            sender_risk: 0.15,
        }
    }
}

impl FeatureWeights {
    pub fn total(&self) -> f64 {
        self.price_impact + self.volume_spike + self.timing_anomaly + self.gas_anomaly + self.sender_risk
    }

    fn pairs(&self, features: &MevFeatures) -> [(f64, f64); 5] {
        [
            (self.price_impact, features.price_impact),
            (self.volume_spike, features.volume_spike),
            (self.timing_anomaly, features.timing_anomaly),
            (self.gas_anomaly, features.gas_anomaly),
            (self.sender_risk, features.sender_risk),
        ]
    }
}

fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

fn ramp(value: f64, start: f64, saturation: f64) -> f64 {
    if saturation <= start {
        return 0.0;
    }
    ((value - start) / (saturation - start)).clamp(0.0, 1.0)
}

impl MevFeatures {
    /// Without market context every feature is zero.
    pub fn extract(auction: &AuctionResult) -> Self {
        match &auction.market {
            Some(market) => Self::from_market(auction.volume, market),
            None => Self::default(),
        }
    }

    pub fn from_market(volume: Decimal, market: &MarketContext) -> Self {
        Self {
            price_impact: price_impact(volume, market),
            volume_spike: volume_spike(volume, market),
            timing_anomaly: timing_anomaly(market),
            gas_anomaly: gas_anomaly(market),
            sender_risk: sender_risk(market),
        }
    }

    /// Weighted geometric mean of the floored features
    pub fn confidence(&self, weights: &FeatureWeights) -> f64 {
        let total = weights.total();
        if total <= 0.0 {
            return 0.0;
        }

        let log_sum: f64 = weights
            .pairs(self)
            .iter()
            .map(|(w, f)| w * f.clamp(FEATURE_FLOOR, 1.0).ln())
            .sum();

        (log_sum / total).exp().clamp(0.0, 1.0)
    }
}

/// Constant-product price impact estimate `v / (L + v)`
pub fn raw_price_impact(volume: Decimal, liquidity: Decimal) -> f64 {
    match liquidity.checked_add(volume) {
        Some(denom) if denom > Decimal::ZERO => volume.checked_div(denom).map_or(1.0, to_f64),
        Some(_) => 0.0,
        None => 1.0,
    }
}

fn price_impact(volume: Decimal, market: &MarketContext) -> f64 {
    let impact = raw_price_impact(volume, market.pool_liquidity);
    (impact / PRICE_IMPACT_SATURATION).clamp(0.0, 1.0)
}

fn volume_spike(volume: Decimal, market: &MarketContext) -> f64 {
    if market.average_volume <= Decimal::ZERO {
        return 0.0;
    }
    let ratio = volume
        .checked_div(market.average_volume)
        .map_or(f64::MAX, to_f64);
    ramp(ratio, 1.0, VOLUME_SPIKE_SATURATION)
}

fn timing_anomaly(market: &MarketContext) -> f64 {
    if market.block_time_ms == 0 {
        return 0.0;
    }
    (market.block_offset_ms as f64 / market.block_time_ms as f64).clamp(0.0, 1.0)
}

fn gas_anomaly(market: &MarketContext) -> f64 {
    if market.median_gas_price <= Decimal::ZERO {
        return 0.0;
    }
    let ratio = market
        .gas_price
        .checked_div(market.median_gas_price)
        .map_or(f64::MAX, to_f64);
    ramp(ratio, 1.0, GAS_RATIO_SATURATION)
}

/// Laplace-smoothed share of the sender's history flagged as sandwich legs
fn sender_risk(market: &MarketContext) -> f64 {
    let flagged = market.sender_flagged_count.min(market.sender_tx_count) as f64;
    ((flagged + 0.5) / (market.sender_tx_count as f64 + 1.0)).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hostile_market() -> MarketContext {
        MarketContext {
            pool_liquidity: Decimal::from(1_000),
            average_volume: Decimal::from(20),
            gas_price: Decimal::from(300),
            median_gas_price: Decimal::from(100),
            block_offset_ms: 5_900,
            block_time_ms: 6_000,
            current_block: 100,
            sender: "sender".into(),
            sender_tx_count: 9,
            sender_flagged_count: 9,
        }
    }

    #[test]
    fn test_features_saturate_in_hostile_market() {
        let features = MevFeatures::from_market(Decimal::from(200), &hostile_market());

        assert_eq!(features.price_impact, 1.0);
        assert_eq!(features.volume_spike, 1.0);
        assert!(features.timing_anomaly > 0.98);
        assert_eq!(features.gas_anomaly, 1.0);
        assert_eq!(features.sender_risk, 0.95);

        let confidence = features.confidence(&FeatureWeights::default());
        assert!(confidence > 0.9, "confidence {confidence}");
    }

    #[test]
    fn test_features_are_normalized() {
        let market = MarketContext {
            pool_liquidity: Decimal::ZERO,
            average_volume: Decimal::ONE,
            gas_price: Decimal::from(1_000_000),
            median_gas_price: Decimal::ONE,
            block_offset_ms: 60_000,
            block_time_ms: 1,
            sender_tx_count: 0,
            sender_flagged_count: 10,
            ..Default::default()
        };
        let f = MevFeatures::from_market(Decimal::from(1_000_000), &market);

        for value in [
            f.price_impact,
            f.volume_spike,
            f.timing_anomaly,
            f.gas_anomaly,
            f.sender_risk,
        ] {
            assert!((0.0..=1.0).contains(&value));
        }
    }

    #[test]
    fn test_single_zero_feature_does_not_zero_confidence() {
        let features = MevFeatures {
            price_impact: 1.0,
            volume_spike: 1.0,
            timing_anomaly: 0.0,
            gas_anomaly: 1.0,
            sender_risk: 1.0,
        };

        let confidence = features.confidence(&FeatureWeights::default());
        assert!(confidence > 0.0);
        assert!(confidence < 1.0);
    }

    #[test]
    fn test_no_market_context_scores_low() {
        let features = MevFeatures::default();
        let confidence = features.confidence(&FeatureWeights::default());
        assert!((confidence - FEATURE_FLOOR).abs() < 1e-9);
    }

    #[test]
    fn test_raw_price_impact() {
        assert_eq!(raw_price_impact(Decimal::from(10), Decimal::from(90)), 0.1);
        assert_eq!(raw_price_impact(Decimal::ZERO, Decimal::ZERO), 0.0);
    }
}
