use auction_settlement_types::AuctionResult;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::commit_reveal::{
    compute_commitment, CommitRevealParams, Nonce, NoncePool, RevealRegistry,
};
use crate::features::{FeatureWeights, MevFeatures};
use crate::MevError;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MevConfig {
    /// Confidence at or above which a sandwich is reported as detected
    pub detection_threshold: f64,
    pub weights: FeatureWeights,
    pub commit_reveal_threshold: f64,
    pub private_bundle_threshold: f64,
    pub batch_threshold: f64,
    /// Blocks between commitment and the reveal deadline
    pub reveal_delay_blocks: u64,
    /// Bond posted with a commitment, as a fraction of notional
    pub bond_percentage: Decimal,
    pub nonce_pool_size: usize,
    pub commit_reveal_cost_bps: u32,
    pub private_bundle_cost_bps: u32,
    pub batch_cost_bps: u32,
}

impl Default for MevConfig {
    fn default() -> Self {
        Self {
            detection_threshold: 0.5,
            weights: FeatureWeights::default(),
            commit_reveal_threshold: 0.9,
            private_bundle_threshold: 0.7,
            batch_threshold: 0.5,
            reveal_delay_blocks: 2,
            bond_percentage: Decimal::new(1, 2),
            nonce_pool_size: 64,
            commit_reveal_cost_bps: 10,
            private_bundle_cost_bps: 5,
            batch_cost_bps: 3,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SandwichDetection {
    pub confidence: f64,
    pub detected: bool,
    pub features: MevFeatures,
    /// Expected loss to a sandwich, in quote units
    pub estimated_loss: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProtectionStrategy {
    None,
    BatchSettlement,
    PrivateBundle,
    CommitReveal(CommitRevealParams),
}

impl ProtectionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtectionStrategy::None => "none",
            ProtectionStrategy::BatchSettlement => "batch_settlement",
            ProtectionStrategy::PrivateBundle => "private_bundle",
            ProtectionStrategy::CommitReveal(_) => "commit_reveal",
        }
    }

    fn cost_bps(&self, config: &MevConfig) -> u32 {
        match self {
            ProtectionStrategy::None => 0,
            ProtectionStrategy::BatchSettlement => config.batch_cost_bps,
            ProtectionStrategy::PrivateBundle => config.private_bundle_cost_bps,
            ProtectionStrategy::CommitReveal(_) => config.commit_reveal_cost_bps,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProtectionResult {
    pub detection: SandwichDetection,
    pub strategy: ProtectionStrategy,
    pub protection_cost: Decimal,
    /// Estimated loss minus protection cost. May be negative.
    pub estimated_savings: Decimal,
}

impl ProtectionResult {
    pub fn unprotected() -> Self {
        Self {
            detection: SandwichDetection {
                confidence: 0.0,
                detected: false,
                features: MevFeatures::default(),
                estimated_loss: Decimal::ZERO,
            },
            strategy: ProtectionStrategy::None,
            protection_cost: Decimal::ZERO,
            estimated_savings: Decimal::ZERO,
        }
    }

    /// A negative saving means the protection costs more than it saves
    pub fn is_worthwhile(&self) -> bool {
        self.estimated_savings > Decimal::ZERO
    }
}

/// Scores sandwich risk and picks a mitigation
pub struct MevProtector {
    config: MevConfig,
    nonces: NoncePool,
    reveals: RevealRegistry,
}

impl MevProtector {
    pub fn new(config: MevConfig) -> Self {
        Self {
            nonces: NoncePool::new(config.nonce_pool_size),
            reveals: RevealRegistry::new(),
            config,
        }
    }

    pub fn config(&self) -> &MevConfig {
        &self.config
    }

    pub fn detect_sandwich(&self, auction: &AuctionResult) -> SandwichDetection {
        let features = MevFeatures::extract(auction);
        let confidence = features.confidence(&self.config.weights);
        let impact = crate::features::raw_price_impact(
            auction.volume,
            auction
                .market
                .as_ref()
                .map(|m| m.pool_liquidity)
                .unwrap_or(Decimal::ZERO),
        );

        let estimated_loss = Decimal::from_f64(impact * confidence)
            .map(|factor| auction.notional() * factor)
            .unwrap_or(Decimal::ZERO);

        SandwichDetection {
            confidence,
            detected: confidence >= self.config.detection_threshold,
            features,
            estimated_loss,
        }
    }

    /// Never fails: a transaction that cannot be protected is returned
    /// with the strongest strategy that could be built.
    pub fn analyze_mev_risk(&self, transaction_id: &str, auction: &AuctionResult) -> ProtectionResult {
        let detection = self.detect_sandwich(auction);
        let confidence = detection.confidence;

        let strategy = if confidence > self.config.commit_reveal_threshold {
            match self.prepare_commit_reveal(transaction_id, auction) {
                Ok(params) => ProtectionStrategy::CommitReveal(params),
                Err(e) => {
                    warn!(
                        transaction_id,
                        error = %e,
                        "Commit-reveal unavailable, falling back to private bundle"
                    );
                    ProtectionStrategy::PrivateBundle
                }
            }
        } else if confidence > self.config.private_bundle_threshold {
            ProtectionStrategy::PrivateBundle
        } else if confidence > self.config.batch_threshold {
            ProtectionStrategy::BatchSettlement
        } else {
            ProtectionStrategy::None
        };

        let protection_cost =
            auction.notional() * Decimal::from(strategy.cost_bps(&self.config)) / Decimal::from(10_000);
        let estimated_savings = detection.estimated_loss - protection_cost;

        if detection.detected {
            info!(
                transaction_id,
                confidence,
                strategy = strategy.as_str(),
                estimated_loss = %detection.estimated_loss,
                estimated_savings = %estimated_savings,
                "Sandwich risk detected"
            );
        } else {
            debug!(transaction_id, confidence, "MEV risk below threshold");
        }

        ProtectionResult {
            detection,
            strategy,
            protection_cost,
            estimated_savings,
        }
    }

    /// Canonical bytes committed to for a settlement
    pub fn commitment_payload(auction: &AuctionResult) -> Result<Vec<u8>, MevError> {
        serde_json::to_vec(auction).map_err(|e| MevError::Serialization {
            reason: e.to_string(),
        })
    }

    fn prepare_commit_reveal(
        &self,
        transaction_id: &str,
        auction: &AuctionResult,
    ) -> Result<CommitRevealParams, MevError> {
        let payload = Self::commitment_payload(auction)?;
        let nonce = self.nonces.take();
        let current_block = auction.market.as_ref().map(|m| m.current_block).unwrap_or(0);

        let params = CommitRevealParams {
            transaction_id: transaction_id.to_string(),
            commitment: compute_commitment(&payload, &nonce),
            nonce,
            reveal_deadline_block: current_block + self.config.reveal_delay_blocks,
            bond: auction.notional() * self.config.bond_percentage,
        };

        self.reveals.register(params.clone());
        Ok(params)
    }

    pub fn verify_reveal(
        &self,
        transaction_id: &str,
        payload: &[u8],
        nonce: &Nonce,
    ) -> Result<CommitRevealParams, MevError> {
        self.reveals.verify(transaction_id, payload, nonce)
    }

    /// Forget a commitment whose transaction will never be revealed
    pub fn discard_reveal(&self, transaction_id: &str) -> bool {
        self.reveals.discard(transaction_id).is_some()
    }

    pub fn expire_reveals(&self, current_block: u64) -> Vec<String> {
        let expired = self.reveals.expire(current_block);
        if !expired.is_empty() {
            warn!(count = expired.len(), current_block, "Expired unrevealed commitments");
        }
        expired
    }

    pub fn pending_reveals(&self) -> usize {
        self.reveals.len()
    }
}

impl Default for MevProtector {
    fn default() -> Self {
        Self::new(MevConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use auction_settlement_types::{MarketContext, Side, TokenPair};
    use std::str::FromStr;

    fn auction(market: Option<MarketContext>) -> AuctionResult {
        let mut result = AuctionResult::new(
            "auction-1",
            TokenPair::new("ATOM", "USDC"),
            Side::Buy,
            Decimal::from_str("10").unwrap(),
            Decimal::from(200),
        );
        result.market = market;
        result
    }

    fn market(offset_ms: u64, gas: i64, flagged: u64) -> MarketContext {
        MarketContext {
            pool_liquidity: Decimal::from(1_000),
            average_volume: Decimal::from(20),
            gas_price: Decimal::from(gas),
            median_gas_price: Decimal::from(100),
            block_offset_ms: offset_ms,
            block_time_ms: 6_000,
            current_block: 500,
            sender: "0xabc".into(),
            sender_tx_count: 9,
            sender_flagged_count: flagged,
        }
    }

    #[test]
    fn test_no_market_context_needs_no_protection() {
        let protector = MevProtector::default();
        let result = protector.analyze_mev_risk("tx-1", &auction(None));

        assert!(!result.detection.detected);
        assert_eq!(result.strategy, ProtectionStrategy::None);
        assert_eq!(result.protection_cost, Decimal::ZERO);
        assert_eq!(protector.pending_reveals(), 0);
    }

    #[test]
    fn test_high_risk_selects_commit_reveal() {
        let protector = MevProtector::default();
        let auction = auction(Some(market(5_900, 300, 9)));
        let result = protector.analyze_mev_risk("tx-1", &auction);

        assert!(result.detection.detected);
        let params = match &result.strategy {
            ProtectionStrategy::CommitReveal(params) => params.clone(),
            other => panic!("expected commit-reveal, got {other:?}"),
        };
        assert_eq!(params.reveal_deadline_block, 502);
        // 1% of 2000 notional
        assert_eq!(params.bond, Decimal::from(20));
        assert_eq!(protector.pending_reveals(), 1);

        let payload = MevProtector::commitment_payload(&auction).unwrap();
        protector
            .verify_reveal("tx-1", &payload, &params.nonce)
            .unwrap();
        assert_eq!(protector.pending_reveals(), 0);
    }

    #[test]
    fn test_strategy_ladder_is_monotonic() {
        let protector = MevProtector::default();
        let mut last_rank = 0;

        // Increasing hostility yields non-decreasing strategy strength
        for (offset, gas, flagged) in [(0, 100, 0), (3_000, 200, 3), (5_000, 250, 6), (5_900, 300, 9)] {
            let result = protector.analyze_mev_risk("tx", &auction(Some(market(offset, gas, flagged))));
            let rank = match result.strategy {
                ProtectionStrategy::None => 0,
                ProtectionStrategy::BatchSettlement => 1,
                ProtectionStrategy::PrivateBundle => 2,
                ProtectionStrategy::CommitReveal(_) => 3,
            };
            assert!(rank >= last_rank);
            last_rank = rank;
        }
        assert_eq!(last_rank, 3);
    }

    #[test]
    fn test_savings_can_be_negative() {
        let config = MevConfig {
            batch_threshold: 0.0,
            private_bundle_threshold: 2.0,
            commit_reveal_threshold: 2.0,
            batch_cost_bps: 10_000,
            ..Default::default()
        };
        let protector = MevProtector::new(config);
        let result = protector.analyze_mev_risk("tx", &auction(Some(market(0, 100, 0))));

        assert_eq!(result.strategy, ProtectionStrategy::BatchSettlement);
        assert!(result.estimated_savings < Decimal::ZERO);
        assert!(!result.is_worthwhile());
    }

    #[test]
    fn test_expire_and_discard() {
        let protector = MevProtector::default();
        protector.analyze_mev_risk("tx-a", &auction(Some(market(5_900, 300, 9))));
        protector.analyze_mev_risk("tx-b", &auction(Some(market(5_900, 300, 9))));
        assert_eq!(protector.pending_reveals(), 2);

        assert!(protector.discard_reveal("tx-a"));
        assert!(!protector.discard_reveal("tx-a"));

        let expired = protector.expire_reveals(503);
        assert_eq!(expired, vec!["tx-b".to_string()]);
        assert_eq!(protector.pending_reveals(), 0);
    }
}
