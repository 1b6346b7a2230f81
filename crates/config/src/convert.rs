//! Conversion of loaded sections into the component configs

use crate::{
    AppConfig, CircuitBreakerSettings, ConfigError, CoordinatorSettings, MevSettings,
    PhantomSettings, Result, RetrySettings, SettlementSettings,
};
use auction_settlement_coordinator::ConsensusProtocol;
use auction_settlement_mev::MevConfig;
use auction_settlement_orchestrator::OrchestratorConfig;
use auction_settlement_phantom::PhantomAuctionConfig;
use auction_settlement_resilience::{CircuitBreakerConfig, ErrorCategory, RetryPolicy};
use rust_decimal::Decimal;
use std::time::Duration;

/// Map a configured category name onto an [`ErrorCategory`]
pub fn parse_error_category(name: &str) -> Option<ErrorCategory> {
    match name.trim().to_lowercase().as_str() {
        "timeout" => Some(ErrorCategory::Timeout),
        "transient" => Some(ErrorCategory::Transient),
        "rate_limited" => Some(ErrorCategory::RateLimited),
        "validation" => Some(ErrorCategory::Validation),
        "circuit_open" => Some(ErrorCategory::CircuitOpen),
        "permanent" => Some(ErrorCategory::Permanent),
        _ => None,
    }
}

impl From<&SettlementSettings> for OrchestratorConfig {
    fn from(settings: &SettlementSettings) -> Self {
        OrchestratorConfig::default()
            .with_base_timeout(Duration::from_millis(settings.base_timeout_ms))
            .with_parallel_execution(settings.parallel_execution)
            .with_phantom_auction(settings.phantom_auction)
            .with_consensus(settings.require_consensus)
            .with_mev_protection(settings.mev_protection)
            .with_max_concurrent_settlements(settings.max_concurrent_settlements)
            .with_max_parallel_batches(settings.max_parallel_batches)
    }
}

impl From<&CircuitBreakerSettings> for CircuitBreakerConfig {
    fn from(settings: &CircuitBreakerSettings) -> Self {
        CircuitBreakerConfig {
            failure_threshold: settings.failure_threshold,
            recovery_threshold: settings.recovery_threshold,
            timeout: Duration::from_millis(settings.timeout_ms),
            half_open_max_calls: settings.half_open_max_calls,
            volume_threshold: settings.volume_threshold,
            error_threshold_percentage: settings.error_threshold_percentage,
            monitoring_window: Duration::from_millis(settings.monitoring_window_ms),
        }
    }
}

impl TryFrom<&RetrySettings> for RetryPolicy {
    type Error = ConfigError;

    fn try_from(settings: &RetrySettings) -> Result<Self> {
        let retryable = settings
            .retryable
            .iter()
            .map(|name| {
                parse_error_category(name).ok_or_else(|| {
                    ConfigError::ParseError(format!("unknown retry category '{name}'"))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(RetryPolicy::new(
            settings.max_attempts,
            Duration::from_millis(settings.base_delay_ms),
            Duration::from_millis(settings.max_delay_ms),
        )
        .with_exponential_base(settings.exponential_base)
        .with_jitter(settings.jitter_ratio)
        .with_retryable(retryable))
    }
}

impl From<&MevSettings> for MevConfig {
    fn from(settings: &MevSettings) -> Self {
        MevConfig {
            detection_threshold: settings.detection_threshold,
            weights: settings.weights,
            commit_reveal_threshold: settings.commit_reveal_threshold,
            private_bundle_threshold: settings.private_bundle_threshold,
            batch_threshold: settings.batch_threshold,
            reveal_delay_blocks: settings.reveal_delay_blocks,
            bond_percentage: Decimal::new(settings.bond_bps as i64, 4),
            nonce_pool_size: settings.nonce_pool_size,
            commit_reveal_cost_bps: settings.commit_reveal_cost_bps,
            private_bundle_cost_bps: settings.private_bundle_cost_bps,
            batch_cost_bps: settings.batch_cost_bps,
        }
    }
}

impl From<&PhantomSettings> for PhantomAuctionConfig {
    fn from(settings: &PhantomSettings) -> Self {
        PhantomAuctionConfig {
            duration: Duration::from_millis(settings.duration_ms),
            reveal_delay: Duration::from_millis(settings.reveal_delay_ms),
            min_participants: settings.min_participants,
            min_improvement_bps: settings.min_improvement_bps,
            max_improvement_bps: settings.max_improvement_bps,
            max_volume_multiple: settings.max_volume_multiple,
            max_fee_fraction: settings.max_fee_fraction,
            price_weight: settings.price_weight,
            fee_weight: settings.fee_weight,
            mechanism: settings.mechanism,
        }
    }
}

impl TryFrom<&CoordinatorSettings> for ConsensusProtocol {
    type Error = ConfigError;

    fn try_from(settings: &CoordinatorSettings) -> Result<Self> {
        let protocol = ConsensusProtocol::new(
            settings.threshold,
            Duration::from_millis(settings.vote_timeout_ms),
        )
        .and_then(|p| {
            p.with_retry_count(settings.retry_count)
                .with_heartbeat(
                    Duration::from_millis(settings.heartbeat_interval_ms),
                    settings.heartbeat_multiplier,
                )
                .with_min_response_rate(settings.min_response_rate)
        })
        .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        Ok(protocol)
    }
}

impl AppConfig {
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig::from(&self.settlement)
    }

    pub fn circuit_breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig::from(&self.circuit_breaker)
    }

    pub fn retry_policy(&self) -> Result<RetryPolicy> {
        RetryPolicy::try_from(&self.retry)
    }

    pub fn mev_config(&self) -> MevConfig {
        MevConfig::from(&self.mev)
    }

    pub fn phantom_config(&self) -> PhantomAuctionConfig {
        PhantomAuctionConfig::from(&self.phantom)
    }

    pub fn consensus_protocol(&self) -> Result<ConsensusProtocol> {
        ConsensusProtocol::try_from(&self.coordinator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use auction_settlement_types::SettlementError;

    #[test]
    fn test_defaults_match_component_defaults() {
        let config = AppConfig::default();

        let breaker = config.circuit_breaker_config();
        let expected = CircuitBreakerConfig::default();
        assert_eq!(breaker.failure_threshold, expected.failure_threshold);
        assert_eq!(breaker.timeout, expected.timeout);
        assert_eq!(breaker.monitoring_window, expected.monitoring_window);

        assert_eq!(config.mev_config().bond_percentage, MevConfig::default().bond_percentage);
        assert_eq!(config.phantom_config(), PhantomAuctionConfig::default());
        assert_eq!(config.consensus_protocol().unwrap(), ConsensusProtocol::default());

        let orchestrator = config.orchestrator_config();
        assert_eq!(orchestrator.base_timeout, Duration::from_secs(30));
        assert_eq!(orchestrator.max_concurrent_settlements, 100);
    }

    #[test]
    fn test_retry_policy_categories() {
        let mut config = AppConfig::default();
        config.retry.retryable = vec!["Timeout".to_string(), "permanent".to_string()];

        let policy = config.retry_policy().unwrap();
        assert_eq!(policy.retryable.len(), 2);
        assert!(policy.retryable.contains(&ErrorCategory::Permanent));

        config.retry.retryable = vec!["sometimes".to_string()];
        assert!(matches!(
            config.retry_policy(),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_invalid_threshold_is_rejected() {
        let mut config = AppConfig::default();
        config.coordinator.threshold = 0.5;
        assert!(matches!(
            config.consensus_protocol(),
            Err(ConfigError::ValidationError(_))
        ));

        let err: SettlementError = config.consensus_protocol().unwrap_err().into();
        assert!(matches!(err, SettlementError::Validation { .. }));
    }
}
