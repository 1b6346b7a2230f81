//! Core configuration structures for auction settlement

use auction_settlement_mev::FeatureWeights;
use auction_settlement_phantom::PricingMechanism;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Deployment environment
    #[serde(default)]
    pub environment: Environment,

    #[serde(default)]
    pub logging: LoggingSettings,

    #[serde(default)]
    pub metrics: MetricsSettings,

    /// Orchestrator behaviour
    #[serde(default)]
    pub settlement: SettlementSettings,

    #[serde(default)]
    pub circuit_breaker: CircuitBreakerSettings,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub mev: MevSettings,

    #[serde(default)]
    pub phantom: PhantomSettings,

    /// Two-phase-commit consensus
    #[serde(default)]
    pub coordinator: CoordinatorSettings,
}

/// Environment types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Mainnet,
    Testnet,
    #[default]
    Local,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Extra `target=level` directives appended to the level
    #[serde(default)]
    pub directives: Vec<String>,
}

impl LoggingSettings {
    /// Filter string used when `RUST_LOG` is unset
    pub fn filter_directive(&self) -> String {
        std::iter::once(self.level.as_str())
            .chain(self.directives.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSettings {
    /// Enable metrics collection
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Address the `/metrics` endpoint listens on
    #[serde(default = "default_metrics_addr")]
    pub listen_addr: String,
}

/// Settlement orchestration configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementSettings {
    /// Settlement timeout at normal priority, in milliseconds
    #[serde(default = "default_base_timeout_ms")]
    pub base_timeout_ms: u64,

    #[serde(default = "default_true")]
    pub parallel_execution: bool,

    #[serde(default = "default_true")]
    pub phantom_auction: bool,

    #[serde(default)]
    pub require_consensus: bool,

    #[serde(default = "default_true")]
    pub mev_protection: bool,

    /// Settlements admitted at once
    #[serde(default = "default_max_concurrent_settlements")]
    pub max_concurrent_settlements: u32,

    #[serde(default = "default_max_parallel_batches")]
    pub max_parallel_batches: usize,
}

/// Circuit breaker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerSettings {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    #[serde(default = "default_recovery_threshold")]
    pub recovery_threshold: u32,

    /// Time spent open before probing, in milliseconds
    #[serde(default = "default_breaker_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_half_open_max_calls")]
    pub half_open_max_calls: u32,

    #[serde(default = "default_volume_threshold")]
    pub volume_threshold: u32,

    /// Percentage (0-100)
    #[serde(default = "default_error_threshold_percentage")]
    pub error_threshold_percentage: f64,

    #[serde(default = "default_monitoring_window_ms")]
    pub monitoring_window_ms: u64,
}

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_exponential_base")]
    pub exponential_base: f64,

    /// Fraction of each delay applied as jitter
    #[serde(default = "default_jitter_ratio")]
    pub jitter_ratio: f64,

    /// Error categories that are retried (timeout, transient, rate_limited, ...)
    #[serde(default = "default_retryable")]
    pub retryable: Vec<String>,
}

/// MEV protection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MevSettings {
    #[serde(default = "default_detection_threshold")]
    pub detection_threshold: f64,

    #[serde(default = "default_commit_reveal_threshold")]
    pub commit_reveal_threshold: f64,

    #[serde(default = "default_private_bundle_threshold")]
    pub private_bundle_threshold: f64,

    #[serde(default = "default_batch_threshold")]
    pub batch_threshold: f64,

    #[serde(default = "default_reveal_delay_blocks")]
    pub reveal_delay_blocks: u64,

    /// Commitment bond in basis points of notional
    #[serde(default = "default_bond_bps")]
    pub bond_bps: u32,

    #[serde(default = "default_nonce_pool_size")]
    pub nonce_pool_size: usize,

    #[serde(default = "default_commit_reveal_cost_bps")]
    pub commit_reveal_cost_bps: u32,

    #[serde(default = "default_private_bundle_cost_bps")]
    pub private_bundle_cost_bps: u32,

    #[serde(default = "default_batch_cost_bps")]
    pub batch_cost_bps: u32,

    /// Sandwich feature weights, summing to 1
    #[serde(default)]
    pub weights: FeatureWeights,
}

/// Phantom auction configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhantomSettings {
    /// Total auction window in milliseconds
    #[serde(default = "default_auction_duration_ms")]
    pub duration_ms: u64,

    #[serde(default = "default_reveal_delay_ms")]
    pub reveal_delay_ms: u64,

    #[serde(default = "default_min_participants")]
    pub min_participants: usize,

    #[serde(default = "default_min_improvement_bps")]
    pub min_improvement_bps: Decimal,

    #[serde(default = "default_max_improvement_bps")]
    pub max_improvement_bps: Decimal,

    #[serde(default = "default_max_volume_multiple")]
    pub max_volume_multiple: Decimal,

    #[serde(default = "default_max_fee_fraction")]
    pub max_fee_fraction: Decimal,

    #[serde(default = "default_price_weight")]
    pub price_weight: Decimal,

    #[serde(default = "default_fee_weight")]
    pub fee_weight: Decimal,

    #[serde(default)]
    pub mechanism: PricingMechanism,
}

/// Consensus coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorSettings {
    /// Fraction of active participants that must agree, in (0.5, 1.0]
    #[serde(default = "default_consensus_threshold")]
    pub threshold: f64,

    #[serde(default = "default_vote_timeout_ms")]
    pub vote_timeout_ms: u64,

    #[serde(default = "default_vote_retry_count")]
    pub retry_count: u32,

    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    /// Missed heartbeat intervals before a participant is inactive
    #[serde(default = "default_heartbeat_multiplier")]
    pub heartbeat_multiplier: u32,

    #[serde(default = "default_min_response_rate")]
    pub min_response_rate: f64,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_metrics_addr() -> String {
    "0.0.0.0:9090".to_string()
}

fn default_base_timeout_ms() -> u64 {
    30_000
}

fn default_max_concurrent_settlements() -> u32 {
    100
}

fn default_max_parallel_batches() -> usize {
    4
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_recovery_threshold() -> u32 {
    2
}

fn default_breaker_timeout_ms() -> u64 {
    60_000
}

fn default_half_open_max_calls() -> u32 {
    3
}

fn default_volume_threshold() -> u32 {
    10
}

fn default_error_threshold_percentage() -> f64 {
    50.0
}

fn default_monitoring_window_ms() -> u64 {
    60_000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    100
}

fn default_max_delay_ms() -> u64 {
    5_000
}

fn default_exponential_base() -> f64 {
    2.0
}

fn default_jitter_ratio() -> f64 {
    0.1
}

fn default_retryable() -> Vec<String> {
    vec![
        "timeout".to_string(),
        "transient".to_string(),
        "rate_limited".to_string(),
    ]
}

fn default_detection_threshold() -> f64 {
    0.5
}

fn default_commit_reveal_threshold() -> f64 {
    0.9
}

fn default_private_bundle_threshold() -> f64 {
    0.7
}

fn default_batch_threshold() -> f64 {
    0.5
}

fn default_reveal_delay_blocks() -> u64 {
    2
}

fn default_bond_bps() -> u32 {
    100 // 1%
}

fn default_nonce_pool_size() -> usize {
    64
}

fn default_commit_reveal_cost_bps() -> u32 {
    10
}

fn default_private_bundle_cost_bps() -> u32 {
    5
}

fn default_batch_cost_bps() -> u32 {
    3
}

fn default_auction_duration_ms() -> u64 {
    1_000
}

fn default_reveal_delay_ms() -> u64 {
    300
}

fn default_min_participants() -> usize {
    2
}

fn default_min_improvement_bps() -> Decimal {
    Decimal::ONE
}

fn default_max_improvement_bps() -> Decimal {
    Decimal::from(500)
}

fn default_max_volume_multiple() -> Decimal {
    Decimal::from(2)
}

fn default_max_fee_fraction() -> Decimal {
    Decimal::new(1, 2)
}

fn default_price_weight() -> Decimal {
    Decimal::new(7, 1)
}

fn default_fee_weight() -> Decimal {
    Decimal::new(3, 1)
}

fn default_consensus_threshold() -> f64 {
    0.67
}

fn default_vote_timeout_ms() -> u64 {
    5_000
}

fn default_vote_retry_count() -> u32 {
    1
}

fn default_heartbeat_interval_ms() -> u64 {
    5_000
}

fn default_heartbeat_multiplier() -> u32 {
    3
}

fn default_min_response_rate() -> f64 {
    0.5
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directives: Vec::new(),
        }
    }
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            listen_addr: default_metrics_addr(),
        }
    }
}

impl Default for SettlementSettings {
    fn default() -> Self {
        Self {
            base_timeout_ms: default_base_timeout_ms(),
            parallel_execution: default_true(),
            phantom_auction: default_true(),
            require_consensus: false,
            mev_protection: default_true(),
            max_concurrent_settlements: default_max_concurrent_settlements(),
            max_parallel_batches: default_max_parallel_batches(),
        }
    }
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            recovery_threshold: default_recovery_threshold(),
            timeout_ms: default_breaker_timeout_ms(),
            half_open_max_calls: default_half_open_max_calls(),
            volume_threshold: default_volume_threshold(),
            error_threshold_percentage: default_error_threshold_percentage(),
            monitoring_window_ms: default_monitoring_window_ms(),
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            exponential_base: default_exponential_base(),
            jitter_ratio: default_jitter_ratio(),
            retryable: default_retryable(),
        }
    }
}

impl Default for MevSettings {
    fn default() -> Self {
        Self {
            detection_threshold: default_detection_threshold(),
            commit_reveal_threshold: default_commit_reveal_threshold(),
            private_bundle_threshold: default_private_bundle_threshold(),
            batch_threshold: default_batch_threshold(),
            reveal_delay_blocks: default_reveal_delay_blocks(),
            bond_bps: default_bond_bps(),
            nonce_pool_size: default_nonce_pool_size(),
            commit_reveal_cost_bps: default_commit_reveal_cost_bps(),
            private_bundle_cost_bps: default_private_bundle_cost_bps(),
            batch_cost_bps: default_batch_cost_bps(),
            weights: FeatureWeights::default(),
        }
    }
}

impl Default for PhantomSettings {
    fn default() -> Self {
        Self {
            duration_ms: default_auction_duration_ms(),
            reveal_delay_ms: default_reveal_delay_ms(),
            min_participants: default_min_participants(),
            min_improvement_bps: default_min_improvement_bps(),
            max_improvement_bps: default_max_improvement_bps(),
            max_volume_multiple: default_max_volume_multiple(),
            max_fee_fraction: default_max_fee_fraction(),
            price_weight: default_price_weight(),
            fee_weight: default_fee_weight(),
            mechanism: PricingMechanism::default(),
        }
    }
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            threshold: default_consensus_threshold(),
            vote_timeout_ms: default_vote_timeout_ms(),
            retry_count: default_vote_retry_count(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            heartbeat_multiplier: default_heartbeat_multiplier(),
            min_response_rate: default_min_response_rate(),
        }
    }
}
