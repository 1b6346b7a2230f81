//! Configuration validation

use crate::{parse_error_category, AppConfig, ConfigError, Result};
use rust_decimal::Decimal;
use std::net::SocketAddr;

const WEIGHT_TOLERANCE: f64 = 1e-6;

/// Validation error details
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate the entire application configuration
///
/// Every violation is collected and reported in a single
/// [`ConfigError::ValidationError`].
pub fn validate_config(config: &AppConfig) -> Result<()> {
    let errors = collect_violations(config);

    if !errors.is_empty() {
        let error_msg = errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(ConfigError::ValidationError(error_msg));
    }

    Ok(())
}

/// Every violation in `config`, in section order
pub fn collect_violations(config: &AppConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    // Logging and metrics
    if let Err(e) = validate_log_level(&config.logging.level) {
        errors.push(e);
    }

    if config.metrics.enabled && config.metrics.listen_addr.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "metrics.listen_addr",
            format!("'{}' is not a socket address", config.metrics.listen_addr),
        ));
    }

    // Settlement
    let settlement = &config.settlement;
    require_positive(&mut errors, "settlement.base_timeout_ms", settlement.base_timeout_ms);
    require_positive(
        &mut errors,
        "settlement.max_concurrent_settlements",
        settlement.max_concurrent_settlements as u64,
    );
    require_positive(
        &mut errors,
        "settlement.max_parallel_batches",
        settlement.max_parallel_batches as u64,
    );

    // Circuit breaker
    let breaker = &config.circuit_breaker;
    require_positive(&mut errors, "circuit_breaker.failure_threshold", breaker.failure_threshold as u64);
    require_positive(&mut errors, "circuit_breaker.recovery_threshold", breaker.recovery_threshold as u64);
    require_positive(&mut errors, "circuit_breaker.timeout_ms", breaker.timeout_ms);
    require_positive(&mut errors, "circuit_breaker.half_open_max_calls", breaker.half_open_max_calls as u64);
    require_positive(&mut errors, "circuit_breaker.monitoring_window_ms", breaker.monitoring_window_ms);

    if !(breaker.error_threshold_percentage > 0.0 && breaker.error_threshold_percentage <= 100.0) {
        errors.push(ValidationError::new(
            "circuit_breaker.error_threshold_percentage",
            "must be in (0, 100]",
        ));
    }

    // Retry
    let retry = &config.retry;
    require_positive(&mut errors, "retry.max_attempts", retry.max_attempts as u64);
    require_positive(&mut errors, "retry.base_delay_ms", retry.base_delay_ms);

    if retry.max_delay_ms < retry.base_delay_ms {
        errors.push(ValidationError::new(
            "retry.max_delay_ms",
            "must be >= retry.base_delay_ms",
        ));
    }

    if retry.exponential_base < 1.0 {
        errors.push(ValidationError::new("retry.exponential_base", "must be >= 1.0"));
    }

    if !(0.0..=1.0).contains(&retry.jitter_ratio) {
        errors.push(ValidationError::new("retry.jitter_ratio", "must be in [0, 1]"));
    }

    for name in &retry.retryable {
        if parse_error_category(name).is_none() {
            errors.push(ValidationError::new(
                "retry.retryable",
                format!("unknown error category '{name}'"),
            ));
        }
    }

    // MEV
    let mev = &config.mev;
    for (field, value) in [
        ("mev.detection_threshold", mev.detection_threshold),
        ("mev.commit_reveal_threshold", mev.commit_reveal_threshold),
        ("mev.private_bundle_threshold", mev.private_bundle_threshold),
        ("mev.batch_threshold", mev.batch_threshold),
    ] {
        if !(0.0..=1.0).contains(&value) {
            errors.push(ValidationError::new(field, "must be in [0, 1]"));
        }
    }

    if !(mev.batch_threshold <= mev.private_bundle_threshold
        && mev.private_bundle_threshold <= mev.commit_reveal_threshold)
    {
        errors.push(ValidationError::new(
            "mev",
            "thresholds must satisfy batch <= private_bundle <= commit_reveal",
        ));
    }

    let weights = &mev.weights;
    if [
        weights.price_impact,
        weights.volume_spike,
        weights.timing_anomaly,
        weights.gas_anomaly,
        weights.sender_risk,
    ]
    .iter()
    .any(|w| *w < 0.0)
    {
        errors.push(ValidationError::new("mev.weights", "weights must be non-negative"));
    }

    if (weights.total() - 1.0).abs() > WEIGHT_TOLERANCE {
        errors.push(ValidationError::new(
            "mev.weights",
            format!("weights must sum to 1, got {}", weights.total()),
        ));
    }

    if mev.bond_bps > 10_000 {
        errors.push(ValidationError::new("mev.bond_bps", "must be <= 10000 (100%)"));
    }

    require_positive(&mut errors, "mev.nonce_pool_size", mev.nonce_pool_size as u64);

    // Phantom auction
    let phantom = &config.phantom;
    require_positive(&mut errors, "phantom.duration_ms", phantom.duration_ms);
    require_positive(&mut errors, "phantom.reveal_delay_ms", phantom.reveal_delay_ms);
    require_positive(&mut errors, "phantom.min_participants", phantom.min_participants as u64);

    if phantom.reveal_delay_ms >= phantom.duration_ms {
        errors.push(ValidationError::new(
            "phantom.reveal_delay_ms",
            "must be shorter than phantom.duration_ms",
        ));
    }

    if phantom.min_improvement_bps < Decimal::ZERO {
        errors.push(ValidationError::new("phantom.min_improvement_bps", "must be >= 0"));
    }

    if phantom.min_improvement_bps >= phantom.max_improvement_bps {
        errors.push(ValidationError::new(
            "phantom.min_improvement_bps",
            "must be below phantom.max_improvement_bps",
        ));
    }

    if phantom.price_weight < Decimal::ZERO
        || phantom.fee_weight < Decimal::ZERO
        || phantom.price_weight + phantom.fee_weight != Decimal::ONE
    {
        errors.push(ValidationError::new(
            "phantom.price_weight",
            "price_weight and fee_weight must be non-negative and sum to 1",
        ));
    }

    if phantom.max_volume_multiple <= Decimal::ZERO {
        errors.push(ValidationError::new("phantom.max_volume_multiple", "must be > 0"));
    }

    if phantom.max_fee_fraction < Decimal::ZERO || phantom.max_fee_fraction > Decimal::ONE {
        errors.push(ValidationError::new("phantom.max_fee_fraction", "must be in [0, 1]"));
    }

    // Coordinator
    let coordinator = &config.coordinator;
    if !(coordinator.threshold > 0.5 && coordinator.threshold <= 1.0) {
        errors.push(ValidationError::new(
            "coordinator.threshold",
            format!("{} must be in (0.5, 1.0]", coordinator.threshold),
        ));
    }

    if !(coordinator.min_response_rate > 0.0 && coordinator.min_response_rate <= 1.0) {
        errors.push(ValidationError::new(
            "coordinator.min_response_rate",
            "must be in (0, 1.0]",
        ));
    }

    require_positive(&mut errors, "coordinator.vote_timeout_ms", coordinator.vote_timeout_ms);
    require_positive(
        &mut errors,
        "coordinator.heartbeat_interval_ms",
        coordinator.heartbeat_interval_ms,
    );
    require_positive(
        &mut errors,
        "coordinator.heartbeat_multiplier",
        coordinator.heartbeat_multiplier as u64,
    );

    errors
}

fn require_positive(errors: &mut Vec<ValidationError>, field: &str, value: u64) {
    if value == 0 {
        errors.push(ValidationError::new(field, "must be greater than 0"));
    }
}

/// Validate log level
fn validate_log_level(level: &str) -> std::result::Result<(), ValidationError> {
    match level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ValidationError::new(
            "logging.level",
            format!(
                "invalid log level '{level}', must be one of: trace, debug, info, warn, error"
            ),
        )),
    }
}
