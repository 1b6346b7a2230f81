use std::time::Duration;

use auction_settlement_resilience::CircuitState;
use auction_settlement_types::{SettlementResult, TransactionStatus};
use prometheus::{Encoder, Registry, TextEncoder};
use rust_decimal::prelude::ToPrimitive;

use crate::metrics::*;

/// Metrics collector for auction settlement
pub struct MetricsCollector {
    registry: Registry,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Self {
        let registry = Registry::new();
        Self { registry }
    }

    /// Create a collector that also exports an application registry
    pub fn with_registry(registry: Registry) -> Self {
        Self { registry }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // SETTLEMENT METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Record a new settlement attempt
    pub fn record_settlement_started(&self) {
        SETTLEMENTS_STARTED.inc();
    }

    /// Record the final outcome of a settlement attempt
    pub fn record_settlement(&self, result: &SettlementResult) {
        SETTLEMENT_STATUS_COUNT
            .with_label_values(&[result.status.as_str()])
            .inc();
        SETTLEMENT_DURATION.observe(result.duration_ms as f64);

        if result.success {
            SETTLEMENTS_COMPLETED.inc();
            if let Some(volume) = result.final_volume.to_f64() {
                if volume > 0.0 {
                    SETTLED_VOLUME.inc_by(volume);
                }
            }
            return;
        }

        SETTLEMENTS_FAILED.inc();
        if let Some(error) = &result.error {
            SETTLEMENT_ERRORS.with_label_values(&[error.kind.as_str()]).inc();
        }
        match result.status {
            TransactionStatus::RolledBack => SETTLEMENTS_ROLLED_BACK.inc(),
            TransactionStatus::EmergencyHalt => EMERGENCY_HALTS.inc(),
            _ => {}
        }
    }

    /// Record the duration of one settlement phase
    pub fn record_settlement_phase_duration(&self, phase: SettlementPhase, duration: Duration) {
        SETTLEMENT_PHASE_DURATION
            .with_label_values(&[phase.as_str()])
            .observe(duration.as_millis() as f64);
    }

    /// Update active transaction count
    pub fn set_active_transactions(&self, count: usize) {
        ACTIVE_TRANSACTIONS.set(count as i64);
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // RESILIENCE METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn set_circuit_state(&self, state: CircuitState) {
        CIRCUIT_BREAKER_STATE.set(u8::from(state) as i64);
    }

    pub fn record_circuit_rejection(&self) {
        CIRCUIT_BREAKER_REJECTIONS.inc();
    }

    /// Record one retry of a failed attempt
    pub fn record_retry(&self, category: &str) {
        RETRY_ATTEMPTS.with_label_values(&[category]).inc();
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // MEV METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn record_mev_analysis(&self, confidence: f64, strategy: &str) {
        MEV_RISK.observe(confidence.clamp(0.0, 1.0));
        MEV_PROTECTION_STRATEGY.with_label_values(&[strategy]).inc();
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // PHANTOM AUCTION METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Record a finished phantom auction; `improvement_bps` is `None` when the
    /// baseline was kept.
    pub fn record_phantom_auction(&self, participants: usize, improvement_bps: Option<f64>) {
        PHANTOM_PARTICIPANTS.observe(participants as f64);
        match improvement_bps {
            Some(bps) => {
                PHANTOM_AUCTIONS.with_label_values(&["improved"]).inc();
                PHANTOM_IMPROVEMENT_BPS.observe(bps);
            }
            None => PHANTOM_AUCTIONS.with_label_values(&["baseline"]).inc(),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // CONSENSUS METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Record a two-phase commit run by its final phase
    pub fn record_consensus(&self, outcome: &str, duration: Duration) {
        CONSENSUS_ROUNDS.with_label_values(&[outcome]).inc();
        CONSENSUS_DURATION.observe(duration.as_millis() as f64);
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // SYSTEM METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn record_error_event(&self, error_type: &str) {
        ERROR_EVENTS.with_label_values(&[error_type]).inc();
    }

    pub fn record_critical_alert(&self) {
        CRITICAL_ALERTS.inc();
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // EXPORT
    // ═══════════════════════════════════════════════════════════════════════════

    /// Export metrics in Prometheus text format
    pub fn export_metrics(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let mut metric_families = prometheus::gather();
        metric_families.extend(self.registry.gather());

        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| MetricsError::EncodingError(e.to_string()))?;

        String::from_utf8(buffer).map_err(|e| MetricsError::EncodingError(e.to_string()))
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Settlement phase for tracking phase-specific metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementPhase {
    MevAnalysis,
    Preparation,
    Consensus,
    Routing,
    PhantomAuction,
    Execution,
    Finalization,
    Rollback,
}

impl SettlementPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementPhase::MevAnalysis => "mev_analysis",
            SettlementPhase::Preparation => "preparation",
            SettlementPhase::Consensus => "consensus",
            SettlementPhase::Routing => "routing",
            SettlementPhase::PhantomAuction => "phantom_auction",
            SettlementPhase::Execution => "execution",
            SettlementPhase::Finalization => "finalization",
            SettlementPhase::Rollback => "rollback",
        }
    }
}

/// Metrics error types
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("encoding error: {0}")]
    EncodingError(String),
    #[error("registry error: {0}")]
    RegistryError(String),
}
