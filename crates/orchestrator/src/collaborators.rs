use async_trait::async_trait;
use auction_settlement_coordinator::CoordinationOutcome;
use auction_settlement_metrics::{MetricsCollector, SettlementPhase};
use auction_settlement_mev::ProtectionResult;
use auction_settlement_phantom::PhantomAuctionResult;
use auction_settlement_resilience::{CircuitState, ErrorCategory};
use auction_settlement_types::{
    AuctionResult, ExecutionResult, Route, SettlementError, SettlementResult, Transaction,
};
use rust_decimal::prelude::ToPrimitive;
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

/// Durable settlement state owned outside the orchestrator
#[async_trait]
pub trait StateManager: Send + Sync {
    async fn create_transaction(
        &self,
        transaction_id: &str,
        auction: &AuctionResult,
        deadline_ms: u64,
    ) -> Result<Transaction, SettlementError>;

    /// Fails with a validation error when `transaction` conflicts with
    /// current settlement state
    async fn validate_transaction(&self, transaction: &Transaction)
        -> Result<(), SettlementError>;

    async fn finalize_transaction(
        &self,
        transaction: &Transaction,
        execution: &ExecutionResult,
    ) -> Result<(), SettlementError>;

    async fn rollback_transaction(&self, transaction: &Transaction)
        -> Result<(), SettlementError>;
}

/// Route planning and execution against liquidity venues
#[async_trait]
pub trait RouteOptimizer: Send + Sync {
    async fn prepare_routes(&self, transaction: &Transaction) -> Result<Vec<Route>, SettlementError>;

    /// Executes the routes carried by `transaction`
    async fn execute_transaction(
        &self,
        transaction: &Transaction,
    ) -> Result<ExecutionResult, SettlementError>;

    async fn cancel_operations(&self, transaction_id: &str) -> Result<(), SettlementError>;

    async fn has_pending_operations(&self, transaction_id: &str) -> bool;
}

#[async_trait]
pub trait CacheManager: Send + Sync {
    async fn invalidate_transaction_cache(&self, transaction_id: &str)
        -> Result<(), SettlementError>;
}

/// Metrics and alerting. Only the settlement outcome and alerts are
/// required; the remaining hooks default to no-ops.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn record_settlement_metrics(&self, result: &SettlementResult);

    async fn send_critical_alert(&self, message: &str);

    fn record_settlement_started(&self) {}

    fn record_phase(&self, _phase: SettlementPhase, _duration: Duration) {}

    fn record_protection(&self, _protection: &ProtectionResult) {}

    fn record_phantom_auction(&self, _result: &PhantomAuctionResult) {}

    fn record_consensus(&self, _outcome: &CoordinationOutcome) {}

    fn record_retry(&self, _category: ErrorCategory) {}

    fn record_circuit_rejection(&self) {}

    fn set_circuit_state(&self, _state: CircuitState) {}

    fn set_active_transactions(&self, _count: usize) {}
}

pub struct NoopCacheManager;

#[async_trait]
impl CacheManager for NoopCacheManager {
    async fn invalidate_transaction_cache(&self, _transaction_id: &str) -> Result<(), SettlementError> {
        Ok(())
    }
}

pub struct NoopMetricsSink;

#[async_trait]
impl MetricsSink for NoopMetricsSink {
    async fn record_settlement_metrics(&self, _result: &SettlementResult) {}

    async fn send_critical_alert(&self, message: &str) {
        error!(error_type = "critical_alert", message, "Critical alert");
    }
}

/// `MetricsSink` backed by the Prometheus collector
pub struct PrometheusMetricsSink {
    collector: Arc<MetricsCollector>,
}

impl PrometheusMetricsSink {
    pub fn new(collector: Arc<MetricsCollector>) -> Self {
        Self { collector }
    }

    pub fn collector(&self) -> &Arc<MetricsCollector> {
        &self.collector
    }
}

#[async_trait]
impl MetricsSink for PrometheusMetricsSink {
    async fn record_settlement_metrics(&self, result: &SettlementResult) {
        self.collector.record_settlement(result);
    }

    async fn send_critical_alert(&self, message: &str) {
        self.collector.record_critical_alert();
        error!(error_type = "critical_alert", message, "Critical alert");
    }

    fn record_settlement_started(&self) {
        self.collector.record_settlement_started();
    }

    fn record_phase(&self, phase: SettlementPhase, duration: Duration) {
        self.collector.record_settlement_phase_duration(phase, duration);
    }

    fn record_protection(&self, protection: &ProtectionResult) {
        self.collector
            .record_mev_analysis(protection.detection.confidence, protection.strategy.as_str());
    }

    fn record_phantom_auction(&self, result: &PhantomAuctionResult) {
        let improvement = result
            .winning_bid
            .as_ref()
            .and_then(|_| result.improvement_bps.to_f64());
        self.collector
            .record_phantom_auction(result.participants, improvement);
    }

    fn record_consensus(&self, outcome: &CoordinationOutcome) {
        self.collector
            .record_consensus(outcome.phase.as_str(), outcome.duration);
    }

    fn record_retry(&self, category: ErrorCategory) {
        self.collector.record_retry(category.as_str());
    }

    fn record_circuit_rejection(&self) {
        self.collector.record_circuit_rejection();
    }

    fn set_circuit_state(&self, state: CircuitState) {
        self.collector.set_circuit_state(state);
    }

    fn set_active_transactions(&self, count: usize) {
        self.collector.set_active_transactions(count);
    }
}
