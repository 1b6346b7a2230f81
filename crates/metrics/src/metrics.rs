use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_histogram, register_histogram_vec, register_int_counter,
    register_int_counter_vec, register_int_gauge, Counter, Histogram, HistogramVec, IntCounter,
    IntCounterVec, IntGauge,
};

lazy_static! {
    // ═══════════════════════════════════════════════════════════════════════════
    // SETTLEMENT METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Total number of settlements started
    pub static ref SETTLEMENTS_STARTED: IntCounter = register_int_counter!(
        "auction_settlement_settlements_started_total",
        "Total number of settlements initiated"
    )
    .unwrap();

    /// Total number of settlements committed
    pub static ref SETTLEMENTS_COMPLETED: IntCounter = register_int_counter!(
        "auction_settlement_settlements_completed_total",
        "Total number of settlements committed"
    )
    .unwrap();

    /// Total number of settlements that failed for any reason
    pub static ref SETTLEMENTS_FAILED: IntCounter = register_int_counter!(
        "auction_settlement_settlements_failed_total",
        "Total number of settlements that failed"
    )
    .unwrap();

    pub static ref SETTLEMENTS_ROLLED_BACK: IntCounter = register_int_counter!(
        "auction_settlement_settlements_rolled_back_total",
        "Total number of settlements rolled back"
    )
    .unwrap();

    pub static ref EMERGENCY_HALTS: IntCounter = register_int_counter!(
        "auction_settlement_emergency_halts_total",
        "Total number of emergency halts"
    )
    .unwrap();

    /// Settlement outcome counter by terminal status
    pub static ref SETTLEMENT_STATUS_COUNT: IntCounterVec = register_int_counter_vec!(
        "auction_settlement_settlement_status_total",
        "Total settlements by status",
        &["status"]
    )
    .unwrap();

    /// Failures by machine-readable error kind
    pub static ref SETTLEMENT_ERRORS: IntCounterVec = register_int_counter_vec!(
        "auction_settlement_settlement_errors_total",
        "Total settlement failures by error kind",
        &["kind"]
    )
    .unwrap();

    /// Transactions currently in the active set
    pub static ref ACTIVE_TRANSACTIONS: IntGauge = register_int_gauge!(
        "auction_settlement_transactions_active",
        "Current number of active transactions"
    )
    .unwrap();

    /// Settlement duration histogram (in milliseconds)
    pub static ref SETTLEMENT_DURATION: Histogram = register_histogram!(
        "auction_settlement_settlement_duration_ms",
        "Settlement duration in milliseconds",
        vec![10.0, 50.0, 100.0, 500.0, 1000.0, 5000.0, 10000.0, 30000.0]
    )
    .unwrap();

    /// Settlement duration by phase
    pub static ref SETTLEMENT_PHASE_DURATION: HistogramVec = register_histogram_vec!(
        "auction_settlement_settlement_phase_duration_ms",
        "Settlement phase duration in milliseconds",
        &["phase"],
        vec![1.0, 10.0, 50.0, 100.0, 500.0, 1000.0, 5000.0]
    )
    .unwrap();

    /// Cumulative volume of committed settlements
    pub static ref SETTLED_VOLUME: Counter = register_counter!(
        "auction_settlement_settled_volume_total",
        "Cumulative volume of committed settlements"
    )
    .unwrap();

    // ═══════════════════════════════════════════════════════════════════════════
    // RESILIENCE METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Circuit breaker state (0=closed, 1=open, 2=half_open)
    pub static ref CIRCUIT_BREAKER_STATE: IntGauge = register_int_gauge!(
        "auction_settlement_circuit_breaker_state",
        "Circuit breaker state (0=closed, 1=open, 2=half_open)"
    )
    .unwrap();

    pub static ref CIRCUIT_BREAKER_REJECTIONS: IntCounter = register_int_counter!(
        "auction_settlement_circuit_breaker_rejections_total",
        "Settlements rejected by an open circuit breaker"
    )
    .unwrap();

    /// Retry attempts beyond the first, by error category
    pub static ref RETRY_ATTEMPTS: IntCounterVec = register_int_counter_vec!(
        "auction_settlement_retry_attempts_total",
        "Total retry attempts by error category",
        &["category"]
    )
    .unwrap();

    // ═══════════════════════════════════════════════════════════════════════════
    // MEV METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Sandwich-detection confidence distribution
    pub static ref MEV_RISK: Histogram = register_histogram!(
        "auction_settlement_mev_risk_confidence",
        "Sandwich detection confidence",
        vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0]
    )
    .unwrap();

    pub static ref MEV_PROTECTION_STRATEGY: IntCounterVec = register_int_counter_vec!(
        "auction_settlement_mev_protection_total",
        "Protection strategies applied",
        &["strategy"]
    )
    .unwrap();

    // ═══════════════════════════════════════════════════════════════════════════
    // PHANTOM AUCTION METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Phantom auctions by outcome (improved / baseline)
    pub static ref PHANTOM_AUCTIONS: IntCounterVec = register_int_counter_vec!(
        "auction_settlement_phantom_auctions_total",
        "Phantom auctions by outcome",
        &["outcome"]
    )
    .unwrap();

    pub static ref PHANTOM_IMPROVEMENT_BPS: Histogram = register_histogram!(
        "auction_settlement_phantom_improvement_bps",
        "Price improvement won by phantom auctions in basis points",
        vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0]
    )
    .unwrap();

    pub static ref PHANTOM_PARTICIPANTS: Histogram = register_histogram!(
        "auction_settlement_phantom_participants",
        "Revealed bids per phantom auction",
        vec![0.0, 1.0, 2.0, 3.0, 5.0, 10.0, 20.0]
    )
    .unwrap();

    // ═══════════════════════════════════════════════════════════════════════════
    // CONSENSUS METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Consensus rounds by phase and outcome
    pub static ref CONSENSUS_ROUNDS: IntCounterVec = register_int_counter_vec!(
        "auction_settlement_consensus_rounds_total",
        "Coordinator outcomes by final phase",
        &["outcome"]
    )
    .unwrap();

    pub static ref CONSENSUS_DURATION: Histogram = register_histogram!(
        "auction_settlement_consensus_duration_ms",
        "Two-phase commit duration in milliseconds",
        vec![10.0, 50.0, 100.0, 500.0, 1000.0, 5000.0, 10000.0]
    )
    .unwrap();

    // ═══════════════════════════════════════════════════════════════════════════
    // SYSTEM METRICS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Error events observed by the tracing layer
    pub static ref ERROR_EVENTS: IntCounterVec = register_int_counter_vec!(
        "auction_settlement_error_events_total",
        "Error-level tracing events by error type",
        &["error_type"]
    )
    .unwrap();

    pub static ref CRITICAL_ALERTS: IntCounter = register_int_counter!(
        "auction_settlement_critical_alerts_total",
        "Critical alerts raised"
    )
    .unwrap();
}
