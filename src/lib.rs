//! Auction settlement
//!
//! Re-exports the settlement crates and wires a loaded [`AppConfig`] into an
//! orchestrator builder. Collaborators (state manager, route optimizer,
//! coordinator, bid source) are still supplied by the caller.

pub use auction_settlement_config as config;
pub use auction_settlement_coordinator as coordinator;
pub use auction_settlement_metrics as metrics;
pub use auction_settlement_mev as mev;
pub use auction_settlement_orchestrator as orchestrator;
pub use auction_settlement_phantom as phantom;
pub use auction_settlement_resilience as resilience;
pub use auction_settlement_types as types;

use auction_settlement_config::{validate_config, AppConfig, ConfigError};
use auction_settlement_metrics::{
    init_tracing_with_filter, MetricsCollector, MetricsServer, MetricsServerError, TracingError,
};
use auction_settlement_orchestrator::{
    PrometheusMetricsSink, SettlementOrchestrator, SettlementOrchestratorBuilder,
};
use std::sync::Arc;

/// Validate `config` and return a builder carrying every component config
/// it describes
pub fn configured_builder(config: &AppConfig) -> Result<SettlementOrchestratorBuilder, ConfigError> {
    validate_config(config)?;

    Ok(SettlementOrchestratorBuilder::new()
        .with_config(config.orchestrator_config())
        .with_circuit_breaker(config.circuit_breaker_config())
        .with_retry_policy(config.retry_policy()?)
        .with_mev_config(config.mev_config())
        .with_phantom_config(config.phantom_config()))
}

/// Like [`configured_builder`], reporting through `collector` when metrics
/// are enabled
pub fn configured_builder_with_metrics(
    config: &AppConfig,
    collector: Arc<MetricsCollector>,
) -> Result<SettlementOrchestratorBuilder, ConfigError> {
    let builder = configured_builder(config)?;
    if !config.metrics.enabled {
        return Ok(builder);
    }
    Ok(builder.with_metrics(Arc::new(PrometheusMetricsSink::new(collector))))
}

/// Install the JSON tracing subscriber using the configured log filter
pub fn init_tracing(
    config: &AppConfig,
    collector: Arc<MetricsCollector>,
) -> Result<(), TracingError> {
    init_tracing_with_filter(collector, &config.logging.filter_directive())
}

/// Scrape endpoint on the configured address, ready while `orchestrator`
/// is not halted. `None` when metrics are disabled.
pub fn metrics_server(
    config: &AppConfig,
    collector: Arc<MetricsCollector>,
    orchestrator: Arc<SettlementOrchestrator>,
) -> Result<Option<MetricsServer>, MetricsServerError> {
    if !config.metrics.enabled {
        return Ok(None);
    }
    let server = MetricsServer::bind_to(collector, &config.metrics.listen_addr)?
        .with_readiness(move || !orchestrator.is_halted());
    Ok(Some(server))
}
