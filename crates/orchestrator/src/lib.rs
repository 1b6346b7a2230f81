//! Settlement orchestration for auction results
//!
//! [`SettlementOrchestrator`] drives one auction result through MEV risk
//! analysis, transaction preparation, optional two-phase-commit consensus,
//! an optional phantom auction, route execution and finalization. Any
//! failure after the transaction is registered rolls it back; a rollback
//! that cannot complete escalates to an emergency halt.

pub mod collaborators;
pub mod executor;
pub mod orchestrator;
pub mod recovery;
pub mod validator;

#[cfg(test)]
mod tests;

// Re-export main types
pub use collaborators::{
    CacheManager, MetricsSink, NoopCacheManager, NoopMetricsSink, PrometheusMetricsSink,
    RouteOptimizer, StateManager,
};
pub use executor::{ExecutionMode, ExecutionReport, RouteExecutor};
pub use orchestrator::{
    BuilderError, OrchestratorConfig, SettlementOrchestrator, SettlementOrchestratorBuilder,
};
pub use recovery::{ActiveTransactions, RecoveryManager, Release, RollbackOutcome};
pub use validator::{TransactionValidator, ValidationError};
