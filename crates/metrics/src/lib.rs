//! Metrics and monitoring for auction settlement
//!
//! Prometheus metrics for settlements, circuit breaking, MEV protection,
//! phantom auctions and two-phase-commit consensus, plus the tracing setup
//! shared by every binary that embeds the settlement core.
//!
//! # Features
//!
//! - Prometheus metrics exposition
//! - HTTP endpoint for scraping, liveness and readiness
//! - JSON tracing with correlation IDs
//! - Error events counted by `error_type`
//!
//! # Example
//!
//! ```no_run
//! use auction_settlement_metrics::{MetricsCollector, MetricsServer};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let collector = Arc::new(MetricsCollector::new());
//!     collector.record_settlement_started();
//!
//!     let server = MetricsServer::bind_to(collector.clone(), "0.0.0.0:9090").unwrap();
//!     server.serve().await.unwrap();
//! }
//! ```

pub mod collector;
pub mod http;
pub mod metrics;
pub mod tracing;

pub use collector::{MetricsCollector, MetricsError, SettlementPhase};
pub use http::{MetricsServer, MetricsServerError, ReadinessProbe};
pub use crate::tracing::{
    init_tracing_with_filter, init_tracing_with_metrics, CorrelationId, MetricsLayer,
    SettlementSpan, TracingError,
};
