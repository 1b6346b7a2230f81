use std::sync::Arc;
use tracing::{field::Visit, Event, Level, Subscriber};
use tracing_subscriber::{
    fmt,
    layer::{Context, SubscriberExt},
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

use crate::collector::MetricsCollector;

/// Initialize tracing with metrics integration
pub fn init_tracing_with_metrics(collector: Arc<MetricsCollector>) -> Result<(), TracingError> {
    init_tracing_with_filter(collector, "info,auction_settlement=debug")
}

/// Like [`init_tracing_with_metrics`] with an explicit fallback filter used
/// when `RUST_LOG` is unset.
pub fn init_tracing_with_filter(
    collector: Arc<MetricsCollector>,
    default_filter: &str,
) -> Result<(), TracingError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_level(true)
        .json();

    let metrics_layer = MetricsLayer::new(collector);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(metrics_layer)
        .try_init()
        .map_err(|e| TracingError::InitError(e.to_string()))?;

    Ok(())
}

/// Tracing layer that counts error events by their `error_type` field
pub struct MetricsLayer {
    collector: Arc<MetricsCollector>,
}

impl MetricsLayer {
    pub fn new(collector: Arc<MetricsCollector>) -> Self {
        Self { collector }
    }
}

impl<S> Layer<S> for MetricsLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() != Level::ERROR {
            return;
        }

        let mut visitor = ErrorTypeVisitor::default();
        event.record(&mut visitor);
        if let Some(error_type) = visitor.error_type.as_deref() {
            self.collector.record_error_event(error_type);
        }
    }
}

#[derive(Default)]
struct ErrorTypeVisitor {
    error_type: Option<String>,
}

impl Visit for ErrorTypeVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "error_type" {
            self.error_type = Some(format!("{value:?}").trim_matches('"').to_string());
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "error_type" {
            self.error_type = Some(value.to_string());
        }
    }
}

/// Ties every log line of one settlement attempt together, including the
/// lines emitted by retries of the same transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationId(uuid::Uuid);

impl CorrelationId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Span context for one settlement attempt
#[derive(Debug, Clone)]
pub struct SettlementSpan {
    pub correlation_id: CorrelationId,
    pub transaction_id: String,
    pub auction_id: String,
}

impl SettlementSpan {
    pub fn new(transaction_id: impl Into<String>, auction_id: impl Into<String>) -> Self {
        Self {
            correlation_id: CorrelationId::new(),
            transaction_id: transaction_id.into(),
            auction_id: auction_id.into(),
        }
    }

    /// The tracing span for this settlement, for use with `Instrument`
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "settlement",
            correlation_id = %self.correlation_id,
            transaction_id = %self.transaction_id,
            auction_id = %self.auction_id,
        )
    }
}

/// Tracing error types
#[derive(Debug, thiserror::Error)]
pub enum TracingError {
    #[error("tracing initialization error: {0}")]
    InitError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::ERROR_EVENTS;

    #[test]
    fn test_each_settlement_span_gets_its_own_correlation_id() {
        let first = SettlementSpan::new("tx_123", "auction_456");
        let retry = SettlementSpan::new("tx_123", "auction_456");

        assert_eq!(first.transaction_id, retry.transaction_id);
        assert_ne!(first.correlation_id, retry.correlation_id);
        assert_eq!(first.correlation_id.to_string().len(), 36);
    }

    #[test]
    fn test_metrics_layer_counts_error_events() {
        let collector = Arc::new(MetricsCollector::new());
        let subscriber = tracing_subscriber::registry().with(MetricsLayer::new(collector));

        let before = ERROR_EVENTS.with_label_values(&["rollback_failed"]).get();
        tracing::subscriber::with_default(subscriber, || {
            tracing::error!(error_type = "rollback_failed", "rollback failed");
            tracing::warn!(error_type = "rollback_failed", "not counted");
        });

        assert_eq!(
            ERROR_EVENTS.with_label_values(&["rollback_failed"]).get(),
            before + 1
        );
    }
}
