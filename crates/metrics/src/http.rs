use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::collector::MetricsCollector;

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Reports whether the settlement core should receive traffic
pub type ReadinessProbe = Arc<dyn Fn() -> bool + Send + Sync>;

#[derive(Clone)]
struct ScrapeState {
    collector: Arc<MetricsCollector>,
    readiness: ReadinessProbe,
}

/// Scrape endpoint for a settlement process
///
/// Serves `/metrics` in the Prometheus text format, `/health` for liveness
/// and `/ready`, which answers 503 while the readiness probe reports false
/// (for example during an emergency halt).
pub struct MetricsServer {
    state: ScrapeState,
    addr: SocketAddr,
}

impl MetricsServer {
    pub fn new(collector: Arc<MetricsCollector>, addr: SocketAddr) -> Self {
        Self {
            state: ScrapeState {
                collector,
                readiness: Arc::new(|| true),
            },
            addr,
        }
    }

    /// Parse `addr` as a socket address, as read from configuration
    pub fn bind_to(
        collector: Arc<MetricsCollector>,
        addr: &str,
    ) -> Result<Self, MetricsServerError> {
        let addr = addr
            .parse()
            .map_err(|_| MetricsServerError::InvalidAddress(addr.to_string()))?;
        Ok(Self::new(collector, addr))
    }

    pub fn with_readiness(mut self, probe: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.state.readiness = Arc::new(probe);
        self
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/metrics", get(scrape))
            .route("/health", get(|| async { StatusCode::OK }))
            .route("/ready", get(ready))
            .with_state(self.state.clone())
    }

    pub async fn serve(self) -> Result<(), MetricsServerError> {
        let router = self.router();
        let listener = TcpListener::bind(self.addr)
            .await
            .map_err(|e| MetricsServerError::Bind {
                addr: self.addr,
                reason: e.to_string(),
            })?;

        tracing::info!(addr = %self.addr, "serving settlement metrics");

        axum::serve(listener, router)
            .await
            .map_err(|e| MetricsServerError::Serve(e.to_string()))
    }
}

async fn scrape(State(state): State<ScrapeState>) -> Response {
    match state.collector.export_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "metrics export failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn ready(State(state): State<ScrapeState>) -> StatusCode {
    if (state.readiness)() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MetricsServerError {
    #[error("invalid metrics address '{0}'")]
    InvalidAddress(String),
    #[error("failed to bind metrics listener on {addr}: {reason}")]
    Bind { addr: SocketAddr, reason: String },
    #[error("metrics server stopped: {0}")]
    Serve(String),
}
