//! Health server for Kubernetes probes and Prometheus metrics.
//!
//! Provides:
//! - `/healthz` - Liveness probe (always returns 200 if server is running)
//! - `/readyz` - Readiness probe (returns 200 while the webhook listener runs)
//! - `/metrics` - Prometheus metrics endpoint

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::{EncodeLabel, EncodeLabelSet, LabelSetEncoder};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use tokio::sync::RwLock;
use tokio::task::JoinError;
use tracing::info;

/// Default health server port
pub const HEALTH_PORT: u16 = 8080;

/// Why the health server task ended
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    #[error("health server failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("health server exited unexpectedly")]
    Exited,

    #[error("health server task panicked: {0}")]
    Panicked(String),
}

impl HealthServerError {
    /// Classify the result of a finished health server task.
    ///
    /// The server only returns on failure, so a clean exit is an error too.
    pub fn from_task(result: Result<Result<(), std::io::Error>, JoinError>) -> Self {
        match result {
            Ok(Ok(())) => HealthServerError::Exited,
            Ok(Err(e)) => HealthServerError::Io(e),
            Err(e) => HealthServerError::Panicked(e.to_string()),
        }
    }
}

/// Labels for admission outcome metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct AdmissionLabels {
    pub route: String,
    pub allowed: bool,
}

impl EncodeLabelSet for AdmissionLabels {
    fn encode(&self, encoder: &mut LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("route", self.route.as_str()).encode(encoder.encode_label())?;
        ("allowed", if self.allowed { "true" } else { "false" }).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Labels keyed by route only
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct RouteLabels {
    pub route: String,
}

impl EncodeLabelSet for RouteLabels {
    fn encode(&self, encoder: &mut LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("route", self.route.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Labels for requests rejected before dispatch
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct RejectionLabels {
    pub status: u16,
}

impl EncodeLabelSet for RejectionLabels {
    fn encode(&self, encoder: &mut LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("status", self.status.to_string().as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Shared metrics for the webhook
pub struct Metrics {
    /// Admission responses sent, by route and verdict
    pub admission_requests_total: Family<AdmissionLabels, Counter>,
    /// Requests admitted because their kind is filtered
    pub admission_filtered_total: Family<RouteLabels, Counter>,
    /// Requests rejected by the decoder, by HTTP status
    pub admission_rejections_total: Family<RejectionLabels, Counter>,
    /// Time from decode to encoded response
    pub admission_duration_seconds: Family<RouteLabels, Histogram>,
    /// Prometheus registry
    registry: Registry,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Create a new metrics instance with registered metrics
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let admission_requests_total = Family::<AdmissionLabels, Counter>::default();
        registry.register(
            "webhook_admission_requests",
            "Total number of admission responses by route and verdict",
            admission_requests_total.clone(),
        );

        let admission_filtered_total = Family::<RouteLabels, Counter>::default();
        registry.register(
            "webhook_admission_filtered",
            "Total number of admission requests skipped by the kind filter",
            admission_filtered_total.clone(),
        );

        let admission_rejections_total = Family::<RejectionLabels, Counter>::default();
        registry.register(
            "webhook_admission_rejections",
            "Total number of admission requests rejected before dispatch",
            admission_rejections_total.clone(),
        );

        let admission_duration_seconds =
            Family::<RouteLabels, Histogram>::new_with_constructor(|| {
                Histogram::new(exponential_buckets(0.0005, 2.0, 15))
            });
        registry.register(
            "webhook_admission_duration_seconds",
            "Duration of admission request handling in seconds",
            admission_duration_seconds.clone(),
        );

        Self {
            admission_requests_total,
            admission_filtered_total,
            admission_rejections_total,
            admission_duration_seconds,
            registry,
        }
    }

    /// Record an answered admission request
    pub fn record_admission(&self, route: &str, allowed: bool, filtered: bool, duration_secs: f64) {
        let labels = AdmissionLabels {
            route: route.to_string(),
            allowed,
        };
        self.admission_requests_total.get_or_create(&labels).inc();

        let route_labels = RouteLabels {
            route: route.to_string(),
        };
        if filtered {
            self.admission_filtered_total
                .get_or_create(&route_labels)
                .inc();
        }
        self.admission_duration_seconds
            .get_or_create(&route_labels)
            .observe(duration_secs);
    }

    /// Record a request rejected by the decoder
    pub fn record_rejection(&self, status: u16) {
        self.admission_rejections_total
            .get_or_create(&RejectionLabels { status })
            .inc();
    }

    /// Encode metrics to Prometheus text format
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        if encode(&mut buffer, &self.registry).is_err() {
            tracing::error!("Failed to encode metrics");
            return "# Error encoding metrics".to_string();
        }
        buffer
    }
}

/// Shared state for the health server
pub struct HealthState {
    /// Whether the webhook listener is running
    ready: RwLock<bool>,
    /// Metrics registry
    pub metrics: Arc<Metrics>,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthState {
    /// Create a new health state (starts as not ready)
    pub fn new() -> Self {
        Self {
            ready: RwLock::new(false),
            metrics: Arc::new(Metrics::new()),
        }
    }

    /// Mark the webhook as ready or not ready
    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    /// Check if the webhook is ready
    pub async fn is_ready(&self) -> bool {
        *self.ready.read().await
    }
}

/// Liveness probe handler
async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Readiness probe handler
///
/// Returns 503 Service Unavailable until the webhook listener is running and
/// again once shutdown begins.
async fn readyz(State(state): State<Arc<HealthState>>) -> Response {
    if state.is_ready().await {
        (StatusCode::OK, "ready").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready").into_response()
    }
}

/// Metrics handler
async fn metrics_handler(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let body = state.metrics.encode();
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

/// Create the health server router
pub fn create_router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Run the health server on `port` (plain HTTP)
pub async fn run_health_server(state: Arc<HealthState>, port: u16) -> Result<(), std::io::Error> {
    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(port, "Starting health server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
