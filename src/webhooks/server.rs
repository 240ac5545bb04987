//! Admission webhook server.
//!
//! Serves the mutating, validating and policy validating webhook paths over
//! TLS. Every path runs the same pipeline: decode the AdmissionReview, skip
//! filtered kinds, dispatch to the route's handler, encode the response.
//!
//! Lifecycle: [`WebhookServer`] is built (TLS identity validated, routes
//! fixed), [`WebhookServer::run_async`] spawns the listener and hands back a
//! [`RunningServer`], and [`RunningServer::stop`] drains in-flight requests
//! within a grace period before forcing the listener closed.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum_server::Handle;
use axum_server::tls_rustls::RustlsConfig;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::{RequestBodyTimeoutLayer, TimeoutError, TimeoutLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use super::decode::decode_review;
use super::dispatch::{DispatchOutcome, Dispatcher, Handlers, Route};
use super::encode::encode_review;
use super::filter::KindFilter;
use super::tls::TlsIdentity;
use crate::config::WebhookConfig;
use crate::health::Metrics;

/// Default path to webhook TLS certificate
pub const WEBHOOK_CERT_PATH: &str = "/etc/webhook/certs/tls.crt";
/// Default path to webhook TLS private key
pub const WEBHOOK_KEY_PATH: &str = "/etc/webhook/certs/tls.key";
/// Default webhook server port
pub const WEBHOOK_PORT: u16 = 443;
/// Default read and write timeout per request
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(15);
/// Bound on waiting for the accept loop after a forced close
const HARD_CLOSE_WAIT: Duration = Duration::from_secs(1);

/// Errors that can occur when building or running the webhook server
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// TLS identity missing or unusable
    #[error("TLS configuration error: {0}")]
    TlsConfig(String),

    /// Listener failed after start
    #[error("Webhook server error: {0}")]
    Server(String),
}

/// Lifecycle phase of the webhook listener
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServerPhase {
    Unstarted,
    Running,
    Stopping,
    Stopped,
}

/// How a stop completed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// All in-flight requests finished within the grace period
    Graceful,
    /// Grace period expired and open connections were closed
    Forced,
}

/// Listener settings taken from [`WebhookConfig`]
#[derive(Clone, Debug)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub max_body_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], WEBHOOK_PORT)),
            read_timeout: DEFAULT_IO_TIMEOUT,
            write_timeout: DEFAULT_IO_TIMEOUT,
            max_body_bytes: crate::config::DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl From<&WebhookConfig> for ServerSettings {
    fn from(config: &WebhookConfig) -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], config.port)),
            read_timeout: config.read_timeout,
            write_timeout: config.write_timeout,
            max_body_bytes: config.max_body_bytes,
        }
    }
}

/// Shared, read-only state for webhook request tasks
pub struct WebhookState {
    dispatcher: Dispatcher,
    metrics: Option<Arc<Metrics>>,
}

impl WebhookState {
    pub fn new(dispatcher: Dispatcher, metrics: Option<Arc<Metrics>>) -> Self {
        Self {
            dispatcher,
            metrics,
        }
    }
}

/// Create the webhook router.
///
/// The three webhook paths accept any method; every other path is a 404.
pub fn create_webhook_router(state: Arc<WebhookState>, settings: &ServerSettings) -> Router {
    let mut router = Router::new();
    for route in Route::ALL {
        router = router.route(route.path(), any(serve));
    }
    router
        .with_state(state)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(settings.max_body_bytes))
        .layer(RequestBodyTimeoutLayer::new(settings.read_timeout))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            settings.write_timeout,
        ))
        .layer(TraceLayer::new_for_http())
}

/// Entry point for every webhook path
async fn serve(
    State(state): State<Arc<WebhookState>>,
    uri: Uri,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let started = Instant::now();
    let body = match read_body(body).await {
        Ok(body) => body,
        Err(status) => {
            if let Some(metrics) = &state.metrics {
                metrics.record_rejection(status.as_u16());
            }
            return status.into_response();
        }
    };
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok());

    let request = match decode_review(&body, content_type) {
        Ok(request) => request,
        Err(e) => {
            if let Some(metrics) = &state.metrics {
                metrics.record_rejection(e.status().as_u16());
            }
            return e.into_response();
        }
    };

    debug!(
        uid = %request.uid,
        kind = %request.kind.kind,
        operation = ?request.operation,
        namespace = ?request.namespace,
        name = %request.name,
        path = uri.path(),
        "Processing admission request"
    );

    let (response, outcome) = state.dispatcher.dispatch(uri.path(), &request).await;

    match outcome {
        DispatchOutcome::Handled(route) => {
            info!(
                uid = %response.uid,
                route = %route,
                allowed = response.allowed,
                "Admission request handled"
            );
        }
        DispatchOutcome::Filtered | DispatchOutcome::Unrouted => {}
    }

    if let Some(metrics) = &state.metrics {
        let route = Route::from_path(uri.path())
            .map(Route::as_str)
            .unwrap_or("unknown");
        metrics.record_admission(
            route,
            response.allowed,
            outcome == DispatchOutcome::Filtered,
            started.elapsed().as_secs_f64(),
        );
    }

    encode_review(response)
}

/// Buffer the request body; a stalled body is a 408.
async fn read_body(body: Body) -> Result<Bytes, StatusCode> {
    axum::body::to_bytes(body, usize::MAX).await.map_err(|e| {
        let mut source: Option<&(dyn std::error::Error + 'static)> = Some(&e);
        while let Some(err) = source {
            if err.is::<TimeoutError>() {
                warn!("Timed out reading admission request body");
                return StatusCode::REQUEST_TIMEOUT;
            }
            if err.is::<http_body_util::LengthLimitError>() {
                warn!("Admission request body exceeds the size limit");
                return StatusCode::PAYLOAD_TOO_LARGE;
            }
            source = err.source();
        }
        warn!(error = %e, "Failed to read admission request body");
        StatusCode::BAD_REQUEST
    })
}

/// Webhook server that has not started listening yet
pub struct WebhookServer {
    settings: ServerSettings,
    tls: RustlsConfig,
    router: Router,
    phase: Arc<watch::Sender<ServerPhase>>,
}

impl WebhookServer {
    /// Build the server: validate the TLS identity and fix the route table.
    pub fn new(
        settings: ServerSettings,
        identity: Option<TlsIdentity>,
        filter: KindFilter,
        handlers: Handlers,
        metrics: Option<Arc<Metrics>>,
    ) -> Result<Self, WebhookError> {
        let identity = identity.ok_or_else(|| {
            WebhookError::TlsConfig("webhook server requires a TLS identity".to_string())
        })?;
        let tls = RustlsConfig::from_config(identity.server_config()?);

        if !filter.is_empty() {
            info!(
                kinds = ?filter.kinds().collect::<Vec<_>>(),
                "Admission requests for these kinds are allowed without processing"
            );
        }

        let state = Arc::new(WebhookState::new(
            Dispatcher::new(filter, handlers),
            metrics,
        ));
        let router = create_webhook_router(state, &settings);

        let (phase, _) = watch::channel(ServerPhase::Unstarted);

        Ok(Self {
            settings,
            tls,
            router,
            phase: Arc::new(phase),
        })
    }

    /// Receiver that observes lifecycle transitions
    pub fn subscribe(&self) -> watch::Receiver<ServerPhase> {
        self.phase.subscribe()
    }

    /// Start the TLS listener on its own task and return immediately.
    ///
    /// A bind or accept failure after start terminates the process.
    pub fn run_async(self) -> RunningServer {
        let WebhookServer {
            settings,
            tls,
            router,
            phase,
        } = self;
        let handle = Handle::new();

        let addr = settings.addr;
        let task = {
            let handle = handle.clone();
            tokio::spawn(async move {
                let result = axum_server::bind_rustls(addr, tls)
                    .handle(handle)
                    .serve(router.into_make_service())
                    .await
                    .map_err(|e| WebhookError::Server(e.to_string()));
                if let Err(e) = result {
                    listener_failed(&e);
                }
            })
        };

        phase.send_replace(ServerPhase::Running);
        info!(addr = %addr, "Started webhook server");

        RunningServer {
            handle,
            task,
            phase,
        }
    }
}

/// Terminate the process after the listener died
#[allow(clippy::exit)]
fn listener_failed(error: &WebhookError) -> ! {
    error!(error = %error, "Webhook listener failed");
    std::process::exit(1)
}

/// Handle to a listening webhook server
pub struct RunningServer {
    handle: Handle,
    task: JoinHandle<()>,
    phase: Arc<watch::Sender<ServerPhase>>,
}

impl RunningServer {
    /// Address the listener is bound to, once bound
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.handle.listening().await
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> ServerPhase {
        *self.phase.borrow()
    }

    /// Receiver that observes lifecycle transitions
    pub fn subscribe(&self) -> watch::Receiver<ServerPhase> {
        self.phase.subscribe()
    }

    /// Number of open client connections
    pub fn connection_count(&self) -> usize {
        self.handle.connection_count()
    }

    /// Stop accepting connections and drain in-flight requests.
    ///
    /// Requests still running when `grace` expires are abandoned and their
    /// connections closed. Always returns once the listener is released.
    pub async fn stop(self, grace: Duration) -> ShutdownOutcome {
        let RunningServer {
            handle,
            mut task,
            phase,
        } = self;

        phase.send_replace(ServerPhase::Stopping);
        info!(
            grace_secs = grace.as_secs_f64(),
            connections = handle.connection_count(),
            "Stopping webhook server"
        );
        handle.graceful_shutdown(None);

        let outcome = match tokio::time::timeout(grace, &mut task).await {
            Ok(Ok(())) => ShutdownOutcome::Graceful,
            Ok(Err(e)) => {
                warn!(error = %e, "Webhook listener task ended abnormally");
                ShutdownOutcome::Graceful
            }
            Err(_) => {
                warn!(
                    connections = handle.connection_count(),
                    "Grace period expired, closing open connections"
                );
                handle.shutdown();
                if tokio::time::timeout(HARD_CLOSE_WAIT, &mut task).await.is_err() {
                    task.abort();
                }
                ShutdownOutcome::Forced
            }
        };

        phase.send_replace(ServerPhase::Stopped);
        info!(outcome = ?outcome, "Webhook server stopped");
        outcome
    }
}
