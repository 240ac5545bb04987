//! policy-webhook - admission webhook front door for Kubernetes.
//!
//! This is the main entry point that:
//! - Initializes structured logging
//! - Loads configuration and the TLS identity
//! - Starts the health server and the webhook server
//! - Drains in-flight admission requests on SIGTERM/SIGINT

use std::sync::Arc;

use tokio::signal;
use tracing::{error, info};

use policy_webhook::health::{HealthServerError, HealthState, run_health_server};
use policy_webhook::webhooks::{PassThrough, ServerSettings};
use policy_webhook::{Handlers, KindFilter, Route, TlsIdentity, WebhookConfig, WebhookServer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("policy_webhook=info".parse()?)
                .add_directive("tower_http=info".parse()?),
        )
        .json()
        .init();

    info!("Starting policy-webhook");

    let config = WebhookConfig::from_env()?;
    let identity = TlsIdentity::from_pem_files(&config.cert_path, &config.key_path)?;
    info!(
        cert_path = %config.cert_path.display(),
        port = config.port,
        "Loaded webhook TLS identity"
    );

    let health_state = Arc::new(HealthState::new());

    // Probes should answer before the webhook is up
    let health_handle = tokio::spawn(run_health_server(health_state.clone(), config.health_port));

    let handlers = Handlers::new(
        Arc::new(PassThrough::new(Route::Mutation)),
        Arc::new(PassThrough::new(Route::Validation)),
        Arc::new(PassThrough::new(Route::PolicyValidation)),
    );

    let server = WebhookServer::new(
        ServerSettings::from(&config),
        Some(identity),
        KindFilter::new(&config.filter_kinds),
        handlers,
        Some(health_state.metrics.clone()),
    )?;
    let running = server.run_async();
    health_state.set_ready(true).await;

    let health_failure = tokio::select! {
        result = health_handle => Some(HealthServerError::from_task(result)),
        _ = shutdown_signal() => {
            info!("Received shutdown signal, initiating graceful shutdown...");
            None
        }
    };

    // Stop receiving new admission traffic before draining
    health_state.set_ready(false).await;
    info!("Marked webhook as not ready");

    let outcome = running.stop(config.shutdown_grace).await;
    info!(outcome = ?outcome, "policy-webhook stopped");

    if let Some(e) = health_failure {
        error!(error = %e, "Exiting after health server failure");
        return Err(e.into());
    }
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
///
/// Note: Signal handler setup failures are fatal - the webhook cannot shut down
/// gracefully without them.
#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
