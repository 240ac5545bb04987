//! policy-webhook library crate
//!
//! TLS admission webhook that decodes AdmissionReviews from the Kubernetes
//! API server, skips filtered kinds, dispatches to the mutation, validation
//! or policy validation handler and answers with an AdmissionResponse.

pub mod config;
pub mod health;
pub mod webhooks;

pub use config::{ConfigError, WebhookConfig};
pub use health::HealthState;
pub use webhooks::{
    AdmissionHandler, Handlers, KindFilter, Route, RunningServer, ShutdownOutcome, TlsIdentity,
    WEBHOOK_CERT_PATH, WEBHOOK_KEY_PATH, WEBHOOK_PORT, WebhookError, WebhookServer,
};
