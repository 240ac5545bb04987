//! Admission webhook front door.
//!
//! Request pipeline, leaf to root:
//! - [`filter`]: kinds admitted without processing
//! - [`decode`]: body and content type into an admission request
//! - [`dispatch`]: route to the mutation, validation or policy validation handler
//! - [`encode`]: response envelope back onto the wire
//! - [`server`]: TLS listener lifecycle

pub mod decode;
pub mod dispatch;
pub mod encode;
pub mod filter;
pub mod handlers;
mod server;
pub mod tls;

pub use decode::{DecodeError, decode_review};
pub use dispatch::{
    AdmissionHandler, DispatchOutcome, Dispatcher, Handlers, MUTATING_WEBHOOK_PATH,
    POLICY_VALIDATING_WEBHOOK_PATH, Route, VALIDATING_WEBHOOK_PATH,
};
pub use encode::encode_review;
pub use filter::KindFilter;
pub use handlers::PassThrough;
pub use server::{
    DEFAULT_IO_TIMEOUT, RunningServer, ServerPhase, ServerSettings, ShutdownOutcome,
    WEBHOOK_CERT_PATH, WEBHOOK_KEY_PATH, WEBHOOK_PORT, WebhookError, WebhookServer, WebhookState,
    create_webhook_router,
};
pub use tls::TlsIdentity;

// Re-export kube-rs admission types for handler implementations
pub use kube::core::DynamicObject;
pub use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
