//! Built-in handler used when no decision logic is wired to a route.

use async_trait::async_trait;
use kube::core::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse};
use tracing::debug;

use super::dispatch::{AdmissionHandler, Route};

/// Admits every request unchanged
#[derive(Clone, Copy, Debug)]
pub struct PassThrough {
    route: Route,
}

impl PassThrough {
    pub fn new(route: Route) -> Self {
        Self { route }
    }
}

#[async_trait]
impl AdmissionHandler for PassThrough {
    async fn handle(&self, request: &AdmissionRequest<DynamicObject>) -> AdmissionResponse {
        debug!(
            uid = %request.uid,
            route = %self.route,
            kind = %request.kind.kind,
            "No handler configured, admitting"
        );
        AdmissionResponse::from(request)
    }
}
