//! Route-based dispatch of decoded admission requests.
//!
//! Each of the three webhook paths maps to one [`AdmissionHandler`]. The
//! dispatcher applies the kind filter, invokes the handler for the route and
//! stamps the request UID onto whatever response comes back.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use kube::core::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse};
use tracing::{debug, warn};

use super::filter::KindFilter;

/// Path served by the mutating webhook
pub const MUTATING_WEBHOOK_PATH: &str = "/mutate";
/// Path served by the validating webhook
pub const VALIDATING_WEBHOOK_PATH: &str = "/validate";
/// Path served by the policy validating webhook
pub const POLICY_VALIDATING_WEBHOOK_PATH: &str = "/policyvalidate";

/// One of the fixed webhook routes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Route {
    Mutation,
    Validation,
    PolicyValidation,
}

impl Route {
    /// Every route the listener registers
    pub const ALL: [Route; 3] = [Route::Mutation, Route::Validation, Route::PolicyValidation];

    /// URL path this route is served on
    pub fn path(self) -> &'static str {
        match self {
            Route::Mutation => MUTATING_WEBHOOK_PATH,
            Route::Validation => VALIDATING_WEBHOOK_PATH,
            Route::PolicyValidation => POLICY_VALIDATING_WEBHOOK_PATH,
        }
    }

    /// Resolve a request path by exact match
    pub fn from_path(path: &str) -> Option<Route> {
        Route::ALL.into_iter().find(|route| route.path() == path)
    }

    /// Short label used in logs and metrics
    pub fn as_str(self) -> &'static str {
        match self {
            Route::Mutation => "mutation",
            Route::Validation => "validation",
            Route::PolicyValidation => "policy-validation",
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decision logic behind a webhook route.
///
/// Implementations are total: failures inside the handler are reported as a
/// denied response, never as an error. Handlers may perform their own I/O
/// (policy lookups, API calls, event recording).
#[async_trait]
pub trait AdmissionHandler: Send + Sync {
    async fn handle(&self, request: &AdmissionRequest<DynamicObject>) -> AdmissionResponse;
}

/// Handler bound to each route, fixed at construction
#[derive(Clone)]
pub struct Handlers {
    pub mutation: Arc<dyn AdmissionHandler>,
    pub validation: Arc<dyn AdmissionHandler>,
    pub policy_validation: Arc<dyn AdmissionHandler>,
}

impl Handlers {
    pub fn new(
        mutation: Arc<dyn AdmissionHandler>,
        validation: Arc<dyn AdmissionHandler>,
        policy_validation: Arc<dyn AdmissionHandler>,
    ) -> Self {
        Self {
            mutation,
            validation,
            policy_validation,
        }
    }

    /// Handler serving `route`
    pub fn for_route(&self, route: Route) -> &dyn AdmissionHandler {
        match route {
            Route::Mutation => self.mutation.as_ref(),
            Route::Validation => self.validation.as_ref(),
            Route::PolicyValidation => self.policy_validation.as_ref(),
        }
    }
}

/// What the dispatcher did with a request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Kind is excluded; default allow response used
    Filtered,
    /// Handler for the route produced the response
    Handled(Route),
    /// Path matched no route; default allow response used
    Unrouted,
}

/// Applies the kind filter and routes requests to their handler
pub struct Dispatcher {
    filter: KindFilter,
    handlers: Handlers,
}

impl Dispatcher {
    pub fn new(filter: KindFilter, handlers: Handlers) -> Self {
        Self { filter, handlers }
    }

    pub fn filter(&self) -> &KindFilter {
        &self.filter
    }

    /// Produce the admission response for a request received on `path`.
    ///
    /// The returned response always carries the request UID and envelope type.
    pub async fn dispatch(
        &self,
        path: &str,
        request: &AdmissionRequest<DynamicObject>,
    ) -> (AdmissionResponse, DispatchOutcome) {
        let mut response = AdmissionResponse::from(request);

        let outcome = if self.filter.is_excluded(&request.kind.kind) {
            debug!(
                uid = %request.uid,
                kind = %request.kind.kind,
                "Kind is filtered, allowing without processing"
            );
            DispatchOutcome::Filtered
        } else {
            match Route::from_path(path) {
                Some(route) => {
                    response = self.handlers.for_route(route).handle(request).await;
                    DispatchOutcome::Handled(route)
                }
                None => {
                    warn!(uid = %request.uid, path, "No handler for path, allowing");
                    DispatchOutcome::Unrouted
                }
            }
        };

        response.uid.clone_from(&request.uid);
        response.types.clone_from(&request.types);
        (response, outcome)
    }
}
