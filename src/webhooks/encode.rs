//! Response serialization.

use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use kube::core::TypeMeta;
use kube::core::admission::AdmissionResponse;
use serde::Serialize;
use tracing::error;

/// Content type of every admission review sent back to the API server
pub const RESPONSE_CONTENT_TYPE: &str = "application/json; charset=utf-8";
/// Envelope version used when the response carries none
pub const ADMISSION_API_VERSION: &str = "admission.k8s.io/v1";
const ADMISSION_REVIEW_KIND: &str = "AdmissionReview";

/// Wrap `response` in an AdmissionReview envelope and serialize it.
///
/// The dispatcher copies the request's envelope type onto the response. A
/// request that arrived without one is answered as `admission.k8s.io/v1`.
pub fn encode_review(response: AdmissionResponse) -> Response {
    let mut review = response.into_review();
    if review.types.api_version.is_empty() {
        review.types = TypeMeta {
            api_version: ADMISSION_API_VERSION.to_string(),
            kind: ADMISSION_REVIEW_KIND.to_string(),
        };
    } else if review.types.kind.is_empty() {
        review.types.kind = ADMISSION_REVIEW_KIND.to_string();
    }
    encode_json(&review)
}

/// Serialize `body` as the HTTP response.
///
/// A body that fails to serialize is never partially written; the peer gets a
/// 500 carrying the serializer error instead.
pub fn encode_json<T: Serialize>(body: &T) -> Response {
    match serde_json::to_vec(body) {
        Ok(bytes) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, RESPONSE_CONTENT_TYPE)],
            bytes,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Could not encode admission response");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Could not encode response: {e}"),
            )
                .into_response()
        }
    }
}
