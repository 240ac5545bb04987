//! Request intake validation.
//!
//! Turns a raw HTTP body into an [`AdmissionRequest`]. Checks run in a fixed
//! order and the first failure decides the HTTP status returned to the API
//! server; a rejected body never reaches the dispatcher.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use kube::core::admission::AdmissionRequest;
use kube::core::{DynamicObject, TypeMeta};
use serde_json::{Map, Value, json};
use tracing::error;

/// The only content type accepted on admission requests
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Reasons an inbound body is rejected before dispatch
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Request carried no body
    #[error("empty body")]
    EmptyBody,

    /// `Content-Type` was absent or not exactly `application/json`
    #[error("invalid Content-Type, expect `application/json`")]
    UnsupportedMediaType(Option<String>),

    /// Body is not an AdmissionReview envelope with a request
    #[error("Can't decode body as AdmissionReview")]
    Malformed(String),
}

impl DecodeError {
    /// HTTP status sent back for this rejection
    pub fn status(&self) -> StatusCode {
        match self {
            DecodeError::EmptyBody => StatusCode::BAD_REQUEST,
            DecodeError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            DecodeError::Malformed(_) => StatusCode::EXPECTATION_FAILED,
        }
    }
}

impl IntoResponse for DecodeError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

/// Decode an admission request from a raw body and its declared content type.
pub fn decode_review(
    body: &[u8],
    content_type: Option<&str>,
) -> Result<AdmissionRequest<DynamicObject>, DecodeError> {
    if body.is_empty() {
        error!("Rejecting admission request: empty body");
        return Err(DecodeError::EmptyBody);
    }

    if content_type != Some(JSON_CONTENT_TYPE) {
        error!(
            content_type = content_type.unwrap_or("<none>"),
            "Rejecting admission request: invalid Content-Type"
        );
        return Err(DecodeError::UnsupportedMediaType(
            content_type.map(str::to_string),
        ));
    }

    let mut review: Value = serde_json::from_slice(body).map_err(|e| {
        error!(error = %e, "Can't decode body as AdmissionReview");
        DecodeError::Malformed(e.to_string())
    })?;

    let types = TypeMeta {
        api_version: string_field(&review, "apiVersion"),
        kind: string_field(&review, "kind"),
    };
    let mut fields = match review.get_mut("request").map(Value::take) {
        Some(Value::Object(fields)) => fields,
        _ => {
            error!("AdmissionReview carries no request");
            return Err(DecodeError::Malformed("missing request".to_string()));
        }
    };
    fill_request_defaults(&mut fields);

    let mut request: AdmissionRequest<DynamicObject> =
        serde_json::from_value(Value::Object(fields)).map_err(|e| {
            error!(error = %e, "Can't decode AdmissionReview request");
            DecodeError::Malformed(e.to_string())
        })?;
    request.types = types;
    Ok(request)
}

fn string_field(value: &Value, name: &str) -> String {
    value
        .get(name)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Only `uid` and `kind` are required of a request; the rest gets defaults.
fn fill_request_defaults(fields: &mut Map<String, Value>) {
    let (group, version) = match fields.get("kind") {
        Some(kind) => (string_field(kind, "group"), string_field(kind, "version")),
        None => (String::new(), String::new()),
    };
    fields
        .entry("resource")
        .or_insert_with(|| json!({"group": group, "version": version, "resource": ""}));
    fields
        .entry("operation")
        .or_insert_with(|| json!("CREATE"));
    fields.entry("userInfo").or_insert_with(|| json!({}));
}
