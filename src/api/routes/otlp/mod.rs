//! OTLP/HTTP JSON ingestion endpoints
//!
//! Bodies are read as raw bytes and parsed explicitly so malformed JSON maps
//! to a 400 with an error message rather than an opaque rejection. Ingress
//! success is decoupled from backend delivery: a well-formed envelope is
//! always acknowledged with the OTLP partial-success document.

pub mod logs;
pub mod metrics;
pub mod traces;

use axum::Json;
use axum::body::Bytes;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::de::DeserializeOwned;
use serde_json::json;

/// OTLP-compliant acknowledgment.
pub(super) fn success_response() -> Response {
    (StatusCode::OK, Json(json!({"partialSuccess": {}}))).into_response()
}

/// Parse a JSON body, mapping failures to `400 {"error": ...}`.
pub(super) fn decode_json<T: DeserializeOwned>(body: &Bytes) -> Result<T, Response> {
    serde_json::from_slice(body).map_err(|e| {
        tracing::debug!(error = %e, "Rejecting malformed envelope");
        (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": e.to_string()})),
        )
            .into_response()
    })
}
