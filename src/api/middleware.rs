//! HTTP middleware (ingress auth, 404 handler)

use std::sync::Arc;

use axum::Json;
use axum::extract::{Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// State for the optional ingress bearer check.
#[derive(Clone)]
pub struct AuthState {
    pub token: Arc<str>,
}

/// Reject ingress requests without the configured bearer token. Only layered
/// onto the OTLP routes, and only when API_KEY is set.
pub async fn bearer_auth(
    State(auth): State<AuthState>,
    request: Request,
    next: Next,
) -> Response {
    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().strip_prefix("Bearer "))
        .is_some_and(|token| token.trim() == auth.token.as_ref());

    if authorized {
        next.run(request).await
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "unauthorized"})),
        )
            .into_response()
    }
}

/// JSON 404 for unknown methods and paths.
pub async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({"error": "not found"}))).into_response()
}
