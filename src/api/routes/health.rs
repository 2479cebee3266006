//! Health check endpoint

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;

use crate::api::ApiState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime: u64,
    pub sessions: usize,
    pub request_count: u64,
    pub error_count: u64,
    pub langfuse: &'static str,
}

pub async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy",
            uptime: state.stats.uptime_secs(),
            sessions: state.registry.len(),
            request_count: state.stats.requests(),
            error_count: state.stats.errors(),
            langfuse: "connected",
        }),
    )
}
