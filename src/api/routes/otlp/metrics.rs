//! Metrics export endpoint

use axum::body::Bytes;
use axum::extract::State;
use axum::response::Response;

use super::{decode_json, success_response};
use crate::api::ApiState;
use crate::domain::otlp::MetricsEnvelope;
use crate::domain::pipeline;

pub async fn export(State(state): State<ApiState>, body: Bytes) -> Response {
    let envelope: MetricsEnvelope = match decode_json(&body) {
        Ok(envelope) => envelope,
        Err(response) => {
            state.stats.record_error();
            return response;
        }
    };
    state.stats.record_request();

    pipeline::handle_metrics(&state.registry, &envelope);

    success_response()
}
