//! Logs export endpoint

use axum::body::Bytes;
use axum::extract::State;
use axum::response::Response;

use super::{decode_json, success_response};
use crate::api::ApiState;
use crate::domain::otlp::LogsEnvelope;
use crate::domain::pipeline;

pub async fn export(State(state): State<ApiState>, body: Bytes) -> Response {
    let envelope: LogsEnvelope = match decode_json(&body) {
        Ok(envelope) => envelope,
        Err(response) => {
            state.stats.record_error();
            return response;
        }
    };
    state.stats.record_request();

    pipeline::handle_logs(&state.registry, &envelope);

    success_response()
}
