//! Traces export endpoint
//!
//! The client exports spans alongside logs and metrics, but the bridge
//! derives everything from the latter two. Trace envelopes are validated and
//! acknowledged so the client does not retry, then discarded.

use axum::body::Bytes;
use axum::extract::State;
use axum::response::Response;
use serde_json::Value as JsonValue;

use super::{decode_json, success_response};
use crate::api::ApiState;

pub async fn export(State(state): State<ApiState>, body: Bytes) -> Response {
    if let Err(response) = decode_json::<JsonValue>(&body) {
        state.stats.record_error();
        return response;
    }
    state.stats.record_request();

    success_response()
}
