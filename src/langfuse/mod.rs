//! Langfuse backend sink.
//!
//! The session core talks to the backend through the [`TelemetrySink`]
//! trait: non-blocking enqueue operations plus a bounded flush. The
//! [`client::LangfuseClient`] implementation batches entities on a background
//! worker and delivers them best-effort; failures never reach the caller.

pub mod client;
pub mod types;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

pub use client::LangfuseClient;
pub use types::Usage;

/// Backend identifier for a created trace. Ids are client-generated, so
/// handles are available synchronously.
pub type TraceHandle = String;

/// Observation severity, mirroring the backend's level field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObservationLevel {
    Default,
    Warning,
    Error,
}

/// Contract over the observability backend. All entity calls are
/// fire-and-forget: they must not block and must not surface transport
/// errors. Per-handle call order is preserved by the implementation.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    /// Create a trace and return its handle.
    fn trace(
        &self,
        name: &str,
        session_id: &str,
        timestamp: DateTime<Utc>,
        input: Option<JsonValue>,
        output: Option<JsonValue>,
        metadata: Option<JsonValue>,
    ) -> TraceHandle;

    /// Attach a generation observation to a trace.
    #[allow(clippy::too_many_arguments)]
    fn generation(
        &self,
        trace: &TraceHandle,
        name: Option<&str>,
        model: &str,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        usage: Usage,
        metadata: Option<JsonValue>,
    );

    /// Attach an event observation to a trace.
    fn event(
        &self,
        trace: &TraceHandle,
        name: &str,
        timestamp: DateTime<Utc>,
        input: Option<JsonValue>,
        output: Option<JsonValue>,
        metadata: Option<JsonValue>,
        level: ObservationLevel,
    );

    /// Attach a score to a trace.
    fn score(&self, trace: &TraceHandle, name: &str, value: f64, comment: Option<String>);

    /// Wait until everything enqueued so far is delivered or abandoned.
    /// Returns false when the timeout elapsed with deliveries still pending.
    async fn flush(&self, timeout: Duration) -> bool;
}
