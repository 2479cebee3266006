//! Langfuse ingestion wire types.
//!
//! Bodies follow the public batch ingestion API: each batch item wraps an
//! entity body in `{id, type, timestamp, body}`, and bodies use camelCase
//! field names with client-generated ids.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use super::ObservationLevel;

/// Batch item type discriminators.
pub mod item_types {
    pub const TRACE_CREATE: &str = "trace-create";
    pub const GENERATION_CREATE: &str = "generation-create";
    pub const EVENT_CREATE: &str = "event-create";
    pub const SCORE_CREATE: &str = "score-create";
}

/// Token usage block attached to generations.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub input: i64,
    pub output: i64,
    pub total: i64,
    pub unit: &'static str,
}

impl Usage {
    pub fn tokens(input: i64, output: i64) -> Self {
        Self {
            input,
            output,
            total: input + output,
            unit: "TOKENS",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceBody {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<JsonValue>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationBody {
    pub id: String,
    pub trace_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub model: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub usage: Usage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<JsonValue>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventBody {
    pub id: String,
    pub trace_id: String,
    pub name: String,
    pub start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<JsonValue>,
    pub level: ObservationLevel,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBody {
    pub id: String,
    pub trace_id: String,
    pub name: String,
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum IngestionBody {
    Trace(TraceBody),
    Generation(GenerationBody),
    Event(EventBody),
    Score(ScoreBody),
}

/// One entry in a Langfuse ingestion batch.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionItem {
    pub id: String,
    #[serde(rename = "type")]
    pub item_type: &'static str,
    pub timestamp: DateTime<Utc>,
    pub body: IngestionBody,
}

impl IngestionItem {
    fn wrap(item_type: &'static str, body: IngestionBody) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            item_type,
            timestamp: Utc::now(),
            body,
        }
    }

    pub fn trace(body: TraceBody) -> Self {
        Self::wrap(item_types::TRACE_CREATE, IngestionBody::Trace(body))
    }

    pub fn generation(body: GenerationBody) -> Self {
        Self::wrap(item_types::GENERATION_CREATE, IngestionBody::Generation(body))
    }

    pub fn event(body: EventBody) -> Self {
        Self::wrap(item_types::EVENT_CREATE, IngestionBody::Event(body))
    }

    pub fn score(body: ScoreBody) -> Self {
        Self::wrap(item_types::SCORE_CREATE, IngestionBody::Score(body))
    }
}

/// The POST body for `/api/public/ingestion`.
#[derive(Debug, Serialize)]
pub struct IngestionBatch<'a> {
    pub batch: &'a [IngestionItem],
}
