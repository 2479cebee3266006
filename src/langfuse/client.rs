//! Batching Langfuse ingestion client.
//!
//! Entities are enqueued on a bounded channel and delivered by a single
//! background worker, which preserves call order. The worker drains the
//! queue into batches (up to a size cap or a short collection window) and
//! POSTs them to the public ingestion endpoint. Delivery is best-effort:
//! transport failures are logged and the batch is dropped.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use super::types::{
    EventBody, GenerationBody, IngestionBatch, IngestionItem, ScoreBody, TraceBody, Usage,
};
use super::{ObservationLevel, TelemetrySink, TraceHandle};
use crate::core::config::LangfuseConfig;

/// Maximum entities per ingestion POST
const BATCH_MAX: usize = 100;

/// Window for draining additional queued entities into a batch
const BATCH_WINDOW_MS: u64 = 50;

/// Queue capacity; overflow drops entities (no backpressure to ingest)
const QUEUE_CAPACITY: usize = 8192;

/// HTTP timeout for one ingestion POST
const REQUEST_TIMEOUT_SECS: u64 = 10;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("ingestion rejected with status {0}")]
    Rejected(reqwest::StatusCode),
}

enum Command {
    Emit(IngestionItem),
    Flush(oneshot::Sender<()>),
}

pub struct LangfuseClient {
    tx: mpsc::Sender<Command>,
}

impl LangfuseClient {
    /// Spawn the delivery worker. Must be called from within a tokio runtime.
    pub fn new(config: &LangfuseConfig) -> Self {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let worker = Worker::new(config);
        tokio::spawn(worker.run(rx));
        Self { tx }
    }

    fn emit(&self, item: IngestionItem) {
        match self.tx.try_send(Command::Emit(item)) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!("Langfuse queue full, dropping entity");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::warn!("Langfuse worker gone, dropping entity");
            }
        }
    }
}

#[async_trait]
impl TelemetrySink for LangfuseClient {
    fn trace(
        &self,
        name: &str,
        session_id: &str,
        timestamp: DateTime<Utc>,
        input: Option<JsonValue>,
        output: Option<JsonValue>,
        metadata: Option<JsonValue>,
    ) -> TraceHandle {
        let id = Uuid::new_v4().to_string();
        self.emit(IngestionItem::trace(TraceBody {
            id: id.clone(),
            timestamp,
            name: name.to_string(),
            session_id: Some(session_id.to_string()),
            input,
            output,
            metadata,
        }));
        id
    }

    fn generation(
        &self,
        trace: &TraceHandle,
        name: Option<&str>,
        model: &str,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        usage: Usage,
        metadata: Option<JsonValue>,
    ) {
        self.emit(IngestionItem::generation(GenerationBody {
            id: Uuid::new_v4().to_string(),
            trace_id: trace.clone(),
            name: name.map(str::to_string),
            model: model.to_string(),
            start_time,
            end_time,
            usage,
            metadata,
        }));
    }

    fn event(
        &self,
        trace: &TraceHandle,
        name: &str,
        timestamp: DateTime<Utc>,
        input: Option<JsonValue>,
        output: Option<JsonValue>,
        metadata: Option<JsonValue>,
        level: ObservationLevel,
    ) {
        self.emit(IngestionItem::event(EventBody {
            id: Uuid::new_v4().to_string(),
            trace_id: trace.clone(),
            name: name.to_string(),
            start_time: timestamp,
            input,
            output,
            metadata,
            level,
        }));
    }

    fn score(&self, trace: &TraceHandle, name: &str, value: f64, comment: Option<String>) {
        self.emit(IngestionItem::score(ScoreBody {
            id: Uuid::new_v4().to_string(),
            trace_id: trace.clone(),
            name: name.to_string(),
            value,
            comment,
        }));
    }

    async fn flush(&self, timeout: Duration) -> bool {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(Command::Flush(ack_tx)).await.is_err() {
            return false;
        }
        match tokio::time::timeout(timeout, ack_rx).await {
            Ok(Ok(())) => true,
            Ok(Err(_)) => false,
            Err(_) => {
                tracing::warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "Flush timed out, abandoning pending deliveries"
                );
                false
            }
        }
    }
}

struct Worker {
    http: reqwest::Client,
    endpoint: String,
    credentials: Option<(String, String)>,
}

impl Worker {
    fn new(config: &LangfuseConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        let endpoint = format!(
            "{}/api/public/ingestion",
            config.host.trim_end_matches('/')
        );
        let credentials = config.credentials();
        if credentials.is_none() {
            tracing::warn!("Langfuse credentials not configured, deliveries will be skipped");
        }
        Self {
            http,
            endpoint,
            credentials,
        }
    }

    async fn run(self, mut rx: mpsc::Receiver<Command>) {
        tracing::debug!(endpoint = %self.endpoint, "Langfuse delivery worker started");
        let window = Duration::from_millis(BATCH_WINDOW_MS);

        while let Some(first) = rx.recv().await {
            let mut items = Vec::with_capacity(BATCH_MAX);
            let mut flush_acks = Vec::new();

            match first {
                Command::Emit(item) => items.push(item),
                Command::Flush(ack) => {
                    // Nothing pending ahead of this flush
                    let _ = ack.send(());
                    continue;
                }
            }

            // Drain more queued commands into the batch
            let start = tokio::time::Instant::now();
            while items.len() < BATCH_MAX && flush_acks.is_empty() {
                let remaining = match window.checked_sub(start.elapsed()) {
                    Some(r) if !r.is_zero() => r,
                    _ => break,
                };
                match tokio::time::timeout(remaining, rx.recv()).await {
                    Ok(Some(Command::Emit(item))) => items.push(item),
                    Ok(Some(Command::Flush(ack))) => flush_acks.push(ack),
                    Ok(None) => break,
                    Err(_) => break,
                }
            }

            if let Err(e) = self.post_batch(&items).await {
                tracing::warn!(error = %e, count = items.len(), "Dropping undeliverable batch");
            }
            for ack in flush_acks {
                let _ = ack.send(());
            }
        }

        tracing::debug!("Langfuse delivery worker stopped");
    }

    async fn post_batch(&self, items: &[IngestionItem]) -> Result<(), SinkError> {
        let Some((public_key, secret_key)) = &self.credentials else {
            tracing::debug!(count = items.len(), "No credentials, skipping batch");
            return Ok(());
        };

        let response = self
            .http
            .post(&self.endpoint)
            .basic_auth(public_key, Some(secret_key))
            .json(&IngestionBatch { batch: items })
            .send()
            .await?;

        let status = response.status();
        // Langfuse answers 207 for partially applied batches
        if status.is_success() {
            tracing::debug!(count = items.len(), status = %status, "Batch delivered");
            Ok(())
        } else {
            Err(SinkError::Rejected(status))
        }
    }
}
