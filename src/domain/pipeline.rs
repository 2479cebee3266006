//! Envelope processing pipeline.
//!
//! Walks a decoded OTLP envelope (resource → scope → record), derives the
//! session key per record, and dispatches through the event or metric mapper
//! into the owning session. The pipeline is purely transformational: it never
//! waits on the sink, and records without a resolvable session key are
//! dropped.

use super::events;
use super::metrics;
use super::otlp::{AttrBag, KeyValue, LogsEnvelope, MetricsEnvelope, Resource, keys};
use super::registry::SessionRegistry;
use super::session::SessionIdentity;
use crate::utils::time::{iso_hour, now_nanos, parse_rfc3339_nanos};

/// Dispatch every log record in the envelope to its session.
pub fn handle_logs(registry: &SessionRegistry, envelope: &LogsEnvelope) {
    for resource_logs in &envelope.resource_logs {
        let resource_attrs = resource_bag(resource_logs.resource.as_ref());
        for scope_logs in &resource_logs.scope_logs {
            for record in &scope_logs.log_records {
                let attrs = record_bag(&resource_attrs, &record.attributes);
                let Some(body) = record.body_str() else {
                    tracing::debug!("Skipping log record without string body");
                    continue;
                };
                let ts_ns = effective_timestamp_ns(&attrs, record.timestamp_ns());
                let Some(key) = derive_session_key(&attrs, ts_ns) else {
                    tracing::debug!(body, "Skipping record without session key");
                    continue;
                };

                let identity = SessionIdentity::from_attrs(&attrs);
                let now = now_nanos();
                let session = registry.get_or_create(&key, &identity, now);
                let mut session = session.lock();
                session.observe_identity(&identity);
                if let Some(kind) = events::classify(body, &attrs) {
                    session.apply_event(ts_ns, kind, registry.sink());
                }
                session.touch(now);
            }
        }
    }
}

/// Dispatch every metric datapoint in the envelope to its session.
pub fn handle_metrics(registry: &SessionRegistry, envelope: &MetricsEnvelope) {
    for resource_metrics in &envelope.resource_metrics {
        let resource_attrs = resource_bag(resource_metrics.resource.as_ref());
        for scope_metrics in &resource_metrics.scope_metrics {
            for metric in &scope_metrics.metrics {
                for point in metric.data_points() {
                    let attrs = record_bag(&resource_attrs, &point.attributes);
                    let ts_ns = effective_timestamp_ns(&attrs, point.time_unix_nano.0);
                    let Some(key) = derive_session_key(&attrs, ts_ns) else {
                        tracing::debug!(metric = %metric.name, "Skipping datapoint without session key");
                        continue;
                    };

                    let identity = SessionIdentity::from_attrs(&attrs);
                    let now = now_nanos();
                    let session = registry.get_or_create(&key, &identity, now);
                    let mut session = session.lock();
                    session.observe_identity(&identity);
                    if let Some(kind) = metrics::classify(&metric.name, point.value(), &attrs) {
                        session.apply_metric(ts_ns, kind, registry.sink());
                    }
                    session.touch(now);
                }
            }
        }
    }
}

fn resource_bag(resource: Option<&Resource>) -> AttrBag {
    resource
        .map(|r| AttrBag::from_key_values(&r.attributes))
        .unwrap_or_default()
}

/// Record attributes layered over the resource attributes; record wins.
fn record_bag(resource_attrs: &AttrBag, record_attrs: &[KeyValue]) -> AttrBag {
    let mut bag = resource_attrs.clone();
    bag.extend_from_key_values(record_attrs);
    bag
}

/// `event.timestamp` overrides the OTLP record timestamp when parseable.
fn effective_timestamp_ns(attrs: &AttrBag, record_ns: u64) -> u64 {
    attrs
        .get_str(keys::EVENT_TIMESTAMP)
        .and_then(parse_rfc3339_nanos)
        .unwrap_or(record_ns)
}

/// Session key: `session.id` when present, otherwise the sanitized user
/// email suffixed with the UTC hour bucket of the record. Records carrying
/// neither have no key and are dropped.
pub fn derive_session_key(attrs: &AttrBag, ts_ns: u64) -> Option<String> {
    if let Some(id) = attrs.get_str(keys::SESSION_ID).filter(|s| !s.is_empty()) {
        return Some(id.to_string());
    }
    let email = attrs.get_str(keys::USER_EMAIL).filter(|s| !s.is_empty())?;
    Some(format!("{}-{}", sanitize(email), iso_hour(ts_ns)))
}

/// Replace every character outside `[A-Za-z0-9-]` with `-`.
fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect()
}
