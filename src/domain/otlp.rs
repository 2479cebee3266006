//! OTLP/HTTP JSON wire types and attribute decoding.
//!
//! The receiver consumes the OTLP JSON encoding only, so the wire types are
//! hand-defined serde structs rather than prost-generated ones. The JSON
//! encoding carries 64-bit integers (`timeUnixNano`, `intValue`, `asInt`) as
//! decimal strings; the deserializers here accept both the string and the
//! plain-number form.

use std::collections::HashMap;
use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value as JsonValue};

/// Attribute keys shared by the log and metric mappers.
pub mod keys {
    pub const SESSION_ID: &str = "session.id";
    pub const ORGANIZATION_ID: &str = "organization.id";
    pub const USER_ACCOUNT_UUID: &str = "user.account_uuid";
    pub const USER_EMAIL: &str = "user.email";
    pub const TERMINAL_TYPE: &str = "terminal.type";
    pub const APP_VERSION: &str = "app.version";
    pub const EVENT_TIMESTAMP: &str = "event.timestamp";
}

// ============================================================================
// LOGS ENVELOPE
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LogsEnvelope {
    pub resource_logs: Vec<ResourceLogs>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceLogs {
    pub resource: Option<Resource>,
    pub scope_logs: Vec<ScopeLogs>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScopeLogs {
    pub scope: Option<Scope>,
    pub log_records: Vec<LogRecord>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LogRecord {
    pub time_unix_nano: NanoTime,
    pub observed_time_unix_nano: NanoTime,
    pub body: Option<AnyValue>,
    pub attributes: Vec<KeyValue>,
}

impl LogRecord {
    /// Record timestamp, falling back to the observed time when the client
    /// left `timeUnixNano` at zero.
    pub fn timestamp_ns(&self) -> u64 {
        if self.time_unix_nano.0 != 0 {
            self.time_unix_nano.0
        } else {
            self.observed_time_unix_nano.0
        }
    }

    /// The record body as a string, if it carries one.
    pub fn body_str(&self) -> Option<&str> {
        self.body.as_ref()?.string_value.as_deref()
    }
}

// ============================================================================
// METRICS ENVELOPE
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetricsEnvelope {
    pub resource_metrics: Vec<ResourceMetrics>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceMetrics {
    pub resource: Option<Resource>,
    pub scope_metrics: Vec<ScopeMetrics>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScopeMetrics {
    pub scope: Option<Scope>,
    pub metrics: Vec<Metric>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Metric {
    pub name: String,
    pub sum: Option<NumberPoints>,
    pub gauge: Option<NumberPoints>,
}

impl Metric {
    /// Datapoints regardless of whether the metric is a sum or a gauge.
    /// Histograms and summaries are not consumed by the bridge.
    pub fn data_points(&self) -> &[NumberDataPoint] {
        self.sum
            .as_ref()
            .or(self.gauge.as_ref())
            .map(|p| p.data_points.as_slice())
            .unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NumberPoints {
    pub data_points: Vec<NumberDataPoint>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NumberDataPoint {
    pub time_unix_nano: NanoTime,
    pub attributes: Vec<KeyValue>,
    pub as_double: Option<f64>,
    pub as_int: Option<IntValue>,
}

impl NumberDataPoint {
    /// Numeric value of the datapoint, defaulting to 0 when absent.
    pub fn value(&self) -> f64 {
        if let Some(d) = self.as_double {
            return d;
        }
        if let Some(i) = &self.as_int {
            return i.as_i64() as f64;
        }
        0.0
    }
}

// ============================================================================
// SHARED WIRE TYPES
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Resource {
    pub attributes: Vec<KeyValue>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Scope {
    pub name: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KeyValue {
    pub key: String,
    pub value: Option<AnyValue>,
}

/// OTLP `AnyValue`: a tagged union over the scalar, array and map forms.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnyValue {
    pub string_value: Option<String>,
    pub bool_value: Option<bool>,
    pub int_value: Option<IntValue>,
    pub double_value: Option<f64>,
    pub array_value: Option<ArrayValue>,
    pub kvlist_value: Option<KvList>,
    pub bytes_value: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ArrayValue {
    pub values: Vec<AnyValue>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KvList {
    pub values: Vec<KeyValue>,
}

impl AnyValue {
    /// Decode the tagged union into a plain JSON value. Arrays and kvlists
    /// recurse; an empty or unrecognized tag decodes to null rather than
    /// raising.
    pub fn decode(&self) -> JsonValue {
        if let Some(s) = &self.string_value {
            return JsonValue::String(s.clone());
        }
        if let Some(b) = self.bool_value {
            return JsonValue::Bool(b);
        }
        if let Some(i) = &self.int_value {
            return JsonValue::from(i.as_i64());
        }
        if let Some(d) = self.double_value {
            return serde_json::Number::from_f64(d)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null);
        }
        if let Some(arr) = &self.array_value {
            return JsonValue::Array(arr.values.iter().map(AnyValue::decode).collect());
        }
        if let Some(kv) = &self.kvlist_value {
            let mut map = Map::new();
            for entry in &kv.values {
                let value = entry
                    .value
                    .as_ref()
                    .map(AnyValue::decode)
                    .unwrap_or(JsonValue::Null);
                map.insert(entry.key.clone(), value);
            }
            return JsonValue::Object(map);
        }
        if let Some(b) = &self.bytes_value {
            // base64 passthrough; nothing in the bridge interprets bytes
            return JsonValue::String(b.clone());
        }
        JsonValue::Null
    }
}

/// A 64-bit integer that arrives either as a JSON number or as its decimal
/// string form (the OTLP JSON encoding for int64). Some emitters send plain
/// JSON floats; those are truncated.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum IntValue {
    Number(i64),
    Float(f64),
    Text(String),
}

impl IntValue {
    pub fn as_i64(&self) -> i64 {
        match self {
            IntValue::Number(n) => *n,
            IntValue::Float(f) => *f as i64,
            IntValue::Text(s) => s.trim().parse().unwrap_or(0),
        }
    }
}

/// Nanosecond timestamp; string-encoded on the wire, number tolerated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NanoTime(pub u64);

impl<'de> Deserialize<'de> for NanoTime {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct NanoTimeVisitor;

        impl Visitor<'_> for NanoTimeVisitor {
            type Value = NanoTime;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a nanosecond timestamp as string or number")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<NanoTime, E> {
                Ok(NanoTime(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<NanoTime, E> {
                Ok(NanoTime(v.max(0) as u64))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<NanoTime, E> {
                Ok(NanoTime(if v.is_finite() && v > 0.0 { v as u64 } else { 0 }))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<NanoTime, E> {
                Ok(NanoTime(v.trim().parse().unwrap_or(0)))
            }
        }

        deserializer.deserialize_any(NanoTimeVisitor)
    }
}

// ============================================================================
// ATTRIBUTE BAG
// ============================================================================

/// Decoded attribute bag with the typed accessors the mappers rely on.
/// Duplicate keys are last-write-wins.
#[derive(Debug, Clone, Default)]
pub struct AttrBag {
    values: HashMap<String, JsonValue>,
}

impl AttrBag {
    pub fn from_key_values(attrs: &[KeyValue]) -> Self {
        let mut bag = Self::default();
        bag.extend_from_key_values(attrs);
        bag
    }

    /// Overlay another attribute list onto this bag; later keys win. Used to
    /// layer record-level attributes over resource-level ones.
    pub fn extend_from_key_values(&mut self, attrs: &[KeyValue]) {
        for kv in attrs {
            let value = kv
                .value
                .as_ref()
                .map(AnyValue::decode)
                .unwrap_or(JsonValue::Null);
            self.values.insert(kv.key.clone(), value);
        }
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(|v| v.as_str())
    }

    /// String attribute, `"unknown"` when missing.
    pub fn str_or_unknown(&self, key: &str) -> String {
        self.get_str(key).unwrap_or("unknown").to_string()
    }

    /// Integer attribute; numeric strings are coerced.
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        match self.values.get(key)? {
            JsonValue::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            JsonValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn i64_or_zero(&self, key: &str) -> i64 {
        self.get_i64(key).unwrap_or(0)
    }

    /// Float attribute; numeric strings are coerced.
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        match self.values.get(key)? {
            JsonValue::Number(n) => n.as_f64(),
            JsonValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn f64_or_zero(&self, key: &str) -> f64 {
        self.get_f64(key).unwrap_or(0.0)
    }

    /// Bool attribute; the strings "true"/"false" are coerced.
    pub fn bool_or_false(&self, key: &str) -> bool {
        match self.values.get(key) {
            Some(JsonValue::Bool(b)) => *b,
            Some(JsonValue::String(s)) => s.eq_ignore_ascii_case("true"),
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
