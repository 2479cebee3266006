//! Log record classification.
//!
//! Maps a decoded OTLP log record onto a typed domain event. The record body
//! names the event class; attributes carry the payload. Missing attributes
//! take the wire defaults (strings "unknown", numbers 0, bools false), and
//! unrecognized bodies are ignored.

use super::otlp::AttrBag;

/// Event class names emitted by the client.
pub mod names {
    pub const USER_PROMPT: &str = "claude_code.user_prompt";
    pub const API_REQUEST: &str = "claude_code.api_request";
    pub const API_ERROR: &str = "claude_code.api_error";
    pub const TOOL_RESULT: &str = "claude_code.tool_result";
    pub const TOOL_DECISION: &str = "claude_code.tool_decision";
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    UserPrompt(UserPrompt),
    ApiRequest(ApiRequest),
    ApiError(ApiError),
    ToolResult(ToolResult),
    ToolDecision(ToolDecision),
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserPrompt {
    /// The prompt text; the client may redact it entirely.
    pub prompt: Option<String>,
    pub length: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub model: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cache_read_tokens: i64,
    pub cache_creation_tokens: i64,
    pub cost_usd: f64,
    pub duration_ms: i64,
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    pub message: String,
    pub status_code: i64,
    pub model: String,
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub tool_name: String,
    pub success: bool,
    pub duration_ms: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolDecision {
    pub tool_name: String,
    pub decision: String,
    pub source: String,
}

impl ToolDecision {
    pub fn is_accept(&self) -> bool {
        self.decision == "accept"
    }
}

/// Classify a log record body into a domain event. Returns None for bodies
/// the bridge does not recognize.
pub fn classify(body: &str, attrs: &AttrBag) -> Option<EventKind> {
    match body {
        names::USER_PROMPT => Some(EventKind::UserPrompt(UserPrompt {
            prompt: attrs.get_str("prompt").map(str::to_string),
            length: attrs.i64_or_zero("prompt_length"),
        })),
        names::API_REQUEST => Some(EventKind::ApiRequest(ApiRequest {
            model: attrs.str_or_unknown("model"),
            input_tokens: attrs.i64_or_zero("input_tokens"),
            output_tokens: attrs.i64_or_zero("output_tokens"),
            cache_read_tokens: attrs.i64_or_zero("cache_read_tokens"),
            cache_creation_tokens: attrs.i64_or_zero("cache_creation_tokens"),
            cost_usd: attrs.f64_or_zero("cost_usd"),
            duration_ms: attrs.i64_or_zero("duration_ms"),
            request_id: attrs.get_str("request_id").map(str::to_string),
        })),
        names::API_ERROR => Some(EventKind::ApiError(ApiError {
            message: attrs.str_or_unknown("error_message"),
            status_code: attrs.i64_or_zero("status_code"),
            model: attrs.str_or_unknown("model"),
            request_id: attrs.get_str("request_id").map(str::to_string),
        })),
        names::TOOL_RESULT => Some(EventKind::ToolResult(ToolResult {
            tool_name: attrs.str_or_unknown("tool_name"),
            success: attrs.bool_or_false("success"),
            duration_ms: attrs.i64_or_zero("duration_ms"),
        })),
        names::TOOL_DECISION => Some(EventKind::ToolDecision(ToolDecision {
            tool_name: attrs.str_or_unknown("tool_name"),
            decision: attrs.str_or_unknown("decision"),
            source: attrs.str_or_unknown("source"),
        })),
        other => {
            tracing::debug!(body = other, "Ignoring unrecognized event class");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::otlp::{AnyValue, KeyValue};
    use serde_json::json;

    fn bag(entries: &[(&str, serde_json::Value)]) -> AttrBag {
        let kvs: Vec<KeyValue> = entries
            .iter()
            .map(|(k, v)| {
                let any: AnyValue = match v {
                    serde_json::Value::String(s) => {
                        serde_json::from_value(json!({"stringValue": s})).unwrap()
                    }
                    serde_json::Value::Bool(b) => {
                        serde_json::from_value(json!({"boolValue": b})).unwrap()
                    }
                    serde_json::Value::Number(n) if n.is_i64() => {
                        serde_json::from_value(json!({"intValue": n})).unwrap()
                    }
                    serde_json::Value::Number(n) => {
                        serde_json::from_value(json!({"doubleValue": n})).unwrap()
                    }
                    _ => AnyValue::default(),
                };
                KeyValue {
                    key: k.to_string(),
                    value: Some(any),
                }
            })
            .collect();
        AttrBag::from_key_values(&kvs)
    }

    #[test]
    fn test_classify_user_prompt() {
        let attrs = bag(&[
            ("prompt", json!("What is 2+2?")),
            ("prompt_length", json!(12)),
        ]);
        let kind = classify(names::USER_PROMPT, &attrs).unwrap();
        assert_eq!(
            kind,
            EventKind::UserPrompt(UserPrompt {
                prompt: Some("What is 2+2?".into()),
                length: 12,
            })
        );
    }

    #[test]
    fn test_classify_user_prompt_without_text() {
        let attrs = bag(&[("prompt_length", json!(40))]);
        let EventKind::UserPrompt(prompt) = classify(names::USER_PROMPT, &attrs).unwrap() else {
            panic!("expected user prompt");
        };
        assert_eq!(prompt.prompt, None);
        assert_eq!(prompt.length, 40);
    }

    #[test]
    fn test_classify_api_request_full() {
        let attrs = bag(&[
            ("model", json!("m-opus")),
            ("input_tokens", json!(10)),
            ("output_tokens", json!(5)),
            ("cache_read_tokens", json!(100)),
            ("cache_creation_tokens", json!(20)),
            ("cost_usd", json!(0.001)),
            ("duration_ms", json!(1500)),
            ("request_id", json!("req-1")),
        ]);
        let EventKind::ApiRequest(req) = classify(names::API_REQUEST, &attrs).unwrap() else {
            panic!("expected api request");
        };
        assert_eq!(req.model, "m-opus");
        assert_eq!(req.input_tokens, 10);
        assert_eq!(req.output_tokens, 5);
        assert_eq!(req.cache_read_tokens, 100);
        assert_eq!(req.cache_creation_tokens, 20);
        assert_eq!(req.cost_usd, 0.001);
        assert_eq!(req.duration_ms, 1500);
        assert_eq!(req.request_id.as_deref(), Some("req-1"));
    }

    #[test]
    fn test_classify_api_request_applies_defaults() {
        let EventKind::ApiRequest(req) = classify(names::API_REQUEST, &bag(&[])).unwrap() else {
            panic!("expected api request");
        };
        assert_eq!(req.model, "unknown");
        assert_eq!(req.input_tokens, 0);
        assert_eq!(req.cost_usd, 0.0);
        assert_eq!(req.request_id, None);
    }

    #[test]
    fn test_classify_api_error() {
        let attrs = bag(&[
            ("error_message", json!("Rate limit")),
            ("status_code", json!(429)),
            ("model", json!("m-opus")),
        ]);
        let EventKind::ApiError(err) = classify(names::API_ERROR, &attrs).unwrap() else {
            panic!("expected api error");
        };
        assert_eq!(err.message, "Rate limit");
        assert_eq!(err.status_code, 429);
        assert_eq!(err.model, "m-opus");
        assert_eq!(err.request_id, None);
    }

    #[test]
    fn test_classify_tool_result() {
        let attrs = bag(&[
            ("tool_name", json!("Write")),
            ("success", json!(true)),
            ("duration_ms", json!(300)),
        ]);
        let EventKind::ToolResult(result) = classify(names::TOOL_RESULT, &attrs).unwrap() else {
            panic!("expected tool result");
        };
        assert_eq!(result.tool_name, "Write");
        assert!(result.success);
        assert_eq!(result.duration_ms, 300);
    }

    #[test]
    fn test_classify_tool_decision_accept() {
        let attrs = bag(&[
            ("tool_name", json!("Edit")),
            ("decision", json!("accept")),
            ("source", json!("config")),
        ]);
        let EventKind::ToolDecision(decision) = classify(names::TOOL_DECISION, &attrs).unwrap()
        else {
            panic!("expected tool decision");
        };
        assert!(decision.is_accept());
        assert_eq!(decision.source, "config");
    }

    #[test]
    fn test_classify_tool_decision_reject() {
        let attrs = bag(&[("decision", json!("reject"))]);
        let EventKind::ToolDecision(decision) = classify(names::TOOL_DECISION, &attrs).unwrap()
        else {
            panic!("expected tool decision");
        };
        assert!(!decision.is_accept());
        assert_eq!(decision.tool_name, "unknown");
    }

    #[test]
    fn test_classify_unknown_body_ignored() {
        assert_eq!(classify("claude_code.brand_new_event", &bag(&[])), None);
        assert_eq!(classify("", &bag(&[])), None);
    }
}
