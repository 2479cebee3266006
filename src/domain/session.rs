//! Per-session aggregation state and conversation lifecycle.
//!
//! A session correlates the client's discrete telemetry records into
//! conversation traces on the backend and keeps running aggregates for the
//! terminal summary. All mutation happens under the registry's per-session
//! lock; nothing in here suspends, and sink calls are fire-and-forget.

use std::collections::HashMap;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use serde_json::{Value as JsonValue, json};

use super::events::{ApiError, ApiRequest, EventKind, ToolDecision, ToolResult, UserPrompt};
use super::metrics::{LineKind, MetricKind, TokenKind};
use super::otlp::{AttrBag, keys};
use crate::langfuse::{ObservationLevel, TelemetrySink, TraceHandle, Usage};
use crate::utils::time::nanos_to_datetime;

/// Event-derived cost suppresses metric-derived cost for the same model
/// within this window.
const COST_DEDUP_WINDOW_NS: u64 = 2_000_000_000;

/// Window for flagging `pr.count` / `pull_request.count` double reporting.
const PR_ALIAS_WINDOW_NS: u64 = 2_000_000_000;

/// Cost-per-call above this counts as fully inefficient in the score.
const COST_PER_CALL_BASELINE_USD: f64 = 0.30;

const QUALITY_ERROR_PENALTY: f64 = 0.1;
const QUALITY_REJECTION_PENALTY: f64 = 0.05;

// ============================================================================
// IDENTITY
// ============================================================================

/// Identity attributes resolved from the record stream. First write wins;
/// later conflicting values are ignored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionIdentity {
    pub organization_id: Option<String>,
    pub user_account_uuid: Option<String>,
    pub user_email: Option<String>,
    pub terminal_type: Option<String>,
    pub app_version: Option<String>,
}

impl SessionIdentity {
    pub fn from_attrs(attrs: &AttrBag) -> Self {
        let field = |key: &str| {
            attrs
                .get_str(key)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        Self {
            organization_id: field(keys::ORGANIZATION_ID),
            user_account_uuid: field(keys::USER_ACCOUNT_UUID),
            user_email: field(keys::USER_EMAIL),
            terminal_type: field(keys::TERMINAL_TYPE),
            app_version: field(keys::APP_VERSION),
        }
    }

    fn fill_from(&mut self, other: &SessionIdentity) {
        fill_first_write(&mut self.organization_id, &other.organization_id, "organization.id");
        fill_first_write(
            &mut self.user_account_uuid,
            &other.user_account_uuid,
            "user.account_uuid",
        );
        fill_first_write(&mut self.user_email, &other.user_email, "user.email");
        fill_first_write(&mut self.terminal_type, &other.terminal_type, "terminal.type");
        fill_first_write(&mut self.app_version, &other.app_version, "app.version");
    }

    fn metadata_json(&self) -> JsonValue {
        json!({
            "organizationId": self.organization_id,
            "userAccountUuid": self.user_account_uuid,
            "userEmail": self.user_email,
            "terminalType": self.terminal_type,
            "appVersion": self.app_version,
        })
    }
}

fn fill_first_write(slot: &mut Option<String>, incoming: &Option<String>, field: &str) {
    let Some(value) = incoming else { return };
    match slot {
        None => *slot = Some(value.clone()),
        Some(current) if current != value => {
            tracing::debug!(field, current = %current, ignored = %value,
                "Ignoring conflicting identity attribute");
        }
        _ => {}
    }
}

// ============================================================================
// AGGREGATES
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenCounters {
    pub input: i64,
    pub output: i64,
    pub cache_read: i64,
    pub cache_creation: i64,
}

impl TokenCounters {
    pub fn total(&self) -> i64 {
        self.input + self.output + self.cache_read + self.cache_creation
    }

    fn add(&mut self, kind: TokenKind, count: i64) {
        match kind {
            TokenKind::Input => self.input += count,
            TokenKind::Output => self.output += count,
            TokenKind::CacheRead => self.cache_read += count,
            TokenKind::CacheCreation => self.cache_creation += count,
        }
    }
}

/// A tool decision retained for the summary, sourced from either the
/// `tool_decision` event or the `code_edit_tool.decision` metric.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDecisionRecord {
    pub tool: String,
    pub decision: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub count: i64,
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// SESSION
// ============================================================================

pub struct Session {
    key: String,
    identity: SessionIdentity,

    tokens: TokenCounters,
    total_cost_usd: f64,
    per_model_tokens: HashMap<String, TokenCounters>,
    per_model_cost: HashMap<String, f64>,
    lines_added: i64,
    lines_removed: i64,
    commit_count: i64,
    pr_count: i64,
    active_time_seconds: f64,
    started: bool,
    tool_decisions: Vec<ToolDecisionRecord>,
    tool_result_count: i64,
    api_error_count: i64,
    api_call_count: i64,

    conversation_index: u64,
    current_trace: Option<TraceHandle>,
    created_ns: u64,
    last_activity_ns: u64,
    finalized: bool,

    /// model → timestamp of the last event-derived cost, for metric dedup
    last_event_cost_ns: HashMap<String, u64>,
    /// last PR metric name and timestamp, for the alias diagnostics
    last_pr_metric: Option<(String, u64)>,
}

impl Session {
    pub fn new(key: &str, identity: SessionIdentity, now_ns: u64) -> Self {
        Self {
            key: key.to_string(),
            identity,
            tokens: TokenCounters::default(),
            total_cost_usd: 0.0,
            per_model_tokens: HashMap::new(),
            per_model_cost: HashMap::new(),
            lines_added: 0,
            lines_removed: 0,
            commit_count: 0,
            pr_count: 0,
            active_time_seconds: 0.0,
            started: false,
            tool_decisions: Vec::new(),
            tool_result_count: 0,
            api_error_count: 0,
            api_call_count: 0,
            conversation_index: 0,
            current_trace: None,
            created_ns: now_ns,
            last_activity_ns: now_ns,
            finalized: false,
            last_event_cost_ns: HashMap::new(),
            last_pr_metric: None,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn last_activity_ns(&self) -> u64 {
        self.last_activity_ns
    }

    pub fn created_ns(&self) -> u64 {
        self.created_ns
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn conversation_index(&self) -> u64 {
        self.conversation_index
    }

    pub fn current_trace(&self) -> Option<&TraceHandle> {
        self.current_trace.as_ref()
    }

    pub fn api_call_count(&self) -> i64 {
        self.api_call_count
    }

    pub fn api_error_count(&self) -> i64 {
        self.api_error_count
    }

    pub fn tool_result_count(&self) -> i64 {
        self.tool_result_count
    }

    pub fn tokens(&self) -> TokenCounters {
        self.tokens
    }

    /// Whether the client reported its session-start marker.
    pub fn has_started(&self) -> bool {
        self.started
    }

    pub fn total_cost_usd(&self) -> f64 {
        self.total_cost_usd
    }

    pub fn identity(&self) -> &SessionIdentity {
        &self.identity
    }

    /// Record ingest activity for the idle sweeper.
    pub fn touch(&mut self, now_ns: u64) {
        self.last_activity_ns = now_ns;
    }

    /// Fold newly observed identity attributes in, first-write-wins.
    pub fn observe_identity(&mut self, incoming: &SessionIdentity) {
        self.identity.fill_from(incoming);
    }

    // ========================================================================
    // EVENTS
    // ========================================================================

    pub fn apply_event(&mut self, ts_ns: u64, kind: EventKind, sink: &dyn TelemetrySink) {
        if self.finalized {
            tracing::debug!(session = %self.key, "Dropping event for finalized session");
            return;
        }
        match kind {
            EventKind::UserPrompt(prompt) => self.on_user_prompt(ts_ns, prompt, sink),
            EventKind::ApiRequest(request) => self.on_api_request(ts_ns, request, sink),
            EventKind::ApiError(error) => self.on_api_error(ts_ns, error, sink),
            EventKind::ToolResult(result) => self.on_tool_result(ts_ns, result, sink),
            EventKind::ToolDecision(decision) => self.on_tool_decision(ts_ns, decision, sink),
        }
    }

    fn on_user_prompt(&mut self, ts_ns: u64, prompt: UserPrompt, sink: &dyn TelemetrySink) {
        self.open_conversation(ts_ns, prompt.prompt, prompt.length, sink);
    }

    fn on_api_request(&mut self, ts_ns: u64, request: ApiRequest, sink: &dyn TelemetrySink) {
        let trace = self.ensure_conversation(ts_ns, sink);

        let start = nanos_to_datetime(ts_ns);
        let end = start + ChronoDuration::milliseconds(request.duration_ms);
        sink.generation(
            &trace,
            None,
            &request.model,
            start,
            end,
            Usage::tokens(request.input_tokens, request.output_tokens),
            Some(json!({
                "cost": request.cost_usd,
                "cache": {
                    "read": request.cache_read_tokens,
                    "creation": request.cache_creation_tokens,
                },
                "requestId": request.request_id,
            })),
        );

        self.tokens.input += request.input_tokens;
        self.tokens.output += request.output_tokens;
        self.tokens.cache_read += request.cache_read_tokens;
        self.tokens.cache_creation += request.cache_creation_tokens;

        let per_model = self.per_model_tokens.entry(request.model.clone()).or_default();
        per_model.input += request.input_tokens;
        per_model.output += request.output_tokens;
        per_model.cache_read += request.cache_read_tokens;
        per_model.cache_creation += request.cache_creation_tokens;

        if request.cost_usd > 0.0 {
            self.total_cost_usd += request.cost_usd;
            *self.per_model_cost.entry(request.model.clone()).or_default() += request.cost_usd;
            self.last_event_cost_ns.insert(request.model, ts_ns);
        }
        self.api_call_count += 1;
    }

    fn on_api_error(&mut self, ts_ns: u64, error: ApiError, sink: &dyn TelemetrySink) {
        let trace = self.ensure_conversation(ts_ns, sink);
        sink.event(
            &trace,
            "api-error",
            nanos_to_datetime(ts_ns),
            None,
            Some(json!({
                "error": error.message,
                "statusCode": error.status_code,
            })),
            Some(json!({
                "model": error.model,
                "requestId": error.request_id,
            })),
            ObservationLevel::Error,
        );
        self.api_error_count += 1;
    }

    fn on_tool_result(&mut self, ts_ns: u64, result: ToolResult, sink: &dyn TelemetrySink) {
        let trace = self.ensure_conversation(ts_ns, sink);
        sink.event(
            &trace,
            &format!("tool-{}", result.tool_name),
            nanos_to_datetime(ts_ns),
            None,
            Some(json!({
                "success": result.success,
                "durationMs": result.duration_ms,
            })),
            None,
            ObservationLevel::Default,
        );
        self.tool_result_count += 1;
    }

    fn on_tool_decision(&mut self, ts_ns: u64, decision: ToolDecision, sink: &dyn TelemetrySink) {
        let trace = self.ensure_conversation(ts_ns, sink);
        let level = if decision.is_accept() {
            ObservationLevel::Default
        } else {
            ObservationLevel::Warning
        };
        sink.event(
            &trace,
            "tool-decision",
            nanos_to_datetime(ts_ns),
            Some(json!({
                "tool": decision.tool_name,
                "decision": decision.decision,
                "source": decision.source,
            })),
            None,
            None,
            level,
        );
        self.tool_decisions.push(ToolDecisionRecord {
            tool: decision.tool_name,
            decision: decision.decision,
            source: Some(decision.source),
            language: None,
            count: 1,
            timestamp: nanos_to_datetime(ts_ns),
        });
    }

    // ========================================================================
    // METRICS
    // ========================================================================

    pub fn apply_metric(&mut self, ts_ns: u64, kind: MetricKind, sink: &dyn TelemetrySink) {
        if self.finalized {
            tracing::debug!(session = %self.key, "Dropping metric for finalized session");
            return;
        }
        match kind {
            MetricKind::Cost { model, usd } => self.on_cost_metric(ts_ns, model, usd),
            MetricKind::Tokens { kind, model, count } => {
                self.tokens.add(kind, count);
                self.per_model_tokens.entry(model).or_default().add(kind, count);
            }
            MetricKind::Lines { kind, count } => match kind {
                LineKind::Added => self.lines_added += count,
                LineKind::Removed => self.lines_removed += count,
            },
            MetricKind::Commits { count } => self.commit_count += count,
            MetricKind::PullRequests { metric_name, count } => {
                self.on_pr_metric(ts_ns, metric_name, count)
            }
            MetricKind::SessionStart => self.started = true,
            MetricKind::ActiveTime { seconds } => self.active_time_seconds = seconds,
            MetricKind::CodeEditDecision {
                tool,
                decision,
                language,
                count,
            } => self.on_code_edit_decision(ts_ns, tool, decision, language, count, sink),
        }
    }

    /// Event-derived cost is authoritative; a metric increment for a model
    /// that just reported cost on an `api_request` would double count.
    fn on_cost_metric(&mut self, ts_ns: u64, model: String, usd: f64) {
        if let Some(&event_ns) = self.last_event_cost_ns.get(&model)
            && ts_ns.abs_diff(event_ns) <= COST_DEDUP_WINDOW_NS
        {
            tracing::debug!(session = %self.key, model = %model,
                "Skipping cost metric covered by event-derived cost");
            return;
        }
        self.total_cost_usd += usd;
        *self.per_model_cost.entry(model).or_default() += usd;
    }

    fn on_pr_metric(&mut self, ts_ns: u64, metric_name: String, count: i64) {
        if let Some((last_name, last_ns)) = &self.last_pr_metric
            && *last_name != metric_name
            && ts_ns.abs_diff(*last_ns) <= PR_ALIAS_WINDOW_NS
        {
            tracing::debug!(session = %self.key, first = %last_name, second = %metric_name,
                "Both PR metric aliases reported within the alias window");
        }
        self.pr_count += count;
        self.last_pr_metric = Some((metric_name, ts_ns));
    }

    fn on_code_edit_decision(
        &mut self,
        ts_ns: u64,
        tool: String,
        decision: String,
        language: String,
        count: i64,
        sink: &dyn TelemetrySink,
    ) {
        if let Some(trace) = &self.current_trace {
            let level = if decision == "accept" {
                ObservationLevel::Default
            } else {
                ObservationLevel::Warning
            };
            sink.event(
                trace,
                "code-edit-decision",
                nanos_to_datetime(ts_ns),
                Some(json!({
                    "tool": tool,
                    "decision": decision,
                    "language": language,
                })),
                None,
                None,
                level,
            );
        }
        self.tool_decisions.push(ToolDecisionRecord {
            tool,
            decision,
            source: None,
            language: Some(language),
            count,
            timestamp: nanos_to_datetime(ts_ns),
        });
    }

    // ========================================================================
    // CONVERSATIONS
    // ========================================================================

    fn open_conversation(
        &mut self,
        ts_ns: u64,
        prompt: Option<String>,
        length: i64,
        sink: &dyn TelemetrySink,
    ) -> TraceHandle {
        self.conversation_index += 1;
        // The previous trace is left as-is on the backend; conversations are
        // closed implicitly by the next prompt or finalization.
        let handle = sink.trace(
            &format!("conversation-{}", self.conversation_index),
            &self.key,
            nanos_to_datetime(ts_ns),
            Some(json!({"prompt": prompt, "length": length})),
            None,
            Some(self.identity.metadata_json()),
        );
        self.current_trace = Some(handle.clone());
        handle
    }

    /// Current conversation trace, opening a synthetic one (empty prompt,
    /// length 0) when activity arrives before any user prompt.
    fn ensure_conversation(&mut self, ts_ns: u64, sink: &dyn TelemetrySink) -> TraceHandle {
        match &self.current_trace {
            Some(handle) => handle.clone(),
            None => self.open_conversation(ts_ns, None, 0, sink),
        }
    }

    // ========================================================================
    // FINALIZATION
    // ========================================================================

    /// Emit the summary trace and scores, then seal the session. Idempotent.
    pub fn finalize(&mut self, sink: &dyn TelemetrySink) {
        if self.finalized {
            return;
        }
        self.finalized = true;

        let summary = self.summary_output();
        let trace = sink.trace(
            "session-summary",
            &self.key,
            Utc::now(),
            None,
            Some(summary),
            Some(self.identity.metadata_json()),
        );

        let (quality, quality_comment) = self.quality_score();
        sink.score(&trace, "quality", quality, Some(quality_comment));

        let (efficiency, efficiency_comment) = self.efficiency_score();
        sink.score(&trace, "efficiency", efficiency, Some(efficiency_comment));

        self.current_trace = None;
        tracing::debug!(session = %self.key, quality, efficiency, "Session finalized");
    }

    fn summary_output(&self) -> JsonValue {
        let model_usage: serde_json::Map<String, JsonValue> = self
            .per_model_tokens
            .iter()
            .map(|(model, tokens)| {
                (
                    model.clone(),
                    json!({
                        "inputTokens": tokens.input,
                        "outputTokens": tokens.output,
                        "cacheReadTokens": tokens.cache_read,
                        "cacheCreationTokens": tokens.cache_creation,
                        "cost": self.per_model_cost.get(model).copied().unwrap_or(0.0),
                    }),
                )
            })
            .collect();

        json!({
            "conversationCount": self.conversation_index,
            "apiCallCount": self.api_call_count,
            "toolCallCount": self.tool_result_count,
            "totalCost": self.total_cost_usd,
            "totalTokens": self.tokens.total(),
            "cacheTokens": {
                "read": self.tokens.cache_read,
                "creation": self.tokens.cache_creation,
            },
            "additionalMetrics": {
                "activeTime": self.active_time_seconds,
                "commitCount": self.commit_count,
                "pullRequestCount": self.pr_count,
                "toolDecisions": self.tool_decisions,
                "linesAdded": self.lines_added,
                "linesRemoved": self.lines_removed,
                "modelUsage": model_usage,
            },
        })
    }

    fn rejection_count(&self) -> usize {
        self.tool_decisions
            .iter()
            .filter(|d| d.decision != "accept")
            .count()
    }

    fn quality_score(&self) -> (f64, String) {
        let rejections = self.rejection_count();
        let score = (1.0
            - QUALITY_ERROR_PENALTY * self.api_error_count as f64
            - QUALITY_REJECTION_PENALTY * rejections as f64)
            .clamp(0.0, 1.0);
        let comment = format!("{} errors, {} rejections", self.api_error_count, rejections);
        (score, comment)
    }

    fn efficiency_score(&self) -> (f64, String) {
        let cache_tokens = (self.tokens.cache_read + self.tokens.cache_creation) as f64;
        let cache_ratio = cache_tokens / (self.tokens.total().max(1)) as f64;
        let cost_per_call = self.total_cost_usd / (self.api_call_count.max(1)) as f64;
        let cost_term = 1.0 - (cost_per_call / COST_PER_CALL_BASELINE_USD).min(1.0);
        let score = ((cache_ratio + cost_term) / 2.0).clamp(0.0, 1.0);
        let comment = format!(
            "cache ratio {:.2}, cost per call ${:.4}",
            cache_ratio, cost_per_call
        );
        (score, comment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::metrics::{self, names as metric_names};
    use crate::langfuse::testing::{RecordingSink, SinkCall};

    const T0: u64 = 1_705_314_645_000_000_000;
    const MS: u64 = 1_000_000;
    const SEC: u64 = 1_000_000_000;

    fn session() -> Session {
        Session::new("s1", SessionIdentity::default(), T0)
    }

    fn user_prompt(prompt: &str, length: i64) -> EventKind {
        EventKind::UserPrompt(UserPrompt {
            prompt: Some(prompt.to_string()),
            length,
        })
    }

    fn api_request(model: &str, input: i64, output: i64, cost: f64) -> EventKind {
        EventKind::ApiRequest(ApiRequest {
            model: model.to_string(),
            input_tokens: input,
            output_tokens: output,
            cache_read_tokens: 0,
            cache_creation_tokens: 0,
            cost_usd: cost,
            duration_ms: 0,
            request_id: None,
        })
    }

    fn api_error() -> EventKind {
        EventKind::ApiError(ApiError {
            message: "Rate limit".into(),
            status_code: 429,
            model: "m-opus".into(),
            request_id: None,
        })
    }

    fn tool_result(name: &str) -> EventKind {
        EventKind::ToolResult(ToolResult {
            tool_name: name.to_string(),
            success: true,
            duration_ms: 300,
        })
    }

    #[test]
    fn test_simple_qa_scenario() {
        let sink = RecordingSink::new();
        let mut s = session();

        s.apply_event(T0, user_prompt("What is 2+2?", 12), &sink);
        s.apply_event(T0 + SEC, api_request("m-opus", 10, 5, 0.001), &sink);

        let traces = sink.traces();
        assert_eq!(traces.len(), 1);
        let SinkCall::Trace {
            handle,
            name,
            session_id,
            input,
            ..
        } = &traces[0]
        else {
            unreachable!()
        };
        assert_eq!(name, "conversation-1");
        assert_eq!(session_id, "s1");
        assert_eq!(
            input.as_ref().unwrap(),
            &json!({"prompt": "What is 2+2?", "length": 12})
        );

        let generations = sink.generations();
        assert_eq!(generations.len(), 1);
        let SinkCall::Generation {
            trace,
            model,
            usage,
            metadata,
            ..
        } = &generations[0]
        else {
            unreachable!()
        };
        assert_eq!(trace, handle);
        assert_eq!(model, "m-opus");
        assert_eq!(usage, &Usage::tokens(10, 5));
        assert_eq!(usage.total, 15);
        assert_eq!(metadata.as_ref().unwrap()["cost"], 0.001);

        assert_eq!(s.api_call_count(), 1);
        assert_eq!(s.total_cost_usd(), 0.001);
    }

    #[test]
    fn test_api_request_without_prompt_opens_synthetic_conversation() {
        let sink = RecordingSink::new();
        let mut s = session();

        s.apply_event(T0, api_request("m-opus", 10, 5, 0.001), &sink);

        let SinkCall::Trace { name, input, .. } = &sink.traces()[0] else {
            unreachable!()
        };
        assert_eq!(name, "conversation-1");
        assert_eq!(input.as_ref().unwrap(), &json!({"prompt": null, "length": 0}));
        assert_eq!(s.conversation_index(), 1);
        assert_eq!(sink.generations().len(), 1);
    }

    #[test]
    fn test_consecutive_prompts_open_numbered_conversations() {
        let sink = RecordingSink::new();
        let mut s = session();

        s.apply_event(T0, user_prompt("first", 5), &sink);
        let first_trace = s.current_trace().unwrap().clone();
        s.apply_event(T0 + SEC, user_prompt("second", 6), &sink);

        let names: Vec<String> = sink
            .traces()
            .iter()
            .map(|c| match c {
                SinkCall::Trace { name, .. } => name.clone(),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(names, vec!["conversation-1", "conversation-2"]);
        assert_ne!(s.current_trace().unwrap(), &first_trace);
        assert_eq!(s.conversation_index(), 2);
    }

    #[test]
    fn test_generation_end_time_from_duration() {
        let sink = RecordingSink::new();
        let mut s = session();
        s.apply_event(
            T0,
            EventKind::ApiRequest(ApiRequest {
                model: "m".into(),
                input_tokens: 1,
                output_tokens: 1,
                cache_read_tokens: 0,
                cache_creation_tokens: 0,
                cost_usd: 0.0,
                duration_ms: 1500,
                request_id: None,
            }),
            &sink,
        );
        let SinkCall::Generation {
            start_time,
            end_time,
            ..
        } = &sink.generations()[0]
        else {
            unreachable!()
        };
        assert_eq!(
            end_time.signed_duration_since(start_time).num_milliseconds(),
            1500
        );
    }

    #[test]
    fn test_tool_result_event_shape() {
        let sink = RecordingSink::new();
        let mut s = session();
        s.apply_event(T0, user_prompt("q", 1), &sink);
        s.apply_event(T0 + SEC, tool_result("Write"), &sink);

        let events = sink.events();
        assert_eq!(events.len(), 1);
        let SinkCall::Event {
            name,
            output,
            level,
            trace,
            ..
        } = &events[0]
        else {
            unreachable!()
        };
        assert_eq!(name, "tool-Write");
        assert_eq!(
            output.as_ref().unwrap(),
            &json!({"success": true, "durationMs": 300})
        );
        assert_eq!(*level, ObservationLevel::Default);
        assert_eq!(trace, s.current_trace().unwrap());
        assert_eq!(s.tool_result_count(), 1);
    }

    #[test]
    fn test_api_error_event_level_and_count() {
        let sink = RecordingSink::new();
        let mut s = session();
        s.apply_event(T0, user_prompt("q", 1), &sink);
        s.apply_event(T0 + SEC, api_error(), &sink);

        let SinkCall::Event { level, output, .. } = &sink.events()[0] else {
            unreachable!()
        };
        assert_eq!(*level, ObservationLevel::Error);
        assert_eq!(output.as_ref().unwrap()["statusCode"], 429);
        assert_eq!(s.api_error_count(), 1);
    }

    #[test]
    fn test_tool_decision_levels() {
        let sink = RecordingSink::new();
        let mut s = session();
        s.apply_event(
            T0,
            EventKind::ToolDecision(ToolDecision {
                tool_name: "Edit".into(),
                decision: "accept".into(),
                source: "config".into(),
            }),
            &sink,
        );
        s.apply_event(
            T0 + SEC,
            EventKind::ToolDecision(ToolDecision {
                tool_name: "Bash".into(),
                decision: "reject".into(),
                source: "user".into(),
            }),
            &sink,
        );

        let levels: Vec<ObservationLevel> = sink
            .events()
            .iter()
            .map(|c| match c {
                SinkCall::Event { level, .. } => *level,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(levels, vec![ObservationLevel::Default, ObservationLevel::Warning]);
        assert_eq!(s.tool_decisions.len(), 2);
    }

    #[test]
    fn test_token_sum_invariant_across_sources() {
        let sink = RecordingSink::new();
        let mut s = session();
        s.apply_event(
            T0,
            EventKind::ApiRequest(ApiRequest {
                model: "m".into(),
                input_tokens: 10,
                output_tokens: 5,
                cache_read_tokens: 100,
                cache_creation_tokens: 20,
                cost_usd: 0.0,
                duration_ms: 0,
                request_id: None,
            }),
            &sink,
        );
        for (ty, count) in [
            ("input", 7.0),
            ("output", 3.0),
            ("cacheRead", 50.0),
            ("cacheCreation", 10.0),
        ] {
            let bag = AttrBag::from_key_values(&[serde_json::from_value(json!({
                "key": "type", "value": {"stringValue": ty}
            }))
            .unwrap()]);
            let kind = metrics::classify(metric_names::TOKEN_USAGE, count, &bag).unwrap();
            s.apply_metric(T0 + SEC, kind, &sink);
        }

        let t = s.tokens();
        assert_eq!(t.input, 17);
        assert_eq!(t.output, 8);
        assert_eq!(t.cache_read, 150);
        assert_eq!(t.cache_creation, 30);
        assert_eq!(t.total(), t.input + t.output + t.cache_read + t.cache_creation);
    }

    #[test]
    fn test_cost_metric_dedup_window() {
        let sink = RecordingSink::new();
        let mut s = session();

        // Event cost is authoritative for m-opus at T0
        s.apply_event(T0, api_request("m-opus", 1, 1, 0.05), &sink);
        assert_eq!(s.total_cost_usd(), 0.05);

        // Metric within 2s for the same model is skipped
        s.apply_metric(
            T0 + SEC,
            MetricKind::Cost {
                model: "m-opus".into(),
                usd: 0.05,
            },
            &sink,
        );
        assert_eq!(s.total_cost_usd(), 0.05);

        // Different model is not affected
        s.apply_metric(
            T0 + SEC,
            MetricKind::Cost {
                model: "m-haiku".into(),
                usd: 0.01,
            },
            &sink,
        );
        assert!((s.total_cost_usd() - 0.06).abs() < 1e-12);

        // Same model outside the window is added
        s.apply_metric(
            T0 + 3 * SEC,
            MetricKind::Cost {
                model: "m-opus".into(),
                usd: 0.02,
            },
            &sink,
        );
        assert!((s.total_cost_usd() - 0.08).abs() < 1e-12);
    }

    #[test]
    fn test_zero_cost_api_request_does_not_suppress_metrics() {
        let sink = RecordingSink::new();
        let mut s = session();
        s.apply_event(T0, api_request("m-opus", 1, 1, 0.0), &sink);
        s.apply_metric(
            T0 + 500 * MS,
            MetricKind::Cost {
                model: "m-opus".into(),
                usd: 0.03,
            },
            &sink,
        );
        assert_eq!(s.total_cost_usd(), 0.03);
    }

    #[test]
    fn test_pr_count_aliases_both_accumulate() {
        let sink = RecordingSink::new();
        let mut s = session();
        s.apply_metric(
            T0,
            MetricKind::PullRequests {
                metric_name: metric_names::PR_COUNT.into(),
                count: 1,
            },
            &sink,
        );
        s.apply_metric(
            T0 + SEC,
            MetricKind::PullRequests {
                metric_name: metric_names::PULL_REQUEST_COUNT.into(),
                count: 1,
            },
            &sink,
        );
        assert_eq!(s.pr_count, 2);
    }

    #[test]
    fn test_session_start_marker() {
        let sink = RecordingSink::new();
        let mut s = session();
        assert_eq!(s.key(), "s1");
        assert!(!s.has_started());
        s.apply_metric(T0, MetricKind::SessionStart, &sink);
        assert!(s.has_started());
    }

    #[test]
    fn test_active_time_last_wins() {
        let sink = RecordingSink::new();
        let mut s = session();
        s.apply_metric(T0, MetricKind::ActiveTime { seconds: 300.0 }, &sink);
        s.apply_metric(T0 + SEC, MetricKind::ActiveTime { seconds: 120.0 }, &sink);
        assert_eq!(s.active_time_seconds, 120.0);
    }

    #[test]
    fn test_code_edit_decision_without_conversation_skips_event() {
        let sink = RecordingSink::new();
        let mut s = session();
        s.apply_metric(
            T0,
            MetricKind::CodeEditDecision {
                tool: "Edit".into(),
                decision: "reject".into(),
                language: "rust".into(),
                count: 1,
            },
            &sink,
        );
        assert!(sink.events().is_empty());
        assert_eq!(s.tool_decisions.len(), 1);
    }

    #[test]
    fn test_code_edit_decision_with_conversation_emits_warning() {
        let sink = RecordingSink::new();
        let mut s = session();
        s.apply_event(T0, user_prompt("q", 1), &sink);
        s.apply_metric(
            T0 + SEC,
            MetricKind::CodeEditDecision {
                tool: "Edit".into(),
                decision: "reject".into(),
                language: "rust".into(),
                count: 1,
            },
            &sink,
        );
        let SinkCall::Event { name, level, .. } = &sink.events()[0] else {
            unreachable!()
        };
        assert_eq!(name, "code-edit-decision");
        assert_eq!(*level, ObservationLevel::Warning);
    }

    #[test]
    fn test_identity_first_write_wins() {
        let mut s = session();
        s.observe_identity(&SessionIdentity {
            organization_id: Some("org-1".into()),
            ..Default::default()
        });
        s.observe_identity(&SessionIdentity {
            organization_id: Some("org-2".into()),
            user_email: Some("a@x.com".into()),
            ..Default::default()
        });
        assert_eq!(s.identity().organization_id.as_deref(), Some("org-1"));
        assert_eq!(s.identity().user_email.as_deref(), Some("a@x.com"));
    }

    #[test]
    fn test_finalize_summary_and_scores() {
        let sink = RecordingSink::new();
        let mut s = session();

        // Scenarios 1-3 from the literal end-to-end sequence
        s.apply_event(T0, user_prompt("What is 2+2?", 12), &sink);
        s.apply_event(T0 + SEC, api_request("m-opus", 10, 5, 0.001), &sink);
        s.apply_event(T0 + 2 * SEC, tool_result("Write"), &sink);
        s.apply_event(T0 + 3 * SEC, api_error(), &sink);

        s.finalize(&sink);

        let summary = sink.trace_named("session-summary").unwrap();
        let SinkCall::Trace { handle, output, .. } = &summary else {
            unreachable!()
        };
        let output = output.as_ref().unwrap();
        assert_eq!(output["conversationCount"], 1);
        assert_eq!(output["apiCallCount"], 1);
        assert_eq!(output["toolCallCount"], 1);
        assert_eq!(output["totalCost"], 0.001);
        assert_eq!(output["totalTokens"], 15);
        assert_eq!(output["cacheTokens"]["read"], 0);
        assert_eq!(
            output["additionalMetrics"]["modelUsage"]["m-opus"]["inputTokens"],
            10
        );

        let scores = sink.scores();
        assert_eq!(scores.len(), 2);
        let SinkCall::Score {
            trace,
            name,
            value,
            comment,
        } = &scores[0]
        else {
            unreachable!()
        };
        assert_eq!(trace, handle);
        assert_eq!(name, "quality");
        assert!((value - 0.9).abs() < 1e-9);
        assert_eq!(comment.as_deref(), Some("1 errors, 0 rejections"));

        let SinkCall::Score { name, value, .. } = &scores[1] else {
            unreachable!()
        };
        assert_eq!(name, "efficiency");
        assert!((0.0..=1.0).contains(value));

        assert!(s.is_finalized());
        assert!(s.current_trace().is_none());
    }

    #[test]
    fn test_finalize_is_idempotent() {
        let sink = RecordingSink::new();
        let mut s = session();
        s.apply_event(T0, user_prompt("q", 1), &sink);
        s.finalize(&sink);
        s.finalize(&sink);

        let summaries = sink
            .traces()
            .iter()
            .filter(|c| matches!(c, SinkCall::Trace { name, .. } if name == "session-summary"))
            .count();
        assert_eq!(summaries, 1);
        assert_eq!(sink.scores().len(), 2);
    }

    #[test]
    fn test_no_mutation_after_finalize() {
        let sink = RecordingSink::new();
        let mut s = session();
        s.finalize(&sink);

        s.apply_event(T0, api_request("m", 10, 5, 0.5), &sink);
        s.apply_metric(T0, MetricKind::Commits { count: 3 }, &sink);

        assert_eq!(s.api_call_count(), 0);
        assert_eq!(s.total_cost_usd(), 0.0);
        assert_eq!(s.commit_count, 0);
        // Only the summary trace exists
        assert_eq!(sink.traces().len(), 1);
    }

    #[test]
    fn test_quality_score_floors_at_zero() {
        let sink = RecordingSink::new();
        let mut s = session();
        for i in 0..15 {
            s.apply_event(T0 + i * SEC, api_error(), &sink);
        }
        let (score, comment) = s.quality_score();
        assert_eq!(score, 0.0);
        assert_eq!(comment, "15 errors, 0 rejections");
    }

    #[test]
    fn test_quality_score_counts_rejections_from_both_sources() {
        let sink = RecordingSink::new();
        let mut s = session();
        s.apply_event(
            T0,
            EventKind::ToolDecision(ToolDecision {
                tool_name: "Bash".into(),
                decision: "reject".into(),
                source: "user".into(),
            }),
            &sink,
        );
        s.apply_metric(
            T0 + SEC,
            MetricKind::CodeEditDecision {
                tool: "Edit".into(),
                decision: "reject".into(),
                language: "rust".into(),
                count: 1,
            },
            &sink,
        );
        let (score, comment) = s.quality_score();
        assert!((score - 0.9).abs() < 1e-9);
        assert_eq!(comment, "0 errors, 2 rejections");
    }

    #[test]
    fn test_efficiency_score_bounds_and_determinism() {
        let sink = RecordingSink::new();
        let mut s = session();
        s.apply_event(
            T0,
            EventKind::ApiRequest(ApiRequest {
                model: "m".into(),
                input_tokens: 100,
                output_tokens: 50,
                cache_read_tokens: 800,
                cache_creation_tokens: 50,
                cost_usd: 0.15,
                duration_ms: 0,
                request_id: None,
            }),
            &sink,
        );
        let (first, comment) = s.efficiency_score();
        let (second, _) = s.efficiency_score();
        assert_eq!(first, second);
        assert!((0.0..=1.0).contains(&first));
        // cache_ratio = 850/1000 = 0.85, cost_term = 1 - 0.15/0.30 = 0.5
        assert!((first - 0.675).abs() < 1e-9);
        assert!(comment.contains("0.85"));
    }

    #[test]
    fn test_efficiency_score_empty_session() {
        let s = session();
        let (score, _) = s.efficiency_score();
        // No tokens, no cost: cache term 0, cost term 1
        assert!((score - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_monotonic_counters_never_decrease() {
        let sink = RecordingSink::new();
        let mut s = session();
        let mut last = (0.0, 0i64, 0i64, 0i64, 0i64);
        for i in 0..5 {
            let ts = T0 + i * 10 * SEC;
            s.apply_event(ts, api_request("m", 1, 1, 0.01), &sink);
            s.apply_event(ts + SEC, tool_result("Read"), &sink);
            s.apply_metric(ts + 2 * SEC, MetricKind::Commits { count: 1 }, &sink);
            s.apply_metric(
                ts + 3 * SEC,
                MetricKind::PullRequests {
                    metric_name: metric_names::PR_COUNT.into(),
                    count: 1,
                },
                &sink,
            );
            let now = (
                s.total_cost_usd(),
                s.api_call_count(),
                s.tool_result_count(),
                s.commit_count,
                s.pr_count,
            );
            assert!(now.0 >= last.0);
            assert!(now.1 >= last.1);
            assert!(now.2 >= last.2);
            assert!(now.3 >= last.3);
            assert!(now.4 >= last.4);
            last = now;
        }
    }

    #[test]
    fn test_touch_updates_last_activity() {
        let mut s = session();
        assert_eq!(s.last_activity_ns(), T0);
        s.touch(T0 + 5 * SEC);
        assert_eq!(s.last_activity_ns(), T0 + 5 * SEC);
    }
}
