//! Metric datapoint classification.
//!
//! Flattens recognized OTLP metric datapoints into typed samples the session
//! applies to its aggregates. One datapoint maps to at most one sample;
//! unrecognized metric names are ignored.

use super::otlp::AttrBag;

/// Metric names emitted by the client.
pub mod names {
    pub const COST_USAGE: &str = "claude_code.cost.usage";
    pub const TOKEN_USAGE: &str = "claude_code.token.usage";
    pub const LINES_OF_CODE: &str = "claude_code.lines_of_code.count";
    pub const COMMIT_COUNT: &str = "claude_code.commit.count";
    pub const PR_COUNT: &str = "claude_code.pr.count";
    pub const PULL_REQUEST_COUNT: &str = "claude_code.pull_request.count";
    pub const SESSION_COUNT: &str = "claude_code.session.count";
    pub const ACTIVE_TIME_TOTAL: &str = "claude_code.active_time.total";
    pub const CODE_EDIT_DECISION: &str = "claude_code.code_edit_tool.decision";
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetricKind {
    /// USD increment, attributed to a model.
    Cost { model: String, usd: f64 },
    /// Token count increment, dispatched by the `type` attribute.
    Tokens {
        kind: TokenKind,
        model: String,
        count: i64,
    },
    /// Lines-of-code increment, dispatched by the `type` attribute.
    Lines { kind: LineKind, count: i64 },
    Commits { count: i64 },
    /// Both `pr.count` and `pull_request.count` land here; the originating
    /// metric name is kept for the alias diagnostics.
    PullRequests { metric_name: String, count: i64 },
    /// Session start marker; the value is irrelevant.
    SessionStart,
    /// Absolute seconds, last report wins.
    ActiveTime { seconds: f64 },
    CodeEditDecision {
        tool: String,
        decision: String,
        language: String,
        count: i64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Input,
    Output,
    CacheRead,
    CacheCreation,
}

impl TokenKind {
    fn from_attr(value: &str) -> Option<Self> {
        match value {
            "input" => Some(TokenKind::Input),
            "output" => Some(TokenKind::Output),
            "cacheRead" => Some(TokenKind::CacheRead),
            "cacheCreation" => Some(TokenKind::CacheCreation),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Added,
    Removed,
}

/// Classify a single datapoint of the named metric. Returns None both for
/// unrecognized metric names and for datapoints whose dispatch attribute has
/// no aggregate (e.g. an unknown token type).
pub fn classify(metric_name: &str, value: f64, attrs: &AttrBag) -> Option<MetricKind> {
    match metric_name {
        names::COST_USAGE => Some(MetricKind::Cost {
            model: attrs.str_or_unknown("model"),
            usd: value,
        }),
        names::TOKEN_USAGE => {
            let type_attr = attrs.str_or_unknown("type");
            let Some(kind) = TokenKind::from_attr(&type_attr) else {
                tracing::debug!(token_type = %type_attr, "Ignoring token metric with unknown type");
                return None;
            };
            Some(MetricKind::Tokens {
                kind,
                model: attrs.str_or_unknown("model"),
                count: value as i64,
            })
        }
        names::LINES_OF_CODE => match attrs.str_or_unknown("type").as_str() {
            "added" => Some(MetricKind::Lines {
                kind: LineKind::Added,
                count: value as i64,
            }),
            "removed" => Some(MetricKind::Lines {
                kind: LineKind::Removed,
                count: value as i64,
            }),
            other => {
                tracing::debug!(line_type = other, "Ignoring lines metric with unknown type");
                None
            }
        },
        names::COMMIT_COUNT => Some(MetricKind::Commits {
            count: value as i64,
        }),
        names::PR_COUNT | names::PULL_REQUEST_COUNT => Some(MetricKind::PullRequests {
            metric_name: metric_name.to_string(),
            count: value as i64,
        }),
        names::SESSION_COUNT => Some(MetricKind::SessionStart),
        names::ACTIVE_TIME_TOTAL => Some(MetricKind::ActiveTime { seconds: value }),
        names::CODE_EDIT_DECISION => Some(MetricKind::CodeEditDecision {
            tool: attrs.str_or_unknown("tool"),
            decision: attrs.str_or_unknown("decision"),
            language: attrs.str_or_unknown("language"),
            count: value as i64,
        }),
        other => {
            tracing::debug!(metric = other, "Ignoring unrecognized metric");
            None
        }
    }
}
