//! Application configuration, loaded from the environment.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use super::constants::{
    DEFAULT_HOST, DEFAULT_LANGFUSE_HOST, DEFAULT_MAX_REQUEST_SIZE, DEFAULT_PORT,
    DEFAULT_SESSION_TIMEOUT_MS, ENV_API_KEY, ENV_LANGFUSE_HOST, ENV_LANGFUSE_PUBLIC_KEY,
    ENV_LANGFUSE_SECRET_KEY, ENV_MAX_REQUEST_SIZE, ENV_PORT, ENV_SESSION_TIMEOUT,
};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub session_timeout: Duration,
    pub max_request_size: usize,
    /// Bearer token required on ingress when set
    pub api_key: Option<String>,
    pub langfuse: LangfuseConfig,
}

#[derive(Debug, Clone)]
pub struct LangfuseConfig {
    pub host: String,
    pub public_key: Option<String>,
    pub secret_key: Option<String>,
}

impl LangfuseConfig {
    /// Credential pair, when both halves are configured.
    pub fn credentials(&self) -> Option<(String, String)> {
        match (&self.public_key, &self.secret_key) {
            (Some(public_key), Some(secret_key)) => {
                Some((public_key.clone(), secret_key.clone()))
            }
            _ => None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the config from an arbitrary variable source. Split out from
    /// [`Self::from_env`] so tests avoid mutating process environment.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let port = parse_or_default(ENV_PORT, non_empty(ENV_PORT), DEFAULT_PORT);
        let session_timeout_ms = parse_or_default(
            ENV_SESSION_TIMEOUT,
            non_empty(ENV_SESSION_TIMEOUT),
            DEFAULT_SESSION_TIMEOUT_MS,
        );
        let max_request_size = parse_or_default(
            ENV_MAX_REQUEST_SIZE,
            non_empty(ENV_MAX_REQUEST_SIZE),
            DEFAULT_MAX_REQUEST_SIZE,
        );

        Self {
            host: DEFAULT_HOST.to_string(),
            port,
            session_timeout: Duration::from_millis(session_timeout_ms),
            max_request_size,
            api_key: non_empty(ENV_API_KEY),
            langfuse: LangfuseConfig {
                host: non_empty(ENV_LANGFUSE_HOST)
                    .unwrap_or_else(|| DEFAULT_LANGFUSE_HOST.to_string()),
                public_key: non_empty(ENV_LANGFUSE_PUBLIC_KEY),
                secret_key: non_empty(ENV_LANGFUSE_SECRET_KEY),
            },
        }
    }
}

fn parse_or_default<T>(name: &str, value: Option<String>, default: T) -> T
where
    T: FromStr + Copy + fmt::Display,
{
    match value {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(var = name, value = %raw, %default, "Invalid value, using default");
            default
        }),
    }
}
