//! HTTP boundary

pub mod middleware;
pub mod routes;
pub mod server;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::domain::registry::SessionRegistry;

/// Process-level counters surfaced by `/health`.
#[derive(Debug)]
pub struct AppStats {
    started: Instant,
    request_count: AtomicU64,
    error_count: AtomicU64,
}

impl AppStats {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            request_count: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
        }
    }

    pub fn record_request(&self) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn requests(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }
}

impl Default for AppStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared state for all route handlers.
#[derive(Clone)]
pub struct ApiState {
    pub registry: Arc<SessionRegistry>,
    pub stats: Arc<AppStats>,
}
