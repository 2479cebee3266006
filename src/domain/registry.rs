//! Session registry and lifecycle.
//!
//! Maps session keys to live sessions, creating them on first sight and
//! reclaiming them on idle timeout. Reads run concurrently; only insertion
//! and removal take the map's write lock, and each session mutates under its
//! own lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::session::{Session, SessionIdentity};
use crate::langfuse::TelemetrySink;
use crate::utils::time::now_nanos;

pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Mutex<Session>>>>,
    sink: Arc<dyn TelemetrySink>,
    idle_timeout_ns: u64,
    flush_timeout: Duration,
}

impl SessionRegistry {
    pub fn new(sink: Arc<dyn TelemetrySink>, idle_timeout: Duration, flush_timeout: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            sink,
            idle_timeout_ns: idle_timeout.as_nanos().min(u64::MAX as u128) as u64,
            flush_timeout,
        }
    }

    pub fn sink(&self) -> &dyn TelemetrySink {
        self.sink.as_ref()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.sessions.read().contains_key(key)
    }

    /// Fetch the session for a key, creating it on first sight with the
    /// identity attributes of the triggering record.
    pub fn get_or_create(
        &self,
        key: &str,
        identity: &SessionIdentity,
        now_ns: u64,
    ) -> Arc<Mutex<Session>> {
        if let Some(session) = self.sessions.read().get(key) {
            return Arc::clone(session);
        }
        let mut sessions = self.sessions.write();
        // Another ingest worker may have won the race for the write lock
        Arc::clone(sessions.entry(key.to_string()).or_insert_with(|| {
            tracing::debug!(session = key, "Creating session");
            Arc::new(Mutex::new(Session::new(key, identity.clone(), now_ns)))
        }))
    }

    /// Finalize a session and drop it from the registry. The session is
    /// removed even if summary delivery misbehaves; there is no redelivery.
    pub fn finalize_and_remove(&self, key: &str) {
        let removed = self.sessions.write().remove(key);
        if let Some(session) = removed {
            session.lock().finalize(self.sink.as_ref());
        }
    }

    /// Finalize every session idle for at least the configured timeout.
    /// Returns the number of sessions reclaimed.
    pub fn sweep(&self, now_ns: u64) -> usize {
        let expired: Vec<String> = self
            .sessions
            .read()
            .iter()
            .filter(|(_, session)| {
                now_ns.saturating_sub(session.lock().last_activity_ns()) >= self.idle_timeout_ns
            })
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            tracing::debug!(session = %key, "Finalizing idle session");
            self.finalize_and_remove(key);
        }
        expired.len()
    }

    /// Start the periodic idle sweeper.
    pub fn start_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // Skip the immediate first tick
            ticker.tick().await;

            tracing::debug!(interval_secs = interval.as_secs(), "Session sweeper started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        let reclaimed = registry.sweep(now_nanos());
                        if reclaimed > 0 {
                            tracing::info!(reclaimed, "Swept idle sessions");
                        }
                    }
                }
            }
            tracing::debug!("Session sweeper stopped");
        })
    }

    /// Finalize all remaining sessions and flush the sink. Called once on
    /// graceful shutdown.
    pub async fn shutdown(&self) {
        let drained: Vec<(String, Arc<Mutex<Session>>)> =
            self.sessions.write().drain().collect();
        let count = drained.len();
        for (_, session) in drained {
            session.lock().finalize(self.sink.as_ref());
        }
        if count > 0 {
            tracing::info!(count, "Finalized sessions on shutdown");
        }

        if !self.sink.flush(self.flush_timeout).await {
            tracing::warn!("Sink flush incomplete, pending deliveries abandoned");
        }
    }
}
