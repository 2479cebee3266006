//! Core application

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use crate::api::{self, AppStats};
use crate::core::config::AppConfig;
use crate::core::constants::{APP_NAME, ENV_LOG_LEVEL, FLUSH_TIMEOUT_SECS, SWEEP_INTERVAL_SECS};
use crate::core::shutdown::ShutdownService;
use crate::domain::registry::SessionRegistry;
use crate::langfuse::{LangfuseClient, TelemetrySink};

pub struct CoreApp;

impl CoreApp {
    pub async fn run() -> Result<()> {
        dotenvy::dotenv().ok();
        Self::init_logging();

        let config = AppConfig::from_env();
        tracing::info!(
            port = config.port,
            session_timeout_secs = config.session_timeout.as_secs(),
            langfuse_host = %config.langfuse.host,
            auth = config.api_key.is_some(),
            "Bridge starting",
        );
        if config.langfuse.credentials().is_none() {
            tracing::warn!("Langfuse credentials missing, running in log-only mode");
        }

        let sink: Arc<dyn TelemetrySink> = Arc::new(LangfuseClient::new(&config.langfuse));
        let registry = Arc::new(SessionRegistry::new(
            sink,
            config.session_timeout,
            Duration::from_secs(FLUSH_TIMEOUT_SECS),
        ));
        let stats = Arc::new(AppStats::new());

        let shutdown = ShutdownService::new(Arc::clone(&registry));
        shutdown.install_signal_handlers();
        shutdown
            .register(registry.start_sweeper(
                Duration::from_secs(SWEEP_INTERVAL_SECS),
                shutdown.subscribe(),
            ))
            .await;

        api::server::serve(&config, registry, stats, &shutdown).await?;

        // Server returned: the signal fired. Drain everything.
        shutdown.shutdown().await;
        Ok(())
    }

    fn init_logging() {
        let level = std::env::var(ENV_LOG_LEVEL).unwrap_or_else(|_| "info".to_string());
        let default_filter = format!("{level},{APP_NAME}={level}");

        let filter = std::env::var("RUST_LOG").unwrap_or(default_filter);

        tracing_subscriber::fmt()
            .with_target(false)
            .with_thread_ids(false)
            .with_level(true)
            .compact()
            .with_env_filter(filter)
            .init();
    }
}
