//! API server initialization

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use super::middleware::{AuthState, bearer_auth, not_found};
use super::routes::{health, otlp};
use super::{ApiState, AppStats};
use crate::core::config::AppConfig;
use crate::core::shutdown::ShutdownService;
use crate::domain::registry::SessionRegistry;

/// Build the application router.
pub fn router(
    config: &AppConfig,
    registry: Arc<SessionRegistry>,
    stats: Arc<AppStats>,
) -> Router {
    let state = ApiState { registry, stats };

    let mut otlp_routes = Router::new()
        .route("/v1/logs", post(otlp::logs::export))
        .route("/v1/metrics", post(otlp::metrics::export))
        .route("/v1/traces", post(otlp::traces::export))
        .layer(DefaultBodyLimit::max(config.max_request_size));

    if let Some(token) = &config.api_key {
        otlp_routes = otlp_routes.layer(axum::middleware::from_fn_with_state(
            AuthState {
                token: Arc::from(token.as_str()),
            },
            bearer_auth,
        ));
    }

    Router::new()
        .route("/health", get(health::health))
        .merge(otlp_routes)
        .fallback(not_found)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Bind and serve until the shutdown signal fires.
pub async fn serve(
    config: &AppConfig,
    registry: Arc<SessionRegistry>,
    stats: Arc<AppStats>,
    shutdown: &ShutdownService,
) -> Result<()> {
    let addr = SocketAddr::new(
        config.host.parse().context("Invalid listen host")?,
        config.port,
    );
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    tracing::info!(%addr, "OTLP receiver listening");

    let app = router(config, registry, stats);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.wait())
        .await
        .context("Server error")?;

    Ok(())
}
