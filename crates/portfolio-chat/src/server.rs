//! HTTP server startup
//!
//! Builds the shared state once, warms the context caches, starts the session
//! sweeper and serves the axum router. Handlers reach the orchestrator through
//! `UnifiedAppState`; the only outbound network calls go to the LLM providers.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{debug, info, warn};

use crate::{config::Config, context_engine::ChatOrchestrator, shared_state::UnifiedAppState};

/// Run the chat server until the listener fails
pub async fn run_server(cfg: Config) -> anyhow::Result<()> {
    crate::telemetry::init_tracing();
    crate::metrics::init_metrics();
    cfg.print_config();

    let addr = cfg.api_addr()?;
    let sweep_every = Duration::from_secs(cfg.session_sweep_seconds.max(1));
    let state = UnifiedAppState::from_config(cfg)?;

    // Warm the caches; a failure leaves them empty and they retry on first use
    if let Err(e) = state.orchestrator.reload_all().await {
        warn!("Initial context load failed: {:#}. Retrying on demand.", e);
    }

    spawn_session_sweeper(state.orchestrator.clone(), sweep_every);

    info!("Starting HTTP server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let app = build_router(state);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Drops idle sessions on a fixed interval for the life of the process
fn spawn_session_sweeper(orchestrator: Arc<ChatOrchestrator>, every: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.tick().await;
        loop {
            interval.tick().await;
            let removed = orchestrator.sweep_sessions();
            if removed > 0 {
                info!("Session sweep removed {} idle sessions", removed);
            } else {
                debug!("Session sweep found nothing to remove");
            }
        }
    });
}

pub fn build_router(state: UnifiedAppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers(Any);
    let timeout = Duration::from_secs(state.config.request_timeout_seconds);

    Router::new()
        .route("/api/chat", post(crate::api::chat_api::chat))
        .route("/api/chat/clear", post(crate::api::chat_api::clear))
        .route("/api/chat/status", get(crate::api::admin_api::status))
        .route("/api/chat/reload", post(crate::api::admin_api::reload))
        .route("/healthz", get(crate::api::admin_api::health))
        .route("/metrics", get(crate::metrics::get_metrics))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(timeout))
        .with_state(state)
}
