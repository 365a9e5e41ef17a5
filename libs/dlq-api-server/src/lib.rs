//! HTTP surface of the dead-letter explorer.

mod error;
mod http;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tokio_util::sync::CancellationToken;

use dlq_engine::discovery::TopicDiscovery;
use dlq_engine::fetch::TailFetcher;
use dlq_engine::policy::PolicyStore;
use dlq_engine::replay::Replayer;

pub use error::ApiError;

/// Shared handler state. Engines hold no per-call state, so one instance
/// serves every request.
#[derive(Clone)]
pub struct AppState {
    pub discovery: Arc<TopicDiscovery>,
    pub fetcher: Arc<TailFetcher>,
    pub replayer: Arc<Replayer>,
    pub policies: Arc<dyn PolicyStore>,
    /// Parent of every per-request cancellation token.
    pub shutdown: CancellationToken,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/dlq/topics", get(http::handle_list_topics))
        .route("/api/dlq/messages", get(http::handle_messages))
        .route("/api/dlq/replay", axum::routing::post(http::handle_replay))
        .route(
            "/api/redaction/rules",
            get(http::handle_get_rules).put(http::handle_save_rules),
        )
        .route("/health", get(http::handle_health))
        .with_state(state)
}

/// Serve until `shutdown` is cancelled.
pub async fn run(port: u16, state: AppState, shutdown: CancellationToken) -> Result<(), String> {
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .map_err(|e| format!("bind api :{port}: {e}"))?;
    tracing::info!(port, "api listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(|e| format!("axum serve: {e}"))?;

    tracing::info!("api stopped");
    Ok(())
}
