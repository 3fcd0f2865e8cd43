//! HTTP front end — axum router, route handlers, and error mapping.
//!
//! Exposes the OpenAI-compatible `/v1/chat/completions` endpoint, the
//! `/v1/models` listing, `/health`, and a static API info root.

mod chat;
mod error;
mod health;
mod models;

pub use error::ApiError;

use arc_swap::ArcSwap;
use axum::{
    Router,
    routing::{get, post},
};
use qwengate_config::Settings;
use qwengate_provider::Registry;
use qwengate_store::Store;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

/// Shared application state passed to all route handlers.
pub struct AppState {
    /// Process-wide owner of live provider instances.
    pub registry: Arc<Registry>,
    /// Durable store (credentials, catalog, settings).
    pub store: Arc<Store>,
    /// Startup-resolved settings snapshot.
    pub settings: ArcSwap<Settings>,
}

impl AppState {
    /// Creates the shared state wrapped in an `Arc`.
    pub fn new(registry: Arc<Registry>, store: Arc<Store>, settings: Settings) -> Arc<Self> {
        Arc::new(Self {
            registry,
            store,
            settings: ArcSwap::from_pointee(settings),
        })
    }
}

/// Build the full axum router.
///
/// Routes:
/// - POST /v1/chat/completions     OpenAI-compatible chat (JSON or SSE)
/// - GET  /v1/models               model listing, optional ?provider=
/// - GET  /health                  per-provider health
/// - GET  /                        API info
///
/// Layers: permissive CORS, HTTP tracing, and a request timeout that
/// bounds time-to-headers (streams in flight are unaffected).
pub fn make_router(state: Arc<AppState>) -> Router {
    let timeout = Duration::from_secs(state.settings.load().request_timeout);
    Router::new()
        .route("/v1/chat/completions", post(chat::chat_completions))
        .route("/v1/models", get(models::list_models))
        .route("/health", get(health::health))
        .route("/", get(health::api_info))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(TimeoutLayer::new(timeout))
}
