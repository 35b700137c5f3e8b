//! Relay server for the triage assistant.
//!
//! Exposes two stateless endpoints: `/triage-chat`, which streams a language
//! model's reply through from the AI gateway, and `/trigger-emergency`,
//! which places an automated alert call through the telephony provider.
//! Neither endpoint retries or keeps per-session state.

pub mod api_chat;
pub mod api_emergency;
pub mod config;
pub mod prompt;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Extension, Json, Router,
};
use config::Config;
use prompt::SystemPrompt;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Loaded configuration, including upstream credentials.
    pub config: Arc<Config>,
    /// System instruction prepended to every conversation.
    pub prompt: Arc<SystemPrompt>,
    /// Shared outbound HTTP client.
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(config: Config, prompt: SystemPrompt) -> Self {
        Self {
            config: Arc::new(config),
            prompt: Arc::new(prompt),
            http: build_http_client(),
        }
    }
}

/// Maximum request body size (2 MiB).
const MAX_REQUEST_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Connect timeout for upstream providers. There is no overall timeout since
/// completions stream for as long as the model keeps talking.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

fn build_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .user_agent(concat!("triage-server/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_default()
}

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
///
/// The CORS layer answers every `OPTIONS` request with an empty 200 and adds
/// `Access-Control-Allow-Origin: *` to every response.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/triage-chat", post(api_chat::triage_chat_handler))
        .route(
            "/trigger-emergency",
            post(api_emergency::trigger_emergency_handler),
        )
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(Extension(Arc::new(state)))
}
