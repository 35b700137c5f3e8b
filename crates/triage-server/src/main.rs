//! Triage relay server binary.
//!
//! Starts an axum HTTP server with structured logging and graceful shutdown
//! on SIGTERM/SIGINT.

use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use triage_server::config::{self, Config};
use triage_server::prompt::SystemPrompt;
use triage_server::{app, AppState};

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("TRIAGE_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

/// Warns about relays that will refuse requests. Missing credentials are
/// enforced per request so one misconfigured provider does not take down
/// the other endpoint.
fn report_credentials(config: &Config) {
    if let Err(e) = config.gateway.credentials() {
        tracing::warn!(error = %e, "chat relay will reject requests");
    }
    if let Err(e) = config.telephony.credentials() {
        tracing::warn!(error = %e, "emergency call relay will reject requests");
    }
}

#[tokio::main]
async fn main() {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("config.toml"));

    let config = config::load_config(selected_config_path)
        .expect("invalid triage-server configuration");

    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );

    let prompt = SystemPrompt::load(config.gateway.prompt_path.as_deref())
        .expect("could not load the system prompt named by gateway.prompt_path");
    tracing::info!(source = prompt.source(), "loaded system prompt");

    report_credentials(&config);

    let addr = SocketAddr::new(config.server.host, config.server.port);
    let app = app(AppState::new(config, prompt));

    tracing::info!(%addr, "starting triage relay server");

    let listener = TcpListener::bind(addr)
        .await
        .expect("could not bind the relay listen address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("relay server stopped with an error");

    tracing::info!("triage relay server shut down");
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, initiating graceful shutdown"); }
        () = terminate => { tracing::info!("received SIGTERM, initiating graceful shutdown"); }
    }
}
