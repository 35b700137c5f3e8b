#![allow(dead_code)]

use axum::{body::Body, http::Request, Router};
use serde_json::Value;
use tokio::net::TcpListener;
use tower::ServiceExt;
use triage_server::config::{Config, GatewayConfig, TelephonyConfig};
use triage_server::prompt::SystemPrompt;
use triage_server::{app, AppState};

/// Serves `router` on an ephemeral local port and returns its base URL.
pub async fn spawn_upstream(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

pub fn gateway(url: &str, api_key: Option<&str>) -> GatewayConfig {
    GatewayConfig {
        url: url.to_string(),
        model: "test-model".to_string(),
        api_key: api_key.map(str::to_string),
        prompt_path: None,
    }
}

pub fn telephony(url: &str) -> TelephonyConfig {
    TelephonyConfig {
        url: url.to_string(),
        account_sid: Some("AC123".to_string()),
        auth_token: Some("token".to_string()),
        from_number: Some("+15550001111".to_string()),
        emergency_number: Some("+15550009999".to_string()),
    }
}

pub fn build_app(gateway: GatewayConfig, telephony: TelephonyConfig) -> Router {
    let config = Config {
        gateway,
        telephony,
        ..Config::default()
    };
    app(AppState::new(config, SystemPrompt::from_text("test prompt")))
}

pub async fn post_json(app: Router, uri: &str, body: &str) -> axum::response::Response {
    app.oneshot(
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
    .unwrap()
}

pub async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

pub async fn body_json(response: axum::response::Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}
