//! Chat relay: forwards the transcript to the AI gateway and streams the
//! completion back to the caller untouched.

use crate::config::ConfigError;
use crate::prompt::GatewayMessage;
use crate::AppState;
use axum::{
    body::{Body, Bytes},
    extract::Extension,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use triage_types::Message;

/// Request body for `POST /triage-chat`.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<GatewayMessage<'a>>,
    stream: bool,
}

/// Failures of the chat relay, each with its own status code.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("invalid request body: {0}")]
    InvalidBody(#[from] serde_json::Error),
    #[error("Rate limit exceeded. Please try again shortly.")]
    RateLimited,
    #[error("Service credits exhausted. Please try again later.")]
    QuotaExhausted,
    #[error("AI gateway returned status {0}")]
    Upstream(u16),
    #[error("AI gateway request failed: {0}")]
    Network(#[from] reqwest::Error),
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            RelayError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, self.to_string()),
            RelayError::QuotaExhausted => (StatusCode::PAYMENT_REQUIRED, self.to_string()),
            RelayError::Upstream(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "AI service error".to_string(),
            ),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// Handler for `POST /triage-chat`.
///
/// Responds with the gateway's `text/event-stream` body, or a JSON
/// `{ "error" }` with 429, 402 or 500.
pub async fn triage_chat_handler(
    Extension(state): Extension<Arc<AppState>>,
    body: Bytes,
) -> Result<Response, RelayError> {
    relay_chat(&state, &body).await.inspect_err(|e| {
        if !matches!(e, RelayError::RateLimited | RelayError::QuotaExhausted) {
            tracing::error!(error = %e, "triage-chat error");
        }
    })
}

async fn relay_chat(state: &AppState, body: &[u8]) -> Result<Response, RelayError> {
    let credentials = state.config.gateway.credentials()?;
    let request: ChatRequest = serde_json::from_slice(body)?;

    tracing::debug!(
        messages = request.messages.len(),
        model = %state.config.gateway.model,
        "relaying conversation to AI gateway"
    );

    let completion = CompletionRequest {
        model: &state.config.gateway.model,
        messages: state.prompt.compose(&request.messages),
        stream: true,
    };

    let upstream = state
        .http
        .post(state.config.gateway.completions_url())
        .bearer_auth(credentials.api_key)
        .json(&completion)
        .send()
        .await?;

    let status = upstream.status();
    if !status.is_success() {
        return Err(match status.as_u16() {
            429 => {
                tracing::warn!("AI gateway rate limited the request");
                RelayError::RateLimited
            }
            402 => {
                tracing::warn!("AI gateway credits exhausted");
                RelayError::QuotaExhausted
            }
            code => {
                let text = upstream.text().await.unwrap_or_default();
                tracing::error!(status = code, body = %text, "AI gateway error");
                RelayError::Upstream(code)
            }
        });
    }

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .body(Body::from_stream(upstream.bytes_stream()))
        .unwrap_or_else(|e| {
            tracing::error!(error = %e, "failed to build streaming response");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }))
}
