//! HTTP access to the two relay endpoints.
//!
//! The chat relay answers with an OpenAI-style server-sent event stream;
//! [`RelayClient`] turns it into a stream of text deltas and stops at the
//! `[DONE]` sentinel.

use crate::error::ClientError;
use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use reqwest_eventsource::{retry::Never, Event, EventSource};
use serde::Deserialize;
use serde_json::{json, Value};
use std::pin::Pin;
use std::time::Duration;
use triage_types::Message;

/// Text deltas of one streamed reply, in arrival order.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<String, ClientError>> + Send>>;

const DONE_SENTINEL: &str = "[DONE]";
const STREAM_FALLBACK_ERROR: &str = "Failed to start stream";
const CALL_FALLBACK_ERROR: &str = "Failed to trigger call";

/// Streams a model reply for a transcript.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn stream_chat(&self, messages: &[Message]) -> Result<DeltaStream, ClientError>;
}

/// Places an emergency call and returns the provider's call id.
#[async_trait]
pub trait EmergencyDispatcher: Send + Sync {
    async fn trigger_call(
        &self,
        symptoms: &[String],
        urgency: Option<&str>,
    ) -> Result<String, ClientError>;
}

#[derive(Debug, Deserialize)]
struct ChunkEvent {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}

/// Pulls the text out of one `data:` payload.
///
/// Returns `Ok(None)` for events that carry no text, such as role-only or
/// finish chunks.
pub fn parse_delta(data: &str) -> Result<Option<String>, serde_json::Error> {
    let event: ChunkEvent = serde_json::from_str(data)?;
    Ok(event
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|content| !content.is_empty()))
}

fn error_message(body: &Value, fallback: &str) -> String {
    body.get("error")
        .and_then(Value::as_str)
        .filter(|message| !message.is_empty())
        .unwrap_or(fallback)
        .to_string()
}

/// Client for a running `triage-server`.
#[derive(Debug, Clone)]
pub struct RelayClient {
    http: reqwest::Client,
    base_url: String,
}

impl RelayClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("triage-chat/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl ChatTransport for RelayClient {
    async fn stream_chat(&self, messages: &[Message]) -> Result<DeltaStream, ClientError> {
        let request = self
            .http
            .post(self.url("/triage-chat"))
            .json(&json!({ "messages": messages }));

        let mut source =
            EventSource::new(request).map_err(|e| ClientError::Stream(e.to_string()))?;
        // The relay never retries and neither does the client.
        source.set_retry_policy(Box::new(Never));

        tracing::debug!(messages = messages.len(), "opened chat stream");

        let stream = async_stream::stream! {
            while let Some(event) = source.next().await {
                match event {
                    Ok(Event::Open) => continue,
                    Ok(Event::Message(message)) => {
                        if message.data.trim() == DONE_SENTINEL {
                            break;
                        }
                        match parse_delta(&message.data) {
                            Ok(Some(delta)) => yield Ok(delta),
                            Ok(None) => {}
                            Err(e) => {
                                tracing::warn!(error = %e, "skipping unparsable stream event");
                            }
                        }
                    }
                    Err(reqwest_eventsource::Error::StreamEnded) => break,
                    Err(reqwest_eventsource::Error::InvalidStatusCode(status, response)) => {
                        let body: Value = response.json().await.unwrap_or(Value::Null);
                        yield Err(ClientError::Relay {
                            status: status.as_u16(),
                            message: error_message(&body, STREAM_FALLBACK_ERROR),
                        });
                        break;
                    }
                    Err(e) => {
                        yield Err(ClientError::Stream(e.to_string()));
                        break;
                    }
                }
            }
            source.close();
        };

        Ok(Box::pin(stream))
    }
}

#[async_trait]
impl EmergencyDispatcher for RelayClient {
    async fn trigger_call(
        &self,
        symptoms: &[String],
        urgency: Option<&str>,
    ) -> Result<String, ClientError> {
        let response = self
            .http
            .post(self.url("/trigger-emergency"))
            .json(&json!({ "symptoms": symptoms, "urgency": urgency }))
            .send()
            .await?;

        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);

        let succeeded = status.is_success() && body.get("success") == Some(&Value::Bool(true));
        match body.get("callSid").and_then(Value::as_str) {
            Some(call_sid) if succeeded => Ok(call_sid.to_string()),
            _ => Err(ClientError::Relay {
                status: status.as_u16(),
                message: error_message(&body, CALL_FALLBACK_ERROR),
            }),
        }
    }
}
