//! Emergency call relay: turns reported symptoms into a spoken alert and asks
//! the telephony provider to place an outbound call.

use crate::config::ConfigError;
use crate::AppState;
use axum::{
    body::Bytes,
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Phrase spoken when no usable symptom list was supplied.
pub const FALLBACK_SYMPTOMS: &str = "critical symptoms detected";

/// Urgency spoken when the caller did not name one.
pub const DEFAULT_URGENCY: &str = "emergency";

const VOICE: &str = "Polly.Joanna";

/// Request body for `POST /trigger-emergency`.
///
/// Both fields are loosely typed: the client forwards whatever the model put
/// in its assessment.
#[derive(Debug, Default, Deserialize)]
pub struct EmergencyRequest {
    #[serde(default)]
    pub symptoms: Value,
    #[serde(default)]
    pub urgency: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EmergencyResponse {
    pub success: bool,
    #[serde(rename = "callSid")]
    pub call_sid: String,
}

#[derive(Debug, Error)]
pub enum CallRelayError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("invalid request body: {0}")]
    InvalidBody(#[from] serde_json::Error),
    /// The provider rejected the call; carries its message.
    #[error("{0}")]
    Provider(String),
    #[error("telephony request failed: {0}")]
    Network(#[from] reqwest::Error),
}

impl IntoResponse for CallRelayError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({
                "success": false,
                "error": self.to_string(),
            })),
        )
            .into_response()
    }
}

/// Joins a symptom list into a spoken phrase.
///
/// Anything other than a non-empty list yields [`FALLBACK_SYMPTOMS`].
pub fn symptom_phrase(symptoms: &Value) -> String {
    match symptoms {
        Value::Array(items) if !items.is_empty() => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(", "),
        _ => FALLBACK_SYMPTOMS.to_string(),
    }
}

/// Picks the urgency to announce, defaulting to [`DEFAULT_URGENCY`].
pub fn urgency_label(urgency: Option<&Value>) -> String {
    match urgency {
        Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => DEFAULT_URGENCY.to_string(),
    }
}

fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Renders the two-paragraph alert as TwiML.
pub fn render_script(symptoms: &str, urgency: &str) -> String {
    let symptoms = escape_xml(symptoms);
    let urgency = escape_xml(urgency);
    format!(
        "<Response>\
<Say voice=\"{VOICE}\">This is an emergency alert from the MediTriage system. \
A patient has reported {symptoms}. \
The urgency level is {urgency}. \
Please respond immediately.</Say>\
<Pause length=\"1\"/>\
<Say voice=\"{VOICE}\">Repeating: Emergency alert. \
Patient symptoms include {symptoms}. \
Immediate medical attention is required.</Say>\
</Response>"
    )
}

/// Handler for `POST /trigger-emergency`.
pub async fn trigger_emergency_handler(
    Extension(state): Extension<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<EmergencyResponse>, CallRelayError> {
    place_call(&state, &body)
        .await
        .map(Json)
        .inspect_err(|e| tracing::error!(error = %e, "trigger-emergency error"))
}

async fn place_call(state: &AppState, body: &[u8]) -> Result<EmergencyResponse, CallRelayError> {
    let telephony = &state.config.telephony;
    let credentials = telephony.credentials()?;
    let request: EmergencyRequest = serde_json::from_slice(body)?;

    let symptoms = symptom_phrase(&request.symptoms);
    let urgency = urgency_label(request.urgency.as_ref());
    let script = render_script(&symptoms, &urgency);

    tracing::info!(urgency = %urgency, "requesting emergency call");

    let response = state
        .http
        .post(telephony.calls_url(credentials.account_sid))
        .basic_auth(credentials.account_sid, Some(credentials.auth_token))
        .form(&[
            ("To", credentials.emergency_number),
            ("From", credentials.from_number),
            ("Twiml", script.as_str()),
        ])
        .send()
        .await?;

    let status = response.status();
    let text = response.text().await?;
    let data: Value = serde_json::from_str(&text).unwrap_or(Value::Null);

    if !status.is_success() {
        tracing::error!(status = status.as_u16(), body = %text, "telephony provider error");
        let message = data
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("Failed to trigger call");
        return Err(CallRelayError::Provider(message.to_string()));
    }

    let call_sid = data
        .get("sid")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            CallRelayError::Provider("telephony response missing call sid".to_string())
        })?;

    tracing::info!(call_sid, "emergency call placed");
    Ok(EmergencyResponse {
        success: true,
        call_sid: call_sid.to_string(),
    })
}
