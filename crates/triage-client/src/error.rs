use thiserror::Error;
use triage_voice::VoiceError;

/// Errors surfaced by the triage client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The relay answered with a non-success status. `message` is the
    /// relay's own `error` text when it sent one.
    #[error("{message}")]
    Relay { status: u16, message: String },

    #[error("could not reach the relay: {0}")]
    Network(#[from] reqwest::Error),

    #[error("stream interrupted: {0}")]
    Stream(String),

    #[error("unexpected relay response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error(transparent)]
    Voice(#[from] VoiceError),

    #[error("unsupported language: {0}")]
    UnknownLanguage(String),
}

impl ClientError {
    /// HTTP status reported by the relay, if the failure came from one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Relay { status, .. } => Some(*status),
            _ => None,
        }
    }
}
