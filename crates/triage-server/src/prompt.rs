//! The system prompt sent ahead of every conversation.
//!
//! The prompt is treated as configuration: a default ships with the binary
//! and an operator can point `gateway.prompt_path` at a replacement file.

use crate::config::ConfigError;
use serde::Serialize;
use triage_types::Message;

const BUILTIN_PROMPT: &str = include_str!("../prompts/triage.md");

/// A chat message in the shape the completion API expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GatewayMessage<'a> {
    pub role: &'a str,
    pub content: &'a str,
}

#[derive(Debug, Clone)]
pub struct SystemPrompt {
    text: String,
    source: String,
}

impl SystemPrompt {
    /// The prompt compiled into the binary.
    pub fn builtin() -> Self {
        Self {
            text: BUILTIN_PROMPT.to_string(),
            source: "builtin".to_string(),
        }
    }

    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source: "inline".to_string(),
        }
    }

    /// Reads a replacement prompt from disk.
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::PromptRead {
            path: path.to_string(),
            source,
        })?;
        if text.trim().is_empty() {
            return Err(ConfigError::EmptyPrompt(path.to_string()));
        }
        Ok(Self {
            text,
            source: path.to_string(),
        })
    }

    /// Uses the file at `path` when given, the built-in prompt otherwise.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::from_file(p),
            None => Ok(Self::builtin()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Where the prompt came from, for logging.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Prepends the system instruction to a client transcript.
    pub fn compose<'a>(&'a self, transcript: &'a [Message]) -> Vec<GatewayMessage<'a>> {
        std::iter::once(GatewayMessage {
            role: "system",
            content: &self.text,
        })
        .chain(transcript.iter().map(|m| GatewayMessage {
            role: m.role.as_str(),
            content: &m.content,
        }))
        .collect()
    }
}
