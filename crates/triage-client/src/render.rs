//! Splits assistant replies into prose and the embedded assessment.

use crate::markdown::{self, Block};
use crate::urgency::UrgencyCard;
use regex::Regex;
use std::sync::OnceLock;
use triage_types::{Assessment, Message, Role};

fn assessment_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```json\s*(.*?)```").expect("static regex"))
}

/// Parses the first ```` ```json ```` block in `content`.
///
/// Returns `None` when there is no block or it is not a valid assessment.
pub fn extract_assessment(content: &str) -> Option<Assessment> {
    let caps = assessment_block_re().captures(content)?;
    match serde_json::from_str(&caps[1]) {
        Ok(assessment) => Some(assessment),
        Err(e) => {
            tracing::debug!(error = %e, "ignoring malformed assessment block");
            None
        }
    }
}

/// Returns `content` without its first ```` ```json ```` block, trimmed.
pub fn strip_assessment(content: &str) -> String {
    assessment_block_re()
        .replacen(content, 1, "")
        .trim()
        .to_string()
}

/// A message prepared for display.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderedMessage {
    /// User text, shown as typed.
    User(String),
    Assistant {
        blocks: Vec<Block>,
        assessment: Option<Assessment>,
    },
}

/// Prepares a transcript entry for display. Only assistant messages are
/// read as markdown.
pub fn render_message(message: &Message) -> RenderedMessage {
    match message.role {
        Role::User => RenderedMessage::User(message.content.clone()),
        Role::Assistant => RenderedMessage::Assistant {
            blocks: markdown::parse(&strip_assessment(&message.content)),
            assessment: extract_assessment(&message.content),
        },
    }
}

impl RenderedMessage {
    pub fn assessment(&self) -> Option<&Assessment> {
        match self {
            Self::Assistant { assessment, .. } => assessment.as_ref(),
            Self::User(_) => None,
        }
    }

    /// Formats the message for a terminal, with the urgency card after the
    /// prose when an assessment is present.
    pub fn to_terminal(&self, ansi: bool) -> String {
        match self {
            Self::User(text) => format!("You: {text}"),
            Self::Assistant { blocks, assessment } => {
                let mut out = markdown::to_terminal(blocks, ansi);
                if let Some(assessment) = assessment {
                    if !out.is_empty() {
                        out.push_str("\n\n");
                    }
                    out.push_str(&UrgencyCard::new(assessment).to_terminal());
                }
                out
            }
        }
    }
}
