//! Shared types for the triage assistant.
//!
//! This crate holds the conversation and assessment data model used by both
//! the relay server and the client. Nothing here is persisted: messages and
//! assessments live only as long as the client session that owns them.

pub mod language;

pub use language::{Language, DEFAULT_LANGUAGE, LANGUAGES};

use serde::{Deserialize, Deserializer, Serialize};

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person describing their symptoms.
    User,
    /// The language model conducting the interview.
    Assistant,
}

impl Role {
    /// Returns the wire label for this role.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// A single entry in the conversation transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Care level recommended by an assessment, from most to least severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrgencyLevel {
    /// Life-threatening; call emergency services.
    Emergency,
    /// Needs a physical examination within 24-48 hours.
    Clinic,
    /// Can be handled in a virtual consultation.
    Telehealth,
    /// Can be managed at home.
    #[serde(rename = "selfcare")]
    SelfCare,
}

impl UrgencyLevel {
    /// Returns the canonical wire label for this level.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Emergency => "emergency",
            Self::Clinic => "clinic",
            Self::Telehealth => "telehealth",
            Self::SelfCare => "selfcare",
        }
    }

    /// Interprets a raw urgency value, falling back to [`UrgencyLevel::SelfCare`]
    /// for anything missing or unrecognised.
    pub fn from_raw_or_default(raw: Option<&str>) -> Self {
        raw.and_then(|s| s.parse().ok()).unwrap_or(Self::SelfCare)
    }
}

impl std::fmt::Display for UrgencyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for UrgencyLevel {
    type Err = ParseUrgencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "emergency" => Ok(Self::Emergency),
            "clinic" => Ok(Self::Clinic),
            "telehealth" => Ok(Self::Telehealth),
            "selfcare" => Ok(Self::SelfCare),
            _ => Err(ParseUrgencyError(s.to_string())),
        }
    }
}

/// Error returned when an urgency label is not one of the four known levels.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown urgency level: {0}")]
pub struct ParseUrgencyError(pub String);

/// Reads an explicit `null` as the field's default.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Structured triage verdict embedded in an assistant message.
///
/// The model is only loosely bound to the schema, so every field tolerates
/// absence or `null`. `urgency` is kept as the raw string the model produced;
/// use [`Assessment::urgency_level`] to interpret it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Assessment {
    #[serde(default)]
    pub urgency: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub confidence: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub red_flags: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub symptoms_analyzed: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub reasoning: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub recommendations: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub trigger_emergency_call: bool,
}

impl Assessment {
    /// Urgency level for display, defaulting to self-care.
    pub fn urgency_level(&self) -> UrgencyLevel {
        UrgencyLevel::from_raw_or_default(self.urgency.as_deref())
    }

    /// Whether the raw urgency value named one of the four known levels.
    pub fn urgency_recognised(&self) -> bool {
        self.urgency
            .as_deref()
            .is_some_and(|s| s.parse::<UrgencyLevel>().is_ok())
    }

    /// True only when the model asked for a call *and* the urgency is
    /// exactly the emergency level.
    pub fn requests_emergency_call(&self) -> bool {
        self.trigger_emergency_call && self.urgency.as_deref() == Some("emergency")
    }
}
