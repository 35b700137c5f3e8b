//! Settings for the `triage-chat` front-end, read from the environment.

use triage_types::DEFAULT_LANGUAGE;

pub const DEFAULT_RELAY_URL: &str = "http://127.0.0.1:3000";
const DEFAULT_LOG_LEVEL: &str = "warn";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL of the relay server.
    pub relay_url: String,
    /// Initial language tag for voice input and output.
    pub language: String,
    /// Command line of the speech recognizer; voice input is disabled when
    /// unset.
    pub stt_command: Option<String>,
    pub log_level: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relay_url: DEFAULT_RELAY_URL.to_string(),
            language: DEFAULT_LANGUAGE.to_string(),
            stt_command: None,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl ClientConfig {
    /// Reads the process environment.
    ///
    /// - `TRIAGE_RELAY_URL` overrides the relay base URL
    /// - `TRIAGE_LANG` sets the initial language
    /// - `TRIAGE_STT_COMMAND` enables voice input through that command
    /// - `TRIAGE_LOG_LEVEL` sets the tracing filter
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let set = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(url) = set("TRIAGE_RELAY_URL") {
            config.relay_url = url;
        }
        if let Some(language) = set("TRIAGE_LANG") {
            config.language = language;
        }
        config.stt_command = set("TRIAGE_STT_COMMAND");
        if let Some(level) = set("TRIAGE_LOG_LEVEL") {
            config.log_level = level;
        }
        config
    }
}
