//! Server configuration loading from file and environment variables.

use serde::Deserialize;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Upstream language-model gateway used by the chat relay.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Telephony provider used by the emergency call relay.
    #[serde(default)]
    pub telephony: TelephonyConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "triage_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

/// AI gateway settings.
#[derive(Clone, Deserialize)]
pub struct GatewayConfig {
    /// Base URL; `/v1/chat/completions` is appended.
    #[serde(default = "default_gateway_url")]
    pub url: String,

    /// Model identifier sent with every completion request.
    #[serde(default = "default_gateway_model")]
    pub model: String,

    /// Bearer credential for the gateway.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Optional file replacing the built-in system prompt.
    #[serde(default)]
    pub prompt_path: Option<String>,
}

/// Telephony provider settings.
#[derive(Clone, Deserialize)]
pub struct TelephonyConfig {
    /// Base URL of the provider's REST API.
    #[serde(default = "default_telephony_url")]
    pub url: String,

    #[serde(default)]
    pub account_sid: Option<String>,

    #[serde(default)]
    pub auth_token: Option<String>,

    /// Number the call is placed from.
    #[serde(default)]
    pub from_number: Option<String>,

    /// Number that receives emergency alerts.
    #[serde(default)]
    pub emergency_number: Option<String>,
}

/// Gateway credentials, present and non-empty.
#[derive(Clone, Copy)]
pub struct GatewayCredentials<'a> {
    pub api_key: &'a str,
}

/// Telephony credentials, all present and non-empty.
#[derive(Clone, Copy)]
pub struct TelephonyCredentials<'a> {
    pub account_sid: &'a str,
    pub auth_token: &'a str,
    pub from_number: &'a str,
    pub emergency_number: &'a str,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_gateway_url() -> String {
    "https://ai.gateway.lovable.dev".to_string()
}

fn default_gateway_model() -> String {
    "google/gemini-3-flash-preview".to_string()
}

fn default_telephony_url() -> String {
    "https://api.twilio.com".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: default_gateway_url(),
            model: default_gateway_model(),
            api_key: None,
            prompt_path: None,
        }
    }
}

impl Default for TelephonyConfig {
    fn default() -> Self {
        Self {
            url: default_telephony_url(),
            account_sid: None,
            auth_token: None,
            from_number: None,
            emergency_number: None,
        }
    }
}

fn redacted(value: &Option<String>) -> &'static str {
    if value.is_some() {
        "[REDACTED]"
    } else {
        "<unset>"
    }
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("url", &self.url)
            .field("model", &self.model)
            .field("api_key", &redacted(&self.api_key))
            .field("prompt_path", &self.prompt_path)
            .finish()
    }
}

impl fmt::Debug for TelephonyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelephonyConfig")
            .field("url", &self.url)
            .field("account_sid", &self.account_sid)
            .field("auth_token", &redacted(&self.auth_token))
            .field("from_number", &self.from_number)
            .field("emergency_number", &self.emergency_number)
            .finish()
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

impl GatewayConfig {
    /// Returns the gateway credential or a [`ConfigError::MissingCredential`].
    pub fn credentials(&self) -> Result<GatewayCredentials<'_>, ConfigError> {
        match present(&self.api_key) {
            Some(api_key) => Ok(GatewayCredentials { api_key }),
            None => Err(ConfigError::MissingCredential {
                service: "AI gateway",
                missing: vec!["AI_GATEWAY_API_KEY"],
            }),
        }
    }

    pub fn completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.url.trim_end_matches('/'))
    }
}

impl TelephonyConfig {
    /// Returns all four telephony settings or a
    /// [`ConfigError::MissingCredential`] naming every one that is absent.
    pub fn credentials(&self) -> Result<TelephonyCredentials<'_>, ConfigError> {
        let fields = [
            ("TWILIO_SID", present(&self.account_sid)),
            ("TWILIO_AUTH", present(&self.auth_token)),
            ("TWILIO_NUMBER", present(&self.from_number)),
            ("EMERGENCY_NUMBER", present(&self.emergency_number)),
        ];
        match fields {
            [
                (_, Some(account_sid)),
                (_, Some(auth_token)),
                (_, Some(from_number)),
                (_, Some(emergency_number)),
            ] => {
                Ok(TelephonyCredentials {
                    account_sid,
                    auth_token,
                    from_number,
                    emergency_number,
                })
            }
            _ => Err(ConfigError::MissingCredential {
                service: "Telephony",
                missing: fields
                    .iter()
                    .filter(|(_, value)| value.is_none())
                    .map(|(name, _)| *name)
                    .collect(),
            }),
        }
    }

    pub fn calls_url(&self, account_sid: &str) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Calls.json",
            self.url.trim_end_matches('/'),
            account_sid
        )
    }
}

/// Errors that can occur when loading or using configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// A credential required by a relay endpoint is not set.
    #[error("{service} credentials are not configured (missing: {})", .missing.join(", "))]
    MissingCredential {
        service: &'static str,
        missing: Vec<&'static str>,
    },

    /// The system prompt file could not be read.
    #[error("failed to read system prompt {path}: {source}")]
    PromptRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The system prompt file exists but is blank.
    #[error("system prompt {0} is empty")]
    EmptyPrompt(String),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `TRIAGE_HOST` overrides `server.host`
/// - `TRIAGE_PORT` overrides `server.port`
/// - `TRIAGE_LOG_LEVEL` overrides `logging.level`
/// - `TRIAGE_LOG_JSON` overrides `logging.json` (set to "true" to enable)
/// - `AI_GATEWAY_URL`, `AI_GATEWAY_MODEL`, `AI_GATEWAY_API_KEY` and
///   `TRIAGE_PROMPT_PATH` override the `gateway` section
/// - `TWILIO_API_URL`, `TWILIO_SID`, `TWILIO_AUTH`, `TWILIO_NUMBER` and
///   `EMERGENCY_NUMBER` override the `telephony` section
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

/// Applies environment overrides using `lookup` to read variables.
pub fn apply_env_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(host) = lookup("TRIAGE_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Some(port) = lookup("TRIAGE_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Some(level) = lookup("TRIAGE_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = lookup("TRIAGE_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }

    if let Some(url) = lookup("AI_GATEWAY_URL") {
        config.gateway.url = url;
    }
    if let Some(model) = lookup("AI_GATEWAY_MODEL") {
        config.gateway.model = model;
    }
    if let Some(key) = lookup("AI_GATEWAY_API_KEY") {
        config.gateway.api_key = Some(key);
    }
    if let Some(path) = lookup("TRIAGE_PROMPT_PATH") {
        config.gateway.prompt_path = Some(path);
    }

    if let Some(url) = lookup("TWILIO_API_URL") {
        config.telephony.url = url;
    }
    if let Some(sid) = lookup("TWILIO_SID") {
        config.telephony.account_sid = Some(sid);
    }
    if let Some(token) = lookup("TWILIO_AUTH") {
        config.telephony.auth_token = Some(token);
    }
    if let Some(number) = lookup("TWILIO_NUMBER") {
        config.telephony.from_number = Some(number);
    }
    if let Some(number) = lookup("EMERGENCY_NUMBER") {
        config.telephony.emergency_number = Some(number);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let config = load_config(path.to_str()).unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.gateway.model, "google/gemini-3-flash-preview");
    }

    #[test]
    fn file_values_are_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[server]
port = 8080

[gateway]
url = "http://127.0.0.1:9999/"
api_key = "k"

[telephony]
account_sid = "AC1"
"#,
        )
        .unwrap();

        let mut config: Config = toml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        apply_env_overrides(&mut config, env(&[]));

        assert_eq!(config.server.port, 8080);
        assert_eq!(
            config.gateway.completions_url(),
            "http://127.0.0.1:9999/v1/chat/completions"
        );
        assert_eq!(config.gateway.credentials().unwrap().api_key, "k");
        assert_eq!(config.telephony.account_sid.as_deref(), Some("AC1"));
    }

    #[test]
    fn invalid_toml_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server\nport = ").unwrap();
        assert!(matches!(
            load_config(path.to_str()),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = Config::default();
        apply_env_overrides(
            &mut config,
            env(&[
                ("TRIAGE_PORT", "4000"),
                ("TRIAGE_LOG_JSON", "1"),
                ("AI_GATEWAY_API_KEY", "secret"),
                ("TWILIO_SID", "AC123"),
            ]),
        );
        assert_eq!(config.server.port, 4000);
        assert!(config.logging.json);
        assert_eq!(config.gateway.api_key.as_deref(), Some("secret"));
        assert_eq!(config.telephony.account_sid.as_deref(), Some("AC123"));
    }

    #[test]
    fn missing_gateway_key_is_reported() {
        let err = GatewayConfig::default().credentials().err().unwrap();
        assert_eq!(
            err.to_string(),
            "AI gateway credentials are not configured (missing: AI_GATEWAY_API_KEY)"
        );
    }

    #[test]
    fn blank_credentials_count_as_missing() {
        let telephony = TelephonyConfig {
            account_sid: Some("AC1".into()),
            auth_token: Some("  ".into()),
            from_number: Some("+15550001".into()),
            emergency_number: None,
            ..TelephonyConfig::default()
        };
        match telephony.credentials() {
            Err(ConfigError::MissingCredential { service, missing }) => {
                assert_eq!(service, "Telephony");
                assert_eq!(missing, vec!["TWILIO_AUTH", "EMERGENCY_NUMBER"]);
            }
            _ => panic!("expected missing credentials"),
        }
    }

    #[test]
    fn complete_telephony_credentials_resolve() {
        let telephony = TelephonyConfig {
            account_sid: Some("AC1".into()),
            auth_token: Some("tok".into()),
            from_number: Some("+15550001".into()),
            emergency_number: Some("+15550002".into()),
            ..TelephonyConfig::default()
        };
        let creds = telephony.credentials().unwrap();
        assert_eq!(creds.emergency_number, "+15550002");
        assert_eq!(
            telephony.calls_url(creds.account_sid),
            "https://api.twilio.com/2010-04-01/Accounts/AC1/Calls.json"
        );
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let gateway = GatewayConfig {
            api_key: Some("super-secret".into()),
            ..GatewayConfig::default()
        };
        let rendered = format!("{:?}", gateway);
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("[REDACTED]"));
    }
}
