//! Configuration for the vidchat service.
//!
//! Components never read the process environment themselves: the bootstrap builds an
//! [`AppConfig`] (usually via [`AppConfig::from_env`]) and hands the relevant section
//! to each component.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Default context budget in characters.
pub const DEFAULT_MAX_CONTEXT_CHARS: usize = 10_000;

/// Default server port.
pub const DEFAULT_PORT: u16 = 3000;

/// Default Gemini model.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";

/// Default Ollama model.
pub const DEFAULT_OLLAMA_MODEL: &str = "mistral:7b-instruct-q8_0";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A value is out of range or inconsistent.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// An environment variable could not be parsed.
    #[error("invalid value for {name}: {value}")]
    InvalidEnv {
        /// Variable name.
        name: &'static str,
        /// Raw value found.
        value: String,
    },
    /// A base URL is malformed.
    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
    /// A built-in pattern failed to compile.
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),
}

/// Top-level configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP server settings.
    pub server: ServerConfig,
    /// Chat backend and session settings.
    pub chat: ChatConfig,
    /// YouTube provider settings.
    pub youtube: YoutubeConfig,
}

impl AppConfig {
    /// Build a configuration from `VIDCHAT_*`, `GEMINI_API_KEY` and `YOUTUBE_API_KEY`.
    ///
    /// A `.env` file in the working directory is loaded first when present.
    ///
    /// # Errors
    /// Returns an error if a variable cannot be parsed or the result is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!("Loaded environment from {}", path.display());
        }

        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a configuration from variables resolved by `lookup`.
    ///
    /// # Errors
    /// Returns an error if a variable cannot be parsed or the result is invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(port) = env_parse(&lookup, "VIDCHAT_PORT")? {
            config.server.port = port;
        }
        if let Some(backend) = env_parse::<BackendKind, _>(&lookup, "VIDCHAT_BACKEND")? {
            config.chat.backend = backend;
            config.chat.model = backend.default_model().to_string();
        }
        if let Some(model) = lookup("VIDCHAT_MODEL") {
            config.chat.model = model;
        }
        if let Some(base_url) = lookup("VIDCHAT_BASE_URL") {
            config.chat.base_url = Some(base_url);
        }
        if let Some(max_chars) = env_parse(&lookup, "VIDCHAT_MAX_CONTEXT_CHARS")? {
            config.chat.max_context_chars = max_chars;
        }
        if let Some(secs) = env_parse(&lookup, "VIDCHAT_TURN_TIMEOUT_SECS")? {
            config.chat.turn_timeout = Duration::from_secs(secs);
        }
        if let Some(max_sessions) = env_parse(&lookup, "VIDCHAT_MAX_SESSIONS")? {
            config.chat.max_sessions = max_sessions;
        }
        config.chat.api_key = lookup("GEMINI_API_KEY");
        config.youtube.api_key = lookup("YOUTUBE_API_KEY");

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if any values are out of range or invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chat.max_context_chars == 0 {
            return Err(ConfigError::Invalid(
                "chat.max_context_chars must be > 0".to_string(),
            ));
        }

        if self.chat.max_sessions == 0 {
            return Err(ConfigError::Invalid(
                "chat.max_sessions must be > 0".to_string(),
            ));
        }

        if self.chat.model.trim().is_empty() {
            return Err(ConfigError::Invalid("chat.model must not be empty".to_string()));
        }

        if self.chat.turn_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "chat.turn_timeout must be > 0".to_string(),
            ));
        }

        if !(self.chat.temperature.is_finite() && self.chat.temperature >= 0.0) {
            return Err(ConfigError::Invalid(
                "chat.temperature must be a finite value >= 0".to_string(),
            ));
        }

        if let Some(base_url) = &self.chat.base_url {
            Url::parse(base_url)?;
        }

        Ok(())
    }
}

fn env_parse<T, F>(lookup: &F, name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { name, value }),
        None => Ok(None),
    }
}

/// HTTP server settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listening port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: DEFAULT_PORT }
    }
}

/// Generative backend selector.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Google Gemini `generateContent`.
    #[default]
    Gemini,
    /// Ollama through Rig.
    Ollama,
}

impl BackendKind {
    /// Model used when none is configured.
    #[must_use]
    pub const fn default_model(self) -> &'static str {
        match self {
            Self::Gemini => DEFAULT_GEMINI_MODEL,
            Self::Ollama => DEFAULT_OLLAMA_MODEL,
        }
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "gemini" => Ok(Self::Gemini),
            "ollama" => Ok(Self::Ollama),
            _ => Err(value.to_string()),
        }
    }
}

/// Chat backend and session settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Which backend to use.
    pub backend: BackendKind,
    /// Model name for the backend.
    pub model: String,
    /// API key (Gemini only).
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Optional custom base URL.
    pub base_url: Option<String>,
    /// Sampling temperature.
    pub temperature: f64,
    /// Grounding context budget in characters.
    pub max_context_chars: usize,
    /// Caller-level turn timeout.
    #[serde(with = "duration_serde")]
    pub turn_timeout: Duration,
    /// Maximum number of live sessions kept in memory.
    pub max_sessions: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Gemini,
            model: DEFAULT_GEMINI_MODEL.to_string(),
            api_key: None,
            base_url: None,
            temperature: 0.4,
            max_context_chars: DEFAULT_MAX_CONTEXT_CHARS,
            turn_timeout: Duration::from_secs(120),
            max_sessions: 256,
        }
    }
}

/// YouTube provider settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct YoutubeConfig {
    /// YouTube Data API v3 key, required for metadata.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Preferred caption language.
    pub language: String,
    /// Request timeout.
    #[serde(with = "duration_serde")]
    pub request_timeout: Duration,
    /// Connection timeout.
    #[serde(with = "duration_serde")]
    pub connect_timeout: Duration,
}

impl Default for YoutubeConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            language: "en".to_string(),
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Serde module for Duration serialization.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
