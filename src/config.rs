//! Configuration types for the tutor client.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Result, TutorError};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TutorConfig {
    /// Answer backend endpoints and transport settings.
    pub api: ApiConfig,
    /// Chat defaults (mode, style, limits).
    pub chat: ChatConfig,
    /// Transcript persistence settings.
    pub session: SessionConfig,
    /// Speech dictation timers and recognition settings.
    pub dictation: DictationConfig,
}

/// Answer backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the backend API (no trailing path segments for endpoints).
    pub base_url: String,
    /// Streaming turn endpoint.
    pub stream_path: String,
    /// Non-streaming fallback chat endpoint.
    pub chat_path: String,
    /// Credential verification endpoint.
    pub verify_path: String,
    /// Backend health endpoint.
    pub health_path: String,
    /// Backend rate usage endpoint.
    pub rate_status_path: String,
    /// TCP connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Use the non-streaming endpoint when the streaming one answers 503.
    pub fallback_on_unavailable: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api".to_owned(),
            stream_path: "/v2/chat/stream".to_owned(),
            chat_path: "/chat".to_owned(),
            verify_path: "/llm/verify".to_owned(),
            health_path: "/v2/health".to_owned(),
            rate_status_path: "/v2/rate-status".to_owned(),
            connect_timeout_secs: 10,
            fallback_on_unavailable: true,
        }
    }
}

/// How the tutor answers.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TeachingMode {
    /// Guided (Socratic) answers with the hint ladder.
    Teach,
    /// Direct answers.
    #[default]
    Fix,
}

impl TeachingMode {
    /// Wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Teach => "teach",
            Self::Fix => "fix",
        }
    }
}

impl std::str::FromStr for TeachingMode {
    type Err = TutorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "teach" => Ok(Self::Teach),
            "fix" => Ok(Self::Fix),
            other => Err(TutorError::Config(format!("unknown teaching mode: {other}"))),
        }
    }
}

/// Tone of the answers.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStyle {
    /// Beginner-friendly.
    #[default]
    Casual,
    /// Concise.
    Direct,
}

impl ResponseStyle {
    /// Wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Casual => "casual",
            Self::Direct => "direct",
        }
    }
}

/// Chat behaviour configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Initial interaction mode.
    pub teaching_mode: TeachingMode,
    /// Initial response style.
    pub response_style: ResponseStyle,
    /// How many prior messages are sent as history with each turn.
    pub max_history_messages: usize,
    /// Maximum accepted question length in characters.
    pub max_message_chars: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            teaching_mode: TeachingMode::default(),
            response_style: ResponseStyle::default(),
            max_history_messages: 10,
            max_message_chars: 1000,
        }
    }
}

/// Transcript persistence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Maximum number of messages kept per lecture.
    pub max_messages: usize,
    /// Directory for durable storage (preferences).
    pub data_dir: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_messages: 50,
            data_dir: default_data_dir(),
        }
    }
}

/// Dictation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DictationConfig {
    /// Silence after the last recognition update that ends dictation.
    pub silence_timeout_ms: u64,
    /// Period of forced recognizer restarts during continuous listening.
    pub watchdog_interval_ms: u64,
    /// Delay before restarting after a recoverable failure.
    pub restart_delay_ms: u64,
    /// How long the transient "didn't catch that" hint stays visible.
    pub hint_clear_ms: u64,
    /// Maximum wait for late results after a stop.
    pub finalize_timeout_ms: u64,
    /// Consecutive recoverable failures tolerated before giving up.
    pub max_recoverable_restarts: u32,
    /// BCP-47 recognition language.
    pub language: String,
    /// Continuous (vs. single-shot) recognition.
    pub continuous: bool,
    /// Candidate interpretations requested per final result.
    pub max_alternatives: u32,
}

impl Default for DictationConfig {
    fn default() -> Self {
        Self {
            silence_timeout_ms: 3500,
            watchdog_interval_ms: 10_000,
            restart_delay_ms: 300,
            hint_clear_ms: 2000,
            finalize_timeout_ms: 1500,
            max_recoverable_restarts: 3,
            language: "en-US".to_owned(),
            continuous: true,
            max_alternatives: 3,
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("lecture-tutor"))
        .unwrap_or_else(|| PathBuf::from("/tmp").join("lecture-tutor"))
}

impl TutorConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content).map_err(|e| TutorError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| TutorError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `~/.config/lecture-tutor/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("lecture-tutor").join("config.toml")
        } else if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("lecture-tutor")
                .join("config.toml")
        } else {
            PathBuf::from("/tmp/lecture-tutor-config/config.toml")
        }
    }

    /// Reject values that would make the client misbehave.
    ///
    /// # Errors
    ///
    /// Returns [`TutorError::Config`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.api.base_url.trim().is_empty() {
            return Err(TutorError::Config("api.base_url must not be empty".into()));
        }
        if self.session.max_messages == 0 {
            return Err(TutorError::Config("session.max_messages must be > 0".into()));
        }
        if self.chat.max_message_chars == 0 {
            return Err(TutorError::Config("chat.max_message_chars must be > 0".into()));
        }
        let d = &self.dictation;
        for (name, value) in [
            ("dictation.silence_timeout_ms", d.silence_timeout_ms),
            ("dictation.watchdog_interval_ms", d.watchdog_interval_ms),
            ("dictation.hint_clear_ms", d.hint_clear_ms),
            ("dictation.finalize_timeout_ms", d.finalize_timeout_ms),
        ] {
            if value == 0 {
                return Err(TutorError::Config(format!("{name} must be > 0")));
            }
        }
        Ok(())
    }
}
