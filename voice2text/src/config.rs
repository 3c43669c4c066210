//! Bot configuration.
//!
//! Configuration lives in `~/.voice2text/config.json`. Every field has a
//! default, so an empty file (or none at all) yields a runnable setup as long
//! as the bot token and API key come from the environment.

use crate::error::{ConfigError, ConfigResult};
use crate::models::MAX_CANDIDATE_LANGUAGES;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Environment variable holding the Telegram bot token.
pub const TELEGRAM_TOKEN_ENV: &str = "TELEGRAM_BOT_TOKEN";

/// Environment variable holding the transcription API key.
pub const API_KEY_ENV: &str = "GROQ_API_KEY";

/// Default OpenAI-compatible transcription endpoint.
pub const DEFAULT_API_BASE: &str = "https://api.groq.com/openai/v1";

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Telegram adapter settings.
    pub telegram: TelegramConfig,
    /// Speech engine and model registry settings.
    pub transcription: TranscriptionConfig,
    /// Reaction control settings.
    pub controls: ControlsConfig,
    /// Event handling settings.
    pub gateway: GatewaySettings,
}

/// Telegram adapter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Whether the adapter is started.
    pub enabled: bool,
    /// Bot token; falls back to `TELEGRAM_BOT_TOKEN`.
    pub token: Option<String>,
    /// User ids allowed to use the bot. Empty means everyone.
    pub allow_from: Vec<String>,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            token: None,
            allow_from: Vec::new(),
        }
    }
}

impl TelegramConfig {
    /// Token from the file, or from the environment.
    #[must_use]
    pub fn resolved_token(&self) -> Option<String> {
        self.token
            .clone()
            .or_else(|| std::env::var(TELEGRAM_TOKEN_ENV).ok())
    }
}

/// One registered recognition model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Id shown to users and used in selections.
    pub id: String,
    /// Model name sent to the engine.
    pub engine_model: String,
    /// Inference device the model runs on.
    #[serde(default = "default_device")]
    pub device: String,
}

impl ModelConfig {
    /// Create a model entry on the default device.
    pub fn new(id: impl Into<String>, engine_model: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            engine_model: engine_model.into(),
            device: default_device(),
        }
    }
}

fn default_device() -> String {
    "remote".to_string()
}

/// Speech engine and model registry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    /// Base URL of the OpenAI-compatible API.
    pub api_base: String,
    /// API key; falls back to `GROQ_API_KEY`.
    pub api_key: Option<String>,
    /// Model used for first transcriptions and language detection.
    pub default_model: String,
    /// Registered models, in display order.
    pub models: Vec<ModelConfig>,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: None,
            default_model: "turbo".to_string(),
            models: vec![
                ModelConfig::new("turbo", "whisper-large-v3-turbo"),
                ModelConfig::new("large", "whisper-large-v3"),
            ],
        }
    }
}

impl TranscriptionConfig {
    /// API key from the file, or from the environment.
    #[must_use]
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key.clone().or_else(|| std::env::var(API_KEY_ENV).ok())
    }
}

/// Reaction control settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlsConfig {
    /// Emoji acting as the delete control.
    pub delete_emoji: String,
    /// Emoji acting as the configure control.
    pub configure_emoji: String,
    /// Seconds before the bot withdraws its own affordance reactions.
    /// Zero keeps them forever.
    pub affordance_ttl_secs: u64,
    /// Maximum number of candidate languages offered.
    pub max_candidates: usize,
}

impl Default for ControlsConfig {
    fn default() -> Self {
        Self {
            delete_emoji: "👎".to_string(),
            configure_emoji: "✍".to_string(),
            affordance_ttl_secs: 60,
            max_candidates: MAX_CANDIDATE_LANGUAGES,
        }
    }
}

impl ControlsConfig {
    /// Affordance lifetime, if any.
    #[must_use]
    pub const fn affordance_ttl(&self) -> Option<Duration> {
        if self.affordance_ttl_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.affordance_ttl_secs))
        }
    }
}

/// Event handling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    /// Maximum events handled concurrently.
    pub max_in_flight: usize,
    /// Capacity of the inbound event queue.
    pub queue_capacity: usize,
    /// Directory for staged attachments. A temporary one when unset.
    pub staging_dir: Option<PathBuf>,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            max_in_flight: 8,
            queue_capacity: crate::bus::DEFAULT_QUEUE_CAPACITY,
            staging_dir: None,
        }
    }
}

impl BotConfig {
    /// Check the invariants the rest of the bot relies on.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first problem found.
    pub fn validate(&self) -> ConfigResult<()> {
        let t = &self.transcription;
        if t.models.is_empty() {
            return Err(ConfigError::invalid("no models configured"));
        }
        if !t.models.iter().any(|m| m.id == t.default_model) {
            return Err(ConfigError::invalid(format!(
                "default model '{}' is not registered",
                t.default_model
            )));
        }
        let device = &t.models[0].device;
        if let Some(other) = t.models.iter().find(|m| &m.device != device) {
            return Err(ConfigError::invalid(format!(
                "model '{}' runs on '{}' but '{}' runs on '{device}'",
                other.id, other.device, t.models[0].id
            )));
        }
        let c = &self.controls;
        if c.max_candidates == 0 || c.max_candidates > MAX_CANDIDATE_LANGUAGES {
            return Err(ConfigError::invalid(format!(
                "max_candidates must be between 1 and {MAX_CANDIDATE_LANGUAGES}"
            )));
        }
        if c.delete_emoji == c.configure_emoji {
            return Err(ConfigError::invalid(
                "delete and configure emoji must differ",
            ));
        }
        if self.gateway.max_in_flight == 0 {
            return Err(ConfigError::invalid("max_in_flight must be at least 1"));
        }
        Ok(())
    }
}

/// Directory holding the configuration file.
#[must_use]
pub fn config_dir() -> PathBuf {
    dirs_next::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".voice2text")
}

/// Default configuration file path.
#[must_use]
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

/// Load the configuration from the default path.
///
/// A missing file yields the defaults.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read, parsed or
/// validated.
pub async fn load_config() -> ConfigResult<BotConfig> {
    let path = config_path();
    if !path.exists() {
        debug!(path = %path.display(), "no config file, using defaults");
        let config = BotConfig::default();
        config.validate()?;
        return Ok(config);
    }
    load_config_from(&path).await
}

/// Load and validate the configuration at `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be read, parsed or validated.
pub async fn load_config_from(path: &Path) -> ConfigResult<BotConfig> {
    let content = tokio::fs::read_to_string(path).await?;
    let config: BotConfig = serde_json::from_str(&content)?;
    config.validate()?;
    debug!(path = %path.display(), "config loaded");
    Ok(config)
}

/// Write `config` to `path`, creating parent directories.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub async fn save_config(config: &BotConfig, path: &Path) -> ConfigResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let content = serde_json::to_string_pretty(config)?;
    tokio::fs::write(path, content).await?;
    Ok(())
}

/// Write the default configuration to the default path.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub async fn init_config() -> ConfigResult<PathBuf> {
    let path = config_path();
    save_config(&BotConfig::default(), &path).await?;
    info!(path = %path.display(), "config initialized");
    Ok(path)
}
