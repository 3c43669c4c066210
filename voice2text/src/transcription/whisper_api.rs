//! OpenAI-compatible Whisper HTTP engine.
//!
//! Works with any `/audio/transcriptions` endpoint; the default is Groq's
//! hosted Whisper.

use super::languages::lookup_language;
use super::provider::{AudioFormat, LanguageProbability, SpeechEngine, TranscriptionResult};
use crate::config::{DEFAULT_API_BASE, TranscriptionConfig};
use crate::error::{TranscribeResult, TranscriberError};
use crate::models::ModelDescriptor;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use std::path::Path;
use tracing::{debug, warn};

/// Whisper engine reached over HTTP.
#[derive(Debug, Clone)]
pub struct WhisperApiEngine {
    client: reqwest::Client,
    api_base: String,
    api_key: Option<String>,
}

impl WhisperApiEngine {
    /// Create an engine for `api_base` with an API key.
    #[must_use]
    pub fn new(api_base: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.into(),
            api_key: Some(api_key.into()),
        }
    }

    /// Create an engine from the transcription configuration.
    #[must_use]
    pub fn from_config(config: &TranscriptionConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: config.api_base.clone(),
            api_key: config.resolved_api_key(),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/audio/transcriptions",
            self.api_base.trim_end_matches('/')
        )
    }

    fn get_api_key(&self) -> TranscribeResult<&str> {
        self.api_key
            .as_deref()
            .ok_or(TranscriberError::MissingApiKey)
    }

    async fn request(
        &self,
        audio: &Path,
        model: &ModelDescriptor,
        language: Option<&str>,
    ) -> TranscribeResult<TranscriptionResult> {
        let api_key = self.get_api_key()?;

        if !audio.exists() {
            return Err(TranscriberError::FileNotFound(audio.display().to_string()));
        }

        let format = match audio.extension() {
            None => AudioFormat::Ogg,
            Some(ext) => AudioFormat::from_path(audio).ok_or_else(|| {
                TranscriberError::UnsupportedFormat(ext.to_string_lossy().into_owned())
            })?,
        };

        let data = tokio::fs::read(audio).await?;
        let filename = audio
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio.ogg")
            .to_string();

        debug!(
            path = %audio.display(),
            format = ?format,
            model = %model.engine_model,
            language = ?language,
            "sending audio to engine"
        );

        let file_part = Part::bytes(data)
            .file_name(filename)
            .mime_str(format.mime_type())
            .map_err(|e| TranscriberError::Request(e.to_string()))?;

        let mut form = Form::new()
            .part("file", file_part)
            .text("model", model.engine_model.clone())
            .text("response_format", "verbose_json");
        if let Some(language) = language {
            form = form.text("language", language.to_string());
        }

        let response = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {api_key}"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| TranscriberError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(TranscriberError::Api(format!("HTTP {status}: {body}")));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| TranscriberError::Request(e.to_string()))?;

        Ok(parse_verbose_json(&json))
    }
}

impl Default for WhisperApiEngine {
    fn default() -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: std::env::var(crate::config::API_KEY_ENV).ok(),
        }
    }
}

fn parse_verbose_json(json: &serde_json::Value) -> TranscriptionResult {
    TranscriptionResult {
        text: json["text"].as_str().unwrap_or("").to_string(),
        duration: json["duration"].as_f64(),
        language: json["language"].as_str().map(String::from),
    }
}

#[async_trait]
impl SpeechEngine for WhisperApiEngine {
    fn name(&self) -> &'static str {
        "whisper-api"
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn transcribe(
        &self,
        audio: &Path,
        model: &ModelDescriptor,
        language: Option<&str>,
    ) -> TranscribeResult<TranscriptionResult> {
        self.request(audio, model, language).await
    }

    /// The HTTP API reports only the single most likely language, so the
    /// result has at most one entry.
    async fn detect_languages(
        &self,
        audio: &Path,
        model: &ModelDescriptor,
    ) -> TranscribeResult<Vec<LanguageProbability>> {
        let result = self.request(audio, model, None).await?;
        let Some(reported) = result.language else {
            warn!("engine reported no language");
            return Ok(Vec::new());
        };
        Ok(lookup_language(&reported)
            .map(|lang| LanguageProbability {
                code: lang.code,
                probability: 1.0,
            })
            .into_iter()
            .collect())
    }
}
