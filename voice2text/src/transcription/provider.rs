//! Speech engine trait and common types.

use crate::error::TranscribeResult;
use crate::models::ModelDescriptor;
use async_trait::async_trait;
use std::path::Path;

/// Transcription result with metadata.
#[derive(Debug, Clone)]
pub struct TranscriptionResult {
    /// The transcribed text.
    pub text: String,
    /// Duration of the audio in seconds.
    pub duration: Option<f64>,
    /// Detected or requested language.
    pub language: Option<String>,
}

/// Probability that a clip is spoken in `code`, as reported by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct LanguageProbability {
    /// Language code.
    pub code: String,
    /// Probability in `0.0..=1.0`.
    pub probability: f32,
}

/// External speech-recognition engine.
///
/// Calls are long-running from the caller's point of view. The
/// [`TranscriptionGateway`](super::TranscriptionGateway) makes sure only one
/// call at a time uses a given model.
#[async_trait]
pub trait SpeechEngine: Send + Sync {
    /// Engine name.
    fn name(&self) -> &str;

    /// Whether the engine is configured and ready.
    fn is_available(&self) -> bool;

    /// Transcribe the audio at `audio`. With no `language` the engine picks
    /// the most likely one itself.
    async fn transcribe(
        &self,
        audio: &Path,
        model: &ModelDescriptor,
        language: Option<&str>,
    ) -> TranscribeResult<TranscriptionResult>;

    /// Language probabilities for the audio at `audio`, in engine order.
    async fn detect_languages(
        &self,
        audio: &Path,
        model: &ModelDescriptor,
    ) -> TranscribeResult<Vec<LanguageProbability>>;
}

/// Supported audio formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    /// MP3 audio.
    Mp3,
    /// MP4/M4A audio.
    Mp4,
    /// MPEG audio.
    Mpeg,
    /// MPGA audio.
    Mpga,
    /// OGG audio (voice messages on most chat platforms).
    Ogg,
    /// WAV audio.
    Wav,
    /// WebM audio.
    Webm,
    /// FLAC audio.
    Flac,
}

impl AudioFormat {
    /// Detect format from file extension.
    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "mp3" => Some(Self::Mp3),
            "mp4" | "m4a" => Some(Self::Mp4),
            "mpeg" => Some(Self::Mpeg),
            "mpga" => Some(Self::Mpga),
            "ogg" | "oga" | "opus" => Some(Self::Ogg),
            "wav" => Some(Self::Wav),
            "webm" => Some(Self::Webm),
            "flac" => Some(Self::Flac),
            _ => None,
        }
    }

    /// Detect format from a path's extension.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// Get the MIME type for this format.
    #[must_use]
    pub const fn mime_type(self) -> &'static str {
        match self {
            Self::Mp4 => "audio/mp4",
            Self::Mp3 | Self::Mpeg | Self::Mpga => "audio/mpeg",
            Self::Ogg => "audio/ogg",
            Self::Wav => "audio/wav",
            Self::Webm => "audio/webm",
            Self::Flac => "audio/flac",
        }
    }
}
