//! Speech-to-text support.
//!
//! [`SpeechEngine`] is the engine seam; [`TranscriptionGateway`] puts the
//! model registry and per-model locking in front of it.

mod gateway;
mod languages;
mod provider;
mod whisper_api;

pub use gateway::TranscriptionGateway;
pub use languages::{
    LanguageCode, all_languages, fill_candidates, language_label, lookup_language, rank_languages,
};
pub use provider::{AudioFormat, LanguageProbability, SpeechEngine, TranscriptionResult};
pub use whisper_api::WhisperApiEngine;
