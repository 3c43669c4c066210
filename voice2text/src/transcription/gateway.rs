//! Uniform access to the speech engine.

use super::languages::{LanguageCode, fill_candidates, rank_languages};
use super::provider::SpeechEngine;
use crate::error::TranscribeResult;
use crate::models::{MAX_CANDIDATE_LANGUAGES, ModelDescriptor, ModelRegistry};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Wraps a [`SpeechEngine`] behind model-id based calls.
///
/// Each model has its own lock; an engine call holds it for its whole
/// duration, so two operations never share one model's compute at once.
/// Calls on different models run concurrently.
pub struct TranscriptionGateway {
    engine: Arc<dyn SpeechEngine>,
    registry: Arc<ModelRegistry>,
    model_locks: HashMap<String, Arc<Mutex<()>>>,
    max_candidates: usize,
}

impl std::fmt::Debug for TranscriptionGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranscriptionGateway")
            .field("engine", &self.engine.name())
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl TranscriptionGateway {
    /// Create a gateway over `engine` for the models in `registry`.
    pub fn new(engine: Arc<dyn SpeechEngine>, registry: Arc<ModelRegistry>) -> Self {
        let model_locks = registry
            .models()
            .iter()
            .map(|m| (m.id.clone(), Arc::new(Mutex::new(()))))
            .collect();
        Self {
            engine,
            registry,
            model_locks,
            max_candidates: MAX_CANDIDATE_LANGUAGES,
        }
    }

    /// Limit the number of candidate languages (capped at 25).
    #[must_use]
    pub fn with_max_candidates(mut self, max: usize) -> Self {
        self.max_candidates = max.clamp(1, MAX_CANDIDATE_LANGUAGES);
        self
    }

    /// The model registry.
    #[must_use]
    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Transcribe `audio` with `model_id` (default when `None`).
    ///
    /// Without a language the engine detects the most likely one first.
    ///
    /// # Errors
    ///
    /// Fails for an unknown model or when the engine call fails.
    pub async fn transcribe(
        &self,
        audio: &Path,
        model_id: Option<&str>,
        language: Option<&str>,
    ) -> TranscribeResult<String> {
        let model = self.registry.resolve(model_id)?;
        let _guard = self.lock_model(model).await;

        debug!(model = %model.id, language = ?language, "transcribing");
        let result = self.engine.transcribe(audio, model, language).await?;
        info!(
            model = %model.id,
            language = ?result.language,
            text_len = result.text.len(),
            "transcription complete"
        );
        Ok(result.text.trim().to_string())
    }

    /// Candidate languages for `audio`: the engine's ranking first, padded
    /// from the language table up to the configured limit.
    ///
    /// # Errors
    ///
    /// Fails for an unknown model or when the engine call fails.
    pub async fn detect_languages(
        &self,
        audio: &Path,
        model_id: Option<&str>,
    ) -> TranscribeResult<Vec<LanguageCode>> {
        let model = self.registry.resolve(model_id)?;
        let _guard = self.lock_model(model).await;

        let probabilities = self.engine.detect_languages(audio, model).await?;
        let ranked = rank_languages(probabilities, self.max_candidates);
        debug!(
            model = %model.id,
            top = ?ranked.first().map(|l| &l.code),
            detected = ranked.len(),
            "languages detected"
        );
        Ok(fill_candidates(ranked, self.max_candidates))
    }

    async fn lock_model(&self, model: &ModelDescriptor) -> tokio::sync::OwnedMutexGuard<()> {
        // Registry and lock map are built together, so every resolved model has a lock.
        let lock = self
            .model_locks
            .get(&model.id)
            .map_or_else(|| Arc::new(Mutex::new(())), Arc::clone);
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeEngine, test_registry};
    use std::path::PathBuf;
    use std::time::Duration;

    fn gateway(engine: &Arc<FakeEngine>) -> Arc<TranscriptionGateway> {
        Arc::new(TranscriptionGateway::new(
            Arc::clone(engine) as Arc<dyn SpeechEngine>,
            Arc::new(test_registry()),
        ))
    }

    #[tokio::test]
    async fn test_transcribe_uses_default_model() {
        let engine = Arc::new(FakeEngine::new());
        let gw = gateway(&engine);

        let text = gw
            .transcribe(Path::new("/tmp/a.ogg"), None, None)
            .await
            .unwrap();
        assert_eq!(text, "text from small (auto)");

        let calls = engine.transcribe_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].model, "small");
        assert_eq!(calls[0].language, None);
    }

    #[tokio::test]
    async fn test_unknown_model_rejected() {
        let engine = Arc::new(FakeEngine::new());
        let gw = gateway(&engine);
        let err = gw
            .transcribe(Path::new("/tmp/a.ogg"), Some("huge"), Some("en"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("huge"));
        assert!(engine.transcribe_calls().is_empty());
    }

    #[tokio::test]
    async fn test_detect_languages_ranked() {
        let engine = Arc::new(FakeEngine::new().with_probabilities(vec![
            ("en", 0.2),
            ("de", 0.5),
            ("fr", 0.2),
        ]));
        let gw = gateway(&engine);
        let langs = gw
            .detect_languages(Path::new("/tmp/a.ogg"), None)
            .await
            .unwrap();
        let codes: Vec<_> = langs.iter().map(|l| l.code.as_str()).collect();
        assert_eq!(codes[..3], ["de", "en", "fr"]);
        assert_eq!(codes.len(), 25);
        assert_eq!(codes[3], "zh");
    }

    #[tokio::test]
    async fn test_single_detection_padded_from_table() {
        let engine = Arc::new(FakeEngine::new().with_probabilities(vec![("de", 1.0)]));
        let gw = Arc::new(
            TranscriptionGateway::new(
                Arc::clone(&engine) as Arc<dyn SpeechEngine>,
                Arc::new(test_registry()),
            )
            .with_max_candidates(10),
        );
        let langs = gw
            .detect_languages(Path::new("/tmp/a.ogg"), None)
            .await
            .unwrap();
        assert_eq!(langs.len(), 10);
        assert_eq!(langs[0].code, "de");
        assert_eq!(langs[1].code, "en");
    }

    #[tokio::test]
    async fn test_same_model_calls_are_exclusive() {
        let engine = Arc::new(FakeEngine::new().with_delay(Duration::from_millis(30)));
        let gw = gateway(&engine);

        let mut tasks = Vec::new();
        for _ in 0..3 {
            let gw = Arc::clone(&gw);
            tasks.push(tokio::spawn(async move {
                gw.transcribe(&PathBuf::from("/tmp/a.ogg"), Some("small"), Some("en"))
                    .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(engine.max_concurrent(), 1);
        assert_eq!(engine.transcribe_calls().len(), 3);
    }

    #[tokio::test]
    async fn test_different_models_run_concurrently() {
        let engine = Arc::new(FakeEngine::new().with_delay(Duration::from_millis(50)));
        let gw = gateway(&engine);

        let a = {
            let gw = Arc::clone(&gw);
            tokio::spawn(async move {
                gw.transcribe(Path::new("/tmp/a.ogg"), Some("small"), None)
                    .await
            })
        };
        let b = {
            let gw = Arc::clone(&gw);
            tokio::spawn(async move {
                gw.transcribe(Path::new("/tmp/b.ogg"), Some("large"), None)
                    .await
            })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();
        assert_eq!(engine.max_concurrent(), 2);
    }
}
