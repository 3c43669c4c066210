//! Registry of recognition models.
//!
//! Built once at startup from configuration and read-only afterwards.

use crate::config::{ModelConfig, TranscriptionConfig};
use crate::error::{ConfigError, ConfigResult, TranscribeResult, TranscriberError};
use std::collections::HashMap;
use tracing::info;

/// Upper bound on candidate languages offered for one clip.
pub const MAX_CANDIDATE_LANGUAGES: usize = 25;

/// A recognition model the engine can run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelDescriptor {
    /// Id shown to users.
    pub id: String,
    /// Name the engine knows the model by.
    pub engine_model: String,
    /// Inference device.
    pub device: String,
}

impl From<&ModelConfig> for ModelDescriptor {
    fn from(config: &ModelConfig) -> Self {
        Self {
            id: config.id.clone(),
            engine_model: config.engine_model.clone(),
            device: config.device.clone(),
        }
    }
}

/// Immutable set of models with a default.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: Vec<ModelDescriptor>,
    index: HashMap<String, usize>,
    default: usize,
}

impl ModelRegistry {
    /// Build a registry.
    ///
    /// # Errors
    ///
    /// Fails if `models` is empty, contains duplicate ids, does not contain
    /// `default_id`, or if the models do not all share one device.
    pub fn new(models: Vec<ModelDescriptor>, default_id: &str) -> ConfigResult<Self> {
        let Some(first) = models.first() else {
            return Err(ConfigError::invalid("model registry is empty"));
        };
        let device = first.device.clone();

        let mut index = HashMap::with_capacity(models.len());
        for (i, model) in models.iter().enumerate() {
            if model.device != device {
                return Err(ConfigError::invalid(format!(
                    "model '{}' is on device '{}', expected '{device}'",
                    model.id, model.device
                )));
            }
            if index.insert(model.id.clone(), i).is_some() {
                return Err(ConfigError::invalid(format!(
                    "duplicate model id '{}'",
                    model.id
                )));
            }
        }

        let default = *index.get(default_id).ok_or_else(|| {
            ConfigError::invalid(format!("default model '{default_id}' is not registered"))
        })?;

        info!(
            models = models.len(),
            default = %default_id,
            device = %device,
            "model registry loaded"
        );

        Ok(Self {
            models,
            index,
            default,
        })
    }

    /// Build a registry from the transcription configuration.
    ///
    /// # Errors
    ///
    /// See [`ModelRegistry::new`].
    pub fn from_config(config: &TranscriptionConfig) -> ConfigResult<Self> {
        let models = config.models.iter().map(ModelDescriptor::from).collect();
        Self::new(models, &config.default_model)
    }

    /// Look up `id`, or the default when `None`.
    ///
    /// # Errors
    ///
    /// Returns [`TranscriberError::UnknownModel`] for an unregistered id.
    pub fn resolve(&self, id: Option<&str>) -> TranscribeResult<&ModelDescriptor> {
        match id {
            None => Ok(self.default_model()),
            Some(id) => self
                .index
                .get(id)
                .map(|&i| &self.models[i])
                .ok_or_else(|| TranscriberError::UnknownModel(id.to_string())),
        }
    }

    /// The default model.
    #[must_use]
    pub fn default_model(&self) -> &ModelDescriptor {
        &self.models[self.default]
    }

    /// Whether `id` is registered.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// All models in display order.
    #[must_use]
    pub fn models(&self) -> &[ModelDescriptor] {
        &self.models
    }

    /// The device shared by every model.
    #[must_use]
    pub fn device(&self) -> &str {
        &self.default_model().device
    }
}
