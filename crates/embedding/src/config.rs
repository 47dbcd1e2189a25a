use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use spectrum::ProcessingConfig;

use crate::EmbeddingError;

/// Where to find an embedding model and how to prepare spectra for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Path to the JSON model artifact.
    pub model_path: PathBuf,
    /// Processing applied before the model sees a spectrum. Must match the
    /// processing used when the library was embedded.
    #[serde(default)]
    pub processing: ProcessingConfig,
    /// L2-normalize embeddings so cosine similarity reduces to a dot product.
    #[serde(default = "EmbeddingConfig::default_normalize")]
    pub normalize: bool,
}

impl EmbeddingConfig {
    pub(crate) fn default_normalize() -> bool {
        true
    }

    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            processing: ProcessingConfig::default(),
            normalize: Self::default_normalize(),
        }
    }

    pub fn with_processing(mut self, processing: ProcessingConfig) -> Self {
        self.processing = processing;
        self
    }

    pub fn validate(&self) -> Result<(), EmbeddingError> {
        if self.model_path.as_os_str().is_empty() {
            return Err(EmbeddingError::InvalidConfig("model_path is empty".into()));
        }
        self.processing
            .validate()
            .map_err(|e| EmbeddingError::InvalidConfig(e.to_string()))
    }
}
