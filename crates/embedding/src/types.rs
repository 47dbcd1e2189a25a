use serde::{Deserialize, Serialize};
use spectrum::ProcessingConfig;

use crate::EmbeddingError;

/// A spectrum embedding produced by one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub vector: Vec<f32>,
    pub model_name: String,
    pub dimension: usize,
    pub normalized: bool,
}

/// Identity of the space an embedding lives in.
///
/// Two embeddings can only be compared when their spaces are equal: same
/// model, same dimension, same spectrum processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingSpace {
    pub model_name: String,
    pub dimension: usize,
    pub processing: ProcessingConfig,
}

impl EmbeddingSpace {
    pub fn new(model_name: impl Into<String>, dimension: usize, processing: ProcessingConfig) -> Self {
        Self {
            model_name: model_name.into(),
            dimension,
            processing,
        }
    }

    /// Check that `other` (typically a query-side generator) produces vectors
    /// comparable with this space.
    pub fn ensure_compatible(&self, other: &EmbeddingSpace) -> Result<(), EmbeddingError> {
        if self.dimension != other.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                got: other.dimension,
            });
        }
        if self.model_name != other.model_name {
            return Err(EmbeddingError::IncompatibleSpace(format!(
                "model '{}' does not match '{}'",
                other.model_name, self.model_name
            )));
        }
        if self.processing.fingerprint() != other.processing.fingerprint() {
            return Err(EmbeddingError::IncompatibleSpace(format!(
                "spectrum processing for model '{}' differs from the one used to build the library",
                self.model_name
            )));
        }
        Ok(())
    }
}
