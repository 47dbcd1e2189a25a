use std::io;

use spectrum::SpectrumError;
use thiserror::Error;

/// Errors surfaced while loading embedding models or embedding spectra.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// The spectrum cannot be embedded (no peaks, missing precursor, ...).
    #[error("invalid spectrum: {0}")]
    InvalidSpectrum(#[from] SpectrumError),
    /// A vector does not have the dimension the model or index expects.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    /// Two embedding spaces (model, dimension, processing) differ.
    #[error("incompatible embedding space: {0}")]
    IncompatibleSpace(String),
    /// The model produced a zero or non-finite vector.
    #[error("degenerate embedding: {0}")]
    DegenerateEmbedding(String),
    /// Too much of the spectrum's intensity maps to words the model does not know.
    #[error(
        "unknown words carry {missing_percentage:.1}% of the spectrum weight, {allowed:.1}% allowed"
    )]
    TooManyUnknownWords {
        missing_percentage: f32,
        allowed: f32,
    },
    /// The model artifact could not be located.
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    /// The model artifact is malformed or internally inconsistent.
    #[error("invalid model artifact: {0}")]
    InvalidModel(String),
    /// Configuration is inconsistent.
    #[error("invalid embedding config: {0}")]
    InvalidConfig(String),
    /// Low-level IO failures while touching the filesystem.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    /// ONNX Runtime failures.
    #[error("inference failure: {0}")]
    Inference(String),
}

impl Clone for EmbeddingError {
    fn clone(&self) -> Self {
        match self {
            EmbeddingError::InvalidSpectrum(e) => EmbeddingError::InvalidSpectrum(e.clone()),
            EmbeddingError::DimensionMismatch { expected, got } => {
                EmbeddingError::DimensionMismatch {
                    expected: *expected,
                    got: *got,
                }
            }
            EmbeddingError::IncompatibleSpace(s) => EmbeddingError::IncompatibleSpace(s.clone()),
            EmbeddingError::DegenerateEmbedding(s) => {
                EmbeddingError::DegenerateEmbedding(s.clone())
            }
            EmbeddingError::TooManyUnknownWords {
                missing_percentage,
                allowed,
            } => EmbeddingError::TooManyUnknownWords {
                missing_percentage: *missing_percentage,
                allowed: *allowed,
            },
            EmbeddingError::ModelNotFound(s) => EmbeddingError::ModelNotFound(s.clone()),
            EmbeddingError::InvalidModel(s) => EmbeddingError::InvalidModel(s.clone()),
            EmbeddingError::InvalidConfig(s) => EmbeddingError::InvalidConfig(s.clone()),
            EmbeddingError::Io(e) => EmbeddingError::Inference(format!("IO error occurred: {e}")),
            EmbeddingError::Inference(s) => EmbeddingError::Inference(s.clone()),
        }
    }
}

impl EmbeddingError {
    /// True when the failure is caused by the input spectrum rather than the deployment.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            EmbeddingError::InvalidSpectrum(_)
                | EmbeddingError::DegenerateEmbedding(_)
                | EmbeddingError::TooManyUnknownWords { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_invalid_spectrum_from_spectrum_error() {
        let err: EmbeddingError = SpectrumError::NoPeaks.into();
        assert!(err.to_string().contains("invalid spectrum"));
        assert!(err.to_string().contains("no peaks"));
        assert!(err.is_input_error());
    }

    #[test]
    fn error_dimension_mismatch() {
        let err = EmbeddingError::DimensionMismatch {
            expected: 200,
            got: 100,
        };
        assert!(err.to_string().contains("expected 200, got 100"));
        assert!(!err.is_input_error());
    }

    #[test]
    fn error_unknown_words_formats_percentages() {
        let err = EmbeddingError::TooManyUnknownWords {
            missing_percentage: 42.25,
            allowed: 10.0,
        };
        let msg = err.to_string();
        assert!(msg.contains("42.2") || msg.contains("42.3"));
        assert!(msg.contains("10.0% allowed"));
    }

    #[test]
    fn error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: EmbeddingError = io_err.into();
        assert!(err.to_string().contains("io error"));
    }

    #[test]
    fn error_clone_io_converts_to_inference() {
        let err: EmbeddingError = io::Error::other("disk").into();
        let cloned = err.clone();
        assert!(cloned.to_string().contains("IO error occurred"));
    }

    #[test]
    fn error_clone_preserves_message() {
        let err = EmbeddingError::InvalidModel("layer 2 has 3 rows".into());
        assert_eq!(err.to_string(), err.clone().to_string());
    }
}
