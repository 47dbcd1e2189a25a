use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ScoringError {
    #[error("dimension mismatch: model expects {expected} features, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("feature {position} is not finite")]
    NonFiniteInput { position: usize },
    /// The model returned NaN, infinity or a value outside [0, 1].
    #[error("model output {0} is not a confidence in [0, 1]")]
    InvalidOutput(f32),
    #[error("invalid thresholds: {0}")]
    InvalidThresholds(String),
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("invalid scoring model: {0}")]
    InvalidModel(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("inference failure: {0}")]
    Inference(String),
}

impl From<std::io::Error> for ScoringError {
    fn from(e: std::io::Error) -> Self {
        ScoringError::Io(e.to_string())
    }
}
