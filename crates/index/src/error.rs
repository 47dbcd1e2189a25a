use bincode::error::{DecodeError, EncodeError};
use embedding::EmbeddingError;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum IndexError {
    #[error("reference library is empty")]
    EmptyLibrary,
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("duplicate library id '{0}'")]
    DuplicateId(String),
    #[error("invalid vector: {0}")]
    InvalidVector(String),
    #[error("unsupported library schema version {found} (expected {expected})")]
    UnsupportedSchema { found: u16, expected: u16 },
    #[error("invalid index config: {0}")]
    InvalidConfig(String),
    #[error("invalid structure neighbourhood: {0}")]
    InvalidNeighbourhood(String),
    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),
    #[error("serialization encode error: {0}")]
    Encode(String),
    #[error("serialization decode error: {0}")]
    Decode(String),
    #[error("io error: {0}")]
    Io(String),
}

impl From<EncodeError> for IndexError {
    fn from(e: EncodeError) -> Self {
        IndexError::Encode(e.to_string())
    }
}

impl From<DecodeError> for IndexError {
    fn from(e: DecodeError) -> Self {
        IndexError::Decode(e.to_string())
    }
}

impl From<std::io::Error> for IndexError {
    fn from(e: std::io::Error) -> Self {
        IndexError::Io(e.to_string())
    }
}
