use embedding::EmbeddingError;
use features::FeatureError;
use index::{EntryId, IndexError};
use scoring::ScoringError;
use spectrum::SpectrumError;
use thiserror::Error;

/// Errors surfaced by [`SearchContext`](crate::SearchContext).
///
/// Configuration-class variants (`EmptyLibrary`, `DimensionMismatch`,
/// `IncompatibleLibrary`, `InvalidConfig`) are raised while the context is
/// built. Everything else fails a single query.
#[derive(Debug, Error, Clone)]
pub enum SearchError {
    #[error("invalid query spectrum: {0}")]
    InvalidSpectrum(#[from] SpectrumError),
    #[error("reference library is empty")]
    EmptyLibrary,
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("library is incompatible with the configured models: {0}")]
    IncompatibleLibrary(String),
    #[error("invalid search config: {0}")]
    InvalidConfig(String),
    #[error("query deadline exceeded")]
    Timeout,
    #[error("query cancelled")]
    Cancelled,
    #[error("search context has been shut down")]
    ShutDown,
    #[error("worker lost: {0}")]
    WorkerLost(String),
    #[error("embedding error: {0}")]
    Embedding(EmbeddingError),
    #[error("index error: {0}")]
    Index(IndexError),
    #[error("feature error: {0}")]
    Feature(FeatureError),
    #[error("scoring error: {0}")]
    Scoring(ScoringError),
}

impl SearchError {
    /// Whether the error comes from deployment configuration rather than a query.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SearchError::EmptyLibrary
                | SearchError::DimensionMismatch { .. }
                | SearchError::IncompatibleLibrary(_)
                | SearchError::InvalidConfig(_)
        )
    }
}

impl From<EmbeddingError> for SearchError {
    fn from(e: EmbeddingError) -> Self {
        match e {
            EmbeddingError::InvalidSpectrum(s) => SearchError::InvalidSpectrum(s),
            EmbeddingError::DimensionMismatch { expected, got } => {
                SearchError::DimensionMismatch { expected, got }
            }
            EmbeddingError::IncompatibleSpace(msg) => SearchError::IncompatibleLibrary(msg),
            other => SearchError::Embedding(other),
        }
    }
}

impl From<IndexError> for SearchError {
    fn from(e: IndexError) -> Self {
        match e {
            IndexError::EmptyLibrary => SearchError::EmptyLibrary,
            IndexError::DimensionMismatch { expected, got } => {
                SearchError::DimensionMismatch { expected, got }
            }
            IndexError::Embedding(inner) => inner.into(),
            other => SearchError::Index(other),
        }
    }
}

impl From<FeatureError> for SearchError {
    fn from(e: FeatureError) -> Self {
        match e {
            FeatureError::DimensionMismatch { expected, got } => {
                SearchError::DimensionMismatch { expected, got }
            }
            FeatureError::IncompatibleLibrary(msg) => SearchError::IncompatibleLibrary(msg),
            FeatureError::QueryWithoutPrecursor => {
                SearchError::InvalidSpectrum(SpectrumError::MissingMetadata("precursor_mz"))
            }
            FeatureError::Embedding(inner) => inner.into(),
            other => SearchError::Feature(other),
        }
    }
}

impl From<ScoringError> for SearchError {
    fn from(e: ScoringError) -> Self {
        match e {
            ScoringError::DimensionMismatch { expected, got } => {
                SearchError::DimensionMismatch { expected, got }
            }
            ScoringError::InvalidThresholds(msg) => SearchError::InvalidConfig(msg),
            other => SearchError::Scoring(other),
        }
    }
}

/// Why a single candidate was dropped from a query's results.
#[derive(Debug, Error, Clone)]
pub enum CandidateFailure {
    #[error(transparent)]
    Feature(FeatureError),
    #[error(transparent)]
    Scoring(ScoringError),
}

/// A candidate that could not be scored. It is excluded from the results,
/// never given a default confidence.
#[derive(Debug, Error, Clone)]
#[error("candidate '{library_id}' at rank {rank} skipped: {error}")]
pub struct CandidateProcessingError {
    pub library_id: String,
    pub entry: EntryId,
    pub rank: usize,
    pub error: CandidateFailure,
}
