use embedding::EmbeddingError;
use index::EntryId;
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum FeatureError {
    /// Feature count differs from what the scoring model expects.
    #[error("feature dimension mismatch: model expects {expected}, layout has {got}")]
    DimensionMismatch { expected: usize, got: usize },
    /// Same count, different names or order.
    #[error("feature {position} is '{got}' but the model expects '{expected}'")]
    LayoutMismatch {
        position: usize,
        expected: String,
        got: String,
    },
    #[error("unknown feature '{0}'")]
    UnknownFeature(String),
    #[error("feature '{got}' must be spelled '{canonical}'")]
    NonCanonicalName { got: String, canonical: String },
    #[error("invalid feature settings: {0}")]
    InvalidSettings(String),
    #[error("layout needs a secondary embedding model but none is configured")]
    MissingSecondaryModel,
    #[error("library cannot provide the configured features: {0}")]
    IncompatibleLibrary(String),
    #[error("query has no precursor m/z")]
    QueryWithoutPrecursor,
    #[error("library entry '{library_id}' has no precursor m/z")]
    LibraryWithoutPrecursor { library_id: String },
    #[error("library entry '{library_id}' has no secondary embedding")]
    MissingSecondaryEmbedding { library_id: String },
    #[error("candidate {0} is not in the library")]
    UnknownEntry(EntryId),
    #[error("feature '{feature}' is not finite for '{library_id}'")]
    NonFinite { feature: String, library_id: String },
    #[error("secondary embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),
}

impl FeatureError {
    /// Errors that concern one candidate only; the query can continue.
    pub fn is_candidate_error(&self) -> bool {
        matches!(
            self,
            FeatureError::LibraryWithoutPrecursor { .. }
                | FeatureError::MissingSecondaryEmbedding { .. }
                | FeatureError::UnknownEntry(_)
                | FeatureError::NonFinite { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_errors_are_classified() {
        assert!(FeatureError::NonFinite {
            feature: "cosine_score".into(),
            library_id: "x".into()
        }
        .is_candidate_error());
        assert!(FeatureError::LibraryWithoutPrecursor {
            library_id: "x".into()
        }
        .is_candidate_error());
        assert!(!FeatureError::QueryWithoutPrecursor.is_candidate_error());
        assert!(!FeatureError::MissingSecondaryModel.is_candidate_error());
    }

    #[test]
    fn layout_mismatch_message() {
        let err = FeatureError::LayoutMismatch {
            position: 1,
            expected: "cosine_score".into(),
            got: "mass_similarity".into(),
        };
        assert_eq!(
            err.to_string(),
            "feature 1 is 'mass_similarity' but the model expects 'cosine_score'"
        );
    }
}
