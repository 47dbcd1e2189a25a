//! Confidence scoring for (query, candidate) feature vectors.
//!
//! A [`ScoringModel`] maps a feature vector to a confidence in `[0, 1]`; the
//! [`Scorer`] checks the input, runs the model and buckets the result with
//! [`Thresholds`]:
//!
//! ```
//! use std::sync::Arc;
//! use scoring::{LogisticModel, MatchCategory, Scorer, Thresholds};
//!
//! let model = LogisticModel::new("lr", vec!["embedding_score".into()], vec![10.0], -5.0).unwrap();
//! let scorer = Scorer::new(Arc::new(model), Thresholds::default()).unwrap();
//! let score = scorer.score(&[1.0]).unwrap();
//! assert_eq!(score.category, MatchCategory::ExactMatch);
//! ```
//!
//! Models are loaded from JSON artifacts with [`load_model`]; the artifact's
//! `kind` selects the implementation.

mod artifact;
mod error;
mod forest;
mod logistic;
#[cfg(feature = "onnx")]
mod onnx;
mod scorer;

pub use crate::artifact::{load_model, ScoringArtifact};
pub use crate::error::ScoringError;
pub use crate::forest::{RandomForestModel, RegressionTree, TreeNode};
pub use crate::logistic::LogisticModel;
#[cfg(feature = "onnx")]
pub use crate::onnx::OnnxScoringModel;
pub use crate::scorer::{MatchCategory, Score, Scorer, Thresholds};

/// A trained model over a fixed, named feature layout.
///
/// `predict` must be free of side effects; one instance serves every worker.
pub trait ScoringModel: Send + Sync {
    fn name(&self) -> &str;

    /// Feature names in the order `predict` expects them.
    fn feature_names(&self) -> &[String];

    fn input_dimension(&self) -> usize {
        self.feature_names().len()
    }

    fn predict(&self, features: &[f32]) -> Result<f32, ScoringError>;
}
