use serde::{Deserialize, Serialize};

use crate::{ScoringError, ScoringModel};

/// `sigmoid(w . x + b)` over the declared features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticModel {
    name: String,
    feature_names: Vec<String>,
    weights: Vec<f64>,
    bias: f64,
}

impl LogisticModel {
    pub fn new(
        name: impl Into<String>,
        feature_names: Vec<String>,
        weights: Vec<f64>,
        bias: f64,
    ) -> Result<Self, ScoringError> {
        if feature_names.is_empty() {
            return Err(ScoringError::InvalidModel("model declares no features".into()));
        }
        if weights.len() != feature_names.len() {
            return Err(ScoringError::InvalidModel(format!(
                "{} weights for {} features",
                weights.len(),
                feature_names.len()
            )));
        }
        if !bias.is_finite() || weights.iter().any(|w| !w.is_finite()) {
            return Err(ScoringError::InvalidModel("non-finite coefficient".into()));
        }
        Ok(Self {
            name: name.into(),
            feature_names,
            weights,
            bias,
        })
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn bias(&self) -> f64 {
        self.bias
    }
}

impl ScoringModel for LogisticModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn predict(&self, features: &[f32]) -> Result<f32, ScoringError> {
        if features.len() != self.weights.len() {
            return Err(ScoringError::DimensionMismatch {
                expected: self.weights.len(),
                got: features.len(),
            });
        }
        let z = self
            .weights
            .iter()
            .zip(features)
            .map(|(w, &x)| w * f64::from(x))
            .sum::<f64>()
            + self.bias;
        Ok((1.0 / (1.0 + (-z).exp())) as f32)
    }
}
