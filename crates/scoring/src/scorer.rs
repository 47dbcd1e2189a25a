use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{ScoringError, ScoringModel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchCategory {
    ExactMatch,
    Analog,
    BelowThreshold,
}

impl MatchCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchCategory::ExactMatch => "exact_match",
            MatchCategory::Analog => "analog",
            MatchCategory::BelowThreshold => "below_threshold",
        }
    }
}

impl fmt::Display for MatchCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Minimum confidence for [`MatchCategory::ExactMatch`].
    pub exact: f32,
    /// Minimum confidence for [`MatchCategory::Analog`].
    pub analog: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            exact: 0.85,
            analog: 0.7,
        }
    }
}

impl Thresholds {
    pub fn new(exact: f32, analog: f32) -> Result<Self, ScoringError> {
        let thresholds = Self { exact, analog };
        thresholds.validate()?;
        Ok(thresholds)
    }

    pub fn validate(&self) -> Result<(), ScoringError> {
        if !(self.exact.is_finite() && self.analog.is_finite()) {
            return Err(ScoringError::InvalidThresholds("thresholds must be finite".into()));
        }
        if !(0.0 <= self.analog && self.analog <= self.exact && self.exact <= 1.0) {
            return Err(ScoringError::InvalidThresholds(format!(
                "need 0 <= analog ({}) <= exact ({}) <= 1",
                self.analog, self.exact
            )));
        }
        Ok(())
    }

    pub fn categorize(&self, confidence: f32) -> MatchCategory {
        if confidence >= self.exact {
            MatchCategory::ExactMatch
        } else if confidence >= self.analog {
            MatchCategory::Analog
        } else {
            MatchCategory::BelowThreshold
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Score {
    pub confidence: f32,
    pub category: MatchCategory,
}

/// Model plus thresholds. Cheap to clone and safe to share across workers.
#[derive(Clone)]
pub struct Scorer {
    model: Arc<dyn ScoringModel>,
    thresholds: Thresholds,
}

impl fmt::Debug for Scorer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scorer")
            .field("model", &self.model.name())
            .field("features", &self.model.feature_names())
            .field("thresholds", &self.thresholds)
            .finish()
    }
}

impl Scorer {
    pub fn new(model: Arc<dyn ScoringModel>, thresholds: Thresholds) -> Result<Self, ScoringError> {
        thresholds.validate()?;
        Ok(Self { model, thresholds })
    }

    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Result<Self, ScoringError> {
        thresholds.validate()?;
        self.thresholds = thresholds;
        Ok(self)
    }

    pub fn model(&self) -> &Arc<dyn ScoringModel> {
        &self.model
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    pub fn feature_names(&self) -> &[String] {
        self.model.feature_names()
    }

    pub fn input_dimension(&self) -> usize {
        self.model.input_dimension()
    }

    pub fn score(&self, features: &[f32]) -> Result<Score, ScoringError> {
        let expected = self.model.input_dimension();
        if features.len() != expected {
            return Err(ScoringError::DimensionMismatch {
                expected,
                got: features.len(),
            });
        }
        if let Some(position) = features.iter().position(|v| !v.is_finite()) {
            return Err(ScoringError::NonFiniteInput { position });
        }

        let confidence = self.model.predict(features)?;
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return Err(ScoringError::InvalidOutput(confidence));
        }
        Ok(Score {
            confidence,
            category: self.thresholds.categorize(confidence),
        })
    }
}
