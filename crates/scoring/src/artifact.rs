//! JSON scoring artifacts, tagged by `kind`.
//!
//! ```json
//! { "kind": "random_forest", "name": "ms2query-rf",
//!   "feature_names": ["embedding_score", "cosine_score", "mass_similarity"],
//!   "trees": [ { "nodes": [ { "feature": 0, "threshold": 0.7, "left": 1, "right": 2 },
//!                           { "value": 0.1 }, { "value": 0.9 } ] } ] }
//!
//! { "kind": "logistic", "name": "lr", "feature_names": [...],
//!   "weights": [4.0, 4.0, 4.0], "bias": -8.0 }
//!
//! { "kind": "onnx", "name": "rf-onnx", "feature_names": [...], "model_path": "rf.onnx" }
//! ```
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::forest::{RandomForestModel, RegressionTree};
use crate::logistic::LogisticModel;
use crate::{ScoringError, ScoringModel};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScoringArtifact {
    RandomForest {
        name: String,
        feature_names: Vec<String>,
        trees: Vec<RegressionTree>,
    },
    Logistic {
        name: String,
        feature_names: Vec<String>,
        weights: Vec<f64>,
        #[serde(default)]
        bias: f64,
    },
    Onnx {
        name: String,
        feature_names: Vec<String>,
        model_path: PathBuf,
    },
}

impl ScoringArtifact {
    pub fn from_json(json: &str) -> Result<Self, ScoringError> {
        serde_json::from_str(json).map_err(|e| ScoringError::InvalidModel(e.to_string()))
    }

    pub fn from_file(path: &Path) -> Result<Self, ScoringError> {
        let json = fs::read_to_string(path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                ScoringError::ModelNotFound(path.display().to_string())
            } else {
                ScoringError::from(e)
            }
        })?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String, ScoringError> {
        serde_json::to_string_pretty(self).map_err(|e| ScoringError::InvalidModel(e.to_string()))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ScoringArtifact::RandomForest { .. } => "random_forest",
            ScoringArtifact::Logistic { .. } => "logistic",
            ScoringArtifact::Onnx { .. } => "onnx",
        }
    }

    /// Relative ONNX paths resolve against `base_dir`.
    pub fn into_model(
        self,
        base_dir: Option<&Path>,
    ) -> Result<Arc<dyn ScoringModel>, ScoringError> {
        Ok(match self {
            ScoringArtifact::RandomForest {
                name,
                feature_names,
                trees,
            } => Arc::new(RandomForestModel::new(name, feature_names, trees)?),
            ScoringArtifact::Logistic {
                name,
                feature_names,
                weights,
                bias,
            } => Arc::new(LogisticModel::new(name, feature_names, weights, bias)?),
            ScoringArtifact::Onnx {
                name,
                feature_names,
                model_path,
            } => {
                let path = match base_dir {
                    Some(dir) if model_path.is_relative() => dir.join(model_path),
                    _ => model_path,
                };
                onnx(name, feature_names, path)?
            }
        })
    }
}

#[cfg(feature = "onnx")]
fn onnx(
    name: String,
    feature_names: Vec<String>,
    path: PathBuf,
) -> Result<Arc<dyn ScoringModel>, ScoringError> {
    Ok(Arc::new(crate::onnx::OnnxScoringModel::new(
        name,
        feature_names,
        path,
    )?))
}

#[cfg(not(feature = "onnx"))]
fn onnx(
    name: String,
    _feature_names: Vec<String>,
    _path: PathBuf,
) -> Result<Arc<dyn ScoringModel>, ScoringError> {
    Err(ScoringError::InvalidModel(format!(
        "scoring model '{name}' is ONNX but the `onnx` feature is disabled"
    )))
}

pub fn load_model(path: &Path) -> Result<Arc<dyn ScoringModel>, ScoringError> {
    let artifact = ScoringArtifact::from_file(path)?;
    let kind = artifact.kind();
    let model = artifact.into_model(path.parent())?;
    info!(
        path = %path.display(),
        kind,
        model = model.name(),
        features = model.input_dimension(),
        "scoring_model_loaded"
    );
    Ok(model)
}
