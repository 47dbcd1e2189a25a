//! JSON model artifacts.
//!
//! ```json
//! { "kind": "binned_dense", "name": "ms2ds-v2",
//!   "binning": { "mz_min": 10.0, "mz_max": 1000.0, "bin_width": 0.1, "intensity_power": 0.5 },
//!   "layers": [ { "weights": [[...], ...], "bias": [...], "activation": "relu" } ] }
//!
//! { "kind": "word_vectors", "name": "spec2vec-v1",
//!   "settings": { "n_decimals": 2, "allowed_missing_percentage": 10.0 },
//!   "words": ["peak@100.00", ...], "vectors": [[...], ...] }
//!
//! { "kind": "onnx", "name": "ms2ds-onnx", "model_path": "ms2ds.onnx",
//!   "binning": { ... }, "dimension": 200 }
//! ```
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::binned::{Activation, BinnedDenseModel, Binning, DenseLayer};
use crate::word_vectors::{WordVectorModel, WordVectorSettings};
use crate::{EmbeddingError, EmbeddingModel};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerArtifact {
    pub weights: Vec<Vec<f32>>,
    pub bias: Vec<f32>,
    #[serde(default)]
    pub activation: Activation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelArtifact {
    BinnedDense {
        name: String,
        #[serde(default)]
        binning: Binning,
        #[serde(default)]
        layers: Vec<LayerArtifact>,
    },
    WordVectors {
        name: String,
        #[serde(default)]
        settings: WordVectorSettings,
        words: Vec<String>,
        vectors: Vec<Vec<f32>>,
    },
    Onnx {
        name: String,
        model_path: PathBuf,
        #[serde(default)]
        binning: Binning,
        dimension: usize,
    },
}

impl ModelArtifact {
    pub fn from_json(json: &str) -> Result<Self, EmbeddingError> {
        serde_json::from_str(json).map_err(|e| EmbeddingError::InvalidModel(e.to_string()))
    }

    pub fn from_file(path: &Path) -> Result<Self, EmbeddingError> {
        let content = fs::read_to_string(path).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => EmbeddingError::ModelNotFound(path.display().to_string()),
            _ => EmbeddingError::Io(err),
        })?;
        Self::from_json(&content)
    }

    pub fn to_json(&self) -> Result<String, EmbeddingError> {
        serde_json::to_string(self).map_err(|e| EmbeddingError::InvalidModel(e.to_string()))
    }

    pub fn name(&self) -> &str {
        match self {
            ModelArtifact::BinnedDense { name, .. }
            | ModelArtifact::WordVectors { name, .. }
            | ModelArtifact::Onnx { name, .. } => name,
        }
    }

    /// Instantiate the model. Relative paths inside the artifact resolve
    /// against `base_dir`.
    pub fn into_model(
        self,
        base_dir: Option<&Path>,
    ) -> Result<Arc<dyn EmbeddingModel>, EmbeddingError> {
        match self {
            ModelArtifact::BinnedDense {
                name,
                binning,
                layers,
            } => {
                let layers = layers
                    .into_iter()
                    .map(|l| DenseLayer::new(l.weights, l.bias, l.activation))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Arc::new(BinnedDenseModel::new(name, binning, layers)?))
            }
            ModelArtifact::WordVectors {
                name,
                settings,
                words,
                vectors,
            } => Ok(Arc::new(WordVectorModel::new(name, settings, words, vectors)?)),
            ModelArtifact::Onnx {
                name,
                model_path,
                binning,
                dimension,
            } => {
                let model_path = match base_dir {
                    Some(dir) if model_path.is_relative() => dir.join(model_path),
                    _ => model_path,
                };
                onnx_model(name, model_path, binning, dimension)
            }
        }
    }
}

#[cfg(feature = "onnx")]
fn onnx_model(
    name: String,
    model_path: PathBuf,
    binning: Binning,
    dimension: usize,
) -> Result<Arc<dyn EmbeddingModel>, EmbeddingError> {
    Ok(Arc::new(crate::onnx::OnnxModel::new(
        name, model_path, binning, dimension,
    )?))
}

#[cfg(not(feature = "onnx"))]
fn onnx_model(
    name: String,
    _model_path: PathBuf,
    _binning: Binning,
    _dimension: usize,
) -> Result<Arc<dyn EmbeddingModel>, EmbeddingError> {
    Err(EmbeddingError::InvalidConfig(format!(
        "model '{name}' needs ONNX support; rebuild with the `onnx` feature"
    )))
}

/// Load a model artifact from disk.
pub fn load_model(path: &Path) -> Result<Arc<dyn EmbeddingModel>, EmbeddingError> {
    let artifact = ModelArtifact::from_file(path)?;
    artifact.into_model(path.parent())
}
