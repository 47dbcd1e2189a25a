//! YAML configuration for a search deployment.
//!
//! One file names every artifact the engine loads and the knobs of each stage:
//!
//! ```yaml
//! version: "1.0"
//! name: "gnps-positive"
//!
//! library:
//!   path: "library/positive.ms2l"
//!   ann:
//!     m: 16
//!     ef_search: 64
//!     min_vectors_for_ann: 1000
//!
//! embedding:
//!   model_path: "models/ms2ds.json"
//!   processing:
//!     mz_from: 0.0
//!     mz_to: 1000.0
//!     min_peaks: 10
//!
//! secondary_embedding:
//!   model_path: "models/spec2vec.json"
//!
//! features:
//!   layout: ["embedding_score", "secondary_embedding_score", "precursor_mz_difference"]
//!   settings:
//!     tolerance: 0.1
//!
//! scoring:
//!   model_path: "models/ms2query_rf.json"
//!
//! search:
//!   top_k: 2000
//!   exact_threshold: 0.85
//!   analog_threshold: 0.7
//!   max_results_per_query: 10
//! ```
//!
//! Relative paths resolve against the directory holding the YAML file.

use std::fs;
use std::path::{Path, PathBuf};

use embedding::EmbeddingConfig;
use features::{FeatureLayout, FeatureSettings};
use index::AnnConfig;
use search::SearchConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when loading YAML configuration files
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unsupported config version: {0}")]
    UnsupportedVersion(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ms2MatchConfig {
    pub version: String,

    #[serde(default)]
    pub name: Option<String>,

    pub library: LibraryConfig,

    /// Primary model; drives retrieval.
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub secondary_embedding: Option<EmbeddingConfig>,

    #[serde(default)]
    pub features: FeaturesConfig,

    pub scoring: ScoringConfig,

    #[serde(default)]
    pub search: SearchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryConfig {
    /// Library artifact written by `ReferenceIndex::save`.
    pub path: PathBuf,
    #[serde(default)]
    pub ann: AnnConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeaturesConfig {
    #[serde(default)]
    pub layout: FeatureLayout,
    #[serde(default)]
    pub settings: FeatureSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// JSON scoring artifact (`random_forest`, `logistic` or `onnx`).
    pub model_path: PathBuf,
}

impl Ms2MatchConfig {
    /// Load and validate a YAML file; relative paths are resolved against its directory.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let mut config = Self::from_yaml(&content)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigLoadError> {
        let config: Ms2MatchConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigLoadError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Anchor relative artifact paths at `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        fn anchor(path: &mut PathBuf, base: &Path) {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
        anchor(&mut self.library.path, base);
        anchor(&mut self.embedding.model_path, base);
        if let Some(secondary) = &mut self.secondary_embedding {
            anchor(&mut secondary.model_path, base);
        }
        anchor(&mut self.scoring.model_path, base);
    }

    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        match self.version.as_str() {
            "1.0" | "1" => {}
            v => return Err(ConfigLoadError::UnsupportedVersion(v.to_string())),
        }

        if self.library.path.as_os_str().is_empty() {
            return Err(ConfigLoadError::Validation("library.path must not be empty".into()));
        }
        self.library
            .ann
            .validate()
            .map_err(|e| ConfigLoadError::Validation(format!("library.ann: {e}")))?;

        self.embedding
            .validate()
            .map_err(|e| ConfigLoadError::Validation(format!("embedding: {e}")))?;
        if let Some(secondary) = &self.secondary_embedding {
            secondary
                .validate()
                .map_err(|e| ConfigLoadError::Validation(format!("secondary_embedding: {e}")))?;
        }

        self.features
            .layout
            .validate()
            .map_err(|e| ConfigLoadError::Validation(format!("features.layout: {e}")))?;
        self.features
            .settings
            .validate()
            .map_err(|e| ConfigLoadError::Validation(format!("features.settings: {e}")))?;
        if self.features.layout.uses_secondary_embedding() && self.secondary_embedding.is_none() {
            return Err(ConfigLoadError::Validation(
                "features.layout reads secondary_embedding_score but no secondary_embedding is configured"
                    .into(),
            ));
        }

        if self.scoring.model_path.as_os_str().is_empty() {
            return Err(ConfigLoadError::Validation(
                "scoring.model_path must not be empty".into(),
            ));
        }

        self.search
            .validate()
            .map_err(|e| ConfigLoadError::Validation(format!("search: {e}")))?;
        Ok(())
    }
}
