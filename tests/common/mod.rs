//! On-disk deployment shared by the integration tests.
//!
//! The embedding model is an identity projection of 1 Da bins over
//! 100..110 m/z, so embeddings are easy to reason about by hand.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use ms2match::{
    AnnConfig, CompressionConfig, EmbeddingConfig, EmbeddingGenerator, IndexBuilder,
    Ms2MatchConfig, Peak, ProcessingConfig, Spectrum, SpectrumMetadata,
};
use tempfile::TempDir;

pub const LAYOUT: [&str; 3] = ["embedding_score", "cosine_score", "mass_similarity"];

pub const EMBEDDING_MODEL: &str = r#"{
  "kind": "binned_dense",
  "name": "binned-identity",
  "binning": { "mz_min": 100.0, "mz_max": 110.0, "bin_width": 1.0, "intensity_power": 1.0 },
  "layers": []
}"#;

pub const LOGISTIC_MODEL: &str = r#"{
  "kind": "logistic",
  "name": "lr-test",
  "feature_names": ["embedding_score", "cosine_score", "mass_similarity"],
  "weights": [4.0, 4.0, 4.0],
  "bias": -8.0
}"#;

/// Two trees: one on embedding score, one on mass similarity.
pub const FOREST_MODEL: &str = r#"{
  "kind": "random_forest",
  "name": "rf-test",
  "feature_names": ["embedding_score", "cosine_score", "mass_similarity"],
  "trees": [
    { "nodes": [
      { "feature": 0, "threshold": 0.99, "left": 1, "right": 2 },
      { "value": 0.6 },
      { "value": 1.0 }
    ] },
    { "nodes": [
      { "feature": 2, "threshold": 0.5, "left": 1, "right": 2 },
      { "value": 0.4 },
      { "value": 0.9 }
    ] }
  ]
}"#;

pub struct Deployment {
    pub dir: TempDir,
    pub config_path: PathBuf,
}

impl Deployment {
    pub fn config(&self) -> Ms2MatchConfig {
        Ms2MatchConfig::from_file(&self.config_path).expect("config should load")
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

pub fn processing() -> ProcessingConfig {
    ProcessingConfig::default().with_min_peaks(1)
}

pub fn spectrum(id: &str, peaks: &[(f64, f64)], precursor: Option<f64>, name: &str) -> Spectrum {
    let mut meta = SpectrumMetadata::default()
        .with_spectrum_id(id)
        .with_compound_name(name);
    meta.precursor_mz = precursor;
    Spectrum::new(peaks.iter().map(|&(mz, i)| Peak::new(mz, i)).collect(), meta)
        .expect("fixture spectrum should be valid")
}

pub fn library_spectra() -> Vec<Spectrum> {
    vec![
        spectrum("lib-a", &[(101.0, 1.0), (103.0, 0.5), (105.0, 0.2)], Some(300.0), "alpha"),
        spectrum("lib-b", &[(102.0, 1.0), (104.0, 0.6)], Some(320.0), "beta"),
        spectrum("lib-c", &[(101.0, 1.0), (103.0, 0.5), (107.0, 0.3)], Some(300.5), "gamma"),
    ]
}

/// Same peaks and precursor as `lib-a`.
pub fn alpha_query() -> Spectrum {
    spectrum("q-alpha", &[(101.0, 1.0), (103.0, 0.5), (105.0, 0.2)], Some(300.0), "alpha")
}

/// A query that matches nothing in the library well.
pub fn stranger_query() -> Spectrum {
    spectrum("q-stranger", &[(108.0, 1.0), (109.0, 0.4)], Some(450.0), "stranger")
}

pub fn mixed_queries(n: usize) -> Vec<Spectrum> {
    (0..n)
        .map(|i| {
            let peaks = [(101.0 + (i % 3) as f64, 1.0), (104.0, 0.3 + (i % 5) as f64 * 0.1)];
            spectrum(&format!("q-{i}"), &peaks, Some(300.0 + i as f64 * 0.25), "mixed")
        })
        .collect()
}

fn write(path: &Path, content: &str) {
    fs::write(path, content).expect("fixture file should be writable");
}

/// Write a library built from `spectra` with the fixture embedding model.
pub fn write_library(dir: &Path, file: &str, spectra: &[Spectrum]) -> PathBuf {
    let model_path = dir.join("embedding.json");
    if !model_path.exists() {
        write(&model_path, EMBEDDING_MODEL);
    }
    let generator = EmbeddingGenerator::from_config(
        &EmbeddingConfig::new(&model_path).with_processing(processing()),
    )
    .expect("fixture embedder should load");

    let mut builder = IndexBuilder::new(generator.space());
    for s in spectra {
        builder
            .insert_spectrum(s.label(), s, &generator, None)
            .expect("fixture spectrum should embed");
    }
    let index = builder
        .build(AnnConfig::default())
        .expect("fixture library should build");
    let path = dir.join(file);
    index
        .save(&path, &CompressionConfig::default())
        .expect("fixture library should save");
    path
}

/// Full deployment with the logistic scoring model and default search settings.
pub fn deployment() -> Deployment {
    deployment_with(LOGISTIC_MODEL, "")
}

/// Deployment with a custom scoring artifact and extra YAML appended to the
/// config (e.g. a `search:` section).
pub fn deployment_with(scoring_model: &str, extra_yaml: &str) -> Deployment {
    let dir = TempDir::new().expect("tempdir");
    write_library(dir.path(), "library.ms2l", &library_spectra());
    write(&dir.path().join("scoring.json"), scoring_model);

    let yaml = format!(
        r#"version: "1.0"
name: "integration"
library:
  path: "library.ms2l"
embedding:
  model_path: "embedding.json"
  processing:
    min_peaks: 1
features:
  layout: ["embedding_score", "cosine_score", "mass_similarity"]
scoring:
  model_path: "scoring.json"
{extra_yaml}"#
    );
    let config_path = dir.path().join("ms2match.yaml");
    write(&config_path, &yaml);
    Deployment { dir, config_path }
}
