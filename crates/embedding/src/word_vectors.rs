//! Word-vector spectrum embeddings.
//!
//! A spectrum is read as a document: every fragment peak becomes the word
//! `peak@{mz}` and, when enabled, every neutral loss within
//! `[loss_mz_from, loss_mz_to]` becomes `loss@{precursor - mz}`, both printed
//! with `n_decimals` decimals. The document vector is the sum of the known
//! word vectors weighted by `intensity^intensity_weighting_power`.
use fxhash::FxHashMap;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use spectrum::{ProcessedSpectrum, SpectrumError};

use crate::{EmbeddingError, EmbeddingModel};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WordVectorSettings {
    pub n_decimals: usize,
    pub intensity_weighting_power: f32,
    /// Share of the document weight (in percent) that may belong to unknown words.
    pub allowed_missing_percentage: f32,
    pub include_losses: bool,
    pub loss_mz_from: f64,
    pub loss_mz_to: f64,
}

impl Default for WordVectorSettings {
    fn default() -> Self {
        Self {
            n_decimals: 2,
            intensity_weighting_power: 0.5,
            allowed_missing_percentage: 10.0,
            include_losses: true,
            loss_mz_from: 5.0,
            loss_mz_to: 200.0,
        }
    }
}

impl WordVectorSettings {
    pub fn with_losses(mut self, include: bool) -> Self {
        self.include_losses = include;
        self
    }

    pub fn with_allowed_missing_percentage(mut self, percentage: f32) -> Self {
        self.allowed_missing_percentage = percentage;
        self
    }

    fn validate(&self) -> Result<(), EmbeddingError> {
        if !(0.0..=100.0).contains(&self.allowed_missing_percentage) {
            return Err(EmbeddingError::InvalidModel(
                "allowed_missing_percentage must be in [0, 100]".into(),
            ));
        }
        if !self.intensity_weighting_power.is_finite() || self.intensity_weighting_power < 0.0 {
            return Err(EmbeddingError::InvalidModel(
                "intensity_weighting_power must be >= 0".into(),
            ));
        }
        if self.include_losses && self.loss_mz_to <= self.loss_mz_from {
            return Err(EmbeddingError::InvalidModel(
                "loss_mz_to must exceed loss_mz_from".into(),
            ));
        }
        Ok(())
    }
}

pub struct WordVectorModel {
    name: String,
    settings: WordVectorSettings,
    vocabulary: FxHashMap<String, usize>,
    vectors: Array2<f32>,
}

impl std::fmt::Debug for WordVectorModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WordVectorModel")
            .field("name", &self.name)
            .field("words", &self.vocabulary.len())
            .field("dimension", &self.vectors.ncols())
            .finish()
    }
}

impl WordVectorModel {
    pub fn new(
        name: impl Into<String>,
        settings: WordVectorSettings,
        words: Vec<String>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<Self, EmbeddingError> {
        settings.validate()?;
        if words.len() != vectors.len() {
            return Err(EmbeddingError::InvalidModel(format!(
                "{} words but {} vectors",
                words.len(),
                vectors.len()
            )));
        }
        let dimension = vectors.first().map(Vec::len).unwrap_or(0);
        if dimension == 0 {
            return Err(EmbeddingError::InvalidModel("word vector table is empty".into()));
        }
        if vectors.iter().any(|v| v.len() != dimension) {
            return Err(EmbeddingError::InvalidModel(
                "word vectors have different lengths".into(),
            ));
        }

        let mut vocabulary = FxHashMap::default();
        for (row, word) in words.into_iter().enumerate() {
            if vocabulary.insert(word.clone(), row).is_some() {
                return Err(EmbeddingError::InvalidModel(format!("duplicate word '{word}'")));
            }
        }

        let rows = vectors.len();
        let flat: Vec<f32> = vectors.into_iter().flatten().collect();
        if flat.iter().any(|v| !v.is_finite()) {
            return Err(EmbeddingError::InvalidModel(
                "word vectors contain non-finite values".into(),
            ));
        }
        let vectors = Array2::from_shape_vec((rows, dimension), flat)
            .map_err(|e| EmbeddingError::InvalidModel(e.to_string()))?;

        Ok(Self {
            name: name.into(),
            settings,
            vocabulary,
            vectors,
        })
    }

    pub fn settings(&self) -> &WordVectorSettings {
        &self.settings
    }

    /// Words and weights describing `spectrum`.
    pub fn document(&self, spectrum: &ProcessedSpectrum) -> Result<Vec<(String, f32)>, EmbeddingError> {
        let decimals = self.settings.n_decimals;
        let power = self.settings.intensity_weighting_power;
        let mut words: Vec<(String, f32)> = spectrum
            .peaks()
            .iter()
            .map(|p| {
                (
                    format!("peak@{:.*}", decimals, p.mz),
                    (p.intensity as f32).powf(power),
                )
            })
            .collect();

        if self.settings.include_losses {
            let precursor = spectrum
                .precursor_mz()
                .ok_or(SpectrumError::MissingMetadata("precursor_mz"))?;
            let mut losses: Vec<(f64, f64)> = spectrum
                .peaks()
                .iter()
                .map(|p| (precursor - p.mz, p.intensity))
                .filter(|(loss, _)| {
                    *loss >= self.settings.loss_mz_from && *loss <= self.settings.loss_mz_to
                })
                .collect();
            losses.sort_by(|a, b| a.0.total_cmp(&b.0));
            words.extend(losses.into_iter().map(|(loss, intensity)| {
                (
                    format!("loss@{:.*}", decimals, loss),
                    (intensity as f32).powf(power),
                )
            }));
        }

        Ok(words)
    }
}

impl EmbeddingModel for WordVectorModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn dimension(&self) -> usize {
        self.vectors.ncols()
    }

    fn requires_precursor_mz(&self) -> bool {
        self.settings.include_losses
    }

    fn embed(&self, spectrum: &ProcessedSpectrum) -> Result<Vec<f32>, EmbeddingError> {
        let words = self.document(spectrum)?;
        let mut acc = Array1::<f32>::zeros(self.vectors.ncols());
        let mut total = 0f32;
        let mut missing = 0f32;

        for (word, weight) in &words {
            total += weight;
            match self.vocabulary.get(word) {
                Some(&row) => acc.scaled_add(*weight, &self.vectors.row(row)),
                None => missing += weight,
            }
        }

        let missing_percentage = if total > 0.0 {
            100.0 * missing / total
        } else {
            100.0
        };
        if missing_percentage > self.settings.allowed_missing_percentage {
            return Err(EmbeddingError::TooManyUnknownWords {
                missing_percentage,
                allowed: self.settings.allowed_missing_percentage,
            });
        }

        Ok(acc.to_vec())
    }
}
