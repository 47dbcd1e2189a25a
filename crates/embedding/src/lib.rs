//! Spectrum embeddings.
//!
//! An [`EmbeddingModel`] maps a processed spectrum to a fixed-length vector.
//! The [`EmbeddingGenerator`] wraps a model together with the spectrum
//! processing it was trained with, validates the output and L2-normalizes
//! it, so cosine similarity between two embeddings is a plain dot product.
//!
//! Three model families are available:
//!
//! - **binned dense** - fixed-width m/z bins fed through dense layers
//!   (MS2DeepScore style). A model without layers returns the binned vector.
//! - **word vectors** - peaks and neutral losses as words, summed with
//!   intensity weights (Spec2Vec style).
//! - **onnx** - binned input fed to an ONNX graph, behind the `onnx` feature.
//!
//! Models are loaded from JSON artifacts, see [`ModelArtifact`].
//!
//! ## Threading notes
//!
//! Models are `Send + Sync` and shared behind an `Arc`. ONNX sessions are
//! cached per thread; the first call on a thread opens the session.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use embedding::{BinnedDenseModel, Binning, EmbeddingGenerator};
//! use spectrum::{Peak, ProcessingConfig, Spectrum, SpectrumMetadata};
//!
//! let model = BinnedDenseModel::new("identity", Binning::new(100.0, 110.0, 1.0), Vec::new()).unwrap();
//! let generator = EmbeddingGenerator::new(Arc::new(model), ProcessingConfig::default().with_min_peaks(1));
//!
//! let spectrum = Spectrum::new(
//!     vec![Peak::new(101.0, 1.0), Peak::new(105.0, 1.0)],
//!     SpectrumMetadata::default().with_precursor_mz(120.0),
//! )
//! .unwrap();
//! let embedding = generator.embed(&spectrum).unwrap();
//! assert_eq!(embedding.dimension, 10);
//! assert!((embedding::normalize::l2_norm(&embedding.vector) - 1.0).abs() < 1e-6);
//! ```

mod artifact;
mod binned;
mod config;
mod error;
pub mod normalize;
#[cfg(feature = "onnx")]
mod onnx;
mod types;
mod word_vectors;

use std::fmt;
use std::sync::Arc;

use rayon::prelude::*;
use spectrum::{ProcessedSpectrum, ProcessingConfig, Spectrum, SpectrumError};
use tracing::{debug, info};

pub use crate::artifact::{load_model, LayerArtifact, ModelArtifact};
pub use crate::binned::{Activation, BinnedDenseModel, Binning, DenseLayer};
pub use crate::config::EmbeddingConfig;
pub use crate::error::EmbeddingError;
#[cfg(feature = "onnx")]
pub use crate::onnx::OnnxModel;
pub use crate::types::{Embedding, EmbeddingSpace};
pub use crate::word_vectors::{WordVectorModel, WordVectorSettings};

/// A model turning a processed spectrum into a raw (unnormalized) vector.
pub trait EmbeddingModel: Send + Sync {
    fn name(&self) -> &str;

    /// Length of every vector returned by [`embed`](EmbeddingModel::embed).
    fn dimension(&self) -> usize;

    /// Whether the model reads the precursor m/z (e.g. for neutral losses).
    fn requires_precursor_mz(&self) -> bool {
        false
    }

    fn embed(&self, spectrum: &ProcessedSpectrum) -> Result<Vec<f32>, EmbeddingError>;
}

/// A model bound to its spectrum processing.
#[derive(Clone)]
pub struct EmbeddingGenerator {
    model: Arc<dyn EmbeddingModel>,
    processing: ProcessingConfig,
    normalize: bool,
}

impl fmt::Debug for EmbeddingGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddingGenerator")
            .field("model", &self.model.name())
            .field("dimension", &self.model.dimension())
            .field("normalize", &self.normalize)
            .finish()
    }
}

impl EmbeddingGenerator {
    pub fn new(model: Arc<dyn EmbeddingModel>, processing: ProcessingConfig) -> Self {
        Self {
            model,
            processing,
            normalize: true,
        }
    }

    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    /// Load the model named by `cfg` from disk.
    pub fn from_config(cfg: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        cfg.validate()?;
        let model = load_model(&cfg.model_path)?;
        info!(
            model = model.name(),
            dimension = model.dimension(),
            path = %cfg.model_path.display(),
            "embedding_model_loaded"
        );
        Ok(Self::new(model, cfg.processing.clone()).with_normalize(cfg.normalize))
    }

    pub fn model(&self) -> &Arc<dyn EmbeddingModel> {
        &self.model
    }

    pub fn name(&self) -> &str {
        self.model.name()
    }

    pub fn dimension(&self) -> usize {
        self.model.dimension()
    }

    pub fn processing(&self) -> &ProcessingConfig {
        &self.processing
    }

    pub fn space(&self) -> EmbeddingSpace {
        EmbeddingSpace::new(self.model.name(), self.model.dimension(), self.processing.clone())
    }

    /// Run the spectrum through this generator's processing.
    pub fn prepare(&self, spectrum: &Spectrum) -> Result<ProcessedSpectrum, EmbeddingError> {
        if self.model.requires_precursor_mz() && spectrum.precursor_mz().is_none() {
            return Err(SpectrumError::MissingMetadata("precursor_mz").into());
        }
        Ok(self.processing.process(spectrum)?)
    }

    /// Embed a spectrum that already went through [`prepare`](Self::prepare).
    pub fn embed_processed(&self, spectrum: &ProcessedSpectrum) -> Result<Embedding, EmbeddingError> {
        if spectrum.peaks().is_empty() {
            return Err(SpectrumError::NoPeaks.into());
        }
        let mut vector = self.model.embed(spectrum)?;
        let expected = self.model.dimension();
        if vector.len() != expected {
            return Err(EmbeddingError::DimensionMismatch {
                expected,
                got: vector.len(),
            });
        }
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(EmbeddingError::DegenerateEmbedding(format!(
                "model '{}' produced non-finite values for {}",
                self.model.name(),
                spectrum.as_spectrum().label()
            )));
        }
        if normalize::l2_norm(&vector) == 0.0 {
            return Err(EmbeddingError::DegenerateEmbedding(format!(
                "model '{}' produced a zero vector for {}",
                self.model.name(),
                spectrum.as_spectrum().label()
            )));
        }
        if self.normalize {
            normalize::l2_normalize_in_place(&mut vector);
        }
        debug!(
            spectrum = spectrum.as_spectrum().label(),
            model = self.model.name(),
            "spectrum_embedded"
        );
        Ok(Embedding {
            vector,
            model_name: self.model.name().to_string(),
            dimension: expected,
            normalized: self.normalize,
        })
    }

    pub fn embed(&self, spectrum: &Spectrum) -> Result<Embedding, EmbeddingError> {
        let processed = self.prepare(spectrum)?;
        self.embed_processed(&processed)
    }

    /// Embed many spectra in parallel. Results keep the input order and
    /// fail independently.
    pub fn embed_batch(&self, spectra: &[Spectrum]) -> Vec<Result<Embedding, EmbeddingError>> {
        spectra.par_iter().map(|s| self.embed(s)).collect()
    }
}
