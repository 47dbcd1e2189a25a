//! Workspace umbrella crate for MS/MS spectral library search.
//!
//! Loads every artifact named by an [`Ms2MatchConfig`] and assembles a shared
//! [`SearchContext`]; callers then search single spectra through the context
//! or whole batches through a [`WorkerPool`].
//!
//! ```no_run
//! use ms2match::{open_context, Ms2MatchConfig, WorkerPool};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Ms2MatchConfig::from_file("ms2match.yaml")?;
//! let ctx = open_context(&config)?;
//! let pool = WorkerPool::from_config(ctx.config())?;
//! let outcomes = pool.run_batch(ctx.clone(), Vec::new());
//! assert!(outcomes.is_empty());
//! ctx.shutdown();
//! # Ok(())
//! # }
//! ```

pub mod config;

pub use crate::config::{
    ConfigLoadError, FeaturesConfig, LibraryConfig, Ms2MatchConfig, ScoringConfig,
};
pub use embedding::{EmbeddingConfig, EmbeddingError, EmbeddingGenerator};
pub use features::{FeatureComposer, FeatureError, FeatureKind, FeatureLayout, FeatureSettings};
pub use index::{
    AnnConfig, CompressionConfig, EntryId, IndexBuilder, IndexError, ReferenceIndex,
};
pub use scoring::{MatchCategory, ScoringError, ScoringModel, Thresholds};
pub use search::{
    CandidateProcessingError, QueryControl, QueryOutcome, ScoredResult, SearchConfig,
    SearchContext, SearchError, SearchMetrics, SearchResponse, WorkerPool,
};
pub use spectrum::{Peak, ProcessingConfig, Spectrum, SpectrumError, SpectrumMetadata};

use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

/// Errors raised while assembling a search deployment from its configuration.
#[derive(Debug)]
pub enum PipelineError {
    Config(ConfigLoadError),
    Embedding(EmbeddingError),
    Index(IndexError),
    Feature(FeatureError),
    Scoring(ScoringError),
    Search(SearchError),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Config(err) => write!(f, "configuration failure: {err}"),
            PipelineError::Embedding(err) => write!(f, "embedding model failure: {err}"),
            PipelineError::Index(err) => write!(f, "library load failure: {err}"),
            PipelineError::Feature(err) => write!(f, "feature layout failure: {err}"),
            PipelineError::Scoring(err) => write!(f, "scoring model failure: {err}"),
            PipelineError::Search(err) => write!(f, "search context failure: {err}"),
        }
    }
}

impl Error for PipelineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PipelineError::Config(err) => Some(err),
            PipelineError::Embedding(err) => Some(err),
            PipelineError::Index(err) => Some(err),
            PipelineError::Feature(err) => Some(err),
            PipelineError::Scoring(err) => Some(err),
            PipelineError::Search(err) => Some(err),
        }
    }
}

impl From<ConfigLoadError> for PipelineError {
    fn from(value: ConfigLoadError) -> Self {
        PipelineError::Config(value)
    }
}

impl From<EmbeddingError> for PipelineError {
    fn from(value: EmbeddingError) -> Self {
        PipelineError::Embedding(value)
    }
}

impl From<IndexError> for PipelineError {
    fn from(value: IndexError) -> Self {
        PipelineError::Index(value)
    }
}

impl From<FeatureError> for PipelineError {
    fn from(value: FeatureError) -> Self {
        PipelineError::Feature(value)
    }
}

impl From<ScoringError> for PipelineError {
    fn from(value: ScoringError) -> Self {
        PipelineError::Scoring(value)
    }
}

impl From<SearchError> for PipelineError {
    fn from(value: SearchError) -> Self {
        PipelineError::Search(value)
    }
}

/// Load models, library and scoring artifact and validate them against each other.
pub fn open_context(config: &Ms2MatchConfig) -> Result<Arc<SearchContext>, PipelineError> {
    let start = Instant::now();
    let result = assemble(config);
    match &result {
        Ok(ctx) => info!(
            name = config.name.as_deref().unwrap_or("unnamed"),
            library_entries = ctx.index().len(),
            elapsed_micros = start.elapsed().as_micros() as u64,
            "open_context_success"
        ),
        Err(err) => warn!(
            name = config.name.as_deref().unwrap_or("unnamed"),
            error = %err,
            "open_context_failure"
        ),
    }
    result
}

fn assemble(config: &Ms2MatchConfig) -> Result<Arc<SearchContext>, PipelineError> {
    config.validate()?;

    let embedder = EmbeddingGenerator::from_config(&config.embedding)?;
    let secondary = config
        .secondary_embedding
        .as_ref()
        .map(EmbeddingGenerator::from_config)
        .transpose()?
        .map(Arc::new);

    let index = Arc::new(ReferenceIndex::load(&config.library.path, config.library.ann)?);
    let composer = FeatureComposer::new(
        config.features.layout.clone(),
        config.features.settings.clone(),
        secondary,
    )?;
    let model = scoring::load_model(&config.scoring.model_path)?;

    let ctx = SearchContext::new(index, embedder, composer, model, config.search.clone())?;
    Ok(Arc::new(ctx))
}
