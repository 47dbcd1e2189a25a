use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use embedding::EmbeddingGenerator;
use features::{FeatureComposer, FeatureError, PreparedQuery};
use index::{Candidate, ReferenceIndex};
use scoring::{Scorer, ScoringError, ScoringModel};
use spectrum::Spectrum;
use tracing::{debug, info, info_span, warn};

use crate::error::CandidateFailure;
use crate::metrics::SearchMetrics;
use crate::{
    CandidateProcessingError, QueryControl, ScoredResult, SearchConfig, SearchError,
    SearchResponse,
};

#[cfg(test)]
mod tests;

/// Everything a query needs, validated once and then shared read-only.
///
/// Build it with [`SearchContext::new`], wrap it in an `Arc` and hand it to
/// every query or to a [`WorkerPool`](crate::WorkerPool).
pub struct SearchContext {
    index: Arc<ReferenceIndex>,
    embedder: EmbeddingGenerator,
    composer: FeatureComposer,
    scorer: Scorer,
    config: SearchConfig,
    metrics: Option<Arc<dyn SearchMetrics>>,
    closed: AtomicBool,
}

impl fmt::Debug for SearchContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchContext")
            .field("library_entries", &self.index.len())
            .field("embedder", &self.embedder)
            .field("composer", &self.composer)
            .field("scorer", &self.scorer)
            .field("config", &self.config)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

enum CandidateOutcome {
    Scored(ScoredResult),
    Skipped(CandidateProcessingError),
}

impl SearchContext {
    /// Validate the whole deployment and build the context.
    ///
    /// Fails on an empty library, a library built with a different embedding
    /// model, a feature layout the scoring model was not trained on, or a
    /// library missing data the layout reads.
    pub fn new(
        index: Arc<ReferenceIndex>,
        embedder: EmbeddingGenerator,
        composer: FeatureComposer,
        model: Arc<dyn ScoringModel>,
        config: SearchConfig,
    ) -> Result<Self, SearchError> {
        config.validate()?;
        if index.is_empty() {
            return Err(SearchError::EmptyLibrary);
        }
        index.space().ensure_compatible(&embedder.space())?;
        composer.validate_against(model.feature_names())?;
        composer.validate_library(&index)?;
        let scorer = Scorer::new(model, config.thresholds())?;

        info!(
            library_entries = index.len(),
            dimension = index.dimension(),
            ann = index.uses_ann(),
            embedding_model = embedder.name(),
            scoring_model = scorer.model().name(),
            features = composer.dimension(),
            top_k = config.top_k,
            "search_context_ready"
        );
        Ok(Self {
            index,
            embedder,
            composer,
            scorer,
            config,
            metrics: None,
            closed: AtomicBool::new(false),
        })
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn SearchMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn index(&self) -> &Arc<ReferenceIndex> {
        &self.index
    }

    pub fn embedder(&self) -> &EmbeddingGenerator {
        &self.embedder
    }

    pub fn composer(&self) -> &FeatureComposer {
        &self.composer
    }

    pub fn scorer(&self) -> &Scorer {
        &self.scorer
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Stop accepting queries. Queries already running finish normally.
    pub fn shutdown(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            info!(library_entries = self.index.len(), "search_context_shutdown");
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Search with the configured timeout, if any.
    pub fn search(&self, spectrum: &Spectrum) -> Result<SearchResponse, SearchError> {
        self.search_with(spectrum, &QueryControl::new())
    }

    /// Search under an explicit deadline/cancel flag. The configured timeout
    /// applies when `control` carries no deadline of its own.
    pub fn search_with(
        &self,
        spectrum: &Spectrum,
        control: &QueryControl,
    ) -> Result<SearchResponse, SearchError> {
        let span = info_span!("search.query", query = spectrum.label());
        let _guard = span.enter();
        let start = Instant::now();

        let control = match (control.deadline(), self.config.query_timeout()) {
            (None, Some(timeout)) => control.clone().with_timeout(timeout),
            _ => control.clone(),
        };

        let result = self.run_query(spectrum, &control);
        let latency = start.elapsed();
        match &result {
            Ok((response, candidates)) => {
                info!(
                    candidates = *candidates,
                    results = response.results.len(),
                    skipped = response.skipped.len(),
                    elapsed_micros = latency.as_micros() as u64,
                    "search_success"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_query(
                        latency,
                        *candidates,
                        response.results.len(),
                        response.skipped.len(),
                    );
                }
            }
            Err(err) => {
                warn!(
                    error = %err,
                    elapsed_micros = latency.as_micros() as u64,
                    "search_failure"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_failure(latency, err);
                }
            }
        }
        result.map(|(response, _)| response)
    }

    fn run_query(
        &self,
        spectrum: &Spectrum,
        control: &QueryControl,
    ) -> Result<(SearchResponse, usize), SearchError> {
        if self.is_shut_down() {
            return Err(SearchError::ShutDown);
        }
        control.check()?;

        let processed = self.embedder.prepare(spectrum)?;
        let embedding = self.embedder.embed_processed(&processed)?;
        control.check()?;

        let candidates = self.index.top_k(&embedding.vector, self.config.top_k)?;
        debug!(candidates = candidates.len(), "candidates_retrieved");
        control.check()?;

        let prepared = self
            .composer
            .prepare(spectrum, &processed, &candidates, &self.index)?;

        let mut results = Vec::with_capacity(candidates.len());
        let mut skipped = Vec::new();
        for candidate in &candidates {
            control.check()?;
            match self.score_candidate(&prepared, candidate)? {
                CandidateOutcome::Scored(result) => results.push(result),
                CandidateOutcome::Skipped(err) => {
                    warn!(
                        library_id = %err.library_id,
                        rank = err.rank,
                        error = %err.error,
                        "candidate_skipped"
                    );
                    skipped.push(err);
                }
            }
        }

        rank_results(&mut results);
        if let Some(floor) = self.config.min_confidence_floor {
            results.retain(|r| r.confidence >= floor);
        }
        if let Some(max) = self.config.max_results_per_query {
            results.truncate(max);
        }

        let response = SearchResponse {
            query_id: spectrum.metadata().spectrum_id.clone(),
            results,
            skipped,
        };
        Ok((response, candidates.len()))
    }

    fn score_candidate(
        &self,
        prepared: &PreparedQuery,
        candidate: &Candidate,
    ) -> Result<CandidateOutcome, SearchError> {
        let Some(entry) = self.index.entry(candidate.entry) else {
            let err = FeatureError::UnknownEntry(candidate.entry);
            return Ok(self.skip(candidate, CandidateFailure::Feature(err)));
        };
        let features = match self.composer.features(prepared, candidate, &self.index) {
            Ok(features) => features,
            Err(err) if err.is_candidate_error() => {
                return Ok(self.skip(candidate, CandidateFailure::Feature(err)));
            }
            Err(err) => return Err(err.into()),
        };

        let score = match self.scorer.score(features.values()) {
            Ok(score) => score,
            // Layout and model were checked against each other at startup.
            Err(err @ ScoringError::DimensionMismatch { .. }) => return Err(err.into()),
            Err(err) => return Ok(self.skip(candidate, CandidateFailure::Scoring(err))),
        };

        let query_precursor_mz = prepared.precursor_mz();
        let library_precursor_mz = entry.precursor_mz();
        let precursor_mz_difference = match (query_precursor_mz, library_precursor_mz) {
            (Some(q), Some(l)) => Some(q - l),
            _ => None,
        };

        Ok(CandidateOutcome::Scored(ScoredResult {
            library_id: entry.id.clone(),
            entry: candidate.entry,
            compound_name: entry.metadata.compound_name.clone(),
            inchikey: entry.metadata.inchikey.clone(),
            smiles: entry.metadata.smiles.clone(),
            query_precursor_mz,
            library_precursor_mz,
            precursor_mz_difference,
            embedding_similarity: candidate.similarity,
            retrieval_rank: candidate.rank,
            confidence: score.confidence,
            category: score.category,
            features: features.into_inner(),
        }))
    }

    fn skip(&self, candidate: &Candidate, error: CandidateFailure) -> CandidateOutcome {
        let library_id = self
            .index
            .entry(candidate.entry)
            .map(|e| e.id.clone())
            .unwrap_or_else(|| candidate.entry.to_string());
        CandidateOutcome::Skipped(CandidateProcessingError {
            library_id,
            entry: candidate.entry,
            rank: candidate.rank,
            error,
        })
    }
}

/// Descending confidence; ties keep retrieval order.
fn rank_results(results: &mut [ScoredResult]) {
    results.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then(a.retrieval_rank.cmp(&b.retrieval_rank))
    });
}
