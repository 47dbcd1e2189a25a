use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use index::EntryId;
use scoring::MatchCategory;
use serde::Serialize;

use crate::{CandidateProcessingError, SearchError};

/// One scored library candidate. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredResult {
    pub library_id: String,
    #[serde(skip)]
    pub entry: EntryId,
    pub compound_name: Option<String>,
    pub inchikey: Option<String>,
    pub smiles: Option<String>,
    pub query_precursor_mz: Option<f64>,
    pub library_precursor_mz: Option<f64>,
    /// `query - library`, when both precursors are known.
    pub precursor_mz_difference: Option<f64>,
    pub embedding_similarity: f32,
    pub retrieval_rank: usize,
    pub confidence: f32,
    pub category: MatchCategory,
    /// Feature values in layout order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<f32>,
}

/// Ranked results for one query plus the candidates that had to be dropped.
#[derive(Debug, Clone, Default)]
pub struct SearchResponse {
    pub query_id: Option<String>,
    pub results: Vec<ScoredResult>,
    pub skipped: Vec<CandidateProcessingError>,
}

impl SearchResponse {
    pub fn best(&self) -> Option<&ScoredResult> {
        self.results.first()
    }

    pub fn count(&self, category: MatchCategory) -> usize {
        self.results.iter().filter(|r| r.category == category).count()
    }
}

/// Deadline and cancellation for a single query.
///
/// Checked between pipeline stages and before each candidate. Cloning shares
/// the cancel flag.
#[derive(Debug, Clone, Default)]
pub struct QueryControl {
    deadline: Option<Instant>,
    cancel: Option<Arc<AtomicBool>>,
}

impl QueryControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn check(&self) -> Result<(), SearchError> {
        if self
            .cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
        {
            return Err(SearchError::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(SearchError::Timeout);
        }
        Ok(())
    }
}
