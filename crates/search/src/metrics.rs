// Metrics hook for the search crate.
//
// An observer is handed to `SearchContext::with_metrics`; there is no global
// recorder, so two contexts in one process can report to different backends.
use std::time::Duration;

use crate::SearchError;

/// Observer for query outcomes.
pub trait SearchMetrics: Send + Sync {
    /// A query finished. `candidates` is the retrieval shortlist size,
    /// `returned` the results after ranking and truncation, `skipped` the
    /// candidates dropped because they could not be scored.
    fn record_query(&self, latency: Duration, candidates: usize, returned: usize, skipped: usize);

    /// A query failed as a whole.
    fn record_failure(&self, latency: Duration, error: &SearchError);
}
