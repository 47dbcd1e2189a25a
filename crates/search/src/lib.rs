//! # MS/MS search orchestration (`search`)
//!
//! Drives each query spectrum through
//! `embed -> retrieve -> featurize -> score -> rank -> truncate`:
//!
//! 1. The [`EmbeddingGenerator`](embedding::EmbeddingGenerator) processes and
//!    embeds the query.
//! 2. The [`ReferenceIndex`](index::ReferenceIndex) returns the `top_k`
//!    most similar library entries.
//! 3. The [`FeatureComposer`](features::FeatureComposer) builds a feature
//!    vector per candidate.
//! 4. The [`Scorer`](scoring::Scorer) turns it into a confidence and a
//!    [`MatchCategory`](scoring::MatchCategory).
//! 5. Results are sorted by confidence (ties by retrieval rank), filtered by
//!    the optional confidence floor and cut to `max_results_per_query`.
//!
//! A candidate that cannot be featurized or scored is logged, reported in
//! [`SearchResponse::skipped`] and left out; it never gets a default score.
//! Query-level failures (bad spectrum, timeout, cancellation) fail only that
//! query.
//!
//! ## Lifecycle
//!
//! [`SearchContext::new`] runs every startup check: non-empty library,
//! matching embedding space, feature layout equal to the scoring model's
//! inputs, library carrying what the layout reads. The context is then shared
//! read-only (`Arc<SearchContext>`) by all queries. Batches go through a
//! [`WorkerPool`]; [`SearchContext::shutdown`] stops new queries.
//!
//! ## Observability
//!
//! Every query runs in a `search.query` span and ends with a `search_success`
//! or `search_failure` event. A [`SearchMetrics`] observer can be attached
//! with [`SearchContext::with_metrics`].

mod config;
mod engine;
mod error;
mod metrics;
mod pool;
mod types;

pub use crate::config::SearchConfig;
pub use crate::engine::SearchContext;
pub use crate::error::{CandidateFailure, CandidateProcessingError, SearchError};
pub use crate::metrics::SearchMetrics;
pub use crate::pool::{QueryOutcome, WorkerPool};
pub use crate::types::{QueryControl, ScoredResult, SearchResponse};
