use super::*;
use std::sync::atomic::AtomicBool;
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant};

use embedding::{BinnedDenseModel, Binning};
use features::{FeatureLayout, FeatureSettings};
use index::{AnnConfig, IndexBuilder};
use scoring::{LogisticModel, MatchCategory};
use spectrum::{Peak, ProcessingConfig, SpectrumError, SpectrumMetadata};

use crate::{QueryControl, SearchMetrics, WorkerPool};

const LAYOUT: [&str; 3] = ["embedding_score", "cosine_score", "mass_similarity"];

fn embedder_named(name: &str) -> EmbeddingGenerator {
    let model = BinnedDenseModel::new(
        name,
        Binning::new(100.0, 110.0, 1.0).with_intensity_power(1.0),
        Vec::new(),
    )
    .unwrap();
    EmbeddingGenerator::new(Arc::new(model), ProcessingConfig::default().with_min_peaks(1))
}

fn embedder() -> EmbeddingGenerator {
    embedder_named("binned-identity")
}

fn spectrum(id: &str, peaks: &[(f64, f64)], precursor: Option<f64>, name: &str) -> Spectrum {
    let mut meta = SpectrumMetadata::default()
        .with_spectrum_id(id)
        .with_compound_name(name);
    meta.precursor_mz = precursor;
    Spectrum::new(peaks.iter().map(|&(mz, i)| Peak::new(mz, i)).collect(), meta).unwrap()
}

fn alpha() -> Spectrum {
    spectrum("q-alpha", &[(101.0, 1.0), (103.0, 0.5), (105.0, 0.2)], Some(300.0), "alpha")
}

fn library() -> Arc<ReferenceIndex> {
    let g = embedder();
    let mut builder = IndexBuilder::new(g.space());
    let entries = [
        spectrum("lib-a", &[(101.0, 1.0), (103.0, 0.5), (105.0, 0.2)], Some(300.0), "alpha"),
        spectrum("lib-b", &[(102.0, 1.0), (104.0, 0.6)], Some(320.0), "beta"),
        spectrum("lib-c", &[(101.0, 1.0), (103.0, 0.5), (107.0, 0.3)], Some(300.5), "gamma"),
    ];
    for s in &entries {
        builder
            .insert_spectrum(s.label(), s, &g, None)
            .unwrap();
    }
    Arc::new(builder.build(AnnConfig::default()).unwrap())
}

fn composer() -> FeatureComposer {
    FeatureComposer::new(
        FeatureLayout::from_names(&LAYOUT).unwrap(),
        FeatureSettings::default(),
        None,
    )
    .unwrap()
}

fn logistic() -> Arc<dyn ScoringModel> {
    let names = layout_names().to_vec();
    Arc::new(LogisticModel::new("lr", names, vec![4.0, 4.0, 4.0], -8.0).unwrap())
}

fn context(config: SearchConfig) -> SearchContext {
    SearchContext::new(library(), embedder(), composer(), logistic(), config).unwrap()
}

fn layout_names() -> &'static [String] {
    static NAMES: OnceLock<Vec<String>> = OnceLock::new();
    NAMES.get_or_init(|| LAYOUT.iter().map(|s| s.to_string()).collect())
}

/// Fails every candidate whose embedding score is below 0.5.
struct Picky;

impl ScoringModel for Picky {
    fn name(&self) -> &str {
        "picky"
    }

    fn feature_names(&self) -> &[String] {
        layout_names()
    }

    fn predict(&self, features: &[f32]) -> Result<f32, ScoringError> {
        if features[0] < 0.5 {
            return Err(ScoringError::Inference("unsupported region".into()));
        }
        Ok(features[0])
    }
}

#[derive(Default)]
struct Recorder {
    queries: Mutex<Vec<(usize, usize, usize)>>,
    failures: Mutex<Vec<String>>,
}

impl SearchMetrics for Recorder {
    fn record_query(&self, _latency: Duration, candidates: usize, returned: usize, skipped: usize) {
        self.queries
            .lock()
            .unwrap()
            .push((candidates, returned, skipped));
    }

    fn record_failure(&self, _latency: Duration, error: &SearchError) {
        self.failures.lock().unwrap().push(error.to_string());
    }
}

#[test]
fn identical_query_is_an_exact_match() {
    let ctx = context(SearchConfig::default());
    let response = ctx.search(&alpha()).unwrap();

    assert_eq!(response.query_id.as_deref(), Some("q-alpha"));
    let best = response.best().unwrap();
    assert_eq!(best.library_id, "lib-a");
    assert_eq!(best.category, MatchCategory::ExactMatch);
    assert!(best.confidence > ctx.config().exact_threshold);
    assert_eq!(best.retrieval_rank, 0);
    assert_eq!(best.compound_name.as_deref(), Some("alpha"));
    assert_eq!(best.precursor_mz_difference, Some(0.0));
    assert_eq!(best.features.len(), LAYOUT.len());
    assert!(response.skipped.is_empty());
}

#[test]
fn results_are_ranked_by_confidence() {
    let ctx = context(SearchConfig::default());
    let response = ctx.search(&alpha()).unwrap();
    let ids: Vec<&str> = response.results.iter().map(|r| r.library_id.as_str()).collect();
    assert_eq!(ids, ["lib-a", "lib-c", "lib-b"]);
    for pair in response.results.windows(2) {
        assert!(pair[0].confidence >= pair[1].confidence);
    }
    assert_eq!(response.results[2].category, MatchCategory::BelowThreshold);
}

#[test]
fn truncation_and_floor() {
    let ctx = context(SearchConfig::default().with_max_results(Some(1)));
    assert_eq!(ctx.search(&alpha()).unwrap().results.len(), 1);

    let ctx = context(
        SearchConfig::default()
            .with_max_results(None)
            .with_confidence_floor(Some(0.5)),
    );
    let response = ctx.search(&alpha()).unwrap();
    assert_eq!(response.results.len(), 2);
    assert!(response.results.iter().all(|r| r.confidence >= 0.5));
}

#[test]
fn top_k_bounds_the_candidate_set() {
    let recorder = Arc::new(Recorder::default());
    let ctx = context(SearchConfig::default().with_top_k(2)).with_metrics(recorder.clone());
    let response = ctx.search(&alpha()).unwrap();
    assert_eq!(response.results.len(), 2);
    assert_eq!(recorder.queries.lock().unwrap()[0], (2, 2, 0));
}

#[test]
fn repeated_queries_are_identical() {
    let ctx = context(SearchConfig::default());
    let first = ctx.search(&alpha()).unwrap();
    let second = ctx.search(&alpha()).unwrap();
    assert_eq!(first.results, second.results);
}

#[test]
fn raising_exact_threshold_never_adds_exact_matches() {
    let mut previous = usize::MAX;
    for exact in [0.7, 0.85, 0.95, 0.97, 0.99, 1.0] {
        let ctx = context(SearchConfig::default().with_thresholds(exact, 0.7));
        let count = ctx.search(&alpha()).unwrap().count(MatchCategory::ExactMatch);
        assert!(count <= previous, "threshold {exact} gave {count} > {previous}");
        previous = count;
    }
}

#[test]
fn failing_candidates_are_skipped_not_defaulted() {
    let recorder = Arc::new(Recorder::default());
    let ctx = SearchContext::new(
        library(),
        embedder(),
        composer(),
        Arc::new(Picky),
        SearchConfig::default(),
    )
    .unwrap()
    .with_metrics(recorder.clone());

    let response = ctx.search(&alpha()).unwrap();
    let ids: Vec<&str> = response.results.iter().map(|r| r.library_id.as_str()).collect();
    assert_eq!(ids, ["lib-a", "lib-c"]);
    assert_eq!(response.skipped.len(), 1);
    let skipped = &response.skipped[0];
    assert_eq!(skipped.library_id, "lib-b");
    assert_eq!(skipped.rank, 2);
    assert!(matches!(
        skipped.error,
        CandidateFailure::Scoring(ScoringError::Inference(_))
    ));
    assert_eq!(recorder.queries.lock().unwrap()[0], (3, 2, 1));
}

#[test]
fn empty_library_fails_at_startup() {
    let g = embedder();
    let empty = IndexBuilder::new(g.space())
        .build(AnnConfig::default())
        .unwrap();
    let result = SearchContext::new(
        Arc::new(empty),
        g,
        composer(),
        logistic(),
        SearchConfig::default(),
    );
    assert!(matches!(result, Err(SearchError::EmptyLibrary)));
}

#[test]
fn layout_must_match_scoring_model() {
    let short = Arc::new(
        LogisticModel::new("lr", vec!["embedding_score".into()], vec![1.0], 0.0).unwrap(),
    );
    let result = SearchContext::new(library(), embedder(), composer(), short, SearchConfig::default());
    assert!(matches!(
        result,
        Err(SearchError::DimensionMismatch {
            expected: 1,
            got: 3
        })
    ));

    let reordered = Arc::new(
        LogisticModel::new(
            "lr",
            vec![
                "cosine_score".into(),
                "embedding_score".into(),
                "mass_similarity".into(),
            ],
            vec![1.0; 3],
            0.0,
        )
        .unwrap(),
    );
    let result = SearchContext::new(library(), embedder(), composer(), reordered, SearchConfig::default());
    assert!(matches!(
        result,
        Err(SearchError::Feature(FeatureError::LayoutMismatch { position: 0, .. }))
    ));
}

#[test]
fn embedder_must_match_library_space() {
    let result = SearchContext::new(
        library(),
        embedder_named("other-model"),
        composer(),
        logistic(),
        SearchConfig::default(),
    );
    assert!(matches!(result, Err(SearchError::IncompatibleLibrary(_))));
}

#[test]
fn invalid_config_fails_at_startup() {
    let result = SearchContext::new(
        library(),
        embedder(),
        composer(),
        logistic(),
        SearchConfig::default().with_thresholds(0.5, 0.9),
    );
    assert!(matches!(result, Err(SearchError::InvalidConfig(_))));
}

#[test]
fn invalid_queries_fail_alone() {
    let recorder = Arc::new(Recorder::default());
    let ctx = context(SearchConfig::default()).with_metrics(recorder.clone());

    let no_precursor = spectrum("q-x", &[(101.0, 1.0)], None, "x");
    assert!(matches!(
        ctx.search(&no_precursor),
        Err(SearchError::InvalidSpectrum(SpectrumError::MissingMetadata(
            "precursor_mz"
        )))
    ));

    // All peaks fall outside the model's bins: nothing to embed.
    let out_of_range = spectrum("q-y", &[(500.0, 1.0)], Some(600.0), "y");
    assert!(matches!(
        ctx.search(&out_of_range),
        Err(SearchError::Embedding(_))
    ));

    assert!(ctx.search(&alpha()).is_ok());
    assert_eq!(recorder.failures.lock().unwrap().len(), 2);
    assert_eq!(recorder.queries.lock().unwrap().len(), 1);
}

#[test]
fn cancel_and_deadline() {
    let ctx = context(SearchConfig::default());
    let flag = Arc::new(AtomicBool::new(true));
    let cancelled = QueryControl::new().with_cancel_flag(flag);
    assert!(matches!(
        ctx.search_with(&alpha(), &cancelled),
        Err(SearchError::Cancelled)
    ));

    let expired = QueryControl::new().with_deadline(Instant::now());
    assert!(matches!(
        ctx.search_with(&alpha(), &expired),
        Err(SearchError::Timeout)
    ));
}

#[test]
fn shutdown_rejects_new_queries() {
    let ctx = context(SearchConfig::default());
    assert!(!ctx.is_shut_down());
    ctx.shutdown();
    ctx.shutdown();
    assert!(ctx.is_shut_down());
    assert!(matches!(ctx.search(&alpha()), Err(SearchError::ShutDown)));
}

#[test]
fn batch_outcomes_keep_submission_order() {
    let ctx = Arc::new(context(SearchConfig::default()));
    let pool = WorkerPool::new(Some(2)).unwrap();
    let queries = vec![
        alpha(),
        spectrum("q-bad", &[(101.0, 1.0)], None, "bad"),
        spectrum("q-beta", &[(102.0, 1.0), (104.0, 0.6)], Some(320.0), "beta"),
    ];

    let outcomes = pool.run_batch(Arc::clone(&ctx), queries);
    assert_eq!(outcomes.len(), 3);
    for (i, outcome) in outcomes.iter().enumerate() {
        assert_eq!(outcome.index, i);
    }
    assert_eq!(outcomes[0].query_id.as_deref(), Some("q-alpha"));
    assert_eq!(
        outcomes[0].result.as_ref().unwrap().best().unwrap().library_id,
        "lib-a"
    );
    assert!(matches!(
        outcomes[1].result,
        Err(SearchError::InvalidSpectrum(_))
    ));
    assert_eq!(
        outcomes[2].result.as_ref().unwrap().best().unwrap().library_id,
        "lib-b"
    );
}

/// Panics on the first feature being exactly 1.0.
struct Fragile;

impl ScoringModel for Fragile {
    fn name(&self) -> &str {
        "fragile"
    }

    fn feature_names(&self) -> &[String] {
        layout_names()
    }

    fn predict(&self, features: &[f32]) -> Result<f32, ScoringError> {
        assert!(features[0] < 0.999, "model blew up");
        Ok(0.5)
    }
}

#[test]
fn panicking_query_is_reported_as_worker_lost() {
    let ctx = Arc::new(
        SearchContext::new(
            library(),
            embedder(),
            composer(),
            Arc::new(Fragile),
            SearchConfig::default(),
        )
        .unwrap(),
    );
    let pool = WorkerPool::new(Some(2)).unwrap();
    // The second query has no exact twin in the library, so Fragile never panics on it.
    let other = spectrum("q-other", &[(101.0, 1.0), (106.0, 0.4)], Some(300.0), "other");
    let outcomes = pool.run_batch(ctx, vec![alpha(), other]);

    match &outcomes[0].result {
        Err(SearchError::WorkerLost(reason)) => assert!(reason.contains("model blew up")),
        other => panic!("expected WorkerLost, got {other:?}"),
    }
    assert!(outcomes[1].result.is_ok());
}
