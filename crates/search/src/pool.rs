//! Bounded worker pool for batch search.
//!
//! One task per query runs on a dedicated rayon pool; each task sends its
//! outcome back over an `mpsc` channel tagged with the query's position. A
//! task that panics, or never reports, yields `SearchError::WorkerLost` for
//! that query only.
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Instant;

use rayon::{ThreadPool, ThreadPoolBuilder};
use spectrum::Spectrum;
use tracing::{error, info};

use crate::{QueryControl, SearchConfig, SearchContext, SearchError, SearchResponse};

/// Result of one query in a batch.
#[derive(Debug)]
pub struct QueryOutcome {
    /// Position of the query in the submitted batch.
    pub index: usize,
    pub query_id: Option<String>,
    pub result: Result<SearchResponse, SearchError>,
}

pub struct WorkerPool {
    pool: ThreadPool,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.workers())
            .finish()
    }
}

impl WorkerPool {
    /// `None` uses the machine's available parallelism.
    pub fn new(workers: Option<usize>) -> Result<Self, SearchError> {
        if workers == Some(0) {
            return Err(SearchError::InvalidConfig("workers must be greater than zero".into()));
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers.unwrap_or(0))
            .thread_name(|i| format!("ms2-search-{i}"))
            .panic_handler(|payload| {
                error!(reason = %panic_message(payload.as_ref()), "search_worker_panic");
            })
            .build()
            .map_err(|e| SearchError::InvalidConfig(e.to_string()))?;
        Ok(Self { pool })
    }

    pub fn from_config(config: &SearchConfig) -> Result<Self, SearchError> {
        Self::new(config.workers)
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub fn run_batch(&self, ctx: Arc<SearchContext>, queries: Vec<Spectrum>) -> Vec<QueryOutcome> {
        self.run_batch_with(ctx, queries, QueryControl::new())
    }

    /// Run every query under `control`. Outcomes come back in submission order.
    pub fn run_batch_with(
        &self,
        ctx: Arc<SearchContext>,
        queries: Vec<Spectrum>,
        control: QueryControl,
    ) -> Vec<QueryOutcome> {
        let start = Instant::now();
        let total = queries.len();
        let mut query_ids = Vec::with_capacity(total);
        let (tx, rx) = mpsc::channel();

        for (position, query) in queries.into_iter().enumerate() {
            query_ids.push(query.metadata().spectrum_id.clone());
            let tx = tx.clone();
            let ctx = Arc::clone(&ctx);
            let control = control.clone();
            self.pool.spawn(move || {
                let result = panic::catch_unwind(AssertUnwindSafe(|| ctx.search_with(&query, &control)))
                    .unwrap_or_else(|payload| {
                        let reason = panic_message(payload.as_ref());
                        error!(query = position, reason = %reason, "search_task_panicked");
                        Err(SearchError::WorkerLost(reason))
                    });
                // The receiver only goes away if the caller stopped waiting.
                let _ = tx.send((position, result));
            });
        }
        drop(tx);

        let mut slots: Vec<Option<Result<SearchResponse, SearchError>>> =
            (0..total).map(|_| None).collect();
        for (position, result) in rx {
            slots[position] = Some(result);
        }

        let outcomes: Vec<QueryOutcome> = slots
            .into_iter()
            .zip(query_ids)
            .enumerate()
            .map(|(index, (slot, query_id))| QueryOutcome {
                index,
                query_id,
                result: slot.unwrap_or_else(|| {
                    Err(SearchError::WorkerLost("task ended without reporting".into()))
                }),
            })
            .collect();

        let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
        info!(
            queries = total,
            failed,
            workers = self.workers(),
            elapsed_micros = start.elapsed().as_micros() as u64,
            "search_batch_complete"
        );
        outcomes
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}
