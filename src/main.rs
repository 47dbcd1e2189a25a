use std::env;
use std::fs;
use std::io::{self, Write};

use anyhow::{bail, Context, Result};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ms2match::{open_context, Ms2MatchConfig, ScoredResult, Spectrum, WorkerPool};

#[derive(Serialize)]
struct QueryReport<'a> {
    index: usize,
    query_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    results: &'a [ScoredResult],
    skipped: usize,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .json()
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() != 3 {
        bail!("usage: {} <config.yaml> <queries.json>", args[0]);
    }

    let config = Ms2MatchConfig::from_file(&args[1])
        .with_context(|| format!("loading config {}", args[1]))?;
    let ctx = open_context(&config)?;

    let raw = fs::read_to_string(&args[2]).with_context(|| format!("reading {}", args[2]))?;
    let queries: Vec<Spectrum> =
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", args[2]))?;
    info!(queries = queries.len(), "queries_loaded");

    let pool = WorkerPool::from_config(ctx.config())?;
    let outcomes = pool.run_batch(ctx.clone(), queries);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for outcome in &outcomes {
        let report = match &outcome.result {
            Ok(response) => QueryReport {
                index: outcome.index,
                query_id: outcome.query_id.as_deref(),
                error: None,
                results: &response.results,
                skipped: response.skipped.len(),
            },
            Err(err) => QueryReport {
                index: outcome.index,
                query_id: outcome.query_id.as_deref(),
                error: Some(err.to_string()),
                results: &[],
                skipped: 0,
            },
        };
        serde_json::to_writer(&mut out, &report)?;
        writeln!(out)?;
    }

    ctx.shutdown();
    Ok(())
}
