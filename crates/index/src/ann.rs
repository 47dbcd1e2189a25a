//! Approximate nearest neighbour retrieval over library embeddings.
//!
//! Below [`AnnConfig::min_vectors_for_ann`] the index scans every row of the
//! embedding arena. At or above it an HNSW graph (`hnsw_rs`, cosine distance)
//! is built over arena positions. The graph only proposes positions: the
//! index asks it for `k * oversample` neighbours and re-scores them exactly
//! from the arena, so reported similarities are never approximations.
//!
//! ## Trade-offs
//!
//! - **Speed**: sub-linear query time on large libraries
//! - **Recall**: a true neighbour can be missed; raise `ef_search` or
//!   `oversample` to compensate
//! - **Build time**: the graph is rebuilt whenever a library is loaded

use hnsw_rs::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// HNSW needs a handful of points before its layer heuristics make sense.
const MIN_GRAPH_POINTS: usize = 10;

/// Configuration for ANN index construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnConfig {
    /// Number of neighbors per node (higher = better recall, slower build).
    /// Default: 16
    pub m: usize,
    /// Size of dynamic candidate list during construction.
    /// Default: 200
    pub ef_construction: usize,
    /// Size of dynamic candidate list during search.
    /// Default: 50
    pub ef_search: usize,
    /// Graph neighbours fetched per requested candidate before exact rescoring.
    /// Default: 2
    pub oversample: usize,
    /// Whether to use ANN or always scan.
    /// Default: true
    pub enabled: bool,
    /// Minimum number of library entries before ANN is used.
    /// Default: 1000
    pub min_vectors_for_ann: usize,
}

impl Default for AnnConfig {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 200,
            ef_search: 50,
            oversample: 2,
            enabled: true,
            min_vectors_for_ann: 1000,
        }
    }
}

impl AnnConfig {
    pub fn with_m(mut self, m: usize) -> Self {
        self.m = m;
        self
    }

    pub fn with_ef_construction(mut self, ef: usize) -> Self {
        self.ef_construction = ef;
        self
    }

    pub fn with_ef_search(mut self, ef: usize) -> Self {
        self.ef_search = ef;
        self
    }

    pub fn with_oversample(mut self, oversample: usize) -> Self {
        self.oversample = oversample;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_min_vectors_for_ann(mut self, min: usize) -> Self {
        self.min_vectors_for_ann = min;
        self
    }

    /// Check if ANN should be used given the library size.
    pub fn should_use_ann(&self, num_vectors: usize) -> bool {
        self.enabled
            && num_vectors >= self.min_vectors_for_ann
            && num_vectors >= MIN_GRAPH_POINTS
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.m == 0 || self.ef_construction == 0 || self.ef_search == 0 {
            return Err("ann m, ef_construction and ef_search must be > 0".into());
        }
        if self.oversample == 0 {
            return Err("ann oversample must be >= 1".into());
        }
        Ok(())
    }
}

/// HNSW graph over arena positions.
pub(crate) struct AnnGraph {
    hnsw: Hnsw<'static, f32, DistCosine>,
    ef_search: usize,
    oversample: usize,
}

impl AnnGraph {
    /// Build the graph over a row-major arena, or `None` when the library is
    /// too small or ANN is disabled.
    pub(crate) fn build(arena: &[f32], dimension: usize, cfg: &AnnConfig) -> Option<Self> {
        if dimension == 0 {
            return None;
        }
        let nb_elem = arena.len() / dimension;
        if !cfg.should_use_ann(nb_elem) {
            return None;
        }

        let nb_layer = 16.min((nb_elem as f32).ln().trunc() as usize);
        let hnsw = Hnsw::<f32, DistCosine>::new(
            cfg.m,
            nb_elem,
            nb_layer,
            cfg.ef_construction,
            DistCosine {},
        );

        let rows: Vec<Vec<f32>> = arena.chunks_exact(dimension).map(<[f32]>::to_vec).collect();
        let data_for_insertion: Vec<(&Vec<f32>, usize)> =
            rows.iter().enumerate().map(|(idx, v)| (v, idx)).collect();
        hnsw.parallel_insert(&data_for_insertion);

        debug!(
            entries = nb_elem,
            m = cfg.m,
            ef_construction = cfg.ef_construction,
            "ann_graph_built"
        );
        Some(Self {
            hnsw,
            ef_search: cfg.ef_search,
            oversample: cfg.oversample,
        })
    }

    /// Arena positions of up to `k * oversample` approximate neighbours.
    pub(crate) fn neighbours(&self, query: &[f32], k: usize, len: usize) -> Vec<usize> {
        let want = k.saturating_mul(self.oversample).min(len).max(1);
        let ef = self.ef_search.max(want);
        self.hnsw
            .search(query, want, ef)
            .into_iter()
            .map(|neighbour| neighbour.get_origin_id())
            .filter(|&position| position < len)
            .collect()
    }
}
