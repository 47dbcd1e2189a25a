use std::time::Duration;

use scoring::Thresholds;
use serde::{Deserialize, Serialize};

use crate::SearchError;

/// Per-deployment search knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Candidates retrieved from the index per query.
    pub top_k: usize,
    /// Minimum confidence for an exact match.
    pub exact_threshold: f32,
    /// Minimum confidence for an analog.
    pub analog_threshold: f32,
    /// Keep at most this many results per query.
    pub max_results_per_query: Option<usize>,
    /// Drop results below this confidence.
    pub min_confidence_floor: Option<f32>,
    pub query_timeout_ms: Option<u64>,
    /// Worker threads for batch search; defaults to available parallelism.
    pub workers: Option<usize>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            top_k: 2000,
            exact_threshold: 0.85,
            analog_threshold: 0.7,
            max_results_per_query: Some(10),
            min_confidence_floor: None,
            query_timeout_ms: None,
            workers: None,
        }
    }
}

impl SearchConfig {
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_thresholds(mut self, exact: f32, analog: f32) -> Self {
        self.exact_threshold = exact;
        self.analog_threshold = analog;
        self
    }

    pub fn with_max_results(mut self, max: Option<usize>) -> Self {
        self.max_results_per_query = max;
        self
    }

    pub fn with_confidence_floor(mut self, floor: Option<f32>) -> Self {
        self.min_confidence_floor = floor;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.query_timeout_ms = timeout.map(|t| t.as_millis() as u64);
        self
    }

    pub fn with_workers(mut self, workers: Option<usize>) -> Self {
        self.workers = workers;
        self
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            exact: self.exact_threshold,
            analog: self.analog_threshold,
        }
    }

    pub fn query_timeout(&self) -> Option<Duration> {
        self.query_timeout_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> Result<(), SearchError> {
        if self.top_k == 0 {
            return Err(SearchError::InvalidConfig("top_k must be greater than zero".into()));
        }
        self.thresholds()
            .validate()
            .map_err(|e| SearchError::InvalidConfig(e.to_string()))?;
        if self.max_results_per_query == Some(0) {
            return Err(SearchError::InvalidConfig(
                "max_results_per_query must be greater than zero".into(),
            ));
        }
        if let Some(floor) = self.min_confidence_floor {
            if !(0.0..=1.0).contains(&floor) {
                return Err(SearchError::InvalidConfig(
                    "min_confidence_floor must be within [0, 1]".into(),
                ));
            }
        }
        if self.query_timeout_ms == Some(0) {
            return Err(SearchError::InvalidConfig(
                "query_timeout_ms must be greater than zero".into(),
            ));
        }
        if self.workers == Some(0) {
            return Err(SearchError::InvalidConfig("workers must be greater than zero".into()));
        }
        Ok(())
    }
}
