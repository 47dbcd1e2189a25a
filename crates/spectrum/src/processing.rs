//! Peak processing shared by library construction and querying.
//!
//! Embeddings are only comparable when the library and the query went
//! through the same [`ProcessingConfig`]. The config therefore has a stable
//! [`fingerprint`](ProcessingConfig::fingerprint) that index artifacts record
//! next to their embeddings.
//!
//! Steps, in order:
//!
//! 1. keep peaks with `mz_from <= mz <= mz_to`
//! 2. scale intensities so the most intense peak is 1.0
//! 3. require at least `min_peaks` peaks
//! 4. keep at most `max(min_peaks, ratio_desired * precursor_mz, 1)` (and at
//!    most `max_peaks`) of the most intense peaks
//! 5. drop peaks below `intensity_from` unless fewer than `min_peaks` would
//!    remain, in which case the `min_peaks` most intense are kept
use std::hash::{Hash, Hasher};

use fxhash::FxHasher64;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;

use crate::error::SpectrumError;
use crate::types::{Peak, Spectrum, SpectrumMetadata};

/// Invalid processing parameters.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("invalid processing config: {0}")]
    Invalid(String),
}

/// Peak filtering and normalization parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Lowest m/z kept.
    pub mz_from: f64,
    /// Highest m/z kept.
    pub mz_to: f64,
    /// Minimum number of peaks a spectrum must keep.
    pub min_peaks: usize,
    /// Peak budget relative to precursor m/z.
    pub ratio_desired: Option<f64>,
    /// Absolute peak budget.
    pub max_peaks: Option<usize>,
    /// Relative intensity floor applied after normalization.
    pub intensity_from: f64,
    /// Reject spectra without a precursor m/z.
    pub require_precursor_mz: bool,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            mz_from: 0.0,
            mz_to: 1000.0,
            min_peaks: 10,
            ratio_desired: Some(0.5),
            max_peaks: None,
            intensity_from: 0.001,
            require_precursor_mz: true,
        }
    }
}

impl ProcessingConfig {
    pub fn with_mz_range(mut self, from: f64, to: f64) -> Self {
        self.mz_from = from;
        self.mz_to = to;
        self
    }

    pub fn with_min_peaks(mut self, min_peaks: usize) -> Self {
        self.min_peaks = min_peaks;
        self
    }

    pub fn with_ratio_desired(mut self, ratio: Option<f64>) -> Self {
        self.ratio_desired = ratio;
        self
    }

    pub fn with_max_peaks(mut self, max_peaks: Option<usize>) -> Self {
        self.max_peaks = max_peaks;
        self
    }

    pub fn with_intensity_from(mut self, intensity_from: f64) -> Self {
        self.intensity_from = intensity_from;
        self
    }

    pub fn with_require_precursor_mz(mut self, required: bool) -> Self {
        self.require_precursor_mz = required;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.mz_from.is_finite() || !self.mz_to.is_finite() || self.mz_from < 0.0 {
            return Err(ConfigError::Invalid(
                "mz_from and mz_to must be finite and non-negative".into(),
            ));
        }
        if self.mz_to <= self.mz_from {
            return Err(ConfigError::Invalid("mz_to must exceed mz_from".into()));
        }
        if !(0.0..1.0).contains(&self.intensity_from) {
            return Err(ConfigError::Invalid(
                "intensity_from must be in [0, 1)".into(),
            ));
        }
        if let Some(ratio) = self.ratio_desired {
            if !ratio.is_finite() || ratio <= 0.0 {
                return Err(ConfigError::Invalid("ratio_desired must be > 0".into()));
            }
        }
        if let Some(max_peaks) = self.max_peaks {
            if max_peaks < self.min_peaks.max(1) {
                return Err(ConfigError::Invalid(
                    "max_peaks must be >= max(min_peaks, 1)".into(),
                ));
            }
        }
        Ok(())
    }

    /// Stable hash of every parameter; equal configs hash equally across runs.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = FxHasher64::default();
        self.mz_from.to_bits().hash(&mut hasher);
        self.mz_to.to_bits().hash(&mut hasher);
        self.min_peaks.hash(&mut hasher);
        self.ratio_desired.map(f64::to_bits).hash(&mut hasher);
        self.max_peaks.hash(&mut hasher);
        self.intensity_from.to_bits().hash(&mut hasher);
        self.require_precursor_mz.hash(&mut hasher);
        hasher.finish()
    }

    /// Apply the processing steps to a spectrum.
    pub fn process(&self, spectrum: &Spectrum) -> Result<ProcessedSpectrum, SpectrumError> {
        if spectrum.is_empty() {
            return Err(SpectrumError::NoPeaks);
        }
        let precursor = spectrum.precursor_mz();
        if self.require_precursor_mz && precursor.is_none() {
            return Err(SpectrumError::MissingMetadata("precursor_mz"));
        }

        let mut peaks: Vec<Peak> = spectrum
            .peaks()
            .iter()
            .filter(|p| p.mz >= self.mz_from && p.mz <= self.mz_to)
            .copied()
            .collect();

        let max = peaks.iter().map(|p| p.intensity).fold(0.0_f64, f64::max);
        if peaks.is_empty() || max <= 0.0 {
            return Err(SpectrumError::NoPeaks);
        }
        for peak in &mut peaks {
            peak.intensity /= max;
        }

        if peaks.len() < self.min_peaks {
            return Err(SpectrumError::TooFewPeaks {
                found: peaks.len(),
                required: self.min_peaks,
            });
        }

        if let Some(limit) = self.peak_budget(precursor) {
            if peaks.len() > limit {
                trace!(
                    spectrum = spectrum.label(),
                    peaks = peaks.len(),
                    limit,
                    "peaks_trimmed"
                );
                peaks = most_intense(peaks, limit);
            }
        }

        if self.intensity_from > 0.0 {
            let kept = peaks
                .iter()
                .filter(|p| p.intensity >= self.intensity_from)
                .count();
            peaks = if kept >= self.min_peaks {
                peaks
                    .into_iter()
                    .filter(|p| p.intensity >= self.intensity_from)
                    .collect()
            } else {
                most_intense(peaks, self.min_peaks)
            };
        }
        if peaks.is_empty() {
            return Err(SpectrumError::NoPeaks);
        }

        let metadata: SpectrumMetadata = spectrum.metadata().clone();
        Ok(ProcessedSpectrum {
            inner: Spectrum::from_sorted_unchecked(peaks, metadata),
        })
    }

    fn peak_budget(&self, precursor: Option<f64>) -> Option<usize> {
        let by_ratio = match (self.ratio_desired, precursor) {
            (Some(ratio), Some(mz)) => Some(((ratio * mz) as usize).max(self.min_peaks).max(1)),
            _ => None,
        };
        match (by_ratio, self.max_peaks) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

/// Keep the `n` most intense peaks, ties broken by lower m/z, returned in m/z order.
fn most_intense(mut peaks: Vec<Peak>, n: usize) -> Vec<Peak> {
    peaks.sort_by(|a, b| {
        b.intensity
            .total_cmp(&a.intensity)
            .then_with(|| a.mz.total_cmp(&b.mz))
    });
    peaks.truncate(n);
    peaks.sort_by(|a, b| a.mz.total_cmp(&b.mz));
    peaks
}

/// A spectrum that has gone through a [`ProcessingConfig`].
///
/// Its most intense peak is exactly 1.0.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedSpectrum {
    inner: Spectrum,
}

impl ProcessedSpectrum {
    pub fn peaks(&self) -> &[Peak] {
        self.inner.peaks()
    }

    pub fn metadata(&self) -> &SpectrumMetadata {
        self.inner.metadata()
    }

    pub fn precursor_mz(&self) -> Option<f64> {
        self.inner.precursor_mz()
    }

    pub fn as_spectrum(&self) -> &Spectrum {
        &self.inner
    }

    pub fn into_spectrum(self) -> Spectrum {
        self.inner
    }
}
