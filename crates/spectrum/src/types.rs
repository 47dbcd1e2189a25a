//! Core spectrum data model.
//!
//! ```text
//! Spectrum
//! ├── peaks: Vec<Peak>           (m/z strictly increasing, intensity >= 0)
//! └── metadata: SpectrumMetadata
//!     ├── spectrum_id, compound_name, formula, inchikey, smiles
//!     ├── precursor_mz: Option<f64>
//!     ├── charge: Option<i32>
//!     └── retention_time: Option<f64>
//! ```
//!
//! A [`Spectrum`] is validated once at construction and never mutated
//! afterwards. Deserialization goes through the same validation.
use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::error::SpectrumError;

/// One fragment peak.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Peak {
    pub mz: f64,
    pub intensity: f64,
}

impl Peak {
    pub const fn new(mz: f64, intensity: f64) -> Self {
        Self { mz, intensity }
    }
}

/// Descriptive fields attached to a spectrum.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpectrumMetadata {
    #[serde(default)]
    pub spectrum_id: Option<String>,
    #[serde(default)]
    pub precursor_mz: Option<f64>,
    #[serde(default)]
    pub charge: Option<i32>,
    #[serde(default)]
    pub compound_name: Option<String>,
    #[serde(default)]
    pub formula: Option<String>,
    #[serde(default)]
    pub inchikey: Option<String>,
    #[serde(default)]
    pub smiles: Option<String>,
    #[serde(default)]
    pub retention_time: Option<f64>,
}

impl SpectrumMetadata {
    pub fn with_spectrum_id(mut self, id: impl Into<String>) -> Self {
        self.spectrum_id = Some(id.into());
        self
    }

    pub fn with_precursor_mz(mut self, mz: f64) -> Self {
        self.precursor_mz = Some(mz);
        self
    }

    pub fn with_charge(mut self, charge: i32) -> Self {
        self.charge = Some(charge);
        self
    }

    pub fn with_compound_name(mut self, name: impl Into<String>) -> Self {
        self.compound_name = Some(name.into());
        self
    }

    pub fn with_inchikey(mut self, inchikey: impl Into<String>) -> Self {
        self.inchikey = Some(inchikey.into());
        self
    }

    pub fn with_smiles(mut self, smiles: impl Into<String>) -> Self {
        self.smiles = Some(smiles.into());
        self
    }

    /// First 14 characters of the InChIKey (the connectivity layer).
    ///
    /// Spectra of stereoisomers share this block, so it is the grouping key
    /// used for per-structure statistics.
    pub fn inchikey14(&self) -> Option<&str> {
        self.inchikey
            .as_deref()
            .map(str::trim)
            .and_then(|key| key.get(..14))
    }
}

/// Validated, immutable MS/MS spectrum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SpectrumParts", into = "SpectrumParts")]
pub struct Spectrum {
    peaks: Vec<Peak>,
    metadata: SpectrumMetadata,
}

#[derive(Serialize, Deserialize)]
struct SpectrumParts {
    peaks: Vec<Peak>,
    #[serde(default)]
    metadata: SpectrumMetadata,
}

impl TryFrom<SpectrumParts> for Spectrum {
    type Error = SpectrumError;

    fn try_from(parts: SpectrumParts) -> Result<Self, Self::Error> {
        Spectrum::new(parts.peaks, parts.metadata)
    }
}

impl From<Spectrum> for SpectrumParts {
    fn from(spectrum: Spectrum) -> Self {
        SpectrumParts {
            peaks: spectrum.peaks,
            metadata: spectrum.metadata,
        }
    }
}

impl Spectrum {
    /// Build a spectrum from peaks in any order.
    ///
    /// Peaks are sorted by m/z. Non-finite values, negative intensities,
    /// duplicate m/z values and a non-positive precursor m/z are rejected.
    pub fn new(mut peaks: Vec<Peak>, metadata: SpectrumMetadata) -> Result<Self, SpectrumError> {
        for (index, peak) in peaks.iter().enumerate() {
            if !peak.mz.is_finite() || !peak.intensity.is_finite() {
                return Err(SpectrumError::NonFinite { index });
            }
            if peak.intensity < 0.0 {
                return Err(SpectrumError::NegativeIntensity {
                    index,
                    intensity: peak.intensity,
                });
            }
        }

        if let Some(precursor) = metadata.precursor_mz {
            if !precursor.is_finite() || precursor <= 0.0 {
                return Err(SpectrumError::InvalidPrecursor(precursor));
            }
        }

        peaks.sort_by(|a, b| a.mz.total_cmp(&b.mz));
        if let Some(pair) = peaks.windows(2).find(|w| w[0].mz == w[1].mz) {
            return Err(SpectrumError::DuplicateMz { mz: pair[0].mz });
        }

        Ok(Self { peaks, metadata })
    }

    /// Build a spectrum from parallel m/z and intensity arrays.
    pub fn from_arrays(
        mz: &[f64],
        intensities: &[f64],
        metadata: SpectrumMetadata,
    ) -> Result<Self, SpectrumError> {
        if mz.len() != intensities.len() {
            return Err(SpectrumError::LengthMismatch {
                mz: mz.len(),
                intensities: intensities.len(),
            });
        }
        let peaks = mz
            .iter()
            .zip(intensities)
            .map(|(&mz, &intensity)| Peak { mz, intensity })
            .collect();
        Self::new(peaks, metadata)
    }

    pub fn peaks(&self) -> &[Peak] {
        &self.peaks
    }

    pub fn metadata(&self) -> &SpectrumMetadata {
        &self.metadata
    }

    pub fn len(&self) -> usize {
        self.peaks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty()
    }

    pub fn precursor_mz(&self) -> Option<f64> {
        self.metadata.precursor_mz
    }

    /// Precursor m/z, or [`SpectrumError::MissingMetadata`] when absent.
    pub fn require_precursor_mz(&self) -> Result<f64, SpectrumError> {
        self.metadata
            .precursor_mz
            .ok_or(SpectrumError::MissingMetadata("precursor_mz"))
    }

    /// Identifier used in logs; falls back to `"<anonymous>"`.
    pub fn label(&self) -> &str {
        self.metadata
            .spectrum_id
            .as_deref()
            .unwrap_or("<anonymous>")
    }

    pub fn max_intensity(&self) -> f64 {
        self.peaks
            .iter()
            .map(|p| p.intensity)
            .max_by(f64::total_cmp)
            .unwrap_or(0.0)
    }

    pub fn into_parts(self) -> (Vec<Peak>, SpectrumMetadata) {
        (self.peaks, self.metadata)
    }

    /// Rebuild from peaks that are already known to be valid and sorted.
    pub(crate) fn from_sorted_unchecked(peaks: Vec<Peak>, metadata: SpectrumMetadata) -> Self {
        debug_assert!(peaks
            .windows(2)
            .all(|w| w[0].mz.total_cmp(&w[1].mz) == Ordering::Less));
        Self { peaks, metadata }
    }
}
