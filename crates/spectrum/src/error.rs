//! Error types produced by the spectrum crate.
//!
//! Every variant describes a spectrum that cannot be embedded or matched.
//! Downstream crates fold these into their own `InvalidSpectrum` variants so
//! a single malformed query never takes a whole batch down.
//!
//! | Error | Raised by |
//! |-------|-----------|
//! | [`LengthMismatch`](SpectrumError::LengthMismatch) | [`Spectrum::from_arrays`](crate::Spectrum::from_arrays) |
//! | [`NonFinite`](SpectrumError::NonFinite) | construction |
//! | [`NegativeIntensity`](SpectrumError::NegativeIntensity) | construction |
//! | [`DuplicateMz`](SpectrumError::DuplicateMz) | construction |
//! | [`NoPeaks`](SpectrumError::NoPeaks) | processing |
//! | [`TooFewPeaks`](SpectrumError::TooFewPeaks) | processing |
//! | [`MissingMetadata`](SpectrumError::MissingMetadata) | processing, feature composition |
//! | [`InvalidPrecursor`](SpectrumError::InvalidPrecursor) | construction, processing |
use thiserror::Error;

/// Reasons a spectrum is rejected.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SpectrumError {
    /// m/z and intensity arrays differ in length.
    #[error("peak arrays differ in length: {mz} m/z values, {intensities} intensities")]
    LengthMismatch { mz: usize, intensities: usize },
    /// A peak carries NaN or an infinite value.
    #[error("peak {index} has a non-finite m/z or intensity")]
    NonFinite { index: usize },
    /// A peak intensity is below zero.
    #[error("peak {index} has negative intensity {intensity}")]
    NegativeIntensity { index: usize, intensity: f64 },
    /// Two peaks share the same m/z, so the peak list cannot be strictly increasing.
    #[error("duplicate peak at m/z {mz}")]
    DuplicateMz { mz: f64 },
    /// The spectrum has no peaks at all.
    #[error("spectrum has no peaks")]
    NoPeaks,
    /// Fewer peaks than required survived processing.
    #[error("spectrum has {found} peaks after processing, {required} required")]
    TooFewPeaks { found: usize, required: usize },
    /// A metadata field needed by the current stage is absent.
    #[error("missing required metadata field: {0}")]
    MissingMetadata(&'static str),
    /// Precursor m/z is not a positive finite number.
    #[error("invalid precursor m/z {0}")]
    InvalidPrecursor(f64),
}
