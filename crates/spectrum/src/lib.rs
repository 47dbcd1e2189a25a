//! MS/MS spectrum representation.
//!
//! Everything upstream of the search engine ends up here: a parser (not part
//! of this workspace) produces peaks and metadata, [`Spectrum::new`] validates
//! them once, and [`ProcessingConfig::process`] turns the result into the
//! [`ProcessedSpectrum`] that embedding models and peak-matching features
//! consume.
//!
//! ## Example
//!
//! ```
//! use spectrum::{Peak, ProcessingConfig, Spectrum, SpectrumMetadata};
//!
//! let spectrum = Spectrum::new(
//!     vec![Peak::new(91.05, 40.0), Peak::new(65.04, 10.0), Peak::new(119.05, 100.0)],
//!     SpectrumMetadata::default().with_precursor_mz(137.06),
//! )
//! .unwrap();
//!
//! let processed = ProcessingConfig::default()
//!     .with_min_peaks(1)
//!     .process(&spectrum)
//!     .unwrap();
//! assert_eq!(processed.peaks()[2].intensity, 1.0);
//! ```

mod error;
mod processing;
mod types;

pub use crate::error::SpectrumError;
pub use crate::processing::{ConfigError, ProcessedSpectrum, ProcessingConfig};
pub use crate::types::{Peak, Spectrum, SpectrumMetadata};
