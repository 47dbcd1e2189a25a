//! Feature vectors for retrieved library candidates.
//!
//! The retrieval step only compares embeddings. Before a candidate is scored
//! the [`FeatureComposer`] looks at it more closely: greedy peak matching
//! (cosine and modified cosine), precursor mass agreement, secondary-model
//! similarity and structure statistics such as how well other spectra of the
//! same compound, or of closely related compounds, scored for this query.
//!
//! Work is split in two steps:
//!
//! - [`FeatureComposer::prepare`] runs once per query (secondary embedding,
//!   per-InChIKey14 shortlist averages) and fails the whole query on error.
//! - [`FeatureComposer::features`] runs per candidate and fails only that
//!   candidate.
//!
//! The layout is checked once at startup against the scoring model
//! ([`FeatureComposer::validate_against`]) and the library
//! ([`FeatureComposer::validate_library`]).

mod composer;
mod error;
mod layout;
pub mod peaks;
mod settings;

pub use crate::composer::{FeatureComposer, FeatureVector, PreparedQuery};
pub use crate::error::FeatureError;
pub use crate::layout::{FeatureKind, FeatureLayout};
pub use crate::settings::FeatureSettings;
