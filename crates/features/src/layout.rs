//! Feature names and their order.
//!
//! Every feature has a stable snake_case name; the scoring model artifact
//! lists the names it was trained on and the composer's layout must repeat
//! them in the same order. `mass_match` is parameterized by its window in
//! Dalton and named `mass_match_{within}`, e.g. `mass_match_2`.
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::FeatureError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FeatureKind {
    /// Retrieval similarity of the primary embeddings.
    EmbeddingScore,
    /// Cosine of the secondary-model embeddings.
    SecondaryEmbeddingScore,
    CosineScore,
    /// `1 - 0.93^n` over the greedy cosine matches.
    CosineMatches,
    ModifiedCosineScore,
    ModifiedCosineMatches,
    /// Greedy cosine matches divided by the query peak count.
    MatchedPeakFraction,
    /// `base^|query - library|` on precursor m/z.
    MassSimilarity,
    PrecursorMzDifference,
    /// `|query - library| / query * 100`.
    RelativeMassChange,
    /// 1 when the precursor difference is below `within` Dalton.
    MassMatch { within: f64 },
    QueryPrecursorMz,
    LibraryPrecursorMz,
    /// Mean embedding score of the shortlisted spectra sharing the
    /// candidate's InChIKey14.
    AverageInchikeyScore,
    /// `1 - 0.93^n` over library spectra with the candidate's InChIKey14.
    InchikeyPopularity,
    NeighbourhoodScore,
    NeighbourhoodTanimoto,
}

const MASS_MATCH_PREFIX: &str = "mass_match_";

impl FeatureKind {
    pub fn name(&self) -> String {
        let name = match self {
            FeatureKind::EmbeddingScore => "embedding_score",
            FeatureKind::SecondaryEmbeddingScore => "secondary_embedding_score",
            FeatureKind::CosineScore => "cosine_score",
            FeatureKind::CosineMatches => "cosine_matches",
            FeatureKind::ModifiedCosineScore => "modified_cosine_score",
            FeatureKind::ModifiedCosineMatches => "modified_cosine_matches",
            FeatureKind::MatchedPeakFraction => "matched_peak_fraction",
            FeatureKind::MassSimilarity => "mass_similarity",
            FeatureKind::PrecursorMzDifference => "precursor_mz_difference",
            FeatureKind::RelativeMassChange => "relative_mass_change",
            FeatureKind::MassMatch { within } => return format!("{MASS_MATCH_PREFIX}{within}"),
            FeatureKind::QueryPrecursorMz => "query_precursor_mz",
            FeatureKind::LibraryPrecursorMz => "library_precursor_mz",
            FeatureKind::AverageInchikeyScore => "average_inchikey_score",
            FeatureKind::InchikeyPopularity => "inchikey_popularity",
            FeatureKind::NeighbourhoodScore => "neighbourhood_score",
            FeatureKind::NeighbourhoodTanimoto => "neighbourhood_tanimoto",
        };
        name.to_string()
    }

    /// Needs both precursor m/z values.
    pub fn uses_precursor(&self) -> bool {
        matches!(
            self,
            FeatureKind::ModifiedCosineScore
                | FeatureKind::ModifiedCosineMatches
                | FeatureKind::MassSimilarity
                | FeatureKind::PrecursorMzDifference
                | FeatureKind::RelativeMassChange
                | FeatureKind::MassMatch { .. }
                | FeatureKind::QueryPrecursorMz
                | FeatureKind::LibraryPrecursorMz
        )
    }

    pub fn uses_secondary_embedding(&self) -> bool {
        matches!(self, FeatureKind::SecondaryEmbeddingScore)
    }

    pub fn uses_neighbourhood(&self) -> bool {
        matches!(
            self,
            FeatureKind::NeighbourhoodScore | FeatureKind::NeighbourhoodTanimoto
        )
    }

    fn uses_cosine(&self) -> bool {
        matches!(
            self,
            FeatureKind::CosineScore | FeatureKind::CosineMatches | FeatureKind::MatchedPeakFraction
        )
    }

    fn uses_modified_cosine(&self) -> bool {
        matches!(
            self,
            FeatureKind::ModifiedCosineScore | FeatureKind::ModifiedCosineMatches
        )
    }
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl FromStr for FeatureKind {
    type Err = FeatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s {
            "embedding_score" => FeatureKind::EmbeddingScore,
            "secondary_embedding_score" => FeatureKind::SecondaryEmbeddingScore,
            "cosine_score" => FeatureKind::CosineScore,
            "cosine_matches" => FeatureKind::CosineMatches,
            "modified_cosine_score" => FeatureKind::ModifiedCosineScore,
            "modified_cosine_matches" => FeatureKind::ModifiedCosineMatches,
            "matched_peak_fraction" => FeatureKind::MatchedPeakFraction,
            "mass_similarity" => FeatureKind::MassSimilarity,
            "precursor_mz_difference" => FeatureKind::PrecursorMzDifference,
            "relative_mass_change" => FeatureKind::RelativeMassChange,
            "query_precursor_mz" => FeatureKind::QueryPrecursorMz,
            "library_precursor_mz" => FeatureKind::LibraryPrecursorMz,
            "average_inchikey_score" => FeatureKind::AverageInchikeyScore,
            "inchikey_popularity" => FeatureKind::InchikeyPopularity,
            "neighbourhood_score" => FeatureKind::NeighbourhoodScore,
            "neighbourhood_tanimoto" => FeatureKind::NeighbourhoodTanimoto,
            other => {
                let within = other
                    .strip_prefix(MASS_MATCH_PREFIX)
                    .and_then(|w| w.parse::<f64>().ok())
                    .filter(|w| w.is_finite() && *w > 0.0)
                    .ok_or_else(|| FeatureError::UnknownFeature(other.to_string()))?;
                let kind = FeatureKind::MassMatch { within };
                // Names are compared verbatim against model artifacts.
                if kind.name() != other {
                    return Err(FeatureError::NonCanonicalName {
                        got: other.to_string(),
                        canonical: kind.name(),
                    });
                }
                kind
            }
        };
        Ok(kind)
    }
}

impl TryFrom<String> for FeatureKind {
    type Error = FeatureError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FeatureKind> for String {
    fn from(kind: FeatureKind) -> Self {
        kind.name()
    }
}

/// Ordered list of features fed to the scoring model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureLayout(Vec<FeatureKind>);

impl Default for FeatureLayout {
    fn default() -> Self {
        Self(vec![
            FeatureKind::EmbeddingScore,
            FeatureKind::CosineScore,
            FeatureKind::MassSimilarity,
        ])
    }
}

impl FeatureLayout {
    pub fn new(kinds: Vec<FeatureKind>) -> Self {
        Self(kinds)
    }

    /// Parse a layout from feature names.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, FeatureError> {
        names
            .iter()
            .map(|n| n.as_ref().parse())
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }

    pub fn kinds(&self) -> &[FeatureKind] {
        &self.0
    }

    pub fn names(&self) -> Vec<String> {
        self.0.iter().map(FeatureKind::name).collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn validate(&self) -> Result<(), FeatureError> {
        if self.0.is_empty() {
            return Err(FeatureError::InvalidSettings("feature layout is empty".into()));
        }
        let names = self.names();
        for (i, name) in names.iter().enumerate() {
            if names[..i].contains(name) {
                return Err(FeatureError::InvalidSettings(format!(
                    "feature '{name}' appears twice"
                )));
            }
        }
        Ok(())
    }

    pub fn uses_precursor(&self) -> bool {
        self.0.iter().any(FeatureKind::uses_precursor)
    }

    pub fn uses_secondary_embedding(&self) -> bool {
        self.0.iter().any(FeatureKind::uses_secondary_embedding)
    }

    pub fn uses_neighbourhood(&self) -> bool {
        self.0.iter().any(FeatureKind::uses_neighbourhood)
    }

    pub(crate) fn uses_cosine(&self) -> bool {
        self.0.iter().any(FeatureKind::uses_cosine)
    }

    pub(crate) fn uses_modified_cosine(&self) -> bool {
        self.0.iter().any(FeatureKind::uses_modified_cosine)
    }

    pub(crate) fn uses_inchikey_scores(&self) -> bool {
        self.0.iter().any(|k| {
            matches!(k, FeatureKind::AverageInchikeyScore) || k.uses_neighbourhood()
        })
    }
}
