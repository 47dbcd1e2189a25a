use std::sync::Arc;

use embedding::normalize::cosine_similarity;
use embedding::EmbeddingGenerator;
use hashbrown::HashMap;
use index::{Candidate, LibraryEntry, ReferenceIndex};
use spectrum::{Peak, ProcessedSpectrum, Spectrum};
use tracing::debug;

use crate::layout::{FeatureKind, FeatureLayout};
use crate::peaks::{cosine_greedy, modified_cosine, PeakMatch};
use crate::settings::FeatureSettings;
use crate::FeatureError;

/// Feature values in layout order.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector(Vec<f32>);

impl FeatureVector {
    pub fn values(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }
}

/// Per-query state shared by all of its candidates.
#[derive(Debug, Clone)]
pub struct PreparedQuery {
    peaks: Vec<Peak>,
    precursor_mz: Option<f64>,
    secondary: Option<Vec<f32>>,
    /// Mean retrieval similarity per InChIKey14 over the shortlist.
    inchikey_scores: HashMap<String, f32>,
}

impl PreparedQuery {
    pub fn precursor_mz(&self) -> Option<f64> {
        self.precursor_mz
    }

    pub fn inchikey_score(&self, inchikey14: &str) -> Option<f32> {
        self.inchikey_scores.get(inchikey14).copied()
    }
}

/// Builds feature vectors for (query, candidate) pairs.
#[derive(Debug, Clone)]
pub struct FeatureComposer {
    layout: FeatureLayout,
    settings: FeatureSettings,
    secondary: Option<Arc<EmbeddingGenerator>>,
}

impl FeatureComposer {
    pub fn new(
        layout: FeatureLayout,
        settings: FeatureSettings,
        secondary: Option<Arc<EmbeddingGenerator>>,
    ) -> Result<Self, FeatureError> {
        layout.validate()?;
        settings.validate()?;
        if layout.uses_secondary_embedding() && secondary.is_none() {
            return Err(FeatureError::MissingSecondaryModel);
        }
        Ok(Self {
            layout,
            settings,
            secondary,
        })
    }

    pub fn layout(&self) -> &FeatureLayout {
        &self.layout
    }

    pub fn settings(&self) -> &FeatureSettings {
        &self.settings
    }

    pub fn names(&self) -> Vec<String> {
        self.layout.names()
    }

    pub fn dimension(&self) -> usize {
        self.layout.len()
    }

    /// Whether queries must carry a precursor m/z.
    pub fn requires_precursor(&self) -> bool {
        self.layout.uses_precursor()
    }

    /// Check the layout against the feature names a scoring model was trained on.
    pub fn validate_against(&self, model_features: &[String]) -> Result<(), FeatureError> {
        if model_features.len() != self.layout.len() {
            return Err(FeatureError::DimensionMismatch {
                expected: model_features.len(),
                got: self.layout.len(),
            });
        }
        for (position, (expected, got)) in model_features.iter().zip(self.names()).enumerate() {
            if *expected != got {
                if let Err(err @ FeatureError::NonCanonicalName { .. }) =
                    expected.parse::<FeatureKind>()
                {
                    return Err(err);
                }
                return Err(FeatureError::LayoutMismatch {
                    position,
                    expected: expected.clone(),
                    got,
                });
            }
        }
        Ok(())
    }

    /// Check that the library carries what the layout reads.
    pub fn validate_library(&self, index: &ReferenceIndex) -> Result<(), FeatureError> {
        if let Some(generator) = self.secondary.as_ref().filter(|_| self.layout.uses_secondary_embedding()) {
            let library_space = index.secondary_space().ok_or_else(|| {
                FeatureError::IncompatibleLibrary("library has no secondary embeddings".into())
            })?;
            library_space
                .ensure_compatible(&generator.space())
                .map_err(|e| FeatureError::IncompatibleLibrary(e.to_string()))?;
            let missing = index
                .entries()
                .iter()
                .filter(|e| e.secondary_embedding.is_none())
                .count();
            if missing > 0 {
                return Err(FeatureError::IncompatibleLibrary(format!(
                    "{missing} library entries lack a secondary embedding"
                )));
            }
        }
        if self.layout.uses_neighbourhood() && index.neighbourhood().is_none() {
            return Err(FeatureError::IncompatibleLibrary(
                "library has no structure neighbourhood table".into(),
            ));
        }
        Ok(())
    }

    /// Compute the per-query state. Fails for the whole query.
    pub fn prepare(
        &self,
        raw: &Spectrum,
        processed: &ProcessedSpectrum,
        candidates: &[Candidate],
        index: &ReferenceIndex,
    ) -> Result<PreparedQuery, FeatureError> {
        let precursor_mz = processed.precursor_mz();
        if self.layout.uses_precursor() && precursor_mz.is_none() {
            return Err(FeatureError::QueryWithoutPrecursor);
        }

        let secondary = match &self.secondary {
            Some(generator) if self.layout.uses_secondary_embedding() => {
                Some(generator.embed(raw)?.vector)
            }
            _ => None,
        };

        let inchikey_scores = if self.layout.uses_inchikey_scores() {
            average_by_inchikey(candidates, index)
        } else {
            HashMap::new()
        };

        debug!(
            candidates = candidates.len(),
            inchikeys = inchikey_scores.len(),
            "query_prepared"
        );
        Ok(PreparedQuery {
            peaks: processed.peaks().to_vec(),
            precursor_mz,
            secondary,
            inchikey_scores,
        })
    }

    /// Feature vector for one candidate. Fails for this candidate only.
    pub fn features(
        &self,
        query: &PreparedQuery,
        candidate: &Candidate,
        index: &ReferenceIndex,
    ) -> Result<FeatureVector, FeatureError> {
        let entry = index
            .entry(candidate.entry)
            .ok_or(FeatureError::UnknownEntry(candidate.entry))?;
        let s = &self.settings;

        let precursors = if self.layout.uses_precursor() {
            let q = query.precursor_mz.ok_or(FeatureError::QueryWithoutPrecursor)?;
            let l = entry
                .precursor_mz()
                .ok_or_else(|| FeatureError::LibraryWithoutPrecursor {
                    library_id: entry.id.clone(),
                })?;
            Some((q, l))
        } else {
            None
        };

        let cosine = self.layout.uses_cosine().then(|| {
            cosine_greedy(&query.peaks, &entry.peaks, s.tolerance, s.mz_power, s.intensity_power)
        });
        let modified = match precursors {
            Some((q, l)) if self.layout.uses_modified_cosine() => Some(modified_cosine(
                &query.peaks,
                &entry.peaks,
                q - l,
                s.tolerance,
                s.mz_power,
                s.intensity_power,
            )),
            _ => None,
        };

        let mut values = Vec::with_capacity(self.layout.len());
        for kind in self.layout.kinds() {
            let value = match *kind {
                FeatureKind::EmbeddingScore => f64::from(candidate.similarity),
                FeatureKind::SecondaryEmbeddingScore => self.secondary_score(query, entry)?,
                FeatureKind::CosineScore => peak_match(cosine).score,
                FeatureKind::CosineMatches => s.transform_count(peak_match(cosine).matches),
                FeatureKind::ModifiedCosineScore => peak_match(modified).score,
                FeatureKind::ModifiedCosineMatches => {
                    s.transform_count(peak_match(modified).matches)
                }
                FeatureKind::MatchedPeakFraction => {
                    if query.peaks.is_empty() {
                        0.0
                    } else {
                        peak_match(cosine).matches as f64 / query.peaks.len() as f64
                    }
                }
                FeatureKind::MassSimilarity => {
                    s.mass_similarity_base.powf(mass_difference(precursors))
                }
                FeatureKind::PrecursorMzDifference => mass_difference(precursors),
                FeatureKind::RelativeMassChange => {
                    let (q, _) = precursors.unwrap_or((f64::NAN, f64::NAN));
                    mass_difference(precursors) / q * 100.0
                }
                FeatureKind::MassMatch { within } => {
                    if mass_difference(precursors) < within {
                        1.0
                    } else {
                        0.0
                    }
                }
                FeatureKind::QueryPrecursorMz => {
                    precursors.map_or(f64::NAN, |(q, _)| q) / s.max_precursor_mz
                }
                FeatureKind::LibraryPrecursorMz => {
                    precursors.map_or(f64::NAN, |(_, l)| l) / s.max_precursor_mz
                }
                FeatureKind::AverageInchikeyScore => match entry.inchikey14() {
                    Some(key) => query
                        .inchikey_score(key)
                        .map_or(f64::from(candidate.similarity), f64::from),
                    None => f64::from(candidate.similarity),
                },
                FeatureKind::InchikeyPopularity => entry
                    .inchikey14()
                    .map_or(0.0, |key| s.transform_count(index.inchikey_count(key))),
                FeatureKind::NeighbourhoodScore => self.neighbourhood(query, entry, index).0,
                FeatureKind::NeighbourhoodTanimoto => self.neighbourhood(query, entry, index).1,
            };
            let value = value as f32;
            if !value.is_finite() {
                return Err(FeatureError::NonFinite {
                    feature: kind.name(),
                    library_id: entry.id.clone(),
                });
            }
            values.push(value);
        }
        Ok(FeatureVector(values))
    }

    fn secondary_score(&self, query: &PreparedQuery, entry: &LibraryEntry) -> Result<f64, FeatureError> {
        let library = entry.secondary_embedding.as_ref().ok_or_else(|| {
            FeatureError::MissingSecondaryEmbedding {
                library_id: entry.id.clone(),
            }
        })?;
        let query = query.secondary.as_ref().ok_or(FeatureError::MissingSecondaryModel)?;
        Ok(f64::from(cosine_similarity(query, library)))
    }

    /// Tanimoto-weighted shortlist score of the closest related structures,
    /// and their mean tanimoto. Zero when none of them was shortlisted.
    fn neighbourhood(&self, query: &PreparedQuery, entry: &LibraryEntry, index: &ReferenceIndex) -> (f64, f64) {
        let (Some(key), Some(table)) = (entry.inchikey14(), index.neighbourhood()) else {
            return (0.0, 0.0);
        };
        let mut weighted = 0.0;
        let mut weights = 0.0;
        let mut count = 0usize;
        for related in table.related(key).iter().take(self.settings.neighbourhood_size) {
            if let Some(score) = query.inchikey_score(&related.inchikey14) {
                let t = f64::from(related.tanimoto);
                weighted += t * f64::from(score);
                weights += t;
                count += 1;
            }
        }
        if count == 0 {
            return (0.0, 0.0);
        }
        let score = if weights > 0.0 { weighted / weights } else { 0.0 };
        (score, weights / count as f64)
    }
}

fn peak_match(m: Option<PeakMatch>) -> PeakMatch {
    m.unwrap_or(PeakMatch {
        score: 0.0,
        matches: 0,
    })
}

/// NaN when precursors are missing, which `features` reports as non-finite.
fn mass_difference(precursors: Option<(f64, f64)>) -> f64 {
    precursors.map_or(f64::NAN, |(q, l)| (q - l).abs())
}

fn average_by_inchikey(candidates: &[Candidate], index: &ReferenceIndex) -> HashMap<String, f32> {
    let mut sums: HashMap<String, (f64, usize)> = HashMap::new();
    for candidate in candidates {
        if let Some(key) = index.entry(candidate.entry).and_then(LibraryEntry::inchikey14) {
            let slot = sums.entry(key.to_string()).or_insert((0.0, 0));
            slot.0 += f64::from(candidate.similarity);
            slot.1 += 1;
        }
    }
    sums.into_iter()
        .map(|(key, (sum, n))| (key, (sum / n as f64) as f32))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedding::{BinnedDenseModel, Binning, EmbeddingSpace};
    use index::{AnnConfig, EntryId, IndexBuilder, RelatedStructure, StructureNeighbourhood};
    use spectrum::{ProcessingConfig, SpectrumMetadata};

    const IK_A: &str = "AAAAAAAAAAAAAA-BBBBBBBBBB-N";
    const IK_B: &str = "CCCCCCCCCCCCCC-BBBBBBBBBB-N";

    fn processing() -> ProcessingConfig {
        ProcessingConfig::default().with_min_peaks(1)
    }

    fn spectrum(peaks: &[(f64, f64)], precursor: Option<f64>, inchikey: Option<&str>) -> Spectrum {
        let mut meta = SpectrumMetadata::default();
        meta.precursor_mz = precursor;
        meta.inchikey = inchikey.map(str::to_string);
        Spectrum::new(peaks.iter().map(|&(mz, i)| Peak::new(mz, i)).collect(), meta).unwrap()
    }

    fn entry(id: &str, s: &Spectrum) -> LibraryEntry {
        let processed = processing().with_require_precursor_mz(false).process(s).unwrap();
        LibraryEntry::new(id, processed)
    }

    fn library(entries: Vec<(LibraryEntry, [f32; 2])>, neighbourhood: Option<StructureNeighbourhood>) -> ReferenceIndex {
        let mut builder = IndexBuilder::new(EmbeddingSpace::new("toy", 2, processing()));
        if let Some(n) = neighbourhood {
            builder = builder.with_neighbourhood(n);
        }
        for (e, v) in entries {
            builder.push(e, &v).unwrap();
        }
        builder.build(AnnConfig::default()).unwrap()
    }

    fn composer(names: &[&str]) -> FeatureComposer {
        FeatureComposer::new(
            FeatureLayout::from_names(names).unwrap(),
            FeatureSettings::default(),
            None,
        )
        .unwrap()
    }

    fn prepared(c: &FeatureComposer, q: &Spectrum, candidates: &[Candidate], index: &ReferenceIndex) -> PreparedQuery {
        let processed = processing().process(q).unwrap();
        c.prepare(q, &processed, candidates, index).unwrap()
    }

    #[test]
    fn identical_spectrum_features() {
        let peaks = [(100.0, 1.0), (150.0, 0.5), (200.0, 0.25)];
        let q = spectrum(&peaks, Some(250.0), None);
        let index = library(vec![(entry("lib", &q), [1.0, 0.0])], None);
        let c = composer(&[
            "embedding_score",
            "cosine_score",
            "cosine_matches",
            "mass_similarity",
            "precursor_mz_difference",
            "mass_match_2",
            "matched_peak_fraction",
        ]);
        let candidates = index.top_k(&[1.0, 0.0], 1).unwrap();
        let pq = prepared(&c, &q, &candidates, &index);
        let v = c.features(&pq, &candidates[0], &index).unwrap();

        assert_eq!(v.len(), 7);
        let v = v.values();
        assert!((v[0] - 1.0).abs() < 1e-6);
        assert!((v[1] - 1.0).abs() < 1e-6);
        assert!((v[2] - (1.0 - 0.93f32.powi(3))).abs() < 1e-6);
        assert_eq!(v[3], 1.0);
        assert_eq!(v[4], 0.0);
        assert_eq!(v[5], 1.0);
        assert_eq!(v[6], 1.0);
    }

    #[test]
    fn mass_features_follow_precursor_difference() {
        let q = spectrum(&[(100.0, 1.0)], Some(300.0), None);
        let lib = spectrum(&[(100.0, 1.0)], Some(302.0), None);
        let index = library(vec![(entry("lib", &lib), [1.0, 0.0])], None);
        let c = composer(&[
            "mass_similarity",
            "precursor_mz_difference",
            "relative_mass_change",
            "mass_match_2",
            "query_precursor_mz",
            "library_precursor_mz",
        ]);
        let candidates = index.top_k(&[1.0, 0.0], 1).unwrap();
        let pq = prepared(&c, &q, &candidates, &index);
        let v = c.features(&pq, &candidates[0], &index).unwrap().into_inner();

        assert!((v[0] - 0.64).abs() < 1e-6);
        assert!((v[1] - 2.0).abs() < 1e-6);
        assert!((v[2] - 2.0 / 3.0).abs() < 1e-5);
        assert_eq!(v[3], 0.0);
        assert!((v[4] - (300.0 / 13428.370894192036) as f32).abs() < 1e-7);
        assert!((v[5] - (302.0 / 13428.370894192036) as f32).abs() < 1e-7);
    }

    #[test]
    fn library_entry_without_precursor_fails_candidate_only() {
        let q = spectrum(&[(100.0, 1.0)], Some(300.0), None);
        let lib = spectrum(&[(100.0, 1.0)], None, None);
        let index = library(vec![(entry("broken", &lib), [1.0, 0.0])], None);
        let c = composer(&["embedding_score", "mass_similarity"]);
        let candidates = index.top_k(&[1.0, 0.0], 1).unwrap();
        let pq = prepared(&c, &q, &candidates, &index);

        let err = c.features(&pq, &candidates[0], &index).unwrap_err();
        assert!(matches!(err, FeatureError::LibraryWithoutPrecursor { .. }));
        assert!(err.is_candidate_error());
    }

    #[test]
    fn query_without_precursor_fails_prepare() {
        let q = spectrum(&[(100.0, 1.0)], None, None);
        let index = library(vec![(entry("lib", &spectrum(&[(100.0, 1.0)], Some(1.0), None)), [1.0, 0.0])], None);
        let c = composer(&["mass_similarity"]);
        let processed = processing().with_require_precursor_mz(false).process(&q).unwrap();
        let result = c.prepare(&q, &processed, &[], &index);
        assert!(matches!(result, Err(FeatureError::QueryWithoutPrecursor)));
    }

    #[test]
    fn inchikey_statistics() {
        let s = spectrum(&[(100.0, 1.0)], Some(200.0), Some(IK_A));
        let other = spectrum(&[(100.0, 1.0)], Some(200.0), Some(IK_B));
        let index = library(
            vec![
                (entry("a1", &s), [1.0, 0.0]),
                (entry("a2", &s), [0.0, 1.0]),
                (entry("b1", &other), [1.0, 1.0]),
            ],
            None,
        );
        let c = composer(&["average_inchikey_score", "inchikey_popularity"]);
        let candidates = index.top_k(&[1.0, 0.0], 3).unwrap();
        let pq = prepared(&c, &s, &candidates, &index);

        let a1 = candidates.iter().find(|c| c.entry == EntryId(0)).unwrap();
        let v = c.features(&pq, a1, &index).unwrap().into_inner();
        // a1 has similarity 1, a2 has 0
        assert!((v[0] - 0.5).abs() < 1e-6);
        assert!((v[1] - (1.0 - 0.93f32 * 0.93)).abs() < 1e-6);
    }

    #[test]
    fn neighbourhood_scores_use_shortlisted_relatives() {
        let mut table = StructureNeighbourhood::new();
        table
            .insert(
                "AAAAAAAAAAAAAA",
                vec![
                    RelatedStructure::new("CCCCCCCCCCCCCC", 0.8),
                    RelatedStructure::new("DDDDDDDDDDDDDD", 0.6),
                ],
            )
            .unwrap();
        let a = spectrum(&[(100.0, 1.0)], Some(200.0), Some(IK_A));
        let b = spectrum(&[(100.0, 1.0)], Some(200.0), Some(IK_B));
        let index = library(
            vec![(entry("a", &a), [1.0, 0.0]), (entry("b", &b), [0.6, 0.8])],
            Some(table),
        );
        let c = composer(&["neighbourhood_score", "neighbourhood_tanimoto"]);
        c.validate_library(&index).unwrap();
        let candidates = index.top_k(&[1.0, 0.0], 2).unwrap();
        let pq = prepared(&c, &a, &candidates, &index);

        let v = c.features(&pq, &candidates[0], &index).unwrap().into_inner();
        // only CCCC.. is shortlisted, with score 0.6
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        // b has no neighbourhood entry
        let v = c.features(&pq, &candidates[1], &index).unwrap().into_inner();
        assert_eq!(v, vec![0.0, 0.0]);
    }

    #[test]
    fn neighbourhood_features_need_table() {
        let s = spectrum(&[(100.0, 1.0)], Some(200.0), None);
        let index = library(vec![(entry("a", &s), [1.0, 0.0])], None);
        let c = composer(&["neighbourhood_score"]);
        assert!(matches!(
            c.validate_library(&index),
            Err(FeatureError::IncompatibleLibrary(_))
        ));
    }

    #[test]
    fn validate_against_model_names() {
        let c = composer(&["embedding_score", "cosine_score"]);
        assert!(c
            .validate_against(&["embedding_score".into(), "cosine_score".into()])
            .is_ok());
        assert!(matches!(
            c.validate_against(&["embedding_score".into()]),
            Err(FeatureError::DimensionMismatch { expected: 1, got: 2 })
        ));
        assert!(matches!(
            c.validate_against(&["cosine_score".into(), "embedding_score".into()]),
            Err(FeatureError::LayoutMismatch { position: 0, .. })
        ));
    }

    #[test]
    fn model_with_decimal_mass_window_gets_a_spelling_error() {
        let c = composer(&["embedding_score", "mass_match_2"]);
        assert!(c
            .validate_against(&["embedding_score".into(), "mass_match_2".into()])
            .is_ok());
        match c.validate_against(&["embedding_score".into(), "mass_match_2.0".into()]) {
            Err(FeatureError::NonCanonicalName { got, canonical }) => {
                assert_eq!(got, "mass_match_2.0");
                assert_eq!(canonical, "mass_match_2");
            }
            other => panic!("expected a spelling error, got {other:?}"),
        }
    }

    #[test]
    fn secondary_layout_requires_generator() {
        let result = FeatureComposer::new(
            FeatureLayout::from_names(&["secondary_embedding_score"]).unwrap(),
            FeatureSettings::default(),
            None,
        );
        assert!(matches!(result, Err(FeatureError::MissingSecondaryModel)));
    }

    #[test]
    fn secondary_embedding_score_compares_secondary_vectors() {
        let model = BinnedDenseModel::new(
            "secondary",
            Binning::new(99.5, 101.5, 1.0).with_intensity_power(1.0),
            Vec::new(),
        )
        .unwrap();
        let generator = Arc::new(EmbeddingGenerator::new(Arc::new(model), processing()));
        let s = spectrum(&[(100.0, 1.0), (101.0, 1.0)], Some(200.0), None);

        let mut builder = IndexBuilder::new(EmbeddingSpace::new("toy", 2, processing()))
            .with_secondary_space(generator.space());
        builder
            .push(entry("with", &s).with_secondary_embedding(vec![1.0, 1.0]), &[1.0, 0.0])
            .unwrap();
        builder
            .push(entry("without", &s), &[0.0, 1.0])
            .unwrap();
        let index = builder.build(AnnConfig::default()).unwrap();

        let c = FeatureComposer::new(
            FeatureLayout::from_names(&["secondary_embedding_score"]).unwrap(),
            FeatureSettings::default(),
            Some(generator),
        )
        .unwrap();
        assert!(matches!(
            c.validate_library(&index),
            Err(FeatureError::IncompatibleLibrary(_))
        ));

        let candidates = index.top_k(&[1.0, 0.0], 2).unwrap();
        let pq = prepared(&c, &s, &candidates, &index);
        let v = c.features(&pq, &candidates[0], &index).unwrap();
        assert!((v.values()[0] - 1.0).abs() < 1e-6);
        assert!(matches!(
            c.features(&pq, &candidates[1], &index),
            Err(FeatureError::MissingSecondaryEmbedding { .. })
        ));
    }
}
