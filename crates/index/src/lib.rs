//! # Reference index
//!
//! In-memory reference spectral library with top-k embedding retrieval.
//!
//! ## Layout
//!
//! - **Entries**: one [`LibraryEntry`] per reference spectrum (id, metadata,
//!   processed peaks, optional secondary embedding), addressed by
//!   [`EntryId`], its position in the library.
//! - **Arena**: every primary embedding, L2-normalized, in one contiguous
//!   row-major `Vec<f32>`. Row `i` belongs to `EntryId(i)`.
//! - **Search structure**: a brute-force scan for small libraries and an
//!   HNSW graph over arena positions for large ones, see [`ann`].
//! - **Statistics**: InChIKey14 counts and an optional
//!   [`StructureNeighbourhood`] used by structure-aware features.
//!
//! A library is built once with [`IndexBuilder`], persisted with
//! [`ReferenceIndex::save`] and opened with [`ReferenceIndex::load`]. It is
//! never mutated afterwards and can be shared between threads freely.
//!
//! ## Example
//!
//! ```
//! use embedding::EmbeddingSpace;
//! use index::{AnnConfig, IndexBuilder, LibraryEntry};
//! use spectrum::{Peak, ProcessingConfig, SpectrumMetadata};
//!
//! let space = EmbeddingSpace::new("toy", 2, ProcessingConfig::default());
//! let mut builder = IndexBuilder::new(space);
//! for (id, v) in [("a", [1.0f32, 0.0]), ("b", [0.0, 1.0]), ("c", [0.9, 0.1])] {
//!     let entry = LibraryEntry {
//!         id: id.into(),
//!         metadata: SpectrumMetadata::default(),
//!         peaks: vec![Peak::new(100.0, 1.0)],
//!         secondary_embedding: None,
//!     };
//!     builder.push(entry, &v).unwrap();
//! }
//! let index = builder.build(AnnConfig::default()).unwrap();
//!
//! let hits = index.top_k(&[1.0, 0.0], 2).unwrap();
//! assert_eq!(index.entry(hits[0].entry).unwrap().id, "a");
//! assert_eq!(index.entry(hits[1].entry).unwrap().id, "c");
//! ```

pub mod ann;
mod artifact;
mod builder;
mod entry;
mod error;
mod neighbourhood;

use std::cmp::Ordering;
use std::fmt;
use std::path::Path;
use std::time::Instant;

use embedding::normalize::{l2_norm, l2_normalize_in_place};
use embedding::EmbeddingSpace;
use hashbrown::HashMap;
use tracing::{debug, info};

use crate::ann::AnnGraph;
use crate::artifact::PayloadRef;

pub use crate::ann::AnnConfig;
pub use crate::artifact::{CompressionCodec, CompressionConfig, INDEX_SCHEMA_VERSION};
pub use crate::builder::IndexBuilder;
pub use crate::entry::{Candidate, EntryId, LibraryEntry};
pub use crate::error::IndexError;
pub use crate::neighbourhood::{RelatedStructure, StructureNeighbourhood};

/// Frozen reference library.
pub struct ReferenceIndex {
    space: EmbeddingSpace,
    secondary_space: Option<EmbeddingSpace>,
    entries: Vec<LibraryEntry>,
    /// Row-major, L2-normalized primary embeddings.
    vectors: Vec<f32>,
    by_id: HashMap<String, EntryId>,
    inchikey_counts: HashMap<String, usize>,
    neighbourhood: Option<StructureNeighbourhood>,
    ann: AnnConfig,
    graph: Option<AnnGraph>,
}

impl fmt::Debug for ReferenceIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReferenceIndex")
            .field("space", &self.space)
            .field("entries", &self.entries.len())
            .field("secondary_space", &self.secondary_space)
            .field("neighbourhood", &self.neighbourhood.as_ref().map(|n| n.len()))
            .field("ann", &self.graph.is_some())
            .finish()
    }
}

impl ReferenceIndex {
    pub(crate) fn assemble(
        space: EmbeddingSpace,
        secondary_space: Option<EmbeddingSpace>,
        entries: Vec<LibraryEntry>,
        vectors: Vec<f32>,
        neighbourhood: Option<StructureNeighbourhood>,
        ann: AnnConfig,
    ) -> Result<Self, IndexError> {
        ann.validate().map_err(IndexError::InvalidConfig)?;
        let dimension = space.dimension;
        if dimension == 0 {
            return Err(IndexError::InvalidConfig(
                "embedding dimension must be > 0".into(),
            ));
        }
        if vectors.len() != entries.len() * dimension {
            return Err(IndexError::Decode(format!(
                "{} entries need {} vector values, found {}",
                entries.len(),
                entries.len() * dimension,
                vectors.len()
            )));
        }

        let mut by_id = HashMap::with_capacity(entries.len());
        let mut inchikey_counts: HashMap<String, usize> = HashMap::new();
        for (position, entry) in entries.iter().enumerate() {
            let position = u32::try_from(position)
                .map_err(|_| IndexError::InvalidVector("library exceeds u32::MAX entries".into()))?;
            if by_id.insert(entry.id.clone(), EntryId(position)).is_some() {
                return Err(IndexError::DuplicateId(entry.id.clone()));
            }
            if let Some(key) = entry.inchikey14() {
                *inchikey_counts.entry(key.to_string()).or_insert(0) += 1;
            }
        }

        let graph = AnnGraph::build(&vectors, dimension, &ann);
        Ok(Self {
            space,
            secondary_space,
            entries,
            vectors,
            by_id,
            inchikey_counts,
            neighbourhood,
            ann,
            graph,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.space.dimension
    }

    /// Space of the primary (retrieval) embeddings.
    pub fn space(&self) -> &EmbeddingSpace {
        &self.space
    }

    /// Space of the per-entry secondary embeddings, if any.
    pub fn secondary_space(&self) -> Option<&EmbeddingSpace> {
        self.secondary_space.as_ref()
    }

    pub fn entry(&self, id: EntryId) -> Option<&LibraryEntry> {
        self.entries.get(id.index())
    }

    pub fn entries(&self) -> &[LibraryEntry] {
        &self.entries
    }

    /// Normalized primary embedding of an entry.
    pub fn vector(&self, id: EntryId) -> Option<&[f32]> {
        let dim = self.space.dimension;
        let start = id.index().checked_mul(dim)?;
        self.vectors.get(start..start + dim)
    }

    pub fn find(&self, library_id: &str) -> Option<EntryId> {
        self.by_id.get(library_id).copied()
    }

    /// Number of library spectra whose InChIKey starts with `inchikey14`.
    pub fn inchikey_count(&self, inchikey14: &str) -> usize {
        self.inchikey_counts.get(inchikey14).copied().unwrap_or(0)
    }

    pub fn neighbourhood(&self) -> Option<&StructureNeighbourhood> {
        self.neighbourhood.as_ref()
    }

    pub fn ann_config(&self) -> &AnnConfig {
        &self.ann
    }

    /// Whether queries go through the HNSW graph.
    pub fn uses_ann(&self) -> bool {
        self.graph.is_some()
    }

    /// The `k` entries most similar to `query`, by descending cosine
    /// similarity; ties go to the earlier entry. Returns every entry when
    /// `k` exceeds the library size.
    pub fn top_k(&self, query: &[f32], k: usize) -> Result<Vec<Candidate>, IndexError> {
        if self.is_empty() {
            return Err(IndexError::EmptyLibrary);
        }
        let dim = self.space.dimension;
        if query.len() != dim {
            return Err(IndexError::DimensionMismatch {
                expected: dim,
                got: query.len(),
            });
        }
        if query.iter().any(|v| !v.is_finite()) {
            return Err(IndexError::InvalidVector(
                "query embedding has non-finite values".into(),
            ));
        }
        if l2_norm(query) == 0.0 {
            return Err(IndexError::InvalidVector(
                "query embedding is a zero vector".into(),
            ));
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut q = query.to_vec();
        l2_normalize_in_place(&mut q);

        let mut scored: Vec<(usize, f32)> = match &self.graph {
            Some(graph) if k < self.len() => graph
                .neighbours(&q, k, self.len())
                .into_iter()
                .map(|position| (position, self.similarity_at(&q, position)))
                .collect(),
            _ => (0..self.len())
                .map(|position| (position, self.similarity_at(&q, position)))
                .collect(),
        };
        scored.sort_unstable_by(|a, b| by_similarity(*a, *b));
        scored.dedup_by_key(|(position, _)| *position);
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .enumerate()
            .map(|(rank, (position, similarity))| Candidate {
                entry: EntryId(position as u32),
                similarity,
                rank,
            })
            .collect())
    }

    fn similarity_at(&self, query: &[f32], position: usize) -> f32 {
        let dim = self.space.dimension;
        let row = &self.vectors[position * dim..(position + 1) * dim];
        let dot: f32 = query.iter().zip(row).map(|(a, b)| a * b).sum();
        dot.clamp(-1.0, 1.0)
    }

    /// Serialize the library into artifact bytes.
    pub fn to_bytes(&self, compression: &CompressionConfig) -> Result<Vec<u8>, IndexError> {
        artifact::encode(
            &PayloadRef {
                space: &self.space,
                secondary_space: &self.secondary_space,
                entries: &self.entries,
                vectors: &self.vectors,
                neighbourhood: &self.neighbourhood,
            },
            compression,
        )
    }

    /// Open a library from artifact bytes and rebuild its search structure.
    pub fn from_bytes(bytes: &[u8], ann: AnnConfig) -> Result<Self, IndexError> {
        let payload = artifact::decode(bytes)?;
        for (entry, row) in payload
            .entries
            .iter()
            .zip(payload.vectors.chunks(payload.space.dimension.max(1)))
        {
            builder::check_vector(row, payload.space.dimension, &entry.id)?;
        }
        Self::assemble(
            payload.space,
            payload.secondary_space,
            payload.entries,
            payload.vectors,
            payload.neighbourhood,
            ann,
        )
    }

    pub fn save(&self, path: &Path, compression: &CompressionConfig) -> Result<(), IndexError> {
        let bytes = self.to_bytes(compression)?;
        artifact::write_file(path, &bytes)?;
        debug!(
            path = %path.display(),
            entries = self.len(),
            bytes = bytes.len(),
            "library_saved"
        );
        Ok(())
    }

    pub fn load(path: &Path, ann: AnnConfig) -> Result<Self, IndexError> {
        let start = Instant::now();
        let bytes = std::fs::read(path)?;
        let index = Self::from_bytes(&bytes, ann)?;
        info!(
            path = %path.display(),
            entries = index.len(),
            dimension = index.dimension(),
            model = %index.space.model_name,
            ann = index.uses_ann(),
            elapsed_micros = start.elapsed().as_micros() as u64,
            "library_loaded"
        );
        Ok(index)
    }
}

fn by_similarity(a: (usize, f32), b: (usize, f32)) -> Ordering {
    b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use spectrum::{Peak, ProcessingConfig, SpectrumMetadata};
    use tempfile::tempdir;

    fn entry(id: &str, inchikey: Option<&str>) -> LibraryEntry {
        let mut metadata = SpectrumMetadata::default().with_precursor_mz(200.0);
        metadata.inchikey = inchikey.map(str::to_string);
        LibraryEntry {
            id: id.into(),
            metadata,
            peaks: vec![Peak::new(100.0, 1.0)],
            secondary_embedding: None,
        }
    }

    fn build(vectors: &[[f32; 2]], ann: AnnConfig) -> ReferenceIndex {
        let space = EmbeddingSpace::new("toy", 2, ProcessingConfig::default());
        let mut builder = IndexBuilder::new(space);
        for (i, v) in vectors.iter().enumerate() {
            builder.push(entry(&format!("lib-{i}"), None), v).unwrap();
        }
        builder.build(ann).unwrap()
    }

    #[test]
    fn top_k_orders_by_similarity() {
        let index = build(&[[1.0, 0.0], [0.0, 1.0], [0.9, 0.1]], AnnConfig::default());
        let hits = index.top_k(&[1.0, 0.0], 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].entry, EntryId(0));
        assert!((hits[0].similarity - 1.0).abs() < 1e-6);
        assert_eq!(hits[1].entry, EntryId(2));
        assert!((hits[1].similarity - 0.9939).abs() < 1e-3);
        assert_eq!((hits[0].rank, hits[1].rank), (0, 1));
    }

    #[test]
    fn ties_go_to_insertion_order() {
        let index = build(&[[0.0, 1.0], [1.0, 0.0], [2.0, 0.0]], AnnConfig::default());
        let hits = index.top_k(&[1.0, 0.0], 3).unwrap();
        let order: Vec<EntryId> = hits.iter().map(|c| c.entry).collect();
        assert_eq!(order, vec![EntryId(1), EntryId(2), EntryId(0)]);
    }

    #[test]
    fn k_larger_than_library_returns_everything() {
        let index = build(&[[1.0, 0.0], [0.0, 1.0]], AnnConfig::default());
        assert_eq!(index.top_k(&[1.0, 1.0], 50).unwrap().len(), 2);
        assert!(index.top_k(&[1.0, 1.0], 0).unwrap().is_empty());
    }

    #[test]
    fn empty_library_is_an_error() {
        let index = build(&[], AnnConfig::default());
        assert!(index.is_empty());
        assert!(matches!(
            index.top_k(&[1.0, 0.0], 5),
            Err(IndexError::EmptyLibrary)
        ));
    }

    #[test]
    fn query_validation() {
        let index = build(&[[1.0, 0.0]], AnnConfig::default());
        assert!(matches!(
            index.top_k(&[1.0, 0.0, 0.0], 1),
            Err(IndexError::DimensionMismatch { expected: 2, got: 3 })
        ));
        assert!(matches!(
            index.top_k(&[0.0, 0.0], 1),
            Err(IndexError::InvalidVector(_))
        ));
        assert!(matches!(
            index.top_k(&[f32::INFINITY, 0.0], 1),
            Err(IndexError::InvalidVector(_))
        ));
    }

    #[test]
    fn inchikey_counts_and_lookup() {
        let space = EmbeddingSpace::new("toy", 2, ProcessingConfig::default());
        let mut builder = IndexBuilder::new(space);
        builder
            .push(entry("a", Some("AAAAAAAAAAAAAA-BBBBBBBBBB-N")), &[1.0, 0.0])
            .unwrap();
        builder
            .push(entry("b", Some("AAAAAAAAAAAAAA-CCCCCCCCCC-N")), &[0.0, 1.0])
            .unwrap();
        builder.push(entry("c", None), &[1.0, 1.0]).unwrap();
        let index = builder.build(AnnConfig::default()).unwrap();

        assert_eq!(index.inchikey_count("AAAAAAAAAAAAAA"), 2);
        assert_eq!(index.inchikey_count("ZZZZZZZZZZZZZZ"), 0);
        assert_eq!(index.find("b"), Some(EntryId(1)));
        assert_eq!(index.find("missing"), None);
    }

    #[test]
    fn ann_path_matches_linear_scan_on_top_hit() {
        let vectors: Vec<[f32; 2]> = (0..64)
            .map(|i| {
                let angle = i as f32 * 0.02;
                [angle.cos(), angle.sin()]
            })
            .collect();
        let linear = build(&vectors, AnnConfig::default().with_enabled(false));
        let ann = build(
            &vectors,
            AnnConfig::default()
                .with_min_vectors_for_ann(10)
                .with_oversample(4),
        );
        assert!(!linear.uses_ann());
        assert!(ann.uses_ann());

        let query = [0.3f32.cos(), 0.3f32.sin()];
        let exact = linear.top_k(&query, 1).unwrap();
        let approx = ann.top_k(&query, 1).unwrap();
        assert_eq!(exact[0].entry, approx[0].entry);
        assert_eq!(exact[0].similarity, approx[0].similarity);
    }

    #[test]
    fn ann_top_k_agrees_with_exact_scores() {
        const DIM: usize = 16;
        let mut rng = fastrand::Rng::with_seed(42);
        let space = EmbeddingSpace::new("toy", DIM, ProcessingConfig::default());
        let mut linear = IndexBuilder::new(space.clone());
        let mut graph = IndexBuilder::new(space);
        for i in 0..2500 {
            let v: Vec<f32> = (0..DIM).map(|_| rng.f32() - 0.5).collect();
            linear.push(entry(&format!("lib-{i}"), None), &v).unwrap();
            graph.push(entry(&format!("lib-{i}"), None), &v).unwrap();
        }
        let linear = linear
            .build(AnnConfig::default().with_enabled(false))
            .unwrap();
        let graph = graph.build(AnnConfig::default()).unwrap();
        assert!(graph.uses_ann());

        let k = 10;
        let mut found = 0;
        for _ in 0..20 {
            let query: Vec<f32> = (0..DIM).map(|_| rng.f32() - 0.5).collect();
            let exact_all = linear.top_k(&query, linear.len()).unwrap();
            let exact_by_entry: HashMap<EntryId, f32> = exact_all
                .iter()
                .map(|c| (c.entry, c.similarity))
                .collect();

            let hits = graph.top_k(&query, k).unwrap();
            assert!(hits.len() <= k);
            for (rank, hit) in hits.iter().enumerate() {
                assert_eq!(hit.rank, rank);
                assert_eq!(hit.similarity, exact_by_entry[&hit.entry]);
            }
            for pair in hits.windows(2) {
                assert!(
                    pair[0].similarity > pair[1].similarity
                        || (pair[0].similarity == pair[1].similarity
                            && pair[0].entry < pair[1].entry)
                );
            }

            let exact_top: Vec<EntryId> = exact_all[..k].iter().map(|c| c.entry).collect();
            found += hits.iter().filter(|h| exact_top.contains(&h.entry)).count();
        }
        // Graph search is approximate; recall over 200 expected hits stays high.
        assert!(found >= 180, "recall {found}/200");
    }

    #[test]
    fn save_and_load_preserve_retrieval() {
        let mut neighbourhood = StructureNeighbourhood::new();
        neighbourhood
            .insert(
                "AAAAAAAAAAAAAA",
                vec![RelatedStructure::new("BBBBBBBBBBBBBB", 0.7)],
            )
            .unwrap();
        let space = EmbeddingSpace::new("toy", 2, ProcessingConfig::default());
        let mut builder = IndexBuilder::new(space).with_neighbourhood(neighbourhood);
        builder
            .push(entry("a", Some("AAAAAAAAAAAAAA-BBBBBBBBBB-N")), &[1.0, 0.0])
            .unwrap();
        builder.push(entry("b", None), &[0.6, 0.8]).unwrap();
        let index = builder.build(AnnConfig::default()).unwrap();

        let dir = tempdir().unwrap();
        for codec in [CompressionCodec::None, CompressionCodec::Zstd] {
            let path = dir.path().join(format!("lib-{codec:?}.ms2l"));
            index
                .save(&path, &CompressionConfig::default().with_codec(codec))
                .unwrap();
            let loaded = ReferenceIndex::load(&path, AnnConfig::default()).unwrap();

            assert_eq!(loaded.len(), 2);
            assert_eq!(loaded.space(), index.space());
            assert_eq!(loaded.entries(), index.entries());
            assert_eq!(loaded.inchikey_count("AAAAAAAAAAAAAA"), 1);
            assert_eq!(
                loaded.neighbourhood().unwrap().related("AAAAAAAAAAAAAA").len(),
                1
            );
            assert_eq!(
                loaded.top_k(&[0.0, 1.0], 2).unwrap(),
                index.top_k(&[0.0, 1.0], 2).unwrap()
            );
        }
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let result = ReferenceIndex::load(Path::new("/nonexistent/lib.ms2l"), AnnConfig::default());
        assert!(matches!(result, Err(IndexError::Io(_))));
    }

    #[test]
    fn from_bytes_rejects_truncated_payload() {
        let index = build(&[[1.0, 0.0], [0.0, 1.0]], AnnConfig::default());
        let bytes = index
            .to_bytes(&CompressionConfig::default().with_codec(CompressionCodec::None))
            .unwrap();
        let truncated = &bytes[..bytes.len() - 3];
        assert!(ReferenceIndex::from_bytes(truncated, AnnConfig::default()).is_err());
    }
}
