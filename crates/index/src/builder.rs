use embedding::normalize::{l2_norm, l2_normalize_in_place};
use embedding::{EmbeddingGenerator, EmbeddingSpace};
use hashbrown::HashMap;
use spectrum::Spectrum;
use tracing::debug;

use crate::ann::AnnConfig;
use crate::entry::{EntryId, LibraryEntry};
use crate::neighbourhood::StructureNeighbourhood;
use crate::{IndexError, ReferenceIndex};

/// Append-only construction of a [`ReferenceIndex`].
#[derive(Debug)]
pub struct IndexBuilder {
    space: EmbeddingSpace,
    secondary_space: Option<EmbeddingSpace>,
    entries: Vec<LibraryEntry>,
    vectors: Vec<f32>,
    by_id: HashMap<String, EntryId>,
    neighbourhood: Option<StructureNeighbourhood>,
}

impl IndexBuilder {
    pub fn new(space: EmbeddingSpace) -> Self {
        Self {
            space,
            secondary_space: None,
            entries: Vec::new(),
            vectors: Vec::new(),
            by_id: HashMap::new(),
            neighbourhood: None,
        }
    }

    pub fn with_secondary_space(mut self, space: EmbeddingSpace) -> Self {
        self.secondary_space = Some(space);
        self
    }

    pub fn with_neighbourhood(mut self, neighbourhood: StructureNeighbourhood) -> Self {
        self.neighbourhood = Some(neighbourhood);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append an entry with its primary embedding. The vector is
    /// L2-normalized before it is stored.
    pub fn push(&mut self, entry: LibraryEntry, vector: &[f32]) -> Result<EntryId, IndexError> {
        if self.by_id.contains_key(&entry.id) {
            return Err(IndexError::DuplicateId(entry.id));
        }
        check_vector(vector, self.space.dimension, &entry.id)?;
        if let Some(secondary) = &entry.secondary_embedding {
            let expected = self
                .secondary_space
                .as_ref()
                .map(|s| s.dimension)
                .ok_or_else(|| {
                    IndexError::InvalidVector(format!(
                        "entry '{}' has a secondary embedding but the library has no secondary space",
                        entry.id
                    ))
                })?;
            check_vector(secondary, expected, &entry.id)?;
        }
        let position = u32::try_from(self.entries.len())
            .map_err(|_| IndexError::InvalidVector("library exceeds u32::MAX entries".into()))?;
        let id = EntryId(position);

        let start = self.vectors.len();
        self.vectors.extend_from_slice(vector);
        l2_normalize_in_place(&mut self.vectors[start..]);

        self.by_id.insert(entry.id.clone(), id);
        self.entries.push(entry);
        Ok(id)
    }

    /// Process and embed `spectrum` with the library's generators, then append it.
    pub fn insert_spectrum(
        &mut self,
        id: impl Into<String>,
        spectrum: &Spectrum,
        primary: &EmbeddingGenerator,
        secondary: Option<&EmbeddingGenerator>,
    ) -> Result<EntryId, IndexError> {
        self.space.ensure_compatible(&primary.space())?;
        let processed = primary.prepare(spectrum)?;
        let embedding = primary.embed_processed(&processed)?;

        let secondary_vector = match (secondary, &self.secondary_space) {
            (Some(generator), Some(space)) => {
                space.ensure_compatible(&generator.space())?;
                Some(generator.embed(spectrum)?.vector)
            }
            (Some(generator), None) => {
                return Err(IndexError::InvalidVector(format!(
                    "secondary model '{}' given but the library has no secondary space",
                    generator.name()
                )));
            }
            (None, _) => None,
        };

        let mut entry = LibraryEntry::new(id, processed);
        entry.secondary_embedding = secondary_vector;
        self.push(entry, &embedding.vector)
    }

    /// Freeze the library and build its search structure.
    pub fn build(self, ann: AnnConfig) -> Result<ReferenceIndex, IndexError> {
        debug!(
            entries = self.entries.len(),
            dimension = self.space.dimension,
            "library_build"
        );
        ReferenceIndex::assemble(
            self.space,
            self.secondary_space,
            self.entries,
            self.vectors,
            self.neighbourhood,
            ann,
        )
    }
}

pub(crate) fn check_vector(vector: &[f32], expected: usize, id: &str) -> Result<(), IndexError> {
    if vector.len() != expected {
        return Err(IndexError::DimensionMismatch {
            expected,
            got: vector.len(),
        });
    }
    if vector.iter().any(|v| !v.is_finite()) {
        return Err(IndexError::InvalidVector(format!(
            "embedding of '{id}' has non-finite values"
        )));
    }
    if l2_norm(vector) == 0.0 {
        return Err(IndexError::InvalidVector(format!(
            "embedding of '{id}' is a zero vector"
        )));
    }
    Ok(())
}
