use serde::{Deserialize, Serialize};
use spectrum::{Peak, ProcessedSpectrum, SpectrumMetadata};

/// Position of an entry in the library arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntryId(pub u32);

impl EntryId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One reference spectrum. The primary embedding lives in the index arena.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryEntry {
    /// Unique library id.
    pub id: String,
    pub metadata: SpectrumMetadata,
    /// Processed peaks, m/z ascending, max intensity 1.
    pub peaks: Vec<Peak>,
    /// Embedding from the secondary model, if the library was built with one.
    #[serde(default)]
    pub secondary_embedding: Option<Vec<f32>>,
}

impl LibraryEntry {
    pub fn new(id: impl Into<String>, spectrum: ProcessedSpectrum) -> Self {
        let (peaks, metadata) = spectrum.into_spectrum().into_parts();
        Self {
            id: id.into(),
            metadata,
            peaks,
            secondary_embedding: None,
        }
    }

    pub fn with_secondary_embedding(mut self, vector: Vec<f32>) -> Self {
        self.secondary_embedding = Some(vector);
        self
    }

    pub fn precursor_mz(&self) -> Option<f64> {
        self.metadata.precursor_mz
    }

    pub fn inchikey14(&self) -> Option<&str> {
        self.metadata.inchikey14()
    }
}

/// A library entry proposed for a query by embedding similarity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub entry: EntryId,
    /// Cosine similarity between query and library embeddings.
    pub similarity: f32,
    /// 0-based position in the retrieval ranking.
    pub rank: usize,
}
