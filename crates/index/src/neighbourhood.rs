//! Precomputed structural neighbourhood of library compounds.
//!
//! For every InChIKey14 in the library the table lists the most similar
//! other InChIKey14s together with the tanimoto score of their fingerprints.
//! The table is computed offline and shipped inside the library artifact.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::IndexError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedStructure {
    pub inchikey14: String,
    pub tanimoto: f32,
}

impl RelatedStructure {
    pub fn new(inchikey14: impl Into<String>, tanimoto: f32) -> Self {
        Self {
            inchikey14: inchikey14.into(),
            tanimoto,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructureNeighbourhood {
    related: BTreeMap<String, Vec<RelatedStructure>>,
}

impl StructureNeighbourhood {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the neighbours of `inchikey14`, replacing earlier ones.
    /// Neighbours are kept sorted by descending tanimoto.
    pub fn insert(
        &mut self,
        inchikey14: impl Into<String>,
        mut neighbours: Vec<RelatedStructure>,
    ) -> Result<(), IndexError> {
        let key = inchikey14.into();
        if key.len() != 14 {
            return Err(IndexError::InvalidNeighbourhood(format!(
                "'{key}' is not an InChIKey14"
            )));
        }
        if let Some(bad) = neighbours
            .iter()
            .find(|n| !n.tanimoto.is_finite() || !(0.0..=1.0).contains(&n.tanimoto))
        {
            return Err(IndexError::InvalidNeighbourhood(format!(
                "tanimoto {} for {} -> {} is outside [0, 1]",
                bad.tanimoto, key, bad.inchikey14
            )));
        }
        neighbours.retain(|n| n.inchikey14 != key);
        neighbours.sort_by(|a, b| {
            b.tanimoto
                .total_cmp(&a.tanimoto)
                .then_with(|| a.inchikey14.cmp(&b.inchikey14))
        });
        self.related.insert(key, neighbours);
        Ok(())
    }

    /// Closest structures first; empty when the key is unknown.
    pub fn related(&self, inchikey14: &str) -> &[RelatedStructure] {
        self.related
            .get(inchikey14)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn contains(&self, inchikey14: &str) -> bool {
        self.related.contains_key(inchikey14)
    }

    pub fn len(&self) -> usize {
        self.related.len()
    }

    pub fn is_empty(&self) -> bool {
        self.related.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neighbours_sorted_by_tanimoto() {
        let mut table = StructureNeighbourhood::new();
        table
            .insert(
                "AAAAAAAAAAAAAA",
                vec![
                    RelatedStructure::new("BBBBBBBBBBBBBB", 0.4),
                    RelatedStructure::new("CCCCCCCCCCCCCC", 0.9),
                    RelatedStructure::new("AAAAAAAAAAAAAA", 1.0),
                ],
            )
            .unwrap();

        let related = table.related("AAAAAAAAAAAAAA");
        assert_eq!(related.len(), 2);
        assert_eq!(related[0].inchikey14, "CCCCCCCCCCCCCC");
        assert_eq!(related[1].inchikey14, "BBBBBBBBBBBBBB");
        assert!(table.related("ZZZZZZZZZZZZZZ").is_empty());
    }

    #[test]
    fn rejects_out_of_range_tanimoto() {
        let mut table = StructureNeighbourhood::new();
        let result = table.insert(
            "AAAAAAAAAAAAAA",
            vec![RelatedStructure::new("BBBBBBBBBBBBBB", 1.5)],
        );
        assert!(matches!(result, Err(IndexError::InvalidNeighbourhood(_))));
    }

    #[test]
    fn rejects_full_inchikey() {
        let mut table = StructureNeighbourhood::new();
        let result = table.insert("AAAAAAAAAAAAAA-BBBBBBBBBB-N", Vec::new());
        assert!(result.is_err());
        assert!(table.is_empty());
    }
}
