use crate::config::{SegmentConfig, VectorIndexVariant};
use crate::distance::Distance;
use crate::error::{Result, SegmentError};
use crate::hnsw::HnswIndex;
use crate::point::{IdSet, PointIdType, ScoredPoint};
use ahash::AHashMap;
use ordered_float::OrderedFloat;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;

/// Storage and approximate top-K retrieval of fixed-dimension vectors.
///
/// Vectors are expected to be preprocessed for the configured metric
/// (see [`Distance::preprocess`]). Results come back best-first; ties
/// break on ascending id so rankings are stable.
pub trait VectorIndex {
    /// Store a vector under an id. Re-insertion replaces the previous
    /// vector; the search structure reflects only the replacement.
    fn insert(&mut self, id: PointIdType, vector: &[f32]) -> Result<()>;

    /// Remove an id. Returns whether it was present.
    fn remove(&mut self, id: PointIdType) -> bool;

    fn contains(&self, id: PointIdType) -> bool;

    /// Number of live points.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Top-`top` most similar points. With an eligible set, only those ids
    /// may appear in the result; an empty eligible set yields an empty
    /// result.
    fn search(&self, query: &[f32], top: usize, eligible: Option<&IdSet>) -> Vec<ScoredPoint>;
}

/// Exact index: a flat id -> vector table scored in full on every query.
#[derive(Debug, Serialize, Deserialize)]
pub struct PlainVectorIndex {
    dim: usize,
    distance: Distance,
    vectors: AHashMap<PointIdType, Vec<f32>>,
}

impl PlainVectorIndex {
    #[must_use]
    pub fn new(dim: usize, distance: Distance) -> Self {
        Self {
            dim,
            distance,
            vectors: AHashMap::new(),
        }
    }

    fn top_sorted(mut scored: Vec<ScoredPoint>, top: usize) -> Vec<ScoredPoint> {
        scored.sort_unstable_by_key(|p| (Reverse(OrderedFloat(p.score)), p.id));
        scored.truncate(top);
        scored
    }
}

impl VectorIndex for PlainVectorIndex {
    fn insert(&mut self, id: PointIdType, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dim {
            return Err(SegmentError::DimensionMismatch {
                expected: self.dim,
                actual: vector.len(),
            });
        }
        self.vectors.insert(id, vector.to_vec());
        Ok(())
    }

    fn remove(&mut self, id: PointIdType) -> bool {
        self.vectors.remove(&id).is_some()
    }

    fn contains(&self, id: PointIdType) -> bool {
        self.vectors.contains_key(&id)
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }

    fn search(&self, query: &[f32], top: usize, eligible: Option<&IdSet>) -> Vec<ScoredPoint> {
        if top == 0 {
            return Vec::new();
        }

        let scored = match eligible {
            Some(ids) => ids
                .iter()
                .filter_map(|&id| {
                    self.vectors
                        .get(&id)
                        .map(|v| ScoredPoint::new(id, self.distance.score(query, v)))
                })
                .collect(),
            None => self
                .vectors
                .par_iter()
                .map(|(&id, v)| ScoredPoint::new(id, self.distance.score(query, v)))
                .collect(),
        };

        Self::top_sorted(scored, top)
    }
}

/// The closed set of vector index implementations, selected by
/// [`SegmentConfig::vector_index`].
#[derive(Debug, Serialize, Deserialize)]
pub enum AnyVectorIndex {
    Plain(PlainVectorIndex),
    Hnsw(HnswIndex),
}

impl AnyVectorIndex {
    /// Fresh empty index for the configured variant.
    #[must_use]
    pub fn build(config: &SegmentConfig) -> Self {
        match &config.vector_index {
            VectorIndexVariant::Plain => {
                AnyVectorIndex::Plain(PlainVectorIndex::new(config.vector_dim, config.distance))
            }
            VectorIndexVariant::Hnsw(hnsw) => AnyVectorIndex::Hnsw(HnswIndex::new(
                config.vector_dim,
                config.distance,
                hnsw.clone(),
            )),
        }
    }
}

impl VectorIndex for AnyVectorIndex {
    fn insert(&mut self, id: PointIdType, vector: &[f32]) -> Result<()> {
        match self {
            AnyVectorIndex::Plain(index) => index.insert(id, vector),
            AnyVectorIndex::Hnsw(index) => index.insert(id, vector),
        }
    }

    fn remove(&mut self, id: PointIdType) -> bool {
        match self {
            AnyVectorIndex::Plain(index) => index.remove(id),
            AnyVectorIndex::Hnsw(index) => index.remove(id),
        }
    }

    fn contains(&self, id: PointIdType) -> bool {
        match self {
            AnyVectorIndex::Plain(index) => index.contains(id),
            AnyVectorIndex::Hnsw(index) => index.contains(id),
        }
    }

    fn len(&self) -> usize {
        match self {
            AnyVectorIndex::Plain(index) => index.len(),
            AnyVectorIndex::Hnsw(index) => index.len(),
        }
    }

    fn search(&self, query: &[f32], top: usize, eligible: Option<&IdSet>) -> Vec<ScoredPoint> {
        match self {
            AnyVectorIndex::Plain(index) => index.search(query, top, eligible),
            AnyVectorIndex::Hnsw(index) => index.search(query, top, eligible),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_with_axis_points() -> PlainVectorIndex {
        let mut index = PlainVectorIndex::new(3, Distance::Dot);
        index.insert(1, &[1.0, 0.0, 0.0]).unwrap();
        index.insert(2, &[0.0, 1.0, 0.0]).unwrap();
        index.insert(3, &[0.0, 0.0, 1.0]).unwrap();
        index
    }

    #[test]
    fn test_plain_search_orders_best_first() {
        let index = index_with_axis_points();
        let results = index.search(&[0.9, 0.5, 0.1], 3, None);
        let ids: Vec<_> = results.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(results[0].score >= results[1].score);
    }

    #[test]
    fn test_plain_dimension_mismatch() {
        let mut index = PlainVectorIndex::new(3, Distance::Dot);
        match index.insert(1, &[1.0, 2.0]) {
            Err(SegmentError::DimensionMismatch { expected, actual }) => {
                assert_eq!((expected, actual), (3, 2));
            }
            other => panic!("expected DimensionMismatch, got {:?}", other),
        }
        assert!(!index.contains(1));
    }

    #[test]
    fn test_plain_reinsert_replaces() {
        let mut index = index_with_axis_points();
        index.insert(1, &[-1.0, 0.0, 0.0]).unwrap();
        assert_eq!(index.len(), 3);

        // id 1 now points away from the query axis
        let results = index.search(&[1.0, 0.0, 0.0], 3, None);
        assert_eq!(results[2].id, 1);
        let results = index.search(&[-1.0, 0.0, 0.0], 1, None);
        assert_eq!(results[0].id, 1);
    }

    #[test]
    fn test_plain_eligible_subset() {
        let index = index_with_axis_points();
        let eligible: IdSet = [2, 3].into_iter().collect();
        let results = index.search(&[1.0, 0.0, 0.0], 3, Some(&eligible));
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|p| eligible.contains(&p.id)));
    }

    #[test]
    fn test_plain_empty_eligible_set() {
        let index = index_with_axis_points();
        let eligible = IdSet::default();
        assert!(index.search(&[1.0, 0.0, 0.0], 3, Some(&eligible)).is_empty());
    }

    #[test]
    fn test_plain_cardinality() {
        let index = index_with_axis_points();
        assert_eq!(index.search(&[1.0, 0.0, 0.0], 10, None).len(), 3);
        assert_eq!(index.search(&[1.0, 0.0, 0.0], 2, None).len(), 2);
    }

    #[test]
    fn test_any_index_dispatch() {
        let mut config = SegmentConfig::new(3);
        config.vector_index = VectorIndexVariant::Plain;
        let mut index = AnyVectorIndex::build(&config);
        index.insert(7, &[1.0, 0.0, 0.0]).unwrap();
        assert!(index.contains(7));
        assert_eq!(index.len(), 1);
        assert!(index.remove(7));
        assert!(!index.remove(7));
    }
}
