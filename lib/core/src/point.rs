use serde::{Deserialize, Serialize};

/// Point id, unique within a segment. The join key between the vector
/// index and the payload store.
pub type PointIdType = u64;

/// Similarity score. Higher is always more similar, see [`crate::Distance`].
pub type ScoreType = f32;

/// Element type of stored vectors.
pub type VectorElementType = f32;

/// Set of point ids eligible for a filtered search.
pub type IdSet = ahash::AHashSet<PointIdType>;

/// A single search hit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredPoint {
    pub id: PointIdType,
    pub score: ScoreType,
}

impl ScoredPoint {
    #[inline]
    #[must_use]
    pub fn new(id: PointIdType, score: ScoreType) -> Self {
        Self { id, score }
    }

    #[inline]
    pub fn to_tuple(&self) -> (PointIdType, ScoreType) {
        (self.id, self.score)
    }
}

/// Split search hits into parallel id/score sequences, preserving order.
pub fn unzip_scored(points: Vec<ScoredPoint>) -> (Vec<PointIdType>, Vec<ScoreType>) {
    points.into_iter().map(|p| p.to_tuple()).unzip()
}
