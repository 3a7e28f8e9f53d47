use crate::point::ScoreType;
use serde::{Deserialize, Serialize};

/// Distance metric fixed at segment creation.
///
/// Scores are always oriented so that **higher means more similar**:
///
/// - `Cosine` - cosine similarity, in `[-1, 1]`. Vectors are normalized
///   once at insert/query time, so the stored form is compared by dot
///   product.
/// - `Dot` - plain dot product.
/// - `Euclid` - negated Euclidean distance (`0.0` is an exact match,
///   scores decrease as points move apart).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Distance {
    Cosine,
    Dot,
    Euclid,
}

impl Distance {
    /// Prepare a raw vector for storage or querying under this metric.
    pub fn preprocess(&self, mut vector: Vec<f32>) -> Vec<f32> {
        if let Distance::Cosine = self {
            let norm = crate::simd::norm(&vector);
            if norm > f32::EPSILON {
                let inv = 1.0 / norm;
                for x in &mut vector {
                    *x *= inv;
                }
            }
        }
        vector
    }

    /// Similarity of two preprocessed vectors. Higher = more similar.
    #[inline]
    pub fn score(&self, a: &[f32], b: &[f32]) -> ScoreType {
        match self {
            Distance::Cosine | Distance::Dot => crate::simd::dot_product(a, b),
            Distance::Euclid => -crate::simd::l2_distance(a, b),
        }
    }

    /// Internal ordering key for index traversal. Lower = closer.
    #[inline]
    pub fn pair_distance(&self, a: &[f32], b: &[f32]) -> f32 {
        -self.score(a, b)
    }
}

impl std::fmt::Display for Distance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Distance::Cosine => write!(f, "cosine"),
            Distance::Dot => write!(f, "dot"),
            Distance::Euclid => write!(f, "euclid"),
        }
    }
}
