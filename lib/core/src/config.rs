use crate::distance::Distance;
use crate::error::{Result, SegmentError};
use serde::{Deserialize, Serialize};

/// HNSW build/search parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HnswConfig {
    /// Max links per node on upper layers; layer 0 keeps twice as many.
    pub m: usize,
    /// Beam width while building the graph.
    pub ef_construct: usize,
    /// Filtered searches with an eligible set at or below this size are
    /// answered by exact scoring instead of graph traversal.
    pub full_scan_threshold: usize,
    /// Seed for level draws; the graph is reproducible given the same
    /// seed and insertion order.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_seed() -> u64 {
    0x5e_9c_2f_71
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construct: 100,
            full_scan_threshold: 10_000,
            seed: default_seed(),
        }
    }
}

/// Vector index implementation selected at segment creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorIndexVariant {
    /// Exact full-scan scoring.
    Plain,
    /// Approximate graph search.
    Hnsw(HnswConfig),
}

/// Payload index implementation selected at segment creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadIndexVariant {
    /// No field indexes; filters are evaluated against stored payloads.
    Plain,
    /// Per-field keyword and integer indexes.
    Struct,
}

/// Storage behavior selected at segment creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageVariant {
    /// Durable only at `flush()`/`close()`.
    InMemory,
    /// Every mutation is also appended to an op log and replayed on reopen.
    AppendOnly,
}

/// Immutable segment configuration. Set once at creation, persisted in the
/// segment directory, validated field-by-field on reopen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentConfig {
    pub vector_dim: usize,
    pub vector_index: VectorIndexVariant,
    pub payload_index: PayloadIndexVariant,
    pub distance: Distance,
    pub storage: StorageVariant,
}

impl SegmentConfig {
    /// Config with the given dimension and default variants
    /// (HNSW, struct payload index, cosine, in-memory).
    #[must_use]
    pub fn new(vector_dim: usize) -> Self {
        Self {
            vector_dim,
            vector_index: VectorIndexVariant::Hnsw(HnswConfig::default()),
            payload_index: PayloadIndexVariant::Struct,
            distance: Distance::Cosine,
            storage: StorageVariant::InMemory,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.vector_dim == 0 {
            return Err(SegmentError::InvalidConfig(
                "vector_dim must be positive".to_string(),
            ));
        }
        if let VectorIndexVariant::Hnsw(hnsw) = &self.vector_index {
            if hnsw.m == 0 {
                return Err(SegmentError::InvalidConfig(
                    "hnsw m must be positive".to_string(),
                ));
            }
            if hnsw.ef_construct == 0 {
                return Err(SegmentError::InvalidConfig(
                    "hnsw ef_construct must be positive".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Compare a requested config against the one stored in a segment
    /// directory. Any difference refuses the open.
    pub fn check_compatible(&self, stored: &SegmentConfig) -> Result<()> {
        fn mismatch<T: std::fmt::Debug>(
            field: &'static str,
            stored: &T,
            requested: &T,
        ) -> SegmentError {
            SegmentError::ConfigMismatch {
                field,
                stored: format!("{stored:?}"),
                requested: format!("{requested:?}"),
            }
        }

        if self.vector_dim != stored.vector_dim {
            return Err(mismatch("vector_dim", &stored.vector_dim, &self.vector_dim));
        }
        if self.vector_index != stored.vector_index {
            return Err(mismatch(
                "vector_index",
                &stored.vector_index,
                &self.vector_index,
            ));
        }
        if self.payload_index != stored.payload_index {
            return Err(mismatch(
                "payload_index",
                &stored.payload_index,
                &self.payload_index,
            ));
        }
        if self.distance != stored.distance {
            return Err(mismatch("distance", &stored.distance, &self.distance));
        }
        if self.storage != stored.storage {
            return Err(mismatch("storage", &stored.storage, &self.storage));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_zero_dim() {
        let config = SegmentConfig::new(0);
        assert!(matches!(
            config.validate(),
            Err(SegmentError::InvalidConfig(_))
        ));
        assert!(SegmentConfig::new(100).validate().is_ok());
    }

    #[test]
    fn test_check_compatible_flags_dim_change() {
        let stored = SegmentConfig::new(100);
        let mut requested = SegmentConfig::new(100);
        assert!(requested.check_compatible(&stored).is_ok());

        requested.vector_dim = 200;
        match requested.check_compatible(&stored) {
            Err(SegmentError::ConfigMismatch { field, .. }) => assert_eq!(field, "vector_dim"),
            other => panic!("expected ConfigMismatch, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_check_compatible_flags_distance_change() {
        let stored = SegmentConfig::new(100);
        let mut requested = SegmentConfig::new(100);
        requested.distance = Distance::Dot;
        assert!(matches!(
            requested.check_compatible(&stored),
            Err(SegmentError::ConfigMismatch { field: "distance", .. })
        ));
    }

    #[test]
    fn test_config_json_round_trip() {
        let config = SegmentConfig::new(128);
        let json = serde_json::to_string(&config).unwrap();
        let decoded: SegmentConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, config);
    }
}
