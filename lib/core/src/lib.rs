//! # segx Core
//!
//! Core library for the segx vector search segment.
//!
//! This crate provides the building blocks a segment is composed from:
//!
//! - [`Vector`] - dense vector with SIMD-backed distance operations
//! - [`Payload`] - structured per-point document, plus flattening and
//!   opaque-blob decoding
//! - [`Filter`] - declarative payload filter (`should`/`must` over
//!   keyword and integer matches)
//! - [`VectorIndex`] - plain exact scan and HNSW approximate search
//! - [`PayloadIndex`] - plain and per-field struct payload indexes
//! - [`SegmentConfig`] - immutable segment configuration
//!
//! The segment façade that wires these together over a storage directory
//! lives in `segx-storage`.
//!
//! ## Example
//!
//! ```rust
//! use segx_core::{AnyVectorIndex, SegmentConfig, VectorIndex};
//!
//! let config = SegmentConfig::new(3);
//! let mut index = AnyVectorIndex::build(&config);
//!
//! index.insert(1, &[1.0, 0.0, 0.0]).unwrap();
//! index.insert(2, &[0.0, 1.0, 0.0]).unwrap();
//!
//! let hits = index.search(&[1.0, 0.1, 0.0], 1, None);
//! assert_eq!(hits[0].id, 1);
//! ```

pub mod config;
pub mod distance;
pub mod error;
pub mod filter;
pub mod hnsw;
pub mod payload;
pub mod payload_index;
pub mod point;
pub mod vector;
pub mod vector_index;

/// SIMD-accelerated distance kernels (AVX2 on x86_64, NEON on aarch64,
/// scalar fallback elsewhere).
pub mod simd;

pub use config::{
    HnswConfig, PayloadIndexVariant, SegmentConfig, StorageVariant, VectorIndexVariant,
};
pub use distance::Distance;
pub use error::{Result, SegmentError};
pub use filter::{match_integer, match_keyword, Condition, FieldCondition, Filter, Match};
pub use hnsw::HnswIndex;
pub use payload::{
    flatten_payload, payload_from_json, payload_to_json, DecoderRegistry, FlatValue,
    FlattenedPayload, JsonPayloadDecoder, Payload, PayloadDecoder, PayloadValue, StoredPayload,
    JSON_ENCODING,
};
pub use payload_index::{
    AnyPayloadIndex, CandidateSet, PayloadIndex, PlainPayloadIndex, StructPayloadIndex,
};
pub use point::{unzip_scored, IdSet, PointIdType, ScoreType, ScoredPoint, VectorElementType};
pub use vector::Vector;
pub use vector_index::{AnyVectorIndex, PlainVectorIndex, VectorIndex};
