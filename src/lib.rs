//! # segx
//!
//! An embeddable vector search segment: fixed-dimension vectors, a
//! structured payload per point, and approximate similarity search
//! restricted by payload filters - all rooted at one storage directory.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use segx::prelude::*;
//!
//! let config = SegmentConfig::new(100);
//! let segment = build_segment("data/segment".as_ref(), &config).unwrap();
//!
//! // Index a point and attach a payload
//! segment.index(7, &vec![0.1; 100]).unwrap();
//! segment
//!     .set_full_payload_json(7, serde_json::json!({ "text": "I am document 7" }))
//!     .unwrap();
//!
//! // Filtered top-10 search
//! let filter = Filter::new_should(vec![match_keyword("text", "I am document 7")]);
//! let hits = segment.search(&vec![0.1; 100], Some(&filter), 10).unwrap();
//! let (ids, scores) = unzip_scored(hits);
//! # let _ = (ids, scores);
//!
//! // Persist and release the directory
//! segment.close().unwrap();
//! ```
//!
//! ## Crate Structure
//!
//! - [`segx-core`](https://docs.rs/segx-core) - vectors, SIMD kernels,
//!   payload model, filters, vector and payload indexes
//! - [`segx-storage`](https://docs.rs/segx-storage) - snapshots, op log,
//!   directory lock, and the [`Segment`] façade
//!
//! ## Features
//!
//! - **HNSW or exact indexing**: selected per segment at creation
//! - **Payload filtering**: `should`/`must` filters over keyword and
//!   integer fields, accelerated by an optional field index
//! - **Opaque payload ingestion**: pluggable decoders extract indexable
//!   fields from pre-serialized documents
//! - **Durable directories**: checksummed snapshots plus an optional
//!   append-only op log; reopening rebuilds an equivalent segment

pub use segx_core::{
    flatten_payload, match_integer, match_keyword, payload_from_json, payload_to_json,
    unzip_scored, Condition, DecoderRegistry, Distance, FieldCondition, Filter, HnswConfig,
    HnswIndex, IdSet, JsonPayloadDecoder, Match, Payload, PayloadDecoder, PayloadIndexVariant,
    PayloadValue, PointIdType, Result, ScoreType, ScoredPoint, SegmentConfig, SegmentError,
    StorageVariant, StoredPayload, Vector, VectorElementType, VectorIndexVariant,
};

pub use segx_storage::{build_segment, Segment};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        build_segment, match_integer, match_keyword, payload_from_json, payload_to_json,
        unzip_scored, Condition, Distance, Filter, HnswConfig, Match, Payload,
        PayloadIndexVariant, PayloadValue, PointIdType, Result, ScoredPoint, Segment,
        SegmentConfig, SegmentError, StorageVariant, VectorIndexVariant,
    };
}

/// SIMD-accelerated distance kernels
pub mod simd {
    pub use segx_core::simd::{dot_product, l2_distance, norm};
}
