use crate::point::PointIdType;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SegmentError>;

#[derive(Error, Debug)]
pub enum SegmentError {
    #[error("config mismatch: {field} stored as {stored}, requested {requested}")]
    ConfigMismatch {
        field: &'static str,
        stored: String,
        requested: String,
    },

    #[error("wrong vector dimension: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("point not found: {0}")]
    NotFound(PointIdType),

    #[error("segment is closed")]
    Closed,

    #[error("stored data failed validation: {0}")]
    Corruption(String),

    #[error("no payload decoder registered for encoding '{0}'")]
    UnknownEncoding(String),

    #[error("delete of point {id} failed in {store}: {source}")]
    SubStoreDelete {
        store: &'static str,
        id: PointIdType,
        #[source]
        source: Box<SegmentError>,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}
