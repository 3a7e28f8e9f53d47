//! # segx Storage
//!
//! Storage layer for the segx vector search segment: the on-disk directory
//! format (config, checksummed snapshots, append-only op log), the
//! directory lock, the payload store, and the [`Segment`] façade that
//! composes everything in `segx-core` behind one consistent lock.

pub mod lock;
pub mod payload_storage;
pub mod persistence;
pub mod segment;
pub mod wal;

pub use lock::DirectoryLock;
pub use payload_storage::PayloadStorage;
pub use persistence::StoredConfig;
pub use segment::{build_segment, Segment};
pub use wal::{WalRecord, WriteAheadLog};
