use crate::lock::DirectoryLock;
use crate::payload_storage::PayloadStorage;
use crate::persistence::{self, StoredConfig};
use crate::wal::{WalRecord, WriteAheadLog};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use segx_core::{
    flatten_payload, AnyPayloadIndex, AnyVectorIndex, CandidateSet, DecoderRegistry, Filter,
    IdSet, Payload, PayloadDecoder, PayloadIndex, PointIdType, Result, ScoredPoint,
    SegmentConfig, SegmentError, StorageVariant, StoredPayload, VectorIndex, VectorIndexVariant,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// A self-contained unit of vector + payload storage and filtered search,
/// rooted at one directory.
///
/// All mutable state sits behind a single `RwLock`: concurrent searches
/// share the read lock and always observe a consistent snapshot, writes
/// serialize. The directory is held under an advisory lock for the
/// lifetime of the instance.
pub struct Segment {
    path: PathBuf,
    config: SegmentConfig,
    created_at: DateTime<Utc>,
    decoders: DecoderRegistry,
    inner: RwLock<SegmentInner>,
    wal: Option<WriteAheadLog>,
    dir_lock: Mutex<Option<DirectoryLock>>,
    closed: AtomicBool,
}

struct SegmentInner {
    vector_index: AnyVectorIndex,
    payload_storage: PayloadStorage,
    payload_index: AnyPayloadIndex,
}

/// Create a segment at `dir`, or reopen the one already stored there.
///
/// Reopening validates the requested config field-by-field against the
/// persisted one and refuses to open on any difference.
pub fn build_segment(dir: &Path, config: &SegmentConfig) -> Result<Segment> {
    config.validate()?;
    std::fs::create_dir_all(dir)?;

    match read_config(dir)? {
        Some(stored) => {
            config.check_compatible(&stored.config)?;
            Segment::load(dir, stored)
        }
        None => Segment::create(dir, config.clone()),
    }
}

fn read_config(dir: &Path) -> Result<Option<StoredConfig>> {
    persistence::read_config(dir).map_err(|e| SegmentError::Corruption(format!("{e:#}")))
}

impl Segment {
    /// Reopen a segment from the config stored in its directory.
    pub fn open(dir: &Path) -> Result<Segment> {
        match read_config(dir)? {
            Some(stored) => Segment::load(dir, stored),
            None => Err(SegmentError::Storage(format!(
                "no segment found at {}",
                dir.display()
            ))),
        }
    }

    fn create(dir: &Path, config: SegmentConfig) -> Result<Segment> {
        let lock =
            DirectoryLock::acquire(dir).map_err(|e| SegmentError::Storage(format!("{e:#}")))?;

        let stored = StoredConfig::new(config.clone());
        persistence::write_config(dir, &stored)
            .map_err(|e| SegmentError::Storage(format!("{e:#}")))?;

        let wal = Self::open_wal(dir, &config)?;
        let inner = SegmentInner {
            vector_index: AnyVectorIndex::build(&config),
            payload_storage: PayloadStorage::new(),
            payload_index: AnyPayloadIndex::build(config.payload_index),
        };

        info!(path = %dir.display(), dim = config.vector_dim, "created segment");

        Ok(Segment {
            path: dir.to_path_buf(),
            config,
            created_at: stored.created_at,
            decoders: DecoderRegistry::with_defaults(),
            inner: RwLock::new(inner),
            wal,
            dir_lock: Mutex::new(Some(lock)),
            closed: AtomicBool::new(false),
        })
    }

    fn load(dir: &Path, stored: StoredConfig) -> Result<Segment> {
        let config = stored.config;
        config.validate()?;

        let lock =
            DirectoryLock::acquire(dir).map_err(|e| SegmentError::Storage(format!("{e:#}")))?;

        let decoders = DecoderRegistry::with_defaults();

        let vector_index: AnyVectorIndex =
            match read_snapshot(&dir.join(persistence::VECTOR_INDEX_FILE))? {
                Some(index) => index,
                None => AnyVectorIndex::build(&config),
            };
        check_index_variant(&vector_index, &config)?;

        let payload_storage: PayloadStorage =
            read_snapshot(&dir.join(persistence::PAYLOAD_FILE))?.unwrap_or_default();

        let payload_index: AnyPayloadIndex =
            match read_snapshot(&dir.join(persistence::PAYLOAD_INDEX_FILE))? {
                Some(index) => index,
                // the field index is derived state, rebuild it from the store
                None => rebuild_payload_index(&config, &payload_storage, &decoders)?,
            };

        let mut inner = SegmentInner {
            vector_index,
            payload_storage,
            payload_index,
        };

        let wal = Self::open_wal(dir, &config)?;
        if wal.is_some() {
            let records = WriteAheadLog::replay(&dir.join(persistence::WAL_FILE))
                .map_err(|e| SegmentError::Corruption(format!("{e:#}")))?;
            let replayed = records.len();
            for record in records {
                apply_record(&mut inner, &decoders, record)?;
            }
            if replayed > 0 {
                debug!(replayed, "replayed op log");
            }
        }

        info!(
            path = %dir.display(),
            points = inner.vector_index.len(),
            "opened segment"
        );

        Ok(Segment {
            path: dir.to_path_buf(),
            config,
            created_at: stored.created_at,
            decoders,
            inner: RwLock::new(inner),
            wal,
            dir_lock: Mutex::new(Some(lock)),
            closed: AtomicBool::new(false),
        })
    }

    fn open_wal(dir: &Path, config: &SegmentConfig) -> Result<Option<WriteAheadLog>> {
        match config.storage {
            StorageVariant::InMemory => Ok(None),
            StorageVariant::AppendOnly => WriteAheadLog::open(&dir.join(persistence::WAL_FILE))
                .map(Some)
                .map_err(|e| SegmentError::Storage(format!("{e:#}"))),
        }
    }

    #[inline]
    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(SegmentError::Closed)
        } else {
            Ok(())
        }
    }

    fn log(&self, record: WalRecord) -> Result<()> {
        if let Some(wal) = &self.wal {
            wal.append(&record)
                .map_err(|e| SegmentError::Storage(format!("{e:#}")))?;
        }
        Ok(())
    }

    pub fn config(&self) -> &SegmentConfig {
        &self.config
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of indexed points.
    pub fn point_count(&self) -> usize {
        self.inner.read().vector_index.len()
    }

    /// Number of points carrying a payload.
    pub fn payload_count(&self) -> usize {
        self.inner.read().payload_storage.len()
    }

    pub fn has_point(&self, id: PointIdType) -> bool {
        self.inner.read().vector_index.contains(id)
    }

    /// Register a decoder for an opaque payload encoding.
    pub fn register_decoder(&self, encoding: &str, decoder: Arc<dyn PayloadDecoder>) {
        self.decoders.register(encoding, decoder);
    }

    /// Store a vector under an id. Re-indexing an id replaces its vector
    /// and leaves any existing payload untouched.
    pub fn index(&self, id: PointIdType, vector: &[f32]) -> Result<()> {
        self.ensure_open()?;
        if vector.len() != self.config.vector_dim {
            return Err(SegmentError::DimensionMismatch {
                expected: self.config.vector_dim,
                actual: vector.len(),
            });
        }

        let prepared = self.config.distance.preprocess(vector.to_vec());
        let mut inner = self.inner.write();
        inner.vector_index.insert(id, &prepared)?;
        self.log(WalRecord::Index {
            id,
            vector: prepared,
        })
    }

    /// Attach a structured payload to an indexed point. The payload index
    /// is updated in the same critical section, so no search observes the
    /// store and the index disagreeing.
    pub fn set_full_payload(&self, id: PointIdType, payload: Payload) -> Result<()> {
        self.store_payload(id, StoredPayload::Structured(payload))
    }

    /// Attach a payload given as a JSON object.
    pub fn set_full_payload_json(
        &self,
        id: PointIdType,
        payload: serde_json::Value,
    ) -> Result<()> {
        self.set_full_payload(id, segx_core::payload_from_json(payload)?)
    }

    /// Attach a payload given as an opaque blob. The blob is kept verbatim;
    /// indexable fields are extracted through the decoder registered for
    /// `encoding`.
    pub fn set_full_payload_opaque(
        &self,
        id: PointIdType,
        encoding: &str,
        data: Bytes,
    ) -> Result<()> {
        self.store_payload(
            id,
            StoredPayload::Opaque {
                encoding: encoding.to_string(),
                data,
            },
        )
    }

    fn store_payload(&self, id: PointIdType, stored: StoredPayload) -> Result<()> {
        self.ensure_open()?;

        let flat = match &stored {
            StoredPayload::Structured(payload) => flatten_payload(payload),
            StoredPayload::Opaque { encoding, data } => {
                flatten_payload(&self.decoders.decode(encoding, data)?)
            }
        };

        let mut inner = self.inner.write();
        // payloads only attach to indexed points
        if !inner.vector_index.contains(id) {
            return Err(SegmentError::NotFound(id));
        }
        inner.payload_storage.set(id, stored.clone());
        inner.payload_index.on_set(id, &flat);
        self.log(WalRecord::SetPayload {
            id,
            payload: stored,
        })
    }

    /// Fetch a point's payload. Opaque payloads are decoded on the way out.
    pub fn get_full_payload(&self, id: PointIdType) -> Result<Payload> {
        self.ensure_open()?;
        let inner = self.inner.read();
        let stored = inner
            .payload_storage
            .get(id)
            .ok_or(SegmentError::NotFound(id))?;
        self.decoders.resolve(stored)
    }

    /// Remove a point from the vector index, the payload store, and the
    /// payload index. Idempotent: deleting an absent id succeeds and
    /// reports `false`.
    pub fn delete(&self, id: PointIdType) -> Result<bool> {
        self.ensure_open()?;
        let mut inner = self.inner.write();

        let had_vector = inner.vector_index.remove(id);
        let had_payload = inner.payload_storage.delete(id).is_some();
        inner.payload_index.on_delete(id);

        let existed = had_vector || had_payload;
        if existed {
            self.log(WalRecord::Delete { id })
                .map_err(|e| SegmentError::SubStoreDelete {
                    store: "append_log",
                    id,
                    source: Box::new(e),
                })?;
        }
        Ok(existed)
    }

    /// Top-`top` most similar points, best first. With a filter, only
    /// matching points are eligible; an absent or empty filter means
    /// unrestricted search.
    pub fn search(
        &self,
        vector: &[f32],
        filter: Option<&Filter>,
        top: usize,
    ) -> Result<Vec<ScoredPoint>> {
        self.ensure_open()?;
        if vector.len() != self.config.vector_dim {
            return Err(SegmentError::DimensionMismatch {
                expected: self.config.vector_dim,
                actual: vector.len(),
            });
        }

        let query = self.config.distance.preprocess(vector.to_vec());
        let inner = self.inner.read();

        let eligible: Option<IdSet> = match filter {
            None => None,
            Some(f) if f.is_empty() => None,
            Some(f) => Some(self.filtered_ids(&inner, f)?),
        };
        if let Some(ids) = &eligible {
            if ids.is_empty() {
                return Ok(Vec::new());
            }
        }

        Ok(inner.vector_index.search(&query, top, eligible.as_ref()))
    }

    /// Resolve a filter to the exact set of matching point ids, planning
    /// through the payload index and re-verifying wherever the plan is
    /// lossy.
    fn filtered_ids(&self, inner: &SegmentInner, filter: &Filter) -> Result<IdSet> {
        match inner.payload_index.candidates_for(filter) {
            CandidateSet::Exact(ids) => Ok(ids),
            CandidateSet::Superset(ids) => {
                let mut verified = IdSet::default();
                for id in ids {
                    if self.point_matches(inner, id, filter)? {
                        verified.insert(id);
                    }
                }
                Ok(verified)
            }
            CandidateSet::Unindexed => {
                let ids: Vec<PointIdType> = inner.payload_storage.ids().collect();
                let mut matched = IdSet::default();
                for id in ids {
                    if self.point_matches(inner, id, filter)? {
                        matched.insert(id);
                    }
                }
                Ok(matched)
            }
        }
    }

    fn point_matches(
        &self,
        inner: &SegmentInner,
        id: PointIdType,
        filter: &Filter,
    ) -> Result<bool> {
        match inner.payload_storage.get(id) {
            Some(stored) => {
                let payload = self.decoders.resolve(stored)?;
                Ok(filter.check(&flatten_payload(&payload)))
            }
            None => Ok(false),
        }
    }

    /// Persist the current state to the segment directory. In-memory state
    /// stays query-visible throughout; writers block for the duration.
    pub fn flush(&self) -> Result<()> {
        self.ensure_open()?;
        let inner = self.inner.read();

        write_snapshot(
            &self.path.join(persistence::VECTOR_INDEX_FILE),
            &inner.vector_index,
        )?;
        write_snapshot(
            &self.path.join(persistence::PAYLOAD_FILE),
            &inner.payload_storage,
        )?;
        write_snapshot(
            &self.path.join(persistence::PAYLOAD_INDEX_FILE),
            &inner.payload_index,
        )?;

        if let Some(wal) = &self.wal {
            wal.truncate()
                .map_err(|e| SegmentError::Storage(format!("{e:#}")))?;
        }

        debug!(path = %self.path.display(), points = inner.vector_index.len(), "flushed segment");
        Ok(())
    }

    /// Flush, release the directory lock, and reject all further
    /// operations with `Closed`. Idempotent.
    pub fn close(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Ok(());
        }
        self.flush()?;
        self.closed.store(true, Ordering::Release);
        drop(self.dir_lock.lock().take());
        info!(path = %self.path.display(), "closed segment");
        Ok(())
    }
}

fn read_snapshot<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    persistence::read_snapshot(path).map_err(|e| SegmentError::Corruption(format!("{e:#}")))
}

fn write_snapshot<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    persistence::write_snapshot(path, value).map_err(|e| SegmentError::Storage(format!("{e:#}")))
}

fn check_index_variant(index: &AnyVectorIndex, config: &SegmentConfig) -> Result<()> {
    let compatible = matches!(
        (index, &config.vector_index),
        (AnyVectorIndex::Plain(_), VectorIndexVariant::Plain)
            | (AnyVectorIndex::Hnsw(_), VectorIndexVariant::Hnsw(_))
    );
    if compatible {
        Ok(())
    } else {
        Err(SegmentError::Corruption(
            "vector index snapshot does not match the stored config".to_string(),
        ))
    }
}

fn rebuild_payload_index(
    config: &SegmentConfig,
    storage: &PayloadStorage,
    decoders: &DecoderRegistry,
) -> Result<AnyPayloadIndex> {
    let mut index = AnyPayloadIndex::build(config.payload_index);
    for (id, stored) in storage.iter() {
        let payload = decoders.resolve(stored)?;
        index.on_set(id, &flatten_payload(&payload));
    }
    Ok(index)
}

fn apply_record(
    inner: &mut SegmentInner,
    decoders: &DecoderRegistry,
    record: WalRecord,
) -> Result<()> {
    match record {
        WalRecord::Index { id, vector } => inner.vector_index.insert(id, &vector),
        WalRecord::SetPayload { id, payload } => {
            let flat = flatten_payload(&decoders.resolve(&payload)?);
            inner.payload_storage.set(id, payload);
            inner.payload_index.on_set(id, &flat);
            Ok(())
        }
        WalRecord::Delete { id } => {
            inner.vector_index.remove(id);
            inner.payload_storage.delete(id);
            inner.payload_index.on_delete(id);
            Ok(())
        }
    }
}
