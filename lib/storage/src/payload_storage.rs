use ahash::AHashMap;
use segx_core::{PointIdType, StoredPayload};
use serde::{Deserialize, Serialize};

/// Authoritative per-point payload store.
///
/// Holds at most one payload per id, last write wins. Payloads arrive
/// either structured or as opaque blobs; decoding opaque entries is the
/// caller's concern (via the segment's decoder registry), the store only
/// keeps them.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PayloadStorage {
    payloads: AHashMap<PointIdType, StoredPayload>,
}

impl PayloadStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites any existing payload for the id.
    pub fn set(&mut self, id: PointIdType, payload: StoredPayload) {
        self.payloads.insert(id, payload);
    }

    pub fn get(&self, id: PointIdType) -> Option<&StoredPayload> {
        self.payloads.get(&id)
    }

    pub fn contains(&self, id: PointIdType) -> bool {
        self.payloads.contains_key(&id)
    }

    /// Idempotent; returns the removed payload if there was one.
    pub fn delete(&mut self, id: PointIdType) -> Option<StoredPayload> {
        self.payloads.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.payloads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (PointIdType, &StoredPayload)> {
        self.payloads.iter().map(|(&id, payload)| (id, payload))
    }

    pub fn ids(&self) -> impl Iterator<Item = PointIdType> + '_ {
        self.payloads.keys().copied()
    }

    /// Drop every payload.
    pub fn wipe(&mut self) {
        self.payloads.clear();
    }
}
