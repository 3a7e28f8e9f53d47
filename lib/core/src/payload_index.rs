use crate::config::PayloadIndexVariant;
use crate::filter::{Condition, FieldCondition, Filter, Match};
use crate::payload::{FlatValue, FlattenedPayload};
use crate::point::{IdSet, PointIdType};
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Outcome of planning a filter against the payload index.
///
/// `Exact` ids satisfy the filter as-is; `Superset` ids still need the
/// authoritative predicate; `Unindexed` means the index cannot bound the
/// result and the predicate must run over every payload-bearing point.
/// Planning degrades conservatively - it may widen, never drop a match.
#[derive(Debug, Clone, PartialEq)]
pub enum CandidateSet {
    Exact(IdSet),
    Superset(IdSet),
    Unindexed,
}

/// Field-level index over stored payloads.
///
/// Maintenance hooks are invoked synchronously after every payload store
/// mutation, so index and store never disagree within a consistent read.
pub trait PayloadIndex {
    fn on_set(&mut self, id: PointIdType, payload: &FlattenedPayload);
    fn on_delete(&mut self, id: PointIdType);
    fn candidates_for(&self, filter: &Filter) -> CandidateSet;
    fn wipe(&mut self);
}

/// No field indexes at all; every filter defers to predicate evaluation.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PlainPayloadIndex;

impl PayloadIndex for PlainPayloadIndex {
    fn on_set(&mut self, _id: PointIdType, _payload: &FlattenedPayload) {}

    fn on_delete(&mut self, _id: PointIdType) {}

    fn candidates_for(&self, _filter: &Filter) -> CandidateSet {
        CandidateSet::Unindexed
    }

    fn wipe(&mut self) {}
}

/// Per-field equality indexes for keyword and integer values.
///
/// Integers live in ordered maps, keeping range lookups an additive
/// extension. Floats with zero fraction are indexed as integers so that
/// integer matches agree with [`Filter::check`].
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct StructPayloadIndex {
    keyword: AHashMap<String, AHashMap<String, IdSet>>,
    integer: AHashMap<String, BTreeMap<i64, IdSet>>,
    /// What each id contributed, for incremental removal.
    postings: AHashMap<PointIdType, Vec<(String, FlatValue)>>,
}

impl StructPayloadIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lookup(&self, condition: &FieldCondition) -> IdSet {
        match &condition.r#match {
            Match::Keyword(value) => self
                .keyword
                .get(&condition.key)
                .and_then(|values| values.get(value))
                .cloned()
                .unwrap_or_default(),
            Match::Integer(value) => self
                .integer
                .get(&condition.key)
                .and_then(|values| values.get(value))
                .cloned()
                .unwrap_or_default(),
        }
    }

    fn eval_condition(&self, condition: &Condition) -> CandidateSet {
        match condition {
            Condition::Field(field) => CandidateSet::Exact(self.lookup(field)),
            Condition::Nested(filter) => self.eval_filter(filter),
        }
    }

    fn eval_filter(&self, filter: &Filter) -> CandidateSet {
        if filter.is_empty() {
            return CandidateSet::Unindexed;
        }

        let should = match filter.should.as_deref() {
            None | Some([]) => None,
            Some(clauses) => {
                let mut acc: Option<CandidateSet> = None;
                for clause in clauses {
                    let set = self.eval_condition(clause);
                    acc = Some(match acc {
                        None => set,
                        Some(prev) => combine_or(prev, set),
                    });
                }
                acc
            }
        };

        let must = match filter.must.as_deref() {
            None | Some([]) => None,
            Some(clauses) => {
                let mut acc: Option<CandidateSet> = None;
                for clause in clauses {
                    let set = self.eval_condition(clause);
                    acc = Some(match acc {
                        None => set,
                        Some(prev) => combine_and(prev, set),
                    });
                }
                acc
            }
        };

        match (should, must) {
            (Some(s), Some(m)) => combine_and(s, m),
            (Some(s), None) => s,
            (None, Some(m)) => m,
            (None, None) => CandidateSet::Unindexed,
        }
    }

    fn remove_entry(&mut self, id: PointIdType, key: &str, value: &FlatValue) {
        match value {
            FlatValue::Keyword(s) => {
                if let Some(values) = self.keyword.get_mut(key) {
                    if let Some(ids) = values.get_mut(s) {
                        ids.remove(&id);
                        if ids.is_empty() {
                            values.remove(s);
                        }
                    }
                    if values.is_empty() {
                        self.keyword.remove(key);
                    }
                }
            }
            FlatValue::Integer(i) => {
                if let Some(values) = self.integer.get_mut(key) {
                    if let Some(ids) = values.get_mut(i) {
                        ids.remove(&id);
                        if ids.is_empty() {
                            values.remove(i);
                        }
                    }
                    if values.is_empty() {
                        self.integer.remove(key);
                    }
                }
            }
            FlatValue::Float(_) => {}
        }
    }
}

impl PayloadIndex for StructPayloadIndex {
    fn on_set(&mut self, id: PointIdType, payload: &FlattenedPayload) {
        self.on_delete(id);

        let mut recorded = Vec::new();
        for (key, values) in payload.iter() {
            for value in values {
                let indexed = match value {
                    FlatValue::Keyword(s) => {
                        self.keyword
                            .entry(key.to_string())
                            .or_default()
                            .entry(s.clone())
                            .or_default()
                            .insert(id);
                        Some(FlatValue::Keyword(s.clone()))
                    }
                    FlatValue::Integer(i) => {
                        self.integer
                            .entry(key.to_string())
                            .or_default()
                            .entry(*i)
                            .or_default()
                            .insert(id);
                        Some(FlatValue::Integer(*i))
                    }
                    FlatValue::Float(f) => {
                        if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f <= i64::MAX as f64 {
                            let i = *f as i64;
                            self.integer
                                .entry(key.to_string())
                                .or_default()
                                .entry(i)
                                .or_default()
                                .insert(id);
                            Some(FlatValue::Integer(i))
                        } else {
                            None
                        }
                    }
                };
                if let Some(entry) = indexed {
                    recorded.push((key.to_string(), entry));
                }
            }
        }

        if !recorded.is_empty() {
            self.postings.insert(id, recorded);
        }
    }

    fn on_delete(&mut self, id: PointIdType) {
        if let Some(entries) = self.postings.remove(&id) {
            for (key, value) in entries {
                self.remove_entry(id, &key, &value);
            }
        }
    }

    fn candidates_for(&self, filter: &Filter) -> CandidateSet {
        if filter.is_empty() {
            return CandidateSet::Unindexed;
        }
        self.eval_filter(filter)
    }

    fn wipe(&mut self) {
        self.keyword.clear();
        self.integer.clear();
        self.postings.clear();
    }
}

fn union(mut a: IdSet, b: IdSet) -> IdSet {
    a.extend(b);
    a
}

fn intersect(a: IdSet, b: IdSet) -> IdSet {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    small.into_iter().filter(|id| large.contains(id)).collect()
}

fn combine_or(a: CandidateSet, b: CandidateSet) -> CandidateSet {
    use CandidateSet::*;
    match (a, b) {
        // an unindexable alternative makes the whole union unbounded
        (Unindexed, _) | (_, Unindexed) => Unindexed,
        (Exact(a), Exact(b)) => Exact(union(a, b)),
        (Exact(a), Superset(b)) | (Superset(a), Exact(b)) | (Superset(a), Superset(b)) => {
            Superset(union(a, b))
        }
    }
}

fn combine_and(a: CandidateSet, b: CandidateSet) -> CandidateSet {
    use CandidateSet::*;
    match (a, b) {
        (Unindexed, Unindexed) => Unindexed,
        // the indexed side still bounds the result, but needs verification
        (Unindexed, Exact(ids))
        | (Unindexed, Superset(ids))
        | (Exact(ids), Unindexed)
        | (Superset(ids), Unindexed) => Superset(ids),
        (Exact(a), Exact(b)) => Exact(intersect(a, b)),
        (Exact(a), Superset(b)) | (Superset(a), Exact(b)) | (Superset(a), Superset(b)) => {
            Superset(intersect(a, b))
        }
    }
}

/// The closed set of payload index implementations, selected by
/// [`PayloadIndexVariant`].
#[derive(Debug, Serialize, Deserialize)]
pub enum AnyPayloadIndex {
    Plain(PlainPayloadIndex),
    Struct(StructPayloadIndex),
}

impl AnyPayloadIndex {
    #[must_use]
    pub fn build(variant: PayloadIndexVariant) -> Self {
        match variant {
            PayloadIndexVariant::Plain => AnyPayloadIndex::Plain(PlainPayloadIndex),
            PayloadIndexVariant::Struct => AnyPayloadIndex::Struct(StructPayloadIndex::new()),
        }
    }
}

impl PayloadIndex for AnyPayloadIndex {
    fn on_set(&mut self, id: PointIdType, payload: &FlattenedPayload) {
        match self {
            AnyPayloadIndex::Plain(index) => index.on_set(id, payload),
            AnyPayloadIndex::Struct(index) => index.on_set(id, payload),
        }
    }

    fn on_delete(&mut self, id: PointIdType) {
        match self {
            AnyPayloadIndex::Plain(index) => index.on_delete(id),
            AnyPayloadIndex::Struct(index) => index.on_delete(id),
        }
    }

    fn candidates_for(&self, filter: &Filter) -> CandidateSet {
        match self {
            AnyPayloadIndex::Plain(index) => index.candidates_for(filter),
            AnyPayloadIndex::Struct(index) => index.candidates_for(filter),
        }
    }

    fn wipe(&mut self) {
        match self {
            AnyPayloadIndex::Plain(index) => index.wipe(),
            AnyPayloadIndex::Struct(index) => index.wipe(),
        }
    }
}
