use crate::config::HnswConfig;
use crate::distance::Distance;
use crate::error::{Result, SegmentError};
use crate::point::{IdSet, PointIdType, ScoredPoint};
use crate::vector_index::VectorIndex;
use ahash::AHashMap;
use ordered_float::OrderedFloat;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// Hard cap on graph layers.
const MAX_LEVEL: usize = 16;

type LinkList = SmallVec<[u32; 16]>;

/// Bit set for visited-node tracking, allocated per query so searches can
/// share the index behind a read lock.
struct VisitedSet {
    bits: Vec<u64>,
}

impl VisitedSet {
    #[inline]
    fn new(capacity: usize) -> Self {
        Self {
            bits: vec![0; capacity.div_ceil(64)],
        }
    }

    /// Mark a node visited; true if it was not visited before.
    #[inline]
    fn insert(&mut self, idx: u32) -> bool {
        let word = idx as usize / 64;
        let mask = 1u64 << (idx as usize % 64);
        let was_set = self.bits[word] & mask != 0;
        self.bits[word] |= mask;
        !was_set
    }
}

/// Min-heap entry: closest candidate pops first.
#[derive(Clone, Copy)]
struct Candidate {
    idx: u32,
    dist: f32,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.dist == other.dist && self.idx == other.idx
    }
}

impl Eq for Candidate {}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        other.dist.partial_cmp(&self.dist).unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Max-heap entry: furthest result pops first, so trimming keeps the best.
#[derive(Clone, Copy)]
struct FurthestCandidate {
    idx: u32,
    dist: f32,
}

impl PartialEq for FurthestCandidate {
    fn eq(&self, other: &Self) -> bool {
        self.dist == other.dist && self.idx == other.idx
    }
}

impl Eq for FurthestCandidate {}

impl Ord for FurthestCandidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist.partial_cmp(&other.dist).unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for FurthestCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct HnswNode {
    id: PointIdType,
    /// Neighbor lists, one per layer `0..=level`.
    links: Vec<LinkList>,
    deleted: bool,
}

/// HNSW approximate nearest neighbor index.
///
/// Deletions tombstone the node and keep the graph intact for navigation;
/// re-insertion under a live id tombstones the old node first, so searches
/// only ever surface the latest vector. Level draws are seeded per id,
/// which makes the graph a pure function of (seed, insertion order).
#[derive(Debug, Serialize, Deserialize)]
pub struct HnswIndex {
    dim: usize,
    distance: Distance,
    config: HnswConfig,
    nodes: Vec<HnswNode>,
    /// Contiguous vector arena, parallel to `nodes`.
    vectors: Vec<f32>,
    /// Live ids only; tombstoned nodes are unlinked from here.
    id_to_node: AHashMap<PointIdType, u32>,
    entry_point: Option<u32>,
    max_level: usize,
    live_count: usize,
}

impl HnswIndex {
    #[must_use]
    pub fn new(dim: usize, distance: Distance, config: HnswConfig) -> Self {
        Self {
            dim,
            distance,
            config,
            nodes: Vec::new(),
            vectors: Vec::new(),
            id_to_node: AHashMap::new(),
            entry_point: None,
            max_level: 0,
            live_count: 0,
        }
    }

    #[inline]
    fn vector_of(&self, idx: u32) -> &[f32] {
        let start = idx as usize * self.dim;
        &self.vectors[start..start + self.dim]
    }

    #[inline]
    fn node_distance(&self, query: &[f32], idx: u32) -> f32 {
        self.distance.pair_distance(query, self.vector_of(idx))
    }

    #[inline]
    fn is_live(&self, idx: u32) -> bool {
        !self.nodes[idx as usize].deleted
    }

    #[inline(always)]
    fn prefetch(&self, idx: u32) {
        #[cfg(target_arch = "x86_64")]
        {
            let start = idx as usize * self.dim;
            if start < self.vectors.len() {
                unsafe {
                    std::arch::x86_64::_mm_prefetch(
                        self.vectors.as_ptr().add(start) as *const i8,
                        std::arch::x86_64::_MM_HINT_T0,
                    );
                }
            }
        }
        #[cfg(not(target_arch = "x86_64"))]
        let _ = idx;
    }

    fn level_for(&self, id: PointIdType) -> usize {
        let mut rng = StdRng::seed_from_u64(splitmix64(self.config.seed ^ id));
        let mut level = 0;
        while level < MAX_LEVEL && rng.random::<f32>() < 0.5 {
            level += 1;
        }
        level
    }

    /// Beam search within one layer. Returns accepted nodes sorted closest
    /// first. Traversal runs over every node for connectivity; `accept`
    /// only gates what may enter the result set.
    fn search_layer(
        &self,
        query: &[f32],
        entry: u32,
        ef: usize,
        layer: usize,
        accept: impl Fn(u32) -> bool,
    ) -> Vec<(u32, f32)> {
        let mut visited = VisitedSet::new(self.nodes.len());
        let mut candidates: BinaryHeap<Candidate> = BinaryHeap::with_capacity(ef * 2);
        let mut results: BinaryHeap<FurthestCandidate> = BinaryHeap::with_capacity(ef + 1);

        let entry_dist = self.node_distance(query, entry);
        visited.insert(entry);
        candidates.push(Candidate {
            idx: entry,
            dist: entry_dist,
        });
        if accept(entry) {
            results.push(FurthestCandidate {
                idx: entry,
                dist: entry_dist,
            });
        }

        while let Some(Candidate { idx, dist }) = candidates.pop() {
            if results.len() >= ef {
                let worst = results.peek().map(|c| c.dist).unwrap_or(f32::INFINITY);
                if dist > worst {
                    break;
                }
            }

            let node = &self.nodes[idx as usize];
            let Some(neighbors) = node.links.get(layer) else {
                continue;
            };

            for &n in neighbors.iter().take(4) {
                self.prefetch(n);
            }

            for &neighbor in neighbors {
                if !visited.insert(neighbor) {
                    continue;
                }
                let neighbor_dist = self.node_distance(query, neighbor);
                let worst = if results.len() >= ef {
                    results.peek().map(|c| c.dist).unwrap_or(f32::INFINITY)
                } else {
                    f32::INFINITY
                };
                if neighbor_dist < worst {
                    candidates.push(Candidate {
                        idx: neighbor,
                        dist: neighbor_dist,
                    });
                    if accept(neighbor) {
                        results.push(FurthestCandidate {
                            idx: neighbor,
                            dist: neighbor_dist,
                        });
                        if results.len() > ef {
                            results.pop();
                        }
                    }
                }
            }
        }

        let mut sorted: Vec<(u32, f32)> = results.into_iter().map(|c| (c.idx, c.dist)).collect();
        sorted.sort_unstable_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));
        sorted
    }

    /// Greedy hill-climb toward the query within one layer.
    fn greedy_closest(&self, query: &[f32], mut entry: u32, layer: usize) -> u32 {
        let mut best_dist = self.node_distance(query, entry);
        loop {
            let mut improved = false;
            if let Some(neighbors) = self.nodes[entry as usize].links.get(layer) {
                for &n in neighbors.iter() {
                    let dist = self.node_distance(query, n);
                    if dist < best_dist {
                        best_dist = dist;
                        entry = n;
                        improved = true;
                    }
                }
            }
            if !improved {
                return entry;
            }
        }
    }

    fn tombstone(&mut self, idx: u32) {
        self.nodes[idx as usize].deleted = true;
        self.live_count -= 1;
        if self.entry_point == Some(idx) {
            self.repick_entry();
        }
    }

    fn repick_entry(&mut self) {
        let best = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| !n.deleted)
            .max_by_key(|(_, n)| n.links.len());
        match best {
            Some((idx, node)) => {
                self.entry_point = Some(idx as u32);
                self.max_level = node.links.len() - 1;
            }
            None => {
                self.entry_point = None;
                self.max_level = 0;
            }
        }
    }

    fn link_cap(&self, layer: usize) -> usize {
        if layer == 0 {
            self.config.m * 2
        } else {
            self.config.m
        }
    }

    /// Exact scoring over an explicit id set, used when the eligible set is
    /// small enough that graph traversal buys nothing.
    fn exact_scan(&self, query: &[f32], top: usize, eligible: &IdSet) -> Vec<ScoredPoint> {
        let mut scored: Vec<ScoredPoint> = eligible
            .iter()
            .filter_map(|&id| {
                self.id_to_node.get(&id).map(|&idx| {
                    ScoredPoint::new(id, self.distance.score(query, self.vector_of(idx)))
                })
            })
            .collect();
        scored.sort_unstable_by_key(|p| (Reverse(OrderedFloat(p.score)), p.id));
        scored.truncate(top);
        scored
    }
}

impl VectorIndex for HnswIndex {
    fn insert(&mut self, id: PointIdType, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dim {
            return Err(SegmentError::DimensionMismatch {
                expected: self.dim,
                actual: vector.len(),
            });
        }

        // last write wins: retire any previous node for this id
        if let Some(old_idx) = self.id_to_node.remove(&id) {
            self.tombstone(old_idx);
        }

        let level = self.level_for(id);
        let new_idx = self.nodes.len() as u32;
        self.vectors.extend_from_slice(vector);
        self.nodes.push(HnswNode {
            id,
            links: vec![LinkList::new(); level + 1],
            deleted: false,
        });
        self.id_to_node.insert(id, new_idx);
        self.live_count += 1;

        let Some(mut entry) = self.entry_point else {
            self.entry_point = Some(new_idx);
            self.max_level = level;
            return Ok(());
        };

        let query = self.vector_of(new_idx).to_vec();

        for layer in (level + 1..=self.max_level).rev() {
            entry = self.greedy_closest(&query, entry, layer);
        }

        for layer in (0..=level.min(self.max_level)).rev() {
            let found = self.search_layer(&query, entry, self.config.ef_construct, layer, |n| {
                n != new_idx && self.is_live(n)
            });

            let neighbors: LinkList = found
                .iter()
                .take(self.config.m)
                .map(|&(idx, _)| idx)
                .collect();
            self.nodes[new_idx as usize].links[layer] = neighbors.clone();

            let cap = self.link_cap(layer);
            for &neighbor in &neighbors {
                self.nodes[neighbor as usize].links[layer].push(new_idx);
                if self.nodes[neighbor as usize].links[layer].len() > cap {
                    let anchor = self.vector_of(neighbor).to_vec();
                    let mut ranked: Vec<(f32, u32)> = self.nodes[neighbor as usize].links[layer]
                        .iter()
                        .map(|&c| (self.distance.pair_distance(&anchor, self.vector_of(c)), c))
                        .collect();
                    ranked.sort_unstable_by(|a, b| {
                        a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal)
                    });
                    ranked.truncate(cap);
                    self.nodes[neighbor as usize].links[layer] =
                        ranked.into_iter().map(|(_, c)| c).collect();
                }
            }

            if let Some(&(best, _)) = found.first() {
                entry = best;
            }
        }

        if level > self.max_level {
            self.entry_point = Some(new_idx);
            self.max_level = level;
        }

        Ok(())
    }

    fn remove(&mut self, id: PointIdType) -> bool {
        match self.id_to_node.remove(&id) {
            Some(idx) => {
                self.tombstone(idx);
                true
            }
            None => false,
        }
    }

    fn contains(&self, id: PointIdType) -> bool {
        self.id_to_node.contains_key(&id)
    }

    fn len(&self) -> usize {
        self.live_count
    }

    fn search(&self, query: &[f32], top: usize, eligible: Option<&IdSet>) -> Vec<ScoredPoint> {
        if top == 0 || self.live_count == 0 {
            return Vec::new();
        }

        if let Some(ids) = eligible {
            if ids.is_empty() {
                return Vec::new();
            }
            if ids.len() <= self.config.full_scan_threshold {
                return self.exact_scan(query, top, ids);
            }
        }

        let Some(mut entry) = self.entry_point else {
            return Vec::new();
        };

        for layer in (1..=self.max_level).rev() {
            entry = self.greedy_closest(query, entry, layer);
        }

        let ef = self.config.ef_construct.max(top * 2);
        let found = self.search_layer(query, entry, ef, 0, |n| {
            self.is_live(n)
                && eligible.map_or(true, |ids| ids.contains(&self.nodes[n as usize].id))
        });

        let mut scored: Vec<ScoredPoint> = found
            .into_iter()
            .map(|(idx, dist)| ScoredPoint::new(self.nodes[idx as usize].id, -dist))
            .collect();
        scored.sort_unstable_by_key(|p| (Reverse(OrderedFloat(p.score)), p.id));
        scored.truncate(top);
        scored
    }
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}
