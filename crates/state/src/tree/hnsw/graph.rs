//! The layered navigable small-world graph.
//!
//! Nodes live in a `BTreeMap` so iteration order is deterministic.
//! Distances are computed on demand; the graph holds the only copy of
//! each vector.

use rand::Rng;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, BTreeMap, HashSet};

use aifs_types::id::AssetId;
use aifs_types::snapshot::DistanceKind;

use super::metric::Distance;
use super::node::{GraphNode, NodeId};

/// Hard cap on layer assignment; beyond this the level distribution tail
/// contributes nothing but pointer chasing.
const MAX_LEVEL: usize = 16;

#[derive(PartialEq)]
struct MinHeapItem {
    id: NodeId,
    distance: f32,
}

impl Eq for MinHeapItem {}

impl Ord for MinHeapItem {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap pops the smallest distance first.
        other
            .distance
            .partial_cmp(&self.distance)
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for MinHeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(PartialEq)]
struct MaxHeapItem {
    id: NodeId,
    distance: f32,
}

impl Eq for MaxHeapItem {}

impl Ord for MaxHeapItem {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .partial_cmp(&other.distance)
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for MaxHeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The HNSW graph proper.
pub struct HnswGraph {
    metric: DistanceKind,
    nodes: BTreeMap<NodeId, GraphNode>,
    by_asset: BTreeMap<AssetId, NodeId>,
    entry_point: Option<NodeId>,
    m: usize,
    m_max0: usize,
    ef_construction: usize,
    level_mult: f64,
    next_id: u64,
    max_layer: usize,
}

impl HnswGraph {
    /// Creates an empty graph with the given hyperparameters.
    pub fn new(metric: DistanceKind, m: usize, ef_construction: usize) -> Self {
        Self {
            metric,
            nodes: BTreeMap::new(),
            by_asset: BTreeMap::new(),
            entry_point: None,
            m,
            m_max0: m * 2,
            ef_construction,
            level_mult: 1.0 / (m as f64).ln(),
            next_id: 1,
            max_layer: 0,
        }
    }

    /// Number of vectors in the graph.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph holds no vectors.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether an asset has a vector in the graph.
    pub fn contains(&self, asset: &AssetId) -> bool {
        self.by_asset.contains_key(asset)
    }

    fn random_level(&self) -> usize {
        let r: f64 = rand::thread_rng().gen_range(f64::MIN_POSITIVE..1.0);
        ((-r.ln() * self.level_mult).floor() as usize).min(MAX_LEVEL)
    }

    fn dist_to(&self, query: &[f32], id: NodeId) -> f32 {
        self.nodes
            .get(&id)
            .map(|n| self.metric.distance(query, &n.vector))
            .unwrap_or(f32::INFINITY)
    }

    /// ef-bounded best-first search within one layer, returning up to `ef`
    /// nodes ordered by ascending distance.
    fn search_layer(
        &self,
        query: &[f32],
        entries: &[NodeId],
        ef: usize,
        layer: usize,
    ) -> Vec<(NodeId, f32)> {
        let mut visited: HashSet<NodeId> = entries.iter().copied().collect();
        let mut candidates = BinaryHeap::new();
        let mut results: BinaryHeap<MaxHeapItem> = BinaryHeap::new();

        for &entry in entries {
            let distance = self.dist_to(query, entry);
            candidates.push(MinHeapItem {
                id: entry,
                distance,
            });
            results.push(MaxHeapItem {
                id: entry,
                distance,
            });
        }
        while results.len() > ef {
            results.pop();
        }

        while let Some(candidate) = candidates.pop() {
            let worst = results
                .peek()
                .map(|r| r.distance)
                .unwrap_or(f32::INFINITY);
            if candidate.distance > worst && results.len() >= ef {
                break;
            }

            let neighbor_ids: Vec<NodeId> = self
                .nodes
                .get(&candidate.id)
                .and_then(|n| n.neighbors.get(layer))
                .cloned()
                .unwrap_or_default();

            for neighbor in neighbor_ids {
                if !visited.insert(neighbor) {
                    continue;
                }
                let distance = self.dist_to(query, neighbor);
                let worst = results
                    .peek()
                    .map(|r| r.distance)
                    .unwrap_or(f32::INFINITY);
                if results.len() < ef || distance < worst {
                    candidates.push(MinHeapItem {
                        id: neighbor,
                        distance,
                    });
                    results.push(MaxHeapItem {
                        id: neighbor,
                        distance,
                    });
                    if results.len() > ef {
                        results.pop();
                    }
                }
            }
        }

        let mut out: Vec<(NodeId, f32)> = results
            .into_iter()
            .map(|r| (r.id, r.distance))
            .collect();
        out.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));
        out
    }

    /// Greedy single-step descent through the layers above `floor`.
    fn descend(&self, query: &[f32], from: NodeId, top: usize, floor: usize) -> NodeId {
        let mut current = from;
        let mut layer = top;
        while layer > floor {
            if let Some((best, _)) = self.search_layer(query, &[current], 1, layer).first() {
                current = *best;
            }
            layer -= 1;
        }
        current
    }

    /// Inserts (or replaces) the vector for `asset`.
    pub fn insert(&mut self, asset: AssetId, vector: Vec<f32>) {
        if self.by_asset.contains_key(&asset) {
            self.delete(&asset);
        }

        let level = self.random_level();
        let id = self.next_id;
        self.next_id += 1;

        let Some(entry) = self.entry_point else {
            self.nodes
                .insert(id, GraphNode::new(id, asset, vector, level + 1));
            self.by_asset.insert(asset, id);
            self.entry_point = Some(id);
            self.max_layer = level;
            return;
        };

        // Greedy descent through the layers above the new node's level.
        let start = self.descend(&vector, entry, self.max_layer, level);

        // Search each layer the new node joins, remembering both the
        // selected neighbors and the entry set for the next layer down.
        let mut node = GraphNode::new(id, asset, vector.clone(), level + 1);
        let mut links: Vec<(usize, Vec<NodeId>)> = Vec::new();
        let mut entries = vec![start];
        let mut layer = level.min(self.max_layer);
        loop {
            let found = self.search_layer(&vector, &entries, self.ef_construction, layer);
            let limit = if layer == 0 { self.m_max0 } else { self.m };
            let selected: Vec<NodeId> = found.iter().take(limit).map(|&(n, _)| n).collect();
            if let Some(slot) = node.neighbors.get_mut(layer) {
                *slot = selected.clone();
            }
            links.push((layer, selected));
            entries = found.into_iter().map(|(n, _)| n).collect();
            if layer == 0 {
                break;
            }
            layer -= 1;
        }

        self.nodes.insert(id, node);
        self.by_asset.insert(asset, id);

        // Back-link the selected neighbors, pruning any list that grows
        // past its layer limit back down to the closest entries.
        for (layer, selected) in links {
            let limit = if layer == 0 { self.m_max0 } else { self.m };
            for neighbor in selected {
                let Some((neighbor_vector, mut list)) = self
                    .nodes
                    .get(&neighbor)
                    .and_then(|n| Some((n.vector.clone(), n.neighbors.get(layer)?.clone())))
                else {
                    continue;
                };
                if list.contains(&id) {
                    continue;
                }
                list.push(id);
                if list.len() > limit {
                    let mut scored: Vec<(NodeId, f32)> = list
                        .iter()
                        .map(|&n| (n, self.dist_to(&neighbor_vector, n)))
                        .collect();
                    scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));
                    list = scored.into_iter().take(limit).map(|(n, _)| n).collect();
                }
                if let Some(slot) = self
                    .nodes
                    .get_mut(&neighbor)
                    .and_then(|n| n.neighbors.get_mut(layer))
                {
                    *slot = list;
                }
            }
        }

        if level > self.max_layer {
            self.max_layer = level;
            self.entry_point = Some(id);
        }
    }

    /// Removes the vector for `asset`. Returns whether it existed.
    pub fn delete(&mut self, asset: &AssetId) -> bool {
        let Some(id) = self.by_asset.remove(asset) else {
            return false;
        };
        self.nodes.remove(&id);

        // Drop incoming edges.
        for node in self.nodes.values_mut() {
            for layer in &mut node.neighbors {
                layer.retain(|&n| n != id);
            }
        }

        // Re-seat the entry point if it was deleted.
        if self.entry_point == Some(id) {
            if self.nodes.is_empty() {
                self.entry_point = None;
                self.max_layer = 0;
            } else {
                let mut best: Option<(NodeId, usize)> = None;
                for (&nid, node) in &self.nodes {
                    let top = node.top_layer();
                    if best.map(|(_, l)| top >= l).unwrap_or(true) {
                        best = Some((nid, top));
                    }
                }
                if let Some((nid, top)) = best {
                    self.entry_point = Some(nid);
                    self.max_layer = top;
                }
            }
        }
        true
    }

    /// Returns the `k` nearest assets to `query`, ascending by distance.
    /// `ef` bounds the base-layer beam width; values below `k` are raised.
    pub fn search(&self, query: &[f32], k: usize, ef: usize) -> Vec<(AssetId, f32)> {
        let Some(entry) = self.entry_point else {
            return Vec::new();
        };
        if k == 0 {
            return Vec::new();
        }

        let start = self.descend(query, entry, self.max_layer, 0);
        let found = self.search_layer(query, &[start], ef.max(k), 0);
        found
            .into_iter()
            .take(k)
            .filter_map(|(n, d)| self.nodes.get(&n).map(|node| (node.asset, d)))
            .collect()
    }

    /// The vector stored for `asset`, if any.
    pub fn vector_of(&self, asset: &AssetId) -> Option<&[f32]> {
        let id = self.by_asset.get(asset)?;
        self.nodes.get(id).map(|n| n.vector.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(i: u8) -> AssetId {
        AssetId([i; 32])
    }

    #[test]
    fn empty_graph_returns_nothing() {
        let graph = HnswGraph::new(DistanceKind::Euclidean, 16, 100);
        assert!(graph.search(&[1.0, 2.0], 5, 50).is_empty());
    }

    #[test]
    fn nearest_neighbor_is_exact_for_small_graphs() {
        let mut graph = HnswGraph::new(DistanceKind::Euclidean, 16, 100);
        for i in 0..32u8 {
            graph.insert(asset(i), vec![i as f32, 0.0]);
        }
        let hits = graph.search(&[10.2, 0.0], 3, 64);
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].0, asset(10));
        assert!(hits[0].1 <= hits[1].1 && hits[1].1 <= hits[2].1);
    }

    #[test]
    fn replacing_a_vector_moves_it() {
        let mut graph = HnswGraph::new(DistanceKind::Euclidean, 8, 50);
        graph.insert(asset(1), vec![0.0, 0.0]);
        graph.insert(asset(2), vec![100.0, 100.0]);
        graph.insert(asset(1), vec![99.0, 99.0]);

        assert_eq!(graph.len(), 2);
        let hits = graph.search(&[100.0, 100.0], 1, 16);
        assert_eq!(hits[0].0, asset(2));
        let hits = graph.search(&[99.0, 99.0], 1, 16);
        assert_eq!(hits[0].0, asset(1));
    }

    #[test]
    fn delete_removes_and_reseats_entry_point() {
        let mut graph = HnswGraph::new(DistanceKind::Euclidean, 8, 50);
        for i in 0..16u8 {
            graph.insert(asset(i), vec![i as f32]);
        }
        assert!(graph.delete(&asset(3)));
        assert!(!graph.delete(&asset(3)));
        assert_eq!(graph.len(), 15);
        let hits = graph.search(&[3.0], 1, 32);
        assert_ne!(hits[0].0, asset(3));

        for i in 0..16u8 {
            graph.delete(&asset(i));
        }
        assert!(graph.is_empty());
        assert!(graph.search(&[0.0], 1, 16).is_empty());
    }

    #[test]
    fn recall_on_clustered_data() {
        let mut graph = HnswGraph::new(DistanceKind::Cosine, 16, 200);
        // Two well-separated direction clusters.
        for i in 0..40u8 {
            let jitter = (i % 5) as f32 * 0.01;
            if i % 2 == 0 {
                graph.insert(asset(i), vec![1.0, jitter, 0.0]);
            } else {
                graph.insert(asset(i), vec![0.0, jitter, 1.0]);
            }
        }
        let hits = graph.search(&[1.0, 0.0, 0.0], 10, 100);
        assert_eq!(hits.len(), 10);
        for (a, _) in hits {
            assert_eq!(a.0[0] % 2, 0, "expected only cluster-0 members");
        }
    }
}
