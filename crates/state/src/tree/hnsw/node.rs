//! Graph node storage.

use aifs_types::id::AssetId;

/// Internal node identifier, assigned monotonically.
pub type NodeId = u64;

/// A single vector in the graph with its per-layer neighbor lists.
#[derive(Debug, Clone)]
pub struct GraphNode {
    /// Internal id.
    pub id: NodeId,
    /// The asset this vector belongs to.
    pub asset: AssetId,
    /// The embedding components.
    pub vector: Vec<f32>,
    /// Neighbor ids per layer; index 0 is the base layer.
    pub neighbors: Vec<Vec<NodeId>>,
}

impl GraphNode {
    /// Creates a node participating in `layer_count` layers.
    pub fn new(id: NodeId, asset: AssetId, vector: Vec<f32>, layer_count: usize) -> Self {
        Self {
            id,
            asset,
            vector,
            neighbors: vec![Vec::new(); layer_count],
        }
    }

    /// Highest layer this node participates in.
    pub fn top_layer(&self) -> usize {
        self.neighbors.len().saturating_sub(1)
    }
}
