//! Approximate k-nearest-neighbour index over fixed-dimension vectors.
//!
//! [`HnswIndex`] wraps the raw graph with the namespace-level contract:
//! the dimension is fixed by the first insert, queries must match it,
//! and non-finite components are rejected at the boundary.

/// The layered graph structure.
pub mod graph;
/// Distance metrics.
pub mod metric;
/// Node storage.
pub mod node;

use aifs_types::error::IndexError;
use aifs_types::id::AssetId;
use aifs_types::snapshot::DistanceKind;

use graph::HnswGraph;

/// Default max connections per node per layer.
pub const DEFAULT_M: usize = 16;
/// Default construction beam width.
pub const DEFAULT_EF_CONSTRUCTION: usize = 200;
/// Default search beam width.
pub const DEFAULT_EF_SEARCH: usize = 64;

/// A single namespace's vector index.
pub struct HnswIndex {
    graph: HnswGraph,
    metric: DistanceKind,
    dimension: Option<u32>,
    ef_search: usize,
}

impl HnswIndex {
    /// Creates an empty index with default hyperparameters.
    pub fn new(metric: DistanceKind) -> Self {
        Self {
            graph: HnswGraph::new(metric, DEFAULT_M, DEFAULT_EF_CONSTRUCTION),
            metric,
            dimension: None,
            ef_search: DEFAULT_EF_SEARCH,
        }
    }

    /// The configured distance metric.
    pub fn metric(&self) -> DistanceKind {
        self.metric
    }

    /// The dimension fixed by the first insert, if any.
    pub fn dimension(&self) -> Option<u32> {
        self.dimension
    }

    /// Number of indexed vectors.
    pub fn len(&self) -> usize {
        self.graph.len()
    }

    /// Whether the index holds no vectors.
    pub fn is_empty(&self) -> bool {
        self.graph.is_empty()
    }

    fn check_vector(&self, vector: &[f32]) -> Result<u32, IndexError> {
        if vector.iter().any(|c| !c.is_finite()) {
            return Err(IndexError::NonFinite);
        }
        let got = vector.len() as u32;
        match self.dimension {
            Some(expected) if expected != got => {
                Err(IndexError::DimensionMismatch { expected, got })
            }
            _ => Ok(got),
        }
    }

    /// Adds (or replaces) the vector for an asset. The first insert fixes
    /// the namespace dimension.
    pub fn add(&mut self, asset: AssetId, vector: Vec<f32>) -> Result<(), IndexError> {
        let dim = self.check_vector(&vector)?;
        self.graph.insert(asset, vector);
        self.dimension.get_or_insert(dim);
        Ok(())
    }

    /// Removes an asset's vector.
    pub fn delete(&mut self, asset: &AssetId) -> Result<(), IndexError> {
        if self.graph.delete(asset) {
            Ok(())
        } else {
            Err(IndexError::NotFound(*asset))
        }
    }

    /// Whether the asset has an indexed vector.
    pub fn contains(&self, asset: &AssetId) -> bool {
        self.graph.contains(asset)
    }

    /// Returns up to `k` assets nearest to `query` in ascending distance.
    ///
    /// `overfetch` widens the beam so that callers filtering the results
    /// afterwards (visibility, metadata) can still fill `k` slots.
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        overfetch: usize,
    ) -> Result<Vec<(AssetId, f32)>, IndexError> {
        self.check_vector(query)?;
        let fetch = k.saturating_add(overfetch);
        let ef = self.ef_search.max(fetch);
        Ok(self.graph.search(query, fetch, ef))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(i: u8) -> AssetId {
        AssetId([i; 32])
    }

    #[test]
    fn first_insert_fixes_dimension() {
        let mut index = HnswIndex::new(DistanceKind::Cosine);
        assert_eq!(index.dimension(), None);
        index.add(asset(1), vec![1.0, 0.0, 0.0]).unwrap();
        assert_eq!(index.dimension(), Some(3));

        let err = index.add(asset(2), vec![1.0, 0.0]).unwrap_err();
        assert!(matches!(
            err,
            IndexError::DimensionMismatch { expected: 3, got: 2 }
        ));
    }

    #[test]
    fn query_dimension_checked() {
        let mut index = HnswIndex::new(DistanceKind::Euclidean);
        index.add(asset(1), vec![0.0, 0.0]).unwrap();
        assert!(index.search(&[1.0], 1, 0).is_err());
        assert!(index.search(&[f32::NAN, 0.0], 1, 0).is_err());
    }

    #[test]
    fn delete_then_search_excludes() {
        let mut index = HnswIndex::new(DistanceKind::Euclidean);
        index.add(asset(1), vec![0.0]).unwrap();
        index.add(asset(2), vec![1.0]).unwrap();
        index.delete(&asset(1)).unwrap();
        assert!(matches!(
            index.delete(&asset(1)),
            Err(IndexError::NotFound(_))
        ));
        let hits = index.search(&[0.0], 2, 0).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, asset(2));
    }

    #[test]
    fn overfetch_widens_results() {
        let mut index = HnswIndex::new(DistanceKind::Euclidean);
        for i in 0..20u8 {
            index.add(asset(i), vec![i as f32]).unwrap();
        }
        let hits = index.search(&[0.0], 3, 5).unwrap();
        assert_eq!(hits.len(), 8);
    }
}
