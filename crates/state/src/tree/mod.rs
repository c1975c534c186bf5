//! Commitment tree implementations.

/// Hierarchical navigable small-world graph for approximate k-NN search.
pub mod hnsw;
/// Binary Merkle tree over asset ids with inclusion proofs.
pub mod merkle;
