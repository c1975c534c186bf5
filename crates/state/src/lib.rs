#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::todo,
        clippy::unimplemented
    )
)]

//! # AIFS state structures
//!
//! The pure in-memory commitment structures of the engine: the binary
//! Merkle tree that snapshots commit to, and the HNSW graph behind the
//! per-namespace vector index. Neither module performs I/O; persistence
//! and visibility policy live in the storage and engine crates.

/// Commitment tree implementations.
pub mod tree;

pub use tree::hnsw::HnswIndex;
pub use tree::merkle::{InclusionProof, MerkleTree, ProofStep};
