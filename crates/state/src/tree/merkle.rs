//! Binary Merkle tree over asset ids.
//!
//! Leaves are `BLAKE3(asset_id_bytes)` over the raw 32-byte id; internal
//! nodes are `BLAKE3(left || right)`. An odd node at any level is carried
//! up unchanged (no duplication), so proof paths for carried leaves are
//! shorter than `ceil(log2(n))`; the verifier treats that bound as an
//! upper bound. The root of the empty set is `BLAKE3("")` with `n = 0`.

use parity_scale_codec::{Decode, Encode};
use serde::{Deserialize, Serialize};

use aifs_types::id::AssetId;

/// One sibling on an inclusion path.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub struct ProofStep {
    /// The sibling hash.
    pub sibling: [u8; 32],
    /// Whether the sibling sits on the left of the running hash.
    pub sibling_is_left: bool,
}

/// An inclusion proof for one asset id against a tree root.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub struct InclusionProof {
    /// Number of leaves in the tree the proof was produced against.
    pub leaf_count: u64,
    /// Sibling path from the leaf to the root.
    pub steps: Vec<ProofStep>,
}

/// A fully materialized binary Merkle tree.
///
/// Construction sorts and deduplicates the ids, so the root is a set
/// commitment independent of input order.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    /// Level 0 is the leaf hashes; the last level holds the root alone.
    levels: Vec<Vec<[u8; 32]>>,
    leaves: Vec<AssetId>,
}

/// Hash of a single leaf.
pub fn leaf_hash(id: &AssetId) -> [u8; 32] {
    *blake3::hash(&id.0).as_bytes()
}

fn node_hash(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(left);
    hasher.update(right);
    *hasher.finalize().as_bytes()
}

/// The defined root of an empty tree.
pub fn empty_root() -> [u8; 32] {
    *blake3::hash(b"").as_bytes()
}

impl MerkleTree {
    /// Builds the tree over the given ids (sorted and deduplicated here).
    pub fn build(mut ids: Vec<AssetId>) -> Self {
        ids.sort_unstable();
        ids.dedup();

        if ids.is_empty() {
            return Self {
                levels: Vec::new(),
                leaves: ids,
            };
        }

        let mut levels = vec![ids.iter().map(leaf_hash).collect::<Vec<_>>()];
        while levels
            .last()
            .map(|level| level.len() > 1)
            .unwrap_or(false)
        {
            let prev = match levels.last() {
                Some(level) => level,
                None => break,
            };
            let mut next = Vec::with_capacity(prev.len().div_ceil(2));
            for pair in prev.chunks(2) {
                match pair {
                    [left, right] => next.push(node_hash(left, right)),
                    // Lone node: carried up unchanged.
                    [lone] => next.push(*lone),
                    _ => {}
                }
            }
            levels.push(next);
        }

        Self { levels, leaves: ids }
    }

    /// Number of leaves.
    pub fn leaf_count(&self) -> u64 {
        self.leaves.len() as u64
    }

    /// The sorted, deduplicated leaf ids.
    pub fn leaves(&self) -> &[AssetId] {
        &self.leaves
    }

    /// The tree root.
    pub fn root(&self) -> [u8; 32] {
        self.levels
            .last()
            .and_then(|level| level.first())
            .copied()
            .unwrap_or_else(empty_root)
    }

    /// Builds the inclusion proof for `id`, or `None` if absent.
    pub fn prove(&self, id: &AssetId) -> Option<InclusionProof> {
        let mut index = self.leaves.binary_search(id).ok()?;
        let mut steps = Vec::new();

        for level in &self.levels[..self.levels.len().saturating_sub(1)] {
            let sibling_index = index ^ 1;
            if let Some(sibling) = level.get(sibling_index) {
                steps.push(ProofStep {
                    sibling: *sibling,
                    sibling_is_left: sibling_index < index,
                });
            }
            // A missing sibling means this node was carried up; no step.
            index /= 2;
        }

        Some(InclusionProof {
            leaf_count: self.leaf_count(),
            steps,
        })
    }
}

/// Maximum admissible proof length for a tree of `n` leaves.
fn max_proof_len(n: u64) -> usize {
    if n <= 1 {
        0
    } else {
        (64 - (n - 1).leading_zeros()) as usize
    }
}

/// Verifies an inclusion proof for `id` against `root`.
///
/// Rejects proofs longer than `ceil(log2(n))` and any path that does not
/// recompute the root.
pub fn verify_proof(proof: &InclusionProof, id: &AssetId, root: &[u8; 32]) -> bool {
    if proof.leaf_count == 0 {
        return false;
    }
    if proof.steps.len() > max_proof_len(proof.leaf_count) {
        return false;
    }

    let mut running = leaf_hash(id);
    for step in &proof.steps {
        running = if step.sibling_is_left {
            node_hash(&step.sibling, &running)
        } else {
            node_hash(&running, &step.sibling)
        };
    }
    running == *root
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ids(n: u8) -> Vec<AssetId> {
        (0..n).map(|i| AssetId([i; 32])).collect()
    }

    #[test]
    fn empty_tree_root_is_defined() {
        let tree = MerkleTree::build(Vec::new());
        assert_eq!(tree.root(), *blake3::hash(b"").as_bytes());
        assert_eq!(tree.leaf_count(), 0);
    }

    #[test]
    fn single_leaf_root_is_leaf_hash() {
        let id = AssetId([9; 32]);
        let tree = MerkleTree::build(vec![id]);
        assert_eq!(tree.root(), leaf_hash(&id));

        let proof = tree.prove(&id).unwrap();
        assert!(proof.steps.is_empty());
        assert!(verify_proof(&proof, &id, &tree.root()));
    }

    #[test]
    fn root_is_order_insensitive_and_deduplicated() {
        let forward = MerkleTree::build(ids(7));
        let mut reversed: Vec<_> = ids(7).into_iter().rev().collect();
        reversed.extend(ids(3)); // duplicates
        let shuffled = MerkleTree::build(reversed);
        assert_eq!(forward.root(), shuffled.root());
        assert_eq!(shuffled.leaf_count(), 7);
    }

    #[test]
    fn odd_leaf_is_carried_up() {
        // Three leaves: root = H(H(a,b), c) with c carried up one level.
        let leaves = ids(3);
        let tree = MerkleTree::build(leaves.clone());

        let a = leaf_hash(&leaves[0]);
        let b = leaf_hash(&leaves[1]);
        let c = leaf_hash(&leaves[2]);
        assert_eq!(tree.root(), node_hash(&node_hash(&a, &b), &c));

        // The carried leaf has a shorter path than ceil(log2(3)) = 2.
        let proof_c = tree.prove(&leaves[2]).unwrap();
        assert_eq!(proof_c.steps.len(), 1);
        assert!(verify_proof(&proof_c, &leaves[2], &tree.root()));
    }

    #[test]
    fn all_leaves_prove_and_tampered_siblings_fail() {
        for n in 1..=16u8 {
            let leaves = ids(n);
            let tree = MerkleTree::build(leaves.clone());
            for id in &leaves {
                let proof = tree.prove(id).unwrap();
                assert!(verify_proof(&proof, id, &tree.root()), "n={n} id={id}");

                if let Some(step) = proof.steps.first() {
                    let mut bad = proof.clone();
                    bad.steps[0].sibling[0] ^= 1;
                    assert!(!verify_proof(&bad, id, &tree.root()), "n={n}");
                    let mut flipped = proof.clone();
                    flipped.steps[0].sibling_is_left = !step.sibling_is_left;
                    // Flipping the side changes the recomputed root unless
                    // the sibling equals the running hash.
                    if step.sibling != leaf_hash(id) {
                        assert!(!verify_proof(&flipped, id, &tree.root()), "n={n}");
                    }
                }
            }
        }
    }

    #[test]
    fn absent_id_has_no_proof_and_overlong_proofs_fail() {
        let tree = MerkleTree::build(ids(8));
        assert!(tree.prove(&AssetId([0xee; 32])).is_none());

        let id = AssetId([0; 32]);
        let mut proof = tree.prove(&id).unwrap();
        assert_eq!(proof.steps.len(), 3); // ceil(log2(8))
        proof.steps.push(ProofStep {
            sibling: [0; 32],
            sibling_is_left: false,
        });
        assert!(!verify_proof(&proof, &id, &tree.root()));
    }

    proptest! {
        #[test]
        fn proofs_verify_for_random_sets(seed in proptest::collection::btree_set(any::<[u8; 32]>(), 1..64)) {
            let leaves: Vec<AssetId> = seed.into_iter().map(AssetId).collect();
            let tree = MerkleTree::build(leaves.clone());
            for id in &leaves {
                let proof = tree.prove(id).unwrap();
                prop_assert!(verify_proof(&proof, id, &tree.root()));
                prop_assert!(proof.steps.len() <= max_proof_len(tree.leaf_count()));
            }
        }
    }
}
