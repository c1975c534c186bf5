//! Record structures for snapshots, branches, tags and pinned keys.

use parity_scale_codec::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::id::{AssetId, Namespace, SnapshotId};

/// Distance metric configured for a namespace's vector index.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Encode, Decode, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum DistanceKind {
    /// `1 - cos(a, b)`; distance 0 means identical direction.
    #[default]
    Cosine,
    /// L2 norm of the difference.
    Euclidean,
    /// Negated inner product, so smaller is better.
    Dot,
    /// L1 norm of the difference.
    Manhattan,
    /// Count of components whose sign bit differs.
    Hamming,
}

impl DistanceKind {
    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::Euclidean => "euclidean",
            Self::Dot => "dot",
            Self::Manhattan => "manhattan",
            Self::Hamming => "hamming",
        }
    }

    /// Parses the lowercase metric name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cosine" => Some(Self::Cosine),
            "euclidean" => Some(Self::Euclidean),
            "dot" => Some(Self::Dot),
            "manhattan" => Some(Self::Manhattan),
            "hamming" => Some(Self::Hamming),
            _ => None,
        }
    }
}

/// An immutable, signed Merkle commitment over a set of visible assets.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub struct SnapshotRecord {
    /// Truncated BLAKE3 of `merkle_root || timestamp`.
    pub snapshot_id: SnapshotId,
    /// Namespace the snapshot covers.
    pub namespace: Namespace,
    /// Root of the binary Merkle tree over the sorted asset ids.
    pub merkle_root: [u8; 32],
    /// RFC 3339 UTC timestamp, second precision; part of the signed message.
    pub timestamp: String,
    /// Lexicographically sorted, distinct asset ids, all visible at creation.
    pub asset_ids: Vec<AssetId>,
    /// Detached Ed25519 signature over the canonical snapshot message.
    pub signature: Vec<u8>,
    /// Public key of the signer, 32 bytes.
    pub signer_pubkey: [u8; 32],
    /// Small user-supplied string map (`empty = true` for empty snapshots).
    pub metadata: BTreeMap<String, String>,
}

/// A mutable named pointer to a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub struct BranchRecord {
    /// Namespace scope.
    pub namespace: Namespace,
    /// Branch name.
    pub name: String,
    /// Snapshot the branch currently points at.
    pub snapshot_id: SnapshotId,
    /// Unix seconds of the last pointer update.
    pub updated_at: u64,
}

/// One append-only branch history row.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub struct BranchHistoryRecord {
    /// Previous target, `None` for branch creation.
    pub old_snapshot_id: Option<SnapshotId>,
    /// New target.
    pub new_snapshot_id: SnapshotId,
    /// Unix seconds of the update.
    pub at: u64,
    /// Small user-supplied string map.
    pub metadata: BTreeMap<String, String>,
}

/// An immutable named pointer to a snapshot; re-creation fails.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub struct TagRecord {
    /// Namespace scope.
    pub namespace: Namespace,
    /// Tag name.
    pub name: String,
    /// Snapshot the tag points at, forever.
    pub snapshot_id: SnapshotId,
    /// Unix seconds at creation.
    pub created_at: u64,
}

/// The verification key pinned for a namespace.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub struct NamespaceKeyRecord {
    /// Namespace scope.
    pub namespace: Namespace,
    /// Ed25519 public key, 32 bytes.
    pub pubkey: [u8; 32],
    /// Unix seconds at registration.
    pub created_at: u64,
    /// Small user-supplied string map.
    pub metadata: BTreeMap<String, String>,
}

/// A trusted verification key pinned under a caller-chosen id.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub struct TrustedKeyRecord {
    /// Caller-chosen key id.
    pub key_id: String,
    /// Ed25519 public key, 32 bytes.
    pub pubkey: [u8; 32],
    /// Optional namespace restriction.
    pub namespace: Option<Namespace>,
    /// Small user-supplied string map.
    pub metadata: BTreeMap<String, String>,
}
