//! Durable record structures for assets, chunks, lineage and visibility.
//!
//! Every struct here is persisted through [`crate::codec`] and therefore
//! derives SCALE `Encode`/`Decode`. Floating-point embeddings are stored
//! as raw little-endian bytes because the canonical codec deliberately
//! has no float encoding.

use parity_scale_codec::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::id::{AssetId, ChunkHash, Namespace};
use crate::tx::TxId;

/// The payload kind of an asset; each kind carries its own codec.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Encode, Decode, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    /// Raw bytes, no framing.
    Blob,
    /// Typed n-dimensional array: protobuf header followed by the element buffer.
    Tensor,
    /// Fixed-dimension f32 vector with model provenance.
    Embed,
    /// Manifest plus ZIP-formatted multi-file payload.
    Artifact,
}

impl AssetKind {
    /// Stable lowercase name, used in URIs and RPC messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blob => "blob",
            Self::Tensor => "tensor",
            Self::Embed => "embed",
            Self::Artifact => "artifact",
        }
    }

    /// Parses the lowercase kind name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "blob" => Some(Self::Blob),
            "tensor" => Some(Self::Tensor),
            "embed" => Some(Self::Embed),
            "artifact" => Some(Self::Artifact),
            _ => None,
        }
    }

    /// Single stable byte used in composite index keys.
    pub fn as_byte(&self) -> u8 {
        match self {
            Self::Blob => 0,
            Self::Tensor => 1,
            Self::Embed => 2,
            Self::Artifact => 3,
        }
    }
}

/// Compression codec applied to a chunk before encryption.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Encode, Decode, Serialize, Deserialize, Default,
)]
pub enum ChunkCodec {
    /// Plaintext stored as-is (compression did not help).
    #[default]
    None,
    /// zstd-compressed at the recorded level.
    Zstd,
}

impl ChunkCodec {
    /// Stable byte bound into the chunk's AEAD associated data, so a
    /// ciphertext cannot be reinterpreted under the opposite codec.
    pub fn as_byte(&self) -> u8 {
        match self {
            Self::None => 0,
            Self::Zstd => 1,
        }
    }
}

/// Sidecar metadata for one stored chunk.
///
/// The chunk file itself holds `nonce || aead_tag || ciphertext`; everything
/// needed to unwrap the data key and undo compression lives here.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// BLAKE3-256 of the plaintext.
    pub hash: ChunkHash,
    /// Plaintext length in bytes.
    pub size_plain: u64,
    /// Stored (ciphertext) length in bytes, tag and nonce excluded.
    pub size_stored: u64,
    /// The data encryption key, wrapped by the KMS provider.
    pub wrapped_dek: Vec<u8>,
    /// Identifier of the KMS key that wrapped the DEK.
    pub kms_key_id: String,
    /// Compression codec applied before encryption.
    pub codec: ChunkCodec,
    /// zstd level used when `codec == Zstd`, 0 otherwise.
    pub compression_level: u8,
    /// Number of committed assets referencing this chunk.
    pub refcount: u64,
}

/// The durable record of a logical asset.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub struct AssetRecord {
    /// Content-derived asset id.
    pub asset_id: AssetId,
    /// Payload kind.
    pub kind: AssetKind,
    /// Namespace the asset belongs to.
    pub namespace: Namespace,
    /// Total payload size in bytes.
    pub size: u64,
    /// Unix seconds at creation.
    pub created_at: u64,
    /// Small user-supplied string map.
    pub metadata: BTreeMap<String, String>,
    /// Optional embedding, stored as little-endian f32 bytes.
    pub embedding: Option<Vec<u8>>,
    /// Ordered chunk hashes backing the payload.
    pub chunks: Vec<ChunkHash>,
    /// The transaction that created this asset.
    pub tx_id: TxId,
}

impl AssetRecord {
    /// Decodes the stored embedding back into f32 components.
    pub fn embedding_vector(&self) -> Option<Vec<f32>> {
        self.embedding.as_deref().map(embedding_from_bytes)
    }
}

/// Packs an f32 embedding into the little-endian byte form stored in records.
pub fn embedding_to_bytes(v: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(v.len() * 4);
    for f in v {
        out.extend_from_slice(&f.to_le_bytes());
    }
    out
}

/// Unpacks a little-endian f32 byte buffer. Trailing partial components
/// are dropped; callers validate length at the boundary.
pub fn embedding_from_bytes(b: &[u8]) -> Vec<f32> {
    b.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// A lineage edge recording that `child` was produced from `parent`.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub struct LineageEdgeRecord {
    /// The derived asset.
    pub child: AssetId,
    /// The source asset.
    pub parent: AssetId,
    /// Human-readable name of the producing transform.
    pub transform_name: String,
    /// Digest identifying the exact transform version, lowercase hex.
    pub transform_digest: String,
}

/// Visibility state of an asset: visible iff its creating transaction
/// committed.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub struct VisibilityRecord {
    /// Whether the asset is visible to readers.
    pub visible: bool,
    /// The creating transaction.
    pub tx_id: TxId,
    /// Unix seconds at which the creating transaction committed.
    pub committed_at: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_bytes_roundtrip() {
        let v = vec![0.5f32, -1.25, 3.0, f32::MIN_POSITIVE];
        let bytes = embedding_to_bytes(&v);
        assert_eq!(bytes.len(), 16);
        assert_eq!(embedding_from_bytes(&bytes), v);
    }

    #[test]
    fn kind_names_roundtrip() {
        for kind in [
            AssetKind::Blob,
            AssetKind::Tensor,
            AssetKind::Embed,
            AssetKind::Artifact,
        ] {
            assert_eq!(AssetKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(AssetKind::parse("model"), None);
    }
}
