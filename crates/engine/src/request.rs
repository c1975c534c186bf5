//! Request and response structures of the engine API.

use std::collections::BTreeMap;

use aifs_types::asset::{AssetKind, AssetRecord};
use aifs_types::id::{AssetId, Namespace};
use aifs_types::tx::TxId;

/// A declared parent of a new asset.
#[derive(Debug, Clone)]
pub struct ParentLink {
    /// The parent asset.
    pub asset_id: AssetId,
    /// Name of the transform that produced the child.
    pub transform_name: String,
    /// Digest pinning the exact transform version, lowercase hex.
    pub transform_digest: String,
}

/// Parameters of a `put_asset` call.
#[derive(Debug, Clone)]
pub struct PutAssetRequest {
    /// The encoded payload (already in the kind's wire form).
    pub bytes: Vec<u8>,
    /// Payload kind.
    pub kind: AssetKind,
    /// Target namespace.
    pub namespace: Namespace,
    /// Small user-supplied string map.
    pub metadata: BTreeMap<String, String>,
    /// Optional embedding to index for vector search.
    pub embedding: Option<Vec<f32>>,
    /// Declared parents; each must be visible before the commit lands.
    pub parents: Vec<ParentLink>,
    /// Caller-owned transaction, or `None` for the auto-commit path.
    pub tx_id: Option<TxId>,
}

impl PutAssetRequest {
    /// A minimal request for raw bytes in a namespace.
    pub fn blob(namespace: Namespace, bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            kind: AssetKind::Blob,
            namespace,
            metadata: BTreeMap::new(),
            embedding: None,
            parents: Vec::new(),
            tx_id: None,
        }
    }
}

/// A retrieved asset.
#[derive(Debug, Clone)]
pub struct Asset {
    /// The metadata record.
    pub record: AssetRecord,
    /// Reassembled payload bytes when requested.
    pub bytes: Option<Vec<u8>>,
}

impl Asset {
    /// The asset's `aifs://` URI, kind suffix included.
    pub fn uri(&self) -> aifs_types::uri::AssetUri {
        aifs_types::uri::AssetUri {
            namespace: self.record.namespace.clone(),
            asset_id: self.record.asset_id,
            kind: Some(self.record.kind),
        }
    }
}

/// One vector-search result.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    /// The matching asset.
    pub asset_id: AssetId,
    /// Distance under the namespace metric; smaller is better.
    pub score: f32,
}

/// Which key verifies a snapshot signature.
#[derive(Debug, Clone)]
pub enum VerifyMode {
    /// An explicit Ed25519 public key supplied by the caller.
    Pubkey([u8; 32]),
    /// The key registered for the snapshot's namespace.
    NamespaceKey,
    /// A pinned trusted key, by id.
    TrustedKey(String),
}

/// Construction-time options of the engine.
#[derive(Default)]
pub struct EngineOptions {
    /// Snapshot signing seed; generated when absent.
    pub signing_seed: Option<[u8; 32]>,
    /// Capability-token root secret; generated when absent (tokens from
    /// earlier runs then stop verifying).
    pub auth_secret: Option<[u8; 32]>,
    /// KMS provider; the process-local provider when absent.
    pub kms: Option<std::sync::Arc<dyn aifs_crypto::KmsProvider>>,
}
