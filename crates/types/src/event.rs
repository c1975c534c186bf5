//! Events published by the engine.
//!
//! Events fire only after the corresponding state is durably visible, so
//! a subscriber acting on an event will always observe its effect.

use serde::{Deserialize, Serialize};

use crate::id::{AssetId, Namespace, SnapshotId};
use crate::tx::TxId;

/// A server-push event for `SubscribeEvents` streams.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A transaction committed; all listed assets became visible.
    AssetsCommitted {
        /// The committed transaction.
        tx_id: TxId,
        /// Namespace of the committed assets.
        namespace: Namespace,
        /// Assets that became visible, in insertion order.
        asset_ids: Vec<AssetId>,
    },
    /// An asset was deleted (refcounts decremented).
    AssetDeleted {
        /// Namespace of the asset.
        namespace: Namespace,
        /// The deleted asset.
        asset_id: AssetId,
    },
    /// A snapshot was created and signed.
    SnapshotCreated {
        /// Namespace of the snapshot.
        namespace: Namespace,
        /// The new snapshot.
        snapshot_id: SnapshotId,
        /// Number of asset ids covered.
        asset_count: u64,
    },
    /// A branch pointer was created or moved.
    BranchUpdated {
        /// Namespace of the branch.
        namespace: Namespace,
        /// Branch name.
        name: String,
        /// Previous target, if the branch existed.
        old_snapshot_id: Option<SnapshotId>,
        /// New target.
        new_snapshot_id: SnapshotId,
    },
    /// A branch pointer was removed (history is preserved).
    BranchDeleted {
        /// Namespace of the branch.
        namespace: Namespace,
        /// Branch name.
        name: String,
    },
    /// An immutable tag was created.
    TagCreated {
        /// Namespace of the tag.
        namespace: Namespace,
        /// Tag name.
        name: String,
        /// Target snapshot.
        snapshot_id: SnapshotId,
    },
}

impl EngineEvent {
    /// The namespace this event belongs to, for subscription filtering.
    pub fn namespace(&self) -> &Namespace {
        match self {
            Self::AssetsCommitted { namespace, .. }
            | Self::AssetDeleted { namespace, .. }
            | Self::SnapshotCreated { namespace, .. }
            | Self::BranchUpdated { namespace, .. }
            | Self::BranchDeleted { namespace, .. }
            | Self::TagCreated { namespace, .. } => namespace,
        }
    }
}
