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

//! # AIFS transaction manager
//!
//! Atomic commit groups enforcing the strong-causality visibility rule:
//! an asset becomes visible only when its creating transaction commits,
//! and a transaction commits only when every declared parent dependency
//! is already visible.
//!
//! Two-tier layout: a mutex-guarded in-memory table tracks in-flight
//! transactions; every state transition is mirrored durably through the
//! metadata store, and the final commit is a single durable write that
//! flips the transaction state and all visibility rows together.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use aifs_storage::{CommitOutcome, MetaStore};
use aifs_types::error::TxError;
use aifs_types::id::AssetId;
use aifs_types::timestamp::now_unix;
use aifs_types::tx::{TxId, TxRecord, TxState};

#[derive(Debug, Clone)]
struct TxEntry {
    state: TxState,
    created_at: u64,
    assets: Vec<AssetId>,
    dependencies: Vec<AssetId>,
}

impl TxEntry {
    fn record(&self, tx_id: TxId) -> TxRecord {
        TxRecord {
            tx_id,
            state: self.state,
            created_at: self.created_at,
            committed_at: None,
            assets: self.assets.clone(),
            dependencies: self.dependencies.clone(),
        }
    }
}

/// The transaction manager.
pub struct TxManager {
    meta: Arc<MetaStore>,
    inflight: Mutex<HashMap<TxId, TxEntry>>,
}

impl TxManager {
    /// Creates a manager over the durable store.
    pub fn new(meta: Arc<MetaStore>) -> Self {
        Self {
            meta,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Opens a new pending transaction.
    pub fn begin(&self) -> Result<TxId, TxError> {
        let tx_id = TxId::generate();
        let entry = TxEntry {
            state: TxState::Pending,
            created_at: now_unix(),
            assets: Vec::new(),
            dependencies: Vec::new(),
        };
        self.meta.put_tx(&entry.record(tx_id))?;
        self.inflight.lock().insert(tx_id, entry);
        debug!(tx = %tx_id, "transaction opened");
        Ok(tx_id)
    }

    /// Attaches a newly created asset. Valid only while `Pending`.
    pub fn add_asset(&self, tx_id: &TxId, asset: AssetId) -> Result<(), TxError> {
        self.mutate_pending(tx_id, |entry| {
            if !entry.assets.contains(&asset) {
                entry.assets.push(asset);
            }
        })
    }

    /// Declares a parent dependency. Valid only while `Pending`.
    pub fn add_dependency(&self, tx_id: &TxId, parent: AssetId) -> Result<(), TxError> {
        self.mutate_pending(tx_id, |entry| {
            if !entry.dependencies.contains(&parent) {
                entry.dependencies.push(parent);
            }
        })
    }

    fn mutate_pending(
        &self,
        tx_id: &TxId,
        mutate: impl FnOnce(&mut TxEntry),
    ) -> Result<(), TxError> {
        let record = {
            let mut inflight = self.inflight.lock();
            let entry = inflight.get_mut(tx_id).ok_or(TxError::Unknown(*tx_id))?;
            if entry.state != TxState::Pending {
                return Err(TxError::WrongState {
                    tx_id: *tx_id,
                    state: entry.state,
                    expected: TxState::Pending,
                });
            }
            mutate(entry);
            entry.record(*tx_id)
        };
        self.meta.put_tx(&record)?;
        Ok(())
    }

    /// Commits: verifies every declared parent is visible, then flips
    /// the visibility of all attached assets together with the state in
    /// one durable write. On an invisible parent the transaction moves
    /// to `Failed` and the caller decides whether to roll back.
    pub fn commit(&self, tx_id: &TxId) -> Result<TxRecord, TxError> {
        self.transition(tx_id, TxState::Committing)?;

        match self.meta.commit_tx(tx_id, now_unix()) {
            Ok(CommitOutcome::Committed(record)) => {
                self.inflight.lock().remove(tx_id);
                debug!(tx = %tx_id, assets = record.assets.len(), "transaction committed");
                Ok(record)
            }
            Ok(CommitOutcome::ParentNotVisible(parent)) => {
                if let Some(entry) = self.inflight.lock().get_mut(tx_id) {
                    entry.state = TxState::Failed;
                }
                warn!(tx = %tx_id, %parent, "commit blocked on invisible parent");
                Err(TxError::ParentNotVisible {
                    tx_id: *tx_id,
                    parent,
                })
            }
            Err(e) => {
                if let Some(entry) = self.inflight.lock().get_mut(tx_id) {
                    entry.state = TxState::Failed;
                }
                let _ = self.mirror_state(tx_id, TxState::Failed);
                Err(e.into())
            }
        }
    }

    /// Rolls back a pending or failed transaction: tx-scoped rows are
    /// removed durably and none of its assets ever become visible.
    pub fn rollback(&self, tx_id: &TxId) -> Result<TxRecord, TxError> {
        self.transition(tx_id, TxState::RollingBack)?;
        let record = self.meta.rollback_tx(tx_id)?;
        self.inflight.lock().remove(tx_id);
        debug!(tx = %tx_id, "transaction rolled back");
        Ok(record)
    }

    /// The current record of a transaction, in-flight or finished.
    pub fn get(&self, tx_id: &TxId) -> Result<TxRecord, TxError> {
        if let Some(entry) = self.inflight.lock().get(tx_id) {
            return Ok(entry.record(*tx_id));
        }
        Ok(self.meta.get_tx(tx_id)?)
    }

    /// Whether the transaction is known and pending.
    pub fn is_pending(&self, tx_id: &TxId) -> bool {
        self.inflight
            .lock()
            .get(tx_id)
            .map(|e| e.state == TxState::Pending)
            .unwrap_or(false)
    }

    fn transition(&self, tx_id: &TxId, to: TxState) -> Result<(), TxError> {
        {
            let mut inflight = self.inflight.lock();
            let entry = inflight.get_mut(tx_id).ok_or(TxError::Unknown(*tx_id))?;
            if !entry.state.can_transition_to(to) {
                return Err(TxError::IllegalTransition {
                    tx_id: *tx_id,
                    from: entry.state,
                    to,
                });
            }
            entry.state = to;
        }
        self.mirror_state(tx_id, to)
    }

    fn mirror_state(&self, tx_id: &TxId, state: TxState) -> Result<(), TxError> {
        let record = {
            let inflight = self.inflight.lock();
            let entry = inflight.get(tx_id).ok_or(TxError::Unknown(*tx_id))?;
            let mut record = entry.record(*tx_id);
            record.state = state;
            record
        };
        self.meta.put_tx(&record)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aifs_types::asset::{AssetKind, AssetRecord, ChunkCodec, ChunkRecord};
    use aifs_types::id::{ChunkHash, Namespace};
    use std::collections::BTreeMap;

    fn setup() -> (tempfile::TempDir, Arc<MetaStore>, TxManager) {
        let dir = tempfile::tempdir().unwrap();
        let meta = Arc::new(MetaStore::open(dir.path().join("meta.redb")).unwrap());
        let mgr = TxManager::new(meta.clone());
        (dir, meta, mgr)
    }

    fn stage_asset(meta: &MetaStore, mgr: &TxManager, tx: &TxId, seed: u8) -> AssetId {
        let hash = ChunkHash([seed; 32]);
        meta.upsert_chunk(&ChunkRecord {
            hash,
            size_plain: 1,
            size_stored: 1,
            wrapped_dek: vec![0],
            kms_key_id: "local/test".to_string(),
            codec: ChunkCodec::None,
            compression_level: 0,
            refcount: 0,
        })
        .unwrap();
        let id = AssetId([seed; 32]);
        mgr.add_asset(tx, id).unwrap();
        meta.insert_pending_asset(&AssetRecord {
            asset_id: id,
            kind: AssetKind::Blob,
            namespace: Namespace::new("ns1").unwrap(),
            size: 1,
            created_at: seed as u64,
            metadata: BTreeMap::new(),
            embedding: None,
            chunks: vec![hash],
            tx_id: *tx,
        })
        .unwrap();
        id
    }

    #[test]
    fn happy_path_commit_flips_visibility() {
        let (_dir, meta, mgr) = setup();
        let tx = mgr.begin().unwrap();
        let id = stage_asset(&meta, &mgr, &tx, 1);

        assert!(!meta.is_visible(&id).unwrap());
        let record = mgr.commit(&tx).unwrap();
        assert_eq!(record.state, TxState::Committed);
        assert!(record.committed_at.is_some());
        assert!(meta.is_visible(&id).unwrap());
    }

    #[test]
    fn strong_causality_blocks_until_parent_visible() {
        let (_dir, meta, mgr) = setup();

        let tx_a = mgr.begin().unwrap();
        let a = stage_asset(&meta, &mgr, &tx_a, 1);

        let tx_b = mgr.begin().unwrap();
        let b = stage_asset(&meta, &mgr, &tx_b, 2);
        mgr.add_dependency(&tx_b, a).unwrap();

        // Commit of B fails while A is pending; B moves to Failed.
        let err = mgr.commit(&tx_b).unwrap_err();
        assert!(matches!(err, TxError::ParentNotVisible { parent, .. } if parent == a));
        assert_eq!(mgr.get(&tx_b).unwrap().state, TxState::Failed);
        assert!(!meta.is_visible(&b).unwrap());

        // The failed transaction can be rolled back.
        let rolled = mgr.rollback(&tx_b).unwrap();
        assert_eq!(rolled.state, TxState::RolledBack);

        // Once A commits, a retry with the same dependency succeeds.
        mgr.commit(&tx_a).unwrap();
        let tx_c = mgr.begin().unwrap();
        let c = stage_asset(&meta, &mgr, &tx_c, 3);
        mgr.add_dependency(&tx_c, a).unwrap();
        let record = mgr.commit(&tx_c).unwrap();
        assert!(meta.is_visible(&c).unwrap());
        assert!(record.committed_at >= mgr.get(&tx_a).unwrap().committed_at);
    }

    #[test]
    fn attach_rejected_outside_pending() {
        let (_dir, meta, mgr) = setup();
        let tx = mgr.begin().unwrap();
        stage_asset(&meta, &mgr, &tx, 1);
        mgr.commit(&tx).unwrap();

        assert!(matches!(
            mgr.add_asset(&tx, AssetId([9; 32])),
            Err(TxError::Unknown(_))
        ));

        let unknown = TxId::generate();
        assert!(matches!(mgr.begin().and_then(|_| mgr.add_asset(&unknown, AssetId([9; 32]))), Err(TxError::Unknown(_))));
    }

    #[test]
    fn rollback_leaves_no_visible_assets() {
        let (_dir, meta, mgr) = setup();
        let tx = mgr.begin().unwrap();
        let id = stage_asset(&meta, &mgr, &tx, 1);

        mgr.rollback(&tx).unwrap();
        assert!(!meta.is_visible(&id).unwrap());
        assert!(meta.try_get_asset(&id).unwrap().is_none());
        assert_eq!(meta.get_tx(&tx).unwrap().state, TxState::RolledBack);

        // Terminal: committing a rolled-back tx is rejected.
        assert!(matches!(mgr.commit(&tx), Err(TxError::Unknown(_))));
    }

    #[test]
    fn double_commit_rejected() {
        let (_dir, meta, mgr) = setup();
        let tx = mgr.begin().unwrap();
        stage_asset(&meta, &mgr, &tx, 1);
        mgr.commit(&tx).unwrap();
        assert!(matches!(mgr.commit(&tx), Err(TxError::Unknown(_))));
    }
}
