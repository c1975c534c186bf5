use redb::{Database, ReadTransaction, ReadableTable, TableDefinition, WriteTransaction};
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::path::Path;
use tracing::{debug, info};

use aifs_types::asset::{AssetKind, AssetRecord, ChunkRecord, LineageEdgeRecord, VisibilityRecord};
use aifs_types::codec;
use aifs_types::error::MetaError;
use aifs_types::id::{AssetId, ChunkHash, Namespace, SnapshotId};
use aifs_types::snapshot::{
    BranchHistoryRecord, BranchRecord, NamespaceKeyRecord, SnapshotRecord, TagRecord,
    TrustedKeyRecord,
};
use aifs_types::tx::{TxId, TxRecord, TxState};

use crate::keys::{
    k_edge, k_history, k_history_prefix, k_kind_index, k_named, k_ns_index, k_ns_prefix,
    prefix_end,
};

/// ---- Table definitions (single DB, prefix-encoded keys) ----
const META: TableDefinition<&str, u32> = TableDefinition::new("META");
const ASSETS: TableDefinition<&[u8; 32], &[u8]> = TableDefinition::new("ASSETS");
const CHUNKS: TableDefinition<&[u8; 32], &[u8]> = TableDefinition::new("CHUNKS");
const VISIBILITY: TableDefinition<&[u8; 32], &[u8]> = TableDefinition::new("VISIBILITY");
const TXS: TableDefinition<&[u8; 16], &[u8]> = TableDefinition::new("TXS");
const SNAPSHOTS: TableDefinition<&[u8; 16], &[u8]> = TableDefinition::new("SNAPSHOTS");
// Lineage in both orientations; key = child||parent resp. parent||child.
const LINEAGE_BY_CHILD: TableDefinition<&[u8], &[u8]> = TableDefinition::new("LINEAGE_BY_CHILD");
const LINEAGE_BY_PARENT: TableDefinition<&[u8], &[u8]> = TableDefinition::new("LINEAGE_BY_PARENT");
// Named pointers; key = ns||0x00||name.
const BRANCHES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("BRANCHES");
const BRANCH_HISTORY: TableDefinition<&[u8], &[u8]> = TableDefinition::new("BRANCH_HISTORY");
const TAGS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("TAGS");
// Key registry.
const NS_KEYS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("NS_KEYS");
const TRUSTED_KEYS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("TRUSTED_KEYS");
// Secondary indexes.
const ASSETS_BY_NS: TableDefinition<&[u8], &[u8; 32]> = TableDefinition::new("ASSETS_BY_NS");
const ASSETS_BY_KIND: TableDefinition<&[u8], &[u8; 32]> = TableDefinition::new("ASSETS_BY_KIND");
const NAMESPACES: TableDefinition<&[u8], u64> = TableDefinition::new("NAMESPACES");

const SCHEMA_VERSION_KEY: &str = "schema_version";
const SCHEMA_VERSION: u32 = 1;

fn be(e: impl std::fmt::Display) -> MetaError {
    MetaError::Backend(e.to_string())
}

/// Filter for [`MetaStore::list_assets`].
#[derive(Debug, Clone)]
pub struct AssetFilter {
    /// Namespace to list.
    pub namespace: Namespace,
    /// Restrict to one kind, if set.
    pub kind: Option<AssetKind>,
    /// Conjunction of metadata equality constraints.
    pub metadata: Vec<(String, String)>,
}

/// One page of a filtered asset listing.
#[derive(Debug)]
pub struct AssetPage {
    /// Matching visible assets, ascending by creation time.
    pub assets: Vec<AssetRecord>,
    /// Opaque cursor for the next page, absent on the last page.
    pub next_cursor: Option<Vec<u8>>,
}

/// Outcome of a durable commit attempt.
#[derive(Debug)]
pub enum CommitOutcome {
    /// The transaction committed; every attached asset is now visible.
    Committed(TxRecord),
    /// A declared parent was not visible; the transaction is now `Failed`.
    ParentNotVisible(AssetId),
}

/// The durable ACID metadata store.
pub struct MetaStore {
    db: Database,
}

impl MetaStore {
    /// Opens (creating if needed) the database and migrates the schema.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, MetaError> {
        let db = Database::create(path.as_ref()).map_err(be)?;
        let store = Self { db };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), MetaError> {
        let w = self.write_txn()?;
        {
            w.open_table(ASSETS).map_err(be)?;
            w.open_table(CHUNKS).map_err(be)?;
            w.open_table(VISIBILITY).map_err(be)?;
            w.open_table(TXS).map_err(be)?;
            w.open_table(SNAPSHOTS).map_err(be)?;
            w.open_table(LINEAGE_BY_CHILD).map_err(be)?;
            w.open_table(LINEAGE_BY_PARENT).map_err(be)?;
            w.open_table(BRANCHES).map_err(be)?;
            w.open_table(BRANCH_HISTORY).map_err(be)?;
            w.open_table(TAGS).map_err(be)?;
            w.open_table(NS_KEYS).map_err(be)?;
            w.open_table(TRUSTED_KEYS).map_err(be)?;
            w.open_table(ASSETS_BY_NS).map_err(be)?;
            w.open_table(ASSETS_BY_KIND).map_err(be)?;
            w.open_table(NAMESPACES).map_err(be)?;

            let mut meta = w.open_table(META).map_err(be)?;
            let found = meta
                .get(SCHEMA_VERSION_KEY)
                .map_err(be)?
                .map(|v| v.value());
            match found {
                None => {
                    meta.insert(SCHEMA_VERSION_KEY, SCHEMA_VERSION).map_err(be)?;
                    info!(version = SCHEMA_VERSION, "initialized metadata schema");
                }
                Some(v) if v > SCHEMA_VERSION => return Err(MetaError::SchemaVersion(v)),
                Some(v) => {
                    debug!(version = v, "metadata schema up to date");
                }
            }
        }
        w.commit().map_err(be)
    }

    fn read_txn(&self) -> Result<ReadTransaction<'_>, MetaError> {
        self.db.begin_read().map_err(be)
    }

    fn write_txn(&self) -> Result<WriteTransaction<'_>, MetaError> {
        self.db.begin_write().map_err(be)
    }

    // ---- assets & visibility ----

    /// Records a new asset in the non-visible state, together with its
    /// visibility row, index rows, namespace row and chunk references,
    /// all in one write transaction.
    pub fn insert_pending_asset(&self, record: &AssetRecord) -> Result<(), MetaError> {
        let w = self.write_txn()?;
        {
            let mut assets = w.open_table(ASSETS).map_err(be)?;
            let mut visibility = w.open_table(VISIBILITY).map_err(be)?;

            if assets.get(&record.asset_id.0).map_err(be)?.is_some() {
                // Content-addressed: an identical id means identical
                // content. Re-record nothing, but hand ownership of a
                // still-invisible row to the newest pending transaction
                // so a rollback of the older one cannot strand it.
                let current = visibility
                    .get(&record.asset_id.0)
                    .map_err(be)?
                    .map(|raw| codec::from_bytes_canonical::<VisibilityRecord>(raw.value()))
                    .transpose()?;
                if let Some(vis) = current {
                    if !vis.visible && vis.tx_id != record.tx_id {
                        let reassigned = VisibilityRecord {
                            visible: false,
                            tx_id: record.tx_id,
                            committed_at: None,
                        };
                        visibility
                            .insert(
                                &record.asset_id.0,
                                codec::to_bytes_canonical(&reassigned).as_slice(),
                            )
                            .map_err(be)?;
                    }
                }
            } else {
                assets
                    .insert(
                        &record.asset_id.0,
                        codec::to_bytes_canonical(record).as_slice(),
                    )
                    .map_err(be)?;

                let vis = VisibilityRecord {
                    visible: false,
                    tx_id: record.tx_id,
                    committed_at: None,
                };
                visibility
                    .insert(&record.asset_id.0, codec::to_bytes_canonical(&vis).as_slice())
                    .map_err(be)?;

                let mut by_ns = w.open_table(ASSETS_BY_NS).map_err(be)?;
                by_ns
                    .insert(
                        k_ns_index(&record.namespace, record.created_at, &record.asset_id)
                            .as_slice(),
                        &record.asset_id.0,
                    )
                    .map_err(be)?;

                let mut by_kind = w.open_table(ASSETS_BY_KIND).map_err(be)?;
                by_kind
                    .insert(
                        k_kind_index(record.kind.as_byte(), record.created_at, &record.asset_id)
                            .as_slice(),
                        &record.asset_id.0,
                    )
                    .map_err(be)?;

                let mut namespaces = w.open_table(NAMESPACES).map_err(be)?;
                if namespaces
                    .get(record.namespace.as_ref())
                    .map_err(be)?
                    .is_none()
                {
                    namespaces
                        .insert(record.namespace.as_ref(), record.created_at)
                        .map_err(be)?;
                }

                let mut chunks = w.open_table(CHUNKS).map_err(be)?;
                let distinct: BTreeSet<&ChunkHash> = record.chunks.iter().collect();
                for hash in distinct {
                    let mut chunk: ChunkRecord = match chunks.get(&hash.0).map_err(be)? {
                        Some(raw) => codec::from_bytes_canonical(raw.value())?,
                        None => {
                            return Err(MetaError::Backend(format!(
                                "chunk record missing for {hash}"
                            )))
                        }
                    };
                    chunk.refcount += 1;
                    chunks
                        .insert(&hash.0, codec::to_bytes_canonical(&chunk).as_slice())
                        .map_err(be)?;
                }
            }
        }
        w.commit().map_err(be)
    }

    /// Fetches an asset record, visible or not.
    pub fn get_asset(&self, id: &AssetId) -> Result<AssetRecord, MetaError> {
        self.try_get_asset(id)?.ok_or(MetaError::NotFound {
            entity: "asset",
            key: id.to_hex(),
        })
    }

    /// Fetches an asset record if present.
    pub fn try_get_asset(&self, id: &AssetId) -> Result<Option<AssetRecord>, MetaError> {
        let r = self.read_txn()?;
        let assets = r.open_table(ASSETS).map_err(be)?;
        let result = assets
            .get(&id.0)
            .map_err(be)?
            .map(|raw| codec::from_bytes_canonical(raw.value()))
            .transpose();
        result
    }

    /// Fetches an asset's visibility row, if any.
    pub fn get_visibility(&self, id: &AssetId) -> Result<Option<VisibilityRecord>, MetaError> {
        let r = self.read_txn()?;
        let visibility = r.open_table(VISIBILITY).map_err(be)?;
        let result = visibility
            .get(&id.0)
            .map_err(be)?
            .map(|raw| codec::from_bytes_canonical(raw.value()))
            .transpose();
        result
    }

    /// Whether the asset's creating transaction has committed.
    pub fn is_visible(&self, id: &AssetId) -> Result<bool, MetaError> {
        Ok(self.get_visibility(id)?.map(|v| v.visible).unwrap_or(false))
    }

    /// Removes a committed asset and decrements its chunk references.
    /// Lineage edges are preserved as historical record.
    pub fn delete_asset(&self, id: &AssetId) -> Result<AssetRecord, MetaError> {
        let w = self.write_txn()?;
        let record;
        {
            let mut assets = w.open_table(ASSETS).map_err(be)?;
            record = match assets.remove(&id.0).map_err(be)? {
                Some(raw) => codec::from_bytes_canonical::<AssetRecord>(raw.value())?,
                None => {
                    return Err(MetaError::NotFound {
                        entity: "asset",
                        key: id.to_hex(),
                    })
                }
            };

            let mut visibility = w.open_table(VISIBILITY).map_err(be)?;
            visibility.remove(&id.0).map_err(be)?;

            let mut by_ns = w.open_table(ASSETS_BY_NS).map_err(be)?;
            by_ns
                .remove(k_ns_index(&record.namespace, record.created_at, id).as_slice())
                .map_err(be)?;
            let mut by_kind = w.open_table(ASSETS_BY_KIND).map_err(be)?;
            by_kind
                .remove(k_kind_index(record.kind.as_byte(), record.created_at, id).as_slice())
                .map_err(be)?;

            let mut chunks = w.open_table(CHUNKS).map_err(be)?;
            decrement_chunk_refs(&mut chunks, &record.chunks)?;
        }
        w.commit().map_err(be)?;
        Ok(record)
    }

    /// Lists visible assets in a namespace, ascending by creation time.
    pub fn list_assets(
        &self,
        filter: &AssetFilter,
        limit: usize,
        cursor: Option<&[u8]>,
    ) -> Result<AssetPage, MetaError> {
        let r = self.read_txn()?;
        let by_ns = r.open_table(ASSETS_BY_NS).map_err(be)?;
        let assets = r.open_table(ASSETS).map_err(be)?;
        let visibility = r.open_table(VISIBILITY).map_err(be)?;

        let prefix = k_ns_prefix(&filter.namespace);
        let start: Vec<u8> = match cursor {
            Some(c) if c.starts_with(&prefix) => c.to_vec(),
            Some(_) => return Err(MetaError::InvalidId("cursor".to_string())),
            None => prefix.clone(),
        };
        // The prefix ends with the NUL separator, so an exclusive upper
        // bound always exists.
        let Some(end) = prefix_end(&prefix) else {
            return Ok(AssetPage {
                assets: Vec::new(),
                next_cursor: None,
            });
        };
        let iter = by_ns
            .range::<&[u8]>((
                std::ops::Bound::Excluded(start.as_slice()),
                std::ops::Bound::Excluded(end.as_slice()),
            ))
            .map_err(be)?;

        let mut page = AssetPage {
            assets: Vec::new(),
            next_cursor: None,
        };
        for entry in iter {
            let (key, value) = entry.map_err(be)?;
            if page.assets.len() >= limit {
                page.next_cursor = Some(key.value().to_vec());
                break;
            }
            let id = AssetId(*value.value());

            let visible = visibility
                .get(&id.0)
                .map_err(be)?
                .map(|raw| codec::from_bytes_canonical::<VisibilityRecord>(raw.value()))
                .transpose()?
                .map(|v| v.visible)
                .unwrap_or(false);
            if !visible {
                continue;
            }

            let record: AssetRecord = match assets.get(&id.0).map_err(be)? {
                Some(raw) => codec::from_bytes_canonical(raw.value())?,
                None => continue,
            };
            if let Some(kind) = filter.kind {
                if record.kind != kind {
                    continue;
                }
            }
            if !filter
                .metadata
                .iter()
                .all(|(k, v)| record.metadata.get(k) == Some(v))
            {
                continue;
            }
            page.assets.push(record);
        }
        Ok(page)
    }

    /// Every visible asset id in a namespace, ascending.
    pub fn visible_assets_in(&self, namespace: &Namespace) -> Result<Vec<AssetId>, MetaError> {
        let r = self.read_txn()?;
        let by_ns = r.open_table(ASSETS_BY_NS).map_err(be)?;
        let visibility = r.open_table(VISIBILITY).map_err(be)?;

        let prefix = k_ns_prefix(namespace);
        let mut out = Vec::new();
        for entry in by_ns.range(prefix.as_slice()..).map_err(be)? {
            let (key, value) = entry.map_err(be)?;
            if !key.value().starts_with(&prefix) {
                break;
            }
            let id = AssetId(*value.value());
            let visible = visibility
                .get(&id.0)
                .map_err(be)?
                .map(|raw| codec::from_bytes_canonical::<VisibilityRecord>(raw.value()))
                .transpose()?
                .map(|v| v.visible)
                .unwrap_or(false);
            if visible {
                out.push(id);
            }
        }
        out.sort_unstable();
        out.dedup();
        Ok(out)
    }

    /// All known namespaces, ascending.
    pub fn list_namespaces(&self) -> Result<Vec<Namespace>, MetaError> {
        let r = self.read_txn()?;
        let namespaces = r.open_table(NAMESPACES).map_err(be)?;
        let mut out = Vec::new();
        for entry in namespaces.iter().map_err(be)? {
            let (key, _) = entry.map_err(be)?;
            let name = String::from_utf8(key.value().to_vec())
                .map_err(|e| MetaError::Decode(e.to_string()))?;
            out.push(Namespace::new(name)?);
        }
        Ok(out)
    }

    /// Records a namespace without requiring an asset (key registration,
    /// branch creation).
    pub fn ensure_namespace(&self, namespace: &Namespace, now: u64) -> Result<(), MetaError> {
        let w = self.write_txn()?;
        {
            let mut namespaces = w.open_table(NAMESPACES).map_err(be)?;
            if namespaces.get(namespace.as_ref()).map_err(be)?.is_none() {
                namespaces.insert(namespace.as_ref(), now).map_err(be)?;
            }
        }
        w.commit().map_err(be)
    }

    // ---- chunks ----

    /// Inserts or replaces a chunk sidecar record.
    pub fn upsert_chunk(&self, record: &ChunkRecord) -> Result<(), MetaError> {
        let w = self.write_txn()?;
        {
            let mut chunks = w.open_table(CHUNKS).map_err(be)?;
            chunks
                .insert(&record.hash.0, codec::to_bytes_canonical(record).as_slice())
                .map_err(be)?;
        }
        w.commit().map_err(be)
    }

    /// Fetches a chunk sidecar record.
    pub fn get_chunk(&self, hash: &ChunkHash) -> Result<ChunkRecord, MetaError> {
        let r = self.read_txn()?;
        let chunks = r.open_table(CHUNKS).map_err(be)?;
        let result = chunks
            .get(&hash.0)
            .map_err(be)?
            .map(|raw| codec::from_bytes_canonical(raw.value()))
            .transpose()?
            .ok_or(MetaError::NotFound {
                entity: "chunk",
                key: hash.to_hex(),
            });
        result
    }

    /// Replaces a chunk's wrapped DEK after a KMS rotation.
    pub fn update_chunk_wrap(
        &self,
        hash: &ChunkHash,
        wrapped_dek: Vec<u8>,
        kms_key_id: String,
    ) -> Result<(), MetaError> {
        let w = self.write_txn()?;
        {
            let mut chunks = w.open_table(CHUNKS).map_err(be)?;
            let mut record: ChunkRecord = match chunks.get(&hash.0).map_err(be)? {
                Some(raw) => codec::from_bytes_canonical(raw.value())?,
                None => {
                    return Err(MetaError::NotFound {
                        entity: "chunk",
                        key: hash.to_hex(),
                    })
                }
            };
            record.wrapped_dek = wrapped_dek;
            record.kms_key_id = kms_key_id;
            chunks
                .insert(&hash.0, codec::to_bytes_canonical(&record).as_slice())
                .map_err(be)?;
        }
        w.commit().map_err(be)
    }

    /// Chunk hashes whose refcount has reached zero (prune candidates).
    pub fn zero_ref_chunks(&self) -> Result<Vec<ChunkHash>, MetaError> {
        let r = self.read_txn()?;
        let chunks = r.open_table(CHUNKS).map_err(be)?;
        let mut out = Vec::new();
        for entry in chunks.iter().map_err(be)? {
            let (key, value) = entry.map_err(be)?;
            let record: ChunkRecord = codec::from_bytes_canonical(value.value())?;
            if record.refcount == 0 {
                out.push(ChunkHash(*key.value()));
            }
        }
        Ok(out)
    }

    /// Drops a chunk sidecar record after the file has been pruned.
    pub fn remove_chunk_record(&self, hash: &ChunkHash) -> Result<(), MetaError> {
        let w = self.write_txn()?;
        {
            let mut chunks = w.open_table(CHUNKS).map_err(be)?;
            chunks.remove(&hash.0).map_err(be)?;
        }
        w.commit().map_err(be)
    }

    // ---- lineage ----

    /// Inserts lineage edges, rejecting any batch that would introduce a
    /// cycle. The check and the insert share one write transaction.
    pub fn add_lineage_edges(&self, edges: &[LineageEdgeRecord]) -> Result<(), MetaError> {
        if edges.is_empty() {
            return Ok(());
        }
        let w = self.write_txn()?;
        {
            let mut by_child = w.open_table(LINEAGE_BY_CHILD).map_err(be)?;
            let mut by_parent = w.open_table(LINEAGE_BY_PARENT).map_err(be)?;

            for edge in edges {
                if edge.child == edge.parent {
                    return Err(MetaError::LineageCycle(edge.child));
                }
                let encoded = codec::to_bytes_canonical(edge);
                by_child
                    .insert(k_edge(&edge.child, &edge.parent).as_slice(), encoded.as_slice())
                    .map_err(be)?;
                by_parent
                    .insert(k_edge(&edge.parent, &edge.child).as_slice(), encoded.as_slice())
                    .map_err(be)?;
            }

            // BFS from every new child through its ancestors; finding the
            // child again means the batch closed a cycle. The transaction
            // is dropped without commit on failure.
            let children: HashSet<AssetId> = edges.iter().map(|e| e.child).collect();
            for &start in &children {
                let mut queue: VecDeque<AssetId> = VecDeque::new();
                let mut seen: HashSet<AssetId> = HashSet::new();
                queue.push_back(start);
                while let Some(node) = queue.pop_front() {
                    for parent in parents_in(&by_child, &node)? {
                        if parent == start {
                            return Err(MetaError::LineageCycle(start));
                        }
                        if seen.insert(parent) {
                            queue.push_back(parent);
                        }
                    }
                }
            }
        }
        w.commit().map_err(be)
    }

    /// Edges whose child is `id`.
    pub fn parents_of(&self, id: &AssetId) -> Result<Vec<LineageEdgeRecord>, MetaError> {
        let r = self.read_txn()?;
        let by_child = r.open_table(LINEAGE_BY_CHILD).map_err(be)?;
        edges_with_prefix(&by_child, id)
    }

    /// Edges whose parent is `id`.
    pub fn children_of(&self, id: &AssetId) -> Result<Vec<LineageEdgeRecord>, MetaError> {
        let r = self.read_txn()?;
        let by_parent = r.open_table(LINEAGE_BY_PARENT).map_err(be)?;
        edges_with_prefix(&by_parent, id)
    }

    // ---- transactions ----

    /// Writes (or rewrites) the durable mirror of a transaction.
    pub fn put_tx(&self, record: &TxRecord) -> Result<(), MetaError> {
        let w = self.write_txn()?;
        {
            let mut txs = w.open_table(TXS).map_err(be)?;
            txs.insert(&record.tx_id.0, codec::to_bytes_canonical(record).as_slice())
                .map_err(be)?;
        }
        w.commit().map_err(be)
    }

    /// Fetches a transaction's durable mirror.
    pub fn get_tx(&self, tx_id: &TxId) -> Result<TxRecord, MetaError> {
        let r = self.read_txn()?;
        let txs = r.open_table(TXS).map_err(be)?;
        let result = txs
            .get(&tx_id.0)
            .map_err(be)?
            .map(|raw| codec::from_bytes_canonical(raw.value()))
            .transpose()?
            .ok_or(MetaError::NotFound {
                entity: "transaction",
                key: tx_id.to_hex(),
            });
        result
    }

    /// Durably attempts the commit: verifies every declared parent is
    /// visible, then flips the visibility of all attached assets and the
    /// transaction state in one write transaction. On an invisible
    /// parent the transaction is marked `Failed` instead, atomically.
    pub fn commit_tx(&self, tx_id: &TxId, now: u64) -> Result<CommitOutcome, MetaError> {
        let w = self.write_txn()?;
        let outcome;
        {
            let mut txs = w.open_table(TXS).map_err(be)?;
            let mut record: TxRecord = match txs.get(&tx_id.0).map_err(be)? {
                Some(raw) => codec::from_bytes_canonical(raw.value())?,
                None => {
                    return Err(MetaError::NotFound {
                        entity: "transaction",
                        key: tx_id.to_hex(),
                    })
                }
            };

            let mut visibility = w.open_table(VISIBILITY).map_err(be)?;

            let mut blocked = None;
            for parent in &record.dependencies {
                let visible = visibility
                    .get(&parent.0)
                    .map_err(be)?
                    .map(|raw| codec::from_bytes_canonical::<VisibilityRecord>(raw.value()))
                    .transpose()?
                    .map(|v| v.visible)
                    .unwrap_or(false);
                if !visible {
                    blocked = Some(*parent);
                    break;
                }
            }

            match blocked {
                Some(parent) => {
                    record.state = TxState::Failed;
                    txs.insert(&tx_id.0, codec::to_bytes_canonical(&record).as_slice())
                        .map_err(be)?;
                    outcome = CommitOutcome::ParentNotVisible(parent);
                }
                None => {
                    for asset in &record.assets {
                        let vis = VisibilityRecord {
                            visible: true,
                            tx_id: *tx_id,
                            committed_at: Some(now),
                        };
                        visibility
                            .insert(&asset.0, codec::to_bytes_canonical(&vis).as_slice())
                            .map_err(be)?;
                    }
                    record.state = TxState::Committed;
                    record.committed_at = Some(now);
                    txs.insert(&tx_id.0, codec::to_bytes_canonical(&record).as_slice())
                        .map_err(be)?;
                    outcome = CommitOutcome::Committed(record);
                }
            }
        }
        w.commit().map_err(be)?;
        Ok(outcome)
    }

    /// Durably rolls back: removes every tx-scoped asset row, visibility
    /// row, index row and lineage edge, decrements chunk references, and
    /// marks the transaction `RolledBack`, all in one write transaction.
    pub fn rollback_tx(&self, tx_id: &TxId) -> Result<TxRecord, MetaError> {
        let w = self.write_txn()?;
        let record;
        {
            let mut txs = w.open_table(TXS).map_err(be)?;
            let mut tx: TxRecord = match txs.get(&tx_id.0).map_err(be)? {
                Some(raw) => codec::from_bytes_canonical(raw.value())?,
                None => {
                    return Err(MetaError::NotFound {
                        entity: "transaction",
                        key: tx_id.to_hex(),
                    })
                }
            };

            let mut assets_table = w.open_table(ASSETS).map_err(be)?;
            let mut visibility = w.open_table(VISIBILITY).map_err(be)?;
            let mut by_ns = w.open_table(ASSETS_BY_NS).map_err(be)?;
            let mut by_kind = w.open_table(ASSETS_BY_KIND).map_err(be)?;
            let mut chunks = w.open_table(CHUNKS).map_err(be)?;
            let mut by_child = w.open_table(LINEAGE_BY_CHILD).map_err(be)?;
            let mut by_parent = w.open_table(LINEAGE_BY_PARENT).map_err(be)?;

            for asset_id in &tx.assets {
                // Content-addressed dedup can attach one asset id to two
                // transactions; only the transaction the visibility row
                // points at may remove the shared rows.
                let owner = visibility
                    .get(&asset_id.0)
                    .map_err(be)?
                    .map(|raw| codec::from_bytes_canonical::<VisibilityRecord>(raw.value()))
                    .transpose()?
                    .map(|v| v.tx_id);
                if owner != Some(*tx_id) {
                    continue;
                }

                let removed = assets_table.remove(&asset_id.0).map_err(be)?;
                let Some(raw) = removed else { continue };
                let asset: AssetRecord = codec::from_bytes_canonical(raw.value())?;
                drop(raw);

                visibility.remove(&asset_id.0).map_err(be)?;
                by_ns
                    .remove(k_ns_index(&asset.namespace, asset.created_at, asset_id).as_slice())
                    .map_err(be)?;
                by_kind
                    .remove(
                        k_kind_index(asset.kind.as_byte(), asset.created_at, asset_id).as_slice(),
                    )
                    .map_err(be)?;
                decrement_chunk_refs(&mut chunks, &asset.chunks)?;

                // Remove edges in both orientations for the vanished asset.
                for edge in edges_with_prefix(&by_child, asset_id)? {
                    by_child
                        .remove(k_edge(&edge.child, &edge.parent).as_slice())
                        .map_err(be)?;
                    by_parent
                        .remove(k_edge(&edge.parent, &edge.child).as_slice())
                        .map_err(be)?;
                }
                for edge in edges_with_prefix(&by_parent, asset_id)? {
                    by_parent
                        .remove(k_edge(&edge.parent, &edge.child).as_slice())
                        .map_err(be)?;
                    by_child
                        .remove(k_edge(&edge.child, &edge.parent).as_slice())
                        .map_err(be)?;
                }
            }

            tx.state = TxState::RolledBack;
            txs.insert(&tx_id.0, codec::to_bytes_canonical(&tx).as_slice())
                .map_err(be)?;
            record = tx;
        }
        w.commit().map_err(be)?;
        Ok(record)
    }

    // ---- snapshots ----

    /// Persists a snapshot; duplicate ids are rejected.
    pub fn create_snapshot(&self, record: &SnapshotRecord) -> Result<(), MetaError> {
        let w = self.write_txn()?;
        {
            let mut snapshots = w.open_table(SNAPSHOTS).map_err(be)?;
            if snapshots.get(&record.snapshot_id.0).map_err(be)?.is_some() {
                return Err(MetaError::AlreadyExists {
                    entity: "snapshot",
                    key: record.snapshot_id.to_hex(),
                });
            }
            snapshots
                .insert(
                    &record.snapshot_id.0,
                    codec::to_bytes_canonical(record).as_slice(),
                )
                .map_err(be)?;
        }
        w.commit().map_err(be)
    }

    /// Fetches a snapshot.
    pub fn get_snapshot(&self, id: &SnapshotId) -> Result<SnapshotRecord, MetaError> {
        let r = self.read_txn()?;
        let snapshots = r.open_table(SNAPSHOTS).map_err(be)?;
        let result = snapshots
            .get(&id.0)
            .map_err(be)?
            .map(|raw| codec::from_bytes_canonical(raw.value()))
            .transpose()?
            .ok_or(MetaError::NotFound {
                entity: "snapshot",
                key: id.to_hex(),
            });
        result
    }

    /// Snapshots of one namespace, ascending by timestamp.
    pub fn list_snapshots(&self, namespace: &Namespace) -> Result<Vec<SnapshotRecord>, MetaError> {
        let r = self.read_txn()?;
        let snapshots = r.open_table(SNAPSHOTS).map_err(be)?;
        let mut out = Vec::new();
        for entry in snapshots.iter().map_err(be)? {
            let (_, value) = entry.map_err(be)?;
            let record: SnapshotRecord = codec::from_bytes_canonical(value.value())?;
            if &record.namespace == namespace {
                out.push(record);
            }
        }
        out.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(out)
    }

    // ---- branches ----

    /// Creates or moves a branch pointer, appending the history row in
    /// the same write transaction. Returns the previous target, if any.
    pub fn upsert_branch(
        &self,
        namespace: &Namespace,
        name: &str,
        snapshot_id: SnapshotId,
        now: u64,
        metadata: std::collections::BTreeMap<String, String>,
    ) -> Result<Option<SnapshotId>, MetaError> {
        let w = self.write_txn()?;
        let old;
        {
            let mut branches = w.open_table(BRANCHES).map_err(be)?;
            let key = k_named(namespace, name);

            old = branches
                .get(key.as_slice())
                .map_err(be)?
                .map(|raw| codec::from_bytes_canonical::<BranchRecord>(raw.value()))
                .transpose()?
                .map(|b| b.snapshot_id);

            let record = BranchRecord {
                namespace: namespace.clone(),
                name: name.to_string(),
                snapshot_id,
                updated_at: now,
            };
            branches
                .insert(key.as_slice(), codec::to_bytes_canonical(&record).as_slice())
                .map_err(be)?;

            let mut history = w.open_table(BRANCH_HISTORY).map_err(be)?;
            let seq = next_history_seq(&history, namespace, name)?;
            let row = BranchHistoryRecord {
                old_snapshot_id: old,
                new_snapshot_id: snapshot_id,
                at: now,
                metadata,
            };
            history
                .insert(
                    k_history(namespace, name, seq).as_slice(),
                    codec::to_bytes_canonical(&row).as_slice(),
                )
                .map_err(be)?;
        }
        w.commit().map_err(be)?;
        Ok(old)
    }

    /// Fetches a branch pointer.
    pub fn get_branch(&self, namespace: &Namespace, name: &str) -> Result<BranchRecord, MetaError> {
        let r = self.read_txn()?;
        let branches = r.open_table(BRANCHES).map_err(be)?;
        let result = branches
            .get(k_named(namespace, name).as_slice())
            .map_err(be)?
            .map(|raw| codec::from_bytes_canonical(raw.value()))
            .transpose()?
            .ok_or(MetaError::NotFound {
                entity: "branch",
                key: format!("{namespace}/{name}"),
            });
        result
    }

    /// Branch pointers of one namespace, ascending by name.
    pub fn list_branches(&self, namespace: &Namespace) -> Result<Vec<BranchRecord>, MetaError> {
        let r = self.read_txn()?;
        let branches = r.open_table(BRANCHES).map_err(be)?;
        named_records_in(&branches, namespace)
    }

    /// Removes a branch pointer; the history stays.
    pub fn delete_branch(
        &self,
        namespace: &Namespace,
        name: &str,
    ) -> Result<BranchRecord, MetaError> {
        let w = self.write_txn()?;
        let record;
        {
            let mut branches = w.open_table(BRANCHES).map_err(be)?;
            record = match branches.remove(k_named(namespace, name).as_slice()).map_err(be)? {
                Some(raw) => codec::from_bytes_canonical::<BranchRecord>(raw.value())?,
                None => {
                    return Err(MetaError::NotFound {
                        entity: "branch",
                        key: format!("{namespace}/{name}"),
                    })
                }
            };
        }
        w.commit().map_err(be)?;
        Ok(record)
    }

    /// The append-only history of one branch, in order.
    pub fn branch_history(
        &self,
        namespace: &Namespace,
        name: &str,
    ) -> Result<Vec<BranchHistoryRecord>, MetaError> {
        let r = self.read_txn()?;
        let history = r.open_table(BRANCH_HISTORY).map_err(be)?;
        let prefix = k_history_prefix(namespace, name);
        let mut out = Vec::new();
        for entry in history.range(prefix.as_slice()..).map_err(be)? {
            let (key, value) = entry.map_err(be)?;
            if !key.value().starts_with(&prefix) {
                break;
            }
            out.push(codec::from_bytes_canonical(value.value())?);
        }
        Ok(out)
    }

    // ---- tags ----

    /// Creates an immutable tag; re-creation fails.
    pub fn create_tag(&self, record: &TagRecord) -> Result<(), MetaError> {
        let w = self.write_txn()?;
        {
            let mut tags = w.open_table(TAGS).map_err(be)?;
            let key = k_named(&record.namespace, &record.name);
            if tags.get(key.as_slice()).map_err(be)?.is_some() {
                return Err(MetaError::AlreadyExists {
                    entity: "tag",
                    key: format!("{}/{}", record.namespace, record.name),
                });
            }
            tags.insert(key.as_slice(), codec::to_bytes_canonical(record).as_slice())
                .map_err(be)?;
        }
        w.commit().map_err(be)
    }

    /// Fetches a tag.
    pub fn get_tag(&self, namespace: &Namespace, name: &str) -> Result<TagRecord, MetaError> {
        let r = self.read_txn()?;
        let tags = r.open_table(TAGS).map_err(be)?;
        let result = tags
            .get(k_named(namespace, name).as_slice())
            .map_err(be)?
            .map(|raw| codec::from_bytes_canonical(raw.value()))
            .transpose()?
            .ok_or(MetaError::NotFound {
                entity: "tag",
                key: format!("{namespace}/{name}"),
            });
        result
    }

    /// Tags of one namespace, ascending by name.
    pub fn list_tags(&self, namespace: &Namespace) -> Result<Vec<TagRecord>, MetaError> {
        let r = self.read_txn()?;
        let tags = r.open_table(TAGS).map_err(be)?;
        named_records_in(&tags, namespace)
    }

    // ---- key registry ----

    /// Registers a namespace verification key. Re-registration requires
    /// `overwrite` (granted only to admin-caveated callers).
    pub fn register_namespace_key(
        &self,
        record: &NamespaceKeyRecord,
        overwrite: bool,
    ) -> Result<(), MetaError> {
        let w = self.write_txn()?;
        {
            let mut keys = w.open_table(NS_KEYS).map_err(be)?;
            if !overwrite && keys.get(record.namespace.as_ref()).map_err(be)?.is_some() {
                return Err(MetaError::AlreadyExists {
                    entity: "namespace key",
                    key: record.namespace.to_string(),
                });
            }
            keys.insert(
                record.namespace.as_ref(),
                codec::to_bytes_canonical(record).as_slice(),
            )
            .map_err(be)?;
        }
        w.commit().map_err(be)
    }

    /// Fetches the verification key pinned for a namespace.
    pub fn get_namespace_key(
        &self,
        namespace: &Namespace,
    ) -> Result<NamespaceKeyRecord, MetaError> {
        let r = self.read_txn()?;
        let keys = r.open_table(NS_KEYS).map_err(be)?;
        let result = keys
            .get(namespace.as_ref())
            .map_err(be)?
            .map(|raw| codec::from_bytes_canonical(raw.value()))
            .transpose()?
            .ok_or(MetaError::NotFound {
                entity: "namespace key",
                key: namespace.to_string(),
            });
        result
    }

    /// Pins a trusted verification key under a caller-chosen id.
    pub fn pin_trusted_key(
        &self,
        record: &TrustedKeyRecord,
        overwrite: bool,
    ) -> Result<(), MetaError> {
        let w = self.write_txn()?;
        {
            let mut keys = w.open_table(TRUSTED_KEYS).map_err(be)?;
            if !overwrite
                && keys
                    .get(record.key_id.as_bytes())
                    .map_err(be)?
                    .is_some()
            {
                return Err(MetaError::AlreadyExists {
                    entity: "trusted key",
                    key: record.key_id.clone(),
                });
            }
            keys.insert(
                record.key_id.as_bytes(),
                codec::to_bytes_canonical(record).as_slice(),
            )
            .map_err(be)?;
        }
        w.commit().map_err(be)
    }

    /// Fetches a trusted key by id.
    pub fn get_trusted_key(&self, key_id: &str) -> Result<TrustedKeyRecord, MetaError> {
        let r = self.read_txn()?;
        let keys = r.open_table(TRUSTED_KEYS).map_err(be)?;
        let result = keys
            .get(key_id.as_bytes())
            .map_err(be)?
            .map(|raw| codec::from_bytes_canonical(raw.value()))
            .transpose()?
            .ok_or(MetaError::NotFound {
                entity: "trusted key",
                key: key_id.to_string(),
            });
        result
    }
}

fn decrement_chunk_refs(
    chunks: &mut redb::Table<'_, '_, &'static [u8; 32], &'static [u8]>,
    hashes: &[ChunkHash],
) -> Result<(), MetaError> {
    let distinct: BTreeSet<&ChunkHash> = hashes.iter().collect();
    for hash in distinct {
        let mut record: ChunkRecord = match chunks.get(&hash.0).map_err(be)? {
            Some(raw) => codec::from_bytes_canonical(raw.value())?,
            None => continue,
        };
        record.refcount = record.refcount.saturating_sub(1);
        chunks
            .insert(&hash.0, codec::to_bytes_canonical(&record).as_slice())
            .map_err(be)?;
    }
    Ok(())
}

fn parents_in(
    table: &impl ReadableTable<&'static [u8], &'static [u8]>,
    id: &AssetId,
) -> Result<Vec<AssetId>, MetaError> {
    let mut out = Vec::new();
    for entry in table.range(id.0.as_slice()..).map_err(be)? {
        let (key, _) = entry.map_err(be)?;
        let bytes = key.value();
        if !bytes.starts_with(&id.0) {
            break;
        }
        if bytes.len() == 64 {
            let mut parent = [0u8; 32];
            parent.copy_from_slice(&bytes[32..]);
            out.push(AssetId(parent));
        }
    }
    Ok(out)
}

fn edges_with_prefix(
    table: &impl ReadableTable<&'static [u8], &'static [u8]>,
    id: &AssetId,
) -> Result<Vec<LineageEdgeRecord>, MetaError> {
    let mut out = Vec::new();
    for entry in table.range(id.0.as_slice()..).map_err(be)? {
        let (key, value) = entry.map_err(be)?;
        if !key.value().starts_with(&id.0) {
            break;
        }
        out.push(codec::from_bytes_canonical(value.value())?);
    }
    Ok(out)
}

fn named_records_in<R>(
    table: &impl ReadableTable<&'static [u8], &'static [u8]>,
    namespace: &Namespace,
) -> Result<Vec<R>, MetaError>
where
    R: parity_scale_codec::Decode,
{
    let prefix = k_ns_prefix(namespace);
    let mut out = Vec::new();
    for entry in table.range(prefix.as_slice()..).map_err(be)? {
        let (key, value) = entry.map_err(be)?;
        if !key.value().starts_with(&prefix) {
            break;
        }
        out.push(codec::from_bytes_canonical(value.value())?);
    }
    Ok(out)
}

fn next_history_seq(
    table: &impl ReadableTable<&'static [u8], &'static [u8]>,
    namespace: &Namespace,
    name: &str,
) -> Result<u64, MetaError> {
    let prefix = k_history_prefix(namespace, name);
    let mut count = 0u64;
    for entry in table.range(prefix.as_slice()..).map_err(be)? {
        let (key, _) = entry.map_err(be)?;
        if !key.value().starts_with(&prefix) {
            break;
        }
        count += 1;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn open_store() -> (tempfile::TempDir, MetaStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = MetaStore::open(dir.path().join("meta.redb")).unwrap();
        (dir, store)
    }

    fn ns(name: &str) -> Namespace {
        Namespace::new(name).unwrap()
    }

    fn chunk(hash: u8) -> ChunkRecord {
        ChunkRecord {
            hash: ChunkHash([hash; 32]),
            size_plain: 8,
            size_stored: 8,
            wrapped_dek: vec![1, 2, 3],
            kms_key_id: "local/test".to_string(),
            codec: aifs_types::asset::ChunkCodec::None,
            compression_level: 0,
            refcount: 0,
        }
    }

    fn asset(id: u8, tx: &TxId, namespace: &str, chunks: Vec<ChunkHash>) -> AssetRecord {
        AssetRecord {
            asset_id: AssetId([id; 32]),
            kind: AssetKind::Blob,
            namespace: ns(namespace),
            size: 8,
            created_at: 1_000 + id as u64,
            metadata: BTreeMap::new(),
            embedding: None,
            chunks,
            tx_id: *tx,
        }
    }

    fn tx_with(store: &MetaStore, assets: Vec<AssetId>, deps: Vec<AssetId>) -> TxRecord {
        let record = TxRecord {
            tx_id: TxId::generate(),
            state: TxState::Pending,
            created_at: 1,
            committed_at: None,
            assets,
            dependencies: deps,
        };
        store.put_tx(&record).unwrap();
        record
    }

    fn insert_asset(store: &MetaStore, id: u8, tx: &TxId, namespace: &str) -> AssetId {
        let hash = ChunkHash([id; 32]);
        store.upsert_chunk(&chunk(id)).unwrap();
        let record = asset(id, tx, namespace, vec![hash]);
        store.insert_pending_asset(&record).unwrap();
        record.asset_id
    }

    #[test]
    fn pending_assets_are_invisible_until_commit() {
        let (_dir, store) = open_store();
        let tx = tx_with(&store, vec![AssetId([1; 32])], vec![]);
        let id = insert_asset(&store, 1, &tx.tx_id, "prod");

        assert!(!store.is_visible(&id).unwrap());
        assert!(store.visible_assets_in(&ns("prod")).unwrap().is_empty());

        let outcome = store.commit_tx(&tx.tx_id, 42).unwrap();
        let committed = match outcome {
            CommitOutcome::Committed(tx) => tx,
            CommitOutcome::ParentNotVisible(_) => panic!("unexpected block"),
        };
        assert_eq!(committed.state, TxState::Committed);
        assert_eq!(committed.committed_at, Some(42));
        assert!(store.is_visible(&id).unwrap());
        assert_eq!(store.visible_assets_in(&ns("prod")).unwrap(), vec![id]);
        assert_eq!(store.get_visibility(&id).unwrap().unwrap().committed_at, Some(42));
    }

    #[test]
    fn commit_blocks_on_invisible_parent_and_marks_failed() {
        let (_dir, store) = open_store();
        let parent_tx = tx_with(&store, vec![AssetId([1; 32])], vec![]);
        let parent = insert_asset(&store, 1, &parent_tx.tx_id, "prod");

        let child_tx = tx_with(&store, vec![AssetId([2; 32])], vec![parent]);
        insert_asset(&store, 2, &child_tx.tx_id, "prod");

        match store.commit_tx(&child_tx.tx_id, 10).unwrap() {
            CommitOutcome::ParentNotVisible(p) => assert_eq!(p, parent),
            CommitOutcome::Committed(_) => panic!("must not commit"),
        }
        assert_eq!(store.get_tx(&child_tx.tx_id).unwrap().state, TxState::Failed);
        assert!(!store.is_visible(&AssetId([2; 32])).unwrap());

        // After the parent commits, a fresh transaction can commit.
        store.commit_tx(&parent_tx.tx_id, 11).unwrap();
        let retry_tx = tx_with(&store, vec![AssetId([3; 32])], vec![parent]);
        insert_asset(&store, 3, &retry_tx.tx_id, "prod");
        assert!(matches!(
            store.commit_tx(&retry_tx.tx_id, 12).unwrap(),
            CommitOutcome::Committed(_)
        ));
    }

    #[test]
    fn rollback_removes_rows_and_refcounts() {
        let (_dir, store) = open_store();
        let tx = tx_with(&store, vec![AssetId([1; 32])], vec![]);
        let id = insert_asset(&store, 1, &tx.tx_id, "prod");
        assert_eq!(store.get_chunk(&ChunkHash([1; 32])).unwrap().refcount, 1);

        let rolled = store.rollback_tx(&tx.tx_id).unwrap();
        assert_eq!(rolled.state, TxState::RolledBack);
        assert!(store.try_get_asset(&id).unwrap().is_none());
        assert!(store.get_visibility(&id).unwrap().is_none());
        assert_eq!(store.get_chunk(&ChunkHash([1; 32])).unwrap().refcount, 0);
        assert_eq!(store.zero_ref_chunks().unwrap(), vec![ChunkHash([1; 32])]);
    }

    #[test]
    fn lineage_cycle_rejected() {
        let (_dir, store) = open_store();
        let a = AssetId([1; 32]);
        let b = AssetId([2; 32]);
        let c = AssetId([3; 32]);

        let edge = |child: AssetId, parent: AssetId| LineageEdgeRecord {
            child,
            parent,
            transform_name: "train".to_string(),
            transform_digest: "ab".repeat(32),
        };

        store.add_lineage_edges(&[edge(b, a)]).unwrap();
        store.add_lineage_edges(&[edge(c, b)]).unwrap();

        // a -> b -> c exists; closing the loop must fail.
        assert!(matches!(
            store.add_lineage_edges(&[edge(a, c)]),
            Err(MetaError::LineageCycle(_))
        ));
        // The failed batch left nothing behind.
        assert!(store.parents_of(&a).unwrap().is_empty());

        // Self-edges are cycles too.
        assert!(matches!(
            store.add_lineage_edges(&[edge(a, a)]),
            Err(MetaError::LineageCycle(_))
        ));

        assert_eq!(store.parents_of(&b).unwrap().len(), 1);
        assert_eq!(store.children_of(&a).unwrap().len(), 1);
    }

    #[test]
    fn list_assets_pages_and_filters() {
        let (_dir, store) = open_store();
        let ids: Vec<AssetId> = (1..=5u8)
            .map(|i| AssetId([i; 32]))
            .collect();
        let tx = tx_with(&store, ids.clone(), vec![]);
        for i in 1..=5u8 {
            insert_asset(&store, i, &tx.tx_id, "prod");
        }
        store.commit_tx(&tx.tx_id, 9).unwrap();

        // An uncommitted asset in the same namespace stays hidden.
        let hidden_tx = tx_with(&store, vec![AssetId([9; 32])], vec![]);
        insert_asset(&store, 9, &hidden_tx.tx_id, "prod");

        let filter = AssetFilter {
            namespace: ns("prod"),
            kind: None,
            metadata: Vec::new(),
        };
        let first = store.list_assets(&filter, 3, None).unwrap();
        assert_eq!(first.assets.len(), 3);
        let cursor = first.next_cursor.expect("more pages");
        let second = store.list_assets(&filter, 3, Some(&cursor)).unwrap();
        assert_eq!(second.assets.len(), 2);
        assert!(second.next_cursor.is_none());

        let mut seen: Vec<AssetId> = first
            .assets
            .iter()
            .chain(second.assets.iter())
            .map(|a| a.asset_id)
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, ids);

        let none = store
            .list_assets(
                &AssetFilter {
                    namespace: ns("prod"),
                    kind: Some(AssetKind::Tensor),
                    metadata: Vec::new(),
                },
                10,
                None,
            )
            .unwrap();
        assert!(none.assets.is_empty());
    }

    #[test]
    fn branch_pointer_moves_and_history_appends() {
        let (_dir, store) = open_store();
        let namespace = ns("prod");
        let s1 = SnapshotId([1; 16]);
        let s2 = SnapshotId([2; 16]);

        let old = store
            .upsert_branch(&namespace, "main", s1, 100, BTreeMap::new())
            .unwrap();
        assert_eq!(old, None);
        let old = store
            .upsert_branch(&namespace, "main", s2, 200, BTreeMap::new())
            .unwrap();
        assert_eq!(old, Some(s1));

        assert_eq!(store.get_branch(&namespace, "main").unwrap().snapshot_id, s2);

        let history = store.branch_history(&namespace, "main").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].old_snapshot_id, None);
        assert_eq!(history[0].new_snapshot_id, s1);
        assert_eq!(history[1].old_snapshot_id, Some(s1));
        assert_eq!(history[1].new_snapshot_id, s2);

        // Deleting the pointer preserves the history.
        store.delete_branch(&namespace, "main").unwrap();
        assert!(store.get_branch(&namespace, "main").is_err());
        assert_eq!(store.branch_history(&namespace, "main").unwrap().len(), 2);
    }

    #[test]
    fn tags_are_immutable() {
        let (_dir, store) = open_store();
        let record = TagRecord {
            namespace: ns("prod"),
            name: "v1".to_string(),
            snapshot_id: SnapshotId([1; 16]),
            created_at: 5,
        };
        store.create_tag(&record).unwrap();

        let mut second = record.clone();
        second.snapshot_id = SnapshotId([2; 16]);
        assert!(matches!(
            store.create_tag(&second),
            Err(MetaError::AlreadyExists { .. })
        ));
        assert_eq!(
            store.get_tag(&ns("prod"), "v1").unwrap().snapshot_id,
            SnapshotId([1; 16])
        );
    }

    #[test]
    fn namespace_key_overwrite_requires_flag() {
        let (_dir, store) = open_store();
        let record = NamespaceKeyRecord {
            namespace: ns("prod"),
            pubkey: [1; 32],
            created_at: 1,
            metadata: BTreeMap::new(),
        };
        store.register_namespace_key(&record, false).unwrap();

        let mut replacement = record.clone();
        replacement.pubkey = [2; 32];
        assert!(store.register_namespace_key(&replacement, false).is_err());
        store.register_namespace_key(&replacement, true).unwrap();
        assert_eq!(store.get_namespace_key(&ns("prod")).unwrap().pubkey, [2; 32]);
    }

    #[test]
    fn snapshots_unique_by_id() {
        let (_dir, store) = open_store();
        let record = SnapshotRecord {
            snapshot_id: SnapshotId([7; 16]),
            namespace: ns("prod"),
            merkle_root: [0; 32],
            timestamp: "2026-08-01T00:00:00Z".to_string(),
            asset_ids: vec![],
            signature: vec![0; 64],
            signer_pubkey: [0; 32],
            metadata: BTreeMap::new(),
        };
        store.create_snapshot(&record).unwrap();
        assert!(matches!(
            store.create_snapshot(&record),
            Err(MetaError::AlreadyExists { .. })
        ));
        assert_eq!(store.list_snapshots(&ns("prod")).unwrap().len(), 1);
        assert!(store.get_snapshot(&SnapshotId([8; 16])).is_err());
    }

    #[test]
    fn delete_asset_decrements_refs_but_keeps_lineage() {
        let (_dir, store) = open_store();
        let tx = tx_with(&store, vec![AssetId([1; 32]), AssetId([2; 32])], vec![]);
        let parent = insert_asset(&store, 1, &tx.tx_id, "prod");
        let child = insert_asset(&store, 2, &tx.tx_id, "prod");
        store.commit_tx(&tx.tx_id, 1).unwrap();
        store
            .add_lineage_edges(&[LineageEdgeRecord {
                child,
                parent,
                transform_name: "distill".to_string(),
                transform_digest: "cd".repeat(32),
            }])
            .unwrap();

        store.delete_asset(&parent).unwrap();
        assert!(store.try_get_asset(&parent).unwrap().is_none());
        assert_eq!(store.get_chunk(&ChunkHash([1; 32])).unwrap().refcount, 0);
        assert_eq!(store.parents_of(&child).unwrap().len(), 1);
        assert!(matches!(
            store.delete_asset(&parent),
            Err(MetaError::NotFound { .. })
        ));
    }

    #[test]
    fn schema_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta.redb");
        {
            let store = MetaStore::open(&path).unwrap();
            store.ensure_namespace(&ns("prod"), 1).unwrap();
        }
        let store = MetaStore::open(&path).unwrap();
        assert_eq!(store.list_namespaces().unwrap(), vec![ns("prod")]);
    }
}
