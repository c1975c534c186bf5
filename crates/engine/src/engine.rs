use dashmap::DashMap;
use parking_lot::RwLock;
use rand::rngs::OsRng;
use rand::RngCore;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use aifs_auth::{TokenMinter, TokenVerifier};
use aifs_chunks::{ChunkStore, PutOutcome};
use aifs_codecs as codecs;
use aifs_crypto::{sign, KmsProvider, LocalKms, SnapshotSigner};
use aifs_state::tree::hnsw::HnswIndex;
use aifs_state::tree::merkle::{InclusionProof, MerkleTree};
use aifs_storage::{AssetFilter, AssetPage, MetaStore};
use aifs_tx::TxManager;
use aifs_types::asset::{embedding_to_bytes, AssetKind, AssetRecord, LineageEdgeRecord};
use aifs_types::config::{EngineConfig, RunMode};
use aifs_types::error::{EngineError, MetaError};
use aifs_types::event::EngineEvent;
use aifs_types::id::{AssetId, ChunkHash, Namespace, SnapshotId};
use aifs_types::snapshot::{
    BranchHistoryRecord, BranchRecord, DistanceKind, NamespaceKeyRecord, SnapshotRecord, TagRecord,
    TrustedKeyRecord,
};
use aifs_types::timestamp::{now_unix, to_rfc3339};
use aifs_types::tx::{TxId, TxRecord};

use crate::request::{Asset, EngineOptions, PutAssetRequest, SearchHit, VerifyMode};

/// Chunk boundary for structured kinds.
const CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// Reserved metadata key recording the metric an embed asset declared,
/// so indexes rebuild with the right metric after a restart.
const METRIC_META_KEY: &str = "aifs.distance_metric";

/// Event channel depth; slow subscribers observe lag, never block writers.
const EVENT_CAPACITY: usize = 256;

/// Summary returned by the introspection surface.
#[derive(Debug, Clone)]
pub struct EngineInfo {
    /// Crate version.
    pub version: String,
    /// Deployment mode.
    pub mode: RunMode,
    /// Known namespaces.
    pub namespaces: Vec<Namespace>,
    /// Chunk files on disk.
    pub chunk_count: u64,
    /// Stored bytes across chunk files.
    pub stored_bytes: u64,
}

/// The scoped engine instance owning every storage-plane component.
pub struct AifsEngine {
    config: EngineConfig,
    meta: Arc<MetaStore>,
    chunks: Arc<ChunkStore>,
    kms: Arc<dyn KmsProvider>,
    txs: TxManager,
    signer: SnapshotSigner,
    minter: TokenMinter,
    verifier: TokenVerifier,
    indexes: DashMap<Namespace, Arc<RwLock<HnswIndex>>>,
    events: broadcast::Sender<EngineEvent>,
}

impl AifsEngine {
    /// Opens the engine over `config.storage_dir`, creating the layout
    /// on first run and rebuilding the vector indexes from committed
    /// assets.
    pub fn open(config: EngineConfig, options: EngineOptions) -> Result<Self, EngineError> {
        std::fs::create_dir_all(&config.storage_dir)
            .map_err(|e| EngineError::Internal(format!("cannot create storage dir: {e}")))?;

        let kms: Arc<dyn KmsProvider> = options
            .kms
            .unwrap_or_else(|| Arc::new(LocalKms::new()));
        let chunks = Arc::new(ChunkStore::open(config.chunks_dir(), kms.clone())?);
        let meta = Arc::new(MetaStore::open(config.metadata_path())?);
        let txs = TxManager::new(meta.clone());

        let signer = match options.signing_seed {
            Some(seed) => SnapshotSigner::from_seed(&seed)?,
            None => SnapshotSigner::generate(),
        };

        let auth_secret = options.auth_secret.unwrap_or_else(|| {
            let mut secret = [0u8; 32];
            OsRng.fill_bytes(&mut secret);
            secret
        });
        let minter = TokenMinter::new(auth_secret, format!("{}:{}", config.host, config.port));
        let verifier = TokenVerifier::new(auth_secret);

        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let engine = Self {
            config,
            meta,
            chunks,
            kms,
            txs,
            signer,
            minter,
            verifier,
            indexes: DashMap::new(),
            events,
        };
        engine.rebuild_indexes()?;
        info!(
            pubkey = hex::encode(engine.signer.public_key()),
            "engine opened"
        );
        Ok(engine)
    }

    /// The engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The engine's snapshot verification key.
    pub fn engine_pubkey(&self) -> [u8; 32] {
        self.signer.public_key()
    }

    /// The capability-token minter.
    pub fn minter(&self) -> &TokenMinter {
        &self.minter
    }

    /// The capability-token verifier shared with the RPC guard.
    pub fn verifier(&self) -> &TokenVerifier {
        &self.verifier
    }

    /// Subscribes to engine events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: EngineEvent) {
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }

    // ---- transactions ----

    /// Opens a caller-owned transaction.
    pub fn begin_transaction(&self) -> Result<TxId, EngineError> {
        Ok(self.txs.begin()?)
    }

    /// Commits a caller-owned transaction and publishes visibility events.
    pub fn commit_transaction(&self, tx_id: &TxId) -> Result<TxRecord, EngineError> {
        let record = self.txs.commit(tx_id)?;
        self.publish_commit_events(&record)?;
        Ok(record)
    }

    /// Rolls back a transaction and drops its provisional index entries.
    pub fn rollback_transaction(&self, tx_id: &TxId) -> Result<TxRecord, EngineError> {
        let record = self.txs.rollback(tx_id)?;
        for asset_id in &record.assets {
            // Dedup may have handed the asset to another transaction; only
            // drop the vector when the asset is truly gone.
            if self.meta.try_get_asset(asset_id)?.is_none() {
                self.index_remove(asset_id);
            }
        }
        Ok(record)
    }

    /// The current state of a transaction.
    pub fn get_transaction(&self, tx_id: &TxId) -> Result<TxRecord, EngineError> {
        Ok(self.txs.get(tx_id)?)
    }

    fn publish_commit_events(&self, record: &TxRecord) -> Result<(), EngineError> {
        let mut by_namespace: BTreeMap<Namespace, Vec<AssetId>> = BTreeMap::new();
        for asset_id in &record.assets {
            if let Some(asset) = self.meta.try_get_asset(asset_id)? {
                by_namespace
                    .entry(asset.namespace)
                    .or_default()
                    .push(*asset_id);
            }
        }
        for (namespace, asset_ids) in by_namespace {
            self.publish(EngineEvent::AssetsCommitted {
                tx_id: record.tx_id,
                namespace,
                asset_ids,
            });
        }
        Ok(())
    }

    // ---- ingest ----

    /// Stores an asset. Validates the payload, chunks it, records the
    /// metadata inside the transaction, stages the embedding, and (on
    /// the auto-commit path) makes it visible before returning.
    pub fn put_asset(&self, request: PutAssetRequest) -> Result<AssetId, EngineError> {
        codecs::validate(request.kind, &request.bytes)?;

        let pieces: Vec<&[u8]> = match request.kind {
            // A blob is always a single chunk.
            AssetKind::Blob => vec![request.bytes.as_slice()],
            _ => {
                if request.bytes.is_empty() {
                    vec![request.bytes.as_slice()]
                } else {
                    request.bytes.chunks(CHUNK_SIZE).collect()
                }
            }
        };

        let hashes: Vec<ChunkHash> = pieces
            .iter()
            .map(|piece| ChunkHash(*blake3::hash(piece).as_bytes()))
            .collect();
        let asset_id = derive_asset_id(&hashes);

        let (auto, tx_id) = match request.tx_id {
            Some(tx_id) => (false, tx_id),
            None => (true, self.txs.begin()?),
        };

        match self.put_asset_in_tx(&request, asset_id, &pieces, &hashes, &tx_id) {
            Ok(()) => {
                if auto {
                    self.commit_transaction(&tx_id)?;
                }
                Ok(asset_id)
            }
            Err(e) => {
                if auto {
                    if let Err(rb) = self.rollback_transaction(&tx_id) {
                        warn!(tx = %tx_id, error = %rb, "rollback after failed put also failed");
                    }
                }
                Err(e)
            }
        }
    }

    fn put_asset_in_tx(
        &self,
        request: &PutAssetRequest,
        asset_id: AssetId,
        pieces: &[&[u8]],
        hashes: &[ChunkHash],
        tx_id: &TxId,
    ) -> Result<(), EngineError> {
        self.txs.add_asset(tx_id, asset_id)?;
        for parent in &request.parents {
            self.txs.add_dependency(tx_id, parent.asset_id)?;
        }

        // Lineage first: the cycle check must fail the put before any
        // metadata row exists for the asset.
        if !request.parents.is_empty() {
            let edges: Vec<LineageEdgeRecord> = request
                .parents
                .iter()
                .map(|parent| LineageEdgeRecord {
                    child: asset_id,
                    parent: parent.asset_id,
                    transform_name: parent.transform_name.clone(),
                    transform_digest: parent.transform_digest.clone(),
                })
                .collect();
            self.meta.add_lineage_edges(&edges)?;
        }

        for (piece, expected) in pieces.iter().zip(hashes) {
            let (hash, outcome) = self
                .chunks
                .put(piece, self.config.compression_level)?;
            debug_assert_eq!(&hash, expected);
            if let PutOutcome::Written(record) = outcome {
                self.meta.upsert_chunk(&record)?;
            }
        }

        let (embedding, metric) = self.resolve_embedding(request)?;

        let mut metadata = request.metadata.clone();
        if let Some(metric) = metric {
            metadata.insert(METRIC_META_KEY.to_string(), metric.as_str().to_string());
        }

        let record = AssetRecord {
            asset_id,
            kind: request.kind,
            namespace: request.namespace.clone(),
            size: request.bytes.len() as u64,
            created_at: now_unix(),
            metadata,
            embedding: embedding.as_deref().map(embedding_to_bytes),
            chunks: hashes.to_vec(),
            tx_id: *tx_id,
        };
        self.meta.insert_pending_asset(&record)?;

        if let Some(vector) = embedding {
            // Provisional entry: the visibility join keeps it out of
            // search results until the transaction commits.
            self.index_add(&request.namespace, asset_id, vector, metric)?;
        }
        Ok(())
    }

    fn resolve_embedding(
        &self,
        request: &PutAssetRequest,
    ) -> Result<(Option<Vec<f32>>, Option<DistanceKind>), EngineError> {
        if request.kind == AssetKind::Embed {
            let payload = codecs::embed::validate(&request.bytes)?;
            let metric = payload.metric()?;
            let vector = request
                .embedding
                .clone()
                .unwrap_or(payload.vector);
            Ok((Some(vector), Some(metric)))
        } else {
            Ok((request.embedding.clone(), None))
        }
    }

    // ---- retrieval ----

    /// Fetches a visible asset, optionally reassembling its payload and
    /// re-validating content addressing along the way.
    pub fn get_asset(&self, id: &AssetId, include_bytes: bool) -> Result<Asset, EngineError> {
        let record = self
            .meta
            .try_get_asset(id)?
            .ok_or(EngineError::NotVisible(*id))?;
        if !self.meta.is_visible(id)? {
            return Err(EngineError::NotVisible(*id));
        }

        let bytes = if include_bytes {
            let mut buffer = Vec::with_capacity(record.size as usize);
            for hash in &record.chunks {
                let chunk_record = self.meta.get_chunk(hash)?;
                buffer.extend_from_slice(&self.chunks.get(hash, &chunk_record)?);
            }
            if derive_asset_id(&record.chunks) != *id {
                return Err(EngineError::Internal(format!(
                    "asset {id} failed content-address re-check"
                )));
            }
            codecs::validate(record.kind, &buffer)?;
            Some(buffer)
        } else {
            None
        };

        Ok(Asset { record, bytes })
    }

    /// Lists visible assets in a namespace.
    pub fn list_assets(
        &self,
        filter: &AssetFilter,
        limit: usize,
        cursor: Option<&[u8]>,
    ) -> Result<AssetPage, EngineError> {
        Ok(self.meta.list_assets(filter, limit, cursor)?)
    }

    /// All known namespaces.
    pub fn list_namespaces(&self) -> Result<Vec<Namespace>, EngineError> {
        Ok(self.meta.list_namespaces()?)
    }

    /// Removes an asset and decrements its chunk references. Chunk files
    /// stay on disk until an admin prune.
    pub fn delete_asset(&self, id: &AssetId) -> Result<(), EngineError> {
        let record = self.meta.delete_asset(id)?;
        self.index_remove(id);
        self.publish(EngineEvent::AssetDeleted {
            namespace: record.namespace,
            asset_id: *id,
        });
        Ok(())
    }

    /// Admin: deletes chunk files whose refcount reached zero. Returns
    /// the number pruned.
    pub fn prune_chunks(&self) -> Result<u64, EngineError> {
        let mut pruned = 0;
        for hash in self.meta.zero_ref_chunks()? {
            match self.chunks.remove(&hash) {
                Ok(()) | Err(aifs_types::error::ChunkError::NotFound(_)) => {}
                Err(e) => return Err(e.into()),
            }
            self.meta.remove_chunk_record(&hash)?;
            pruned += 1;
        }
        aifs_telemetry::store_metrics().inc_chunks_pruned(pruned);
        info!(pruned, "chunk prune finished");
        Ok(pruned)
    }

    /// Admin: re-wraps a chunk's data key under the KMS provider's
    /// current master key without touching ciphertext.
    pub fn rewrap_chunk(&self, hash: &ChunkHash) -> Result<String, EngineError> {
        let record = self.meta.get_chunk(hash)?;
        let wrapped = self.kms.rewrap(&record.wrapped_dek, &record.kms_key_id)?;
        let key_id = wrapped.kms_key_id.clone();
        self.meta
            .update_chunk_wrap(hash, wrapped.wrapped_dek, wrapped.kms_key_id)?;
        Ok(key_id)
    }

    // ---- snapshots ----

    /// Creates and signs a snapshot over `asset_ids`, defaulting to all
    /// currently visible assets in the namespace.
    pub fn create_snapshot(
        &self,
        namespace: &Namespace,
        asset_ids: Option<Vec<AssetId>>,
        mut metadata: BTreeMap<String, String>,
    ) -> Result<SnapshotRecord, EngineError> {
        let ids = match asset_ids {
            Some(ids) => {
                for id in &ids {
                    if !self.meta.is_visible(id)? {
                        return Err(EngineError::NotVisible(*id));
                    }
                }
                ids
            }
            None => self.meta.visible_assets_in(namespace)?,
        };

        let tree = MerkleTree::build(ids);
        let merkle_root = tree.root();
        let timestamp = to_rfc3339(now_unix());

        let mut hasher = blake3::Hasher::new();
        hasher.update(&merkle_root);
        hasher.update(timestamp.as_bytes());
        let digest = hasher.finalize();
        let mut snapshot_id = [0u8; 16];
        snapshot_id.copy_from_slice(&digest.as_bytes()[..16]);
        let snapshot_id = SnapshotId(snapshot_id);

        let (signature, _) = self
            .signer
            .sign_snapshot(&merkle_root, &timestamp, namespace);

        if tree.leaf_count() == 0 {
            metadata.insert("empty".to_string(), "true".to_string());
        }

        let record = SnapshotRecord {
            snapshot_id,
            namespace: namespace.clone(),
            merkle_root,
            timestamp,
            asset_ids: tree.leaves().to_vec(),
            signature: signature.to_vec(),
            signer_pubkey: self.signer.public_key(),
            metadata,
        };
        self.meta.create_snapshot(&record)?;
        self.publish(EngineEvent::SnapshotCreated {
            namespace: namespace.clone(),
            snapshot_id,
            asset_count: record.asset_ids.len() as u64,
        });
        Ok(record)
    }

    /// Fetches a snapshot.
    pub fn get_snapshot(&self, id: &SnapshotId) -> Result<SnapshotRecord, EngineError> {
        Ok(self.meta.get_snapshot(id)?)
    }

    /// Verifies a snapshot signature under the requested key source.
    pub fn verify_snapshot(
        &self,
        id: &SnapshotId,
        mode: &VerifyMode,
    ) -> Result<bool, EngineError> {
        let record = self.meta.get_snapshot(id)?;
        let pubkey = match mode {
            VerifyMode::Pubkey(key) => *key,
            VerifyMode::NamespaceKey => self.meta.get_namespace_key(&record.namespace)?.pubkey,
            VerifyMode::TrustedKey(key_id) => {
                let trusted = self.meta.get_trusted_key(key_id)?;
                if let Some(pinned_ns) = &trusted.namespace {
                    if pinned_ns != &record.namespace {
                        return Ok(false);
                    }
                }
                trusted.pubkey
            }
        };
        Ok(sign::verify_snapshot(
            &record.signature,
            &record.merkle_root,
            &record.timestamp,
            &record.namespace,
            &pubkey,
        )?)
    }

    /// Builds the Merkle inclusion proof of an asset inside a snapshot.
    pub fn prove_inclusion(
        &self,
        snapshot_id: &SnapshotId,
        asset_id: &AssetId,
    ) -> Result<InclusionProof, EngineError> {
        let record = self.meta.get_snapshot(snapshot_id)?;
        let tree = MerkleTree::build(record.asset_ids);
        tree.prove(asset_id).ok_or(EngineError::Meta(MetaError::NotFound {
            entity: "asset in snapshot",
            key: asset_id.to_hex(),
        }))
    }

    /// Resolves the verification key for snapshot-consuming operations:
    /// the registered namespace key when one is pinned, otherwise the
    /// key the snapshot records as its signer.
    fn snapshot_verification_key(&self, record: &SnapshotRecord) -> [u8; 32] {
        match self.meta.get_namespace_key(&record.namespace) {
            Ok(pinned) => pinned.pubkey,
            Err(_) => record.signer_pubkey,
        }
    }

    fn checked_snapshot(
        &self,
        namespace: &Namespace,
        snapshot_id: &SnapshotId,
    ) -> Result<SnapshotRecord, EngineError> {
        let record = self.meta.get_snapshot(snapshot_id)?;
        if &record.namespace != namespace {
            return Err(EngineError::Meta(MetaError::NotFound {
                entity: "snapshot",
                key: format!("{namespace}/{snapshot_id}"),
            }));
        }
        let key = self.snapshot_verification_key(&record);
        let ok = sign::verify_snapshot(
            &record.signature,
            &record.merkle_root,
            &record.timestamp,
            &record.namespace,
            &key,
        )?;
        if !ok {
            return Err(EngineError::SnapshotVerification(*snapshot_id));
        }
        Ok(record)
    }

    // ---- branches ----

    /// Creates or moves a branch after verifying the target snapshot's
    /// signature. Pointer write and history append are atomic.
    pub fn create_branch(
        &self,
        namespace: &Namespace,
        name: &str,
        snapshot_id: &SnapshotId,
        metadata: BTreeMap<String, String>,
    ) -> Result<BranchRecord, EngineError> {
        self.checked_snapshot(namespace, snapshot_id)?;
        let old = self
            .meta
            .upsert_branch(namespace, name, *snapshot_id, now_unix(), metadata)?;
        self.publish(EngineEvent::BranchUpdated {
            namespace: namespace.clone(),
            name: name.to_string(),
            old_snapshot_id: old,
            new_snapshot_id: *snapshot_id,
        });
        Ok(self.meta.get_branch(namespace, name)?)
    }

    /// Fetches a branch pointer.
    pub fn get_branch(&self, namespace: &Namespace, name: &str) -> Result<BranchRecord, EngineError> {
        Ok(self.meta.get_branch(namespace, name)?)
    }

    /// Branch pointers of one namespace.
    pub fn list_branches(&self, namespace: &Namespace) -> Result<Vec<BranchRecord>, EngineError> {
        Ok(self.meta.list_branches(namespace)?)
    }

    /// Removes a branch pointer; history is preserved.
    pub fn delete_branch(&self, namespace: &Namespace, name: &str) -> Result<(), EngineError> {
        self.meta.delete_branch(namespace, name)?;
        self.publish(EngineEvent::BranchDeleted {
            namespace: namespace.clone(),
            name: name.to_string(),
        });
        Ok(())
    }

    /// The append-only update history of one branch.
    pub fn get_branch_history(
        &self,
        namespace: &Namespace,
        name: &str,
    ) -> Result<Vec<BranchHistoryRecord>, EngineError> {
        Ok(self.meta.branch_history(namespace, name)?)
    }

    // ---- tags ----

    /// Creates an immutable tag after verifying the target snapshot's
    /// signature. Re-creation fails.
    pub fn create_tag(
        &self,
        namespace: &Namespace,
        name: &str,
        snapshot_id: &SnapshotId,
    ) -> Result<TagRecord, EngineError> {
        self.checked_snapshot(namespace, snapshot_id)?;
        let record = TagRecord {
            namespace: namespace.clone(),
            name: name.to_string(),
            snapshot_id: *snapshot_id,
            created_at: now_unix(),
        };
        self.meta.create_tag(&record)?;
        self.publish(EngineEvent::TagCreated {
            namespace: namespace.clone(),
            name: name.to_string(),
            snapshot_id: *snapshot_id,
        });
        Ok(record)
    }

    /// Fetches a tag.
    pub fn get_tag(&self, namespace: &Namespace, name: &str) -> Result<TagRecord, EngineError> {
        Ok(self.meta.get_tag(namespace, name)?)
    }

    /// Tags of one namespace.
    pub fn list_tags(&self, namespace: &Namespace) -> Result<Vec<TagRecord>, EngineError> {
        Ok(self.meta.list_tags(namespace)?)
    }

    // ---- key registry ----

    /// Registers a namespace verification key. Overwriting an existing
    /// registration is admin-gated by the caller.
    pub fn register_namespace_key(
        &self,
        namespace: &Namespace,
        pubkey: [u8; 32],
        metadata: BTreeMap<String, String>,
        overwrite: bool,
    ) -> Result<(), EngineError> {
        let record = NamespaceKeyRecord {
            namespace: namespace.clone(),
            pubkey,
            created_at: now_unix(),
            metadata,
        };
        self.meta.register_namespace_key(&record, overwrite)?;
        self.meta.ensure_namespace(namespace, record.created_at)?;
        Ok(())
    }

    /// Pins a trusted verification key under a caller-chosen id.
    pub fn pin_trusted_key(
        &self,
        key_id: &str,
        pubkey: [u8; 32],
        namespace: Option<Namespace>,
        metadata: BTreeMap<String, String>,
        overwrite: bool,
    ) -> Result<(), EngineError> {
        let record = TrustedKeyRecord {
            key_id: key_id.to_string(),
            pubkey,
            namespace,
            metadata,
        };
        self.meta.pin_trusted_key(&record, overwrite)?;
        Ok(())
    }

    // ---- vector search ----

    /// Approximate k-nearest-neighbour search over a namespace. Results
    /// contain only visible assets; metadata filters apply before the
    /// final cut to `k`.
    pub fn vector_search(
        &self,
        namespace: &Namespace,
        query: &[f32],
        k: usize,
        filter: &[(String, String)],
    ) -> Result<Vec<SearchHit>, EngineError> {
        let Some(index) = self.indexes.get(namespace).map(|e| e.value().clone()) else {
            return Ok(Vec::new());
        };
        // Over-fetch so visibility and metadata filtering can still fill
        // k slots.
        let raw = index.read().search(query, k, k.saturating_mul(3))?;

        let mut hits = Vec::with_capacity(k);
        for (asset_id, score) in raw {
            if hits.len() >= k {
                break;
            }
            if !self.meta.is_visible(&asset_id)? {
                continue;
            }
            if !filter.is_empty() {
                let Some(record) = self.meta.try_get_asset(&asset_id)? else {
                    continue;
                };
                if !filter
                    .iter()
                    .all(|(key, value)| record.metadata.get(key) == Some(value))
                {
                    continue;
                }
            }
            hits.push(SearchHit { asset_id, score });
        }
        Ok(hits)
    }

    fn index_add(
        &self,
        namespace: &Namespace,
        asset_id: AssetId,
        vector: Vec<f32>,
        metric: Option<DistanceKind>,
    ) -> Result<(), EngineError> {
        let index = self
            .indexes
            .entry(namespace.clone())
            .or_insert_with(|| {
                Arc::new(RwLock::new(HnswIndex::new(
                    metric.unwrap_or(DistanceKind::Cosine),
                )))
            })
            .value()
            .clone();
        index.write().add(asset_id, vector)?;
        Ok(())
    }

    fn index_remove(&self, asset_id: &AssetId) {
        for entry in self.indexes.iter() {
            let index = entry.value().clone();
            let mut guard = index.write();
            if guard.contains(asset_id) {
                let _ = guard.delete(asset_id);
                break;
            }
        }
    }

    fn rebuild_indexes(&self) -> Result<(), EngineError> {
        for namespace in self.meta.list_namespaces()? {
            let filter = AssetFilter {
                namespace: namespace.clone(),
                kind: None,
                metadata: Vec::new(),
            };
            let mut cursor: Option<Vec<u8>> = None;
            loop {
                let page = self
                    .meta
                    .list_assets(&filter, 512, cursor.as_deref())?;
                for record in &page.assets {
                    let Some(vector) = record.embedding_vector() else {
                        continue;
                    };
                    let metric = record
                        .metadata
                        .get(METRIC_META_KEY)
                        .and_then(|name| DistanceKind::parse(name));
                    if let Err(e) =
                        self.index_add(&namespace, record.asset_id, vector, metric)
                    {
                        warn!(asset = %record.asset_id, error = %e, "skipping vector during index rebuild");
                    }
                }
                match page.next_cursor {
                    Some(next) => cursor = Some(next),
                    None => break,
                }
            }
            if let Some(index) = self.indexes.get(&namespace) {
                debug!(
                    namespace = %namespace,
                    vectors = index.value().read().len(),
                    "vector index rebuilt"
                );
            }
        }
        Ok(())
    }

    /// Introspection summary for the development surface.
    pub fn info(&self) -> Result<EngineInfo, EngineError> {
        let stats = self.chunks.stats()?;
        aifs_telemetry::store_metrics().set_chunk_count(stats.chunk_count);
        aifs_telemetry::store_metrics().set_stored_bytes(stats.stored_bytes);
        Ok(EngineInfo {
            version: env!("CARGO_PKG_VERSION").to_string(),
            mode: self.config.mode,
            namespaces: self.meta.list_namespaces()?,
            chunk_count: stats.chunk_count,
            stored_bytes: stats.stored_bytes,
        })
    }
}

/// Asset id derivation: the sole chunk hash for single-chunk assets,
/// the BLAKE3 of the concatenated hash list otherwise.
fn derive_asset_id(hashes: &[ChunkHash]) -> AssetId {
    match hashes {
        [single] => AssetId(single.0),
        many => {
            let mut hasher = blake3::Hasher::new();
            for hash in many {
                hasher.update(&hash.0);
            }
            AssetId(*hasher.finalize().as_bytes())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_chunk_asset_id_is_the_chunk_hash() {
        let hash = ChunkHash(*blake3::hash(b"hello world").as_bytes());
        assert_eq!(derive_asset_id(&[hash]).0, hash.0);
    }

    #[test]
    fn multi_chunk_asset_id_hashes_the_list() {
        let a = ChunkHash([1; 32]);
        let b = ChunkHash([2; 32]);
        let id = derive_asset_id(&[a, b]);
        let mut hasher = blake3::Hasher::new();
        hasher.update(&a.0);
        hasher.update(&b.0);
        assert_eq!(id.0, *hasher.finalize().as_bytes());
        // Order matters.
        assert_ne!(derive_asset_id(&[a, b]), derive_asset_id(&[b, a]));
    }
}
