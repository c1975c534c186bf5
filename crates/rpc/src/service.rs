//! gRPC service implementations over the engine.
//!
//! Engine calls run under `spawn_blocking`: the storage plane does
//! synchronous disk I/O, and the request dispatcher's worker threads
//! must stay free for stream frames.

use std::collections::BTreeMap;
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tonic::{Request, Response, Status, Streaming};
use tracing::debug;

use aifs_auth::Method;
use aifs_engine::{
    AifsEngine, Asset, EngineError, EngineEvent, ParentLink, PutAssetRequest, VerifyMode,
};
use aifs_storage::AssetFilter;
use aifs_types::asset::AssetKind;
use aifs_types::error::{CodecError, MetaError};
use aifs_types::id::{AssetId, Namespace, SnapshotId};
use aifs_types::snapshot::{BranchHistoryRecord, BranchRecord, SnapshotRecord, TagRecord};
use aifs_types::tx::{TxId, TxRecord};

use crate::guard::{authorize, is_admin};
use crate::pb;
use crate::status::to_status;

/// Frame size for server-streamed payload bytes.
const DATA_FRAME_SIZE: usize = 1024 * 1024;

/// Default and maximum page sizes for listings.
const DEFAULT_LIMIT: usize = 100;
const MAX_LIMIT: usize = 1000;

type ServerStream<T> = Pin<Box<dyn Stream<Item = Result<T, Status>> + Send + 'static>>;

fn invalid(msg: impl Into<String>) -> Status {
    to_status(&EngineError::Meta(MetaError::InvalidId(msg.into())))
}

fn parse_namespace(raw: &str) -> Result<Namespace, Status> {
    Namespace::new(raw).map_err(|e| to_status(&EngineError::Meta(e)))
}

fn parse_asset_id(raw: &str) -> Result<AssetId, Status> {
    AssetId::from_hex(raw).map_err(|e| to_status(&EngineError::Meta(e)))
}

fn parse_snapshot_id(raw: &str) -> Result<SnapshotId, Status> {
    SnapshotId::from_hex(raw).map_err(|e| to_status(&EngineError::Meta(e)))
}

fn parse_tx_id(raw: &str) -> Result<TxId, Status> {
    TxId::from_hex(raw).map_err(|e| to_status(&EngineError::Meta(e)))
}

fn parse_kind(raw: &str) -> Result<AssetKind, Status> {
    AssetKind::parse(raw)
        .ok_or_else(|| to_status(&EngineError::Codec(CodecError::UnknownKind(raw.to_string()))))
}

async fn run_blocking<T, F>(task: F) -> Result<T, Status>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, EngineError> + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| Status::internal(format!("worker task failed: {e}")))?
        .map_err(|e| to_status(&e))
}

fn asset_meta(record: &aifs_types::asset::AssetRecord) -> pb::AssetMeta {
    pb::AssetMeta {
        asset_id: record.asset_id.to_hex(),
        kind: record.kind.as_str().to_string(),
        namespace: record.namespace.to_string(),
        size: record.size,
        created_at: record.created_at,
        metadata: record
            .metadata
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
        chunk_hashes: record.chunks.iter().map(|h| h.to_hex()).collect(),
        tx_id: record.tx_id.to_hex(),
        has_embedding: record.embedding.is_some(),
    }
}

fn snapshot_pb(record: &SnapshotRecord) -> pb::Snapshot {
    pb::Snapshot {
        snapshot_id: record.snapshot_id.to_hex(),
        namespace: record.namespace.to_string(),
        merkle_root: hex::encode(record.merkle_root),
        timestamp: record.timestamp.clone(),
        asset_ids: record.asset_ids.iter().map(|id| id.to_hex()).collect(),
        signature: hex::encode(&record.signature),
        signer_pubkey: hex::encode(record.signer_pubkey),
        metadata: record
            .metadata
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    }
}

fn branch_pb(record: &BranchRecord) -> pb::Branch {
    pb::Branch {
        namespace: record.namespace.to_string(),
        name: record.name.clone(),
        snapshot_id: record.snapshot_id.to_hex(),
        updated_at: record.updated_at,
    }
}

fn history_pb(record: &BranchHistoryRecord) -> pb::BranchHistoryEntry {
    pb::BranchHistoryEntry {
        old_snapshot_id: record
            .old_snapshot_id
            .map(|id| id.to_hex())
            .unwrap_or_default(),
        new_snapshot_id: record.new_snapshot_id.to_hex(),
        at: record.at,
        metadata: record
            .metadata
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    }
}

fn tag_pb(record: &TagRecord) -> pb::Tag {
    pb::Tag {
        namespace: record.namespace.to_string(),
        name: record.name.clone(),
        snapshot_id: record.snapshot_id.to_hex(),
        created_at: record.created_at,
    }
}

fn tx_pb(record: &TxRecord) -> pb::TransactionState {
    pb::TransactionState {
        tx_id: record.tx_id.to_hex(),
        state: record.state.as_str().to_string(),
        created_at: record.created_at,
        committed_at: record.committed_at.unwrap_or_default(),
        asset_ids: record.assets.iter().map(|id| id.to_hex()).collect(),
        dependencies: record.dependencies.iter().map(|id| id.to_hex()).collect(),
    }
}

fn event_pb(event: &EngineEvent) -> pb::Event {
    match event {
        EngineEvent::AssetsCommitted {
            tx_id,
            namespace,
            asset_ids,
        } => pb::Event {
            r#type: "assets_committed".to_string(),
            namespace: namespace.to_string(),
            tx_id: tx_id.to_hex(),
            asset_ids: asset_ids.iter().map(|id| id.to_hex()).collect(),
            ..Default::default()
        },
        EngineEvent::AssetDeleted {
            namespace,
            asset_id,
        } => pb::Event {
            r#type: "asset_deleted".to_string(),
            namespace: namespace.to_string(),
            asset_ids: vec![asset_id.to_hex()],
            ..Default::default()
        },
        EngineEvent::SnapshotCreated {
            namespace,
            snapshot_id,
            asset_count,
        } => pb::Event {
            r#type: "snapshot_created".to_string(),
            namespace: namespace.to_string(),
            snapshot_id: snapshot_id.to_hex(),
            asset_count: *asset_count,
            ..Default::default()
        },
        EngineEvent::BranchUpdated {
            namespace,
            name,
            old_snapshot_id,
            new_snapshot_id,
        } => pb::Event {
            r#type: "branch_updated".to_string(),
            namespace: namespace.to_string(),
            name: name.clone(),
            snapshot_id: new_snapshot_id.to_hex(),
            old_snapshot_id: old_snapshot_id
                .map(|id| id.to_hex())
                .unwrap_or_default(),
            ..Default::default()
        },
        EngineEvent::BranchDeleted { namespace, name } => pb::Event {
            r#type: "branch_deleted".to_string(),
            namespace: namespace.to_string(),
            name: name.clone(),
            ..Default::default()
        },
        EngineEvent::TagCreated {
            namespace,
            name,
            snapshot_id,
        } => pb::Event {
            r#type: "tag_created".to_string(),
            namespace: namespace.to_string(),
            name: name.clone(),
            snapshot_id: snapshot_id.to_hex(),
            ..Default::default()
        },
    }
}

/// Asset ingest, retrieval, search and events.
pub struct AssetSvc {
    engine: Arc<AifsEngine>,
}

impl AssetSvc {
    /// Wraps the engine.
    pub fn new(engine: Arc<AifsEngine>) -> Self {
        Self { engine }
    }
}

#[tonic::async_trait]
impl pb::asset_service_server::AssetService for AssetSvc {
    async fn put_asset(
        &self,
        request: Request<Streaming<pb::PutAssetChunk>>,
    ) -> Result<Response<pb::PutAssetResponse>, Status> {
        let _timer =
            aifs_telemetry::time::RequestTimer::new(aifs_telemetry::rpc_metrics(), "PutAsset");
        let metadata = request.metadata().clone();
        let mut stream = request.into_inner();

        let first = stream
            .message()
            .await?
            .ok_or_else(|| invalid("empty ingest stream"))?;
        let header = match first.frame {
            Some(pb::put_asset_chunk::Frame::Header(header)) => header,
            _ => return Err(invalid("first ingest frame must be the header")),
        };

        let namespace = parse_namespace(&header.namespace)?;
        authorize(&self.engine, &metadata, Method::Put, Some(&namespace))?;
        let kind = parse_kind(&header.kind)?;
        let tx_id = if header.tx_id.is_empty() {
            None
        } else {
            Some(parse_tx_id(&header.tx_id)?)
        };
        let parents = header
            .parents
            .iter()
            .map(|p| {
                Ok(ParentLink {
                    asset_id: parse_asset_id(&p.asset_id)?,
                    transform_name: p.transform_name.clone(),
                    transform_digest: p.transform_digest.clone(),
                })
            })
            .collect::<Result<Vec<_>, Status>>()?;

        // Ordered data frames; a client cancellation surfaces here as a
        // stream error and nothing is persisted.
        let mut bytes = Vec::new();
        let mut frames = 0u64;
        while let Some(chunk) = stream.message().await? {
            match chunk.frame {
                Some(pb::put_asset_chunk::Frame::Data(data)) => {
                    frames += 1;
                    bytes.extend_from_slice(&data);
                }
                Some(pb::put_asset_chunk::Frame::Header(_)) => {
                    return Err(invalid("duplicate ingest header"));
                }
                None => {}
            }
        }
        aifs_telemetry::rpc_metrics().inc_ingest_frames(frames);
        debug!(frames, size = bytes.len(), "ingest stream complete");

        let put = PutAssetRequest {
            bytes,
            kind,
            namespace,
            metadata: header.metadata.into_iter().collect::<BTreeMap<_, _>>(),
            embedding: if header.embedding.is_empty() {
                None
            } else {
                Some(header.embedding)
            },
            parents,
            tx_id,
        };
        let engine = self.engine.clone();
        let asset_id = run_blocking(move || engine.put_asset(put)).await?;
        aifs_telemetry::rpc_metrics().inc_requests_total("PutAsset", "ok");

        Ok(Response::new(pb::PutAssetResponse {
            asset_id: asset_id.to_hex(),
        }))
    }

    type GetAssetStream = ServerStream<pb::GetAssetResponse>;

    async fn get_asset(
        &self,
        request: Request<pb::GetAssetRequest>,
    ) -> Result<Response<Self::GetAssetStream>, Status> {
        let _timer =
            aifs_telemetry::time::RequestTimer::new(aifs_telemetry::rpc_metrics(), "GetAsset");
        let metadata = request.metadata().clone();
        let req = request.into_inner();
        // Token validity first; the namespace caveat is re-checked once
        // the asset's namespace is known.
        authorize(&self.engine, &metadata, Method::Get, None)?;

        let id = parse_asset_id(&req.asset_id)?;
        let include_data = req.include_data;
        let engine = self.engine.clone();
        let asset: Asset = run_blocking(move || engine.get_asset(&id, include_data)).await?;
        authorize(
            &self.engine,
            &metadata,
            Method::Get,
            Some(&asset.record.namespace),
        )?;

        let mut frames = vec![Ok(pb::GetAssetResponse {
            payload: Some(pb::get_asset_response::Payload::Meta(asset_meta(
                &asset.record,
            ))),
        })];
        if let Some(bytes) = asset.bytes {
            for piece in bytes.chunks(DATA_FRAME_SIZE) {
                frames.push(Ok(pb::GetAssetResponse {
                    payload: Some(pb::get_asset_response::Payload::Data(piece.to_vec())),
                }));
            }
        }
        Ok(Response::new(Box::pin(tokio_stream::iter(frames))))
    }

    async fn delete_asset(
        &self,
        request: Request<pb::DeleteAssetRequest>,
    ) -> Result<Response<pb::DeleteAssetResponse>, Status> {
        let metadata = request.metadata().clone();
        let req = request.into_inner();
        authorize(&self.engine, &metadata, Method::Put, None)?;

        let id = parse_asset_id(&req.asset_id)?;
        let lookup = self.engine.clone();
        let record = run_blocking(move || Ok(lookup.get_asset(&id, false)?.record)).await?;
        authorize(&self.engine, &metadata, Method::Put, Some(&record.namespace))?;

        let engine = self.engine.clone();
        run_blocking(move || engine.delete_asset(&id)).await?;
        Ok(Response::new(pb::DeleteAssetResponse {}))
    }

    async fn list_assets(
        &self,
        request: Request<pb::ListAssetsRequest>,
    ) -> Result<Response<pb::ListAssetsResponse>, Status> {
        let metadata = request.metadata().clone();
        let req = request.into_inner();
        let namespace = parse_namespace(&req.namespace)?;
        authorize(&self.engine, &metadata, Method::Get, Some(&namespace))?;

        let kind = if req.kind.is_empty() {
            None
        } else {
            Some(parse_kind(&req.kind)?)
        };
        let filter = AssetFilter {
            namespace,
            kind,
            metadata: req.metadata_filter.into_iter().collect(),
        };
        let limit = if req.limit == 0 {
            DEFAULT_LIMIT
        } else {
            (req.limit as usize).min(MAX_LIMIT)
        };
        let cursor = if req.cursor.is_empty() {
            None
        } else {
            Some(req.cursor)
        };

        let engine = self.engine.clone();
        let page =
            run_blocking(move || engine.list_assets(&filter, limit, cursor.as_deref())).await?;

        Ok(Response::new(pb::ListAssetsResponse {
            assets: page.assets.iter().map(asset_meta).collect(),
            next_cursor: page.next_cursor.unwrap_or_default(),
        }))
    }

    async fn vector_search(
        &self,
        request: Request<pb::VectorSearchRequest>,
    ) -> Result<Response<pb::VectorSearchResponse>, Status> {
        let metadata = request.metadata().clone();
        let req = request.into_inner();
        let namespace = parse_namespace(&req.namespace)?;
        authorize(&self.engine, &metadata, Method::Search, Some(&namespace))?;

        let filter: Vec<(String, String)> = req.filter.into_iter().collect();
        let k = req.k as usize;
        let engine = self.engine.clone();
        let hits = run_blocking(move || {
            aifs_telemetry::engine_metrics().inc_vector_searches(namespace.as_str());
            engine.vector_search(&namespace, &req.query, k, &filter)
        })
        .await?;

        Ok(Response::new(pb::VectorSearchResponse {
            results: hits
                .into_iter()
                .map(|hit| pb::SearchResult {
                    asset_id: hit.asset_id.to_hex(),
                    score: hit.score,
                })
                .collect(),
        }))
    }

    type SubscribeEventsStream = ServerStream<pb::Event>;

    async fn subscribe_events(
        &self,
        request: Request<pb::SubscribeEventsRequest>,
    ) -> Result<Response<Self::SubscribeEventsStream>, Status> {
        let metadata = request.metadata().clone();
        let req = request.into_inner();
        let namespace = if req.namespace.is_empty() {
            None
        } else {
            Some(parse_namespace(&req.namespace)?)
        };
        authorize(&self.engine, &metadata, Method::Get, namespace.as_ref())?;

        let events = BroadcastStream::new(self.engine.subscribe_events());
        let stream = events.filter_map(move |item| match item {
            Ok(event) => {
                let wanted = namespace
                    .as_ref()
                    .map(|ns| event.namespace() == ns)
                    .unwrap_or(true);
                wanted.then(|| Ok::<pb::Event, Status>(event_pb(&event)))
            }
            // A lagged subscriber skips missed events rather than dying.
            Err(_) => None,
        });
        Ok(Response::new(Box::pin(stream)))
    }
}

/// Snapshots, branches, tags, namespaces and the key registry.
pub struct SnapshotSvc {
    engine: Arc<AifsEngine>,
}

impl SnapshotSvc {
    /// Wraps the engine.
    pub fn new(engine: Arc<AifsEngine>) -> Self {
        Self { engine }
    }
}

#[tonic::async_trait]
impl pb::snapshot_service_server::SnapshotService for SnapshotSvc {
    async fn create_snapshot(
        &self,
        request: Request<pb::CreateSnapshotRequest>,
    ) -> Result<Response<pb::Snapshot>, Status> {
        let metadata = request.metadata().clone();
        let req = request.into_inner();
        let namespace = parse_namespace(&req.namespace)?;
        authorize(&self.engine, &metadata, Method::Snapshot, Some(&namespace))?;

        let asset_ids = if req.asset_ids.is_empty() {
            None
        } else {
            Some(
                req.asset_ids
                    .iter()
                    .map(|raw| parse_asset_id(raw))
                    .collect::<Result<Vec<_>, _>>()?,
            )
        };
        let snapshot_metadata: BTreeMap<String, String> = req.metadata.into_iter().collect();

        let engine = self.engine.clone();
        let record = run_blocking(move || {
            let record = engine.create_snapshot(&namespace, asset_ids, snapshot_metadata)?;
            aifs_telemetry::engine_metrics().inc_snapshots_created();
            Ok(record)
        })
        .await?;
        Ok(Response::new(snapshot_pb(&record)))
    }

    async fn get_snapshot(
        &self,
        request: Request<pb::GetSnapshotRequest>,
    ) -> Result<Response<pb::Snapshot>, Status> {
        let metadata = request.metadata().clone();
        let req = request.into_inner();
        authorize(&self.engine, &metadata, Method::Get, None)?;

        let id = parse_snapshot_id(&req.snapshot_id)?;
        let engine = self.engine.clone();
        let record = run_blocking(move || engine.get_snapshot(&id)).await?;
        authorize(&self.engine, &metadata, Method::Get, Some(&record.namespace))?;
        Ok(Response::new(snapshot_pb(&record)))
    }

    async fn verify_snapshot(
        &self,
        request: Request<pb::VerifySnapshotRequest>,
    ) -> Result<Response<pb::VerifySnapshotResponse>, Status> {
        let metadata = request.metadata().clone();
        let req = request.into_inner();
        authorize(&self.engine, &metadata, Method::Snapshot, None)?;

        let id = parse_snapshot_id(&req.snapshot_id)?;
        let mode = match req.key {
            Some(pb::verify_snapshot_request::Key::Pubkey(raw)) => {
                let bytes = hex::decode(&raw)
                    .ok()
                    .and_then(|v| <[u8; 32]>::try_from(v).ok())
                    .ok_or_else(|| invalid("pubkey must be 64 hex chars"))?;
                VerifyMode::Pubkey(bytes)
            }
            Some(pb::verify_snapshot_request::Key::NamespaceKey(_)) | None => {
                VerifyMode::NamespaceKey
            }
            Some(pb::verify_snapshot_request::Key::TrustedKeyId(key_id)) => {
                VerifyMode::TrustedKey(key_id)
            }
        };

        let engine = self.engine.clone();
        let valid = run_blocking(move || engine.verify_snapshot(&id, &mode)).await?;
        Ok(Response::new(pb::VerifySnapshotResponse { valid }))
    }

    async fn create_branch(
        &self,
        request: Request<pb::CreateBranchRequest>,
    ) -> Result<Response<pb::Branch>, Status> {
        let metadata = request.metadata().clone();
        let req = request.into_inner();
        let namespace = parse_namespace(&req.namespace)?;
        authorize(&self.engine, &metadata, Method::Branch, Some(&namespace))?;

        let snapshot_id = parse_snapshot_id(&req.snapshot_id)?;
        let branch_metadata: BTreeMap<String, String> = req.metadata.into_iter().collect();
        let engine = self.engine.clone();
        let record = run_blocking(move || {
            engine.create_branch(&namespace, &req.name, &snapshot_id, branch_metadata)
        })
        .await?;
        Ok(Response::new(branch_pb(&record)))
    }

    async fn get_branch(
        &self,
        request: Request<pb::GetBranchRequest>,
    ) -> Result<Response<pb::Branch>, Status> {
        let metadata = request.metadata().clone();
        let req = request.into_inner();
        let namespace = parse_namespace(&req.namespace)?;
        authorize(&self.engine, &metadata, Method::Get, Some(&namespace))?;

        let engine = self.engine.clone();
        let record = run_blocking(move || engine.get_branch(&namespace, &req.name)).await?;
        Ok(Response::new(branch_pb(&record)))
    }

    async fn list_branches(
        &self,
        request: Request<pb::ListBranchesRequest>,
    ) -> Result<Response<pb::ListBranchesResponse>, Status> {
        let metadata = request.metadata().clone();
        let req = request.into_inner();
        let namespace = parse_namespace(&req.namespace)?;
        authorize(&self.engine, &metadata, Method::Get, Some(&namespace))?;

        let engine = self.engine.clone();
        let records = run_blocking(move || engine.list_branches(&namespace)).await?;
        Ok(Response::new(pb::ListBranchesResponse {
            branches: records.iter().map(branch_pb).collect(),
        }))
    }

    async fn delete_branch(
        &self,
        request: Request<pb::DeleteBranchRequest>,
    ) -> Result<Response<pb::DeleteBranchResponse>, Status> {
        let metadata = request.metadata().clone();
        let req = request.into_inner();
        let namespace = parse_namespace(&req.namespace)?;
        authorize(&self.engine, &metadata, Method::Branch, Some(&namespace))?;

        let engine = self.engine.clone();
        run_blocking(move || engine.delete_branch(&namespace, &req.name)).await?;
        Ok(Response::new(pb::DeleteBranchResponse {}))
    }

    async fn get_branch_history(
        &self,
        request: Request<pb::GetBranchHistoryRequest>,
    ) -> Result<Response<pb::GetBranchHistoryResponse>, Status> {
        let metadata = request.metadata().clone();
        let req = request.into_inner();
        let namespace = parse_namespace(&req.namespace)?;
        authorize(&self.engine, &metadata, Method::Get, Some(&namespace))?;

        let engine = self.engine.clone();
        let entries =
            run_blocking(move || engine.get_branch_history(&namespace, &req.name)).await?;
        Ok(Response::new(pb::GetBranchHistoryResponse {
            entries: entries.iter().map(history_pb).collect(),
        }))
    }

    async fn create_tag(
        &self,
        request: Request<pb::CreateTagRequest>,
    ) -> Result<Response<pb::Tag>, Status> {
        let metadata = request.metadata().clone();
        let req = request.into_inner();
        let namespace = parse_namespace(&req.namespace)?;
        authorize(&self.engine, &metadata, Method::Tag, Some(&namespace))?;

        let snapshot_id = parse_snapshot_id(&req.snapshot_id)?;
        let engine = self.engine.clone();
        let record =
            run_blocking(move || engine.create_tag(&namespace, &req.name, &snapshot_id)).await?;
        Ok(Response::new(tag_pb(&record)))
    }

    async fn get_tag(
        &self,
        request: Request<pb::GetTagRequest>,
    ) -> Result<Response<pb::Tag>, Status> {
        let metadata = request.metadata().clone();
        let req = request.into_inner();
        let namespace = parse_namespace(&req.namespace)?;
        authorize(&self.engine, &metadata, Method::Get, Some(&namespace))?;

        let engine = self.engine.clone();
        let record = run_blocking(move || engine.get_tag(&namespace, &req.name)).await?;
        Ok(Response::new(tag_pb(&record)))
    }

    async fn list_tags(
        &self,
        request: Request<pb::ListTagsRequest>,
    ) -> Result<Response<pb::ListTagsResponse>, Status> {
        let metadata = request.metadata().clone();
        let req = request.into_inner();
        let namespace = parse_namespace(&req.namespace)?;
        authorize(&self.engine, &metadata, Method::Get, Some(&namespace))?;

        let engine = self.engine.clone();
        let records = run_blocking(move || engine.list_tags(&namespace)).await?;
        Ok(Response::new(pb::ListTagsResponse {
            tags: records.iter().map(tag_pb).collect(),
        }))
    }

    async fn list_namespaces(
        &self,
        request: Request<pb::ListNamespacesRequest>,
    ) -> Result<Response<pb::ListNamespacesResponse>, Status> {
        let metadata = request.metadata().clone();
        authorize(&self.engine, &metadata, Method::Get, None)?;

        let engine = self.engine.clone();
        let namespaces = run_blocking(move || engine.list_namespaces()).await?;
        Ok(Response::new(pb::ListNamespacesResponse {
            namespaces: namespaces.iter().map(|ns| ns.to_string()).collect(),
        }))
    }
}

/// Explicit transaction management for multi-asset commit groups.
pub struct TransactionSvc {
    engine: Arc<AifsEngine>,
}

impl TransactionSvc {
    /// Wraps the engine.
    pub fn new(engine: Arc<AifsEngine>) -> Self {
        Self { engine }
    }
}

#[tonic::async_trait]
impl pb::transaction_service_server::TransactionService for TransactionSvc {
    async fn begin(
        &self,
        request: Request<pb::BeginTransactionRequest>,
    ) -> Result<Response<pb::TransactionRef>, Status> {
        authorize(&self.engine, request.metadata(), Method::Put, None)?;
        let engine = self.engine.clone();
        let tx_id = run_blocking(move || engine.begin_transaction()).await?;
        Ok(Response::new(pb::TransactionRef {
            tx_id: tx_id.to_hex(),
        }))
    }

    async fn commit(
        &self,
        request: Request<pb::TransactionRef>,
    ) -> Result<Response<pb::TransactionState>, Status> {
        authorize(&self.engine, request.metadata(), Method::Put, None)?;
        let tx_id = parse_tx_id(&request.into_inner().tx_id)?;
        let engine = self.engine.clone();
        let record = run_blocking(move || {
            let record = engine.commit_transaction(&tx_id)?;
            aifs_telemetry::engine_metrics().inc_assets_committed(record.assets.len() as u64);
            Ok(record)
        })
        .await?;
        Ok(Response::new(tx_pb(&record)))
    }

    async fn rollback(
        &self,
        request: Request<pb::TransactionRef>,
    ) -> Result<Response<pb::TransactionState>, Status> {
        authorize(&self.engine, request.metadata(), Method::Put, None)?;
        let tx_id = parse_tx_id(&request.into_inner().tx_id)?;
        let engine = self.engine.clone();
        let record = run_blocking(move || {
            let record = engine.rollback_transaction(&tx_id)?;
            aifs_telemetry::engine_metrics().inc_tx_rolled_back();
            Ok(record)
        })
        .await?;
        Ok(Response::new(tx_pb(&record)))
    }

    async fn get_transaction(
        &self,
        request: Request<pb::TransactionRef>,
    ) -> Result<Response<pb::TransactionState>, Status> {
        authorize(&self.engine, request.metadata(), Method::Get, None)?;
        let tx_id = parse_tx_id(&request.into_inner().tx_id)?;
        let engine = self.engine.clone();
        let record = run_blocking(move || engine.get_transaction(&tx_id)).await?;
        Ok(Response::new(tx_pb(&record)))
    }
}

/// Liveness; unauthenticated by design so orchestrators can probe.
pub struct HealthSvc;

#[tonic::async_trait]
impl pb::health_server::Health for HealthSvc {
    async fn check(
        &self,
        _request: Request<pb::HealthCheckRequest>,
    ) -> Result<Response<pb::HealthCheckResponse>, Status> {
        Ok(Response::new(pb::HealthCheckResponse {
            status: pb::health_check_response::ServingStatus::Serving as i32,
        }))
    }
}

/// Introspection; registered only in development mode and admin-gated.
pub struct IntrospectSvc {
    engine: Arc<AifsEngine>,
}

impl IntrospectSvc {
    /// Wraps the engine.
    pub fn new(engine: Arc<AifsEngine>) -> Self {
        Self { engine }
    }
}

#[tonic::async_trait]
impl pb::introspect_server::Introspect for IntrospectSvc {
    async fn info(
        &self,
        request: Request<pb::InfoRequest>,
    ) -> Result<Response<pb::InfoResponse>, Status> {
        let token = authorize(&self.engine, request.metadata(), Method::Admin, None)?;
        if !is_admin(&self.engine, &token) {
            return Err(to_status(&EngineError::Auth(
                aifs_types::error::AuthError::MethodNotAllowed("admin".to_string()),
            )));
        }

        let engine = self.engine.clone();
        let info = run_blocking(move || engine.info()).await?;
        Ok(Response::new(pb::InfoResponse {
            version: info.version,
            mode: match info.mode {
                aifs_types::config::RunMode::Production => "production".to_string(),
                aifs_types::config::RunMode::Development => "development".to_string(),
            },
            namespaces: info.namespaces.iter().map(|ns| ns.to_string()).collect(),
            chunk_count: info.chunk_count,
            stored_bytes: info.stored_bytes,
        }))
    }
}
