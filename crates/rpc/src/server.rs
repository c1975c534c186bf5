use std::net::SocketAddr;
use std::sync::Arc;
use tonic::codec::CompressionEncoding;
use tonic::transport::Server;
use tracing::info;

use aifs_engine::AifsEngine;
use aifs_types::config::RunMode;

use crate::pb::asset_service_server::AssetServiceServer;
use crate::pb::health_server::HealthServer;
use crate::pb::introspect_server::IntrospectServer;
use crate::pb::snapshot_service_server::SnapshotServiceServer;
use crate::pb::transaction_service_server::TransactionServiceServer;
use crate::service::{AssetSvc, HealthSvc, IntrospectSvc, SnapshotSvc, TransactionSvc};

/// Serves the RPC surface on the configured host and port until the
/// process is stopped. Development mode additionally registers the
/// introspection service.
pub async fn serve(engine: Arc<AifsEngine>) -> Result<(), tonic::transport::Error> {
    let config = engine.config().clone();
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], config.port)));

    let assets = AssetServiceServer::new(AssetSvc::new(engine.clone()))
        .accept_compressed(CompressionEncoding::Zstd)
        .accept_compressed(CompressionEncoding::Gzip)
        .send_compressed(CompressionEncoding::Zstd);
    let snapshots = SnapshotServiceServer::new(SnapshotSvc::new(engine.clone()))
        .accept_compressed(CompressionEncoding::Zstd)
        .accept_compressed(CompressionEncoding::Gzip)
        .send_compressed(CompressionEncoding::Zstd);
    let transactions = TransactionServiceServer::new(TransactionSvc::new(engine.clone()))
        .accept_compressed(CompressionEncoding::Zstd)
        .accept_compressed(CompressionEncoding::Gzip);
    let health = HealthServer::new(HealthSvc);

    info!(%addr, mode = ?config.mode, "rpc surface listening");

    let mut builder = Server::builder()
        .add_service(assets)
        .add_service(snapshots)
        .add_service(transactions)
        .add_service(health);

    if config.mode == RunMode::Development {
        builder = builder.add_service(IntrospectServer::new(IntrospectSvc::new(engine)));
    }

    builder.serve(addr).await
}
