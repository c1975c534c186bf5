//! Abstract traits for metrics reporting, decoupling core logic from the
//! backend.

use once_cell::sync::OnceCell;

/// A no-op sink for tests or when telemetry is disabled.
#[derive(Debug, Clone, Copy)]
pub struct NopSink;

/// The globally installed sink; a no-op until `prometheus::install`.
pub static SINK: OnceCell<&'static dyn MetricsSink> = OnceCell::new();
static NOP_SINK: NopSink = NopSink;

/// The chunk/metadata-store metrics sink, or a no-op.
pub fn store_metrics() -> &'static dyn StoreMetricsSink {
    SINK.get().copied().unwrap_or(&NOP_SINK)
}

/// The engine metrics sink, or a no-op.
pub fn engine_metrics() -> &'static dyn EngineMetricsSink {
    SINK.get().copied().unwrap_or(&NOP_SINK)
}

/// The RPC metrics sink, or a no-op.
pub fn rpc_metrics() -> &'static dyn RpcMetricsSink {
    SINK.get().copied().unwrap_or(&NOP_SINK)
}

/// The error metrics sink, or a no-op.
pub fn error_metrics() -> &'static dyn ErrorMetricsSink {
    SINK.get().copied().unwrap_or(&NOP_SINK)
}

/// Metrics of the persistent storage layer.
pub trait StoreMetricsSink: Send + Sync + std::fmt::Debug {
    /// Bytes written into the chunk store (stored form).
    fn inc_chunk_bytes_written(&self, bytes: u64);
    /// Chunk writes answered by deduplication.
    fn inc_chunks_deduplicated(&self);
    /// Chunk files removed by an admin prune.
    fn inc_chunks_pruned(&self, count: u64);
    /// Gauge: chunk files currently on disk.
    fn set_chunk_count(&self, count: u64);
    /// Gauge: stored bytes across chunk files.
    fn set_stored_bytes(&self, bytes: u64);
}
impl StoreMetricsSink for NopSink {
    fn inc_chunk_bytes_written(&self, _bytes: u64) {}
    fn inc_chunks_deduplicated(&self) {}
    fn inc_chunks_pruned(&self, _count: u64) {}
    fn set_chunk_count(&self, _count: u64) {}
    fn set_stored_bytes(&self, _bytes: u64) {}
}

/// Metrics of the engine orchestration layer.
pub trait EngineMetricsSink: Send + Sync + std::fmt::Debug {
    /// Assets made visible by committed transactions.
    fn inc_assets_committed(&self, count: u64);
    /// Transactions rolled back.
    fn inc_tx_rolled_back(&self);
    /// Snapshots created and signed.
    fn inc_snapshots_created(&self);
    /// Vector searches executed, labeled by namespace.
    fn inc_vector_searches(&self, namespace: &str);
}
impl EngineMetricsSink for NopSink {
    fn inc_assets_committed(&self, _count: u64) {}
    fn inc_tx_rolled_back(&self) {}
    fn inc_snapshots_created(&self) {}
    fn inc_vector_searches(&self, _namespace: &str) {}
}

/// Metrics of the RPC surface.
pub trait RpcMetricsSink: Send + Sync + std::fmt::Debug {
    /// Requests by route and status code name.
    fn inc_requests_total(&self, route: &str, status: &str);
    /// Request latency by route.
    fn observe_request_duration(&self, route: &str, duration_secs: f64);
    /// Frames received on ingest streams.
    fn inc_ingest_frames(&self, count: u64);
}
impl RpcMetricsSink for NopSink {
    fn inc_requests_total(&self, _route: &str, _status: &str) {}
    fn observe_request_duration(&self, _route: &str, _duration_secs: f64) {}
    fn inc_ingest_frames(&self, _count: u64) {}
}

/// Error counting by stable error code.
pub trait ErrorMetricsSink: Send + Sync + std::fmt::Debug {
    /// Counts one error occurrence under its stable code.
    fn inc_error(&self, code: &str);
}
impl ErrorMetricsSink for NopSink {
    fn inc_error(&self, _code: &str) {}
}

/// The full sink bundle a backend must implement.
pub trait MetricsSink:
    StoreMetricsSink + EngineMetricsSink + RpcMetricsSink + ErrorMetricsSink
{
}
impl MetricsSink for NopSink {}
