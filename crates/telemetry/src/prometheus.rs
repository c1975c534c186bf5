//! The Prometheus implementation of the metrics sinks.

use once_cell::sync::OnceCell;
use prometheus::{
    exponential_buckets, register_gauge, register_histogram_vec, register_int_counter,
    register_int_counter_vec, Gauge, HistogramVec, IntCounter, IntCounterVec,
};

use crate::sinks::{
    EngineMetricsSink, ErrorMetricsSink, MetricsSink, RpcMetricsSink, StoreMetricsSink, SINK,
};

static CHUNK_BYTES_WRITTEN_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static CHUNKS_DEDUPLICATED_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static CHUNKS_PRUNED_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static CHUNK_COUNT: OnceCell<Gauge> = OnceCell::new();
static STORED_BYTES: OnceCell<Gauge> = OnceCell::new();
static ASSETS_COMMITTED_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static TX_ROLLED_BACK_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static SNAPSHOTS_CREATED_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static VECTOR_SEARCHES_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static RPC_REQUESTS_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static RPC_REQUEST_DURATION_SECONDS: OnceCell<HistogramVec> = OnceCell::new();
static INGEST_FRAMES_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static ERRORS_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();

#[derive(Debug, Clone, Copy)]
pub struct PrometheusSink;

/// Fetches a collector; panicking here flags a startup-order bug, not a
/// runtime condition.
macro_rules! get_metric {
    ($metric:ident) => {
        $metric
            .get()
            .expect("Prometheus sink not initialized. Call telemetry::prometheus::install() first.")
    };
}

#[allow(clippy::expect_used)]
impl StoreMetricsSink for PrometheusSink {
    fn inc_chunk_bytes_written(&self, bytes: u64) {
        get_metric!(CHUNK_BYTES_WRITTEN_TOTAL).inc_by(bytes);
    }
    fn inc_chunks_deduplicated(&self) {
        get_metric!(CHUNKS_DEDUPLICATED_TOTAL).inc();
    }
    fn inc_chunks_pruned(&self, count: u64) {
        get_metric!(CHUNKS_PRUNED_TOTAL).inc_by(count);
    }
    fn set_chunk_count(&self, count: u64) {
        get_metric!(CHUNK_COUNT).set(count as f64);
    }
    fn set_stored_bytes(&self, bytes: u64) {
        get_metric!(STORED_BYTES).set(bytes as f64);
    }
}

#[allow(clippy::expect_used)]
impl EngineMetricsSink for PrometheusSink {
    fn inc_assets_committed(&self, count: u64) {
        get_metric!(ASSETS_COMMITTED_TOTAL).inc_by(count);
    }
    fn inc_tx_rolled_back(&self) {
        get_metric!(TX_ROLLED_BACK_TOTAL).inc();
    }
    fn inc_snapshots_created(&self) {
        get_metric!(SNAPSHOTS_CREATED_TOTAL).inc();
    }
    fn inc_vector_searches(&self, namespace: &str) {
        get_metric!(VECTOR_SEARCHES_TOTAL)
            .with_label_values(&[namespace])
            .inc();
    }
}

#[allow(clippy::expect_used)]
impl RpcMetricsSink for PrometheusSink {
    fn inc_requests_total(&self, route: &str, status: &str) {
        get_metric!(RPC_REQUESTS_TOTAL)
            .with_label_values(&[route, status])
            .inc();
    }
    fn observe_request_duration(&self, route: &str, duration_secs: f64) {
        get_metric!(RPC_REQUEST_DURATION_SECONDS)
            .with_label_values(&[route])
            .observe(duration_secs);
    }
    fn inc_ingest_frames(&self, count: u64) {
        get_metric!(INGEST_FRAMES_TOTAL).inc_by(count);
    }
}

#[allow(clippy::expect_used)]
impl ErrorMetricsSink for PrometheusSink {
    fn inc_error(&self, code: &str) {
        get_metric!(ERRORS_TOTAL).with_label_values(&[code]).inc();
    }
}

impl MetricsSink for PrometheusSink {}

/// Registers all collectors and installs the sink. Call exactly once at
/// startup.
#[allow(clippy::expect_used)]
pub fn install() -> Result<&'static dyn MetricsSink, prometheus::Error> {
    CHUNK_BYTES_WRITTEN_TOTAL
        .set(register_int_counter!(
            "aifs_chunk_bytes_written_total",
            "Total stored bytes written to the chunk store."
        )?)
        .expect("static already initialized");
    CHUNKS_DEDUPLICATED_TOTAL
        .set(register_int_counter!(
            "aifs_chunks_deduplicated_total",
            "Chunk writes answered by deduplication."
        )?)
        .expect("static already initialized");
    CHUNKS_PRUNED_TOTAL
        .set(register_int_counter!(
            "aifs_chunks_pruned_total",
            "Chunk files removed by admin prune."
        )?)
        .expect("static already initialized");
    CHUNK_COUNT
        .set(register_gauge!(
            "aifs_chunk_count",
            "Chunk files currently on disk."
        )?)
        .expect("static already initialized");
    STORED_BYTES
        .set(register_gauge!(
            "aifs_stored_bytes",
            "Stored bytes across chunk files."
        )?)
        .expect("static already initialized");
    ASSETS_COMMITTED_TOTAL
        .set(register_int_counter!(
            "aifs_assets_committed_total",
            "Assets made visible by committed transactions."
        )?)
        .expect("static already initialized");
    TX_ROLLED_BACK_TOTAL
        .set(register_int_counter!(
            "aifs_tx_rolled_back_total",
            "Transactions rolled back."
        )?)
        .expect("static already initialized");
    SNAPSHOTS_CREATED_TOTAL
        .set(register_int_counter!(
            "aifs_snapshots_created_total",
            "Snapshots created and signed."
        )?)
        .expect("static already initialized");
    VECTOR_SEARCHES_TOTAL
        .set(register_int_counter_vec!(
            "aifs_vector_searches_total",
            "Vector searches executed.",
            &["namespace"]
        )?)
        .expect("static already initialized");
    RPC_REQUESTS_TOTAL
        .set(register_int_counter_vec!(
            "aifs_rpc_requests_total",
            "Total RPC requests.",
            &["route", "status"]
        )?)
        .expect("static already initialized");
    RPC_REQUEST_DURATION_SECONDS
        .set(register_histogram_vec!(
            "aifs_rpc_request_duration_seconds",
            "Latency of RPC requests.",
            &["route"],
            exponential_buckets(0.001, 2.0, 15)?
        )?)
        .expect("static already initialized");
    INGEST_FRAMES_TOTAL
        .set(register_int_counter!(
            "aifs_ingest_frames_total",
            "Frames received on ingest streams."
        )?)
        .expect("static already initialized");
    ERRORS_TOTAL
        .set(register_int_counter_vec!(
            "aifs_errors_total",
            "Errors by stable error code.",
            &["code"]
        )?)
        .expect("static already initialized");

    static PROM_SINK: PrometheusSink = PrometheusSink;
    let _ = SINK.set(&PROM_SINK);
    Ok(&PROM_SINK)
}
