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

//! # AIFS telemetry
//!
//! Observability infrastructure: structured logging initialization, a
//! Prometheus metrics endpoint, and abstract sinks decoupling metric
//! instrumentation from the backend. Storage-plane crates report into
//! the sink traits; binaries install the Prometheus implementation once
//! at startup, and everything degrades to a no-op when none is installed.

/// A lightweight HTTP server exposing `/metrics`, `/healthz` and `/readyz`.
pub mod http;
/// Global structured-logging initialization.
pub mod init;
/// The Prometheus implementation of the sinks.
pub mod prometheus;
/// Abstract `*MetricsSink` traits and global sink access.
pub mod sinks;
/// RAII timer for observing scope durations.
pub mod time;

pub use init::init_tracing;
pub use sinks::{engine_metrics, error_metrics, rpc_metrics, store_metrics};
