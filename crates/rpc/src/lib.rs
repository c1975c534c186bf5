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

//! # AIFS RPC surface
//!
//! Streaming gRPC front door over a single TCP port. Ingest is
//! client-streaming (ordered frames), retrieval and event subscription
//! are server-streaming, everything else is unary. Bearer capability
//! tokens ride the `authorization` metadata entry and are checked per
//! call; zstd and gzip are accepted for transport compression.

/// Bearer-token extraction and the per-RPC guard.
pub mod guard;
/// The gRPC service implementations.
pub mod service;
/// Engine-error to `tonic::Status` mapping with machine-readable reasons.
pub mod status;

/// Generated protobuf/tonic code, package `aifs.v1`.
pub mod pb {
    tonic::include_proto!("aifs.v1");
}

mod server;

pub use server::serve;
