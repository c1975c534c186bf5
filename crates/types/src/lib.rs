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

//! # AIFS core types
//!
//! Identifiers, durable record structures, configuration, the canonical
//! binary codec and the central error taxonomy shared by every AIFS crate.
//! This crate sits at the bottom of the dependency graph and must stay
//! free of I/O, async and crypto concerns.

/// Durable record structures for assets, chunks, lineage and visibility.
pub mod asset;
/// Canonical, deterministic binary codec for all durable state.
pub mod codec;
/// Engine configuration structures and environment overlay.
pub mod config;
/// Core error types, stable error codes and RPC status classification.
pub mod error;
/// Events published by the engine for subscription streams.
pub mod event;
/// Content-addressed identifiers and namespace validation.
pub mod id;
/// Record structures for snapshots, branches, tags and pinned keys.
pub mod snapshot;
/// Timestamp helpers (RFC 3339 UTC, second precision).
pub mod timestamp;
/// Transaction identifiers, states and durable transaction records.
pub mod tx;
/// `aifs://` and `aifs-snap://` URI parsing and formatting.
pub mod uri;

pub use asset::{
    AssetKind, AssetRecord, ChunkCodec, ChunkRecord, LineageEdgeRecord, VisibilityRecord,
};
pub use error::{
    AuthError, ChunkError, CodecError, CryptoError, EngineError, ErrorCode, IndexError, MetaError,
    StatusKind, TxError,
};
pub use id::{AssetId, ChunkHash, Namespace, SnapshotId};
pub use snapshot::{
    BranchHistoryRecord, BranchRecord, DistanceKind, NamespaceKeyRecord, SnapshotRecord, TagRecord,
    TrustedKeyRecord,
};
pub use tx::{TxId, TxRecord, TxState};
