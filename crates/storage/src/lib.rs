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

//! # AIFS metadata store
//!
//! The single durable source of truth: assets, chunk sidecar records,
//! lineage edges, snapshots, branches and their history, tags,
//! transactions, visibility, and the key registry, all in one redb
//! database file with per-commit durability.
//!
//! Visibility is flipped together with the owning transaction's state in
//! a single write transaction, which is what makes the engine's
//! strong-causality rule crash-safe: either a transaction is `committed`
//! and every one of its assets is visible, or neither is true.

mod keys;
mod store;

pub use store::{AssetFilter, AssetPage, CommitOutcome, MetaStore};
