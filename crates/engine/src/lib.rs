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

//! # AIFS engine
//!
//! The orchestrator. One [`AifsEngine`] instance owns the chunk store,
//! the metadata store, the per-namespace vector indexes, the transaction
//! manager, the snapshot signer and the capability-token secret; there
//! is no hidden process-wide state.
//!
//! Ingest flows `codec -> (compress -> encrypt -> chunk store) ->
//! metadata (within tx) -> vector index -> commit -> visible`; retrieval
//! reverses the chain and re-validates content addressing on the way
//! out.

mod engine;
mod request;

pub use engine::{AifsEngine, EngineInfo};
pub use request::{Asset, EngineOptions, ParentLink, PutAssetRequest, SearchHit, VerifyMode};

pub use aifs_types::config::EngineConfig;
pub use aifs_types::error::EngineError;
pub use aifs_types::event::EngineEvent;
