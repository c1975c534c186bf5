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

//! # AIFS chunk store
//!
//! Content-addressed storage of opaque byte payloads, keyed by the
//! BLAKE3-256 of the plaintext, with transparent zstd compression and
//! AES-256-GCM encryption at rest.
//!
//! On-disk layout: `root/<hh>/<full-hex>` where `<hh>` is the first two
//! hex characters of the chunk hash, bounding directory fan-out. Each
//! chunk file contains `nonce(12) || aead_tag(16) || ciphertext`; the
//! sidecar metadata (wrapped DEK, KMS key id, codec, sizes) lives in the
//! metadata store as a [`ChunkRecord`].
//!
//! Deduplication is by plaintext hash: writing bytes whose hash is
//! already present is a no-op, so concurrent writers of the same content
//! race safely. The store never mutates a chunk file after the final
//! rename.

mod store;

pub use store::{ChunkStore, PutOutcome, StoreStats};

pub use aifs_types::asset::{ChunkCodec, ChunkRecord};
pub use aifs_types::error::ChunkError;
pub use aifs_types::id::ChunkHash;
