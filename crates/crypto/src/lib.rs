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

//! # AIFS cryptography
//!
//! Ed25519 snapshot signing and verification, AES-256-GCM sealing for
//! chunk payloads, the abstract KMS provider with a local default, and
//! the passphrase-wrapped key file format for the engine signing seed.

/// AES-256-GCM sealing and opening with associated-data binding.
pub mod aead;
/// Passphrase-wrapped on-disk format for the engine signing seed.
pub mod keyfile;
/// The abstract data-key provider and the local master-key implementation.
pub mod kms;
/// Ed25519 snapshot signing and the canonical signed message.
pub mod sign;

pub use aead::{open, seal, SealedBox, NONCE_LEN, TAG_LEN};
pub use kms::{KmsProvider, LocalKms, WrappedKey, DEK_LEN};
pub use sign::{snapshot_message, SnapshotSigner, SIGNATURE_LEN};
