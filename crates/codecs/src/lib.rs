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

//! # AIFS payload codecs
//!
//! Deterministic byte encodings and validators for the four asset kinds.
//! Validators run before storage: a payload that does not satisfy its
//! kind's encoding never reaches the chunk store.
//!
//! - **blob**: raw bytes, no framing.
//! - **tensor**: fixed protobuf header followed by the contiguous
//!   element buffer.
//! - **embed**: one protobuf message carrying the vector and its model
//!   provenance.
//! - **artifact**: a ZIP archive whose first-class entry is a JSON
//!   manifest; file entries are listed without decompressing them.

/// Artifact manifests and ZIP payloads.
pub mod artifact;
/// Raw blob payloads.
pub mod blob;
/// Embedding payloads.
pub mod embed;
/// Tensor payloads.
pub mod tensor;

use aifs_types::asset::AssetKind;
use aifs_types::error::CodecError;

pub use artifact::{ArtifactEntry, ArtifactManifest};
pub use embed::EmbedPayload;
pub use tensor::{Dtype, TensorHeader};

/// Validates `bytes` against the codec for `kind`, rejecting malformed
/// encodings before storage.
pub fn validate(kind: AssetKind, bytes: &[u8]) -> Result<(), CodecError> {
    match kind {
        AssetKind::Blob => blob::validate(bytes),
        AssetKind::Tensor => tensor::validate(bytes).map(|_| ()),
        AssetKind::Embed => embed::validate(bytes).map(|_| ()),
        AssetKind::Artifact => artifact::validate(bytes).map(|_| ()),
    }
}
