//! Raw blob payloads: no framing, every byte string is valid.

use aifs_types::error::CodecError;

/// Blobs carry arbitrary bytes; validation always succeeds.
pub fn validate(_bytes: &[u8]) -> Result<(), CodecError> {
    Ok(())
}
