//! Canonical, deterministic binary codec for all durable state.
//!
//! Thin wrappers around `parity-scale-codec` (SCALE). Centralizing the
//! codec here guarantees that every crate serializes records, hashed
//! structures and signed payloads identically; a divergent binary
//! representation of the same record would silently break content
//! addressing and signature verification.

use parity_scale_codec::{Decode, DecodeAll, Encode};

use crate::error::MetaError;

/// Encodes a value into its canonical byte representation.
pub fn to_bytes_canonical<T: Encode>(v: &T) -> Vec<u8> {
    v.encode()
}

/// Decodes a value from its canonical byte representation, failing fast
/// on trailing bytes or any malformed field.
pub fn from_bytes_canonical<T: Decode>(b: &[u8]) -> Result<T, MetaError> {
    T::decode_all(&mut &*b).map_err(|e| MetaError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[derive(Encode, Decode, Debug, PartialEq, Eq)]
    struct Sample {
        id: [u8; 32],
        name: String,
        metadata: BTreeMap<String, String>,
    }

    #[test]
    fn roundtrip() {
        let mut metadata = BTreeMap::new();
        metadata.insert("origin".to_string(), "unit-test".to_string());
        let sample = Sample {
            id: [9; 32],
            name: "asset".to_string(),
            metadata,
        };
        let bytes = to_bytes_canonical(&sample);
        assert_eq!(from_bytes_canonical::<Sample>(&bytes).unwrap(), sample);
    }

    #[test]
    fn rejects_trailing_bytes() {
        let mut bytes = to_bytes_canonical(&42u32);
        bytes.push(0);
        assert!(from_bytes_canonical::<u32>(&bytes).is_err());
    }

    #[test]
    fn rejects_truncation() {
        let mut bytes = to_bytes_canonical(&"canonical".to_string());
        bytes.pop();
        assert!(from_bytes_canonical::<String>(&bytes).is_err());
    }
}
