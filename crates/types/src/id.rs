//! Content-addressed identifiers.
//!
//! All primary identifiers are raw byte arrays rendered as lowercase hex.
//! Asset and chunk ids are 32 bytes (BLAKE3-256); snapshot ids are the
//! first 16 bytes of a BLAKE3 hash. The wrappers exist so that ids of
//! different entities cannot be confused at compile time.

use parity_scale_codec::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::MetaError;

macro_rules! hex_id {
    ($name:ident, $len:expr, $doc:expr) => {
        #[doc = $doc]
        #[derive(
            Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Encode, Decode, Serialize, Deserialize,
        )]
        pub struct $name(pub [u8; $len]);

        impl $name {
            /// Byte length of this identifier.
            pub const LEN: usize = $len;

            /// Returns the raw identifier bytes.
            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            /// Renders the identifier as lowercase hex.
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            /// Parses a lowercase hex string of exactly `2 * LEN` characters.
            pub fn from_hex(s: &str) -> Result<Self, MetaError> {
                if s.len() != $len * 2 || s.chars().any(|c| c.is_ascii_uppercase()) {
                    return Err(MetaError::InvalidId(s.to_string()));
                }
                let raw = hex::decode(s).map_err(|_| MetaError::InvalidId(s.to_string()))?;
                let mut out = [0u8; $len];
                out.copy_from_slice(&raw);
                Ok(Self(out))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.to_hex())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl FromStr for $name {
            type Err = MetaError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_hex(s)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }
    };
}

hex_id!(
    ChunkHash,
    32,
    "BLAKE3-256 of a chunk's plaintext; the chunk's primary id."
);
hex_id!(
    AssetId,
    32,
    "Logical asset id: the sole chunk hash for single-chunk assets, or the BLAKE3-256 of the ordered chunk-hash list."
);
hex_id!(
    SnapshotId,
    16,
    "Truncated BLAKE3-256 of `merkle_root || timestamp`, 32 hex chars."
);

impl From<ChunkHash> for AssetId {
    fn from(h: ChunkHash) -> Self {
        AssetId(h.0)
    }
}

/// Maximum namespace length in bytes.
pub const MAX_NAMESPACE_LEN: usize = 64;

/// A validated logical tenant scope.
///
/// Namespaces share signing keys, branches, tags and a vector-index
/// dimension. The charset is restricted to `[a-z0-9._-]` (leading
/// alphanumeric) so namespaces can be embedded in composite store keys
/// with a NUL separator and in `aifs://` URIs without escaping.
#[derive(
    Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Encode, Decode, Serialize, Deserialize, Debug,
)]
pub struct Namespace(String);

impl Namespace {
    /// Validates and wraps a namespace name.
    pub fn new(name: impl Into<String>) -> Result<Self, MetaError> {
        let name = name.into();
        if name.is_empty() || name.len() > MAX_NAMESPACE_LEN {
            return Err(MetaError::InvalidNamespace(name));
        }
        let mut chars = name.chars();
        let head_ok = chars
            .next()
            .is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
        let tail_ok = chars.all(|c| {
            c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '_' || c == '-'
        });
        if !head_ok || !tail_ok {
            return Err(MetaError::InvalidNamespace(name));
        }
        Ok(Self(name))
    }

    /// Returns the namespace name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Namespace {
    type Err = MetaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<[u8]> for Namespace {
    fn as_ref(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_roundtrip() {
        let id = AssetId([0xab; 32]);
        let hex = id.to_hex();
        assert_eq!(hex.len(), 64);
        assert_eq!(AssetId::from_hex(&hex).unwrap(), id);
    }

    #[test]
    fn rejects_uppercase_and_bad_length() {
        assert!(AssetId::from_hex("AB").is_err());
        let upper = "AB".repeat(32);
        assert!(AssetId::from_hex(&upper).is_err());
        let short = "ab".repeat(31);
        assert!(AssetId::from_hex(&short).is_err());
    }

    #[test]
    fn snapshot_id_is_32_hex_chars() {
        let id = SnapshotId([7; 16]);
        assert_eq!(id.to_hex().len(), 32);
    }

    #[test]
    fn namespace_charset() {
        assert!(Namespace::new("prod").is_ok());
        assert!(Namespace::new("team-a.models_v2").is_ok());
        assert!(Namespace::new("").is_err());
        assert!(Namespace::new("-leading").is_err());
        assert!(Namespace::new("Upper").is_err());
        assert!(Namespace::new("has space").is_err());
        assert!(Namespace::new("nul\0byte").is_err());
        assert!(Namespace::new("x".repeat(65)).is_err());
    }
}
