//! `aifs://` and `aifs-snap://` URI parsing and formatting.
//!
//! - `aifs://<namespace>/<asset_id>[.<kind>]` refers to an asset.
//! - `aifs-snap://<namespace>/<snapshot_id>` refers to a snapshot.

use std::fmt;
use std::str::FromStr;

use crate::asset::AssetKind;
use crate::error::MetaError;
use crate::id::{AssetId, Namespace, SnapshotId};

/// A parsed `aifs://` asset URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetUri {
    /// Namespace component.
    pub namespace: Namespace,
    /// 64-hex asset id component.
    pub asset_id: AssetId,
    /// Optional kind suffix.
    pub kind: Option<AssetKind>,
}

impl fmt::Display for AssetUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "aifs://{}/{}", self.namespace, self.asset_id)?;
        if let Some(kind) = self.kind {
            write!(f, ".{}", kind.as_str())?;
        }
        Ok(())
    }
}

impl FromStr for AssetUri {
    type Err = MetaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix("aifs://")
            .ok_or_else(|| MetaError::InvalidId(s.to_string()))?;
        let (ns, tail) = rest
            .split_once('/')
            .ok_or_else(|| MetaError::InvalidId(s.to_string()))?;
        let namespace = Namespace::new(ns)?;
        let (id_part, kind) = match tail.split_once('.') {
            Some((id, kind_name)) => {
                let kind = AssetKind::parse(kind_name)
                    .ok_or_else(|| MetaError::InvalidId(s.to_string()))?;
                (id, Some(kind))
            }
            None => (tail, None),
        };
        Ok(Self {
            namespace,
            asset_id: AssetId::from_hex(id_part)?,
            kind,
        })
    }
}

/// A parsed `aifs-snap://` snapshot URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotUri {
    /// Namespace component.
    pub namespace: Namespace,
    /// 32-hex snapshot id component.
    pub snapshot_id: SnapshotId,
}

impl fmt::Display for SnapshotUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "aifs-snap://{}/{}", self.namespace, self.snapshot_id)
    }
}

impl FromStr for SnapshotUri {
    type Err = MetaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix("aifs-snap://")
            .ok_or_else(|| MetaError::InvalidId(s.to_string()))?;
        let (ns, id_part) = rest
            .split_once('/')
            .ok_or_else(|| MetaError::InvalidId(s.to_string()))?;
        Ok(Self {
            namespace: Namespace::new(ns)?,
            snapshot_id: SnapshotId::from_hex(id_part)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_uri_roundtrip() {
        let uri = AssetUri {
            namespace: Namespace::new("prod").unwrap(),
            asset_id: AssetId([0x5a; 32]),
            kind: Some(AssetKind::Tensor),
        };
        let rendered = uri.to_string();
        assert!(rendered.starts_with("aifs://prod/"));
        assert!(rendered.ends_with(".tensor"));
        assert_eq!(rendered.parse::<AssetUri>().unwrap(), uri);
    }

    #[test]
    fn asset_uri_without_kind() {
        let rendered = format!("aifs://ns1/{}", "00".repeat(32));
        let uri: AssetUri = rendered.parse().unwrap();
        assert_eq!(uri.kind, None);
    }

    #[test]
    fn snapshot_uri_roundtrip() {
        let uri = SnapshotUri {
            namespace: Namespace::new("prod").unwrap(),
            snapshot_id: SnapshotId([3; 16]),
        };
        assert_eq!(uri.to_string().parse::<SnapshotUri>().unwrap(), uri);
    }

    #[test]
    fn rejects_wrong_scheme_and_bad_ids() {
        assert!("http://x/y".parse::<AssetUri>().is_err());
        assert!("aifs://ns/deadbeef".parse::<AssetUri>().is_err());
        assert!(format!("aifs://BAD/{}", "00".repeat(32))
            .parse::<AssetUri>()
            .is_err());
        assert!(format!("aifs://ns/{}.model", "00".repeat(32))
            .parse::<AssetUri>()
            .is_err());
    }
}
