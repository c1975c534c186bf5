//! Transaction identifiers, states and the durable transaction record.

use parity_scale_codec::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::MetaError;
use crate::id::AssetId;

/// Opaque transaction identifier (UUID v4 bytes).
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Encode, Decode, Serialize, Deserialize,
)]
pub struct TxId(pub [u8; 16]);

impl TxId {
    /// Generates a fresh random transaction id.
    pub fn generate() -> Self {
        Self(*uuid::Uuid::new_v4().as_bytes())
    }

    /// Renders the id as lowercase hex.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parses the 32-char lowercase hex form.
    pub fn from_hex(s: &str) -> Result<Self, MetaError> {
        if s.len() != 32 {
            return Err(MetaError::InvalidId(s.to_string()));
        }
        let raw = hex::decode(s).map_err(|_| MetaError::InvalidId(s.to_string()))?;
        let mut out = [0u8; 16];
        out.copy_from_slice(&raw);
        Ok(Self(out))
    }
}

impl fmt::Debug for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxId({})", self.to_hex())
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for TxId {
    type Err = MetaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

/// Transaction lifecycle states.
///
/// Happy path: `Pending -> Committing -> Committed`. Abandonment:
/// `Pending -> RollingBack -> RolledBack`. Any non-terminal step may end
/// in `Failed`. Only `Committed` and `RolledBack` are terminal successes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Encode, Decode, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TxState {
    /// Accepting assets and dependency declarations.
    Pending,
    /// Commit in progress; parent visibility being verified.
    Committing,
    /// Terminal: all attached assets are visible.
    Committed,
    /// Rollback in progress.
    RollingBack,
    /// Terminal: assets discarded, never visible.
    RolledBack,
    /// A commit or rollback step failed; caller decides the next move.
    Failed,
}

impl TxState {
    /// Whether no further transitions are permitted out of this state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Committed | Self::RolledBack)
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(&self, next: TxState) -> bool {
        use TxState::*;
        matches!(
            (self, next),
            (Pending, Committing)
                | (Pending, RollingBack)
                | (Pending, Failed)
                | (Committing, Committed)
                | (Committing, Failed)
                | (RollingBack, RolledBack)
                | (RollingBack, Failed)
                | (Failed, RollingBack)
        )
    }

    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Committing => "committing",
            Self::Committed => "committed",
            Self::RollingBack => "rolling_back",
            Self::RolledBack => "rolled_back",
            Self::Failed => "failed",
        }
    }
}

/// The durable mirror of an in-flight or finished transaction.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub struct TxRecord {
    /// Transaction id.
    pub tx_id: TxId,
    /// Current lifecycle state.
    pub state: TxState,
    /// Unix seconds at `begin`.
    pub created_at: u64,
    /// Unix seconds at the visibility flip, once committed.
    pub committed_at: Option<u64>,
    /// Assets created inside this transaction, in insertion order.
    pub assets: Vec<AssetId>,
    /// Declared parent dependencies that must be visible before commit.
    pub dependencies: Vec<AssetId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_machine_edges() {
        use TxState::*;
        assert!(Pending.can_transition_to(Committing));
        assert!(Committing.can_transition_to(Committed));
        assert!(Pending.can_transition_to(RollingBack));
        assert!(RollingBack.can_transition_to(RolledBack));
        assert!(Failed.can_transition_to(RollingBack));

        assert!(!Committed.can_transition_to(Pending));
        assert!(!Committed.can_transition_to(RollingBack));
        assert!(!RolledBack.can_transition_to(Committing));
        assert!(!Pending.can_transition_to(Committed));
    }

    #[test]
    fn tx_id_hex_roundtrip() {
        let id = TxId::generate();
        assert_eq!(TxId::from_hex(&id.to_hex()).unwrap(), id);
    }
}
